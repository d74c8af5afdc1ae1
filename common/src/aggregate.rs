use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::warn;

use crate::{
    dataset::{Dataset, DatasetError},
    record::{Column, FieldValue, Record},
    units::SizeUnit,
};

/// z-score of a two-sided 95% normal interval
pub const Z_95: f64 = 1.960;

#[derive(Error, Debug)]
pub enum AggregateError {
    #[error("{context}: {column}={key} has {count} trials, expected {expected}")]
    RepetitionMismatch {
        context: String,
        column: Column,
        key: FieldValue,
        count: usize,
        expected: usize,
    },
}

/// Per-trial quantity that is averaged within a group
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Metric {
    /// Seconds
    Time,
    /// `1 / seconds`, averaged to compute speeds
    InverseTime,
}

impl Metric {
    pub fn sample(&self, record: &Record) -> f64 {
        match self {
            Metric::Time => record.time_secs(),
            Metric::InverseTime => 1.0 / record.time_secs(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Summary {
    pub key: FieldValue,
    pub mean: f64,
    pub std: f64,
    pub count: usize,
}

impl Summary {
    pub fn from_samples(key: FieldValue, samples: &[f64]) -> Self {
        Self {
            key,
            mean: mean(samples).unwrap_or(0.0),
            std: sample_std(samples),
            count: samples.len(),
        }
    }

    /// Half width of the 95% confidence interval of the mean
    pub fn ci95(&self) -> f64 {
        confidence_half_width(self.std, self.count)
    }
}

pub fn mean(data: &[f64]) -> Option<f64> {
    if data.is_empty() {
        return None;
    }
    Some(data.iter().sum::<f64>() / data.len() as f64)
}

/// Standard deviation with `n - 1` denominator, 0 for fewer than two samples
pub fn sample_std(data: &[f64]) -> f64 {
    if data.len() < 2 {
        return 0.0;
    }
    let mean = data.iter().sum::<f64>() / data.len() as f64;
    let var = data.iter().map(|x| (x - mean).powi(2)).sum::<f64>() / (data.len() - 1) as f64;
    var.sqrt()
}

pub fn median(data: &[f64]) -> Option<f64> {
    if data.is_empty() {
        return None;
    }
    let mut sorted = data.to_vec();
    sorted.sort_by(|a, b| a.total_cmp(b));
    let mid = sorted.len() / 2;
    if sorted.len() % 2 == 0 {
        Some((sorted[mid - 1] + sorted[mid]) / 2.0)
    } else {
        Some(sorted[mid])
    }
}

pub fn confidence_half_width(std: f64, count: usize) -> f64 {
    if count == 0 {
        return 0.0;
    }
    Z_95 * std / (count as f64).sqrt()
}

/// Mean and standard deviation of `metric` per distinct `column` value, in
/// ascending key order
pub fn group_by(
    data: &Dataset,
    column: Column,
    metric: Metric,
) -> Result<Vec<Summary>, DatasetError> {
    data.require_values(column)?;
    let mut groups: BTreeMap<FieldValue, Vec<f64>> = BTreeMap::new();
    for record in data.records() {
        if let Some(key) = record.get(column) {
            groups.entry(key).or_default().push(metric.sample(record));
        }
    }
    Ok(groups
        .into_iter()
        .map(|(key, samples)| Summary::from_samples(key, &samples))
        .collect())
}

/// Speed and its error bar in `unit`/s, from a [`Metric::InverseTime`] summary.
///
/// This is `size * mean(1/t)`, which is not `size / mean(t)`.
pub fn speed(size_bytes: f64, unit: SizeUnit, inverse_time: &Summary) -> (f64, f64) {
    let size = unit.convert(size_bytes);
    (size * inverse_time.mean, size * inverse_time.ci95())
}

/// Warns about groups whose trial count differs from `expected`, or fails on
/// the first one when `strict` is set
pub fn check_repetitions(
    summaries: &[Summary],
    column: Column,
    expected: usize,
    strict: bool,
    context: &str,
) -> Result<(), AggregateError> {
    for summary in summaries {
        if summary.count == expected {
            continue;
        }
        let err = AggregateError::RepetitionMismatch {
            context: context.to_owned(),
            column,
            key: summary.key.clone(),
            count: summary.count,
            expected,
        };
        if strict {
            return Err(err);
        }
        warn!("{err}");
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::dataset::tests::keymix;

    fn close(a: f64, b: f64) -> bool {
        (a - b).abs() < 1e-9
    }

    #[test]
    fn mean_and_std() {
        let data = [2.0, 4.0, 4.0, 4.0, 5.0, 5.0, 7.0, 9.0];
        assert!(close(mean(&data).unwrap(), 5.0));
        assert!(close(sample_std(&data), (32.0f64 / 7.0).sqrt()));
        assert_eq!(mean(&[]), None);
    }

    #[test]
    fn single_sample_has_zero_std() {
        let summary = Summary::from_samples(1.into(), &[3.5]);
        assert_eq!(summary.std, 0.0);
        assert_eq!(summary.ci95(), 0.0);
    }

    #[test]
    fn ci_uses_group_size() {
        let samples = [1.0, 2.0, 3.0, 4.0, 5.0];
        let summary = Summary::from_samples(0.into(), &samples);
        let expected = 1.960 * sample_std(&samples) / 5f64.sqrt();
        assert!(close(summary.ci95(), expected));
    }

    #[test]
    fn median_even_and_odd() {
        assert_eq!(median(&[3.0, 1.0, 2.0]), Some(2.0));
        assert_eq!(median(&[4.0, 1.0, 2.0, 3.0]), Some(2.5));
        assert_eq!(median(&[]), None);
    }

    #[test]
    fn groups_are_sorted_by_key() {
        let data = keymix().where_eq(Column::Implementation, &"openssl-aes-128".into());
        let groups = group_by(&data, Column::KeySize, Metric::Time).unwrap();
        let keys = groups.iter().map(|g| g.key.clone()).collect::<Vec<_>>();
        assert_eq!(keys, vec![1048576.into(), 2097152.into()]);
        assert_eq!(groups[0].count, 4);
    }

    #[test]
    fn speed_is_mean_of_reciprocals() {
        let data = keymix()
            .where_eq(Column::Implementation, &"openssl-aes-128".into())
            .where_eq(Column::Fanout, &2.into());
        let time = group_by(&data, Column::KeySize, Metric::Time).unwrap();
        let inv = group_by(&data, Column::KeySize, Metric::InverseTime).unwrap();

        // 100, 100, 300 ms on 1 MiB
        assert!((time[0].mean - 0.5 / 3.0).abs() < 1e-9);
        let (speed, _) = speed(1048576.0, SizeUnit::Mib, &inv[0]);
        let expected = (10.0 + 10.0 + 1.0 / 0.3) / 3.0;
        assert!((speed - expected).abs() < 1e-9);
        assert!((speed - 7.7778).abs() < 1e-3);
        assert!((speed - 1.0 / time[0].mean).abs() > 1.0);
    }

    #[test]
    fn speed_error_scales_with_size() {
        let inv = Summary::from_samples(0.into(), &[1.0, 2.0, 3.0]);
        let (_, err_one) = speed(1048576.0, SizeUnit::Mib, &inv);
        let (_, err_two) = speed(2.0 * 1048576.0, SizeUnit::Mib, &inv);
        assert!(close(err_two, 2.0 * err_one));
    }

    #[test]
    fn grouping_by_absent_column_fails() {
        assert!(group_by(&keymix(), Column::EncMode, Metric::Time).is_err());
    }

    #[test]
    fn grouping_by_empty_cell_fails() {
        let csv = "implementation,fanout,key_size,time\na,2,,10\n";
        let data = Dataset::from_reader("gaps.csv", csv.as_bytes()).unwrap();
        assert!(matches!(
            group_by(&data, Column::KeySize, Metric::Time),
            Err(DatasetError::MissingValue { row: 2, .. })
        ));
        assert_eq!(group_by(&data, Column::Fanout, Metric::Time).unwrap().len(), 1);
    }

    #[test]
    fn repetition_check() {
        let groups = vec![
            Summary::from_samples(1.into(), &[1.0, 2.0]),
            Summary::from_samples(2.into(), &[1.0]),
        ];
        assert!(check_repetitions(&groups, Column::KeySize, 2, false, "test").is_ok());
        let err = check_repetitions(&groups, Column::KeySize, 2, true, "test").unwrap_err();
        assert!(err.to_string().contains("expected 2"));
    }
}
