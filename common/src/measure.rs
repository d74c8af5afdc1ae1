use eyre::{Result, bail};
use serde::{Deserialize, Serialize};

use crate::{
    aggregate::{Metric, check_repetitions, group_by, speed},
    chart::Point,
    config::Settings,
    dataset::Dataset,
    record::Column,
    units::SizeUnit,
};

/// What a chart's y axis shows
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Measure {
    /// Mean time per trial in seconds
    Time,
    /// Bytes processed per second, in a [`SizeUnit`]
    Speed,
}

impl Measure {
    pub fn name(&self) -> &'static str {
        match self {
            Measure::Time => "time",
            Measure::Speed => "speed",
        }
    }

    pub fn metric(&self) -> Metric {
        match self {
            Measure::Time => Metric::Time,
            Measure::Speed => Metric::InverseTime,
        }
    }

    pub fn default_label(&self, unit: SizeUnit) -> String {
        match self {
            Measure::Time => "Average time [s]".to_owned(),
            Measure::Speed => format!("Average speed [{}/s]", unit.label()),
        }
    }
}

/// Byte count a speed is computed over
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SpeedSize {
    /// The x value of each point, which must be a size column
    #[default]
    X,
    /// The key size of the series
    KeySize,
    Bytes(u64),
}

/// Resolved [`SpeedSize`] for one series
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum SizeSource {
    X,
    Fixed(f64),
}

/// Aggregates `data` by `x` into chart points of `measure`.
///
/// `x_unit` converts size columns for the axis. Group sizes are checked
/// against the configured repetition count.
pub fn measure_points(
    data: &Dataset,
    x: Column,
    x_unit: Option<SizeUnit>,
    measure: Measure,
    size: SizeSource,
    unit: SizeUnit,
    settings: &Settings,
    context: &str,
) -> Result<Vec<Point>> {
    if data.is_empty() {
        return Ok(Vec::new());
    }
    if measure == Measure::Speed && size == SizeSource::X && !x.is_size() {
        bail!("{context}: speed over `{x}` needs a size");
    }

    let summaries = group_by(data, x, measure.metric())?;
    if let Some(expected) = settings.repetitions {
        check_repetitions(&summaries, x, expected, settings.strict_repetitions, context)?;
    }

    summaries
        .iter()
        .map(|summary| {
            let Some(key) = summary.key.as_int() else {
                bail!("{context}: `{x}` value {} is not numeric", summary.key);
            };
            let key = key as f64;
            let x_value = match (x_unit, x.is_size()) {
                (Some(unit), true) => unit.convert(key),
                _ => key,
            };
            let (y, err) = match measure {
                Measure::Time => (summary.mean, summary.ci95()),
                Measure::Speed => {
                    let bytes = match size {
                        SizeSource::X => key,
                        SizeSource::Fixed(bytes) => bytes,
                    };
                    speed(bytes, unit, summary)
                }
            };
            Ok(Point { x: x_value, y, err })
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::dataset::tests::keymix;

    fn settings(repetitions: Option<usize>, strict: bool) -> Settings {
        Settings {
            repetitions,
            strict_repetitions: strict,
            ..Default::default()
        }
    }

    fn aes_fanout2() -> Dataset {
        keymix()
            .where_eq(Column::Implementation, &"openssl-aes-128".into())
            .where_eq(Column::Fanout, &2.into())
    }

    #[test]
    fn time_points_convert_x() {
        let points = measure_points(
            &aes_fanout2(),
            Column::KeySize,
            Some(SizeUnit::Mib),
            Measure::Time,
            SizeSource::X,
            SizeUnit::Mib,
            &settings(None, false),
            "test",
        )
        .unwrap();
        assert_eq!(points.len(), 2);
        assert_eq!(points[0].x, 1.0);
        assert_eq!(points[1].x, 2.0);
        assert!((points[1].y - 0.4).abs() < 1e-12);
        assert_eq!(points[1].err, 0.0);
    }

    #[test]
    fn speed_uses_x_as_size() {
        let points = measure_points(
            &aes_fanout2(),
            Column::KeySize,
            Some(SizeUnit::Mib),
            Measure::Speed,
            SizeSource::X,
            SizeUnit::Mib,
            &settings(None, false),
            "test",
        )
        .unwrap();
        assert!((points[0].y - 7.7778).abs() < 1e-3);
        assert!((points[1].y - 5.0).abs() < 1e-9);
    }

    #[test]
    fn speed_with_fixed_size() {
        let data = keymix().where_eq(Column::Implementation, &"blake3-blake3".into());
        let points = measure_points(
            &data,
            Column::InternalThreads,
            None,
            Measure::Speed,
            SizeSource::Fixed(1048576.0),
            SizeUnit::Mib,
            &settings(None, false),
            "test",
        )
        .unwrap();
        assert_eq!(points.iter().map(|p| p.x).collect::<Vec<_>>(), vec![1.0, 2.0]);
        assert!((points[0].y - 20.0).abs() < 1e-9);
        assert!((points[1].y - 1.0 / 0.03).abs() < 1e-9);
    }

    #[test]
    fn speed_over_non_size_needs_size() {
        assert!(
            measure_points(
                &keymix(),
                Column::InternalThreads,
                None,
                Measure::Speed,
                SizeSource::X,
                SizeUnit::Mib,
                &settings(None, false),
                "test",
            )
            .is_err()
        );
    }

    #[test]
    fn empty_subset_yields_no_points() {
        let data = keymix().where_eq(Column::Implementation, &"missing".into());
        let points = measure_points(
            &data,
            Column::KeySize,
            None,
            Measure::Time,
            SizeSource::X,
            SizeUnit::Mib,
            &settings(Some(5), true),
            "test",
        )
        .unwrap();
        assert!(points.is_empty());
    }

    #[test]
    fn strict_repetitions_fail() {
        let run = |strict| {
            measure_points(
                &aes_fanout2(),
                Column::KeySize,
                None,
                Measure::Time,
                SizeSource::X,
                SizeUnit::Mib,
                &settings(Some(3), strict),
                "test",
            )
        };
        assert!(run(false).is_ok());
        assert!(run(true).is_err());
    }
}
