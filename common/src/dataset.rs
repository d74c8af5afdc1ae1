use std::{io::Read, path::Path};

use eyre::{Context, Result};
use itertools::Itertools;
use regex::Regex;
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tokio::fs::read;
use tracing::debug;

use crate::record::{Column, FieldValue, Record};

#[derive(Error, Debug)]
pub enum DatasetError {
    #[error("{source_name}: missing column `{column}`")]
    MissingColumn { source_name: String, column: Column },
    #[error("{source_name}: row {row} has no value for `{column}`")]
    MissingValue {
        source_name: String,
        row: usize,
        column: Column,
    },
    #[error("{source_name}: row {row} has invalid time {time}")]
    InvalidTime {
        source_name: String,
        row: usize,
        time: f64,
    },
    #[error("{source_name}: {source}")]
    Csv {
        source_name: String,
        #[source]
        source: csv::Error,
    },
    #[error("Invalid pattern {0}")]
    Pattern(#[from] regex::Error),
}

/// Rows of one benchmark results file
#[derive(Debug, Clone, Default)]
pub struct Dataset {
    source_name: String,
    headers: Vec<String>,
    records: Vec<Record>,
}

impl Dataset {
    pub fn new(source_name: &str, headers: Vec<String>, records: Vec<Record>) -> Self {
        Self {
            source_name: source_name.to_owned(),
            headers,
            records,
        }
    }

    pub fn from_reader<R: Read>(source_name: &str, reader: R) -> Result<Self, DatasetError> {
        let csv_err = |source| DatasetError::Csv {
            source_name: source_name.to_owned(),
            source,
        };
        let mut reader = csv::ReaderBuilder::new()
            .has_headers(true)
            .trim(csv::Trim::All)
            .from_reader(reader);
        let headers = reader
            .headers()
            .map_err(csv_err)?
            .iter()
            .map(|x| x.to_owned())
            .collect::<Vec<_>>();

        let mut records = Vec::new();
        for (i, row) in reader.deserialize::<Record>().enumerate() {
            let mut record = row.map_err(csv_err)?;
            // Header is line 1
            let row = i + 2;
            record.row = row;
            if !record.time.is_finite() || record.time <= 0.0 {
                return Err(DatasetError::InvalidTime {
                    source_name: source_name.to_owned(),
                    row,
                    time: record.time,
                });
            }
            records.push(record);
        }

        let dataset = Self::new(source_name, headers, records);
        dataset.require(&[Column::Implementation])?;
        Ok(dataset)
    }

    pub async fn load(path: &Path) -> Result<Self> {
        let bytes = read(path)
            .await
            .context(format!("Read dataset {}", path.display()))?;
        let dataset = Self::from_reader(&path.display().to_string(), bytes.as_slice())?;
        debug!(
            "Loaded {} rows from {} columns={:?}",
            dataset.len(),
            path.display(),
            dataset.headers
        );
        Ok(dataset)
    }

    pub fn source_name(&self) -> &str {
        &self.source_name
    }

    pub fn headers(&self) -> &[String] {
        &self.headers
    }

    pub fn records(&self) -> &[Record] {
        &self.records
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    pub fn has_column(&self, column: Column) -> bool {
        column
            .header_names()
            .iter()
            .any(|name| self.headers.iter().any(|h| h == name))
    }

    /// Fails on the first column that the file does not have
    pub fn require(&self, columns: &[Column]) -> Result<(), DatasetError> {
        match columns.iter().find(|c| !self.has_column(**c)) {
            Some(column) => Err(DatasetError::MissingColumn {
                source_name: self.source_name.clone(),
                column: *column,
            }),
            None => Ok(()),
        }
    }

    /// Fails if any row has an empty `column`
    pub fn require_values(&self, column: Column) -> Result<(), DatasetError> {
        self.require(&[column])?;
        match self.records.iter().find(|r| r.get(column).is_none()) {
            Some(record) => Err(DatasetError::MissingValue {
                source_name: self.source_name.clone(),
                row: record.row,
                column,
            }),
            None => Ok(()),
        }
    }

    fn with_records(&self, records: Vec<Record>) -> Self {
        Self {
            source_name: self.source_name.clone(),
            headers: self.headers.clone(),
            records,
        }
    }

    pub fn select(&self, filter: &Filter) -> Self {
        self.retain(|r| filter.matches(r))
    }

    pub fn retain<F: Fn(&Record) -> bool>(&self, predicate: F) -> Self {
        self.with_records(
            self.records
                .iter()
                .filter(|r| predicate(r))
                .cloned()
                .collect(),
        )
    }

    pub fn where_eq(&self, column: Column, value: &FieldValue) -> Self {
        self.retain(|r| r.get(column).as_ref() == Some(value))
    }

    /// Distinct values in order of first appearance
    pub fn distinct(&self, column: Column) -> Vec<FieldValue> {
        self.records
            .iter()
            .filter_map(|r| r.get(column))
            .unique()
            .collect()
    }

    pub fn distinct_sorted(&self, column: Column) -> Vec<FieldValue> {
        self.records
            .iter()
            .filter_map(|r| r.get(column))
            .unique()
            .sorted()
            .collect()
    }
}

/// Row selection condition, as written in the plot configuration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Condition {
    Eq { column: Column, value: FieldValue },
    In { column: Column, values: Vec<FieldValue> },
    AtMost { column: Column, value: u64 },
    AtLeast { column: Column, value: u64 },
    Matches { column: Column, pattern: String },
}

impl Condition {
    pub fn column(&self) -> Column {
        match self {
            Condition::Eq { column, .. }
            | Condition::In { column, .. }
            | Condition::AtMost { column, .. }
            | Condition::AtLeast { column, .. }
            | Condition::Matches { column, .. } => *column,
        }
    }
}

#[derive(Debug)]
enum Predicate {
    Eq(Column, FieldValue),
    In(Column, Vec<FieldValue>),
    AtMost(Column, u64),
    AtLeast(Column, u64),
    Matches(Column, Regex),
}

/// Compiled set of [`Condition`]s, all of which must hold
#[derive(Debug, Default)]
pub struct Filter {
    predicates: Vec<Predicate>,
}

impl Filter {
    pub fn new(conditions: &[Condition]) -> Result<Self, DatasetError> {
        let predicates = conditions
            .iter()
            .map(|c| {
                Ok(match c {
                    Condition::Eq { column, value } => Predicate::Eq(*column, value.clone()),
                    Condition::In { column, values } => Predicate::In(*column, values.clone()),
                    Condition::AtMost { column, value } => Predicate::AtMost(*column, *value),
                    Condition::AtLeast { column, value } => Predicate::AtLeast(*column, *value),
                    Condition::Matches { column, pattern } => {
                        Predicate::Matches(*column, Regex::new(pattern)?)
                    }
                })
            })
            .collect::<Result<Vec<_>, DatasetError>>()?;
        Ok(Self { predicates })
    }

    pub fn matches(&self, record: &Record) -> bool {
        self.predicates.iter().all(|p| match p {
            Predicate::Eq(column, value) => record.get(*column).as_ref() == Some(value),
            Predicate::In(column, values) => record
                .get(*column)
                .is_some_and(|v| values.contains(&v)),
            Predicate::AtMost(column, max) => record
                .get(*column)
                .and_then(|v| v.as_int())
                .is_some_and(|v| v <= *max),
            Predicate::AtLeast(column, min) => record
                .get(*column)
                .and_then(|v| v.as_int())
                .is_some_and(|v| v >= *min),
            Predicate::Matches(column, regex) => record
                .get(*column)
                .is_some_and(|v| regex.is_match(&v.to_string())),
        })
    }
}
