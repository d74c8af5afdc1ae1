use std::fmt::{self, Display};

use serde::{Deserialize, Serialize};

use crate::units::{to_mib, format_mib};

/// A single benchmark trial as written by the benchmark harness.
///
/// Older result files name `key_size` as `seed_size` and `fanout` as
/// `diff_factor`, both are accepted.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Record {
    pub implementation: String,
    #[serde(default)]
    pub enc_mode: Option<String>,
    #[serde(default, alias = "seed_size")]
    pub key_size: Option<u64>,
    #[serde(default)]
    pub outsize: Option<u64>,
    #[serde(default)]
    pub internal_threads: Option<u64>,
    #[serde(default)]
    pub external_threads: Option<u64>,
    #[serde(default, alias = "diff_factor")]
    pub fanout: Option<u64>,
    /// Elapsed milliseconds
    pub time: f64,
    /// Line in the source file, the header being line 1
    #[serde(skip)]
    pub row: usize,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Column {
    Implementation,
    EncMode,
    KeySize,
    Outsize,
    InternalThreads,
    ExternalThreads,
    Fanout,
}

impl Column {
    pub const ALL: [Column; 7] = [
        Column::Implementation,
        Column::EncMode,
        Column::KeySize,
        Column::Outsize,
        Column::InternalThreads,
        Column::ExternalThreads,
        Column::Fanout,
    ];

    pub fn name(&self) -> &'static str {
        match self {
            Column::Implementation => "implementation",
            Column::EncMode => "enc_mode",
            Column::KeySize => "key_size",
            Column::Outsize => "outsize",
            Column::InternalThreads => "internal_threads",
            Column::ExternalThreads => "external_threads",
            Column::Fanout => "fanout",
        }
    }

    /// Header names accepted for this column
    pub fn header_names(&self) -> &'static [&'static str] {
        match self {
            Column::KeySize => &["key_size", "seed_size"],
            Column::Fanout => &["fanout", "diff_factor"],
            Column::Implementation => &["implementation"],
            Column::EncMode => &["enc_mode"],
            Column::Outsize => &["outsize"],
            Column::InternalThreads => &["internal_threads"],
            Column::ExternalThreads => &["external_threads"],
        }
    }

    /// Columns holding byte counts
    pub fn is_size(&self) -> bool {
        matches!(self, Column::KeySize | Column::Outsize)
    }

    /// Legend label for a value of this column
    pub fn label(&self, value: &FieldValue) -> String {
        match (self.is_size(), value) {
            (true, FieldValue::Int(bytes)) => format_mib(to_mib(*bytes as f64)),
            _ => value.to_string(),
        }
    }
}

impl Display for Column {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// Value of a [`Column`] in a [`Record`].
///
/// Integers sort before text, integers numerically and text lexically.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(untagged)]
pub enum FieldValue {
    Int(u64),
    Text(String),
}

impl FieldValue {
    pub fn as_int(&self) -> Option<u64> {
        match self {
            FieldValue::Int(x) => Some(*x),
            FieldValue::Text(_) => None,
        }
    }

    pub fn as_text(&self) -> Option<&str> {
        match self {
            FieldValue::Text(x) => Some(x),
            FieldValue::Int(_) => None,
        }
    }
}

impl Display for FieldValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            FieldValue::Int(x) => write!(f, "{x}"),
            FieldValue::Text(x) => f.write_str(x),
        }
    }
}

impl From<u64> for FieldValue {
    fn from(value: u64) -> Self {
        FieldValue::Int(value)
    }
}

impl From<&str> for FieldValue {
    fn from(value: &str) -> Self {
        FieldValue::Text(value.to_owned())
    }
}

impl From<String> for FieldValue {
    fn from(value: String) -> Self {
        FieldValue::Text(value)
    }
}

impl Record {
    pub fn get(&self, column: Column) -> Option<FieldValue> {
        match column {
            Column::Implementation => Some(FieldValue::Text(self.implementation.clone())),
            Column::EncMode => self.enc_mode.clone().map(FieldValue::Text),
            Column::KeySize => self.key_size.map(FieldValue::Int),
            Column::Outsize => self.outsize.map(FieldValue::Int),
            Column::InternalThreads => self.internal_threads.map(FieldValue::Int),
            Column::ExternalThreads => self.external_threads.map(FieldValue::Int),
            Column::Fanout => self.fanout.map(FieldValue::Int),
        }
    }

    pub fn time_secs(&self) -> f64 {
        crate::units::ms_to_sec(self.time)
    }
}
