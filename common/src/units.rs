use serde::{Deserialize, Serialize};

pub const MIB: f64 = 1024.0 * 1024.0;
pub const GIB: f64 = 1024.0 * 1024.0 * 1024.0;

pub fn to_mib(bytes: f64) -> f64 {
    bytes / MIB
}

pub fn to_gib(bytes: f64) -> f64 {
    bytes / GIB
}

pub fn mib_to_bytes(mib: f64) -> f64 {
    mib * MIB
}

pub fn gib_to_bytes(gib: f64) -> f64 {
    gib * GIB
}

pub fn ms_to_sec(ms: f64) -> f64 {
    ms / 1000.0
}

/// Unit used for byte counts on an axis or in a speed
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SizeUnit {
    Bytes,
    #[default]
    Mib,
    Gib,
}

impl SizeUnit {
    pub fn convert(&self, bytes: f64) -> f64 {
        match self {
            SizeUnit::Bytes => bytes,
            SizeUnit::Mib => to_mib(bytes),
            SizeUnit::Gib => to_gib(bytes),
        }
    }

    pub fn label(&self) -> &'static str {
        match self {
            SizeUnit::Bytes => "B",
            SizeUnit::Mib => "MiB",
            SizeUnit::Gib => "GiB",
        }
    }
}

/// Key size legend label, `256 MiB` or `1.5 MiB`
pub fn format_mib(mib: f64) -> String {
    if mib == mib.trunc() {
        format!("{} MiB", mib as u64)
    } else {
        format!("{:.1} MiB", mib)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn conversions_invert() {
        for x in [0.0, 1.0, 0.5, 1234.5678, 1e6] {
            assert!((to_mib(mib_to_bytes(x)) - x).abs() < 1e-9);
            assert!((to_gib(gib_to_bytes(x)) - x).abs() < 1e-9);
        }
    }

    #[test]
    fn known_values() {
        assert_eq!(to_mib(1_048_576.0), 1.0);
        assert_eq!(to_gib(100.0 * GIB), 100.0);
        assert_eq!(ms_to_sec(1500.0), 1.5);
        assert_eq!(SizeUnit::Gib.convert(2.0 * GIB), 2.0);
    }

    #[test]
    fn mib_labels() {
        assert_eq!(format_mib(128.0), "128 MiB");
        assert_eq!(format_mib(1.5), "1.5 MiB");
    }
}
