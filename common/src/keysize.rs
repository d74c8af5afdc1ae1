use serde::{Deserialize, Serialize};

use crate::{dataset::Dataset, record::Column};

/// Picks the key size a chart compares implementations at
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case", tag = "strategy")]
pub enum KeySizeSelection {
    /// Smallest key size in the data that is at least `target`
    FirstAvailable { target: u64 },
    /// Smallest `block_size * fanout^k` that is at least `target`
    BlockPowers { target: u64 },
}

impl KeySizeSelection {
    /// `block_size` and `fanout` are only used by [`KeySizeSelection::BlockPowers`]
    pub fn select(&self, data: &Dataset, block_size: Option<u64>, fanout: Option<u64>) -> Option<u64> {
        match self {
            KeySizeSelection::FirstAvailable { target } => first_available(data, *target),
            KeySizeSelection::BlockPowers { target } => block_power(block_size?, fanout?, *target),
        }
    }
}

pub fn first_available(data: &Dataset, target: u64) -> Option<u64> {
    data.distinct_sorted(Column::KeySize)
        .into_iter()
        .filter_map(|v| v.as_int())
        .find(|size| *size >= target)
}

/// `None` if the sequence never reaches `target`
pub fn block_power(block_size: u64, fanout: u64, target: u64) -> Option<u64> {
    let mut size = block_size;
    while size < target {
        if fanout < 2 {
            return None;
        }
        size = size.checked_mul(fanout)?;
    }
    Some(size)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::dataset::tests::keymix;

    const MIB: u64 = 1024 * 1024;

    #[test]
    fn block_powers() {
        assert_eq!(block_power(16, 2, 256 * MIB), Some(256 * MIB));
        assert_eq!(block_power(48, 3, 256 * MIB), Some(48 * 3u64.pow(15)));
        assert_eq!(block_power(32, 4, 16), Some(32));
        assert_eq!(block_power(32, 1, 64), None);
        assert_eq!(block_power(u64::MAX / 2, 4, u64::MAX), None);
    }

    #[test]
    fn first_available_key_size() {
        let data = keymix();
        assert_eq!(first_available(&data, 1), Some(MIB));
        assert_eq!(first_available(&data, MIB + 1), Some(2 * MIB));
        assert_eq!(first_available(&data, 3 * MIB), None);
    }

    #[test]
    fn selection_needs_block_size() {
        let data = keymix();
        let sel = KeySizeSelection::BlockPowers { target: MIB };
        assert_eq!(sel.select(&data, None, Some(2)), None);
        assert_eq!(sel.select(&data, Some(16), Some(2)), Some(MIB));
        let sel = KeySizeSelection::FirstAvailable { target: MIB };
        assert_eq!(sel.select(&data, None, None), Some(MIB));
    }
}
