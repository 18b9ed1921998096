//! Construction options for [`HashTable`](crate::HashTable).

use crate::error::{HashTableError, Result};

/// Smallest bucket array a table ever uses.
pub const MIN_BUCKETS: usize = 16;

/// Largest bucket array a table grows to; keeps bucket indices within `u32`.
pub const MAX_BUCKETS: usize = 1 << 30;

/// Default growth trigger: rebuild once entries reach half the bucket count.
pub const DEFAULT_MAX_BUCKET_OCCUPANCY_RATIO: f32 = 0.5;

/// Options for [`HashTable::init`](crate::HashTable::init).
///
/// ```
/// use yield_table::TableOptions;
///
/// let opts = TableOptions::default()
///     .with_bucket_hint(1024)
///     .with_copy_yields(false);
/// assert_eq!(opts.bucket_hint, 1024);
/// ```
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct TableOptions {
    /// Requested bucket count; rounded down to a power of two in
    /// `[MIN_BUCKETS, MAX_BUCKETS]`.
    pub bucket_hint: usize,
    /// Entries per bucket that trigger a doubling on insert.
    pub max_occupancy_ratio: f32,
    /// Store copies of inserted keys instead of references.
    pub copy_keys: bool,
    /// Store copies of inserted yields instead of references.
    pub copy_yields: bool,
}

impl Default for TableOptions {
    fn default() -> Self {
        Self {
            bucket_hint: MIN_BUCKETS,
            max_occupancy_ratio: DEFAULT_MAX_BUCKET_OCCUPANCY_RATIO,
            copy_keys: true,
            copy_yields: true,
        }
    }
}

impl TableOptions {
    pub fn with_bucket_hint(mut self, bucket_hint: usize) -> Self {
        self.bucket_hint = bucket_hint;
        self
    }

    pub fn with_max_occupancy_ratio(mut self, ratio: f32) -> Self {
        self.max_occupancy_ratio = ratio;
        self
    }

    pub fn with_copy_keys(mut self, copy_keys: bool) -> Self {
        self.copy_keys = copy_keys;
        self
    }

    pub fn with_copy_yields(mut self, copy_yields: bool) -> Self {
        self.copy_yields = copy_yields;
        self
    }

    /// Checks the options that cannot be normalized.
    pub fn validate(&self) -> Result<()> {
        let ratio = self.max_occupancy_ratio;
        if !ratio.is_finite() || ratio <= 0.0 {
            return Err(HashTableError::InvalidOccupancyRatio { ratio });
        }
        Ok(())
    }
}

/// Rounds `hint` down to a power of two, clamped to `[MIN_BUCKETS, MAX_BUCKETS]`.
pub fn normalize_bucket_count(hint: usize) -> usize {
    if hint <= MIN_BUCKETS {
        return MIN_BUCKETS;
    }
    if hint >= MAX_BUCKETS {
        return MAX_BUCKETS;
    }
    1 << (usize::BITS - 1 - hint.leading_zeros())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_match_documented_values() {
        let o = TableOptions::default();
        assert_eq!(o.bucket_hint, 16);
        assert_eq!(o.max_occupancy_ratio, 0.5);
        assert!(o.copy_keys && o.copy_yields);
        assert!(o.validate().is_ok());
    }

    #[test]
    fn bucket_count_rounds_down_and_clamps() {
        assert_eq!(normalize_bucket_count(0), 16);
        assert_eq!(normalize_bucket_count(15), 16);
        assert_eq!(normalize_bucket_count(16), 16);
        assert_eq!(normalize_bucket_count(17), 16);
        assert_eq!(normalize_bucket_count(31), 16);
        assert_eq!(normalize_bucket_count(32), 32);
        assert_eq!(normalize_bucket_count(1000), 512);
        assert_eq!(normalize_bucket_count(1024), 1024);
        assert_eq!(normalize_bucket_count(MAX_BUCKETS + 1), MAX_BUCKETS);
        assert_eq!(normalize_bucket_count(usize::MAX), MAX_BUCKETS);
    }

    #[test]
    fn bad_ratios_rejected() {
        for ratio in [0.0, -1.0, f32::NAN, f32::INFINITY] {
            let o = TableOptions::default().with_max_occupancy_ratio(ratio);
            assert!(matches!(
                o.validate(),
                Err(HashTableError::InvalidOccupancyRatio { .. })
            ));
        }
        assert!(TableOptions::default()
            .with_max_occupancy_ratio(2.0)
            .validate()
            .is_ok());
    }
}
