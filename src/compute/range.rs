//! Closed geohash intervals and their partition-key arithmetic.

use crate::compute::geocoder::{partition_block_end, truncate_digits};
use crate::error::{GeoError, Result};
use s2::cellid::CellID;
use serde::{Deserialize, Serialize};
use std::fmt;

/// A closed interval `[range_min, range_max]` on the geohash curve.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct GeohashRange {
    range_min: u64,
    range_max: u64,
}

impl GeohashRange {
    pub fn new(range_min: u64, range_max: u64) -> Result<Self> {
        if range_min > range_max {
            return Err(GeoError::InvalidInput(format!(
                "Geohash range min {} exceeds max {}",
                range_min, range_max
            )));
        }
        Ok(Self {
            range_min,
            range_max,
        })
    }

    /// Curve extent of every leaf cell under `cell`.
    pub fn from_cell(cell: CellID) -> Self {
        Self {
            range_min: cell.range_min().0,
            range_max: cell.range_max().0,
        }
    }

    pub fn range_min(&self) -> u64 {
        self.range_min
    }

    pub fn range_max(&self) -> u64 {
        self.range_max
    }

    pub fn contains(&self, geohash: u64) -> bool {
        (self.range_min..=self.range_max).contains(&geohash)
    }

    /// Partition key addressed by this range's lower bound.
    pub fn hash_key(&self, hash_key_length: u8) -> u64 {
        truncate_digits(self.range_min, hash_key_length)
    }

    /// Whether both bounds fall into the same partition.
    pub fn is_single_partition(&self, hash_key_length: u8) -> bool {
        self.hash_key(hash_key_length) == truncate_digits(self.range_max, hash_key_length)
            && partition_block_end(self.range_min, hash_key_length) >= self.range_max
    }

    /// Splits the range at partition-key boundaries, one sub-range per key.
    ///
    /// ```
    /// use spatio_geoindex::compute::range::GeohashRange;
    ///
    /// let range = GeohashRange::new(5_177_531_000, 5_177_549_999).unwrap();
    /// let parts: Vec<_> = range.trim(6).collect();
    /// assert_eq!(parts.len(), 2);
    /// assert_eq!(parts[0], GeohashRange::new(5_177_531_000, 5_177_539_999).unwrap());
    /// assert_eq!(parts[1], GeohashRange::new(5_177_540_000, 5_177_549_999).unwrap());
    /// ```
    pub fn trim(&self, hash_key_length: u8) -> Trim {
        Trim {
            next: Some(self.range_min),
            range_max: self.range_max,
            hash_key_length,
        }
    }

    /// Union of two ranges that overlap or touch (`a.max + 1 == b.min`).
    pub fn try_merge(&self, other: &GeohashRange) -> Option<GeohashRange> {
        let (lower, upper) = if self.range_min <= other.range_min {
            (self, other)
        } else {
            (other, self)
        };

        if upper.range_min <= lower.range_max.saturating_add(1) {
            Some(GeohashRange {
                range_min: lower.range_min,
                range_max: lower.range_max.max(upper.range_max),
            })
        } else {
            None
        }
    }
}

impl fmt::Display for GeohashRange {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "[{}, {}]", self.range_min, self.range_max)
    }
}

/// Iterator returned by [`GeohashRange::trim`].
#[derive(Debug, Clone)]
pub struct Trim {
    next: Option<u64>,
    range_max: u64,
    hash_key_length: u8,
}

impl Iterator for Trim {
    type Item = GeohashRange;

    fn next(&mut self) -> Option<GeohashRange> {
        let start = self.next?;
        let end = partition_block_end(start, self.hash_key_length).min(self.range_max);
        self.next = if end < self.range_max {
            Some(end + 1)
        } else {
            None
        };

        Some(GeohashRange {
            range_min: start,
            range_max: end,
        })
    }
}
