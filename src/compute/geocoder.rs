//! Point to geohash mapping on the S2 Hilbert curve.
//!
//! A geohash here is the id of the leaf S2 cell containing a point. Partition
//! keys are the leading decimal digits of that id, so nearby points share a
//! partition and a contiguous geohash range inside it.

use crate::compute::validation::{
    validate_composite_values, validate_geo_point, validate_hash_key_length,
    validate_parent_level,
};
use crate::error::Result;
use crate::types::{GeoPoint, ParentCell};
use s2::cell::Cell;
use s2::cellid::CellID;
use s2::latlng::LatLng;

/// S2 leaf cell level.
pub const LEAF_LEVEL: u8 = 30;

/// Longest partition key, in decimal digits.
pub const MAX_HASH_KEY_LENGTH: u8 = 19;

/// Joins a partition key with caller composite values.
pub const COMPOSITE_KEY_SEPARATOR: char = '_';

pub(crate) fn leaf_cell(point: &GeoPoint) -> CellID {
    CellID::from(LatLng::from_degrees(point.latitude, point.longitude))
}

/// Geohash of a point: the id of its leaf S2 cell.
///
/// ```
/// use spatio_geoindex::GeoPoint;
/// use spatio_geoindex::compute::geocoder::geohash;
///
/// assert_eq!(geohash(&GeoPoint::new(52.1, 2.0)).unwrap(), 5177531549489041509);
/// ```
pub fn geohash(point: &GeoPoint) -> Result<u64> {
    validate_geo_point(point)?;
    Ok(leaf_cell(point).0)
}

/// Leading `hash_key_length` decimal digits of `geohash`.
///
/// Values with fewer digits than requested are returned unchanged.
pub fn partition_key(geohash: u64, hash_key_length: u8) -> Result<u64> {
    validate_hash_key_length(hash_key_length)?;
    Ok(truncate_digits(geohash, hash_key_length))
}

/// Ancestor of the point's leaf cell at `level`, with that cell's center.
pub fn parent_cell(point: &GeoPoint, level: u8) -> Result<ParentCell> {
    validate_geo_point(point)?;
    validate_parent_level(level)?;

    let parent = leaf_cell(point).parent(u64::from(level));
    let center = LatLng::from(Cell::from(&parent).center());

    Ok(ParentCell {
        id: parent.0,
        center: GeoPoint::new(center.lat.deg(), center.lng.deg()),
    })
}

/// Partition key extended with composite values, e.g. `517753_tenant-a`.
pub fn composite_hash_key(hash_key: u64, composite_values: &[String]) -> Result<String> {
    validate_composite_values(composite_values)?;

    let mut key = hash_key.to_string();
    for value in composite_values {
        key.push(COMPOSITE_KEY_SEPARATOR);
        key.push_str(value);
    }
    Ok(key)
}

pub(crate) fn decimal_digits(value: u64) -> u32 {
    value.checked_ilog10().map_or(1, |log| log + 1)
}

pub(crate) fn truncate_digits(value: u64, length: u8) -> u64 {
    let digits = decimal_digits(value);
    let length = u32::from(length);
    if digits <= length {
        value
    } else {
        value / 10u64.pow(digits - length)
    }
}

/// Last value sharing `value`'s partition key at `value`'s digit count.
pub(crate) fn partition_block_end(value: u64, length: u8) -> u64 {
    let digits = decimal_digits(value);
    let length = u32::from(length);
    if digits <= length {
        return value;
    }

    let scale = 10u64.pow(digits - length);
    (value / scale)
        .checked_add(1)
        .and_then(|next| next.checked_mul(scale))
        .map_or(u64::MAX, |next_start| next_start - 1)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_geohash_known_value() {
        let hash = geohash(&GeoPoint::new(52.1, 2.0)).unwrap();
        assert_eq!(hash, 5177531549489041509);
    }

    #[test]
    fn test_geohash_is_deterministic() {
        let points = [
            GeoPoint::new(52.1, 2.0),
            GeoPoint::new(-33.8688, 151.2093),
            GeoPoint::new(90.0, 0.0),
            GeoPoint::new(-90.0, 180.0),
            GeoPoint::new(0.0, -180.0),
        ];
        for point in points {
            assert_eq!(geohash(&point).unwrap(), geohash(&point).unwrap());
        }
    }

    #[test]
    fn test_geohash_rejects_invalid_point() {
        assert!(geohash(&GeoPoint::new(100.0, 0.0)).is_err());
    }

    #[test]
    fn test_partition_key_known_value() {
        assert_eq!(partition_key(5177531549489041509, 6).unwrap(), 517753);
        assert_eq!(partition_key(5177531549489041509, 1).unwrap(), 5);
        assert_eq!(
            partition_key(5177531549489041509, 19).unwrap(),
            5177531549489041509
        );
    }

    #[test]
    fn test_partition_key_short_values() {
        assert_eq!(partition_key(42, 6).unwrap(), 42);
        assert_eq!(partition_key(0, 3).unwrap(), 0);
        assert_eq!(partition_key(u64::MAX, 3).unwrap(), 184);
    }

    #[test]
    fn test_partition_key_length_bounds() {
        assert!(partition_key(5177531549489041509, 0).is_err());
        assert!(partition_key(5177531549489041509, 20).is_err());
    }

    #[test]
    fn test_parent_cell_known_value() {
        let parent = parent_cell(&GeoPoint::new(52.1, 2.0), 17).unwrap();
        assert_eq!(parent.id, 5177531549477765120);

        // The center of a level-17 cell is within ~100m of any point inside it.
        let distance = parent.center.distance_to(&GeoPoint::new(52.1, 2.0));
        assert!(distance < 100.0, "center {} m away", distance);
    }

    #[test]
    fn test_parent_cell_contains_leaf() {
        let point = GeoPoint::new(40.7128, -74.0060);
        let leaf = geohash(&point).unwrap();
        let parent = parent_cell(&point, 12).unwrap();
        let parent_id = CellID(parent.id);
        assert!(parent_id.range_min().0 <= leaf && leaf <= parent_id.range_max().0);
    }

    #[test]
    fn test_parent_cell_rejects_leaf_level() {
        assert!(parent_cell(&GeoPoint::new(0.0, 0.0), LEAF_LEVEL).is_err());
    }

    #[test]
    fn test_composite_hash_key() {
        assert_eq!(composite_hash_key(517753, &[]).unwrap(), "517753");
        assert_eq!(
            composite_hash_key(517753, &["tenant-a".to_string(), "blue".to_string()]).unwrap(),
            "517753_tenant-a_blue"
        );
        assert!(composite_hash_key(517753, &["a_b".to_string()]).is_err());
    }

    #[test]
    fn test_decimal_digits() {
        assert_eq!(decimal_digits(0), 1);
        assert_eq!(decimal_digits(9), 1);
        assert_eq!(decimal_digits(10), 2);
        assert_eq!(decimal_digits(u64::MAX), 20);
    }

    #[test]
    fn test_partition_block_end() {
        assert_eq!(partition_block_end(517_753_123, 6), 517_753_999);
        assert_eq!(partition_block_end(999_999_123, 6), 999_999_999);
        assert_eq!(partition_block_end(42, 6), 42);
        assert_eq!(partition_block_end(u64::MAX - 5, 3), u64::MAX);
    }
}
