//! Radius coverings: the geohash ranges a radius search must scan.
//!
//! Building a covering takes three steps:
//! 1. cover the query cap with S2 cells (a superset of the true disc),
//! 2. map each cell to its curve range and trim it at partition-key boundaries,
//! 3. sort and merge overlapping or adjacent ranges within each partition.
//!
//! Every resulting range lies inside exactly one partition, so each one maps
//! to one store range query.

use crate::compute::geocoder::truncate_digits;
use crate::compute::range::GeohashRange;
use crate::compute::validation::{validate_geo_point, validate_hash_key_length, validate_radius};
use crate::config::CoveringConfig;
use crate::error::{GeoError, Result};
use crate::types::GeoPoint;
use s2::cap::Cap;
use s2::cellid::CellID;
use s2::latlng::LatLng;
use s2::point::Point as S2Point;
use s2::region::RegionCoverer;
use s2::s1::{Angle, Rad};

/// Mean earth radius in meters, matching the haversine post-filter.
pub const EARTH_RADIUS_METERS: f64 = 6_371_008.8;

/// Coverings above this many ranges are logged as expensive.
pub const LARGE_COVERING_RANGES: usize = 1_000;

/// Ordered, partition-aligned geohash ranges covering a query disc.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Covering {
    ranges: Vec<GeohashRange>,
    hash_key_length: u8,
}

impl Covering {
    /// Trims `ranges` to partition boundaries and merges them.
    pub fn from_ranges<I>(ranges: I, hash_key_length: u8) -> Result<Self>
    where
        I: IntoIterator<Item = GeohashRange>,
    {
        validate_hash_key_length(hash_key_length)?;
        let trimmed = ranges
            .into_iter()
            .flat_map(|range| range.trim(hash_key_length))
            .collect();
        Ok(Self {
            ranges: merge_ranges(trimmed, hash_key_length),
            hash_key_length,
        })
    }

    pub fn ranges(&self) -> &[GeohashRange] {
        &self.ranges
    }

    pub fn hash_key_length(&self) -> u8 {
        self.hash_key_length
    }

    pub fn len(&self) -> usize {
        self.ranges.len()
    }

    pub fn is_empty(&self) -> bool {
        self.ranges.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = &GeohashRange> {
        self.ranges.iter()
    }

    /// Whether `geohash` falls inside any range.
    pub fn contains(&self, geohash: u64) -> bool {
        let idx = self
            .ranges
            .partition_point(|range| range.range_max() < geohash);
        self.ranges
            .get(idx)
            .is_some_and(|range| range.contains(geohash))
    }

    /// Distinct partition keys the covering touches.
    pub fn partition_count(&self) -> usize {
        let mut keys: Vec<u64> = self
            .ranges
            .iter()
            .map(|range| range.hash_key(self.hash_key_length))
            .collect();
        keys.dedup();
        keys.len()
    }
}

impl IntoIterator for Covering {
    type Item = GeohashRange;
    type IntoIter = std::vec::IntoIter<GeohashRange>;

    fn into_iter(self) -> Self::IntoIter {
        self.ranges.into_iter()
    }
}

/// S2 cells covering the spherical cap of `radius_meters` around `center`.
pub fn cover_cells(center: &GeoPoint, radius_meters: f64, config: &CoveringConfig) -> Vec<CellID> {
    let axis = S2Point::from(LatLng::from_degrees(center.latitude, center.longitude));
    let angle = Angle::from(Rad(radius_meters / EARTH_RADIUS_METERS));
    let cap = Cap::from_center_angle(&axis, &angle);

    RegionCoverer {
        min_level: config.min_level,
        max_level: config.max_level,
        level_mod: config.level_mod,
        max_cells: config.max_cells,
    }
    .covering(&cap)
    .0
}

/// Covering for a radius query.
///
/// Fails on invalid input, or when `config.max_query_ranges` is set and the
/// covering would need more partition queries than that.
pub fn cover_radius(
    center: &GeoPoint,
    radius_meters: f64,
    config: &CoveringConfig,
    hash_key_length: u8,
) -> Result<Covering> {
    validate_geo_point(center)?;
    validate_radius(radius_meters)?;
    validate_hash_key_length(hash_key_length)?;

    let cells = cover_cells(center, radius_meters, config);

    let mut ranges = Vec::with_capacity(cells.len());
    for cell in &cells {
        for range in GeohashRange::from_cell(*cell).trim(hash_key_length) {
            if let Some(max_query_ranges) = config.max_query_ranges
                && ranges.len() == max_query_ranges
            {
                return Err(GeoError::InvalidInput(format!(
                    "Radius {}m needs more than {} range queries at hash key length {}",
                    radius_meters, max_query_ranges, hash_key_length
                )));
            }
            ranges.push(range);
        }
    }

    let ranges = merge_ranges(ranges, hash_key_length);
    if ranges.len() > LARGE_COVERING_RANGES {
        log::warn!(
            "Radius {}m at hash key length {} needs {} range queries",
            radius_meters,
            hash_key_length,
            ranges.len()
        );
    }
    log::debug!(
        "Covered {}m around ({}, {}) with {} cells and {} ranges",
        radius_meters,
        center.latitude,
        center.longitude,
        cells.len(),
        ranges.len()
    );

    Ok(Covering {
        ranges,
        hash_key_length,
    })
}

/// Sorts ranges by lower bound and merges overlapping or adjacent neighbours
/// that share a partition key.
///
/// On equal lower bounds the wider range sorts first and absorbs the other.
pub fn merge_ranges(mut ranges: Vec<GeohashRange>, hash_key_length: u8) -> Vec<GeohashRange> {
    ranges.sort_unstable_by(|a, b| {
        a.range_min()
            .cmp(&b.range_min())
            .then_with(|| b.range_max().cmp(&a.range_max()))
    });

    let mut merged: Vec<GeohashRange> = Vec::with_capacity(ranges.len());
    for range in ranges {
        if let Some(last) = merged.last_mut()
            && last.hash_key(hash_key_length) == truncate_digits(range.range_min(), hash_key_length)
            && let Some(joined) = last.try_merge(&range)
        {
            *last = joined;
            continue;
        }
        merged.push(range);
    }
    merged
}
