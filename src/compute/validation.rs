//! Validation for coordinates, radii and key configuration.
//!
//! Every check here runs before the store is touched.

use crate::compute::geocoder::{COMPOSITE_KEY_SEPARATOR, LEAF_LEVEL, MAX_HASH_KEY_LENGTH};
use crate::error::{GeoError, Result};
use crate::types::GeoPoint;

/// Validates latitude in [-90, 90] and longitude in [-180, 180].
///
/// # Examples
///
/// ```
/// use spatio_geoindex::GeoPoint;
/// use spatio_geoindex::compute::validation::validate_geo_point;
///
/// assert!(validate_geo_point(&GeoPoint::new(52.1, 2.0)).is_ok());
/// assert!(validate_geo_point(&GeoPoint::new(91.0, 2.0)).is_err());
/// assert!(validate_geo_point(&GeoPoint::new(0.0, -180.5)).is_err());
/// ```
pub fn validate_geo_point(point: &GeoPoint) -> Result<()> {
    let (lat, lng) = (point.latitude, point.longitude);

    if !lat.is_finite() {
        return Err(GeoError::InvalidInput(format!(
            "Latitude must be finite, got: {}",
            lat
        )));
    }

    if !lng.is_finite() {
        return Err(GeoError::InvalidInput(format!(
            "Longitude must be finite, got: {}",
            lng
        )));
    }

    if !(-90.0..=90.0).contains(&lat) {
        return Err(GeoError::InvalidInput(format!(
            "Latitude out of range [-90.0, 90.0]: {}",
            lat
        )));
    }

    if !(-180.0..=180.0).contains(&lng) {
        return Err(GeoError::InvalidInput(format!(
            "Longitude out of range [-180.0, 180.0]: {}",
            lng
        )));
    }

    Ok(())
}

/// A radius must be finite and strictly positive.
pub fn validate_radius(radius_meters: f64) -> Result<()> {
    if !radius_meters.is_finite() || radius_meters <= 0.0 {
        return Err(GeoError::InvalidInput(format!(
            "Radius must be a positive number of meters, got: {}",
            radius_meters
        )));
    }
    Ok(())
}

pub fn validate_hash_key_length(length: u8) -> Result<()> {
    if !(1..=MAX_HASH_KEY_LENGTH).contains(&length) {
        return Err(GeoError::InvalidInput(format!(
            "Hash key length must be between 1 and {}, got: {}",
            MAX_HASH_KEY_LENGTH, length
        )));
    }
    Ok(())
}

/// Parent cells must be strictly coarser than leaf cells.
pub fn validate_parent_level(level: u8) -> Result<()> {
    if level >= LEAF_LEVEL {
        return Err(GeoError::InvalidInput(format!(
            "Parent level must be below leaf level {}, got: {}",
            LEAF_LEVEL, level
        )));
    }
    Ok(())
}

/// Composite values must not contain the key separator.
pub fn validate_composite_values(values: &[String]) -> Result<()> {
    for (idx, value) in values.iter().enumerate() {
        if value.contains(COMPOSITE_KEY_SEPARATOR) {
            return Err(GeoError::InvalidInput(format!(
                "Composite value at index {} contains reserved separator '{}': {}",
                idx, COMPOSITE_KEY_SEPARATOR, value
            )));
        }
    }
    Ok(())
}
