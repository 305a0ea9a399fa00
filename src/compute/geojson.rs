//! GeoJSON Point encoding for the stored geometry attribute.
//!
//! Standard GeoJSON orders coordinates `[longitude, latitude]` and names the
//! geometry `"Point"`. Legacy tables store `[latitude, longitude]` under a
//! `"POINT"` type; they are read and written with `longitude_first = false`
//! and a matching point type.

use crate::compute::validation::validate_geo_point;
use crate::error::{GeoError, Result};
use crate::types::GeoPoint;
use geojson::{Geometry, Value};
use serde_json::Value as JsonValue;

/// GeoJSON geometry type of a point.
pub const DEFAULT_POINT_TYPE: &str = "Point";

/// Serializes a point as a GeoJSON Point geometry tagged with `point_type`.
pub fn point_to_geojson(
    point: &GeoPoint,
    point_type: &str,
    longitude_first: bool,
) -> Result<String> {
    let coords = if longitude_first {
        vec![point.longitude, point.latitude]
    } else {
        vec![point.latitude, point.longitude]
    };
    let geom = Geometry::new(Value::Point(coords));

    let mut json = serde_json::to_value(&geom).map_err(|e| {
        GeoError::SerializationErrorWithContext(format!("Failed to serialize point: {}", e))
    })?;
    if point_type != DEFAULT_POINT_TYPE
        && let Some(object) = json.as_object_mut()
    {
        object.insert("type".to_string(), JsonValue::from(point_type));
    }

    serde_json::to_string(&json).map_err(|e| {
        GeoError::SerializationErrorWithContext(format!("Failed to serialize point: {}", e))
    })
}

/// Parses a GeoJSON Point geometry. Extra coordinates (altitude) are ignored.
///
/// Both the standard `"Point"` type and `point_type` are accepted.
pub fn point_from_geojson(
    geojson: &str,
    point_type: &str,
    longitude_first: bool,
) -> Result<GeoPoint> {
    let mut json: JsonValue = serde_json::from_str(geojson)
        .map_err(|e| GeoError::InvalidInput(format!("Failed to parse GeoJSON: {}", e)))?;

    if let Some(object) = json.as_object_mut()
        && object.get("type").and_then(JsonValue::as_str) == Some(point_type)
    {
        object.insert("type".to_string(), JsonValue::from(DEFAULT_POINT_TYPE));
    }

    let geom: Geometry = serde_json::from_value(json)
        .map_err(|e| GeoError::InvalidInput(format!("Failed to parse GeoJSON: {}", e)))?;

    let coords = match geom.value {
        Value::Point(coords) => coords,
        _ => {
            return Err(GeoError::InvalidInput(
                "GeoJSON geometry is not a Point".to_string(),
            ));
        }
    };

    if coords.len() < 2 {
        return Err(GeoError::InvalidInput(
            "Point must have at least 2 coordinates".to_string(),
        ));
    }

    let point = if longitude_first {
        GeoPoint::new(coords[1], coords[0])
    } else {
        GeoPoint::new(coords[0], coords[1])
    };
    validate_geo_point(&point)?;
    Ok(point)
}
