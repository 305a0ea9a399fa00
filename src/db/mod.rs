//! The geospatial index facade.
//!
//! [`GeoDB`] derives geo attributes on the write path, plans coverings for
//! radius queries and delegates all I/O to a [`GeoStore`]. It is cheap to
//! clone and safe to share between tasks.

use crate::builder::GeoDBBuilder;
use crate::compute::covering::{Covering, cover_radius};
use crate::compute::geocoder::{composite_hash_key, geohash, parent_cell, partition_key};
use crate::compute::geojson::point_to_geojson;
use crate::compute::validation::validate_geo_point;
use crate::config::{GeoConfig, ReadConsistency};
use crate::error::Result;
use crate::store::{GeoStore, GetItemRequest, ItemKey};
use crate::types::{GeoPoint, GetPointInput, Item};
use serde_json::Value;
use std::sync::Arc;

mod query;
mod write;

/// Geospatial secondary index over a partition/range keyed store.
#[derive(Clone)]
pub struct GeoDB {
    pub(crate) config: Arc<GeoConfig>,
    pub(crate) store: Arc<dyn GeoStore>,
}

impl GeoDB {
    /// Validates `config` and binds it to `store`.
    pub fn new(config: GeoConfig, store: Arc<dyn GeoStore>) -> Result<Self> {
        config.validate()?;
        log::debug!(
            "Opened geo index on table '{}' with hash key length {}",
            config.table_name,
            config.hash_key_length
        );
        Ok(Self {
            config: Arc::new(config),
            store,
        })
    }

    pub fn builder() -> GeoDBBuilder {
        GeoDBBuilder::new()
    }

    pub fn config(&self) -> &GeoConfig {
        &self.config
    }

    pub fn store(&self) -> &Arc<dyn GeoStore> {
        &self.store
    }

    /// Partition-aligned geohash ranges a radius query around `center` scans.
    pub fn covering_for(&self, center: &GeoPoint, radius_meters: f64) -> Result<Covering> {
        cover_radius(
            center,
            radius_meters,
            &self.config.covering,
            self.config.hash_key_length,
        )
    }

    /// Fetches the item stored for `point` and range key, if any.
    pub async fn get_point(&self, input: GetPointInput) -> Result<Option<Item>> {
        let key = self.item_key(&input.point, input.range_key, &input.composite_values)?;
        let request = GetItemRequest {
            table_name: self.config.table_name.clone(),
            key,
            consistent_read: self.consistent_read(input.consistency),
        };
        self.store.get_item(request).await
    }

    /// Partition key of `point`, extended with composite values.
    pub fn hash_key_for(&self, point: &GeoPoint, composite_values: &[String]) -> Result<String> {
        let hash = geohash(point)?;
        let key = partition_key(hash, self.config.hash_key_length)?;
        composite_hash_key(key, composite_values)
    }

    pub(crate) fn item_key(
        &self,
        point: &GeoPoint,
        range_key: Value,
        composite_values: &[String],
    ) -> Result<ItemKey> {
        Ok(ItemKey::new(
            self.hash_key_for(point, composite_values)?,
            range_key,
        ))
    }

    pub(crate) fn consistent_read(&self, requested: Option<ReadConsistency>) -> bool {
        requested.unwrap_or(self.config.consistency).is_strong()
    }

    /// Attributes derived from the point: hash key, geohash, geometry and,
    /// when enabled, the parent cell triple. The range key is not included.
    pub(crate) fn derived_attributes(
        &self,
        point: &GeoPoint,
        composite_values: &[String],
    ) -> Result<Item> {
        validate_geo_point(point)?;
        let config = &self.config;

        let hash = geohash(point)?;
        let hash_key = composite_hash_key(
            partition_key(hash, config.hash_key_length)?,
            composite_values,
        )?;

        let mut attributes = Item::new();
        attributes.insert(
            config.hash_key_attribute_name.clone(),
            Value::String(hash_key),
        );
        attributes.insert(config.geohash_attribute_name.clone(), Value::from(hash));
        attributes.insert(
            config.geojson_attribute_name.clone(),
            Value::String(point_to_geojson(
                point,
                &config.geojson_point_type,
                config.longitude_first,
            )?),
        );

        if config.parent_index_enabled() {
            let parent = parent_cell(point, config.parent_level)?;
            let parent_key = composite_hash_key(
                partition_key(parent.id, config.parent_hash_key_length)?,
                composite_values,
            )?;
            attributes.insert(
                config.parent_geohash_attribute_name.clone(),
                Value::from(parent.id),
            );
            attributes.insert(
                config.parent_hash_key_attribute_name.clone(),
                Value::String(parent_key),
            );
            attributes.insert(
                config.parent_geojson_attribute_name.clone(),
                Value::String(point_to_geojson(
                    &parent.center,
                    &config.geojson_point_type,
                    config.longitude_first,
                )?),
            );
        }

        Ok(attributes)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::GeoError;
    use crate::store::MemoryStore;
    use serde_json::json;

    fn db(config: GeoConfig) -> GeoDB {
        let store = Arc::new(MemoryStore::for_config(&config));
        GeoDB::new(config, store).unwrap()
    }

    #[test]
    fn test_new_rejects_invalid_config() {
        let config = GeoConfig::new("points").with_hash_key_length(0);
        let store = Arc::new(MemoryStore::for_config(&config));
        assert!(matches!(
            GeoDB::new(config, store),
            Err(GeoError::InvalidConfig(_))
        ));
    }

    #[test]
    fn test_hash_key_for() {
        let db = db(GeoConfig::new("points").with_hash_key_length(6));
        let point = GeoPoint::new(52.1, 2.0);
        assert_eq!(db.hash_key_for(&point, &[]).unwrap(), "517753");
        assert_eq!(
            db.hash_key_for(&point, &["tenant-a".to_string()]).unwrap(),
            "517753_tenant-a"
        );
    }

    #[test]
    fn test_derived_attributes() {
        let db = db(GeoConfig::new("points").with_hash_key_length(6));
        let attrs = db
            .derived_attributes(&GeoPoint::new(52.1, 2.0), &[])
            .unwrap();
        assert_eq!(attrs["hashKey"], json!("517753"));
        assert_eq!(attrs["geohash"], json!(5177531549489041509u64));
        let geometry: serde_json::Value =
            serde_json::from_str(attrs["geoJson"].as_str().unwrap()).unwrap();
        assert_eq!(geometry["coordinates"], json!([2.0, 52.1]));
        assert!(!attrs.contains_key("parentGeohash"));
    }

    #[test]
    fn test_derived_parent_attributes() {
        let db = db(GeoConfig::new("points")
            .with_hash_key_length(6)
            .with_parent_level(17, 4));
        let attrs = db
            .derived_attributes(&GeoPoint::new(52.1, 2.0), &["t".to_string()])
            .unwrap();
        assert_eq!(attrs["parentGeohash"], json!(5177531549477765120u64));
        assert_eq!(attrs["parentHashKey"], json!("5177_t"));
        assert!(attrs["parentGeoJson"].as_str().unwrap().contains("Point"));
    }

    #[test]
    fn test_consistency_override() {
        let db = db(GeoConfig::new("points"));
        assert!(!db.consistent_read(None));
        assert!(db.consistent_read(Some(ReadConsistency::Strong)));

        let strong = self::db(GeoConfig::new("points").with_consistency(ReadConsistency::Strong));
        assert!(strong.consistent_read(None));
        assert!(!strong.consistent_read(Some(ReadConsistency::Eventual)));
    }
}
