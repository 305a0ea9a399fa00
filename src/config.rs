//! Configuration for the geospatial index.
//!
//! A [`GeoConfig`] is built once, validated, and then shared read-only by the
//! geocoder, the coverer, the query orchestrator and the write path.
use crate::compute::geojson::DEFAULT_POINT_TYPE;
use crate::compute::validation::{validate_hash_key_length, validate_parent_level};
use crate::error::{GeoError, Result};
use serde::de::Error;
use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Hard ceiling on items per store batch write.
pub const MAX_BATCH_WRITE_ITEMS: usize = 25;

/// Read consistency requested from the backing store.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum ReadConsistency {
    #[default]
    Eventual,
    Strong,
}

impl ReadConsistency {
    pub fn is_strong(self) -> bool {
        self == ReadConsistency::Strong
    }
}

/// What `query_radius` does when one range query fails irrecoverably.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum FanOutPolicy {
    /// Abort sibling range queries and surface the first error.
    #[default]
    FailFast,
    /// Keep results from ranges that succeeded and report the failed ones.
    BestEffort,
}

/// Tuning for the S2 region coverer.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct CoveringConfig {
    #[serde(default)]
    pub min_level: u8,

    #[serde(default = "CoveringConfig::default_max_level")]
    pub max_level: u8,

    #[serde(default = "CoveringConfig::default_level_mod")]
    pub level_mod: u8,

    /// Soft limit on covering cells. More cells give a tighter covering.
    #[serde(default = "CoveringConfig::default_max_cells")]
    pub max_cells: usize,

    /// Optional cap on partition range queries a single radius search may
    /// issue. Unbounded by default.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub max_query_ranges: Option<usize>,
}

impl CoveringConfig {
    const fn default_max_level() -> u8 {
        30
    }

    const fn default_level_mod() -> u8 {
        1
    }

    const fn default_max_cells() -> usize {
        8
    }

    pub fn with_levels(mut self, min_level: u8, max_level: u8) -> Self {
        self.min_level = min_level;
        self.max_level = max_level;
        self
    }

    pub fn with_max_cells(mut self, max_cells: usize) -> Self {
        self.max_cells = max_cells;
        self
    }

    pub fn with_max_query_ranges(mut self, max_query_ranges: usize) -> Self {
        self.max_query_ranges = Some(max_query_ranges);
        self
    }

    pub fn validate(&self) -> Result<()> {
        if self.max_level > 30 {
            return Err(GeoError::InvalidConfig(format!(
                "Covering max_level must be at most 30, got {}",
                self.max_level
            )));
        }
        if self.min_level > self.max_level {
            return Err(GeoError::InvalidConfig(format!(
                "Covering min_level {} exceeds max_level {}",
                self.min_level, self.max_level
            )));
        }
        if !(1..=3).contains(&self.level_mod) {
            return Err(GeoError::InvalidConfig(format!(
                "Covering level_mod must be between 1 and 3, got {}",
                self.level_mod
            )));
        }
        if self.max_cells == 0 {
            return Err(GeoError::InvalidConfig(
                "Covering max_cells must be greater than zero".to_string(),
            ));
        }
        if self.max_query_ranges == Some(0) {
            return Err(GeoError::InvalidConfig(
                "Covering max_query_ranges must be greater than zero".to_string(),
            ));
        }
        Ok(())
    }
}

impl Default for CoveringConfig {
    fn default() -> Self {
        Self {
            min_level: 0,
            max_level: Self::default_max_level(),
            level_mod: Self::default_level_mod(),
            max_cells: Self::default_max_cells(),
            max_query_ranges: None,
        }
    }
}

/// Concurrency settings for the radius query fan-out.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct FanOutConfig {
    /// Range queries allowed in flight at once for one `query_radius` call.
    #[serde(default = "FanOutConfig::default_max_concurrency")]
    pub max_concurrency: usize,

    #[serde(default)]
    pub policy: FanOutPolicy,
}

impl FanOutConfig {
    const fn default_max_concurrency() -> usize {
        8
    }
}

impl Default for FanOutConfig {
    fn default() -> Self {
        Self {
            max_concurrency: Self::default_max_concurrency(),
            policy: FanOutPolicy::default(),
        }
    }
}

/// Bounded exponential backoff used by [`crate::store::RetryingStore`].
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct RetryConfig {
    /// Total attempts including the first call.
    #[serde(default = "RetryConfig::default_max_attempts")]
    pub max_attempts: u32,

    #[serde(default = "RetryConfig::default_base_delay_ms")]
    pub base_delay_ms: u64,

    #[serde(default = "RetryConfig::default_max_delay_ms")]
    pub max_delay_ms: u64,
}

impl RetryConfig {
    const fn default_max_attempts() -> u32 {
        4
    }

    const fn default_base_delay_ms() -> u64 {
        50
    }

    const fn default_max_delay_ms() -> u64 {
        2_000
    }

    pub fn with_max_attempts(mut self, attempts: u32) -> Self {
        self.max_attempts = attempts;
        self
    }

    pub fn with_delays(mut self, base: Duration, max: Duration) -> Self {
        self.base_delay_ms = base.as_millis() as u64;
        self.max_delay_ms = max.as_millis() as u64;
        self
    }

    /// Delay before retry number `attempt` (1-based), doubling from the base.
    pub fn backoff(&self, attempt: u32) -> Duration {
        let exponent = attempt.saturating_sub(1).min(20);
        let delay = self.base_delay_ms.saturating_mul(1u64 << exponent);
        Duration::from_millis(delay.min(self.max_delay_ms))
    }

    pub fn validate(&self) -> Result<()> {
        if self.max_attempts == 0 {
            return Err(GeoError::InvalidConfig(
                "Retry max_attempts must be greater than zero".to_string(),
            ));
        }
        if self.base_delay_ms > self.max_delay_ms {
            return Err(GeoError::InvalidConfig(format!(
                "Retry base delay {}ms exceeds max delay {}ms",
                self.base_delay_ms, self.max_delay_ms
            )));
        }
        Ok(())
    }
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            max_attempts: Self::default_max_attempts(),
            base_delay_ms: Self::default_base_delay_ms(),
            max_delay_ms: Self::default_max_delay_ms(),
        }
    }
}

/// Geospatial index configuration.
///
/// # Example
///
/// ```rust
/// use spatio_geoindex::GeoConfig;
///
/// let config = GeoConfig::new("places")
///     .with_hash_key_length(6)
///     .with_parent_level(17, 8);
/// assert!(config.validate().is_ok());
///
/// let json = r#"{
///     "table_name": "places",
///     "hash_key_length": 6,
///     "range_key_attribute_name": "contentId",
///     "fan_out": { "max_concurrency": 4, "policy": "best_effort" }
/// }"#;
/// let config = GeoConfig::from_json(json).unwrap();
/// assert_eq!(config.fan_out.max_concurrency, 4);
/// ```
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct GeoConfig {
    pub table_name: String,

    #[serde(default = "GeoConfig::default_hash_key_attribute_name")]
    pub hash_key_attribute_name: String,

    #[serde(default = "GeoConfig::default_range_key_attribute_name")]
    pub range_key_attribute_name: String,

    #[serde(default = "GeoConfig::default_geohash_attribute_name")]
    pub geohash_attribute_name: String,

    #[serde(default = "GeoConfig::default_geojson_attribute_name")]
    pub geojson_attribute_name: String,

    /// Secondary index keyed by partition key + geohash.
    #[serde(default = "GeoConfig::default_geohash_index_name")]
    pub geohash_index_name: String,

    /// Leading geohash digits used as the partition key (1-19).
    #[serde(default = "GeoConfig::default_hash_key_length")]
    pub hash_key_length: u8,

    /// Ancestor cell level for the coarse index. Zero disables it.
    #[serde(default)]
    pub parent_level: u8,

    #[serde(default = "GeoConfig::default_hash_key_length")]
    pub parent_hash_key_length: u8,

    #[serde(default = "GeoConfig::default_parent_geohash_attribute_name")]
    pub parent_geohash_attribute_name: String,

    #[serde(default = "GeoConfig::default_parent_hash_key_attribute_name")]
    pub parent_hash_key_attribute_name: String,

    #[serde(default = "GeoConfig::default_parent_geojson_attribute_name")]
    pub parent_geojson_attribute_name: String,

    /// Store GeoJSON coordinates as `[lng, lat]` (standard) instead of `[lat, lng]`.
    #[serde(default = "GeoConfig::default_longitude_first")]
    pub longitude_first: bool,

    /// GeoJSON `type` written for points. Legacy tables use `"POINT"`.
    #[serde(default = "GeoConfig::default_geojson_point_type")]
    pub geojson_point_type: String,

    #[serde(default)]
    pub consistency: ReadConsistency,

    #[serde(default)]
    pub covering: CoveringConfig,

    #[serde(default)]
    pub fan_out: FanOutConfig,

    #[serde(default = "GeoConfig::default_batch_write_limit")]
    pub batch_write_limit: usize,
}

impl GeoConfig {
    fn default_hash_key_attribute_name() -> String {
        "hashKey".to_string()
    }

    fn default_range_key_attribute_name() -> String {
        "rangeKey".to_string()
    }

    fn default_geohash_attribute_name() -> String {
        "geohash".to_string()
    }

    fn default_geojson_attribute_name() -> String {
        "geoJson".to_string()
    }

    fn default_geohash_index_name() -> String {
        "geohash-index".to_string()
    }

    fn default_parent_geohash_attribute_name() -> String {
        "parentGeohash".to_string()
    }

    fn default_parent_hash_key_attribute_name() -> String {
        "parentHashKey".to_string()
    }

    fn default_parent_geojson_attribute_name() -> String {
        "parentGeoJson".to_string()
    }

    const fn default_hash_key_length() -> u8 {
        2
    }

    const fn default_longitude_first() -> bool {
        true
    }

    fn default_geojson_point_type() -> String {
        DEFAULT_POINT_TYPE.to_string()
    }

    const fn default_batch_write_limit() -> usize {
        MAX_BATCH_WRITE_ITEMS
    }

    /// Default configuration for the given table.
    pub fn new(table_name: impl Into<String>) -> Self {
        Self {
            table_name: table_name.into(),
            hash_key_attribute_name: Self::default_hash_key_attribute_name(),
            range_key_attribute_name: Self::default_range_key_attribute_name(),
            geohash_attribute_name: Self::default_geohash_attribute_name(),
            geojson_attribute_name: Self::default_geojson_attribute_name(),
            geohash_index_name: Self::default_geohash_index_name(),
            hash_key_length: Self::default_hash_key_length(),
            parent_level: 0,
            parent_hash_key_length: Self::default_hash_key_length(),
            parent_geohash_attribute_name: Self::default_parent_geohash_attribute_name(),
            parent_hash_key_attribute_name: Self::default_parent_hash_key_attribute_name(),
            parent_geojson_attribute_name: Self::default_parent_geojson_attribute_name(),
            longitude_first: Self::default_longitude_first(),
            geojson_point_type: Self::default_geojson_point_type(),
            consistency: ReadConsistency::default(),
            covering: CoveringConfig::default(),
            fan_out: FanOutConfig::default(),
            batch_write_limit: Self::default_batch_write_limit(),
        }
    }

    pub fn with_hash_key_length(mut self, length: u8) -> Self {
        self.hash_key_length = length;
        self
    }

    /// Enable the coarse parent-cell index at `level`.
    pub fn with_parent_level(mut self, level: u8, parent_hash_key_length: u8) -> Self {
        self.parent_level = level;
        self.parent_hash_key_length = parent_hash_key_length;
        self
    }

    pub fn with_range_key_attribute_name(mut self, name: impl Into<String>) -> Self {
        self.range_key_attribute_name = name.into();
        self
    }

    pub fn with_geohash_attribute_name(mut self, name: impl Into<String>) -> Self {
        self.geohash_attribute_name = name.into();
        self
    }

    pub fn with_geohash_index_name(mut self, name: impl Into<String>) -> Self {
        self.geohash_index_name = name.into();
        self
    }

    pub fn with_longitude_first(mut self, longitude_first: bool) -> Self {
        self.longitude_first = longitude_first;
        self
    }

    pub fn with_geojson_point_type(mut self, point_type: impl Into<String>) -> Self {
        self.geojson_point_type = point_type.into();
        self
    }

    pub fn with_consistency(mut self, consistency: ReadConsistency) -> Self {
        self.consistency = consistency;
        self
    }

    pub fn with_covering(mut self, covering: CoveringConfig) -> Self {
        self.covering = covering;
        self
    }

    pub fn with_max_concurrency(mut self, max_concurrency: usize) -> Self {
        self.fan_out.max_concurrency = max_concurrency;
        self
    }

    pub fn with_fan_out_policy(mut self, policy: FanOutPolicy) -> Self {
        self.fan_out.policy = policy;
        self
    }

    pub fn with_batch_write_limit(mut self, limit: usize) -> Self {
        self.batch_write_limit = limit;
        self
    }

    pub fn parent_index_enabled(&self) -> bool {
        self.parent_level > 0
    }

    /// Attributes the write path derives from the point. Callers may not update these.
    pub fn derived_attribute_names(&self) -> Vec<&str> {
        let mut names = vec![
            self.hash_key_attribute_name.as_str(),
            self.range_key_attribute_name.as_str(),
            self.geohash_attribute_name.as_str(),
            self.geojson_attribute_name.as_str(),
        ];
        if self.parent_index_enabled() {
            names.push(self.parent_geohash_attribute_name.as_str());
            names.push(self.parent_hash_key_attribute_name.as_str());
            names.push(self.parent_geojson_attribute_name.as_str());
        }
        names
    }

    pub fn validate(&self) -> Result<()> {
        if self.table_name.trim().is_empty() {
            return Err(GeoError::InvalidConfig(
                "Table name must not be empty".to_string(),
            ));
        }

        validate_hash_key_length(self.hash_key_length)
            .map_err(|e| GeoError::InvalidConfig(format!("hash_key_length: {}", e)))?;

        if self.parent_index_enabled() {
            validate_parent_level(self.parent_level)
                .map_err(|e| GeoError::InvalidConfig(format!("parent_level: {}", e)))?;
            validate_hash_key_length(self.parent_hash_key_length)
                .map_err(|e| GeoError::InvalidConfig(format!("parent_hash_key_length: {}", e)))?;
        }

        let names = self.derived_attribute_names();
        for (idx, name) in names.iter().enumerate() {
            if name.is_empty() {
                return Err(GeoError::InvalidConfig(
                    "Attribute names must not be empty".to_string(),
                ));
            }
            if names[..idx].contains(name) {
                return Err(GeoError::InvalidConfig(format!(
                    "Attribute name '{}' is used for more than one derived attribute",
                    name
                )));
            }
        }

        if self.geojson_point_type.trim().is_empty() {
            return Err(GeoError::InvalidConfig(
                "GeoJSON point type must not be empty".to_string(),
            ));
        }

        if self.geohash_index_name.is_empty() {
            return Err(GeoError::InvalidConfig(
                "Geohash index name must not be empty".to_string(),
            ));
        }

        self.covering.validate()?;

        if self.fan_out.max_concurrency == 0 {
            return Err(GeoError::InvalidConfig(
                "Fan-out max_concurrency must be greater than zero".to_string(),
            ));
        }

        if !(1..=MAX_BATCH_WRITE_ITEMS).contains(&self.batch_write_limit) {
            return Err(GeoError::InvalidConfig(format!(
                "Batch write limit must be between 1 and {}, got {}",
                MAX_BATCH_WRITE_ITEMS, self.batch_write_limit
            )));
        }

        Ok(())
    }

    pub fn from_json(json: &str) -> std::result::Result<Self, serde_json::Error> {
        let config: GeoConfig = serde_json::from_str(json)?;
        if let Err(e) = config.validate() {
            return Err(serde_json::Error::custom(e));
        }
        Ok(config)
    }

    pub fn to_json(&self) -> std::result::Result<String, serde_json::Error> {
        serde_json::to_string_pretty(self)
    }

    #[cfg(feature = "toml")]
    pub fn from_toml(toml_str: &str) -> std::result::Result<Self, toml::de::Error> {
        let config: GeoConfig = toml::from_str(toml_str)?;
        if let Err(e) = config.validate() {
            return Err(toml::de::Error::custom(e));
        }
        Ok(config)
    }

    #[cfg(feature = "toml")]
    pub fn to_toml(&self) -> std::result::Result<String, toml::ser::Error> {
        toml::to_string_pretty(self)
    }
}
