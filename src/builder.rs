//! Builder for [`GeoDB`] instances.
//!
//! Binds a configuration to a store and optionally wraps the store in the
//! retrying adapter layer.

use crate::config::{GeoConfig, RetryConfig};
use crate::db::GeoDB;
use crate::error::{GeoError, Result};
use crate::store::{GeoStore, MemoryStore, RetryingStore};
use std::sync::Arc;

#[derive(Default)]
pub struct GeoDBBuilder {
    config: Option<GeoConfig>,
    store: Option<Arc<dyn GeoStore>>,
    retry: Option<RetryConfig>,
}

impl GeoDBBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn config(mut self, config: GeoConfig) -> Self {
        self.config = Some(config);
        self
    }

    /// Shorthand for a default configuration on `table_name`.
    pub fn table(mut self, table_name: impl Into<String>) -> Self {
        self.config = Some(GeoConfig::new(table_name));
        self
    }

    /// Backing store. Defaults to a [`MemoryStore`] keyed like the configuration.
    pub fn store(mut self, store: Arc<dyn GeoStore>) -> Self {
        self.store = Some(store);
        self
    }

    /// Retry throttled and unavailable store calls with bounded backoff.
    pub fn retry(mut self, retry: RetryConfig) -> Self {
        self.retry = Some(retry);
        self
    }

    pub fn build(self) -> Result<GeoDB> {
        let config = self.config.ok_or_else(|| {
            GeoError::InvalidConfig("A table configuration is required".to_string())
        })?;

        let store = self
            .store
            .unwrap_or_else(|| Arc::new(MemoryStore::for_config(&config)));

        let store: Arc<dyn GeoStore> = match self.retry {
            Some(retry) => {
                retry.validate()?;
                Arc::new(RetryingStore::new(store, retry))
            }
            None => store,
        };

        GeoDB::new(config, store)
    }
}
