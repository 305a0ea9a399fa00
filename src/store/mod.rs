//! Backing store abstraction.
//!
//! The geo index only needs a handful of primitives from a partition/range
//! keyed store: single-item get/put/update/delete, batch puts, and a paginated
//! range query against a secondary index keyed by the geohash attribute
//! within each partition. [`GeoStore`] is that boundary. Transient failures
//! surface as [`GeoError::Throttled`](crate::GeoError::Throttled) or
//! [`GeoError::Unavailable`](crate::GeoError::Unavailable) and are retried by
//! [`RetryingStore`].

use crate::compute::range::GeohashRange;
use crate::error::Result;
use crate::types::Item;
use async_trait::async_trait;
use serde_json::Value;
use std::collections::BTreeMap;
use std::sync::Arc;

mod filter;
mod memory;
mod retry;

pub use filter::Filter;
pub use memory::{KeySchema, MemoryStore, StoreStats};
pub use retry::RetryingStore;

/// Primary key of a stored item.
#[derive(Debug, Clone, PartialEq)]
pub struct ItemKey {
    /// Partition key, possibly composite-extended.
    pub hash_key: String,
    pub range_key: Value,
}

impl ItemKey {
    pub fn new(hash_key: impl Into<String>, range_key: impl Into<Value>) -> Self {
        Self {
            hash_key: hash_key.into(),
            range_key: range_key.into(),
        }
    }
}

/// A single attribute change in an update request.
#[derive(Debug, Clone, PartialEq)]
pub enum AttributeUpdate {
    Put(Value),
    Delete,
}

#[derive(Debug, Clone)]
pub struct GetItemRequest {
    pub table_name: String,
    pub key: ItemKey,
    pub consistent_read: bool,
}

#[derive(Debug, Clone)]
pub struct PutItemRequest {
    pub table_name: String,
    pub item: Item,
    /// Evaluated against the existing item; a missing item is an empty one.
    pub condition: Option<Filter>,
}

#[derive(Debug, Clone)]
pub struct UpdateItemRequest {
    pub table_name: String,
    pub key: ItemKey,
    pub updates: BTreeMap<String, AttributeUpdate>,
    pub condition: Option<Filter>,
}

#[derive(Debug, Clone)]
pub struct DeleteItemRequest {
    pub table_name: String,
    pub key: ItemKey,
    pub condition: Option<Filter>,
}

#[derive(Debug, Clone)]
pub struct BatchWriteRequest {
    pub table_name: String,
    pub items: Vec<Item>,
}

/// Items the store accepted the batch for but did not write.
#[derive(Debug, Clone, Default)]
pub struct BatchWriteOutput {
    pub unprocessed: Vec<Item>,
}

/// One page of a geohash range query within a single partition.
///
/// The partition and geohash conditions are fields of their own; `filter`
/// holds only additional caller conditions and is applied after them.
#[derive(Debug, Clone)]
pub struct RangeQuery {
    pub table_name: String,
    pub index_name: String,
    pub hash_key_attribute_name: String,
    pub partition_key: String,
    pub geohash_attribute_name: String,
    pub range: GeohashRange,
    pub filter: Option<Filter>,
    pub consistent_read: bool,
    /// Maximum items examined for this page, before `filter` is applied.
    pub limit: Option<usize>,
    /// Continuation key from the previous page.
    pub exclusive_start_key: Option<Item>,
}

#[derive(Debug, Clone, Default)]
pub struct QueryPage {
    pub items: Vec<Item>,
    /// Present while more items may remain in the range.
    pub last_evaluated_key: Option<Item>,
}

/// Primitives the geo index requires from its backing store.
#[async_trait]
pub trait GeoStore: Send + Sync {
    async fn get_item(&self, request: GetItemRequest) -> Result<Option<Item>>;

    async fn put_item(&self, request: PutItemRequest) -> Result<()>;

    /// Applies `updates`, creating the item if it does not exist.
    async fn update_item(&self, request: UpdateItemRequest) -> Result<Item>;

    /// Returns the deleted item, if there was one.
    async fn delete_item(&self, request: DeleteItemRequest) -> Result<Option<Item>>;

    async fn batch_write_items(&self, request: BatchWriteRequest) -> Result<BatchWriteOutput>;

    async fn query(&self, request: RangeQuery) -> Result<QueryPage>;
}

#[async_trait]
impl<T: GeoStore + ?Sized> GeoStore for Arc<T> {
    async fn get_item(&self, request: GetItemRequest) -> Result<Option<Item>> {
        (**self).get_item(request).await
    }

    async fn put_item(&self, request: PutItemRequest) -> Result<()> {
        (**self).put_item(request).await
    }

    async fn update_item(&self, request: UpdateItemRequest) -> Result<Item> {
        (**self).update_item(request).await
    }

    async fn delete_item(&self, request: DeleteItemRequest) -> Result<Option<Item>> {
        (**self).delete_item(request).await
    }

    async fn batch_write_items(&self, request: BatchWriteRequest) -> Result<BatchWriteOutput> {
        (**self).batch_write_items(request).await
    }

    async fn query(&self, request: RangeQuery) -> Result<QueryPage> {
        (**self).query(request).await
    }
}
