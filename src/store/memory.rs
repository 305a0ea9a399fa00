//! In-memory store backend.
//!
//! Tables are created on first write. Each partition keeps its items ordered
//! by range key, and geohash index queries sort the partition's items by
//! geohash. Paging mirrors a hosted store: `limit` caps the items examined
//! per page before the filter runs, so a page may come back empty while a
//! continuation key is still present.

use super::{
    AttributeUpdate, BatchWriteOutput, BatchWriteRequest, DeleteItemRequest, Filter, GeoStore,
    GetItemRequest, ItemKey, PutItemRequest, QueryPage, RangeQuery, UpdateItemRequest,
};
use crate::config::{GeoConfig, MAX_BATCH_WRITE_ITEMS};
use crate::error::{GeoError, Result};
use crate::types::Item;
use async_trait::async_trait;
use parking_lot::RwLock;
use rustc_hash::FxHashMap;
use serde_json::Value;
use std::cmp::Ordering;
use std::collections::BTreeMap;
use std::sync::atomic::{AtomicU64, Ordering as AtomicOrdering};

/// Default cap on items examined per query page.
pub const DEFAULT_PAGE_LIMIT: usize = 100;

/// Names of the primary key attributes.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct KeySchema {
    pub hash_key_attribute_name: String,
    pub range_key_attribute_name: String,
}

impl KeySchema {
    pub fn new(hash_key: impl Into<String>, range_key: impl Into<String>) -> Self {
        Self {
            hash_key_attribute_name: hash_key.into(),
            range_key_attribute_name: range_key.into(),
        }
    }
}

impl From<&GeoConfig> for KeySchema {
    fn from(config: &GeoConfig) -> Self {
        Self::new(
            config.hash_key_attribute_name.clone(),
            config.range_key_attribute_name.clone(),
        )
    }
}

/// Point-in-time counters for a [`MemoryStore`].
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct StoreStats {
    pub item_count: usize,
    pub reads: u64,
    pub writes: u64,
    pub queries: u64,
    pub unprocessed: u64,
}

#[derive(Default)]
struct Counters {
    reads: AtomicU64,
    writes: AtomicU64,
    queries: AtomicU64,
    unprocessed: AtomicU64,
}

/// Items of one partition, ordered by encoded range key.
type Partition = BTreeMap<String, Item>;

#[derive(Default)]
struct Table {
    partitions: FxHashMap<String, Partition>,
}

impl Table {
    fn get(&self, hash_key: &str, range_token: &str) -> Option<&Item> {
        self.partitions.get(hash_key)?.get(range_token)
    }

    fn insert(&mut self, hash_key: String, range_token: String, item: Item) -> Option<Item> {
        self.partitions
            .entry(hash_key)
            .or_default()
            .insert(range_token, item)
    }

    fn remove(&mut self, hash_key: &str, range_token: &str) -> Option<Item> {
        let partition = self.partitions.get_mut(hash_key)?;
        let removed = partition.remove(range_token);
        if partition.is_empty() {
            self.partitions.remove(hash_key);
        }
        removed
    }

    fn len(&self) -> usize {
        self.partitions.values().map(BTreeMap::len).sum()
    }
}

/// In-memory [`GeoStore`](super::GeoStore).
pub struct MemoryStore {
    schema: KeySchema,
    tables: RwLock<FxHashMap<String, Table>>,
    page_limit: usize,
    batch_capacity: Option<usize>,
    counters: Counters,
}

impl MemoryStore {
    pub fn new(schema: KeySchema) -> Self {
        Self {
            schema,
            tables: RwLock::new(FxHashMap::default()),
            page_limit: DEFAULT_PAGE_LIMIT,
            batch_capacity: None,
            counters: Counters::default(),
        }
    }

    /// Store keyed the way `config` writes items.
    pub fn for_config(config: &GeoConfig) -> Self {
        Self::new(KeySchema::from(config))
    }

    /// Cap on items examined per query page when the request sets no limit.
    pub fn with_page_limit(mut self, limit: usize) -> Self {
        self.page_limit = limit.max(1);
        self
    }

    /// Write at most `capacity` items per batch and report the rest as unprocessed.
    pub fn with_batch_capacity(mut self, capacity: usize) -> Self {
        self.batch_capacity = Some(capacity);
        self
    }

    pub fn schema(&self) -> &KeySchema {
        &self.schema
    }

    pub fn len(&self, table_name: &str) -> usize {
        self.tables.read().get(table_name).map_or(0, Table::len)
    }

    pub fn is_empty(&self, table_name: &str) -> bool {
        self.len(table_name) == 0
    }

    /// Every item of a table, for inspection in tests and tooling.
    pub fn scan(&self, table_name: &str) -> Vec<Item> {
        self.tables.read().get(table_name).map_or_else(Vec::new, |table| {
            table
                .partitions
                .values()
                .flat_map(|partition| partition.values().cloned())
                .collect()
        })
    }

    pub fn stats(&self) -> StoreStats {
        let item_count = self.tables.read().values().map(Table::len).sum();
        StoreStats {
            item_count,
            reads: self.counters.reads.load(AtomicOrdering::Relaxed),
            writes: self.counters.writes.load(AtomicOrdering::Relaxed),
            queries: self.counters.queries.load(AtomicOrdering::Relaxed),
            unprocessed: self.counters.unprocessed.load(AtomicOrdering::Relaxed),
        }
    }

    fn item_key(&self, item: &Item) -> Result<(String, String)> {
        let hash_key = item
            .get(&self.schema.hash_key_attribute_name)
            .ok_or_else(|| {
                GeoError::MalformedRequest(format!(
                    "Item is missing hash key attribute '{}'",
                    self.schema.hash_key_attribute_name
                ))
            })
            .and_then(hash_key_token)?;
        let range_key = item
            .get(&self.schema.range_key_attribute_name)
            .ok_or_else(|| {
                GeoError::MalformedRequest(format!(
                    "Item is missing range key attribute '{}'",
                    self.schema.range_key_attribute_name
                ))
            })?;
        Ok((hash_key, range_key_token(range_key)))
    }

    fn key_item(&self, key: &ItemKey) -> Item {
        let mut item = Item::new();
        item.insert(
            self.schema.hash_key_attribute_name.clone(),
            Value::String(key.hash_key.clone()),
        );
        item.insert(
            self.schema.range_key_attribute_name.clone(),
            key.range_key.clone(),
        );
        item
    }
}

fn hash_key_token(value: &Value) -> Result<String> {
    match value {
        Value::String(s) => Ok(s.clone()),
        Value::Number(n) => Ok(n.to_string()),
        other => Err(GeoError::MalformedRequest(format!(
            "Hash key must be a string or number, got: {}",
            other
        ))),
    }
}

/// Range keys are compared by their JSON encoding so that `"1"` and `1` differ.
fn range_key_token(value: &Value) -> String {
    value.to_string()
}

fn check_condition(condition: Option<&Filter>, existing: Option<&Item>) -> Result<()> {
    let Some(condition) = condition else {
        return Ok(());
    };
    let empty = Item::new();
    if condition.matches(existing.unwrap_or(&empty)) {
        Ok(())
    } else {
        Err(GeoError::ConditionalCheckFailed(format!(
            "Condition {:?} not satisfied",
            condition
        )))
    }
}

#[async_trait]
impl GeoStore for MemoryStore {
    async fn get_item(&self, request: GetItemRequest) -> Result<Option<Item>> {
        self.counters.reads.fetch_add(1, AtomicOrdering::Relaxed);
        let tables = self.tables.read();
        let range_token = range_key_token(&request.key.range_key);
        Ok(tables
            .get(&request.table_name)
            .and_then(|table| table.get(&request.key.hash_key, &range_token))
            .cloned())
    }

    async fn put_item(&self, request: PutItemRequest) -> Result<()> {
        let (hash_key, range_token) = self.item_key(&request.item)?;
        let mut tables = self.tables.write();
        let table = tables.entry(request.table_name).or_default();

        check_condition(
            request.condition.as_ref(),
            table.get(&hash_key, &range_token),
        )?;
        table.insert(hash_key, range_token, request.item);
        self.counters.writes.fetch_add(1, AtomicOrdering::Relaxed);
        Ok(())
    }

    async fn update_item(&self, request: UpdateItemRequest) -> Result<Item> {
        let range_token = range_key_token(&request.key.range_key);
        let mut tables = self.tables.write();
        let table = tables.entry(request.table_name).or_default();

        let existing = table.get(&request.key.hash_key, &range_token);
        check_condition(request.condition.as_ref(), existing)?;

        let mut item = existing
            .cloned()
            .unwrap_or_else(|| self.key_item(&request.key));
        for (name, update) in request.updates {
            if name == self.schema.hash_key_attribute_name
                || name == self.schema.range_key_attribute_name
            {
                return Err(GeoError::MalformedRequest(format!(
                    "Cannot update key attribute '{}'",
                    name
                )));
            }
            match update {
                AttributeUpdate::Put(value) => {
                    item.insert(name, value);
                }
                AttributeUpdate::Delete => {
                    item.remove(&name);
                }
            }
        }

        table.insert(request.key.hash_key, range_token, item.clone());
        self.counters.writes.fetch_add(1, AtomicOrdering::Relaxed);
        Ok(item)
    }

    async fn delete_item(&self, request: DeleteItemRequest) -> Result<Option<Item>> {
        let range_token = range_key_token(&request.key.range_key);
        let mut tables = self.tables.write();
        let Some(table) = tables.get_mut(&request.table_name) else {
            check_condition(request.condition.as_ref(), None)?;
            return Ok(None);
        };

        check_condition(
            request.condition.as_ref(),
            table.get(&request.key.hash_key, &range_token),
        )?;
        let removed = table.remove(&request.key.hash_key, &range_token);
        self.counters.writes.fetch_add(1, AtomicOrdering::Relaxed);
        Ok(removed)
    }

    async fn batch_write_items(&self, request: BatchWriteRequest) -> Result<BatchWriteOutput> {
        if request.items.is_empty() || request.items.len() > MAX_BATCH_WRITE_ITEMS {
            return Err(GeoError::MalformedRequest(format!(
                "Batch must contain between 1 and {} items, got {}",
                MAX_BATCH_WRITE_ITEMS,
                request.items.len()
            )));
        }

        let keys = request
            .items
            .iter()
            .map(|item| self.item_key(item))
            .collect::<Result<Vec<_>>>()?;

        let capacity = self.batch_capacity.unwrap_or(usize::MAX);
        let mut unprocessed = Vec::new();
        let mut tables = self.tables.write();
        let table = tables.entry(request.table_name).or_default();

        for (idx, ((hash_key, range_token), item)) in keys.into_iter().zip(request.items).enumerate()
        {
            if idx < capacity {
                table.insert(hash_key, range_token, item);
                self.counters.writes.fetch_add(1, AtomicOrdering::Relaxed);
            } else {
                unprocessed.push(item);
            }
        }

        if !unprocessed.is_empty() {
            self.counters
                .unprocessed
                .fetch_add(unprocessed.len() as u64, AtomicOrdering::Relaxed);
            log::debug!("Batch write left {} items unprocessed", unprocessed.len());
        }
        Ok(BatchWriteOutput { unprocessed })
    }

    async fn query(&self, request: RangeQuery) -> Result<QueryPage> {
        self.counters.queries.fetch_add(1, AtomicOrdering::Relaxed);
        if request.hash_key_attribute_name != self.schema.hash_key_attribute_name {
            return Err(GeoError::MalformedRequest(format!(
                "Index '{}' is not keyed by '{}'",
                request.index_name, request.hash_key_attribute_name
            )));
        }

        let geohash_attr = request.geohash_attribute_name.as_str();
        let range = request.range;

        let mut candidates: Vec<(u64, String, Item)> = {
            let tables = self.tables.read();
            let Some(partition) = tables
                .get(&request.table_name)
                .and_then(|table| table.partitions.get(&request.partition_key))
            else {
                return Ok(QueryPage::default());
            };

            partition
                .iter()
                .filter_map(|(range_token, item)| {
                    let geohash = item.get(geohash_attr)?.as_u64()?;
                    range
                        .contains(geohash)
                        .then(|| (geohash, range_token.clone(), item.clone()))
                })
                .collect()
        };
        candidates.sort_by(|a, b| a.0.cmp(&b.0).then_with(|| a.1.cmp(&b.1)));

        let start = match &request.exclusive_start_key {
            Some(start_key) => {
                let geohash = start_key
                    .get(geohash_attr)
                    .and_then(Value::as_u64)
                    .ok_or_else(|| {
                        GeoError::MalformedRequest(
                            "Continuation key is missing the geohash attribute".to_string(),
                        )
                    })?;
                let range_token = start_key
                    .get(&self.schema.range_key_attribute_name)
                    .map(range_key_token)
                    .ok_or_else(|| {
                        GeoError::MalformedRequest(
                            "Continuation key is missing the range key attribute".to_string(),
                        )
                    })?;
                candidates.partition_point(|(g, t, _)| {
                    g.cmp(&geohash).then_with(|| t.cmp(&range_token)) != Ordering::Greater
                })
            }
            None => 0,
        };

        let limit = request.limit.unwrap_or(self.page_limit).max(1);
        let end = start.saturating_add(limit).min(candidates.len());
        let has_more = end < candidates.len();

        let examined = candidates.drain(start..end).map(|(_, _, item)| item);
        let mut items = Vec::with_capacity(end - start);
        let mut last_examined = None;
        for item in examined {
            if has_more {
                last_examined = Some(item.clone());
            }
            if request.filter.as_ref().is_none_or(|f| f.matches(&item)) {
                items.push(item);
            }
        }

        let last_evaluated_key = last_examined.map(|item| {
            [
                self.schema.hash_key_attribute_name.as_str(),
                self.schema.range_key_attribute_name.as_str(),
                geohash_attr,
            ]
            .into_iter()
            .filter_map(|name| item.get(name).map(|v| (name.to_string(), v.clone())))
            .collect::<Item>()
        });

        Ok(QueryPage {
            items,
            last_evaluated_key,
        })
    }
}
