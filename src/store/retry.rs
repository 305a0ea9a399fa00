//! Bounded exponential backoff around any [`GeoStore`].
//!
//! Only throttling and transient unavailability are retried. Once attempts
//! run out the last error is wrapped in [`GeoError::RetriesExhausted`];
//! permanent errors pass through untouched on the first failure.

use super::{
    BatchWriteOutput, BatchWriteRequest, DeleteItemRequest, GeoStore, GetItemRequest,
    PutItemRequest, QueryPage, RangeQuery, UpdateItemRequest,
};
use crate::config::RetryConfig;
use crate::error::{GeoError, Result};
use crate::types::Item;
use async_trait::async_trait;
use std::future::Future;

pub struct RetryingStore<S> {
    inner: S,
    config: RetryConfig,
}

impl<S: GeoStore> RetryingStore<S> {
    pub fn new(inner: S, config: RetryConfig) -> Self {
        Self { inner, config }
    }

    pub fn inner(&self) -> &S {
        &self.inner
    }

    pub fn config(&self) -> &RetryConfig {
        &self.config
    }

    async fn with_retry<T, F, Fut>(&self, operation: &'static str, mut call: F) -> Result<T>
    where
        F: FnMut() -> Fut + Send,
        Fut: Future<Output = Result<T>> + Send,
        T: Send,
    {
        let max_attempts = self.config.max_attempts.max(1);
        let mut attempt = 1;
        loop {
            match call().await {
                Ok(value) => return Ok(value),
                Err(e) if !e.is_retryable() => return Err(e),
                Err(e) if attempt >= max_attempts => {
                    log::error!(
                        "{} failed after {} attempts: {}",
                        operation,
                        attempt,
                        e
                    );
                    return Err(GeoError::RetriesExhausted {
                        attempts: attempt,
                        last: Box::new(e),
                    });
                }
                Err(e) => {
                    let delay = self.config.backoff(attempt);
                    log::warn!(
                        "{} attempt {}/{} failed: {}, retrying in {:?}",
                        operation,
                        attempt,
                        max_attempts,
                        e,
                        delay
                    );
                    tokio::time::sleep(delay).await;
                    attempt += 1;
                }
            }
        }
    }
}

#[async_trait]
impl<S: GeoStore> GeoStore for RetryingStore<S> {
    async fn get_item(&self, request: GetItemRequest) -> Result<Option<Item>> {
        self.with_retry("get_item", || self.inner.get_item(request.clone()))
            .await
    }

    async fn put_item(&self, request: PutItemRequest) -> Result<()> {
        self.with_retry("put_item", || self.inner.put_item(request.clone()))
            .await
    }

    async fn update_item(&self, request: UpdateItemRequest) -> Result<Item> {
        self.with_retry("update_item", || self.inner.update_item(request.clone()))
            .await
    }

    async fn delete_item(&self, request: DeleteItemRequest) -> Result<Option<Item>> {
        self.with_retry("delete_item", || self.inner.delete_item(request.clone()))
            .await
    }

    async fn batch_write_items(&self, request: BatchWriteRequest) -> Result<BatchWriteOutput> {
        self.with_retry("batch_write_items", || {
            self.inner.batch_write_items(request.clone())
        })
        .await
    }

    async fn query(&self, request: RangeQuery) -> Result<QueryPage> {
        self.with_retry("query", || self.inner.query(request.clone()))
            .await
    }
}
