//! Write path: put, batch put, update and delete.

use super::GeoDB;
use crate::error::{GeoError, Result};
use crate::store::{
    BatchWriteOutput, BatchWriteRequest, DeleteItemRequest, PutItemRequest, UpdateItemRequest,
};
use crate::types::{DeletePointInput, GeoPoint, Item, PutPointInput, UpdatePointInput};
use serde_json::Value;

impl GeoDB {
    /// Stores a point with its caller attributes and returns the written item.
    ///
    /// Derived attributes overwrite caller attributes of the same name, so
    /// writing the same input twice stores identical items.
    pub async fn put_point(&self, input: PutPointInput) -> Result<Item> {
        let PutPointInput {
            point,
            range_key,
            item,
            composite_values,
            condition,
        } = input;
        let item = self.build_item(&point, range_key, item, &composite_values)?;

        self.store
            .put_item(PutItemRequest {
                table_name: self.config.table_name.clone(),
                item: item.clone(),
                condition,
            })
            .await?;
        Ok(item)
    }

    /// Stores many points in store-sized batches.
    ///
    /// Every input is validated before the first batch is sent. Items the
    /// store leaves unprocessed are returned for the caller to retry; they
    /// are never retried here. An error from a later batch leaves earlier
    /// batches written.
    pub async fn batch_write_points(&self, inputs: Vec<PutPointInput>) -> Result<BatchWriteOutput> {
        let mut items = Vec::with_capacity(inputs.len());
        for (idx, input) in inputs.into_iter().enumerate() {
            if input.condition.is_some() {
                return Err(GeoError::InvalidInput(format!(
                    "Batch input at index {} has a condition; batch writes are unconditional",
                    idx
                )));
            }
            items.push(self.build_item(
                &input.point,
                input.range_key,
                input.item,
                &input.composite_values,
            )?);
        }

        let mut output = BatchWriteOutput::default();
        let limit = self.config.batch_write_limit;
        let mut batches = 0usize;
        while !items.is_empty() {
            let rest = items.split_off(limit.min(items.len()));
            let batch = std::mem::replace(&mut items, rest);
            batches += 1;

            let result = self
                .store
                .batch_write_items(BatchWriteRequest {
                    table_name: self.config.table_name.clone(),
                    items: batch,
                })
                .await?;
            output.unprocessed.extend(result.unprocessed);
        }

        if !output.unprocessed.is_empty() {
            log::warn!(
                "Batch write of {} batches left {} items unprocessed",
                batches,
                output.unprocessed.len()
            );
        }
        Ok(output)
    }

    /// Applies attribute updates to a stored point and returns the updated item.
    ///
    /// Updates to derived attributes are dropped: the geohash, geometry,
    /// key and parent-cell attributes are fixed once written.
    pub async fn update_point(&self, input: UpdatePointInput) -> Result<Item> {
        let UpdatePointInput {
            point,
            range_key,
            composite_values,
            mut updates,
            condition,
        } = input;
        let key = self.item_key(&point, range_key, &composite_values)?;

        for name in self.config.derived_attribute_names() {
            if updates.remove(name).is_some() {
                log::debug!("Stripped update of derived attribute '{}'", name);
            }
        }

        self.store
            .update_item(UpdateItemRequest {
                table_name: self.config.table_name.clone(),
                key,
                updates,
                condition,
            })
            .await
    }

    /// Deletes a stored point, returning the removed item if one existed.
    pub async fn delete_point(&self, input: DeletePointInput) -> Result<Option<Item>> {
        let key = self.item_key(&input.point, input.range_key, &input.composite_values)?;
        self.store
            .delete_item(DeleteItemRequest {
                table_name: self.config.table_name.clone(),
                key,
                condition: input.condition,
            })
            .await
    }

    fn build_item(
        &self,
        point: &GeoPoint,
        range_key: Value,
        mut item: Item,
        composite_values: &[String],
    ) -> Result<Item> {
        let derived = self.derived_attributes(point, composite_values)?;
        item.insert(self.config.range_key_attribute_name.clone(), range_key);
        item.extend(derived);
        Ok(item)
    }
}
