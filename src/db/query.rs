//! Radius query orchestration.
//!
//! A radius query plans a covering, turns each covering range into one store
//! range query, runs those with bounded concurrency and drops items that fall
//! outside the true radius. Pages of one range are fetched strictly in order;
//! pages of different ranges interleave freely.

use super::GeoDB;
use crate::compute::geocoder::composite_hash_key;
use crate::compute::geojson::point_from_geojson;
use crate::compute::range::GeohashRange;
use crate::compute::validation::validate_composite_values;
use crate::config::FanOutPolicy;
use crate::error::{GeoError, Result};
use crate::store::{QueryPage, RangeQuery};
use crate::types::{GeoPoint, Item, QueryRadiusInput, QueryRadiusOutput, RadiusHit, RangeFailure};
use futures::stream::{self, Stream, StreamExt, TryStreamExt};

impl GeoDB {
    /// All stored points within `radius_meters` of the center.
    ///
    /// Validation errors are raised before any store call. Under
    /// [`FanOutPolicy::FailFast`] the first failing range cancels the
    /// others and its error is returned; under [`FanOutPolicy::BestEffort`]
    /// failed ranges are reported in [`QueryRadiusOutput::failed_ranges`].
    ///
    /// Hits come back in no particular order.
    pub async fn query_radius(&self, input: QueryRadiusInput) -> Result<QueryRadiusOutput> {
        validate_composite_values(&input.composite_values)?;
        if input.options.page_size == Some(0) {
            return Err(GeoError::InvalidInput(
                "Page size must be greater than zero".to_string(),
            ));
        }

        let covering = self.covering_for(&input.center, input.radius_meters)?;
        let queries = covering
            .iter()
            .map(|range| self.compose_range_query(range, &input))
            .collect::<Result<Vec<_>>>()?;
        let ranges_queried = queries.len();

        let policy = input.options.policy.unwrap_or(self.config.fan_out.policy);
        let concurrency = self.config.fan_out.max_concurrency;
        log::debug!(
            "Radius query of {}m over {} ranges in {} partitions ({:?}, concurrency {})",
            input.radius_meters,
            ranges_queried,
            covering.partition_count(),
            policy,
            concurrency
        );

        let (raw_items, failed_ranges) = match policy {
            FanOutPolicy::FailFast => {
                let batches: Vec<Vec<Item>> = stream::iter(queries)
                    .map(|query| self.collect_range(query))
                    .buffer_unordered(concurrency)
                    .try_collect()
                    .await
                    .inspect_err(|e| log::debug!("Radius query aborted: {}", e))?;
                (batches, Vec::new())
            }
            FanOutPolicy::BestEffort => {
                let outcomes: Vec<(String, GeohashRange, Result<Vec<Item>>)> =
                    stream::iter(queries)
                        .map(|query| async move {
                            let partition_key = query.partition_key.clone();
                            let range = query.range;
                            (partition_key, range, self.collect_range(query).await)
                        })
                        .buffer_unordered(concurrency)
                        .collect()
                        .await;

                let mut batches = Vec::with_capacity(outcomes.len());
                let mut failed = Vec::new();
                for (partition_key, range, outcome) in outcomes {
                    match outcome {
                        Ok(items) => batches.push(items),
                        Err(error) => {
                            log::warn!(
                                "Range {} in partition {} failed: {}",
                                range,
                                partition_key,
                                error
                            );
                            failed.push(RangeFailure {
                                partition_key,
                                range,
                                error,
                            });
                        }
                    }
                }
                (batches, failed)
            }
        };

        let hits = self.filter_by_distance(
            raw_items.into_iter().flatten(),
            &input.center,
            input.radius_meters,
        );

        Ok(QueryRadiusOutput {
            hits,
            failed_ranges,
            ranges_queried,
        })
    }

    /// Builds the store query for one covering range.
    ///
    /// The partition key and geohash bounds always come from the covering.
    /// Caller options only fill the filter, page size and consistency slots,
    /// so no option can widen or replace the geometry conditions.
    pub(crate) fn compose_range_query(
        &self,
        range: &GeohashRange,
        input: &QueryRadiusInput,
    ) -> Result<RangeQuery> {
        let config = &self.config;
        let partition_key = composite_hash_key(
            range.hash_key(config.hash_key_length),
            &input.composite_values,
        )?;

        Ok(RangeQuery {
            table_name: config.table_name.clone(),
            index_name: config.geohash_index_name.clone(),
            hash_key_attribute_name: config.hash_key_attribute_name.clone(),
            partition_key,
            geohash_attribute_name: config.geohash_attribute_name.clone(),
            range: *range,
            filter: input.options.filter.clone(),
            consistent_read: self.consistent_read(input.options.consistency),
            limit: input.options.page_size,
            exclusive_start_key: None,
        })
    }

    /// Pages of one range, each fetched only after the previous one returned.
    fn range_pages(&self, query: RangeQuery) -> impl Stream<Item = Result<Vec<Item>>> + Send + '_ {
        stream::try_unfold(Some(query), move |next| async move {
            let Some(query) = next else {
                return Ok::<_, GeoError>(None);
            };

            let QueryPage {
                items,
                last_evaluated_key,
            } = self.store.query(query.clone()).await?;

            let next = last_evaluated_key.map(|key| {
                log::debug!(
                    "Continuing range {} in partition {}",
                    query.range,
                    query.partition_key
                );
                RangeQuery {
                    exclusive_start_key: Some(key),
                    ..query
                }
            });
            Ok(Some((items, next)))
        })
    }

    async fn collect_range(&self, query: RangeQuery) -> Result<Vec<Item>> {
        self.range_pages(query).try_concat().await
    }

    fn filter_by_distance<I>(&self, items: I, center: &GeoPoint, radius_meters: f64) -> Vec<RadiusHit>
    where
        I: IntoIterator<Item = Item>,
    {
        let geojson_attr = self.config.geojson_attribute_name.as_str();
        let mut examined = 0usize;
        let mut hits = Vec::new();

        for item in items {
            examined += 1;
            let Some(geojson) = item.get(geojson_attr).and_then(|v| v.as_str()) else {
                log::warn!(
                    "Skipping item without '{}' attribute in radius query",
                    geojson_attr
                );
                continue;
            };
            let point = match point_from_geojson(
                geojson,
                &self.config.geojson_point_type,
                self.config.longitude_first,
            ) {
                Ok(point) => point,
                Err(e) => {
                    log::warn!("Skipping item with malformed geometry: {}", e);
                    continue;
                }
            };

            let distance_meters = center.distance_to(&point);
            if distance_meters <= radius_meters {
                hits.push(RadiusHit {
                    item,
                    point,
                    distance_meters,
                });
            }
        }

        log::debug!(
            "Post-filter kept {} of {} candidate items",
            hits.len(),
            examined
        );
        hits
    }
}
