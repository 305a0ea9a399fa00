//! Point, item and request types shared by the write path and radius queries.
use crate::compute::range::GeohashRange;
use crate::config::{FanOutPolicy, ReadConsistency};
use crate::error::GeoError;
use crate::store::{AttributeUpdate, Filter};
use geo::{Distance, Haversine};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::cmp::Ordering;
use std::collections::BTreeMap;

/// A stored item: attribute name to JSON value.
pub type Item = serde_json::Map<String, Value>;

/// A latitude/longitude pair in degrees.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct GeoPoint {
    pub latitude: f64,
    pub longitude: f64,
}

impl GeoPoint {
    pub fn new(latitude: f64, longitude: f64) -> Self {
        Self {
            latitude,
            longitude,
        }
    }

    /// Great-circle distance in meters.
    pub fn distance_to(&self, other: &GeoPoint) -> f64 {
        Haversine.distance(geo::Point::from(*self), geo::Point::from(*other))
    }
}

impl From<GeoPoint> for geo::Point {
    fn from(point: GeoPoint) -> Self {
        geo::Point::new(point.longitude, point.latitude)
    }
}

impl From<geo::Point> for GeoPoint {
    fn from(point: geo::Point) -> Self {
        GeoPoint::new(point.y(), point.x())
    }
}

/// Ancestor cell of a point at a coarser level, with the cell's center.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct ParentCell {
    pub id: u64,
    pub center: GeoPoint,
}

/// Input for [`crate::GeoDB::put_point`].
#[derive(Debug, Clone)]
pub struct PutPointInput {
    pub point: GeoPoint,
    pub range_key: Value,
    /// Caller attributes. Derived geo attributes overwrite same-named entries.
    pub item: Item,
    pub composite_values: Vec<String>,
    /// Evaluated against the existing item, if any.
    pub condition: Option<Filter>,
}

impl PutPointInput {
    pub fn new(point: GeoPoint, range_key: impl Into<Value>) -> Self {
        Self {
            point,
            range_key: range_key.into(),
            item: Item::new(),
            composite_values: Vec::new(),
            condition: None,
        }
    }

    pub fn with_item(mut self, item: Item) -> Self {
        self.item = item;
        self
    }

    pub fn with_attribute(mut self, name: impl Into<String>, value: impl Into<Value>) -> Self {
        self.item.insert(name.into(), value.into());
        self
    }

    pub fn with_composite_values<I, S>(mut self, values: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.composite_values = values.into_iter().map(Into::into).collect();
        self
    }

    pub fn with_condition(mut self, condition: Filter) -> Self {
        self.condition = Some(condition);
        self
    }
}

/// Input for [`crate::GeoDB::get_point`].
#[derive(Debug, Clone)]
pub struct GetPointInput {
    pub point: GeoPoint,
    pub range_key: Value,
    pub composite_values: Vec<String>,
    pub consistency: Option<ReadConsistency>,
}

impl GetPointInput {
    pub fn new(point: GeoPoint, range_key: impl Into<Value>) -> Self {
        Self {
            point,
            range_key: range_key.into(),
            composite_values: Vec::new(),
            consistency: None,
        }
    }

    pub fn with_composite_values<I, S>(mut self, values: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.composite_values = values.into_iter().map(Into::into).collect();
        self
    }

    pub fn with_consistency(mut self, consistency: ReadConsistency) -> Self {
        self.consistency = Some(consistency);
        self
    }
}

/// Input for [`crate::GeoDB::update_point`].
#[derive(Debug, Clone)]
pub struct UpdatePointInput {
    pub point: GeoPoint,
    pub range_key: Value,
    pub composite_values: Vec<String>,
    pub updates: BTreeMap<String, AttributeUpdate>,
    pub condition: Option<Filter>,
}

impl UpdatePointInput {
    pub fn new(point: GeoPoint, range_key: impl Into<Value>) -> Self {
        Self {
            point,
            range_key: range_key.into(),
            composite_values: Vec::new(),
            updates: BTreeMap::new(),
            condition: None,
        }
    }

    pub fn set(mut self, name: impl Into<String>, value: impl Into<Value>) -> Self {
        self.updates
            .insert(name.into(), AttributeUpdate::Put(value.into()));
        self
    }

    pub fn remove(mut self, name: impl Into<String>) -> Self {
        self.updates.insert(name.into(), AttributeUpdate::Delete);
        self
    }

    pub fn with_composite_values<I, S>(mut self, values: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.composite_values = values.into_iter().map(Into::into).collect();
        self
    }

    pub fn with_condition(mut self, condition: Filter) -> Self {
        self.condition = Some(condition);
        self
    }
}

/// Input for [`crate::GeoDB::delete_point`].
#[derive(Debug, Clone)]
pub struct DeletePointInput {
    pub point: GeoPoint,
    pub range_key: Value,
    pub composite_values: Vec<String>,
    pub condition: Option<Filter>,
}

impl DeletePointInput {
    pub fn new(point: GeoPoint, range_key: impl Into<Value>) -> Self {
        Self {
            point,
            range_key: range_key.into(),
            composite_values: Vec::new(),
            condition: None,
        }
    }

    pub fn with_composite_values<I, S>(mut self, values: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.composite_values = values.into_iter().map(Into::into).collect();
        self
    }

    pub fn with_condition(mut self, condition: Filter) -> Self {
        self.condition = Some(condition);
        self
    }
}

/// Caller overrides for a single radius query.
///
/// None of these can alter the partition-key or geohash conditions; the
/// filter is ANDed with them.
#[derive(Debug, Clone, Default)]
pub struct QueryOptions {
    pub filter: Option<Filter>,
    /// Items examined per store page.
    pub page_size: Option<usize>,
    pub consistency: Option<ReadConsistency>,
    pub policy: Option<FanOutPolicy>,
}

impl QueryOptions {
    pub fn with_filter(mut self, filter: Filter) -> Self {
        self.filter = Some(filter);
        self
    }

    pub fn with_page_size(mut self, page_size: usize) -> Self {
        self.page_size = Some(page_size);
        self
    }

    pub fn with_consistency(mut self, consistency: ReadConsistency) -> Self {
        self.consistency = Some(consistency);
        self
    }

    pub fn with_policy(mut self, policy: FanOutPolicy) -> Self {
        self.policy = Some(policy);
        self
    }
}

/// Input for [`crate::GeoDB::query_radius`].
#[derive(Debug, Clone)]
pub struct QueryRadiusInput {
    pub center: GeoPoint,
    pub radius_meters: f64,
    pub options: QueryOptions,
    pub composite_values: Vec<String>,
}

impl QueryRadiusInput {
    pub fn new(center: GeoPoint, radius_meters: f64) -> Self {
        Self {
            center,
            radius_meters,
            options: QueryOptions::default(),
            composite_values: Vec::new(),
        }
    }

    pub fn with_options(mut self, options: QueryOptions) -> Self {
        self.options = options;
        self
    }

    pub fn with_composite_values<I, S>(mut self, values: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.composite_values = values.into_iter().map(Into::into).collect();
        self
    }
}

/// An item inside the query radius.
#[derive(Debug, Clone)]
pub struct RadiusHit {
    pub item: Item,
    pub point: GeoPoint,
    pub distance_meters: f64,
}

/// A range query that failed under [`FanOutPolicy::BestEffort`].
#[derive(Debug)]
pub struct RangeFailure {
    pub partition_key: String,
    pub range: GeohashRange,
    pub error: GeoError,
}

/// Result of a radius query. Hit order is unspecified.
#[derive(Debug, Default)]
pub struct QueryRadiusOutput {
    pub hits: Vec<RadiusHit>,
    /// Always empty under [`FanOutPolicy::FailFast`].
    pub failed_ranges: Vec<RangeFailure>,
    pub ranges_queried: usize,
}

impl QueryRadiusOutput {
    pub fn len(&self) -> usize {
        self.hits.len()
    }

    pub fn is_empty(&self) -> bool {
        self.hits.is_empty()
    }

    pub fn is_complete(&self) -> bool {
        self.failed_ranges.is_empty()
    }

    pub fn sort_by_distance(&mut self) {
        self.hits.sort_by(|a, b| {
            a.distance_meters
                .partial_cmp(&b.distance_meters)
                .unwrap_or(Ordering::Equal)
        });
    }

    pub fn items(&self) -> impl Iterator<Item = &Item> {
        self.hits.iter().map(|hit| &hit.item)
    }

    pub fn into_items(self) -> Vec<Item> {
        self.hits.into_iter().map(|hit| hit.item).collect()
    }
}
