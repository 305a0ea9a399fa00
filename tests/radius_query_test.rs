use async_trait::async_trait;
use geo::{Destination, Haversine};
use serde_json::json;
use spatio_geoindex::compute::geocoder::geohash;
use spatio_geoindex::store::{
    BatchWriteOutput, BatchWriteRequest, DeleteItemRequest, GetItemRequest, PutItemRequest,
    QueryPage, RangeQuery, UpdateItemRequest,
};
use spatio_geoindex::{
    FanOutPolicy, Filter, GeoConfig, GeoDB, GeoError, GeoPoint, GeoStore, Item, MemoryStore,
    PutPointInput, QueryOptions, QueryRadiusInput, Result,
};
use std::collections::HashSet;
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;

fn init_logging() {
    let _ = env_logger::builder().is_test(true).try_init();
}

const CAMBRIDGE: GeoPoint = GeoPoint {
    latitude: 52.22573,
    longitude: 0.149593,
};

fn capitals() -> Vec<(&'static str, GeoPoint)> {
    vec![
        ("London", GeoPoint::new(51.5074, -0.1278)),
        ("Paris", GeoPoint::new(48.8566, 2.3522)),
        ("Brussels", GeoPoint::new(50.8503, 4.3517)),
        ("Amsterdam", GeoPoint::new(52.3676, 4.9041)),
        ("Dublin", GeoPoint::new(53.3498, -6.2603)),
        ("Berlin", GeoPoint::new(52.5200, 13.4050)),
        ("Madrid", GeoPoint::new(40.4168, -3.7038)),
        ("Washington", GeoPoint::new(38.9072, -77.0369)),
        ("Canberra", GeoPoint::new(-35.2809, 149.1300)),
    ]
}

/// Towns within 30 km of Cambridge.
fn towns() -> Vec<(&'static str, GeoPoint)> {
    vec![
        ("Cambridge", CAMBRIDGE),
        ("Ely", GeoPoint::new(52.3992, 0.2636)),
        ("Newmarket", GeoPoint::new(52.2446, 0.4051)),
        ("Saffron Walden", GeoPoint::new(52.0226, 0.2397)),
        ("Histon", GeoPoint::new(52.2520, 0.1050)),
        ("Royston", GeoPoint::new(52.0483, -0.0240)),
    ]
}

fn build_db(config: GeoConfig, store: Arc<dyn GeoStore>) -> GeoDB {
    GeoDB::builder().config(config).store(store).build().unwrap()
}

async fn load(db: &GeoDB, points: &[(&'static str, GeoPoint)], composite: &[&str]) {
    let inputs = points
        .iter()
        .map(|(name, point)| {
            PutPointInput::new(*point, *name)
                .with_attribute("name", *name)
                .with_composite_values(composite.iter().copied())
        })
        .collect();
    let output = db.batch_write_points(inputs).await.unwrap();
    assert!(output.unprocessed.is_empty());
}

fn names(items: impl IntoIterator<Item = Item>) -> Vec<String> {
    let mut names: Vec<String> = items
        .into_iter()
        .map(|item| item["name"].as_str().unwrap().to_string())
        .collect();
    names.sort();
    names
}

/// Points between 100 and 150 km from Cambridge whose geohash still falls
/// inside the 100 km covering, so only the distance filter can drop them.
fn covered_outliers(db: &GeoDB) -> Vec<(&'static str, GeoPoint)> {
    const NAMES: [&str; 4] = ["outlier-0", "outlier-1", "outlier-2", "outlier-3"];
    let covering = db.covering_for(&CAMBRIDGE, 100_000.0).unwrap();
    let origin: geo::Point = CAMBRIDGE.into();

    let mut outliers = Vec::new();
    for distance in [101_000.0, 110_000.0, 125_000.0, 150_000.0] {
        for step in 0..72 {
            let point = GeoPoint::from(Haversine.destination(origin, step as f64 * 5.0, distance));
            if covering.contains(geohash(&point).unwrap()) && outliers.len() < NAMES.len() {
                outliers.push((NAMES[outliers.len()], point));
            }
        }
    }
    outliers
}

#[tokio::test]
async fn test_capitals_within_100km_of_cambridge() {
    init_logging();
    let config = GeoConfig::new("capitals").with_hash_key_length(6);
    let store = Arc::new(MemoryStore::for_config(&config));
    let db = build_db(config, store);
    load(&db, &capitals(), &[]).await;

    let outliers = covered_outliers(&db);
    assert!(!outliers.is_empty());
    load(&db, &outliers, &[]).await;

    let mut output = db
        .query_radius(QueryRadiusInput::new(CAMBRIDGE, 100_000.0))
        .await
        .unwrap();

    assert!(output.is_complete());
    assert!(output.ranges_queried > 0);
    output.sort_by_distance();
    assert_eq!(output.len(), 1);

    let hit = &output.hits[0];
    assert_eq!(hit.item["name"], json!("London"));
    assert!(
        (70_000.0..90_000.0).contains(&hit.distance_meters),
        "London is {} m away",
        hit.distance_meters
    );

    // Outliers sit in scanned ranges, so only the distance filter removed them.
    let covering = db.covering_for(&CAMBRIDGE, 100_000.0).unwrap();
    for (name, point) in &outliers {
        assert!(covering.contains(geohash(point).unwrap()));
        assert!(CAMBRIDGE.distance_to(point) > 100_000.0, "{} too close", name);
        assert!(output.items().all(|item| item["name"] != json!(name)));
    }
}

#[tokio::test]
async fn test_results_match_brute_force_distance() {
    init_logging();
    let config = GeoConfig::new("capitals").with_hash_key_length(3);
    let store = Arc::new(MemoryStore::for_config(&config));
    let db = build_db(config, store);
    load(&db, &capitals(), &[]).await;

    let radius = 1_000_000.0;
    let output = db
        .query_radius(QueryRadiusInput::new(CAMBRIDGE, radius))
        .await
        .unwrap();

    let expected: Vec<String> = {
        let mut expected: Vec<String> = capitals()
            .into_iter()
            .filter(|(_, point)| CAMBRIDGE.distance_to(point) <= radius)
            .map(|(name, _)| name.to_string())
            .collect();
        expected.sort();
        expected
    };
    assert_eq!(names(output.into_items()), expected);
    assert!(expected.contains(&"Paris".to_string()));
    assert!(!expected.contains(&"Madrid".to_string()));
}

#[tokio::test]
async fn test_composite_values_scope_queries() {
    init_logging();
    let config = GeoConfig::new("tenants").with_hash_key_length(6);
    let store = Arc::new(MemoryStore::for_config(&config));
    let db = build_db(config, store);
    load(&db, &towns(), &["tenant-a"]).await;
    load(&db, &towns()[..2], &["tenant-b"]).await;

    let query = |tenant: &'static str| {
        QueryRadiusInput::new(CAMBRIDGE, 30_000.0).with_composite_values([tenant])
    };

    let a = db.query_radius(query("tenant-a")).await.unwrap();
    assert_eq!(a.len(), towns().len());
    assert!(
        a.items()
            .all(|item| item["hashKey"].as_str().unwrap().ends_with("_tenant-a"))
    );

    let b = db.query_radius(query("tenant-b")).await.unwrap();
    assert_eq!(names(b.into_items()), vec!["Cambridge", "Ely"]);

    let none = db
        .query_radius(QueryRadiusInput::new(CAMBRIDGE, 30_000.0))
        .await
        .unwrap();
    assert!(none.is_empty());
}

#[tokio::test]
async fn test_caller_filter_is_anded_with_geometry() {
    init_logging();
    let config = GeoConfig::new("places").with_hash_key_length(6);
    let store = Arc::new(MemoryStore::for_config(&config));
    let db = build_db(config, store);

    let places = [
        ("cafe-near", CAMBRIDGE, "cafe"),
        ("bar-near", GeoPoint::new(52.2060, 0.1210), "bar"),
        ("cafe-far", GeoPoint::new(51.5074, -0.1278), "cafe"),
    ];
    for (name, point, kind) in places {
        db.put_point(
            PutPointInput::new(point, name)
                .with_attribute("name", name)
                .with_attribute("kind", kind),
        )
        .await
        .unwrap();
    }

    let cafes = db
        .query_radius(
            QueryRadiusInput::new(CAMBRIDGE, 10_000.0)
                .with_options(QueryOptions::default().with_filter(Filter::eq("kind", "cafe"))),
        )
        .await
        .unwrap();
    assert_eq!(names(cafes.into_items()), vec!["cafe-near"]);

    // A filter on the geohash attribute narrows, it never widens.
    let everything = db
        .query_radius(
            QueryRadiusInput::new(CAMBRIDGE, 10_000.0).with_options(
                QueryOptions::default().with_filter(Filter::between("geohash", 0u64, u64::MAX)),
            ),
        )
        .await
        .unwrap();
    assert_eq!(names(everything.into_items()), vec!["bar-near", "cafe-near"]);
}

#[tokio::test]
async fn test_small_pages_return_every_item() {
    init_logging();
    let config = GeoConfig::new("dense").with_hash_key_length(4);
    let store = Arc::new(MemoryStore::for_config(&config));
    let db = build_db(config, store.clone());

    let inputs: Vec<PutPointInput> = (0..40)
        .map(|i| {
            let point = GeoPoint::new(
                CAMBRIDGE.latitude + (i % 8) as f64 * 0.0005,
                CAMBRIDGE.longitude + (i / 8) as f64 * 0.0005,
            );
            PutPointInput::new(point, format!("p{}", i)).with_attribute("name", format!("p{}", i))
        })
        .collect();
    db.batch_write_points(inputs).await.unwrap();

    let queries_before = store.stats().queries;
    let output = db
        .query_radius(
            QueryRadiusInput::new(CAMBRIDGE, 2_000.0)
                .with_options(QueryOptions::default().with_page_size(3)),
        )
        .await
        .unwrap();

    assert_eq!(output.len(), 40);
    let pages = store.stats().queries - queries_before;
    assert!(pages as usize >= 40 / 3, "only {} pages", pages);
}

/// Counts concurrent store queries and flags overlapping pages of one range.
struct TrackingStore {
    inner: Arc<MemoryStore>,
    in_flight: AtomicUsize,
    max_in_flight: AtomicUsize,
    active_ranges: parking_lot::Mutex<HashSet<String>>,
    overlapping_pages: AtomicUsize,
}

impl TrackingStore {
    fn new(inner: Arc<MemoryStore>) -> Self {
        Self {
            inner,
            in_flight: AtomicUsize::new(0),
            max_in_flight: AtomicUsize::new(0),
            active_ranges: parking_lot::Mutex::new(HashSet::new()),
            overlapping_pages: AtomicUsize::new(0),
        }
    }
}

#[async_trait]
impl GeoStore for TrackingStore {
    async fn get_item(&self, request: GetItemRequest) -> Result<Option<Item>> {
        self.inner.get_item(request).await
    }

    async fn put_item(&self, request: PutItemRequest) -> Result<()> {
        self.inner.put_item(request).await
    }

    async fn update_item(&self, request: UpdateItemRequest) -> Result<Item> {
        self.inner.update_item(request).await
    }

    async fn delete_item(&self, request: DeleteItemRequest) -> Result<Option<Item>> {
        self.inner.delete_item(request).await
    }

    async fn batch_write_items(&self, request: BatchWriteRequest) -> Result<BatchWriteOutput> {
        self.inner.batch_write_items(request).await
    }

    async fn query(&self, request: RangeQuery) -> Result<QueryPage> {
        let range_id = format!("{}:{}", request.partition_key, request.range);
        if !self.active_ranges.lock().insert(range_id.clone()) {
            self.overlapping_pages.fetch_add(1, Ordering::SeqCst);
        }
        let now = self.in_flight.fetch_add(1, Ordering::SeqCst) + 1;
        self.max_in_flight.fetch_max(now, Ordering::SeqCst);

        tokio::time::sleep(Duration::from_millis(2)).await;
        let result = self.inner.query(request).await;

        self.in_flight.fetch_sub(1, Ordering::SeqCst);
        self.active_ranges.lock().remove(&range_id);
        result
    }
}

#[tokio::test]
async fn test_fan_out_respects_max_concurrency() {
    init_logging();
    let config = GeoConfig::new("towns")
        .with_hash_key_length(7)
        .with_max_concurrency(3);
    let memory = Arc::new(MemoryStore::for_config(&config));
    let tracking = Arc::new(TrackingStore::new(memory));
    let db = build_db(config, tracking.clone());
    load(&db, &towns(), &[]).await;

    let output = db
        .query_radius(
            QueryRadiusInput::new(CAMBRIDGE, 30_000.0)
                .with_options(QueryOptions::default().with_page_size(1)),
        )
        .await
        .unwrap();

    assert_eq!(output.len(), towns().len());
    assert!(output.ranges_queried > 3);
    assert_eq!(tracking.max_in_flight.load(Ordering::SeqCst), 3);
    assert_eq!(tracking.overlapping_pages.load(Ordering::SeqCst), 0);
}

/// Fails every query against one partition.
struct PartitionOutageStore {
    inner: Arc<MemoryStore>,
    failing_partition: String,
}

#[async_trait]
impl GeoStore for PartitionOutageStore {
    async fn get_item(&self, request: GetItemRequest) -> Result<Option<Item>> {
        self.inner.get_item(request).await
    }

    async fn put_item(&self, request: PutItemRequest) -> Result<()> {
        self.inner.put_item(request).await
    }

    async fn update_item(&self, request: UpdateItemRequest) -> Result<Item> {
        self.inner.update_item(request).await
    }

    async fn delete_item(&self, request: DeleteItemRequest) -> Result<Option<Item>> {
        self.inner.delete_item(request).await
    }

    async fn batch_write_items(&self, request: BatchWriteRequest) -> Result<BatchWriteOutput> {
        self.inner.batch_write_items(request).await
    }

    async fn query(&self, request: RangeQuery) -> Result<QueryPage> {
        if request.partition_key == self.failing_partition {
            return Err(GeoError::Unavailable(format!(
                "partition {} is down",
                request.partition_key
            )));
        }
        self.inner.query(request).await
    }
}

async fn outage_db(policy: FanOutPolicy) -> (GeoDB, String) {
    let config = GeoConfig::new("towns")
        .with_hash_key_length(7)
        .with_fan_out_policy(policy);
    let memory = Arc::new(MemoryStore::for_config(&config));

    let loader = build_db(config.clone(), memory.clone());
    load(&loader, &towns(), &[]).await;
    let failing_partition = loader.hash_key_for(&CAMBRIDGE, &[]).unwrap();

    let store = Arc::new(PartitionOutageStore {
        inner: memory,
        failing_partition: failing_partition.clone(),
    });
    (build_db(config, store), failing_partition)
}

#[tokio::test]
async fn test_fail_fast_surfaces_range_error() {
    init_logging();
    let (db, _) = outage_db(FanOutPolicy::FailFast).await;

    let result = db
        .query_radius(QueryRadiusInput::new(CAMBRIDGE, 30_000.0))
        .await;
    assert!(matches!(result, Err(GeoError::Unavailable(_))));
}

#[tokio::test]
async fn test_best_effort_reports_failed_ranges() {
    init_logging();
    let (db, failing_partition) = outage_db(FanOutPolicy::BestEffort).await;

    let output = db
        .query_radius(QueryRadiusInput::new(CAMBRIDGE, 30_000.0))
        .await
        .unwrap();

    assert!(!output.is_complete());
    assert!(
        output
            .failed_ranges
            .iter()
            .all(|failure| failure.partition_key == failing_partition
                && matches!(failure.error, GeoError::Unavailable(_)))
    );

    let expected: Vec<String> = {
        let mut expected: Vec<String> = towns()
            .into_iter()
            .filter(|(_, point)| db.hash_key_for(point, &[]).unwrap() != failing_partition)
            .map(|(name, _)| name.to_string())
            .collect();
        expected.sort();
        expected
    };
    assert!(!expected.contains(&"Cambridge".to_string()));
    assert_eq!(names(output.into_items()), expected);
}

#[tokio::test]
async fn test_policy_can_be_overridden_per_query() {
    init_logging();
    let (db, _) = outage_db(FanOutPolicy::FailFast).await;

    let output = db
        .query_radius(
            QueryRadiusInput::new(CAMBRIDGE, 30_000.0)
                .with_options(QueryOptions::default().with_policy(FanOutPolicy::BestEffort)),
        )
        .await
        .unwrap();
    assert!(!output.failed_ranges.is_empty());
}
