//! Geospatial secondary index for partition/range keyed key-value stores.
//!
//! Points are mapped to S2 leaf cell ids ("geohashes"). The leading decimal
//! digits of a geohash form the partition key, so a radius query becomes a
//! small set of per-partition geohash range queries followed by an exact
//! distance filter.
//!
//! ```rust
//! use spatio_geoindex::prelude::*;
//!
//! # tokio_test_block(async {
//! let db = GeoDB::builder()
//!     .config(GeoConfig::new("cafes").with_hash_key_length(6))
//!     .build()?;
//!
//! let cambridge = GeoPoint::new(52.2053, 0.1218);
//! db.put_point(PutPointInput::new(cambridge, "cafe-1").with_attribute("name", "Hot Numbers"))
//!     .await?;
//!
//! let nearby = db.query_radius(QueryRadiusInput::new(cambridge, 500.0)).await?;
//! assert_eq!(nearby.len(), 1);
//! # Ok::<(), GeoError>(())
//! # })?;
//! # fn tokio_test_block<F: std::future::Future>(f: F) -> F::Output {
//! #     tokio::runtime::Builder::new_current_thread().enable_all().build().unwrap().block_on(f)
//! # }
//! # Ok::<(), GeoError>(())
//! ```

pub mod builder;
pub mod compute;
pub mod config;
pub mod db;
pub mod error;
pub mod store;
pub mod types;

pub use builder::GeoDBBuilder;
pub use db::GeoDB;
pub use error::{GeoError, Result};

pub use compute::covering::Covering;
pub use compute::range::GeohashRange;

pub use config::{
    CoveringConfig, FanOutConfig, FanOutPolicy, GeoConfig, ReadConsistency, RetryConfig,
};

pub use store::{Filter, GeoStore, MemoryStore, RetryingStore};

pub use types::{
    DeletePointInput, GeoPoint, GetPointInput, Item, ParentCell, PutPointInput, QueryOptions,
    QueryRadiusInput, QueryRadiusOutput, RadiusHit, RangeFailure, UpdatePointInput,
};

pub const VERSION: &str = env!("CARGO_PKG_VERSION");

/// Common imports
pub mod prelude {

    pub use crate::{GeoDB, GeoDBBuilder, GeoError, Result};

    pub use crate::{FanOutPolicy, GeoConfig, ReadConsistency, RetryConfig};

    pub use crate::{
        DeletePointInput, GeoPoint, GetPointInput, Item, PutPointInput, QueryOptions,
        QueryRadiusInput, QueryRadiusOutput, RadiusHit, UpdatePointInput,
    };

    pub use crate::{Filter, GeoStore, MemoryStore};
}
