//! Pure geometry and key arithmetic.
//!
//! Nothing in this module talks to a store:
//! - [`geocoder`] maps points to geohashes and partition keys
//! - [`range`] and [`covering`] turn a radius into partition-aligned ranges
//! - [`geojson`] encodes the stored geometry attribute
//! - [`validation`] checks caller input before any I/O

pub mod covering;
pub mod geocoder;
pub mod geojson;
pub mod range;
pub mod validation;
