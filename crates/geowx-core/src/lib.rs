//! Core data types, color classification, and series reduction for GeoWX
//!
//! This crate holds the pure parts of the dashboard: threshold rules and
//! their priority ordering, day-keyed series lookups, polygon geometry,
//! and the traits the refresh pipeline is wired through.

pub mod geometry;
pub mod pipeline;
pub mod rules;
pub mod series;
pub mod types;

pub use geometry::*;
pub use pipeline::*;
pub use rules::*;
pub use series::*;
pub use types::*;
