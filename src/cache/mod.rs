//! Plan cache consistency
//!
//! Groups queries by shape and checks that the database assigns one
//! query hash and one plan cache key per group.

mod tracker;

pub use tracker::{CacheObservation, PlanCacheTracker};
