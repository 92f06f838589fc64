//! Plan inspection
//!
//! Parses explain output into a `PlanNode` tree and classifies the scan
//! strategy the database actually chose.
//!
//! # Classification
//!
//! - `COLLSCAN` leaf: collection scan
//! - `IXSCAN` leaf: index scan, carries the index name and bounds
//! - `FETCH` and every other stage: followed through their single child
//!
//! A plan without a reachable scan leaf is a malformed plan, never a guess.

mod explain;
mod inspector;
mod node;

pub use explain::{ExplainResult, PlanCacheKey, QueryHash};
pub use inspector::{EffectiveStrategy, PlanInspector, ScanType, DEFAULT_DEPTH_CEILING};
pub use node::{IndexBounds, PlanNode, COLLSCAN, FETCH, IXSCAN};
