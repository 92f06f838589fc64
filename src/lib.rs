//! planprobe - query-plan verification for document databases
//!
//! Runs scenarios against a `DocumentStore` and checks what the database's
//! query planner actually did: which scan strategy and index it chose,
//! whether queries of one shape share a plan cache entry, whether hints are
//! honored and whether repeated runs stay within a timing tolerance.
//!
//! # Components
//!
//! - `plan`: explain parsing and scan classification
//! - `index`: scoped index creation and guaranteed removal
//! - `cache`: plan cache identity tracking per query shape
//! - `perf`: tolerance-based timing comparison
//! - `executor`: queries paired with their plans
//! - `assertions`: result structure, field type and outcome checks
//! - `scenario`: the runner tying them together
//! - `store`: the database contract and an in-memory implementation

pub mod assertions;
pub mod cache;
pub mod config;
pub mod errors;
pub mod executor;
pub mod index;
pub mod observability;
pub mod perf;
pub mod plan;
pub mod scenario;
pub mod store;

pub use config::HarnessConfig;
pub use errors::{ErrorCategory, HarnessError, HarnessErrorCode, HarnessResult};
pub use scenario::{Harness, ScenarioContext, ScenarioOutcome, ScenarioReport};
