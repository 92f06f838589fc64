//! Index lifecycle for scenarios
//!
//! Indexes are the only shared mutable state a scenario touches, so each
//! one is acquired through an `IndexScope` that guarantees its release.
//!
//! # Invariants
//!
//! - Every created index is dropped when its scope ends, on success,
//!   failure and panic unwinding alike
//! - Creating an index that exists with an equivalent key spec succeeds
//! - Dropping an index that does not exist succeeds
//! - A name is held by at most one live scenario per `Harness`
//!
//! # States
//!
//! `Absent -> Creating -> Present -> Dropping -> Absent`; a failed creation
//! returns straight to `Absent`.

mod ledger;
mod scope;

pub use ledger::{scenario_id, scenario_slug, NameLedger, ScenarioLease};
pub use scope::{IndexHandle, IndexScope, IndexState, TeardownDiagnostic, TeardownReport};
