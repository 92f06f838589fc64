//! Scenario runner
//!
//! A scenario acquires indexes, issues queries, inspects their plans and
//! asserts on them. The runner guarantees index release on every exit path
//! and reports exactly one outcome per scenario.

mod harness;
mod report;

pub use harness::{Harness, ScenarioContext};
pub use report::{ScenarioOutcome, ScenarioReport};
