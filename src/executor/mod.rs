//! Query execution for planprobe
//!
//! The executor issues a find or aggregation and returns the result set
//! together with the plan the database chose for it.
//!
//! # Error classification
//!
//! - Store rejection of the query: `QueryRejected`
//! - Any other store failure: `ExecutionFailed`
//! - Explain output that cannot be parsed: `MalformedPlan`
//!
//! Every classified error carries the query rendered as JSON.

mod executor;
mod query;
mod result;

pub use executor::QueryExecutor;
pub use query::Query;
pub use result::Execution;
