//! Explain output parsing
//!
//! Accepted layouts:
//! - `{queryPlanner: {winningPlan, queryHash, planCacheKey}}` (find, and
//!   aggregations fully absorbed into the query planner)
//! - `{stages: [{$cursor: {queryPlanner: ..}}, ..]}` (aggregations with
//!   stages the planner cannot absorb)
//! - a `winningPlan` wrapping its tree in `queryPlan` (slot-based engine)

use std::fmt;

use serde_json::Value;

use super::node::PlanNode;
use crate::errors::{HarnessError, HarnessResult};

/// Database-assigned query shape identifier, compared only by equality
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct QueryHash(String);

/// Database-assigned plan cache identifier, compared only by equality
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct PlanCacheKey(String);

impl QueryHash {
    /// Wrap a raw token
    pub fn new(token: impl Into<String>) -> Self {
        Self(token.into())
    }
}

impl PlanCacheKey {
    /// Wrap a raw token
    pub fn new(token: impl Into<String>) -> Self {
        Self(token.into())
    }
}

impl fmt::Display for QueryHash {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl fmt::Display for PlanCacheKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Parsed explain output
#[derive(Debug, Clone)]
pub struct ExplainResult {
    /// Root of the winning plan
    pub winning_plan: PlanNode,
    /// Query shape identifier
    pub query_hash: QueryHash,
    /// Plan cache identifier
    pub plan_cache_key: PlanCacheKey,
    /// The explain document as received
    pub raw: Value,
}

impl ExplainResult {
    /// Parse an explain document
    pub fn from_document(document: &Value) -> HarnessResult<Self> {
        let planner = locate_query_planner(document).ok_or_else(|| {
            HarnessError::malformed_plan("explain output has no queryPlanner section")
        })?;

        let mut winning = planner
            .get("winningPlan")
            .ok_or_else(|| HarnessError::malformed_plan("queryPlanner has no winningPlan"))?;
        if winning.get("stage").is_none() {
            if let Some(tree) = winning.get("queryPlan") {
                winning = tree;
            }
        }

        Ok(Self {
            winning_plan: PlanNode::from_value(winning)?,
            query_hash: QueryHash::new(required_token(planner, "queryHash")?),
            plan_cache_key: PlanCacheKey::new(required_token(planner, "planCacheKey")?),
            raw: document.clone(),
        })
    }
}

fn locate_query_planner(document: &Value) -> Option<&Value> {
    if let Some(planner) = document.get("queryPlanner") {
        return Some(planner);
    }
    document
        .get("stages")?
        .as_array()?
        .first()?
        .get("$cursor")?
        .get("queryPlanner")
}

fn required_token<'a>(planner: &'a Value, field: &str) -> HarnessResult<&'a str> {
    planner
        .get(field)
        .and_then(Value::as_str)
        .ok_or_else(|| HarnessError::malformed_plan(format!("queryPlanner has no {}", field)))
}
