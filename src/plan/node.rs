//! Plan tree model
//!
//! Explain documents nest stages through `inputStage`. Only the stage tags
//! the harness reasons about get their own variant; every other tag is a
//! pass-through wrapper.
//!
//! Parsing stops after `MAX_PLAN_DEPTH_CEILING` nodes, the largest depth
//! ceiling an inspector can be configured with.

use std::collections::BTreeMap;
use std::fmt;

use serde_json::Value;

use crate::config::MAX_PLAN_DEPTH_CEILING;
use crate::errors::{HarnessError, HarnessResult};

/// Index bounds per key field, as rendered by the database
pub type IndexBounds = BTreeMap<String, Vec<String>>;

/// Stage tag of a collection scan
pub const COLLSCAN: &str = "COLLSCAN";
/// Stage tag of an index scan
pub const IXSCAN: &str = "IXSCAN";
/// Stage tag of a fetch
pub const FETCH: &str = "FETCH";

/// One node of a winning plan
#[derive(Debug, Clone, PartialEq)]
pub enum PlanNode {
    /// Reads every document
    CollectionScan,
    /// Reads a named index
    IndexScan {
        index_name: String,
        bounds: IndexBounds,
    },
    /// Retrieves full documents for the keys its child produced
    Fetch { child: Box<PlanNode> },
    /// Any other stage; its single child, if present, is followed
    Other {
        stage_name: String,
        child: Option<Box<PlanNode>>,
    },
}

impl PlanNode {
    /// Parse a plan stage document
    pub fn from_value(stage: &Value) -> HarnessResult<Self> {
        Self::parse_at(stage, 1)
    }

    fn parse_at(stage: &Value, depth: usize) -> HarnessResult<Self> {
        if depth > MAX_PLAN_DEPTH_CEILING {
            return Err(HarnessError::malformed_plan(format!(
                "plan is nested deeper than {} stages",
                MAX_PLAN_DEPTH_CEILING
            )));
        }
        let tag = stage.get("stage").and_then(Value::as_str).ok_or_else(|| {
            HarnessError::malformed_plan(format!("plan node has no stage tag: {}", stage))
        })?;

        let node = match tag {
            COLLSCAN => PlanNode::CollectionScan,
            IXSCAN => {
                let index_name = stage
                    .get("indexName")
                    .and_then(Value::as_str)
                    .ok_or_else(|| HarnessError::malformed_plan("IXSCAN stage has no indexName"))?;
                PlanNode::IndexScan {
                    index_name: index_name.to_string(),
                    bounds: parse_bounds(stage.get("indexBounds"))?,
                }
            }
            FETCH => {
                let input = stage
                    .get("inputStage")
                    .ok_or_else(|| HarnessError::malformed_plan("FETCH stage has no inputStage"))?;
                PlanNode::Fetch {
                    child: Box::new(PlanNode::parse_at(input, depth + 1)?),
                }
            }
            other => PlanNode::Other {
                stage_name: other.to_string(),
                child: match stage.get("inputStage") {
                    Some(input) => Some(Box::new(PlanNode::parse_at(input, depth + 1)?)),
                    None => None,
                },
            },
        };
        Ok(node)
    }

    /// Stage tag of this node
    pub fn stage_name(&self) -> &str {
        match self {
            PlanNode::CollectionScan => COLLSCAN,
            PlanNode::IndexScan { .. } => IXSCAN,
            PlanNode::Fetch { .. } => FETCH,
            PlanNode::Other { stage_name, .. } => stage_name,
        }
    }

    /// The single child link, if any
    pub fn child(&self) -> Option<&PlanNode> {
        match self {
            PlanNode::Fetch { child } => Some(child.as_ref()),
            PlanNode::Other { child, .. } => child.as_deref(),
            PlanNode::CollectionScan | PlanNode::IndexScan { .. } => None,
        }
    }

    /// Returns true for scan leaves
    pub fn is_scan(&self) -> bool {
        matches!(self, PlanNode::CollectionScan | PlanNode::IndexScan { .. })
    }
}

impl fmt::Display for PlanNode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.stage_name())?;
        if let PlanNode::IndexScan { index_name, .. } = self {
            write!(f, "({})", index_name)?;
        }
        if let Some(child) = self.child() {
            write!(f, " -> {}", child)?;
        }
        Ok(())
    }
}

/// Bounds are optional; when present they must be arrays of strings
fn parse_bounds(bounds: Option<&Value>) -> HarnessResult<IndexBounds> {
    let Some(bounds) = bounds else {
        return Ok(IndexBounds::new());
    };
    let fields = bounds.as_object().ok_or_else(|| {
        HarnessError::malformed_plan(format!("indexBounds is not a document: {}", bounds))
    })?;

    let mut out = IndexBounds::new();
    for (field, intervals) in fields {
        let intervals = intervals
            .as_array()
            .and_then(|items| {
                items
                    .iter()
                    .map(|i| i.as_str().map(str::to_string))
                    .collect::<Option<Vec<_>>>()
            })
            .ok_or_else(|| {
                HarnessError::malformed_plan(format!("indexBounds for {} are not strings", field))
            })?;
        out.insert(field.clone(), intervals);
    }
    Ok(out)
}
