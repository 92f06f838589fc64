//! Effective scan strategy of a winning plan
//!
//! The walk follows single child links from the root through fetch and
//! pass-through stages until it meets a scan leaf. It never assumes a fixed
//! nesting depth but gives up after a configurable number of nodes.

use std::fmt;

use super::explain::ExplainResult;
use super::node::{IndexBounds, PlanNode};
use crate::config::HarnessConfig;
use crate::errors::{HarnessError, HarnessResult};

/// Default number of nodes walked before a plan is declared malformed
pub const DEFAULT_DEPTH_CEILING: usize = 10;

/// Scan strategy kind
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ScanType {
    CollectionScan,
    IndexScan,
}

impl ScanType {
    /// Returns the string representation
    pub fn as_str(&self) -> &'static str {
        match self {
            ScanType::CollectionScan => "collection_scan",
            ScanType::IndexScan => "index_scan",
        }
    }
}

impl fmt::Display for ScanType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// The scan a winning plan actually performs
#[derive(Debug, Clone, PartialEq)]
pub struct EffectiveStrategy {
    pub kind: ScanType,
    pub index_name: Option<String>,
    pub bounds: IndexBounds,
}

impl EffectiveStrategy {
    fn from_leaf(leaf: &PlanNode) -> Option<Self> {
        match leaf {
            PlanNode::CollectionScan => Some(Self {
                kind: ScanType::CollectionScan,
                index_name: None,
                bounds: IndexBounds::new(),
            }),
            PlanNode::IndexScan { index_name, bounds } => Some(Self {
                kind: ScanType::IndexScan,
                index_name: Some(index_name.clone()),
                bounds: bounds.clone(),
            }),
            _ => None,
        }
    }
}

impl fmt::Display for EffectiveStrategy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.index_name {
            Some(name) => write!(f, "{}({})", self.kind, name),
            None => write!(f, "{}", self.kind),
        }
    }
}

/// Classifies explain results. Pure: no store access, no logging.
#[derive(Debug, Clone, Copy)]
pub struct PlanInspector {
    depth_ceiling: usize,
}

impl Default for PlanInspector {
    fn default() -> Self {
        Self::new(DEFAULT_DEPTH_CEILING)
    }
}

impl PlanInspector {
    /// Inspector walking at most `depth_ceiling` nodes
    pub fn new(depth_ceiling: usize) -> Self {
        Self {
            depth_ceiling: depth_ceiling.max(1),
        }
    }

    /// Inspector using the configured depth ceiling
    pub fn from_config(config: &HarnessConfig) -> Self {
        Self::new(config.plan_depth_ceiling)
    }

    /// Returns the depth ceiling
    pub fn depth_ceiling(&self) -> usize {
        self.depth_ceiling
    }

    /// Effective scan strategy of the winning plan
    pub fn classify(&self, explain: &ExplainResult) -> HarnessResult<EffectiveStrategy> {
        let mut node = &explain.winning_plan;
        for _ in 0..self.depth_ceiling {
            if let Some(strategy) = EffectiveStrategy::from_leaf(node) {
                return Ok(strategy);
            }
            node = match node.child() {
                Some(child) => child,
                None => {
                    return Err(HarnessError::malformed_plan(format!(
                        "winning plan has no scan leaf: {}",
                        explain.winning_plan
                    )))
                }
            };
        }
        Err(HarnessError::malformed_plan(format!(
            "no scan leaf within depth ceiling {}: {}",
            self.depth_ceiling, explain.winning_plan
        )))
    }

    /// Bounds of the effective index scan; empty for collection scans
    /// and plans without bounds
    pub fn index_bounds(&self, explain: &ExplainResult) -> IndexBounds {
        self.classify(explain)
            .map(|strategy| strategy.bounds)
            .unwrap_or_default()
    }

    /// True iff the effective strategy scans the named index
    pub fn is_using_index(&self, explain: &ExplainResult, index_name: &str) -> bool {
        matches!(
            self.classify(explain),
            Ok(EffectiveStrategy {
                kind: ScanType::IndexScan,
                index_name: Some(ref name),
                ..
            }) if name == index_name
        )
    }
}
