//! Plan cache identity tracking
//!
//! Queries that differ only in literal values belong to one shape group.
//! Every observation in a group must carry the same query hash and the
//! same plan cache key; tokens are compared only by equality.

use std::collections::BTreeMap;

use crate::errors::{HarnessError, HarnessResult};
use crate::observability::{log_event_with_fields, Event};
use crate::plan::{ExplainResult, PlanCacheKey, QueryHash};

/// Cache identifiers observed for one query
#[derive(Debug, Clone, PartialEq)]
pub struct CacheObservation {
    pub group_id: String,
    pub query_hash: QueryHash,
    pub plan_cache_key: PlanCacheKey,
}

/// Records cache identifiers per shape group
#[derive(Debug, Default)]
pub struct PlanCacheTracker {
    groups: BTreeMap<String, Vec<CacheObservation>>,
}

impl PlanCacheTracker {
    /// Empty tracker
    pub fn new() -> Self {
        Self::default()
    }

    /// Record the identifiers of an explain result under a group
    pub fn observe(&mut self, group_id: &str, explain: &ExplainResult) {
        let observation = CacheObservation {
            group_id: group_id.to_string(),
            query_hash: explain.query_hash.clone(),
            plan_cache_key: explain.plan_cache_key.clone(),
        };

        let query_hash = observation.query_hash.to_string();
        let plan_cache_key = observation.plan_cache_key.to_string();
        log_event_with_fields(
            Event::CacheObserved,
            &[
                ("group", group_id),
                ("query_hash", query_hash.as_str()),
                ("plan_cache_key", plan_cache_key.as_str()),
            ],
        );

        self.groups
            .entry(group_id.to_string())
            .or_default()
            .push(observation);
    }

    /// Fail unless every observation in the group agrees on both tokens.
    ///
    /// Groups with zero or one observation are trivially stable.
    pub fn assert_stable(&self, group_id: &str) -> HarnessResult<()> {
        let observations = self.observations(group_id);
        if observations.len() < 2 {
            return Ok(());
        }

        let hashes = distinct(observations.iter().map(|o| &o.query_hash));
        let keys = distinct(observations.iter().map(|o| &o.plan_cache_key));
        if hashes.len() == 1 && keys.len() == 1 {
            return Ok(());
        }

        Err(HarnessError::cache_inconsistency(format!(
            "group {} has {} observations with {} query hashes [{}] and {} plan cache keys [{}]",
            group_id,
            observations.len(),
            hashes.len(),
            join(&hashes),
            keys.len(),
            join(&keys),
        )))
    }

    /// Observations recorded for a group, in order
    pub fn observations(&self, group_id: &str) -> &[CacheObservation] {
        self.groups.get(group_id).map(Vec::as_slice).unwrap_or(&[])
    }

    /// Group ids with at least one observation, sorted
    pub fn groups(&self) -> Vec<&str> {
        self.groups.keys().map(String::as_str).collect()
    }

    /// Forget every observation
    pub fn clear(&mut self) {
        self.groups.clear();
    }
}

/// Distinct tokens in first-seen order
fn distinct<'a, T: PartialEq + 'a>(tokens: impl Iterator<Item = &'a T>) -> Vec<&'a T> {
    let mut out: Vec<&T> = Vec::new();
    for token in tokens {
        if !out.contains(&token) {
            out.push(token);
        }
    }
    out
}

fn join<T: std::fmt::Display>(tokens: &[&T]) -> String {
    tokens
        .iter()
        .map(|t| t.to_string())
        .collect::<Vec<_>>()
        .join(", ")
}
