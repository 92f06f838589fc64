//! Index name ownership across live scenarios
//!
//! One ledger is shared by every scope created from the same `Harness`.
//! A name can be held by one scenario at a time; a second scenario asking
//! for it is refused rather than made to wait.
//!
//! The ledger also tracks which scenario ids are live. Two runs with the
//! same id would derive the same scoped names, so the second is refused.

use std::collections::{HashMap, HashSet};
use std::sync::{Arc, Mutex, MutexGuard};

use sha2::{Digest, Sha256};

use crate::errors::{HarnessError, HarnessResult};

#[derive(Debug, Default)]
struct LedgerState {
    /// index name -> holding scenario id
    held: HashMap<String, String>,
    live: HashSet<String>,
}

/// Shared record of which scenario holds which index name
#[derive(Debug, Clone, Default)]
pub struct NameLedger {
    state: Arc<Mutex<LedgerState>>,
}

/// Registration of a live scenario id; the id is freed on drop
#[derive(Debug)]
pub struct ScenarioLease {
    ledger: NameLedger,
    scenario_id: String,
}

impl ScenarioLease {
    pub fn scenario_id(&self) -> &str {
        &self.scenario_id
    }
}

impl Drop for ScenarioLease {
    fn drop(&mut self) {
        self.ledger.lock().live.remove(&self.scenario_id);
    }
}

impl NameLedger {
    /// Empty ledger
    pub fn new() -> Self {
        Self::default()
    }

    // A panic while holding the lock leaves the state consistent: every
    // mutation is a single insert or remove.
    fn lock(&self) -> MutexGuard<'_, LedgerState> {
        self.state.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    /// Register a scenario id as live.
    ///
    /// Fails if another run with the same id is still live.
    pub fn enter(&self, scenario_id: &str) -> HarnessResult<ScenarioLease> {
        if !self.lock().live.insert(scenario_id.to_string()) {
            return Err(HarnessError::index_lifecycle(format!(
                "scenario {} is already running",
                scenario_id
            )));
        }
        Ok(ScenarioLease {
            ledger: self.clone(),
            scenario_id: scenario_id.to_string(),
        })
    }

    /// Returns true if a run with this id is live
    pub fn is_live(&self, scenario_id: &str) -> bool {
        self.lock().live.contains(scenario_id)
    }

    /// Claim a name for a scenario.
    ///
    /// Claiming a name the scenario already holds succeeds.
    pub fn claim(&self, name: &str, owner: &str) -> HarnessResult<()> {
        let mut state = self.lock();
        match state.held.get(name) {
            Some(holder) if holder != owner => Err(HarnessError::index_lifecycle(format!(
                "index name {} is held by live scenario {}",
                name, holder
            ))),
            Some(_) => Ok(()),
            None => {
                state.held.insert(name.to_string(), owner.to_string());
                Ok(())
            }
        }
    }

    /// Release a name; only its holder can release it
    pub fn release(&self, name: &str, owner: &str) {
        let mut state = self.lock();
        if state.held.get(name).is_some_and(|holder| holder == owner) {
            state.held.remove(name);
        }
    }

    /// Scenario currently holding a name
    pub fn holder(&self, name: &str) -> Option<String> {
        self.lock().held.get(name).cloned()
    }

    /// Names held by a scenario, sorted
    pub fn held_by(&self, owner: &str) -> Vec<String> {
        let mut names: Vec<String> = self
            .lock()
            .held
            .iter()
            .filter(|(_, holder)| holder.as_str() == owner)
            .map(|(name, _)| name.clone())
            .collect();
        names.sort();
        names
    }

    /// Number of names held across all scenarios
    pub fn len(&self) -> usize {
        self.lock().held.len()
    }

    /// Returns true if no name is held
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

/// Scenario id for a display name: its slug plus a digest of the raw name.
///
/// Names that share a slug ("plan cache", "plan-cache") get different ids.
pub fn scenario_id(name: &str) -> String {
    let digest = Sha256::digest(name.as_bytes());
    let suffix: String = digest[..4].iter().map(|b| format!("{:02x}", b)).collect();
    format!("{}_{}", scenario_slug(name), suffix)
}

/// Identifier-safe form of a scenario name: lowercase `[a-z0-9_]`
pub fn scenario_slug(name: &str) -> String {
    let slug: String = name
        .chars()
        .map(|c| {
            if c.is_ascii_alphanumeric() {
                c.to_ascii_lowercase()
            } else {
                '_'
            }
        })
        .collect();
    let trimmed = slug.trim_matches('_');
    if trimmed.is_empty() {
        "scenario".to_string()
    } else {
        trimmed.to_string()
    }
}
