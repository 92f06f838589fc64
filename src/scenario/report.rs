//! Scenario outcomes

use std::time::Duration;

use chrono::{DateTime, Utc};
use serde_json::{json, Value};
use uuid::Uuid;

use crate::errors::{HarnessError, HarnessResult};
use crate::index::TeardownReport;
use crate::observability::format_ms;

/// Outcome of one scenario
#[derive(Debug, Clone)]
pub enum ScenarioOutcome {
    Passed,
    /// The first error raised, by the body or else by teardown
    Failed(HarnessError),
}

/// Everything a scenario run produced
#[derive(Debug, Clone)]
pub struct ScenarioReport {
    /// Name as given by the caller
    pub name: String,
    /// Identifier-safe form of the name
    pub scenario_id: String,
    /// Unique id of this run
    pub run_id: Uuid,
    pub started_at: DateTime<Utc>,
    pub duration: Duration,
    pub outcome: ScenarioOutcome,
    /// Index release results, including diagnostics that did not fail the run
    pub teardown: TeardownReport,
}

impl ScenarioReport {
    /// Returns true if the scenario passed
    pub fn is_passed(&self) -> bool {
        matches!(self.outcome, ScenarioOutcome::Passed)
    }

    /// The failure, if any
    pub fn error(&self) -> Option<&HarnessError> {
        match &self.outcome {
            ScenarioOutcome::Passed => None,
            ScenarioOutcome::Failed(e) => Some(e),
        }
    }

    /// `Ok` for a pass, the failure otherwise
    pub fn into_result(self) -> HarnessResult<()> {
        match self.outcome {
            ScenarioOutcome::Passed => Ok(()),
            ScenarioOutcome::Failed(e) => Err(e),
        }
    }

    /// Render for reporting
    pub fn to_json(&self) -> Value {
        let error = self.error().map(|e| {
            json!({
                "code": e.code().code(),
                "category": e.category().as_str(),
                "message": e.message(),
                "query": e.query(),
            })
        });
        let diagnostics: Vec<String> = self
            .teardown
            .diagnostics
            .iter()
            .map(|d| d.to_string())
            .collect();

        json!({
            "scenario": self.scenario_id,
            "name": self.name,
            "run_id": self.run_id.to_string(),
            "started_at": self.started_at.to_rfc3339(),
            "duration_ms": format_ms(self.duration),
            "outcome": if self.is_passed() { "passed" } else { "failed" },
            "error": error,
            "teardown": {
                "dropped": self.teardown.dropped,
                "already_absent": self.teardown.already_absent,
                "retained": self.teardown.retained,
                "diagnostics": diagnostics,
            },
        })
    }
}
