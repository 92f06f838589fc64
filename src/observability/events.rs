//! Observable harness events
//!
//! Events are explicit and typed. Scenario phases (setup, execute, inspect,
//! assert, teardown) are logged through `ObservationScope`; the events here
//! mark individual facts recorded inside a phase.

use std::fmt;

/// Observable events emitted by the harness
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Event {
    // Scenario lifecycle
    /// Scenario body starts
    ScenarioBegin,
    /// Scenario passed
    ScenarioPassed,
    /// Scenario failed with its first fatal error
    ScenarioFailed,

    // Index lifecycle
    /// Index created (or already present with equivalent spec)
    IndexCreated,
    /// Index dropped (or already absent)
    IndexDropped,
    /// Pre-existing index left in place at release
    IndexRetained,
    /// Index release failed during teardown
    TeardownDiagnostic,

    // Query execution
    /// Query or pipeline executed
    QueryExecuted,
    /// Query or pipeline rejected by the database
    QueryRejected,
    /// Raw explain document (diagnostic only)
    ExplainOutput,

    // Inspection
    /// Plan classified into an effective strategy
    PlanClassified,
    /// Cache identifiers observed for a shape group
    CacheObserved,
    /// Timing sample recorded
    TimingRecorded,
    /// Timing regressed but stayed inside the tolerance
    RegressionWithinTolerance,
    /// Summary of repeated executions
    RepetitionSummary,

    // Configuration
    /// Configuration loaded
    ConfigLoaded,
}

impl Event {
    /// Returns the string representation of the event
    pub fn as_str(&self) -> &'static str {
        match self {
            Event::ScenarioBegin => "SCENARIO_BEGIN",
            Event::ScenarioPassed => "SCENARIO_PASSED",
            Event::ScenarioFailed => "SCENARIO_FAILED",

            Event::IndexCreated => "INDEX_CREATED",
            Event::IndexDropped => "INDEX_DROPPED",
            Event::IndexRetained => "INDEX_RETAINED",
            Event::TeardownDiagnostic => "TEARDOWN_DIAGNOSTIC",

            Event::QueryExecuted => "QUERY_EXECUTED",
            Event::QueryRejected => "QUERY_REJECTED",
            Event::ExplainOutput => "EXPLAIN_OUTPUT",

            Event::PlanClassified => "PLAN_CLASSIFIED",
            Event::CacheObserved => "CACHE_OBSERVED",
            Event::TimingRecorded => "TIMING_RECORDED",
            Event::RegressionWithinTolerance => "REGRESSION_WITHIN_TOLERANCE",
            Event::RepetitionSummary => "REPETITION_SUMMARY",

            Event::ConfigLoaded => "CONFIG_LOADED",
        }
    }

    /// Returns true if this event reports a failure
    pub fn is_failure(&self) -> bool {
        matches!(self, Event::ScenarioFailed | Event::TeardownDiagnostic)
    }

    /// Returns true if this event is diagnostic detail rather than progress
    pub fn is_detail(&self) -> bool {
        matches!(self, Event::ExplainOutput)
    }
}

impl fmt::Display for Event {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}
