//! ObservationScope for scenario phase logging
//!
//! - Logs `{PHASE}_BEGIN` on creation
//! - Logs `{PHASE}_COMPLETE` or `{PHASE}_FAILED` when closed
//! - Logs `{PHASE}_INCOMPLETE` on drop if never closed

use std::fmt;
use std::time::{Duration, Instant};

use super::logger::Logger;

/// Scenario phases, one observation scope each
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Phase {
    /// Index acquisition and fixture preparation
    Setup,
    /// Query and pipeline execution
    Execute,
    /// Plan inspection and cache/timing observation
    Inspect,
    /// Invariant assertions
    Assert,
    /// Index release
    Teardown,
}

impl Phase {
    /// Returns the event prefix for this phase
    pub fn as_str(&self) -> &'static str {
        match self {
            Phase::Setup => "SETUP",
            Phase::Execute => "EXECUTE",
            Phase::Inspect => "INSPECT",
            Phase::Assert => "ASSERT",
            Phase::Teardown => "TEARDOWN",
        }
    }
}

impl fmt::Display for Phase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// A scope that logs begin and completion of one scenario phase
///
/// ```ignore
/// let scope = ObservationScope::new(Phase::Setup, "basic_plan_selection");
/// // ... create indexes ...
/// scope.complete();
/// ```
pub struct ObservationScope<'a> {
    phase: Phase,
    scenario: &'a str,
    started: Instant,
    closed: bool,
}

impl<'a> ObservationScope<'a> {
    /// Open a phase scope; logs `{PHASE}_BEGIN`
    pub fn new(phase: Phase, scenario: &'a str) -> Self {
        let event = format!("{}_BEGIN", phase.as_str());
        Logger::info(&event, &[("scenario", scenario)]);

        Self {
            phase,
            scenario,
            started: Instant::now(),
            closed: false,
        }
    }

    /// Mark the phase as completed
    pub fn complete(self) {
        self.complete_with_fields(&[]);
    }

    /// Mark the phase as completed with additional fields
    pub fn complete_with_fields(mut self, extra_fields: &[(&str, &str)]) {
        self.closed = true;
        let event = format!("{}_COMPLETE", self.phase.as_str());
        let elapsed = format_ms(self.started.elapsed());

        let mut fields = vec![("scenario", self.scenario), ("elapsed_ms", elapsed.as_str())];
        fields.extend(extra_fields.iter().copied());
        Logger::info(&event, &fields);
    }

    /// Mark the phase as failed; logs `{PHASE}_FAILED` at ERROR level
    pub fn fail(mut self, reason: &str) {
        self.closed = true;
        let event = format!("{}_FAILED", self.phase.as_str());
        Logger::error(&event, &[("scenario", self.scenario), ("reason", reason)]);
    }

    /// Returns the phase this scope observes
    pub fn phase(&self) -> Phase {
        self.phase
    }

    /// Check if the scope has been closed
    pub fn is_closed(&self) -> bool {
        self.closed
    }
}

impl Drop for ObservationScope<'_> {
    fn drop(&mut self) {
        if !self.closed {
            let event = format!("{}_INCOMPLETE", self.phase.as_str());
            Logger::warn(
                &event,
                &[
                    ("scenario", self.scenario),
                    ("reason", "scope dropped without completion"),
                ],
            );
        }
    }
}

/// Milliseconds with three decimals, for log fields
pub fn format_ms(duration: Duration) -> String {
    format!("{:.3}", duration.as_secs_f64() * 1000.0)
}
