//! Observability for planprobe
//!
//! - Structured logging (JSON lines)
//! - Typed events
//! - One observation scope per scenario phase
//! - Counter metrics
//!
//! Observability is read-only: a failed log write never changes a
//! scenario outcome.
//!
//! # Usage
//!
//! ```ignore
//! use planprobe::observability::{log_event_with_fields, Event, ObservationScope, Phase};
//!
//! let scope = ObservationScope::new(Phase::Execute, "shape_cache_reuse");
//! log_event_with_fields(Event::QueryExecuted, &[("documents", "12")]);
//! scope.complete();
//! ```

mod events;
mod logger;
mod metrics;
mod scope;

pub use events::Event;
pub use logger::{Logger, Severity};
pub use metrics::{MetricsRegistry, MetricsSnapshot};
pub use scope::{format_ms, ObservationScope, Phase};

fn severity_for(event: Event) -> Severity {
    if event.is_failure() {
        Severity::Error
    } else if event.is_detail() {
        Severity::Trace
    } else {
        Severity::Info
    }
}

/// Log a harness event
pub fn log_event(event: Event) {
    Logger::log(severity_for(event), event.as_str(), &[]);
}

/// Log a harness event with fields
pub fn log_event_with_fields(event: Event, fields: &[(&str, &str)]) {
    Logger::log(severity_for(event), event.as_str(), fields);
}

/// Log a harness event at an explicit severity
pub fn log_event_at(severity: Severity, event: Event, fields: &[(&str, &str)]) {
    Logger::log(severity, event.as_str(), fields);
}
