//! Harness metrics registry
//!
//! - Counters only
//! - Monotonic increase
//! - Thread-safe but lock-minimal

use std::sync::atomic::{AtomicU64, Ordering};

/// Counters for one harness instance
///
/// All counters use Relaxed ordering; values are read only for reporting.
#[derive(Debug, Default)]
pub struct MetricsRegistry {
    scenarios_passed: AtomicU64,
    scenarios_failed: AtomicU64,
    queries_executed: AtomicU64,
    queries_rejected: AtomicU64,
    plans_classified: AtomicU64,
    indexes_created: AtomicU64,
    indexes_dropped: AtomicU64,
    teardown_diagnostics: AtomicU64,
}

impl MetricsRegistry {
    /// Create a new metrics registry with all counters at zero
    pub fn new() -> Self {
        Self::default()
    }

    /// Increment passed scenarios
    pub fn increment_scenarios_passed(&self) {
        self.scenarios_passed.fetch_add(1, Ordering::Relaxed);
    }

    /// Increment failed scenarios
    pub fn increment_scenarios_failed(&self) {
        self.scenarios_failed.fetch_add(1, Ordering::Relaxed);
    }

    /// Increment executed queries
    pub fn increment_queries_executed(&self) {
        self.queries_executed.fetch_add(1, Ordering::Relaxed);
    }

    /// Increment rejected queries
    pub fn increment_queries_rejected(&self) {
        self.queries_rejected.fetch_add(1, Ordering::Relaxed);
    }

    /// Increment classified plans
    pub fn increment_plans_classified(&self) {
        self.plans_classified.fetch_add(1, Ordering::Relaxed);
    }

    /// Increment created indexes
    pub fn increment_indexes_created(&self) {
        self.indexes_created.fetch_add(1, Ordering::Relaxed);
    }

    /// Increment dropped indexes
    pub fn increment_indexes_dropped(&self) {
        self.indexes_dropped.fetch_add(1, Ordering::Relaxed);
    }

    /// Increment teardown diagnostics
    pub fn increment_teardown_diagnostics(&self) {
        self.teardown_diagnostics.fetch_add(1, Ordering::Relaxed);
    }

    /// Take a consistent-enough copy of all counters
    pub fn snapshot(&self) -> MetricsSnapshot {
        MetricsSnapshot {
            scenarios_passed: self.scenarios_passed.load(Ordering::Relaxed),
            scenarios_failed: self.scenarios_failed.load(Ordering::Relaxed),
            queries_executed: self.queries_executed.load(Ordering::Relaxed),
            queries_rejected: self.queries_rejected.load(Ordering::Relaxed),
            plans_classified: self.plans_classified.load(Ordering::Relaxed),
            indexes_created: self.indexes_created.load(Ordering::Relaxed),
            indexes_dropped: self.indexes_dropped.load(Ordering::Relaxed),
            teardown_diagnostics: self.teardown_diagnostics.load(Ordering::Relaxed),
        }
    }
}

/// Point-in-time copy of the counters
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct MetricsSnapshot {
    pub scenarios_passed: u64,
    pub scenarios_failed: u64,
    pub queries_executed: u64,
    pub queries_rejected: u64,
    pub plans_classified: u64,
    pub indexes_created: u64,
    pub indexes_dropped: u64,
    pub teardown_diagnostics: u64,
}
