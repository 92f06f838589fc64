//! Performance comparison
//!
//! Timing samples are recorded by label and checked against a tolerance
//! factor. Performance failures carry their own error category so they are
//! reported apart from correctness failures.

mod comparator;

pub use comparator::{
    check_monotonic, compare_durations, PerformanceComparator, RepetitionSummary, TimingSample,
    ToleranceOutcome, DEFAULT_TOLERANCE_FACTOR,
};
