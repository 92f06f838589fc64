//! Harness error types
//!
//! Error codes:
//! - PROBE_QUERY_REJECTED (ERROR)
//! - PROBE_MALFORMED_PLAN (FATAL)
//! - PROBE_CACHE_INCONSISTENCY (FATAL)
//! - PROBE_PERFORMANCE_REGRESSION (FATAL)
//! - PROBE_INDEX_LIFECYCLE (FATAL)
//! - PROBE_EXECUTION_FAILED (ERROR)
//! - PROBE_ASSERTION_FAILED (FATAL)
//! - PROBE_CONFIG_INVALID (FATAL)

use std::fmt;

/// Severity levels for harness errors
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Severity {
    /// The operation failed; the failure may be the expected outcome
    Error,
    /// The scenario cannot continue
    Fatal,
}

impl fmt::Display for Severity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Severity::Error => write!(f, "ERROR"),
            Severity::Fatal => write!(f, "FATAL"),
        }
    }
}

/// Reporting category of an error.
///
/// Performance failures are reported apart from correctness failures.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ErrorCategory {
    /// The database refused the query or pipeline
    Rejection,
    /// Plan shape, cache identity or result assertions did not hold
    Correctness,
    /// Timing tolerance exceeded
    Performance,
    /// Index creation or removal failed
    Lifecycle,
    /// Store unavailable, bad configuration, other environment failures
    Infrastructure,
}

impl ErrorCategory {
    /// Returns the string representation
    pub fn as_str(&self) -> &'static str {
        match self {
            ErrorCategory::Rejection => "rejection",
            ErrorCategory::Correctness => "correctness",
            ErrorCategory::Performance => "performance",
            ErrorCategory::Lifecycle => "lifecycle",
            ErrorCategory::Infrastructure => "infrastructure",
        }
    }
}

impl fmt::Display for ErrorCategory {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Harness error codes
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum HarnessErrorCode {
    /// The database refused a malformed filter or pipeline
    QueryRejected,
    /// Explain output has no reachable scan leaf or misses required fields
    MalformedPlan,
    /// Shape-equivalent queries produced different cache identifiers
    CacheInconsistency,
    /// Timing tolerance exceeded
    PerformanceRegression,
    /// Index creation or removal failed
    IndexLifecycle,
    /// Query execution failed for a reason other than rejection
    ExecutionFailed,
    /// A structural or outcome assertion did not hold
    AssertionFailed,
    /// Harness configuration is invalid
    ConfigInvalid,
}

impl HarnessErrorCode {
    /// Returns the string code
    pub fn code(&self) -> &'static str {
        match self {
            HarnessErrorCode::QueryRejected => "PROBE_QUERY_REJECTED",
            HarnessErrorCode::MalformedPlan => "PROBE_MALFORMED_PLAN",
            HarnessErrorCode::CacheInconsistency => "PROBE_CACHE_INCONSISTENCY",
            HarnessErrorCode::PerformanceRegression => "PROBE_PERFORMANCE_REGRESSION",
            HarnessErrorCode::IndexLifecycle => "PROBE_INDEX_LIFECYCLE",
            HarnessErrorCode::ExecutionFailed => "PROBE_EXECUTION_FAILED",
            HarnessErrorCode::AssertionFailed => "PROBE_ASSERTION_FAILED",
            HarnessErrorCode::ConfigInvalid => "PROBE_CONFIG_INVALID",
        }
    }

    /// Returns the severity level for this error
    pub fn severity(&self) -> Severity {
        match self {
            HarnessErrorCode::QueryRejected | HarnessErrorCode::ExecutionFailed => Severity::Error,
            _ => Severity::Fatal,
        }
    }

    /// Returns the reporting category for this error
    pub fn category(&self) -> ErrorCategory {
        match self {
            HarnessErrorCode::QueryRejected => ErrorCategory::Rejection,
            HarnessErrorCode::MalformedPlan
            | HarnessErrorCode::CacheInconsistency
            | HarnessErrorCode::AssertionFailed => ErrorCategory::Correctness,
            HarnessErrorCode::PerformanceRegression => ErrorCategory::Performance,
            HarnessErrorCode::IndexLifecycle => ErrorCategory::Lifecycle,
            HarnessErrorCode::ExecutionFailed | HarnessErrorCode::ConfigInvalid => {
                ErrorCategory::Infrastructure
            }
        }
    }
}

impl fmt::Display for HarnessErrorCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.code())
    }
}

/// Harness error type with full context
#[derive(Debug, Clone)]
pub struct HarnessError {
    /// Error code
    code: HarnessErrorCode,
    /// Human-readable message
    message: String,
    /// Query or pipeline that triggered the error, rendered as JSON
    query: Option<String>,
}

impl HarnessError {
    /// Create an error with an arbitrary code
    pub fn new(code: HarnessErrorCode, message: impl Into<String>) -> Self {
        Self {
            code,
            message: message.into(),
            query: None,
        }
    }

    /// Create a query rejected error
    pub fn query_rejected(reason: impl Into<String>) -> Self {
        Self::new(HarnessErrorCode::QueryRejected, reason)
    }

    /// Create a malformed plan error
    pub fn malformed_plan(reason: impl Into<String>) -> Self {
        Self::new(HarnessErrorCode::MalformedPlan, reason)
    }

    /// Create a cache inconsistency error
    pub fn cache_inconsistency(reason: impl Into<String>) -> Self {
        Self::new(HarnessErrorCode::CacheInconsistency, reason)
    }

    /// Create a performance regression error
    pub fn performance_regression(reason: impl Into<String>) -> Self {
        Self::new(HarnessErrorCode::PerformanceRegression, reason)
    }

    /// Create an index lifecycle error
    pub fn index_lifecycle(reason: impl Into<String>) -> Self {
        Self::new(HarnessErrorCode::IndexLifecycle, reason)
    }

    /// Create an execution failed error
    pub fn execution_failed(reason: impl Into<String>) -> Self {
        Self::new(HarnessErrorCode::ExecutionFailed, reason)
    }

    /// Create an assertion failed error
    pub fn assertion_failed(reason: impl Into<String>) -> Self {
        Self::new(HarnessErrorCode::AssertionFailed, reason)
    }

    /// Create a config invalid error
    pub fn config_invalid(reason: impl Into<String>) -> Self {
        Self::new(HarnessErrorCode::ConfigInvalid, reason)
    }

    /// Attach the offending query for diagnosis
    pub fn with_query(mut self, query: impl Into<String>) -> Self {
        self.query = Some(query.into());
        self
    }

    /// Returns the error code
    pub fn code(&self) -> HarnessErrorCode {
        self.code
    }

    /// Returns the severity level
    pub fn severity(&self) -> Severity {
        self.code.severity()
    }

    /// Returns the reporting category
    pub fn category(&self) -> ErrorCategory {
        self.code.category()
    }

    /// Returns the error message
    pub fn message(&self) -> &str {
        &self.message
    }

    /// Returns the attached query, if any
    pub fn query(&self) -> Option<&str> {
        self.query.as_deref()
    }

    /// Returns whether this is a fatal error
    pub fn is_fatal(&self) -> bool {
        self.severity() == Severity::Fatal
    }
}

impl fmt::Display for HarnessError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "[{}] {}: {}",
            self.code.severity(),
            self.code.code(),
            self.message
        )?;
        if let Some(query) = &self.query {
            write!(f, " [query: {}]", query)?;
        }
        Ok(())
    }
}

impl std::error::Error for HarnessError {}

/// Result type for harness operations
pub type HarnessResult<T> = Result<T, HarnessError>;
