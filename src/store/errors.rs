//! Errors reported by the database collaborator
//!
//! Failures are classified by category, never by message text.

use std::fmt;

use thiserror::Error;

/// Result type for store operations
pub type StoreResult<T> = Result<T, StoreError>;

/// Category of a store failure
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum StoreErrorKind {
    /// The filter or pipeline was refused as malformed
    QueryRejected,
    /// An index with this name already exists
    IndexAlreadyExists,
    /// The named index does not exist
    IndexNotFound,
    /// Index name or key spec collides with an existing index
    IndexConflict,
    /// The store cannot be reached or is in a broken state
    Unavailable,
    /// Any other failure
    Other,
}

impl StoreErrorKind {
    /// Returns the string representation
    pub fn as_str(&self) -> &'static str {
        match self {
            StoreErrorKind::QueryRejected => "QUERY_REJECTED",
            StoreErrorKind::IndexAlreadyExists => "INDEX_ALREADY_EXISTS",
            StoreErrorKind::IndexNotFound => "INDEX_NOT_FOUND",
            StoreErrorKind::IndexConflict => "INDEX_CONFLICT",
            StoreErrorKind::Unavailable => "UNAVAILABLE",
            StoreErrorKind::Other => "OTHER",
        }
    }
}

impl fmt::Display for StoreErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Error returned by a `DocumentStore`
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("[{kind}] {message}")]
pub struct StoreError {
    kind: StoreErrorKind,
    code: Option<i32>,
    message: String,
}

impl StoreError {
    /// Create an error of the given category
    pub fn new(kind: StoreErrorKind, message: impl Into<String>) -> Self {
        Self {
            kind,
            code: None,
            message: message.into(),
        }
    }

    /// Create an error from a server error code, classifying it by code
    pub fn from_server_code(code: i32, message: impl Into<String>) -> Self {
        let kind = match code {
            // BadValue, FailedToParse, TypeMismatch, InvalidPipelineOperator,
            // unknown accumulator, $match/$group/$limit argument errors,
            // unrecognized pipeline stage
            2 | 9 | 14 | 168 | 15952 | 15955 | 15956 | 15958 | 15959 | 15975 | 40323
            | 40324 => StoreErrorKind::QueryRejected,
            27 => StoreErrorKind::IndexNotFound,
            68 => StoreErrorKind::IndexAlreadyExists,
            85 | 86 => StoreErrorKind::IndexConflict,
            6 | 89 | 91 | 189 => StoreErrorKind::Unavailable,
            _ => StoreErrorKind::Other,
        };
        Self {
            kind,
            code: Some(code),
            message: message.into(),
        }
    }

    /// Create a query rejected error with a server code
    pub fn rejected(code: i32, message: impl Into<String>) -> Self {
        Self {
            kind: StoreErrorKind::QueryRejected,
            code: Some(code),
            message: message.into(),
        }
    }

    /// Create an unavailable error
    pub fn unavailable(message: impl Into<String>) -> Self {
        Self::new(StoreErrorKind::Unavailable, message)
    }

    /// Returns the failure category
    pub fn kind(&self) -> StoreErrorKind {
        self.kind
    }

    /// Returns the server error code, if any
    pub fn code(&self) -> Option<i32> {
        self.code
    }

    /// Returns the error message
    pub fn message(&self) -> &str {
        &self.message
    }

    /// Returns true if the store refused the query as malformed
    pub fn is_rejection(&self) -> bool {
        self.kind == StoreErrorKind::QueryRejected
    }
}
