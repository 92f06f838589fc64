//! Result of running a query

use std::time::Duration;

use crate::plan::ExplainResult;
use crate::store::Document;

/// Result set and plan of one query, fetched together
#[derive(Debug, Clone)]
pub struct Execution {
    /// Documents in result order
    pub documents: Vec<Document>,
    /// Plan the database reported for the query
    pub explain: ExplainResult,
    /// Time spent fetching the result set
    pub duration: Duration,
}

impl Execution {
    /// Number of documents returned
    pub fn len(&self) -> usize {
        self.documents.len()
    }

    /// Returns true if no document matched
    pub fn is_empty(&self) -> bool {
        self.documents.is_empty()
    }
}
