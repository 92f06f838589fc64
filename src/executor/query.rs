//! Queries issued by scenarios

use std::fmt;

use serde_json::Value;

use crate::store::{FindRequest, Pipeline};

/// A find or an aggregation, as one unit the executor can run
#[derive(Debug, Clone, PartialEq)]
pub enum Query {
    Find(FindRequest),
    Aggregate(Pipeline),
}

impl Query {
    /// Find with the given filter
    pub fn find(filter: Value) -> Self {
        Query::Find(FindRequest::new(filter))
    }

    /// Aggregation from a JSON array of stages
    pub fn aggregate(stages: Value) -> Self {
        Query::Aggregate(Pipeline::from_value(stages))
    }

    /// Operation name for logs
    pub fn kind(&self) -> &'static str {
        match self {
            Query::Find(_) => "find",
            Query::Aggregate(_) => "aggregate",
        }
    }

    /// Render for diagnostics
    pub fn to_json(&self) -> Value {
        match self {
            Query::Find(request) => request.to_json(),
            Query::Aggregate(pipeline) => pipeline.to_json(),
        }
    }
}

impl From<FindRequest> for Query {
    fn from(request: FindRequest) -> Self {
        Query::Find(request)
    }
}

impl From<Pipeline> for Query {
    fn from(pipeline: Pipeline) -> Self {
        Query::Aggregate(pipeline)
    }
}

impl fmt::Display for Query {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.to_json())
    }
}
