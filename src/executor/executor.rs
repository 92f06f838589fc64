//! Query executor for planprobe
//!
//! Runs a query against a `DocumentStore` and returns its result set
//! together with its explain output.
//!
//! Execution order for `run`:
//! 1. Request the explain for the query
//! 2. Parse it into an `ExplainResult`
//! 3. Fetch the result set, timing only this step
//!
//! The executor holds a shared borrow of the store for the whole call, so
//! no index can change between the explain and the fetch through the
//! harness.

use std::time::{Duration, Instant};

use serde_json::Value;

use crate::config::HarnessConfig;
use crate::errors::{HarnessError, HarnessResult};
use crate::observability::{format_ms, log_event_with_fields, Event, MetricsRegistry};
use crate::plan::ExplainResult;
use crate::store::{Document, DocumentStore, FindRequest, StoreError};

use super::query::Query;
use super::result::Execution;

/// Issues queries and retrieves their plans
pub struct QueryExecutor<'a, S: DocumentStore + ?Sized> {
    store: &'a S,
    log_explain: bool,
    metrics: Option<&'a MetricsRegistry>,
}

impl<'a, S: DocumentStore + ?Sized> QueryExecutor<'a, S> {
    /// Creates a new executor
    pub fn new(store: &'a S) -> Self {
        Self {
            store,
            log_explain: false,
            metrics: None,
        }
    }

    /// Executor honoring the configured explain logging
    pub fn from_config(store: &'a S, config: &HarnessConfig) -> Self {
        Self::new(store).with_explain_logging(config.log_explain)
    }

    /// Log every raw explain document
    pub fn with_explain_logging(mut self, enabled: bool) -> Self {
        self.log_explain = enabled;
        self
    }

    /// Count executed and rejected queries
    pub fn with_metrics(mut self, metrics: &'a MetricsRegistry) -> Self {
        self.metrics = Some(metrics);
        self
    }

    /// Explain then fetch, as one unit
    pub fn run(&self, query: &Query) -> HarnessResult<Execution> {
        let explain = self.explain(query)?;
        let (documents, duration) = self.fetch_timed(query)?;

        let count = documents.len().to_string();
        let millis = format_ms(duration);
        let strategy = explain.winning_plan.to_string();
        log_event_with_fields(
            Event::QueryExecuted,
            &[
                ("kind", query.kind()),
                ("documents", count.as_str()),
                ("duration_ms", millis.as_str()),
                ("plan", strategy.as_str()),
            ],
        );
        if let Some(metrics) = self.metrics {
            metrics.increment_queries_executed();
        }

        Ok(Execution {
            documents,
            explain,
            duration,
        })
    }

    /// Explain output of a query, without fetching results
    pub fn explain(&self, query: &Query) -> HarnessResult<ExplainResult> {
        let raw = match query {
            Query::Find(request) => self.store.explain_find(request),
            Query::Aggregate(pipeline) => self.store.explain_aggregate(pipeline),
        }
        .map_err(|e| self.classify(query, e))?;

        if self.log_explain {
            self.log_raw_explain(query, &raw);
        }

        ExplainResult::from_document(&raw).map_err(|e| e.with_query(query.to_string()))
    }

    /// Result set of a query, without its plan
    pub fn fetch(&self, query: &Query) -> HarnessResult<Vec<Document>> {
        self.fetch_timed(query).map(|(documents, _)| documents)
    }

    /// Run a find forcing the named index
    pub fn hinted(&self, request: &FindRequest, index_name: &str) -> HarnessResult<Execution> {
        self.run(&Query::Find(request.clone().hint(index_name)))
    }

    fn fetch_timed(&self, query: &Query) -> HarnessResult<(Vec<Document>, Duration)> {
        let start = Instant::now();
        let documents = match query {
            Query::Find(request) => self.store.find(request),
            Query::Aggregate(pipeline) => self.store.aggregate(pipeline),
        }
        .map_err(|e| self.classify(query, e))?;
        Ok((documents, start.elapsed()))
    }

    fn classify(&self, query: &Query, error: StoreError) -> HarnessError {
        let rendered = query.to_string();
        if error.is_rejection() {
            let reason = error.to_string();
            log_event_with_fields(
                Event::QueryRejected,
                &[
                    ("kind", query.kind()),
                    ("query", rendered.as_str()),
                    ("reason", reason.as_str()),
                ],
            );
            if let Some(metrics) = self.metrics {
                metrics.increment_queries_rejected();
            }
            HarnessError::query_rejected(reason).with_query(rendered)
        } else {
            HarnessError::execution_failed(error.to_string()).with_query(rendered)
        }
    }

    fn log_raw_explain(&self, query: &Query, raw: &Value) {
        let rendered = raw.to_string();
        log_event_with_fields(
            Event::ExplainOutput,
            &[("kind", query.kind()), ("explain", rendered.as_str())],
        );
    }
}
