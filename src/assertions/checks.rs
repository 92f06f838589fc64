//! Result and execution checks
//!
//! Every check returns `AssertionFailed` on violation, prefixed with the
//! caller's message. Failure classification uses error categories only.

use serde_json::Value;

use super::types::{FieldTypes, SemanticType};
use crate::errors::{ErrorCategory, HarnessError, HarnessResult};
use crate::executor::{Execution, Query, QueryExecutor};
use crate::plan::{EffectiveStrategy, ExplainResult, PlanInspector, ScanType};
use crate::store::{get_path, Document, DocumentStore};

/// Resolve a dotted path through nested documents
pub fn resolve_field<'a>(document: &'a Document, path: &str) -> Option<&'a Value> {
    match path.split_once('.') {
        Some((head, rest)) => get_path(document.get(head)?, rest),
        None => document.get(path),
    }
}

/// Fail if the result set is empty
pub fn assert_docs_not_empty(documents: &[Document], message: &str) -> HarnessResult<()> {
    if documents.is_empty() {
        return Err(HarnessError::assertion_failed(format!(
            "{}: result set is empty",
            message
        )));
    }
    Ok(())
}

/// Fail unless the document carries the field
pub fn assert_field_exists(document: &Document, path: &str) -> HarnessResult<()> {
    if resolve_field(document, path).is_none() {
        return Err(HarnessError::assertion_failed(format!(
            "field {} is missing from document {}",
            path,
            document_id(document)
        )));
    }
    Ok(())
}

/// Fail unless the result set is non-empty and every document carries
/// every field
pub fn assert_result_structure(
    documents: &[Document],
    fields: &[&str],
    message: &str,
) -> HarnessResult<()> {
    assert_docs_not_empty(documents, message)?;
    for (position, document) in documents.iter().enumerate() {
        for field in fields {
            assert_field_exists(document, field).map_err(|e| {
                HarnessError::assertion_failed(format!(
                    "{}: document {}: {}",
                    message,
                    position,
                    e.message()
                ))
            })?;
        }
    }
    Ok(())
}

/// Fail if the result set is empty or a present field carries a tag
/// outside its allowed set.
///
/// Fields absent from a document are skipped.
pub fn assert_field_types(
    documents: &[Document],
    types: &FieldTypes,
    message: &str,
) -> HarnessResult<()> {
    assert_docs_not_empty(documents, message)?;
    for (position, document) in documents.iter().enumerate() {
        for (path, allowed) in types.iter() {
            let Some(value) = resolve_field(document, path) else {
                continue;
            };
            let actual = SemanticType::of(value);
            if !allowed.contains(&actual) {
                let expected: Vec<&str> = allowed.iter().map(SemanticType::type_name).collect();
                return Err(HarnessError::assertion_failed(format!(
                    "{}: document {} field {} is {}, expected one of [{}]",
                    message,
                    position,
                    path,
                    actual,
                    expected.join(", ")
                )));
            }
        }
    }
    Ok(())
}

/// Run a query and fail if it does not succeed
pub fn assert_query_succeeds<S: DocumentStore + ?Sized>(
    executor: &QueryExecutor<'_, S>,
    query: &Query,
    message: &str,
) -> HarnessResult<Execution> {
    executor.run(query).map_err(|e| {
        HarnessError::assertion_failed(format!("{}: expected success, got {}", message, e))
            .with_query(query.to_string())
    })
}

/// Run a query and fail unless it fails with the expected category.
///
/// Returns the observed error.
pub fn assert_query_fails<S: DocumentStore + ?Sized>(
    executor: &QueryExecutor<'_, S>,
    query: &Query,
    expected: ErrorCategory,
    message: &str,
) -> HarnessResult<HarnessError> {
    match executor.run(query) {
        Ok(execution) => Err(HarnessError::assertion_failed(format!(
            "{}: expected {} failure, query returned {} documents",
            message,
            expected.as_str(),
            execution.len()
        ))
        .with_query(query.to_string())),
        Err(e) if e.category() == expected => Ok(e),
        Err(e) => Err(HarnessError::assertion_failed(format!(
            "{}: expected {} failure, got {} ({})",
            message,
            expected.as_str(),
            e.category().as_str(),
            e
        ))
        .with_query(query.to_string())),
    }
}

/// Fail unless the effective strategy scans the named index
pub fn assert_index_scan(
    inspector: &PlanInspector,
    explain: &ExplainResult,
    index_name: &str,
) -> HarnessResult<EffectiveStrategy> {
    let strategy = inspector.classify(explain)?;
    match (&strategy.kind, &strategy.index_name) {
        (ScanType::IndexScan, Some(name)) if name == index_name => Ok(strategy),
        _ => Err(HarnessError::assertion_failed(format!(
            "expected index scan on {}, plan is {}",
            index_name, explain.winning_plan
        ))),
    }
}

/// Fail unless the effective strategy is a collection scan
pub fn assert_collection_scan(
    inspector: &PlanInspector,
    explain: &ExplainResult,
) -> HarnessResult<EffectiveStrategy> {
    let strategy = inspector.classify(explain)?;
    if strategy.kind != ScanType::CollectionScan {
        return Err(HarnessError::assertion_failed(format!(
            "expected collection scan, plan is {}",
            explain.winning_plan
        )));
    }
    Ok(strategy)
}

fn document_id(document: &Document) -> String {
    document
        .get("_id")
        .map(Value::to_string)
        .unwrap_or_else(|| "<no _id>".to_string())
}
