//! Assertion library
//!
//! Structural and type checks over result sets, success and failure
//! classification of query execution, and scan strategy checks.

mod checks;
mod types;

pub use checks::{
    assert_collection_scan, assert_docs_not_empty, assert_field_exists, assert_field_types,
    assert_index_scan, assert_query_fails, assert_query_succeeds, assert_result_structure,
    resolve_field,
};
pub use types::{FieldTypes, SemanticType};
