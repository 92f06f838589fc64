//! Database collaborator contract
//!
//! The harness talks to the database only through `DocumentStore`. Every
//! method takes `&self`: a store handle is shared by the executor, the
//! index scopes and the harness, and the store does its own locking.
//!
//! `MemoryStore` is the in-process reference implementation used by the
//! integration tests. It follows the wire conventions of a real document
//! database closely enough that explain documents, server error codes and
//! cache identifiers exercise the same parsing paths.

mod errors;
mod expression;
mod filter;
mod memory;
mod pipeline;
mod planner;
mod projection;
mod request;
mod shape;
mod sorter;
mod value;

pub use errors::{StoreError, StoreErrorKind, StoreResult};
pub use memory::MemoryStore;
pub use request::{Document, FindRequest, IndexDirection, IndexField, IndexSpec, Pipeline};
pub use shape::QueryShape;
pub use value::{get_path, type_class, TypeClass};

use serde_json::Value;

/// Operations the harness needs from a document database
pub trait DocumentStore {
    /// Run a find and return the matching documents
    fn find(&self, request: &FindRequest) -> StoreResult<Vec<Document>>;

    /// Explain a find without returning documents
    fn explain_find(&self, request: &FindRequest) -> StoreResult<Value>;

    /// Run an aggregation pipeline
    fn aggregate(&self, pipeline: &Pipeline) -> StoreResult<Vec<Document>>;

    /// Explain an aggregation pipeline
    fn explain_aggregate(&self, pipeline: &Pipeline) -> StoreResult<Value>;

    /// Create a named index
    fn create_index(&self, spec: &IndexSpec) -> StoreResult<()>;

    /// Drop a named index
    fn drop_index(&self, name: &str) -> StoreResult<()>;

    /// List every index of the collection, including `_id_`
    fn list_indexes(&self) -> StoreResult<Vec<IndexSpec>>;
}

impl<S: DocumentStore + ?Sized> DocumentStore for std::sync::Arc<S> {
    fn find(&self, request: &FindRequest) -> StoreResult<Vec<Document>> {
        (**self).find(request)
    }

    fn explain_find(&self, request: &FindRequest) -> StoreResult<Value> {
        (**self).explain_find(request)
    }

    fn aggregate(&self, pipeline: &Pipeline) -> StoreResult<Vec<Document>> {
        (**self).aggregate(pipeline)
    }

    fn explain_aggregate(&self, pipeline: &Pipeline) -> StoreResult<Value> {
        (**self).explain_aggregate(pipeline)
    }

    fn create_index(&self, spec: &IndexSpec) -> StoreResult<()> {
        (**self).create_index(spec)
    }

    fn drop_index(&self, name: &str) -> StoreResult<()> {
        (**self).drop_index(name)
    }

    fn list_indexes(&self) -> StoreResult<Vec<IndexSpec>> {
        (**self).list_indexes()
    }
}
