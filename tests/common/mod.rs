//! Shared fixtures for integration tests

#![allow(dead_code)]

use std::collections::HashSet;
use std::sync::Mutex;

use planprobe::store::{
    Document, DocumentStore, FindRequest, IndexSpec, MemoryStore, Pipeline, StoreError,
    StoreResult,
};
use planprobe::Harness;
use serde_json::{json, Value};

// =============================================================================
// Movies Collection
// =============================================================================

/// A small movies collection in the shape of the public sample dataset
pub fn movies() -> Vec<Value> {
    vec![
        json!({
            "title": "The Godfather", "year": 1972, "genres": ["Crime", "Drama"],
            "cast": ["Marlon Brando", "Al Pacino"],
            "imdb": {"rating": 9.2, "votes": 1565120},
            "awards": {"wins": 28},
            "tomatoes": {"viewer": {"rating": 4.4, "numReviews": 725000}}
        }),
        json!({
            "title": "The Shawshank Redemption", "year": 1994, "genres": ["Drama"],
            "cast": ["Tim Robbins", "Morgan Freeman"],
            "imdb": {"rating": 9.3, "votes": 2343110},
            "awards": {"wins": 21}
        }),
        json!({
            "title": "Forrest Gump", "year": 1994, "genres": ["Drama", "Romance"],
            "cast": ["Tom Hanks", "Robin Wright"],
            "imdb": {"rating": 8.8, "votes": 1809221},
            "awards": {"wins": 50}
        }),
        json!({
            "title": "Heat", "year": 1995, "genres": ["Action", "Crime", "Drama"],
            "cast": ["Al Pacino", "Robert De Niro"],
            "imdb": {"rating": 8.3, "votes": 580000}
        }),
        json!({
            "title": "Cast Away", "year": 2000, "genres": ["Adventure", "Drama"],
            "cast": ["Tom Hanks", "Helen Hunt"],
            "imdb": {"rating": 7.8, "votes": 540000},
            "awards": {"wins": 8}
        }),
        json!({
            "title": "Amelie", "year": 2001, "genres": ["Comedy", "Romance"],
            "cast": ["Audrey Tautou"],
            "imdb": {"rating": 8.3, "votes": 700000}
        }),
        json!({
            "title": "Spirited Away", "year": 2001, "genres": ["Animation", "Adventure", "Family"],
            "imdb": {"rating": 8.6, "votes": 690000}
        }),
        json!({
            "title": "The Dark Knight", "year": 2008, "genres": ["Action", "Crime", "Drama"],
            "cast": ["Christian Bale", "Heath Ledger"],
            "imdb": {"rating": 9.0, "votes": 2300000},
            "awards": {"wins": 159}
        }),
        json!({
            "title": "Inception", "year": 2010, "genres": ["Action", "Adventure", "Sci-Fi"],
            "cast": ["Leonardo DiCaprio"],
            "imdb": {"rating": 8.8, "votes": 2100000}
        }),
        json!({
            "title": "The Social Network", "year": 2010, "genres": ["Biography", "Drama"],
            "cast": ["Jesse Eisenberg"],
            "imdb": {"rating": 7.7, "votes": 650000}
        }),
        json!({
            "title": "Toy Story 3", "year": 2010, "genres": ["Animation", "Adventure", "Comedy"],
            "cast": ["Tom Hanks", "Tim Allen"],
            "imdb": {"rating": 8.4, "votes": 800000}
        }),
        json!({
            "title": "The Grand Budapest Hotel", "year": 2014, "genres": ["Adventure", "Comedy", "Crime"],
            "imdb": {"rating": 8.1, "votes": 760000}
        }),
        json!({
            "title": "Whiplash", "year": 2014, "genres": ["Drama", "Music"],
            "imdb": {"rating": 8.5, "votes": 780000},
            "awards": {"wins": 96}
        }),
        json!({
            "title": "Mad Max: Fury Road", "year": 2015, "genres": ["Action", "Adventure", "Sci-Fi"],
            "imdb": {"rating": 8.1, "votes": 950000}
        }),
    ]
}

/// Memory store loaded with the movies collection
pub fn movies_store() -> MemoryStore {
    MemoryStore::with_documents("movies", movies()).expect("fixture documents are objects")
}

/// Harness over the movies collection
pub fn movies_harness() -> Harness<MemoryStore> {
    Harness::new(movies_store())
}

/// Index names in a store's catalog, sorted
pub fn index_names<S: DocumentStore + ?Sized>(store: &S) -> Vec<String> {
    let mut names: Vec<String> = store
        .list_indexes()
        .expect("list indexes")
        .into_iter()
        .map(|spec| spec.name)
        .collect();
    names.sort();
    names
}

/// Titles of a result set, in result order
pub fn titles(documents: &[Document]) -> Vec<String> {
    documents
        .iter()
        .filter_map(|d| d.get("title").and_then(Value::as_str))
        .map(str::to_string)
        .collect()
}

// =============================================================================
// Fault Injection
// =============================================================================

/// Memory store whose index operations can be made to fail
pub struct FlakyStore {
    inner: MemoryStore,
    failing_drops: Mutex<HashSet<String>>,
    failing_creates: Mutex<HashSet<String>>,
}

impl FlakyStore {
    pub fn new(inner: MemoryStore) -> Self {
        Self {
            inner,
            failing_drops: Mutex::new(HashSet::new()),
            failing_creates: Mutex::new(HashSet::new()),
        }
    }

    /// Make every drop of `name` fail as if the server were unreachable
    pub fn fail_drop(&self, name: &str) {
        self.failing_drops.lock().unwrap().insert(name.to_string());
    }

    /// Make every creation of `name` fail as if the server were unreachable
    pub fn fail_create(&self, name: &str) {
        self.failing_creates.lock().unwrap().insert(name.to_string());
    }

    /// Let drops of `name` succeed again
    pub fn heal_drop(&self, name: &str) {
        self.failing_drops.lock().unwrap().remove(name);
    }

    pub fn inner(&self) -> &MemoryStore {
        &self.inner
    }
}

impl DocumentStore for FlakyStore {
    fn find(&self, request: &FindRequest) -> StoreResult<Vec<Document>> {
        self.inner.find(request)
    }

    fn explain_find(&self, request: &FindRequest) -> StoreResult<Value> {
        self.inner.explain_find(request)
    }

    fn aggregate(&self, pipeline: &Pipeline) -> StoreResult<Vec<Document>> {
        self.inner.aggregate(pipeline)
    }

    fn explain_aggregate(&self, pipeline: &Pipeline) -> StoreResult<Value> {
        self.inner.explain_aggregate(pipeline)
    }

    fn create_index(&self, spec: &IndexSpec) -> StoreResult<()> {
        if self.failing_creates.lock().unwrap().contains(&spec.name) {
            return Err(StoreError::unavailable("connection reset during createIndexes"));
        }
        self.inner.create_index(spec)
    }

    fn drop_index(&self, name: &str) -> StoreResult<()> {
        if self.failing_drops.lock().unwrap().contains(name) {
            return Err(StoreError::unavailable("connection reset during dropIndexes"));
        }
        self.inner.drop_index(name)
    }

    fn list_indexes(&self) -> StoreResult<Vec<IndexSpec>> {
        self.inner.list_indexes()
    }
}
