//! In-memory reference store
//!
//! Holds one collection of JSON documents and an index catalog. Indexes
//! only drive plan selection and explain output; the result set of a
//! query never depends on which plan wins.

use std::sync::{RwLock, RwLockReadGuard, RwLockWriteGuard};

use serde_json::{json, Value};
use uuid::Uuid;

use super::errors::{StoreError, StoreResult};
use super::filter::Filter;
use super::pipeline::{CompiledPipeline, Stage};
use super::planner::{PlanInput, QueryPlanner};
use super::projection::Projection;
use super::request::{Document, FindRequest, IndexSpec, Pipeline};
use super::shape::QueryShape;
use super::sorter::{ResultSorter, SortSpec};
use super::DocumentStore;

const CANNOT_CREATE_INDEX: i32 = 67;
const INVALID_OPTIONS: i32 = 72;
const INDEX_NOT_FOUND: i32 = 27;
const INDEX_OPTIONS_CONFLICT: i32 = 85;
const INDEX_KEY_SPECS_CONFLICT: i32 = 86;

/// In-memory `DocumentStore`
pub struct MemoryStore {
    namespace: String,
    documents: RwLock<Vec<Document>>,
    indexes: RwLock<Vec<IndexSpec>>,
}

/// Validated parts of a find request
struct CompiledFind {
    filter: Filter,
    sort: Option<SortSpec>,
    projection: Option<Projection>,
}

impl CompiledFind {
    fn compile(request: &FindRequest) -> StoreResult<Self> {
        Ok(Self {
            filter: Filter::compile(&request.filter)?,
            sort: request.sort.as_ref().map(SortSpec::parse).transpose()?,
            projection: request.projection.as_ref().map(Projection::parse).transpose()?,
        })
    }

    fn plan_input<'q>(&'q self, request: &'q FindRequest) -> PlanInput<'q> {
        PlanInput {
            filter: &self.filter,
            raw_filter: &request.filter,
            sort: self.sort.as_ref(),
            projection: self.projection.as_ref(),
            limit: request.limit,
            skip: None,
            hint: request.hint.as_deref(),
        }
    }
}

impl MemoryStore {
    /// Empty store for the named collection
    pub fn new(collection: &str) -> Self {
        Self {
            namespace: format!("sample.{}", collection),
            documents: RwLock::new(Vec::new()),
            indexes: RwLock::new(vec![IndexSpec::primary()]),
        }
    }

    /// Store preloaded with documents
    pub fn with_documents(collection: &str, documents: Vec<Value>) -> StoreResult<Self> {
        let store = Self::new(collection);
        store.insert_many(documents)?;
        Ok(store)
    }

    /// Namespace as shown in explain output
    pub fn namespace(&self) -> &str {
        &self.namespace
    }

    /// Insert one document, assigning an object id when `_id` is missing.
    ///
    /// Returns the document's `_id`.
    pub fn insert(&self, document: Value) -> StoreResult<Value> {
        let Value::Object(mut document) = document else {
            return Err(StoreError::rejected(2, "documents must be objects"));
        };
        let id = document
            .entry("_id")
            .or_insert_with(|| json!({ "$oid": new_object_id() }))
            .clone();
        self.write_documents()?.push(document);
        Ok(id)
    }

    /// Insert several documents
    pub fn insert_many(&self, documents: Vec<Value>) -> StoreResult<usize> {
        let count = documents.len();
        for document in documents {
            self.insert(document)?;
        }
        Ok(count)
    }

    /// Number of stored documents
    pub fn len(&self) -> StoreResult<usize> {
        Ok(self.read_documents()?.len())
    }

    /// Returns true if the collection is empty
    pub fn is_empty(&self) -> StoreResult<bool> {
        Ok(self.len()? == 0)
    }

    fn read_documents(&self) -> StoreResult<RwLockReadGuard<'_, Vec<Document>>> {
        self.documents
            .read()
            .map_err(|_| StoreError::unavailable("document lock poisoned"))
    }

    fn write_documents(&self) -> StoreResult<RwLockWriteGuard<'_, Vec<Document>>> {
        self.documents
            .write()
            .map_err(|_| StoreError::unavailable("document lock poisoned"))
    }

    fn read_indexes(&self) -> StoreResult<RwLockReadGuard<'_, Vec<IndexSpec>>> {
        self.indexes
            .read()
            .map_err(|_| StoreError::unavailable("index catalog lock poisoned"))
    }

    fn write_indexes(&self) -> StoreResult<RwLockWriteGuard<'_, Vec<IndexSpec>>> {
        self.indexes
            .write()
            .map_err(|_| StoreError::unavailable("index catalog lock poisoned"))
    }

    fn matching(&self, filter: &Filter) -> StoreResult<Vec<Document>> {
        Ok(self
            .read_documents()?
            .iter()
            .filter(|d| filter.matches(&Value::Object((*d).clone())))
            .cloned()
            .collect())
    }

    fn all_documents(&self) -> StoreResult<Vec<Document>> {
        Ok(self.read_documents()?.clone())
    }

    /// `queryPlanner` for the pushable prefix of a compiled pipeline
    fn cursor_planner(
        &self,
        pipeline: &Pipeline,
        compiled: &CompiledPipeline,
    ) -> StoreResult<(Value, usize)> {
        let stages = compiled.stages();
        let pushed = compiled.cursor_prefix();

        let match_all = json!({});
        let (filter, raw_filter) = match stages.first() {
            Some(Stage::Match(filter, raw)) => (filter.clone(), raw),
            _ => (Filter::compile(&match_all)?, &match_all),
        };

        let mut sort = None;
        let mut limit = None;
        let mut skip = None;
        let mut projection = None;
        for stage in &stages[..pushed] {
            match stage {
                Stage::Sort(spec) => sort = Some(spec),
                Stage::Limit(n) => limit = Some(*n as u64),
                Stage::Skip(n) => skip = Some(*n as u64),
                Stage::Project(p) => projection = Some(p),
                Stage::Match(..) | Stage::Group(_) | Stage::Count(_) => {}
            }
        }

        let input = PlanInput {
            filter: &filter,
            raw_filter,
            sort,
            projection,
            limit,
            skip,
            hint: None,
        };
        let shape = QueryShape::of_pipeline(&Pipeline::new(pipeline.stages[..pushed].to_vec()));
        let catalog = self.read_indexes()?;
        let planner = QueryPlanner::new(&catalog).explain(&self.namespace, &input, &shape)?;
        Ok((planner, pushed))
    }
}

/// 24 hex characters, the textual width of an object id
fn new_object_id() -> String {
    let mut id = Uuid::new_v4().simple().to_string();
    id.truncate(24);
    id
}

impl DocumentStore for MemoryStore {
    fn find(&self, request: &FindRequest) -> StoreResult<Vec<Document>> {
        let compiled = CompiledFind::compile(request)?;
        {
            let catalog = self.read_indexes()?;
            QueryPlanner::new(&catalog).choose(&compiled.plan_input(request))?;
        }

        let mut documents = self.matching(&compiled.filter)?;
        if let Some(sort) = &compiled.sort {
            ResultSorter::sort(&mut documents, sort);
        }
        if let Some(limit) = request.limit.filter(|l| *l > 0) {
            documents.truncate(limit as usize);
        }
        if let Some(projection) = &compiled.projection {
            documents = documents.iter().map(|d| projection.apply(d)).collect();
        }
        Ok(documents)
    }

    fn explain_find(&self, request: &FindRequest) -> StoreResult<Value> {
        let compiled = CompiledFind::compile(request)?;
        let shape = QueryShape::of_find(request);
        let catalog = self.read_indexes()?;
        let planner = QueryPlanner::new(&catalog).explain(
            &self.namespace,
            &compiled.plan_input(request),
            &shape,
        )?;

        Ok(json!({
            "queryPlanner": planner,
            "command": request.to_json(),
            "ok": 1.0,
        }))
    }

    fn aggregate(&self, pipeline: &Pipeline) -> StoreResult<Vec<Document>> {
        let compiled = CompiledPipeline::compile(pipeline)?;
        Ok(compiled.run(self.all_documents()?))
    }

    fn explain_aggregate(&self, pipeline: &Pipeline) -> StoreResult<Value> {
        let compiled = CompiledPipeline::compile(pipeline)?;
        let (planner, pushed) = self.cursor_planner(pipeline, &compiled)?;

        if pushed == compiled.stages().len() {
            return Ok(json!({
                "queryPlanner": planner,
                "command": pipeline.to_json(),
                "ok": 1.0,
            }));
        }

        let mut stages = vec![json!({ "$cursor": { "queryPlanner": planner } })];
        stages.extend(pipeline.stages[pushed..].iter().cloned());
        Ok(json!({
            "stages": stages,
            "command": pipeline.to_json(),
            "ok": 1.0,
        }))
    }

    fn create_index(&self, spec: &IndexSpec) -> StoreResult<()> {
        if spec.name.is_empty() || spec.keys.is_empty() {
            return Err(StoreError::from_server_code(
                CANNOT_CREATE_INDEX,
                format!("index specification needs a name and at least one key: {}", spec),
            ));
        }

        let mut catalog = self.write_indexes()?;
        if let Some(existing) = catalog.iter().find(|i| i.name == spec.name) {
            if existing.is_equivalent(spec) {
                return Ok(());
            }
            return Err(StoreError::from_server_code(
                INDEX_KEY_SPECS_CONFLICT,
                format!(
                    "An existing index has the same name as the requested index but different keys: {}",
                    existing
                ),
            ));
        }
        if let Some(existing) = catalog.iter().find(|i| i.is_equivalent(spec)) {
            return Err(StoreError::from_server_code(
                INDEX_OPTIONS_CONFLICT,
                format!(
                    "Index already exists with a different name: {}",
                    existing.name
                ),
            ));
        }

        catalog.push(spec.clone());
        Ok(())
    }

    fn drop_index(&self, name: &str) -> StoreResult<()> {
        if name == IndexSpec::primary().name {
            return Err(StoreError::from_server_code(
                INVALID_OPTIONS,
                "cannot drop _id index",
            ));
        }

        let mut catalog = self.write_indexes()?;
        let before = catalog.len();
        catalog.retain(|i| i.name != name);
        if catalog.len() == before {
            return Err(StoreError::from_server_code(
                INDEX_NOT_FOUND,
                format!("index not found with name [{}]", name),
            ));
        }
        Ok(())
    }

    fn list_indexes(&self) -> StoreResult<Vec<IndexSpec>> {
        Ok(self.read_indexes()?.clone())
    }
}
