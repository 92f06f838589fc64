//! Scoped index acquisition
//!
//! Every index a scenario creates is registered in its `IndexScope` and
//! dropped again when the scope is released, in reverse creation order.
//! `release()` reports what happened; `Drop` releases whatever is left when
//! the scenario body unwinds.
//!
//! Only "index does not exist" is absorbed silently during teardown. Every
//! other release failure becomes a `TeardownDiagnostic`.
//!
//! An equivalent index that existed before `create` is adopted: the scope
//! holds its name but leaves the index in place at release.

use std::fmt;

use super::ledger::NameLedger;
use crate::errors::{HarnessError, HarnessResult};
use crate::observability::{log_event_with_fields, Event, MetricsRegistry};
use crate::store::{DocumentStore, IndexSpec, StoreError, StoreErrorKind};

/// Lifecycle state of one scoped index
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum IndexState {
    Absent,
    Creating,
    Present,
    Dropping,
}

impl IndexState {
    /// Returns the string representation
    pub fn as_str(&self) -> &'static str {
        match self {
            IndexState::Absent => "absent",
            IndexState::Creating => "creating",
            IndexState::Present => "present",
            IndexState::Dropping => "dropping",
        }
    }
}

/// An index owned by a scope
#[derive(Debug, Clone)]
pub struct IndexHandle {
    spec: IndexSpec,
    state: IndexState,
    adopted: bool,
}

impl IndexHandle {
    /// Index specification
    pub fn spec(&self) -> &IndexSpec {
        &self.spec
    }

    /// Index name
    pub fn name(&self) -> &str {
        &self.spec.name
    }

    /// Current lifecycle state
    pub fn state(&self) -> IndexState {
        self.state
    }

    /// Returns true if the index existed before the scope acquired it
    pub fn is_adopted(&self) -> bool {
        self.adopted
    }
}

/// A release failure that did not stop teardown
#[derive(Debug, Clone, PartialEq)]
pub struct TeardownDiagnostic {
    pub index_name: String,
    pub error: StoreError,
}

impl fmt::Display for TeardownDiagnostic {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "failed to drop {}: {}", self.index_name, self.error)
    }
}

/// Outcome of releasing a scope
#[derive(Debug, Clone, Default, PartialEq)]
pub struct TeardownReport {
    /// Indexes dropped by this release
    pub dropped: Vec<String>,
    /// Indexes that were already gone
    pub already_absent: Vec<String>,
    /// Adopted indexes left in place
    pub retained: Vec<String>,
    /// Release failures
    pub diagnostics: Vec<TeardownDiagnostic>,
}

impl TeardownReport {
    /// Returns true if every index was released
    pub fn is_clean(&self) -> bool {
        self.diagnostics.is_empty()
    }

    /// Append another report
    pub fn merge(&mut self, other: TeardownReport) {
        self.dropped.extend(other.dropped);
        self.already_absent.extend(other.already_absent);
        self.retained.extend(other.retained);
        self.diagnostics.extend(other.diagnostics);
    }

    /// The diagnostics as one lifecycle error, if there are any
    pub fn to_error(&self) -> Option<HarnessError> {
        if self.diagnostics.is_empty() {
            return None;
        }
        let details: Vec<String> = self.diagnostics.iter().map(|d| d.to_string()).collect();
        Some(HarnessError::index_lifecycle(format!(
            "teardown left {} index(es) behind: {}",
            self.diagnostics.len(),
            details.join("; ")
        )))
    }
}

/// Indexes acquired by one scenario
pub struct IndexScope<'a, S: DocumentStore + ?Sized> {
    store: &'a S,
    ledger: NameLedger,
    scenario_id: String,
    prefix: String,
    metrics: Option<&'a MetricsRegistry>,
    handles: Vec<IndexHandle>,
}

impl<'a, S: DocumentStore + ?Sized> IndexScope<'a, S> {
    /// Scope for one scenario
    pub fn new(store: &'a S, ledger: NameLedger, scenario_id: impl Into<String>) -> Self {
        Self {
            store,
            ledger,
            scenario_id: scenario_id.into(),
            prefix: "test".to_string(),
            metrics: None,
            handles: Vec::new(),
        }
    }

    /// Prefix used by `scoped_name`
    pub fn with_prefix(mut self, prefix: impl Into<String>) -> Self {
        self.prefix = prefix.into();
        self
    }

    /// Count created and dropped indexes in a registry
    pub fn with_metrics(mut self, metrics: &'a MetricsRegistry) -> Self {
        self.metrics = Some(metrics);
        self
    }

    /// Scenario that owns this scope
    pub fn scenario_id(&self) -> &str {
        &self.scenario_id
    }

    /// Scenario-unique index name derived from a base name
    pub fn scoped_name(&self, base: &str) -> String {
        format!("{}_{}_{}", self.prefix, self.scenario_id, base)
    }

    /// Indexes currently held, in creation order
    pub fn handles(&self) -> &[IndexHandle] {
        &self.handles
    }

    /// Handle of a held index
    pub fn handle(&self, name: &str) -> Option<&IndexHandle> {
        self.handles.iter().find(|h| h.name() == name)
    }

    /// Create an index and take ownership of it.
    ///
    /// An index that already exists with an equivalent key specification
    /// counts as created and is adopted rather than owned.
    pub fn create(&mut self, spec: IndexSpec) -> HarnessResult<&IndexHandle> {
        if let Some(position) = self.position(&spec.name) {
            let held = &self.handles[position];
            if held.spec.is_equivalent(&spec) {
                return Ok(&self.handles[position]);
            }
            return Err(HarnessError::index_lifecycle(format!(
                "scope already holds {} with different keys",
                held.spec
            )));
        }

        self.ledger.claim(&spec.name, &self.scenario_id)?;
        self.handles.push(IndexHandle {
            spec,
            state: IndexState::Creating,
            adopted: false,
        });
        let position = self.handles.len() - 1;

        match self.acquire(&self.handles[position].spec) {
            Ok(adopted) => {
                let handle = &mut self.handles[position];
                handle.state = IndexState::Present;
                handle.adopted = adopted;
                let keys = handle.spec.key_pattern().to_string();
                log_event_with_fields(
                    Event::IndexCreated,
                    &[
                        ("scenario", self.scenario_id.as_str()),
                        ("index", handle.spec.name.as_str()),
                        ("keys", keys.as_str()),
                        ("outcome", if adopted { "adopted" } else { "created" }),
                    ],
                );
                if !adopted {
                    if let Some(metrics) = self.metrics {
                        metrics.increment_indexes_created();
                    }
                }
                Ok(&self.handles[position])
            }
            Err(e) => {
                let handle = self.handles.remove(position);
                self.ledger.release(handle.name(), &self.scenario_id);
                Err(HarnessError::index_lifecycle(format!(
                    "failed to create {}: {}",
                    handle.spec, e
                )))
            }
        }
    }

    /// Create the index; returns true if an equivalent one already existed
    fn acquire(&self, spec: &IndexSpec) -> Result<bool, StoreError> {
        let existing = self.store.list_indexes()?;
        if existing
            .iter()
            .any(|i| i.name == spec.name && i.is_equivalent(spec))
        {
            return Ok(true);
        }
        match self.store.create_index(spec) {
            Ok(()) => Ok(false),
            Err(e) if e.kind() == StoreErrorKind::IndexAlreadyExists => {
                self.verify_equivalent(spec, e).map(|()| true)
            }
            Err(e) => Err(e),
        }
    }

    fn verify_equivalent(&self, spec: &IndexSpec, original: StoreError) -> Result<(), StoreError> {
        let existing = self.store.list_indexes()?;
        match existing.iter().find(|i| i.name == spec.name) {
            Some(found) if found.is_equivalent(spec) => Ok(()),
            _ => Err(original),
        }
    }

    fn position(&self, name: &str) -> Option<usize> {
        self.handles.iter().position(|h| h.name() == name)
    }

    /// Drop one index before the scope ends.
    ///
    /// A missing index counts as dropped. The name must not be held by
    /// another live scenario.
    pub fn drop_index(&mut self, name: &str) -> HarnessResult<()> {
        if let Some(holder) = self.ledger.holder(name) {
            if holder != self.scenario_id {
                return Err(HarnessError::index_lifecycle(format!(
                    "index {} is held by live scenario {}",
                    name, holder
                )));
            }
        }

        let position = self.position(name);
        if let Some(position) = position {
            self.handles[position].state = IndexState::Dropping;
        }

        match self.store.drop_index(name) {
            Ok(()) => {
                self.forget(position, name);
                self.log_dropped(name, "dropped");
                Ok(())
            }
            Err(e) if e.kind() == StoreErrorKind::IndexNotFound => {
                self.forget(position, name);
                self.log_dropped(name, "already_absent");
                Ok(())
            }
            Err(e) => {
                if let Some(position) = position {
                    self.handles[position].state = IndexState::Present;
                }
                Err(HarnessError::index_lifecycle(format!(
                    "failed to drop {}: {}",
                    name, e
                )))
            }
        }
    }

    fn forget(&mut self, position: Option<usize>, name: &str) {
        if let Some(position) = position {
            self.handles.remove(position);
        }
        self.ledger.release(name, &self.scenario_id);
    }

    fn log_dropped(&self, name: &str, outcome: &str) {
        log_event_with_fields(
            Event::IndexDropped,
            &[
                ("scenario", self.scenario_id.as_str()),
                ("index", name),
                ("outcome", outcome),
            ],
        );
        if outcome == "dropped" {
            if let Some(metrics) = self.metrics {
                metrics.increment_indexes_dropped();
            }
        }
    }

    /// Drop every index except `_id_` and those the predicate keeps.
    ///
    /// Indexes held by other live scenarios are left alone. Returns the
    /// names that were dropped.
    pub fn drop_all_except<F>(&mut self, keep: F) -> HarnessResult<Vec<String>>
    where
        F: Fn(&str) -> bool,
    {
        let existing = self.store.list_indexes().map_err(|e| {
            HarnessError::index_lifecycle(format!("failed to list indexes: {}", e))
        })?;

        let primary = IndexSpec::primary().name;
        let mut dropped = Vec::new();
        for index in existing {
            if index.name == primary || keep(&index.name) {
                continue;
            }
            if self
                .ledger
                .holder(&index.name)
                .is_some_and(|holder| holder != self.scenario_id)
            {
                continue;
            }
            self.drop_index(&index.name)?;
            dropped.push(index.name);
        }
        Ok(dropped)
    }

    /// Release every held index in reverse creation order.
    ///
    /// Adopted indexes are left in place.
    pub fn release(&mut self) -> TeardownReport {
        let mut report = TeardownReport::default();

        while let Some(mut handle) = self.handles.pop() {
            let name = handle.spec.name.clone();
            if handle.adopted {
                log_event_with_fields(
                    Event::IndexRetained,
                    &[
                        ("scenario", self.scenario_id.as_str()),
                        ("index", name.as_str()),
                    ],
                );
                report.retained.push(name.clone());
                self.ledger.release(&name, &self.scenario_id);
                continue;
            }
            handle.state = IndexState::Dropping;

            match self.store.drop_index(&name) {
                Ok(()) => {
                    self.log_dropped(&name, "dropped");
                    report.dropped.push(name.clone());
                }
                Err(e) if e.kind() == StoreErrorKind::IndexNotFound => {
                    self.log_dropped(&name, "already_absent");
                    report.already_absent.push(name.clone());
                }
                Err(e) => {
                    let message = e.to_string();
                    log_event_with_fields(
                        Event::TeardownDiagnostic,
                        &[
                            ("scenario", self.scenario_id.as_str()),
                            ("index", name.as_str()),
                            ("error", message.as_str()),
                        ],
                    );
                    if let Some(metrics) = self.metrics {
                        metrics.increment_teardown_diagnostics();
                    }
                    report.diagnostics.push(TeardownDiagnostic {
                        index_name: name.clone(),
                        error: e,
                    });
                }
            }
            self.ledger.release(&name, &self.scenario_id);
        }

        report
    }
}

impl<S: DocumentStore + ?Sized> Drop for IndexScope<'_, S> {
    fn drop(&mut self) {
        if !self.handles.is_empty() {
            self.release();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::errors::HarnessErrorCode;
    use crate::store::MemoryStore;

    fn store() -> MemoryStore {
        MemoryStore::new("movies")
    }

    fn names(store: &MemoryStore) -> Vec<String> {
        store
            .list_indexes()
            .unwrap()
            .into_iter()
            .map(|i| i.name)
            .collect()
    }

    #[test]
    fn test_create_and_release_in_reverse_order() {
        let store = store();
        let ledger = NameLedger::new();
        let mut scope = IndexScope::new(&store, ledger.clone(), "lifecycle");

        scope.create(IndexSpec::single("genres", "test_genres_idx")).unwrap();
        scope.create(IndexSpec::single("year", "test_year_idx")).unwrap();
        assert_eq!(
            scope.handle("test_genres_idx").map(IndexHandle::state),
            Some(IndexState::Present)
        );
        assert_eq!(ledger.held_by("lifecycle").len(), 2);

        let report = scope.release();
        assert_eq!(report.dropped, vec!["test_year_idx", "test_genres_idx"]);
        assert!(report.is_clean());
        assert!(report.to_error().is_none());
        assert_eq!(names(&store), vec!["_id_"]);
        assert!(ledger.is_empty());
    }

    #[test]
    fn test_create_is_idempotent() {
        let store = store();
        let mut scope = IndexScope::new(&store, NameLedger::new(), "idempotent");
        let spec = IndexSpec::single("genres", "test_genres_idx");

        scope.create(spec.clone()).unwrap();
        scope.create(spec).unwrap();
        assert_eq!(scope.handles().len(), 1);

        let err = scope
            .create(IndexSpec::single("year", "test_genres_idx"))
            .unwrap_err();
        assert_eq!(err.code(), HarnessErrorCode::IndexLifecycle);
    }

    #[test]
    fn test_failed_create_returns_to_absent() {
        let store = store();
        store.create_index(&IndexSpec::single("genres", "foreign_idx")).unwrap();
        let ledger = NameLedger::new();
        let mut scope = IndexScope::new(&store, ledger.clone(), "conflict");

        // Same keys under a different name conflict
        let err = scope
            .create(IndexSpec::single("genres", "test_genres_idx"))
            .unwrap_err();
        assert_eq!(err.code(), HarnessErrorCode::IndexLifecycle);
        assert!(scope.handles().is_empty());
        assert!(ledger.is_empty());
    }

    #[test]
    fn test_adopted_index_is_retained() {
        let store = store();
        store.create_index(&IndexSpec::single("genres", "shared_genres_idx")).unwrap();
        let ledger = NameLedger::new();
        let metrics = MetricsRegistry::new();
        let mut scope =
            IndexScope::new(&store, ledger.clone(), "adopting").with_metrics(&metrics);

        let handle = scope
            .create(IndexSpec::single("genres", "shared_genres_idx"))
            .unwrap();
        assert!(handle.is_adopted());
        assert_eq!(ledger.holder("shared_genres_idx").as_deref(), Some("adopting"));

        scope.create(IndexSpec::single("year", "test_year_idx")).unwrap();
        assert!(!scope.handle("test_year_idx").unwrap().is_adopted());

        let report = scope.release();
        assert_eq!(report.dropped, vec!["test_year_idx"]);
        assert_eq!(report.retained, vec!["shared_genres_idx"]);
        assert_eq!(names(&store), vec!["_id_", "shared_genres_idx"]);
        assert!(ledger.is_empty());
        assert_eq!(metrics.snapshot().indexes_created, 1);
    }

    #[test]
    fn test_drop_missing_index_succeeds() {
        let store = store();
        let mut scope = IndexScope::new(&store, NameLedger::new(), "drops");
        scope.drop_index("never_created_idx").unwrap();

        scope.create(IndexSpec::single("genres", "test_genres_idx")).unwrap();
        scope.drop_index("test_genres_idx").unwrap();
        assert!(scope.handles().is_empty());
        assert_eq!(scope.release(), TeardownReport::default());
    }

    #[test]
    fn test_release_tolerates_index_dropped_elsewhere() {
        let store = store();
        let mut scope = IndexScope::new(&store, NameLedger::new(), "external_drop");
        scope.create(IndexSpec::single("genres", "test_genres_idx")).unwrap();
        store.drop_index("test_genres_idx").unwrap();

        let report = scope.release();
        assert_eq!(report.already_absent, vec!["test_genres_idx"]);
        assert!(report.is_clean());
    }

    #[test]
    fn test_drop_releases_on_scope_end() {
        let store = store();
        let ledger = NameLedger::new();
        {
            let mut scope = IndexScope::new(&store, ledger.clone(), "dropped_scope");
            scope.create(IndexSpec::single("genres", "test_genres_idx")).unwrap();
        }
        assert_eq!(names(&store), vec!["_id_"]);
        assert!(ledger.is_empty());
    }

    #[test]
    fn test_ledger_refuses_other_scenarios() {
        let store = store();
        let ledger = NameLedger::new();
        let mut first = IndexScope::new(&store, ledger.clone(), "first");
        let mut second = IndexScope::new(&store, ledger.clone(), "second");

        first.create(IndexSpec::single("genres", "test_genres_idx")).unwrap();
        let err = second
            .create(IndexSpec::single("genres", "test_genres_idx"))
            .unwrap_err();
        assert_eq!(err.code(), HarnessErrorCode::IndexLifecycle);
        assert!(second.drop_index("test_genres_idx").is_err());
        assert_eq!(first.handles().len(), 1);
    }

    #[test]
    fn test_scoped_name() {
        let store = store();
        let scope = IndexScope::new(&store, NameLedger::new(), "plan_cache").with_prefix("probe");
        assert_eq!(scope.scoped_name("genres_idx"), "probe_plan_cache_genres_idx");
        assert_eq!(scope.scoped_name("genres_idx"), scope.scoped_name("genres_idx"));
    }

    #[test]
    fn test_drop_all_except() {
        let store = store();
        store.create_index(&IndexSpec::single("title", "leftover_idx")).unwrap();
        store.create_index(&IndexSpec::single("year", "keep_me")).unwrap();

        let ledger = NameLedger::new();
        let mut other = IndexScope::new(&store, ledger.clone(), "other");
        other.create(IndexSpec::single("genres", "other_genres_idx")).unwrap();

        let mut scope = IndexScope::new(&store, ledger, "cleaner");
        let dropped = scope.drop_all_except(|name| name == "keep_me").unwrap();
        assert_eq!(dropped, vec!["leftover_idx"]);

        let mut remaining = names(&store);
        remaining.sort();
        assert_eq!(remaining, vec!["_id_", "keep_me", "other_genres_idx"]);
    }

    #[test]
    fn test_metrics_counted() {
        let store = store();
        let metrics = MetricsRegistry::new();
        let mut scope =
            IndexScope::new(&store, NameLedger::new(), "metrics").with_metrics(&metrics);
        scope.create(IndexSpec::single("genres", "test_genres_idx")).unwrap();
        scope.release();

        let snapshot = metrics.snapshot();
        assert_eq!(snapshot.indexes_created, 1);
        assert_eq!(snapshot.indexes_dropped, 1);
    }
}
