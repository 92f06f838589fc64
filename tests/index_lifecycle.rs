//! Index Lifecycle Tests
//!
//! Tests for scoped index acquisition:
//! - Creating an equivalent existing index and dropping a missing one succeed
//! - Every acquired index is released on success, failure and panic
//! - Teardown failures never mask the scenario's own failure
//! - Names are held by one live scenario at a time

mod common;

use std::panic::{self, AssertUnwindSafe};
use std::sync::Arc;

use common::{index_names, movies_store, FlakyStore};
use planprobe::index::{IndexScope, IndexState, NameLedger};
use planprobe::store::{DocumentStore, IndexSpec};
use planprobe::{ErrorCategory, Harness, HarnessError, HarnessErrorCode};

// =============================================================================
// Idempotence
// =============================================================================

/// An index that already exists with the same keys counts as created
/// and outlives the scope that adopted it.
#[test]
fn test_create_existing_equivalent_index() {
    let store = movies_store();
    store
        .create_index(&IndexSpec::single("genres", "test_genres_idx"))
        .unwrap();

    let mut scope = IndexScope::new(&store, NameLedger::new(), "existing");
    let handle = scope
        .create(IndexSpec::single("genres", "test_genres_idx"))
        .unwrap();
    assert_eq!(handle.state(), IndexState::Present);
    assert!(handle.is_adopted());

    let report = scope.release();
    assert!(report.dropped.is_empty());
    assert_eq!(report.retained, vec!["test_genres_idx".to_string()]);
    assert_eq!(
        index_names(&store),
        vec!["_id_".to_string(), "test_genres_idx".to_string()]
    );
}

/// A scenario leaves a pre-existing index in place after it ends.
#[test]
fn test_scenario_keeps_pre_existing_index() {
    let harness = Harness::new(movies_store());
    harness
        .store()
        .create_index(&IndexSpec::single("year", "shared_year_idx"))
        .unwrap();

    let report = harness.run_scenario("reuses shared index", |ctx| {
        ctx.indexes.create(IndexSpec::single("year", "shared_year_idx"))?;
        ctx.indexes.create(IndexSpec::single("genres", "test_genres_idx"))?;
        Ok(())
    });

    assert!(report.is_passed(), "{:?}", report.error());
    assert_eq!(report.teardown.dropped, vec!["test_genres_idx".to_string()]);
    assert_eq!(report.teardown.retained, vec!["shared_year_idx".to_string()]);
    assert_eq!(
        index_names(harness.store()),
        vec!["_id_".to_string(), "shared_year_idx".to_string()]
    );
}

/// Same name with different keys is a lifecycle error.
#[test]
fn test_create_conflicting_index() {
    let store = movies_store();
    store
        .create_index(&IndexSpec::single("genres", "test_genres_idx"))
        .unwrap();

    let ledger = NameLedger::new();
    let mut scope = IndexScope::new(&store, ledger.clone(), "conflict");
    let err = scope
        .create(IndexSpec::single("year", "test_genres_idx"))
        .unwrap_err();
    assert_eq!(err.code(), HarnessErrorCode::IndexLifecycle);
    assert!(scope.handles().is_empty());
    assert!(ledger.is_empty());
}

/// Dropping an index that does not exist succeeds.
#[test]
fn test_drop_missing_index() {
    let store = movies_store();
    let mut scope = IndexScope::new(&store, NameLedger::new(), "missing");
    scope.drop_index("test_never_created").unwrap();
}

/// An index dropped behind the scope's back is reported as already absent.
#[test]
fn test_release_after_external_drop() {
    let store = movies_store();
    let mut scope = IndexScope::new(&store, NameLedger::new(), "external");
    scope.create(IndexSpec::single("year", "test_year_idx")).unwrap();
    store.drop_index("test_year_idx").unwrap();

    let report = scope.release();
    assert!(report.is_clean());
    assert_eq!(report.already_absent, vec!["test_year_idx".to_string()]);
}

// =============================================================================
// Release On Every Exit Path
// =============================================================================

/// A failing body keeps its own error; teardown still runs.
#[test]
fn test_failed_scenario_releases_indexes() {
    let harness = Harness::new(movies_store());
    let report = harness.run_scenario("failing body", |ctx| {
        ctx.indexes
            .create(IndexSpec::single("genres", "test_genres_idx"))?;
        ctx.indexes.create(IndexSpec::single("year", "test_year_idx"))?;
        Err(HarnessError::assertion_failed("plan did not use the index"))
    });

    assert_eq!(report.error().unwrap().code(), HarnessErrorCode::AssertionFailed);
    assert_eq!(
        report.teardown.dropped,
        vec!["test_year_idx".to_string(), "test_genres_idx".to_string()]
    );
    assert_eq!(index_names(harness.store()), vec!["_id_".to_string()]);
}

/// A panicking body releases its indexes while unwinding.
#[test]
fn test_panicking_scenario_releases_indexes() {
    let harness = Harness::new(movies_store());
    let outcome = panic::catch_unwind(AssertUnwindSafe(|| {
        harness.run_scenario("panicking body", |ctx| {
            ctx.indexes
                .create(IndexSpec::single("genres", "test_genres_idx"))?;
            panic!("scenario aborted");
        })
    }));

    assert!(outcome.is_err());
    assert_eq!(index_names(harness.store()), vec!["_id_".to_string()]);
    assert!(harness.ledger().is_empty());
}

/// A dropped scope releases what it still holds.
#[test]
fn test_scope_drop_releases() {
    let store = movies_store();
    {
        let mut scope = IndexScope::new(&store, NameLedger::new(), "dropped_scope");
        scope.create(IndexSpec::single("year", "test_year_idx")).unwrap();
        assert_eq!(index_names(&store).len(), 2);
    }
    assert_eq!(index_names(&store), vec!["_id_".to_string()]);
}

// =============================================================================
// Teardown Failures
// =============================================================================

/// A teardown failure is recorded but the body's failure wins.
#[test]
fn test_teardown_failure_does_not_mask_body_failure() {
    let store = FlakyStore::new(movies_store());
    store.fail_drop("test_genres_idx");
    let harness = Harness::new(store);

    let report = harness.run_scenario("masked teardown", |ctx| {
        ctx.indexes
            .create(IndexSpec::single("genres", "test_genres_idx"))?;
        Err(HarnessError::cache_inconsistency("two plan cache keys"))
    });

    assert_eq!(report.error().unwrap().code(), HarnessErrorCode::CacheInconsistency);
    assert_eq!(report.teardown.diagnostics.len(), 1);
    assert_eq!(report.teardown.diagnostics[0].index_name, "test_genres_idx");
    assert_eq!(harness.metrics().snapshot().teardown_diagnostics, 1);
}

/// A teardown failure fails a scenario whose body passed.
#[test]
fn test_teardown_failure_fails_passing_body() {
    let store = FlakyStore::new(movies_store());
    store.fail_drop("test_genres_idx");
    let harness = Harness::new(store);

    let report = harness.run_scenario("teardown only", |ctx| {
        ctx.indexes
            .create(IndexSpec::single("genres", "test_genres_idx"))?;
        Ok(())
    });

    let error = report.error().unwrap();
    assert_eq!(error.code(), HarnessErrorCode::IndexLifecycle);
    assert_eq!(error.category(), ErrorCategory::Lifecycle);
    assert!(error.message().contains("test_genres_idx"));

    harness.store().heal_drop("test_genres_idx");
    harness.store().inner().drop_index("test_genres_idx").unwrap();
}

/// A failed creation leaves neither a handle nor a claimed name.
#[test]
fn test_failed_create_leaves_nothing_behind() {
    let store = FlakyStore::new(movies_store());
    store.fail_create("test_genres_idx");
    let ledger = NameLedger::new();

    let mut scope = IndexScope::new(&store, ledger.clone(), "failed_create");
    let err = scope
        .create(IndexSpec::single("genres", "test_genres_idx"))
        .unwrap_err();
    assert_eq!(err.code(), HarnessErrorCode::IndexLifecycle);
    assert!(scope.handle("test_genres_idx").is_none());
    assert!(ledger.holder("test_genres_idx").is_none());
}

// =============================================================================
// Name Ownership
// =============================================================================

/// A name held by one live scenario is refused to another.
#[test]
fn test_name_held_by_live_scenario() {
    let store = movies_store();
    let ledger = NameLedger::new();

    let mut first = IndexScope::new(&store, ledger.clone(), "first");
    first
        .create(IndexSpec::single("genres", "test_genres_idx"))
        .unwrap();

    let mut second = IndexScope::new(&store, ledger.clone(), "second");
    let err = second
        .create(IndexSpec::single("genres", "test_genres_idx"))
        .unwrap_err();
    assert!(err.message().contains("first"));
    assert!(second.drop_index("test_genres_idx").is_err());
    assert!(second.drop_all_except(|_| false).unwrap().is_empty());

    first.release();
    second
        .create(IndexSpec::single("genres", "test_genres_idx"))
        .unwrap();
}

/// Scoped names embed the prefix and scenario id.
#[test]
fn test_scoped_names_are_scenario_unique() {
    let store = movies_store();
    let a = IndexScope::new(&store, NameLedger::new(), "plan_cache").with_prefix("probe");
    let b = IndexScope::new(&store, NameLedger::new(), "hint_override").with_prefix("probe");
    assert_eq!(a.scoped_name("genres_idx"), "probe_plan_cache_genres_idx");
    assert_ne!(a.scoped_name("genres_idx"), b.scoped_name("genres_idx"));
}

/// Names that slug alike still get separate scoped index names.
#[test]
fn test_similar_scenario_names_do_not_share_indexes() {
    let harness = Harness::new(movies_store());
    let report = harness.run_scenario("plan cache", |outer| {
        let outer_name = outer.index_name("shape_idx");
        outer
            .indexes
            .create(IndexSpec::single("genres", outer_name.clone()))?;

        let inner = harness.run_scenario("plan-cache", |inner| {
            let inner_name = inner.index_name("shape_idx");
            assert_ne!(inner_name, outer_name);
            inner.indexes.create(IndexSpec::single("year", inner_name))?;
            Ok(())
        });
        assert!(inner.is_passed(), "{:?}", inner.error());
        assert_ne!(inner.scenario_id, outer.scenario_id());

        assert!(index_names(harness.store()).contains(&outer_name));
        assert_eq!(harness.ledger().holder(&outer_name).as_deref(), Some(outer.scenario_id()));
        Ok(())
    });

    assert!(report.is_passed(), "{:?}", report.error());
    assert_eq!(report.teardown.dropped.len(), 1);
    assert!(report.teardown.already_absent.is_empty());
    assert_eq!(index_names(harness.store()), vec!["_id_".to_string()]);
}

/// Scenarios sharing one store across threads do not interfere.
#[test]
fn test_concurrent_scenarios_with_scoped_names() {
    let harness = Arc::new(Harness::new(movies_store()));

    let handles: Vec<_> = [("alpha", "genres"), ("beta", "year"), ("gamma", "title")]
        .into_iter()
        .map(|(name, field)| {
            let harness = Arc::clone(&harness);
            std::thread::spawn(move || {
                harness
                    .run_scenario(name, |ctx| {
                        let index = ctx.index_name(&format!("{}_idx", field));
                        ctx.indexes.create(IndexSpec::single(field, index.clone()))?;
                        assert!(ctx.indexes.handle(&index).is_some());
                        Ok(())
                    })
                    .is_passed()
            })
        })
        .collect();

    for handle in handles {
        assert!(handle.join().unwrap());
    }
    assert_eq!(index_names(harness.store()), vec!["_id_".to_string()]);
}
