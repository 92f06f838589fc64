//! Plan Selection Tests
//!
//! Tests for scan strategy classification against the movies collection:
//! - An index on the filtered field yields an index scan
//! - No usable index yields a collection scan
//! - The scan strategy never changes which documents are returned
//! - A hint forces the named index

mod common;

use common::{movies_harness, movies_store, titles};
use planprobe::assertions::{assert_collection_scan, assert_docs_not_empty, assert_index_scan};
use planprobe::executor::{Query, QueryExecutor};
use planprobe::index::{IndexScope, NameLedger};
use planprobe::plan::{PlanInspector, ScanType};
use planprobe::store::{FindRequest, IndexSpec};
use serde_json::json;

// =============================================================================
// Index Scan Selection
// =============================================================================

/// Equality on an indexed array field scans that index.
#[test]
fn test_basic_plan_selection() {
    let harness = movies_harness();
    let report = harness.run_scenario("basic plan selection", |ctx| {
        ctx.indexes.drop_all_except(|name| name.contains("text"))?;
        ctx.indexes
            .create(IndexSpec::single("genres", "test_genres_idx"))?;

        let request = FindRequest::new(json!({"genres": "Drama"})).limit(5);
        let execution = ctx.run(&Query::Find(request))?;

        let strategy = ctx.classify(&execution.explain)?;
        assert_eq!(strategy.kind, ScanType::IndexScan);
        assert_eq!(strategy.index_name.as_deref(), Some("test_genres_idx"));
        assert_docs_not_empty(&execution.documents, "drama query")?;
        assert_eq!(execution.len(), 5);
        Ok(())
    });

    assert!(report.is_passed(), "{:?}", report.error());
    assert_eq!(report.teardown.dropped, vec!["test_genres_idx".to_string()]);
}

/// The winning plan wraps the index scan in a fetch.
#[test]
fn test_index_scan_is_wrapped_in_fetch() {
    let store = movies_store();
    let mut scope = IndexScope::new(&store, NameLedger::new(), "fetch_wrap");
    scope
        .create(IndexSpec::single("genres", "test_genres_idx"))
        .unwrap();

    let executor = QueryExecutor::new(&store);
    let explain = executor.explain(&Query::find(json!({"genres": "Drama"}))).unwrap();
    assert_eq!(explain.winning_plan.stage_name(), "FETCH");
    assert_eq!(
        explain.winning_plan.to_string(),
        "FETCH -> IXSCAN(test_genres_idx)"
    );
}

/// A covered projection puts the index scan under a projection stage.
#[test]
fn test_covered_projection_still_classifies() {
    let store = movies_store();
    let mut scope = IndexScope::new(&store, NameLedger::new(), "covered");
    scope.create(IndexSpec::single("year", "test_year_idx")).unwrap();

    let executor = QueryExecutor::new(&store);
    let request =
        FindRequest::new(json!({"year": 2010})).with_projection(json!({"year": 1, "_id": 0}));
    let execution = executor.run(&Query::Find(request)).unwrap();

    assert_ne!(execution.explain.winning_plan.stage_name(), "FETCH");
    assert_index_scan(&PlanInspector::default(), &execution.explain, "test_year_idx").unwrap();
    assert_eq!(execution.len(), 3);
    assert!(execution.documents.iter().all(|d| d.len() == 1));
}

// =============================================================================
// Collection Scan vs Index Scan
// =============================================================================

/// Creating an index flips the strategy without changing results.
#[test]
fn test_collection_scan_vs_index_scan() {
    let harness = movies_harness();
    let report = harness.run_scenario("collection scan vs index scan", |ctx| {
        let query = Query::find(json!({"imdb.rating": {"$gte": 9.0}}));

        let without = ctx.run(&query)?;
        assert_collection_scan(&ctx.inspector, &without.explain)?;
        ctx.perf.record("without_index", without.duration);

        ctx.indexes
            .create(IndexSpec::single("imdb.rating", "test_performance_idx"))?;

        let with = ctx.run(&query)?;
        assert_index_scan(&ctx.inspector, &with.explain, "test_performance_idx")?;
        ctx.perf.record("with_index", with.duration);

        assert_eq!(without.len(), with.len());
        assert_eq!(titles(&without.documents), titles(&with.documents));
        assert_eq!(without.len(), 3);
        Ok(())
    });

    assert!(report.is_passed(), "{:?}", report.error());
}

/// Range predicates render their bounds on the scanned index.
#[test]
fn test_range_query_bounds() {
    let store = movies_store();
    let mut scope = IndexScope::new(&store, NameLedger::new(), "range");
    scope.create(IndexSpec::single("year", "test_range_idx")).unwrap();

    let executor = QueryExecutor::new(&store);
    let execution = executor
        .run(&Query::find(json!({"year": {"$gte": 2000, "$lte": 2010}})))
        .unwrap();

    let inspector = PlanInspector::default();
    let bounds = inspector.index_bounds(&execution.explain);
    assert_eq!(bounds.get("year"), Some(&vec!["[2000, 2010]".to_string()]));
    assert_eq!(execution.len(), 7);
}

/// An index on a field the filter never mentions is not used.
#[test]
fn test_unrelated_index_is_ignored() {
    let store = movies_store();
    let mut scope = IndexScope::new(&store, NameLedger::new(), "unrelated");
    scope.create(IndexSpec::single("year", "test_year_idx")).unwrap();

    let executor = QueryExecutor::new(&store);
    let execution = executor.run(&Query::find(json!({"genres": "Comedy"}))).unwrap();
    let strategy = PlanInspector::default().classify(&execution.explain).unwrap();
    assert_eq!(strategy.kind, ScanType::CollectionScan);
    assert!(strategy.index_name.is_none());
}

// =============================================================================
// Hints
// =============================================================================

/// A hint overrides the planner's own choice.
#[test]
fn test_index_hint_functionality() {
    let harness = movies_harness();
    let report = harness.run_scenario("index hint functionality", |ctx| {
        ctx.indexes
            .create(IndexSpec::single("genres", "test_hint_genres"))?;
        ctx.indexes
            .create(IndexSpec::single("year", "test_hint_year"))?;

        let request = FindRequest::new(json!({"genres": "Drama", "year": {"$gte": 2000}}));

        let hinted = ctx.executor.hinted(&request, "test_hint_genres")?;
        let strategy = ctx.classify(&hinted.explain)?;
        assert_eq!(strategy.index_name.as_deref(), Some("test_hint_genres"));

        let other = ctx.executor.hinted(&request, "test_hint_year")?;
        assert_index_scan(&ctx.inspector, &other.explain, "test_hint_year")?;

        assert_eq!(titles(&hinted.documents), titles(&other.documents));
        assert_eq!(hinted.len(), 4);
        Ok(())
    });

    assert!(report.is_passed(), "{:?}", report.error());
    assert_eq!(report.teardown.dropped.len(), 2);
}

/// Hinting an index that does not exist is a rejection.
#[test]
fn test_unknown_hint_is_rejected() {
    let store = movies_store();
    let executor = QueryExecutor::new(&store);
    let request = FindRequest::new(json!({"genres": "Drama"}));

    let err = executor.hinted(&request, "missing_idx").unwrap_err();
    assert_eq!(err.code(), planprobe::HarnessErrorCode::QueryRejected);
    assert!(err.query().unwrap().contains("missing_idx"));
}

// =============================================================================
// Aggregations
// =============================================================================

/// A leading $match uses the index whether or not later stages are absorbed.
#[test]
fn test_pipeline_match_uses_index() {
    let store = movies_store();
    let mut scope = IndexScope::new(&store, NameLedger::new(), "pipeline");
    scope
        .create(IndexSpec::single("genres", "test_genres_idx"))
        .unwrap();

    let executor = QueryExecutor::new(&store);
    let inspector = PlanInspector::default();

    let absorbed = Query::aggregate(json!([
        {"$match": {"genres": "Drama"}},
        {"$sort": {"imdb.rating": -1}},
        {"$limit": 10}
    ]));
    let execution = executor.run(&absorbed).unwrap();
    assert!(inspector.is_using_index(&execution.explain, "test_genres_idx"));
    assert_eq!(titles(&execution.documents)[0], "The Shawshank Redemption");

    let grouped = Query::aggregate(json!([
        {"$match": {"genres": "Drama"}},
        {"$group": {"_id": "$year", "count": {"$sum": 1}}}
    ]));
    let execution = executor.run(&grouped).unwrap();
    assert!(inspector.is_using_index(&execution.explain, "test_genres_idx"));
    assert!(execution.explain.raw.get("stages").is_some());
}
