//! Scenario runner
//!
//! A `Harness` owns the store handle and configuration. Each call to
//! `run_scenario` builds a fresh `ScenarioContext`, runs the body, releases
//! every index the body acquired and returns one report.
//!
//! # Failure precedence
//!
//! - The body's error wins; teardown diagnostics are kept in the report
//! - A teardown error fails a scenario only when the body passed
//! - A panicking body still releases its indexes while unwinding

use std::time::Instant;

use chrono::Utc;
use uuid::Uuid;

use super::report::{ScenarioOutcome, ScenarioReport};
use crate::cache::PlanCacheTracker;
use crate::config::HarnessConfig;
use crate::errors::HarnessResult;
use crate::executor::{Execution, Query, QueryExecutor};
use crate::index::{scenario_id, IndexScope, NameLedger, TeardownReport};
use crate::observability::{
    format_ms, log_event_with_fields, Event, MetricsRegistry, ObservationScope, Phase,
};
use crate::perf::{PerformanceComparator, RepetitionSummary, ToleranceOutcome};
use crate::plan::{EffectiveStrategy, ExplainResult, PlanInspector};
use crate::store::DocumentStore;

/// Run `f` inside an observation scope for `phase`
fn observe_phase<T>(
    phase: Phase,
    scenario: &str,
    f: impl FnOnce() -> HarnessResult<T>,
) -> HarnessResult<T> {
    let scope = ObservationScope::new(phase, scenario);
    match f() {
        Ok(value) => {
            scope.complete();
            Ok(value)
        }
        Err(e) => {
            scope.fail(&e.to_string());
            Err(e)
        }
    }
}

/// Owner of the store, configuration and shared scenario state
pub struct Harness<S: DocumentStore> {
    store: S,
    config: HarnessConfig,
    ledger: NameLedger,
    metrics: MetricsRegistry,
}

impl<S: DocumentStore> Harness<S> {
    /// Harness with the default configuration
    pub fn new(store: S) -> Self {
        Self {
            store,
            config: HarnessConfig::default(),
            ledger: NameLedger::new(),
            metrics: MetricsRegistry::new(),
        }
    }

    /// Harness with a validated configuration
    pub fn with_config(store: S, config: HarnessConfig) -> HarnessResult<Self> {
        config.validate()?;
        Ok(Self {
            config,
            ..Self::new(store)
        })
    }

    /// The store scenarios run against
    pub fn store(&self) -> &S {
        &self.store
    }

    pub fn config(&self) -> &HarnessConfig {
        &self.config
    }

    /// Index names held by live scenarios
    pub fn ledger(&self) -> &NameLedger {
        &self.ledger
    }

    pub fn metrics(&self) -> &MetricsRegistry {
        &self.metrics
    }

    /// Run one scenario and report its outcome
    pub fn run_scenario<F>(&self, name: &str, body: F) -> ScenarioReport
    where
        F: FnOnce(&mut ScenarioContext<'_, S>) -> HarnessResult<()>,
    {
        let run_id = Uuid::new_v4();
        let started_at = Utc::now();
        let started = Instant::now();
        let scenario_id = scenario_id(name);

        let run_label = run_id.to_string();
        log_event_with_fields(
            Event::ScenarioBegin,
            &[
                ("scenario", scenario_id.as_str()),
                ("name", name),
                ("run_id", run_label.as_str()),
            ],
        );

        let setup = ObservationScope::new(Phase::Setup, &scenario_id);
        let lease = match self.ledger.enter(&scenario_id) {
            Ok(lease) => lease,
            Err(e) => {
                setup.fail(e.message());
                let report = ScenarioReport {
                    name: name.to_string(),
                    scenario_id,
                    run_id,
                    started_at,
                    duration: started.elapsed(),
                    outcome: ScenarioOutcome::Failed(e),
                    teardown: TeardownReport::default(),
                };
                self.log_outcome(&report);
                return report;
            }
        };
        let mut context = ScenarioContext::new(self, scenario_id.clone());
        setup.complete();

        let result = observe_phase(Phase::Execute, &scenario_id, || body(&mut context));

        let scope = ObservationScope::new(Phase::Teardown, &scenario_id);
        let teardown = context.indexes.release();
        drop(context);
        drop(lease);
        let dropped = teardown.dropped.len().to_string();
        match teardown.to_error() {
            None => scope.complete_with_fields(&[("dropped", dropped.as_str())]),
            Some(e) => scope.fail(e.message()),
        }

        let outcome = match result {
            Err(e) => ScenarioOutcome::Failed(e),
            Ok(()) => match teardown.to_error() {
                Some(e) => ScenarioOutcome::Failed(e),
                None => ScenarioOutcome::Passed,
            },
        };

        let report = ScenarioReport {
            name: name.to_string(),
            scenario_id,
            run_id,
            started_at,
            duration: started.elapsed(),
            outcome,
            teardown,
        };
        self.log_outcome(&report);
        report
    }

    fn log_outcome(&self, report: &ScenarioReport) {
        let run_label = report.run_id.to_string();
        let millis = format_ms(report.duration);
        match report.error() {
            None => {
                self.metrics.increment_scenarios_passed();
                log_event_with_fields(
                    Event::ScenarioPassed,
                    &[
                        ("scenario", report.scenario_id.as_str()),
                        ("run_id", run_label.as_str()),
                        ("duration_ms", millis.as_str()),
                    ],
                );
            }
            Some(e) => {
                self.metrics.increment_scenarios_failed();
                let rendered = e.to_string();
                log_event_with_fields(
                    Event::ScenarioFailed,
                    &[
                        ("scenario", report.scenario_id.as_str()),
                        ("run_id", run_label.as_str()),
                        ("duration_ms", millis.as_str()),
                        ("category", e.category().as_str()),
                        ("error", rendered.as_str()),
                    ],
                );
            }
        }
    }
}

/// Collaborators available to one scenario body.
///
/// Fields are public so a body can hold the executor while mutating the
/// index scope or the trackers.
pub struct ScenarioContext<'a, S: DocumentStore> {
    pub indexes: IndexScope<'a, S>,
    pub executor: QueryExecutor<'a, S>,
    pub inspector: PlanInspector,
    pub cache: PlanCacheTracker,
    pub perf: PerformanceComparator,
    config: &'a HarnessConfig,
    metrics: &'a MetricsRegistry,
    scenario_id: String,
}

impl<'a, S: DocumentStore> ScenarioContext<'a, S> {
    fn new(harness: &'a Harness<S>, scenario_id: String) -> Self {
        let config = &harness.config;
        Self {
            indexes: IndexScope::new(&harness.store, harness.ledger.clone(), scenario_id.clone())
                .with_prefix(config.index_name_prefix.clone())
                .with_metrics(&harness.metrics),
            executor: QueryExecutor::from_config(&harness.store, config)
                .with_metrics(&harness.metrics),
            inspector: PlanInspector::from_config(config),
            cache: PlanCacheTracker::new(),
            perf: PerformanceComparator::from_config(config),
            config,
            metrics: &harness.metrics,
            scenario_id,
        }
    }

    pub fn scenario_id(&self) -> &str {
        &self.scenario_id
    }

    pub fn config(&self) -> &HarnessConfig {
        self.config
    }

    /// Scenario-unique index name for a base name
    pub fn index_name(&self, base: &str) -> String {
        self.indexes.scoped_name(base)
    }

    /// Run a query through the executor
    pub fn run(&self, query: &Query) -> HarnessResult<Execution> {
        self.executor.run(query)
    }

    /// Classify the winning plan and log the strategy
    pub fn classify(&self, explain: &ExplainResult) -> HarnessResult<EffectiveStrategy> {
        observe_phase(Phase::Inspect, &self.scenario_id, || {
            let strategy = self.inspector.classify(explain)?;
            let rendered = strategy.to_string();
            log_event_with_fields(
                Event::PlanClassified,
                &[
                    ("scenario", self.scenario_id.as_str()),
                    ("strategy", rendered.as_str()),
                ],
            );
            self.metrics.increment_plans_classified();
            Ok(strategy)
        })
    }

    /// Assert one cache identity for a shape group
    pub fn assert_cache_stable(&self, group_id: &str) -> HarnessResult<()> {
        observe_phase(Phase::Assert, &self.scenario_id, || {
            self.cache.assert_stable(group_id)
        })
    }

    /// Compare two recorded samples with the configured tolerance
    pub fn assert_within_tolerance(
        &self,
        baseline: &str,
        variant: &str,
    ) -> HarnessResult<ToleranceOutcome> {
        observe_phase(Phase::Assert, &self.scenario_id, || {
            self.perf
                .assert_within_tolerance(baseline, variant, self.perf.tolerance_factor())
        })
    }

    /// Check repeated runs against the first with the configured tolerance
    pub fn assert_monotonic_non_regression(
        &self,
        labels: &[&str],
    ) -> HarnessResult<RepetitionSummary> {
        observe_phase(Phase::Assert, &self.scenario_id, || {
            self.perf
                .assert_monotonic_non_regression(labels, self.perf.tolerance_factor())
        })
    }
}
