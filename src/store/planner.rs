//! Plan selection and explain rendering for `MemoryStore`
//!
//! Selection order:
//! 1. A hint names the index outright (unknown names are rejected)
//! 2. An index whose leading field carries an indexable predicate;
//!    point predicates beat ranges, then index name breaks ties
//! 3. An index whose leading field matches the leading sort key
//! 4. Collection scan
//!
//! Disjunctions are never served from an index without a hint.

use serde_json::{json, Map, Value};

use super::errors::{StoreError, StoreResult};
use super::filter::{Condition, Filter};
use super::projection::Projection;
use super::request::{IndexDirection, IndexSpec};
use super::shape::QueryShape;
use super::sorter::SortSpec;
use super::value::compare_values;

const BAD_VALUE: i32 = 2;

/// Everything the planner needs to know about one query
pub struct PlanInput<'q> {
    pub filter: &'q Filter,
    pub raw_filter: &'q Value,
    pub sort: Option<&'q SortSpec>,
    pub projection: Option<&'q Projection>,
    pub limit: Option<u64>,
    pub skip: Option<u64>,
    pub hint: Option<&'q str>,
}

/// Outcome of plan selection
#[derive(Debug, Clone)]
pub struct PlanChoice<'c> {
    /// Winning index, `None` for a collection scan
    pub index: Option<&'c IndexSpec>,
    /// Other indexes that could have served the query
    pub rejected: Vec<&'c IndexSpec>,
    /// Index alone produces the result
    pub covered: bool,
}

/// Chooses plans over an index catalog
pub struct QueryPlanner<'c> {
    catalog: &'c [IndexSpec],
}

impl<'c> QueryPlanner<'c> {
    /// Planner over the given catalog
    pub fn new(catalog: &'c [IndexSpec]) -> Self {
        Self { catalog }
    }

    /// Indexes usable for the query shape, regardless of literal values
    pub fn usable_indexes(&self, filter: &Filter, sort: Option<&SortSpec>) -> Vec<&'c IndexSpec> {
        let mut usable: Vec<(u8, &IndexSpec)> = self
            .catalog
            .iter()
            .filter_map(|index| Self::rank(index, filter, sort).map(|rank| (rank, index)))
            .collect();
        usable.sort_by(|(ra, a), (rb, b)| ra.cmp(rb).then_with(|| a.name.cmp(&b.name)));
        usable.into_iter().map(|(_, index)| index).collect()
    }

    fn rank(index: &IndexSpec, filter: &Filter, sort: Option<&SortSpec>) -> Option<u8> {
        let leading = index.leading_field()?;
        if !filter.has_disjunction() {
            for (path, conditions) in filter.conjunctive_fields() {
                if path != leading {
                    continue;
                }
                if conditions.iter().any(Condition::is_point) {
                    return Some(0);
                }
                if conditions.iter().any(Condition::is_range) {
                    return Some(1);
                }
            }
        }
        match sort.and_then(SortSpec::leading_field) {
            Some(field) if field == leading => Some(2),
            _ => None,
        }
    }

    /// Select the winning plan
    pub fn choose(&self, input: &PlanInput<'_>) -> StoreResult<PlanChoice<'c>> {
        let usable = self.usable_indexes(input.filter, input.sort);

        let index = match input.hint {
            Some(name) => Some(self.catalog.iter().find(|i| i.name == name).ok_or_else(|| {
                StoreError::rejected(
                    BAD_VALUE,
                    format!("hint provided does not correspond to an existing index: {}", name),
                )
            })?),
            None => usable.first().copied(),
        };

        let rejected = usable
            .iter()
            .copied()
            .filter(|candidate| index.map_or(true, |chosen| chosen.name != candidate.name))
            .collect();

        let covered = match (index, input.projection) {
            (Some(index), Some(projection)) => {
                projection.is_covered_by(index)
                    && !input.filter.has_disjunction()
                    && input
                        .filter
                        .conjunctive_fields()
                        .iter()
                        .all(|(path, _)| index.covers_field(path))
            }
            _ => false,
        };

        Ok(PlanChoice {
            index,
            rejected,
            covered,
        })
    }

    /// Render the `queryPlanner` section of an explain document
    pub fn explain(
        &self,
        namespace: &str,
        input: &PlanInput<'_>,
        shape: &QueryShape,
    ) -> StoreResult<Value> {
        let choice = self.choose(input)?;
        let usable = self.usable_indexes(input.filter, input.sort);

        let winning = render_plan(input, choice.index, choice.covered);
        let rejected: Vec<Value> = choice
            .rejected
            .iter()
            .map(|index| render_plan(input, Some(index), false))
            .collect();

        Ok(json!({
            "namespace": namespace,
            "parsedQuery": input.raw_filter,
            "queryHash": shape.query_hash(),
            "planCacheKey": shape.plan_cache_key(&usable, input.hint),
            "winningPlan": winning,
            "rejectedPlans": rejected,
        }))
    }
}

fn render_plan(input: &PlanInput<'_>, index: Option<&IndexSpec>, covered: bool) -> Value {
    let mut plan = match index {
        Some(index) => {
            let scan = index_scan(index, input.filter);
            if covered {
                scan
            } else {
                wrap("FETCH", scan, Map::new())
            }
        }
        None => json!({
            "stage": "COLLSCAN",
            "filter": input.raw_filter,
            "direction": "forward",
        }),
    };

    if let Some(skip) = input.skip {
        let mut extra = Map::new();
        extra.insert("skipAmount".into(), json!(skip));
        plan = wrap("SKIP", plan, extra);
    }

    let sort_from_index = match (index, input.sort) {
        (Some(index), Some(sort)) => index.leading_field() == sort.leading_field(),
        _ => false,
    };
    match (input.sort, input.limit) {
        (Some(sort), limit) if !sort_from_index => {
            let mut extra = Map::new();
            extra.insert("sortPattern".into(), sort_pattern(sort));
            if let Some(limit) = limit {
                extra.insert("limitAmount".into(), json!(limit));
            }
            plan = wrap("SORT", plan, extra);
        }
        (_, Some(limit)) => {
            let mut extra = Map::new();
            extra.insert("limitAmount".into(), json!(limit));
            plan = wrap("LIMIT", plan, extra);
        }
        _ => {}
    }

    if let Some(projection) = input.projection {
        let stage = if covered {
            "PROJECTION_COVERED"
        } else if projection.has_computed_fields() {
            "PROJECTION_DEFAULT"
        } else {
            "PROJECTION_SIMPLE"
        };
        plan = wrap(stage, plan, Map::new());
    }

    plan
}

fn wrap(stage: &str, input_stage: Value, mut extra: Map<String, Value>) -> Value {
    let mut node = Map::new();
    node.insert("stage".into(), json!(stage));
    node.append(&mut extra);
    node.insert("inputStage".into(), input_stage);
    Value::Object(node)
}

fn sort_pattern(sort: &SortSpec) -> Value {
    let mut pattern = Map::new();
    for key in &sort.keys {
        pattern.insert(key.path.clone(), json!(key.direction.as_i32()));
    }
    Value::Object(pattern)
}

fn index_scan(index: &IndexSpec, filter: &Filter) -> Value {
    let conjunctive = if filter.has_disjunction() {
        Vec::new()
    } else {
        filter.conjunctive_fields()
    };

    let mut bounds = Map::new();
    for key in &index.keys {
        let conditions: Vec<&Condition> = conjunctive
            .iter()
            .filter(|(path, _)| *path == key.path)
            .flat_map(|(_, conditions)| conditions.iter())
            .collect();
        let mut intervals = render_intervals(&conditions);
        if key.direction == IndexDirection::Descending {
            intervals.reverse();
        }
        bounds.insert(key.path.clone(), json!(intervals));
    }

    json!({
        "stage": "IXSCAN",
        "keyPattern": index.key_pattern(),
        "indexName": index.name,
        "isMultiKey": false,
        "direction": "forward",
        "indexBounds": bounds,
    })
}

const FULL_RANGE: &str = "[MinKey, MaxKey]";

/// Render the index intervals of one field's predicates
pub fn render_intervals(conditions: &[&Condition]) -> Vec<String> {
    let mut points: Vec<&Value> = Vec::new();
    for condition in conditions {
        match condition {
            Condition::Eq(v) => points.push(v),
            Condition::In(values) => points.extend(values.iter()),
            _ => {}
        }
    }
    if !points.is_empty() {
        points.sort_by(|a, b| compare_values(a, b));
        points.dedup_by(|a, b| compare_values(a, b).is_eq());
        return points
            .iter()
            .map(|v| format!("[{}, {}]", literal(v), literal(v)))
            .collect();
    }

    let mut lower: Option<(&Value, bool)> = None;
    let mut upper: Option<(&Value, bool)> = None;
    for condition in conditions {
        match condition {
            Condition::Gt(v) => lower = Some((v, false)),
            Condition::Gte(v) => lower = Some((v, true)),
            Condition::Lt(v) => upper = Some((v, false)),
            Condition::Lte(v) => upper = Some((v, true)),
            _ => {}
        }
    }

    let typed = lower.or(upper).map(|(v, _)| v);
    let (low, low_inclusive) = match lower {
        Some((v, inclusive)) => (literal(v), inclusive),
        None => (open_lower(typed), true),
    };
    let (high, high_inclusive) = match upper {
        Some((v, inclusive)) => (literal(v), inclusive),
        None => open_upper(typed),
    };

    match typed {
        None => vec![FULL_RANGE.to_string()],
        Some(_) => vec![format!(
            "{}{}, {}{}",
            if low_inclusive { "[" } else { "(" },
            low,
            high,
            if high_inclusive { "]" } else { ")" },
        )],
    }
}

fn literal(value: &Value) -> String {
    value.to_string()
}

fn open_lower(typed: Option<&Value>) -> String {
    match typed {
        Some(Value::Number(_)) => "-inf.0".to_string(),
        Some(Value::String(_)) => "\"\"".to_string(),
        _ => "MinKey".to_string(),
    }
}

fn open_upper(typed: Option<&Value>) -> (String, bool) {
    match typed {
        Some(Value::Number(_)) => ("inf.0".to_string(), true),
        Some(Value::String(_)) => ("{}".to_string(), false),
        _ => ("MaxKey".to_string(), true),
    }
}
