//! Aggregation pipeline compilation and execution
//!
//! A pipeline is compiled in full before any document is touched, so a bad
//! stage anywhere rejects the whole pipeline. An empty pipeline is valid
//! and passes every document through.

use std::collections::HashMap;

use serde_json::{json, Map, Value};

use super::errors::{StoreError, StoreResult};
use super::expression::{number_value, Expression};
use super::filter::Filter;
use super::projection::Projection;
use super::request::{Document, Pipeline};
use super::sorter::{ResultSorter, SortSpec};
use super::value::{as_number, compare_values, values_equal};

const TYPE_MISMATCH: i32 = 14;
const STAGE_ONE_FIELD: i32 = 40323;
const UNRECOGNIZED_STAGE: i32 = 40324;
const MATCH_NOT_OBJECT: i32 = 15959;
const BAD_LIMIT: i32 = 15958;
const BAD_SKIP: i32 = 15956;
const GROUP_NEEDS_ID: i32 = 15955;
const UNKNOWN_ACCUMULATOR: i32 = 15952;
const BAD_COUNT: i32 = 40156;
const NOT_AN_ACCUMULATOR: i32 = 40234;

/// One compiled pipeline stage
#[derive(Debug, Clone)]
pub enum Stage {
    Match(Filter, Value),
    Sort(SortSpec),
    Limit(usize),
    Skip(usize),
    Project(Projection),
    Group(GroupSpec),
    Count(String),
}

impl Stage {
    /// Stage name as written in the pipeline
    pub fn name(&self) -> &'static str {
        match self {
            Stage::Match(..) => "$match",
            Stage::Sort(_) => "$sort",
            Stage::Limit(_) => "$limit",
            Stage::Skip(_) => "$skip",
            Stage::Project(_) => "$project",
            Stage::Group(_) => "$group",
            Stage::Count(_) => "$count",
        }
    }

    /// Position in cursor order (match, sort, skip, limit, project), for
    /// stages the query planner can absorb into the cursor
    fn cursor_rank(&self) -> Option<u8> {
        match self {
            Stage::Match(..) => Some(0),
            Stage::Sort(_) => Some(1),
            Stage::Skip(_) => Some(2),
            Stage::Limit(_) => Some(3),
            Stage::Project(_) => Some(4),
            Stage::Group(_) | Stage::Count(_) => None,
        }
    }

    fn compile(stage: &Value) -> StoreResult<Self> {
        let map = stage.as_object().ok_or_else(|| {
            StoreError::rejected(
                TYPE_MISMATCH,
                "Each element of the 'pipeline' array must be an object",
            )
        })?;
        if map.len() != 1 {
            return Err(StoreError::rejected(
                STAGE_ONE_FIELD,
                "A pipeline stage specification object must contain exactly one field.",
            ));
        }
        let (name, body) = map
            .iter()
            .next()
            .ok_or_else(|| StoreError::rejected(STAGE_ONE_FIELD, "empty stage"))?;

        match name.as_str() {
            "$match" => {
                if !body.is_object() {
                    return Err(StoreError::rejected(
                        MATCH_NOT_OBJECT,
                        "the match filter must be an expression in an object",
                    ));
                }
                Ok(Stage::Match(Filter::compile(body)?, body.clone()))
            }
            "$sort" => Ok(Stage::Sort(SortSpec::parse(body)?)),
            "$limit" => match body.as_u64() {
                Some(n) if n > 0 => Ok(Stage::Limit(n as usize)),
                _ => Err(StoreError::rejected(
                    BAD_LIMIT,
                    format!("invalid argument to $limit stage: {}", body),
                )),
            },
            "$skip" => match body.as_u64() {
                Some(n) => Ok(Stage::Skip(n as usize)),
                None => Err(StoreError::rejected(
                    BAD_SKIP,
                    format!("invalid argument to $skip stage: {}", body),
                )),
            },
            "$project" => Ok(Stage::Project(Projection::parse(body)?)),
            "$group" => Ok(Stage::Group(GroupSpec::compile(body)?)),
            "$count" => match body.as_str() {
                Some(field) if is_count_field(field) => Ok(Stage::Count(field.to_string())),
                _ => Err(StoreError::rejected(
                    BAD_COUNT,
                    "the count field must be a non-empty string without '$' or '.'",
                )),
            },
            unknown => Err(StoreError::rejected(
                UNRECOGNIZED_STAGE,
                format!("Unrecognized pipeline stage name: '{}'", unknown),
            )),
        }
    }

    fn apply(&self, documents: Vec<Document>) -> Vec<Document> {
        match self {
            Stage::Match(filter, _) => documents
                .into_iter()
                .filter(|d| filter.matches(&Value::Object(d.clone())))
                .collect(),
            Stage::Sort(spec) => {
                let mut documents = documents;
                ResultSorter::sort(&mut documents, spec);
                documents
            }
            Stage::Limit(n) => documents.into_iter().take(*n).collect(),
            Stage::Skip(n) => documents.into_iter().skip(*n).collect(),
            Stage::Project(projection) => documents.iter().map(|d| projection.apply(d)).collect(),
            Stage::Group(spec) => spec.apply(&documents),
            Stage::Count(field) => {
                if documents.is_empty() {
                    return Vec::new();
                }
                let mut out = Document::new();
                out.insert(field.clone(), json!(documents.len()));
                vec![out]
            }
        }
    }
}

fn is_count_field(field: &str) -> bool {
    !field.is_empty() && !field.starts_with('$') && !field.contains('.')
}

/// Accumulator operators of `$group`
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Accumulator {
    Sum,
    Avg,
    Max,
    Min,
    First,
    Last,
    Push,
    AddToSet,
}

impl Accumulator {
    fn parse(name: &str) -> Option<Self> {
        let acc = match name {
            "$sum" => Accumulator::Sum,
            "$avg" => Accumulator::Avg,
            "$max" => Accumulator::Max,
            "$min" => Accumulator::Min,
            "$first" => Accumulator::First,
            "$last" => Accumulator::Last,
            "$push" => Accumulator::Push,
            "$addToSet" => Accumulator::AddToSet,
            _ => return None,
        };
        Some(acc)
    }

    fn finish(&self, values: &[Option<Value>]) -> Value {
        let present = || values.iter().flatten();
        match self {
            Accumulator::Sum => {
                let numbers: Vec<&Value> = present().filter(|v| as_number(v).is_some()).collect();
                if numbers.iter().all(|v| v.is_i64()) {
                    let total = numbers.iter().try_fold(0i64, |acc, v| {
                        v.as_i64().and_then(|n| acc.checked_add(n))
                    });
                    if let Some(total) = total {
                        return json!(total);
                    }
                }
                number_value(numbers.iter().filter_map(|v| as_number(v)).sum())
            }
            Accumulator::Avg => {
                let numbers: Vec<f64> = present().filter_map(as_number).collect();
                if numbers.is_empty() {
                    Value::Null
                } else {
                    json!(numbers.iter().sum::<f64>() / numbers.len() as f64)
                }
            }
            Accumulator::Max => present()
                .max_by(|a, b| compare_values(a, b))
                .cloned()
                .unwrap_or(Value::Null),
            Accumulator::Min => present()
                .min_by(|a, b| compare_values(a, b))
                .cloned()
                .unwrap_or(Value::Null),
            Accumulator::First => values.first().cloned().flatten().unwrap_or(Value::Null),
            Accumulator::Last => values.last().cloned().flatten().unwrap_or(Value::Null),
            Accumulator::Push => Value::Array(present().cloned().collect()),
            Accumulator::AddToSet => {
                let mut set: Vec<Value> = Vec::new();
                for value in present() {
                    if !set.iter().any(|v| values_equal(v, value)) {
                        set.push(value.clone());
                    }
                }
                Value::Array(set)
            }
        }
    }
}

/// Compiled `$group` stage
#[derive(Debug, Clone)]
pub struct GroupSpec {
    key: Expression,
    fields: Vec<(String, Accumulator, Expression)>,
}

impl GroupSpec {
    fn compile(body: &Value) -> StoreResult<Self> {
        let map = body.as_object().ok_or_else(|| {
            StoreError::rejected(
                GROUP_NEEDS_ID,
                "a group's fields must be specified in an object",
            )
        })?;
        let key = map.get("_id").ok_or_else(|| {
            StoreError::rejected(GROUP_NEEDS_ID, "a group specification must include an _id")
        })?;

        let mut fields = Vec::new();
        for (name, spec) in map {
            if name == "_id" {
                continue;
            }
            let accumulator = spec.as_object().filter(|m| m.len() == 1).and_then(|m| {
                let (op, argument) = m.iter().next()?;
                Some((op, argument))
            });
            let Some((op, argument)) = accumulator else {
                return Err(StoreError::rejected(
                    NOT_AN_ACCUMULATOR,
                    format!("The field '{}' must be an accumulator object", name),
                ));
            };
            let accumulator = Accumulator::parse(op).ok_or_else(|| {
                StoreError::rejected(
                    UNKNOWN_ACCUMULATOR,
                    format!("unknown group operator '{}'", op),
                )
            })?;
            fields.push((name.clone(), accumulator, Expression::compile(argument)?));
        }

        Ok(Self {
            key: Expression::compile(key)?,
            fields,
        })
    }

    /// Groups in order of first appearance
    fn apply(&self, documents: &[Document]) -> Vec<Document> {
        let mut keys: Vec<Value> = Vec::new();
        let mut index: HashMap<String, usize> = HashMap::new();
        let mut collected: Vec<Vec<Vec<Option<Value>>>> = Vec::new();

        for document in documents {
            let key = self.key.evaluate(document).unwrap_or(Value::Null);
            let slot = *index.entry(key.to_string()).or_insert_with(|| {
                keys.push(key.clone());
                collected.push(vec![Vec::new(); self.fields.len()]);
                keys.len() - 1
            });
            for (i, (_, _, expr)) in self.fields.iter().enumerate() {
                collected[slot][i].push(expr.evaluate(document));
            }
        }

        keys.into_iter()
            .zip(collected)
            .map(|(key, values)| {
                let mut out = Map::new();
                out.insert("_id".to_string(), key);
                for ((name, accumulator, _), values) in self.fields.iter().zip(values) {
                    out.insert(name.clone(), accumulator.finish(&values));
                }
                out
            })
            .collect()
    }
}

/// Fully compiled pipeline
#[derive(Debug, Clone)]
pub struct CompiledPipeline {
    stages: Vec<Stage>,
}

impl CompiledPipeline {
    /// Compile every stage, rejecting the pipeline on the first bad one
    pub fn compile(pipeline: &Pipeline) -> StoreResult<Self> {
        let stages = pipeline
            .stages
            .iter()
            .map(Stage::compile)
            .collect::<StoreResult<_>>()?;
        Ok(Self { stages })
    }

    /// Returns the compiled stages
    pub fn stages(&self) -> &[Stage] {
        &self.stages
    }

    /// Filter of a leading `$match`, which the planner can serve from an index
    pub fn leading_match(&self) -> Option<&Value> {
        match self.stages.first() {
            Some(Stage::Match(_, raw)) => Some(raw),
            _ => None,
        }
    }

    /// Number of leading stages the cursor can absorb.
    ///
    /// The prefix must follow cursor order with each stage at most once, so
    /// a `$match` is absorbed only as the first stage.
    pub fn cursor_prefix(&self) -> usize {
        let mut last: Option<u8> = None;
        let mut pushed = 0;
        for stage in &self.stages {
            match stage.cursor_rank() {
                Some(rank) if last.map_or(true, |l| rank > l) => {
                    last = Some(rank);
                    pushed += 1;
                }
                _ => break,
            }
        }
        pushed
    }

    /// Returns true if every stage can be absorbed into the cursor
    pub fn is_fully_pushable(&self) -> bool {
        self.cursor_prefix() == self.stages.len()
    }

    /// Run the pipeline over the input documents
    pub fn run(&self, documents: Vec<Document>) -> Vec<Document> {
        self.stages
            .iter()
            .fold(documents, |documents, stage| stage.apply(documents))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::errors::StoreErrorKind;

    fn movies() -> Vec<Document> {
        [
            json!({"title": "A", "genres": "Drama", "year": 1994, "imdb": {"rating": 9.5}}),
            json!({"title": "B", "genres": "Crime", "year": 1972, "imdb": {"rating": 9.2}}),
            json!({"title": "C", "genres": "Drama", "year": 2001, "imdb": {"rating": 7.0}}),
            json!({"title": "D", "genres": "Comedy", "year": 2001}),
        ]
        .into_iter()
        .filter_map(|v| v.as_object().cloned())
        .collect()
    }

    fn run(stages: Value) -> StoreResult<Vec<Value>> {
        let compiled = CompiledPipeline::compile(&Pipeline::from_value(stages))?;
        Ok(compiled.run(movies()).into_iter().map(Value::Object).collect())
    }

    #[test]
    fn test_empty_pipeline_passes_everything() {
        assert_eq!(run(json!([])).unwrap().len(), 4);
    }

    #[test]
    fn test_match_sort_limit() {
        let out = run(json!([
            {"$match": {"year": {"$gte": 1990}}},
            {"$sort": {"imdb.rating": -1}},
            {"$limit": 2}
        ]))
        .unwrap();
        let titles: Vec<&str> = out.iter().map(|d| d["title"].as_str().unwrap()).collect();
        assert_eq!(titles, vec!["A", "C"]);
    }

    #[test]
    fn test_group_with_accumulators() {
        let out = run(json!([
            {"$group": {
                "_id": "$genres",
                "count": {"$sum": 1},
                "avgRating": {"$avg": "$imdb.rating"},
                "maxYear": {"$max": "$year"},
                "titles": {"$push": "$title"}
            }},
            {"$sort": {"count": -1, "_id": 1}}
        ]))
        .unwrap();

        assert_eq!(out[0]["_id"], "Drama");
        assert_eq!(out[0]["count"], 2);
        assert_eq!(out[0]["avgRating"], json!(8.25));
        assert_eq!(out[0]["maxYear"], 2001);
        assert_eq!(out[0]["titles"], json!(["A", "C"]));
        assert_eq!(out[1]["_id"], "Comedy");
        assert_eq!(out[1]["avgRating"], Value::Null);
    }

    #[test]
    fn test_count_and_skip() {
        let out = run(json!([{"$skip": 1}, {"$count": "total"}])).unwrap();
        assert_eq!(out, vec![json!({"total": 3})]);
    }

    #[test]
    fn test_project_round() {
        let out = run(json!([
            {"$match": {"title": "B"}},
            {"$project": {"_id": 0, "rating": {"$round": ["$imdb.rating", 0]}}}
        ]))
        .unwrap();
        assert_eq!(out, vec![json!({"rating": 9})]);
    }

    #[test]
    fn test_rejections_carry_server_codes() {
        let cases = [
            (json!([{"$invalidStage": {}}]), 40324),
            (json!([{"$group": {"_id": "$genres", "x": {"$invalidAccumulator": "$year"}}}]), 15952),
            (json!([{"$match": "not a document"}]), 15959),
            (json!([{"$limit": 0}]), 15958),
            (json!([{"$skip": -1}]), 15956),
            (json!([{"$group": {"count": {"$sum": 1}}}]), 15955),
            (json!([{"$match": {}, "$limit": 1}]), 40323),
            (json!([{"$match": {"year": {"$bogus": 1}}}]), 2),
        ];
        for (stages, code) in cases {
            let err = run(stages.clone()).unwrap_err();
            assert_eq!(err.kind(), StoreErrorKind::QueryRejected, "{}", stages);
            assert_eq!(err.code(), Some(code), "{}", stages);
        }
    }

    #[test]
    fn test_pushable_stages() {
        let pushable = CompiledPipeline::compile(&Pipeline::from_value(json!([
            {"$match": {"genres": "Drama"}},
            {"$sort": {"year": 1}},
            {"$limit": 1}
        ])))
        .unwrap();
        assert!(pushable.is_fully_pushable());
        assert_eq!(pushable.leading_match(), Some(&json!({"genres": "Drama"})));

        let grouped = CompiledPipeline::compile(&Pipeline::from_value(json!([
            {"$group": {"_id": null, "n": {"$sum": 1}}}
        ])))
        .unwrap();
        assert!(!grouped.is_fully_pushable());
        assert!(grouped.leading_match().is_none());
    }

    #[test]
    fn test_cursor_prefix_follows_cursor_order() {
        let prefix = |stages: Value| {
            CompiledPipeline::compile(&Pipeline::from_value(stages))
                .unwrap()
                .cursor_prefix()
        };
        assert_eq!(prefix(json!([{"$sort": {"year": 1}}, {"$match": {"genres": "Drama"}}])), 1);
        assert_eq!(prefix(json!([{"$match": {"year": 1}}, {"$match": {"genres": "Drama"}}])), 1);
        assert_eq!(prefix(json!([{"$limit": 5}, {"$skip": 2}])), 1);
        assert_eq!(prefix(json!([{"$skip": 2}, {"$limit": 5}, {"$project": {"title": 1}}])), 3);
        assert_eq!(prefix(json!([{"$group": {"_id": "$year"}}, {"$limit": 1}])), 0);
        assert_eq!(prefix(json!([])), 0);
    }
}
