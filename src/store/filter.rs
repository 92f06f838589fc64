//! Filter compilation and matching
//!
//! Filters are validated when compiled: unknown operators and malformed
//! operator arguments are rejected the way the server rejects them
//! (code 2, BadValue). Matching never coerces types.

use regex::Regex;
use serde_json::{Map, Value};

use super::errors::{StoreError, StoreResult};
use super::value::{comparable, compare_values, extended_json_tag, lookup_path, values_equal};

const BAD_VALUE: i32 = 2;

/// Condition applied to the values found at one field path
#[derive(Debug, Clone)]
pub enum Condition {
    Eq(Value),
    Ne(Value),
    Gt(Value),
    Gte(Value),
    Lt(Value),
    Lte(Value),
    In(Vec<Value>),
    Nin(Vec<Value>),
    Exists(bool),
    All(Vec<Value>),
    Size(usize),
    ElemMatch(ElemMatch),
    Not(Vec<Condition>),
    Regex(Regex),
}

impl Condition {
    /// Returns the operator name
    pub fn op_name(&self) -> &'static str {
        match self {
            Condition::Eq(_) => "$eq",
            Condition::Ne(_) => "$ne",
            Condition::Gt(_) => "$gt",
            Condition::Gte(_) => "$gte",
            Condition::Lt(_) => "$lt",
            Condition::Lte(_) => "$lte",
            Condition::In(_) => "$in",
            Condition::Nin(_) => "$nin",
            Condition::Exists(_) => "$exists",
            Condition::All(_) => "$all",
            Condition::Size(_) => "$size",
            Condition::ElemMatch(_) => "$elemMatch",
            Condition::Not(_) => "$not",
            Condition::Regex(_) => "$regex",
        }
    }

    /// Equality-style conditions produce point index bounds
    pub fn is_point(&self) -> bool {
        matches!(self, Condition::Eq(_) | Condition::In(_))
    }

    /// Range conditions produce interval index bounds
    pub fn is_range(&self) -> bool {
        matches!(
            self,
            Condition::Gt(_) | Condition::Gte(_) | Condition::Lt(_) | Condition::Lte(_)
        )
    }
}

/// Argument of `$elemMatch`
#[derive(Debug, Clone)]
pub enum ElemMatch {
    /// Operator form: `{"$elemMatch": {"$gte": 4}}`
    Conditions(Vec<Condition>),
    /// Sub-document form: `{"$elemMatch": {"rating": {"$gte": 4}}}`
    Filter(Box<Filter>),
}

/// Compiled filter tree
#[derive(Debug, Clone)]
pub enum Filter {
    And(Vec<Filter>),
    Or(Vec<Filter>),
    Nor(Vec<Filter>),
    Field {
        path: String,
        conditions: Vec<Condition>,
    },
}

impl Filter {
    /// Compile a filter document
    pub fn compile(filter: &Value) -> StoreResult<Self> {
        match filter {
            Value::Object(map) => Self::compile_document(map),
            Value::Null => Ok(Filter::And(Vec::new())),
            other => Err(StoreError::rejected(
                BAD_VALUE,
                format!("filter must be an object, got {}", other),
            )),
        }
    }

    fn compile_document(map: &Map<String, Value>) -> StoreResult<Self> {
        let mut clauses = Vec::with_capacity(map.len());

        for (key, value) in map {
            if key.starts_with('$') {
                let combine: fn(Vec<Filter>) -> Filter = match key.as_str() {
                    "$and" => Filter::And,
                    "$or" => Filter::Or,
                    "$nor" => Filter::Nor,
                    unknown => {
                        return Err(StoreError::rejected(
                            BAD_VALUE,
                            format!("unknown top level operator: {}", unknown),
                        ))
                    }
                };
                clauses.push(combine(Self::compile_branches(key, value)?));
            } else {
                clauses.push(Filter::Field {
                    path: key.clone(),
                    conditions: compile_conditions(value)?,
                });
            }
        }

        Ok(Filter::And(clauses))
    }

    fn compile_branches(operator: &str, value: &Value) -> StoreResult<Vec<Filter>> {
        let items = match value {
            Value::Array(items) if !items.is_empty() => items,
            _ => {
                return Err(StoreError::rejected(
                    BAD_VALUE,
                    format!("{} must be a nonempty array", operator),
                ))
            }
        };
        items
            .iter()
            .map(|item| match item {
                Value::Object(map) => Self::compile_document(map),
                _ => Err(StoreError::rejected(
                    BAD_VALUE,
                    format!("{} argument's entries must be objects", operator),
                )),
            })
            .collect()
    }

    /// Checks if a document matches the filter
    pub fn matches(&self, document: &Value) -> bool {
        match self {
            Filter::And(clauses) => clauses.iter().all(|c| c.matches(document)),
            Filter::Or(clauses) => clauses.iter().any(|c| c.matches(document)),
            Filter::Nor(clauses) => !clauses.iter().any(|c| c.matches(document)),
            Filter::Field { path, conditions } => {
                let values = lookup_path(document, path);
                conditions.iter().all(|c| condition_matches(c, &values))
            }
        }
    }

    /// Field conditions reachable through conjunctions only.
    ///
    /// These are the predicates an index on the field can serve.
    pub fn conjunctive_fields(&self) -> Vec<(&str, &[Condition])> {
        let mut out = Vec::new();
        self.collect_conjunctive(&mut out);
        out
    }

    fn collect_conjunctive<'a>(&'a self, out: &mut Vec<(&'a str, &'a [Condition])>) {
        match self {
            Filter::And(clauses) => {
                for clause in clauses {
                    clause.collect_conjunctive(out);
                }
            }
            Filter::Field { path, conditions } => out.push((path.as_str(), conditions.as_slice())),
            Filter::Or(_) | Filter::Nor(_) => {}
        }
    }

    /// Returns true if the filter contains a disjunction
    pub fn has_disjunction(&self) -> bool {
        match self {
            Filter::And(clauses) => clauses.iter().any(|c| c.has_disjunction()),
            Filter::Or(_) | Filter::Nor(_) => true,
            Filter::Field { .. } => false,
        }
    }
}

/// Compile the value of a field clause
fn compile_conditions(value: &Value) -> StoreResult<Vec<Condition>> {
    match value {
        Value::Object(map) if is_operator_document(map) => {
            let mut conditions = Vec::with_capacity(map.len());
            let options = map.get("$options").and_then(|o| o.as_str()).unwrap_or("");
            for (operator, argument) in map {
                if operator == "$options" {
                    continue;
                }
                conditions.push(compile_operator(operator, argument, options)?);
            }
            Ok(conditions)
        }
        literal => Ok(vec![Condition::Eq(literal.clone())]),
    }
}

fn is_operator_document(map: &Map<String, Value>) -> bool {
    extended_json_tag(map).is_none() && map.keys().next().is_some_and(|k| k.starts_with('$'))
}

fn compile_operator(operator: &str, argument: &Value, options: &str) -> StoreResult<Condition> {
    let condition = match operator {
        "$eq" => Condition::Eq(argument.clone()),
        "$ne" => Condition::Ne(argument.clone()),
        "$gt" => Condition::Gt(argument.clone()),
        "$gte" => Condition::Gte(argument.clone()),
        "$lt" => Condition::Lt(argument.clone()),
        "$lte" => Condition::Lte(argument.clone()),
        "$in" => Condition::In(array_argument(operator, argument)?),
        "$nin" => Condition::Nin(array_argument(operator, argument)?),
        "$all" => Condition::All(array_argument(operator, argument)?),
        "$exists" => Condition::Exists(truthy(argument)),
        "$size" => match argument.as_u64() {
            Some(n) => Condition::Size(n as usize),
            None => {
                return Err(StoreError::rejected(
                    BAD_VALUE,
                    "$size needs a non-negative integer",
                ))
            }
        },
        "$elemMatch" => match argument {
            Value::Object(map) if is_operator_document(map) => {
                Condition::ElemMatch(ElemMatch::Conditions(compile_conditions(argument)?))
            }
            Value::Object(map) => {
                Condition::ElemMatch(ElemMatch::Filter(Box::new(Filter::compile_document(map)?)))
            }
            _ => {
                return Err(StoreError::rejected(
                    BAD_VALUE,
                    "$elemMatch needs an Object",
                ))
            }
        },
        "$not" => match argument {
            Value::Object(map) if is_operator_document(map) => {
                Condition::Not(compile_conditions(argument)?)
            }
            _ => return Err(StoreError::rejected(BAD_VALUE, "$not needs a regex or a document")),
        },
        "$regex" => {
            let pattern = argument.as_str().ok_or_else(|| {
                StoreError::rejected(BAD_VALUE, "$regex has to be a string")
            })?;
            let pattern = if options.contains('i') {
                format!("(?i){}", pattern)
            } else {
                pattern.to_string()
            };
            let regex = Regex::new(&pattern).map_err(|e| {
                StoreError::rejected(BAD_VALUE, format!("Regular expression is invalid: {}", e))
            })?;
            Condition::Regex(regex)
        }
        unknown => {
            return Err(StoreError::rejected(
                BAD_VALUE,
                format!("unknown operator: {}", unknown),
            ))
        }
    };
    Ok(condition)
}

fn array_argument(operator: &str, argument: &Value) -> StoreResult<Vec<Value>> {
    match argument {
        Value::Array(items) => Ok(items.clone()),
        _ => Err(StoreError::rejected(
            BAD_VALUE,
            format!("{} needs an array", operator),
        )),
    }
}

fn truthy(value: &Value) -> bool {
    match value {
        Value::Null => false,
        Value::Bool(b) => *b,
        Value::Number(n) => n.as_f64().is_some_and(|v| v != 0.0),
        _ => true,
    }
}

/// Evaluate a condition against every value found at the path
fn condition_matches(condition: &Condition, values: &[&Value]) -> bool {
    match condition {
        Condition::Eq(expected) => equality_matches(expected, values),
        Condition::Ne(expected) => !equality_matches(expected, values),
        Condition::In(candidates) => candidates.iter().any(|c| equality_matches(c, values)),
        Condition::Nin(candidates) => !candidates.iter().any(|c| equality_matches(c, values)),
        Condition::Gt(bound) => range_matches(values, bound, |o| o.is_gt()),
        Condition::Gte(bound) => range_matches(values, bound, |o| o.is_ge()),
        Condition::Lt(bound) => range_matches(values, bound, |o| o.is_lt()),
        Condition::Lte(bound) => range_matches(values, bound, |o| o.is_le()),
        Condition::Exists(expected) => !values.is_empty() == *expected,
        Condition::Size(n) => values
            .iter()
            .any(|v| v.as_array().is_some_and(|items| items.len() == *n)),
        Condition::All(required) => {
            !required.is_empty() && required.iter().all(|r| equality_matches(r, values))
        }
        Condition::ElemMatch(elem_match) => values.iter().any(|v| match v.as_array() {
            Some(items) => items.iter().any(|item| elem_match_matches(elem_match, item)),
            None => false,
        }),
        Condition::Not(conditions) => !conditions.iter().all(|c| condition_matches(c, values)),
        Condition::Regex(regex) => scalar_candidates(values)
            .any(|v| v.as_str().is_some_and(|s| regex.is_match(s))),
    }
}

fn elem_match_matches(elem_match: &ElemMatch, item: &Value) -> bool {
    match elem_match {
        ElemMatch::Conditions(conditions) => {
            let values = [item];
            conditions.iter().all(|c| condition_matches(c, &values))
        }
        ElemMatch::Filter(filter) => item.is_object() && filter.matches(item),
    }
}

/// Values plus the elements of array values
fn scalar_candidates<'a>(values: &'a [&'a Value]) -> impl Iterator<Item = &'a Value> + 'a {
    values.iter().flat_map(|v| {
        let elements: Box<dyn Iterator<Item = &'a Value>> = match v {
            Value::Array(items) => Box::new(items.iter()),
            _ => Box::new(std::iter::empty()),
        };
        std::iter::once(*v).chain(elements)
    })
}

fn equality_matches(expected: &Value, values: &[&Value]) -> bool {
    if expected.is_null() && values.is_empty() {
        return true;
    }
    scalar_candidates(values).any(|v| values_equal(v, expected))
}

fn range_matches(
    values: &[&Value],
    bound: &Value,
    accept: impl Fn(std::cmp::Ordering) -> bool,
) -> bool {
    scalar_candidates(values)
        .filter(|v| !v.is_array())
        .any(|v| comparable(v, bound) && accept(compare_values(v, bound)))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::errors::StoreErrorKind;
    use serde_json::json;

    fn matches(filter: Value, doc: Value) -> bool {
        Filter::compile(&filter).unwrap().matches(&doc)
    }

    #[test]
    fn test_equality_on_array_field() {
        let doc = json!({"genres": ["Crime", "Drama"]});
        assert!(matches(json!({"genres": "Drama"}), doc.clone()));
        assert!(!matches(json!({"genres": "Comedy"}), doc));
    }

    #[test]
    fn test_no_type_coercion() {
        let doc = json!({"year": 1972});
        assert!(!matches(json!({"year": "1972"}), doc.clone()));
        assert!(matches(json!({"year": 1972.0}), doc));
    }

    #[test]
    fn test_range_on_nested_field() {
        let doc = json!({"imdb": {"rating": 9.2}});
        assert!(matches(json!({"imdb.rating": {"$gte": 9.0}}), doc.clone()));
        assert!(!matches(json!({"imdb.rating": {"$gt": 9.2}}), doc.clone()));
        assert!(matches(json!({"imdb.rating": {"$gte": 7.0, "$lte": 9.5}}), doc));
    }

    #[test]
    fn test_range_never_crosses_types() {
        assert!(!matches(json!({"year": {"$gt": 5}}), json!({"year": "2001"})));
    }

    #[test]
    fn test_logical_operators() {
        let doc = json!({"genres": ["Action"], "imdb": {"rating": 6.0}});
        assert!(matches(
            json!({"$or": [{"genres": "Action"}, {"genres": "Adventure"}]}),
            doc.clone()
        ));
        assert!(!matches(
            json!({"$and": [{"genres": "Action"}, {"imdb.rating": {"$gte": 8.0}}]}),
            doc.clone()
        ));
        assert!(matches(json!({"genres": {"$not": {"$eq": "Horror"}}}), doc.clone()));
        assert!(matches(json!({"$nor": [{"genres": "Horror"}]}), doc));
    }

    #[test]
    fn test_array_operators() {
        let doc = json!({"genres": ["Drama", "Crime", "Thriller"], "cast": ["Tom Hanks"]});
        assert!(matches(json!({"genres": {"$in": ["Drama", "Action"]}}), doc.clone()));
        assert!(!matches(json!({"genres": {"$nin": ["Horror", "Thriller"]}}), doc.clone()));
        assert!(matches(json!({"cast": {"$all": ["Tom Hanks"]}}), doc.clone()));
        assert!(matches(json!({"genres": {"$size": 3}}), doc.clone()));
        assert!(matches(json!({"cast": {"$elemMatch": {"$eq": "Tom Hanks"}}}), doc.clone()));
        assert!(matches(json!({"cast.0": {"$exists": true}}), doc.clone()));
        assert!(!matches(json!({"awards": {"$exists": true}}), doc));
    }

    #[test]
    fn test_elem_match_subdocument() {
        let doc = json!({"reviews": [{"rating": 4.5, "count": 150}, {"rating": 2.0, "count": 500}]});
        assert!(matches(
            json!({"reviews": {"$elemMatch": {"rating": {"$gte": 4.0}, "count": {"$gt": 100}}}}),
            doc.clone()
        ));
        assert!(!matches(
            json!({"reviews": {"$elemMatch": {"rating": {"$gte": 4.0}, "count": {"$gt": 200}}}}),
            doc
        ));
    }

    #[test]
    fn test_regex_with_options() {
        let doc = json!({"title": "The Godfather"});
        assert!(matches(json!({"title": {"$regex": "^the god", "$options": "i"}}), doc.clone()));
        assert!(!matches(json!({"title": {"$regex": "^the god"}}), doc));
    }

    #[test]
    fn test_null_matches_missing() {
        assert!(matches(json!({"awards": null}), json!({"title": "x"})));
    }

    #[test]
    fn test_extended_json_literal_is_not_an_operator() {
        let doc = json!({"_id": {"$oid": "507f1f77bcf86cd799439011"}});
        assert!(matches(json!({"_id": {"$oid": "507f1f77bcf86cd799439011"}}), doc));
    }

    #[test]
    fn test_unknown_operators_rejected() {
        for filter in [
            json!({"field": {"$invalidOp": "value"}}),
            json!({"field": {"$invalidOperator": "value"}}),
            json!({"$invalidOperator": "value"}),
            json!({"genres": {"$in": "Drama"}}),
            json!({"$or": []}),
        ] {
            let err = Filter::compile(&filter).unwrap_err();
            assert_eq!(err.kind(), StoreErrorKind::QueryRejected, "{}", filter);
            assert_eq!(err.code(), Some(2));
        }
    }

    #[test]
    fn test_conjunctive_fields_skip_disjunctions() {
        let filter = Filter::compile(&json!({
            "genres": "Drama",
            "$and": [{"year": {"$gte": 2000}}],
            "$or": [{"title": "A"}, {"title": "B"}]
        }))
        .unwrap();
        let fields: Vec<&str> = filter.conjunctive_fields().iter().map(|(f, _)| *f).collect();
        assert_eq!(fields, vec!["genres", "year"]);
        assert!(filter.has_disjunction());
    }
}
