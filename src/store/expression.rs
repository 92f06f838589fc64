//! Aggregation expressions
//!
//! Used by `$project` computed fields and `$group` keys and accumulators.
//! Evaluation yields `None` for a missing value so callers can omit the
//! field instead of writing null.

use serde_json::{json, Map, Number, Value};

use super::errors::{StoreError, StoreResult};
use super::request::Document;
use super::value::{as_number, extended_json_tag, lookup_in};

const INVALID_PIPELINE_OPERATOR: i32 = 168;
const BAD_VALUE: i32 = 2;

/// Compiled expression
#[derive(Debug, Clone, PartialEq)]
pub enum Expression {
    /// `"$imdb.rating"`
    FieldPath(String),
    /// Constant, including `{"$literal": ..}`
    Literal(Value),
    /// Sub-document whose values are expressions
    Object(Vec<(String, Expression)>),
    /// Array whose items are expressions
    Array(Vec<Expression>),
    /// `{"$op": [args]}`
    Operator(Operator, Vec<Expression>),
}

/// Expression operators
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Operator {
    Add,
    Subtract,
    Multiply,
    Divide,
    Round,
    Size,
    Concat,
    ToUpper,
    ToLower,
    IfNull,
}

impl Operator {
    fn parse(name: &str) -> Option<Self> {
        let op = match name {
            "$add" => Operator::Add,
            "$subtract" => Operator::Subtract,
            "$multiply" => Operator::Multiply,
            "$divide" => Operator::Divide,
            "$round" => Operator::Round,
            "$size" => Operator::Size,
            "$concat" => Operator::Concat,
            "$toUpper" => Operator::ToUpper,
            "$toLower" => Operator::ToLower,
            "$ifNull" => Operator::IfNull,
            _ => return None,
        };
        Some(op)
    }
}

impl Expression {
    /// Compile an expression value
    pub fn compile(value: &Value) -> StoreResult<Self> {
        match value {
            Value::String(s) if s.starts_with("$$") => Err(StoreError::rejected(
                BAD_VALUE,
                format!("variables are not supported: {}", s),
            )),
            Value::String(s) if s.starts_with('$') => Ok(Expression::FieldPath(s[1..].to_string())),
            Value::Array(items) => Ok(Expression::Array(
                items.iter().map(Expression::compile).collect::<StoreResult<_>>()?,
            )),
            Value::Object(map) if extended_json_tag(map).is_some() => {
                Ok(Expression::Literal(value.clone()))
            }
            Value::Object(map) => Self::compile_object(map),
            other => Ok(Expression::Literal(other.clone())),
        }
    }

    fn compile_object(map: &Map<String, Value>) -> StoreResult<Self> {
        let operator_key = map.keys().find(|k| k.starts_with('$'));
        let Some(name) = operator_key else {
            let fields = map
                .iter()
                .map(|(k, v)| Ok((k.clone(), Expression::compile(v)?)))
                .collect::<StoreResult<_>>()?;
            return Ok(Expression::Object(fields));
        };

        if map.len() != 1 {
            return Err(StoreError::rejected(
                BAD_VALUE,
                "an expression specification must contain exactly one field",
            ));
        }
        let argument = &map[name.as_str()];
        if name == "$literal" {
            return Ok(Expression::Literal(argument.clone()));
        }

        let operator = Operator::parse(name).ok_or_else(|| {
            StoreError::rejected(
                INVALID_PIPELINE_OPERATOR,
                format!("Unrecognized expression '{}'", name),
            )
        })?;
        let args = match argument {
            Value::Array(items) => items
                .iter()
                .map(Expression::compile)
                .collect::<StoreResult<Vec<_>>>()?,
            single => vec![Expression::compile(single)?],
        };
        Ok(Expression::Operator(operator, args))
    }

    /// Evaluate against a document
    pub fn evaluate(&self, document: &Document) -> Option<Value> {
        match self {
            Expression::FieldPath(path) => resolve_field(document, path),
            Expression::Literal(value) => Some(value.clone()),
            Expression::Object(fields) => {
                let mut out = Map::new();
                for (key, expr) in fields {
                    if let Some(value) = expr.evaluate(document) {
                        out.insert(key.clone(), value);
                    }
                }
                Some(Value::Object(out))
            }
            Expression::Array(items) => Some(Value::Array(
                items
                    .iter()
                    .map(|e| e.evaluate(document).unwrap_or(Value::Null))
                    .collect(),
            )),
            Expression::Operator(operator, args) => {
                let values: Vec<Option<Value>> = args.iter().map(|a| a.evaluate(document)).collect();
                apply_operator(*operator, &values)
            }
        }
    }
}

/// Resolve a field path, collecting array fan-out into an array
fn resolve_field(document: &Document, path: &str) -> Option<Value> {
    let values = lookup_in(document, path);
    let through_array = path.contains('.')
        && document
            .get(path.split('.').next().unwrap_or(path))
            .is_some_and(|v| v.is_array());
    match values.as_slice() {
        [] if through_array => Some(Value::Array(Vec::new())),
        [] => None,
        [single] if !through_array => Some((*single).clone()),
        many => Some(Value::Array(many.iter().map(|v| (*v).clone()).collect())),
    }
}

/// Number from a float, keeping integers integral
pub fn number_value(value: f64) -> Value {
    if value.fract() == 0.0 && value.abs() < i64::MAX as f64 {
        json!(value as i64)
    } else {
        Number::from_f64(value).map(Value::Number).unwrap_or(Value::Null)
    }
}

fn numeric_args(values: &[Option<Value>]) -> Option<Vec<f64>> {
    values
        .iter()
        .map(|v| v.as_ref().and_then(as_number))
        .collect()
}

fn apply_operator(operator: Operator, values: &[Option<Value>]) -> Option<Value> {
    let nullish = |v: &Option<Value>| v.as_ref().map_or(true, |v| v.is_null());

    match operator {
        Operator::IfNull => values
            .iter()
            .find(|v| !nullish(v))
            .cloned()
            .flatten()
            .or_else(|| values.last().cloned().flatten()),
        _ if values.iter().any(nullish) => Some(Value::Null),
        Operator::Add => numeric_args(values).map(|n| number_value(n.iter().sum())),
        Operator::Multiply => numeric_args(values).map(|n| number_value(n.iter().product())),
        Operator::Subtract => match numeric_args(values)?.as_slice() {
            [a, b] => Some(number_value(a - b)),
            _ => None,
        },
        Operator::Divide => match numeric_args(values)?.as_slice() {
            [_, b] if *b == 0.0 => None,
            [a, b] => Number::from_f64(a / b).map(Value::Number),
            _ => None,
        },
        Operator::Round => {
            let args = numeric_args(values)?;
            let (value, places) = match args.as_slice() {
                [value] => (*value, 0),
                [value, places] => (*value, *places as i32),
                _ => return None,
            };
            let factor = 10f64.powi(places);
            let rounded = (value * factor).round() / factor;
            if places <= 0 {
                Some(number_value(rounded))
            } else {
                Number::from_f64(rounded).map(Value::Number)
            }
        }
        Operator::Size => match values {
            [Some(Value::Array(items))] => Some(json!(items.len())),
            _ => None,
        },
        Operator::Concat => {
            let mut out = String::new();
            for value in values {
                out.push_str(value.as_ref()?.as_str()?);
            }
            Some(Value::String(out))
        }
        Operator::ToUpper => match values {
            [Some(Value::String(s))] => Some(Value::String(s.to_uppercase())),
            _ => None,
        },
        Operator::ToLower => match values {
            [Some(Value::String(s))] => Some(Value::String(s.to_lowercase())),
            _ => None,
        },
    }
}
