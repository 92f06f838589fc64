//! Document value helpers: dotted paths, type order, comparison
//!
//! Cross-type ordering follows the document database's canonical order:
//! null < numbers < strings < documents < arrays < object ids < booleans < dates.

use std::cmp::Ordering;

use serde_json::{Map, Value};

/// Canonical type class of a value
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum TypeClass {
    Null,
    Number,
    String,
    Document,
    Array,
    ObjectId,
    Boolean,
    Date,
}

/// Returns the canonical type class of a value.
///
/// Extended JSON wrappers (`{"$oid": ..}`, `{"$date": ..}`) are classified
/// as the type they wrap.
pub fn type_class(value: &Value) -> TypeClass {
    match value {
        Value::Null => TypeClass::Null,
        Value::Bool(_) => TypeClass::Boolean,
        Value::Number(_) => TypeClass::Number,
        Value::String(_) => TypeClass::String,
        Value::Array(_) => TypeClass::Array,
        Value::Object(map) => match extended_json_tag(map) {
            Some("$oid") => TypeClass::ObjectId,
            Some("$date") => TypeClass::Date,
            Some("$numberLong") | Some("$numberDouble") | Some("$numberInt") => TypeClass::Number,
            _ => TypeClass::Document,
        },
    }
}

/// Returns the tag of a single-key extended JSON wrapper
pub fn extended_json_tag(map: &Map<String, Value>) -> Option<&str> {
    if map.len() != 1 {
        return None;
    }
    let key = map.keys().next()?;
    match key.as_str() {
        "$oid" | "$date" | "$numberLong" | "$numberDouble" | "$numberInt" | "$numberDecimal" => {
            Some(key.as_str())
        }
        _ => None,
    }
}

/// Numeric view of a value, unwrapping `$numberLong`-style wrappers
pub fn as_number(value: &Value) -> Option<f64> {
    match value {
        Value::Number(n) => n.as_f64(),
        Value::Object(map) => match extended_json_tag(map) {
            Some("$numberLong") | Some("$numberDouble") | Some("$numberInt") => map
                .values()
                .next()
                .and_then(|v| v.as_str())
                .and_then(|s| s.parse().ok()),
            _ => None,
        },
        _ => None,
    }
}

/// Resolve a dotted path without fanning out through arrays.
///
/// Numeric components index into arrays (`cast.0`).
pub fn get_path<'a>(document: &'a Value, path: &str) -> Option<&'a Value> {
    let mut current = document;
    for part in path.split('.') {
        current = match current {
            Value::Object(map) => map.get(part)?,
            Value::Array(items) => items.get(part.parse::<usize>().ok()?)?,
            _ => return None,
        };
    }
    Some(current)
}

/// Resolve a dotted path, fanning out through arrays of documents.
///
/// Returns every value reachable at the path; empty if the path is missing.
pub fn lookup_path<'a>(document: &'a Value, path: &str) -> Vec<&'a Value> {
    let parts: Vec<&str> = path.split('.').collect();
    let mut out = Vec::new();
    collect_path(document, &parts, &mut out);
    out
}

/// `lookup_path` rooted at a document map
pub fn lookup_in<'a>(document: &'a Map<String, Value>, path: &str) -> Vec<&'a Value> {
    let (head, rest) = match path.split_once('.') {
        Some((head, rest)) => (head, Some(rest)),
        None => (path, None),
    };
    match (document.get(head), rest) {
        (None, _) => Vec::new(),
        (Some(child), None) => vec![child],
        (Some(child), Some(rest)) => lookup_path(child, rest),
    }
}

fn collect_path<'a>(value: &'a Value, parts: &[&str], out: &mut Vec<&'a Value>) {
    let Some((head, rest)) = parts.split_first() else {
        out.push(value);
        return;
    };

    match value {
        Value::Object(map) => {
            if let Some(child) = map.get(*head) {
                collect_path(child, rest, out);
            }
        }
        Value::Array(items) => {
            if let Ok(position) = head.parse::<usize>() {
                if let Some(item) = items.get(position) {
                    collect_path(item, rest, out);
                }
            }
            for item in items {
                if item.is_object() {
                    collect_path(item, parts, out);
                }
            }
        }
        _ => {}
    }
}

/// Insert a value at a dotted path, creating intermediate documents
pub fn set_path(document: &mut Map<String, Value>, path: &str, value: Value) {
    match path.split_once('.') {
        None => {
            document.insert(path.to_string(), value);
        }
        Some((head, rest)) => {
            let entry = document
                .entry(head.to_string())
                .or_insert_with(|| Value::Object(Map::new()));
            if !entry.is_object() {
                *entry = Value::Object(Map::new());
            }
            if let Value::Object(child) = entry {
                set_path(child, rest, value);
            }
        }
    }
}

/// Remove a value at a dotted path
pub fn remove_path(document: &mut Map<String, Value>, path: &str) {
    match path.split_once('.') {
        None => {
            document.remove(path);
        }
        Some((head, rest)) => {
            if let Some(Value::Object(child)) = document.get_mut(head) {
                remove_path(child, rest);
            }
        }
    }
}

/// Value equality with numeric normalisation (`2 == 2.0`)
pub fn values_equal(a: &Value, b: &Value) -> bool {
    compare_values(a, b) == Ordering::Equal && type_class(a) == type_class(b)
}

/// Total ordering over values
pub fn compare_values(a: &Value, b: &Value) -> Ordering {
    let a_class = type_class(a);
    let b_class = type_class(b);
    if a_class != b_class {
        return a_class.cmp(&b_class);
    }

    match (a, b) {
        (Value::Bool(x), Value::Bool(y)) => x.cmp(y),
        (Value::String(x), Value::String(y)) => x.cmp(y),
        (Value::Array(x), Value::Array(y)) => {
            for (left, right) in x.iter().zip(y.iter()) {
                let ordering = compare_values(left, right);
                if ordering != Ordering::Equal {
                    return ordering;
                }
            }
            x.len().cmp(&y.len())
        }
        (Value::Object(x), Value::Object(y)) => match a_class {
            TypeClass::Number => compare_numbers(a, b),
            _ => {
                for ((left_key, left), (right_key, right)) in x.iter().zip(y.iter()) {
                    let ordering = left_key
                        .cmp(right_key)
                        .then_with(|| compare_values(left, right));
                    if ordering != Ordering::Equal {
                        return ordering;
                    }
                }
                x.len().cmp(&y.len())
            }
        },
        _ if a_class == TypeClass::Number => compare_numbers(a, b),
        _ => Ordering::Equal,
    }
}

fn compare_numbers(a: &Value, b: &Value) -> Ordering {
    if let (Value::Number(x), Value::Number(y)) = (a, b) {
        if let (Some(xi), Some(yi)) = (x.as_i64(), y.as_i64()) {
            return xi.cmp(&yi);
        }
    }
    let x = as_number(a).unwrap_or(0.0);
    let y = as_number(b).unwrap_or(0.0);
    x.partial_cmp(&y).unwrap_or(Ordering::Equal)
}

/// Range operators only compare values of the same type class
pub fn comparable(a: &Value, b: &Value) -> bool {
    type_class(a) == type_class(b)
}
