//! Query shapes and cache identifiers
//!
//! A shape keeps fields and operators and replaces every literal with a
//! placeholder, so `{"year": 1995}` and `{"year": 2001}` share a shape.
//! Conjunction order is canonicalised by sorting keys.

use sha2::{Digest, Sha256};
use serde_json::{json, Map, Value};

use super::request::{FindRequest, IndexSpec, Pipeline};
use super::value::extended_json_tag;

const PLACEHOLDER: &str = "?";

/// Canonical shape of a query, independent of its literal values
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct QueryShape {
    canonical: String,
}

impl QueryShape {
    /// Shape of a find request: filter, sort and projection.
    ///
    /// Limits are parameters and do not change the shape.
    pub fn of_find(request: &FindRequest) -> Self {
        let mut shape = Map::new();
        shape.insert("filter".into(), shape_filter(&request.filter));
        if let Some(sort) = &request.sort {
            shape.insert("sort".into(), sort.clone());
        }
        if let Some(projection) = &request.projection {
            shape.insert("projection".into(), projection.clone());
        }
        Self::from_value(&Value::Object(shape))
    }

    /// Shape of a filter document alone
    pub fn of_filter(filter: &Value) -> Self {
        Self::from_value(&json!({ "filter": shape_filter(filter) }))
    }

    /// Shape of a pipeline: every stage with literals replaced
    pub fn of_pipeline(pipeline: &Pipeline) -> Self {
        let stages: Vec<Value> = pipeline.stages.iter().map(shape_stage).collect();
        Self::from_value(&json!({ "pipeline": stages }))
    }

    fn from_value(value: &Value) -> Self {
        Self {
            canonical: value.to_string(),
        }
    }

    /// Canonical text of the shape
    pub fn canonical(&self) -> &str {
        &self.canonical
    }

    /// Query hash: digest of the shape alone
    pub fn query_hash(&self) -> String {
        digest(&[self.canonical.as_str()])
    }

    /// Plan cache key: digest of the shape together with the indexes
    /// usable for it and any hint
    pub fn plan_cache_key(&self, usable: &[&IndexSpec], hint: Option<&str>) -> String {
        let mut catalog: Vec<String> = usable.iter().map(|spec| spec.to_string()).collect();
        catalog.sort();
        let catalog = catalog.join(";");
        digest(&[self.canonical.as_str(), catalog.as_str(), hint.unwrap_or("")])
    }
}

/// First four bytes of a SHA-256 digest as upper-case hex
fn digest(parts: &[&str]) -> String {
    let mut hasher = Sha256::new();
    for part in parts {
        hasher.update(part.as_bytes());
        hasher.update([0u8]);
    }
    let result = hasher.finalize();
    result[..4].iter().map(|b| format!("{:02X}", b)).collect()
}

/// Shape of a filter: keys sorted, literals replaced
fn shape_filter(filter: &Value) -> Value {
    match filter {
        Value::Object(map) if extended_json_tag(map).is_none() => {
            let mut keys: Vec<&String> = map.keys().collect();
            keys.sort();

            let mut shaped = Map::new();
            for key in keys {
                let value = &map[key.as_str()];
                let child = match key.as_str() {
                    "$and" | "$or" | "$nor" => match value {
                        Value::Array(branches) => {
                            Value::Array(branches.iter().map(shape_filter).collect())
                        }
                        _ => json!(PLACEHOLDER),
                    },
                    "$elemMatch" | "$not" => shape_filter(value),
                    "$options" => value.clone(),
                    _ if value.is_object() => shape_filter(value),
                    _ => json!(PLACEHOLDER),
                };
                shaped.insert(key.clone(), child);
            }
            Value::Object(shaped)
        }
        _ => json!(PLACEHOLDER),
    }
}

fn shape_stage(stage: &Value) -> Value {
    let Some(map) = stage.as_object() else {
        return json!(PLACEHOLDER);
    };
    let mut shaped = Map::new();
    for (name, body) in map {
        let body = match name.as_str() {
            "$match" => shape_filter(body),
            "$limit" | "$skip" => json!(PLACEHOLDER),
            _ => body.clone(),
        };
        shaped.insert(name.clone(), body);
    }
    Value::Object(shaped)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_literals_do_not_change_shape() {
        let a = QueryShape::of_filter(&json!({"year": 1995, "genres": "Drama"}));
        let b = QueryShape::of_filter(&json!({"genres": "Comedy", "year": 2001}));
        assert_eq!(a, b);
        assert_eq!(a.query_hash(), b.query_hash());
    }

    #[test]
    fn test_operators_change_shape() {
        let a = QueryShape::of_filter(&json!({"imdb.rating": {"$gte": 8.0}}));
        let b = QueryShape::of_filter(&json!({"imdb.rating": {"$gt": 8.0}}));
        assert_ne!(a.query_hash(), b.query_hash());
    }

    #[test]
    fn test_limit_is_a_parameter() {
        let a = QueryShape::of_find(&FindRequest::new(json!({"year": 1})).limit(5));
        let b = QueryShape::of_find(&FindRequest::new(json!({"year": 2})).limit(50));
        assert_eq!(a, b);
    }

    #[test]
    fn test_hash_format() {
        let hash = QueryShape::of_filter(&json!({"genres": "Drama"})).query_hash();
        assert_eq!(hash.len(), 8);
        assert!(hash.chars().all(|c| c.is_ascii_digit() || ('A'..='F').contains(&c)));
    }

    #[test]
    fn test_cache_key_depends_on_usable_indexes() {
        let shape = QueryShape::of_filter(&json!({"genres": "Drama"}));
        let genres = IndexSpec::single("genres", "test_genres_idx");
        let other = IndexSpec::single("genres", "test_other_idx");

        let without = shape.plan_cache_key(&[], None);
        let with = shape.plan_cache_key(&[&genres], None);
        let with_both = shape.plan_cache_key(&[&other, &genres], None);
        let with_both_reordered = shape.plan_cache_key(&[&genres, &other], None);
        let hinted = shape.plan_cache_key(&[&genres], Some("test_genres_idx"));

        assert_ne!(without, with);
        assert_ne!(with, with_both);
        assert_eq!(with_both, with_both_reordered);
        assert_ne!(with, hinted);
    }

    #[test]
    fn test_pipeline_shape_ignores_match_literals() {
        let a = QueryShape::of_pipeline(&Pipeline::new(vec![
            json!({"$match": {"year": 1999}}),
            json!({"$limit": 3}),
        ]));
        let b = QueryShape::of_pipeline(&Pipeline::new(vec![
            json!({"$match": {"year": 2005}}),
            json!({"$limit": 10}),
        ]));
        assert_eq!(a.query_hash(), b.query_hash());
    }
}
