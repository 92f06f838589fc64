//! Projections for `find` and `$project`

use serde_json::Value;

use super::errors::{StoreError, StoreResult};
use super::expression::Expression;
use super::request::{Document, IndexSpec};
use super::value::{get_path, remove_path, set_path};

const INCLUSION_CONFLICT: i32 = 31254;
const EXCLUSION_CONFLICT: i32 = 31253;
const EMPTY_PROJECTION: i32 = 51272;

/// How one projected field is produced
#[derive(Debug, Clone, PartialEq)]
pub enum FieldRule {
    Include,
    Computed(Expression),
}

/// Parsed projection
#[derive(Debug, Clone, PartialEq)]
pub enum Projection {
    /// Keep only the listed fields (plus `_id` unless excluded)
    Inclusion {
        fields: Vec<(String, FieldRule)>,
        keep_id: bool,
    },
    /// Drop the listed fields
    Exclusion { fields: Vec<String> },
}

impl Projection {
    /// Parse a projection document
    pub fn parse(spec: &Value) -> StoreResult<Self> {
        let map = spec.as_object().ok_or_else(|| {
            StoreError::rejected(2, "projection specification must be an object")
        })?;
        if map.is_empty() {
            return Err(StoreError::rejected(
                EMPTY_PROJECTION,
                "projection specification must have at least one field",
            ));
        }

        let mut included = Vec::new();
        let mut excluded = Vec::new();
        let mut keep_id = true;

        for (path, value) in map {
            let flag = match value {
                Value::Bool(b) => Some(*b),
                Value::Number(n) => Some(n.as_f64().is_some_and(|v| v != 0.0)),
                _ => None,
            };
            match flag {
                Some(false) if path == "_id" => keep_id = false,
                Some(false) => excluded.push(path.clone()),
                Some(true) => included.push((path.clone(), FieldRule::Include)),
                None => {
                    let expr = Expression::compile(value)?;
                    included.push((path.clone(), FieldRule::Computed(expr)));
                }
            }
        }

        match (included.is_empty(), excluded.is_empty()) {
            (false, false) => Err(StoreError::rejected(
                INCLUSION_CONFLICT,
                format!(
                    "Cannot do exclusion on field {} in inclusion projection",
                    excluded[0]
                ),
            )),
            (true, false) => {
                if !keep_id {
                    excluded.push("_id".to_string());
                }
                Ok(Projection::Exclusion { fields: excluded })
            }
            (false, true) => Ok(Projection::Inclusion {
                fields: included,
                keep_id,
            }),
            (true, true) if !keep_id => Ok(Projection::Exclusion {
                fields: vec!["_id".to_string()],
            }),
            (true, true) => Err(StoreError::rejected(
                EXCLUSION_CONFLICT,
                "projection specification is empty",
            )),
        }
    }

    /// Apply to one document
    pub fn apply(&self, document: &Document) -> Document {
        match self {
            Projection::Inclusion { fields, keep_id } => {
                let mut out = Document::new();
                if *keep_id {
                    if let Some(id) = document.get("_id") {
                        out.insert("_id".to_string(), id.clone());
                    }
                }
                let source = Value::Object(document.clone());
                for (path, rule) in fields {
                    let value = match rule {
                        FieldRule::Include => get_path(&source, path).cloned(),
                        FieldRule::Computed(expr) => expr.evaluate(document),
                    };
                    if let Some(value) = value {
                        set_path(&mut out, path, value);
                    }
                }
                out
            }
            Projection::Exclusion { fields } => {
                let mut out = document.clone();
                for path in fields {
                    remove_path(&mut out, path);
                }
                out
            }
        }
    }

    /// Returns true if the index alone can produce the projected documents
    pub fn is_covered_by(&self, index: &IndexSpec) -> bool {
        match self {
            Projection::Inclusion { fields, keep_id } => {
                (!*keep_id || index.covers_field("_id"))
                    && fields.iter().all(|(path, rule)| {
                        *rule == FieldRule::Include && index.covers_field(path)
                    })
            }
            Projection::Exclusion { .. } => false,
        }
    }

    /// Returns true if the projection computes new values
    pub fn has_computed_fields(&self) -> bool {
        match self {
            Projection::Inclusion { fields, .. } => {
                fields.iter().any(|(_, rule)| matches!(rule, FieldRule::Computed(_)))
            }
            Projection::Exclusion { .. } => false,
        }
    }
}
