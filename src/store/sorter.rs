//! Result sorting
//!
//! Multi-key sort over dotted paths; stable and deterministic. A missing
//! field sorts as null.

use std::cmp::Ordering;

use serde_json::Value;

use super::errors::{StoreError, StoreResult};
use super::request::{Document, IndexDirection, IndexField};
use super::value::{compare_values, lookup_in};

const BAD_SORT: i32 = 15975;

/// Parsed sort specification
#[derive(Debug, Clone, PartialEq)]
pub struct SortSpec {
    /// Ordered sort keys
    pub keys: Vec<IndexField>,
}

impl SortSpec {
    /// Parse a sort document such as `{"imdb.rating": -1, "title": 1}`
    pub fn parse(sort: &Value) -> StoreResult<Self> {
        let map = sort.as_object().ok_or_else(|| {
            StoreError::rejected(BAD_SORT, "the $sort key specification must be an object")
        })?;
        if map.is_empty() {
            return Err(StoreError::rejected(
                BAD_SORT,
                "$sort stage must have at least one sort key",
            ));
        }

        let mut keys = Vec::with_capacity(map.len());
        for (path, direction) in map {
            let direction = match direction.as_f64() {
                Some(d) if d == 1.0 => IndexDirection::Ascending,
                Some(d) if d == -1.0 => IndexDirection::Descending,
                _ => {
                    return Err(StoreError::rejected(
                        BAD_SORT,
                        format!(
                            "$sort key ordering must be 1 (for ascending) or -1 (for descending), got {} for {}",
                            direction, path
                        ),
                    ))
                }
            };
            keys.push(IndexField {
                path: path.clone(),
                direction,
            });
        }
        Ok(Self { keys })
    }

    /// Returns the leading sort path
    pub fn leading_field(&self) -> Option<&str> {
        self.keys.first().map(|k| k.path.as_str())
    }
}

/// Sorts documents
pub struct ResultSorter;

impl ResultSorter {
    /// Sorts documents according to the sort specification.
    ///
    /// Sort is stable and deterministic.
    pub fn sort(documents: &mut [Document], spec: &SortSpec) {
        documents.sort_by(|a, b| {
            for key in &spec.keys {
                let ordering = Self::compare_at(a, b, &key.path);
                let ordering = match key.direction {
                    IndexDirection::Ascending => ordering,
                    IndexDirection::Descending => ordering.reverse(),
                };
                if ordering != Ordering::Equal {
                    return ordering;
                }
            }
            Ordering::Equal
        });
    }

    fn compare_at(a: &Document, b: &Document, path: &str) -> Ordering {
        let a_val = lookup_in(a, path).first().copied().unwrap_or(&Value::Null);
        let b_val = lookup_in(b, path).first().copied().unwrap_or(&Value::Null);
        compare_values(a_val, b_val)
    }
}
