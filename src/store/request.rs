//! Request types exchanged with the database collaborator

use std::fmt;

use serde_json::{json, Map, Value};

/// A document as returned by the store
pub type Document = Map<String, Value>;

/// Direction of one index key
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum IndexDirection {
    Ascending,
    Descending,
}

impl IndexDirection {
    /// Wire representation (`1` / `-1`)
    pub fn as_i32(&self) -> i32 {
        match self {
            IndexDirection::Ascending => 1,
            IndexDirection::Descending => -1,
        }
    }

    /// Parse the wire representation
    pub fn from_value(value: &Value) -> Option<Self> {
        match value.as_f64() {
            Some(v) if v > 0.0 => Some(IndexDirection::Ascending),
            Some(v) if v < 0.0 => Some(IndexDirection::Descending),
            _ => None,
        }
    }
}

/// One field of an index key specification
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct IndexField {
    /// Dotted field path
    pub path: String,
    /// Key direction
    pub direction: IndexDirection,
}

/// Named index specification
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct IndexSpec {
    /// Index name, unique per collection
    pub name: String,
    /// Ordered key fields
    pub keys: Vec<IndexField>,
}

impl IndexSpec {
    /// Create a specification with no keys yet
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            keys: Vec::new(),
        }
    }

    /// Single ascending field index
    pub fn single(path: impl Into<String>, name: impl Into<String>) -> Self {
        Self::new(name).ascending(path)
    }

    /// Append an ascending key
    pub fn ascending(mut self, path: impl Into<String>) -> Self {
        self.keys.push(IndexField {
            path: path.into(),
            direction: IndexDirection::Ascending,
        });
        self
    }

    /// Append a descending key
    pub fn descending(mut self, path: impl Into<String>) -> Self {
        self.keys.push(IndexField {
            path: path.into(),
            direction: IndexDirection::Descending,
        });
        self
    }

    /// The same key specification under another name
    pub fn renamed(&self, name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            keys: self.keys.clone(),
        }
    }

    /// The built-in primary key index
    pub fn primary() -> Self {
        Self::single("_id", "_id_")
    }

    /// Returns the leading key path
    pub fn leading_field(&self) -> Option<&str> {
        self.keys.first().map(|k| k.path.as_str())
    }

    /// Returns true if the path is one of the keys
    pub fn covers_field(&self, path: &str) -> bool {
        self.keys.iter().any(|k| k.path == path)
    }

    /// Same keys in the same order with the same directions
    pub fn is_equivalent(&self, other: &IndexSpec) -> bool {
        self.keys == other.keys
    }

    /// Key pattern document, e.g. `{"imdb.rating": 1, "genres": 1}`
    pub fn key_pattern(&self) -> Value {
        let mut pattern = Map::new();
        for key in &self.keys {
            pattern.insert(key.path.clone(), json!(key.direction.as_i32()));
        }
        Value::Object(pattern)
    }

    /// Parse a `{name, key}` entry as returned by `listIndexes`
    pub fn from_listing(entry: &Value) -> Option<Self> {
        let name = entry.get("name")?.as_str()?;
        let key = entry.get("key")?.as_object()?;
        let mut spec = IndexSpec::new(name);
        for (path, direction) in key {
            spec.keys.push(IndexField {
                path: path.clone(),
                direction: IndexDirection::from_value(direction)?,
            });
        }
        Some(spec)
    }

    /// Render as a `listIndexes` entry
    pub fn to_listing(&self) -> Value {
        json!({ "name": self.name, "key": self.key_pattern() })
    }
}

impl fmt::Display for IndexSpec {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} {}", self.name, self.key_pattern())
    }
}

/// A `find` operation with its cursor modifiers
#[derive(Debug, Clone, PartialEq, Default)]
pub struct FindRequest {
    /// Filter document
    pub filter: Value,
    /// Projection document
    pub projection: Option<Value>,
    /// Sort document
    pub sort: Option<Value>,
    /// Index name forced via hint
    pub hint: Option<String>,
    /// Maximum number of documents
    pub limit: Option<u64>,
}

impl FindRequest {
    /// Find with the given filter
    pub fn new(filter: Value) -> Self {
        Self {
            filter,
            ..Self::default()
        }
    }

    /// Attach a projection
    pub fn with_projection(mut self, projection: Value) -> Self {
        self.projection = Some(projection);
        self
    }

    /// Attach a sort
    pub fn with_sort(mut self, sort: Value) -> Self {
        self.sort = Some(sort);
        self
    }

    /// Force the named index
    pub fn hint(mut self, index_name: impl Into<String>) -> Self {
        self.hint = Some(index_name.into());
        self
    }

    /// Limit the number of documents
    pub fn limit(mut self, limit: u64) -> Self {
        self.limit = Some(limit);
        self
    }

    /// Render for diagnostics
    pub fn to_json(&self) -> Value {
        let mut out = Map::new();
        out.insert("find".into(), self.filter.clone());
        if let Some(projection) = &self.projection {
            out.insert("projection".into(), projection.clone());
        }
        if let Some(sort) = &self.sort {
            out.insert("sort".into(), sort.clone());
        }
        if let Some(hint) = &self.hint {
            out.insert("hint".into(), json!(hint));
        }
        if let Some(limit) = self.limit {
            out.insert("limit".into(), json!(limit));
        }
        Value::Object(out)
    }
}

/// An aggregation pipeline
#[derive(Debug, Clone, PartialEq, Default)]
pub struct Pipeline {
    /// Ordered stage documents
    pub stages: Vec<Value>,
}

impl Pipeline {
    /// Pipeline from stage documents
    pub fn new(stages: Vec<Value>) -> Self {
        Self { stages }
    }

    /// Pipeline from a JSON array; any other value is a single stage
    pub fn from_value(value: Value) -> Self {
        match value {
            Value::Array(stages) => Self::new(stages),
            other => Self::new(vec![other]),
        }
    }

    /// Returns true if the pipeline has no stages
    pub fn is_empty(&self) -> bool {
        self.stages.is_empty()
    }

    /// Returns the number of stages
    pub fn len(&self) -> usize {
        self.stages.len()
    }

    /// Render for diagnostics
    pub fn to_json(&self) -> Value {
        json!({ "aggregate": self.stages })
    }
}
