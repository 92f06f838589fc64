//! Semantic field types for result checks

use std::fmt;

use serde_json::Value;

use crate::store::{type_class, TypeClass};

/// Closed set of field types a result check can expect
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum SemanticType {
    /// UTF-8 string
    String,
    /// Integral number
    Integer,
    /// Floating point number
    Double,
    /// Boolean
    Boolean,
    /// Embedded document
    Document,
    /// Array of any values
    Array,
    /// Explicit null
    Null,
    /// `{"$oid": ..}`
    ObjectId,
    /// `{"$date": ..}`
    Date,
}

impl SemanticType {
    /// Both numeric tags
    pub const NUMERIC: [SemanticType; 2] = [SemanticType::Integer, SemanticType::Double];

    /// Returns the type name for error messages
    pub fn type_name(&self) -> &'static str {
        match self {
            SemanticType::String => "string",
            SemanticType::Integer => "integer",
            SemanticType::Double => "double",
            SemanticType::Boolean => "boolean",
            SemanticType::Document => "document",
            SemanticType::Array => "array",
            SemanticType::Null => "null",
            SemanticType::ObjectId => "objectId",
            SemanticType::Date => "date",
        }
    }

    /// Tag of a JSON value
    pub fn of(value: &Value) -> Self {
        match type_class(value) {
            TypeClass::Null => SemanticType::Null,
            TypeClass::Boolean => SemanticType::Boolean,
            TypeClass::String => SemanticType::String,
            TypeClass::Array => SemanticType::Array,
            TypeClass::Document => SemanticType::Document,
            TypeClass::ObjectId => SemanticType::ObjectId,
            TypeClass::Date => SemanticType::Date,
            TypeClass::Number => match value {
                Value::Number(n) if n.is_f64() => SemanticType::Double,
                Value::Object(map) if map.contains_key("$numberDouble") => SemanticType::Double,
                _ => SemanticType::Integer,
            },
        }
    }
}

impl fmt::Display for SemanticType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.type_name())
    }
}

/// Expected tags per field, in declaration order
#[derive(Debug, Clone, Default, PartialEq)]
pub struct FieldTypes {
    fields: Vec<(String, Vec<SemanticType>)>,
}

impl FieldTypes {
    /// Empty expectation set
    pub fn new() -> Self {
        Self::default()
    }

    /// Expect a field to carry one of the given tags.
    ///
    /// Declaring a field again replaces its tags.
    pub fn field(mut self, path: impl Into<String>, allowed: &[SemanticType]) -> Self {
        let path = path.into();
        let allowed = allowed.to_vec();
        match self.fields.iter_mut().find(|(p, _)| *p == path) {
            Some(entry) => entry.1 = allowed,
            None => self.fields.push((path, allowed)),
        }
        self
    }

    /// Declared fields with their allowed tags
    pub fn iter(&self) -> impl Iterator<Item = (&str, &[SemanticType])> {
        self.fields.iter().map(|(p, t)| (p.as_str(), t.as_slice()))
    }

    /// Allowed tags of a field
    pub fn allowed(&self, path: &str) -> Option<&[SemanticType]> {
        self.fields
            .iter()
            .find(|(p, _)| p == path)
            .map(|(_, t)| t.as_slice())
    }

    /// Number of declared fields
    pub fn len(&self) -> usize {
        self.fields.len()
    }

    /// Returns true if no field is declared
    pub fn is_empty(&self) -> bool {
        self.fields.is_empty()
    }
}
