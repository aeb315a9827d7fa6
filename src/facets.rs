//! Opaque facet snapshots.
//!
//! A facet snapshot is whatever selection state the caller had when a prompt
//! was generated or a preset was saved. The core never interprets it; it only
//! checks that it is a JSON object when it is written into a preset or a
//! lineage entry.

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use crate::error::FacetError;

/// Serializable snapshot of facet selections, keyed by facet name.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct FacetSnapshot(Map<String, Value>);

impl FacetSnapshot {
    /// Create an empty snapshot.
    pub fn new() -> Self {
        Self::default()
    }

    /// Set one facet value.
    pub fn with(mut self, facet: impl Into<String>, value: impl Into<Value>) -> Self {
        self.0.insert(facet.into(), value.into());
        self
    }

    /// Look up a facet value.
    pub fn get(&self, facet: &str) -> Option<&Value> {
        self.0.get(facet)
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    /// Convert back into a plain JSON value.
    pub fn into_value(self) -> Value {
        Value::Object(self.0)
    }
}

impl TryFrom<Value> for FacetSnapshot {
    type Error = FacetError;

    fn try_from(value: Value) -> Result<Self, Self::Error> {
        match value {
            Value::Object(map) => Ok(Self(map)),
            Value::Null => Err(FacetError::NotAnObject("null")),
            Value::Bool(_) => Err(FacetError::NotAnObject("boolean")),
            Value::Number(_) => Err(FacetError::NotAnObject("number")),
            Value::String(_) => Err(FacetError::NotAnObject("string")),
            Value::Array(_) => Err(FacetError::NotAnObject("array")),
        }
    }
}

impl From<Map<String, Value>> for FacetSnapshot {
    fn from(map: Map<String, Value>) -> Self {
        Self(map)
    }
}
