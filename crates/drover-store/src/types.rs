//! Core store types: documents, filters, updates and index specs.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::StoreError;

/// A single document: a stable identifier plus a JSON object body.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Document {
    /// Stable document identifier.
    pub id: String,
    /// JSON object holding the document fields.
    pub body: Value,
}

impl Document {
    /// Create a document from an id and a JSON body.
    pub fn new(id: impl Into<String>, body: Value) -> Self {
        Self {
            id: id.into(),
            body,
        }
    }

    /// Get a field value, treating JSON `null` as absent.
    pub fn field(&self, name: &str) -> Option<&Value> {
        self.body.get(name).filter(|v| !v.is_null())
    }

    /// Whether a field is present with a non-null value.
    pub fn has_field(&self, name: &str) -> bool {
        self.field(name).is_some()
    }
}

/// A predicate on a single document field.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "op", content = "value", rename_all = "snake_case")]
pub enum FieldPredicate {
    /// Field equals the given value.
    Eq(Value),
    /// Field equals one of the given values.
    AnyOf(Vec<Value>),
    /// Field is absent or `null`.
    Missing,
    /// Field is present with a non-null value.
    Exists,
}

impl FieldPredicate {
    fn matches(&self, field: Option<&Value>) -> bool {
        // `null` and absent are equivalent throughout.
        let field = field.filter(|v| !v.is_null());
        match self {
            FieldPredicate::Eq(expected) => field == Some(expected),
            FieldPredicate::AnyOf(values) => field.is_some_and(|v| values.contains(v)),
            FieldPredicate::Missing => field.is_none(),
            FieldPredicate::Exists => field.is_some(),
        }
    }
}

/// A conjunction of field predicates, optionally pinned to a document id.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Filter {
    /// Match a specific document id.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub id: Option<String>,
    /// Per-field predicates; all must match.
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub fields: BTreeMap<String, FieldPredicate>,
}

impl Filter {
    /// An empty filter matching every document.
    pub fn new() -> Self {
        Self::default()
    }

    /// Match a specific document id.
    pub fn id(mut self, id: impl Into<String>) -> Self {
        self.id = Some(id.into());
        self
    }

    /// Require `field == value`.
    pub fn eq(mut self, field: impl Into<String>, value: Value) -> Self {
        self.fields.insert(field.into(), FieldPredicate::Eq(value));
        self
    }

    /// Require `field` to equal one of `values`.
    pub fn any_of(mut self, field: impl Into<String>, values: Vec<Value>) -> Self {
        self.fields
            .insert(field.into(), FieldPredicate::AnyOf(values));
        self
    }

    /// Require `field` to be absent or null.
    pub fn missing(mut self, field: impl Into<String>) -> Self {
        self.fields.insert(field.into(), FieldPredicate::Missing);
        self
    }

    /// Require `field` to be present and non-null.
    pub fn exists(mut self, field: impl Into<String>) -> Self {
        self.fields.insert(field.into(), FieldPredicate::Exists);
        self
    }

    /// Whether a document satisfies every predicate in this filter.
    pub fn matches(&self, doc: &Document) -> bool {
        if let Some(ref id) = self.id
            && *id != doc.id
        {
            return false;
        }
        self.fields
            .iter()
            .all(|(field, predicate)| predicate.matches(doc.body.get(field)))
    }
}

/// A `$set`-style update: assigns values to the named fields.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Update {
    /// Fields to set, with their new values.
    pub set: BTreeMap<String, Value>,
}

impl Update {
    /// An empty update.
    pub fn new() -> Self {
        Self::default()
    }

    /// Set `field` to `value`.
    pub fn set(mut self, field: impl Into<String>, value: Value) -> Self {
        self.set.insert(field.into(), value);
        self
    }

    /// Apply this update to a document body in place.
    ///
    /// Returns true if any field actually changed.
    pub fn apply(&self, body: &mut Value) -> bool {
        let Some(object) = body.as_object_mut() else {
            return false;
        };
        let mut changed = false;
        for (field, value) in &self.set {
            if object.get(field) != Some(value) {
                object.insert(field.clone(), value.clone());
                changed = true;
            }
        }
        changed
    }
}

/// Outcome of a single-document update.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct UpdateOutcome {
    /// Number of documents matched by the filter (0 or 1).
    pub matched: u64,
    /// Number of documents actually modified.
    pub modified: u64,
}

/// Sort order of an index key.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum IndexOrder {
    Ascending,
    Descending,
}

impl IndexOrder {
    fn suffix(self) -> &'static str {
        match self {
            IndexOrder::Ascending => "1",
            IndexOrder::Descending => "-1",
        }
    }
}

/// A concrete index on a collection.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct IndexSpec {
    /// Canonical index name, derived from the keys.
    pub name: String,
    /// Ordered key fields.
    pub keys: Vec<(String, IndexOrder)>,
    /// Whether the index enforces uniqueness.
    pub unique: bool,
}

/// Name of the store's built-in primary index, which is never managed.
pub(crate) const PRIMARY_INDEX: &str = "_id_";

impl IndexSpec {
    /// Build a validated spec; the name is derived from the keys
    /// (`user_1_slug_1` style).
    pub fn new(keys: Vec<(String, IndexOrder)>, unique: bool) -> Result<Self, StoreError> {
        if keys.is_empty() {
            return Err(StoreError::InvalidIndex(
                "index must have at least one key".to_string(),
            ));
        }
        if keys.iter().any(|(field, _)| field.is_empty()) {
            return Err(StoreError::InvalidIndex(
                "index key field name is empty".to_string(),
            ));
        }
        let name = keys
            .iter()
            .map(|(field, order)| format!("{}_{}", field, order.suffix()))
            .collect::<Vec<_>>()
            .join("_");
        if name == PRIMARY_INDEX {
            return Err(StoreError::InvalidIndex(
                "cannot redefine the primary index".to_string(),
            ));
        }
        Ok(Self { name, keys, unique })
    }

    /// Whether two specs describe the same index (keys and uniqueness).
    pub fn same_definition(&self, other: &IndexSpec) -> bool {
        self.keys == other.keys && self.unique == other.unique
    }
}
