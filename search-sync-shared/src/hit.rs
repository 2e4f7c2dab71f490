//! Search hit types.
//!
//! A hit is one ranked entry of a search response. Its identity is resolved
//! from the `_source` payload first because several entity types may share a
//! physical index, in which case the backend `_id` alone can collide.

use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Field of `_source` holding the record identity.
pub const SOURCE_ID_FIELD: &str = "id";

/// Field of `_source` naming the entity type a document was built from.
pub const TYPE_MARKER_FIELD: &str = "type";

/// One ranked entry returned by the search backend.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Hit {
    /// Physical index the document was found in.
    #[serde(rename = "_index", default)]
    pub index: String,
    /// Backend-assigned document identifier.
    #[serde(rename = "_id", default)]
    pub id: Option<String>,
    /// Relevance score, absent when sorting disables scoring.
    #[serde(rename = "_score", default)]
    pub score: Option<f64>,
    /// Stored document body.
    #[serde(rename = "_source", default)]
    pub source: Value,
    /// Sort values, present when the query declared a sort.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub sort: Option<Vec<Value>>,
}

impl Hit {
    /// Parse a raw hit object, returning `None` when it is not an object.
    pub fn from_value(value: &Value) -> Option<Self> {
        if !value.is_object() {
            return None;
        }
        serde_json::from_value(value.clone()).ok()
    }

    /// The identity used to find the backing record.
    ///
    /// Prefers `_source.id` (string or number) over the backend `_id`.
    pub fn document_id(&self) -> Option<String> {
        match self.source.get(SOURCE_ID_FIELD) {
            Some(Value::String(id)) => Some(id.clone()),
            Some(Value::Number(id)) => Some(id.to_string()),
            _ => self.id.clone(),
        }
    }

    /// The entity type marker embedded in the source payload.
    pub fn type_marker(&self) -> Option<&str> {
        self.source.get(TYPE_MARKER_FIELD).and_then(Value::as_str)
    }
}

/// Total hit count as reported by the backend.
///
/// Older servers report a bare number, newer ones an object carrying the
/// value and its relation (`eq` or `gte`).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum HitsTotal {
    Count(u64),
    Object {
        value: u64,
        #[serde(default)]
        relation: Option<String>,
    },
}

impl HitsTotal {
    /// The numeric total regardless of shape.
    pub fn value(&self) -> u64 {
        match self {
            HitsTotal::Count(value) => *value,
            HitsTotal::Object { value, .. } => *value,
        }
    }

    /// Read `hits.total` from a raw search response body.
    pub fn from_response(response: &Value) -> Option<Self> {
        let total = response.get("hits")?.get("total")?;
        serde_json::from_value(total.clone()).ok()
    }
}
