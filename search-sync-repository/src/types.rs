//! Request and response types for search backend operations.

use serde::{Deserialize, Serialize};
use serde_json::{json, Map, Value};

use crate::errors::SearchError;
use search_sync_shared::{BulkItemError, SearchQuery};

/// Kind of document-level instruction in a bulk write.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum BulkAction {
    /// Create or replace the whole document.
    Index,
    /// Merge into an existing document, creating it if missing.
    Update,
}

impl BulkAction {
    /// The action keyword used on the bulk action line.
    pub fn as_str(&self) -> &'static str {
        match self {
            BulkAction::Index => "index",
            BulkAction::Update => "update",
        }
    }
}

/// One document-level instruction destined for a bulk write.
///
/// The body is always present. Only the identity is optional, in which case
/// the backend generates one (allowed for [`BulkAction::Index`] only).
#[derive(Debug, Clone, PartialEq)]
pub struct BulkOperation {
    pub action: BulkAction,
    /// Overrides the index given to the bulk call.
    pub index: Option<String>,
    pub id: Option<String>,
    pub body: Value,
}

impl BulkOperation {
    /// Create an index (create-or-replace) operation without explicit id.
    pub fn index(body: Value) -> Self {
        Self {
            action: BulkAction::Index,
            index: None,
            id: None,
            body,
        }
    }

    /// Create an upsert operation for the given document id.
    pub fn upsert(id: impl Into<String>, body: Value) -> Self {
        Self {
            action: BulkAction::Update,
            index: None,
            id: Some(id.into()),
            body,
        }
    }

    /// Set the document id.
    pub fn with_id(mut self, id: impl Into<String>) -> Self {
        self.id = Some(id.into());
        self
    }

    /// Route the document to a specific index.
    pub fn with_index(mut self, index: impl Into<String>) -> Self {
        self.index = Some(index.into());
        self
    }

    /// Check the invariants a backend relies on.
    pub fn validate(&self) -> Result<(), SearchError> {
        if !self.body.is_object() {
            return Err(SearchError::bulk_index(format!(
                "bulk {} operation requires an object body",
                self.action.as_str()
            )));
        }
        if self.action == BulkAction::Update && self.id.is_none() {
            return Err(SearchError::bulk_index(
                "bulk update operation requires a document id",
            ));
        }
        Ok(())
    }

    /// The action/metadata line of the bulk payload.
    pub fn action_line(&self) -> Value {
        let mut meta = Map::new();
        if let Some(index) = &self.index {
            meta.insert("_index".to_string(), json!(index));
        }
        if let Some(id) = &self.id {
            meta.insert("_id".to_string(), json!(id));
        }
        let mut line = Map::new();
        line.insert(self.action.as_str().to_string(), Value::Object(meta));
        Value::Object(line)
    }

    /// The source line of the bulk payload.
    pub fn body_line(&self) -> Value {
        match self.action {
            BulkAction::Index => self.body.clone(),
            BulkAction::Update => json!({ "doc": self.body, "doc_as_upsert": true }),
        }
    }
}

/// Per-item outcome of a bulk write.
#[derive(Debug, Clone, PartialEq)]
pub struct BulkItem {
    pub action: String,
    pub index: Option<String>,
    pub id: Option<String>,
    pub status: u16,
    pub error: Option<Value>,
}

impl BulkItem {
    /// Parse one entry of the bulk `items` array (`{"index": {...}}`).
    pub fn from_value(value: &Value) -> Option<Self> {
        let (action, detail) = value.as_object()?.iter().next()?;
        Some(Self {
            action: action.clone(),
            index: detail.get("_index").and_then(Value::as_str).map(String::from),
            id: detail.get("_id").and_then(Value::as_str).map(String::from),
            status: detail
                .get("status")
                .and_then(Value::as_u64)
                .unwrap_or_default() as u16,
            error: detail.get("error").filter(|e| !e.is_null()).cloned(),
        })
    }

    /// Check if the backend rejected this item.
    pub fn is_error(&self) -> bool {
        self.error.is_some()
    }

    /// Convert a rejected item into its error record.
    pub fn to_error(&self) -> Option<BulkItemError> {
        self.error.as_ref().map(|error| BulkItemError {
            index: self.index.clone(),
            id: self.id.clone(),
            status: self.status,
            error: error.clone(),
        })
    }
}

/// Outcome of one bulk write call.
#[derive(Debug, Clone, PartialEq)]
pub struct BulkResponse {
    /// Backend-side processing time in milliseconds.
    pub took: u64,
    /// Whether any item failed.
    pub errors: bool,
    pub items: Vec<BulkItem>,
}

impl BulkResponse {
    /// Parse a raw bulk response body.
    pub fn from_value(value: &Value) -> Result<Self, SearchError> {
        let items = value
            .get("items")
            .and_then(Value::as_array)
            .ok_or_else(|| SearchError::parse("bulk response has no items array"))?
            .iter()
            .filter_map(BulkItem::from_value)
            .collect::<Vec<_>>();

        Ok(Self {
            took: value.get("took").and_then(Value::as_u64).unwrap_or_default(),
            errors: value
                .get("errors")
                .and_then(Value::as_bool)
                .unwrap_or_else(|| items.iter().any(BulkItem::is_error)),
            items,
        })
    }

    /// Items the backend rejected, in request order.
    pub fn error_items(&self) -> Vec<BulkItemError> {
        self.items.iter().filter_map(BulkItem::to_error).collect()
    }
}

/// A fully resolved search call.
#[derive(Debug, Clone, PartialEq)]
pub struct SearchRequest {
    /// Indices or patterns to query.
    pub indices: Vec<String>,
    /// JSON body, for payload searches.
    pub body: Option<Value>,
    /// Query string, for text searches.
    pub q: Option<String>,
    /// Page size when not declared in the body.
    pub size: Option<usize>,
    /// Scroll keep-alive; opens a scroll context when set.
    pub scroll: Option<String>,
}

impl SearchRequest {
    /// Build a request for the given indices from a query.
    pub fn new(indices: Vec<String>, query: &SearchQuery) -> Self {
        let (body, q) = match query {
            SearchQuery::Payload(body) => (Some(body.clone()), None),
            SearchQuery::Text(text) => (None, Some(text.clone())),
        };
        Self {
            indices,
            body,
            q,
            size: None,
            scroll: None,
        }
    }

    /// Set the page size.
    pub fn with_size(mut self, size: usize) -> Self {
        self.size = Some(size);
        self
    }

    /// Open a scroll context with the given keep-alive.
    pub fn with_scroll(mut self, keep_alive: impl Into<String>) -> Self {
        self.scroll = Some(keep_alive.into());
        self
    }

    /// Reject requests the backend cannot run: no target index, or a payload
    /// that is not a JSON object.
    pub fn validate(&self) -> Result<(), SearchError> {
        if self.indices.is_empty() {
            return Err(SearchError::invalid_query("search request names no index"));
        }
        if let Some(body) = &self.body {
            if !body.is_object() {
                return Err(SearchError::invalid_query(format!(
                    "search body must be a JSON object, got {}",
                    body
                )));
            }
        }
        Ok(())
    }

    /// Comma separated index list, as used in request paths.
    pub fn index_list(&self) -> String {
        self.indices.join(",")
    }
}
