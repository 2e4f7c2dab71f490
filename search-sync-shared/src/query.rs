//! Search query payloads.

use std::str::FromStr;

use serde_json::Value;

/// What a caller asks the search backend for.
///
/// A JSON payload is sent as the request body; plain text is sent as a
/// query-string (`q`) search.
#[derive(Debug, Clone, PartialEq)]
pub enum SearchQuery {
    Payload(Value),
    Text(String),
}

impl SearchQuery {
    /// A `match_all` payload.
    pub fn match_all() -> Self {
        SearchQuery::Payload(serde_json::json!({ "query": { "match_all": {} } }))
    }

    /// The body payload, if this is a payload query.
    pub fn payload(&self) -> Option<&Value> {
        match self {
            SearchQuery::Payload(body) => Some(body),
            SearchQuery::Text(_) => None,
        }
    }

    /// Page size declared inside the payload.
    pub fn size(&self) -> Option<usize> {
        self.payload()?
            .get("size")
            .and_then(Value::as_u64)
            .map(|size| size as usize)
    }

    /// Whether the payload declares a non-empty `sort`.
    pub fn has_sort(&self) -> bool {
        match self.payload().and_then(|body| body.get("sort")) {
            Some(Value::Array(sort)) => !sort.is_empty(),
            Some(Value::Object(sort)) => !sort.is_empty(),
            Some(Value::String(sort)) => !sort.is_empty(),
            _ => false,
        }
    }

    /// Return a copy of the payload with `search_after` set.
    ///
    /// Text queries cannot carry `search_after` and are returned unchanged.
    pub fn with_search_after(&self, sort_values: Vec<Value>) -> Self {
        match self {
            SearchQuery::Payload(Value::Object(body)) => {
                let mut body = body.clone();
                body.insert("search_after".to_string(), Value::Array(sort_values));
                SearchQuery::Payload(Value::Object(body))
            }
            other => other.clone(),
        }
    }
}

impl FromStr for SearchQuery {
    type Err = serde_json::Error;

    /// Strings that open with `{` are parsed as JSON payloads, anything else
    /// is a query string.
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        if s.trim_start().starts_with('{') {
            serde_json::from_str(s).map(SearchQuery::Payload)
        } else {
            Ok(SearchQuery::Text(s.to_string()))
        }
    }
}

impl From<Value> for SearchQuery {
    fn from(body: Value) -> Self {
        SearchQuery::Payload(body)
    }
}
