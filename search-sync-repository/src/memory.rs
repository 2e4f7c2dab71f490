//! In-process search backend.
//!
//! `InMemoryBackend` keeps indices, settings and documents in memory and
//! records every bulk call, settings write, refresh and search request so
//! callers can assert on them. Document failures can be injected and search
//! responses can be queued ahead of time.

use std::collections::{BTreeMap, VecDeque};
use std::sync::Arc;

use async_trait::async_trait;
use parking_lot::Mutex;
use serde_json::{json, Map, Value};
use tracing::debug;
use uuid::Uuid;

use crate::errors::SearchError;
use crate::interfaces::SearchBackend;
use crate::schema::merge_json;
use crate::types::{BulkAction, BulkItem, BulkOperation, BulkResponse, SearchRequest};

/// Decides whether a document is rejected. Returns the error object to report.
pub type FailureFn = Arc<dyn Fn(&Value) -> Option<Value> + Send + Sync>;

/// One recorded bulk call.
#[derive(Debug, Clone, PartialEq)]
pub struct BulkCall {
    pub index: String,
    pub operations: Vec<BulkOperation>,
    pub pipeline: Option<String>,
}

#[derive(Debug, Clone, Default)]
struct IndexState {
    settings: Value,
    mappings: Value,
    documents: Vec<(String, Value)>,
}

impl IndexState {
    fn upsert(&mut self, id: String, body: Value, merge: bool) -> bool {
        match self.documents.iter_mut().find(|(existing, _)| *existing == id) {
            Some((_, source)) => {
                if merge {
                    merge_json(source, body);
                } else {
                    *source = body;
                }
                false
            }
            None => {
                self.documents.push((id, body));
                true
            }
        }
    }
}

#[derive(Default)]
struct State {
    indices: BTreeMap<String, IndexState>,
    bulk_calls: Vec<BulkCall>,
    settings_writes: Vec<(String, Value)>,
    refreshes: Vec<String>,
    searches: Vec<SearchRequest>,
    canned: VecDeque<Value>,
    cleared_scrolls: Vec<String>,
    failure: Option<FailureFn>,
    scroll_failure: Option<SearchError>,
    clear_scroll_failure: Option<SearchError>,
}

/// In-memory implementation of [`SearchBackend`].
#[derive(Default)]
pub struct InMemoryBackend {
    state: Mutex<State>,
}

impl InMemoryBackend {
    pub fn new() -> Self {
        Self::default()
    }

    /// Create an index directly, bypassing the async API.
    pub fn insert_index(&self, index: impl Into<String>, settings: Value) {
        let mut state = self.state.lock();
        state.indices.insert(
            index.into(),
            IndexState {
                settings: normalize_settings(settings),
                mappings: json!({}),
                documents: Vec::new(),
            },
        );
    }

    /// Store a document directly, creating the index if needed.
    pub fn insert_document(&self, index: &str, id: impl Into<String>, source: Value) {
        let mut state = self.state.lock();
        state
            .indices
            .entry(index.to_string())
            .or_insert_with(empty_index)
            .upsert(id.into(), source, false);
    }

    /// Reject every bulk document for which `failure` returns an error object.
    pub fn fail_documents_where(&self, failure: FailureFn) {
        self.state.lock().failure = Some(failure);
    }

    /// Fail every `scroll` call with `error`.
    pub fn fail_scrolls(&self, error: SearchError) {
        self.state.lock().scroll_failure = Some(error);
    }

    /// Fail every `clear_scroll` call with `error`.
    pub fn fail_clear_scrolls(&self, error: SearchError) {
        self.state.lock().clear_scroll_failure = Some(error);
    }

    /// Queue a raw response returned by the next `search` or `scroll` call.
    pub fn push_search_response(&self, response: Value) {
        self.state.lock().canned.push_back(response);
    }

    pub fn bulk_calls(&self) -> Vec<BulkCall> {
        self.state.lock().bulk_calls.clone()
    }

    pub fn settings_writes(&self) -> Vec<(String, Value)> {
        self.state.lock().settings_writes.clone()
    }

    pub fn refreshes(&self) -> Vec<String> {
        self.state.lock().refreshes.clone()
    }

    pub fn searches(&self) -> Vec<SearchRequest> {
        self.state.lock().searches.clone()
    }

    pub fn cleared_scrolls(&self) -> Vec<String> {
        self.state.lock().cleared_scrolls.clone()
    }

    /// Documents of an index in insertion order.
    pub fn documents(&self, index: &str) -> Vec<(String, Value)> {
        self.state
            .lock()
            .indices
            .get(index)
            .map(|state| state.documents.clone())
            .unwrap_or_default()
    }

    pub fn mappings(&self, index: &str) -> Option<Value> {
        self.state
            .lock()
            .indices
            .get(index)
            .map(|state| state.mappings.clone())
    }

    /// Current settings of an index, in the `{"index": {...}}` layout.
    pub fn settings(&self, index: &str) -> Option<Value> {
        self.state
            .lock()
            .indices
            .get(index)
            .map(|state| state.settings.clone())
    }

    fn default_search_response(state: &State, request: &SearchRequest) -> Result<Value, SearchError> {
        let names = matching_indices(state, &request.indices);
        if names.is_empty() && !request.indices.iter().any(|i| i.contains('*')) {
            return Err(SearchError::index_not_found(request.index_list()));
        }

        let body = request.body.as_ref();
        let size = body
            .and_then(|b| b.get("size"))
            .and_then(Value::as_u64)
            .map(|s| s as usize)
            .or(request.size)
            .unwrap_or(10);
        let from = body
            .and_then(|b| b.get("from"))
            .and_then(Value::as_u64)
            .unwrap_or_default() as usize;

        let all: Vec<Value> = names
            .iter()
            .filter_map(|name| state.indices.get(name).map(|index| (name, index)))
            .flat_map(|(name, index)| {
                index.documents.iter().map(move |(id, source)| {
                    json!({ "_index": name, "_id": id, "_score": 1.0, "_source": source })
                })
            })
            .collect();

        let total = all.len();
        let hits: Vec<Value> = all.into_iter().skip(from).take(size).collect();

        let mut response = json!({
            "took": 1,
            "timed_out": false,
            "_shards": { "total": 1, "successful": 1, "skipped": 0, "failed": 0 },
            "hits": {
                "total": { "value": total, "relation": "eq" },
                "max_score": if hits.is_empty() { Value::Null } else { json!(1.0) },
                "hits": hits
            }
        });
        if request.scroll.is_some() {
            response["_scroll_id"] = json!(format!("scroll-{}", Uuid::new_v4()));
        }
        Ok(response)
    }
}

fn empty_index() -> IndexState {
    IndexState {
        settings: json!({ "index": {} }),
        mappings: json!({}),
        documents: Vec::new(),
    }
}

/// Bring settings into the `{"index": {...}}` layout the backend reports.
fn normalize_settings(settings: Value) -> Value {
    let mut map = match settings {
        Value::Object(map) => map,
        _ => Map::new(),
    };
    let mut index = match map.remove("index") {
        Some(Value::Object(index)) => index,
        _ => Map::new(),
    };
    for (key, value) in map {
        let key = key.strip_prefix("index.").map(String::from).unwrap_or(key);
        index.insert(key, value);
    }
    json!({ "index": index })
}

fn matches_pattern(pattern: &str, name: &str) -> bool {
    let parts: Vec<&str> = pattern.split('*').collect();
    if parts.len() == 1 {
        return pattern == name;
    }

    let mut rest = name;
    for (i, part) in parts.iter().enumerate() {
        if part.is_empty() {
            continue;
        }
        if i == 0 {
            match rest.strip_prefix(part) {
                Some(r) => rest = r,
                None => return false,
            }
        } else if i == parts.len() - 1 {
            return rest.ends_with(part);
        } else {
            match rest.find(part) {
                Some(pos) => rest = &rest[pos + part.len()..],
                None => return false,
            }
        }
    }
    true
}

fn matching_indices(state: &State, patterns: &[String]) -> Vec<String> {
    let mut names = Vec::new();
    for pattern in patterns.iter().flat_map(|p| p.split(',')) {
        for name in state.indices.keys() {
            if matches_pattern(pattern, name) && !names.contains(name) {
                names.push(name.clone());
            }
        }
    }
    names
}

#[async_trait]
impl SearchBackend for InMemoryBackend {
    async fn bulk(
        &self,
        index: &str,
        operations: &[BulkOperation],
        pipeline: Option<&str>,
    ) -> Result<BulkResponse, SearchError> {
        for operation in operations {
            operation.validate()?;
        }

        let mut state = self.state.lock();
        state.bulk_calls.push(BulkCall {
            index: index.to_string(),
            operations: operations.to_vec(),
            pipeline: pipeline.map(str::to_string),
        });
        let failure = state.failure.clone();

        let mut items = Vec::with_capacity(operations.len());
        for operation in operations {
            let target = operation.index.clone().unwrap_or_else(|| index.to_string());
            let id = operation
                .id
                .clone()
                .unwrap_or_else(|| Uuid::new_v4().to_string());

            if let Some(error) = failure.as_ref().and_then(|f| f(&operation.body)) {
                items.push(BulkItem {
                    action: operation.action.as_str().to_string(),
                    index: Some(target),
                    id: Some(id),
                    status: 400,
                    error: Some(error),
                });
                continue;
            }

            let created = state
                .indices
                .entry(target.clone())
                .or_insert_with(empty_index)
                .upsert(
                    id.clone(),
                    operation.body.clone(),
                    operation.action == BulkAction::Update,
                );
            items.push(BulkItem {
                action: operation.action.as_str().to_string(),
                index: Some(target),
                id: Some(id),
                status: if created { 201 } else { 200 },
                error: None,
            });
        }

        let errors = items.iter().any(BulkItem::is_error);
        debug!(index, items = items.len(), errors, "In-memory bulk");
        Ok(BulkResponse {
            took: if operations.is_empty() { 0 } else { 1 },
            errors,
            items,
        })
    }

    async fn index_document(
        &self,
        index: &str,
        id: Option<&str>,
        body: &Value,
    ) -> Result<(), SearchError> {
        let id = id
            .map(String::from)
            .unwrap_or_else(|| Uuid::new_v4().to_string());
        self.insert_document(index, id, body.clone());
        Ok(())
    }

    async fn delete_document(&self, index: &str, id: &str) -> Result<(), SearchError> {
        let mut state = self.state.lock();
        if let Some(index) = state.indices.get_mut(index) {
            index.documents.retain(|(existing, _)| existing != id);
        }
        Ok(())
    }

    async fn search(&self, request: &SearchRequest) -> Result<Value, SearchError> {
        request.validate()?;
        let mut state = self.state.lock();
        state.searches.push(request.clone());
        if let Some(response) = state.canned.pop_front() {
            return Ok(response);
        }
        Self::default_search_response(&state, request)
    }

    async fn scroll(&self, _scroll_id: &str, _keep_alive: &str) -> Result<Value, SearchError> {
        let mut state = self.state.lock();
        if let Some(error) = &state.scroll_failure {
            return Err(error.clone());
        }
        Ok(state.canned.pop_front().unwrap_or_else(|| {
            json!({
                "took": 0,
                "timed_out": false,
                "hits": { "total": { "value": 0, "relation": "eq" }, "hits": [] }
            })
        }))
    }

    async fn clear_scroll(&self, scroll_id: &str) -> Result<(), SearchError> {
        let mut state = self.state.lock();
        if let Some(error) = &state.clear_scroll_failure {
            return Err(error.clone());
        }
        state.cleared_scrolls.push(scroll_id.to_string());
        Ok(())
    }

    async fn count(&self, index: &str, _query: &Value) -> Result<u64, SearchError> {
        let state = self.state.lock();
        let names = matching_indices(&state, &[index.to_string()]);
        if names.is_empty() && !index.contains('*') {
            return Err(SearchError::index_not_found(index));
        }
        Ok(names
            .iter()
            .filter_map(|name| state.indices.get(name))
            .map(|state| state.documents.len() as u64)
            .sum())
    }

    async fn create_index(&self, index: &str, body: &Value) -> Result<(), SearchError> {
        let mut state = self.state.lock();
        if state.indices.contains_key(index) {
            return Err(SearchError::index_creation(format!(
                "resource_already_exists_exception: index [{}] already exists",
                index
            )));
        }
        state.indices.insert(
            index.to_string(),
            IndexState {
                settings: normalize_settings(body.get("settings").cloned().unwrap_or_default()),
                mappings: body.get("mappings").cloned().unwrap_or_else(|| json!({})),
                documents: Vec::new(),
            },
        );
        Ok(())
    }

    async fn delete_index(&self, index: &str) -> Result<bool, SearchError> {
        Ok(self.state.lock().indices.remove(index).is_some())
    }

    async fn index_exists(&self, index: &str) -> Result<bool, SearchError> {
        Ok(self.state.lock().indices.contains_key(index))
    }

    async fn refresh_index(&self, index: &str) -> Result<(), SearchError> {
        let mut state = self.state.lock();
        if !state.indices.contains_key(index) {
            return Err(SearchError::index_not_found(index));
        }
        state.refreshes.push(index.to_string());
        Ok(())
    }

    async fn get_settings(&self, index: &str) -> Result<Value, SearchError> {
        self.state
            .lock()
            .indices
            .get(index)
            .map(|state| state.settings.clone())
            .ok_or_else(|| SearchError::index_not_found(index))
    }

    async fn put_settings(&self, index: &str, settings: &Value) -> Result<(), SearchError> {
        let mut state = self.state.lock();
        let existing = state
            .indices
            .get_mut(index)
            .ok_or_else(|| SearchError::index_not_found(index))?;
        merge_json(&mut existing.settings, normalize_settings(settings.clone()));
        state
            .settings_writes
            .push((index.to_string(), settings.clone()));
        Ok(())
    }

    async fn list_indices(&self, pattern: &str) -> Result<Vec<String>, SearchError> {
        let state = self.state.lock();
        Ok(matching_indices(&state, &[pattern.to_string()]))
    }

    async fn health_check(&self) -> Result<bool, SearchError> {
        Ok(true)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::interfaces::refresh_interval_of;

    #[test]
    fn test_matches_pattern() {
        assert!(matches_pattern("posts", "posts"));
        assert!(matches_pattern("posts-*", "posts-2024-01"));
        assert!(matches_pattern("*-2024-*", "posts-2024-01"));
        assert!(matches_pattern("*", "anything"));
        assert!(!matches_pattern("posts-*", "comments-2024"));
        assert!(!matches_pattern("posts", "posts-2024"));
    }

    #[test]
    fn test_normalize_settings() {
        assert_eq!(
            normalize_settings(json!({ "number_of_shards": 1, "index.refresh_interval": "1s" })),
            json!({ "index": { "number_of_shards": 1, "refresh_interval": "1s" } })
        );
        assert_eq!(
            normalize_settings(json!({ "index": { "refresh_interval": "-1" } })),
            json!({ "index": { "refresh_interval": "-1" } })
        );
    }

    #[tokio::test]
    async fn test_bulk_with_injected_failures() {
        let backend = InMemoryBackend::new();
        backend.insert_index("posts", json!({}));
        backend.fail_documents_where(Arc::new(|body: &Value| {
            (body["title"] == "bad").then(|| json!({ "type": "mapper_parsing_exception" }))
        }));

        let operations = vec![
            BulkOperation::index(json!({ "title": "good" })).with_id("1"),
            BulkOperation::index(json!({ "title": "bad" })).with_id("2"),
            BulkOperation::index(json!({ "title": "auto id" })),
        ];
        let response = backend.bulk("posts", &operations, None).await.unwrap();

        assert!(response.errors);
        assert_eq!(response.error_items().len(), 1);
        assert_eq!(response.error_items()[0].id, Some("2".to_string()));
        assert_eq!(backend.documents("posts").len(), 2);
        assert_eq!(backend.bulk_calls().len(), 1);
    }

    #[tokio::test]
    async fn test_upsert_merges_existing_document() {
        let backend = InMemoryBackend::new();
        backend.insert_document("posts", "1", json!({ "title": "a", "views": 1 }));

        backend
            .bulk("posts", &[BulkOperation::upsert("1", json!({ "views": 2 }))], None)
            .await
            .unwrap();

        assert_eq!(
            backend.documents("posts")[0].1,
            json!({ "title": "a", "views": 2 })
        );
    }

    #[tokio::test]
    async fn test_index_lifecycle() {
        let backend = InMemoryBackend::new();
        let body = json!({ "settings": { "refresh_interval": "1s" }, "mappings": { "properties": {} } });

        backend.create_index("posts", &body).await.unwrap();
        assert!(backend.index_exists("posts").await.unwrap());
        assert!(backend.create_index("posts", &body).await.is_err());

        let settings = backend.get_settings("posts").await.unwrap();
        assert_eq!(refresh_interval_of(&settings), Some(json!("1s")));

        backend
            .put_settings("posts", &json!({ "index": { "refresh_interval": "-1" } }))
            .await
            .unwrap();
        let settings = backend.get_settings("posts").await.unwrap();
        assert_eq!(refresh_interval_of(&settings), Some(json!("-1")));
        assert_eq!(backend.settings_writes().len(), 1);

        assert!(backend.delete_index("posts").await.unwrap());
        assert!(!backend.delete_index("posts").await.unwrap());
        assert!(backend.get_settings("posts").await.unwrap_err().is_index_not_found());
    }

    #[tokio::test]
    async fn test_default_search_and_canned_response() {
        let backend = InMemoryBackend::new();
        for i in 0..3 {
            backend.insert_document("posts-2024", i.to_string(), json!({ "n": i }));
        }

        let request = SearchRequest::new(
            vec!["posts-*".to_string()],
            &search_sync_shared::SearchQuery::Payload(json!({ "size": 2 })),
        );
        let response = backend.search(&request).await.unwrap();
        assert_eq!(response["hits"]["total"]["value"], 3);
        assert_eq!(response["hits"]["hits"].as_array().unwrap().len(), 2);

        backend.push_search_response(json!({ "hits": { "total": 42, "hits": [] } }));
        let canned = backend.search(&request).await.unwrap();
        assert_eq!(canned["hits"]["total"], 42);
        assert_eq!(backend.searches().len(), 2);
    }

    #[tokio::test]
    async fn test_search_missing_index() {
        let backend = InMemoryBackend::new();
        let request = SearchRequest::new(
            vec!["missing".to_string()],
            &search_sync_shared::SearchQuery::match_all(),
        );
        assert!(backend.search(&request).await.unwrap_err().is_index_not_found());
    }
}
