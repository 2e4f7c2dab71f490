//! Search backend trait definition.
//!
//! This module defines the abstract interface for search backend operations,
//! allowing for different backend implementations (OpenSearch, in-memory, etc.).

use std::sync::Arc;

use async_trait::async_trait;
use serde_json::Value;

use crate::errors::SearchError;
use crate::types::{BulkOperation, BulkResponse, SearchRequest};

/// Abstract interface for search backend operations.
///
/// This trait defines every call the sync engine makes against a search
/// backend: bulk writes, single-document writes, queries, counts and index
/// administration. Implementations can be swapped for different backends
/// (OpenSearch, in-memory, etc.) enabling easy testing.
///
/// # Thread Safety
///
/// All implementations must be `Send + Sync` to allow use across async tasks.
/// One client handle is shared by every strategy that talks to the same
/// cluster.
///
/// # Error Handling
///
/// All methods return `Result<T, SearchError>`. Document-level failures inside
/// a bulk write are reported in the [`BulkResponse`], not as an `Err`.
#[async_trait]
pub trait SearchBackend: Send + Sync {
    /// Write many documents in a single call.
    ///
    /// # Arguments
    ///
    /// * `index` - Default index for operations that do not name one
    /// * `operations` - Document-level instructions, in order
    /// * `pipeline` - Ingest pipeline applied to every document, if any
    ///
    /// # Returns
    ///
    /// * `Ok(BulkResponse)` - Per-item outcomes plus backend timing
    /// * `Err(SearchError)` - If the call itself failed
    async fn bulk(
        &self,
        index: &str,
        operations: &[BulkOperation],
        pipeline: Option<&str>,
    ) -> Result<BulkResponse, SearchError>;

    /// Index a single document, replacing any document with the same id.
    ///
    /// When `id` is `None` the backend generates one.
    async fn index_document(
        &self,
        index: &str,
        id: Option<&str>,
        body: &Value,
    ) -> Result<(), SearchError>;

    /// Delete a single document. A missing document is not an error.
    async fn delete_document(&self, index: &str, id: &str) -> Result<(), SearchError>;

    /// Execute a search and return the raw response body.
    ///
    /// # Example
    ///
    /// ```ignore
    /// let request = SearchRequest::new(vec!["articles".into()], &SearchQuery::match_all());
    /// let body = backend.search(&request).await?;
    /// println!("took {}ms", body["took"]);
    /// ```
    async fn search(&self, request: &SearchRequest) -> Result<Value, SearchError>;

    /// Fetch the next page of an open scroll context.
    async fn scroll(&self, scroll_id: &str, keep_alive: &str) -> Result<Value, SearchError>;

    /// Release a scroll context.
    async fn clear_scroll(&self, scroll_id: &str) -> Result<(), SearchError>;

    /// Count documents in `index` matching `query` (a body with a `query` key).
    async fn count(&self, index: &str, query: &Value) -> Result<u64, SearchError>;

    /// Create an index with the given `{settings, mappings}` body.
    async fn create_index(&self, index: &str, body: &Value) -> Result<(), SearchError>;

    /// Delete an index.
    ///
    /// # Returns
    ///
    /// * `Ok(true)` - If the index was deleted
    /// * `Ok(false)` - If the index did not exist
    /// * `Err(SearchError)` - If the deletion fails
    async fn delete_index(&self, index: &str) -> Result<bool, SearchError>;

    /// Check if an index exists.
    async fn index_exists(&self, index: &str) -> Result<bool, SearchError>;

    /// Make recent writes visible to search.
    async fn refresh_index(&self, index: &str) -> Result<(), SearchError>;

    /// Read the settings of one index, as the `settings` object of the
    /// backend response (`{"index": {...}}`).
    ///
    /// Fails with [`SearchError::IndexNotFound`] when the index is missing.
    async fn get_settings(&self, index: &str) -> Result<Value, SearchError>;

    /// Update dynamic settings of one index.
    async fn put_settings(&self, index: &str, settings: &Value) -> Result<(), SearchError>;

    /// List index names matching a pattern.
    async fn list_indices(&self, pattern: &str) -> Result<Vec<String>, SearchError>;

    /// Check if the search engine is healthy and reachable.
    ///
    /// # Returns
    ///
    /// * `Ok(true)` - If the search engine is healthy
    /// * `Ok(false)` - If the search engine is unhealthy
    /// * `Err(SearchError)` - If the health check fails to execute
    async fn health_check(&self) -> Result<bool, SearchError>;
}

/// Check if two handles point at the same client instance.
pub fn same_client(a: &Arc<dyn SearchBackend>, b: &Arc<dyn SearchBackend>) -> bool {
    std::ptr::eq(
        Arc::as_ptr(a) as *const (),
        Arc::as_ptr(b) as *const (),
    )
}

/// Read `index.refresh_interval` out of a settings object.
pub fn refresh_interval_of(settings: &Value) -> Option<Value> {
    settings
        .get("index")
        .and_then(|index| index.get("refresh_interval"))
        .filter(|value| !value.is_null())
        .cloned()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::memory::InMemoryBackend;
    use serde_json::json;

    #[test]
    fn test_same_client() {
        let a: Arc<dyn SearchBackend> = Arc::new(InMemoryBackend::new());
        let b: Arc<dyn SearchBackend> = Arc::new(InMemoryBackend::new());
        let a2 = a.clone();

        assert!(same_client(&a, &a2));
        assert!(!same_client(&a, &b));
    }

    #[test]
    fn test_refresh_interval_of() {
        assert_eq!(
            refresh_interval_of(&json!({ "index": { "refresh_interval": "30s" } })),
            Some(json!("30s"))
        );
        assert_eq!(refresh_interval_of(&json!({ "index": {} })), None);
        assert_eq!(
            refresh_interval_of(&json!({ "index": { "refresh_interval": null } })),
            None
        );
    }
}
