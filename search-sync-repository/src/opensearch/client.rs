//! OpenSearch client implementation.
//!
//! This module provides the concrete implementation of `SearchBackend`
//! using the OpenSearch Rust client.

use async_trait::async_trait;
use opensearch::{
    cat::CatIndicesParts,
    cluster::ClusterHealthParts,
    http::{
        request::JsonBody,
        response::Response,
        transport::{SingleNodeConnectionPool, TransportBuilder},
    },
    indices::{
        IndicesCreateParts, IndicesDeleteParts, IndicesExistsParts, IndicesGetSettingsParts,
        IndicesPutSettingsParts, IndicesRefreshParts,
    },
    BulkParts, ClearScrollParts, CountParts, DeleteParts, IndexParts, OpenSearch, ScrollParts,
    SearchParts,
};
use serde_json::{json, Value};
use tracing::{debug, error, info, instrument, warn};
use url::Url;

use crate::config::OpenSearchConfig;
use crate::errors::SearchError;
use crate::interfaces::SearchBackend;
use crate::types::{BulkOperation, BulkResponse, SearchRequest};

/// OpenSearch client implementation.
///
/// One instance wraps one connection pool and is meant to be shared behind an
/// `Arc<dyn SearchBackend>` by every strategy that targets the same cluster.
///
/// # Example
///
/// ```ignore
/// use search_sync_repository::{OpenSearchClient, OpenSearchConfig};
///
/// let client = OpenSearchClient::new(&OpenSearchConfig::new("http://localhost:9200"))?;
/// assert!(client.health_check().await?);
/// ```
pub struct OpenSearchClient {
    client: OpenSearch,
    url: String,
}

impl OpenSearchClient {
    /// Create a new OpenSearch client for the configured URL.
    ///
    /// # Returns
    ///
    /// * `Ok(OpenSearchClient)` - A new client instance
    /// * `Err(SearchError)` - If the URL is invalid or the transport cannot be built
    pub fn new(config: &OpenSearchConfig) -> Result<Self, SearchError> {
        let parsed_url =
            Url::parse(&config.url).map_err(|e| SearchError::connection(e.to_string()))?;

        let conn_pool = SingleNodeConnectionPool::new(parsed_url);
        let transport = TransportBuilder::new(conn_pool)
            .disable_proxy()
            .timeout(config.request_timeout())
            .build()
            .map_err(|e| SearchError::connection(e.to_string()))?;

        info!(
            url = %config.url,
            timeout_ms = config.request_timeout_ms,
            "Created OpenSearch client"
        );

        Ok(Self {
            client: OpenSearch::new(transport),
            url: config.url.clone(),
        })
    }

    /// The URL this client was built for.
    pub fn url(&self) -> &str {
        &self.url
    }

    /// Build the newline-delimited bulk body: one action line followed by one
    /// source line per operation.
    fn bulk_body(operations: &[BulkOperation]) -> Result<Vec<JsonBody<Value>>, SearchError> {
        let mut body = Vec::with_capacity(operations.len() * 2);
        for operation in operations {
            operation.validate()?;
            body.push(JsonBody::new(operation.action_line()));
            body.push(JsonBody::new(operation.body_line()));
        }
        Ok(body)
    }
}

/// Turn a non-success response into an error built by `make_error`.
async fn ensure_success(
    response: Response,
    operation: &str,
    make_error: fn(String) -> SearchError,
) -> Result<Response, SearchError> {
    let status = response.status_code();
    if status.is_success() {
        return Ok(response);
    }

    let error_body = response.text().await.unwrap_or_default();
    error!(status = %status, body = %error_body, operation, "OpenSearch request failed");
    Err(make_error(format!(
        "{} failed with status {}: {}",
        operation, status, error_body
    )))
}

async fn read_json(response: Response) -> Result<Value, SearchError> {
    response
        .json::<Value>()
        .await
        .map_err(|e| SearchError::parse(e.to_string()))
}

#[async_trait]
impl SearchBackend for OpenSearchClient {
    #[instrument(skip(self, operations), fields(operations = operations.len()))]
    async fn bulk(
        &self,
        index: &str,
        operations: &[BulkOperation],
        pipeline: Option<&str>,
    ) -> Result<BulkResponse, SearchError> {
        if operations.is_empty() {
            return Ok(BulkResponse {
                took: 0,
                errors: false,
                items: Vec::new(),
            });
        }

        let body = Self::bulk_body(operations)?;
        let mut bulk = self.client.bulk(BulkParts::Index(index)).body(body);
        if let Some(pipeline) = pipeline {
            bulk = bulk.pipeline(pipeline);
        }
        let response = bulk
            .send()
            .await
            .map_err(|e| SearchError::bulk_index(e.to_string()))?;

        let response = ensure_success(response, "Bulk", SearchError::BulkIndexError).await?;
        let parsed = BulkResponse::from_value(&read_json(response).await?)?;

        debug!(
            took = parsed.took,
            errors = parsed.errors,
            items = parsed.items.len(),
            "Bulk request completed"
        );
        Ok(parsed)
    }

    async fn index_document(
        &self,
        index: &str,
        id: Option<&str>,
        body: &Value,
    ) -> Result<(), SearchError> {
        let parts = match id {
            Some(id) => IndexParts::IndexId(index, id),
            None => IndexParts::Index(index),
        };
        let response = self
            .client
            .index(parts)
            .body(body.clone())
            .send()
            .await
            .map_err(|e| SearchError::index(e.to_string()))?;

        ensure_success(response, "Index document", SearchError::IndexError).await?;
        debug!(index, id = ?id, "Document indexed");
        Ok(())
    }

    async fn delete_document(&self, index: &str, id: &str) -> Result<(), SearchError> {
        let response = self
            .client
            .delete(DeleteParts::IndexId(index, id))
            .send()
            .await
            .map_err(|e| SearchError::index(e.to_string()))?;

        // 404 is acceptable - document may not exist
        if response.status_code().as_u16() == 404 {
            debug!(index, id, "Document to delete not found");
            return Ok(());
        }

        ensure_success(response, "Delete document", SearchError::IndexError).await?;
        debug!(index, id, "Document deleted");
        Ok(())
    }

    #[instrument(skip(self, request), fields(indices = %request.index_list()))]
    async fn search(&self, request: &SearchRequest) -> Result<Value, SearchError> {
        request.validate()?;
        let indices: Vec<&str> = request.indices.iter().map(String::as_str).collect();
        let body = request.body.clone().unwrap_or_else(|| json!({}));

        let mut search = self
            .client
            .search(SearchParts::Index(&indices))
            .body(body);
        if let Some(q) = request.q.as_deref() {
            search = search.q(q);
        }
        if let Some(size) = request.size {
            search = search.size(size as i64);
        }
        if let Some(scroll) = request.scroll.as_deref() {
            search = search.scroll(scroll);
        }

        let response = search
            .send()
            .await
            .map_err(|e| SearchError::query(e.to_string()))?;

        if response.status_code().as_u16() == 404 {
            return Err(SearchError::index_not_found(request.index_list()));
        }
        let response = ensure_success(response, "Search", SearchError::QueryError).await?;
        read_json(response).await
    }

    async fn scroll(&self, scroll_id: &str, keep_alive: &str) -> Result<Value, SearchError> {
        let response = self
            .client
            .scroll(ScrollParts::None)
            .body(json!({ "scroll": keep_alive, "scroll_id": scroll_id }))
            .send()
            .await
            .map_err(|e| SearchError::query(e.to_string()))?;

        if response.status_code().as_u16() == 404 {
            return Err(SearchError::not_found(format!("scroll context {}", scroll_id)));
        }
        let response = ensure_success(response, "Scroll", SearchError::QueryError).await?;
        read_json(response).await
    }

    async fn clear_scroll(&self, scroll_id: &str) -> Result<(), SearchError> {
        let response = self
            .client
            .clear_scroll(ClearScrollParts::None)
            .body(json!({ "scroll_id": [scroll_id] }))
            .send()
            .await
            .map_err(|e| SearchError::query(e.to_string()))?;

        // An already expired context is not worth failing for.
        if response.status_code().as_u16() == 404 {
            warn!("Scroll context already released");
            return Ok(());
        }
        ensure_success(response, "Clear scroll", SearchError::QueryError).await?;
        Ok(())
    }

    async fn count(&self, index: &str, query: &Value) -> Result<u64, SearchError> {
        let response = self
            .client
            .count(CountParts::Index(&[index]))
            .body(query.clone())
            .send()
            .await
            .map_err(|e| SearchError::query(e.to_string()))?;

        if response.status_code().as_u16() == 404 {
            return Err(SearchError::index_not_found(index));
        }
        let response = ensure_success(response, "Count", SearchError::QueryError).await?;
        let body = read_json(response).await?;
        body.get("count")
            .and_then(Value::as_u64)
            .ok_or_else(|| SearchError::parse("count response has no count field"))
    }

    #[instrument(skip(self, body))]
    async fn create_index(&self, index: &str, body: &Value) -> Result<(), SearchError> {
        let response = self
            .client
            .indices()
            .create(IndicesCreateParts::Index(index))
            .body(body.clone())
            .send()
            .await
            .map_err(|e| SearchError::index_creation(e.to_string()))?;

        ensure_success(response, "Create index", SearchError::IndexCreationError).await?;
        info!(index, "Created index");
        Ok(())
    }

    #[instrument(skip(self))]
    async fn delete_index(&self, index: &str) -> Result<bool, SearchError> {
        let response = self
            .client
            .indices()
            .delete(IndicesDeleteParts::Index(&[index]))
            .send()
            .await
            .map_err(|e| SearchError::index_admin(e.to_string()))?;

        if response.status_code().as_u16() == 404 {
            return Ok(false);
        }
        ensure_success(response, "Delete index", SearchError::IndexAdminError).await?;
        info!(index, "Deleted index");
        Ok(true)
    }

    async fn index_exists(&self, index: &str) -> Result<bool, SearchError> {
        let response = self
            .client
            .indices()
            .exists(IndicesExistsParts::Index(&[index]))
            .send()
            .await
            .map_err(|e| SearchError::index_admin(e.to_string()))?;

        match response.status_code().as_u16() {
            200 => Ok(true),
            404 => Ok(false),
            status => Err(SearchError::index_admin(format!(
                "Index exists check failed with status {}",
                status
            ))),
        }
    }

    async fn refresh_index(&self, index: &str) -> Result<(), SearchError> {
        let response = self
            .client
            .indices()
            .refresh(IndicesRefreshParts::Index(&[index]))
            .send()
            .await
            .map_err(|e| SearchError::index_admin(e.to_string()))?;

        if response.status_code().as_u16() == 404 {
            return Err(SearchError::index_not_found(index));
        }
        ensure_success(response, "Refresh index", SearchError::IndexAdminError).await?;
        debug!(index, "Refreshed index");
        Ok(())
    }

    async fn get_settings(&self, index: &str) -> Result<Value, SearchError> {
        let response = self
            .client
            .indices()
            .get_settings(IndicesGetSettingsParts::Index(&[index]))
            .send()
            .await
            .map_err(|e| SearchError::index_admin(e.to_string()))?;

        if response.status_code().as_u16() == 404 {
            return Err(SearchError::index_not_found(index));
        }
        let response =
            ensure_success(response, "Get settings", SearchError::IndexAdminError).await?;
        let body = read_json(response).await?;

        // Keyed by the concrete index name, which may differ from an alias.
        body.get(index)
            .or_else(|| body.as_object().and_then(|map| map.values().next()))
            .and_then(|entry| entry.get("settings"))
            .cloned()
            .ok_or_else(|| SearchError::parse(format!("no settings returned for '{}'", index)))
    }

    async fn put_settings(&self, index: &str, settings: &Value) -> Result<(), SearchError> {
        let response = self
            .client
            .indices()
            .put_settings(IndicesPutSettingsParts::Index(&[index]))
            .body(settings.clone())
            .send()
            .await
            .map_err(|e| SearchError::index_admin(e.to_string()))?;

        if response.status_code().as_u16() == 404 {
            return Err(SearchError::index_not_found(index));
        }
        ensure_success(response, "Put settings", SearchError::IndexAdminError).await?;
        debug!(index, settings = %settings, "Updated index settings");
        Ok(())
    }

    async fn list_indices(&self, pattern: &str) -> Result<Vec<String>, SearchError> {
        let response = self
            .client
            .cat()
            .indices(CatIndicesParts::Index(&[pattern]))
            .h(&["index"])
            .format("json")
            .send()
            .await
            .map_err(|e| SearchError::index_admin(e.to_string()))?;

        if response.status_code().as_u16() == 404 {
            return Ok(Vec::new());
        }
        let response =
            ensure_success(response, "List indices", SearchError::IndexAdminError).await?;
        let body = read_json(response).await?;

        let mut names: Vec<String> = body
            .as_array()
            .map(|rows| {
                rows.iter()
                    .filter_map(|row| row.get("index").and_then(Value::as_str))
                    .map(String::from)
                    .collect()
            })
            .unwrap_or_default();
        names.sort();
        Ok(names)
    }

    async fn health_check(&self) -> Result<bool, SearchError> {
        let response = self
            .client
            .cluster()
            .health(ClusterHealthParts::None)
            .send()
            .await
            .map_err(|e| SearchError::connection(e.to_string()))?;

        if !response.status_code().is_success() {
            return Ok(false);
        }

        let body = read_json(response).await?;
        let status = body.get("status").and_then(Value::as_str).unwrap_or("red");
        debug!(status, "Cluster health");
        Ok(status != "red")
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::BulkOperation;

    #[test]
    fn test_new_rejects_invalid_url() {
        let result = OpenSearchClient::new(&OpenSearchConfig::new("not a url"));
        assert!(matches!(result, Err(SearchError::ConnectionError(_))));
    }

    #[test]
    fn test_new_keeps_url() {
        let client = OpenSearchClient::new(&OpenSearchConfig::new("http://localhost:9200")).unwrap();
        assert_eq!(client.url(), "http://localhost:9200");
    }

    #[test]
    fn test_bulk_body_pairs_lines() {
        let operations = vec![
            BulkOperation::index(json!({ "title": "a" })).with_id("1"),
            BulkOperation::upsert("2", json!({ "title": "b" })),
        ];

        let body = OpenSearchClient::bulk_body(&operations).unwrap();
        assert_eq!(body.len(), 4);
    }

    #[test]
    fn test_bulk_body_rejects_invalid_operation() {
        let operations = vec![BulkOperation::index(Value::Null)];
        assert!(OpenSearchClient::bulk_body(&operations).is_err());
    }
}
