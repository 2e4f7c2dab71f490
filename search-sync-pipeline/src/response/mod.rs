//! Search responses and record resolution.
//!
//! A [`SearchResponse`] is created without touching the backend. The first
//! accessor that needs the response executes the search; the response and
//! everything derived from it is cached on the instance unless the search
//! options turn caching off.

mod pagination;
mod records;

pub use pagination::{scroll_all, search_after_all, search_all, ScrollOptions};
pub use records::ResolvedRecords;

use std::sync::Arc;

use serde_json::Value;
use tokio::sync::Mutex;
use tracing::debug;

use crate::errors::PipelineError;
use crate::multi::MultiStrategy;
use crate::options::{RecordsOptions, SearchOptions, DEFAULT_PAGE_SIZE};
use crate::strategy::Strategy;
use search_sync_repository::{SearchBackend, SearchRequest};
use search_sync_shared::{Hit, HitsTotal, SearchQuery};

/// What a search runs against.
#[derive(Debug, Clone)]
pub enum SearchTarget {
    Strategy(Arc<Strategy>),
    Multi(Arc<MultiStrategy>),
}

impl SearchTarget {
    pub fn client(&self) -> &Arc<dyn SearchBackend> {
        match self {
            SearchTarget::Strategy(strategy) => strategy.client(),
            SearchTarget::Multi(multi) => multi.client(),
        }
    }

    /// Read indices, unless the options name their own.
    pub fn index_names(&self, options: &SearchOptions) -> Vec<String> {
        if let Some(index) = &options.index {
            return index.split(',').map(|i| i.trim().to_string()).collect();
        }
        match self {
            SearchTarget::Strategy(strategy) => strategy.config().search_index_names(),
            SearchTarget::Multi(multi) => multi.search_index_names(),
        }
    }

    /// Build the backend request for `query`.
    pub fn request(&self, query: &SearchQuery, options: &SearchOptions) -> SearchRequest {
        let request = SearchRequest::new(self.index_names(options), query);
        match (query.size(), options.size) {
            (None, Some(size)) => request.with_size(size),
            _ => request,
        }
    }
}

/// The hits of a raw search response.
pub(crate) fn hits_of(response: &Value) -> Vec<Hit> {
    response
        .pointer("/hits/hits")
        .and_then(Value::as_array)
        .map(|hits| hits.iter().filter_map(Hit::from_value).collect())
        .unwrap_or_default()
}

#[derive(Default)]
struct ResponseCache {
    response: Option<Arc<Value>>,
    results: Option<Arc<Vec<Hit>>>,
    records: Option<Arc<ResolvedRecords>>,
}

/// Lazily executed search.
pub struct SearchResponse {
    target: SearchTarget,
    query: SearchQuery,
    options: SearchOptions,
    cache: Mutex<ResponseCache>,
}

impl std::fmt::Debug for SearchResponse {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SearchResponse")
            .field("query", &self.query)
            .field("options", &self.options)
            .finish()
    }
}

impl SearchResponse {
    pub fn new(target: SearchTarget, query: SearchQuery, options: SearchOptions) -> Self {
        Self {
            target,
            query,
            options,
            cache: Mutex::new(ResponseCache::default()),
        }
    }

    pub fn target(&self) -> &SearchTarget {
        &self.target
    }

    pub fn query(&self) -> &SearchQuery {
        &self.query
    }

    pub fn options(&self) -> &SearchOptions {
        &self.options
    }

    /// The request this response sends.
    pub fn request(&self) -> SearchRequest {
        self.target.request(&self.query, &self.options)
    }

    /// The raw backend response.
    pub async fn response(&self) -> Result<Arc<Value>, PipelineError> {
        let mut cache = self.cache.lock().await;
        if let Some(response) = &cache.response {
            return Ok(response.clone());
        }

        let request = self.request();
        debug!(indices = %request.index_list(), "Executing search");
        let response = Arc::new(self.target.client().search(&request).await?);
        if self.options.use_cache {
            cache.response = Some(response.clone());
        }
        Ok(response)
    }

    /// Parsed hits, in rank order.
    pub async fn results(&self) -> Result<Arc<Vec<Hit>>, PipelineError> {
        if let Some(results) = &self.cache.lock().await.results {
            return Ok(results.clone());
        }
        let results = Arc::new(hits_of(&*self.response().await?));
        if self.options.use_cache {
            self.cache.lock().await.results = Some(results.clone());
        }
        Ok(results)
    }

    /// Hits exactly as returned by the backend.
    pub async fn raw_results(&self) -> Result<Vec<Value>, PipelineError> {
        Ok(self
            .response()
            .await?
            .pointer("/hits/hits")
            .and_then(Value::as_array)
            .cloned()
            .unwrap_or_default())
    }

    /// Total hit count, for both the scalar and the `{"value": n}` shape.
    pub async fn total(&self) -> Result<u64, PipelineError> {
        Ok(HitsTotal::from_response(&*self.response().await?)
            .map(|total| total.value())
            .unwrap_or_default())
    }

    /// Requested page size: the payload's `size`, else the option, else 10.
    pub fn page_size(&self) -> usize {
        self.query
            .size()
            .or(self.options.size)
            .unwrap_or(DEFAULT_PAGE_SIZE)
    }

    pub async fn total_pages(&self) -> Result<u64, PipelineError> {
        let page_size = self.page_size().max(1) as u64;
        Ok(self.total().await?.div_ceil(page_size))
    }

    /// Whether this page holds fewer hits than the page size.
    pub async fn incomplete_page(&self) -> Result<bool, PipelineError> {
        Ok(self.results().await?.len() < self.page_size())
    }

    pub async fn max_score(&self) -> Result<Option<f64>, PipelineError> {
        Ok(self
            .response()
            .await?
            .pointer("/hits/max_score")
            .and_then(Value::as_f64))
    }

    /// Backend-reported execution time in milliseconds.
    pub async fn took(&self) -> Result<Option<u64>, PipelineError> {
        Ok(self.response().await?.get("took").and_then(Value::as_u64))
    }

    pub async fn timed_out(&self) -> Result<bool, PipelineError> {
        Ok(self
            .response()
            .await?
            .get("timed_out")
            .and_then(Value::as_bool)
            .unwrap_or(false))
    }

    pub async fn shards(&self) -> Result<Option<Value>, PipelineError> {
        self.section("_shards").await
    }

    pub async fn aggregations(&self) -> Result<Option<Value>, PipelineError> {
        self.section("aggregations").await
    }

    pub async fn suggestions(&self) -> Result<Option<Value>, PipelineError> {
        self.section("suggest").await
    }

    pub async fn scroll_id(&self) -> Result<Option<String>, PipelineError> {
        Ok(self
            .response()
            .await?
            .get("_scroll_id")
            .and_then(Value::as_str)
            .map(String::from))
    }

    /// Domain records behind the hits, in hit order. Hits whose record no
    /// longer exists are dropped.
    ///
    /// The first resolution is cached; later calls return it regardless of
    /// `options` until [`SearchResponse::clear_cache`].
    pub async fn records(
        &self,
        options: RecordsOptions,
    ) -> Result<Arc<ResolvedRecords>, PipelineError> {
        if let Some(records) = &self.cache.lock().await.records {
            return Ok(records.clone());
        }
        let hits = self.results().await?;
        let records = Arc::new(records::resolve(&self.target, &hits, &options).await?);
        if self.options.use_cache {
            self.cache.lock().await.records = Some(records.clone());
        }
        Ok(records)
    }

    /// Forget everything cached; the next accessor searches again.
    pub async fn clear_cache(&self) {
        *self.cache.lock().await = ResponseCache::default();
    }

    async fn section(&self, key: &str) -> Result<Option<Value>, PipelineError> {
        Ok(self.response().await?.get(key).cloned())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_support::{article, article_strategy};
    use search_sync_repository::InMemoryBackend;
    use serde_json::json;

    fn canned(total: Value) -> Value {
        json!({
            "took": 3,
            "timed_out": false,
            "_shards": { "total": 2, "successful": 2, "failed": 0 },
            "hits": {
                "total": total,
                "max_score": 1.5,
                "hits": [
                    { "_index": "articles", "_id": "00001", "_score": 1.5, "_source": { "id": "00001", "title": "a" } },
                    { "_index": "articles", "_id": "00002", "_score": 1.1, "_source": { "id": "00002", "title": "b" } }
                ]
            },
            "aggregations": { "titles": { "buckets": [] } },
            "suggest": { "title": [] }
        })
    }

    #[tokio::test]
    async fn test_total_normalizes_both_shapes() {
        let backend = Arc::new(InMemoryBackend::new());
        backend.push_search_response(canned(json!({ "value": 42, "relation": "eq" })));
        backend.push_search_response(canned(json!(42)));
        let strategy = article_strategy(backend, Vec::new());

        let object_form = strategy.search(SearchQuery::match_all(), SearchOptions::default());
        let scalar_form = strategy.search(SearchQuery::match_all(), SearchOptions::default());

        assert_eq!(object_form.total().await.unwrap(), 42);
        assert_eq!(scalar_form.total().await.unwrap(), 42);
    }

    #[tokio::test]
    async fn test_accessors_read_one_cached_response() {
        let backend = Arc::new(InMemoryBackend::new());
        backend.push_search_response(canned(json!({ "value": 42 })));
        let strategy = article_strategy(backend.clone(), Vec::new());
        let response = strategy.search(SearchQuery::match_all(), SearchOptions::default());

        assert!(backend.searches().is_empty());
        assert_eq!(response.results().await.unwrap().len(), 2);
        assert_eq!(response.raw_results().await.unwrap()[1]["_id"], "00002");
        assert_eq!(response.took().await.unwrap(), Some(3));
        assert!(!response.timed_out().await.unwrap());
        assert_eq!(response.max_score().await.unwrap(), Some(1.5));
        assert_eq!(response.shards().await.unwrap().unwrap()["total"], 2);
        assert!(response.aggregations().await.unwrap().is_some());
        assert!(response.suggestions().await.unwrap().is_some());
        assert_eq!(response.scroll_id().await.unwrap(), None);
        assert_eq!(response.total_pages().await.unwrap(), 5);
        assert!(response.incomplete_page().await.unwrap());
        assert_eq!(backend.searches().len(), 1);

        response.clear_cache().await;
        response.total().await.unwrap();
        assert_eq!(backend.searches().len(), 2);
    }

    #[tokio::test]
    async fn test_no_cache_searches_every_time() {
        let backend = Arc::new(InMemoryBackend::new());
        backend.insert_index("articles", json!({}));
        let strategy = article_strategy(backend.clone(), Vec::new());
        let response = strategy.search(
            SearchQuery::match_all(),
            SearchOptions::default().with_use_cache(false),
        );

        response.total().await.unwrap();
        response.total().await.unwrap();
        assert_eq!(backend.searches().len(), 2);
    }

    #[tokio::test]
    async fn test_request_building() {
        let backend = Arc::new(InMemoryBackend::new());
        let strategy = article_strategy(backend, Vec::new());

        let text = strategy.search(
            "title:hello".parse::<SearchQuery>().unwrap(),
            SearchOptions::default().with_size(25),
        );
        let request = text.request();
        assert_eq!(request.q.as_deref(), Some("title:hello"));
        assert_eq!(request.size, Some(25));
        assert_eq!(request.indices, vec!["articles"]);
        assert_eq!(text.page_size(), 25);

        let payload = strategy.search(
            json!({ "query": { "match_all": {} }, "size": 5 }),
            SearchOptions::default().with_size(25).with_index("articles-2024,articles-2025"),
        );
        let request = payload.request();
        assert!(request.body.is_some());
        assert_eq!(request.size, None);
        assert_eq!(request.indices, vec!["articles-2024", "articles-2025"]);
        assert_eq!(payload.page_size(), 5);
    }

    #[tokio::test]
    async fn test_records_follow_hit_order() {
        let backend = Arc::new(InMemoryBackend::new());
        backend.push_search_response(json!({
            "hits": { "total": 2, "hits": [
                { "_index": "articles", "_id": "00002", "_source": { "id": "00002" } },
                { "_index": "articles", "_id": "00001", "_source": { "id": "00001" } }
            ] }
        }));
        let strategy = article_strategy(backend, vec![article(1, "one"), article(2, "two")]);
        let response = strategy.search(SearchQuery::match_all(), SearchOptions::default());

        let records = response.records(RecordsOptions::default()).await.unwrap();
        assert_eq!(records.ids(), vec!["00002", "00001"]);
    }
}
