//! Cross-entity search over several strategies.

use std::sync::Arc;

use crate::errors::PipelineError;
use crate::options::SearchOptions;
use crate::response::{SearchResponse, SearchTarget};
use crate::strategy::Strategy;
use search_sync_repository::{same_client, SearchBackend};
use search_sync_shared::SearchQuery;

/// Several strategies presented as one search target.
///
/// Every member must share one client handle; searching across clusters is
/// not supported.
pub struct MultiStrategy {
    strategies: Vec<Arc<Strategy>>,
    client: Arc<dyn SearchBackend>,
}

impl std::fmt::Debug for MultiStrategy {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MultiStrategy")
            .field("entity_types", &self.entity_types())
            .field("search_index_names", &self.search_index_names())
            .finish()
    }
}

impl MultiStrategy {
    pub fn new(strategies: Vec<Arc<Strategy>>) -> Result<Self, PipelineError> {
        let first = strategies
            .first()
            .ok_or_else(|| PipelineError::config("a multi-strategy needs at least one strategy"))?;
        let client = first.client().clone();

        if let Some(other) = strategies.iter().find(|s| !same_client(s.client(), &client)) {
            return Err(PipelineError::config(format!(
                "strategy '{}' of '{}' uses a different client than '{}' of '{}'",
                other.name(),
                other.entity_type(),
                first.name(),
                first.entity_type()
            )));
        }

        Ok(Self { strategies, client })
    }

    /// Union of the members' read indices, in member order.
    pub fn search_index_names(&self) -> Vec<String> {
        let mut names = Vec::new();
        for strategy in &self.strategies {
            for name in strategy.config().search_index_names() {
                if !names.contains(&name) {
                    names.push(name);
                }
            }
        }
        names
    }

    pub fn client(&self) -> &Arc<dyn SearchBackend> {
        &self.client
    }

    pub fn entity_types(&self) -> Vec<String> {
        let mut types: Vec<String> = Vec::new();
        for strategy in &self.strategies {
            if !types.iter().any(|t| t == strategy.entity_type()) {
                types.push(strategy.entity_type().to_string());
            }
        }
        types
    }

    pub fn strategies(&self) -> &[Arc<Strategy>] {
        &self.strategies
    }

    /// The first member strategy for an entity type.
    pub fn strategy_for_type(&self, entity_type: &str) -> Option<&Arc<Strategy>> {
        self.strategies
            .iter()
            .find(|strategy| strategy.entity_type() == entity_type)
    }

    pub fn search(self: &Arc<Self>, query: impl Into<SearchQuery>, options: SearchOptions) -> SearchResponse {
        SearchResponse::new(SearchTarget::Multi(self.clone()), query.into(), options)
    }
}

/// Search several strategies at once.
pub fn search(
    query: impl Into<SearchQuery>,
    strategies: Vec<Arc<Strategy>>,
    options: SearchOptions,
) -> Result<SearchResponse, PipelineError> {
    Ok(Arc::new(MultiStrategy::new(strategies)?).search(query, options))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::options::RecordsOptions;
    use crate::test_support::{article, article_store, comment, comment_store, strategy_over};
    use search_sync_repository::InMemoryBackend;
    use serde_json::json;

    #[test]
    fn test_client_mismatch_is_config_error() {
        let a = strategy_over(Arc::new(InMemoryBackend::new()), article_store(vec![]), "default");
        let b = strategy_over(Arc::new(InMemoryBackend::new()), comment_store(vec![]), "default");

        let result = MultiStrategy::new(vec![a, b]);
        assert!(matches!(result, Err(PipelineError::ConfigError(_))));
        assert!(matches!(MultiStrategy::new(Vec::new()), Err(PipelineError::ConfigError(_))));
    }

    #[test]
    fn test_mismatch_fails_before_any_search() {
        let a_backend = Arc::new(InMemoryBackend::new());
        let b_backend = Arc::new(InMemoryBackend::new());
        let a = strategy_over(a_backend.clone(), article_store(vec![]), "default");
        let b = strategy_over(b_backend.clone(), comment_store(vec![]), "default");

        assert!(search(SearchQuery::match_all(), vec![a, b], SearchOptions::default()).is_err());
        assert!(a_backend.searches().is_empty());
        assert!(b_backend.searches().is_empty());
    }

    #[test]
    fn test_aggregate_names_and_types() {
        let backend: Arc<dyn SearchBackend> = Arc::new(InMemoryBackend::new());
        let articles = strategy_over(backend.clone(), article_store(vec![]), "default");
        let archive = strategy_over(backend.clone(), article_store(vec![]), "archive");
        archive.configure(|config| {
            config.set_search_index_names(|| vec!["articles".to_string(), "articles-archive".to_string()]);
        });
        let comments = strategy_over(backend, comment_store(vec![]), "default");

        let multi = MultiStrategy::new(vec![articles, archive, comments]).unwrap();
        assert_eq!(
            multi.search_index_names(),
            vec!["articles", "articles-archive", "comments"]
        );
        assert_eq!(multi.entity_types(), vec!["Article", "Comment"]);
        assert_eq!(multi.strategy_for_type("Comment").unwrap().entity_type(), "Comment");
        assert!(multi.strategy_for_type("Page").is_none());
    }

    #[tokio::test]
    async fn test_search_resolves_mixed_records() {
        let backend = Arc::new(InMemoryBackend::new());
        backend.push_search_response(json!({
            "hits": { "total": { "value": 2 }, "hits": [
                { "_index": "comments", "_id": "00001", "_source": { "id": "00001", "type": "Comment" } },
                { "_index": "articles", "_id": "00001", "_source": { "id": "00001", "type": "Article" } }
            ] }
        }));
        let strategies = vec![
            strategy_over(backend.clone(), article_store(vec![article(1, "a")]), "default"),
            strategy_over(backend.clone(), comment_store(vec![comment(1, "c")]), "default"),
        ];

        let response = search(SearchQuery::match_all(), strategies, SearchOptions::default()).unwrap();
        assert_eq!(response.request().indices, vec!["articles", "comments"]);

        let records = response.records(RecordsOptions::default()).await.unwrap();
        assert_eq!(records.len(), 2);
        let documents: Vec<_> = records
            .records()
            .iter()
            .map(|record| record.document().unwrap()["type"].clone())
            .collect();
        assert_eq!(documents, vec![json!("Comment"), json!("Article")]);
        assert_eq!(response.total().await.unwrap(), 2);
        assert_eq!(backend.searches().len(), 1);
    }
}
