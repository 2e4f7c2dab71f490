//! Deep pagination over every page of a query.

use tracing::{debug, warn};

use super::{hits_of, SearchResponse, SearchTarget};
use crate::errors::PipelineError;
use crate::options::SearchOptions;
use search_sync_shared::{Hit, SearchQuery};

pub const DEFAULT_SCROLL_KEEP_ALIVE: &str = "30s";

/// Scroll context settings for [`scroll_all`].
#[derive(Debug, Clone)]
pub struct ScrollOptions {
    pub keep_alive: String,
    /// Release the scroll context when done.
    pub clear: bool,
}

impl Default for ScrollOptions {
    fn default() -> Self {
        Self {
            keep_alive: DEFAULT_SCROLL_KEEP_ALIVE.to_string(),
            clear: true,
        }
    }
}

/// Walk every page of a sorted query with `search_after`.
///
/// `on_page` returns `false` to stop. Iteration also stops on an empty or
/// incomplete page and after `limit` pages. Returns the number of pages seen.
pub async fn search_after_all<F>(
    target: SearchTarget,
    query: SearchQuery,
    options: SearchOptions,
    limit: Option<usize>,
    mut on_page: F,
) -> Result<usize, PipelineError>
where
    F: FnMut(&[Hit]) -> bool,
{
    if !query.has_sort() {
        return Err(PipelineError::config(
            "search_after pagination needs a sort in the query payload",
        ));
    }

    let mut query = query;
    let mut pages = 0;
    while limit.map_or(true, |limit| pages < limit) {
        let response = SearchResponse::new(target.clone(), query.clone(), options.clone());
        let hits = response.results().await?;
        if hits.is_empty() {
            break;
        }
        pages += 1;
        debug!(page = pages, hits = hits.len(), "search_after page");

        if !on_page(&hits) || hits.len() < response.page_size() {
            break;
        }
        let Some(sort) = hits.last().and_then(|hit| hit.sort.clone()) else {
            warn!("Last hit carries no sort values; stopping pagination");
            break;
        };
        query = query.with_search_after(sort);
    }
    Ok(pages)
}

/// Walk every page of a query through a scroll context.
///
/// Stops like [`search_after_all`]. The scroll context is cleared at the end
/// unless `scroll.clear` is off.
pub async fn scroll_all<F>(
    target: SearchTarget,
    query: SearchQuery,
    options: SearchOptions,
    scroll: ScrollOptions,
    limit: Option<usize>,
    mut on_page: F,
) -> Result<usize, PipelineError>
where
    F: FnMut(&[Hit]) -> bool,
{
    let client = target.client().clone();
    let page_size = query.size().or(options.size).unwrap_or(crate::options::DEFAULT_PAGE_SIZE);
    let request = target
        .request(&query, &options)
        .with_scroll(scroll.keep_alive.as_str());

    let mut body = client.search(&request).await?;
    let mut scroll_id: Option<String> = None;
    let mut pages = 0;

    let outcome: Result<(), PipelineError> = async {
        loop {
            if let Some(id) = body.get("_scroll_id").and_then(|id| id.as_str()) {
                scroll_id = Some(id.to_string());
            }
            let hits = hits_of(&body);
            if hits.is_empty() {
                break;
            }
            pages += 1;
            debug!(page = pages, hits = hits.len(), "scroll page");

            if !on_page(&hits) || hits.len() < page_size || limit.map_or(false, |l| pages >= l) {
                break;
            }
            let Some(id) = scroll_id.as_deref() else {
                break;
            };
            body = client.scroll(id, &scroll.keep_alive).await?;
        }
        Ok(())
    }
    .await;

    if scroll.clear {
        if let Some(id) = &scroll_id {
            if let Err(e) = client.clear_scroll(id).await {
                warn!(scroll_id = %id, error = %e, "Failed to clear scroll context");
            }
        }
    }
    outcome.map(|()| pages)
}

/// Walk every page of a query: with `search_after` when the payload is
/// sorted, through a scroll context otherwise.
pub async fn search_all<F>(
    target: SearchTarget,
    query: SearchQuery,
    options: SearchOptions,
    scroll: ScrollOptions,
    limit: Option<usize>,
    on_page: F,
) -> Result<usize, PipelineError>
where
    F: FnMut(&[Hit]) -> bool,
{
    if query.has_sort() {
        search_after_all(target, query, options, limit, on_page).await
    } else {
        scroll_all(target, query, options, scroll, limit, on_page).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_support::article_strategy;
    use search_sync_repository::{InMemoryBackend, SearchError};
    use serde_json::{json, Value};
    use std::sync::Arc;

    fn page(ids: &[u64], scroll_id: Option<&str>) -> Value {
        let hits: Vec<Value> = ids
            .iter()
            .map(|id| {
                json!({
                    "_index": "articles",
                    "_id": id.to_string(),
                    "_source": { "id": id },
                    "sort": [id]
                })
            })
            .collect();
        let mut body = json!({ "hits": { "total": { "value": 5 }, "hits": hits } });
        if let Some(scroll_id) = scroll_id {
            body["_scroll_id"] = json!(scroll_id);
        }
        body
    }

    #[tokio::test]
    async fn test_search_after_requires_sort() {
        let backend = Arc::new(InMemoryBackend::new());
        let target = SearchTarget::Strategy(article_strategy(backend, Vec::new()));

        let result = search_after_all(target, SearchQuery::match_all(), SearchOptions::default(), None, |_| true).await;
        assert!(matches!(result, Err(PipelineError::ConfigError(_))));
    }

    #[tokio::test]
    async fn test_search_after_feeds_sort_values() {
        let backend = Arc::new(InMemoryBackend::new());
        backend.push_search_response(page(&[1, 2], None));
        backend.push_search_response(page(&[3, 4], None));
        backend.push_search_response(page(&[5], None));
        let target = SearchTarget::Strategy(article_strategy(backend.clone(), Vec::new()));

        let mut seen = Vec::new();
        let query = SearchQuery::from(json!({ "size": 2, "sort": [{ "id": "asc" }] }));
        let pages = search_after_all(target, query, SearchOptions::default(), None, |hits| {
            seen.extend(hits.iter().filter_map(|hit| hit.document_id()));
            true
        })
        .await
        .unwrap();

        assert_eq!(pages, 3);
        assert_eq!(seen, vec!["1", "2", "3", "4", "5"]);
        let searches = backend.searches();
        assert!(searches[0].body.as_ref().unwrap().get("search_after").is_none());
        assert_eq!(searches[1].body.as_ref().unwrap()["search_after"], json!([2]));
        assert_eq!(searches[2].body.as_ref().unwrap()["search_after"], json!([4]));
    }

    #[tokio::test]
    async fn test_search_after_honours_limit_and_callback() {
        let backend = Arc::new(InMemoryBackend::new());
        for _ in 0..3 {
            backend.push_search_response(page(&[1, 2], None));
        }
        let target = SearchTarget::Strategy(article_strategy(backend, Vec::new()));
        let query = SearchQuery::from(json!({ "size": 2, "sort": ["id"] }));

        let limited = search_after_all(target.clone(), query.clone(), SearchOptions::default(), Some(1), |_| true)
            .await
            .unwrap();
        assert_eq!(limited, 1);

        let stopped = search_after_all(target, query, SearchOptions::default(), None, |_| false)
            .await
            .unwrap();
        assert_eq!(stopped, 1);
    }

    #[tokio::test]
    async fn test_scroll_walks_and_clears() {
        let backend = Arc::new(InMemoryBackend::new());
        backend.push_search_response(page(&[1, 2], Some("scroll-1")));
        backend.push_search_response(page(&[3, 4], Some("scroll-1")));
        backend.push_search_response(page(&[5], Some("scroll-1")));
        let target = SearchTarget::Strategy(article_strategy(backend.clone(), Vec::new()));

        let mut total = 0;
        let pages = scroll_all(
            target,
            SearchQuery::match_all(),
            SearchOptions::default().with_size(2),
            ScrollOptions::default(),
            None,
            |hits| {
                total += hits.len();
                true
            },
        )
        .await
        .unwrap();

        assert_eq!(pages, 3);
        assert_eq!(total, 5);
        assert_eq!(backend.searches()[0].scroll.as_deref(), Some("30s"));
        assert_eq!(backend.cleared_scrolls(), vec!["scroll-1"]);
    }

    #[tokio::test]
    async fn test_scroll_error_survives_failed_clear() {
        let backend = Arc::new(InMemoryBackend::new());
        backend.push_search_response(page(&[1, 2], Some("scroll-3")));
        backend.fail_scrolls(SearchError::not_found("scroll context scroll-3"));
        backend.fail_clear_scrolls(SearchError::query("clear rejected"));
        let target = SearchTarget::Strategy(article_strategy(backend.clone(), Vec::new()));

        let result = scroll_all(
            target,
            SearchQuery::match_all(),
            SearchOptions::default().with_size(2),
            ScrollOptions::default(),
            None,
            |_| true,
        )
        .await;

        assert!(matches!(
            result,
            Err(PipelineError::SearchError(SearchError::NotFound(_)))
        ));
        assert!(backend.cleared_scrolls().is_empty());
    }

    #[tokio::test]
    async fn test_search_all_picks_pagination_by_sort() {
        let backend = Arc::new(InMemoryBackend::new());
        backend.push_search_response(page(&[1], None));
        backend.push_search_response(page(&[1], Some("scroll-5")));
        let target = SearchTarget::Strategy(article_strategy(backend.clone(), Vec::new()));

        let sorted = SearchQuery::from(json!({ "size": 2, "sort": ["id"] }));
        search_all(target.clone(), sorted, SearchOptions::default(), ScrollOptions::default(), None, |_| true)
            .await
            .unwrap();
        search_all(
            target,
            SearchQuery::match_all(),
            SearchOptions::default().with_size(2),
            ScrollOptions::default(),
            None,
            |_| true,
        )
        .await
        .unwrap();

        let searches = backend.searches();
        assert_eq!(searches.len(), 2);
        assert!(searches[0].scroll.is_none());
        assert_eq!(searches[1].scroll.as_deref(), Some("30s"));
        assert_eq!(backend.cleared_scrolls(), vec!["scroll-5"]);
    }

    #[tokio::test]
    async fn test_scroll_keeps_context_when_asked() {
        let backend = Arc::new(InMemoryBackend::new());
        backend.push_search_response(page(&[1], Some("scroll-9")));
        let target = SearchTarget::Strategy(article_strategy(backend.clone(), Vec::new()));

        let scroll = ScrollOptions {
            keep_alive: "1m".to_string(),
            clear: false,
        };
        let pages = scroll_all(target, SearchQuery::match_all(), SearchOptions::default(), scroll, None, |_| true)
            .await
            .unwrap();

        assert_eq!(pages, 1);
        assert!(backend.cleared_scrolls().is_empty());
    }
}
