//! Reindex orchestration.
//!
//! Rebuilds the indices of one or more strategies: for every partition the
//! strategy yields, the index is created, the matching records are imported
//! and, optionally, the document counts are verified.

mod verify;

pub use verify::{verify_count, Verification};

use std::collections::BTreeMap;
use std::fmt;
use std::sync::Arc;

use chrono::{DateTime, Utc};
use serde::Serialize;
use tracing::{debug, info, instrument};
use uuid::Uuid;

use crate::errors::PipelineError;
use crate::import::BulkImporter;
use crate::options::ReindexOptions;
use crate::strategy::{CreateIndex, Strategy};
use search_sync_shared::ImportResult;

/// Progress of one strategy within a reindex run.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ReindexState {
    Pending,
    CreatingIndex,
    Importing,
    Verifying,
    Done,
}

impl fmt::Display for ReindexState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            ReindexState::Pending => "pending",
            ReindexState::CreatingIndex => "creating-index",
            ReindexState::Importing => "importing",
            ReindexState::Verifying => "verifying",
            ReindexState::Done => "done",
        };
        f.write_str(name)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct PartitionReport {
    pub index: String,
    pub result: ImportResult,
    pub verification: Option<Verification>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct StrategyReport {
    pub state: ReindexState,
    pub partitions: Vec<PartitionReport>,
}

impl StrategyReport {
    fn new() -> Self {
        Self {
            state: ReindexState::Pending,
            partitions: Vec::new(),
        }
    }

    fn enter(&mut self, state: ReindexState, strategy: &Strategy) {
        debug!(strategy = strategy.name(), from = %self.state, to = %state, "Reindex state change");
        self.state = state;
    }

    pub fn errors(&self) -> usize {
        self.partitions.iter().map(|p| p.result.errors).sum()
    }
}

/// Per-strategy outcome of a reindex run.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ReindexReport {
    pub run_id: Uuid,
    pub strategies: BTreeMap<String, StrategyReport>,
}

impl ReindexReport {
    fn new() -> Self {
        Self {
            run_id: Uuid::new_v4(),
            strategies: BTreeMap::new(),
        }
    }

    /// Rejected documents across every strategy and partition.
    pub fn total_errors(&self) -> usize {
        self.strategies.values().map(StrategyReport::errors).sum()
    }

    pub fn total_documents(&self) -> usize {
        self.strategies
            .values()
            .flat_map(|s| s.partitions.iter())
            .map(|p| p.result.total)
            .sum()
    }
}

pub struct Reindexer {
    strategies: Vec<Arc<Strategy>>,
}

impl Reindexer {
    pub fn new(strategies: Vec<Arc<Strategy>>) -> Self {
        Self { strategies }
    }

    fn select(&self, names: Option<&[String]>) -> Result<Vec<Arc<Strategy>>, PipelineError> {
        let Some(names) = names else {
            return Ok(self.strategies.clone());
        };
        for name in names {
            if !self.strategies.iter().any(|s| s.name() == name) {
                return Err(PipelineError::config(format!("unknown strategy '{}'", name)));
            }
        }
        Ok(self
            .strategies
            .iter()
            .filter(|s| names.iter().any(|name| name == s.name()))
            .cloned()
            .collect())
    }

    /// Rebuild every partition of the selected strategies.
    #[instrument(skip(self, options), fields(strategies = self.strategies.len()))]
    pub async fn reload_indices(&self, options: ReindexOptions) -> Result<ReindexReport, PipelineError> {
        let strategies = self.select(options.strategy_names.as_deref())?;
        let mut report = ReindexReport::new();
        info!(run_id = %report.run_id, strategies = strategies.len(), "Starting reindex");

        for strategy in strategies {
            let strategy_report = self.reload_strategy(&strategy, &options).await?;
            report
                .strategies
                .insert(strategy.name().to_string(), strategy_report);
        }

        info!(
            run_id = %report.run_id,
            documents = report.total_documents(),
            errors = report.total_errors(),
            "Reindex finished"
        );
        Ok(report)
    }

    async fn reload_strategy(
        &self,
        strategy: &Arc<Strategy>,
        options: &ReindexOptions,
    ) -> Result<StrategyReport, PipelineError> {
        let config = strategy.config();
        let mut report = StrategyReport::new();

        for partition in config.partitions(options.start, options.end)? {
            partition.validate()?;
            if let Some(callback) = &options.on_partition {
                callback(strategy.name(), &partition);
            }

            report.enter(ReindexState::CreatingIndex, strategy);
            strategy
                .create_index(
                    CreateIndex::named(partition.index.as_str())
                        .with_force(options.force)
                        .with_schema(partition.schema.clone()),
                )
                .await?;

            report.enter(ReindexState::Importing, strategy);
            let import_options = options.import_options(&partition, config.reindex_preload().cloned());
            let result = BulkImporter::new(strategy.clone())
                .import(Some(&partition.index), import_options, options.on_batch.clone())
                .await?;

            let verification = match (&partition.verify_count_query, options.verify_count) {
                (Some(query), true) => {
                    report.enter(ReindexState::Verifying, strategy);
                    Some(
                        verify_count(
                            strategy,
                            &partition,
                            query,
                            options.refresh,
                            options.timeout(),
                            &options.cancel,
                        )
                        .await?,
                    )
                }
                _ => None,
            };

            report.partitions.push(PartitionReport {
                index: partition.index.clone(),
                result,
                verification,
            });
        }

        report.enter(ReindexState::Done, strategy);
        info!(
            strategy = strategy.name(),
            partitions = report.partitions.len(),
            errors = report.errors(),
            "Strategy reindexed"
        );
        Ok(report)
    }

    /// Create every partition index of every strategy without importing.
    /// Returns the indices that were created.
    pub async fn create_indices(
        &self,
        start: Option<DateTime<Utc>>,
        end: Option<DateTime<Utc>>,
        force: bool,
    ) -> Result<Vec<String>, PipelineError> {
        let mut created = Vec::new();
        for strategy in &self.strategies {
            for partition in strategy.config().partitions(start, end)? {
                partition.validate()?;
                let request = CreateIndex::named(partition.index.as_str())
                    .with_force(force)
                    .with_schema(partition.schema.clone());
                if strategy.create_index(request).await? {
                    created.push(partition.index);
                }
            }
        }
        Ok(created)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::import::{BatchCallback, BatchReport};
    use crate::options::PartitionCallback;
    use crate::record::Scope;
    use crate::store::preload_fn;
    use crate::strategy::Partition;
    use crate::test_support::{article, article_store, strategy_over, Article};
    use parking_lot::Mutex;
    use search_sync_repository::{IndexSchema, InMemoryBackend, SearchBackend};
    use serde_json::{json, Value};

    fn articles(n: u64) -> Vec<Article> {
        (1..=n).map(|i| article(i, "x")).collect()
    }

    fn odd_even_partitions(strategy: &Strategy) {
        strategy.configure(|config| {
            config.set_partitions(|_, _, _| {
                Ok(vec![
                    Partition::whole("articles-odd")
                        .with_scope(Scope::all().filter_as::<Article, _>(|a| a.id % 2 == 1)),
                    Partition::whole("articles-even")
                        .with_scope(Scope::all().filter_as::<Article, _>(|a| a.id % 2 == 0)),
                ])
            });
        });
    }

    #[tokio::test]
    async fn test_reload_partitions_and_report() {
        let backend = Arc::new(InMemoryBackend::new());
        let strategy = strategy_over(backend.clone(), article_store(articles(7)), "default");
        odd_even_partitions(&strategy);

        let seen = Arc::new(Mutex::new(Vec::new()));
        let sink = seen.clone();
        let on_partition: PartitionCallback =
            Arc::new(move |name: &str, partition: &Partition| {
                sink.lock().push(format!("{}:{}", name, partition.index))
            });

        let report = Reindexer::new(vec![strategy])
            .reload_indices(
                ReindexOptions::default()
                    .with_verify_count(true)
                    .with_on_partition(on_partition),
            )
            .await
            .unwrap();

        let strategy_report = &report.strategies["default"];
        assert_eq!(strategy_report.state, ReindexState::Done);
        assert_eq!(strategy_report.partitions.len(), 2);
        assert_eq!(strategy_report.partitions[0].result.total, 4);
        assert_eq!(strategy_report.partitions[1].result.total, 3);
        assert_eq!(report.total_documents(), 7);
        assert_eq!(report.total_errors(), 0);

        let verification = strategy_report.partitions[0].verification.as_ref().unwrap();
        assert!(verification.matches);
        assert!(verification.refreshed);

        assert_eq!(backend.documents("articles-odd").len(), 4);
        assert_eq!(backend.documents("articles-even").len(), 3);
        assert_eq!(backend.refreshes(), vec!["articles-odd", "articles-even"]);
        assert_eq!(*seen.lock(), vec!["default:articles-odd", "default:articles-even"]);
    }

    #[tokio::test]
    async fn test_verification_mismatch_is_reported_not_raised() {
        let backend = Arc::new(InMemoryBackend::new());
        backend.fail_documents_where(Arc::new(|doc: &Value| {
            (doc["id"] == "00002").then(|| json!({ "type": "illegal_argument_exception" }))
        }));
        let strategy = strategy_over(backend, article_store(articles(5)), "default");

        let report = Reindexer::new(vec![strategy])
            .reload_indices(ReindexOptions::default().with_verify_count(true).with_refresh(false))
            .await
            .unwrap();

        let partition = &report.strategies["default"].partitions[0];
        assert_eq!(partition.result.errors, 1);
        assert_eq!(
            partition.verification,
            Some(Verification {
                store_count: 5,
                index_count: 4,
                matches: false,
                refreshed: false,
            })
        );
    }

    #[tokio::test]
    async fn test_verification_is_off_by_default() {
        let backend = Arc::new(InMemoryBackend::new());
        let strategy = strategy_over(backend, article_store(articles(2)), "default");

        let report = Reindexer::new(vec![strategy])
            .reload_indices(ReindexOptions::default())
            .await
            .unwrap();

        assert!(report.strategies["default"].partitions[0].verification.is_none());
    }

    #[tokio::test]
    async fn test_unknown_strategy_name_is_config_error() {
        let backend = Arc::new(InMemoryBackend::new());
        let strategy = strategy_over(backend.clone(), article_store(articles(2)), "default");

        let result = Reindexer::new(vec![strategy])
            .reload_indices(ReindexOptions::default().with_strategy_names(vec!["archive".into()]))
            .await;

        assert!(matches!(result, Err(PipelineError::ConfigError(_))));
        assert!(backend.bulk_calls().is_empty());
    }

    #[tokio::test]
    async fn test_strategy_filter_and_reindex_preload() {
        let backend = Arc::new(InMemoryBackend::new());
        let store = article_store(articles(4));
        let default = strategy_over(backend.clone(), store.clone(), "default");
        let archive = strategy_over(backend.clone(), store, "archive");
        archive.configure(|config| {
            config
                .set_target_index_name(|_| Ok("articles-archive".to_string()))
                .set_reindex_preload(Some(preload_fn(|records| records.into_iter().take(1).collect())));
        });

        let batches = Arc::new(Mutex::new(0usize));
        let counter = batches.clone();
        let on_batch: BatchCallback = Arc::new(move |_: &BatchReport| *counter.lock() += 1);

        let report = Reindexer::new(vec![default, archive.clone()])
            .reload_indices(
                ReindexOptions::default()
                    .with_strategy_names(vec!["archive".into()])
                    .with_on_batch(on_batch),
            )
            .await
            .unwrap();

        assert_eq!(report.strategies.len(), 1);
        assert_eq!(report.strategies["archive"].partitions[0].result.total, 1);
        assert_eq!(*batches.lock(), 1);
        assert!(!backend.index_exists("articles").await.unwrap());

        let report = Reindexer::new(vec![archive])
            .reload_indices(ReindexOptions {
                ignore_reindex_preload: true,
                ..ReindexOptions::default()
            })
            .await
            .unwrap();
        assert_eq!(report.strategies["archive"].partitions[0].result.total, 4);
    }

    #[tokio::test]
    async fn test_invalid_partition_fails_before_writing() {
        let backend = Arc::new(InMemoryBackend::new());
        let strategy = strategy_over(backend.clone(), article_store(articles(2)), "default");
        strategy.configure(|config| {
            config.set_partitions(|_, _, _| {
                Ok(vec![Partition::whole("articles")
                    .with_schema(IndexSchema::new(json!({}), Value::Null))])
            });
        });

        let result = Reindexer::new(vec![strategy])
            .reload_indices(ReindexOptions::default())
            .await;
        assert!(matches!(result, Err(PipelineError::ConfigError(_))));
        assert!(!backend.index_exists("articles").await.unwrap());
    }

    #[tokio::test]
    async fn test_create_indices_is_idempotent() {
        let backend = Arc::new(InMemoryBackend::new());
        let strategy = strategy_over(backend.clone(), article_store(articles(2)), "default");
        odd_even_partitions(&strategy);
        let reindexer = Reindexer::new(vec![strategy]);

        let created = reindexer.create_indices(None, None, false).await.unwrap();
        assert_eq!(created, vec!["articles-odd", "articles-even"]);
        assert!(reindexer.create_indices(None, None, false).await.unwrap().is_empty());
        assert_eq!(reindexer.create_indices(None, None, true).await.unwrap().len(), 2);
    }
}
