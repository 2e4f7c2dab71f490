//! Batched bulk import.

use std::sync::Arc;
use std::time::{Duration, Instant};

use chrono::Utc;
use futures::TryStreamExt;
use serde::Serialize;
use tracing::{debug, error, info, instrument, warn};

use super::refresh::with_refresh_interval;
use super::timer::ThroughputTimer;
use crate::adapter::BatchQuery;
use crate::cancel::{guarded, sleep};
use crate::errors::PipelineError;
use crate::options::ImportOptions;
use crate::strategy::{CreateIndex, Strategy, StrategyConfig};
use search_sync_repository::BulkOperation;
use search_sync_shared::{ImportResult, Measurements};

/// Outcome of one batch, handed to the per-batch callback.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct BatchReport {
    pub index: String,
    /// 1-based batch number.
    pub batch: usize,
    pub docs: usize,
    pub errors: usize,
    pub transform_docs_per_sec: Option<f64>,
    pub bulk_request_docs_per_sec: Option<f64>,
    pub indexing_docs_per_sec: Option<f64>,
}

pub type BatchCallback = Arc<dyn Fn(&BatchReport) + Send + Sync>;

#[derive(Default)]
struct Timers {
    transform: ThroughputTimer,
    bulk_request: ThroughputTimer,
    indexing: ThroughputTimer,
}

impl Timers {
    fn measurements(&self) -> Measurements {
        Measurements {
            transform_docs_per_sec: self.transform.average(),
            bulk_request_docs_per_sec: self.bulk_request.average(),
            indexing_docs_per_sec: self.indexing.average(),
        }
    }
}

/// Drives fetch, transform and bulk write over every record of a strategy.
///
/// Batches are processed sequentially in fetch order. Rejected documents are
/// counted and collected; only infrastructure failures abort the import.
pub struct BulkImporter {
    strategy: Arc<Strategy>,
}

impl BulkImporter {
    pub fn new(strategy: Arc<Strategy>) -> Self {
        Self { strategy }
    }

    /// Import into `index`, or the strategy's default target index.
    ///
    /// Fails with [`PipelineError::IndexMissing`] when the index does not
    /// exist and `force` is off.
    #[instrument(skip(self, options, on_batch), fields(strategy = %self.strategy.name()))]
    pub async fn import(
        &self,
        index: Option<&str>,
        options: ImportOptions,
        on_batch: Option<BatchCallback>,
    ) -> Result<ImportResult, PipelineError> {
        options.validate()?;
        let config = self.strategy.config();
        let index = match index {
            Some(index) => index.to_string(),
            None => config.target_index_name(None)?,
        };

        if options.force {
            self.strategy
                .create_index(CreateIndex::named(index.as_str()).with_force(true))
                .await?;
        } else if !self.strategy.client().index_exists(&index).await? {
            return Err(PipelineError::IndexMissing(index));
        }

        info!(
            index = %index,
            batch_size = options.batch_size,
            adapter = self.strategy.adapter().name(),
            "Starting import"
        );

        let mut result = with_refresh_interval(
            self.strategy.client().clone(),
            &index,
            options.refresh_interval.as_ref(),
            options.restore_refresh_interval.clone(),
            config.settings().refresh_interval(),
            || self.run_batches(&index, &config, &options, on_batch.as_ref()),
        )
        .await?;

        if options.refresh {
            self.strategy.refresh_index(Some(&index)).await?;
        }

        result.finished_at = Utc::now();
        info!(
            index = %index,
            total = result.total,
            errors = result.errors,
            batches = result.batches,
            "Import finished"
        );
        Ok(result)
    }

    async fn run_batches(
        &self,
        index: &str,
        config: &StrategyConfig,
        options: &ImportOptions,
        on_batch: Option<&BatchCallback>,
    ) -> Result<ImportResult, PipelineError> {
        let mut result = ImportResult::new(index);
        let mut timers = Timers::default();
        let adapter = self.strategy.adapter();
        let client = self.strategy.client();

        let query = BatchQuery::new(options.scope.clone(), options.batch_size)
            .with_preload(options.preload.clone());
        let mut batches = adapter.find_in_batches(query);

        loop {
            options.cancel.check()?;
            let Some(batch) = batches.try_next().await? else {
                break;
            };
            if batch.is_empty() {
                continue;
            }

            let started = Instant::now();
            let operations = batch
                .iter()
                .map(|record| match &options.bulk_builder {
                    Some(builder) => builder(record.as_ref(), config),
                    None => adapter.bulk_operation(record.as_ref(), config),
                })
                .collect::<Result<Vec<BulkOperation>, _>>()?;
            let transform_rate = timers.transform.record(operations.len(), started.elapsed());

            let sent = Instant::now();
            let response = guarded(
                async {
                    client
                        .bulk(index, &operations, options.pipeline.as_deref())
                        .await
                        .map_err(|e| {
                            error!(index, error = %e, "Bulk request failed");
                            PipelineError::from(e)
                        })
                },
                options.timeout(),
                &options.cancel,
            )
            .await?;
            let bulk_rate = timers.bulk_request.record(operations.len(), sent.elapsed());
            let indexing_rate = timers
                .indexing
                .record(operations.len(), Duration::from_millis(response.took));

            let error_items = response.error_items();
            result.batches += 1;
            result.total += operations.len();
            result.errors += error_items.len();
            if !error_items.is_empty() {
                warn!(
                    index,
                    batch = result.batches,
                    errors = error_items.len(),
                    "Bulk request rejected documents"
                );
            }

            let report = BatchReport {
                index: index.to_string(),
                batch: result.batches,
                docs: operations.len(),
                errors: error_items.len(),
                transform_docs_per_sec: transform_rate,
                bulk_request_docs_per_sec: bulk_rate,
                indexing_docs_per_sec: indexing_rate,
            };
            result.error_items.extend(error_items);
            debug!(index, batch = report.batch, docs = report.docs, errors = report.errors, "Batch imported");
            if let Some(callback) = on_batch {
                callback(&report);
            }

            sleep(options.batch_sleep(), &options.cancel).await?;
        }

        result.measurements = timers.measurements();
        Ok(result)
    }
}
