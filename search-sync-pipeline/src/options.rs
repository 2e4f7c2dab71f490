//! Per-operation option structs.
//!
//! The data-only fields deserialize from JSON with unknown keys rejected.
//! Closures, scopes and cancellation tokens are set through builder methods.

use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};
use serde::Deserialize;
use serde_json::{json, Value};

use crate::cancel::CancellationToken;
use crate::errors::PipelineError;
use crate::import::BatchCallback;
use crate::record::{Record, Scope};
use crate::store::PreloadRef;
use crate::strategy::{Partition, StrategyConfig};
use search_sync_repository::BulkOperation;

pub const DEFAULT_BATCH_SIZE: usize = 1000;
pub const DEFAULT_PAGE_SIZE: usize = 10;

/// Builds the bulk descriptor for one record instead of the adapter default.
pub type BulkBuilderFn =
    Arc<dyn Fn(&dyn Record, &StrategyConfig) -> Result<BulkOperation, PipelineError> + Send + Sync>;

/// Called before each reindex partition is processed, with the strategy name.
pub type PartitionCallback = Arc<dyn Fn(&str, &Partition) + Send + Sync>;

fn default_batch_size() -> usize {
    DEFAULT_BATCH_SIZE
}

fn default_refresh_interval() -> Option<Value> {
    Some(json!("-1"))
}

fn default_true() -> bool {
    true
}

/// Options of one bulk import.
#[derive(Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct ImportOptions {
    /// Records per bulk call.
    #[serde(default = "default_batch_size")]
    pub batch_size: usize,
    /// Pause between batches, in milliseconds.
    #[serde(default)]
    pub batch_sleep_ms: u64,
    /// Drop and recreate the index before importing.
    #[serde(default)]
    pub force: bool,
    /// Refresh the index once after the last batch.
    #[serde(default)]
    pub refresh: bool,
    /// Refresh interval applied for the duration of the import. `null`
    /// leaves the interval untouched.
    #[serde(default = "default_refresh_interval")]
    pub refresh_interval: Option<Value>,
    /// Value restored after the import instead of the one read from the index.
    #[serde(default)]
    pub restore_refresh_interval: Option<Value>,
    /// Deadline for each bulk call, in milliseconds.
    #[serde(default)]
    pub timeout_ms: Option<u64>,
    /// Ingest pipeline every bulk call runs through.
    #[serde(default)]
    pub pipeline: Option<String>,
    #[serde(skip)]
    pub scope: Scope,
    #[serde(skip)]
    pub preload: Option<PreloadRef>,
    #[serde(skip)]
    pub bulk_builder: Option<BulkBuilderFn>,
    #[serde(skip)]
    pub cancel: CancellationToken,
}

impl Default for ImportOptions {
    fn default() -> Self {
        Self {
            batch_size: DEFAULT_BATCH_SIZE,
            batch_sleep_ms: 0,
            force: false,
            refresh: false,
            refresh_interval: default_refresh_interval(),
            restore_refresh_interval: None,
            timeout_ms: None,
            pipeline: None,
            scope: Scope::all(),
            preload: None,
            bulk_builder: None,
            cancel: CancellationToken::new(),
        }
    }
}

impl fmt::Debug for ImportOptions {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ImportOptions")
            .field("batch_size", &self.batch_size)
            .field("batch_sleep_ms", &self.batch_sleep_ms)
            .field("force", &self.force)
            .field("refresh", &self.refresh)
            .field("refresh_interval", &self.refresh_interval)
            .field("restore_refresh_interval", &self.restore_refresh_interval)
            .field("timeout_ms", &self.timeout_ms)
            .field("pipeline", &self.pipeline)
            .field("scope", &self.scope)
            .field("preload", &self.preload.is_some())
            .field("bulk_builder", &self.bulk_builder.is_some())
            .finish()
    }
}

impl TryFrom<Value> for ImportOptions {
    type Error = PipelineError;

    fn try_from(value: Value) -> Result<Self, Self::Error> {
        let options: Self =
            serde_json::from_value(value).map_err(|e| PipelineError::config(e.to_string()))?;
        options.validate()?;
        Ok(options)
    }
}

impl ImportOptions {
    pub fn validate(&self) -> Result<(), PipelineError> {
        if self.batch_size == 0 {
            return Err(PipelineError::config("batch_size must be greater than zero"));
        }
        Ok(())
    }

    pub fn batch_sleep(&self) -> Duration {
        Duration::from_millis(self.batch_sleep_ms)
    }

    pub fn timeout(&self) -> Option<Duration> {
        self.timeout_ms.map(Duration::from_millis)
    }

    pub fn with_batch_size(mut self, batch_size: usize) -> Self {
        self.batch_size = batch_size;
        self
    }

    pub fn with_batch_sleep(mut self, sleep: Duration) -> Self {
        self.batch_sleep_ms = sleep.as_millis() as u64;
        self
    }

    pub fn with_force(mut self, force: bool) -> Self {
        self.force = force;
        self
    }

    pub fn with_refresh(mut self, refresh: bool) -> Self {
        self.refresh = refresh;
        self
    }

    pub fn with_refresh_interval(mut self, interval: Option<Value>) -> Self {
        self.refresh_interval = interval;
        self
    }

    pub fn with_restore_refresh_interval(mut self, interval: Option<Value>) -> Self {
        self.restore_refresh_interval = interval;
        self
    }

    pub fn with_timeout(mut self, timeout: Option<Duration>) -> Self {
        self.timeout_ms = timeout.map(|t| t.as_millis() as u64);
        self
    }

    pub fn with_pipeline(mut self, pipeline: Option<String>) -> Self {
        self.pipeline = pipeline;
        self
    }

    pub fn with_scope(mut self, scope: Scope) -> Self {
        self.scope = scope;
        self
    }

    pub fn with_preload(mut self, preload: Option<PreloadRef>) -> Self {
        self.preload = preload;
        self
    }

    pub fn with_bulk_builder<F>(mut self, builder: F) -> Self
    where
        F: Fn(&dyn Record, &StrategyConfig) -> Result<BulkOperation, PipelineError>
            + Send
            + Sync
            + 'static,
    {
        self.bulk_builder = Some(Arc::new(builder));
        self
    }

    pub fn with_cancel(mut self, cancel: CancellationToken) -> Self {
        self.cancel = cancel;
        self
    }
}

/// Options of a reindex run.
#[derive(Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct ReindexOptions {
    #[serde(default = "default_batch_size")]
    pub batch_size: usize,
    #[serde(default)]
    pub batch_sleep_ms: u64,
    /// Recreate indices that already exist.
    #[serde(default)]
    pub force: bool,
    #[serde(default = "default_true")]
    pub refresh: bool,
    /// Compare store and index counts after each partition.
    #[serde(default)]
    pub verify_count: bool,
    /// Only reindex these strategies.
    #[serde(default)]
    pub strategy_names: Option<Vec<String>>,
    /// Lower time bound handed to the partition iterator.
    #[serde(default)]
    pub start: Option<DateTime<Utc>>,
    /// Upper time bound handed to the partition iterator.
    #[serde(default)]
    pub end: Option<DateTime<Utc>>,
    /// Skip the strategy's reindex preload.
    #[serde(default)]
    pub ignore_reindex_preload: bool,
    #[serde(default = "default_refresh_interval")]
    pub refresh_interval: Option<Value>,
    #[serde(default)]
    pub timeout_ms: Option<u64>,
    #[serde(default)]
    pub pipeline: Option<String>,
    #[serde(skip)]
    pub bulk_builder: Option<BulkBuilderFn>,
    #[serde(skip)]
    pub on_batch: Option<BatchCallback>,
    #[serde(skip)]
    pub on_partition: Option<PartitionCallback>,
    #[serde(skip)]
    pub cancel: CancellationToken,
}

impl Default for ReindexOptions {
    fn default() -> Self {
        Self {
            batch_size: DEFAULT_BATCH_SIZE,
            batch_sleep_ms: 0,
            force: false,
            refresh: true,
            verify_count: false,
            strategy_names: None,
            start: None,
            end: None,
            ignore_reindex_preload: false,
            refresh_interval: default_refresh_interval(),
            timeout_ms: None,
            pipeline: None,
            bulk_builder: None,
            on_batch: None,
            on_partition: None,
            cancel: CancellationToken::new(),
        }
    }
}

impl fmt::Debug for ReindexOptions {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ReindexOptions")
            .field("batch_size", &self.batch_size)
            .field("batch_sleep_ms", &self.batch_sleep_ms)
            .field("force", &self.force)
            .field("refresh", &self.refresh)
            .field("verify_count", &self.verify_count)
            .field("strategy_names", &self.strategy_names)
            .field("start", &self.start)
            .field("end", &self.end)
            .field("ignore_reindex_preload", &self.ignore_reindex_preload)
            .field("pipeline", &self.pipeline)
            .finish()
    }
}

impl TryFrom<Value> for ReindexOptions {
    type Error = PipelineError;

    fn try_from(value: Value) -> Result<Self, Self::Error> {
        let options: Self =
            serde_json::from_value(value).map_err(|e| PipelineError::config(e.to_string()))?;
        if options.batch_size == 0 {
            return Err(PipelineError::config("batch_size must be greater than zero"));
        }
        Ok(options)
    }
}

impl ReindexOptions {
    pub fn timeout(&self) -> Option<Duration> {
        self.timeout_ms.map(Duration::from_millis)
    }

    pub fn with_strategy_names(mut self, names: Vec<String>) -> Self {
        self.strategy_names = Some(names);
        self
    }

    pub fn with_range(mut self, start: Option<DateTime<Utc>>, end: Option<DateTime<Utc>>) -> Self {
        self.start = start;
        self.end = end;
        self
    }

    pub fn with_verify_count(mut self, verify_count: bool) -> Self {
        self.verify_count = verify_count;
        self
    }

    pub fn with_force(mut self, force: bool) -> Self {
        self.force = force;
        self
    }

    pub fn with_refresh(mut self, refresh: bool) -> Self {
        self.refresh = refresh;
        self
    }

    pub fn with_batch_size(mut self, batch_size: usize) -> Self {
        self.batch_size = batch_size;
        self
    }

    pub fn with_pipeline(mut self, pipeline: Option<String>) -> Self {
        self.pipeline = pipeline;
        self
    }

    pub fn with_on_batch(mut self, callback: BatchCallback) -> Self {
        self.on_batch = Some(callback);
        self
    }

    pub fn with_on_partition(mut self, callback: PartitionCallback) -> Self {
        self.on_partition = Some(callback);
        self
    }

    pub fn with_cancel(mut self, cancel: CancellationToken) -> Self {
        self.cancel = cancel;
        self
    }

    /// Import options for one partition. The index is created by the
    /// reindexer, so the import itself never forces.
    pub fn import_options(&self, partition: &Partition, preload: Option<PreloadRef>) -> ImportOptions {
        ImportOptions {
            batch_size: self.batch_size,
            batch_sleep_ms: self.batch_sleep_ms,
            force: false,
            refresh: self.refresh,
            refresh_interval: self.refresh_interval.clone(),
            restore_refresh_interval: None,
            timeout_ms: self.timeout_ms,
            pipeline: self.pipeline.clone(),
            scope: partition.scope.clone(),
            preload: if self.ignore_reindex_preload { None } else { preload },
            bulk_builder: self.bulk_builder.clone(),
            cancel: self.cancel.clone(),
        }
    }
}

/// Options of one search.
#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct SearchOptions {
    /// Index (or comma separated indices) overriding the target's read indices.
    #[serde(default)]
    pub index: Option<String>,
    /// Page size used when the payload does not declare one.
    #[serde(default)]
    pub size: Option<usize>,
    /// Cache the response and derived values on the response instance.
    #[serde(default = "default_true")]
    pub use_cache: bool,
}

impl Default for SearchOptions {
    fn default() -> Self {
        Self {
            index: None,
            size: None,
            use_cache: true,
        }
    }
}

impl TryFrom<Value> for SearchOptions {
    type Error = PipelineError;

    fn try_from(value: Value) -> Result<Self, Self::Error> {
        serde_json::from_value(value).map_err(|e| PipelineError::config(e.to_string()))
    }
}

impl SearchOptions {
    pub fn with_index(mut self, index: impl Into<String>) -> Self {
        self.index = Some(index.into());
        self
    }

    pub fn with_size(mut self, size: usize) -> Self {
        self.size = Some(size);
        self
    }

    pub fn with_use_cache(mut self, use_cache: bool) -> Self {
        self.use_cache = use_cache;
        self
    }
}

/// Options of record resolution.
#[derive(Clone, Default, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct RecordsOptions {
    /// Keep the order imposed by an explicit scope order instead of failing.
    #[serde(default)]
    pub allow_store_order: bool,
    #[serde(skip)]
    pub scope: Scope,
    #[serde(skip)]
    pub preloads: HashMap<String, PreloadRef>,
    #[serde(skip)]
    pub preload_all: Option<PreloadRef>,
}

impl fmt::Debug for RecordsOptions {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RecordsOptions")
            .field("allow_store_order", &self.allow_store_order)
            .field("scope", &self.scope)
            .field("preloads", &self.preloads.keys().collect::<Vec<_>>())
            .field("preload_all", &self.preload_all.is_some())
            .finish()
    }
}

impl RecordsOptions {
    pub fn with_scope(mut self, scope: Scope) -> Self {
        self.scope = scope;
        self
    }

    pub fn allow_store_order(mut self) -> Self {
        self.allow_store_order = true;
        self
    }

    /// Preload applied to records of one entity type.
    pub fn preload_for(mut self, entity_type: impl Into<String>, preload: PreloadRef) -> Self {
        self.preloads.insert(entity_type.into(), preload);
        self
    }

    /// Preload applied to records of every entity type without a specific one.
    pub fn preload_all(mut self, preload: PreloadRef) -> Self {
        self.preload_all = Some(preload);
        self
    }

    pub(crate) fn preload_of(&self, entity_type: &str) -> Option<&PreloadRef> {
        self.preloads.get(entity_type).or(self.preload_all.as_ref())
    }
}
