//! Backend adapters.
//!
//! An adapter is the per-record-store implementation of batched fetching and
//! bulk descriptor construction. Everything above it (importer, resolver)
//! talks to stores only through the [`Adapter`] trait.

mod registry;
mod store_adapter;

pub use registry::AdapterRegistry;
pub use store_adapter::StoreAdapter;

use std::sync::Arc;

use async_trait::async_trait;

use crate::errors::PipelineError;
use crate::record::{Record, RecordRef, Scope};
use crate::store::{BatchStream, PreloadRef, StoreError};
use crate::strategy::StrategyConfig;
use search_sync_repository::BulkOperation;

/// Parameters of one batched iteration.
#[derive(Clone, Default)]
pub struct BatchQuery {
    pub scope: Scope,
    pub batch_size: usize,
    /// Applied to every batch after it is fetched.
    pub preload: Option<PreloadRef>,
}

impl BatchQuery {
    pub fn new(scope: Scope, batch_size: usize) -> Self {
        Self {
            scope,
            batch_size,
            preload: None,
        }
    }

    pub fn with_preload(mut self, preload: Option<PreloadRef>) -> Self {
        self.preload = preload;
        self
    }
}

/// Record store access as seen by the pipeline.
#[async_trait]
pub trait Adapter: Send + Sync {
    /// Name used in logs.
    fn name(&self) -> &str;

    /// Lazy sequence of fixed-size batches. Store errors are yielded unchanged.
    fn find_in_batches(&self, query: BatchQuery) -> BatchStream<'_>;

    async fn count(&self, scope: &Scope) -> Result<u64, StoreError>;

    /// Fetch records for a set of ids in one call. Order is unspecified.
    async fn find_by_ids(&self, ids: &[String], scope: &Scope)
        -> Result<Vec<RecordRef>, StoreError>;

    /// Build the bulk descriptor for one record.
    fn bulk_operation(
        &self,
        record: &dyn Record,
        config: &StrategyConfig,
    ) -> Result<BulkOperation, PipelineError> {
        default_bulk_operation(record, config)
    }
}

pub type AdapterRef = Arc<dyn Adapter>;

/// Index the reindex serialization of `record`, under its document id unless
/// the strategy indexes without ids.
pub fn default_bulk_operation(
    record: &dyn Record,
    config: &StrategyConfig,
) -> Result<BulkOperation, PipelineError> {
    let operation = BulkOperation::index(config.reindex_serialize(record)?);
    Ok(match config.document_id(record)? {
        Some(id) => operation.with_id(id),
        None => operation,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_support::article;
    use search_sync_repository::BulkAction;

    #[test]
    fn test_default_bulk_operation_carries_id() {
        let config = StrategyConfig::new("articles");
        let operation = default_bulk_operation(&article(3, "Hello"), &config).unwrap();

        assert_eq!(operation.action, BulkAction::Index);
        assert_eq!(operation.id, Some("00003".to_string()));
        assert_eq!(operation.body["title"], "Hello");
    }

    #[test]
    fn test_default_bulk_operation_without_id_keeps_body() {
        let mut config = StrategyConfig::new("events");
        config.set_index_without_id(true);

        let operation = default_bulk_operation(&article(3, "Hello"), &config).unwrap();
        assert!(operation.id.is_none());
        assert!(operation.body.is_object());
        assert!(operation.validate().is_ok());
    }
}
