//! Default adapter over any record store.

use std::sync::Arc;

use async_trait::async_trait;
use futures::future;
use futures::{StreamExt, TryStreamExt};

use super::{Adapter, BatchQuery};
use crate::record::{RecordRef, Scope};
use crate::store::{BatchStream, RecordStore, StoreError};

/// Adapter that delegates to a [`RecordStore`] and runs the batch preload
/// hook after every fetched batch. Batches the preload empties are dropped.
pub struct StoreAdapter {
    name: String,
    store: Arc<dyn RecordStore>,
}

impl StoreAdapter {
    pub fn new(store: Arc<dyn RecordStore>) -> Self {
        Self {
            name: format!("store:{}", store.entity_type()),
            store,
        }
    }

    pub fn store(&self) -> &Arc<dyn RecordStore> {
        &self.store
    }
}

#[async_trait]
impl Adapter for StoreAdapter {
    fn name(&self) -> &str {
        &self.name
    }

    fn find_in_batches(&self, query: BatchQuery) -> BatchStream<'_> {
        let batches = self.store.find_in_batches(query.scope, query.batch_size);
        match query.preload {
            Some(preload) => batches
                .and_then(move |batch| {
                    let preload = preload.clone();
                    async move { preload.preload(batch).await }
                })
                .try_filter(|batch| future::ready(!batch.is_empty()))
                .boxed(),
            None => batches,
        }
    }

    async fn count(&self, scope: &Scope) -> Result<u64, StoreError> {
        self.store.count(scope).await
    }

    async fn find_by_ids(
        &self,
        ids: &[String],
        scope: &Scope,
    ) -> Result<Vec<RecordRef>, StoreError> {
        self.store.find_by_ids(ids, scope).await
    }
}
