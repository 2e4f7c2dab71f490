//! Record store boundary.
//!
//! A record store is the source of truth the search index is synchronized
//! from. The pipeline only needs three capabilities from it: batched
//! iteration, counting and fetch-by-ids.

mod memory;

pub use memory::MemoryStore;

use std::sync::Arc;

use async_trait::async_trait;
use futures::future::BoxFuture;
use futures::stream::BoxStream;
use thiserror::Error;

use crate::record::{RecordRef, Scope};

/// Errors raised by a record store. Surfaced to callers unchanged.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum StoreError {
    /// The store could not be reached.
    #[error("Connection error: {0}")]
    ConnectionError(String),

    /// A store query failed.
    #[error("Query error: {0}")]
    QueryError(String),
}

impl StoreError {
    /// Create a connection error.
    pub fn connection(msg: impl Into<String>) -> Self {
        Self::ConnectionError(msg.into())
    }

    /// Create a query error.
    pub fn query(msg: impl Into<String>) -> Self {
        Self::QueryError(msg.into())
    }
}

/// Lazy, finite sequence of non-empty record batches.
pub type BatchStream<'a> = BoxStream<'a, Result<Vec<RecordRef>, StoreError>>;

/// Backend store consumed by the pipeline.
#[async_trait]
pub trait RecordStore: Send + Sync {
    /// Tag of the entity type held by this store.
    fn entity_type(&self) -> &str;

    /// Iterate over matching records in primary-key order, `batch_size` at a time.
    fn find_in_batches(&self, scope: Scope, batch_size: usize) -> BatchStream<'_>;

    /// Count matching records.
    async fn count(&self, scope: &Scope) -> Result<u64, StoreError>;

    /// Fetch the matching records among `ids`, in no particular order unless
    /// the scope declares one. Missing ids are skipped.
    async fn find_by_ids(&self, ids: &[String], scope: &Scope)
        -> Result<Vec<RecordRef>, StoreError>;
}

/// Post-processing applied to fetched records, e.g. eager-loading relations.
#[async_trait]
pub trait Preload: Send + Sync {
    async fn preload(&self, records: Vec<RecordRef>) -> Result<Vec<RecordRef>, StoreError>;
}

pub type PreloadRef = Arc<dyn Preload>;

/// [`Preload`] backed by an async closure.
pub struct FnPreload<F>(pub F);

#[async_trait]
impl<F> Preload for FnPreload<F>
where
    F: Fn(Vec<RecordRef>) -> BoxFuture<'static, Result<Vec<RecordRef>, StoreError>>
        + Send
        + Sync,
{
    async fn preload(&self, records: Vec<RecordRef>) -> Result<Vec<RecordRef>, StoreError> {
        (self.0)(records).await
    }
}

/// Wrap a synchronous transformation as a [`PreloadRef`].
pub fn preload_fn<F>(f: F) -> PreloadRef
where
    F: Fn(Vec<RecordRef>) -> Vec<RecordRef> + Send + Sync + 'static,
{
    let f = Arc::new(f);
    Arc::new(FnPreload(move |records: Vec<RecordRef>| {
        let f = f.clone();
        let fut: BoxFuture<'static, Result<Vec<RecordRef>, StoreError>> =
            Box::pin(async move { Ok(f(records)) });
        fut
    }))
}
