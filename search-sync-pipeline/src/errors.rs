//! Error types for the search sync pipeline.

use std::time::Duration;

use search_sync_repository::SearchError;
use thiserror::Error;

use crate::store::StoreError;

/// Errors that can occur while importing, reindexing or resolving records.
///
/// Document-level bulk failures are not errors; they are reported in the
/// import result.
#[derive(Error, Debug)]
pub enum PipelineError {
    /// Invalid or missing configuration (duplicate or unknown strategy, bad option).
    #[error("Configuration error: {0}")]
    ConfigError(String),

    /// Error from the search backend.
    #[error("Search error: {0}")]
    SearchError(#[from] SearchError),

    /// Error from the record store.
    #[error("Store error: {0}")]
    StoreError(#[from] StoreError),

    /// No adapter is registered for the entity type and there is no default.
    #[error("No adapter registered for entity type '{0}'")]
    AdapterNotFound(String),

    /// A plain import targeted an index that does not exist.
    #[error("Index '{0}' does not exist; use force to create it")]
    IndexMissing(String),

    /// A record could not be turned into a document.
    #[error("Serialization error: {0}")]
    SerializationError(String),

    /// Records cannot be returned in hit order.
    #[error("Ordering error: {0}")]
    OrderingError(String),

    /// A backend call did not finish in time.
    #[error("Operation timed out after {0:?}")]
    Timeout(Duration),

    /// The operation was cancelled by its caller.
    #[error("Operation cancelled")]
    Cancelled,
}

impl PipelineError {
    /// Create a configuration error.
    pub fn config(msg: impl Into<String>) -> Self {
        Self::ConfigError(msg.into())
    }

    /// Create a serialization error.
    pub fn serialization(msg: impl Into<String>) -> Self {
        Self::SerializationError(msg.into())
    }

    /// Create an ordering error.
    pub fn ordering(msg: impl Into<String>) -> Self {
        Self::OrderingError(msg.into())
    }
}

impl From<serde_json::Error> for PipelineError {
    fn from(err: serde_json::Error) -> Self {
        Self::SerializationError(err.to_string())
    }
}
