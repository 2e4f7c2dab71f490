//! # Search Sync
//!
//! Process wiring for the search sync engine.
//!
//! This crate reads the environment configuration, initialises tracing and
//! builds the search client and adapter registry the pipeline runs on.

pub mod config;
pub mod telemetry;

pub use config::{Dependencies, LogFormat, SyncConfig};

use thiserror::Error;

/// Errors that can occur while wiring or running the sync engine.
#[derive(Error, Debug)]
pub enum SyncError {
    /// Configuration error.
    #[error("Configuration error: {0}")]
    ConfigError(String),

    /// Pipeline error.
    #[error("Pipeline error: {0}")]
    PipelineError(#[from] search_sync_pipeline::PipelineError),

    /// Search error.
    #[error("Search error: {0}")]
    SearchError(#[from] search_sync_repository::SearchError),
}

impl SyncError {
    /// Create a configuration error.
    pub fn config(msg: impl Into<String>) -> Self {
        Self::ConfigError(msg.into())
    }
}
