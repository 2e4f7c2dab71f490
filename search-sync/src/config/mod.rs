//! Environment configuration for the sync process.

mod dependencies;

pub use dependencies::Dependencies;

use std::env;
use std::str::FromStr;
use std::time::Duration;

use search_sync_pipeline::options::DEFAULT_BATCH_SIZE;
use search_sync_pipeline::{ImportOptions, ReindexOptions};
use search_sync_repository::OpenSearchConfig;

use crate::SyncError;

/// Output format of the tracing subscriber.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum LogFormat {
    #[default]
    Pretty,
    Json,
}

impl FromStr for LogFormat {
    type Err = SyncError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "pretty" => Ok(Self::Pretty),
            "json" => Ok(Self::Json),
            other => Err(SyncError::config(format!(
                "LOG_FORMAT must be 'pretty' or 'json', got '{}'",
                other
            ))),
        }
    }
}

/// Process configuration.
///
/// # Environment Variables
///
/// - `OPENSEARCH_URL`: OpenSearch server URL (default: http://localhost:9200)
/// - `OPENSEARCH_REQUEST_TIMEOUT_MS`: per-request timeout (default: 30000)
/// - `SYNC_BATCH_SIZE`: records per bulk request (default: 1000)
/// - `SYNC_BATCH_SLEEP_MS`: pause after each batch (default: 0)
/// - `SYNC_REFRESH`: refresh indices after imports (default: true)
/// - `SYNC_VERIFY_COUNT`: compare counts after reindexing (default: false)
/// - `LOG_FORMAT`: `pretty` or `json` (default: pretty)
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SyncConfig {
    pub opensearch: OpenSearchConfig,
    pub batch_size: usize,
    pub batch_sleep_ms: u64,
    pub refresh: bool,
    pub verify_count: bool,
    pub log_format: LogFormat,
}

impl Default for SyncConfig {
    fn default() -> Self {
        Self {
            opensearch: OpenSearchConfig::default(),
            batch_size: DEFAULT_BATCH_SIZE,
            batch_sleep_ms: 0,
            refresh: true,
            verify_count: false,
            log_format: LogFormat::Pretty,
        }
    }
}

impl SyncConfig {
    /// Read the configuration from the environment, loading `.env` first if
    /// one exists.
    pub fn from_env() -> Result<Self, SyncError> {
        dotenv::dotenv().ok();
        Self::from_lookup(|key| env::var(key).ok())
    }

    /// Read the configuration through `lookup`. Unset keys take their
    /// defaults; set but unparsable values are errors.
    pub fn from_lookup<F>(lookup: F) -> Result<Self, SyncError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let defaults = Self::default();

        let url = lookup("OPENSEARCH_URL").unwrap_or(defaults.opensearch.url);
        let timeout_ms = parse_var(
            &lookup,
            "OPENSEARCH_REQUEST_TIMEOUT_MS",
            defaults.opensearch.request_timeout_ms,
        )?;
        let batch_size = parse_var(&lookup, "SYNC_BATCH_SIZE", defaults.batch_size)?;
        if batch_size == 0 {
            return Err(SyncError::config("SYNC_BATCH_SIZE must be greater than zero"));
        }

        Ok(Self {
            opensearch: OpenSearchConfig::new(url).with_request_timeout_ms(timeout_ms),
            batch_size,
            batch_sleep_ms: parse_var(&lookup, "SYNC_BATCH_SLEEP_MS", defaults.batch_sleep_ms)?,
            refresh: parse_var(&lookup, "SYNC_REFRESH", defaults.refresh)?,
            verify_count: parse_var(&lookup, "SYNC_VERIFY_COUNT", defaults.verify_count)?,
            log_format: match lookup("LOG_FORMAT") {
                Some(value) => value.parse()?,
                None => defaults.log_format,
            },
        })
    }

    pub fn import_options(&self) -> ImportOptions {
        ImportOptions::default()
            .with_batch_size(self.batch_size)
            .with_batch_sleep(Duration::from_millis(self.batch_sleep_ms))
            .with_refresh(self.refresh)
    }

    pub fn reindex_options(&self) -> ReindexOptions {
        let mut options = ReindexOptions::default()
            .with_batch_size(self.batch_size)
            .with_refresh(self.refresh)
            .with_verify_count(self.verify_count);
        options.batch_sleep_ms = self.batch_sleep_ms;
        options
    }
}

fn parse_var<T, F>(lookup: &F, key: &str, default: T) -> Result<T, SyncError>
where
    T: FromStr,
    T::Err: std::fmt::Display,
    F: Fn(&str) -> Option<String>,
{
    match lookup(key) {
        Some(raw) => raw
            .trim()
            .parse()
            .map_err(|e| SyncError::config(format!("Invalid {} '{}': {}", key, raw, e))),
        None => Ok(default),
    }
}
