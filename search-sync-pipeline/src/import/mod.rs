//! Bulk import engine.
//!
//! Fetches records batch by batch through the strategy's adapter, turns them
//! into bulk descriptors and writes them with one bulk call per batch, while
//! the target index runs with a temporary refresh interval.

mod importer;
mod refresh;
mod timer;

pub use importer::{BatchCallback, BatchReport, BulkImporter};
pub use refresh::{with_refresh_interval, RefreshIntervalGuard};
pub use timer::ThroughputTimer;
