//! # Search Sync Shared
//!
//! Plain data types shared by the repository and pipeline crates: search
//! hits and totals, query payloads, and the accounting returned by bulk
//! imports. Nothing in this crate performs I/O.

mod hit;
mod import_result;
mod query;

pub use hit::{Hit, HitsTotal, SOURCE_ID_FIELD, TYPE_MARKER_FIELD};
pub use import_result::{BulkItemError, ImportResult, Measurements};
pub use query::SearchQuery;
