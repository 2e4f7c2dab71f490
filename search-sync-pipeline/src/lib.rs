//! # Search Sync Pipeline
//!
//! Keeps search indices in step with record stores and maps search hits
//! back to domain records.
//!
//! ## Architecture
//!
//! 1. **Adapter**: batched fetching and bulk descriptors per record store
//! 2. **Strategy**: naming, schema and serialization for one entity type
//! 3. **Import**: batched fetch, transform and bulk write with throttling
//! 4. **Reindex**: full rebuilds across strategies and partitions
//! 5. **Response**: lazy search responses and ordered record resolution
//! 6. **Multi**: several strategies searched as one target

pub mod adapter;
pub mod cancel;
pub mod errors;
pub mod import;
pub mod multi;
pub mod options;
pub mod record;
pub mod registry;
pub mod reindex;
pub mod response;
pub mod store;
pub mod strategy;

#[cfg(test)]
mod test_support;

pub use adapter::{Adapter, AdapterRef, AdapterRegistry, BatchQuery, StoreAdapter};
pub use cancel::CancellationToken;
pub use errors::PipelineError;
pub use import::{BatchCallback, BatchReport, BulkImporter};
pub use multi::MultiStrategy;
pub use options::{ImportOptions, RecordsOptions, ReindexOptions, SearchOptions};
pub use record::{Record, RecordRef, Scope};
pub use registry::{IndexedType, TypeRegistry};
pub use reindex::{ReindexReport, Reindexer, Verification};
pub use response::{ResolvedRecords, SearchResponse, SearchTarget};
pub use store::{MemoryStore, Preload, PreloadRef, RecordStore, StoreError};
pub use strategy::{CreateIndex, IndexAction, Partition, Strategy, StrategyConfig};
