//! # Search Sync Repository
//!
//! This crate provides the boundary between the sync engine and the search
//! backend. It includes definitions for errors, the backend interface, bulk
//! and search request types, index schema builders, a concrete
//! implementation for OpenSearch and an in-memory implementation.

pub mod config;
pub mod errors;
pub mod interfaces;
pub mod memory;
pub mod opensearch;
pub mod schema;
pub mod types;

pub use config::OpenSearchConfig;
pub use errors::SearchError;
pub use interfaces::{refresh_interval_of, same_client, SearchBackend};
pub use memory::InMemoryBackend;
pub use opensearch::OpenSearchClient;
pub use schema::{IndexSchema, Mappings, Settings};
pub use types::{BulkAction, BulkItem, BulkOperation, BulkResponse, SearchRequest};
