//! Interface definitions for the search backend.
//!
//! This module defines the abstract `SearchBackend` trait that allows
//! for dependency injection and swappable search backend implementations.

mod search_backend;

pub use search_backend::{refresh_interval_of, same_client, SearchBackend};
