//! Adapter lookup by entity type.

use std::collections::HashMap;
use std::sync::Arc;

use parking_lot::RwLock;
use tracing::debug;

use super::{AdapterRef, StoreAdapter};
use crate::errors::PipelineError;
use crate::store::RecordStore;

/// Explicit map from entity-type tag to adapter, with an optional default.
#[derive(Default)]
pub struct AdapterRegistry {
    adapters: RwLock<HashMap<String, AdapterRef>>,
    default: RwLock<Option<AdapterRef>>,
}

impl AdapterRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register the adapter for an entity type, replacing any previous one.
    pub fn register(&self, entity_type: impl Into<String>, adapter: AdapterRef) {
        let entity_type = entity_type.into();
        debug!(entity_type = %entity_type, adapter = adapter.name(), "Registered adapter");
        self.adapters.write().insert(entity_type, adapter);
    }

    /// Register a [`StoreAdapter`] under the store's entity type.
    pub fn register_store(&self, store: Arc<dyn RecordStore>) -> AdapterRef {
        let entity_type = store.entity_type().to_string();
        let adapter: AdapterRef = Arc::new(StoreAdapter::new(store));
        self.register(entity_type, adapter.clone());
        adapter
    }

    /// Adapter used for entity types without a registration.
    pub fn set_default(&self, adapter: AdapterRef) {
        *self.default.write() = Some(adapter);
    }

    /// Find the adapter for an entity type, falling back to the default.
    pub fn resolve(&self, entity_type: &str) -> Result<AdapterRef, PipelineError> {
        if let Some(adapter) = self.adapters.read().get(entity_type) {
            return Ok(adapter.clone());
        }
        self.default
            .read()
            .clone()
            .ok_or_else(|| PipelineError::AdapterNotFound(entity_type.to_string()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::MemoryStore;

    #[test]
    fn test_resolve_registered_and_default() {
        let registry = AdapterRegistry::new();
        assert!(matches!(
            registry.resolve("Article"),
            Err(PipelineError::AdapterNotFound(t)) if t == "Article"
        ));

        registry.register_store(Arc::new(MemoryStore::new("Article")));
        assert_eq!(registry.resolve("Article").unwrap().name(), "store:Article");
        assert!(registry.resolve("Comment").is_err());

        registry.set_default(Arc::new(StoreAdapter::new(Arc::new(MemoryStore::new("Any")))));
        assert_eq!(registry.resolve("Comment").unwrap().name(), "store:Any");
    }
}
