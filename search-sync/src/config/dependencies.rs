//! Dependency initialization and wiring for the sync process.

use std::sync::Arc;
use tracing::info;

use crate::config::SyncConfig;
use crate::SyncError;
use search_sync_pipeline::{
    AdapterRegistry, IndexedType, RecordStore, ReindexReport, TypeRegistry,
};
use search_sync_repository::{OpenSearchClient, SearchBackend};

/// Container for all initialized dependencies.
pub struct Dependencies {
    pub config: SyncConfig,
    /// The search client every indexed type is bound to.
    pub client: Arc<dyn SearchBackend>,
    pub adapters: AdapterRegistry,
    types: &'static TypeRegistry,
}

impl Dependencies {
    /// Initialize all dependencies from environment variables.
    ///
    /// See [`SyncConfig`] for the variables read.
    ///
    /// # Returns
    ///
    /// * `Ok(Dependencies)` - Initialized dependencies
    /// * `Err(SyncError)` - If the configuration is invalid or OpenSearch is unreachable
    pub async fn new() -> Result<Self, SyncError> {
        let config = SyncConfig::from_env()?;
        Self::from_config(config).await
    }

    /// Build the OpenSearch client for `config` and verify the cluster.
    pub async fn from_config(config: SyncConfig) -> Result<Self, SyncError> {
        info!(
            opensearch_url = %config.opensearch.url,
            batch_size = config.batch_size,
            "Initializing dependencies"
        );

        let search_client = OpenSearchClient::new(&config.opensearch).map_err(|e| {
            SyncError::config(format!("Failed to create OpenSearch client: {}", e))
        })?;

        Self::with_backend(config, Arc::new(search_client)).await
    }

    /// Wire an already-built backend, health-checking it first.
    pub async fn with_backend(
        config: SyncConfig,
        client: Arc<dyn SearchBackend>,
    ) -> Result<Self, SyncError> {
        let healthy = client
            .health_check()
            .await
            .map_err(|e| SyncError::config(format!("OpenSearch health check failed: {}", e)))?;

        if !healthy {
            return Err(SyncError::config("OpenSearch cluster is unhealthy"));
        }

        info!("OpenSearch connection verified");

        Ok(Self {
            config,
            client,
            adapters: AdapterRegistry::new(),
            types: TypeRegistry::global(),
        })
    }

    /// Use `types` instead of the global registry.
    pub fn with_type_registry(mut self, types: &'static TypeRegistry) -> Self {
        self.types = types;
        self
    }

    pub fn types(&self) -> &'static TypeRegistry {
        self.types
    }

    /// Make a record store available to the types registered after it.
    pub fn register_store(&self, store: Arc<dyn RecordStore>) {
        let entity_type = store.entity_type().to_string();
        self.adapters.register_store(store);
        info!(entity_type = %entity_type, "Record store registered");
    }

    /// Register an entity type against the shared client. Registering a
    /// name twice returns the existing type.
    pub fn indexed_type(&self, name: &str) -> Result<Arc<IndexedType>, SyncError> {
        if let Some(existing) = self.types.get(name) {
            return Ok(existing);
        }
        let indexed = IndexedType::new(name, self.client.clone(), &self.adapters)?;
        Ok(self.types.add(Arc::new(indexed)))
    }

    /// Rebuild every registered type with the configured reindex options.
    pub async fn reindex_all(&self) -> Result<Vec<ReindexReport>, SyncError> {
        let mut reports = Vec::new();
        for indexed in self.types.all() {
            let report = indexed.reload_indices(self.config.reindex_options()).await?;
            info!(
                entity_type = %indexed.name(),
                documents = report.total_documents(),
                errors = report.total_errors(),
                "Type reindexed"
            );
            reports.push(report);
        }
        Ok(reports)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use search_sync_pipeline::{MemoryStore, PipelineError, Record, RecordRef};
    use search_sync_repository::InMemoryBackend;
    use serde_json::{json, Value};

    #[derive(Debug)]
    struct Page {
        id: u64,
    }

    impl Record for Page {
        fn record_id(&self) -> String {
            self.id.to_string()
        }

        fn document(&self) -> Result<Value, serde_json::Error> {
            Ok(json!({ "id": self.id, "type": "Page" }))
        }
    }

    fn isolated_types() -> &'static TypeRegistry {
        Box::leak(Box::new(TypeRegistry::new()))
    }

    async fn dependencies(backend: Arc<InMemoryBackend>) -> Dependencies {
        Dependencies::with_backend(SyncConfig::default(), backend)
            .await
            .unwrap()
            .with_type_registry(isolated_types())
    }

    #[tokio::test]
    async fn test_invalid_url_is_config_error() {
        let mut config = SyncConfig::default();
        config.opensearch.url = "not a url".to_string();

        let result = Dependencies::from_config(config).await;
        assert!(matches!(result, Err(SyncError::ConfigError(_))));
    }

    #[tokio::test]
    async fn test_unknown_type_needs_a_store() {
        let deps = dependencies(Arc::new(InMemoryBackend::new())).await;

        let result = deps.indexed_type("Page");
        assert!(matches!(
            result,
            Err(SyncError::PipelineError(PipelineError::AdapterNotFound(_)))
        ));
    }

    #[tokio::test]
    async fn test_reindex_all_registered_types() {
        let backend = Arc::new(InMemoryBackend::new());
        let deps = dependencies(backend.clone()).await;

        let pages: Vec<RecordRef> = (1..=3)
            .map(|id| Arc::new(Page { id }) as RecordRef)
            .collect();
        deps.register_store(Arc::new(MemoryStore::with_records("Page", pages)));

        let pages = deps.indexed_type("Page").unwrap();
        assert!(Arc::ptr_eq(&pages, &deps.indexed_type("Page").unwrap()));
        pages.register_strategy("default", |_| {}).unwrap();

        let reports = deps.reindex_all().await.unwrap();
        assert_eq!(reports.len(), 1);
        assert_eq!(reports[0].total_documents(), 3);
        assert_eq!(backend.documents("pages").len(), 3);
        assert_eq!(deps.types().all().len(), 1);
    }
}
