//! Indexed entity types and the process-wide registry of them.

use std::sync::{Arc, OnceLock};

use chrono::{DateTime, Utc};
use parking_lot::RwLock;
use tracing::info;

use crate::adapter::{AdapterRef, AdapterRegistry};
use crate::errors::PipelineError;
use crate::options::ReindexOptions;
use crate::record::Record;
use crate::reindex::{ReindexReport, Reindexer};
use crate::strategy::{base_index_name, IndexAction, Strategy, StrategyConfig};
use search_sync_repository::SearchBackend;

pub const DEFAULT_STRATEGY: &str = "default";

/// One entity type made searchable, with its named strategies.
///
/// Strategies are append-only and their names are unique within the type.
pub struct IndexedType {
    name: String,
    base_index_name: String,
    client: Arc<dyn SearchBackend>,
    adapter: AdapterRef,
    strategies: RwLock<Vec<Arc<Strategy>>>,
}

impl std::fmt::Debug for IndexedType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("IndexedType")
            .field("name", &self.name)
            .field("base_index_name", &self.base_index_name)
            .field("adapter", &self.adapter.name())
            .field(
                "strategies",
                &self
                    .strategies
                    .read()
                    .iter()
                    .map(|s| s.name().to_string())
                    .collect::<Vec<_>>(),
            )
            .finish()
    }
}

impl IndexedType {
    /// Resolve the adapter for `name` once and keep it.
    pub fn new(
        name: impl Into<String>,
        client: Arc<dyn SearchBackend>,
        adapters: &AdapterRegistry,
    ) -> Result<Self, PipelineError> {
        let name = name.into();
        let adapter = adapters.resolve(&name)?;
        Ok(Self::with_adapter(name, client, adapter))
    }

    pub fn with_adapter(
        name: impl Into<String>,
        client: Arc<dyn SearchBackend>,
        adapter: AdapterRef,
    ) -> Self {
        let name = name.into();
        Self {
            base_index_name: base_index_name(&name),
            name,
            client,
            adapter,
            strategies: RwLock::new(Vec::new()),
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn base_index_name(&self) -> &str {
        &self.base_index_name
    }

    pub fn client(&self) -> &Arc<dyn SearchBackend> {
        &self.client
    }

    pub fn adapter(&self) -> &AdapterRef {
        &self.adapter
    }

    /// Add a strategy, configured from the type's defaults.
    pub fn register_strategy<F>(&self, name: &str, configure: F) -> Result<Arc<Strategy>, PipelineError>
    where
        F: FnOnce(&mut StrategyConfig),
    {
        let mut strategies = self.strategies.write();
        if strategies.iter().any(|s| s.name() == name) {
            return Err(PipelineError::config(format!(
                "strategy '{}' is already registered for '{}'",
                name, self.name
            )));
        }

        let mut config = StrategyConfig::new(self.base_index_name.as_str());
        configure(&mut config);
        let strategy = Arc::new(Strategy::new(
            name,
            self.name.as_str(),
            self.client.clone(),
            self.adapter.clone(),
            config,
        ));
        strategies.push(strategy.clone());
        info!(entity_type = %self.name, strategy = name, "Strategy registered");
        Ok(strategy)
    }

    /// Reconfigure an existing strategy.
    pub fn update_strategy<F>(&self, name: &str, configure: F) -> Result<Arc<Strategy>, PipelineError>
    where
        F: FnOnce(&mut StrategyConfig),
    {
        let strategy = self.strategy(name).ok_or_else(|| {
            PipelineError::config(format!("unknown strategy '{}' for '{}'", name, self.name))
        })?;
        strategy.configure(configure);
        Ok(strategy)
    }

    pub fn strategy(&self, name: &str) -> Option<Arc<Strategy>> {
        self.strategies
            .read()
            .iter()
            .find(|s| s.name() == name)
            .cloned()
    }

    /// Snapshot of the registered strategies, in registration order.
    pub fn strategies(&self) -> Vec<Arc<Strategy>> {
        self.strategies.read().clone()
    }

    /// The strategy named `default`, else the first registered one.
    pub fn default_strategy(&self) -> Option<Arc<Strategy>> {
        let strategies = self.strategies.read();
        strategies
            .iter()
            .find(|s| s.name() == DEFAULT_STRATEGY)
            .or_else(|| strategies.first())
            .cloned()
    }

    fn reindexer(&self) -> Reindexer {
        Reindexer::new(self.strategies())
    }

    pub async fn create_indices(
        &self,
        start: Option<DateTime<Utc>>,
        end: Option<DateTime<Utc>>,
        force: bool,
    ) -> Result<Vec<String>, PipelineError> {
        self.reindexer().create_indices(start, end, force).await
    }

    pub async fn reload_indices(&self, options: ReindexOptions) -> Result<ReindexReport, PipelineError> {
        self.reindexer().reload_indices(options).await
    }

    /// Indices of every strategy, de-duplicated.
    pub async fn all_indices(
        &self,
        start: Option<DateTime<Utc>>,
        end: Option<DateTime<Utc>>,
        from_api: bool,
    ) -> Result<Vec<String>, PipelineError> {
        let mut indices = Vec::new();
        for strategy in self.strategies() {
            for index in strategy.all_indices(start, end, from_api).await? {
                if !indices.contains(&index) {
                    indices.push(index);
                }
            }
        }
        Ok(indices)
    }

    /// Apply one record change through every strategy.
    pub async fn index_record_with_all_strategies(
        &self,
        action: IndexAction,
        record: &dyn Record,
    ) -> Result<(), PipelineError> {
        for strategy in self.strategies() {
            strategy.index_record(action, record).await?;
        }
        Ok(())
    }
}

/// Process-wide, append-only list of indexed types.
#[derive(Debug, Default)]
pub struct TypeRegistry {
    types: RwLock<Vec<Arc<IndexedType>>>,
}

impl TypeRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// The global registry.
    pub fn global() -> &'static TypeRegistry {
        static GLOBAL: OnceLock<TypeRegistry> = OnceLock::new();
        GLOBAL.get_or_init(TypeRegistry::new)
    }

    /// Register a type. A type already registered under the same name is
    /// kept and returned instead.
    pub fn add(&self, indexed_type: Arc<IndexedType>) -> Arc<IndexedType> {
        let mut types = self.types.write();
        if let Some(existing) = types.iter().find(|t| t.name() == indexed_type.name()) {
            return existing.clone();
        }
        types.push(indexed_type.clone());
        indexed_type
    }

    /// Snapshot of every registered type.
    pub fn all(&self) -> Vec<Arc<IndexedType>> {
        self.types.read().clone()
    }

    pub fn get(&self, name: &str) -> Option<Arc<IndexedType>> {
        self.types.read().iter().find(|t| t.name() == name).cloned()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::strategy::Partition;
    use crate::test_support::{article, article_store, Article};
    use search_sync_repository::InMemoryBackend;

    fn article_type(backend: Arc<InMemoryBackend>, records: Vec<Article>) -> IndexedType {
        let adapters = AdapterRegistry::new();
        adapters.register_store(article_store(records));
        IndexedType::new("Article", backend, &adapters).unwrap()
    }

    #[test]
    fn test_missing_adapter_fails_at_registration() {
        let adapters = AdapterRegistry::new();
        let result = IndexedType::new("Article", Arc::new(InMemoryBackend::new()), &adapters);
        assert!(matches!(result, Err(PipelineError::AdapterNotFound(_))));
    }

    #[test]
    fn test_strategy_names_are_unique() {
        let indexed = article_type(Arc::new(InMemoryBackend::new()), Vec::new());
        assert_eq!(indexed.base_index_name(), "articles");

        indexed.register_strategy("default", |_| {}).unwrap();
        let duplicate = indexed.register_strategy("default", |_| {});
        assert!(matches!(duplicate, Err(PipelineError::ConfigError(_))));
        assert_eq!(indexed.strategies().len(), 1);
    }

    #[test]
    fn test_update_strategy_replaces_behaviour() {
        let indexed = article_type(Arc::new(InMemoryBackend::new()), Vec::new());
        indexed.register_strategy("default", |_| {}).unwrap();

        let unknown = indexed.update_strategy("archive", |_| {});
        assert!(matches!(unknown, Err(PipelineError::ConfigError(_))));

        let updated = indexed
            .update_strategy("default", |config| {
                config.set_target_index_name(|_| Ok("articles-v2".to_string()));
            })
            .unwrap();
        assert_eq!(updated.config().target_index_name(None).unwrap(), "articles-v2");
        assert_eq!(
            indexed.strategy("default").unwrap().config().target_index_name(None).unwrap(),
            "articles-v2"
        );
    }

    #[test]
    fn test_default_strategy_falls_back_to_first() {
        let indexed = article_type(Arc::new(InMemoryBackend::new()), Vec::new());
        assert!(indexed.default_strategy().is_none());

        indexed.register_strategy("archive", |_| {}).unwrap();
        assert_eq!(indexed.default_strategy().unwrap().name(), "archive");

        indexed.register_strategy("default", |_| {}).unwrap();
        assert_eq!(indexed.default_strategy().unwrap().name(), "default");
    }

    #[tokio::test]
    async fn test_reload_and_index_through_every_strategy() {
        let backend = Arc::new(InMemoryBackend::new());
        let indexed = article_type(backend.clone(), vec![article(1, "a"), article(2, "b")]);
        indexed.register_strategy("default", |_| {}).unwrap();
        indexed
            .register_strategy("archive", |config| {
                config.set_partitions(|_, _, _| Ok(vec![Partition::whole("articles-archive")]));
                config.set_target_index_name(|_| Ok("articles-archive".to_string()));
            })
            .unwrap();

        let report = indexed.reload_indices(ReindexOptions::default()).await.unwrap();
        assert_eq!(report.total_documents(), 4);
        assert_eq!(
            indexed.all_indices(None, None, false).await.unwrap(),
            vec!["articles", "articles-archive"]
        );

        indexed
            .index_record_with_all_strategies(IndexAction::Create, &article(3, "c"))
            .await
            .unwrap();
        assert_eq!(backend.documents("articles").len(), 3);
        assert_eq!(backend.documents("articles-archive").len(), 3);

        assert!(indexed.create_indices(None, None, false).await.unwrap().is_empty());
    }

    #[test]
    fn test_registry_add_is_idempotent() {
        let registry = TypeRegistry::new();
        let backend = Arc::new(InMemoryBackend::new());
        let first = registry.add(Arc::new(article_type(backend.clone(), Vec::new())));
        let second = registry.add(Arc::new(article_type(backend, Vec::new())));

        assert!(Arc::ptr_eq(&first, &second));
        assert_eq!(registry.all().len(), 1);
        assert!(registry.get("Article").is_some());
        assert!(registry.get("Comment").is_none());
    }

    #[test]
    fn test_global_registry_is_shared() {
        assert!(std::ptr::eq(TypeRegistry::global(), TypeRegistry::global()));
    }
}
