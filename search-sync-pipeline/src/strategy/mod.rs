//! Index strategies.
//!
//! A strategy is one indexing policy for one entity type: where records are
//! written, where reads go, how records become documents and which schema
//! the index is created with. Its behaviour lives in a [`StrategyConfig`]
//! that is swapped wholesale by [`Strategy::configure`].

mod config;
mod naming;
mod partition;

pub use config::{
    DocumentIdFn, IndexNameFn, IndexNamesFn, NameFn, PartitionsFn, SerializeFn, StrategyConfig,
};
pub use naming::{base_index_name, short_type_name};
pub use partition::Partition;

use std::sync::Arc;

use chrono::{DateTime, Utc};
use parking_lot::RwLock;
use tracing::{debug, info, instrument};

use crate::adapter::AdapterRef;
use crate::errors::PipelineError;
use crate::options::SearchOptions;
use crate::record::Record;
use crate::response::{SearchResponse, SearchTarget};
use search_sync_repository::{BulkOperation, IndexSchema, SearchBackend, SearchError};
use search_sync_shared::SearchQuery;

/// Parameters of [`Strategy::create_index`].
#[derive(Debug, Clone, Default)]
pub struct CreateIndex {
    /// Index to create; defaults to the strategy's default target index.
    pub index: Option<String>,
    /// Delete and recreate the index if it already exists.
    pub force: bool,
    /// Schema to create the index with; defaults to the strategy schema.
    pub schema: Option<IndexSchema>,
}

impl CreateIndex {
    pub fn named(index: impl Into<String>) -> Self {
        Self {
            index: Some(index.into()),
            ..Self::default()
        }
    }

    pub fn with_force(mut self, force: bool) -> Self {
        self.force = force;
        self
    }

    pub fn with_schema(mut self, schema: Option<IndexSchema>) -> Self {
        self.schema = schema;
        self
    }
}

/// What [`Strategy::index_record`] does with a record.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum IndexAction {
    /// Write the full document, replacing any existing one.
    Create,
    /// Merge the document into an existing one, creating it if missing.
    Update,
    /// Remove the document.
    Delete,
}

pub struct Strategy {
    name: String,
    entity_type: String,
    client: Arc<dyn SearchBackend>,
    adapter: AdapterRef,
    config: RwLock<Arc<StrategyConfig>>,
}

impl std::fmt::Debug for Strategy {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Strategy")
            .field("name", &self.name)
            .field("entity_type", &self.entity_type)
            .field("adapter", &self.adapter.name())
            .field("config", &*self.config.read())
            .finish()
    }
}

impl Strategy {
    pub fn new(
        name: impl Into<String>,
        entity_type: impl Into<String>,
        client: Arc<dyn SearchBackend>,
        adapter: AdapterRef,
        config: StrategyConfig,
    ) -> Self {
        Self {
            name: name.into(),
            entity_type: entity_type.into(),
            client,
            adapter,
            config: RwLock::new(Arc::new(config)),
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn entity_type(&self) -> &str {
        &self.entity_type
    }

    pub fn client(&self) -> &Arc<dyn SearchBackend> {
        &self.client
    }

    pub fn adapter(&self) -> &AdapterRef {
        &self.adapter
    }

    /// Snapshot of the live configuration.
    pub fn config(&self) -> Arc<StrategyConfig> {
        self.config.read().clone()
    }

    /// Replace behaviour. The closure edits a copy of the live configuration,
    /// which is then swapped in; operations already running keep their
    /// snapshot.
    ///
    /// Not meant to race with in-flight imports of the same strategy: callers
    /// serialize configuration changes.
    pub fn configure<F>(&self, f: F)
    where
        F: FnOnce(&mut StrategyConfig),
    {
        let mut next = (*self.config()).clone();
        f(&mut next);
        *self.config.write() = Arc::new(next);
        debug!(strategy = %self.name, entity_type = %self.entity_type, "Strategy reconfigured");
    }

    /// Create an index with the strategy schema.
    ///
    /// Returns `false` when the index already existed and `force` is off.
    #[instrument(skip(self, request), fields(strategy = %self.name))]
    pub async fn create_index(&self, request: CreateIndex) -> Result<bool, PipelineError> {
        let config = self.config();
        let index = match request.index {
            Some(index) => index,
            None => config.target_index_name(None)?,
        };

        if self.client.index_exists(&index).await? {
            if !request.force {
                debug!(index = %index, "Index already exists");
                return Ok(false);
            }
            info!(index = %index, "Deleting index before recreating it");
            self.client.delete_index(&index).await?;
        }

        let schema = request.schema.unwrap_or_else(|| config.schema());
        self.client.create_index(&index, &schema.body()).await?;
        info!(index = %index, "Index created");
        Ok(true)
    }

    /// Delete an index, the default target when `index` is `None`.
    /// A missing index is not an error.
    pub async fn delete_index(&self, index: Option<&str>) -> Result<bool, PipelineError> {
        let index = self.resolve_index(index)?;
        let deleted = self.client.delete_index(&index).await?;
        if deleted {
            info!(index = %index, strategy = %self.name, "Index deleted");
        }
        Ok(deleted)
    }

    pub async fn index_exists(&self, index: Option<&str>) -> Result<bool, PipelineError> {
        let index = self.resolve_index(index)?;
        Ok(self.client.index_exists(&index).await?)
    }

    /// Refresh an index. A missing index is not an error.
    pub async fn refresh_index(&self, index: Option<&str>) -> Result<(), PipelineError> {
        let index = self.resolve_index(index)?;
        match self.client.refresh_index(&index).await {
            Ok(()) => Ok(()),
            Err(e) if e.is_index_not_found() => {
                debug!(index = %index, "Skipping refresh of missing index");
                Ok(())
            }
            Err(e) => Err(e.into()),
        }
    }

    /// Every index this strategy manages, either from its partition iterator
    /// or, with `from_api`, from the backend's listing of the read patterns.
    pub async fn all_indices(
        &self,
        start: Option<DateTime<Utc>>,
        end: Option<DateTime<Utc>>,
        from_api: bool,
    ) -> Result<Vec<String>, PipelineError> {
        let config = self.config();
        let mut indices = Vec::new();
        if from_api {
            for pattern in config.search_index_names() {
                for index in self.client.list_indices(&pattern).await? {
                    if !indices.contains(&index) {
                        indices.push(index);
                    }
                }
            }
        } else {
            for partition in config.partitions(start, end)? {
                if !indices.contains(&partition.index) {
                    indices.push(partition.index);
                }
            }
        }
        Ok(indices)
    }

    /// Write or delete the document of one record in its target index.
    #[instrument(skip(self, record), fields(strategy = %self.name, id = %record.record_id()))]
    pub async fn index_record(
        &self,
        action: IndexAction,
        record: &dyn Record,
    ) -> Result<(), PipelineError> {
        let config = self.config();
        let index = config.target_index_name(Some(record))?;
        let id = config.document_id(record)?;

        match action {
            IndexAction::Create => {
                let body = config.serialize(record)?;
                self.client.index_document(&index, id.as_deref(), &body).await?;
            }
            IndexAction::Update => {
                let body = config.serialize(record)?;
                match id {
                    Some(id) => {
                        let response = self
                            .client
                            .bulk(&index, &[BulkOperation::upsert(id, body)], None)
                            .await?;
                        if let Some(item) = response.error_items().into_iter().next() {
                            return Err(SearchError::bulk_index(format!(
                                "update of '{}' in '{}' failed: {}",
                                item.id.unwrap_or_default(),
                                index,
                                item.error
                            ))
                            .into());
                        }
                    }
                    None => self.client.index_document(&index, None, &body).await?,
                }
            }
            IndexAction::Delete => {
                let id = id.ok_or_else(|| {
                    PipelineError::config(format!(
                        "strategy '{}' indexes without ids; records cannot be deleted",
                        self.name
                    ))
                })?;
                self.client.delete_document(&index, &id).await?;
            }
        }

        debug!(index = %index, action = ?action, "Record indexed");
        Ok(())
    }

    /// Search the strategy's read indices. The response is lazy: nothing is
    /// sent until one of its accessors is awaited.
    pub fn search(self: &Arc<Self>, query: impl Into<SearchQuery>, options: SearchOptions) -> SearchResponse {
        SearchResponse::new(SearchTarget::Strategy(self.clone()), query.into(), options)
    }

    fn resolve_index(&self, index: Option<&str>) -> Result<String, PipelineError> {
        match index {
            Some(index) => Ok(index.to_string()),
            None => self.config().target_index_name(None),
        }
    }
}
