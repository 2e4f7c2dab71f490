//! Overridable strategy behaviour.

use std::fmt;
use std::sync::Arc;

use chrono::{DateTime, Utc};
use serde_json::Value;

use super::naming::short_type_name;
use super::partition::Partition;
use crate::errors::PipelineError;
use crate::record::Record;
use crate::store::PreloadRef;
use search_sync_repository::{IndexSchema, Mappings, Settings};

pub type IndexNameFn =
    Arc<dyn Fn(Option<&dyn Record>) -> Result<String, PipelineError> + Send + Sync>;
pub type IndexNamesFn = Arc<dyn Fn() -> Vec<String> + Send + Sync>;
pub type NameFn = Arc<dyn Fn() -> String + Send + Sync>;
pub type SerializeFn = Arc<dyn Fn(&dyn Record) -> Result<Value, PipelineError> + Send + Sync>;
pub type DocumentIdFn =
    Arc<dyn Fn(&dyn Record) -> Result<Option<String>, PipelineError> + Send + Sync>;
pub type PartitionsFn = Arc<
    dyn Fn(
            &StrategyConfig,
            Option<DateTime<Utc>>,
            Option<DateTime<Utc>>,
        ) -> Result<Vec<Partition>, PipelineError>
        + Send
        + Sync,
>;

fn downcast<T: Record>(record: &dyn Record) -> Result<&T, PipelineError> {
    record.downcast_ref::<T>().ok_or_else(|| {
        PipelineError::serialization(format!(
            "expected a {} record, got {:?}",
            short_type_name::<T>(),
            record
        ))
    })
}

/// Every behaviour of a strategy that callers may override.
///
/// A configuration is immutable once installed on a strategy; changes go
/// through [`super::Strategy::configure`], which swaps in an edited copy.
#[derive(Clone)]
pub struct StrategyConfig {
    base_index_name: String,
    target_index_name: IndexNameFn,
    search_index_names: IndexNamesFn,
    current_index_name: NameFn,
    serialize: SerializeFn,
    reindex_serialize: Option<SerializeFn>,
    custom_document_id: Option<DocumentIdFn>,
    index_without_id: bool,
    partitions: Option<PartitionsFn>,
    reindex_preload: Option<PreloadRef>,
    mappings: Mappings,
    settings: Settings,
}

impl fmt::Debug for StrategyConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("StrategyConfig")
            .field("base_index_name", &self.base_index_name)
            .field("index_without_id", &self.index_without_id)
            .field("custom_document_id", &self.custom_document_id.is_some())
            .field("partitioned", &self.partitions.is_some())
            .field("mappings", &self.mappings)
            .field("settings", &self.settings)
            .finish()
    }
}

impl StrategyConfig {
    /// Default behaviour: every name is the base index name and records are
    /// serialized with [`Record::document`].
    pub fn new(base_index_name: impl Into<String>) -> Self {
        let base: String = base_index_name.into();
        let target = base.clone();
        let search = base.clone();
        let current = base.clone();
        Self {
            base_index_name: base,
            target_index_name: Arc::new(
                move |_: Option<&dyn Record>| -> Result<String, PipelineError> {
                    Ok(target.clone())
                },
            ),
            search_index_names: Arc::new(move || vec![search.clone()]),
            current_index_name: Arc::new(move || current.clone()),
            serialize: Arc::new(|record: &dyn Record| -> Result<Value, PipelineError> {
                Ok(record.document()?)
            }),
            reindex_serialize: None,
            custom_document_id: None,
            index_without_id: false,
            partitions: None,
            reindex_preload: None,
            mappings: Mappings::default(),
            settings: Settings::default(),
        }
    }

    pub fn base_index_name(&self) -> &str {
        &self.base_index_name
    }

    /// Index that should receive `record`; `None` asks for the default target.
    pub fn target_index_name(&self, record: Option<&dyn Record>) -> Result<String, PipelineError> {
        (self.target_index_name)(record)
    }

    /// Index names or patterns queried for reads.
    pub fn search_index_names(&self) -> Vec<String> {
        (self.search_index_names)()
    }

    pub fn current_index_name(&self) -> String {
        (self.current_index_name)()
    }

    pub fn serialize(&self, record: &dyn Record) -> Result<Value, PipelineError> {
        (self.serialize)(record)
    }

    /// Serialization used by bulk imports; falls back to [`Self::serialize`].
    pub fn reindex_serialize(&self, record: &dyn Record) -> Result<Value, PipelineError> {
        match &self.reindex_serialize {
            Some(serialize) => serialize(record),
            None => self.serialize(record),
        }
    }

    /// Document id for `record`. `None` lets the backend generate one.
    pub fn document_id(&self, record: &dyn Record) -> Result<Option<String>, PipelineError> {
        if self.index_without_id {
            return Ok(None);
        }
        match &self.custom_document_id {
            Some(document_id) => document_id(record),
            None => Ok(Some(record.record_id())),
        }
    }

    pub fn index_without_id(&self) -> bool {
        self.index_without_id
    }

    /// Partitions covering `start..end`. Defaults to a single partition on
    /// the default target index.
    pub fn partitions(
        &self,
        start: Option<DateTime<Utc>>,
        end: Option<DateTime<Utc>>,
    ) -> Result<Vec<Partition>, PipelineError> {
        match &self.partitions {
            Some(partitions) => partitions(self, start, end),
            None => Ok(vec![
                Partition::whole(self.target_index_name(None)?).with_range(start, end)
            ]),
        }
    }

    pub fn is_partitioned(&self) -> bool {
        self.partitions.is_some()
    }

    pub fn reindex_preload(&self) -> Option<&PreloadRef> {
        self.reindex_preload.as_ref()
    }

    pub fn mappings(&self) -> &Mappings {
        &self.mappings
    }

    pub fn settings(&self) -> &Settings {
        &self.settings
    }

    /// Materialised schema.
    pub fn schema(&self) -> IndexSchema {
        IndexSchema::new(self.settings.to_value(), self.mappings.to_value())
    }

    pub fn set_target_index_name<F>(&mut self, f: F) -> &mut Self
    where
        F: Fn(Option<&dyn Record>) -> Result<String, PipelineError> + Send + Sync + 'static,
    {
        self.target_index_name = Arc::new(f);
        self
    }

    /// Typed [`Self::set_target_index_name`]; `None` is passed when no record
    /// is involved.
    pub fn target_index_as<T, F>(&mut self, f: F) -> &mut Self
    where
        T: Record,
        F: Fn(Option<&T>) -> Result<String, PipelineError> + Send + Sync + 'static,
    {
        self.target_index_name = Arc::new(move |record: Option<&dyn Record>| match record {
            Some(record) => f(Some(downcast::<T>(record)?)),
            None => f(None),
        });
        self
    }

    pub fn set_search_index_names<F>(&mut self, f: F) -> &mut Self
    where
        F: Fn() -> Vec<String> + Send + Sync + 'static,
    {
        self.search_index_names = Arc::new(f);
        self
    }

    pub fn set_current_index_name<F>(&mut self, f: F) -> &mut Self
    where
        F: Fn() -> String + Send + Sync + 'static,
    {
        self.current_index_name = Arc::new(f);
        self
    }

    pub fn set_serializer<F>(&mut self, f: F) -> &mut Self
    where
        F: Fn(&dyn Record) -> Result<Value, PipelineError> + Send + Sync + 'static,
    {
        self.serialize = Arc::new(f);
        self
    }

    pub fn serialize_as<T, F>(&mut self, f: F) -> &mut Self
    where
        T: Record,
        F: Fn(&T) -> Result<Value, PipelineError> + Send + Sync + 'static,
    {
        self.serialize = Arc::new(move |record: &dyn Record| f(downcast::<T>(record)?));
        self
    }

    pub fn set_reindex_serializer<F>(&mut self, f: F) -> &mut Self
    where
        F: Fn(&dyn Record) -> Result<Value, PipelineError> + Send + Sync + 'static,
    {
        self.reindex_serialize = Some(Arc::new(f));
        self
    }

    pub fn reindex_serialize_as<T, F>(&mut self, f: F) -> &mut Self
    where
        T: Record,
        F: Fn(&T) -> Result<Value, PipelineError> + Send + Sync + 'static,
    {
        self.reindex_serialize =
            Some(Arc::new(move |record: &dyn Record| f(downcast::<T>(record)?)));
        self
    }

    pub fn set_document_id<F>(&mut self, f: F) -> &mut Self
    where
        F: Fn(&dyn Record) -> Result<Option<String>, PipelineError> + Send + Sync + 'static,
    {
        self.custom_document_id = Some(Arc::new(f));
        self
    }

    pub fn document_id_as<T, F>(&mut self, f: F) -> &mut Self
    where
        T: Record,
        F: Fn(&T) -> Option<String> + Send + Sync + 'static,
    {
        self.custom_document_id =
            Some(Arc::new(move |record: &dyn Record| Ok(f(downcast::<T>(record)?))));
        self
    }

    pub fn set_index_without_id(&mut self, index_without_id: bool) -> &mut Self {
        self.index_without_id = index_without_id;
        self
    }

    pub fn set_partitions<F>(&mut self, f: F) -> &mut Self
    where
        F: Fn(
                &StrategyConfig,
                Option<DateTime<Utc>>,
                Option<DateTime<Utc>>,
            ) -> Result<Vec<Partition>, PipelineError>
            + Send
            + Sync
            + 'static,
    {
        self.partitions = Some(Arc::new(f));
        self
    }

    pub fn set_reindex_preload(&mut self, preload: Option<PreloadRef>) -> &mut Self {
        self.reindex_preload = preload;
        self
    }

    pub fn mappings_mut(&mut self) -> &mut Mappings {
        &mut self.mappings
    }

    pub fn settings_mut(&mut self) -> &mut Settings {
        &mut self.settings
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_support::{article, comment, Article};
    use serde_json::json;

    #[test]
    fn test_defaults() {
        let config = StrategyConfig::new("articles");
        let record = article(7, "Hello");

        assert_eq!(config.target_index_name(Some(&record)).unwrap(), "articles");
        assert_eq!(config.search_index_names(), vec!["articles"]);
        assert_eq!(config.current_index_name(), "articles");
        assert_eq!(config.document_id(&record).unwrap(), Some("00007".to_string()));
        assert_eq!(config.serialize(&record).unwrap()["title"], "Hello");
        assert_eq!(config.partitions(None, None).unwrap().len(), 1);
    }

    #[test]
    fn test_typed_overrides() {
        let mut config = StrategyConfig::new("articles");
        config
            .serialize_as::<Article, _>(|a| Ok(json!({ "headline": a.title.to_uppercase() })))
            .document_id_as::<Article, _>(|a| Some(format!("article-{}", a.id)))
            .target_index_as::<Article, _>(|a| {
                Ok(match a {
                    Some(a) if a.id > 100 => "articles-archive".to_string(),
                    _ => "articles".to_string(),
                })
            });

        let record = article(101, "Hello");
        assert_eq!(config.serialize(&record).unwrap(), json!({ "headline": "HELLO" }));
        assert_eq!(config.reindex_serialize(&record).unwrap(), json!({ "headline": "HELLO" }));
        assert_eq!(config.document_id(&record).unwrap(), Some("article-101".to_string()));
        assert_eq!(config.target_index_name(Some(&record)).unwrap(), "articles-archive");
        assert_eq!(config.target_index_name(None).unwrap(), "articles");
    }

    #[test]
    fn test_type_mismatch_is_serialization_error() {
        let mut config = StrategyConfig::new("articles");
        config.serialize_as::<Article, _>(|a| Ok(json!({ "title": a.title })));

        let result = config.serialize(&comment(1, "Nope"));
        assert!(matches!(result, Err(PipelineError::SerializationError(_))));
    }

    #[test]
    fn test_index_without_id_wins_over_custom_id() {
        let mut config = StrategyConfig::new("events");
        config
            .document_id_as::<Article, _>(|a| Some(a.id.to_string()))
            .set_index_without_id(true);

        assert_eq!(config.document_id(&article(1, "x")).unwrap(), None);
    }

    #[test]
    fn test_schema_reflects_mappings_and_settings() {
        let mut config = StrategyConfig::new("articles");
        config.mappings_mut().indexes("title", json!({}));
        config
            .settings_mut()
            .update(json!({ "index": { "refresh_interval": "1s" } }));

        let schema = config.schema();
        assert_eq!(schema.mappings["properties"]["title"]["type"], "text");
        assert_eq!(schema.settings["index"]["refresh_interval"], "1s");
    }
}
