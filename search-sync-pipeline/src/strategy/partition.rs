//! Index partitions.

use chrono::{DateTime, Utc};
use serde_json::{json, Value};

use crate::errors::PipelineError;
use crate::record::Scope;
use search_sync_repository::IndexSchema;

/// One physical index a strategy writes to during a reindex, together with
/// the slice of the corpus that belongs in it.
///
/// Strategies without time-based sharding have exactly one partition that
/// covers the whole corpus.
#[derive(Debug, Clone)]
pub struct Partition {
    pub index: String,
    pub scope: Scope,
    /// Overrides the strategy schema for this index.
    pub schema: Option<IndexSchema>,
    /// Search-side query matching the same records as `scope`.
    pub verify_count_query: Option<Value>,
    pub start: Option<DateTime<Utc>>,
    pub end: Option<DateTime<Utc>>,
}

impl Partition {
    /// A partition covering every record of the strategy.
    pub fn whole(index: impl Into<String>) -> Self {
        Self {
            index: index.into(),
            scope: Scope::all(),
            schema: None,
            verify_count_query: Some(json!({ "query": { "match_all": {} } })),
            start: None,
            end: None,
        }
    }

    pub fn with_scope(mut self, scope: Scope) -> Self {
        self.scope = scope;
        self
    }

    pub fn with_schema(mut self, schema: IndexSchema) -> Self {
        self.schema = Some(schema);
        self
    }

    pub fn with_verify_count_query(mut self, query: Option<Value>) -> Self {
        self.verify_count_query = query;
        self
    }

    pub fn with_range(mut self, start: Option<DateTime<Utc>>, end: Option<DateTime<Utc>>) -> Self {
        self.start = start;
        self.end = end;
        self
    }

    /// Check the fields a reindex needs: an index name, and object-shaped
    /// settings and mappings when the schema is overridden.
    pub fn validate(&self) -> Result<(), PipelineError> {
        if self.index.trim().is_empty() {
            return Err(PipelineError::config("partition has no index name"));
        }
        if let Some(schema) = &self.schema {
            if !schema.settings.is_object() {
                return Err(PipelineError::config(format!(
                    "partition '{}' has no settings",
                    self.index
                )));
            }
            if !schema.mappings.is_object() {
                return Err(PipelineError::config(format!(
                    "partition '{}' has no mappings",
                    self.index
                )));
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_whole_partition_is_valid() {
        let partition = Partition::whole("articles");
        assert!(partition.validate().is_ok());
        assert!(partition.verify_count_query.is_some());
    }

    #[test]
    fn test_validate_rejects_missing_fields() {
        assert!(Partition::whole(" ").validate().is_err());

        let partition = Partition::whole("articles")
            .with_schema(IndexSchema::new(Value::Null, json!({ "properties": {} })));
        assert!(partition.validate().is_err());

        let partition = Partition::whole("articles")
            .with_schema(IndexSchema::new(json!({}), Value::Null));
        assert!(partition.validate().is_err());
    }
}
