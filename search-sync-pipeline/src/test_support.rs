//! Sample records and wiring shared by the unit tests.

use std::sync::Arc;

use serde::Serialize;
use serde_json::{json, Value};

use crate::adapter::StoreAdapter;
use crate::record::{Record, RecordRef};
use crate::store::{MemoryStore, RecordStore};
use crate::strategy::{base_index_name, Strategy, StrategyConfig};
use search_sync_repository::{InMemoryBackend, SearchBackend};

#[derive(Debug, Clone, Serialize)]
pub struct Article {
    pub id: u64,
    pub title: String,
}

#[derive(Debug, Clone, Serialize)]
pub struct Comment {
    pub id: u64,
    pub body: String,
}

impl Record for Article {
    fn record_id(&self) -> String {
        format!("{:05}", self.id)
    }

    fn document(&self) -> Result<Value, serde_json::Error> {
        Ok(json!({ "id": self.record_id(), "type": "Article", "title": self.title }))
    }
}

impl Record for Comment {
    fn record_id(&self) -> String {
        format!("{:05}", self.id)
    }

    fn document(&self) -> Result<Value, serde_json::Error> {
        Ok(json!({ "id": self.record_id(), "type": "Comment", "body": self.body }))
    }
}

pub fn article(id: u64, title: &str) -> Article {
    Article {
        id,
        title: title.to_string(),
    }
}

pub fn comment(id: u64, body: &str) -> Comment {
    Comment {
        id,
        body: body.to_string(),
    }
}

pub fn article_store(records: Vec<Article>) -> Arc<MemoryStore> {
    Arc::new(MemoryStore::with_records(
        "Article",
        records.into_iter().map(|a| Arc::new(a) as RecordRef),
    ))
}

pub fn comment_store(records: Vec<Comment>) -> Arc<MemoryStore> {
    Arc::new(MemoryStore::with_records(
        "Comment",
        records.into_iter().map(|c| Arc::new(c) as RecordRef),
    ))
}

pub fn strategy_over(
    client: Arc<dyn SearchBackend>,
    store: Arc<MemoryStore>,
    name: &str,
) -> Arc<Strategy> {
    let entity_type = store.entity_type().to_string();
    let config = StrategyConfig::new(base_index_name(&entity_type));
    Arc::new(Strategy::new(
        name,
        entity_type,
        client,
        Arc::new(StoreAdapter::new(store)),
        config,
    ))
}

/// Default strategy for `Article` records, writing to `articles`.
pub fn article_strategy(backend: Arc<InMemoryBackend>, records: Vec<Article>) -> Arc<Strategy> {
    strategy_over(backend, article_store(records), "default")
}
