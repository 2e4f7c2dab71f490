//! In-memory record store.

use std::collections::{BTreeMap, HashSet};
use std::sync::atomic::{AtomicUsize, Ordering};

use async_trait::async_trait;
use futures::stream::{self, StreamExt};
use parking_lot::RwLock;

use super::{BatchStream, RecordStore, StoreError};
use crate::record::{RecordRef, Scope};

/// A complete [`RecordStore`] over an in-memory map keyed by record id.
///
/// Iteration follows id order. Fetch calls are counted, and a failure can be
/// injected to exercise error propagation.
pub struct MemoryStore {
    entity_type: String,
    records: RwLock<BTreeMap<String, RecordRef>>,
    failure: RwLock<Option<StoreError>>,
    batch_fetches: AtomicUsize,
    id_fetches: AtomicUsize,
}

impl MemoryStore {
    pub fn new(entity_type: impl Into<String>) -> Self {
        Self {
            entity_type: entity_type.into(),
            records: RwLock::new(BTreeMap::new()),
            failure: RwLock::new(None),
            batch_fetches: AtomicUsize::new(0),
            id_fetches: AtomicUsize::new(0),
        }
    }

    pub fn with_records(
        entity_type: impl Into<String>,
        records: impl IntoIterator<Item = RecordRef>,
    ) -> Self {
        let store = Self::new(entity_type);
        for record in records {
            store.insert(record);
        }
        store
    }

    /// Insert or replace a record.
    pub fn insert(&self, record: RecordRef) {
        self.records.write().insert(record.record_id(), record);
    }

    pub fn remove(&self, id: &str) -> Option<RecordRef> {
        self.records.write().remove(id)
    }

    pub fn len(&self) -> usize {
        self.records.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.read().is_empty()
    }

    /// Make every subsequent read fail with `error`; `None` clears it.
    pub fn fail_with(&self, error: Option<StoreError>) {
        *self.failure.write() = error;
    }

    /// Batches produced so far.
    pub fn batch_fetches(&self) -> usize {
        self.batch_fetches.load(Ordering::SeqCst)
    }

    /// `find_by_ids` calls made so far.
    pub fn id_fetches(&self) -> usize {
        self.id_fetches.load(Ordering::SeqCst)
    }

    fn check(&self) -> Result<(), StoreError> {
        match self.failure.read().as_ref() {
            Some(error) => Err(error.clone()),
            None => Ok(()),
        }
    }

    fn matching(&self, scope: &Scope) -> Vec<RecordRef> {
        self.records
            .read()
            .values()
            .filter(|record| scope.matches(record.as_ref()))
            .cloned()
            .collect()
    }
}

#[async_trait]
impl RecordStore for MemoryStore {
    fn entity_type(&self) -> &str {
        &self.entity_type
    }

    fn find_in_batches(&self, scope: Scope, batch_size: usize) -> BatchStream<'_> {
        if let Err(error) = self.check() {
            return stream::once(async move { Err(error) }).boxed();
        }

        let records = self.matching(&scope);
        let batches: Vec<Vec<RecordRef>> = records
            .chunks(batch_size.max(1))
            .map(<[RecordRef]>::to_vec)
            .collect();

        stream::iter(batches)
            .map(move |batch| {
                self.batch_fetches.fetch_add(1, Ordering::SeqCst);
                Ok(batch)
            })
            .boxed()
    }

    async fn count(&self, scope: &Scope) -> Result<u64, StoreError> {
        self.check()?;
        Ok(self.matching(scope).len() as u64)
    }

    async fn find_by_ids(
        &self,
        ids: &[String],
        scope: &Scope,
    ) -> Result<Vec<RecordRef>, StoreError> {
        self.check()?;
        self.id_fetches.fetch_add(1, Ordering::SeqCst);

        let wanted: HashSet<&str> = ids.iter().map(String::as_str).collect();
        let mut records: Vec<RecordRef> = self
            .records
            .read()
            .iter()
            .filter(|(id, record)| wanted.contains(id.as_str()) && scope.matches(record.as_ref()))
            .map(|(_, record)| record.clone())
            .collect();
        scope.sort(&mut records);
        Ok(records)
    }
}
