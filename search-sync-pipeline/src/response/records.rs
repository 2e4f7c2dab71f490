//! Mapping hits back to domain records.

use std::collections::{HashMap, HashSet};

use futures::future::try_join_all;
use tracing::debug;

use super::SearchTarget;
use crate::errors::PipelineError;
use crate::multi::MultiStrategy;
use crate::options::RecordsOptions;
use crate::record::RecordRef;
use crate::strategy::Strategy;
use search_sync_shared::Hit;

/// Records resolved from a page of hits, each paired with its hit.
#[derive(Debug, Clone, Default)]
pub struct ResolvedRecords {
    entries: Vec<(RecordRef, Hit)>,
}

impl ResolvedRecords {
    pub fn records(&self) -> Vec<RecordRef> {
        self.entries.iter().map(|(record, _)| record.clone()).collect()
    }

    pub fn iter_with_hits(&self) -> impl Iterator<Item = (&RecordRef, &Hit)> {
        self.entries.iter().map(|(record, hit)| (record, hit))
    }

    pub fn ids(&self) -> Vec<String> {
        self.entries
            .iter()
            .map(|(record, _)| record.record_id())
            .collect()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

pub(super) async fn resolve(
    target: &SearchTarget,
    hits: &[Hit],
    options: &RecordsOptions,
) -> Result<ResolvedRecords, PipelineError> {
    match target {
        SearchTarget::Strategy(strategy) => resolve_single(strategy, hits, options).await,
        SearchTarget::Multi(multi) => resolve_multi(multi, hits, options).await,
    }
}

/// Distinct hit identities, in rank order.
fn hit_ids<'a>(hits: impl Iterator<Item = &'a Hit>) -> Vec<String> {
    let mut seen = HashSet::new();
    hits.filter_map(Hit::document_id)
        .filter(|id| seen.insert(id.clone()))
        .collect()
}

async fn fetch(
    strategy: &Strategy,
    ids: &[String],
    options: &RecordsOptions,
) -> Result<Vec<RecordRef>, PipelineError> {
    if ids.is_empty() {
        return Ok(Vec::new());
    }
    let records = strategy.adapter().find_by_ids(ids, &options.scope).await?;
    match options.preload_of(strategy.entity_type()) {
        Some(preload) => Ok(preload.preload(records).await?),
        None => Ok(records),
    }
}

async fn resolve_single(
    strategy: &Strategy,
    hits: &[Hit],
    options: &RecordsOptions,
) -> Result<ResolvedRecords, PipelineError> {
    let ordered = options.scope.has_order();
    if ordered && !options.allow_store_order {
        return Err(PipelineError::ordering(
            "the record scope declares an explicit order; refusing to re-sort by hit rank \
             (allow store order to keep it)",
        ));
    }

    let ids = hit_ids(hits.iter());
    let records = fetch(strategy, &ids, options).await?;

    let entries = if ordered {
        let mut hits_by_id: HashMap<String, &Hit> = HashMap::new();
        for hit in hits {
            if let Some(id) = hit.document_id() {
                hits_by_id.entry(id).or_insert(hit);
            }
        }
        records
            .into_iter()
            .filter_map(|record| {
                let hit = hits_by_id.get(&record.record_id())?;
                Some((record, (*hit).clone()))
            })
            .collect()
    } else {
        let by_id: HashMap<String, RecordRef> = records
            .into_iter()
            .map(|record| (record.record_id(), record))
            .collect();
        hits.iter()
            .filter_map(|hit| {
                let record = by_id.get(&hit.document_id()?)?;
                Some((record.clone(), hit.clone()))
            })
            .collect()
    };

    let resolved = ResolvedRecords { entries };
    if resolved.len() < hits.len() {
        debug!(
            strategy = strategy.name(),
            hits = hits.len(),
            records = resolved.len(),
            "Dropped hits without a backing record"
        );
    }
    Ok(resolved)
}

async fn resolve_multi(
    multi: &MultiStrategy,
    hits: &[Hit],
    options: &RecordsOptions,
) -> Result<ResolvedRecords, PipelineError> {
    if options.scope.has_order() {
        return Err(PipelineError::ordering(
            "records of several entity types cannot be returned in store order",
        ));
    }

    let entity_types = multi.entity_types();
    let type_of = |hit: &Hit| -> Option<String> {
        match hit.type_marker() {
            Some(marker) => Some(marker.to_string()),
            None if entity_types.len() == 1 => entity_types.first().cloned(),
            None => None,
        }
    };

    let mut groups: Vec<(String, Vec<&Hit>)> = Vec::new();
    for hit in hits {
        let Some(entity_type) = type_of(hit) else {
            debug!(id = ?hit.id, index = %hit.index, "Hit carries no type marker");
            continue;
        };
        match groups.iter_mut().find(|(t, _)| *t == entity_type) {
            Some((_, group)) => group.push(hit),
            None => groups.push((entity_type, vec![hit])),
        }
    }

    let fetches = groups.iter().map(|(entity_type, group)| async move {
        let strategy = multi
            .strategy_for_type(entity_type)
            .ok_or_else(|| PipelineError::AdapterNotFound(entity_type.clone()))?;
        let ids = hit_ids(group.iter().copied());
        let records = fetch(strategy, &ids, options).await?;
        Ok::<_, PipelineError>((entity_type.clone(), records))
    });
    let fetched = try_join_all(fetches).await?;

    let mut by_key: HashMap<(String, String), RecordRef> = HashMap::new();
    for (entity_type, records) in fetched {
        for record in records {
            by_key.insert((entity_type.clone(), record.record_id()), record);
        }
    }

    let entries = hits
        .iter()
        .filter_map(|hit| {
            let key = (type_of(hit)?, hit.document_id()?);
            let record = by_key.get(&key)?;
            Some((record.clone(), hit.clone()))
        })
        .collect();

    Ok(ResolvedRecords { entries })
}
