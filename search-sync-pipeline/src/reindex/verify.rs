//! Post-import document count verification.

use std::time::Duration;

use serde::Serialize;
use serde_json::Value;
use tracing::{info, warn};

use crate::cancel::{guarded, CancellationToken};
use crate::errors::PipelineError;
use crate::strategy::{Partition, Strategy};

/// Store and index counts for one partition.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Verification {
    pub store_count: u64,
    pub index_count: u64,
    pub matches: bool,
    /// Whether the index was refreshed before counting. Without a refresh a
    /// mismatch says little.
    pub refreshed: bool,
}

/// Compare the record count of the partition scope with the index count for
/// `query`. A mismatch is logged, never raised.
pub async fn verify_count(
    strategy: &Strategy,
    partition: &Partition,
    query: &Value,
    refreshed: bool,
    timeout: Option<Duration>,
    cancel: &CancellationToken,
) -> Result<Verification, PipelineError> {
    let store_count = guarded(
        async { Ok(strategy.adapter().count(&partition.scope).await?) },
        timeout,
        cancel,
    )
    .await?;
    let index_count = guarded(
        async { Ok(strategy.client().count(&partition.index, query).await?) },
        timeout,
        cancel,
    )
    .await?;

    let verification = Verification {
        store_count,
        index_count,
        matches: store_count == index_count,
        refreshed,
    };

    if verification.matches {
        info!(
            strategy = strategy.name(),
            index = %partition.index,
            count = store_count,
            "Document counts match"
        );
    } else if refreshed {
        warn!(
            strategy = strategy.name(),
            index = %partition.index,
            store_count,
            index_count,
            "Document count mismatch"
        );
    } else {
        warn!(
            strategy = strategy.name(),
            index = %partition.index,
            store_count,
            index_count,
            "Document count mismatch; the index was not refreshed, so counts may lag"
        );
    }

    Ok(verification)
}
