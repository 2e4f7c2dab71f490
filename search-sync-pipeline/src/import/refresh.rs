//! Temporary refresh-interval overrides.

use std::future::Future;
use std::sync::Arc;

use serde_json::{json, Value};
use tokio::runtime::Handle;
use tracing::{debug, error, warn};

use crate::errors::PipelineError;
use search_sync_repository::{refresh_interval_of, SearchBackend};

fn refresh_interval_body(interval: &Value) -> Value {
    json!({ "index": { "refresh_interval": interval } })
}

/// Holds a temporary `refresh_interval` on one index and restores the prior
/// value exactly once.
///
/// Call [`RefreshIntervalGuard::restore`] on every normal exit path. If the
/// guard is dropped unrestored (the owning future was cancelled or
/// panicked), the restoration is spawned on the current tokio runtime.
pub struct RefreshIntervalGuard {
    client: Arc<dyn SearchBackend>,
    index: String,
    restore_to: Value,
    restored: bool,
}

impl RefreshIntervalGuard {
    /// Read the prior interval and write `temporary`.
    ///
    /// `restore_to` overrides the value read from the index. When the index
    /// settings cannot be read, `fallback` is restored instead; a missing
    /// value restores the backend default.
    pub async fn acquire(
        client: Arc<dyn SearchBackend>,
        index: &str,
        temporary: &Value,
        restore_to: Option<Value>,
        fallback: Option<Value>,
    ) -> Result<Self, PipelineError> {
        let restore_to = match restore_to {
            Some(value) => value,
            None => match client.get_settings(index).await {
                Ok(settings) => refresh_interval_of(&settings).unwrap_or(Value::Null),
                Err(e) => {
                    warn!(index, error = %e, "Could not read index settings, restoring configured refresh interval");
                    fallback.unwrap_or(Value::Null)
                }
            },
        };

        client
            .put_settings(index, &refresh_interval_body(temporary))
            .await?;
        debug!(index, temporary = %temporary, restore_to = %restore_to, "Refresh interval overridden");

        Ok(Self {
            client,
            index: index.to_string(),
            restore_to,
            restored: false,
        })
    }

    pub fn restore_to(&self) -> &Value {
        &self.restore_to
    }

    /// Write the prior interval back.
    pub async fn restore(mut self) -> Result<(), PipelineError> {
        self.restored = true;
        self.client
            .put_settings(&self.index, &refresh_interval_body(&self.restore_to))
            .await?;
        debug!(index = %self.index, restored = %self.restore_to, "Refresh interval restored");
        Ok(())
    }
}

impl Drop for RefreshIntervalGuard {
    fn drop(&mut self) {
        if self.restored {
            return;
        }
        let client = self.client.clone();
        let index = std::mem::take(&mut self.index);
        let body = refresh_interval_body(&self.restore_to);
        match Handle::try_current() {
            Ok(handle) => {
                handle.spawn(async move {
                    if let Err(e) = client.put_settings(&index, &body).await {
                        error!(index = %index, error = %e, "Failed to restore refresh interval");
                    }
                });
            }
            Err(_) => {
                error!(index = %index, "No runtime available to restore refresh interval");
            }
        }
    }
}

/// Run `body` with the refresh interval of `index` set to `temporary`,
/// restoring the prior value afterwards whether `body` succeeds or not.
/// With `temporary == None` the body runs without touching the settings.
pub async fn with_refresh_interval<F, Fut, T>(
    client: Arc<dyn SearchBackend>,
    index: &str,
    temporary: Option<&Value>,
    restore_to: Option<Value>,
    fallback: Option<Value>,
    body: F,
) -> Result<T, PipelineError>
where
    F: FnOnce() -> Fut,
    Fut: Future<Output = Result<T, PipelineError>>,
{
    let Some(temporary) = temporary else {
        return body().await;
    };

    let guard = RefreshIntervalGuard::acquire(client, index, temporary, restore_to, fallback).await?;
    let result = body().await;
    let restored = guard.restore().await;

    match (result, restored) {
        (Ok(value), Ok(())) => Ok(value),
        (Ok(_), Err(e)) => Err(e),
        (Err(e), Ok(())) => Err(e),
        (Err(e), Err(restore_error)) => {
            error!(index, error = %restore_error, "Failed to restore refresh interval");
            Err(e)
        }
    }
}
