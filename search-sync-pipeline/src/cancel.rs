//! Cooperative cancellation and call deadlines.

use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use tokio::sync::watch;

use crate::errors::PipelineError;

/// Cancellation signal shared between a caller and a running operation.
///
/// Clones observe the same signal. A fresh token is never cancelled until
/// [`CancellationToken::cancel`] is called on it or one of its clones.
#[derive(Debug, Clone)]
pub struct CancellationToken {
    sender: Arc<watch::Sender<bool>>,
    receiver: watch::Receiver<bool>,
}

impl Default for CancellationToken {
    fn default() -> Self {
        Self::new()
    }
}

impl CancellationToken {
    pub fn new() -> Self {
        let (sender, receiver) = watch::channel(false);
        Self {
            sender: Arc::new(sender),
            receiver,
        }
    }

    pub fn cancel(&self) {
        self.sender.send_replace(true);
    }

    pub fn is_cancelled(&self) -> bool {
        *self.receiver.borrow()
    }

    /// Resolve once the token is cancelled.
    pub async fn cancelled(&self) {
        let mut receiver = self.receiver.clone();
        // The sender lives as long as any clone, so this only returns on cancel.
        let _ = receiver.wait_for(|cancelled| *cancelled).await;
    }

    /// Fail with [`PipelineError::Cancelled`] if the token is cancelled.
    pub fn check(&self) -> Result<(), PipelineError> {
        if self.is_cancelled() {
            Err(PipelineError::Cancelled)
        } else {
            Ok(())
        }
    }
}

/// Run `future` under an optional deadline, aborting early on cancellation.
pub async fn guarded<F, T>(
    future: F,
    timeout: Option<Duration>,
    cancel: &CancellationToken,
) -> Result<T, PipelineError>
where
    F: Future<Output = Result<T, PipelineError>>,
{
    let deadline = async {
        match timeout {
            Some(limit) => tokio::time::timeout(limit, future)
                .await
                .map_err(|_| PipelineError::Timeout(limit))?,
            None => future.await,
        }
    };

    tokio::select! {
        result = deadline => result,
        _ = cancel.cancelled() => Err(PipelineError::Cancelled),
    }
}

/// Sleep for `duration` unless cancelled first.
pub async fn sleep(duration: Duration, cancel: &CancellationToken) -> Result<(), PipelineError> {
    if duration.is_zero() {
        return cancel.check();
    }
    tokio::select! {
        _ = tokio::time::sleep(duration) => Ok(()),
        _ = cancel.cancelled() => Err(PipelineError::Cancelled),
    }
}
