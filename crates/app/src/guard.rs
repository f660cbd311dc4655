//! Bounded, cancellable store calls.

use std::{future::Future, time::Duration};

use rand::Rng;
use thiserror::Error;
use tokio_util::sync::CancellationToken;

use crate::store::StoreError;

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub(crate) enum CallError {
    #[error("cancelled")]
    Cancelled,

    #[error("timed out after {0:?}")]
    TimedOut(Duration),

    #[error(transparent)]
    Store(#[from] StoreError),
}

/// Run `call` until it finishes, `limit` elapses, or `cancel` fires.
pub(crate) async fn guarded<T, F>(
    cancel: &CancellationToken,
    limit: Duration,
    call: F,
) -> Result<T, CallError>
where
    F: Future<Output = Result<T, StoreError>>,
{
    tokio::select! {
        biased;

        () = cancel.cancelled() => Err(CallError::Cancelled),
        result = tokio::time::timeout(limit, call) => match result {
            Ok(result) => result.map_err(CallError::Store),
            Err(_elapsed) => Err(CallError::TimedOut(limit)),
        },
    }
}

/// Run `call` with a timeout and no cancellation.
pub(crate) async fn bounded<T, F>(limit: Duration, call: F) -> Result<T, CallError>
where
    F: Future<Output = Result<T, StoreError>>,
{
    guarded(&CancellationToken::new(), limit, call).await
}

/// Sleep before commit retry `attempt`, with jitter so racing writers spread out.
pub(crate) async fn backoff(attempt: u32) {
    let base = 5_u64.saturating_mul(u64::from(attempt.min(8)));
    let jitter = rand::thread_rng().gen_range(0..=base);

    tokio::time::sleep(Duration::from_millis(base.saturating_add(jitter))).await;
}
