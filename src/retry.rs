//! Optimistic Retry Loop (C4): fetch-then-mutate-with-version-precondition,
//! retrying on conflict with exponential backoff, bounded by a max retry
//! count. Mirrors the source system's `_update_with_retry`.

use crate::error::{Result, SyncError};
use std::future::Future;
use std::time::Duration;

#[derive(Debug, Clone, Copy)]
pub struct RetryPolicy {
    pub max_retries: u32,
    pub base_delay: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self { max_retries: 3, base_delay: Duration::from_millis(500) }
    }
}

/// Runs `attempt` until it succeeds, exhausts retries on version conflict,
/// or reports the document missing (in which case `on_missing` runs once
/// as the fallback path — create-if-absent for upserts, success-if-absent
/// for deletes).
pub async fn with_retry<A, AFut, M, MFut>(policy: &RetryPolicy, mut attempt: A, mut on_missing: M) -> Result<()>
where
    A: FnMut() -> AFut,
    AFut: Future<Output = Result<()>>,
    M: FnMut() -> MFut,
    MFut: Future<Output = Result<()>>,
{
    let mut retries: u32 = 0;
    loop {
        match attempt().await {
            Ok(()) => return Ok(()),
            Err(SyncError::MissingDocument { .. }) => return on_missing().await,
            Err(SyncError::VersionConflict { doc_id }) => {
                if retries >= policy.max_retries {
                    return Err(SyncError::VersionConflict { doc_id });
                }
                retries += 1;
                let delay = policy.base_delay * 2u32.pow(retries - 1);
                tracing::debug!(doc_id, retries, ?delay, "version conflict, retrying");
                tokio::time::sleep(delay).await;
            }
            Err(e) => return Err(e),
        }
    }
}
