// Remote archive store: the capability the backup path consumes (put/list/delete).
// Object-storage clients live outside this crate; `DirectoryStore` covers buckets
// exposed as a mounted directory.

mod directory;

pub use directory::DirectoryStore;

use crate::config::RemoteConfig;
use crate::error::{Result, SidecarError};
use crate::models::ArchiveRecord;
use std::future::Future;
use std::path::Path;
use std::time::Duration;
use tracing::{info, warn};

pub trait RemoteStore: Send + Sync {
    /// Upload a local archive. The object is either fully visible afterwards or the call fails.
    fn put(&self, local_path: &Path) -> impl Future<Output = Result<String>> + Send;

    /// Consistent snapshot of the remote tier, newest first.
    fn list(&self) -> impl Future<Output = Result<Vec<ArchiveRecord>>> + Send;

    fn delete(&self, remote_name: &str) -> impl Future<Output = Result<()>> + Send;
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    pub attempts: u32,
    /// Doubled after every failed attempt.
    pub initial_backoff: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            attempts: 3,
            initial_backoff: Duration::from_secs(1),
        }
    }
}

impl RetryPolicy {
    pub fn from_config(remote: &RemoteConfig) -> Self {
        Self {
            attempts: remote.upload_attempts.max(1),
            initial_backoff: Duration::from_millis(remote.retry_backoff_ms),
        }
    }
}

/// `put` with exponential backoff. The last failure is returned once attempts run out.
pub async fn put_with_retry<S: RemoteStore>(
    store: &S,
    local_path: &Path,
    policy: &RetryPolicy,
) -> Result<String> {
    let attempts = policy.attempts.max(1);
    let mut backoff = policy.initial_backoff;
    let mut attempt = 1;
    loop {
        match store.put(local_path).await {
            Ok(remote_name) => {
                info!(remote_name = %remote_name, attempt, "upload complete");
                return Ok(remote_name);
            }
            Err(e) if attempt < attempts => {
                warn!(
                    error = %e,
                    attempt,
                    attempts,
                    backoff_ms = backoff.as_millis() as u64,
                    operation = "put",
                    "upload failed; retrying"
                );
                tokio::time::sleep(backoff).await;
                backoff = backoff.saturating_mul(2);
                attempt += 1;
            }
            Err(e) => {
                return Err(SidecarError::Remote(format!(
                    "upload of {} failed after {attempts} attempt(s): {e}",
                    local_path.display()
                )));
            }
        }
    }
}
