//! Backup path: build -> upload -> prune local -> prune remote.
//!
//! Steps run strictly in order and there is no internal lock. A scheduler that
//! can start overlapping runs against the same staging directory must serialize
//! them itself; two concurrent runs may race on retention.
//!
//! A failed build aborts the run. A failed upload skips remote retention, but
//! local retention still runs so the staging directory stays bounded.

use crate::archive::{self, ArchiveBuilder, ExcludeSet};
use crate::config::AppConfig;
use crate::error::{Result, SidecarError};
use crate::models::{ArchiveRecord, RetentionPolicy};
use crate::remote_store::{RemoteStore, RetryPolicy, put_with_retry};
use crate::retention::{self, RetentionReport};
use std::path::PathBuf;
use tracing::{info, instrument, warn};

#[derive(Debug, Clone)]
pub struct BackupJob {
    pub source_root: PathBuf,
    pub builder: ArchiveBuilder,
    pub excludes: ExcludeSet,
    pub local_policy: RetentionPolicy,
    pub remote_policy: RetentionPolicy,
    pub retry: RetryPolicy,
}

#[derive(Debug)]
pub enum UploadStatus {
    /// No remote store configured.
    Skipped,
    Uploaded { remote_name: String },
    Failed { error: SidecarError },
}

#[derive(Debug)]
pub struct BackupOutcome {
    pub archive: ArchiveRecord,
    pub upload: UploadStatus,
    pub local_retention: RetentionReport,
    /// `None` when the remote tier was skipped or the upload failed.
    pub remote_retention: Option<RetentionReport>,
}

impl BackupOutcome {
    /// True when the archive was built and, if a remote is configured, uploaded.
    /// Individual deletion failures do not make a run incomplete.
    pub fn is_complete(&self) -> bool {
        !matches!(self.upload, UploadStatus::Failed { .. })
    }
}

impl BackupJob {
    pub fn from_config(config: &AppConfig) -> Result<Self> {
        let backup = &config.backup;
        Ok(Self {
            source_root: config.paths.source_root.clone(),
            builder: ArchiveBuilder::from_config(&config.paths, backup),
            excludes: ExcludeSet::for_backup(&backup.exclude_patterns, backup.include_venv)?,
            local_policy: RetentionPolicy::keep_last(backup.max_backups),
            remote_policy: RetentionPolicy::keep_last(backup.remote_max_backups()),
            retry: config
                .remote
                .as_ref()
                .map(RetryPolicy::from_config)
                .unwrap_or_default(),
        })
    }

    #[instrument(skip(self, store), fields(operation = "backup", source_root = %self.source_root.display()))]
    pub async fn run<S: RemoteStore>(&self, store: Option<&S>) -> Result<BackupOutcome> {
        let builder = self.builder.clone();
        let source_root = self.source_root.clone();
        let excludes = self.excludes.clone();
        let archive = tokio::task::spawn_blocking(move || builder.build(&source_root, &excludes))
            .await
            .map_err(|e| SidecarError::Archive(format!("archive task panicked: {e}")))??;

        let upload = match store {
            None => {
                info!("no remote store configured; skipping upload and remote retention");
                UploadStatus::Skipped
            }
            Some(store) => {
                let local_path = self.builder.staging_dir().join(&archive.name);
                match put_with_retry(store, &local_path, &self.retry).await {
                    Ok(remote_name) => UploadStatus::Uploaded { remote_name },
                    Err(error) => {
                        warn!(error = %error, archive = %archive.name, "upload failed; remote retention skipped");
                        UploadStatus::Failed { error }
                    }
                }
            }
        };

        let local_retention = self.prune_local().await?;

        let remote_retention = match (store, &upload) {
            (Some(store), UploadStatus::Uploaded { .. }) => Some(self.prune_remote(store).await?),
            _ => None,
        };

        Ok(BackupOutcome {
            archive,
            upload,
            local_retention,
            remote_retention,
        })
    }

    async fn prune_local(&self) -> Result<RetentionReport> {
        let staging = self.builder.staging_dir().to_path_buf();
        let policy = self.local_policy;
        tokio::task::spawn_blocking(move || {
            let records = archive::list_local(&staging)?;
            Ok(retention::enforce(&records, &policy, |record| {
                archive::delete_local(&staging, record)
            }))
        })
        .await
        .map_err(|e| SidecarError::Archive(format!("local retention task panicked: {e}")))?
    }

    async fn prune_remote<S: RemoteStore>(&self, store: &S) -> Result<RetentionReport> {
        let records = store.list().await?;
        Ok(retention::enforce_async(&records, &self.remote_policy, |record| async move {
            store.delete(&record.name).await
        })
        .await)
    }
}
