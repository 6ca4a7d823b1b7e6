// Backup path tests: build -> upload -> prune local -> prune remote

use sidecar::backup::{BackupJob, UploadStatus};
use sidecar::config::{AppConfig, RemoteConfig};
use sidecar::error::{ErrorKind, Result, SidecarError};
use sidecar::models::ArchiveRecord;
use sidecar::remote_store::{DirectoryStore, RemoteStore};
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;
use tempfile::TempDir;

struct Fixture {
    _dir: TempDir,
    config: AppConfig,
}

impl Fixture {
    fn new() -> Self {
        let dir = TempDir::new().unwrap();
        let source = dir.path().join("app");
        fs::create_dir_all(source.join("src")).unwrap();
        fs::write(source.join("src/main.py"), "print('ok')").unwrap();

        let mut config = AppConfig::default();
        config.paths.source_root = source;
        config.paths.backup_dir = dir.path().join("backups");
        config.backup.max_backups = 5;
        config.remote = Some(RemoteConfig {
            root: dir.path().join("bucket-root"),
            bucket: "app-backups".into(),
            prefix: String::new(),
            region: None,
            access_key_id: None,
            secret_access_key: None,
            upload_attempts: 1,
            retry_backoff_ms: 0,
        });
        Self { _dir: dir, config }
    }

    fn staging(&self) -> &Path {
        &self.config.paths.backup_dir
    }

    fn store(&self) -> DirectoryStore {
        DirectoryStore::from_config(self.config.remote.as_ref().unwrap())
    }

    /// Old archives dated 2020-01-01, one minute apart.
    fn seed(dir: &Path, count: usize) -> Vec<PathBuf> {
        fs::create_dir_all(dir).unwrap();
        (0..count)
            .map(|i| {
                let path = dir.join(format!("backup_20200101_00{i:02}00.tar.gz"));
                fs::write(&path, "old").unwrap();
                path
            })
            .collect()
    }
}

fn archive_names(dir: &Path) -> Vec<String> {
    let mut names: Vec<_> = fs::read_dir(dir)
        .unwrap()
        .map(|e| e.unwrap().file_name().to_string_lossy().into_owned())
        .filter(|n| n.starts_with("backup_"))
        .collect();
    names.sort();
    names
}

#[tokio::test]
async fn test_eight_local_without_remote_prunes_three_oldest() {
    let fx = Fixture::new();
    Fixture::seed(fx.staging(), 7);
    let job = BackupJob::from_config(&fx.config).unwrap();

    let outcome = job.run::<DirectoryStore>(None).await.unwrap();

    assert!(matches!(outcome.upload, UploadStatus::Skipped));
    assert!(outcome.is_complete());
    assert_eq!(outcome.local_retention.deleted.len(), 3);
    assert!(outcome.remote_retention.is_none());
    let names = archive_names(fx.staging());
    assert_eq!(names.len(), 5);
    assert_eq!(names.last().unwrap(), &outcome.archive.name);
    assert!(!names.contains(&"backup_20200101_000000.tar.gz".to_string()));
    assert!(!names.contains(&"backup_20200101_000200.tar.gz".to_string()));
    assert!(names.contains(&"backup_20200101_000300.tar.gz".to_string()));
}

#[tokio::test]
async fn test_upload_and_independent_remote_retention() {
    let mut fx = Fixture::new();
    fx.config.backup.max_remote_backups = Some(3);
    let store = fx.store();
    Fixture::seed(store.base(), 4);
    Fixture::seed(fx.staging(), 2);
    let job = BackupJob::from_config(&fx.config).unwrap();

    let outcome = job.run(Some(&store)).await.unwrap();

    match &outcome.upload {
        UploadStatus::Uploaded { remote_name } => assert_eq!(remote_name, &outcome.archive.name),
        other => panic!("expected upload, got {other:?}"),
    }
    assert!(outcome.is_complete());
    assert!(outcome.local_retention.deleted.is_empty());
    assert_eq!(archive_names(fx.staging()).len(), 3);

    let remote = outcome.remote_retention.expect("remote retention ran");
    assert_eq!(remote.deleted.len(), 2);
    let remote_names = archive_names(store.base());
    assert_eq!(remote_names.len(), 3);
    assert!(remote_names.contains(&outcome.archive.name));
}

/// Every operation fails.
struct BrokenStore;

impl RemoteStore for BrokenStore {
    async fn put(&self, _local_path: &Path) -> Result<String> {
        Err(SidecarError::Remote("bucket unreachable".into()))
    }

    async fn list(&self) -> Result<Vec<ArchiveRecord>> {
        panic!("remote retention must be skipped after a failed upload")
    }

    async fn delete(&self, _remote_name: &str) -> Result<()> {
        panic!("remote retention must be skipped after a failed upload")
    }
}

#[tokio::test]
async fn test_failed_upload_skips_remote_retention_but_prunes_local() {
    let mut fx = Fixture::new();
    fx.config.backup.max_backups = 2;
    Fixture::seed(fx.staging(), 4);
    let mut job = BackupJob::from_config(&fx.config).unwrap();
    job.retry.initial_backoff = Duration::ZERO;

    let outcome = job.run(Some(&BrokenStore)).await.unwrap();

    match &outcome.upload {
        UploadStatus::Failed { error } => assert_eq!(error.kind(), ErrorKind::Remote),
        other => panic!("expected failed upload, got {other:?}"),
    }
    assert!(!outcome.is_complete());
    assert!(outcome.remote_retention.is_none());
    assert_eq!(outcome.local_retention.deleted.len(), 3);
    assert_eq!(archive_names(fx.staging()).len(), 2);
}

#[tokio::test]
async fn test_build_failure_aborts_before_upload_and_retention() {
    let mut fx = Fixture::new();
    fx.config.paths.source_root = fx.config.paths.source_root.join("missing");
    Fixture::seed(fx.staging(), 8);
    let job = BackupJob::from_config(&fx.config).unwrap();

    let err = job.run(Some(&BrokenStore)).await.unwrap_err();

    assert_eq!(err.kind(), ErrorKind::Io);
    assert_eq!(archive_names(fx.staging()).len(), 8);
}
