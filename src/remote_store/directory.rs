// Directory-backed remote store: objects are files under <root>/<bucket>/<prefix>.
// Uploads land under a hidden temporary name and are renamed into place.

use super::RemoteStore;
use crate::archive::parse_archive_name;
use crate::config::RemoteConfig;
use crate::error::{Result, SidecarError};
use crate::models::{ArchiveRecord, Tier};
use std::io;
use std::path::{Path, PathBuf};
use tracing::instrument;

#[derive(Debug, Clone)]
pub struct DirectoryStore {
    base: PathBuf,
}

impl DirectoryStore {
    pub fn new(root: impl AsRef<Path>, bucket: &str, prefix: &str) -> Self {
        let mut base = root.as_ref().join(bucket);
        let prefix = prefix.trim_matches('/');
        if !prefix.is_empty() {
            base.push(prefix);
        }
        Self { base }
    }

    pub fn from_config(remote: &RemoteConfig) -> Self {
        tracing::debug!(
            bucket = %remote.bucket,
            region = remote.region.as_deref().unwrap_or("-"),
            "directory remote store"
        );
        Self::new(&remote.root, &remote.bucket, &remote.prefix)
    }

    pub fn base(&self) -> &Path {
        &self.base
    }
}

fn remote_error(action: &str, path: &Path, e: io::Error) -> SidecarError {
    SidecarError::Remote(format!("{action} {}: {e}", path.display()))
}

impl RemoteStore for DirectoryStore {
    #[instrument(skip(self), fields(store = "directory", operation = "put"))]
    async fn put(&self, local_path: &Path) -> Result<String> {
        let name = local_path
            .file_name()
            .and_then(|n| n.to_str())
            .ok_or_else(|| {
                SidecarError::Remote(format!("{} has no file name", local_path.display()))
            })?
            .to_string();
        tokio::fs::create_dir_all(&self.base)
            .await
            .map_err(|e| remote_error("create", &self.base, e))?;

        let staged = self.base.join(format!(".{name}.upload"));
        let dest = self.base.join(&name);
        if let Err(e) = tokio::fs::copy(local_path, &staged).await {
            let _ = tokio::fs::remove_file(&staged).await;
            return Err(remote_error("copy to", &staged, e));
        }
        if let Err(e) = tokio::fs::rename(&staged, &dest).await {
            let _ = tokio::fs::remove_file(&staged).await;
            return Err(remote_error("publish", &dest, e));
        }
        Ok(name)
    }

    #[instrument(skip(self), fields(store = "directory", operation = "list"))]
    async fn list(&self) -> Result<Vec<ArchiveRecord>> {
        let mut listing = match tokio::fs::read_dir(&self.base).await {
            Ok(listing) => listing,
            Err(e) if e.kind() == io::ErrorKind::NotFound => return Ok(Vec::new()),
            Err(e) => return Err(remote_error("list", &self.base, e)),
        };
        let mut records = Vec::new();
        while let Some(entry) = listing
            .next_entry()
            .await
            .map_err(|e| remote_error("list", &self.base, e))?
        {
            let name = entry.file_name().to_string_lossy().into_owned();
            let Some(created_at) = parse_archive_name(&name)? else {
                continue;
            };
            let metadata = entry
                .metadata()
                .await
                .map_err(|e| remote_error("stat", &entry.path(), e))?;
            if !metadata.is_file() {
                continue;
            }
            records.push(ArchiveRecord {
                name,
                created_at,
                size_bytes: metadata.len(),
                tier: Tier::Remote,
            });
        }
        records.sort_by(ArchiveRecord::newest_first);
        Ok(records)
    }

    #[instrument(skip(self), fields(store = "directory", operation = "delete"))]
    async fn delete(&self, remote_name: &str) -> Result<()> {
        if remote_name.contains('/') || remote_name.contains('\\') || remote_name.starts_with('.') {
            return Err(SidecarError::Remote(format!(
                "refusing to delete {remote_name:?}: not an object name"
            )));
        }
        let path = self.base.join(remote_name);
        tokio::fs::remove_file(&path)
            .await
            .map_err(|e| remote_error("delete", &path, e))
    }
}
