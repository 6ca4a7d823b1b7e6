// Archive builder: one timestamped tar(.gz) snapshot of the source tree per call.
// The staging directory doubles as the local tier; its listing is the only index,
// so archive names must sort chronologically as strings (UTC stamps).

mod exclude;

pub use exclude::{DEFAULT_EXCLUDES, ExcludeSet, VENV_DIRS};

use crate::config::{BackupConfig, PathsConfig};
use crate::error::{Result, SidecarError};
use crate::models::{ArchiveRecord, Tier};
use chrono::{DateTime, NaiveDateTime, Utc};
use flate2::Compression;
use flate2::write::GzEncoder;
use serde::{Deserialize, Serialize};
use std::fs::{self, File, OpenOptions};
use std::io::{self, Write};
use std::path::{Path, PathBuf};
use tracing::{debug, info, instrument};

pub const ARCHIVE_PREFIX: &str = "backup_";
const STAMP_FORMAT: &str = "%Y%m%d_%H%M%S";
const STAMP_LEN: usize = 15;
const PARTIAL_SUFFIX: &str = ".partial";

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub enum ArchiveFormat {
    #[default]
    #[serde(rename = "tar.gz")]
    TarGz,
    #[serde(rename = "tar")]
    Tar,
}

impl ArchiveFormat {
    pub fn extension(self) -> &'static str {
        match self {
            ArchiveFormat::TarGz => "tar.gz",
            ArchiveFormat::Tar => "tar",
        }
    }

    fn from_extension(ext: &str) -> Option<Self> {
        match ext {
            "tar.gz" => Some(ArchiveFormat::TarGz),
            "tar" => Some(ArchiveFormat::Tar),
            _ => None,
        }
    }
}

/// `backup_YYYYMMDD_HHMMSS.<ext>` for the given instant.
pub fn archive_name(at: DateTime<Utc>, format: ArchiveFormat) -> String {
    format!(
        "{ARCHIVE_PREFIX}{}.{}",
        at.format(STAMP_FORMAT),
        format.extension()
    )
}

/// Creation time (ms since epoch) encoded in an archive name.
///
/// Returns `Ok(None)` for names that are not archives (other files, in-progress
/// `.partial` uploads). A `backup_` name that does not parse is a configuration
/// error: ordering by a guessed timestamp would prune the wrong archives.
pub fn parse_archive_name(name: &str) -> Result<Option<u64>> {
    let Some(rest) = name.strip_prefix(ARCHIVE_PREFIX) else {
        return Ok(None);
    };
    if name.ends_with(PARTIAL_SUFFIX) {
        return Ok(None);
    }
    let malformed = |reason: &str| {
        SidecarError::Configuration(format!("malformed archive name {name:?}: {reason}"))
    };
    let (stamp, ext) = match (rest.get(..STAMP_LEN), rest.get(STAMP_LEN..)) {
        (Some(stamp), Some(ext)) => (stamp, ext),
        _ => return Err(malformed("timestamp too short")),
    };
    let ext = ext
        .strip_prefix('.')
        .ok_or_else(|| malformed("missing extension"))?;
    if ArchiveFormat::from_extension(ext).is_none() {
        return Err(malformed("unknown extension"));
    }
    let created = NaiveDateTime::parse_from_str(stamp, STAMP_FORMAT)
        .map_err(|e| malformed(&e.to_string()))?;
    Ok(Some(created.and_utc().timestamp_millis().max(0) as u64))
}

#[derive(Debug, Clone)]
pub struct ArchiveBuilder {
    staging_dir: PathBuf,
    format: ArchiveFormat,
    compression_level: u32,
}

impl ArchiveBuilder {
    pub fn new(staging_dir: impl Into<PathBuf>, format: ArchiveFormat, compression_level: u32) -> Self {
        Self {
            staging_dir: staging_dir.into(),
            format,
            compression_level: compression_level.min(9),
        }
    }

    pub fn from_config(paths: &PathsConfig, backup: &BackupConfig) -> Self {
        Self::new(&paths.backup_dir, backup.format, backup.compression_level)
    }

    pub fn staging_dir(&self) -> &Path {
        &self.staging_dir
    }

    pub fn build(&self, source_root: &Path, excludes: &ExcludeSet) -> Result<ArchiveRecord> {
        self.build_at(source_root, excludes, Utc::now())
    }

    /// Build an archive stamped `at`. Any partial file is removed on failure.
    #[instrument(skip(self, excludes), fields(operation = "build_archive", format = self.format.extension()))]
    pub fn build_at(
        &self,
        source_root: &Path,
        excludes: &ExcludeSet,
        at: DateTime<Utc>,
    ) -> Result<ArchiveRecord> {
        fs::read_dir(source_root).map_err(|e| SidecarError::io(source_root, e))?;
        fs::create_dir_all(&self.staging_dir).map_err(|e| SidecarError::io(&self.staging_dir, e))?;

        let excludes = self.exclude_staging(source_root, excludes);
        let name = archive_name(at, self.format);
        let final_path = self.staging_dir.join(&name);
        if final_path.exists() {
            return Err(SidecarError::Archive(format!("{name} already exists")));
        }
        let partial_path = self.staging_dir.join(format!("{name}{PARTIAL_SUFFIX}"));

        let written = OpenOptions::new()
            .write(true)
            .create_new(true)
            .open(&partial_path)
            .map_err(|e| archive_error(&partial_path, e))
            .and_then(|file| self.write_archive(file, source_root, &excludes))
            .and_then(|()| {
                fs::rename(&partial_path, &final_path).map_err(|e| archive_error(&final_path, e))
            });
        if let Err(e) = written {
            if let Err(cleanup) = fs::remove_file(&partial_path)
                && cleanup.kind() != io::ErrorKind::NotFound
            {
                tracing::warn!(error = %cleanup, path = %partial_path.display(), "failed to remove partial archive");
            }
            return Err(e);
        }

        let size_bytes = fs::metadata(&final_path)
            .map_err(|e| SidecarError::io(&final_path, e))?
            .len();
        info!(archive = %name, size_bytes, "archive built");
        Ok(ArchiveRecord {
            name,
            created_at: at.timestamp_millis().max(0) as u64,
            size_bytes,
            tier: Tier::Local,
        })
    }

    /// The staging directory must never end up inside its own archive.
    fn exclude_staging(&self, source_root: &Path, excludes: &ExcludeSet) -> ExcludeSet {
        let excludes = excludes.clone();
        match (fs::canonicalize(source_root), fs::canonicalize(&self.staging_dir)) {
            (Ok(root), Ok(staging)) => match staging.strip_prefix(&root) {
                Ok(rel) => excludes.with_prefix(rel),
                Err(_) => excludes,
            },
            _ => excludes,
        }
    }

    fn write_archive(&self, file: File, source_root: &Path, excludes: &ExcludeSet) -> Result<()> {
        let file = match self.format {
            ArchiveFormat::TarGz => {
                let encoder = GzEncoder::new(file, Compression::new(self.compression_level));
                append_tree(encoder, source_root, excludes)?
                    .finish()
                    .map_err(|e| SidecarError::Archive(format!("finish compression: {e}")))?
            }
            ArchiveFormat::Tar => append_tree(file, source_root, excludes)?,
        };
        file.sync_all()
            .map_err(|e| SidecarError::Archive(format!("sync archive: {e}")))
    }
}

fn archive_error(path: &Path, e: io::Error) -> SidecarError {
    SidecarError::Archive(format!("{}: {e}", path.display()))
}

/// Depth-first walk; symlinks are stored as links, never followed.
fn append_tree<W: Write>(writer: W, source_root: &Path, excludes: &ExcludeSet) -> Result<W> {
    let mut builder = tar::Builder::new(writer);
    builder.follow_symlinks(false);

    let mut pending: Vec<PathBuf> = vec![PathBuf::new()];
    let mut entries_written: u64 = 0;
    while let Some(rel_dir) = pending.pop() {
        let dir = source_root.join(&rel_dir);
        let listing = fs::read_dir(&dir).map_err(|e| archive_error(&dir, e))?;
        let mut children: Vec<_> = listing
            .collect::<io::Result<Vec<_>>>()
            .map_err(|e| archive_error(&dir, e))?;
        children.sort_by_key(|entry| entry.file_name());

        for entry in children {
            let rel = rel_dir.join(entry.file_name());
            if excludes.is_excluded(&rel) {
                debug!(path = %rel.display(), "excluded");
                continue;
            }
            let path = entry.path();
            let file_type = entry.file_type().map_err(|e| archive_error(&path, e))?;
            if file_type.is_dir() {
                builder
                    .append_dir(&rel, &path)
                    .map_err(|e| archive_error(&path, e))?;
                pending.push(rel);
            } else {
                builder
                    .append_path_with_name(&path, &rel)
                    .map_err(|e| archive_error(&path, e))?;
            }
            entries_written += 1;
        }
    }
    debug!(entries_written, "archive entries written");
    builder
        .into_inner()
        .map_err(|e| SidecarError::Archive(format!("finish tar stream: {e}")))
}

/// Local tier, newest first. Missing staging directory means no archives yet.
pub fn list_local(staging_dir: &Path) -> Result<Vec<ArchiveRecord>> {
    let listing = match fs::read_dir(staging_dir) {
        Ok(listing) => listing,
        Err(e) if e.kind() == io::ErrorKind::NotFound => return Ok(Vec::new()),
        Err(e) => return Err(SidecarError::io(staging_dir, e)),
    };
    let mut records = Vec::new();
    for entry in listing {
        let entry = entry.map_err(|e| SidecarError::io(staging_dir, e))?;
        let name = entry.file_name().to_string_lossy().into_owned();
        let Some(created_at) = parse_archive_name(&name)? else {
            continue;
        };
        let metadata = entry.metadata().map_err(|e| SidecarError::io(entry.path(), e))?;
        if !metadata.is_file() {
            continue;
        }
        records.push(ArchiveRecord {
            name,
            created_at,
            size_bytes: metadata.len(),
            tier: Tier::Local,
        });
    }
    records.sort_by(ArchiveRecord::newest_first);
    Ok(records)
}

pub fn delete_local(staging_dir: &Path, record: &ArchiveRecord) -> Result<()> {
    let path = staging_dir.join(&record.name);
    fs::remove_file(&path).map_err(|e| SidecarError::io(path, e))
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    #[test]
    fn archive_name_sorts_chronologically() {
        let earlier = Utc.with_ymd_and_hms(2026, 1, 9, 23, 59, 59).unwrap();
        let later = Utc.with_ymd_and_hms(2026, 1, 10, 0, 0, 0).unwrap();
        let a = archive_name(earlier, ArchiveFormat::TarGz);
        let b = archive_name(later, ArchiveFormat::TarGz);
        assert_eq!(a, "backup_20260109_235959.tar.gz");
        assert!(a < b);
    }

    #[test]
    fn parse_roundtrips_timestamp() {
        let at = Utc.with_ymd_and_hms(2026, 3, 4, 5, 6, 7).unwrap();
        let name = archive_name(at, ArchiveFormat::Tar);
        assert_eq!(
            parse_archive_name(&name).unwrap(),
            Some(at.timestamp_millis() as u64)
        );
    }

    #[test]
    fn parse_ignores_foreign_and_partial_files() {
        assert_eq!(parse_archive_name("notes.txt").unwrap(), None);
        assert_eq!(
            parse_archive_name("backup_20260304_050607.tar.gz.partial").unwrap(),
            None
        );
    }

    #[test]
    fn parse_rejects_malformed_backup_names() {
        for name in [
            "backup_2026.tar.gz",
            "backup_20261304_050607.tar.gz",
            "backup_20260304_050607.zip",
            "backup_20260304_050607tar",
        ] {
            let err = parse_archive_name(name).unwrap_err();
            assert_eq!(err.kind(), crate::error::ErrorKind::Configuration, "{name}");
        }
    }
}
