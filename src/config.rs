use crate::archive::ArchiveFormat;
use crate::error::{Result, SidecarError};
use serde::Deserialize;
use std::fmt;
use std::path::{Path, PathBuf};

/// Used when neither `--config` nor `CONFIG_FILE` names a file.
pub const DEFAULT_CONFIG_FILE: &str = "sidecar.toml";

const ACCESS_KEY_ENV: &str = "SIDECAR_ACCESS_KEY_ID";
const SECRET_KEY_ENV: &str = "SIDECAR_SECRET_ACCESS_KEY";

/// Process-wide configuration, built once at startup and passed down by value.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct AppConfig {
    pub paths: PathsConfig,
    pub backup: BackupConfig,
    /// Absent section disables upload and remote retention.
    pub remote: Option<RemoteConfig>,
    pub monitoring: MonitoringConfig,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct PathsConfig {
    /// Working tree to back up.
    pub source_root: PathBuf,
    /// Local staging directory; also the local archive tier.
    pub backup_dir: PathBuf,
    /// Monitoring sessions and correlated reports.
    pub results_dir: PathBuf,
    /// Task output logs and sidecar.log.
    pub logs_dir: PathBuf,
}

impl Default for PathsConfig {
    fn default() -> Self {
        Self {
            source_root: PathBuf::from("."),
            backup_dir: PathBuf::from("backups"),
            results_dir: PathBuf::from("monitoring"),
            logs_dir: PathBuf::from("logs"),
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct BackupConfig {
    pub max_backups: usize,
    /// Remote tier count; falls back to `max_backups`.
    pub max_remote_backups: Option<usize>,
    pub include_venv: bool,
    /// Added to the built-in excludes.
    pub exclude_patterns: Vec<String>,
    pub format: ArchiveFormat,
    /// gzip level, 0-9. Ignored for plain tar.
    pub compression_level: u32,
}

impl Default for BackupConfig {
    fn default() -> Self {
        Self {
            max_backups: 5,
            max_remote_backups: None,
            include_venv: false,
            exclude_patterns: Vec::new(),
            format: ArchiveFormat::TarGz,
            compression_level: 6,
        }
    }
}

impl BackupConfig {
    pub fn remote_max_backups(&self) -> usize {
        self.max_remote_backups.unwrap_or(self.max_backups)
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct RemoteConfig {
    /// Directory the bucket is mounted under.
    pub root: PathBuf,
    pub bucket: String,
    #[serde(default)]
    pub prefix: String,
    #[serde(default)]
    pub region: Option<String>,
    #[serde(default)]
    pub access_key_id: Option<String>,
    #[serde(default)]
    pub secret_access_key: Option<Secret>,
    #[serde(default = "default_upload_attempts")]
    pub upload_attempts: u32,
    #[serde(default = "default_retry_backoff_ms")]
    pub retry_backoff_ms: u64,
}

fn default_upload_attempts() -> u32 {
    3
}

fn default_retry_backoff_ms() -> u64 {
    1000
}

/// Credential value; never printed.
#[derive(Clone, Deserialize)]
#[serde(transparent)]
pub struct Secret(String);

impl Secret {
    pub fn new(value: impl Into<String>) -> Self {
        Secret(value.into())
    }

    pub fn expose(&self) -> &str {
        &self.0
    }
}

impl fmt::Debug for Secret {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("Secret(***)")
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct MonitoringConfig {
    pub interval_secs: u64,
    /// Sampling interval for `run` when `--monitor-interval` is not given.
    pub correlated_interval_secs: u64,
    /// K for the top-K process lists.
    pub top_processes: usize,
    /// Capacity of the sampler -> session channel.
    pub channel_capacity: usize,
    /// Line that opens the key/value summary block in task output.
    pub summary_marker: String,
}

impl Default for MonitoringConfig {
    fn default() -> Self {
        Self {
            interval_secs: 5,
            correlated_interval_secs: 2,
            top_processes: 5,
            channel_capacity: 64,
            summary_marker: "=== Backtest Summary ===".into(),
        }
    }
}

impl AppConfig {
    /// Load from `explicit`, else `CONFIG_FILE`, else `sidecar.toml` when present, else defaults.
    /// Credentials from the environment override the file.
    pub fn load(explicit: Option<&Path>) -> Result<Self> {
        let path = explicit
            .map(Path::to_path_buf)
            .or_else(|| std::env::var_os("CONFIG_FILE").map(PathBuf::from))
            .or_else(|| {
                let default = PathBuf::from(DEFAULT_CONFIG_FILE);
                default.exists().then_some(default)
            });
        let mut config = match path {
            Some(path) => {
                let s = std::fs::read_to_string(&path).map_err(|e| SidecarError::io(&path, e))?;
                Self::parse(&s)?
            }
            None => Self::default(),
        };
        config.apply_env_credentials(
            std::env::var(ACCESS_KEY_ENV).ok(),
            std::env::var(SECRET_KEY_ENV).ok(),
        );
        config.validate()?;
        Ok(config)
    }

    /// Parse and validate config from a string (e.g. for tests).
    pub fn load_from_str(s: &str) -> Result<Self> {
        let config = Self::parse(s)?;
        config.validate()?;
        Ok(config)
    }

    fn parse(s: &str) -> Result<Self> {
        toml::from_str(s).map_err(|e| SidecarError::Configuration(e.to_string()))
    }

    fn apply_env_credentials(&mut self, access_key: Option<String>, secret: Option<String>) {
        let Some(remote) = self.remote.as_mut() else {
            return;
        };
        if let Some(key) = access_key.filter(|k| !k.is_empty()) {
            remote.access_key_id = Some(key);
        }
        if let Some(secret) = secret.filter(|s| !s.is_empty()) {
            remote.secret_access_key = Some(Secret::new(secret));
        }
    }

    pub fn validate(&self) -> Result<()> {
        ensure(
            !self.paths.source_root.as_os_str().is_empty(),
            "paths.source_root must be non-empty",
        )?;
        ensure(
            !self.paths.backup_dir.as_os_str().is_empty(),
            "paths.backup_dir must be non-empty",
        )?;
        ensure(
            !self.paths.results_dir.as_os_str().is_empty(),
            "paths.results_dir must be non-empty",
        )?;
        ensure(
            !self.paths.logs_dir.as_os_str().is_empty(),
            "paths.logs_dir must be non-empty",
        )?;
        ensure(
            self.backup.compression_level <= 9,
            format!(
                "backup.compression_level must be between 0 and 9, got {}",
                self.backup.compression_level
            ),
        )?;
        for (i, pattern) in self.backup.exclude_patterns.iter().enumerate() {
            if let Err(e) = glob::Pattern::new(pattern.trim()) {
                return Err(SidecarError::Configuration(format!(
                    "backup.exclude_patterns[{i}] is not a valid glob ({pattern:?}): {e}"
                )));
            }
        }
        ensure(
            self.monitoring.interval_secs > 0,
            "monitoring.interval_secs must be > 0, got 0",
        )?;
        ensure(
            self.monitoring.correlated_interval_secs > 0,
            "monitoring.correlated_interval_secs must be > 0, got 0",
        )?;
        ensure(
            self.monitoring.top_processes > 0,
            "monitoring.top_processes must be > 0, got 0",
        )?;
        ensure(
            self.monitoring.channel_capacity > 0,
            "monitoring.channel_capacity must be > 0, got 0",
        )?;
        if let Some(remote) = &self.remote {
            ensure(
                !remote.bucket.trim().is_empty(),
                "remote.bucket must be non-empty",
            )?;
            ensure(
                !remote.root.as_os_str().is_empty(),
                "remote.root must be non-empty",
            )?;
            ensure(
                remote.upload_attempts > 0,
                "remote.upload_attempts must be > 0, got 0",
            )?;
            ensure(
                remote.access_key_id.is_some() == remote.secret_access_key.is_some(),
                "remote.access_key_id and remote.secret_access_key must be set together",
            )?;
        }
        Ok(())
    }
}

fn ensure(condition: bool, message: impl Into<String>) -> Result<()> {
    if condition {
        Ok(())
    } else {
        Err(SidecarError::Configuration(message.into()))
    }
}
