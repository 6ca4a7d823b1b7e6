// Error kinds shared by the backup and monitoring paths.

use std::path::PathBuf;

pub type Result<T, E = SidecarError> = std::result::Result<T, E>;

/// Coarse classification used for exit codes and log fields.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    Io,
    Archive,
    Remote,
    Configuration,
    Sampling,
}

#[derive(Debug, thiserror::Error)]
pub enum SidecarError {
    #[error("I/O failure on {}: {source}", .path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("archive failure: {0}")]
    Archive(String),
    #[error("remote store failure: {0}")]
    Remote(String),
    #[error("configuration error: {0}")]
    Configuration(String),
    /// Host metrics unavailable for one tick; callers skip the tick.
    #[error("sampling failure: {0}")]
    Sampling(String),
}

impl SidecarError {
    pub fn io(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        SidecarError::Io {
            path: path.into(),
            source,
        }
    }

    pub fn kind(&self) -> ErrorKind {
        match self {
            SidecarError::Io { .. } => ErrorKind::Io,
            SidecarError::Archive(_) => ErrorKind::Archive,
            SidecarError::Remote(_) => ErrorKind::Remote,
            SidecarError::Configuration(_) => ErrorKind::Configuration,
            SidecarError::Sampling(_) => ErrorKind::Sampling,
        }
    }
}
