// Sidecar library: backup retention and resource monitoring; the binary and tests build on it

pub mod archive;
pub mod backup;
pub mod config;
pub mod error;
pub mod logging;
pub mod models;
pub mod peak_tracker;
pub mod remote_store;
pub mod reporter;
pub mod results;
pub mod retention;
pub mod sampler;
pub mod session;
pub mod sysinfo_repo;
pub mod task;
pub mod version;

pub use error::{ErrorKind, Result, SidecarError};
