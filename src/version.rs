// Package identity baked in at compile time

pub const NAME: &str = env!("CARGO_PKG_NAME");
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

/// `worktree-sidecar 0.3.0`, logged once at startup.
pub fn banner() -> String {
    format!("{NAME} {VERSION}")
}
