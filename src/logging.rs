// Tracing subscriber for the sidecar binary: console plus `<logs_dir>/sidecar.log`.

use std::path::Path;
use tracing_appender::non_blocking::WorkerGuard;
use tracing_subscriber::EnvFilter;
use tracing_subscriber::fmt::time::FormatTime;
use tracing_subscriber::fmt::writer::{BoxMakeWriter, MakeWriterExt};

pub const LOG_FILE_NAME: &str = "sidecar.log";

struct LocalTimer;

impl FormatTime for LocalTimer {
    fn format_time(&self, w: &mut tracing_subscriber::fmt::format::Writer<'_>) -> std::fmt::Result {
        write!(
            w,
            "{}",
            chrono::Local::now().format("%Y-%m-%dT%H:%M:%S%.3f%:z")
        )
    }
}

/// Keeps the file writer's worker alive; drop it last in `main`.
pub struct LoggingGuard {
    _file_guard: Option<WorkerGuard>,
}

/// `RUST_LOG` wins when set; otherwise `info`, or `debug` when verbose.
pub fn env_filter(verbose: bool) -> EnvFilter {
    EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(if verbose { "debug" } else { "info" }))
}

/// Console logs go to stderr so reports printed on stdout stay clean.
/// When `log_dir` cannot be created, logging continues on the console only.
pub fn init(verbose: bool, log_dir: Option<&Path>) -> LoggingGuard {
    let console = BoxMakeWriter::new(std::io::stderr);
    let (writer, file_guard) = match log_dir.map(|dir| (dir, std::fs::create_dir_all(dir))) {
        Some((dir, Ok(()))) => {
            let appender = tracing_appender::rolling::never(dir, LOG_FILE_NAME);
            let (non_blocking, guard) = tracing_appender::non_blocking(appender);
            (BoxMakeWriter::new(std::io::stderr.and(non_blocking)), Some(guard))
        }
        Some((dir, Err(e))) => {
            eprintln!("sidecar: cannot create log directory {}: {e}", dir.display());
            (console, None)
        }
        None => (console, None),
    };

    let installed = tracing_subscriber::fmt()
        .with_timer(LocalTimer)
        .with_env_filter(env_filter(verbose))
        .with_writer(writer)
        .with_ansi(file_guard.is_none())
        .try_init();
    if let Err(e) = installed {
        eprintln!("sidecar: tracing subscriber already installed: {e}");
    }
    LoggingGuard {
        _file_guard: file_guard,
    }
}
