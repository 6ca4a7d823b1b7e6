use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use sidecar::backup::{BackupJob, UploadStatus};
use sidecar::config::AppConfig;
use sidecar::models::TaskOutcome;
use sidecar::remote_store::DirectoryStore;
use sidecar::reporter::{self, TaskFailed};
use sidecar::sampler::SamplerConfig;
use sidecar::sysinfo_repo::{self, SysinfoRepo};
use sidecar::task::{CommandTask, TaskError};
use sidecar::{logging, results, session, version};
use std::path::PathBuf;
use std::process::ExitCode;
use std::time::Duration;
use tokio_util::sync::CancellationToken;

#[global_allocator]
static GLOBAL: tikv_jemallocator::Jemalloc = tikv_jemallocator::Jemalloc;

#[derive(Parser)]
#[command(
    name = "sidecar",
    version,
    about = "Working-tree backups and host resource monitoring"
)]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Config file (default: $CONFIG_FILE, then ./sidecar.toml)
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    /// Enable debug logging
    #[arg(short, long, global = true)]
    verbose: bool,
}

#[derive(Subcommand)]
enum Commands {
    /// Archive the source tree, upload it and prune both tiers
    Backup {
        /// Archives kept per tier (overrides backup.max_backups)
        #[arg(long)]
        max_backups: Option<usize>,

        /// Include virtualenv directories in the archive
        #[arg(long)]
        include_venv: bool,
    },
    /// Sample host CPU, memory, disk and network usage
    Monitor {
        /// Run until interrupted
        #[arg(long, conflicts_with = "duration")]
        continuous: bool,

        /// Seconds between samples (default: monitoring.interval_secs)
        #[arg(long)]
        interval: Option<u64>,

        /// Stop after this many seconds
        #[arg(long)]
        duration: Option<u64>,

        /// Check host support and create output directories, then exit
        #[arg(long)]
        install_deps: bool,
    },
    /// Run a command while monitoring resources, then write a correlated report
    Run {
        /// Seconds between samples (default: monitoring.correlated_interval_secs)
        #[arg(long)]
        monitor_interval: Option<u64>,

        /// Command and arguments to run
        #[arg(required = true, trailing_var_arg = true, allow_hyphen_values = true)]
        command: Vec<String>,
    },
}

#[tokio::main]
async fn main() -> Result<ExitCode> {
    let cli = Cli::parse();

    let config = AppConfig::load(cli.config.as_deref());
    let _logging = logging::init(
        cli.verbose,
        config.as_ref().ok().map(|c| c.paths.logs_dir.as_path()),
    );
    let mut config = config.context("loading configuration")?;
    tracing::info!(version = %version::banner(), "starting");

    match cli.command {
        Commands::Backup {
            max_backups,
            include_venv,
        } => {
            if let Some(max) = max_backups {
                config.backup.max_backups = max;
            }
            config.backup.include_venv |= include_venv;
            backup(&config).await
        }
        Commands::Monitor {
            continuous,
            interval,
            duration,
            install_deps,
        } => {
            if install_deps {
                return preflight(&config);
            }
            let interval = positive_secs(
                interval.unwrap_or(config.monitoring.interval_secs),
                "--interval",
            )?;
            let duration = duration
                .map(|d| positive_secs(d, "--duration"))
                .transpose()?;
            monitor(&config, continuous, interval, duration).await
        }
        Commands::Run {
            monitor_interval,
            command,
        } => {
            let interval = positive_secs(
                monitor_interval.unwrap_or(config.monitoring.correlated_interval_secs),
                "--monitor-interval",
            )?;
            run(&config, interval, command).await
        }
    }
}

fn positive_secs(secs: u64, flag: &str) -> Result<Duration> {
    anyhow::ensure!(secs > 0, "{flag} must be > 0");
    Ok(Duration::from_secs(secs))
}

async fn backup(config: &AppConfig) -> Result<ExitCode> {
    let job = BackupJob::from_config(config)?;
    let store = config.remote.as_ref().map(DirectoryStore::from_config);
    let outcome = job.run(store.as_ref()).await.context("backup failed")?;

    println!(
        "Archive: {} ({} bytes)",
        outcome.archive.name, outcome.archive.size_bytes
    );
    match &outcome.upload {
        UploadStatus::Skipped => println!("Upload: skipped (no remote configured)"),
        UploadStatus::Uploaded { remote_name } => println!("Upload: {remote_name}"),
        UploadStatus::Failed { error } => println!("Upload: FAILED ({error})"),
    }
    let retention = std::iter::once(("local", &outcome.local_retention))
        .chain(outcome.remote_retention.as_ref().map(|r| ("remote", r)));
    for (tier, report) in retention {
        println!(
            "Retention ({tier}): kept {}, deleted {}, failed {}",
            report.kept.len(),
            report.deleted.len(),
            report.delete_errors.len()
        );
    }

    Ok(if outcome.is_complete() {
        ExitCode::SUCCESS
    } else {
        ExitCode::FAILURE
    })
}

fn preflight(config: &AppConfig) -> Result<ExitCode> {
    anyhow::ensure!(
        sysinfo_repo::host_supported(),
        "host metrics are not supported on {}",
        std::env::consts::OS
    );
    for dir in [&config.paths.results_dir, &config.paths.logs_dir] {
        std::fs::create_dir_all(dir).with_context(|| format!("creating {}", dir.display()))?;
    }
    println!(
        "Host metrics supported on {}; output directories ready.",
        std::env::consts::OS
    );
    Ok(ExitCode::SUCCESS)
}

async fn monitor(
    config: &AppConfig,
    continuous: bool,
    interval: Duration,
    duration: Option<Duration>,
) -> Result<ExitCode> {
    let repo = SysinfoRepo::new(config.monitoring.top_processes);

    if !continuous && duration.is_none() {
        let session = session::snapshot_session(repo, interval).await;
        match session.samples.last() {
            Some(sample) => print!("{}", results::render_sample(sample)),
            None => tracing::warn!("no sample could be collected"),
        }
        print!("{}", results::render_summary(&session));
        return Ok(ExitCode::SUCCESS);
    }

    let sampler_config = match duration {
        Some(duration) => SamplerConfig::bounded(interval, duration),
        None => SamplerConfig::continuous(interval),
    }
    .with_channel_capacity(config.monitoring.channel_capacity);

    let cancel = CancellationToken::new();
    let stop = cancel.clone();
    let signals = tokio::spawn(async move {
        shutdown_signal().await;
        tracing::info!("Received shutdown signal");
        stop.cancel();
    });
    let session = session::run_session(repo, sampler_config, cancel).await;
    signals.abort();

    let path = results::save_session(&config.paths.results_dir, &session)?;
    print!("{}", results::render_summary(&session));
    println!("Session saved to {}", path.display());
    Ok(ExitCode::SUCCESS)
}

async fn run(config: &AppConfig, interval: Duration, command: Vec<String>) -> Result<ExitCode> {
    let task = CommandTask::new(
        command,
        &config.paths.logs_dir,
        config.monitoring.summary_marker.clone(),
    )?;
    let command_line = task.command_line();
    let repo = SysinfoRepo::new(config.monitoring.top_processes);
    let sampler_config =
        SamplerConfig::continuous(interval).with_channel_capacity(config.monitoring.channel_capacity);

    let outcome = reporter::run_with(repo, sampler_config, || task.run()).await;
    let (report, task_output, exit_code) = match outcome {
        Ok(report) => {
            let output = match &report.task_result {
                TaskOutcome::Completed { value } => Some(value.clone()),
                TaskOutcome::Failed { .. } => None,
            };
            (report, output, 0)
        }
        Err(TaskFailed { error, report }) => {
            if let TaskError::Spawn { .. } | TaskError::Sidecar(_) = &error {
                tracing::error!(error = %error, "task could not be run");
            }
            let code = error.exit_code();
            let output = error.output().cloned();
            (report, output, code)
        }
    };

    let metrics = task_output.as_ref().map_or(&[][..], |o| o.metrics.as_slice());
    let text = results::render_report(&report, &command_line, metrics);
    let paths = results::save_report(&config.paths.results_dir, &report, &text)?;
    if let Some(output) = &task_output {
        println!("Task output saved to {}", output.output_path.display());
    }
    println!("Performance report saved to {}\n", paths.text.display());
    print!("{text}");

    Ok(ExitCode::from(u8::try_from(exit_code).unwrap_or(1)))
}

async fn shutdown_signal() {
    #[cfg(unix)]
    {
        let mut sigterm =
            match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
                Ok(s) => s,
                Err(_) => {
                    let _ = tokio::signal::ctrl_c().await;
                    return;
                }
            };
        tokio::select! {
            _ = tokio::signal::ctrl_c() => {}
            _ = sigterm.recv() => {}
        }
    }
    #[cfg(not(unix))]
    {
        let _ = tokio::signal::ctrl_c().await;
    }
}
