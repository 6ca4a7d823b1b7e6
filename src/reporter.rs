// Correlated reporter: run a task with a continuous monitoring session alongside.
// The session stops when the task returns, is sealed, and is embedded in the
// report whether the task succeeded or failed.

use crate::models::{CorrelatedReport, TaskOutcome};
use crate::sampler::{SampleSource, SamplerConfig};
use crate::session;
use std::fmt::Display;
use std::future::Future;
use std::time::Duration;
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

/// The task's own error, unchanged, plus the sealed report collected while it ran.
#[derive(Debug, thiserror::Error)]
#[error("monitored task failed: {error}")]
pub struct TaskFailed<T, E> {
    pub error: E,
    pub report: CorrelatedReport<T>,
}

pub async fn run<S, F, Fut, T, E>(
    source: S,
    interval: Duration,
    task: F,
) -> Result<CorrelatedReport<T>, TaskFailed<T, E>>
where
    S: SampleSource,
    F: FnOnce() -> Fut,
    Fut: Future<Output = Result<T, E>>,
    E: Display,
{
    run_with(source, SamplerConfig::continuous(interval), task).await
}

/// `run` with an explicit sampler configuration. A bounded duration in `config`
/// is ignored: the session always ends with the task.
pub async fn run_with<S, F, Fut, T, E>(
    source: S,
    config: SamplerConfig,
    task: F,
) -> Result<CorrelatedReport<T>, TaskFailed<T, E>>
where
    S: SampleSource,
    F: FnOnce() -> Fut,
    Fut: Future<Output = Result<T, E>>,
    E: Display,
{
    let config = SamplerConfig {
        duration: None,
        ..config
    };
    let cancel = CancellationToken::new();
    // Stops the sampler if this future is dropped mid-run.
    let _stop_on_drop = cancel.clone().drop_guard();
    let started = Instant::now();

    let (task_result, session) = tokio::join!(
        async {
            let result = task().await;
            cancel.cancel();
            result
        },
        session::run_session(source, config, cancel.clone()),
    );
    let wall_clock_ms = started.elapsed().as_millis() as u64;

    match task_result {
        Ok(value) => {
            info!(wall_clock_ms, samples = session.samples.len(), "monitored task completed");
            Ok(CorrelatedReport {
                task_result: TaskOutcome::Completed { value },
                session,
                wall_clock_ms,
            })
        }
        Err(error) => {
            warn!(error = %error, wall_clock_ms, samples = session.samples.len(), "monitored task failed");
            let report = CorrelatedReport {
                task_result: TaskOutcome::Failed {
                    error: error.to_string(),
                },
                session,
                wall_clock_ms,
            };
            Err(TaskFailed { error, report })
        }
    }
}
