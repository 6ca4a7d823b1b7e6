// External command measured by the correlated entrypoint.
// Output is captured to a task log; `key: value` lines in the summary block
// become the task's metrics.

use crate::error::{Result, SidecarError};
use crate::results;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::PathBuf;
use std::process::Stdio;
use tokio::process::Command;
use tokio::time::Instant;
use tracing::{info, instrument};

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SummaryMetric {
    pub key: String,
    pub value: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TaskOutput {
    pub command: String,
    /// `None` when the process was killed by a signal.
    pub exit_code: Option<i32>,
    pub output_path: PathBuf,
    pub metrics: Vec<SummaryMetric>,
    pub duration_ms: u64,
}

#[derive(Debug, thiserror::Error)]
pub enum TaskError {
    #[error("failed to start {command}: {source}")]
    Spawn {
        command: String,
        #[source]
        source: std::io::Error,
    },
    #[error("{} exited with {}", .output.command, ExitStatusDisplay(.output.exit_code))]
    Exited { output: TaskOutput },
    #[error(transparent)]
    Sidecar(#[from] SidecarError),
}

impl TaskError {
    /// Process exit code to propagate: the task's own code, else 1.
    pub fn exit_code(&self) -> i32 {
        match self {
            TaskError::Exited { output } => output.exit_code.unwrap_or(1),
            _ => 1,
        }
    }

    pub fn output(&self) -> Option<&TaskOutput> {
        match self {
            TaskError::Exited { output } => Some(output),
            _ => None,
        }
    }
}

struct ExitStatusDisplay(Option<i32>);

impl fmt::Display for ExitStatusDisplay {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.0 {
            Some(code) => write!(f, "status {code}"),
            None => f.write_str("a signal"),
        }
    }
}

#[derive(Debug, Clone)]
pub struct CommandTask {
    program: String,
    args: Vec<String>,
    logs_dir: PathBuf,
    summary_marker: String,
}

impl CommandTask {
    pub fn new(
        command: Vec<String>,
        logs_dir: impl Into<PathBuf>,
        summary_marker: impl Into<String>,
    ) -> Result<Self> {
        let mut command = command.into_iter();
        let program = command
            .next()
            .filter(|p| !p.trim().is_empty())
            .ok_or_else(|| SidecarError::Configuration("no command given to run".into()))?;
        Ok(Self {
            program,
            args: command.collect(),
            logs_dir: logs_dir.into(),
            summary_marker: summary_marker.into(),
        })
    }

    pub fn command_line(&self) -> String {
        std::iter::once(self.program.as_str())
            .chain(self.args.iter().map(String::as_str))
            .collect::<Vec<_>>()
            .join(" ")
    }

    /// Run to completion. A non-zero exit is an error carrying the captured output.
    #[instrument(skip(self), fields(operation = "run_task", program = %self.program))]
    pub async fn run(&self) -> std::result::Result<TaskOutput, TaskError> {
        let command = self.command_line();
        let started = Instant::now();
        let output = Command::new(&self.program)
            .args(&self.args)
            .stdin(Stdio::null())
            .kill_on_drop(true)
            .output()
            .await
            .map_err(|source| TaskError::Spawn {
                command: command.clone(),
                source,
            })?;
        let duration_ms = started.elapsed().as_millis() as u64;

        let stdout = String::from_utf8_lossy(&output.stdout);
        let stderr = String::from_utf8_lossy(&output.stderr);
        let output_path = self.write_log(&stdout, &stderr).await?;
        let result = TaskOutput {
            command,
            exit_code: output.status.code(),
            output_path,
            metrics: parse_summary(&stdout, &self.summary_marker),
            duration_ms,
        };
        info!(
            exit_code = ?result.exit_code,
            duration_ms,
            output = %result.output_path.display(),
            "task finished"
        );

        if output.status.success() {
            Ok(result)
        } else {
            Err(TaskError::Exited { output: result })
        }
    }

    async fn write_log(&self, stdout: &str, stderr: &str) -> Result<PathBuf> {
        tokio::fs::create_dir_all(&self.logs_dir)
            .await
            .map_err(|e| SidecarError::io(&self.logs_dir, e))?;
        let stamp = results::file_stamp(chrono::Utc::now());
        let path = results::unique_path(&self.logs_dir, "task_output", &stamp, "log");
        let mut contents = String::with_capacity(stdout.len() + stderr.len() + 16);
        contents.push_str(stdout);
        if !stderr.is_empty() {
            contents.push_str("\n\nERRORS:\n");
            contents.push_str(stderr);
        }
        tokio::fs::write(&path, contents)
            .await
            .map_err(|e| SidecarError::io(&path, e))?;
        Ok(path)
    }
}

/// `key: value` lines after the line containing `marker`, up to the next line containing `===`.
/// A repeated key keeps its first position and takes the later value.
pub fn parse_summary(output: &str, marker: &str) -> Vec<SummaryMetric> {
    let mut metrics: Vec<SummaryMetric> = Vec::new();
    let mut in_summary = false;
    for line in output.lines() {
        if line.contains(marker) {
            in_summary = true;
            continue;
        }
        if !in_summary {
            continue;
        }
        if line.contains("===") {
            in_summary = false;
            continue;
        }
        let Some((key, value)) = line.split_once(':') else {
            continue;
        };
        let (key, value) = (key.trim(), value.trim());
        match metrics.iter_mut().find(|m| m.key == key) {
            Some(existing) => existing.value = value.to_string(),
            None => metrics.push(SummaryMetric {
                key: key.to_string(),
                value: value.to_string(),
            }),
        }
    }
    metrics
}

#[cfg(test)]
mod tests {
    use super::*;

    const MARKER: &str = "=== Backtest Summary ===";

    #[test]
    fn parses_only_the_summary_block() {
        let output = "\
loading data: 10 rows
=== Backtest Summary ===
Total Return: 12.5%
Sharpe Ratio: 1.4
Note: a: b
=== End ===
Trailing: ignored
";
        let metrics = parse_summary(output, MARKER);
        let pairs: Vec<_> = metrics.iter().map(|m| (m.key.as_str(), m.value.as_str())).collect();
        assert_eq!(
            pairs,
            [("Total Return", "12.5%"), ("Sharpe Ratio", "1.4"), ("Note", "a: b")]
        );
    }

    #[test]
    fn missing_marker_yields_no_metrics() {
        assert!(parse_summary("Total Return: 1%\n", MARKER).is_empty());
    }

    #[test]
    fn empty_command_is_rejected() {
        let err = CommandTask::new(vec![], "logs", MARKER).unwrap_err();
        assert_eq!(err.kind(), crate::error::ErrorKind::Configuration);
    }
}
