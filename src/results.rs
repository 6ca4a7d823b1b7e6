// Persisted monitoring results and their text renderings.
// Files are named `<kind>_YYYYMMDD_HHMMSS.<ext>` stamped in UTC; the directory
// listing is the index, so names must sort chronologically. Displayed times are local.

use crate::error::{Result, SidecarError};
use crate::models::{CorrelatedReport, MonitoringSession, Sample, TaskOutcome};
use crate::task::SummaryMetric;
use chrono::{DateTime, Local, TimeZone, Utc};
use serde::Serialize;
use std::fmt::Write as _;
use std::path::{Path, PathBuf};
use tracing::info;

const STAMP_FORMAT: &str = "%Y%m%d_%H%M%S";
const DISPLAY_FORMAT: &str = "%Y-%m-%d %H:%M:%S";
const GB: f64 = 1024.0 * 1024.0 * 1024.0;

pub fn file_stamp(at: DateTime<Utc>) -> String {
    at.format(STAMP_FORMAT).to_string()
}

fn utc_time(ms: u64) -> DateTime<Utc> {
    Utc.timestamp_millis_opt(ms as i64)
        .single()
        .unwrap_or_else(Utc::now)
}

fn local_time(ms: u64) -> DateTime<Local> {
    Local
        .timestamp_millis_opt(ms as i64)
        .single()
        .unwrap_or_else(Local::now)
}

pub fn display_time(ms: u64) -> String {
    local_time(ms).format(DISPLAY_FORMAT).to_string()
}

/// `<dir>/<prefix>_<stamp>.<ext>`, with `_N` appended while the name is taken.
pub fn unique_path(dir: &Path, prefix: &str, stamp: &str, ext: &str) -> PathBuf {
    let first = dir.join(format!("{prefix}_{stamp}.{ext}"));
    if !first.exists() {
        return first;
    }
    (1u32..)
        .map(|n| dir.join(format!("{prefix}_{stamp}_{n}.{ext}")))
        .find(|p| !p.exists())
        .unwrap_or(first)
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ReportPaths {
    pub json: PathBuf,
    pub text: PathBuf,
}

fn write_file(path: &Path, contents: &[u8]) -> Result<()> {
    std::fs::write(path, contents).map_err(|e| SidecarError::io(path, e))
}

fn to_json<T: Serialize>(path: &Path, value: &T) -> Result<Vec<u8>> {
    serde_json::to_vec_pretty(value).map_err(|e| SidecarError::io(path, std::io::Error::other(e)))
}

fn ensure_dir(dir: &Path) -> Result<()> {
    std::fs::create_dir_all(dir).map_err(|e| SidecarError::io(dir, e))
}

/// `peak_usage_<start>.json`, pretty JSON.
pub fn save_session(dir: &Path, session: &MonitoringSession) -> Result<PathBuf> {
    ensure_dir(dir)?;
    let stamp = file_stamp(utc_time(session.started_at));
    let path = unique_path(dir, "peak_usage", &stamp, "json");
    write_file(&path, &to_json(&path, session)?)?;
    info!(path = %path.display(), samples = session.samples.len(), "session saved");
    Ok(path)
}

/// `correlated_report_<stamp>.json` plus the text rendering as `performance_report_<stamp>.txt`.
pub fn save_report<T: Serialize>(
    dir: &Path,
    report: &CorrelatedReport<T>,
    text: &str,
) -> Result<ReportPaths> {
    ensure_dir(dir)?;
    let stamp = file_stamp(Utc::now());
    let json = unique_path(dir, "correlated_report", &stamp, "json");
    write_file(&json, &to_json(&json, report)?)?;
    let text_path = unique_path(dir, "performance_report", &stamp, "txt");
    write_file(&text_path, text.as_bytes())?;
    info!(json = %json.display(), text = %text_path.display(), "report saved");
    Ok(ReportPaths {
        json,
        text: text_path,
    })
}

/// Peak-usage summary of a sealed session.
pub fn render_summary(session: &MonitoringSession) -> String {
    let mut out = String::new();
    let _ = writeln!(out, "\n===== PEAK USAGE SUMMARY =====\n");
    write_usage(&mut out, session, true);
    let _ = writeln!(out, "\n===============================");
    out
}

fn write_usage(out: &mut String, session: &MonitoringSession, with_duration: bool) {
    let end = session
        .ended_at
        .map_or_else(|| "(running)".to_string(), display_time);
    let _ = writeln!(
        out,
        "Monitoring Period: {} to {end}",
        display_time(session.started_at)
    );
    if with_duration {
        let _ = writeln!(
            out,
            "Duration: {:.2} seconds",
            session.actual_duration_ms() as f64 / 1000.0
        );
    }
    let _ = writeln!(out, "Samples: {}\n", session.samples.len());

    let Some(summary) = session.summary.filter(|s| s.sample_count > 0) else {
        let _ = writeln!(out, "No samples were collected.");
        return;
    };
    let at = |peak_at: Option<u64>| peak_at.map_or_else(|| "-".to_string(), display_time);
    let _ = writeln!(out, "Peak CPU Usage: {:.1}%", summary.cpu.peak);
    let _ = writeln!(out, "  Occurred at: {}\n", at(summary.cpu.peak_at));
    let _ = writeln!(out, "Peak RAM Usage: {:.1}%", summary.mem.peak);
    let _ = writeln!(
        out,
        "  ({:.2} GB / {:.2} GB)",
        summary.peak_mem_used_bytes as f64 / GB,
        summary.mem_total_bytes as f64 / GB
    );
    let _ = writeln!(out, "  Occurred at: {}\n", at(summary.mem.peak_at));
    let _ = writeln!(out, "Average CPU Usage: {:.2}%", summary.cpu.avg);
    let _ = writeln!(out, "Average RAM Usage: {:.2}%", summary.mem.avg);
}

/// One sample with its top-K process lists.
pub fn render_sample(sample: &Sample) -> String {
    let mut out = String::new();
    let _ = writeln!(out, "Sample at {}", display_time(sample.timestamp));
    let _ = writeln!(out, "  CPU:  {:.1}%", sample.cpu_pct);
    let _ = writeln!(
        out,
        "  RAM:  {:.1}% ({:.2} GB / {:.2} GB)",
        sample.mem_pct,
        sample.mem_used_bytes as f64 / GB,
        sample.mem_total_bytes as f64 / GB
    );
    let _ = writeln!(out, "  Disk: {:.1}%", sample.disk_pct);
    let _ = writeln!(
        out,
        "  Net:  {} B in / {} B out",
        sample.net_bytes_in, sample.net_bytes_out
    );
    for (title, list) in [
        ("Top processes by CPU", &sample.top_processes.by_cpu),
        ("Top processes by memory", &sample.top_processes.by_mem),
    ] {
        let _ = writeln!(out, "  {title}:");
        for p in list {
            let _ = writeln!(
                out,
                "    {:>7}  {:<24} cpu {:>6.1}%  mem {:>5.1}%",
                p.pid, p.name, p.cpu_pct, p.mem_pct
            );
        }
    }
    out
}

/// Text performance report for a correlated run.
pub fn render_report<T>(
    report: &CorrelatedReport<T>,
    command: &str,
    metrics: &[SummaryMetric],
) -> String {
    let rule = "=".repeat(60);
    let mut out = String::new();
    let _ = writeln!(out, "{rule}\nPERFORMANCE REPORT\n{rule}\n");
    let _ = writeln!(
        out,
        "Report generated: {}\n",
        Local::now().format(DISPLAY_FORMAT)
    );
    let _ = writeln!(out, "TASK\n{}", "-".repeat(30));
    let _ = writeln!(out, "Command: {command}");
    let _ = writeln!(
        out,
        "Duration: {:.2} seconds",
        report.wall_clock_ms as f64 / 1000.0
    );
    match &report.task_result {
        TaskOutcome::Completed { .. } => {
            let _ = writeln!(out, "Status: completed");
        }
        TaskOutcome::Failed { error } => {
            let _ = writeln!(out, "Status: failed ({error})");
        }
    }
    for metric in metrics {
        let _ = writeln!(out, "{}: {}", metric.key, metric.value);
    }
    let _ = writeln!(out, "\nSYSTEM RESOURCE USAGE\n{}", "-".repeat(30));
    write_usage(&mut out, &report.session, false);
    let _ = writeln!(out, "\n{rule}");
    out
}
