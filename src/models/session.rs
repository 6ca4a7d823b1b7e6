// Monitoring session, peaks and summary models

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;

use super::Sample;

/// Metrics tracked for peaks and averages.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Metric {
    Cpu,
    Mem,
}

impl Metric {
    pub const ALL: [Metric; 2] = [Metric::Cpu, Metric::Mem];
}

impl fmt::Display for Metric {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Metric::Cpu => f.write_str("cpu"),
            Metric::Mem => f.write_str("mem"),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PeakRecord {
    pub metric: Metric,
    pub value: f64,
    /// Timestamp of the sample that set this peak.
    pub observed_at: u64,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MetricSummary {
    pub peak: f64,
    pub peak_at: Option<u64>,
    pub avg: f64,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SessionSummary {
    pub cpu: MetricSummary,
    pub mem: MetricSummary,
    pub sample_count: usize,
    /// Memory in use when the memory peak was observed.
    pub peak_mem_used_bytes: u64,
    pub mem_total_bytes: u64,
}

impl SessionSummary {
    pub fn metric(&self, metric: Metric) -> &MetricSummary {
        match metric {
            Metric::Cpu => &self.cpu,
            Metric::Mem => &self.mem,
        }
    }
}

/// Samples gathered between start and seal. `ended_at` and `summary` are set once, at seal.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MonitoringSession {
    pub started_at: u64,
    pub ended_at: Option<u64>,
    pub interval_ms: u64,
    /// `None` for continuous sessions.
    pub duration_ms: Option<u64>,
    pub samples: Vec<Sample>,
    pub peaks: BTreeMap<Metric, PeakRecord>,
    pub summary: Option<SessionSummary>,
}

impl MonitoringSession {
    pub fn is_sealed(&self) -> bool {
        self.ended_at.is_some()
    }

    /// Wall-clock span of the session; zero while unsealed.
    pub fn actual_duration_ms(&self) -> u64 {
        self.ended_at
            .map_or(0, |end| end.saturating_sub(self.started_at))
    }
}
