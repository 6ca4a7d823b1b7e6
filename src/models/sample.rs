// Host resource samples

use serde::{Deserialize, Serialize};

use super::Metric;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ProcessUsage {
    pub pid: u32,
    pub name: String,
    /// Per-core scale: a process saturating two cores reports 200.
    pub cpu_pct: f64,
    pub mem_pct: f64,
}

/// Top-K processes at the sampling instant, ranked separately by CPU and by memory.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TopProcesses {
    pub by_cpu: Vec<ProcessUsage>,
    pub by_mem: Vec<ProcessUsage>,
}

/// One timestamped snapshot of host resource usage. Never mutated after emission.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Sample {
    /// Milliseconds since the Unix epoch.
    pub timestamp: u64,
    pub cpu_pct: f64,
    pub mem_pct: f64,
    pub mem_used_bytes: u64,
    pub mem_total_bytes: u64,
    pub disk_pct: f64,
    /// Bytes received since the previous sample, all interfaces.
    pub net_bytes_in: u64,
    /// Bytes transmitted since the previous sample, all interfaces.
    pub net_bytes_out: u64,
    pub top_processes: TopProcesses,
}

impl Sample {
    pub fn value(&self, metric: Metric) -> f64 {
        match metric {
            Metric::Cpu => self.cpu_pct,
            Metric::Mem => self.mem_pct,
        }
    }
}
