// Shared test helpers
#![allow(dead_code)]

use sidecar::error::{Result, SidecarError};
use sidecar::models::{ArchiveRecord, Sample, Tier, TopProcesses};
use sidecar::sampler::SampleSource;
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};

pub const GB: u64 = 1024 * 1024 * 1024;

pub fn sample(timestamp: u64, cpu_pct: f64, mem_pct: f64) -> Sample {
    let mem_total_bytes = 16 * GB;
    Sample {
        timestamp,
        cpu_pct,
        mem_pct,
        mem_used_bytes: (mem_total_bytes as f64 * mem_pct / 100.0) as u64,
        mem_total_bytes,
        disk_pct: 40.0,
        net_bytes_in: 0,
        net_bytes_out: 0,
        top_processes: TopProcesses::default(),
    }
}

pub fn record(name: &str, created_at: u64, tier: Tier) -> ArchiveRecord {
    ArchiveRecord {
        name: name.to_string(),
        created_at,
        size_bytes: 1024,
        tier,
    }
}

/// `backup_20260101_0000SS.tar.gz` records, one second apart, oldest first.
pub fn local_records(count: u64) -> Vec<ArchiveRecord> {
    (0..count)
        .map(|i| {
            record(
                &format!("backup_20260101_0000{i:02}.tar.gz"),
                1_767_225_600_000 + i * 1000,
                Tier::Local,
            )
        })
        .collect()
}

/// Sample source that replays a CPU sequence (memory mirrors it) and can fail chosen calls.
#[derive(Clone)]
pub struct FakeSource {
    cpu: Arc<Vec<f64>>,
    fail_on: Arc<Vec<usize>>,
    calls: Arc<AtomicUsize>,
}

impl FakeSource {
    pub fn constant(cpu_pct: f64) -> Self {
        Self::sequence(vec![cpu_pct])
    }

    pub fn sequence(cpu: Vec<f64>) -> Self {
        Self {
            cpu: Arc::new(cpu),
            fail_on: Arc::new(Vec::new()),
            calls: Arc::new(AtomicUsize::new(0)),
        }
    }

    /// Calls are numbered from 0.
    pub fn failing_on(mut self, calls: Vec<usize>) -> Self {
        self.fail_on = Arc::new(calls);
        self
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

impl SampleSource for FakeSource {
    async fn collect(&self, timestamp: u64) -> Result<Sample> {
        let n = self.calls.fetch_add(1, Ordering::SeqCst);
        if self.fail_on.contains(&n) {
            return Err(SidecarError::Sampling(format!("fake failure on call {n}")));
        }
        let cpu = self.cpu[n % self.cpu.len()];
        Ok(sample(timestamp, cpu, cpu / 2.0))
    }
}
