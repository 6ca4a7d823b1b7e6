// Host resource probe via sysinfo

use crate::error::{Result, SidecarError};
use crate::models::{ProcessUsage, Sample, TopProcesses};
use crate::sampler::SampleSource;
use std::cmp::Ordering;
use std::sync::{Arc, Mutex};
use std::time::Instant;
use sysinfo::{Disks, Networks, Process, ProcessesToUpdate, System};
use tracing::instrument;

/// Whether sysinfo can read host counters on this OS.
pub fn host_supported() -> bool {
    sysinfo::IS_SUPPORTED_SYSTEM
}

struct ProbeState {
    sys: System,
    disks: Disks,
    networks: Networks,
    /// CPU counters are deltas; two refreshes closer than
    /// `MINIMUM_CPU_UPDATE_INTERVAL` report garbage.
    last_cpu_refresh: Instant,
}

/// Shared across clones; collections are serialized by the state lock.
#[derive(Clone)]
pub struct SysinfoRepo {
    state: Arc<Mutex<ProbeState>>,
    top_k: usize,
}

impl SysinfoRepo {
    pub fn new(top_k: usize) -> Self {
        let mut sys = System::new();
        sys.refresh_cpu_all();
        sys.refresh_memory();
        sys.refresh_processes(ProcessesToUpdate::All, true);
        let disks = Disks::new_with_refreshed_list();
        let networks = Networks::new_with_refreshed_list();
        Self {
            state: Arc::new(Mutex::new(ProbeState {
                sys,
                disks,
                networks,
                last_cpu_refresh: Instant::now(),
            })),
            top_k,
        }
    }

    pub fn top_k(&self) -> usize {
        self.top_k
    }

    /// One sample of the host. Blocks the calling thread; use from `spawn_blocking`.
    fn collect_blocking(state: &Mutex<ProbeState>, top_k: usize, timestamp: u64) -> Result<Sample> {
        let mut state = state
            .lock()
            .map_err(|e| SidecarError::Sampling(format!("sysinfo lock poisoned: {e}")))?;

        let since = state.last_cpu_refresh.elapsed();
        if since < sysinfo::MINIMUM_CPU_UPDATE_INTERVAL {
            std::thread::sleep(sysinfo::MINIMUM_CPU_UPDATE_INTERVAL - since);
        }
        let ProbeState {
            sys,
            disks,
            networks,
            last_cpu_refresh,
        } = &mut *state;
        sys.refresh_cpu_all();
        sys.refresh_memory();
        sys.refresh_processes(ProcessesToUpdate::All, true);
        *last_cpu_refresh = Instant::now();

        let mem_total_bytes = sys.total_memory();
        if mem_total_bytes == 0 || sys.cpus().is_empty() {
            return Err(SidecarError::Sampling(
                "host reported no CPUs or zero memory".into(),
            ));
        }
        let mem_used_bytes = mem_total_bytes.saturating_sub(sys.available_memory());

        disks.refresh(false);
        let (disk_used, disk_total) = disks.list().iter().fold((0u64, 0u64), |(used, total), d| {
            (
                used + d.total_space().saturating_sub(d.available_space()),
                total + d.total_space(),
            )
        });

        networks.refresh(true);
        let (net_bytes_in, net_bytes_out) = networks
            .list()
            .values()
            .fold((0u64, 0u64), |(rx, tx), data| {
                (rx.saturating_add(data.received()), tx.saturating_add(data.transmitted()))
            });

        Ok(Sample {
            timestamp,
            cpu_pct: (sys.global_cpu_usage() as f64).clamp(0.0, 100.0),
            mem_pct: percent(mem_used_bytes, mem_total_bytes),
            mem_used_bytes,
            mem_total_bytes,
            disk_pct: percent(disk_used, disk_total),
            net_bytes_in,
            net_bytes_out,
            top_processes: top_processes(sys, mem_total_bytes, top_k),
        })
    }
}

impl SampleSource for SysinfoRepo {
    #[instrument(skip(self), fields(repo = "sysinfo", operation = "collect"))]
    async fn collect(&self, timestamp: u64) -> Result<Sample> {
        let state = self.state.clone();
        let top_k = self.top_k;
        tokio::task::spawn_blocking(move || Self::collect_blocking(&state, top_k, timestamp))
            .await
            .map_err(|e| SidecarError::Sampling(format!("sysinfo task join: {e}")))?
    }
}

fn percent(part: u64, total: u64) -> f64 {
    if total > 0 {
        (part as f64 / total as f64) * 100.0
    } else {
        0.0
    }
}

fn top_processes(sys: &System, mem_total_bytes: u64, k: usize) -> TopProcesses {
    let usage: Vec<ProcessUsage> = sys
        .processes()
        .values()
        .map(|p| process_usage(p, mem_total_bytes))
        .collect();
    TopProcesses {
        by_cpu: top_by(&usage, k, |p| p.cpu_pct),
        by_mem: top_by(&usage, k, |p| p.mem_pct),
    }
}

fn process_usage(p: &Process, mem_total_bytes: u64) -> ProcessUsage {
    ProcessUsage {
        pid: p.pid().as_u32(),
        name: p.name().to_string_lossy().into_owned(),
        cpu_pct: p.cpu_usage() as f64,
        mem_pct: percent(p.memory(), mem_total_bytes),
    }
}

/// Highest `key` first; equal keys by pid so the ranking is stable between ticks.
fn top_by(usage: &[ProcessUsage], k: usize, key: impl Fn(&ProcessUsage) -> f64) -> Vec<ProcessUsage> {
    let mut ranked = usage.to_vec();
    ranked.sort_by(|a, b| match key(b).total_cmp(&key(a)) {
        Ordering::Equal => a.pid.cmp(&b.pid),
        other => other,
    });
    ranked.truncate(k);
    ranked
}
