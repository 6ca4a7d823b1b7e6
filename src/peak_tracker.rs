// Running peaks and averages over a sample stream. Pure; no I/O.

use crate::models::{Metric, MetricSummary, PeakRecord, Sample, SessionSummary};
use std::collections::BTreeMap;

#[derive(Debug, Clone, Default)]
pub struct PeakTracker {
    peaks: BTreeMap<Metric, PeakRecord>,
    sums: BTreeMap<Metric, f64>,
    sample_count: usize,
    peak_mem_used_bytes: u64,
    mem_total_bytes: u64,
}

impl PeakTracker {
    pub fn new() -> Self {
        Self::default()
    }

    /// Fold one sample in; returns the peaks it set (none, one or both metrics).
    /// A peak is replaced only by a strictly greater value; the first sample sets both.
    pub fn observe(&mut self, sample: &Sample) -> Vec<PeakRecord> {
        self.sample_count += 1;
        self.mem_total_bytes = sample.mem_total_bytes;

        let mut new_peaks = Vec::new();
        for metric in Metric::ALL {
            let value = finite(sample.value(metric));
            *self.sums.entry(metric).or_insert(0.0) += value;

            let is_new = self.peaks.get(&metric).is_none_or(|p| value > p.value);
            if is_new {
                let record = PeakRecord {
                    metric,
                    value,
                    observed_at: sample.timestamp,
                };
                self.peaks.insert(metric, record);
                if metric == Metric::Mem {
                    self.peak_mem_used_bytes = sample.mem_used_bytes;
                }
                new_peaks.push(record);
            }
        }
        new_peaks
    }

    pub fn peak(&self, metric: Metric) -> Option<&PeakRecord> {
        self.peaks.get(&metric)
    }

    pub fn peaks(&self) -> &BTreeMap<Metric, PeakRecord> {
        &self.peaks
    }

    pub fn sample_count(&self) -> usize {
        self.sample_count
    }

    pub fn summary(&self) -> SessionSummary {
        SessionSummary {
            cpu: self.metric_summary(Metric::Cpu),
            mem: self.metric_summary(Metric::Mem),
            sample_count: self.sample_count,
            peak_mem_used_bytes: self.peak_mem_used_bytes,
            mem_total_bytes: self.mem_total_bytes,
        }
    }

    fn metric_summary(&self, metric: Metric) -> MetricSummary {
        let peak = self.peaks.get(&metric);
        let avg = if self.sample_count > 0 {
            self.sums.get(&metric).copied().unwrap_or(0.0) / self.sample_count as f64
        } else {
            0.0
        };
        MetricSummary {
            peak: peak.map_or(0.0, |p| p.value),
            peak_at: peak.map(|p| p.observed_at),
            avg,
        }
    }
}

/// Non-finite readings count as 0.
fn finite(value: f64) -> f64 {
    if value.is_finite() { value } else { 0.0 }
}
