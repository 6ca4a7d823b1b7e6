// Monitoring session: the consumer side of the sampler channel.
// The recorder alone owns the sample log and the peak map; sealing consumes it.

use crate::models::{MonitoringSession, PeakRecord, Sample};
use crate::peak_tracker::PeakTracker;
use crate::sampler::{self, SampleSource, SamplerConfig, SessionClock};
use std::collections::BTreeMap;
use std::time::Duration;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

pub struct SessionRecorder {
    clock: SessionClock,
    session: MonitoringSession,
    tracker: PeakTracker,
}

impl SessionRecorder {
    pub fn new(clock: SessionClock, config: &SamplerConfig) -> Self {
        Self {
            clock,
            session: MonitoringSession {
                started_at: clock.started_at(),
                ended_at: None,
                interval_ms: config.interval.as_millis() as u64,
                duration_ms: config.duration.map(|d| d.as_millis() as u64),
                samples: Vec::new(),
                peaks: BTreeMap::new(),
                summary: None,
            },
            tracker: PeakTracker::new(),
        }
    }

    pub fn record(&mut self, sample: Sample) -> Vec<PeakRecord> {
        let new_peaks = self.tracker.observe(&sample);
        for peak in &new_peaks {
            info!(
                metric = %peak.metric,
                value = peak.value,
                observed_at = peak.observed_at,
                "new peak"
            );
        }
        self.session.samples.push(sample);
        new_peaks
    }

    pub fn session(&self) -> &MonitoringSession {
        &self.session
    }

    pub fn seal(self) -> MonitoringSession {
        let mut session = self.session;
        session.ended_at = Some(self.clock.now().max(session.started_at));
        session.peaks = self.tracker.peaks().clone();
        session.summary = Some(self.tracker.summary());
        session
    }
}

/// Sample `source` until the bounded duration elapses or `cancel` fires, then
/// seal. Sampler failures are logged; they never fail the session.
pub async fn run_session<S: SampleSource>(
    source: S,
    config: SamplerConfig,
    cancel: CancellationToken,
) -> MonitoringSession {
    let clock = SessionClock::start();
    let mut recorder = SessionRecorder::new(clock, &config);
    let mut samples = sampler::samples(source, config, clock, cancel);
    while let Some(sample) = samples.next().await {
        recorder.record(sample);
    }
    match samples.join().await {
        Ok(stats) => debug!(
            emitted = stats.emitted,
            failed = stats.failed,
            skipped = stats.skipped,
            "sampler joined"
        ),
        Err(e) => warn!(error = %e, operation = "run_session", "sampler ended abnormally"),
    }
    let session = recorder.seal();
    info!(
        samples = session.samples.len(),
        duration_ms = session.actual_duration_ms(),
        "monitoring session sealed"
    );
    session
}

/// One-shot measurement: a bounded session of exactly one interval.
pub async fn snapshot_session<S: SampleSource>(source: S, interval: Duration) -> MonitoringSession {
    run_session(
        source,
        SamplerConfig::bounded(interval, interval),
        CancellationToken::new(),
    )
    .await
}
