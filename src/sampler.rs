// Resource sampler: one collection per interval on its own task, handed to a
// single consumer through a bounded channel.
// Ticks are scheduled from the session start; the first fires one interval in.
// A tick scheduled before the previous collection finished is skipped, never
// queued. On stop, a final sample covers the partial window when at least half
// an interval has elapsed, so a bounded run yields round(duration / interval)
// samples.

use crate::error::Result;
use crate::models::Sample;
use std::future::Future;
use std::time::Duration;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio::time::{Instant, MissedTickBehavior, interval_at, sleep_until};
use tokio_util::sync::CancellationToken;
use tracing::{Instrument, debug, warn};

/// Anything that can produce a host sample. `timestamp` is stamped by the sampler.
pub trait SampleSource: Send + Sync + 'static {
    fn collect(&self, timestamp: u64) -> impl Future<Output = Result<Sample>> + Send;
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SamplerConfig {
    pub interval: Duration,
    /// `None` runs until cancelled.
    pub duration: Option<Duration>,
    pub channel_capacity: usize,
}

impl SamplerConfig {
    pub const DEFAULT_CHANNEL_CAPACITY: usize = 64;

    pub fn bounded(interval: Duration, duration: Duration) -> Self {
        Self {
            interval,
            duration: Some(duration),
            channel_capacity: Self::DEFAULT_CHANNEL_CAPACITY,
        }
    }

    pub fn continuous(interval: Duration) -> Self {
        Self {
            interval,
            duration: None,
            channel_capacity: Self::DEFAULT_CHANNEL_CAPACITY,
        }
    }

    pub fn with_channel_capacity(mut self, capacity: usize) -> Self {
        self.channel_capacity = capacity.max(1);
        self
    }
}

/// Maps the runtime clock onto wall-clock milliseconds for one session.
/// Anchoring on tokio's `Instant` keeps timestamps consistent under a paused test clock.
#[derive(Debug, Clone, Copy)]
pub struct SessionClock {
    wall_ms: u64,
    instant: Instant,
}

impl SessionClock {
    pub fn start() -> Self {
        Self {
            wall_ms: chrono::Utc::now().timestamp_millis().max(0) as u64,
            instant: Instant::now(),
        }
    }

    pub fn started_at(&self) -> u64 {
        self.wall_ms
    }

    pub fn origin(&self) -> Instant {
        self.instant
    }

    pub fn at(&self, instant: Instant) -> u64 {
        self.wall_ms + instant.saturating_duration_since(self.instant).as_millis() as u64
    }

    pub fn now(&self) -> u64 {
        self.at(Instant::now())
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct SamplerStats {
    pub emitted: u64,
    /// Ticks whose collection failed.
    pub failed: u64,
    /// Ticks dropped because a collection overran.
    pub skipped: u64,
}

/// Lazy sample sequence. Yields `None` once the sampler has stopped and every
/// emitted sample has been received.
pub struct Samples {
    rx: mpsc::Receiver<Sample>,
    handle: JoinHandle<SamplerStats>,
    cancel: CancellationToken,
}

impl Samples {
    pub async fn next(&mut self) -> Option<Sample> {
        self.rx.recv().await
    }

    /// Ask the sampler to stop; samples already emitted stay readable.
    pub fn stop(&self) {
        self.cancel.cancel();
    }

    /// Wait for the sampler task. Unread samples are discarded.
    pub async fn join(self) -> Result<SamplerStats> {
        drop(self.rx);
        self.handle.await.map_err(|e| {
            crate::error::SidecarError::Sampling(format!("sampler task join: {e}"))
        })
    }
}

/// Start sampling `source` on a new task. Bounded runs stop on their own at
/// `clock.origin() + duration`; any run stops when `cancel` fires or the
/// receiving side is dropped.
///
/// Full ticks are always at least `interval` apart. The final partial-window
/// sample is the exception: with a 1 s interval and a 3.5 s duration the
/// timestamps are 1000, 2000, 3000 and 3500 ms after the start. That sample is
/// dropped, and counted as skipped, when a collection is still running at the
/// stop point.
pub fn samples<S: SampleSource>(
    source: S,
    config: SamplerConfig,
    clock: SessionClock,
    cancel: CancellationToken,
) -> Samples {
    let (tx, rx) = mpsc::channel(config.channel_capacity.max(1));
    let span = tracing::debug_span!(
        "sampler",
        interval_ms = config.interval.as_millis() as u64,
        bounded = config.duration.is_some()
    );
    let handle = tokio::spawn(run(source, config, clock, cancel.clone(), tx).instrument(span));
    Samples { rx, handle, cancel }
}

enum Emit {
    Sent,
    Failed,
    Closed,
}

async fn run<S: SampleSource>(
    source: S,
    config: SamplerConfig,
    clock: SessionClock,
    cancel: CancellationToken,
    tx: mpsc::Sender<Sample>,
) -> SamplerStats {
    let period = config.interval.max(Duration::from_millis(1));
    let origin = clock.origin();
    let deadline = config.duration.map(|d| origin + d);
    let mut tick = interval_at(origin + period, period);
    tick.set_missed_tick_behavior(MissedTickBehavior::Skip);

    let mut stats = SamplerStats::default();
    let mut last_tick = origin;
    let mut last_seen = origin;
    // End of the most recent collection.
    let mut busy_until = origin;
    let stop_at = loop {
        tokio::select! {
            biased;
            _ = cancel.cancelled() => {
                debug!("sampler cancelled");
                break deadline.map_or(Instant::now(), |d| d.min(Instant::now()));
            }
            _ = reached(deadline) => {
                debug!("sampler reached its deadline");
                break deadline.unwrap_or_else(Instant::now);
            }
            at = tick.tick() => {
                let missed = (at.saturating_duration_since(last_seen).as_millis()
                    / period.as_millis().max(1))
                    .saturating_sub(1) as u64;
                last_seen = at;
                let overrun = at < busy_until;
                let skipped = missed + u64::from(overrun);
                if skipped > 0 {
                    warn!(skipped, operation = "sample", "collection overran; ticks skipped");
                    stats.skipped += skipped;
                }
                if overrun {
                    continue;
                }
                last_tick = at;
                if let Emit::Closed = emit(&source, &clock, at, &tx, &mut stats).await {
                    debug!("sample receiver dropped; sampler stopping");
                    return stats;
                }
                busy_until = Instant::now();
            }
        }
    };

    if stop_at.saturating_duration_since(last_tick) >= period / 2 {
        if stop_at < busy_until {
            warn!(operation = "sample", "collection overran the stop point; final sample skipped");
            stats.skipped += 1;
        } else {
            emit(&source, &clock, stop_at, &tx, &mut stats).await;
        }
    }
    debug!(
        emitted = stats.emitted,
        failed = stats.failed,
        skipped = stats.skipped,
        "sampler stopped"
    );
    stats
}

async fn reached(deadline: Option<Instant>) {
    match deadline {
        Some(deadline) => sleep_until(deadline).await,
        None => std::future::pending().await,
    }
}

async fn emit<S: SampleSource>(
    source: &S,
    clock: &SessionClock,
    at: Instant,
    tx: &mpsc::Sender<Sample>,
    stats: &mut SamplerStats,
) -> Emit {
    match source.collect(clock.at(at)).await {
        Ok(sample) => {
            if tx.send(sample).await.is_err() {
                return Emit::Closed;
            }
            stats.emitted += 1;
            Emit::Sent
        }
        Err(e) => {
            warn!(error = %e, operation = "sample", "collection failed; tick skipped");
            stats.failed += 1;
            Emit::Failed
        }
    }
}
