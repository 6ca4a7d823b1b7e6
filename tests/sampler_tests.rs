// Sampler timing tests on a paused clock

mod common;

use common::{FakeSource, sample};
use sidecar::error::Result;
use sidecar::models::Sample;
use sidecar::sampler::{self, SampleSource, SamplerConfig, SamplerStats, SessionClock};
use std::time::Duration;
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;

async fn drain(samples: &mut sampler::Samples) -> Vec<Sample> {
    let mut out = Vec::new();
    while let Some(s) = samples.next().await {
        out.push(s);
    }
    out
}

#[tokio::test(start_paused = true)]
async fn test_bounded_run_yields_one_sample_per_interval() {
    let clock = SessionClock::start();
    let config = SamplerConfig::bounded(Duration::from_secs(1), Duration::from_secs(10));
    let mut samples = sampler::samples(FakeSource::constant(20.0), config, clock, CancellationToken::new());

    let collected = drain(&mut samples).await;
    let stats = samples.join().await.unwrap();

    assert!((9..=10).contains(&collected.len()), "got {}", collected.len());
    assert_eq!(stats.emitted as usize, collected.len());
    for pair in collected.windows(2) {
        assert!(pair[1].timestamp - pair[0].timestamp >= 1_000);
    }
    assert!(collected[0].timestamp >= clock.started_at() + 1_000);
    assert!(collected.last().unwrap().timestamp <= clock.started_at() + 10_000);
}

#[tokio::test(start_paused = true)]
async fn test_bounded_run_rounds_partial_window() {
    let clock = SessionClock::start();
    let config = SamplerConfig::bounded(Duration::from_secs(2), Duration::from_secs(5));
    let mut samples = sampler::samples(FakeSource::constant(1.0), config, clock, CancellationToken::new());
    let collected = drain(&mut samples).await;
    // round(5 / 2) = 3: ticks at 2 s and 4 s plus the half-window ending at 5 s.
    let offsets: Vec<_> = collected.iter().map(|s| s.timestamp - clock.started_at()).collect();
    assert_eq!(offsets, [2_000, 4_000, 5_000]);
}

#[tokio::test(start_paused = true)]
async fn test_cancelled_continuous_run_stops_promptly() {
    let clock = SessionClock::start();
    let cancel = CancellationToken::new();
    let config = SamplerConfig::continuous(Duration::from_secs(1));
    let mut samples = sampler::samples(FakeSource::constant(5.0), config, clock, cancel.clone());

    let stopper = tokio::spawn(async move {
        tokio::time::sleep(Duration::from_millis(3_200)).await;
        cancel.cancel();
        Instant::now()
    });
    let collected = drain(&mut samples).await;
    let cancelled_at = clock.at(stopper.await.unwrap());
    samples.join().await.unwrap();

    assert_eq!(collected.len(), 3);
    assert!(collected.last().unwrap().timestamp <= cancelled_at);
}

#[tokio::test(start_paused = true)]
async fn test_cancel_before_first_interval_yields_nothing() {
    let clock = SessionClock::start();
    let cancel = CancellationToken::new();
    let config = SamplerConfig::continuous(Duration::from_secs(5));
    let mut samples = sampler::samples(FakeSource::constant(5.0), config, clock, cancel.clone());
    tokio::time::sleep(Duration::from_secs(1)).await;
    samples.stop();
    assert!(drain(&mut samples).await.is_empty());
}

#[tokio::test(start_paused = true)]
async fn test_failed_collection_skips_the_tick() {
    let clock = SessionClock::start();
    let source = FakeSource::sequence(vec![10.0, 20.0, 30.0]).failing_on(vec![1]);
    let config = SamplerConfig::bounded(Duration::from_secs(1), Duration::from_secs(5));
    let mut samples = sampler::samples(source.clone(), config, clock, CancellationToken::new());

    let collected = drain(&mut samples).await;
    let stats = samples.join().await.unwrap();

    assert_eq!(source.calls(), 5);
    assert_eq!(stats.failed, 1);
    assert_eq!(collected.len(), 4);
    let offsets: Vec<_> = collected.iter().map(|s| s.timestamp - clock.started_at()).collect();
    assert_eq!(offsets, [1_000, 3_000, 4_000, 5_000]);
}

#[tokio::test(start_paused = true)]
async fn test_dropping_receiver_stops_sampler() {
    let clock = SessionClock::start();
    let config = SamplerConfig::continuous(Duration::from_secs(1));
    let samples = sampler::samples(FakeSource::constant(5.0), config, clock, CancellationToken::new());
    let stats = samples.join().await.unwrap();
    assert_eq!(stats.emitted, 0);
}

/// Collection takes longer than the interval.
#[derive(Clone)]
struct SlowSource(Duration);

impl SampleSource for SlowSource {
    async fn collect(&self, timestamp: u64) -> Result<Sample> {
        tokio::time::sleep(self.0).await;
        Ok(sample(timestamp, 50.0, 50.0))
    }
}

async fn run_slow(collect: Duration, interval: Duration, duration: Duration) -> (Vec<u64>, SamplerStats) {
    let clock = SessionClock::start();
    let config = SamplerConfig::bounded(interval, duration);
    let mut samples = sampler::samples(SlowSource(collect), config, clock, CancellationToken::new());
    let collected = drain(&mut samples).await;
    let stats = samples.join().await.unwrap();
    let offsets = collected.iter().map(|s| s.timestamp - clock.started_at()).collect();
    (offsets, stats)
}

#[tokio::test(start_paused = true)]
async fn test_overrunning_collection_skips_ticks_without_backlog() {
    let (offsets, stats) = run_slow(
        Duration::from_millis(2_500),
        Duration::from_secs(1),
        Duration::from_secs(8),
    )
    .await;

    // 1.0-3.5, 4.0-6.5, 7.0-9.5; ticks 2, 3, 5, 6 and the stop at 8 fall inside a collection.
    assert_eq!(offsets, [1_000, 4_000, 7_000]);
    assert_eq!(stats.skipped, 5);
    assert_eq!(stats.emitted, 3);
}

#[tokio::test(start_paused = true)]
async fn test_slight_overrun_skips_next_tick_instead_of_drifting() {
    let started = Instant::now();
    let (offsets, stats) = run_slow(
        Duration::from_millis(1_200),
        Duration::from_secs(1),
        Duration::from_secs(6),
    )
    .await;

    assert_eq!(offsets, [1_000, 3_000, 5_000]);
    assert_eq!(stats.skipped, 3);
    // The last collection started on schedule; nothing ran past it.
    assert!(started.elapsed() <= Duration::from_millis(6_200));
}

#[tokio::test(start_paused = true)]
async fn test_partial_final_window_may_be_shorter_than_interval() {
    let clock = SessionClock::start();
    let config = SamplerConfig::bounded(Duration::from_secs(1), Duration::from_millis(3_500));
    let mut samples = sampler::samples(FakeSource::constant(10.0), config, clock, CancellationToken::new());
    let collected = drain(&mut samples).await;
    let offsets: Vec<_> = collected.iter().map(|s| s.timestamp - clock.started_at()).collect();
    assert_eq!(offsets, [1_000, 2_000, 3_000, 3_500]);
}
