//! Performance feedback loop.
//!
//! Once per second the monitor samples the OS counter collaborator and the
//! session registry, composes a [`ConnectionStats`] snapshot, and publishes
//! it on a `watch` channel.  The session frame loops consume the snapshots
//! to drive the bitrate recommendation rule; a presentation layer may
//! subscribe to the same channel for its diagnostics surface.
//!
//! Byte and packet figures in the snapshot are *deltas* over the sampling
//! interval, so the achieved bitrate falls out directly.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use tokio::sync::watch;
use tracing::trace;

use skybridge_core::domain::adaptive::ConnectionStats;

use crate::application::sessions::SessionRegistry;

/// Sampling cadence of the feedback loop.
pub const SAMPLE_INTERVAL: Duration = Duration::from_secs(1);

/// Raw cumulative counters sampled from the OS by the platform collaborator.
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct RawCounters {
    pub cpu_percent: f64,
    pub memory_percent: f64,
    pub bytes_sent: u64,
    pub bytes_received: u64,
    pub packets_sent: u64,
    pub packets_received: u64,
    pub packets_lost: u64,
    pub rtt_ms: f64,
    pub jitter_ms: f64,
}

/// OS counter collaborator.  Values are cumulative since boot; the monitor
/// derives per-interval deltas itself.
pub trait CounterSource: Send + Sync {
    fn sample(&self) -> RawCounters;
}

/// Counter source for environments without wired OS counters; reports zeros
/// so statistics are driven purely by session aggregates.
pub struct NullCounterSource;

impl CounterSource for NullCounterSource {
    fn sample(&self) -> RawCounters {
        RawCounters::default()
    }
}

/// The feedback loop itself.
pub struct PerformanceMonitor {
    counters: Arc<dyn CounterSource>,
    registry: Arc<SessionRegistry>,
    stats_tx: watch::Sender<Option<ConnectionStats>>,
    /// Capture dimensions of the most recently brought-up session; stamped
    /// into the snapshots for the diagnostics surface.
    frame_size: Mutex<(u32, u32)>,
    prev_counters: Mutex<Option<RawCounters>>,
    prev_total_frames: Mutex<u64>,
}

impl PerformanceMonitor {
    pub fn new(counters: Arc<dyn CounterSource>, registry: Arc<SessionRegistry>) -> Self {
        let (stats_tx, _) = watch::channel(None);
        Self {
            counters,
            registry,
            stats_tx,
            frame_size: Mutex::new((0, 0)),
            prev_counters: Mutex::new(None),
            prev_total_frames: Mutex::new(0),
        }
    }

    /// Observable stream of per-second snapshots.
    pub fn stats_watch(&self) -> watch::Receiver<Option<ConnectionStats>> {
        self.stats_tx.subscribe()
    }

    /// Records the capture dimensions of the active pipeline.
    pub fn set_frame_size(&self, width: u32, height: u32) {
        *self.frame_size.lock().expect("lock poisoned") = (width, height);
    }

    /// Composes and publishes one snapshot.  Exposed for deterministic tests;
    /// the background loop calls this once per second.
    pub async fn sample_once(&self) -> ConnectionStats {
        let raw = self.counters.sample();
        let aggregates = self.registry.aggregates().await;

        let prev = self
            .prev_counters
            .lock()
            .expect("lock poisoned")
            .replace(raw)
            .unwrap_or(raw);

        let total_frames = aggregates.total_frames;
        let prev_frames = {
            let mut guard = self.prev_total_frames.lock().expect("lock poisoned");
            std::mem::replace(&mut *guard, total_frames)
        };

        let bytes_sent = raw.bytes_sent.saturating_sub(prev.bytes_sent);
        let (frame_width, frame_height) = *self.frame_size.lock().expect("lock poisoned");

        let stats = ConnectionStats {
            bytes_sent,
            bytes_received: raw.bytes_received.saturating_sub(prev.bytes_received),
            packets_sent: raw.packets_sent.saturating_sub(prev.packets_sent),
            packets_received: raw.packets_received.saturating_sub(prev.packets_received),
            packets_lost: raw.packets_lost.saturating_sub(prev.packets_lost),
            // Session latency stands in when the platform has no RTT counter.
            rtt_ms: if raw.rtt_ms > 0.0 {
                raw.rtt_ms
            } else {
                aggregates.avg_latency_ms
            },
            jitter_ms: raw.jitter_ms,
            bitrate_kbps: (bytes_sent * 8 / 1_000) as u32,
            frame_rate: total_frames.saturating_sub(prev_frames) as f64
                / SAMPLE_INTERVAL.as_secs_f64(),
            frame_width,
            frame_height,
            cpu_usage: raw.cpu_percent,
            memory_usage: raw.memory_percent,
        };

        trace!(?stats, "performance snapshot");
        self.stats_tx.send_replace(Some(stats));
        stats
    }

    /// The 1 Hz sampling loop; runs until the shared flag clears.
    pub async fn run(self: Arc<Self>, running: Arc<AtomicBool>) {
        while running.load(Ordering::SeqCst) {
            self.sample_once().await;
            tokio::time::sleep(SAMPLE_INTERVAL).await;
        }
    }
}

// ── Tests ─────────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;
    use crate::application::sessions::RemoteSession;

    /// Counter source returning a scripted sequence of samples.
    struct ScriptedCounters {
        samples: Mutex<Vec<RawCounters>>,
    }

    impl ScriptedCounters {
        fn new(mut samples: Vec<RawCounters>) -> Self {
            samples.reverse();
            Self {
                samples: Mutex::new(samples),
            }
        }
    }

    impl CounterSource for ScriptedCounters {
        fn sample(&self) -> RawCounters {
            let mut guard = self.samples.lock().expect("lock poisoned");
            guard.pop().unwrap_or_default()
        }
    }

    fn counters(bytes_sent: u64, packets_sent: u64, rtt_ms: f64) -> RawCounters {
        RawCounters {
            bytes_sent,
            packets_sent,
            rtt_ms,
            cpu_percent: 12.0,
            memory_percent: 40.0,
            ..Default::default()
        }
    }

    #[tokio::test]
    async fn test_first_sample_reports_zero_deltas() {
        let source = Arc::new(ScriptedCounters::new(vec![counters(1_000_000, 500, 20.0)]));
        let registry = Arc::new(SessionRegistry::new());
        let monitor = PerformanceMonitor::new(source, registry);

        let stats = monitor.sample_once().await;
        assert_eq!(stats.bytes_sent, 0);
        assert_eq!(stats.packets_sent, 0);
        assert_eq!(stats.bitrate_kbps, 0);
    }

    #[tokio::test]
    async fn test_second_sample_reports_interval_deltas_and_bitrate() {
        let source = Arc::new(ScriptedCounters::new(vec![
            counters(1_000_000, 500, 20.0),
            counters(1_250_000, 700, 22.0),
        ]));
        let registry = Arc::new(SessionRegistry::new());
        let monitor = PerformanceMonitor::new(source, registry);

        monitor.sample_once().await;
        let stats = monitor.sample_once().await;

        assert_eq!(stats.bytes_sent, 250_000);
        assert_eq!(stats.packets_sent, 200);
        assert_eq!(stats.bitrate_kbps, 2_000);
        assert!((stats.rtt_ms - 22.0).abs() < f64::EPSILON);
        assert!((stats.cpu_usage - 12.0).abs() < f64::EPSILON);
    }

    #[tokio::test]
    async fn test_frame_rate_derived_from_session_frame_deltas() {
        let source = Arc::new(NullCounterSource);
        let registry = Arc::new(SessionRegistry::new());
        let session = RemoteSession::new("127.0.0.1".parse().unwrap(), 9, 5.0);
        let id = session.session_id;
        registry.insert(session).await;

        let monitor = PerformanceMonitor::new(source, Arc::clone(&registry));
        monitor.sample_once().await;

        for _ in 0..30 {
            registry.record_frame(id, 2_000, 30, 8_000).await;
        }
        let stats = monitor.sample_once().await;
        assert!((stats.frame_rate - 30.0).abs() < f64::EPSILON);
    }

    #[tokio::test]
    async fn test_session_latency_stands_in_for_missing_rtt_counter() {
        let source = Arc::new(NullCounterSource);
        let registry = Arc::new(SessionRegistry::new());
        registry
            .insert(RemoteSession::new("127.0.0.1".parse().unwrap(), 9, 33.0))
            .await;

        let monitor = PerformanceMonitor::new(source, registry);
        let stats = monitor.sample_once().await;
        assert!((stats.rtt_ms - 33.0).abs() < f64::EPSILON);
    }

    #[tokio::test]
    async fn test_snapshots_are_published_on_the_watch_channel() {
        let monitor = PerformanceMonitor::new(
            Arc::new(NullCounterSource),
            Arc::new(SessionRegistry::new()),
        );
        let mut rx = monitor.stats_watch();
        assert!(rx.borrow().is_none());

        monitor.set_frame_size(1920, 1080);
        monitor.sample_once().await;

        assert!(rx.has_changed().unwrap());
        let stats = (*rx.borrow_and_update()).expect("published snapshot");
        assert_eq!(stats.frame_width, 1920);
        assert_eq!(stats.frame_height, 1080);
    }
}
