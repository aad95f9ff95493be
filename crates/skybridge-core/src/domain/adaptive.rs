//! Adaptive streaming control: frame-rate multiplier, compression quality,
//! and the bitrate recommendation rule.
//!
//! The controller reacts to two inputs that arrive on different cadences:
//! link-quality estimates (whenever a transport is re-estimated) and
//! per-second [`ConnectionStats`] snapshots from the performance monitor.
//! All math here is pure so the whole policy is table-testable.

use std::time::Duration;

use crate::domain::display::ResolutionMode;
use crate::domain::quality::LinkQuality;

// ── Fixed control constants ───────────────────────────────────────────────────

/// Bitrate band in kbps.  Recommendations are clamped here at all times.
pub const MIN_BITRATE_KBPS: u32 = 500;
pub const MAX_BITRATE_KBPS: u32 = 40_000;

/// Compression quality slider band (JPEG-equivalent semantics).
pub const MIN_QUALITY: u8 = 30;
pub const MAX_QUALITY: u8 = 95;

/// Throughput above which the frame-rate multiplier steps up, below which
/// it steps down (Mbps).
const HIGH_THROUGHPUT_MBPS: f64 = 150.0;
const LOW_THROUGHPUT_MBPS: f64 = 25.0;

/// Network thresholds for the bitrate rule.
const RTT_DEGRADE_MS: f64 = 150.0;
const JITTER_DEGRADE_MS: f64 = 30.0;
const LOSS_DEGRADE_PCT: f64 = 2.0;
const RTT_BOOST_MS: f64 = 50.0;
const JITTER_BOOST_MS: f64 = 10.0;

/// Achieved-vs-target frame-rate fractions.
const FPS_HEALTHY_FRACTION: f64 = 0.9;
const FPS_STARVED_FRACTION: f64 = 0.6;

/// Bitrate step factors.
const DEGRADE_FACTOR: f64 = 0.82;
const BOOST_FACTOR: f64 = 1.08;
const STARVED_FACTOR: f64 = 0.85;

// ── ConnectionStats ───────────────────────────────────────────────────────────

/// Point-in-time connection snapshot recomputed once per second from raw OS
/// counters plus session aggregates.  Never persisted.
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct ConnectionStats {
    pub bytes_sent: u64,
    pub bytes_received: u64,
    pub packets_sent: u64,
    pub packets_received: u64,
    pub packets_lost: u64,
    pub rtt_ms: f64,
    pub jitter_ms: f64,
    pub bitrate_kbps: u32,
    /// Achieved output frame rate across active sessions.
    pub frame_rate: f64,
    pub frame_width: u32,
    pub frame_height: u32,
    pub cpu_usage: f64,
    pub memory_usage: f64,
}

impl ConnectionStats {
    /// Packet loss as a percentage of packets sent (0 when nothing was sent).
    pub fn loss_pct(&self) -> f64 {
        if self.packets_sent == 0 {
            0.0
        } else {
            self.packets_lost as f64 / self.packets_sent as f64 * 100.0
        }
    }
}

// ── Bitrate recommendation rule ───────────────────────────────────────────────

/// The performance feedback loop's bitrate rule.
///
/// Degrades on congested links, boosts on healthy ones, and applies an
/// independent downward correction when the achieved frame rate starves
/// below 60 % of target.  The result always lies in
/// `[MIN_BITRATE_KBPS, MAX_BITRATE_KBPS]`.
pub fn recommend_bitrate(stats: &ConnectionStats, current_kbps: u32, target_fps: u32) -> u32 {
    let target = target_fps.max(1) as f64;
    let mut next = current_kbps as f64;

    let congested = stats.rtt_ms > RTT_DEGRADE_MS
        || stats.jitter_ms > JITTER_DEGRADE_MS
        || stats.loss_pct() > LOSS_DEGRADE_PCT;

    if congested {
        next *= DEGRADE_FACTOR;
    } else if stats.rtt_ms < RTT_BOOST_MS
        && stats.jitter_ms < JITTER_BOOST_MS
        && stats.frame_rate >= target * FPS_HEALTHY_FRACTION
    {
        next *= BOOST_FACTOR;
    }

    // Independent of congestion: a starved output rate means the encoder is
    // producing more than the pipeline can move.
    if stats.frame_rate < target * FPS_STARVED_FRACTION {
        next *= STARVED_FACTOR;
    }

    (next as u32).clamp(MIN_BITRATE_KBPS, MAX_BITRATE_KBPS)
}

// ── AdaptiveController ────────────────────────────────────────────────────────

/// Per-session frame-rate and compression-quality controller.
///
/// The frame-rate multiplier walks within `[0.25, 1.0]`; the resulting
/// target fps is always snapped to a member of the active mode's
/// `frame_rates` list, never above its maximum.
#[derive(Debug, Clone)]
pub struct AdaptiveController {
    mode: ResolutionMode,
    fps_multiplier: f64,
    quality: u8,
}

impl AdaptiveController {
    pub fn new(mode: ResolutionMode) -> Self {
        Self {
            mode,
            fps_multiplier: 0.75,
            quality: 75,
        }
    }

    /// Reacts to a (re-)estimated link quality.
    pub fn on_link_quality(&mut self, quality: &LinkQuality) {
        if quality.supports_lossless || quality.throughput_mbps >= HIGH_THROUGHPUT_MBPS {
            self.fps_multiplier = (self.fps_multiplier + 0.10).min(1.0);
            self.quality = (self.quality + 5).min(MAX_QUALITY);
        } else if quality.throughput_mbps < LOW_THROUGHPUT_MBPS {
            self.fps_multiplier = (self.fps_multiplier - 0.15).max(0.25);
            self.quality = self.quality.saturating_sub(10).max(MIN_QUALITY);
        }
    }

    /// Reacts to a per-second stats snapshot.
    pub fn on_stats(&mut self, stats: &ConnectionStats) {
        let target = self.target_fps().max(1) as f64;

        if stats.rtt_ms > RTT_DEGRADE_MS
            || stats.jitter_ms > JITTER_DEGRADE_MS
            || stats.loss_pct() > LOSS_DEGRADE_PCT
        {
            self.quality = self.quality.saturating_sub(8).max(MIN_QUALITY);
        } else if stats.rtt_ms < RTT_BOOST_MS && stats.jitter_ms < JITTER_BOOST_MS {
            self.quality = (self.quality + 3).min(MAX_QUALITY);
        }

        if stats.frame_rate < target * FPS_STARVED_FRACTION {
            self.quality = self.quality.saturating_sub(5).max(MIN_QUALITY);
        }
    }

    /// Target frame rate: `max_rate × multiplier`, snapped to the nearest
    /// supported value of the active mode.
    pub fn target_fps(&self) -> u32 {
        let desired = self.mode.max_frame_rate() as f64 * self.fps_multiplier;
        self.mode
            .frame_rates
            .iter()
            .copied()
            .min_by_key(|rate| ((*rate as f64 - desired).abs() * 1000.0) as u64)
            .unwrap_or(30)
    }

    /// Current sleep interval of the frame loop.
    pub fn frame_interval(&self) -> Duration {
        Duration::from_secs_f64(1.0 / self.target_fps().max(1) as f64)
    }

    /// Current compression quality slider (JPEG-equivalent, 30..=95).
    pub fn quality(&self) -> u8 {
        self.quality
    }

    /// Current frame-rate multiplier (diagnostics).
    pub fn fps_multiplier(&self) -> f64 {
        self.fps_multiplier
    }

    /// The mode this controller clamps against.
    pub fn mode(&self) -> &ResolutionMode {
        &self.mode
    }
}

// ── Tests ─────────────────────────────────────────────────────────────────────
