//! Per-medium link-quality estimation.
//!
//! One estimation function per medium, each pure given its inputs, each
//! returning a [`LinkQuality`].  The coordinator publishes every estimate it
//! performs to the shared "current quality" observable that the session
//! manager subscribes to; this module only computes the records.
//!
//! The constants here are protocol behavior, not configuration: changing
//! them changes which links qualify for the lossless hardware pipeline.

use std::collections::HashSet;
use std::time::Instant;

use tracing::trace;

use crate::domain::peer::TransportHint;

// ── Fixed estimation constants ────────────────────────────────────────────────

/// Signal ordinal at or above which a WiFi link may qualify as lossless.
pub const LOSSLESS_MIN_SIGNAL: u8 = 4;
/// Declared link speed (Mbps) at or above which a WiFi link may qualify as lossless.
pub const LOSSLESS_MIN_LINK_MBPS: f64 = 300.0;

/// Latency assumed for an already-formed WiFi-Direct group.
pub const DIRECT_FORMED_LATENCY_MS: f64 = 8.0;
/// Latency assumed for a LAN path when no probe measurement is available.
pub const LAN_DEFAULT_LATENCY_MS: f64 = 15.0;

/// Usable fraction of the declared link speed per medium.  The LAN factor is
/// lower than WiFi-Direct's: LAN traffic crosses at least one extra hop.
const WIFI_DIRECT_LOSSLESS_FACTOR: f64 = 0.85;
const WIFI_DIRECT_FACTOR: f64 = 0.70;
const LAN_FACTOR: f64 = 0.60;

/// Throughput floors (Mbps) so a degenerate link-speed report never yields
/// an unusable estimate.
const WIFI_DIRECT_FLOOR_MBPS: f64 = 10.0;
const LAN_FLOOR_MBPS: f64 = 5.0;

/// Bluetooth / NFC base figures before signal scaling.
const BLUETOOTH_BASE_MBPS: f64 = 2.0;
const BLUETOOTH_BASE_LATENCY_MS: f64 = 40.0;
const NFC_BASE_MBPS: f64 = 0.4;
const NFC_BASE_LATENCY_MS: f64 = 25.0;

/// AirPlay peers get a fixed optimistic near-lossless estimate.
const AIRPLAY_MBPS: f64 = 250.0;
const AIRPLAY_LATENCY_MS: f64 = 12.0;

/// Cloud relay: conservative fixed figures, path of last resort.
const CLOUD_MBPS: f64 = 25.0;
const CLOUD_LATENCY_MS: f64 = 85.0;

/// Throughput discount applied to universal-bridge interpolation.
const BRIDGE_FACTOR: f64 = 0.8;

/// Peer names / account ids containing any of these select the AirPlay path.
const AIRPLAY_KEYWORDS: &[&str] = &["airplay", "apple tv", "appletv", "homepod"];

// ── LinkQuality ───────────────────────────────────────────────────────────────

/// Normalized quality record for one transport medium.
///
/// Consumed by negotiation (to prefer the better candidate) and by the
/// session manager (to drive adaptive frame rate / bitrate).
#[derive(Debug, Clone, PartialEq)]
pub struct LinkQuality {
    pub hint: TransportHint,
    pub latency_ms: f64,
    pub throughput_mbps: f64,
    /// True for non-relay, non-routed paths.
    pub is_direct: bool,
    /// True only when signal strength and throughput cross the fixed
    /// thresholds, or a hardware lossless radio is present.
    pub supports_lossless: bool,
    pub measured_at: Instant,
}

// ── Per-medium estimators ─────────────────────────────────────────────────────

/// Coarse signal scaling for the low-rate proximity media.
fn signal_factor(signal_level: u8) -> f64 {
    match signal_level {
        0 | 1 => 0.5,
        2 | 3 => 0.75,
        _ => 1.0,
    }
}

fn lossless_eligible(signal_level: u8, link_speed_mbps: f64, hardware_lossless: bool) -> bool {
    hardware_lossless
        || (signal_level >= LOSSLESS_MIN_SIGNAL && link_speed_mbps >= LOSSLESS_MIN_LINK_MBPS)
}

/// WiFi-Direct estimate.
///
/// `probed_rtt_ms` carries a reachability measurement when one was taken;
/// `None` means the group is already formed and the fixed direct-formed
/// constant applies.  A hardware lossless radio qualifies the link
/// regardless of signal.
pub fn estimate_wifi_direct(
    link_speed_mbps: f64,
    signal_level: u8,
    hardware_lossless: bool,
    probed_rtt_ms: Option<f64>,
) -> LinkQuality {
    let lossless = lossless_eligible(signal_level, link_speed_mbps, hardware_lossless);
    let factor = if lossless {
        WIFI_DIRECT_LOSSLESS_FACTOR
    } else {
        WIFI_DIRECT_FACTOR
    };
    LinkQuality {
        hint: TransportHint::WifiDirect,
        latency_ms: probed_rtt_ms.unwrap_or(DIRECT_FORMED_LATENCY_MS),
        throughput_mbps: (link_speed_mbps * factor).max(WIFI_DIRECT_FLOOR_MBPS),
        is_direct: true,
        supports_lossless: lossless,
        measured_at: Instant::now(),
    }
}

/// LAN estimate.  The extra hop costs throughput; latency comes from the
/// probe when available.
pub fn estimate_lan(
    link_speed_mbps: f64,
    signal_level: u8,
    probed_rtt_ms: Option<f64>,
) -> LinkQuality {
    LinkQuality {
        hint: TransportHint::Lan,
        latency_ms: probed_rtt_ms.unwrap_or(LAN_DEFAULT_LATENCY_MS),
        throughput_mbps: (link_speed_mbps * LAN_FACTOR).max(LAN_FLOOR_MBPS),
        is_direct: false,
        supports_lossless: lossless_eligible(signal_level, link_speed_mbps, false),
        measured_at: Instant::now(),
    }
}

/// Bluetooth estimate: fixed base scaled by coarse signal, never lossless.
pub fn estimate_bluetooth(signal_level: u8) -> LinkQuality {
    let factor = signal_factor(signal_level);
    LinkQuality {
        hint: TransportHint::Bluetooth,
        latency_ms: BLUETOOTH_BASE_LATENCY_MS / factor,
        throughput_mbps: BLUETOOTH_BASE_MBPS * factor,
        is_direct: true,
        supports_lossless: false,
        measured_at: Instant::now(),
    }
}

/// NFC estimate: fixed base scaled by coarse signal, never lossless.
pub fn estimate_nfc(signal_level: u8) -> LinkQuality {
    let factor = signal_factor(signal_level);
    LinkQuality {
        hint: TransportHint::Nfc,
        latency_ms: NFC_BASE_LATENCY_MS / factor,
        throughput_mbps: NFC_BASE_MBPS * factor,
        is_direct: true,
        supports_lossless: false,
        measured_at: Instant::now(),
    }
}

/// AirPlay estimate: fixed optimistic figures, treated as lossless-capable.
pub fn estimate_airplay() -> LinkQuality {
    LinkQuality {
        hint: TransportHint::AirPlay,
        latency_ms: AIRPLAY_LATENCY_MS,
        throughput_mbps: AIRPLAY_MBPS,
        is_direct: true,
        supports_lossless: true,
        measured_at: Instant::now(),
    }
}

/// Whether a peer name or account id selects the AirPlay path.
pub fn is_airplay_family(name_or_account: &str) -> bool {
    let lower = name_or_account.to_lowercase();
    AIRPLAY_KEYWORDS.iter().any(|kw| lower.contains(kw))
}

/// Universal-bridge estimate for a peer of unknown platform.
///
/// Interpolates from the strongest concrete hint simultaneously present on
/// the peer so the estimate is reasonable instead of worst-case.  The bridge
/// itself costs a fixed throughput discount.
pub fn estimate_universal_bridge(hints: &HashSet<TransportHint>) -> LinkQuality {
    let strongest = hints
        .iter()
        .filter(|h| **h != TransportHint::UniversalBridge)
        .max_by_key(|h| h.strength_rank());

    let (base_mbps, latency_ms) = match strongest {
        Some(TransportHint::UltraWideband) => (400.0, 6.0),
        Some(TransportHint::WifiDirect) | Some(TransportHint::AirPlay) => (180.0, 10.0),
        Some(TransportHint::Lan) => (90.0, 18.0),
        Some(TransportHint::Bluetooth) => (BLUETOOTH_BASE_MBPS, BLUETOOTH_BASE_LATENCY_MS),
        _ => (12.0, 60.0),
    };
    trace!(?strongest, base_mbps, "universal bridge interpolation");

    LinkQuality {
        hint: TransportHint::UniversalBridge,
        latency_ms,
        throughput_mbps: base_mbps * BRIDGE_FACTOR,
        is_direct: strongest.is_some_and(|h| *h != TransportHint::Lan),
        supports_lossless: false,
        measured_at: Instant::now(),
    }
}

/// Fixed conservative estimate published whenever a cloud relay is chosen.
pub fn cloud_relay_quality() -> LinkQuality {
    LinkQuality {
        hint: TransportHint::Cloud,
        latency_ms: CLOUD_LATENCY_MS,
        throughput_mbps: CLOUD_MBPS,
        is_direct: false,
        supports_lossless: false,
        measured_at: Instant::now(),
    }
}

// ── Tests ─────────────────────────────────────────────────────────────────────
