//! Peer device entities and transport hints.
//!
//! A [`PeerDevice`] is created or refreshed on every discovery cycle from the
//! raw `(name, address)` pairs the platform discovery collaborators produce.
//! Entries that do not reappear in a refresh expire implicitly unless they
//! back the currently negotiated transport.

use std::collections::HashSet;
use std::net::IpAddr;
use std::time::Instant;

use crate::domain::capability::Platform;

/// A transport medium a peer is known (or assumed) to support.
///
/// Hints are attached to a [`PeerDevice`] as a set and drive the strict
/// priority order of transport negotiation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum TransportHint {
    /// WiFi-Direct group (peer-to-peer hotspot).
    WifiDirect,
    /// Ordinary local network reachability.
    Lan,
    /// Cloud relay rendezvous.
    Cloud,
    /// Lossless-capable WiFi radio (hardware lossless path).
    UltraWideband,
    /// Bluetooth classic/LE proximity channel.
    Bluetooth,
    /// NFC tap channel.
    Nfc,
    /// AirPlay-family peer.
    AirPlay,
    /// Fallback umbrella when no specific medium is known.
    UniversalBridge,
}

impl TransportHint {
    /// Coarse strength ranking used when interpolating a quality estimate
    /// for a peer whose only concrete hint is [`TransportHint::UniversalBridge`].
    /// Higher is better.
    pub fn strength_rank(self) -> u8 {
        match self {
            TransportHint::UltraWideband => 5,
            TransportHint::WifiDirect => 4,
            TransportHint::AirPlay => 4,
            TransportHint::Lan => 3,
            TransportHint::Bluetooth => 2,
            TransportHint::Nfc => 1,
            TransportHint::Cloud => 1,
            TransportHint::UniversalBridge => 0,
        }
    }
}

/// A device found by the discovery collaborators, classified and ready for
/// transport negotiation.
#[derive(Debug, Clone)]
pub struct PeerDevice {
    /// Stable identifier (MAC, platform device id, or advertised UUID).
    pub device_id: String,
    /// Human-readable advertised name ("Living Room MacBook").
    pub display_name: String,
    /// Medium-level address used by connect calls (varies per medium).
    pub address: String,
    /// IP address when the discovery source knows one.
    pub ip_address: Option<IpAddr>,
    /// Platform-normalized signal strength ordinal, 0 (none) ..= 5 (excellent).
    pub signal_level: u8,
    /// Declared link speed in Mbps as reported by the radio, if any.
    pub link_speed_mbps: f64,
    /// When this entry was last produced by a discovery cycle.
    pub last_seen: Instant,
    /// Transport media this peer is believed to support.
    pub capabilities: HashSet<TransportHint>,
    /// Resolved platform classification.
    pub platform: Platform,
    /// Human-readable compatibility remark surfaced to the presentation layer.
    pub compatibility_note: String,
}

impl PeerDevice {
    /// Whether the peer carries a hardware lossless radio.
    pub fn has_lossless_radio(&self) -> bool {
        self.capabilities.contains(&TransportHint::UltraWideband)
    }

    /// Whether the peer advertises at least one medium negotiation can try.
    pub fn has_any_hint(&self) -> bool {
        !self.capabilities.is_empty()
    }
}
