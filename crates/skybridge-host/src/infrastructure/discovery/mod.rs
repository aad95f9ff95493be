//! Discovery collaborator traits.
//!
//! The platform layer owns the actual WiFi-Direct peer APIs, Bluetooth
//! bonded-device lists, NFC adapters, and reachability checks.  The host
//! consumes their *results* through the traits below, so negotiation runs
//! identically against the real platform and against the deterministic fakes
//! in [`mock`].

use std::net::{IpAddr, SocketAddr};
use std::time::Duration;

use async_trait::async_trait;
use thiserror::Error;

#[cfg(test)]
use mockall::automock;

pub mod mock;

/// A raw `(name, address)` discovery result, plus the radio figures the
/// link-quality estimator needs.
#[derive(Debug, Clone)]
pub struct DiscoveredPeer {
    /// Advertised human-readable name.
    pub name: String,
    /// Medium-level address used by connect calls.
    pub address: String,
    /// IP address when the discovery source knows one (LAN candidates).
    pub ip_address: Option<IpAddr>,
    /// Platform-normalized signal ordinal, 0..=5.
    pub signal_level: u8,
    /// Declared link speed in Mbps, 0.0 when unknown.
    pub link_speed_mbps: f64,
}

/// Result of a successful WiFi-Direct group negotiation.
#[derive(Debug, Clone)]
pub struct GroupInfo {
    /// The negotiated group-owner address, read back from the platform.
    pub group_owner: IpAddr,
    /// Link speed of the formed group in Mbps.
    pub link_speed_mbps: f64,
}

/// Errors produced by discovery collaborators.
///
/// Negotiation swallows all of these: a failed probe only advances the
/// candidate walk.
#[derive(Debug, Error)]
pub enum DiscoveryError {
    #[error("peer connect failed for {address}: {reason}")]
    ConnectFailed { address: String, reason: String },
    #[error("peer not visible: {0}")]
    PeerNotVisible(String),
}

/// WiFi-Direct peer discovery and group formation.
#[async_trait]
pub trait PeerConnector: Send + Sync {
    /// One discovery sweep; returns every currently visible peer.
    async fn scan(&self) -> Vec<DiscoveredPeer>;

    /// Attempts the platform's peer-connect handshake.
    ///
    /// # Errors
    ///
    /// Returns [`DiscoveryError`] when the peer refuses or the group cannot
    /// form; callers treat this as "advance to the next candidate".
    async fn connect(&self, address: &str) -> Result<GroupInfo, DiscoveryError>;

    /// Tears down a previously formed group.  Must be idempotent.
    async fn disconnect(&self, address: &str);
}

/// The platform's Bluetooth bonded-device list.
#[async_trait]
pub trait BondedDeviceSource: Send + Sync {
    /// Identifiers (addresses) of currently bonded devices.
    async fn bonded_identifiers(&self) -> Vec<String>;
}

/// The platform's NFC adapter state.
#[cfg_attr(test, automock)]
pub trait NfcAdapter: Send + Sync {
    fn is_enabled(&self) -> bool;
}

/// Short-timeout reachability check against a socket address.
#[async_trait]
pub trait ReachabilityProbe: Send + Sync {
    /// Returns the measured round trip when `addr` answered within
    /// `timeout`, `None` otherwise.
    async fn probe(&self, addr: SocketAddr, timeout: Duration) -> Option<Duration>;
}
