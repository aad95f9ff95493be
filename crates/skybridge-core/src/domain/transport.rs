//! The negotiated transport sum type and the cloud account endpoint.
//!
//! `Transport` is deliberately a closed enum rather than a trait hierarchy:
//! negotiation and session bring-up exhaustively switch on the kind, and new
//! kinds are rare and deliberate.  Exactly one variant is active per session;
//! switching variants requires tearing down and rebuilding the capture
//! pipeline.

use std::net::IpAddr;
use std::time::Instant;

use serde::{Deserialize, Serialize};

use crate::domain::peer::TransportHint;

/// Account id used when negotiation falls through to the cloud relay with no
/// target account and an empty cache.
pub const DEFAULT_ACCOUNT_ID: &str = "skybridge_cloud";

/// A concrete network/medium path over which a session's bytes travel.
#[derive(Debug, Clone, PartialEq)]
pub enum Transport {
    /// WiFi-Direct group with this device or the peer as group owner.
    DirectHotspot {
        group_owner: IpAddr,
        port: u16,
        medium: TransportHint,
        throughput_hint_mbps: f64,
        latency_hint_ms: f64,
    },
    /// Plain LAN reachability to the peer.
    LocalLan { ip: IpAddr, port: u16 },
    /// Cloud relay rendezvous bound to an account.
    CloudRelay {
        relay_id: String,
        account_id: Option<String>,
        negotiated_port: u16,
    },
    /// Bluetooth / NFC / AirPlay / universal-bridge peripheral channel.
    Peripheral {
        medium: TransportHint,
        identifier: String,
        channel: u16,
        throughput_hint_mbps: f64,
        latency_hint_ms: f64,
    },
}

impl Transport {
    /// Whether this is a direct or proximity path (everything but LAN and
    /// cloud).  The negotiation priority invariant says proximity always
    /// outranks LAN, which always outranks the relay.
    pub fn is_proximity(&self) -> bool {
        matches!(
            self,
            Transport::DirectHotspot { .. } | Transport::Peripheral { .. }
        )
    }

    /// Short kind label for logs.
    pub fn kind(&self) -> &'static str {
        match self {
            Transport::DirectHotspot { .. } => "direct_hotspot",
            Transport::LocalLan { .. } => "local_lan",
            Transport::CloudRelay { .. } => "cloud_relay",
            Transport::Peripheral { .. } => "peripheral",
        }
    }
}

/// A cloud-relay binding for an account.
///
/// Created on first negotiation for that account, refreshed periodically by
/// the coordinator's account loop, and never deleted except by explicit
/// account removal.  Only the four wire fields persist; `last_updated` is
/// runtime-only and drives the TTL refresh.
#[derive(Debug, Clone)]
pub struct AccountEndpoint {
    pub account_id: String,
    pub relay_id: String,
    pub throughput_mbps: f64,
    pub latency_ms: f64,
    pub last_updated: Instant,
}

/// The persisted shape of an [`AccountEndpoint`] (TOML key-value store).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PersistedEndpoint {
    pub account_id: String,
    pub relay_id: String,
    pub throughput_mbps: f64,
    pub latency_ms: f64,
}

impl From<&AccountEndpoint> for PersistedEndpoint {
    fn from(endpoint: &AccountEndpoint) -> Self {
        Self {
            account_id: endpoint.account_id.clone(),
            relay_id: endpoint.relay_id.clone(),
            throughput_mbps: endpoint.throughput_mbps,
            latency_ms: endpoint.latency_ms,
        }
    }
}

impl PersistedEndpoint {
    /// Rehydrates a runtime endpoint; the TTL clock restarts at load time.
    pub fn into_endpoint(self) -> AccountEndpoint {
        AccountEndpoint {
            account_id: self.account_id,
            relay_id: self.relay_id,
            throughput_mbps: self.throughput_mbps,
            latency_ms: self.latency_ms,
            last_updated: Instant::now(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_proximity_classification() {
        let hotspot = Transport::DirectHotspot {
            group_owner: "192.168.49.1".parse().unwrap(),
            port: 47800,
            medium: TransportHint::WifiDirect,
            throughput_hint_mbps: 200.0,
            latency_hint_ms: 8.0,
        };
        let peripheral = Transport::Peripheral {
            medium: TransportHint::Bluetooth,
            identifier: "aa:bb:cc:dd:ee:ff".to_string(),
            channel: 3,
            throughput_hint_mbps: 2.0,
            latency_hint_ms: 40.0,
        };
        let lan = Transport::LocalLan {
            ip: "192.168.1.20".parse().unwrap(),
            port: 47800,
        };
        let relay = Transport::CloudRelay {
            relay_id: "relay-1".to_string(),
            account_id: Some(DEFAULT_ACCOUNT_ID.to_string()),
            negotiated_port: 8443,
        };

        assert!(hotspot.is_proximity());
        assert!(peripheral.is_proximity());
        assert!(!lan.is_proximity());
        assert!(!relay.is_proximity());
    }

    #[test]
    fn test_persisted_endpoint_round_trip_preserves_wire_fields() {
        let endpoint = AccountEndpoint {
            account_id: "acct-1".to_string(),
            relay_id: "relay-9".to_string(),
            throughput_mbps: 25.0,
            latency_ms: 85.0,
            last_updated: Instant::now(),
        };

        let persisted = PersistedEndpoint::from(&endpoint);
        let restored = persisted.into_endpoint();

        assert_eq!(restored.account_id, "acct-1");
        assert_eq!(restored.relay_id, "relay-9");
        assert!((restored.throughput_mbps - 25.0).abs() < f64::EPSILON);
        assert!((restored.latency_ms - 85.0).abs() < f64::EPSILON);
    }

    #[test]
    fn test_kind_labels_are_stable() {
        let lan = Transport::LocalLan {
            ip: "10.0.0.1".parse().unwrap(),
            port: 1,
        };
        assert_eq!(lan.kind(), "local_lan");
    }
}
