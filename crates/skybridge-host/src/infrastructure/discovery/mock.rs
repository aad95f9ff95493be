//! Deterministic discovery fakes for tests and the headless binary.
//!
//! Each fake is scripted up front and records what negotiation asked of it,
//! so scenario tests can assert both the chosen transport and the probe walk
//! that led there.

use std::collections::HashMap;
use std::net::{IpAddr, SocketAddr};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Mutex;
use std::time::Duration;

use async_trait::async_trait;

use super::{
    BondedDeviceSource, DiscoveredPeer, DiscoveryError, GroupInfo, NfcAdapter, ReachabilityProbe,
};

/// A [`PeerConnector`](super::PeerConnector) whose scan results and
/// connectable groups are scripted.
pub struct ScriptedConnector {
    peers: Vec<DiscoveredPeer>,
    groups: HashMap<String, GroupInfo>,
    connect_attempts: AtomicUsize,
    disconnects: Mutex<Vec<String>>,
}

impl ScriptedConnector {
    /// A connector that sees `peers` and can connect to none of them.
    pub fn new(peers: Vec<DiscoveredPeer>) -> Self {
        Self {
            peers,
            groups: HashMap::new(),
            connect_attempts: AtomicUsize::new(0),
            disconnects: Mutex::new(Vec::new()),
        }
    }

    /// Scripts a successful group formation for `address`.
    pub fn with_group(mut self, address: &str, group_owner: IpAddr, link_speed_mbps: f64) -> Self {
        self.groups.insert(
            address.to_string(),
            GroupInfo {
                group_owner,
                link_speed_mbps,
            },
        );
        self
    }

    /// How many connect attempts negotiation made.
    pub fn connect_attempts(&self) -> usize {
        self.connect_attempts.load(Ordering::Relaxed)
    }
}

#[async_trait]
impl super::PeerConnector for ScriptedConnector {
    async fn scan(&self) -> Vec<DiscoveredPeer> {
        self.peers.clone()
    }

    async fn connect(&self, address: &str) -> Result<GroupInfo, DiscoveryError> {
        self.connect_attempts.fetch_add(1, Ordering::Relaxed);
        self.groups
            .get(address)
            .cloned()
            .ok_or_else(|| DiscoveryError::ConnectFailed {
                address: address.to_string(),
                reason: "scripted refusal".to_string(),
            })
    }

    async fn disconnect(&self, address: &str) {
        self.disconnects
            .lock()
            .expect("lock poisoned")
            .push(address.to_string());
    }
}

/// A fixed bonded-device list.
pub struct StaticBondedDevices(pub Vec<String>);

#[async_trait]
impl BondedDeviceSource for StaticBondedDevices {
    async fn bonded_identifiers(&self) -> Vec<String> {
        self.0.clone()
    }
}

/// An NFC adapter pinned on or off.
pub struct FixedNfcAdapter(pub bool);

impl NfcAdapter for FixedNfcAdapter {
    fn is_enabled(&self) -> bool {
        self.0
    }
}

/// A reachability probe answering from a scripted `(address → rtt)` table.
pub struct ScriptedProbe {
    reachable: HashMap<IpAddr, Duration>,
    probes: Mutex<Vec<SocketAddr>>,
}

impl ScriptedProbe {
    /// A probe for which nothing is reachable.
    pub fn unreachable() -> Self {
        Self {
            reachable: HashMap::new(),
            probes: Mutex::new(Vec::new()),
        }
    }

    /// Scripts `ip` to answer with `rtt`.
    pub fn with_reachable(mut self, ip: IpAddr, rtt: Duration) -> Self {
        self.reachable.insert(ip, rtt);
        self
    }

    /// The addresses negotiation probed, in order.
    pub fn probed_addresses(&self) -> Vec<SocketAddr> {
        self.probes.lock().expect("lock poisoned").clone()
    }
}

#[async_trait]
impl ReachabilityProbe for ScriptedProbe {
    async fn probe(&self, addr: SocketAddr, _timeout: Duration) -> Option<Duration> {
        self.probes.lock().expect("lock poisoned").push(addr);
        self.reachable.get(&addr.ip()).copied()
    }
}
