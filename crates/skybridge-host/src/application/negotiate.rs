//! Transport negotiation coordinator.
//!
//! Maintains the live peer directory and the account-endpoint cache, and
//! executes the negotiation walk that turns "I want to mirror to that
//! device" into one concrete [`Transport`].
//!
//! # How negotiation ranks transports (for beginners)
//!
//! The user experience depends on preferring the lowest-latency medium that
//! is *actually available*, not the one with the highest theoretical
//! throughput.  The walk is therefore a strict priority order with short,
//! local timeouts – a dead candidate costs a few hundred milliseconds, never
//! a stall:
//!
//! ```text
//! WiFi-Direct ─► Bluetooth ─► NFC ─► AirPlay ─► UniversalBridge   (proximity)
//!      │ all peer media failed
//!      ▼
//! LAN probe (peer IP, then gateway guesses)                        (local)
//!      │ nothing reachable
//!      ▼
//! Cloud relay (always succeeds)                                    (relay)
//! ```
//!
//! Every probe failure is swallowed and advances the walk; the coordinator
//! cannot fail outright – the relay is the transport of last resort.
//!
//! Ownership discipline: the peer directory, the account cache, and the
//! "current transport"/"current quality" observables are single-writer
//! (this coordinator) and many-reader (`watch` subscriptions).  The two
//! background refresh loops live exactly as long as the coordinator:
//! [`TransportNegotiator::release`] cancels both.

use std::collections::HashMap;
use std::net::SocketAddr;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};

use tokio::sync::{watch, RwLock};
use tokio::task::JoinHandle;
use tokio::time::timeout;
use tracing::{debug, info, warn};
use uuid::Uuid;

use skybridge_core::domain::capability;
use skybridge_core::domain::quality;
use skybridge_core::domain::transport::{AccountEndpoint, Transport, DEFAULT_ACCOUNT_ID};
use skybridge_core::{LinkQuality, PeerDevice, TransportHint};

use crate::infrastructure::discovery::{
    BondedDeviceSource, DiscoveredPeer, NfcAdapter, PeerConnector, ReachabilityProbe,
};
use crate::infrastructure::network::probe::candidate_ips;
use crate::infrastructure::storage::accounts::AccountStore;

/// Link speed assumed for LAN candidates whose radio reported nothing.
const DEFAULT_LAN_LINK_MBPS: f64 = 100.0;

/// Timing and port parameters of the coordinator.
#[derive(Debug, Clone)]
pub struct NegotiatorConfig {
    /// Port the streaming server listens on (stamped into transports).
    pub stream_port: u16,
    /// Port probed on LAN fallback candidates.
    pub lan_probe_port: u16,
    /// Cloud relay rendezvous port.
    pub relay_port: u16,
    pub bluetooth_channel: u16,
    pub nfc_channel: u16,
    pub airplay_channel: u16,
    /// Budget for the platform's WiFi-Direct peer-connect handshake.
    pub connect_timeout: Duration,
    /// Budget for one LAN reachability probe.
    pub probe_timeout: Duration,
    pub peer_refresh_interval: Duration,
    pub account_refresh_interval: Duration,
    /// Age past which a cached relay binding is re-minted.
    pub account_ttl: Duration,
}

impl Default for NegotiatorConfig {
    fn default() -> Self {
        Self {
            stream_port: 47800,
            lan_probe_port: 47810,
            relay_port: 8443,
            bluetooth_channel: 3,
            nfc_channel: 1,
            airplay_channel: 7000,
            connect_timeout: Duration::from_secs(3),
            probe_timeout: Duration::from_millis(400),
            peer_refresh_interval: Duration::from_secs(10),
            account_refresh_interval: Duration::from_secs(30),
            account_ttl: Duration::from_secs(300),
        }
    }
}

/// The discovery collaborators the coordinator consumes.
pub struct DiscoverySources {
    pub connector: Arc<dyn PeerConnector>,
    pub bonded: Arc<dyn BondedDeviceSource>,
    pub nfc: Arc<dyn NfcAdapter>,
    pub probe: Arc<dyn ReachabilityProbe>,
}

/// The transport negotiation coordinator.
pub struct TransportNegotiator {
    config: NegotiatorConfig,
    sources: DiscoverySources,
    store: Arc<AccountStore>,
    peers: RwLock<HashMap<String, PeerDevice>>,
    endpoints: RwLock<HashMap<String, AccountEndpoint>>,
    transport_tx: watch::Sender<Option<Transport>>,
    quality_tx: watch::Sender<Option<LinkQuality>>,
    /// Device id backing the currently published transport; kept alive in
    /// the directory even when a discovery sweep misses it.
    last_target: RwLock<Option<String>>,
    tasks: Mutex<Vec<JoinHandle<()>>>,
    released: AtomicBool,
}

impl TransportNegotiator {
    /// Builds a coordinator around explicit collaborators.  The persisted
    /// account cache is loaded eagerly; a corrupt cache starts empty rather
    /// than failing construction.
    pub fn new(config: NegotiatorConfig, sources: DiscoverySources, store: Arc<AccountStore>) -> Self {
        let endpoints = match store.load() {
            Ok(list) => list
                .into_iter()
                .map(|e| (e.account_id.clone(), e))
                .collect(),
            Err(e) => {
                warn!("account cache unreadable, starting empty: {e}");
                HashMap::new()
            }
        };

        let (transport_tx, _) = watch::channel(None);
        let (quality_tx, _) = watch::channel(None);

        Self {
            config,
            sources,
            store,
            peers: RwLock::new(HashMap::new()),
            endpoints: RwLock::new(endpoints),
            transport_tx,
            quality_tx,
            last_target: RwLock::new(None),
            tasks: Mutex::new(Vec::new()),
            released: AtomicBool::new(false),
        }
    }

    /// Spawns the two perpetual background duties: periodic peer discovery +
    /// classification, and the account-endpoint cache refresh.  Both are
    /// cancelled together by [`release`](Self::release).
    pub fn start(self: &Arc<Self>) {
        let this = Arc::clone(self);
        let peer_loop = tokio::spawn(async move {
            loop {
                this.refresh_peers().await;
                tokio::time::sleep(this.config.peer_refresh_interval).await;
            }
        });

        let this = Arc::clone(self);
        let account_loop = tokio::spawn(async move {
            loop {
                tokio::time::sleep(this.config.account_refresh_interval).await;
                this.refresh_accounts().await;
            }
        });

        self.tasks
            .lock()
            .expect("lock poisoned")
            .extend([peer_loop, account_loop]);
        info!("negotiation coordinator started");
    }

    /// Cancels both background loops and releases the coordinator.
    /// Idempotent: double release is a no-op.
    pub fn release(&self) {
        if self.released.swap(true, Ordering::SeqCst) {
            return;
        }
        for task in self.tasks.lock().expect("lock poisoned").drain(..) {
            task.abort();
        }
        info!("negotiation coordinator released");
    }

    // ── Observables ──────────────────────────────────────────────────────────

    /// The currently negotiated transport, published atomically.
    pub fn transport_watch(&self) -> watch::Receiver<Option<Transport>> {
        self.transport_tx.subscribe()
    }

    /// The most recent link-quality estimate, published on every estimation.
    pub fn quality_watch(&self) -> watch::Receiver<Option<LinkQuality>> {
        self.quality_tx.subscribe()
    }

    /// Snapshot of the live peer directory.
    pub async fn peers(&self) -> Vec<PeerDevice> {
        self.peers.read().await.values().cloned().collect()
    }

    /// The cached relay binding for an account, if any.
    pub async fn cached_endpoint(&self, account_id: &str) -> Option<AccountEndpoint> {
        self.endpoints.read().await.get(account_id).cloned()
    }

    // ── Discovery refresh ─────────────────────────────────────────────────────

    /// One discovery cycle: scan, exclude incompatible families, classify,
    /// and replace the directory.  Entries absent from the sweep expire
    /// implicitly unless they back the current transport.
    pub async fn refresh_peers(&self) {
        let raw = self.sources.connector.scan().await;
        let mut fresh: HashMap<String, PeerDevice> = raw
            .into_iter()
            .filter_map(classify_peer)
            .map(|p| (p.device_id.clone(), p))
            .collect();

        let keep = self.last_target.read().await.clone();
        let mut directory = self.peers.write().await;
        if let Some(id) = keep {
            if !fresh.contains_key(&id) {
                if let Some(active) = directory.get(&id) {
                    fresh.insert(id, active.clone());
                }
            }
        }
        *directory = fresh;
        debug!("peer directory refreshed: {} entries", directory.len());
    }

    /// Reloads the persisted account cache and re-mints bindings past the
    /// TTL.
    pub async fn refresh_accounts(&self) {
        match self.store.load() {
            Ok(persisted) => {
                let mut cache = self.endpoints.write().await;
                for endpoint in persisted {
                    cache
                        .entry(endpoint.account_id.clone())
                        .or_insert(endpoint);
                }
            }
            Err(e) => warn!("account cache reload failed: {e}"),
        }

        let stale: Vec<String> = self
            .endpoints
            .read()
            .await
            .values()
            .filter(|e| e.last_updated.elapsed() > self.config.account_ttl)
            .map(|e| e.account_id.clone())
            .collect();
        for account_id in stale {
            debug!(account = %account_id, "re-minting stale relay binding");
            self.mint_endpoint(&account_id).await;
        }
    }

    // ── Negotiation ──────────────────────────────────────────────────────────

    /// Picks one transport for `target_device_id`, falling back through LAN
    /// to the cloud relay.  Never fails; may suspend for the sum of the
    /// per-candidate timeouts at most.
    pub async fn negotiate_transport(
        &self,
        target_device_id: Option<&str>,
        fallback_account_id: Option<&str>,
    ) -> Transport {
        if let Some(id) = target_device_id {
            let peer = self.peers.read().await.get(id).cloned();
            match peer {
                Some(peer) => {
                    if let Some(transport) = self.try_peer_media(&peer).await {
                        return self.adopt(transport, Some(&peer.device_id)).await;
                    }
                    if let Some(transport) = self.try_lan(&peer).await {
                        return self.adopt(transport, Some(&peer.device_id)).await;
                    }
                }
                None => debug!("target {id} not in peer directory"),
            }
        }

        let transport = self.cloud_fallback(fallback_account_id).await;
        self.adopt(transport, None).await
    }

    /// Unconditionally mints a new relay binding for `account_id`,
    /// replacing any cached entry.  Used when the caller explicitly wants a
    /// cloud path regardless of proximity.
    pub async fn force_account_bridge(&self, account_id: &str) -> AccountEndpoint {
        let endpoint = self.mint_endpoint(account_id).await;
        self.publish_quality(quality::cloud_relay_quality());
        info!(account = %account_id, relay = %endpoint.relay_id, "account bridge forced");
        endpoint
    }

    /// Publishes the winning transport and remembers which peer backs it.
    async fn adopt(&self, transport: Transport, target: Option<&str>) -> Transport {
        *self.last_target.write().await = target.map(str::to_string);
        self.transport_tx.send_replace(Some(transport.clone()));
        info!(kind = transport.kind(), "transport negotiated");
        transport
    }

    /// The strict peer-medium priority walk.  Returns the first hinted
    /// medium whose connection attempt succeeds.
    async fn try_peer_media(&self, peer: &PeerDevice) -> Option<Transport> {
        // WiFi-Direct: the only medium with a real connect handshake.
        if peer.capabilities.contains(&TransportHint::WifiDirect) {
            let attempt = timeout(
                self.config.connect_timeout,
                self.sources.connector.connect(&peer.address),
            )
            .await;
            match attempt {
                Ok(Ok(group)) => {
                    let link_speed = if group.link_speed_mbps > 0.0 {
                        group.link_speed_mbps
                    } else {
                        peer.link_speed_mbps
                    };
                    let q = quality::estimate_wifi_direct(
                        link_speed,
                        peer.signal_level,
                        peer.has_lossless_radio(),
                        None,
                    );
                    let medium = if peer.has_lossless_radio() {
                        TransportHint::UltraWideband
                    } else {
                        TransportHint::WifiDirect
                    };
                    info!(peer = %peer.display_name, owner = %group.group_owner, "wifi-direct group formed");
                    let transport = Transport::DirectHotspot {
                        group_owner: group.group_owner,
                        port: self.config.stream_port,
                        medium,
                        throughput_hint_mbps: q.throughput_mbps,
                        latency_hint_ms: q.latency_ms,
                    };
                    self.publish_quality(q);
                    return Some(transport);
                }
                Ok(Err(e)) => debug!(peer = %peer.display_name, "wifi-direct connect failed: {e}"),
                Err(_) => debug!(peer = %peer.display_name, "wifi-direct connect timed out"),
            }
        }

        // Bluetooth: succeeds when the peer is bonded.
        if peer.capabilities.contains(&TransportHint::Bluetooth) {
            let bonded = self.sources.bonded.bonded_identifiers().await;
            if bonded.iter().any(|b| b == &peer.address) {
                let q = quality::estimate_bluetooth(peer.signal_level);
                info!(peer = %peer.display_name, "bluetooth peripheral selected");
                let transport = self.peripheral(peer, TransportHint::Bluetooth, self.config.bluetooth_channel, &q);
                self.publish_quality(q);
                return Some(transport);
            }
            debug!(peer = %peer.display_name, "bluetooth hinted but not bonded");
        }

        // NFC: succeeds when the local adapter is enabled.
        if peer.capabilities.contains(&TransportHint::Nfc) && self.sources.nfc.is_enabled() {
            let q = quality::estimate_nfc(peer.signal_level);
            info!(peer = %peer.display_name, "nfc peripheral selected");
            let transport = self.peripheral(peer, TransportHint::Nfc, self.config.nfc_channel, &q);
            self.publish_quality(q);
            return Some(transport);
        }

        // AirPlay: succeeds when the peer's name marks an AirPlay target.
        if peer.capabilities.contains(&TransportHint::AirPlay)
            && quality::is_airplay_family(&peer.display_name)
        {
            let q = quality::estimate_airplay();
            info!(peer = %peer.display_name, "airplay peripheral selected");
            let transport = self.peripheral(peer, TransportHint::AirPlay, self.config.airplay_channel, &q);
            self.publish_quality(q);
            return Some(transport);
        }

        // Universal bridge: the umbrella for unknown platforms.
        if peer.capabilities.contains(&TransportHint::UniversalBridge) {
            let q = quality::estimate_universal_bridge(&peer.capabilities);
            info!(peer = %peer.display_name, "universal bridge selected");
            let transport = self.peripheral(peer, TransportHint::UniversalBridge, 0, &q);
            self.publish_quality(q);
            return Some(transport);
        }

        None
    }

    fn peripheral(
        &self,
        peer: &PeerDevice,
        medium: TransportHint,
        channel: u16,
        q: &LinkQuality,
    ) -> Transport {
        Transport::Peripheral {
            medium,
            identifier: peer.address.clone(),
            channel,
            throughput_hint_mbps: q.throughput_mbps,
            latency_hint_ms: q.latency_ms,
        }
    }

    /// LAN fallback: probe the candidate list, first reachable IP wins.
    async fn try_lan(&self, peer: &PeerDevice) -> Option<Transport> {
        for ip in candidate_ips(peer.ip_address) {
            let addr = SocketAddr::new(ip, self.config.lan_probe_port);
            if let Some(rtt) = self.sources.probe.probe(addr, self.config.probe_timeout).await {
                let link_speed = if peer.link_speed_mbps > 0.0 {
                    peer.link_speed_mbps
                } else {
                    DEFAULT_LAN_LINK_MBPS
                };
                let q = quality::estimate_lan(
                    link_speed,
                    peer.signal_level,
                    Some(rtt.as_secs_f64() * 1_000.0),
                );
                info!(%ip, "lan fallback reachable");
                self.publish_quality(q);
                return Some(Transport::LocalLan {
                    ip,
                    port: self.config.stream_port,
                });
            }
        }
        None
    }

    /// Cloud relay, the transport of last resort.
    async fn cloud_fallback(&self, fallback_account_id: Option<&str>) -> Transport {
        let account_id = match fallback_account_id {
            Some(id) => id.to_string(),
            None => self
                .endpoints
                .read()
                .await
                .keys()
                .min()
                .cloned()
                .unwrap_or_else(|| DEFAULT_ACCOUNT_ID.to_string()),
        };

        let endpoint = self.ensure_endpoint(&account_id).await;
        self.publish_quality(quality::cloud_relay_quality());
        info!(account = %account_id, relay = %endpoint.relay_id, "cloud relay selected");
        Transport::CloudRelay {
            relay_id: endpoint.relay_id,
            account_id: Some(account_id),
            negotiated_port: self.config.relay_port,
        }
    }

    /// Returns the cached binding for an account, minting one if absent.
    async fn ensure_endpoint(&self, account_id: &str) -> AccountEndpoint {
        if let Some(existing) = self.endpoints.read().await.get(account_id).cloned() {
            return existing;
        }
        self.mint_endpoint(account_id).await
    }

    /// Mints a fresh relay binding, replaces the cache entry, persists.
    async fn mint_endpoint(&self, account_id: &str) -> AccountEndpoint {
        let cloud = quality::cloud_relay_quality();
        let endpoint = AccountEndpoint {
            account_id: account_id.to_string(),
            relay_id: format!("relay-{}", Uuid::new_v4()),
            throughput_mbps: cloud.throughput_mbps,
            latency_ms: cloud.latency_ms,
            last_updated: Instant::now(),
        };
        self.endpoints
            .write()
            .await
            .insert(account_id.to_string(), endpoint.clone());
        self.persist_endpoints().await;
        endpoint
    }

    async fn persist_endpoints(&self) {
        let mut list: Vec<AccountEndpoint> =
            self.endpoints.read().await.values().cloned().collect();
        list.sort_by(|a, b| a.account_id.cmp(&b.account_id));
        if let Err(e) = self.store.save(&list) {
            warn!("failed to persist account cache: {e}");
        }
    }

    fn publish_quality(&self, q: LinkQuality) {
        self.quality_tx.send_replace(Some(q));
    }
}

impl Drop for TransportNegotiator {
    fn drop(&mut self) {
        self.release();
    }
}

/// Exclusion-then-classification of one raw discovery result.
fn classify_peer(raw: DiscoveredPeer) -> Option<PeerDevice> {
    if capability::should_exclude(&raw.name) {
        debug!("excluding incompatible peer {}", raw.name);
        return None;
    }

    let platform = capability::resolve_platform(&raw.name);
    let mut hints = capability::transports_for(platform);
    if quality::is_airplay_family(&raw.name) {
        hints.insert(TransportHint::AirPlay);
    }

    Some(PeerDevice {
        device_id: raw.address.clone(),
        display_name: raw.name,
        address: raw.address,
        ip_address: raw.ip_address,
        signal_level: raw.signal_level,
        link_speed_mbps: raw.link_speed_mbps,
        last_seen: Instant::now(),
        capabilities: hints,
        platform,
        compatibility_note: capability::compatibility_note(platform),
    })
}

// ── Tests ─────────────────────────────────────────────────────────────────────
