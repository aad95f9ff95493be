//! SkyBridge host application entry point.
//!
//! Wires together the infrastructure services and starts the Tokio async
//! runtime.
//!
//! # Architecture
//!
//! ```text
//! main()
//!  └─ load_config()            -- TOML config + account cache paths
//!  └─ TransportNegotiator      -- peer + account refresh loops
//!  └─ MirrorServer             -- accept loop + 1 Hz performance monitor
//! ```
//!
//! The headless binary wires the deterministic fake collaborators for
//! discovery and capture; an embedding platform layer substitutes its real
//! WiFi-Direct/Bluetooth/NFC sources and encoder factory through the same
//! constructors.

use std::sync::{
    atomic::{AtomicBool, Ordering},
    Arc,
};

use tracing::{error, info};
use tracing_subscriber::EnvFilter;

use skybridge_host::application::negotiate::{
    DiscoverySources, NegotiatorConfig, TransportNegotiator,
};
use skybridge_host::application::sessions::SessionRegistry;
use skybridge_host::infrastructure::capture::mock::{FakeEncoderFactory, TestPatternGrabber};
use skybridge_host::infrastructure::discovery::mock::{
    FixedNfcAdapter, ScriptedConnector, StaticBondedDevices,
};
use skybridge_host::infrastructure::monitor::{NullCounterSource, PerformanceMonitor};
use skybridge_host::infrastructure::network::probe::TcpProbe;
use skybridge_host::infrastructure::network::server::{MirrorServer, ServerConfig};
use skybridge_host::infrastructure::storage::accounts::AccountStore;
use skybridge_host::infrastructure::storage::config;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Initialise structured logging.  Level is overridden by `RUST_LOG`.
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    info!("SkyBridge host starting");

    let cfg = config::load_config()?;
    let store = Arc::new(AccountStore::new(config::config_dir()?.join("accounts.toml")));

    // ── Transport negotiation coordinator ─────────────────────────────────────
    let sources = DiscoverySources {
        connector: Arc::new(ScriptedConnector::new(Vec::new())),
        bonded: Arc::new(StaticBondedDevices(Vec::new())),
        nfc: Arc::new(FixedNfcAdapter(false)),
        probe: Arc::new(TcpProbe),
    };
    let negotiator_config = NegotiatorConfig {
        stream_port: cfg.network.stream_port,
        lan_probe_port: cfg.network.lan_probe_port,
        relay_port: cfg.network.relay_port,
        bluetooth_channel: cfg.network.bluetooth_channel,
        nfc_channel: cfg.network.nfc_channel,
        airplay_channel: cfg.network.airplay_channel,
        ..NegotiatorConfig::default()
    };
    let negotiator = Arc::new(TransportNegotiator::new(negotiator_config, sources, store));
    negotiator.start();

    // ── Streaming server ───────────────────────────────────────────────────────
    let registry = Arc::new(SessionRegistry::new());
    let monitor = Arc::new(PerformanceMonitor::new(
        Arc::new(NullCounterSource),
        Arc::clone(&registry),
    ));
    let server = MirrorServer::new(
        ServerConfig {
            tier: cfg.host.tier,
            device_width: cfg.streaming.device_width,
            device_height: cfg.streaming.device_height,
            hardware_acceleration: cfg.streaming.hardware_acceleration,
            low_latency_channel: cfg.streaming.low_latency_channel,
            initial_bitrate_kbps: cfg.streaming.initial_bitrate_kbps,
            ..ServerConfig::default()
        },
        Arc::clone(&registry),
        // No hardware encoder in the headless build; sessions take the
        // software path.
        Arc::new(FakeEncoderFactory::failing_all()),
        Arc::new(TestPatternGrabber::new()),
        monitor,
        negotiator.quality_watch(),
    );

    if let Err(e) = server.start(cfg.network.stream_port).await {
        error!("failed to start streaming server: {e}");
        return Err(e.into());
    }

    // Publish an initial transport so subscribers have a value before the
    // first client arrives.
    let transport = negotiator.negotiate_transport(None, None).await;
    info!(kind = transport.kind(), "initial transport ready");

    // ── Ctrl-C handler ─────────────────────────────────────────────────────────
    let running = Arc::new(AtomicBool::new(true));
    let running_clone = Arc::clone(&running);
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            info!("shutdown signal received");
            running_clone.store(false, Ordering::Relaxed);
        }
    });

    info!("SkyBridge host ready.  Press Ctrl-C to exit.");
    loop {
        tokio::time::sleep(std::time::Duration::from_millis(100)).await;
        if !running.load(Ordering::Relaxed) {
            break;
        }
    }

    server.stop().await;
    negotiator.release();
    info!("SkyBridge host stopped");
    Ok(())
}
