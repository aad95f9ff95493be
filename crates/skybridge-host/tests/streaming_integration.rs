//! Integration tests for the streaming session server.
//!
//! Each test drives a real `MirrorServer` on an ephemeral port with fake
//! capture collaborators, acting as the client over plain TCP: handshake
//! frame in, ack frame out, then length-prefixed screen frames until
//! disconnect.  Covered here:
//!
//! - Server lifecycle: start/stop, double-start rejection, bind failure,
//!   restartability.
//! - Session lifecycle: registration on accept, frame counters, removal
//!   within one adaptive loop iteration of a client disconnect, capture and
//!   encoder resources reporting released.
//! - Handshake semantics: the deliberate soft accept with penalty latency
//!   for silent clients, and the hard reject for malformed hellos.
//! - Pipeline selection: hardware on lossless links, software otherwise.

use std::sync::Arc;
use std::time::{Duration, Instant};

use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::TcpStream;
use tokio::sync::watch;

use skybridge_core::protocol::framing::encode_frame;
use skybridge_core::protocol::handshake::{
    HandshakeAck, HandshakeHello, HandshakeStatus, HANDSHAKE_PENALTY_LATENCY_MS,
};
use skybridge_core::{LinkQuality, Tier, TransportHint};

use skybridge_host::application::sessions::SessionRegistry;
use skybridge_host::infrastructure::capture::mock::{FakeEncoderFactory, TestPatternGrabber};
use skybridge_host::infrastructure::capture::CodecProfile;
use skybridge_host::infrastructure::monitor::{NullCounterSource, PerformanceMonitor};
use skybridge_host::infrastructure::network::server::{MirrorServer, ServerConfig, ServerError, ServerState};

// ── Test world ────────────────────────────────────────────────────────────────

struct World {
    server: MirrorServer,
    registry: Arc<SessionRegistry>,
    grabber: Arc<TestPatternGrabber>,
    factory: Arc<FakeEncoderFactory>,
    // Kept alive so the server's quality subscription stays open.
    quality_tx: watch::Sender<Option<LinkQuality>>,
}

fn build_world(config: ServerConfig, factory: FakeEncoderFactory) -> World {
    let registry = Arc::new(SessionRegistry::new());
    let monitor = Arc::new(PerformanceMonitor::new(
        Arc::new(NullCounterSource),
        Arc::clone(&registry),
    ));
    let grabber = Arc::new(TestPatternGrabber::new());
    let factory = Arc::new(factory);
    let (quality_tx, quality_rx) = watch::channel(None);

    let factory_dyn: Arc<dyn skybridge_host::infrastructure::capture::HardwareEncoderFactory> =
        factory.clone();
    let grabber_dyn: Arc<dyn skybridge_host::infrastructure::capture::FrameGrabber> =
        grabber.clone();
    let server = MirrorServer::new(
        config,
        Arc::clone(&registry),
        factory_dyn,
        grabber_dyn,
        monitor,
        quality_rx,
    );

    World {
        server,
        registry,
        grabber,
        factory,
        quality_tx,
    }
}

fn lossless_quality() -> LinkQuality {
    LinkQuality {
        hint: TransportHint::UltraWideband,
        latency_ms: 6.0,
        throughput_mbps: 400.0,
        is_direct: true,
        supports_lossless: true,
        measured_at: Instant::now(),
    }
}

async fn read_frame(stream: &mut TcpStream) -> std::io::Result<Vec<u8>> {
    let mut prefix = [0u8; 4];
    stream.read_exact(&mut prefix).await?;
    let len = u32::from_be_bytes(prefix) as usize;
    let mut payload = vec![0u8; len];
    stream.read_exact(&mut payload).await?;
    Ok(payload)
}

/// Connects and completes the hello/ack exchange.
async fn handshake_client(server: &MirrorServer) -> TcpStream {
    let addr = server.local_addr().expect("server must be bound");
    let mut stream = TcpStream::connect(addr).await.expect("connect");

    let hello = HandshakeHello::new();
    let frame = encode_frame(&hello.to_bytes()).unwrap();
    stream.write_all(&frame).await.expect("send hello");

    let ack_bytes = read_frame(&mut stream).await.expect("read ack");
    let ack = HandshakeAck::from_bytes(&ack_bytes).expect("parse ack");
    assert_eq!(ack.id, hello.id);
    assert_eq!(ack.status, HandshakeStatus::Ok);
    stream
}

/// Polls until the registry holds `expected` sessions or the deadline hits.
async fn wait_for_sessions(registry: &SessionRegistry, expected: usize, deadline: Duration) -> bool {
    let start = Instant::now();
    while start.elapsed() < deadline {
        if registry.len().await == expected {
            return true;
        }
        tokio::time::sleep(Duration::from_millis(20)).await;
    }
    registry.len().await == expected
}

// ── Lifecycle ─────────────────────────────────────────────────────────────────

#[tokio::test]
async fn test_session_flow_streams_frames_and_cleans_up_on_disconnect() {
    let world = build_world(ServerConfig::default(), FakeEncoderFactory::failing_all());
    world.server.start(0).await.expect("start");
    assert_eq!(world.server.state(), ServerState::Running);

    let mut client = handshake_client(&world.server).await;
    assert!(wait_for_sessions(&world.registry, 1, Duration::from_secs(2)).await);

    // Frames arrive in order, each a non-empty software-compressed payload.
    for _ in 0..3 {
        let frame = read_frame(&mut client).await.expect("frame");
        assert!(!frame.is_empty());
    }

    let sessions = world.registry.snapshot().await;
    assert_eq!(sessions.len(), 1);
    assert!(sessions[0].frames_transmitted >= 1);
    assert!(sessions[0].bytes_transmitted > 0);
    assert!(sessions[0].is_active);

    // Simulated client disconnect: the session leaves the table within one
    // adaptive loop iteration and the capture surface reports released.
    drop(client);
    assert!(wait_for_sessions(&world.registry, 0, Duration::from_secs(3)).await);
    assert!(world.grabber.released());

    world.server.stop().await;
    assert_eq!(world.server.state(), ServerState::Stopped);
}

#[tokio::test]
async fn test_start_twice_fails_fast_and_restart_after_stop_works() {
    let world = build_world(ServerConfig::default(), FakeEncoderFactory::failing_all());
    world.server.start(0).await.expect("first start");

    let second = world.server.start(0).await;
    assert!(matches!(second, Err(ServerError::AlreadyRunning)));

    world.server.stop().await;
    world.server.stop().await; // idempotent
    assert_eq!(world.server.state(), ServerState::Stopped);

    world.server.start(0).await.expect("restart after stop");
    world.server.stop().await;
}

#[tokio::test]
async fn test_bind_failure_reports_error_and_stays_stopped() {
    // Occupy a port with a plain listener, then try to bind the server there.
    let blocker = std::net::TcpListener::bind("0.0.0.0:0").expect("blocker bind");
    let port = blocker.local_addr().unwrap().port();

    let world = build_world(ServerConfig::default(), FakeEncoderFactory::failing_all());
    let result = world.server.start(port).await;

    assert!(matches!(result, Err(ServerError::BindFailed { .. })));
    assert_eq!(world.server.state(), ServerState::Stopped);
    assert!(world.server.local_addr().is_none());
}

#[tokio::test]
async fn test_stop_clears_active_sessions() {
    let world = build_world(ServerConfig::default(), FakeEncoderFactory::failing_all());
    world.server.start(0).await.expect("start");

    let _client = handshake_client(&world.server).await;
    assert!(wait_for_sessions(&world.registry, 1, Duration::from_secs(2)).await);

    world.server.stop().await;
    assert!(world.registry.is_empty().await);
    assert_eq!(world.server.state(), ServerState::Stopped);
    assert!(world.grabber.released());
}

// ── Handshake semantics ───────────────────────────────────────────────────────

#[tokio::test]
async fn test_silent_client_is_soft_accepted_with_penalty_latency() {
    let config = ServerConfig {
        handshake_timeout: Duration::from_millis(100),
        ..ServerConfig::default()
    };
    let world = build_world(config, FakeEncoderFactory::failing_all());
    world.server.start(0).await.expect("start");

    // Connect and say nothing: past the deadline the session must exist and
    // frames must flow anyway.
    let addr = world.server.local_addr().unwrap();
    let mut client = TcpStream::connect(addr).await.expect("connect");

    assert!(wait_for_sessions(&world.registry, 1, Duration::from_secs(2)).await);
    let session = world.registry.snapshot().await.remove(0);
    assert!((session.latency_ms - HANDSHAKE_PENALTY_LATENCY_MS).abs() < f64::EPSILON);

    let frame = read_frame(&mut client).await.expect("frame after soft accept");
    assert!(!frame.is_empty());

    world.server.stop().await;
}

#[tokio::test]
async fn test_malformed_hello_is_rejected_without_a_session() {
    let world = build_world(ServerConfig::default(), FakeEncoderFactory::failing_all());
    world.server.start(0).await.expect("start");

    let addr = world.server.local_addr().unwrap();
    let mut client = TcpStream::connect(addr).await.expect("connect");
    let garbage = encode_frame(b"definitely not a hello").unwrap();
    client.write_all(&garbage).await.expect("send garbage");

    // The server drops the connection; reading must hit EOF, and no session
    // may ever appear.
    let mut buf = [0u8; 16];
    let read = client.read(&mut buf).await.unwrap_or(0);
    assert_eq!(read, 0, "connection must be closed");
    tokio::time::sleep(Duration::from_millis(100)).await;
    assert!(world.registry.is_empty().await);

    world.server.stop().await;
}

// ── Pipeline selection & adaptation ───────────────────────────────────────────

#[tokio::test]
async fn test_lossless_link_uses_hardware_encoder_and_releases_it() {
    let config = ServerConfig {
        tier: Tier::Premium,
        hardware_acceleration: true,
        ..ServerConfig::default()
    };
    let world = build_world(
        config,
        FakeEncoderFactory::accepting_all().with_buffered_frames(2),
    );

    // The coordinator published a lossless estimate before the client came.
    world.quality_tx.send_replace(Some(lossless_quality()));

    world.server.start(0).await.expect("start");
    let mut client = handshake_client(&world.server).await;

    let frame = read_frame(&mut client).await.expect("frame");
    assert!(!frame.is_empty());

    // Highest-efficiency profile first.
    assert_eq!(world.factory.prepared_profiles()[0], CodecProfile::Hevc);

    drop(client);
    assert!(wait_for_sessions(&world.registry, 0, Duration::from_secs(3)).await);
    assert_eq!(world.factory.last_encoder_released(), Some(true));

    world.server.stop().await;
}

#[tokio::test]
async fn test_lossy_link_takes_the_software_path() {
    let world = build_world(
        ServerConfig::default(),
        FakeEncoderFactory::accepting_all(),
    );
    // No quality published at all → never lossless → software pipeline.
    world.server.start(0).await.expect("start");

    let mut client = handshake_client(&world.server).await;
    let _ = read_frame(&mut client).await.expect("frame");

    assert!(world.factory.prepared_profiles().is_empty());
    assert!(world.grabber.grab_count() > 0);

    world.server.stop().await;
}
