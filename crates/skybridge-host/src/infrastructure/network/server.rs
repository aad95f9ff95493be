//! Streaming session server.
//!
//! Owns the listening endpoint, the per-client session tasks, the capture/
//! encode pipeline, and the adaptive frame loop.  Architecture:
//!
//! ```text
//! start(port)
//!  ├─ accept loop            -- one task per accepted connection
//!  │    └─ session task      -- handshake → register → frame loop → teardown
//!  └─ performance monitor    -- 1 Hz stats snapshots on a watch channel
//! ```
//!
//! Error containment: a failure inside one session task (capture error,
//! write error, client disconnect) removes that session only; siblings and
//! the accept loop continue.  Stopping the server cancels everything and
//! releases every capture/encoder resource before returning.

use std::net::{Ipv4Addr, SocketAddr};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex as StdMutex};
use std::time::Duration;

use thiserror::Error;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::{TcpListener, TcpStream, UdpSocket};
use tokio::sync::{watch, Mutex};
use tokio::task::JoinHandle;
use tokio::time::timeout;
use tracing::{debug, info, warn};

use skybridge_core::domain::adaptive::{recommend_bitrate, AdaptiveController, ConnectionStats};
use skybridge_core::protocol::framing;
use skybridge_core::protocol::handshake::{
    HandshakeAck, HandshakeHello, HANDSHAKE_PENALTY_LATENCY_MS,
};
use skybridge_core::{select_mode, LinkQuality, Tier};

use crate::application::sessions::{RemoteSession, SessionRegistry, SessionState};
use crate::infrastructure::capture::{build_pipeline, FrameGrabber, HardwareEncoderFactory};
use crate::infrastructure::monitor::PerformanceMonitor;

/// Largest payload pushed over the secondary datagram channel in one piece;
/// anything bigger falls back to the framed stream socket.
const MAX_DATAGRAM_PAYLOAD: usize = 60_000;

/// Grace period for session tasks to observe the stop flag before they are
/// aborted outright.
const STOP_GRACE: Duration = Duration::from_secs(2);

/// Errors reported by [`MirrorServer::start`].
#[derive(Debug, Error)]
pub enum ServerError {
    /// `start` was called while the server was not `Stopped`.
    #[error("server already running")]
    AlreadyRunning,

    /// The listening socket could not be bound; the server stays `Stopped`.
    #[error("bind failed on {addr}: {source}")]
    BindFailed {
        addr: SocketAddr,
        #[source]
        source: std::io::Error,
    },
}

/// Server lifecycle states.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ServerState {
    Stopped,
    Starting,
    Running,
    Stopping,
}

/// Configuration of the streaming server.
#[derive(Debug, Clone)]
pub struct ServerConfig {
    /// Account tier gating the resolution/frame-rate menu.
    pub tier: Tier,
    /// Physical screen dimensions of this device.
    pub device_width: u32,
    pub device_height: u32,
    /// Attempt the hardware encoder on lossless-capable links.
    pub hardware_acceleration: bool,
    /// Open a secondary low-latency datagram channel per session.
    pub low_latency_channel: bool,
    /// Starting bitrate before the feedback loop takes over, in kbps.
    pub initial_bitrate_kbps: u32,
    /// Deadline for the client's hello frame.
    pub handshake_timeout: Duration,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            tier: Tier::Standard,
            device_width: 1920,
            device_height: 1080,
            hardware_acceleration: true,
            low_latency_channel: false,
            initial_bitrate_kbps: 8_000,
            handshake_timeout: Duration::from_millis(
                skybridge_core::protocol::handshake::HANDSHAKE_TIMEOUT_MS,
            ),
        }
    }
}

/// Everything one session task needs, cloneable per connection.
struct SessionContext {
    config: ServerConfig,
    registry: Arc<SessionRegistry>,
    encoder_factory: Arc<dyn HardwareEncoderFactory>,
    grabber: Arc<dyn FrameGrabber>,
    monitor: Arc<PerformanceMonitor>,
    quality_rx: watch::Receiver<Option<LinkQuality>>,
    stats_rx: watch::Receiver<Option<ConnectionStats>>,
    running: Arc<AtomicBool>,
}

impl Clone for SessionContext {
    fn clone(&self) -> Self {
        Self {
            config: self.config.clone(),
            registry: Arc::clone(&self.registry),
            encoder_factory: Arc::clone(&self.encoder_factory),
            grabber: Arc::clone(&self.grabber),
            monitor: Arc::clone(&self.monitor),
            quality_rx: self.quality_rx.clone(),
            stats_rx: self.stats_rx.clone(),
            running: Arc::clone(&self.running),
        }
    }
}

/// The streaming session manager.
pub struct MirrorServer {
    config: ServerConfig,
    registry: Arc<SessionRegistry>,
    encoder_factory: Arc<dyn HardwareEncoderFactory>,
    grabber: Arc<dyn FrameGrabber>,
    monitor: Arc<PerformanceMonitor>,
    quality_rx: watch::Receiver<Option<LinkQuality>>,
    state: StdMutex<ServerState>,
    running: Arc<AtomicBool>,
    local_addr: StdMutex<Option<SocketAddr>>,
    accept_task: Mutex<Option<JoinHandle<()>>>,
    monitor_task: Mutex<Option<JoinHandle<()>>>,
    session_tasks: Arc<Mutex<Vec<JoinHandle<()>>>>,
}

impl MirrorServer {
    /// Builds a server around explicit collaborators: the session registry
    /// it owns, the capture collaborators, the performance monitor, and the
    /// coordinator's link-quality observable.
    pub fn new(
        config: ServerConfig,
        registry: Arc<SessionRegistry>,
        encoder_factory: Arc<dyn HardwareEncoderFactory>,
        grabber: Arc<dyn FrameGrabber>,
        monitor: Arc<PerformanceMonitor>,
        quality_rx: watch::Receiver<Option<LinkQuality>>,
    ) -> Self {
        Self {
            config,
            registry,
            encoder_factory,
            grabber,
            monitor,
            quality_rx,
            state: StdMutex::new(ServerState::Stopped),
            running: Arc::new(AtomicBool::new(false)),
            local_addr: StdMutex::new(None),
            accept_task: Mutex::new(None),
            monitor_task: Mutex::new(None),
            session_tasks: Arc::new(Mutex::new(Vec::new())),
        }
    }

    /// Current lifecycle state.
    pub fn state(&self) -> ServerState {
        *self.state.lock().expect("lock poisoned")
    }

    /// Bound address while running (useful with port 0).
    pub fn local_addr(&self) -> Option<SocketAddr> {
        *self.local_addr.lock().expect("lock poisoned")
    }

    /// The registry of active sessions.
    pub fn registry(&self) -> Arc<SessionRegistry> {
        Arc::clone(&self.registry)
    }

    /// Binds the listening endpoint and starts the accept and monitoring
    /// loops.  Fails fast – and stays `Stopped` – when already running or
    /// when the bind fails.
    ///
    /// # Errors
    ///
    /// [`ServerError::AlreadyRunning`] or [`ServerError::BindFailed`].
    pub async fn start(&self, port: u16) -> Result<(), ServerError> {
        {
            let mut state = self.state.lock().expect("lock poisoned");
            if *state != ServerState::Stopped {
                return Err(ServerError::AlreadyRunning);
            }
            *state = ServerState::Starting;
        }

        let addr = SocketAddr::from((Ipv4Addr::UNSPECIFIED, port));
        let listener = match TcpListener::bind(addr).await {
            Ok(listener) => listener,
            Err(source) => {
                *self.state.lock().expect("lock poisoned") = ServerState::Stopped;
                return Err(ServerError::BindFailed { addr, source });
            }
        };
        let bound = listener.local_addr().ok();
        *self.local_addr.lock().expect("lock poisoned") = bound;

        self.running.store(true, Ordering::SeqCst);

        let ctx = SessionContext {
            config: self.config.clone(),
            registry: Arc::clone(&self.registry),
            encoder_factory: Arc::clone(&self.encoder_factory),
            grabber: Arc::clone(&self.grabber),
            monitor: Arc::clone(&self.monitor),
            quality_rx: self.quality_rx.clone(),
            stats_rx: self.monitor.stats_watch(),
            running: Arc::clone(&self.running),
        };
        let tasks = Arc::clone(&self.session_tasks);
        *self.accept_task.lock().await = Some(tokio::spawn(accept_loop(listener, ctx, tasks)));

        let monitor = Arc::clone(&self.monitor);
        let running = Arc::clone(&self.running);
        *self.monitor_task.lock().await = Some(tokio::spawn(monitor.run(running)));

        *self.state.lock().expect("lock poisoned") = ServerState::Running;
        info!(addr = ?bound, "streaming server listening");
        Ok(())
    }

    /// Stops the server: cancels the accept loop, lets every session task
    /// run its teardown (they observe the flag within one frame interval),
    /// cancels the monitor, and clears the session table.  Idempotent.
    pub async fn stop(&self) {
        {
            let mut state = self.state.lock().expect("lock poisoned");
            if *state != ServerState::Running {
                return;
            }
            *state = ServerState::Stopping;
        }
        info!("streaming server stopping");

        self.running.store(false, Ordering::SeqCst);

        if let Some(handle) = self.accept_task.lock().await.take() {
            handle.abort();
        }

        let handles: Vec<JoinHandle<()>> = self.session_tasks.lock().await.drain(..).collect();
        for mut handle in handles {
            if timeout(STOP_GRACE, &mut handle).await.is_err() {
                warn!("session task exceeded stop grace period, aborting");
                handle.abort();
            }
        }

        if let Some(handle) = self.monitor_task.lock().await.take() {
            handle.abort();
        }

        self.registry.clear().await;
        self.grabber.release();
        *self.local_addr.lock().expect("lock poisoned") = None;
        *self.state.lock().expect("lock poisoned") = ServerState::Stopped;
        info!("streaming server stopped");
    }
}

// ── Accept loop ───────────────────────────────────────────────────────────────

async fn accept_loop(
    listener: TcpListener,
    ctx: SessionContext,
    tasks: Arc<Mutex<Vec<JoinHandle<()>>>>,
) {
    loop {
        match listener.accept().await {
            Ok((stream, peer)) => {
                if !ctx.running.load(Ordering::SeqCst) {
                    break;
                }
                debug!(%peer, "connection accepted");
                let session_ctx = ctx.clone();
                let handle = tokio::spawn(handle_session(stream, peer, session_ctx));
                tasks.lock().await.push(handle);
            }
            Err(e) => {
                if !ctx.running.load(Ordering::SeqCst) {
                    break;
                }
                warn!("accept error: {e}");
            }
        }
    }
}

// ── Session handling ──────────────────────────────────────────────────────────

#[derive(Debug, Error)]
enum HandshakeFailure {
    #[error("malformed hello: {0}")]
    Malformed(String),
    #[error("handshake I/O error: {0}")]
    Io(#[from] std::io::Error),
}

/// One connection, handshake to teardown.  Every exit path below releases
/// the pipeline and removes the session; sibling sessions are unaffected.
async fn handle_session(mut stream: TcpStream, peer: SocketAddr, mut ctx: SessionContext) {
    let latency_ms = match perform_handshake(&mut stream, ctx.config.handshake_timeout).await {
        Ok(latency) => latency,
        Err(e) => {
            warn!(%peer, "handshake rejected: {e}");
            return;
        }
    };

    let session = RemoteSession::new(peer.ip(), peer.port(), latency_ms);
    let session_id = session.session_id;
    ctx.registry.insert(session).await;

    // Pipeline selection is driven by the link quality at bring-up; a
    // transport switch tears the session down and rebuilds from here.
    let mode = select_mode(
        ctx.config.tier,
        ctx.config.device_width,
        ctx.config.device_height,
    );
    ctx.monitor.set_frame_size(mode.width, mode.height);

    let quality_now: Option<LinkQuality> = ctx.quality_rx.borrow_and_update().clone();
    let lossless = quality_now.as_ref().map_or(false, |q| q.supports_lossless);
    let mut pipeline = build_pipeline(
        lossless,
        ctx.config.hardware_acceleration,
        ctx.encoder_factory.as_ref(),
        Arc::clone(&ctx.grabber),
        &mode,
        ctx.config.initial_bitrate_kbps,
    );

    let mut controller = AdaptiveController::new(mode.clone());
    if let Some(q) = &quality_now {
        controller.on_link_quality(q);
    }

    let datagram = if ctx.config.low_latency_channel {
        match DatagramChannel::open(peer).await {
            Ok(channel) => Some(channel),
            Err(e) => {
                warn!(%peer, "datagram channel unavailable, staying on stream: {e}");
                None
            }
        }
    } else {
        None
    };

    ctx.registry
        .set_state(session_id, SessionState::Streaming)
        .await;
    info!(%session_id, %peer, hardware = pipeline.is_hardware(), "session streaming");

    let mut bitrate_kbps = ctx.config.initial_bitrate_kbps;

    loop {
        if !ctx.running.load(Ordering::SeqCst) {
            break;
        }

        // React to re-estimated link quality.
        if ctx.quality_rx.has_changed().unwrap_or(false) {
            if let Some(q) = ctx.quality_rx.borrow_and_update().clone() {
                controller.on_link_quality(&q);
            }
        }

        // React to the feedback loop's per-second snapshot: quality slider,
        // then the bitrate recommendation pushed live into the encoder.
        if ctx.stats_rx.has_changed().unwrap_or(false) {
            let snapshot: Option<ConnectionStats> = *ctx.stats_rx.borrow_and_update();
            if let Some(stats) = snapshot {
                controller.on_stats(&stats);
                bitrate_kbps = recommend_bitrate(&stats, bitrate_kbps, controller.target_fps());
                pipeline.update_bitrate(bitrate_kbps);
            }
        }

        let frame = match pipeline.next_frame(mode.width, mode.height, controller.quality()) {
            Ok(frame) => frame,
            Err(e) => {
                warn!(%session_id, "capture failed, closing session: {e}");
                break;
            }
        };

        let send_result = match &datagram {
            Some(channel) if channel.fits(frame.data.len()) => channel.send(&frame.data).await,
            _ => write_framed(&mut stream, &frame.data).await,
        };
        let sent = match send_result {
            Ok(sent) => sent,
            Err(e) => {
                debug!(%session_id, "client gone: {e}");
                break;
            }
        };

        ctx.registry
            .record_frame(session_id, sent as u64, controller.target_fps(), bitrate_kbps)
            .await;

        tokio::time::sleep(controller.frame_interval()).await;
    }

    ctx.registry
        .set_state(session_id, SessionState::Closing)
        .await;
    pipeline.release();
    ctx.registry.remove(session_id).await;
    // The shared capture surface stays held while siblings stream; the last
    // session out releases it (the next session re-acquires lazily).
    if ctx.registry.is_empty().await {
        ctx.grabber.release();
    }
    info!(%session_id, "session closed");
}

/// Performs the hello/ack exchange.
///
/// A client that stays silent past the deadline is deliberately accepted
/// with [`HANDSHAKE_PENALTY_LATENCY_MS`] as its starting latency – slow
/// proximity links legitimately miss the deadline and still stream fine.
/// Bytes that arrive but do not parse are a hard reject.
async fn perform_handshake(
    stream: &mut TcpStream,
    deadline: Duration,
) -> Result<f64, HandshakeFailure> {
    match timeout(deadline, read_framed(stream)).await {
        Ok(Ok(payload)) => {
            let hello = HandshakeHello::from_bytes(&payload)
                .map_err(|e| HandshakeFailure::Malformed(e.to_string()))?;
            let ack = HandshakeAck::accept(&hello);
            write_framed(stream, &ack.to_bytes()).await?;

            // One-way delay from the client's clock, clamped against skew.
            let latency = (ack.timestamp_ms.saturating_sub(hello.timestamp_ms) as f64)
                .clamp(0.0, 1_000.0);
            Ok(latency)
        }
        Ok(Err(e)) => Err(HandshakeFailure::Io(e)),
        Err(_) => Ok(HANDSHAKE_PENALTY_LATENCY_MS),
    }
}

// ── Wire helpers ──────────────────────────────────────────────────────────────

/// Reads one length-prefixed frame off the stream.
async fn read_framed(stream: &mut TcpStream) -> std::io::Result<Vec<u8>> {
    let mut prefix = [0u8; framing::LENGTH_PREFIX_SIZE];
    stream.read_exact(&mut prefix).await?;
    let declared = u32::from_be_bytes(prefix) as usize;
    let len = framing::validate_frame_len(declared)
        .map_err(|e| std::io::Error::new(std::io::ErrorKind::InvalidData, e.to_string()))?;

    let mut payload = vec![0u8; len];
    stream.read_exact(&mut payload).await?;
    Ok(payload)
}

/// Writes one length-prefixed frame; returns bytes put on the wire.
async fn write_framed(stream: &mut TcpStream, payload: &[u8]) -> std::io::Result<usize> {
    let framed = framing::encode_frame(payload)
        .map_err(|e| std::io::Error::new(std::io::ErrorKind::InvalidData, e.to_string()))?;
    stream.write_all(&framed).await?;
    Ok(framed.len())
}

// ── Datagram channel ──────────────────────────────────────────────────────────

/// Secondary low-latency channel layered beside the stream socket.  Frames
/// that fit a single datagram skip the stream entirely; oversized frames
/// fall back to the framed TCP path.
struct DatagramChannel {
    socket: UdpSocket,
}

impl DatagramChannel {
    async fn open(peer: SocketAddr) -> std::io::Result<Self> {
        let socket = UdpSocket::bind(SocketAddr::from((Ipv4Addr::UNSPECIFIED, 0))).await?;
        socket.connect(peer).await?;
        Ok(Self { socket })
    }

    fn fits(&self, len: usize) -> bool {
        len <= MAX_DATAGRAM_PAYLOAD
    }

    async fn send(&self, payload: &[u8]) -> std::io::Result<usize> {
        self.socket.send(payload).await
    }
}

// ── Tests ─────────────────────────────────────────────────────────────────────
