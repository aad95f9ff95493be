//! Session registry: the in-memory table of active remote sessions.
//!
//! The registry is owned exclusively by the streaming server; every other
//! component reads snapshots.  Each entry is created on connection
//! acceptance, mutated by the frame-send loop once per frame, and removed
//! when the connection drops or the server stops.

use std::collections::HashMap;
use std::net::IpAddr;
use std::time::Instant;

use tokio::sync::RwLock;
use uuid::Uuid;

/// Lifecycle state of one streaming session.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionState {
    /// TCP connection accepted, handshake not yet attempted.
    Connecting,
    /// Waiting for (or processing) the client's hello frame.
    Handshaking,
    /// Frames are flowing.
    Streaming,
    /// Teardown in progress.
    Closing,
    /// Fully torn down; the entry is about to leave the table.
    Closed,
}

/// Runtime state for one connected client.
#[derive(Debug, Clone)]
pub struct RemoteSession {
    pub session_id: Uuid,
    pub client_address: IpAddr,
    pub client_port: u16,
    pub state: SessionState,
    pub is_active: bool,
    pub start_time: Instant,
    pub last_activity: Instant,
    pub bytes_transmitted: u64,
    pub frames_transmitted: u64,
    pub current_fps: u32,
    pub current_bitrate_kbps: u32,
    pub latency_ms: f64,
}

impl RemoteSession {
    /// Creates a fresh session entry in the `Handshaking` state.
    pub fn new(client_address: IpAddr, client_port: u16, latency_ms: f64) -> Self {
        let now = Instant::now();
        Self {
            session_id: Uuid::new_v4(),
            client_address,
            client_port,
            state: SessionState::Handshaking,
            is_active: true,
            start_time: now,
            last_activity: now,
            bytes_transmitted: 0,
            frames_transmitted: 0,
            current_fps: 0,
            current_bitrate_kbps: 0,
            latency_ms,
        }
    }
}

/// Aggregate figures across active sessions, consumed by the performance
/// monitor when composing per-second connection statistics.
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct SessionAggregates {
    pub active_sessions: usize,
    pub total_bytes: u64,
    pub total_frames: u64,
    pub avg_fps: f64,
    pub avg_latency_ms: f64,
}

/// In-memory registry of all streaming sessions.
///
/// A `HashMap<Uuid, RemoteSession>` behind a Tokio `RwLock`: the server's
/// session tasks write, everyone else reads cloned snapshots.
#[derive(Default)]
pub struct SessionRegistry {
    sessions: RwLock<HashMap<Uuid, RemoteSession>>,
}

impl SessionRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers a session.
    pub async fn insert(&self, session: RemoteSession) {
        self.sessions
            .write()
            .await
            .insert(session.session_id, session);
    }

    /// Removes a session, returning the final entry (marked inactive).
    pub async fn remove(&self, id: Uuid) -> Option<RemoteSession> {
        let mut removed = self.sessions.write().await.remove(&id)?;
        removed.is_active = false;
        removed.state = SessionState::Closed;
        Some(removed)
    }

    /// Updates the lifecycle state of a session.
    pub async fn set_state(&self, id: Uuid, state: SessionState) {
        if let Some(session) = self.sessions.write().await.get_mut(&id) {
            session.state = state;
        }
    }

    /// Records one transmitted frame: byte/frame counters, current adaptive
    /// figures, and the activity timestamp.
    pub async fn record_frame(&self, id: Uuid, bytes: u64, fps: u32, bitrate_kbps: u32) {
        if let Some(session) = self.sessions.write().await.get_mut(&id) {
            session.bytes_transmitted += bytes;
            session.frames_transmitted += 1;
            session.current_fps = fps;
            session.current_bitrate_kbps = bitrate_kbps;
            session.last_activity = Instant::now();
        }
    }

    /// Returns a clone of one session.
    pub async fn get(&self, id: Uuid) -> Option<RemoteSession> {
        self.sessions.read().await.get(&id).cloned()
    }

    /// Returns a snapshot of all sessions.
    pub async fn snapshot(&self) -> Vec<RemoteSession> {
        self.sessions.read().await.values().cloned().collect()
    }

    /// Aggregates across currently active sessions.
    pub async fn aggregates(&self) -> SessionAggregates {
        let sessions = self.sessions.read().await;
        let active: Vec<_> = sessions.values().filter(|s| s.is_active).collect();
        if active.is_empty() {
            return SessionAggregates::default();
        }

        let count = active.len();
        SessionAggregates {
            active_sessions: count,
            total_bytes: active.iter().map(|s| s.bytes_transmitted).sum(),
            total_frames: active.iter().map(|s| s.frames_transmitted).sum(),
            avg_fps: active.iter().map(|s| s.current_fps as f64).sum::<f64>() / count as f64,
            avg_latency_ms: active.iter().map(|s| s.latency_ms).sum::<f64>() / count as f64,
        }
    }

    /// Number of registered sessions.
    pub async fn len(&self) -> usize {
        self.sessions.read().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.sessions.read().await.is_empty()
    }

    /// Drops every session (server stop).
    pub async fn clear(&self) {
        self.sessions.write().await.clear();
    }
}

// ── Tests ─────────────────────────────────────────────────────────────────────
