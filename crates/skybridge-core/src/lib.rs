//! # skybridge-core
//!
//! Shared library for SkyBridge containing the peer/transport domain model,
//! per-medium link-quality estimation, the adaptive streaming controller,
//! and the wire protocol (handshake payloads + frame framing).
//!
//! This crate is consumed by the host application and by any future viewer
//! application. It has zero dependencies on OS APIs, UI frameworks, or
//! network sockets.
//!
//! # Architecture overview (for beginners)
//!
//! SkyBridge mirrors one device's screen to another over whatever medium
//! happens to be the best available: a WiFi-Direct hotspot, the local LAN,
//! a Bluetooth/NFC proximity channel, an AirPlay peer, or – as the path of
//! last resort – a cloud relay.  This crate is the shared foundation.  It
//! defines:
//!
//! - **`domain`** – Pure business logic with no OS dependencies: what a
//!   discovered peer looks like, which transports its platform can speak,
//!   how good a given link is, which resolution/frame-rate menu an account
//!   tier unlocks, and how bitrate/frame-rate adapt to the measured link.
//!
//! - **`protocol`** – How bytes travel over the wire.  Screen frames are
//!   carried with a 4-byte big-endian length prefix; the session handshake
//!   is a small JSON payload acknowledged with a status field.

// Declare the two top-level modules.  Rust will look for each in a
// subdirectory with the same name (e.g., src/domain/mod.rs).
pub mod domain;
pub mod protocol;

// Re-export the most-used types at the crate root so callers can write
// `skybridge_core::Transport` instead of `skybridge_core::domain::transport::Transport`.
pub use domain::adaptive::{
    recommend_bitrate, AdaptiveController, ConnectionStats, MAX_BITRATE_KBPS, MIN_BITRATE_KBPS,
};
pub use domain::capability::{resolve_platform, should_exclude, transports_for, Platform};
pub use domain::display::{select_mode, ResolutionMode, Tier};
pub use domain::peer::{PeerDevice, TransportHint};
pub use domain::quality::LinkQuality;
pub use domain::transport::{AccountEndpoint, Transport, DEFAULT_ACCOUNT_ID};
pub use protocol::framing::{decode_frame, encode_frame, FramingError};
pub use protocol::handshake::{HandshakeAck, HandshakeHello, HandshakeStatus};
