//! Wire protocol: session handshake payloads and frame framing.

pub mod framing;
pub mod handshake;

pub use framing::{decode_frame, encode_frame, FramingError, LENGTH_PREFIX_SIZE, MAX_FRAME_SIZE};
pub use handshake::{
    HandshakeAck, HandshakeError, HandshakeHello, HandshakeStatus, HANDSHAKE_PENALTY_LATENCY_MS,
    HANDSHAKE_TIMEOUT_MS,
};
