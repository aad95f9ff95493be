//! Session handshake payloads.
//!
//! The handshake is a small JSON object carried inside one length-prefixed
//! frame: the client sends a [`HandshakeHello`] with a random identifier and
//! a timestamp, the server acknowledges with a [`HandshakeAck`] echoing the
//! identifier and a status field.  Any other shape is not defined by this
//! protocol.
//!
//! A client that stays silent past the deadline is still accepted with the
//! penalty latency recorded as its starting estimate – slow proximity links
//! legitimately miss the deadline while remaining perfectly usable.  Only
//! bytes that arrive and fail to parse are a hard reject.

use serde::{Deserialize, Serialize};
use thiserror::Error;
use uuid::Uuid;

/// Deadline for the client's hello frame.
pub const HANDSHAKE_TIMEOUT_MS: u64 = 1500;

/// Starting latency recorded for a client accepted on handshake timeout.
pub const HANDSHAKE_PENALTY_LATENCY_MS: f64 = 250.0;

/// Errors that can occur while parsing handshake payloads.
#[derive(Debug, Error)]
pub enum HandshakeError {
    /// The payload was not valid handshake JSON.
    #[error("malformed handshake payload: {0}")]
    Malformed(#[from] serde_json::Error),
}

/// Acknowledgement status returned by the server.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum HandshakeStatus {
    Ok,
    Rejected,
}

/// The client's opening payload.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct HandshakeHello {
    /// Random identifier echoed back in the ack.
    pub id: Uuid,
    /// Client wall-clock milliseconds since the Unix epoch.
    pub timestamp_ms: u64,
}

impl HandshakeHello {
    /// Creates a hello with a fresh identifier and the current wall clock.
    pub fn new() -> Self {
        Self {
            id: Uuid::new_v4(),
            timestamp_ms: now_ms(),
        }
    }

    /// Serializes to the JSON bytes carried inside one frame.
    pub fn to_bytes(&self) -> Vec<u8> {
        // Serialization of this plain struct cannot fail.
        serde_json::to_vec(self).unwrap_or_default()
    }

    /// Parses a hello from frame payload bytes.
    ///
    /// # Errors
    ///
    /// Returns [`HandshakeError::Malformed`] for anything that is not a
    /// hello-shaped JSON object.
    pub fn from_bytes(bytes: &[u8]) -> Result<Self, HandshakeError> {
        Ok(serde_json::from_slice(bytes)?)
    }
}

impl Default for HandshakeHello {
    fn default() -> Self {
        Self::new()
    }
}

/// The server's acknowledgement.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct HandshakeAck {
    /// The identifier from the hello being acknowledged.
    pub id: Uuid,
    pub status: HandshakeStatus,
    /// Server wall-clock milliseconds since the Unix epoch.
    pub timestamp_ms: u64,
}

impl HandshakeAck {
    /// Builds an `Ok` acknowledgement for a hello.
    pub fn accept(hello: &HandshakeHello) -> Self {
        Self {
            id: hello.id,
            status: HandshakeStatus::Ok,
            timestamp_ms: now_ms(),
        }
    }

    pub fn to_bytes(&self) -> Vec<u8> {
        serde_json::to_vec(self).unwrap_or_default()
    }

    /// # Errors
    ///
    /// Returns [`HandshakeError::Malformed`] for non-ack payloads.
    pub fn from_bytes(bytes: &[u8]) -> Result<Self, HandshakeError> {
        Ok(serde_json::from_slice(bytes)?)
    }
}

fn now_ms() -> u64 {
    use std::time::{SystemTime, UNIX_EPOCH};
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_millis() as u64)
        .unwrap_or(0)
}

// ── Tests ─────────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_hello_round_trip() {
        let hello = HandshakeHello::new();
        let restored = HandshakeHello::from_bytes(&hello.to_bytes()).unwrap();
        assert_eq!(restored, hello);
    }

    #[test]
    fn test_ack_echoes_hello_id_with_ok_status() {
        let hello = HandshakeHello::new();
        let ack = HandshakeAck::accept(&hello);
        assert_eq!(ack.id, hello.id);
        assert_eq!(ack.status, HandshakeStatus::Ok);

        let restored = HandshakeAck::from_bytes(&ack.to_bytes()).unwrap();
        assert_eq!(restored, ack);
    }

    #[test]
    fn test_status_serializes_lowercase() {
        let hello = HandshakeHello::new();
        let ack = HandshakeAck::accept(&hello);
        let json = String::from_utf8(ack.to_bytes()).unwrap();
        assert!(json.contains("\"status\":\"ok\""), "json = {json}");
    }

    #[test]
    fn test_malformed_payload_is_rejected() {
        assert!(HandshakeHello::from_bytes(b"not json").is_err());
        assert!(HandshakeHello::from_bytes(b"{\"unexpected\":true}").is_err());
        assert!(HandshakeAck::from_bytes(b"[]").is_err());
    }

    #[test]
    fn test_fresh_hellos_have_distinct_ids() {
        assert_ne!(HandshakeHello::new().id, HandshakeHello::new().id);
    }
}
