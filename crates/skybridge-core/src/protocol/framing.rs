//! Length-prefixed frame framing for the software streaming path.
//!
//! Wire format:
//! ```text
//! [payload_len:4][payload:N]
//! ```
//! The length prefix is big-endian.  This framing carries both the handshake
//! payloads and – when no secondary low-latency channel is active – every
//! encoded screen frame on the stream socket.

use thiserror::Error;

/// Size of the big-endian length prefix.
pub const LENGTH_PREFIX_SIZE: usize = 4;

/// Upper bound for a single frame payload.  A 4K frame compresses far below
/// this; anything larger indicates a desynchronized or hostile stream.
pub const MAX_FRAME_SIZE: usize = 32 * 1024 * 1024;

/// Errors that can occur during frame encoding or decoding.
#[derive(Debug, Error, PartialEq)]
pub enum FramingError {
    /// The payload exceeds [`MAX_FRAME_SIZE`].
    #[error("frame too large: {size} bytes (max {max})")]
    FrameTooLarge { size: usize, max: usize },

    /// The byte slice is shorter than the declared frame.
    #[error("insufficient data: need {needed} bytes, got {available}")]
    InsufficientData { needed: usize, available: usize },
}

/// Encodes a payload with its 4-byte big-endian length prefix.
///
/// # Errors
///
/// Returns [`FramingError::FrameTooLarge`] when the payload exceeds
/// [`MAX_FRAME_SIZE`].
pub fn encode_frame(payload: &[u8]) -> Result<Vec<u8>, FramingError> {
    if payload.len() > MAX_FRAME_SIZE {
        return Err(FramingError::FrameTooLarge {
            size: payload.len(),
            max: MAX_FRAME_SIZE,
        });
    }
    let mut buf = Vec::with_capacity(LENGTH_PREFIX_SIZE + payload.len());
    buf.extend_from_slice(&(payload.len() as u32).to_be_bytes());
    buf.extend_from_slice(payload);
    Ok(buf)
}

/// Decodes one frame from the beginning of `bytes`.
///
/// Returns the payload slice and the total number of bytes consumed (prefix
/// + payload) so the caller can advance their read cursor.
///
/// # Errors
///
/// Returns [`FramingError`] when the slice is truncated or the declared
/// length exceeds [`MAX_FRAME_SIZE`].
pub fn decode_frame(bytes: &[u8]) -> Result<(&[u8], usize), FramingError> {
    if bytes.len() < LENGTH_PREFIX_SIZE {
        return Err(FramingError::InsufficientData {
            needed: LENGTH_PREFIX_SIZE,
            available: bytes.len(),
        });
    }
    let declared = u32::from_be_bytes([bytes[0], bytes[1], bytes[2], bytes[3]]) as usize;
    let declared = validate_frame_len(declared)?;

    let total = LENGTH_PREFIX_SIZE + declared;
    if bytes.len() < total {
        return Err(FramingError::InsufficientData {
            needed: total,
            available: bytes.len(),
        });
    }
    Ok((&bytes[LENGTH_PREFIX_SIZE..total], total))
}

/// Validates a length-prefix value read off the wire.
///
/// Socket readers use this before allocating the payload buffer.
pub fn validate_frame_len(declared: usize) -> Result<usize, FramingError> {
    if declared > MAX_FRAME_SIZE {
        Err(FramingError::FrameTooLarge {
            size: declared,
            max: MAX_FRAME_SIZE,
        })
    } else {
        Ok(declared)
    }
}

// ── Tests ─────────────────────────────────────────────────────────────────────
