//! Capture/encode collaborator traits and pipeline selection.
//!
//! The platform layer owns the mirroring surface (virtual display), the
//! hardware video encoder, and the raw-frame grab+compress fallback.  The
//! session manager drives them through the traits below.
//!
//! Pipeline rule: when the negotiated link is lossless-capable and hardware
//! acceleration is enabled, try to prepare a hardware encoder – highest-
//! efficiency codec profile first, broadly-supported profile second – bound
//! directly to the capture surface.  Any preparation failure, or a
//! non-lossless link, falls back to the software path that grabs raw frames
//! and compresses them per tick.

use std::sync::Arc;
use std::time::Instant;

use thiserror::Error;
use tracing::{debug, warn};

use skybridge_core::ResolutionMode;

pub mod mock;

/// Video codec profile requested from the hardware encoder.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CodecProfile {
    /// Highest efficiency, preferred on lossless links.
    Hevc,
    /// Broadly supported fallback.
    H264,
}

/// One encoded (or software-compressed) frame ready for transmission.
#[derive(Debug, Clone)]
pub struct EncodedFrame {
    pub data: Vec<u8>,
    pub width: u32,
    pub height: u32,
    pub keyframe: bool,
    pub captured_at: Instant,
}

/// Errors produced by capture collaborators.
#[derive(Debug, Error)]
pub enum CaptureError {
    /// The hardware encoder could not be prepared.  The session falls back
    /// to the software path instead of failing.
    #[error("encoder preparation failed ({profile:?}): {reason}")]
    PrepareFailed { profile: CodecProfile, reason: String },

    /// The capture surface disappeared mid-session.
    #[error("capture surface lost: {0}")]
    SurfaceLost(String),

    /// A software frame grab failed.
    #[error("frame grab failed: {0}")]
    GrabFailed(String),
}

/// A running hardware encoder bound to the platform's mirroring surface.
///
/// Owned by exactly one session task; dropped or released on every exit
/// path.  `release` must be idempotent.
pub trait HardwareEncoder: Send {
    /// Pops the oldest buffered encoded frame, if any.
    fn pull_frame(&mut self) -> Option<EncodedFrame>;

    /// Pushes a new target bitrate into the running encoder without a
    /// pipeline restart.
    fn update_bitrate(&mut self, bitrate_kbps: u32);

    /// Releases the encoder and its surface.  Safe to call twice.
    fn release(&mut self);
}

/// Factory preparing hardware encoders against the capture surface.
pub trait HardwareEncoderFactory: Send + Sync {
    /// # Errors
    ///
    /// Returns [`CaptureError::PrepareFailed`] when the surface or codec is
    /// unavailable; callers fall back to the software path.
    fn prepare(
        &self,
        mode: &ResolutionMode,
        profile: CodecProfile,
        initial_bitrate_kbps: u32,
    ) -> Result<Box<dyn HardwareEncoder>, CaptureError>;
}

/// Software fallback: grab a raw frame and compress it at the requested
/// quality (JPEG-equivalent slider, 30..=95).
pub trait FrameGrabber: Send + Sync {
    /// # Errors
    ///
    /// Returns [`CaptureError`] when the grab fails; the session for which
    /// it fails is abandoned, siblings continue.
    fn grab(&self, width: u32, height: u32, quality: u8) -> Result<EncodedFrame, CaptureError>;

    /// Releases capture resources.  Safe to call twice; the surface is
    /// re-acquired lazily by the next grab.
    fn release(&self);
}

// ── Pipeline ──────────────────────────────────────────────────────────────────

/// The per-session capture pipeline, selected once at session bring-up.
pub enum Pipeline {
    /// Hardware encoder with the software grabber as buffered-miss fallback.
    Hardware {
        encoder: Box<dyn HardwareEncoder>,
        grabber: Arc<dyn FrameGrabber>,
    },
    /// Software grab+compress only.
    Software { grabber: Arc<dyn FrameGrabber> },
}

impl Pipeline {
    /// Produces the next frame: a buffered hardware-encoded frame when one
    /// exists, otherwise a fresh software capture.
    ///
    /// # Errors
    ///
    /// Propagates grabber failures; the caller tears the session down.
    pub fn next_frame(
        &mut self,
        width: u32,
        height: u32,
        quality: u8,
    ) -> Result<EncodedFrame, CaptureError> {
        match self {
            Pipeline::Hardware { encoder, grabber } => match encoder.pull_frame() {
                Some(frame) => Ok(frame),
                None => grabber.grab(width, height, quality),
            },
            Pipeline::Software { grabber } => grabber.grab(width, height, quality),
        }
    }

    /// Pushes a bitrate change into a running hardware encoder; a no-op for
    /// the software path, whose rate is governed by the quality slider.
    pub fn update_bitrate(&mut self, bitrate_kbps: u32) {
        if let Pipeline::Hardware { encoder, .. } = self {
            encoder.update_bitrate(bitrate_kbps);
        }
    }

    /// Releases the resources this pipeline exclusively owns (the hardware
    /// encoder).  The shared capture surface is released by the session
    /// manager when the last session ends.  Idempotent.
    pub fn release(&mut self) {
        if let Pipeline::Hardware { encoder, .. } = self {
            encoder.release();
        }
    }

    pub fn is_hardware(&self) -> bool {
        matches!(self, Pipeline::Hardware { .. })
    }
}

// Encoder handles must not outlive their session task, whichever way the
// task exits.  Release is idempotent, so the explicit teardown call and
// this safety net compose.
impl Drop for Pipeline {
    fn drop(&mut self) {
        self.release();
    }
}

/// Selects and prepares the pipeline for one session.
pub fn build_pipeline(
    lossless: bool,
    hardware_acceleration: bool,
    factory: &dyn HardwareEncoderFactory,
    grabber: Arc<dyn FrameGrabber>,
    mode: &ResolutionMode,
    initial_bitrate_kbps: u32,
) -> Pipeline {
    if lossless && hardware_acceleration {
        for profile in [CodecProfile::Hevc, CodecProfile::H264] {
            match factory.prepare(mode, profile, initial_bitrate_kbps) {
                Ok(encoder) => {
                    debug!(?profile, "hardware pipeline prepared");
                    return Pipeline::Hardware { encoder, grabber };
                }
                Err(e) => warn!(?profile, "hardware encoder unavailable: {e}"),
            }
        }
    }
    debug!("software pipeline selected");
    Pipeline::Software { grabber }
}

// ── Tests ─────────────────────────────────────────────────────────────────────
