//! Capture fakes for tests and the headless binary.
//!
//! `TestPatternGrabber` produces deterministic compressed-looking payloads
//! whose size tracks the quality slider; `FakeEncoderFactory` scripts which
//! codec profiles prepare successfully and exposes the released/bitrate
//! state of the last encoder it handed out.

use std::collections::VecDeque;
use std::sync::atomic::{AtomicBool, AtomicU32, AtomicU64, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Instant;

use super::{CaptureError, CodecProfile, EncodedFrame, FrameGrabber, HardwareEncoder,
    HardwareEncoderFactory};
use skybridge_core::ResolutionMode;

// ── TestPatternGrabber ────────────────────────────────────────────────────────

/// Software-path fake: emits a synthetic payload per grab.
pub struct TestPatternGrabber {
    grabs: AtomicU64,
    released: Arc<AtomicBool>,
}

impl TestPatternGrabber {
    pub fn new() -> Self {
        Self {
            grabs: AtomicU64::new(0),
            released: Arc::new(AtomicBool::new(false)),
        }
    }

    /// Number of frames grabbed so far.
    pub fn grab_count(&self) -> u64 {
        self.grabs.load(Ordering::Relaxed)
    }

    /// Whether `release` has been called.
    pub fn released(&self) -> bool {
        self.released.load(Ordering::Relaxed)
    }

    /// Shared handle for asserting release from another task.
    pub fn released_handle(&self) -> Arc<AtomicBool> {
        Arc::clone(&self.released)
    }
}

impl Default for TestPatternGrabber {
    fn default() -> Self {
        Self::new()
    }
}

impl FrameGrabber for TestPatternGrabber {
    fn grab(&self, width: u32, height: u32, quality: u8) -> Result<EncodedFrame, CaptureError> {
        // A released surface is re-acquired lazily by the next grab.
        self.released.store(false, Ordering::Relaxed);
        let n = self.grabs.fetch_add(1, Ordering::Relaxed);

        // Payload size tracks the quality slider so adaptive tests can
        // observe compression changes.
        let len = 256 + quality as usize * 16;
        let data = vec![(n % 251) as u8; len];

        Ok(EncodedFrame {
            data,
            width,
            height,
            keyframe: n == 0,
            captured_at: Instant::now(),
        })
    }

    fn release(&self) {
        self.released.store(true, Ordering::Relaxed);
    }
}

// ── BufferedFakeEncoder ───────────────────────────────────────────────────────

/// Hardware-path fake: a pre-filled buffer of encoded frames plus shared
/// released/bitrate state the factory exposes to tests.
pub struct BufferedFakeEncoder {
    frames: VecDeque<EncodedFrame>,
    released: Arc<AtomicBool>,
    bitrate_kbps: Arc<AtomicU32>,
}

impl BufferedFakeEncoder {
    fn new(buffered: usize, bitrate_kbps: u32) -> Self {
        let frames = (0..buffered)
            .map(|i| EncodedFrame {
                data: vec![0xE0; 4_096],
                width: 1920,
                height: 1080,
                keyframe: i == 0,
                captured_at: Instant::now(),
            })
            .collect();
        Self {
            frames,
            released: Arc::new(AtomicBool::new(false)),
            bitrate_kbps: Arc::new(AtomicU32::new(bitrate_kbps)),
        }
    }
}

impl HardwareEncoder for BufferedFakeEncoder {
    fn pull_frame(&mut self) -> Option<EncodedFrame> {
        if self.released.load(Ordering::Relaxed) {
            return None;
        }
        self.frames.pop_front()
    }

    fn update_bitrate(&mut self, bitrate_kbps: u32) {
        self.bitrate_kbps.store(bitrate_kbps, Ordering::Relaxed);
    }

    fn release(&mut self) {
        self.released.store(true, Ordering::Relaxed);
        self.frames.clear();
    }
}

// ── FakeEncoderFactory ────────────────────────────────────────────────────────

/// Scripts which codec profiles prepare successfully.
pub struct FakeEncoderFactory {
    accepted: Option<Vec<CodecProfile>>,
    buffered_frames: usize,
    prepared: Mutex<Vec<CodecProfile>>,
    last_released: Mutex<Option<Arc<AtomicBool>>>,
    last_bitrate: Mutex<Option<Arc<AtomicU32>>>,
}

impl FakeEncoderFactory {
    /// Every profile prepares successfully.
    pub fn accepting_all() -> Self {
        Self::with_accepted(None)
    }

    /// Only `profile` prepares successfully.
    pub fn accepting_only(profile: CodecProfile) -> Self {
        Self::with_accepted(Some(vec![profile]))
    }

    /// Every preparation fails (forces the software fallback).
    pub fn failing_all() -> Self {
        Self::with_accepted(Some(Vec::new()))
    }

    fn with_accepted(accepted: Option<Vec<CodecProfile>>) -> Self {
        Self {
            accepted,
            buffered_frames: 0,
            prepared: Mutex::new(Vec::new()),
            last_released: Mutex::new(None),
            last_bitrate: Mutex::new(None),
        }
    }

    /// Pre-fills each prepared encoder with `n` buffered frames.
    pub fn with_buffered_frames(mut self, n: usize) -> Self {
        self.buffered_frames = n;
        self
    }

    /// The profiles preparation was attempted with, in order.
    pub fn prepared_profiles(&self) -> Vec<CodecProfile> {
        self.prepared.lock().expect("lock poisoned").clone()
    }

    /// Released flag of the last encoder handed out, if any.
    pub fn last_encoder_released(&self) -> Option<bool> {
        self.last_released
            .lock()
            .expect("lock poisoned")
            .as_ref()
            .map(|flag| flag.load(Ordering::Relaxed))
    }

    /// Current bitrate of the last encoder handed out, if any.
    pub fn last_encoder_bitrate(&self) -> Option<u32> {
        self.last_bitrate
            .lock()
            .expect("lock poisoned")
            .as_ref()
            .map(|rate| rate.load(Ordering::Relaxed))
    }
}

impl HardwareEncoderFactory for FakeEncoderFactory {
    fn prepare(
        &self,
        _mode: &ResolutionMode,
        profile: CodecProfile,
        initial_bitrate_kbps: u32,
    ) -> Result<Box<dyn HardwareEncoder>, CaptureError> {
        self.prepared.lock().expect("lock poisoned").push(profile);

        let accepted = self
            .accepted
            .as_ref()
            .map_or(true, |list| list.contains(&profile));
        if !accepted {
            return Err(CaptureError::PrepareFailed {
                profile,
                reason: "scripted refusal".to_string(),
            });
        }

        let encoder = BufferedFakeEncoder::new(self.buffered_frames, initial_bitrate_kbps);
        *self.last_released.lock().expect("lock poisoned") = Some(Arc::clone(&encoder.released));
        *self.last_bitrate.lock().expect("lock poisoned") = Some(Arc::clone(&encoder.bitrate_kbps));
        Ok(Box::new(encoder))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_grabber_payload_size_tracks_quality() {
        let grabber = TestPatternGrabber::new();
        let low = grabber.grab(1280, 720, 30).unwrap();
        let high = grabber.grab(1280, 720, 95).unwrap();
        assert!(high.data.len() > low.data.len());
        assert_eq!(grabber.grab_count(), 2);
    }

    #[test]
    fn test_grabber_release_is_idempotent_and_grab_reacquires() {
        let grabber = TestPatternGrabber::new();
        grabber.release();
        grabber.release(); // double release is a no-op
        assert!(grabber.released());

        // The next grab re-acquires the surface.
        assert!(grabber.grab(1280, 720, 75).is_ok());
        assert!(!grabber.released());
    }

    #[test]
    fn test_fake_encoder_drains_buffer_then_returns_none() {
        let factory = FakeEncoderFactory::accepting_all().with_buffered_frames(2);
        let mode = skybridge_core::select_mode(skybridge_core::Tier::Premium, 1920, 1080);
        let mut encoder = factory.prepare(&mode, CodecProfile::Hevc, 8_000).unwrap();

        assert!(encoder.pull_frame().is_some());
        assert!(encoder.pull_frame().is_some());
        assert!(encoder.pull_frame().is_none());
    }

    #[test]
    fn test_fake_encoder_bitrate_visible_through_factory() {
        let factory = FakeEncoderFactory::accepting_all();
        let mode = skybridge_core::select_mode(skybridge_core::Tier::Premium, 1920, 1080);
        let mut encoder = factory.prepare(&mode, CodecProfile::H264, 8_000).unwrap();

        encoder.update_bitrate(12_345);
        assert_eq!(factory.last_encoder_bitrate(), Some(12_345));

        encoder.release();
        encoder.release();
        assert_eq!(factory.last_encoder_released(), Some(true));
    }
}
