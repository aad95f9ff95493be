//! Tiered resolution/frame-rate menu and mode selection.
//!
//! Accounts unlock a menu of named capture modes grouped by tier.  The mode
//! actually used for a session is clamped twice: by the tier's ceiling and
//! by the physical screen the session captures.

use serde::{Deserialize, Serialize};
use tracing::debug;

/// Smallest capture the pipeline will produce; anything below this is a
/// degenerate capture that encoders reject or render unreadably.
pub const MIN_CAPTURE_WIDTH: u32 = 720;
pub const MIN_CAPTURE_HEIGHT: u32 = 480;

/// A named `{width, height, frame-rates}` capture mode.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResolutionMode {
    pub name: &'static str,
    pub width: u32,
    pub height: u32,
    /// Supported target frame rates, ascending.  Adaptive control snaps to
    /// members of this list and never exceeds the last entry.
    pub frame_rates: Vec<u32>,
}

impl ResolutionMode {
    fn new(name: &'static str, width: u32, height: u32, frame_rates: &[u32]) -> Self {
        Self {
            name,
            width,
            height,
            frame_rates: frame_rates.to_vec(),
        }
    }

    /// Highest supported frame rate.
    pub fn max_frame_rate(&self) -> u32 {
        *self.frame_rates.last().unwrap_or(&30)
    }

    fn long_edge(&self) -> u32 {
        self.width.max(self.height)
    }

    fn short_edge(&self) -> u32 {
        self.width.min(self.height)
    }
}

/// Account entitlement tier gating the resolution/frame-rate menu.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Tier {
    Standard,
    Premium,
    Elite,
}

impl Tier {
    /// The modes this tier unlocks, ascending by resolution.
    pub fn modes(&self) -> Vec<ResolutionMode> {
        let mut modes = vec![
            ResolutionMode::new("sd", 854, 480, &[15, 24, 30]),
            ResolutionMode::new("hd", 1280, 720, &[15, 24, 30]),
        ];
        if matches!(self, Tier::Premium | Tier::Elite) {
            modes.push(ResolutionMode::new("fhd", 1920, 1080, &[24, 30, 60]));
        }
        if matches!(self, Tier::Elite) {
            modes.push(ResolutionMode::new("qhd", 2560, 1440, &[30, 60]));
            modes.push(ResolutionMode::new("uhd", 3840, 2160, &[30, 60]));
        }
        modes
    }
}

/// Picks the capture mode for a session.
///
/// Rule: the highest mode of the tier whose long/short edges are within 2×
/// the device's long/short edges (no absurd upscaling), then scaled down –
/// aspect preserved – if it still exceeds the device's native resolution,
/// and finally clamped to the sane minimum capture size.
pub fn select_mode(tier: Tier, device_width: u32, device_height: u32) -> ResolutionMode {
    let device_long = device_width.max(device_height).max(1);
    let device_short = device_width.min(device_height).max(1);

    let modes = tier.modes();
    let chosen = modes
        .iter()
        .rev()
        .find(|m| m.long_edge() <= device_long * 2 && m.short_edge() <= device_short * 2)
        .unwrap_or(&modes[0])
        .clone();

    let fitted = fit_to_device(chosen, device_long, device_short);
    debug!(
        mode = fitted.name,
        width = fitted.width,
        height = fitted.height,
        "capture mode selected"
    );
    fitted
}

/// Scales a mode down to the device's native edges if it exceeds them,
/// clamped to the minimum capture size.
fn fit_to_device(mode: ResolutionMode, device_long: u32, device_short: u32) -> ResolutionMode {
    if mode.long_edge() <= device_long && mode.short_edge() <= device_short {
        return mode;
    }

    let scale = (device_long as f64 / mode.long_edge() as f64)
        .min(device_short as f64 / mode.short_edge() as f64);
    let width = ((mode.width as f64 * scale) as u32).max(MIN_CAPTURE_WIDTH);
    let height = ((mode.height as f64 * scale) as u32).max(MIN_CAPTURE_HEIGHT);

    ResolutionMode {
        name: mode.name,
        width,
        height,
        frame_rates: mode.frame_rates,
    }
}

// ── Tests ─────────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_tier_menus_are_cumulative() {
        assert_eq!(Tier::Standard.modes().len(), 2);
        assert_eq!(Tier::Premium.modes().len(), 3);
        assert_eq!(Tier::Elite.modes().len(), 5);
    }

    #[test]
    fn test_select_mode_picks_highest_within_double_device_edges() {
        // 1920×1080 device, Elite tier: UHD (3840) is exactly 2× the long
        // edge and QHD fits too – UHD wins as the highest eligible, then is
        // scaled down to the native screen.
        let mode = select_mode(Tier::Elite, 1920, 1080);
        assert_eq!(mode.name, "uhd");
        assert_eq!(mode.width, 1920);
        assert_eq!(mode.height, 1080);
    }

    #[test]
    fn test_select_mode_never_exceeds_tier_ceiling() {
        // A 5K display on the Standard tier still caps at HD.
        let mode = select_mode(Tier::Standard, 5120, 2880);
        assert_eq!(mode.name, "hd");
        assert_eq!(mode.width, 1280);
    }

    #[test]
    fn test_select_mode_scales_down_to_native_resolution() {
        // 1366×768 laptop, Premium tier: FHD (1920×1080) is within 2× but
        // exceeds native, so it scales down preserving aspect.
        let mode = select_mode(Tier::Premium, 1366, 768);
        assert!(mode.width <= 1366);
        assert!(mode.height <= 768);
        // Aspect stays 16:9 within integer rounding.
        let aspect = mode.width as f64 / mode.height as f64;
        assert!((aspect - 16.0 / 9.0).abs() < 0.02, "aspect = {aspect}");
    }

    #[test]
    fn test_select_mode_clamps_to_minimum_capture() {
        // A tiny embedded panel cannot push the capture below 720×480.
        let mode = select_mode(Tier::Standard, 320, 240);
        assert!(mode.width >= MIN_CAPTURE_WIDTH);
        assert!(mode.height >= MIN_CAPTURE_HEIGHT);
    }

    #[test]
    fn test_selected_mode_keeps_frame_rate_menu() {
        let mode = select_mode(Tier::Premium, 1366, 768);
        // Scaling must not touch the frame-rate list of the chosen mode.
        assert_eq!(mode.frame_rates, vec![24, 30, 60]);
        assert_eq!(mode.max_frame_rate(), 60);
    }

    #[test]
    fn test_portrait_device_is_handled_via_edges() {
        // A portrait 1080×1920 phone selects by long/short edge, not by
        // width/height directly.
        let mode = select_mode(Tier::Premium, 1080, 1920);
        assert_eq!(mode.name, "fhd");
    }
}
