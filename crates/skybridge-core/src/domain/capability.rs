//! Platform capability resolution.
//!
//! Maps a raw peer identifier or model name to a platform classification and
//! the set of transports that platform is known to support.  Resolution is a
//! case-insensitive substring match against a small fixed vocabulary; there
//! is no network or disk I/O anywhere in this module.
//!
//! Exclusion runs *before* inclusion: a name matching an excluded family
//! never enters a discovery result set, even if it also matches a platform
//! keyword (an "apple watch" matches both `watch` and nothing else).

use std::collections::HashSet;

use crate::domain::peer::TransportHint;

/// Platform classification for a discovered peer.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Platform {
    Ios,
    IpadOs,
    MacOs,
    Windows,
    Linux,
    ChromeOs,
    Android,
    /// No vocabulary match; negotiation falls back to the universal bridge.
    Unknown,
}

/// Device families that cannot host or render a mirroring session.
/// Checked before any platform keyword.
const EXCLUDED_FAMILIES: &[&str] = &["watch", "wear", "tizen", "auto"];

/// Resolves a raw peer name or model string to a [`Platform`].
///
/// Matching is case-insensitive substring containment, first match wins in
/// the order below.  `ipad` is checked before `ios`/`iphone` so an
/// "iPad Pro (iOS 17)" classifies as iPadOS.
pub fn resolve_platform(name_or_model: &str) -> Platform {
    let lower = name_or_model.to_lowercase();

    if lower.contains("ipad") {
        Platform::IpadOs
    } else if lower.contains("iphone") || lower.contains("ios") {
        Platform::Ios
    } else if lower.contains("mac") {
        Platform::MacOs
    } else if lower.contains("windows") {
        Platform::Windows
    } else if lower.contains("chromeos") || lower.contains("chromebook") {
        Platform::ChromeOs
    } else if lower.contains("linux") {
        Platform::Linux
    } else if lower.contains("android") {
        Platform::Android
    } else {
        Platform::Unknown
    }
}

/// Returns `true` when the name belongs to an incompatible device family.
///
/// Must be consulted before [`resolve_platform`] when building discovery
/// result sets.
pub fn should_exclude(name_or_model: &str) -> bool {
    let lower = name_or_model.to_lowercase();
    EXCLUDED_FAMILIES.iter().any(|family| lower.contains(family))
}

/// The transports a platform is known to support.
///
/// `Unknown` maps to the universal bridge so negotiation always has at least
/// one option for a peer that survived exclusion.
pub fn transports_for(platform: Platform) -> HashSet<TransportHint> {
    let hints: &[TransportHint] = match platform {
        Platform::Ios | Platform::IpadOs => &[
            TransportHint::AirPlay,
            TransportHint::Bluetooth,
            TransportHint::UltraWideband,
        ],
        Platform::MacOs => &[
            TransportHint::AirPlay,
            TransportHint::Lan,
            TransportHint::Bluetooth,
            TransportHint::UltraWideband,
        ],
        Platform::Windows => &[
            TransportHint::WifiDirect,
            TransportHint::Lan,
            TransportHint::Bluetooth,
        ],
        Platform::Linux => &[
            TransportHint::WifiDirect,
            TransportHint::Lan,
            TransportHint::Bluetooth,
        ],
        Platform::ChromeOs => &[TransportHint::Lan, TransportHint::Cloud],
        Platform::Android => &[
            TransportHint::WifiDirect,
            TransportHint::Bluetooth,
            TransportHint::Nfc,
            TransportHint::Lan,
        ],
        Platform::Unknown => &[TransportHint::UniversalBridge],
    };
    hints.iter().copied().collect()
}

/// One-line compatibility remark for the presentation layer.
pub fn compatibility_note(platform: Platform) -> String {
    match platform {
        Platform::Unknown => {
            "unknown platform – reachable through the universal bridge only".to_string()
        }
        other => format!("{other:?} peer – native transports available"),
    }
}

// ── Tests ─────────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_resolve_platform_matches_vocabulary_case_insensitively() {
        assert_eq!(resolve_platform("Office-WINDOWS-Desktop"), Platform::Windows);
        assert_eq!(resolve_platform("MacBook Pro"), Platform::MacOs);
        assert_eq!(resolve_platform("pixel-8 (Android 15)"), Platform::Android);
        assert_eq!(resolve_platform("debian linux workstation"), Platform::Linux);
        assert_eq!(resolve_platform("HP Chromebook"), Platform::ChromeOs);
    }

    #[test]
    fn test_resolve_platform_prefers_ipad_over_ios() {
        // An iPad advertising its OS version must still classify as iPadOS.
        assert_eq!(resolve_platform("iPad Pro (iOS 17)"), Platform::IpadOs);
        assert_eq!(resolve_platform("iPhone 15"), Platform::Ios);
    }

    #[test]
    fn test_resolve_platform_unmatched_name_is_unknown() {
        assert_eq!(resolve_platform("mystery-box-3000"), Platform::Unknown);
        assert_eq!(resolve_platform(""), Platform::Unknown);
    }

    #[test]
    fn test_should_exclude_rejects_incompatible_families() {
        assert!(should_exclude("Apple Watch Ultra"));
        assert!(should_exclude("Galaxy Wear 6"));
        assert!(should_exclude("tizen-fridge"));
        assert!(should_exclude("Android Auto head unit"));
    }

    #[test]
    fn test_should_exclude_accepts_regular_devices() {
        assert!(!should_exclude("MacBook Air"));
        assert!(!should_exclude("windows-laptop"));
        assert!(!should_exclude("pixel-8"));
    }

    #[test]
    fn test_exclusion_wins_over_platform_match() {
        // "Android Auto" matches both the android keyword and the excluded
        // `auto` family; exclusion must be checked first by callers.
        let name = "Android Auto head unit";
        assert!(should_exclude(name));
        // resolve_platform alone would happily classify it:
        assert_eq!(resolve_platform(name), Platform::Android);
    }

    #[test]
    fn test_unknown_platform_gets_universal_bridge_fallback() {
        let hints = transports_for(Platform::Unknown);
        assert_eq!(hints.len(), 1);
        assert!(hints.contains(&TransportHint::UniversalBridge));
    }

    #[test]
    fn test_apple_platforms_carry_airplay_and_lossless_radio() {
        for platform in [Platform::Ios, Platform::IpadOs, Platform::MacOs] {
            let hints = transports_for(platform);
            assert!(hints.contains(&TransportHint::AirPlay), "{platform:?}");
            assert!(hints.contains(&TransportHint::UltraWideband), "{platform:?}");
        }
    }

    #[test]
    fn test_android_carries_nfc_and_wifi_direct() {
        let hints = transports_for(Platform::Android);
        assert!(hints.contains(&TransportHint::Nfc));
        assert!(hints.contains(&TransportHint::WifiDirect));
    }

    #[test]
    fn test_every_platform_has_at_least_one_hint() {
        for platform in [
            Platform::Ios,
            Platform::IpadOs,
            Platform::MacOs,
            Platform::Windows,
            Platform::Linux,
            Platform::ChromeOs,
            Platform::Android,
            Platform::Unknown,
        ] {
            assert!(!transports_for(platform).is_empty(), "{platform:?}");
        }
    }
}
