//! TOML-based configuration persistence for the host application.
//!
//! Reads and writes [`AppConfig`] to the platform-appropriate config file:
//! - Windows:  `%APPDATA%\SkyBridge\config.toml`
//! - Linux:    `~/.config/skybridge/config.toml`
//! - macOS:    `~/Library/Application Support/SkyBridge/config.toml`
//!
//! Fields annotated with `#[serde(default = "some_fn")]` use the return
//! value of `some_fn()` when the field is absent from the TOML file, so the
//! host works on first run and when upgrading from an older config file that
//! is missing newer fields.
//!
//! The port and channel numbers here are conveniences, not protocol
//! requirements: every one of them may be overridden per deployment.

use std::path::PathBuf;

use serde::{Deserialize, Serialize};
use thiserror::Error;

use skybridge_core::Tier;

/// Error type for configuration file operations.
#[derive(Debug, Error)]
pub enum ConfigError {
    /// The platform config directory could not be determined.
    #[error("could not determine platform config directory")]
    NoPlatformConfigDir,

    /// A file system I/O error occurred.
    #[error("I/O error accessing config at {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// The TOML content could not be parsed.
    #[error("failed to parse config TOML: {0}")]
    Parse(#[from] toml::de::Error),

    /// The config could not be serialized to TOML.
    #[error("failed to serialize config: {0}")]
    Serialize(#[from] toml::ser::Error),
}

// ── Config schema types ───────────────────────────────────────────────────────

/// Top-level application configuration stored on disk.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct AppConfig {
    pub host: HostConfig,
    pub network: NetworkConfig,
    pub streaming: StreamingConfig,
}

/// General host behaviour settings.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct HostConfig {
    /// Name advertised to peers during discovery.
    #[serde(default = "default_device_name")]
    pub device_name: String,
    /// `tracing` log level: `"error"`, `"warn"`, `"info"`, `"debug"`, `"trace"`.
    #[serde(default = "default_log_level")]
    pub log_level: String,
    /// Account entitlement tier gating the resolution/frame-rate menu.
    #[serde(default = "default_tier")]
    pub tier: Tier,
}

/// Ports and peripheral channel numbers.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct NetworkConfig {
    /// TCP port the streaming server listens on.
    #[serde(default = "default_stream_port")]
    pub stream_port: u16,
    /// TCP port probed on LAN fallback candidates.
    #[serde(default = "default_lan_probe_port")]
    pub lan_probe_port: u16,
    /// Port of the cloud relay rendezvous.
    #[serde(default = "default_relay_port")]
    pub relay_port: u16,
    /// RFCOMM channel for the Bluetooth peripheral path.
    #[serde(default = "default_bluetooth_channel")]
    pub bluetooth_channel: u16,
    /// Logical channel for the NFC peripheral path.
    #[serde(default = "default_nfc_channel")]
    pub nfc_channel: u16,
    /// Service port for the AirPlay peripheral path.
    #[serde(default = "default_airplay_channel")]
    pub airplay_channel: u16,
}

/// Capture/encode pipeline settings.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct StreamingConfig {
    /// Attempt the hardware encoder on lossless-capable links.
    #[serde(default = "default_true")]
    pub hardware_acceleration: bool,
    /// Open a secondary low-latency datagram channel per session.
    #[serde(default)]
    pub low_latency_channel: bool,
    /// Starting bitrate before the feedback loop takes over, in kbps.
    #[serde(default = "default_initial_bitrate")]
    pub initial_bitrate_kbps: u32,
    /// Physical screen width in pixels.
    #[serde(default = "default_screen_width")]
    pub device_width: u32,
    /// Physical screen height in pixels.
    #[serde(default = "default_screen_height")]
    pub device_height: u32,
}

// ── Default helpers ───────────────────────────────────────────────────────────

fn default_device_name() -> String {
    "skybridge-host".to_string()
}
fn default_log_level() -> String {
    "info".to_string()
}
fn default_tier() -> Tier {
    Tier::Standard
}
fn default_stream_port() -> u16 {
    47800
}
fn default_lan_probe_port() -> u16 {
    47810
}
fn default_relay_port() -> u16 {
    8443
}
fn default_bluetooth_channel() -> u16 {
    3
}
fn default_nfc_channel() -> u16 {
    1
}
fn default_airplay_channel() -> u16 {
    7000
}
fn default_true() -> bool {
    true
}
fn default_initial_bitrate() -> u32 {
    8_000
}
fn default_screen_width() -> u32 {
    1920
}
fn default_screen_height() -> u32 {
    1080
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            host: HostConfig::default(),
            network: NetworkConfig::default(),
            streaming: StreamingConfig::default(),
        }
    }
}

impl Default for HostConfig {
    fn default() -> Self {
        Self {
            device_name: default_device_name(),
            log_level: default_log_level(),
            tier: default_tier(),
        }
    }
}

impl Default for NetworkConfig {
    fn default() -> Self {
        Self {
            stream_port: default_stream_port(),
            lan_probe_port: default_lan_probe_port(),
            relay_port: default_relay_port(),
            bluetooth_channel: default_bluetooth_channel(),
            nfc_channel: default_nfc_channel(),
            airplay_channel: default_airplay_channel(),
        }
    }
}

impl Default for StreamingConfig {
    fn default() -> Self {
        Self {
            hardware_acceleration: default_true(),
            low_latency_channel: false,
            initial_bitrate_kbps: default_initial_bitrate(),
            device_width: default_screen_width(),
            device_height: default_screen_height(),
        }
    }
}

// ── Config repository ─────────────────────────────────────────────────────────

/// Determines the platform-appropriate directory for the config file.
///
/// # Errors
///
/// Returns [`ConfigError::NoPlatformConfigDir`] when the platform config
/// base directory cannot be determined from the environment.
pub fn config_dir() -> Result<PathBuf, ConfigError> {
    platform_config_dir().ok_or(ConfigError::NoPlatformConfigDir)
}

/// Resolves the full path to the config file.
///
/// # Errors
///
/// Returns [`ConfigError::NoPlatformConfigDir`] if the base directory cannot
/// be determined.
pub fn config_file_path() -> Result<PathBuf, ConfigError> {
    Ok(config_dir()?.join("config.toml"))
}

/// Loads [`AppConfig`] from disk, returning `AppConfig::default()` if the
/// file does not yet exist.
///
/// # Errors
///
/// Returns [`ConfigError::Io`] for file-system errors other than "not
/// found", and [`ConfigError::Parse`] if the TOML is malformed.
pub fn load_config() -> Result<AppConfig, ConfigError> {
    let path = config_file_path()?;

    match std::fs::read_to_string(&path) {
        Ok(content) => {
            let cfg: AppConfig = toml::from_str(&content)?;
            Ok(cfg)
        }
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(AppConfig::default()),
        Err(e) => Err(ConfigError::Io { path, source: e }),
    }
}

/// Persists `config` to disk, creating the directory if needed.
///
/// # Errors
///
/// Returns [`ConfigError::Io`] for file-system failures or
/// [`ConfigError::Serialize`] if serialization fails.
pub fn save_config(config: &AppConfig) -> Result<(), ConfigError> {
    let path = config_file_path()?;

    if let Some(dir) = path.parent() {
        std::fs::create_dir_all(dir).map_err(|source| ConfigError::Io {
            path: dir.to_path_buf(),
            source,
        })?;
    }

    let content = toml::to_string_pretty(config)?;
    std::fs::write(&path, content).map_err(|source| ConfigError::Io {
        path: path.clone(),
        source,
    })?;
    Ok(())
}

/// Resolves the platform config base directory.
fn platform_config_dir() -> Option<PathBuf> {
    #[cfg(target_os = "windows")]
    {
        std::env::var_os("APPDATA").map(|p| PathBuf::from(p).join("SkyBridge"))
    }

    #[cfg(target_os = "linux")]
    {
        let base = std::env::var_os("XDG_CONFIG_HOME")
            .map(PathBuf::from)
            .or_else(|| std::env::var_os("HOME").map(|h| PathBuf::from(h).join(".config")))?;
        Some(base.join("skybridge"))
    }

    #[cfg(target_os = "macos")]
    {
        std::env::var_os("HOME").map(|h| {
            PathBuf::from(h)
                .join("Library")
                .join("Application Support")
                .join("SkyBridge")
        })
    }

    #[cfg(not(any(target_os = "windows", target_os = "linux", target_os = "macos")))]
    {
        None
    }
}

// ── Tests ─────────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config_has_expected_ports_and_channels() {
        let cfg = AppConfig::default();
        assert_eq!(cfg.network.stream_port, 47800);
        assert_eq!(cfg.network.lan_probe_port, 47810);
        assert_eq!(cfg.network.relay_port, 8443);
        assert_eq!(cfg.network.bluetooth_channel, 3);
        assert_eq!(cfg.network.nfc_channel, 1);
        assert_eq!(cfg.network.airplay_channel, 7000);
    }

    #[test]
    fn test_default_config_streaming_settings() {
        let cfg = AppConfig::default();
        assert!(cfg.streaming.hardware_acceleration);
        assert!(!cfg.streaming.low_latency_channel);
        assert_eq!(cfg.streaming.initial_bitrate_kbps, 8_000);
        assert_eq!(cfg.host.tier, Tier::Standard);
    }

    #[test]
    fn test_config_round_trips_through_toml() {
        let mut cfg = AppConfig::default();
        cfg.network.stream_port = 9_000;
        cfg.host.tier = Tier::Elite;
        cfg.streaming.low_latency_channel = true;

        let toml_str = toml::to_string_pretty(&cfg).expect("serialize");
        let restored: AppConfig = toml::from_str(&toml_str).expect("deserialize");
        assert_eq!(cfg, restored);
    }

    #[test]
    fn test_minimal_toml_uses_defaults() {
        let toml_str = r#"
[host]
[network]
[streaming]
"#;
        let cfg: AppConfig = toml::from_str(toml_str).expect("deserialize minimal");
        assert_eq!(cfg, AppConfig::default());
    }

    #[test]
    fn test_partial_toml_overrides_only_named_fields() {
        let toml_str = r#"
[host]
tier = "premium"
[network]
stream_port = 50000
[streaming]
"#;
        let cfg: AppConfig = toml::from_str(toml_str).expect("deserialize partial");
        assert_eq!(cfg.network.stream_port, 50_000);
        assert_eq!(cfg.host.tier, Tier::Premium);
        // Unspecified fields keep their defaults.
        assert_eq!(cfg.network.lan_probe_port, 47810);
    }

    #[test]
    fn test_invalid_toml_returns_parse_error() {
        let result: Result<AppConfig, toml::de::Error> = toml::from_str("[[[ not valid");
        assert!(result.is_err());
    }

    #[test]
    fn test_tier_serializes_lowercase() {
        let cfg = AppConfig {
            host: HostConfig {
                tier: Tier::Elite,
                ..HostConfig::default()
            },
            ..AppConfig::default()
        };
        let toml_str = toml::to_string_pretty(&cfg).unwrap();
        assert!(toml_str.contains("tier = \"elite\""), "toml = {toml_str}");
    }
}
