//! # Sync Configuration
//!
//! Configuration management for the sync engine.
//!
//! ## Configuration Sources
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                    Configuration Priority                               │
//! │                                                                         │
//! │  1. Environment Variables (highest priority)                           │
//! │     SAPOS_SYNC_MODE=manual                                             │
//! │     SAPOS_REMOTE_URL=https://pos.example.co.za                         │
//! │                                                                         │
//! │  2. TOML Config File                                                   │
//! │     ~/.config/sapos/sync.toml (Linux)                                  │
//! │     ~/Library/Application Support/za.sapos.pos/sync.toml (macOS)       │
//! │                                                                         │
//! │  3. Default Values (lowest priority)                                   │
//! │     SyncMode::Auto, 30s interval, newer_wins                           │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! The device id is NOT configured here. It is created once by the
//! sequencer in the database and never changes.
//!
//! ## Configuration File Format
//! ```toml
//! # sync.toml
//! [device]
//! name = "Till 1"
//!
//! [remote]
//! url = "https://pos.example.co.za"
//! api_key = "..."
//! request_timeout_secs = 30
//!
//! [sync]
//! mode = "auto"                   # auto | manual | offline
//! interval_secs = 30
//! pull_when_idle = true
//! item_merge_policy = "newer_wins" # newer_wins | remote_wins
//! ```

use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::time::Duration;
use tracing::{debug, info, warn};
use url::Url;

use crate::error::{SyncError, SyncResult};

// =============================================================================
// Sync Mode
// =============================================================================

/// Which triggers may start a sync cycle.
///
/// ```text
///  mode      connectivity   timer   manual   status reported
///  ───────   ────────────   ─────   ──────   ───────────────
///  auto      cycle          cycle   cycle    yes
///  manual    -              -       cycle    yes
///  offline   -              -       -        yes
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SyncMode {
    #[default]
    Auto,
    Manual,
    Offline,
}

impl SyncMode {
    /// Returns true if connectivity and timer triggers start cycles.
    pub fn is_automatic(&self) -> bool {
        matches!(self, SyncMode::Auto)
    }

    /// Returns true if sync is enabled at all.
    pub fn is_sync_enabled(&self) -> bool {
        !matches!(self, SyncMode::Offline)
    }
}

impl std::fmt::Display for SyncMode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            SyncMode::Auto => write!(f, "auto"),
            SyncMode::Manual => write!(f, "manual"),
            SyncMode::Offline => write!(f, "offline"),
        }
    }
}

impl std::str::FromStr for SyncMode {
    type Err = SyncError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "auto" => Ok(SyncMode::Auto),
            "manual" => Ok(SyncMode::Manual),
            "offline" | "disabled" => Ok(SyncMode::Offline),
            other => Err(SyncError::InvalidConfig(format!(
                "Unknown sync mode: '{}'. Valid options: auto, manual, offline",
                other
            ))),
        }
    }
}

// =============================================================================
// Item Merge Policy
// =============================================================================

/// How a pulled item is applied over the local copy.
///
/// ```text
///  local.updated_at   remote.updated_at    remote_wins    newer_wins
///  ────────────────   ─────────────────    ───────────    ──────────
///  10:00              10:05                overwrite      overwrite
///  10:05              10:05                overwrite      overwrite (tie)
///  10:07              10:05                overwrite      keep local
/// ```
///
/// Sales and stock movements never use this: they are insert-if-absent.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ItemMergePolicy {
    /// Skip the incoming item when the local copy is strictly newer.
    #[default]
    NewerWins,

    /// Overwrite unconditionally.
    RemoteWins,
}

impl std::fmt::Display for ItemMergePolicy {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ItemMergePolicy::NewerWins => write!(f, "newer_wins"),
            ItemMergePolicy::RemoteWins => write!(f, "remote_wins"),
        }
    }
}

impl std::str::FromStr for ItemMergePolicy {
    type Err = SyncError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().replace('-', "_").as_str() {
            "newer_wins" => Ok(ItemMergePolicy::NewerWins),
            "remote_wins" => Ok(ItemMergePolicy::RemoteWins),
            other => Err(SyncError::InvalidConfig(format!(
                "Unknown item merge policy: '{}'. Valid options: newer_wins, remote_wins",
                other
            ))),
        }
    }
}

// =============================================================================
// Device Configuration
// =============================================================================

/// Configuration for this device.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DeviceConfig {
    /// Human-readable device name (e.g., "Till 1", "Back Office").
    #[serde(default = "default_device_name")]
    pub name: String,
}

fn default_device_name() -> String {
    "POS Till".to_string()
}

impl Default for DeviceConfig {
    fn default() -> Self {
        DeviceConfig {
            name: default_device_name(),
        }
    }
}

// =============================================================================
// Remote Configuration
// =============================================================================

/// Where the remote service lives and how to talk to it.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RemoteConfig {
    /// Base URL of the remote (http or https).
    #[serde(default)]
    pub url: Option<String>,

    /// Sent as `apikey` and as the bearer token.
    #[serde(default)]
    pub api_key: Option<String>,

    /// Upper bound on every remote call (seconds).
    #[serde(default = "default_request_timeout")]
    pub request_timeout_secs: u64,
}

fn default_request_timeout() -> u64 {
    30
}

impl Default for RemoteConfig {
    fn default() -> Self {
        RemoteConfig {
            url: None,
            api_key: None,
            request_timeout_secs: default_request_timeout(),
        }
    }
}

// =============================================================================
// Sync Settings
// =============================================================================

/// Sync behavior settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SyncSettings {
    /// Which triggers start cycles.
    #[serde(default)]
    pub mode: SyncMode,

    /// Periodic timer interval while online (seconds).
    #[serde(default = "default_interval")]
    pub interval_secs: u64,

    /// Pull remote changes even when there is nothing to push.
    #[serde(default = "default_true")]
    pub pull_when_idle: bool,

    /// How pulled items are applied.
    #[serde(default)]
    pub item_merge_policy: ItemMergePolicy,
}

fn default_interval() -> u64 {
    30
}

fn default_true() -> bool {
    true
}

impl Default for SyncSettings {
    fn default() -> Self {
        SyncSettings {
            mode: SyncMode::default(),
            interval_secs: default_interval(),
            pull_when_idle: true,
            item_merge_policy: ItemMergePolicy::default(),
        }
    }
}

// =============================================================================
// Main Sync Configuration
// =============================================================================

/// Complete sync configuration.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct SyncConfig {
    /// Device-specific configuration.
    #[serde(default)]
    pub device: DeviceConfig,

    /// Remote service settings.
    #[serde(default)]
    pub remote: RemoteConfig,

    /// Sync behavior settings.
    #[serde(default)]
    pub sync: SyncSettings,
}

impl SyncConfig {
    /// Creates a new config with defaults.
    pub fn new() -> Self {
        Self::default()
    }

    /// Loads configuration from file, environment, and defaults.
    ///
    /// ## Load Order (later overrides earlier)
    /// 1. Default values
    /// 2. Config file (sync.toml)
    /// 3. Environment variables
    pub fn load(config_path: Option<PathBuf>) -> SyncResult<Self> {
        let mut config = Self::default();

        if let Some(path) = config_path.or_else(Self::default_config_path) {
            if path.exists() {
                info!(?path, "Loading sync config from file");
                let contents = std::fs::read_to_string(&path)?;
                config = toml::from_str(&contents)?;
            } else {
                debug!(?path, "Config file not found, using defaults");
            }
        }

        config.apply_env_overrides();
        config.validate()?;

        Ok(config)
    }

    /// Loads config or returns default if load fails.
    pub fn load_or_default(config_path: Option<PathBuf>) -> Self {
        Self::load(config_path).unwrap_or_else(|e| {
            warn!("Failed to load sync config: {}. Using defaults.", e);
            Self::default()
        })
    }

    /// Saves configuration to file.
    pub fn save(&self, config_path: Option<PathBuf>) -> SyncResult<()> {
        let path = config_path
            .or_else(Self::default_config_path)
            .ok_or_else(|| SyncError::ConfigSaveFailed("No config path available".into()))?;

        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }

        let contents = toml::to_string_pretty(self)?;
        std::fs::write(&path, contents)?;

        info!(?path, "Sync config saved");
        Ok(())
    }

    /// Validates the configuration.
    pub fn validate(&self) -> SyncResult<()> {
        if self.sync.interval_secs == 0 {
            return Err(SyncError::InvalidConfig(
                "interval_secs must be greater than 0".into(),
            ));
        }

        if self.remote.request_timeout_secs == 0 {
            return Err(SyncError::InvalidConfig(
                "request_timeout_secs must be greater than 0".into(),
            ));
        }

        if let Some(ref raw) = self.remote.url {
            let url = Url::parse(raw)?;
            if !matches!(url.scheme(), "http" | "https") {
                return Err(SyncError::InvalidUrl(format!(
                    "Remote URL must start with http:// or https://, got: {}",
                    raw
                )));
            }
        }

        Ok(())
    }

    /// Applies environment variable overrides.
    fn apply_env_overrides(&mut self) {
        self.apply_overrides_from(|key| std::env::var(key).ok());
    }

    /// Applies overrides from any key lookup. Unparseable values are logged
    /// and ignored.
    fn apply_overrides_from(&mut self, lookup: impl Fn(&str) -> Option<String>) {
        if let Some(name) = lookup("SAPOS_DEVICE_NAME") {
            self.device.name = name;
        }

        if let Some(mode) = lookup("SAPOS_SYNC_MODE") {
            match mode.parse() {
                Ok(parsed) => {
                    debug!(mode = %mode, "Overriding sync mode from environment");
                    self.sync.mode = parsed;
                }
                Err(_) => warn!(mode = %mode, "Unknown sync mode in environment"),
            }
        }

        if let Some(url) = lookup("SAPOS_REMOTE_URL") {
            debug!(url = %url, "Overriding remote URL from environment");
            self.remote.url = Some(url);
        }

        if let Some(key) = lookup("SAPOS_API_KEY") {
            self.remote.api_key = Some(key);
        }

        if let Some(secs) = lookup("SAPOS_SYNC_INTERVAL_SECS") {
            match secs.parse::<u64>() {
                Ok(s) => self.sync.interval_secs = s,
                Err(_) => warn!(value = %secs, "Invalid SAPOS_SYNC_INTERVAL_SECS"),
            }
        }

        if let Some(flag) = lookup("SAPOS_PULL_WHEN_IDLE") {
            match flag.to_lowercase().as_str() {
                "1" | "true" | "yes" => self.sync.pull_when_idle = true,
                "0" | "false" | "no" => self.sync.pull_when_idle = false,
                _ => warn!(value = %flag, "Invalid SAPOS_PULL_WHEN_IDLE"),
            }
        }

        if let Some(policy) = lookup("SAPOS_ITEM_MERGE_POLICY") {
            match policy.parse() {
                Ok(parsed) => self.sync.item_merge_policy = parsed,
                Err(_) => warn!(policy = %policy, "Unknown item merge policy in environment"),
            }
        }
    }

    /// Returns the default config file path.
    fn default_config_path() -> Option<PathBuf> {
        directories::ProjectDirs::from("za", "sapos", "pos").map(|dirs| {
            let config_dir = dirs.config_dir();
            config_dir.join("sync.toml")
        })
    }

    // =========================================================================
    // Convenience Methods
    // =========================================================================

    /// Returns the sync mode.
    pub fn mode(&self) -> SyncMode {
        self.sync.mode
    }

    /// Returns the periodic timer interval.
    pub fn interval(&self) -> Duration {
        Duration::from_secs(self.sync.interval_secs)
    }

    /// Returns the per-call timeout for remote requests.
    pub fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.remote.request_timeout_secs)
    }

    /// Returns the remote URL if configured.
    pub fn remote_url(&self) -> Option<&str> {
        self.remote.url.as_deref()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    #[test]
    fn test_sync_mode_parsing() {
        assert_eq!("auto".parse::<SyncMode>().unwrap(), SyncMode::Auto);
        assert_eq!("MANUAL".parse::<SyncMode>().unwrap(), SyncMode::Manual);
        assert_eq!("disabled".parse::<SyncMode>().unwrap(), SyncMode::Offline);
        assert!("primary".parse::<SyncMode>().is_err());
    }

    #[test]
    fn test_merge_policy_parsing() {
        assert_eq!(
            "remote-wins".parse::<ItemMergePolicy>().unwrap(),
            ItemMergePolicy::RemoteWins
        );
        assert_eq!(
            "newer_wins".parse::<ItemMergePolicy>().unwrap(),
            ItemMergePolicy::NewerWins
        );
        assert!("last_wins".parse::<ItemMergePolicy>().is_err());
    }

    #[test]
    fn test_default_config() {
        let config = SyncConfig::default();
        assert_eq!(config.mode(), SyncMode::Auto);
        assert_eq!(config.interval(), Duration::from_secs(30));
        assert!(config.sync.pull_when_idle);
        assert_eq!(config.sync.item_merge_policy, ItemMergePolicy::NewerWins);
        assert!(config.remote_url().is_none());
    }

    #[test]
    fn test_config_validation() {
        let mut config = SyncConfig::default();
        assert!(config.validate().is_ok());

        config.sync.interval_secs = 0;
        assert!(config.validate().is_err());
        config.sync.interval_secs = 30;

        config.remote.request_timeout_secs = 0;
        assert!(config.validate().is_err());
        config.remote.request_timeout_secs = 10;

        config.remote.url = Some("ws://localhost:8080".to_string());
        assert!(matches!(config.validate(), Err(SyncError::InvalidUrl(_))));

        config.remote.url = Some("not a url".to_string());
        assert!(matches!(config.validate(), Err(SyncError::InvalidUrl(_))));

        config.remote.url = Some("https://pos.example.co.za".to_string());
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_overrides() {
        let env: HashMap<&str, &str> = [
            ("SAPOS_SYNC_MODE", "manual"),
            ("SAPOS_REMOTE_URL", "http://10.0.0.5:54321"),
            ("SAPOS_API_KEY", "anon-key"),
            ("SAPOS_SYNC_INTERVAL_SECS", "45"),
            ("SAPOS_PULL_WHEN_IDLE", "false"),
            ("SAPOS_ITEM_MERGE_POLICY", "remote_wins"),
            ("SAPOS_DEVICE_NAME", "Till 2"),
        ]
        .into_iter()
        .collect();

        let mut config = SyncConfig::default();
        config.apply_overrides_from(|key| env.get(key).map(|v| v.to_string()));

        assert_eq!(config.mode(), SyncMode::Manual);
        assert_eq!(config.remote_url(), Some("http://10.0.0.5:54321"));
        assert_eq!(config.remote.api_key.as_deref(), Some("anon-key"));
        assert_eq!(config.sync.interval_secs, 45);
        assert!(!config.sync.pull_when_idle);
        assert_eq!(config.sync.item_merge_policy, ItemMergePolicy::RemoteWins);
        assert_eq!(config.device.name, "Till 2");
    }

    #[test]
    fn test_bad_overrides_are_ignored() {
        let mut config = SyncConfig::default();
        config.apply_overrides_from(|key| match key {
            "SAPOS_SYNC_MODE" => Some("hub".to_string()),
            "SAPOS_SYNC_INTERVAL_SECS" => Some("soon".to_string()),
            _ => None,
        });

        assert_eq!(config.mode(), SyncMode::Auto);
        assert_eq!(config.sync.interval_secs, 30);
    }

    #[test]
    fn test_toml_round_trip_keeps_sections() {
        let config = SyncConfig::default();
        let toml_str = toml::to_string_pretty(&config).unwrap();
        assert!(toml_str.contains("[device]"));
        assert!(toml_str.contains("[remote]"));
        assert!(toml_str.contains("[sync]"));

        let parsed: SyncConfig = toml::from_str(
            r#"
            [sync]
            mode = "offline"
            item_merge_policy = "remote_wins"
            "#,
        )
        .unwrap();
        assert_eq!(parsed.mode(), SyncMode::Offline);
        assert_eq!(parsed.sync.item_merge_policy, ItemMergePolicy::RemoteWins);
        assert_eq!(parsed.sync.interval_secs, 30);
        assert_eq!(parsed.remote.request_timeout_secs, 30);
    }
}
