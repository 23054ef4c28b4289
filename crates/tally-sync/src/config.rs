//! # Sync Configuration
//!
//! Configuration management for the offline sync engine.
//!
//! ## Configuration Sources
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                    Configuration Priority                               │
//! │                                                                         │
//! │  1. Environment Variables (highest priority)                           │
//! │     TALLY_API_URL=https://pos.example.com                              │
//! │     TALLY_MAX_RETRIES=5                                                │
//! │                                                                         │
//! │  2. TOML Config File                                                   │
//! │     ~/.config/tally-pos/sync.toml (Linux)                              │
//! │     ~/Library/Application Support/com.tally.pos/sync.toml (macOS)      │
//! │                                                                         │
//! │  3. Default Values (lowest priority)                                   │
//! │     3 retries, 5 minute timer, 300 ms debounce                         │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! ## Configuration File Format
//! ```toml
//! # sync.toml
//! [store]
//! path = "/var/lib/tally/tally.db"
//!
//! [remote]
//! base_url = "https://pos.example.com"
//! api_token = "secret"
//! request_timeout_secs = 15
//!
//! [sync]
//! max_retries = 3
//! interval_secs = 300
//!
//! [connectivity]
//! debounce_ms = 300
//! probe_interval_secs = 30
//! health_path = "/api/health"
//! probe_timeout_secs = 5
//! initial_backoff_ms = 1000
//! max_backoff_secs = 60
//! ```

use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::time::Duration;
use tracing::{debug, info, warn};

use crate::connectivity::{HttpHealthProbe, ProbeSettings};
use crate::error::{SyncError, SyncResult};
use crate::manager::SyncPolicy;
use crate::remote::HttpRemoteApi;
use tally_core::{DEFAULT_CONNECTIVITY_DEBOUNCE, DEFAULT_MAX_RETRIES, DEFAULT_SYNC_INTERVAL};

// =============================================================================
// Store Settings
// =============================================================================

/// Where the durable local store lives.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StoreSettings {
    /// SQLite database file. Defaults to the platform data directory.
    #[serde(default = "default_store_path")]
    pub path: PathBuf,
}

fn default_store_path() -> PathBuf {
    directories::ProjectDirs::from("com", "tally", "pos")
        .map(|dirs| dirs.data_dir().join("tally.db"))
        .unwrap_or_else(|| PathBuf::from("tally.db"))
}

impl Default for StoreSettings {
    fn default() -> Self {
        StoreSettings {
            path: default_store_path(),
        }
    }
}

// =============================================================================
// Remote Settings
// =============================================================================

/// The remote POS API.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RemoteSettings {
    /// Base URL, e.g. `https://pos.example.com`.
    #[serde(default = "default_base_url")]
    pub base_url: String,

    /// Bearer token sent with every request, if any.
    #[serde(default)]
    pub api_token: Option<String>,

    /// Per-request timeout (seconds).
    #[serde(default = "default_request_timeout")]
    pub request_timeout_secs: u64,
}

fn default_base_url() -> String {
    "http://localhost:3000".to_string()
}

fn default_request_timeout() -> u64 {
    15
}

impl Default for RemoteSettings {
    fn default() -> Self {
        RemoteSettings {
            base_url: default_base_url(),
            api_token: None,
            request_timeout_secs: default_request_timeout(),
        }
    }
}

// =============================================================================
// Sync Settings
// =============================================================================

/// Replay behavior.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SyncSettings {
    /// Failed replays allowed before an item is dead-lettered.
    #[serde(default = "default_max_retries")]
    pub max_retries: u32,

    /// Period of the background sync timer (seconds).
    #[serde(default = "default_interval")]
    pub interval_secs: u64,
}

fn default_max_retries() -> u32 {
    DEFAULT_MAX_RETRIES
}

fn default_interval() -> u64 {
    DEFAULT_SYNC_INTERVAL.as_secs()
}

impl Default for SyncSettings {
    fn default() -> Self {
        SyncSettings {
            max_retries: default_max_retries(),
            interval_secs: default_interval(),
        }
    }
}

// =============================================================================
// Connectivity Settings
// =============================================================================

/// Online/offline detection.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ConnectivitySettings {
    /// Window over which flapping signals collapse (milliseconds).
    #[serde(default = "default_debounce")]
    pub debounce_ms: u64,

    /// Health probe period while online (seconds).
    #[serde(default = "default_probe_interval")]
    pub probe_interval_secs: u64,

    /// Path of the health endpoint, relative to the API base URL.
    #[serde(default = "default_health_path")]
    pub health_path: String,

    /// Health probe timeout (seconds).
    #[serde(default = "default_probe_timeout")]
    pub probe_timeout_secs: u64,

    /// First re-probe delay after going offline (milliseconds).
    #[serde(default = "default_initial_backoff")]
    pub initial_backoff_ms: u64,

    /// Longest re-probe delay while offline (seconds).
    #[serde(default = "default_max_backoff")]
    pub max_backoff_secs: u64,
}

fn default_debounce() -> u64 {
    DEFAULT_CONNECTIVITY_DEBOUNCE.as_millis() as u64
}
fn default_probe_interval() -> u64 {
    30
}
fn default_health_path() -> String {
    "/api/health".to_string()
}
fn default_probe_timeout() -> u64 {
    5
}
fn default_initial_backoff() -> u64 {
    1000
}
fn default_max_backoff() -> u64 {
    60
}

impl Default for ConnectivitySettings {
    fn default() -> Self {
        ConnectivitySettings {
            debounce_ms: default_debounce(),
            probe_interval_secs: default_probe_interval(),
            health_path: default_health_path(),
            probe_timeout_secs: default_probe_timeout(),
            initial_backoff_ms: default_initial_backoff(),
            max_backoff_secs: default_max_backoff(),
        }
    }
}

// =============================================================================
// Main Sync Configuration
// =============================================================================

/// Complete sync engine configuration.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct SyncConfig {
    #[serde(default)]
    pub store: StoreSettings,

    #[serde(default)]
    pub remote: RemoteSettings,

    #[serde(default)]
    pub sync: SyncSettings,

    #[serde(default)]
    pub connectivity: ConnectivitySettings,
}

impl SyncConfig {
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
            warn!(error = %e, "Failed to load sync config, using defaults");
            Self::default()
        })
    }

    /// Saves configuration to file.
    pub fn save(&self, config_path: Option<PathBuf>) -> SyncResult<()> {
        let path = config_path
            .or_else(Self::default_config_path)
            .ok_or_else(|| SyncError::ConfigSaveFailed("No config path available".into()))?;

        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent).map_err(|e| SyncError::ConfigSaveFailed(e.to_string()))?;
        }

        let contents = toml::to_string_pretty(self)?;
        std::fs::write(&path, contents).map_err(|e| SyncError::ConfigSaveFailed(e.to_string()))?;

        info!(?path, "Sync config saved");
        Ok(())
    }

    /// Validates the configuration.
    pub fn validate(&self) -> SyncResult<()> {
        let url = url::Url::parse(&self.remote.base_url)?;
        if url.scheme() != "http" && url.scheme() != "https" {
            return Err(SyncError::InvalidUrl(format!(
                "API URL must start with http:// or https://, got: {}",
                self.remote.base_url
            )));
        }

        if !self.connectivity.health_path.starts_with('/') {
            return Err(SyncError::InvalidConfig(
                "health_path must start with '/'".into(),
            ));
        }

        if self.sync.max_retries == 0 {
            return Err(SyncError::InvalidConfig(
                "max_retries must be greater than 0".into(),
            ));
        }

        let zero = [
            ("interval_secs", self.sync.interval_secs),
            ("request_timeout_secs", self.remote.request_timeout_secs),
            ("probe_interval_secs", self.connectivity.probe_interval_secs),
            ("probe_timeout_secs", self.connectivity.probe_timeout_secs),
            ("initial_backoff_ms", self.connectivity.initial_backoff_ms),
            ("max_backoff_secs", self.connectivity.max_backoff_secs),
        ]
        .into_iter()
        .find(|(_, value)| *value == 0);

        if let Some((name, _)) = zero {
            return Err(SyncError::InvalidConfig(format!(
                "{} must be greater than 0",
                name
            )));
        }

        Ok(())
    }

    /// Applies environment variable overrides.
    fn apply_env_overrides(&mut self) {
        if let Ok(path) = std::env::var("TALLY_STORE_PATH") {
            debug!(path = %path, "Overriding store path from environment");
            self.store.path = PathBuf::from(path);
        }

        if let Ok(url) = std::env::var("TALLY_API_URL") {
            debug!(url = %url, "Overriding API URL from environment");
            self.remote.base_url = url;
        }

        if let Ok(token) = std::env::var("TALLY_API_TOKEN") {
            self.remote.api_token = Some(token);
        }

        if let Ok(retries) = std::env::var("TALLY_MAX_RETRIES") {
            match retries.parse::<u32>() {
                Ok(r) => self.sync.max_retries = r,
                Err(_) => warn!(value = %retries, "Ignoring invalid TALLY_MAX_RETRIES"),
            }
        }

        if let Ok(secs) = std::env::var("TALLY_SYNC_INTERVAL_SECS") {
            match secs.parse::<u64>() {
                Ok(s) => self.sync.interval_secs = s,
                Err(_) => warn!(value = %secs, "Ignoring invalid TALLY_SYNC_INTERVAL_SECS"),
            }
        }
    }

    /// Returns the default config file path.
    fn default_config_path() -> Option<PathBuf> {
        directories::ProjectDirs::from("com", "tally", "pos")
            .map(|dirs| dirs.config_dir().join("sync.toml"))
    }

    // =========================================================================
    // Convenience Methods
    // =========================================================================

    pub fn policy(&self) -> SyncPolicy {
        SyncPolicy {
            max_retries: self.sync.max_retries,
        }
    }

    pub fn sync_interval(&self) -> Duration {
        Duration::from_secs(self.sync.interval_secs)
    }

    pub fn store_config(&self) -> tally_db::StoreConfig {
        tally_db::StoreConfig::new(&self.store.path)
    }

    pub fn probe_settings(&self) -> ProbeSettings {
        let c = &self.connectivity;
        ProbeSettings {
            debounce: Duration::from_millis(c.debounce_ms),
            interval: Duration::from_secs(c.probe_interval_secs),
            initial_backoff: Duration::from_millis(c.initial_backoff_ms),
            max_backoff: Duration::from_secs(c.max_backoff_secs),
        }
    }

    /// Builds the HTTP client for the remote API.
    pub fn remote_api(&self) -> SyncResult<HttpRemoteApi> {
        HttpRemoteApi::new(
            &self.remote.base_url,
            self.remote.api_token.clone(),
            Duration::from_secs(self.remote.request_timeout_secs),
        )
    }

    /// Builds the health probe for the remote API.
    pub fn health_probe(&self) -> SyncResult<HttpHealthProbe> {
        HttpHealthProbe::new(
            &self.remote.base_url,
            &self.connectivity.health_path,
            Duration::from_secs(self.connectivity.probe_timeout_secs),
        )
    }
}
