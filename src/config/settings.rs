//! Application settings and configuration management

use serde::{Deserialize, Serialize};
use std::fs;
use std::io;
use std::path::{Path, PathBuf};
use std::time::Duration;
use thiserror::Error;

use crate::display::BackoffPolicy;
use crate::transport::DEFAULT_PORT;

/// Directory name under the platform config and data directories.
pub const APP_DIR_NAME: &str = "nowplaying-sync";

/// Longest timer interval accepted, in seconds.
pub const MAX_INTERVAL_SECS: u64 = 24 * 60 * 60;

/// Application settings
#[derive(Debug, Serialize, Deserialize, Clone, PartialEq)]
#[serde(default)]
pub struct Settings {
    /// Host the controller binds and displays connect to
    pub host: String,
    /// Preferred controller port
    pub port: u16,
    /// Scan upward for a free port when `port` is taken
    pub auto_port: bool,
    /// Controller playlist and volume state
    pub state_path: PathBuf,
    /// Display replica state
    pub display_state_path: PathBuf,
    /// File the controller writes its bound port to
    pub port_file: PathBuf,
    pub metadata_poll_secs: u64,
    pub heartbeat_secs: u64,
    pub snapshot_retry_secs: u64,
    pub reconnect_base_ms: u64,
    pub reconnect_max_ms: u64,
    /// Consecutive failures before a display looks for the controller elsewhere
    pub discovery_after_failures: u32,
    /// Default tracing filter when `RUST_LOG` is unset
    pub log_level: String,
    pub log_json: bool,
}

/// Error types for configuration operations
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("I/O error: {0}")]
    IoError(#[from] io::Error),
    #[error("Parse error: {0}")]
    ParseError(#[from] serde_json::Error),
    #[error("Validation error: {0}")]
    ValidationError(String),
}

fn data_dir() -> PathBuf {
    dirs::data_local_dir()
        .or_else(dirs::home_dir)
        .unwrap_or_else(|| PathBuf::from("."))
        .join(APP_DIR_NAME)
}

impl Default for Settings {
    fn default() -> Self {
        let data = data_dir();
        Settings {
            host: "127.0.0.1".to_string(),
            port: DEFAULT_PORT,
            auto_port: false,
            state_path: data.join("controller.json"),
            display_state_path: data.join("display.json"),
            port_file: data.join("controller.port"),
            metadata_poll_secs: 3,
            heartbeat_secs: 30,
            snapshot_retry_secs: 2,
            reconnect_base_ms: 1000,
            reconnect_max_ms: 30_000,
            discovery_after_failures: 3,
            log_level: "info".to_string(),
            log_json: false,
        }
    }
}

impl Settings {
    /// Load settings from a file. A missing file yields defaults.
    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        if !path.exists() {
            return Ok(Self::default());
        }

        let content = fs::read_to_string(path)?;
        let settings: Settings = serde_json::from_str(&content)?;
        Ok(settings)
    }

    /// Save settings to a file
    pub fn save(&self, path: &Path) -> Result<(), ConfigError> {
        let content = serde_json::to_string_pretty(&self)?;

        // Create parent directories if they don't exist
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent)?;
        }

        fs::write(path, content)?;
        Ok(())
    }

    /// Get the default config file path
    pub fn default_path() -> PathBuf {
        dirs::config_dir()
            .or_else(|| dirs::home_dir().map(|home| home.join(".config")))
            .unwrap_or_else(|| PathBuf::from("."))
            .join(APP_DIR_NAME)
            .join("config.json")
    }

    /// Validate settings
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.host.trim().is_empty() {
            return Err(ConfigError::ValidationError("Host cannot be empty".to_string()));
        }
        if self.port == 0 {
            return Err(ConfigError::ValidationError("Port cannot be 0".to_string()));
        }

        let intervals = [
            ("metadata_poll_secs", self.metadata_poll_secs),
            ("heartbeat_secs", self.heartbeat_secs),
            ("snapshot_retry_secs", self.snapshot_retry_secs),
            ("reconnect_base_ms", self.reconnect_base_ms),
            ("reconnect_max_ms", self.reconnect_max_ms),
        ];
        if let Some((name, _)) = intervals.iter().find(|(_, value)| *value == 0) {
            return Err(ConfigError::ValidationError(format!("{} must be greater than 0", name)));
        }
        let limits = [
            ("metadata_poll_secs", self.metadata_poll_secs, MAX_INTERVAL_SECS),
            ("heartbeat_secs", self.heartbeat_secs, MAX_INTERVAL_SECS),
            ("snapshot_retry_secs", self.snapshot_retry_secs, MAX_INTERVAL_SECS),
            ("reconnect_base_ms", self.reconnect_base_ms, MAX_INTERVAL_SECS * 1000),
            ("reconnect_max_ms", self.reconnect_max_ms, MAX_INTERVAL_SECS * 1000),
        ];
        if let Some((name, _, limit)) = limits.iter().find(|(_, value, limit)| value > limit) {
            return Err(ConfigError::ValidationError(format!("{} cannot exceed {} (one day)", name, limit)));
        }
        if self.reconnect_max_ms < self.reconnect_base_ms {
            return Err(ConfigError::ValidationError(
                "reconnect_max_ms cannot be smaller than reconnect_base_ms".to_string(),
            ));
        }

        Ok(())
    }

    pub fn metadata_poll_interval(&self) -> Duration {
        Duration::from_secs(self.metadata_poll_secs)
    }

    pub fn heartbeat_interval(&self) -> Duration {
        Duration::from_secs(self.heartbeat_secs)
    }

    pub fn snapshot_retry(&self) -> Duration {
        Duration::from_secs(self.snapshot_retry_secs)
    }

    pub fn backoff_policy(&self) -> BackoffPolicy {
        BackoffPolicy {
            base: Duration::from_millis(self.reconnect_base_ms),
            max: Duration::from_millis(self.reconnect_max_ms),
            discovery_after: self.discovery_after_failures,
            ..BackoffPolicy::default()
        }
    }
}
