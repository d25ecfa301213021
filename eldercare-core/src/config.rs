//! Configuration loading and management
//!
//! Configuration is loaded from `~/.config/eldercare/config.toml`
//!
//! This module follows the XDG Base Directory Specification:
//! - Config: `$XDG_CONFIG_HOME/eldercare/` (~/.config/eldercare/)
//! - Data: `$XDG_DATA_HOME/eldercare/` (~/.local/share/eldercare/), holds the session file
//! - State/Logs: `$XDG_STATE_HOME/eldercare/` (~/.local/state/eldercare/)

use crate::error::{Error, Result};
use serde::Deserialize;
use std::path::{Path, PathBuf};
use std::time::Duration;
use uuid::Uuid;

/// Returns a best-effort home directory path.
fn home_dir() -> PathBuf {
    std::env::var_os("HOME")
        .map(PathBuf::from)
        .or_else(dirs::home_dir)
        .unwrap_or_else(|| PathBuf::from("."))
}

/// Returns XDG_CONFIG_HOME or ~/.config
fn xdg_config_home() -> PathBuf {
    std::env::var("XDG_CONFIG_HOME")
        .map(PathBuf::from)
        .unwrap_or_else(|_| home_dir().join(".config"))
}

/// Returns XDG_DATA_HOME or ~/.local/share
fn xdg_data_home() -> PathBuf {
    std::env::var("XDG_DATA_HOME")
        .map(PathBuf::from)
        .unwrap_or_else(|_| home_dir().join(".local/share"))
}

/// Returns XDG_STATE_HOME or ~/.local/state
fn xdg_state_home() -> PathBuf {
    std::env::var("XDG_STATE_HOME")
        .map(PathBuf::from)
        .unwrap_or_else(|_| home_dir().join(".local/state"))
}

/// Main configuration struct
#[derive(Debug, Deserialize, Default, Clone)]
pub struct Config {
    /// Telemetry backend
    #[serde(default)]
    pub api: ApiConfig,

    /// Wearable device identifiers and scan behavior
    #[serde(default)]
    pub device: DeviceConfig,

    /// Sample batching and shutdown behavior
    #[serde(default)]
    pub relay: RelayConfig,

    /// Logging configuration
    #[serde(default)]
    pub logging: LoggingConfig,
}

/// Backend API configuration
#[derive(Debug, Deserialize, Clone)]
pub struct ApiConfig {
    /// Base URL all endpoint paths are appended to
    #[serde(default = "default_base_url")]
    pub base_url: String,

    /// HTTP request timeout in seconds
    #[serde(default = "default_api_timeout")]
    pub timeout_secs: u64,
}

impl Default for ApiConfig {
    fn default() -> Self {
        Self {
            base_url: default_base_url(),
            timeout_secs: default_api_timeout(),
        }
    }
}

impl ApiConfig {
    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_secs)
    }

    pub(crate) fn validate(&self) -> Result<()> {
        let base = self.base_url.trim();
        if base.is_empty() {
            return Err(Error::Config("api.base_url cannot be empty".to_string()));
        }
        if !(base.starts_with("http://") || base.starts_with("https://")) {
            return Err(Error::Config(format!(
                "api.base_url must start with http:// or https:// (got {:?})",
                base
            )));
        }
        Ok(())
    }
}

fn default_base_url() -> String {
    "http://127.0.0.1:5008".to_string()
}

fn default_api_timeout() -> u64 {
    30
}

/// Wearable device configuration
///
/// The defaults are the Nordic UART service the wearable firmware exposes.
#[derive(Debug, Deserialize, Clone)]
pub struct DeviceConfig {
    /// Service the peripheral advertises
    #[serde(default = "default_service_uuid")]
    pub service_uuid: String,

    /// Characteristic the device notifies telemetry on
    #[serde(default = "default_rx_uuid")]
    pub rx_characteristic_uuid: String,

    /// How long a scan waits for the device to show up
    #[serde(default = "default_scan_timeout")]
    pub scan_timeout_secs: u64,

    /// Pause between a lost connection and the next scan
    #[serde(default = "default_reconnect_delay")]
    pub reconnect_delay_secs: u64,
}

impl Default for DeviceConfig {
    fn default() -> Self {
        Self {
            service_uuid: default_service_uuid(),
            rx_characteristic_uuid: default_rx_uuid(),
            scan_timeout_secs: default_scan_timeout(),
            reconnect_delay_secs: default_reconnect_delay(),
        }
    }
}

impl DeviceConfig {
    pub fn service_uuid(&self) -> Result<Uuid> {
        parse_uuid("device.service_uuid", &self.service_uuid)
    }

    pub fn rx_characteristic_uuid(&self) -> Result<Uuid> {
        parse_uuid("device.rx_characteristic_uuid", &self.rx_characteristic_uuid)
    }

    pub fn scan_timeout(&self) -> Duration {
        Duration::from_secs(self.scan_timeout_secs)
    }

    pub fn reconnect_delay(&self) -> Duration {
        Duration::from_secs(self.reconnect_delay_secs)
    }

    pub(crate) fn validate(&self) -> Result<()> {
        self.service_uuid()?;
        self.rx_characteristic_uuid()?;
        if self.scan_timeout_secs == 0 {
            return Err(Error::Config(
                "device.scan_timeout_secs must be at least 1".to_string(),
            ));
        }
        Ok(())
    }
}

fn parse_uuid(field: &str, value: &str) -> Result<Uuid> {
    Uuid::parse_str(value).map_err(|e| Error::Config(format!("{} is not a UUID: {}", field, e)))
}

fn default_service_uuid() -> String {
    "6e400001-b5a3-f393-e0a9-e50e24dcca9e".to_string()
}

fn default_rx_uuid() -> String {
    "6e400003-b5a3-f393-e0a9-e50e24dcca9e".to_string()
}

fn default_scan_timeout() -> u64 {
    10
}

fn default_reconnect_delay() -> u64 {
    5
}

/// Batching configuration for regular heart-rate samples
#[derive(Debug, Deserialize, Clone)]
pub struct RelayConfig {
    /// Seconds between bulk uploads
    #[serde(default = "default_flush_interval")]
    pub flush_interval_secs: u64,

    /// Upload pending samples when the device disconnects instead of
    /// dropping them
    #[serde(default)]
    pub flush_on_disconnect: bool,

    /// Upper bound on waiting for in-flight uploads at shutdown
    #[serde(default = "default_settle_timeout")]
    pub settle_timeout_secs: u64,
}

impl Default for RelayConfig {
    fn default() -> Self {
        Self {
            flush_interval_secs: default_flush_interval(),
            flush_on_disconnect: false,
            settle_timeout_secs: default_settle_timeout(),
        }
    }
}

impl RelayConfig {
    pub fn flush_interval(&self) -> Duration {
        Duration::from_secs(self.flush_interval_secs)
    }

    pub fn settle_timeout(&self) -> Duration {
        Duration::from_secs(self.settle_timeout_secs)
    }
}

fn default_flush_interval() -> u64 {
    60
}

fn default_settle_timeout() -> u64 {
    5
}

/// Logging configuration
#[derive(Debug, Deserialize, Clone)]
pub struct LoggingConfig {
    /// Log level (trace, debug, info, warn, error)
    #[serde(default = "default_log_level")]
    pub level: String,

    /// Maximum number of log files to keep
    #[serde(default = "default_max_log_files")]
    pub max_files: usize,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
            max_files: default_max_log_files(),
        }
    }
}

fn default_log_level() -> String {
    "info".to_string()
}

fn default_max_log_files() -> usize {
    5
}

impl Config {
    /// Load configuration from the default path
    pub fn load() -> Result<Self> {
        let config_path = Self::config_path();

        if !config_path.exists() {
            tracing::info!("No config file found at {:?}, using defaults", config_path);
            return Ok(Config::default());
        }

        Self::load_from(&config_path)
    }

    /// Load configuration from a specific path
    pub fn load_from(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)
            .map_err(|e| Error::Config(format!("failed to read config file {:?}: {}", path, e)))?;

        let config: Config = toml::from_str(&content)
            .map_err(|e| Error::Config(format!("failed to parse config: {}", e)))?;

        config.validate()?;
        Ok(config)
    }

    /// Validate the whole configuration
    pub fn validate(&self) -> Result<()> {
        self.api.validate()?;
        self.device.validate()?;
        if self.relay.flush_interval_secs == 0 {
            return Err(Error::Config(
                "relay.flush_interval_secs must be at least 1".to_string(),
            ));
        }
        Ok(())
    }

    /// Returns the default config file path
    ///
    /// `$XDG_CONFIG_HOME/eldercare/config.toml` (~/.config/eldercare/config.toml)
    pub fn config_path() -> PathBuf {
        xdg_config_home().join("eldercare").join("config.toml")
    }

    /// Returns the data directory path (for the session file)
    ///
    /// `$XDG_DATA_HOME/eldercare/` (~/.local/share/eldercare/)
    pub fn data_dir() -> PathBuf {
        xdg_data_home().join("eldercare")
    }

    /// Returns the state directory path (for logs)
    ///
    /// `$XDG_STATE_HOME/eldercare/` (~/.local/state/eldercare/)
    pub fn state_dir() -> PathBuf {
        xdg_state_home().join("eldercare")
    }

    /// Returns the session file path
    ///
    /// `$XDG_DATA_HOME/eldercare/session.json`
    pub fn session_path() -> PathBuf {
        Self::data_dir().join("session.json")
    }

    /// Returns the log file path
    ///
    /// `$XDG_STATE_HOME/eldercare/eldercare.log` (~/.local/state/eldercare/eldercare.log)
    pub fn log_path() -> PathBuf {
        Self::state_dir().join("eldercare.log")
    }

    /// Ensure XDG base directory environment variables are set.
    ///
    /// This is mainly for CLI binaries that want explicit, stable path behavior
    /// before invoking other components that read these env vars.
    pub fn ensure_xdg_env() {
        let home = home_dir();

        if std::env::var("XDG_DATA_HOME").is_err() {
            std::env::set_var("XDG_DATA_HOME", home.join(".local/share"));
        }

        if std::env::var("XDG_STATE_HOME").is_err() {
            std::env::set_var("XDG_STATE_HOME", home.join(".local/state"));
        }

        if std::env::var("XDG_CONFIG_HOME").is_err() {
            std::env::set_var("XDG_CONFIG_HOME", home.join(".config"));
        }
    }
}
