//! Configuration module
//!
//! Handles loading and validating bridge configuration from TOML files.

use anyhow::{bail, Context, Result};
use serde::{Deserialize, Serialize};
use std::path::Path;
use std::time::Duration;

const MASK: &str = "********";

/// Main configuration structure for Airzone Notify
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Config {
    /// Airzone Cloud account and endpoints
    #[serde(default)]
    pub airzone: AirzoneConfig,

    /// ntfy push-notification settings
    #[serde(default)]
    pub ntfy: NtfyConfig,

    /// Event stream connection settings
    #[serde(default)]
    pub connection: ConnectionConfig,

    /// Logging configuration
    #[serde(default)]
    pub logging: LoggingConfig,
}

/// Airzone Cloud configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AirzoneConfig {
    /// Account email
    #[serde(default)]
    pub email: String,

    /// Account password
    #[serde(default)]
    pub password: String,

    /// Name of the installation to monitor
    #[serde(default)]
    pub installation: String,

    /// REST API base URL
    #[serde(default = "default_api_url")]
    pub api_url: String,

    /// Event stream URL
    #[serde(default = "default_websocket_url")]
    pub websocket_url: String,

    /// Language of the cloud notification list
    #[serde(default = "default_lang")]
    pub lang: String,
}

/// ntfy configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NtfyConfig {
    /// Publish URL of the ntfy server
    #[serde(default = "default_ntfy_url")]
    pub url: String,

    /// Access token (empty for anonymous publishing)
    #[serde(default)]
    pub token: String,

    /// Topic notifications are published to
    #[serde(default = "default_topic")]
    pub topic: String,

    /// Priority used when a notification does not set one (1-5)
    #[serde(default = "default_priority")]
    pub default_priority: u8,

    /// Icon URL shown with notifications
    #[serde(default)]
    pub icon: Option<String>,
}

/// Event stream connection configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ConnectionConfig {
    /// Fixed delay before reconnecting after a close, in milliseconds
    #[serde(default = "default_reconnect_interval")]
    pub reconnect_interval_ms: u64,

    /// Timeout for opening the transport, in seconds
    #[serde(default = "default_connect_timeout")]
    pub connect_timeout_secs: u64,
}

/// Logging configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LoggingConfig {
    /// Log level (trace, debug, info, warn, error)
    #[serde(default = "default_log_level")]
    pub level: String,

    /// Log format (pretty, json, compact)
    #[serde(default = "default_log_format")]
    pub format: String,

    /// Log file path (optional). Logs go to stdout when unset.
    pub file: Option<String>,

    /// Size in bytes at which the log file is rotated
    #[serde(default = "default_log_max_size")]
    pub max_size: usize,

    /// Number of rotated log files kept
    #[serde(default = "default_log_max_files")]
    pub max_files: usize,
}

fn default_api_url() -> String {
    "https://m.airzonecloud.com/api/v1".to_string()
}

fn default_websocket_url() -> String {
    "wss://m.airzonecloud.com/api/v1/websockets/conn/".to_string()
}

fn default_lang() -> String {
    "fr".to_string()
}

fn default_ntfy_url() -> String {
    "https://ntfy.sh".to_string()
}

fn default_topic() -> String {
    "airzone".to_string()
}

fn default_priority() -> u8 {
    3
}

fn default_reconnect_interval() -> u64 {
    5000
}

fn default_connect_timeout() -> u64 {
    30
}

fn default_log_level() -> String {
    "info".to_string()
}

fn default_log_format() -> String {
    "pretty".to_string()
}

fn default_log_max_size() -> usize {
    102_400
}

fn default_log_max_files() -> usize {
    5
}

impl Default for AirzoneConfig {
    fn default() -> Self {
        Self {
            email: String::new(),
            password: String::new(),
            installation: String::new(),
            api_url: default_api_url(),
            websocket_url: default_websocket_url(),
            lang: default_lang(),
        }
    }
}

impl Default for NtfyConfig {
    fn default() -> Self {
        Self {
            url: default_ntfy_url(),
            token: String::new(),
            topic: default_topic(),
            default_priority: default_priority(),
            icon: None,
        }
    }
}

impl Default for ConnectionConfig {
    fn default() -> Self {
        Self {
            reconnect_interval_ms: default_reconnect_interval(),
            connect_timeout_secs: default_connect_timeout(),
        }
    }
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
            format: default_log_format(),
            file: None,
            max_size: default_log_max_size(),
            max_files: default_log_max_files(),
        }
    }
}

impl ConnectionConfig {
    pub fn reconnect_interval(&self) -> Duration {
        Duration::from_millis(self.reconnect_interval_ms)
    }

    pub fn connect_timeout(&self) -> Duration {
        Duration::from_secs(self.connect_timeout_secs)
    }
}

impl Config {
    /// Load configuration from a TOML file
    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();
        let content = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read config file: {}", path.display()))?;

        let config: Config = toml::from_str(&content)
            .with_context(|| format!("Failed to parse config file: {}", path.display()))?;

        Ok(config)
    }

    /// Check the settings required to log in and pick an installation
    pub fn validate(&self) -> Result<()> {
        if self.airzone.email.is_empty() || self.airzone.password.is_empty() {
            bail!("airzone.email and airzone.password must be set");
        }
        if self.airzone.installation.is_empty() {
            bail!("airzone.installation is not configured");
        }
        if !(1..=5).contains(&self.ntfy.default_priority) {
            bail!(
                "ntfy.default_priority must be between 1 and 5, got {}",
                self.ntfy.default_priority
            );
        }
        Ok(())
    }

    /// Copy of the configuration with secrets masked, for logging
    pub fn redacted(&self) -> Self {
        let mut config = self.clone();
        config.airzone.password = MASK.to_string();
        if !config.ntfy.token.is_empty() {
            config.ntfy.token = MASK.to_string();
        }
        config
    }
}
