//! # Configuration Management
//!
//! Centralized configuration for the relay server.
//!
//! ## Configuration Sources
//! - TOML files via `from_file()` / `from_toml()`
//! - Environment variables via `from_env()` (`LOBBY_RELAY_*`)
//! - Direct instantiation with defaults
//!
//! The admin password has no default; `validate()` reports it when missing.

use crate::error::{RelayError, Result};
use serde::{Deserialize, Serialize};
use std::fs::File;
use std::io::Read;
use std::path::Path;
use std::time::Duration;
use tracing::Level;

/// Current protocol version spoken by the server
pub const PROTOCOL_VERSION: u32 = 1;

/// Longest penalty applied before disconnecting a blocked user
pub const MAX_BLOCK_PENALTY: Duration = Duration::from_secs(3);

/// How long an empty lobby survives before the sweep deletes it
pub const LOBBY_GRACE_PERIOD: Duration = Duration::from_secs(60);

/// Interval between idle-lobby sweeps
pub const SWEEP_INTERVAL: Duration = Duration::from_secs(600);

/// Main configuration structure that contains all configurable settings
#[derive(Debug, Clone, Deserialize, Serialize, Default)]
pub struct RelayConfig {
    /// Listener and session configuration
    #[serde(default)]
    pub server: ServerConfig,

    /// Lobby content defaults
    #[serde(default)]
    pub lobby: LobbyConfig,

    /// Logging configuration
    #[serde(default)]
    pub logging: LoggingConfig,
}

impl RelayConfig {
    /// Load configuration from a TOML file
    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let mut file = File::open(path)
            .map_err(|e| RelayError::ConfigError(format!("Failed to open config file: {e}")))?;

        let mut contents = String::new();
        file.read_to_string(&mut contents)
            .map_err(|e| RelayError::ConfigError(format!("Failed to read config file: {e}")))?;

        Self::from_toml(&contents)
    }

    /// Load configuration from TOML string
    pub fn from_toml(content: &str) -> Result<Self> {
        toml::from_str::<Self>(content)
            .map_err(|e| RelayError::ConfigError(format!("Failed to parse TOML: {e}")))
    }

    /// Load configuration from environment variables
    pub fn from_env() -> Result<Self> {
        let mut config = Self::default();

        if let Ok(addr) = std::env::var("LOBBY_RELAY_TCP_ADDRESS") {
            config.server.tcp_address = addr;
        }

        if let Ok(addr) = std::env::var("LOBBY_RELAY_UDP_ADDRESS") {
            config.server.udp_address = addr;
        }

        if let Ok(password) = std::env::var("LOBBY_RELAY_ADMIN_PASSWORD") {
            config.server.admin_password = password;
        }

        if let Ok(mode) = std::env::var("LOBBY_RELAY_ACCESS_MODE") {
            config.server.access_mode = match mode.to_ascii_lowercase().as_str() {
                "private" => AccessMode::Private,
                "public" => AccessMode::Public,
                other => {
                    return Err(RelayError::ConfigError(format!(
                        "Invalid access mode: '{other}' (expected 'public' or 'private')"
                    )))
                }
            };
        }

        if let Ok(interval) = std::env::var("LOBBY_RELAY_SWEEP_INTERVAL_MS") {
            if let Ok(val) = interval.parse::<u64>() {
                config.server.sweep_interval = Duration::from_millis(val);
            }
        }

        if let Ok(filter) = std::env::var("LOBBY_RELAY_TEXT_FILTER") {
            config.lobby.text_filter = Some(filter);
        }

        Ok(config)
    }

    /// Apply overrides to the default configuration
    pub fn default_with_overrides<F>(mutator: F) -> Self
    where
        F: FnOnce(&mut Self),
    {
        let mut config = Self::default();
        mutator(&mut config);
        config
    }

    /// Generate example configuration file content
    pub fn example_config() -> String {
        toml::to_string_pretty(&Self::default())
            .unwrap_or_else(|_| String::from("# Failed to generate example config"))
    }

    /// Validate the configuration for common issues and misconfigurations
    ///
    /// Returns a list of validation errors. Empty list means configuration is valid.
    pub fn validate(&self) -> Vec<String> {
        let mut errors = Vec::new();
        errors.extend(self.server.validate());
        errors.extend(self.lobby.validate());
        errors.extend(self.logging.validate());
        errors
    }

    /// Validate and return Result - convenience method
    pub fn validate_strict(&self) -> Result<()> {
        let errors = self.validate();
        if errors.is_empty() {
            Ok(())
        } else {
            Err(RelayError::ConfigError(format!(
                "Configuration validation failed:\n  - {}",
                errors.join("\n  - ")
            )))
        }
    }
}

/// Which identities may log in
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize, Serialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum AccessMode {
    /// Everybody except explicit deny entries
    #[default]
    Public,
    /// Only explicit allow entries
    Private,
}

/// Listener and session configuration
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct ServerConfig {
    /// Control channel listen address (e.g., "0.0.0.0:8555")
    pub tcp_address: String,

    /// UDP rendezvous listen address (e.g., "0.0.0.0:8554")
    pub udp_address: String,

    /// Shared secret for the admin console
    pub admin_password: String,

    /// Protocol version clients must announce at login
    pub protocol_version: u32,

    /// Initial access mode
    pub access_mode: AccessMode,

    /// Delay before disconnecting a blocked user (capped at 3s)
    #[serde(with = "duration_serde")]
    pub block_penalty: Duration,

    /// Interval between idle-lobby sweeps
    #[serde(with = "duration_serde")]
    pub sweep_interval: Duration,

    /// How long an empty lobby may linger before the sweep removes it
    #[serde(with = "duration_serde")]
    pub lobby_grace_period: Duration,

    /// Timeout for graceful server shutdown
    #[serde(with = "duration_serde")]
    pub shutdown_timeout: Duration,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            tcp_address: String::from("0.0.0.0:8555"),
            udp_address: String::from("0.0.0.0:8554"),
            admin_password: String::new(),
            protocol_version: PROTOCOL_VERSION,
            access_mode: AccessMode::Public,
            block_penalty: MAX_BLOCK_PENALTY,
            sweep_interval: SWEEP_INTERVAL,
            lobby_grace_period: LOBBY_GRACE_PERIOD,
            shutdown_timeout: Duration::from_secs(10),
        }
    }
}

impl ServerConfig {
    /// Validate server configuration
    pub fn validate(&self) -> Vec<String> {
        let mut errors = Vec::new();

        for (label, address) in [("TCP", &self.tcp_address), ("UDP", &self.udp_address)] {
            if address.is_empty() {
                errors.push(format!("{label} address cannot be empty"));
            } else if address.parse::<std::net::SocketAddr>().is_err() {
                errors.push(format!(
                    "Invalid {label} address format: '{address}' (expected format: '0.0.0.0:8555')"
                ));
            }
        }

        if self.admin_password.is_empty() {
            errors.push("Admin password must be set".to_string());
        }

        if self.block_penalty > MAX_BLOCK_PENALTY {
            errors.push(format!(
                "Block penalty too long: {}ms (maximum: 3s)",
                self.block_penalty.as_millis()
            ));
        }

        if self.sweep_interval.as_millis() < 100 {
            errors.push("Sweep interval too short (minimum: 100ms)".to_string());
        }

        if self.shutdown_timeout.as_secs() > 60 {
            errors.push("Shutdown timeout too long (maximum: 60s)".to_string());
        }

        errors
    }

    /// The penalty actually applied, never longer than `MAX_BLOCK_PENALTY`
    pub fn effective_block_penalty(&self) -> Duration {
        self.block_penalty.min(MAX_BLOCK_PENALTY)
    }
}

/// Lobby content defaults pushed to clients
#[derive(Debug, Clone, Deserialize, Serialize, Default)]
pub struct LobbyConfig {
    /// Suggested lobby names sent after login
    #[serde(default)]
    pub default_names: Option<Vec<String>>,

    /// Quick chat buttons sent after login
    #[serde(default)]
    pub quick_chat_messages: Option<Vec<String>>,

    /// Regular expression whose matches are masked in chat and lobby names
    #[serde(default)]
    pub text_filter: Option<String>,

    /// Include member UDP endpoints in full lobby info
    #[serde(default)]
    pub share_udp_endpoints: bool,
}

impl LobbyConfig {
    /// Validate lobby configuration
    pub fn validate(&self) -> Vec<String> {
        let mut errors = Vec::new();
        if let Some(pattern) = &self.text_filter {
            if let Err(e) = regex::Regex::new(pattern) {
                errors.push(format!("Invalid text filter '{pattern}': {e}"));
            }
        }
        errors
    }
}

/// Logging configuration
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct LoggingConfig {
    /// Application name for logs
    pub app_name: String,

    /// Log level
    #[serde(with = "log_level_serde")]
    pub log_level: Level,

    /// Whether to use JSON formatting for logs
    pub json_format: bool,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            app_name: String::from("lobby-relay"),
            log_level: Level::INFO,
            json_format: false,
        }
    }
}

impl LoggingConfig {
    /// Validate logging configuration
    pub fn validate(&self) -> Vec<String> {
        let mut errors = Vec::new();

        if self.app_name.is_empty() {
            errors.push("Application name cannot be empty".to_string());
        } else if self.app_name.len() > 64 {
            errors.push(format!(
                "Application name too long: {} characters (maximum: 64)",
                self.app_name.len()
            ));
        }

        errors
    }
}

/// Helper module for Duration serialization/deserialization
mod duration_serde {
    use serde::{Deserialize, Deserializer, Serialize, Serializer};
    use std::time::Duration;

    pub fn serialize<S>(duration: &Duration, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        let millis = duration.as_millis() as u64;
        millis.serialize(serializer)
    }

    pub fn deserialize<'de, D>(deserializer: D) -> Result<Duration, D::Error>
    where
        D: Deserializer<'de>,
    {
        let millis = u64::deserialize(deserializer)?;
        Ok(Duration::from_millis(millis))
    }
}

/// Helper module for tracing::Level serialization/deserialization
mod log_level_serde {
    use serde::{Deserialize, Deserializer, Serialize, Serializer};
    use std::str::FromStr;
    use tracing::Level;

    pub fn serialize<S>(level: &Level, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        let level_str = match *level {
            Level::TRACE => "trace",
            Level::DEBUG => "debug",
            Level::INFO => "info",
            Level::WARN => "warn",
            Level::ERROR => "error",
        };
        level_str.serialize(serializer)
    }

    pub fn deserialize<'de, D>(deserializer: D) -> Result<Level, D::Error>
    where
        D: Deserializer<'de>,
    {
        let level_str = String::deserialize(deserializer)?;
        Level::from_str(&level_str)
            .map_err(|_| serde::de::Error::custom(format!("Invalid log level: {level_str}")))
    }
}
