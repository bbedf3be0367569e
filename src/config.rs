//! # Configuration Management
//!
//! Centralized configuration for the bot socket client.
//!
//! The protocol core itself needs very little: where to connect, which wire
//! layout the deployment speaks, and which payload encoding to prefer. Logging
//! setup lives here too so an embedding application can load everything from
//! one file.
//!
//! ## Configuration Sources
//! - TOML files via `from_file()` / `from_toml()`
//! - Environment variables via `from_env()` (`BOT_SOCKET_*`)
//! - Direct instantiation with defaults
//!
//! ## Timeouts
//! The core mandates no timeout; both `connect_timeout` and `response_timeout`
//! are disabled by default and fall back to transport behaviour.

use crate::core::header::{PayloadType, WireLayout};
use crate::error::{ProtocolError, Result};
use crate::transport::Endpoint;
use serde::{Deserialize, Serialize};
use std::fs::File;
use std::io::Read;
use std::path::Path;
use std::time::Duration;
use tracing::Level;

/// Base of the versioned magic value; the layout version is added to it.
pub const MAGIC_VALUE_BASE: i64 = 0xDEAD_FACE;

/// Binary payloads must be a multiple of this many bytes.
pub const ALIGNMENT: usize = 8;

/// Capacity of chat message text fields.
pub const MAX_MSG_SIZE: usize = 256;

/// Capacity of path fields.
pub const MAX_PATH_SIZE: usize = 256;

/// Max allowed declared payload size (64 MB)
pub const MAX_PAYLOAD_SIZE: usize = 64 * 1024 * 1024;

/// Default port of the bot's TCP socket service
pub const DEFAULT_PORT: u16 = 50000;

/// Top-level configuration: client behaviour plus logging.
#[derive(Debug, Clone, Deserialize, Serialize, Default)]
pub struct SocketConfig {
    /// Client-specific configuration
    #[serde(default)]
    pub client: ClientConfig,

    /// Logging configuration
    #[serde(default)]
    pub logging: LoggingConfig,
}

impl SocketConfig {
    /// Load configuration from a TOML file
    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let mut file = File::open(path)
            .map_err(|e| ProtocolError::ConfigError(format!("Failed to open config file: {e}")))?;

        let mut contents = String::new();
        file.read_to_string(&mut contents)
            .map_err(|e| ProtocolError::ConfigError(format!("Failed to read config file: {e}")))?;

        Self::from_toml(&contents)
    }

    /// Load configuration from TOML string
    pub fn from_toml(content: &str) -> Result<Self> {
        toml::from_str::<Self>(content)
            .map_err(|e| ProtocolError::ConfigError(format!("Failed to parse TOML: {e}")))
    }

    /// Load configuration from environment variables on top of defaults
    pub fn from_env() -> Result<Self> {
        let mut config = Self::default();

        if let Ok(addr) = std::env::var("BOT_SOCKET_ADDRESS") {
            config.client.endpoint = addr.parse()?;
        }

        if let Ok(layout) = std::env::var("BOT_SOCKET_LAYOUT") {
            config.client.layout = match layout.to_ascii_lowercase().as_str() {
                "embedded" | "v12" => WireLayout::Embedded,
                "trailing" | "v13" => WireLayout::Trailing,
                other => {
                    return Err(ProtocolError::ConfigError(format!(
                        "Unknown wire layout '{other}' (expected 'embedded' or 'trailing')"
                    )))
                }
            };
        }

        if let Ok(mode) = std::env::var("BOT_SOCKET_PAYLOAD_MODE") {
            config.client.payload_mode = match mode.to_ascii_lowercase().as_str() {
                "binary" => PayloadType::Binary,
                "json" => PayloadType::Json,
                other => {
                    return Err(ProtocolError::ConfigError(format!(
                        "Unknown payload mode '{other}' (expected 'binary' or 'json')"
                    )))
                }
            };
        }

        if let Ok(timeout) = std::env::var("BOT_SOCKET_CONNECT_TIMEOUT_MS") {
            if let Ok(val) = timeout.parse::<u64>() {
                config.client.connect_timeout = Some(Duration::from_millis(val));
            }
        }

        if let Ok(timeout) = std::env::var("BOT_SOCKET_RESPONSE_TIMEOUT_MS") {
            if let Ok(val) = timeout.parse::<u64>() {
                config.client.response_timeout = Some(Duration::from_millis(val));
            }
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

    /// Save configuration to a file
    pub fn save_to_file<P: AsRef<Path>>(&self, path: P) -> Result<()> {
        let content = toml::to_string_pretty(self)
            .map_err(|e| ProtocolError::ConfigError(format!("Failed to serialize config: {e}")))?;

        std::fs::write(path, content)
            .map_err(|e| ProtocolError::ConfigError(format!("Failed to write config file: {e}")))?;

        Ok(())
    }

    /// Validate the configuration for common issues and misconfigurations
    ///
    /// Returns a list of validation errors. Empty list means configuration is valid.
    pub fn validate(&self) -> Vec<String> {
        let mut errors = Vec::new();
        errors.extend(self.client.validate());
        errors.extend(self.logging.validate());
        errors
    }

    /// Validate and return Result - convenience method
    pub fn validate_strict(&self) -> Result<()> {
        let errors = self.validate();
        if errors.is_empty() {
            Ok(())
        } else {
            Err(ProtocolError::ConfigError(format!(
                "Configuration validation failed:\n  - {}",
                errors.join("\n  - ")
            )))
        }
    }
}

/// Client-specific configuration
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct ClientConfig {
    /// Where the bot's socket service listens
    pub endpoint: Endpoint,

    /// Wire layout spoken by the deployment
    #[serde(default)]
    pub layout: WireLayout,

    /// Preferred request encoding for commands that have a JSON variant
    #[serde(default)]
    pub payload_mode: PayloadType,

    /// Optional bound on connection establishment
    #[serde(
        default,
        with = "opt_duration_serde",
        skip_serializing_if = "Option::is_none"
    )]
    pub connect_timeout: Option<Duration>,

    /// Optional bound on waiting for each framed response
    #[serde(
        default,
        with = "opt_duration_serde",
        skip_serializing_if = "Option::is_none"
    )]
    pub response_timeout: Option<Duration>,
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self {
            endpoint: Endpoint::Tcp {
                host: String::from("127.0.0.1"),
                port: DEFAULT_PORT,
            },
            layout: WireLayout::default(),
            payload_mode: PayloadType::default(),
            connect_timeout: None,
            response_timeout: None,
        }
    }
}

impl ClientConfig {
    /// Validate client configuration
    pub fn validate(&self) -> Vec<String> {
        let mut errors = Vec::new();

        match &self.endpoint {
            Endpoint::Tcp { host, port } => {
                if host.is_empty() {
                    errors.push("Endpoint host cannot be empty".to_string());
                }
                if *port == 0 {
                    errors.push("Endpoint port must be greater than 0".to_string());
                }
            }
            Endpoint::Local { path } => {
                if path.as_os_str().is_empty() {
                    errors.push("Local socket path cannot be empty".to_string());
                }
                if cfg!(not(unix)) {
                    errors.push(
                        "Local socket endpoints are only supported on unix platforms".to_string(),
                    );
                }
            }
        }

        for (name, timeout) in [
            ("Connect", self.connect_timeout),
            ("Response", self.response_timeout),
        ] {
            if let Some(t) = timeout {
                if t.as_millis() < 10 {
                    errors.push(format!("{name} timeout too short (minimum: 10ms)"));
                } else if t.as_secs() > 300 {
                    errors.push(format!("{name} timeout too long (maximum: 300s)"));
                }
            }
        }

        errors
    }
}

/// Logging configuration
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct LoggingConfig {
    /// Application name for logs
    pub app_name: String,

    /// Log level
    #[serde(with = "log_level_serde")]
    pub log_level: Level,

    /// Whether to log to console
    pub log_to_console: bool,

    /// Whether to log to file
    pub log_to_file: bool,

    /// Path to log file (if log_to_file is true)
    pub log_file_path: Option<String>,

    /// Whether to use JSON formatting for logs
    pub json_format: bool,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            app_name: String::from("bot-socket-client"),
            log_level: Level::INFO,
            log_to_console: true,
            log_to_file: false,
            log_file_path: None,
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

        if self.log_to_file {
            if let Some(ref path) = self.log_file_path {
                if let Some(parent) = Path::new(path).parent() {
                    if !parent.as_os_str().is_empty() && !parent.exists() {
                        errors.push(format!(
                            "Log file directory does not exist: {}",
                            parent.display()
                        ));
                    }
                }
            } else {
                errors.push("log_file_path must be specified when log_to_file is true".to_string());
            }
        }

        if !self.log_to_console && !self.log_to_file {
            errors
                .push("At least one logging output (console or file) must be enabled".to_string());
        }

        errors
    }
}

/// Optional Duration as milliseconds
mod opt_duration_serde {
    use serde::{Deserialize, Deserializer, Serializer};
    use std::time::Duration;

    pub fn serialize<S>(duration: &Option<Duration>, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        match duration {
            Some(d) => serializer.serialize_u64(d.as_millis() as u64),
            None => serializer.serialize_none(),
        }
    }

    pub fn deserialize<'de, D>(deserializer: D) -> Result<Option<Duration>, D::Error>
    where
        D: Deserializer<'de>,
    {
        let millis = Option::<u64>::deserialize(deserializer)?;
        Ok(millis.map(Duration::from_millis))
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
