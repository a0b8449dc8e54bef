//! Device configuration
//!
//! Every section carries defaults matching the stock adapter, so a missing
//! configuration file yields a usable device. The value is built once at
//! startup and only borrowed afterwards.

use serde::{Deserialize, Serialize};
use std::path::Path;
use std::time::Duration;
use thiserror::Error;
use url::Url;

/// Main device configuration structure
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct DeviceConfig {
    #[serde(default)]
    pub device: DeviceSection,
    #[serde(default)]
    pub auth: AuthSection,
    #[serde(default)]
    pub broker: BrokerSection,
    #[serde(default)]
    pub discovery: DiscoverySection,
    #[serde(default)]
    pub telemetry: TelemetrySection,
}

/// Static device credentials registered with the authorization service
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct DeviceSection {
    #[serde(default = "default_client_id")]
    pub client_id: String,
    #[serde(default = "default_client_secret")]
    pub client_secret: String,
}

impl Default for DeviceSection {
    fn default() -> Self {
        Self {
            client_id: default_client_id(),
            client_secret: default_client_secret(),
        }
    }
}

fn default_client_id() -> String {
    "test-client".to_string()
}

fn default_client_secret() -> String {
    "test".to_string()
}

/// Authorization service used for the device-code exchange
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct AuthSection {
    /// OAuth2 token endpoint
    #[serde(default = "default_token_url")]
    pub token_url: String,
    /// Request timeout in milliseconds
    #[serde(default = "default_auth_timeout_ms")]
    pub timeout_ms: u64,
}

impl Default for AuthSection {
    fn default() -> Self {
        Self {
            token_url: default_token_url(),
            timeout_ms: default_auth_timeout_ms(),
        }
    }
}

fn default_token_url() -> String {
    "http://localhost:8080/oauth/token".to_string()
}

fn default_auth_timeout_ms() -> u64 {
    10_000
}

/// Broker connection settings (the host comes from the binding file)
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct BrokerSection {
    #[serde(default = "default_broker_port")]
    pub port: u16,
    #[serde(default = "default_keep_alive_secs")]
    pub keep_alive_secs: u64,
    /// Sent as the MQTT password; the broker authorizes on the token alone
    #[serde(default = "default_password_placeholder")]
    pub password_placeholder: String,
    /// Reconnection attempts before the session is declared lost (None = unlimited)
    #[serde(default)]
    pub max_reconnect_attempts: Option<u32>,
    /// Reconnection backoff pattern in milliseconds
    #[serde(default = "default_reconnect_backoff_ms")]
    pub reconnect_backoff_ms: Vec<u64>,
    /// Delay once the backoff pattern is exhausted
    #[serde(default = "default_reconnect_sustained_ms")]
    pub reconnect_sustained_ms: u64,
}

impl Default for BrokerSection {
    fn default() -> Self {
        Self {
            port: default_broker_port(),
            keep_alive_secs: default_keep_alive_secs(),
            password_placeholder: default_password_placeholder(),
            max_reconnect_attempts: None,
            reconnect_backoff_ms: default_reconnect_backoff_ms(),
            reconnect_sustained_ms: default_reconnect_sustained_ms(),
        }
    }
}

fn default_broker_port() -> u16 {
    1883
}

fn default_keep_alive_secs() -> u64 {
    60
}

fn default_password_placeholder() -> String {
    "any".to_string()
}

fn default_reconnect_backoff_ms() -> Vec<u64> {
    vec![250, 500, 1000, 2000]
}

fn default_reconnect_sustained_ms() -> u64 {
    5000
}

/// Binding file discovery settings
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct DiscoverySection {
    /// File looked up in the working directory
    #[serde(default = "default_binding_file")]
    pub file_name: String,
    /// Poll cadence while the file is absent
    #[serde(default = "default_poll_interval_ms")]
    pub poll_interval_ms: u64,
    /// Ceiling for the exponential poll backoff
    #[serde(default = "default_poll_interval_ms")]
    pub max_poll_interval_ms: u64,
    /// Give up after this long (0 or None = wait forever)
    #[serde(default = "default_discovery_timeout_secs")]
    pub timeout_secs: Option<u64>,
}

impl Default for DiscoverySection {
    fn default() -> Self {
        Self {
            file_name: default_binding_file(),
            poll_interval_ms: default_poll_interval_ms(),
            max_poll_interval_ms: default_poll_interval_ms(),
            timeout_secs: default_discovery_timeout_secs(),
        }
    }
}

fn default_binding_file() -> String {
    "connections.txt".to_string()
}

fn default_poll_interval_ms() -> u64 {
    1000
}

fn default_discovery_timeout_secs() -> Option<u64> {
    Some(300)
}

/// Publish loop settings
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct TelemetrySection {
    #[serde(default = "default_telemetry_interval_secs")]
    pub interval_secs: u64,
    /// Stop after this many publish cycles (None = run until shutdown)
    #[serde(default)]
    pub max_cycles: Option<u64>,
}

impl Default for TelemetrySection {
    fn default() -> Self {
        Self {
            interval_secs: default_telemetry_interval_secs(),
            max_cycles: None,
        }
    }
}

fn default_telemetry_interval_secs() -> u64 {
    30
}

/// Configuration loading errors
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Failed to read config file: {0}")]
    FileRead(#[from] std::io::Error),
    #[error("Failed to parse TOML: {0}")]
    TomlParse(#[from] toml::de::Error),
    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),
}

impl DeviceConfig {
    /// Load configuration from a TOML file and validate it
    pub fn load_from_file(path: &Path) -> Result<Self, ConfigError> {
        let content = std::fs::read_to_string(path)?;
        Self::from_toml_str(&content)
    }

    /// Parse and validate configuration from TOML text
    pub fn from_toml_str(content: &str) -> Result<Self, ConfigError> {
        let config: DeviceConfig = toml::from_str(content)?;
        config.validate()?;
        Ok(config)
    }

    /// Check cross-field constraints that serde cannot express
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.device.client_id.trim().is_empty() {
            return Err(ConfigError::InvalidConfig(
                "device.client_id must not be empty".to_string(),
            ));
        }
        if self.broker.port == 0 {
            return Err(ConfigError::InvalidConfig(
                "broker.port must be greater than 0".to_string(),
            ));
        }
        if self.broker.keep_alive_secs < 5 {
            return Err(ConfigError::InvalidConfig(
                "broker.keep_alive_secs must be at least 5".to_string(),
            ));
        }
        if self.broker.reconnect_sustained_ms == 0 {
            return Err(ConfigError::InvalidConfig(
                "broker.reconnect_sustained_ms must be greater than 0".to_string(),
            ));
        }
        if self.broker.max_reconnect_attempts == Some(0) {
            return Err(ConfigError::InvalidConfig(
                "broker.max_reconnect_attempts must be greater than 0 or unset".to_string(),
            ));
        }
        if self.discovery.file_name.trim().is_empty() {
            return Err(ConfigError::InvalidConfig(
                "discovery.file_name must not be empty".to_string(),
            ));
        }
        if self.discovery.poll_interval_ms == 0 {
            return Err(ConfigError::InvalidConfig(
                "discovery.poll_interval_ms must be greater than 0".to_string(),
            ));
        }
        if self.telemetry.interval_secs == 0 {
            return Err(ConfigError::InvalidConfig(
                "telemetry.interval_secs must be greater than 0".to_string(),
            ));
        }
        Url::parse(&self.auth.token_url).map_err(|e| {
            ConfigError::InvalidConfig(format!(
                "auth.token_url '{}' is not a valid URL: {e}",
                self.auth.token_url
            ))
        })?;
        Ok(())
    }

    pub fn telemetry_interval(&self) -> Duration {
        Duration::from_secs(self.telemetry.interval_secs)
    }

    pub fn poll_interval(&self) -> Duration {
        Duration::from_millis(self.discovery.poll_interval_ms)
    }

    pub fn max_poll_interval(&self) -> Duration {
        Duration::from_millis(self.discovery.max_poll_interval_ms)
    }

    /// None means wait for the binding file forever
    pub fn discovery_timeout(&self) -> Option<Duration> {
        self.discovery
            .timeout_secs
            .filter(|secs| *secs > 0)
            .map(Duration::from_secs)
    }

    /// Create a test configuration for unit testing
    #[cfg(test)]
    pub fn test_config() -> Self {
        let toml_content = r#"
[device]
client_id = "test-client"
client_secret = "test"

[auth]
token_url = "http://127.0.0.1:9/oauth/token"

[discovery]
poll_interval_ms = 10
timeout_secs = 5
"#;
        toml::from_str(toml_content).expect("Test config should parse")
    }
}
