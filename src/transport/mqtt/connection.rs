//! Pure connection state management for the MQTT session
//!
//! This module contains pure functions for connection state, client option
//! construction, and run identifier generation.

use crate::auth::AccessCredential;
use crate::config::BrokerSection;
use crate::discovery::BrokerAddress;
use rumqttc::MqttOptions;
use std::time::Duration;
use thiserror::Error;
use uuid::Uuid;

/// Longest client identifier an MQTT 3.1 broker is required to accept
pub const MAX_CLIENT_ID_LEN: usize = 23;

/// Connection state for the MQTT session
#[derive(Debug, Clone, PartialEq)]
pub enum ConnectionState {
    /// Initial state - connect dispatched, no CONNACK yet
    Connecting,
    /// CONNACK received
    Connected,
    /// Disconnected with reason
    Disconnected(String),
    /// Waiting before reconnection attempt N
    Reconnecting(u32),
    /// Reconnection budget exhausted; the session will not recover
    PermanentlyDisconnected(String),
}

impl ConnectionState {
    /// True once the supervisor has given up on the session
    pub fn is_terminal(&self) -> bool {
        matches!(self, ConnectionState::PermanentlyDisconnected(_))
    }
}

/// Reconnection configuration
#[derive(Debug, Clone, PartialEq)]
pub struct ReconnectConfig {
    /// Maximum number of reconnection attempts (None = unlimited)
    pub max_attempts: Option<u32>,
    /// Backoff pattern in milliseconds
    pub backoff_pattern: Vec<u64>,
    /// Delay to use after pattern is exhausted
    pub sustained_delay: u64,
}

impl Default for ReconnectConfig {
    fn default() -> Self {
        Self {
            max_attempts: None,
            backoff_pattern: vec![250, 500, 1000, 2000],
            sustained_delay: 5000,
        }
    }
}

impl From<&BrokerSection> for ReconnectConfig {
    fn from(section: &BrokerSection) -> Self {
        Self {
            max_attempts: section.max_reconnect_attempts,
            backoff_pattern: section.reconnect_backoff_ms.clone(),
            sustained_delay: section.reconnect_sustained_ms,
        }
    }
}

impl ReconnectConfig {
    /// Backoff delay for a 1-based attempt: the pattern, then the sustained delay
    pub fn calculate_backoff_delay(&self, attempt: u32) -> u64 {
        let index = attempt.saturating_sub(1) as usize;
        self.backoff_pattern
            .get(index)
            .copied()
            .unwrap_or(self.sustained_delay)
    }

    /// Total time spent backing off before giving up (None if unlimited)
    pub fn calculate_max_total_time(&self) -> Option<u64> {
        self.max_attempts.map(|max_attempts| {
            (1..=max_attempts)
                .map(|attempt| self.calculate_backoff_delay(attempt))
                .sum()
        })
    }
}

/// MQTT transport errors
#[derive(Debug, Error)]
pub enum MqttError {
    #[error("Publish rejected by client queue: {0}")]
    PublishRejected(String),
    #[error("Invalid broker address: {0}")]
    InvalidBrokerAddress(String),
    #[error("Session lost - current state: {state:?}")]
    SessionLost { state: ConnectionState },
}

/// Collision-free per-run client identifier, short enough for MQTT 3.1 brokers
pub fn generate_run_id() -> String {
    let token = Uuid::new_v4().simple().to_string();
    let mut run_id = format!("id_{token}");
    run_id.truncate(MAX_CLIENT_ID_LEN);
    run_id
}

/// Build client options for one session
///
/// The access token is the MQTT username; the password is a placeholder the
/// broker does not evaluate. rumqttc's v4 options always send protocol level
/// 4 (MQTT 3.1.1) in CONNECT, so a broker that only accepts 3.1 (level 3)
/// refuses the client with an unacceptable-protocol return code.
pub fn configure_mqtt_options(
    run_id: &str,
    credential: &AccessCredential,
    broker: &BrokerAddress,
    config: &BrokerSection,
) -> Result<MqttOptions, MqttError> {
    if broker.host.is_empty() || broker.host.chars().any(char::is_whitespace) {
        return Err(MqttError::InvalidBrokerAddress(broker.host.clone()));
    }
    if broker.port == 0 {
        return Err(MqttError::InvalidBrokerAddress(broker.to_string()));
    }

    let mut mqtt_options = MqttOptions::new(run_id, broker.host.clone(), broker.port);
    mqtt_options
        .set_clean_session(true)
        .set_keep_alive(Duration::from_secs(config.keep_alive_secs))
        .set_credentials(
            credential.access_token.clone(),
            config.password_placeholder.clone(),
        );

    Ok(mqtt_options)
}
