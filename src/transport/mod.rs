//! Transport layer for device telemetry
//!
//! This module provides the session abstraction the telemetry loop publishes
//! through, and the connector that builds sessions, so both can be swapped
//! for mocks in tests.

use crate::auth::AccessCredential;
use crate::discovery::BrokerAddress;
use tokio::sync::watch;

pub mod mqtt;

pub use mqtt::{ConnectionState, MqttConnector, MqttError, MqttSession};

/// A live broker session
#[async_trait::async_trait]
pub trait Transport: Send + Sync {
    /// Per-run client identifier
    fn run_id(&self) -> &str;

    /// Submit an at-most-once, non-retained publish without waiting for delivery
    async fn publish(&self, topic: &str, payload: Vec<u8>) -> Result<(), MqttError>;

    /// Current connection state
    fn connection_state(&self) -> ConnectionState;

    /// Receiver that observes every connection state change
    fn state_changes(&self) -> watch::Receiver<ConnectionState>;

    /// Disconnect from the broker and stop the background task
    async fn disconnect(&mut self) -> Result<(), MqttError>;
}

/// Builds sessions from a credential and a discovered broker
#[async_trait::async_trait]
pub trait Connector: Send + Sync {
    type Session: Transport + 'static;

    /// Dispatch the connection and start keeping it alive
    ///
    /// Returns without waiting for the broker's acknowledgement.
    async fn connect(
        &self,
        credential: &AccessCredential,
        broker: &BrokerAddress,
    ) -> Result<Self::Session, MqttError>;
}
