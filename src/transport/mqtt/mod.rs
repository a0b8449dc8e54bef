//! MQTT session for the telemetry device
//!
//! Split the same way as the rest of the transport code: pure decisions in
//! [`connection`], [`message_handler`] and [`health_monitor`], I/O in
//! [`client`].
//!
//! ```rust,no_run
//! use sensor_adapter::auth::AccessCredential;
//! use sensor_adapter::config::BrokerSection;
//! use sensor_adapter::discovery::BrokerAddress;
//! use sensor_adapter::transport::{Connector, MqttConnector, Transport};
//!
//! # tokio_test::block_on(async {
//! let connector = MqttConnector::new(BrokerSection::default());
//! let credential = AccessCredential::new("token", None);
//! let broker = BrokerAddress::new("localhost", 1883);
//!
//! let mut session = connector.connect(&credential, &broker).await?;
//! session.publish("sensor/dev01", b"{}".to_vec()).await?;
//! session.disconnect().await?;
//! # Ok::<(), Box<dyn std::error::Error>>(())
//! # });
//! ```

pub mod client;
pub mod connection;
pub mod health_monitor;
pub mod message_handler;

pub use client::{MqttConnector, MqttSession};
pub use connection::{generate_run_id, ConnectionState, MqttError, ReconnectConfig};
pub use health_monitor::{ConnectionEvent, HealthMonitor, ReconnectionDecision};
pub use message_handler::{EventRoute, MessageHandler};
