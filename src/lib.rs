//! Sensor adapter - OAuth-authenticated MQTT telemetry device
//!
//! Simulates a device that waits for the platform to hand it a broker
//! binding, exchanges a device code for an access token, connects to the
//! broker with that token and publishes a synthetic reading on a fixed
//! cadence.
//!
//! # Overview
//!
//! - [`discovery`] - polls the working directory for the binding file
//! - [`auth`] - the device-code credential exchange
//! - [`transport`] - the supervised MQTT session
//! - [`telemetry`] - readings and the publish loop
//! - [`device`] - invocation parameters and the lifecycle composing the above
//!
//! # Quick Start
//!
//! ```rust
//! use sensor_adapter::discovery::{parse_bindings, select_binding};
//! use sensor_adapter::telemetry::TelemetryMessage;
//!
//! let entries = parse_bindings("sensor/dev01=10.0.0.5\n").unwrap();
//! let (binding, broker) = select_binding(&entries, 1883).unwrap();
//! assert_eq!(broker.to_string(), "10.0.0.5:1883");
//!
//! let message = TelemetryMessage::new(&binding, 22.5, chrono::Utc::now());
//! let payload = String::from_utf8(message.to_payload().unwrap()).unwrap();
//! assert_eq!(payload, r#"{"component":"SENSOR","id":"dev01","value":"22.500000"}"#);
//! ```

pub mod observability;

pub mod auth;
pub mod config;
pub mod device;
pub mod discovery;
pub mod error;
pub mod telemetry;
pub mod testing;
pub mod transport;

pub use config::*;
pub use device::{DeviceLifecycle, InvocationParams};
pub use error::{DeviceError, DeviceResult, FaultKind};
