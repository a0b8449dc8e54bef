//! Telemetry generation and the publish loop

use crate::transport::ConnectionState;
use thiserror::Error;

pub mod reading;
pub mod runner;

pub use reading::{format_value, RandomReadings, ReadingSource, TelemetryMessage, READINGS};
pub use runner::{LoopExit, LoopState, TelemetryLoop};

/// Conditions that end the loop with a failure
#[derive(Debug, Error)]
pub enum TelemetryError {
    #[error("Session lost - state: {state:?}")]
    SessionLost { state: ConnectionState },

    #[error("Failed to serialize telemetry message: {0}")]
    Serialization(#[from] serde_json::Error),
}
