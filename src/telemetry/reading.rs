//! Synthetic sensor readings and the message that carries them

use crate::discovery::TopicBinding;
use chrono::{DateTime, Utc};
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use serde::Serialize;

/// The values a simulated sensor reports
pub const READINGS: [f64; 11] = [
    20.0, 20.5, 21.0, 22.0, 22.5, 25.5, 30.0, 30.1, 31.5, 29.9, 35.0,
];

/// Source of one reading per telemetry cycle
pub trait ReadingSource: Send {
    fn next_reading(&mut self) -> f64;
}

/// Uniform pick from [`READINGS`]
pub struct RandomReadings {
    rng: StdRng,
}

impl RandomReadings {
    pub fn new() -> Self {
        Self {
            rng: StdRng::from_os_rng(),
        }
    }

    /// Deterministic sequence for tests
    pub fn seeded(seed: u64) -> Self {
        Self {
            rng: StdRng::seed_from_u64(seed),
        }
    }
}

impl Default for RandomReadings {
    fn default() -> Self {
        Self::new()
    }
}

impl ReadingSource for RandomReadings {
    fn next_reading(&mut self) -> f64 {
        READINGS[self.rng.random_range(0..READINGS.len())]
    }
}

/// Fixed-precision rendering used on the wire
pub fn format_value(value: f64) -> String {
    format!("{value:.6}")
}

/// One published reading
///
/// Serializes to `{"component": ..., "id": ..., "value": ...}`; the
/// timestamp stays local for logging.
#[derive(Debug, Clone, Serialize, PartialEq)]
pub struct TelemetryMessage {
    pub component: String,
    pub id: String,
    pub value: String,
    #[serde(skip)]
    pub timestamp: DateTime<Utc>,
}

impl TelemetryMessage {
    pub fn new(binding: &TopicBinding, reading: f64, timestamp: DateTime<Utc>) -> Self {
        Self {
            component: binding.component.to_uppercase(),
            id: binding.component_id.clone(),
            value: format_value(reading),
            timestamp,
        }
    }

    pub fn to_payload(&self) -> Result<Vec<u8>, serde_json::Error> {
        serde_json::to_vec(self)
    }
}
