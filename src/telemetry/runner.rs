//! Fixed-cadence publish loop
//!
//! `Idle -> Running -> Terminated`. The first cycle publishes immediately,
//! then one reading per interval until shutdown, a permanently lost session
//! or the optional cycle budget ends the loop.

use super::reading::{RandomReadings, ReadingSource, TelemetryMessage};
use super::TelemetryError;
use crate::config::DeviceConfig;
use crate::discovery::TopicBinding;
use crate::observability::metrics;
use crate::transport::{MqttError, Transport};
use chrono::Utc;
use std::time::Duration;
use tokio::sync::watch;
use tokio::time::MissedTickBehavior;
use tracing::{debug, info, warn};

/// Loop lifecycle
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LoopState {
    Idle,
    Running,
    Terminated,
}

/// How a loop ended without error
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LoopExit {
    /// Shutdown signal observed
    ShutdownRequested { cycles: u64 },
    /// Configured cycle budget reached
    CyclesCompleted { cycles: u64 },
}

impl LoopExit {
    pub fn cycles(&self) -> u64 {
        match self {
            LoopExit::ShutdownRequested { cycles } | LoopExit::CyclesCompleted { cycles } => {
                *cycles
            }
        }
    }
}

pub struct TelemetryLoop<R: ReadingSource = RandomReadings> {
    binding: TopicBinding,
    interval: Duration,
    max_cycles: Option<u64>,
    readings: R,
    state: LoopState,
}

impl TelemetryLoop<RandomReadings> {
    pub fn new(binding: TopicBinding, interval: Duration) -> Self {
        Self::with_readings(binding, interval, RandomReadings::new())
    }

    pub fn from_config(config: &DeviceConfig, binding: TopicBinding) -> Self {
        Self::new(binding, config.telemetry_interval()).with_max_cycles(config.telemetry.max_cycles)
    }
}

impl<R: ReadingSource> TelemetryLoop<R> {
    pub fn with_readings(binding: TopicBinding, interval: Duration, readings: R) -> Self {
        Self {
            binding,
            interval,
            max_cycles: None,
            readings,
            state: LoopState::Idle,
        }
    }

    pub fn with_max_cycles(mut self, max_cycles: Option<u64>) -> Self {
        self.max_cycles = max_cycles;
        self
    }

    pub fn state(&self) -> LoopState {
        self.state
    }

    /// Publish until shutdown, session loss or the cycle budget
    pub async fn run<T: Transport + ?Sized>(
        &mut self,
        session: &T,
        shutdown: &mut watch::Receiver<bool>,
    ) -> Result<LoopExit, TelemetryError> {
        self.state = LoopState::Running;
        info!(
            topic = %self.binding.topic,
            run_id = session.run_id(),
            interval_secs = self.interval.as_secs(),
            "Telemetry loop started"
        );

        let result = self.run_cycles(session, shutdown).await;

        self.state = LoopState::Terminated;
        match &result {
            Ok(exit) => info!(cycles = exit.cycles(), exit = ?exit, "Telemetry loop finished"),
            Err(e) => warn!(error = %e, "Telemetry loop terminated"),
        }
        result
    }

    async fn run_cycles<T: Transport + ?Sized>(
        &mut self,
        session: &T,
        shutdown: &mut watch::Receiver<bool>,
    ) -> Result<LoopExit, TelemetryError> {
        let mut session_state = session.state_changes();
        let mut ticker = tokio::time::interval(self.interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
        let mut cycles = 0u64;
        let mut shutdown_armed = true;

        loop {
            if *shutdown.borrow() {
                return Ok(LoopExit::ShutdownRequested { cycles });
            }
            let current = session_state.borrow_and_update().clone();
            if current.is_terminal() {
                return Err(TelemetryError::SessionLost { state: current });
            }
            if self.max_cycles.is_some_and(|max| cycles >= max) {
                return Ok(LoopExit::CyclesCompleted { cycles });
            }

            tokio::select! {
                biased;

                changed = shutdown.changed(), if shutdown_armed => {
                    // A dropped sender can never signal shutdown
                    if changed.is_err() {
                        shutdown_armed = false;
                    }
                }

                changed = session_state.changed() => {
                    if changed.is_err() {
                        return Err(TelemetryError::SessionLost {
                            state: session.connection_state(),
                        });
                    }
                    debug!(state = ?*session_state.borrow(), "Session state changed");
                }

                _ = ticker.tick() => {
                    self.publish_cycle(session).await?;
                    cycles += 1;
                }
            }
        }
    }

    async fn publish_cycle<T: Transport + ?Sized>(&mut self, session: &T) -> Result<(), TelemetryError> {
        let message = TelemetryMessage::new(&self.binding, self.readings.next_reading(), Utc::now());
        let payload = message.to_payload()?;
        let payload_text = String::from_utf8_lossy(&payload).into_owned();

        match session.publish(&self.binding.topic, payload).await {
            Ok(()) => {
                metrics().message_published();
                info!(
                    topic = %self.binding.topic,
                    payload = %payload_text,
                    timestamp = %message.timestamp.to_rfc3339(),
                    "Published telemetry"
                );
                Ok(())
            }
            Err(MqttError::SessionLost { state }) => Err(TelemetryError::SessionLost { state }),
            Err(e) => {
                // At-most-once delivery: a dropped reading is not fatal
                metrics().publish_failed();
                warn!(topic = %self.binding.topic, error = %e, "Publish rejected, continuing");
                Ok(())
            }
        }
    }
}
