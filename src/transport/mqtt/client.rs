//! Impure I/O operations for the MQTT session
//!
//! This module owns the rumqttc client, the supervised event loop task and
//! the channels that report its state.

use super::connection::{
    configure_mqtt_options, generate_run_id, ConnectionState, MqttError, ReconnectConfig,
};
use super::health_monitor::{ConnectionEvent, HealthMonitor, ReconnectionDecision};
use super::message_handler::{EventRoute, MessageHandler};
use crate::auth::AccessCredential;
use crate::config::{BrokerSection, DeviceConfig};
use crate::discovery::BrokerAddress;
use crate::error::sanitize_error_message;
use crate::observability::metrics;
use crate::transport::{Connector, Transport};
use async_trait::async_trait;
use rumqttc::{AsyncClient, ConnectionError, Event, EventLoop, MqttOptions, QoS};
use std::time::Duration;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tracing::{debug, error, info, warn, Instrument};

/// How long disconnect waits for the supervisor at each shutdown stage
pub const DISCONNECT_GRACE: Duration = Duration::from_secs(2);

/// Pending requests the client queues before `try_publish` fails
const REQUEST_QUEUE_CAPACITY: usize = 10;

/// Builds [`MqttSession`]s with the configured broker settings
#[derive(Debug, Clone)]
pub struct MqttConnector {
    config: BrokerSection,
}

impl MqttConnector {
    pub fn new(config: BrokerSection) -> Self {
        Self { config }
    }

    pub fn from_config(config: &DeviceConfig) -> Self {
        Self::new(config.broker.clone())
    }
}

#[async_trait]
impl Connector for MqttConnector {
    type Session = MqttSession;

    async fn connect(
        &self,
        credential: &AccessCredential,
        broker: &BrokerAddress,
    ) -> Result<MqttSession, MqttError> {
        let run_id = generate_run_id();
        let mqtt_options = configure_mqtt_options(&run_id, credential, broker, &self.config)?;

        let reconnect_config = ReconnectConfig::from(&self.config);

        info!(
            run_id = %run_id,
            broker = %broker,
            keep_alive_secs = self.config.keep_alive_secs,
            reconnect_budget_ms = ?reconnect_config.calculate_max_total_time(),
            "Connecting to MQTT broker"
        );

        Ok(MqttSession::start(run_id, mqtt_options, reconnect_config))
    }
}

/// A broker session kept alive by a supervised event loop task
pub struct MqttSession {
    run_id: String,
    client: AsyncClient,
    state_tx: watch::Sender<ConnectionState>,
    state_rx: watch::Receiver<ConnectionState>,
    shutdown_tx: watch::Sender<bool>,
    supervisor: Option<JoinHandle<()>>,
}

impl MqttSession {
    /// Create the client and spawn its supervisor; the CONNECT goes out on first poll
    pub fn start(run_id: String, mqtt_options: MqttOptions, reconnect_config: ReconnectConfig) -> Self {
        let (client, event_loop) = AsyncClient::new(mqtt_options, REQUEST_QUEUE_CAPACITY);
        let ((state_tx, state_rx), (shutdown_tx, shutdown_rx)) = Self::setup_connection_channels();

        metrics().mqtt_connection_attempt();

        let span = crate::mqtt_span!(run_id = %run_id);
        let supervisor = tokio::spawn(
            Self::supervise(
                run_id.clone(),
                event_loop,
                state_tx.clone(),
                shutdown_rx,
                reconnect_config,
            )
            .instrument(span),
        );

        Self {
            run_id,
            client,
            state_tx,
            state_rx,
            shutdown_tx,
            supervisor: Some(supervisor),
        }
    }

    fn setup_connection_channels() -> (
        (
            watch::Sender<ConnectionState>,
            watch::Receiver<ConnectionState>,
        ),
        (watch::Sender<bool>, watch::Receiver<bool>),
    ) {
        let state_channels = watch::channel(ConnectionState::Connecting);
        let shutdown_channels = watch::channel(false);
        (state_channels, shutdown_channels)
    }

    async fn supervise(
        run_id: String,
        mut event_loop: EventLoop,
        state_tx: watch::Sender<ConnectionState>,
        mut shutdown_rx: watch::Receiver<bool>,
        reconnect_config: ReconnectConfig,
    ) {
        info!(run_id = %run_id, "Starting MQTT event loop supervisor");
        let mut reconnect_attempts = 0u32;

        loop {
            tokio::select! {
                changed = shutdown_rx.changed() => {
                    if changed.is_err() || *shutdown_rx.borrow() {
                        info!(run_id = %run_id, "Shutdown signal received, stopping supervisor");
                        break;
                    }
                }

                event_result = event_loop.poll() => {
                    let keep_running = match event_result {
                        Ok(event) => Self::handle_event(
                            &run_id,
                            &event,
                            &state_tx,
                            &mut reconnect_attempts,
                        ),
                        Err(error) => Self::handle_event_loop_error(
                            &run_id,
                            error,
                            &state_tx,
                            &mut reconnect_attempts,
                            &reconnect_config,
                            shutdown_rx.clone(),
                        ).await,
                    };
                    if !keep_running {
                        break;
                    }
                }
            }
        }

        info!(run_id = %run_id, "MQTT event loop stopped");
    }

    /// Returns false once the loop should stop
    fn handle_event(
        run_id: &str,
        event: &Event,
        state_tx: &watch::Sender<ConnectionState>,
        reconnect_attempts: &mut u32,
    ) -> bool {
        match MessageHandler::route_mqtt_event(event) {
            EventRoute::ConnectionAcknowledged {
                accepted,
                return_code,
                session_present,
            } => {
                info!(
                    run_id,
                    return_code = %return_code,
                    session_present,
                    "Connected with result code"
                );
                if accepted {
                    *reconnect_attempts = 0;
                    metrics().mqtt_connection_established();
                    Self::transition(run_id, state_tx, ConnectionEvent::ConnAckReceived);
                }
                true
            }
            EventRoute::Disconnected => {
                metrics().mqtt_connection_lost();
                Self::transition(run_id, state_tx, ConnectionEvent::DisconnectedByBroker);
                true
            }
            EventRoute::DisconnectSent => {
                debug!(run_id, "DISCONNECT flushed to broker");
                false
            }
            EventRoute::InfrastructureEvent(description) => {
                debug!(run_id, event = %description, "MQTT infrastructure event");
                true
            }
            EventRoute::OutgoingEvent => true,
        }
    }

    /// Returns false once the loop should stop
    async fn handle_event_loop_error(
        run_id: &str,
        error: ConnectionError,
        state_tx: &watch::Sender<ConnectionState>,
        reconnect_attempts: &mut u32,
        reconnect_config: &ReconnectConfig,
        shutdown_rx: watch::Receiver<bool>,
    ) -> bool {
        let reason = sanitize_error_message(&error.to_string());
        match MessageHandler::refusal_code(&error) {
            Some(return_code) => {
                error!(run_id, return_code = %return_code, "Broker refused connection");
                if MessageHandler::is_auth_refusal(&error) {
                    warn!(run_id, "Access token rejected by broker; it is never renewed");
                }
            }
            None => error!(run_id, error = %reason, "MQTT event loop error"),
        }

        metrics().mqtt_connection_failed();
        Self::transition(run_id, state_tx, ConnectionEvent::NetworkError(reason));

        let shutdown_requested = *shutdown_rx.borrow();
        match HealthMonitor::should_attempt_reconnection(
            *reconnect_attempts,
            reconnect_config,
            shutdown_requested,
        ) {
            ReconnectionDecision::Proceed { attempt, delay_ms } => {
                *reconnect_attempts = attempt;
                metrics().mqtt_reconnect_attempt();
                metrics().mqtt_connection_attempt();
                Self::transition(run_id, state_tx, ConnectionEvent::ReconnectionStarted(attempt));
                Self::interruptible_sleep(shutdown_rx, delay_ms).await
            }
            ReconnectionDecision::AbortShutdownRequested => false,
            ReconnectionDecision::AbortMaxAttemptsExceeded => {
                Self::transition(
                    run_id,
                    state_tx,
                    ConnectionEvent::PermanentFailure(format!(
                        "Gave up after {reconnect_attempts} reconnection attempts"
                    )),
                );
                false
            }
        }
    }

    /// Returns true if the sleep completed, false if shutdown was requested
    async fn interruptible_sleep(mut shutdown_rx: watch::Receiver<bool>, delay_ms: u64) -> bool {
        tokio::select! {
            changed = shutdown_rx.changed() => {
                if changed.is_err() || *shutdown_rx.borrow() {
                    info!("Shutdown signal received during reconnection delay, stopping");
                    return false;
                }
                true
            }
            _ = tokio::time::sleep(Duration::from_millis(delay_ms)) => true,
        }
    }

    fn transition(
        run_id: &str,
        state_tx: &watch::Sender<ConnectionState>,
        event: ConnectionEvent,
    ) {
        let next = HealthMonitor::determine_next_state(event);
        let previous = state_tx.send_replace(next.clone());
        if previous != next {
            HealthMonitor::log_state_transition(run_id, &previous, &next);
        }
    }
}

#[async_trait]
impl Transport for MqttSession {
    fn run_id(&self) -> &str {
        &self.run_id
    }

    async fn publish(&self, topic: &str, payload: Vec<u8>) -> Result<(), MqttError> {
        let state = self.connection_state();
        if state.is_terminal() {
            return Err(MqttError::SessionLost { state });
        }
        if !HealthMonitor::can_publish(&state) {
            debug!(run_id = %self.run_id, state = ?state, "Queueing publish while not connected");
        }

        self.client
            .try_publish(topic, QoS::AtMostOnce, false, payload)
            .map_err(|e| MqttError::PublishRejected(e.to_string()))
    }

    fn connection_state(&self) -> ConnectionState {
        self.state_rx.borrow().clone()
    }

    fn state_changes(&self) -> watch::Receiver<ConnectionState> {
        self.state_rx.clone()
    }

    async fn disconnect(&mut self) -> Result<(), MqttError> {
        let Some(mut handle) = self.supervisor.take() else {
            return Ok(());
        };

        if let Err(e) = self.client.try_disconnect() {
            debug!(run_id = %self.run_id, error = %e, "Could not queue DISCONNECT");
        }

        // Only a live connection can flush the DISCONNECT packet
        let flushed = HealthMonitor::can_publish(&self.connection_state())
            && tokio::time::timeout(DISCONNECT_GRACE, &mut handle).await.is_ok();

        if !flushed {
            let _ = self.shutdown_tx.send(true);
            info!(run_id = %self.run_id, "Sent shutdown signal to supervisor");

            match tokio::time::timeout(DISCONNECT_GRACE, &mut handle).await {
                Ok(Ok(())) => info!(run_id = %self.run_id, "Event loop task shut down gracefully"),
                Ok(Err(e)) if !e.is_cancelled() => {
                    warn!(run_id = %self.run_id, error = %e, "Event loop task ended with error");
                }
                Ok(Err(_)) => {}
                Err(_) => {
                    warn!(run_id = %self.run_id, "Event loop task didn't stop in time, aborting");
                    handle.abort();
                }
            }
        }

        Self::transition(&self.run_id, &self.state_tx, ConnectionEvent::ClientDisconnected);
        metrics().mqtt_connection_lost();
        info!(run_id = %self.run_id, "MQTT client disconnected");
        Ok(())
    }
}

impl Drop for MqttSession {
    fn drop(&mut self) {
        // Drop can't await; disconnect() is the graceful path
        let _ = self.shutdown_tx.send(true);
        if let Some(handle) = self.supervisor.take() {
            handle.abort();
        }
    }
}
