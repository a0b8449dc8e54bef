//! Device lifecycle: discovery, credential exchange, connect, publish, disconnect
//!
//! Collaborators are injected so the whole flow runs against mocks in tests.

use crate::auth::{CredentialProvider, DeviceIdentity};
use crate::config::DeviceConfig;
use crate::discovery::BindingDiscovery;
use crate::error::DeviceResult;
use crate::observability::metrics;
use crate::telemetry::{LoopExit, TelemetryLoop};
use crate::transport::{Connector, Transport};
use std::fmt;
use std::path::PathBuf;
use tokio::sync::watch;
use tracing::{info, warn, Instrument};

/// Where the device is in its run
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DeviceState {
    Idle,
    Discovering,
    Authenticating,
    Connecting,
    Publishing,
    Stopping,
    Stopped,
}

impl DeviceState {
    pub fn as_str(&self) -> &'static str {
        match self {
            DeviceState::Idle => "idle",
            DeviceState::Discovering => "discovering",
            DeviceState::Authenticating => "authenticating",
            DeviceState::Connecting => "connecting",
            DeviceState::Publishing => "publishing",
            DeviceState::Stopping => "stopping",
            DeviceState::Stopped => "stopped",
        }
    }
}

impl fmt::Display for DeviceState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One device run with injected credential provider and connector
pub struct DeviceLifecycle<'a, P, C>
where
    P: CredentialProvider,
    C: Connector,
{
    config: &'a DeviceConfig,
    provider: P,
    connector: C,
    device_code: String,
    working_dir: PathBuf,
    state: DeviceState,
}

impl<'a, P, C> DeviceLifecycle<'a, P, C>
where
    P: CredentialProvider,
    C: Connector,
{
    pub fn new(
        config: &'a DeviceConfig,
        provider: P,
        connector: C,
        device_code: impl Into<String>,
        working_dir: impl Into<PathBuf>,
    ) -> Self {
        Self {
            config,
            provider,
            connector,
            device_code: device_code.into(),
            working_dir: working_dir.into(),
            state: DeviceState::Idle,
        }
    }

    pub fn state(&self) -> DeviceState {
        self.state
    }

    /// Run the device until shutdown, the cycle budget or a fatal error
    ///
    /// No connection is attempted unless the credential exchange succeeds,
    /// and an established session is always disconnected before returning.
    pub async fn run(&mut self, mut shutdown: watch::Receiver<bool>) -> DeviceResult<LoopExit> {
        let span = crate::device_span!(client_id = %self.config.device.client_id);
        let result = self.run_phases(&mut shutdown).instrument(span).await;

        self.set_state(DeviceState::Stopped);
        info!(metrics = ?metrics().snapshot(), "Device metrics at shutdown");
        result
    }

    async fn run_phases(&mut self, shutdown: &mut watch::Receiver<bool>) -> DeviceResult<LoopExit> {
        self.set_state(DeviceState::Discovering);
        let resolved = BindingDiscovery::from_config(self.config)
            .resolve(&self.working_dir, shutdown)
            .await?;
        info!(
            broker = %resolved.broker,
            topic = %resolved.binding,
            "Connecting to broker"
        );

        self.set_state(DeviceState::Authenticating);
        let identity = DeviceIdentity::new(
            self.config.device.client_id.clone(),
            self.config.device.client_secret.clone(),
            self.device_code.clone(),
        );
        let credential = self.provider.exchange(&identity).await?;
        info!(
            provider = self.provider.name(),
            refresh_token_retained = credential.refresh_token.is_some(),
            "Access credential acquired"
        );

        self.set_state(DeviceState::Connecting);
        let mut session = self.connector.connect(&credential, &resolved.broker).await?;

        self.set_state(DeviceState::Publishing);
        let mut telemetry = TelemetryLoop::from_config(self.config, resolved.binding);
        let outcome = telemetry.run(&session, shutdown).await;

        self.set_state(DeviceState::Stopping);
        if let Err(e) = session.disconnect().await {
            warn!(run_id = session.run_id(), error = %e, "Disconnect failed");
        }

        outcome.map_err(Into::into)
    }

    fn set_state(&mut self, state: DeviceState) {
        if self.state != state {
            info!(from = %self.state, to = %state, "Device state change");
            self.state = state;
            metrics().set_device_state(state.as_str());
        }
    }
}
