//! Mock implementations for testing
//!
//! Provides mock CredentialProvider, Connector and Transport implementations
//! so the device flow can be exercised without an authorization server or a
//! broker. Every mock records the calls it receives.

use crate::auth::{AccessCredential, CredentialError, CredentialProvider, DeviceIdentity};
use crate::discovery::BrokerAddress;
use crate::transport::{ConnectionState, Connector, MqttError, Transport};
use async_trait::async_trait;
use std::sync::atomic::{AtomicBool, AtomicU32, Ordering};
use std::sync::{Arc, Mutex, MutexGuard};
use tokio::sync::watch;
use tokio::time::Instant;

pub type PublishedMessage = (String, Vec<u8>);

// A panicking test thread must not hide the recorded calls from the others
fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
}

/// Mock credential provider that hands out a fixed token or fails
#[derive(Debug, Clone)]
pub struct MockCredentialProvider {
    access_token: String,
    should_fail: bool,
    calls: Arc<Mutex<Vec<DeviceIdentity>>>,
}

impl MockCredentialProvider {
    pub fn new(access_token: impl Into<String>) -> Self {
        Self {
            access_token: access_token.into(),
            should_fail: false,
            calls: Arc::default(),
        }
    }

    pub fn with_failure() -> Self {
        Self {
            should_fail: true,
            ..Self::new("")
        }
    }

    /// Identities passed to `exchange`, in call order
    pub fn calls(&self) -> Vec<DeviceIdentity> {
        lock(&self.calls).clone()
    }
}

impl Default for MockCredentialProvider {
    fn default() -> Self {
        Self::new("mock-access-token")
    }
}

#[async_trait]
impl CredentialProvider for MockCredentialProvider {
    async fn exchange(&self, identity: &DeviceIdentity) -> Result<AccessCredential, CredentialError> {
        lock(&self.calls).push(identity.clone());

        if self.should_fail {
            return Err(CredentialError::Rejected {
                status: 400,
                body: "Mock rejection".to_string(),
            });
        }
        Ok(AccessCredential::new(
            self.access_token.clone(),
            Some("mock-refresh-token".to_string()),
        ))
    }

    fn name(&self) -> &str {
        "mock"
    }
}

/// Mock session recording every publish
///
/// Clones share state, so a test can keep one handle while the device owns
/// another.
#[derive(Debug, Clone)]
pub struct MockSession {
    run_id: String,
    published: Arc<Mutex<Vec<PublishedMessage>>>,
    publish_times: Arc<Mutex<Vec<Instant>>>,
    reject_remaining: Arc<AtomicU32>,
    disconnected: Arc<AtomicBool>,
    state_tx: Arc<watch::Sender<ConnectionState>>,
    state_rx: watch::Receiver<ConnectionState>,
}

impl MockSession {
    pub fn new() -> Self {
        let (state_tx, state_rx) = watch::channel(ConnectionState::Connected);
        Self {
            run_id: "id_mocksession00000000".to_string(),
            published: Arc::default(),
            publish_times: Arc::default(),
            reject_remaining: Arc::default(),
            disconnected: Arc::default(),
            state_tx: Arc::new(state_tx),
            state_rx,
        }
    }

    pub fn published(&self) -> Vec<PublishedMessage> {
        lock(&self.published).clone()
    }

    /// When each accepted publish happened, on the tokio clock
    pub fn publish_times(&self) -> Vec<Instant> {
        lock(&self.publish_times).clone()
    }

    /// Reject the next `count` publishes as if the client queue were full
    pub fn reject_next_publishes(&self, count: u32) {
        self.reject_remaining.store(count, Ordering::SeqCst);
    }

    pub fn set_state(&self, state: ConnectionState) {
        self.state_tx.send_replace(state);
    }

    pub fn is_disconnected(&self) -> bool {
        self.disconnected.load(Ordering::SeqCst)
    }
}

impl Default for MockSession {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl Transport for MockSession {
    fn run_id(&self) -> &str {
        &self.run_id
    }

    async fn publish(&self, topic: &str, payload: Vec<u8>) -> Result<(), MqttError> {
        let state = self.connection_state();
        if state.is_terminal() {
            return Err(MqttError::SessionLost { state });
        }

        let rejected = self
            .reject_remaining
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1))
            .is_ok();
        if rejected {
            return Err(MqttError::PublishRejected("Mock queue full".to_string()));
        }

        lock(&self.published).push((topic.to_string(), payload));
        lock(&self.publish_times).push(Instant::now());
        Ok(())
    }

    fn connection_state(&self) -> ConnectionState {
        self.state_rx.borrow().clone()
    }

    fn state_changes(&self) -> watch::Receiver<ConnectionState> {
        self.state_rx.clone()
    }

    async fn disconnect(&mut self) -> Result<(), MqttError> {
        self.disconnected.store(true, Ordering::SeqCst);
        self.set_state(ConnectionState::Disconnected("Client disconnected".to_string()));
        Ok(())
    }
}

/// Mock connector handing out clones of one [`MockSession`]
#[derive(Debug, Clone)]
pub struct MockConnector {
    session: MockSession,
    should_fail: bool,
    connects: Arc<Mutex<Vec<(AccessCredential, BrokerAddress)>>>,
}

impl MockConnector {
    pub fn new() -> Self {
        Self::with_session(MockSession::new())
    }

    pub fn with_session(session: MockSession) -> Self {
        Self {
            session,
            should_fail: false,
            connects: Arc::default(),
        }
    }

    pub fn with_failure() -> Self {
        Self {
            should_fail: true,
            ..Self::new()
        }
    }

    /// Shared handle to the session every connect returns
    pub fn session(&self) -> MockSession {
        self.session.clone()
    }

    /// Credentials and brokers passed to `connect`, in call order
    pub fn connects(&self) -> Vec<(AccessCredential, BrokerAddress)> {
        lock(&self.connects).clone()
    }
}

impl Default for MockConnector {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl Connector for MockConnector {
    type Session = MockSession;

    async fn connect(
        &self,
        credential: &AccessCredential,
        broker: &BrokerAddress,
    ) -> Result<MockSession, MqttError> {
        lock(&self.connects).push((credential.clone(), broker.clone()));

        if self.should_fail {
            return Err(MqttError::InvalidBrokerAddress(format!(
                "mock refused {broker}"
            )));
        }
        Ok(self.session.clone())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_mock_credential_provider_records_calls() {
        let provider = MockCredentialProvider::new("tok");
        let identity = DeviceIdentity::new("test-client", "test", "abc");

        let credential = provider.exchange(&identity).await.unwrap();

        assert_eq!(credential.access_token, "tok");
        assert_eq!(provider.calls(), vec![identity]);
    }

    #[tokio::test]
    async fn test_mock_credential_provider_failure() {
        let provider = MockCredentialProvider::with_failure();
        let identity = DeviceIdentity::new("test-client", "test", "abc");

        assert!(provider.exchange(&identity).await.is_err());
        assert_eq!(provider.calls().len(), 1);
    }

    #[tokio::test]
    async fn test_mock_session_rejects_then_accepts() {
        let session = MockSession::new();
        session.reject_next_publishes(2);

        assert!(session.publish("a/b", vec![1]).await.is_err());
        assert!(session.publish("a/b", vec![2]).await.is_err());
        assert!(session.publish("a/b", vec![3]).await.is_ok());

        assert_eq!(session.published(), vec![("a/b".to_string(), vec![3])]);
    }

    #[tokio::test]
    async fn test_mock_connector_shares_session() {
        let connector = MockConnector::new();
        let credential = AccessCredential::new("tok", None);
        let broker = BrokerAddress::new("10.0.0.5", 1883);

        let mut session = connector.connect(&credential, &broker).await.unwrap();
        session.publish("sensor/dev01", b"{}".to_vec()).await.unwrap();
        session.disconnect().await.unwrap();

        let observer = connector.session();
        assert_eq!(observer.published().len(), 1);
        assert!(observer.is_disconnected());
        assert_eq!(connector.connects(), vec![(credential, broker)]);
    }
}
