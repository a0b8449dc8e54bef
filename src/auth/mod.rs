//! Credential acquisition for the device
//!
//! The device trades its static client credentials plus a per-invocation
//! device code for an access token exactly once at startup. The token is then
//! presented to the broker as the MQTT username for the lifetime of the run.

use async_trait::async_trait;
use serde::Deserialize;
use std::fmt;
use thiserror::Error;

pub mod oauth;

pub use oauth::{OAuthConfig, OAuthDeviceCodeProvider, DEVICE_CODE_GRANT_TYPE};

/// Identity a device presents to the authorization service
#[derive(Clone, PartialEq)]
pub struct DeviceIdentity {
    pub client_id: String,
    pub client_secret: String,
    pub device_code: String,
}

impl DeviceIdentity {
    pub fn new(
        client_id: impl Into<String>,
        client_secret: impl Into<String>,
        device_code: impl Into<String>,
    ) -> Self {
        Self {
            client_id: client_id.into(),
            client_secret: client_secret.into(),
            device_code: device_code.into(),
        }
    }
}

impl fmt::Debug for DeviceIdentity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("DeviceIdentity")
            .field("client_id", &self.client_id)
            .field("client_secret", &"***")
            .field("device_code", &"***")
            .finish()
    }
}

/// Credential returned by the device-code exchange
///
/// The refresh token is kept but never used: the access token is treated as
/// valid for the whole process lifetime.
#[derive(Clone, PartialEq, Deserialize)]
pub struct AccessCredential {
    pub access_token: String,
    #[serde(default)]
    pub refresh_token: Option<String>,
}

impl AccessCredential {
    pub fn new(access_token: impl Into<String>, refresh_token: Option<String>) -> Self {
        Self {
            access_token: access_token.into(),
            refresh_token,
        }
    }
}

impl fmt::Debug for AccessCredential {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("AccessCredential")
            .field("access_token", &"***")
            .field(
                "refresh_token",
                &self.refresh_token.as_ref().map(|_| "***"),
            )
            .finish()
    }
}

/// Credential exchange failures; all of them are fatal for the run
#[derive(Debug, Error)]
pub enum CredentialError {
    #[error("Authorization service unreachable: {0}")]
    Network(String),
    #[error("Device code rejected (HTTP {status}): {body}")]
    Rejected { status: u16, body: String },
    #[error("Invalid token response: {0}")]
    InvalidResponse(String),
    #[error("Authorization service returned an empty access token")]
    EmptyToken,
    #[error("Credential provider not configured: {0}")]
    NotConfigured(String),
}

/// Exchanges a device identity for an access credential
#[async_trait]
pub trait CredentialProvider: Send + Sync {
    /// Perform the one-shot exchange. Implementations must not retry.
    async fn exchange(&self, identity: &DeviceIdentity)
        -> Result<AccessCredential, CredentialError>;

    /// Provider name for logging
    fn name(&self) -> &str;
}
