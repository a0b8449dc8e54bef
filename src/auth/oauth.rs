//! OAuth2 device-code grant over HTTP
//!
//! Implements the token request of RFC 8628 section 3.4: the device posts its
//! device code to the token endpoint, authenticating the client with HTTP
//! basic auth, and receives an access token (plus an optional refresh token).

use super::{AccessCredential, CredentialError, CredentialProvider, DeviceIdentity};
use crate::error::sanitize_error_message;
use async_trait::async_trait;
use reqwest::Client;
use std::time::Duration;
use tracing::{debug, error, info};

/// Grant type registered for the device authorization flow
pub const DEVICE_CODE_GRANT_TYPE: &str = "urn:ietf:params:oauth:grant-type:device_code";

/// Token endpoint configuration
#[derive(Debug, Clone)]
pub struct OAuthConfig {
    pub token_url: String,
    pub timeout: Duration,
}

impl Default for OAuthConfig {
    fn default() -> Self {
        Self {
            token_url: "http://localhost:8080/oauth/token".to_string(),
            timeout: Duration::from_secs(10),
        }
    }
}

impl From<&crate::config::AuthSection> for OAuthConfig {
    fn from(section: &crate::config::AuthSection) -> Self {
        Self {
            token_url: section.token_url.clone(),
            timeout: Duration::from_millis(section.timeout_ms),
        }
    }
}

/// Device-code credential provider backed by an OAuth2 token endpoint
pub struct OAuthDeviceCodeProvider {
    config: OAuthConfig,
    client: Client,
}

impl OAuthDeviceCodeProvider {
    pub fn new(config: OAuthConfig) -> Result<Self, CredentialError> {
        if config.token_url.is_empty() {
            return Err(CredentialError::NotConfigured(
                "token endpoint URL is required".to_string(),
            ));
        }

        let client = Client::builder()
            .timeout(config.timeout)
            .build()
            .map_err(|e| CredentialError::Network(e.to_string()))?;

        Ok(Self { config, client })
    }

    /// Form body of the token request (pure function)
    fn build_token_form(identity: &DeviceIdentity) -> Vec<(&'static str, &str)> {
        vec![
            ("grant_type", DEVICE_CODE_GRANT_TYPE),
            ("device_code", identity.device_code.as_str()),
            ("client_id", identity.client_id.as_str()),
        ]
    }

    /// Validate a decoded token response (pure function)
    fn validate_credential(
        credential: AccessCredential,
    ) -> Result<AccessCredential, CredentialError> {
        if credential.access_token.trim().is_empty() {
            return Err(CredentialError::EmptyToken);
        }
        Ok(credential)
    }
}

#[async_trait]
impl CredentialProvider for OAuthDeviceCodeProvider {
    async fn exchange(
        &self,
        identity: &DeviceIdentity,
    ) -> Result<AccessCredential, CredentialError> {
        info!(
            client_id = %identity.client_id,
            token_url = %self.config.token_url,
            "Exchanging device code for access token"
        );

        let response = self
            .client
            .post(&self.config.token_url)
            .basic_auth(&identity.client_id, Some(&identity.client_secret))
            .header("Accept", "application/json")
            .form(&Self::build_token_form(identity))
            .send()
            .await
            .map_err(|e| CredentialError::Network(sanitize_error_message(&e.to_string())))?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            let body = sanitize_error_message(&body);
            error!(status = status.as_u16(), "Device code exchange rejected");
            return Err(CredentialError::Rejected {
                status: status.as_u16(),
                body,
            });
        }

        let credential: AccessCredential = response
            .json()
            .await
            .map_err(|e| CredentialError::InvalidResponse(e.to_string()))?;
        let credential = Self::validate_credential(credential)?;

        debug!(
            has_refresh_token = credential.refresh_token.is_some(),
            "Access token obtained"
        );
        Ok(credential)
    }

    fn name(&self) -> &str {
        "oauth2-device-code"
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_token_form_fields() {
        let identity = DeviceIdentity::new("test-client", "test", "abc");
        let form = OAuthDeviceCodeProvider::build_token_form(&identity);

        assert_eq!(form[0], ("grant_type", DEVICE_CODE_GRANT_TYPE));
        assert_eq!(form[1], ("device_code", "abc"));
        assert_eq!(form[2], ("client_id", "test-client"));
        // The secret travels in the Authorization header only
        assert!(form.iter().all(|(_, v)| *v != "test"));
    }

    #[test]
    fn test_empty_token_rejected() {
        let result =
            OAuthDeviceCodeProvider::validate_credential(AccessCredential::new("  ", None));
        assert!(matches!(result, Err(CredentialError::EmptyToken)));
    }

    #[test]
    fn test_empty_token_url_not_configured() {
        let result = OAuthDeviceCodeProvider::new(OAuthConfig {
            token_url: String::new(),
            timeout: Duration::from_secs(1),
        });
        assert!(matches!(result, Err(CredentialError::NotConfigured(_))));
    }

    #[test]
    fn test_config_from_auth_section() {
        let section = crate::config::AuthSection {
            token_url: "https://auth.example.com/token".to_string(),
            timeout_ms: 2500,
        };
        let config = OAuthConfig::from(&section);
        assert_eq!(config.token_url, "https://auth.example.com/token");
        assert_eq!(config.timeout, Duration::from_millis(2500));
    }
}
