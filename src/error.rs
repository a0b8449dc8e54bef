//! Top-level error type for the device
//!
//! Every module error folds into [`DeviceError`], which classifies itself as
//! transient, fatal or a shutdown and maps to the process exit status.

use crate::auth::CredentialError;
use crate::config::ConfigError;
use crate::device::ParamsError;
use crate::discovery::DiscoveryError;
use crate::telemetry::TelemetryError;
use crate::transport::MqttError;
use once_cell::sync::Lazy;
use regex::Regex;
use thiserror::Error;

/// Result alias used across the device flow
pub type DeviceResult<T> = Result<T, DeviceError>;

/// Main error type for a device run
#[derive(Debug, Error)]
pub enum DeviceError {
    #[error("Configuration error: {0}")]
    Config(#[from] ConfigError),

    #[error("Invocation error: {0}")]
    Params(#[from] ParamsError),

    #[error("Discovery error: {0}")]
    Discovery(#[from] DiscoveryError),

    #[error("Credential error: {0}")]
    Credential(#[from] CredentialError),

    #[error("Transport error: {0}")]
    Transport(#[from] MqttError),

    #[error("Telemetry error: {0}")]
    Telemetry(#[from] TelemetryError),
}

/// How an error should be treated by the caller
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FaultKind {
    /// Retried or tolerated in place
    Transient,
    /// Ends the run with a non-zero status
    Fatal,
    /// Orderly stop requested from outside
    Shutdown,
}

impl DeviceError {
    pub fn fault_kind(&self) -> FaultKind {
        match self {
            DeviceError::Discovery(DiscoveryError::ShutdownRequested) => FaultKind::Shutdown,
            DeviceError::Transport(MqttError::PublishRejected(_)) => FaultKind::Transient,
            _ => FaultKind::Fatal,
        }
    }

    /// Process exit status: 0 shutdown, 2 configuration, 3 credential, 4 transport, 1 other
    pub fn exit_code(&self) -> i32 {
        if self.fault_kind() == FaultKind::Shutdown {
            return 0;
        }
        match self {
            DeviceError::Config(_) | DeviceError::Params(_) | DeviceError::Discovery(_) => 2,
            DeviceError::Credential(_) => 3,
            DeviceError::Transport(_) | DeviceError::Telemetry(TelemetryError::SessionLost { .. }) => 4,
            DeviceError::Telemetry(_) => 1,
        }
    }

    /// Display text with secrets redacted, safe to log
    pub fn sanitized_message(&self) -> String {
        sanitize_error_message(&self.to_string())
    }
}

static SECRET_PATTERN: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"(?i)(password|token|key|secret)[=:]\s*\S+").expect("static regex")
});

static SENSITIVE_PATH_PATTERN: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"/[a-zA-Z0-9._/-]+/(secrets?|\.ssh|\.aws|\.config)/[a-zA-Z0-9._/-]+")
        .expect("static regex")
});

const MAX_MESSAGE_LEN: usize = 500;

/// Redact secrets and sensitive paths, then cap the length
pub fn sanitize_error_message(message: &str) -> String {
    let sanitized = SECRET_PATTERN.replace_all(message, "${1}=***");
    let mut sanitized = SENSITIVE_PATH_PATTERN
        .replace_all(&sanitized, "/***REDACTED***/")
        .into_owned();

    if sanitized.len() > MAX_MESSAGE_LEN {
        let mut cut = MAX_MESSAGE_LEN;
        while !sanitized.is_char_boundary(cut) {
            cut -= 1;
        }
        sanitized.truncate(cut);
        sanitized.push_str("...[truncated]");
    }

    sanitized
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::transport::ConnectionState;

    #[test]
    fn test_fault_kinds() {
        let shutdown = DeviceError::from(DiscoveryError::ShutdownRequested);
        assert_eq!(shutdown.fault_kind(), FaultKind::Shutdown);

        let rejected = DeviceError::from(MqttError::PublishRejected("full".to_string()));
        assert_eq!(rejected.fault_kind(), FaultKind::Transient);

        let lost = DeviceError::from(TelemetryError::SessionLost {
            state: ConnectionState::PermanentlyDisconnected("gone".to_string()),
        });
        assert_eq!(lost.fault_kind(), FaultKind::Fatal);
    }

    #[test]
    fn test_exit_codes() {
        let cases: Vec<(DeviceError, i32)> = vec![
            (DiscoveryError::ShutdownRequested.into(), 0),
            (ConfigError::InvalidConfig("bad".to_string()).into(), 2),
            (ParamsError::MissingDeviceCode.into(), 2),
            (DiscoveryError::NoBindings.into(), 2),
            (CredentialError::EmptyToken.into(), 3),
            (MqttError::InvalidBrokerAddress("x".to_string()).into(), 4),
            (
                TelemetryError::SessionLost {
                    state: ConnectionState::PermanentlyDisconnected("gone".to_string()),
                }
                .into(),
                4,
            ),
        ];

        for (error, expected) in cases {
            assert_eq!(error.exit_code(), expected, "wrong exit code for {error}");
        }
    }

    #[test]
    fn test_serialization_failure_is_generic_exit() {
        let serde_error = serde_json::from_str::<u8>("not json").unwrap_err();
        let error = DeviceError::from(TelemetryError::Serialization(serde_error));
        assert_eq!(error.exit_code(), 1);
    }

    #[test]
    fn test_sanitize_secrets() {
        let sanitized = sanitize_error_message("auth failed: token=abc123 secret: hunter2");
        assert!(!sanitized.contains("abc123"));
        assert!(!sanitized.contains("hunter2"));
        assert!(sanitized.contains("token=***"));
        assert!(sanitized.contains("secret=***"));
    }

    #[test]
    fn test_sanitize_case_insensitive() {
        let sanitized = sanitize_error_message("PASSWORD=letmein Key:xyz");
        assert!(!sanitized.contains("letmein"));
        assert!(!sanitized.contains("xyz"));
    }

    #[test]
    fn test_sanitize_sensitive_paths() {
        let sanitized = sanitize_error_message("cannot read /home/dev/.aws/credentials");
        assert!(sanitized.contains("/***REDACTED***/"));
        assert!(!sanitized.contains("credentials"));
    }

    #[test]
    fn test_sanitize_truncates_long_messages() {
        let sanitized = sanitize_error_message(&"x".repeat(600));
        assert!(sanitized.ends_with("...[truncated]"));
        assert_eq!(sanitized.len(), 500 + "...[truncated]".len());

        let exact = "y".repeat(500);
        assert_eq!(sanitize_error_message(&exact), exact);
    }

    #[test]
    fn test_sanitize_truncation_respects_char_boundaries() {
        let sanitized = sanitize_error_message(&"é".repeat(400));
        assert!(sanitized.ends_with("...[truncated]"));
    }

    #[test]
    fn test_sanitized_message_on_device_error() {
        let error = DeviceError::from(CredentialError::Rejected {
            status: 401,
            body: "bad client_secret=oops".to_string(),
        });
        assert!(!error.sanitized_message().contains("oops"));
    }
}
