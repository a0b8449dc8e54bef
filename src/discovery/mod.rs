//! Broker and topic discovery from the runtime binding file
//!
//! The platform drops a binding file into the device's working directory some
//! time after the device starts. Discovery waits for it with bounded polling,
//! then parses it and selects the active topic and broker.
//!
//! - [`binding`] - pure parsing and selection
//! - [`watcher`] - polling for the file under a timeout and shutdown signal

use thiserror::Error;

pub mod binding;
pub mod watcher;

pub use binding::{parse_bindings, select_binding, BindingEntry, BrokerAddress, TopicBinding};
pub use watcher::{BindingDiscovery, PollSchedule, ResolvedBinding};

/// Discovery failures
///
/// Only the file being absent or still empty is transient, and that case never
/// surfaces as an error: it is retried until the timeout converts it into [`DiscoveryError::Timeout`].
#[derive(Debug, Error)]
pub enum DiscoveryError {
    #[error("Binding file malformed at line {line}: {reason}")]
    Malformed { line: usize, reason: String },
    #[error("Invalid topic '{topic}': {reason}")]
    InvalidTopic { topic: String, reason: String },
    #[error("Binding file contains no bindings")]
    NoBindings,
    #[error("Binding file {path} did not appear within {waited_secs}s")]
    Timeout { path: String, waited_secs: u64 },
    #[error("Failed to read binding file {path}: {source}")]
    Read {
        path: String,
        #[source]
        source: std::io::Error,
    },
    #[error("Shutdown requested while waiting for binding file")]
    ShutdownRequested,
}
