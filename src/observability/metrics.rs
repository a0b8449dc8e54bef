//! Thread-safe device metrics
//!
//! Atomic counters shared between the main flow and the transport supervisor.
//! A snapshot is logged when the device shuts down.

use once_cell::sync::Lazy;
use serde::Serialize;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Mutex;
use std::time::{SystemTime, UNIX_EPOCH};

/// Global metrics collector instance
pub static METRICS: Lazy<DeviceMetrics> = Lazy::new(DeviceMetrics::new);

/// Get reference to global metrics collector
pub fn metrics() -> &'static DeviceMetrics {
    &METRICS
}

/// Counters for one device run
pub struct DeviceMetrics {
    discovery_polls: AtomicU64,

    mqtt_connected: AtomicBool,
    connection_attempts: AtomicU64,
    connections_established: AtomicU64,
    connection_failures: AtomicU64,
    reconnect_attempts: AtomicU64,

    messages_published: AtomicU64,
    publish_failures: AtomicU64,
    last_publish: AtomicU64,

    device_state: Mutex<String>,
    uptime_start: AtomicU64,
}

/// Point-in-time copy of the counters
#[derive(Debug, Clone, Serialize, PartialEq)]
pub struct MetricsSnapshot {
    pub device_state: String,
    pub uptime_seconds: u64,
    pub discovery_polls: u64,
    pub mqtt_connected: bool,
    pub connection_attempts: u64,
    pub connections_established: u64,
    pub connection_failures: u64,
    pub reconnect_attempts: u64,
    pub messages_published: u64,
    pub publish_failures: u64,
    pub last_publish: u64,
}

impl DeviceMetrics {
    pub fn new() -> Self {
        Self {
            discovery_polls: AtomicU64::new(0),
            mqtt_connected: AtomicBool::new(false),
            connection_attempts: AtomicU64::new(0),
            connections_established: AtomicU64::new(0),
            connection_failures: AtomicU64::new(0),
            reconnect_attempts: AtomicU64::new(0),
            messages_published: AtomicU64::new(0),
            publish_failures: AtomicU64::new(0),
            last_publish: AtomicU64::new(0),
            device_state: Mutex::new("idle".to_string()),
            uptime_start: AtomicU64::new(current_timestamp()),
        }
    }

    pub fn discovery_poll(&self) {
        self.discovery_polls.fetch_add(1, Ordering::Relaxed);
    }

    pub fn mqtt_connection_attempt(&self) {
        self.connection_attempts.fetch_add(1, Ordering::Relaxed);
    }

    pub fn mqtt_connection_established(&self) {
        self.connections_established.fetch_add(1, Ordering::Relaxed);
        self.mqtt_connected.store(true, Ordering::Relaxed);
    }

    pub fn mqtt_connection_failed(&self) {
        self.connection_failures.fetch_add(1, Ordering::Relaxed);
        self.mqtt_connected.store(false, Ordering::Relaxed);
    }

    pub fn mqtt_reconnect_attempt(&self) {
        self.reconnect_attempts.fetch_add(1, Ordering::Relaxed);
    }

    pub fn mqtt_connection_lost(&self) {
        self.mqtt_connected.store(false, Ordering::Relaxed);
    }

    pub fn message_published(&self) {
        self.messages_published.fetch_add(1, Ordering::Relaxed);
        self.last_publish
            .store(current_timestamp(), Ordering::Relaxed);
    }

    pub fn publish_failed(&self) {
        self.publish_failures.fetch_add(1, Ordering::Relaxed);
    }

    pub fn set_device_state(&self, state: &str) {
        if let Ok(mut current) = self.device_state.lock() {
            *current = state.to_string();
        }
    }

    pub fn snapshot(&self) -> MetricsSnapshot {
        let now = current_timestamp();
        let device_state = self
            .device_state
            .lock()
            .map(|s| s.clone())
            .unwrap_or_else(|_| "unknown".to_string());

        MetricsSnapshot {
            device_state,
            uptime_seconds: now.saturating_sub(self.uptime_start.load(Ordering::Relaxed)),
            discovery_polls: self.discovery_polls.load(Ordering::Relaxed),
            mqtt_connected: self.mqtt_connected.load(Ordering::Relaxed),
            connection_attempts: self.connection_attempts.load(Ordering::Relaxed),
            connections_established: self.connections_established.load(Ordering::Relaxed),
            connection_failures: self.connection_failures.load(Ordering::Relaxed),
            reconnect_attempts: self.reconnect_attempts.load(Ordering::Relaxed),
            messages_published: self.messages_published.load(Ordering::Relaxed),
            publish_failures: self.publish_failures.load(Ordering::Relaxed),
            last_publish: self.last_publish.load(Ordering::Relaxed),
        }
    }
}

impl Default for DeviceMetrics {
    fn default() -> Self {
        Self::new()
    }
}

fn current_timestamp() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_secs())
        .unwrap_or(0)
}
