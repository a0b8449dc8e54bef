//! Observability for the device: structured logging and run metrics.

pub mod logging;
pub mod metrics;

pub use logging::{init_default_logging, init_logging, LogFormat};
pub use metrics::{metrics, DeviceMetrics, MetricsSnapshot};

pub use logging::{device_span, mqtt_span};
