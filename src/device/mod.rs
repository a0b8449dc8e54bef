//! The device run: invocation parameters and the lifecycle that composes
//! discovery, credential exchange, the broker session and the telemetry loop.

pub mod lifecycle;
pub mod params;

pub use lifecycle::{DeviceLifecycle, DeviceState};
pub use params::{InvocationParams, ParamsError, DEVICE_CODE_PARAM};
