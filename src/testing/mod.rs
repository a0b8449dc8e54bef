//! Testing utilities and mock implementations
//!
//! Mocks for the credential exchange and the broker session, so the device
//! flow can be tested without network services.

pub mod mocks;

pub use mocks::*;
