//! Xcast Double – a stand-in for a device driven by the Xcast protocol
//!
//! This crate impersonates the receiving end of the RDK `org.rdk.Xcast`
//! application-lifecycle protocol so a controller can be exercised without
//! real hardware:
//! - Per-application lifecycle state machines (launch, hide, resume, stop, state query)
//! - Simulated completion latency with a serialized per-application action queue
//! - `onApplicationStateChanged` notifications with per-application sequence ids
//! - A JSON-RPC over WebSocket session that registers for the lifecycle events
//! - An optional operator console for forcing application state by hand

#![warn(missing_docs)]
#![warn(rust_2018_idioms)]

/// Lifecycle core: state machine, registry, routing and wire envelopes
pub mod device;

/// WebSocket session and operator console
pub mod service;

// Re-export key types for convenience
pub use device::{Device, DeviceConfig};

/// Current version of the crate
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
