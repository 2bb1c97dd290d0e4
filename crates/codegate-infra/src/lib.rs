//! Codegate Infrastructure Library
//!
//! Shared runtime pieces used by the Codegate binaries:
//! - Telemetry initialization (tracing subscriber)
//! - Shutdown signal handling

pub mod signal;
pub mod telemetry;

pub use signal::shutdown_signal;
pub use telemetry::{init_telemetry, shutdown_telemetry, TelemetryError};
