//! Docshield Infrastructure Library
//!
//! Process-level plumbing shared by Docshield binaries:
//! - Telemetry initialization (tracing subscriber, compact or JSON output)
//! - Shutdown signal handling

#[cfg(feature = "observability-basic")]
pub mod telemetry;

pub mod signal;

#[cfg(feature = "observability-basic")]
pub use telemetry::{init_telemetry, shutdown_telemetry, TelemetryOptions};

pub use signal::shutdown_signal;
