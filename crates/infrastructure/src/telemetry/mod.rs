//! Logging infrastructure
//!
//! Installs the global `tracing` subscriber used by every layer.

mod logging;

pub use logging::{LoggingConfig, TelemetryError, build_filter, init_logging};
