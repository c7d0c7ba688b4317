//! Application layer - Use cases and orchestration
//!
//! Contains the fetch coordinator that fronts the upstream market-data source
//! with the tiered cache, the metrics recorder, the ranking analyzer and the
//! port definitions implemented by the infrastructure layer.

pub mod error;
pub mod ports;
pub mod services;

pub use error::ApplicationError;
pub use ports::*;
pub use services::*;
