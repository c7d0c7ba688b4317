//! Domain layer for ranking-cache
//!
//! Contains ranking entities, cache value objects, the pure numeric analytics
//! applied to market rankings, and domain errors.
//! This layer performs no I/O and defines the ubiquitous language.

pub mod analytics;
pub mod entities;
pub mod errors;
pub mod value_objects;

pub use entities::*;
pub use errors::DomainError;
pub use value_objects::*;
