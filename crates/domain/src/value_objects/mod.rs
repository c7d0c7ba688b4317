//! Value Objects - Immutable, identity-less domain primitives

mod cache_key;
mod query_params;
mod tier;

pub use cache_key::{CacheKey, KEY_SEPARATOR, validate_operation};
pub use query_params::QueryParams;
pub use tier::Tier;
