//! Port definitions for application layer
//!
//! Ports are interfaces that define how the application interacts with
//! external systems. Adapters in the infrastructure layer implement these ports.

mod alert_port;
mod sample_observer_port;
mod tiered_cache_port;

#[cfg(test)]
pub use alert_port::MockAlertPort;
pub use alert_port::{Alert, AlertKind, AlertPort};
#[cfg(test)]
pub use sample_observer_port::MockSampleObserverPort;
pub use sample_observer_port::SampleObserverPort;
#[cfg(test)]
pub use tiered_cache_port::MockTieredCachePort;
pub use tiered_cache_port::{
    CacheStats, TieredCachePort, TieredCachePortExt, decode_payload, encode_payload,
};
