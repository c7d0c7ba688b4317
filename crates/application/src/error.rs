//! Application-level errors

use std::sync::Arc;
use std::time::Duration;

use domain::{CacheKey, DomainError};
use thiserror::Error;

/// Error returned by an upstream fetch, shared between every waiter of one fetch
pub type SharedSource = Arc<dyn std::error::Error + Send + Sync + 'static>;

/// Errors that can occur in the application layer
///
/// Cloneable so that one fetch outcome can be handed to every coalesced
/// waiter.
#[derive(Debug, Clone, Error)]
pub enum ApplicationError {
    /// Domain-level error
    #[error(transparent)]
    Domain(#[from] DomainError),

    /// The upstream fetch returned an error
    #[error("Fetch failed for {key}: {source}")]
    FetchFailed {
        key: CacheKey,
        #[source]
        source: SharedSource,
    },

    /// The upstream fetch did not settle within its timeout
    #[error("Fetch timed out for {key} after {timeout:?}")]
    FetchTimeout { key: CacheKey, timeout: Duration },

    /// The fetch task ended without producing a result (panic or runtime shutdown)
    #[error("Fetch aborted for {key}: {reason}")]
    FetchAborted { key: CacheKey, reason: String },

    /// Payload could not be encoded or decoded
    #[error("Serialization error: {0}")]
    Serialization(String),

    /// Configuration error
    #[error("Configuration error: {0}")]
    Configuration(String),

    /// An alert sink rejected an alert
    #[error("Alert delivery failed: {0}")]
    AlertDelivery(String),

    /// Internal error
    #[error("Internal error: {0}")]
    Internal(String),
}

impl ApplicationError {
    /// Wrap an upstream error for `key`
    pub fn fetch_failed<E>(key: CacheKey, source: E) -> Self
    where
        E: std::error::Error + Send + Sync + 'static,
    {
        Self::FetchFailed {
            key,
            source: Arc::new(source),
        }
    }

    /// Check if this error is retryable
    pub const fn is_retryable(&self) -> bool {
        matches!(self, Self::FetchFailed { .. } | Self::FetchTimeout { .. })
    }

    /// Key of the fetch this error belongs to, if any
    pub const fn key(&self) -> Option<&CacheKey> {
        match self {
            Self::FetchFailed { key, .. }
            | Self::FetchTimeout { key, .. }
            | Self::FetchAborted { key, .. } => Some(key),
            _ => None,
        }
    }
}

impl From<serde_json::Error> for ApplicationError {
    fn from(err: serde_json::Error) -> Self {
        Self::Serialization(err.to_string())
    }
}
