//! Background expiry sweep
//!
//! Lazy expiry keeps expired entries around for stale reads. The sweeper
//! bounds how long: it periodically drops entries expired for longer than
//! the stale retention.

use std::sync::Arc;
use std::time::Duration;

use application::ports::TieredCachePort;
use tokio::task::JoinHandle;
use tracing::{debug, info};

/// Spawn a task purging entries expired for longer than `retention` every `interval`
///
/// Returns a `JoinHandle` that can be used to abort the task when shutting down.
///
/// # Panics
///
/// Panics if called outside of a tokio runtime or with a zero `interval`.
pub fn spawn_expiry_sweeper(
    cache: Arc<dyn TieredCachePort>,
    interval: Duration,
    retention: Duration,
) -> JoinHandle<()> {
    info!(
        interval_secs = interval.as_secs(),
        retention_secs = retention.as_secs(),
        "Starting cache expiry sweeper"
    );

    tokio::spawn(async move {
        let mut ticker = tokio::time::interval(interval);
        // Don't run immediately on startup
        ticker.tick().await;

        loop {
            ticker.tick().await;
            let removed = cache.purge_expired(retention);
            debug!(removed, "Expiry sweep complete");
        }
    })
}
