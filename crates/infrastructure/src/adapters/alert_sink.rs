//! Alert sink adapters
//!
//! - `TracingAlertSink`: writes every alert as a `warn!` event
//! - `ChannelAlertSink`: hands alerts to an async consumer over a bounded channel
//!
//! Both return immediately; the recorder calls them on its recording path.

use application::ports::{Alert, AlertPort};
use application::ApplicationError;
use tokio::sync::mpsc;
use tracing::warn;

/// Logs alerts through `tracing`
#[derive(Debug, Clone, Copy, Default)]
pub struct TracingAlertSink;

impl TracingAlertSink {
    #[must_use]
    pub const fn new() -> Self {
        Self
    }
}

impl AlertPort for TracingAlertSink {
    fn notify(&self, alert: &Alert) -> Result<(), ApplicationError> {
        warn!(
            kind = %alert.kind,
            observed = alert.observed,
            threshold = alert.threshold,
            raised_at = %alert.raised_at.to_rfc3339(),
            "{}",
            alert.message
        );
        Ok(())
    }
}

/// Forwards alerts into a bounded tokio channel
///
/// Never waits for capacity: a full or closed channel is reported as
/// [`ApplicationError::AlertDelivery`] and the alert is dropped.
#[derive(Debug, Clone)]
pub struct ChannelAlertSink {
    sender: mpsc::Sender<Alert>,
}

impl ChannelAlertSink {
    /// Create a sink and the receiver consuming its alerts
    #[must_use]
    pub fn channel(capacity: usize) -> (Self, mpsc::Receiver<Alert>) {
        let (sender, receiver) = mpsc::channel(capacity.max(1));
        (Self { sender }, receiver)
    }

    /// Wrap an existing sender
    #[must_use]
    pub const fn new(sender: mpsc::Sender<Alert>) -> Self {
        Self { sender }
    }
}

impl AlertPort for ChannelAlertSink {
    fn notify(&self, alert: &Alert) -> Result<(), ApplicationError> {
        self.sender.try_send(alert.clone()).map_err(|e| match e {
            mpsc::error::TrySendError::Full(alert) => ApplicationError::AlertDelivery(format!(
                "alert channel full, dropped {} alert",
                alert.kind
            )),
            mpsc::error::TrySendError::Closed(alert) => ApplicationError::AlertDelivery(format!(
                "alert channel closed, dropped {} alert",
                alert.kind
            )),
        })
    }
}
