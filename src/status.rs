//! Fixed-cadence polling of aggregate service status.
//!
//! The poller fetches `GET /services/status` once immediately on start and
//! then on a fixed interval, publishing each successful snapshot through a
//! `watch` channel. Failures are logged and the previous snapshot is
//! retained: a stale status beats flickering the whole dashboard to
//! unknown. Errors are expected to be transient, so there is no backoff.

use std::time::Duration;

use tokio::sync::watch;
use tokio_util::sync::CancellationToken;

use crate::backend::PortalClient;
use crate::protocol::StatusSnapshot;

/// Default dashboard polling cadence.
pub const DEFAULT_STATUS_INTERVAL: Duration = Duration::from_secs(30);
/// Cadence used by the user-monitoring view.
pub const MONITOR_STATUS_INTERVAL: Duration = Duration::from_secs(60);

/// Handle to a running status poller.
pub struct StatusPoller {
    rx: watch::Receiver<StatusSnapshot>,
    cancel: CancellationToken,
}

impl StatusPoller {
    /// Start polling on `interval`. The first fetch happens immediately.
    pub fn start(client: PortalClient, interval: Duration) -> Self {
        let (tx, rx) = watch::channel(StatusSnapshot::new());
        let cancel = CancellationToken::new();
        let token = cancel.clone();
        tokio::spawn(async move {
            let mut ticker = tokio::time::interval(interval);
            loop {
                tokio::select! {
                    _ = token.cancelled() => return,
                    _ = ticker.tick() => {
                        match client.fetch_status().await {
                            Ok(snapshot) => {
                                tx.send_replace(snapshot);
                            }
                            Err(e) => {
                                // Keep the last snapshot; just note the miss.
                                tracing::warn!("status poll failed: {e}");
                            }
                        }
                    }
                }
            }
        });
        Self { rx, cancel }
    }

    /// The most recently published snapshot (empty until the first
    /// successful fetch).
    pub fn latest(&self) -> StatusSnapshot {
        self.rx.borrow().clone()
    }

    /// Subscribe to snapshot updates. Only successful fetches produce a new
    /// value.
    pub fn subscribe(&self) -> watch::Receiver<StatusSnapshot> {
        self.rx.clone()
    }

    /// Stop polling. Idempotent.
    pub fn cancel(&self) {
        self.cancel.cancel();
    }
}
