//! Periodic liveness signal for an open access session.
//!
//! The ordering invariant lives here: every tick consults the window's
//! closed flag before touching the network, so even if the heartbeat and
//! close-watch timers fire in the same scheduler turn, no heartbeat goes out
//! after closure was observable.

use std::sync::Arc;
use std::time::Duration;

use tokio_util::sync::CancellationToken;

use crate::backend::PortalClient;
use crate::window::ServiceWindow;

/// Default heartbeat cadence.
pub const DEFAULT_HEARTBEAT_INTERVAL: Duration = Duration::from_secs(300);

/// Handle to a running heartbeat task. Cancellation is explicit and
/// idempotent; the session controller cancels this jointly with the close
/// watcher.
pub struct Heartbeat {
    cancel: CancellationToken,
}

impl Heartbeat {
    /// Emit a heartbeat for `session_id` every `interval`.
    ///
    /// Network failures are logged and swallowed; a lost request never stops
    /// the timer. The window being closed is the only reason a tick does
    /// nothing, and cancellation the only reason the timer stops.
    pub fn spawn(
        client: PortalClient,
        session_id: String,
        interval: Duration,
        window: Arc<dyn ServiceWindow>,
    ) -> Self {
        let cancel = CancellationToken::new();
        let token = cancel.clone();
        tokio::spawn(async move {
            let mut ticker = tokio::time::interval(interval);
            // Skip the immediate first tick; the access record already told
            // the server the session is alive at t=0.
            ticker.tick().await;
            loop {
                tokio::select! {
                    _ = token.cancelled() => return,
                    _ = ticker.tick() => {
                        // Closed-check gates the network call (ordering
                        // invariant shared with the close watcher).
                        if window.closed() {
                            continue;
                        }
                        if let Err(e) = client.heartbeat(&session_id).await {
                            tracing::warn!(session_id, "heartbeat failed: {e}");
                        }
                    }
                }
            }
        });
        Self { cancel }
    }

    /// Stop the heartbeat. Idempotent.
    pub fn cancel(&self) {
        self.cancel.cancel();
    }
}
