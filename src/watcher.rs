//! Window-close detection by polling.
//!
//! The window capability exposes no closure event, so a short fixed-interval
//! poll of `closed()` stands in for one. One second keeps end-of-session
//! latency acceptable for reporting without measurable CPU cost.

use std::sync::Arc;
use std::time::Duration;

use tokio_util::sync::CancellationToken;

use crate::window::ServiceWindow;

/// Default poll interval for `closed()` checks.
pub const DEFAULT_CLOSE_POLL: Duration = Duration::from_secs(1);

/// Handle to a running close-watch task.
///
/// Dropping the handle does NOT cancel the watch; teardown is explicit via
/// [`CloseWatcher::cancel`], which the session controller calls jointly with
/// the heartbeat's.
pub struct CloseWatcher {
    cancel: CancellationToken,
}

impl CloseWatcher {
    /// Start polling `window.closed()` every `poll`. On the first observed
    /// `true`, invoke `on_closed` exactly once and stop. Cancellation before
    /// closure suppresses the callback.
    pub fn spawn<F>(window: Arc<dyn ServiceWindow>, poll: Duration, on_closed: F) -> Self
    where
        F: FnOnce() + Send + 'static,
    {
        let cancel = CancellationToken::new();
        let token = cancel.clone();
        tokio::spawn(async move {
            let mut ticker = tokio::time::interval(poll);
            // The immediate first tick would fire the callback before the
            // window had any chance to exist; skip it.
            ticker.tick().await;
            loop {
                tokio::select! {
                    _ = token.cancelled() => return,
                    _ = ticker.tick() => {
                        if window.closed() {
                            on_closed();
                            return;
                        }
                    }
                }
            }
        });
        Self { cancel }
    }

    /// Stop the watch. Idempotent; a no-op after the callback already fired
    /// or after a previous cancel.
    pub fn cancel(&self) {
        self.cancel.cancel();
    }
}
