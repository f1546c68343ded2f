//! The popped-out service window as an external, non-owned capability.
//!
//! We never model the window's content: the only things this crate can do
//! with a window are open it (at construction) and ask whether it has been
//! closed. There is no closure event to subscribe to, which is why the
//! close watcher polls.

use std::process::{Child, Command};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use parking_lot::Mutex;

/// A remote-service window. `closed()` must be cheap; it is polled on a
/// sub-second interval and consulted before every heartbeat tick.
pub trait ServiceWindow: Send + Sync {
    fn closed(&self) -> bool;
}

/// Window backed by a spawned viewer process (browser, `xdg-open` wrapper,
/// or anything that stays alive while the service is "open"). Closed means
/// the child has exited.
pub struct ProcessWindow {
    child: Mutex<Child>,
    /// Latched once `try_wait` reports exit so we never poll a reaped child.
    exited: AtomicBool,
}

impl ProcessWindow {
    /// Launch `viewer_cmd url` and treat the child's lifetime as the window
    /// lifetime. Spawn failure is the popup-blocked analogue and is reported
    /// to the caller rather than swallowed.
    pub fn open(viewer_cmd: &str, url: &str) -> std::io::Result<Self> {
        let mut parts = viewer_cmd.split_whitespace();
        let program = parts.next().ok_or_else(|| {
            std::io::Error::new(std::io::ErrorKind::InvalidInput, "empty viewer command")
        })?;
        let child = Command::new(program).args(parts).arg(url).spawn()?;
        tracing::debug!(pid = child.id(), %url, "opened service window");
        Ok(Self {
            child: Mutex::new(child),
            exited: AtomicBool::new(false),
        })
    }
}

impl ServiceWindow for ProcessWindow {
    fn closed(&self) -> bool {
        if self.exited.load(Ordering::Acquire) {
            return true;
        }
        let mut child = self.child.lock();
        match child.try_wait() {
            Ok(Some(_)) => {
                self.exited.store(true, Ordering::Release);
                true
            }
            Ok(None) => false,
            // If we can't query the child, assume the window is gone rather
            // than heartbeat forever against an unknown.
            Err(e) => {
                tracing::warn!("failed to query viewer process: {e}");
                self.exited.store(true, Ordering::Release);
                true
            }
        }
    }
}

/// Window whose closed flag is driven by the caller. Used by tests and by
/// CLI paths where "closing the window" is a ctrl-c.
#[derive(Clone, Default)]
pub struct ManualWindow {
    closed: Arc<AtomicBool>,
}

impl ManualWindow {
    pub fn new() -> Self {
        Self::default()
    }

    /// Mark the window closed. Idempotent.
    pub fn close(&self) {
        self.closed.store(true, Ordering::Release);
    }
}

impl ServiceWindow for ManualWindow {
    fn closed(&self) -> bool {
        self.closed.load(Ordering::Acquire)
    }
}
