//! Per-"open service" state machine.
//!
//! One [`AccessSession`] exists per user action that opens a service window.
//! It composes the access recorder, heartbeat emitter, and close watcher,
//! and guarantees the lifecycle invariants:
//!
//! - `Idle → Recording → Active → Ending → Ended`, never backwards and never
//!   out of `Ended`;
//! - at most one heartbeat and one close-watch timer per session, cancelled
//!   together and only together;
//! - exactly one end-session call, no matter how many teardown paths run.
//!
//! A new user action always constructs a fresh session with a fresh token.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use parking_lot::Mutex;
use tokio::sync::watch;

use crate::backend::PortalClient;
use crate::heartbeat::{Heartbeat, DEFAULT_HEARTBEAT_INTERVAL};
use crate::identity::SessionIdentityStore;
use crate::protocol::SessionToken;
use crate::recorder::{record_access, AccessRecord};
use crate::watcher::{CloseWatcher, DEFAULT_CLOSE_POLL};
use crate::window::ServiceWindow;

/// Observable lifecycle state.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionState {
    Idle,
    Recording,
    Active,
    Ending,
    Ended,
}

/// Timer cadences for one session. Split out so tests can shrink them.
#[derive(Debug, Clone, Copy)]
pub struct SessionTimers {
    pub heartbeat_interval: Duration,
    pub close_poll: Duration,
}

impl Default for SessionTimers {
    fn default() -> Self {
        Self {
            heartbeat_interval: DEFAULT_HEARTBEAT_INTERVAL,
            close_poll: DEFAULT_CLOSE_POLL,
        }
    }
}

/// A live (or finished) access session.
pub struct AccessSession {
    service_id: String,
    token: SessionToken,
    client: PortalClient,
    state_tx: watch::Sender<SessionState>,
    heartbeat: Mutex<Option<Heartbeat>>,
    watcher: Mutex<Option<CloseWatcher>>,
    /// At-most-once guard for the end-session call.
    end_issued: AtomicBool,
    /// Outcome of the access record, kept for callers that care whether
    /// telemetry actually landed.
    record: AccessRecord,
}

impl AccessSession {
    /// Run the open-service flow.
    ///
    /// Records the access (always proceeds, success or fallback), then calls
    /// `open_window`. If the window opens, both timers start and the session
    /// is `Active`; if it does not (the popup-blocked case), no timers are
    /// started and the session ends immediately, still issuing its single
    /// end call.
    pub async fn open<F>(
        client: PortalClient,
        identity: &SessionIdentityStore,
        service_id: &str,
        timers: SessionTimers,
        open_window: F,
    ) -> Arc<Self>
    where
        F: FnOnce() -> std::io::Result<Arc<dyn ServiceWindow>>,
    {
        let (state_tx, _) = watch::channel(SessionState::Idle);
        state_tx.send_replace(SessionState::Recording);
        let record = record_access(&client, identity, service_id, None).await;

        let session = Arc::new(Self {
            service_id: service_id.to_string(),
            token: record.session_id.clone(),
            client,
            state_tx,
            heartbeat: Mutex::new(None),
            watcher: Mutex::new(None),
            end_issued: AtomicBool::new(false),
            record,
        });

        let window = match open_window() {
            Ok(w) => w,
            Err(e) => {
                tracing::warn!(
                    service_id,
                    "service window failed to open, ending session: {e}"
                );
                session.finish().await;
                return session;
            }
        };

        session.state_tx.send_replace(SessionState::Active);

        let hb = Heartbeat::spawn(
            session.client.clone(),
            session.token.clone(),
            timers.heartbeat_interval,
            window.clone(),
        );
        *session.heartbeat.lock() = Some(hb);

        let on_closed = {
            let session = session.clone();
            move || {
                tokio::spawn(async move {
                    tracing::debug!(
                        service_id = %session.service_id,
                        "service window closed"
                    );
                    session.finish().await;
                });
            }
        };
        let watcher = CloseWatcher::spawn(window, timers.close_poll, on_closed);
        *session.watcher.lock() = Some(watcher);

        session
    }

    /// The session token in effect (server-assigned, or local fallback).
    pub fn token(&self) -> &SessionToken {
        &self.token
    }

    pub fn service_id(&self) -> &str {
        &self.service_id
    }

    /// The access-record outcome for this session.
    pub fn record(&self) -> &AccessRecord {
        &self.record
    }

    /// Current lifecycle state.
    pub fn state(&self) -> SessionState {
        *self.state_tx.borrow()
    }

    /// Subscribe to state transitions.
    pub fn subscribe(&self) -> watch::Receiver<SessionState> {
        self.state_tx.subscribe()
    }

    /// Tear the session down: cancel both timers together and issue the
    /// single end-session call.
    ///
    /// Safe to call any number of times, from the close watcher, from an
    /// unmounting dashboard, or from both in the same turn; only the first
    /// call does work. End-call failure is logged and swallowed; the
    /// terminal state is reached regardless (the window is already gone,
    /// there is nothing left to coordinate).
    pub async fn finish(&self) {
        if self.end_issued.swap(true, Ordering::AcqRel) {
            return;
        }
        self.state_tx.send_replace(SessionState::Ending);

        // Joint cancellation: neither timer may outlive the other.
        if let Some(hb) = self.heartbeat.lock().take() {
            hb.cancel();
        }
        if let Some(w) = self.watcher.lock().take() {
            w.cancel();
        }

        if let Err(e) = self.client.end_session(&self.token).await {
            tracing::warn!(session_id = %self.token, "failed to end session: {e}");
        }
        self.state_tx.send_replace(SessionState::Ended);
    }
}

impl std::fmt::Debug for AccessSession {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AccessSession")
            .field("service_id", &self.service_id)
            .field("token", &self.token)
            .field("state", &self.state())
            .finish_non_exhaustive()
    }
}
