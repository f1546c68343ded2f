//! Top-level composition: catalog + status + preferences + access sessions.
//!
//! A `Dashboard` is the Rust analogue of the portal's mounted dashboard
//! view. It owns the status poller, the page presence, the preference
//! cache, and every access session opened through it, and it tears all of
//! them down jointly on [`Dashboard::shutdown`] so no timer outlives the
//! view.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use parking_lot::Mutex;
use thiserror::Error;

use crate::backend::{BackendError, PortalClient};
use crate::identity::SessionIdentityStore;
use crate::prefs::PreferenceCache;
use crate::presence::PagePresence;
use crate::protocol::{ServiceRecord, ServiceStatus, StatusSnapshot};
use crate::session::{AccessSession, SessionState, SessionTimers};
use crate::status::StatusPoller;
use crate::storage::SharedStore;
use crate::window::ServiceWindow;

/// Polling/timer cadences for one dashboard instance.
#[derive(Debug, Clone, Copy)]
pub struct DashboardTimers {
    pub status_interval: Duration,
    pub presence_interval: Duration,
    pub session: SessionTimers,
}

impl Default for DashboardTimers {
    fn default() -> Self {
        Self {
            status_interval: crate::status::DEFAULT_STATUS_INTERVAL,
            presence_interval: crate::presence::DEFAULT_PRESENCE_INTERVAL,
            session: SessionTimers::default(),
        }
    }
}

/// A catalog row ready for display: the merged record plus the latest
/// server-reported status, if any has been fetched yet.
#[derive(Debug, Clone, PartialEq)]
pub struct DashboardEntry {
    pub record: ServiceRecord,
    pub status: Option<ServiceStatus>,
}

/// Failure to open a service. Unlike telemetry errors, these gate the user
/// action and are surfaced.
#[derive(Debug, Error)]
pub enum OpenError {
    #[error("access to service {0} is not allowed")]
    NotAllowed(String),
    #[error("could not verify access: {0}")]
    Verify(#[source] BackendError),
    #[error("dashboard is shut down")]
    ShutDown,
}

pub struct Dashboard {
    client: PortalClient,
    identity: SessionIdentityStore,
    prefs: PreferenceCache,
    poller: StatusPoller,
    presence: PagePresence,
    sessions: Mutex<Vec<Arc<AccessSession>>>,
    timers: DashboardTimers,
    shut_down: AtomicBool,
}

impl Dashboard {
    /// Mount the dashboard: starts the status poller (first fetch is
    /// immediate) and the page presence heartbeat.
    pub fn mount(client: PortalClient, storage: SharedStore, timers: DashboardTimers) -> Self {
        let identity = SessionIdentityStore::new(storage.clone());
        let prefs = PreferenceCache::new(storage.clone(), client.clone());
        let poller = StatusPoller::start(client.clone(), timers.status_interval);
        let presence = PagePresence::start(client.clone(), &storage, timers.presence_interval);
        Self {
            client,
            identity,
            prefs,
            poller,
            presence,
            sessions: Mutex::new(Vec::new()),
            timers,
            shut_down: AtomicBool::new(false),
        }
    }

    /// Fetch the catalog, merge cached preferences, and annotate each row
    /// with the latest status snapshot.
    ///
    /// Catalog fetch failures propagate: rendering the catalog is a primary
    /// action, not telemetry.
    pub async fn refresh(&self) -> Result<Vec<DashboardEntry>, BackendError> {
        let records = self.client.fetch_services().await?;
        let merged = self.prefs.merge(records);
        let snapshot = self.poller.latest();
        Ok(merged
            .into_iter()
            .map(|record| {
                let status = snapshot.get(&record.id).copied();
                DashboardEntry { record, status }
            })
            .collect())
    }

    /// Open a service: verify access, then run the full access-session flow
    /// against the window produced by `open_window`.
    ///
    /// The session is retained for joint teardown on shutdown. Finished
    /// sessions are pruned opportunistically.
    pub async fn open_service<F>(
        &self,
        service_id: &str,
        open_window: F,
    ) -> Result<Arc<AccessSession>, OpenError>
    where
        F: FnOnce() -> std::io::Result<Arc<dyn ServiceWindow>>,
    {
        if self.shut_down.load(Ordering::Acquire) {
            return Err(OpenError::ShutDown);
        }
        match self.client.verify_access(service_id).await {
            Ok(true) => {}
            Ok(false) => return Err(OpenError::NotAllowed(service_id.to_string())),
            Err(e) => return Err(OpenError::Verify(e)),
        }

        let session = AccessSession::open(
            self.client.clone(),
            &self.identity,
            service_id,
            self.timers.session,
            open_window,
        )
        .await;

        {
            let mut sessions = self.sessions.lock();
            sessions.retain(|s| s.state() != SessionState::Ended);
            sessions.push(session.clone());
        }
        // A shutdown that ran while we were opening has already drained the
        // registry; this session is ours to finish.
        if self.shut_down.load(Ordering::Acquire) {
            session.finish().await;
        }
        Ok(session)
    }

    /// Optimistically toggle a favorite (kept locally even if the server
    /// write fails).
    pub async fn set_favorite(&self, service_id: &str, value: bool) {
        self.prefs.set_favorite(service_id, value).await;
    }

    /// Optimistically set or clear a group assignment.
    pub async fn set_group(&self, service_id: &str, group_id: Option<&str>) {
        self.prefs.set_group(service_id, group_id).await;
    }

    /// Latest status snapshot (empty until the first successful poll).
    pub fn status(&self) -> StatusSnapshot {
        self.poller.latest()
    }

    /// Subscribe to status snapshot updates.
    pub fn subscribe_status(&self) -> tokio::sync::watch::Receiver<StatusSnapshot> {
        self.poller.subscribe()
    }

    /// Number of access sessions that have not yet ended.
    pub fn live_sessions(&self) -> usize {
        self.sessions
            .lock()
            .iter()
            .filter(|s| s.state() != SessionState::Ended)
            .count()
    }

    /// Unmount: cancel the status poller, end the page presence, and finish
    /// every outstanding access session. Idempotent; required so no
    /// interval keeps firing against a view that no longer exists.
    pub async fn shutdown(&self) {
        if self.shut_down.swap(true, Ordering::AcqRel) {
            return;
        }
        self.poller.cancel();
        self.presence.end().await;

        let sessions: Vec<_> = self.sessions.lock().drain(..).collect();
        for session in sessions {
            session.finish().await;
        }
    }
}
