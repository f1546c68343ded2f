//! Page-level presence session.
//!
//! The portal tracks "the dashboard is open" separately from "service X is
//! open": a `current_session_id` persisted per page, with its own heartbeat
//! and end call, entirely independent of the per-access tokens produced by
//! the recorder. The duplication is preserved here as two distinct concerns
//! until product intent says otherwise.

use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

use tokio_util::sync::CancellationToken;

use crate::backend::PortalClient;
use crate::protocol::SessionToken;
use crate::storage::{keys, SharedStore};

/// Heartbeat cadence for the page-level session. Same as per-access
/// heartbeats in the original.
pub const DEFAULT_PRESENCE_INTERVAL: Duration = Duration::from_secs(300);

/// A running page-presence session.
pub struct PagePresence {
    client: PortalClient,
    token: SessionToken,
    cancel: CancellationToken,
    ended: AtomicBool,
}

impl PagePresence {
    /// Re-read (or create and persist) `current_session_id` and start its
    /// heartbeat. Heartbeat failures are logged and swallowed; they never
    /// stop the timer.
    pub fn start(client: PortalClient, storage: &SharedStore, interval: Duration) -> Self {
        let token = match storage.get(keys::CURRENT_SESSION_ID) {
            Some(t) => t,
            None => {
                let t = uuid::Uuid::new_v4().to_string();
                if let Err(e) = storage.set(keys::CURRENT_SESSION_ID, &t) {
                    tracing::warn!("failed to persist page session id: {e}");
                }
                t
            }
        };

        let cancel = CancellationToken::new();
        let cancel_task = cancel.clone();
        let hb_client = client.clone();
        let hb_token = token.clone();
        tokio::spawn(async move {
            let mut ticker = tokio::time::interval(interval);
            ticker.tick().await;
            loop {
                tokio::select! {
                    _ = cancel_task.cancelled() => return,
                    _ = ticker.tick() => {
                        if let Err(e) = hb_client.heartbeat(&hb_token).await {
                            tracing::warn!("page presence heartbeat failed: {e}");
                        }
                    }
                }
            }
        });

        Self {
            client,
            token,
            cancel,
            ended: AtomicBool::new(false),
        }
    }

    pub fn token(&self) -> &SessionToken {
        &self.token
    }

    /// Stop the heartbeat and issue the single end call. Idempotent;
    /// end-call failure is logged and swallowed.
    pub async fn end(&self) {
        if self.ended.swap(true, Ordering::AcqRel) {
            return;
        }
        self.cancel.cancel();
        if let Err(e) = self.client.end_session(&self.token).await {
            tracing::warn!(session_id = %self.token, "failed to end page session: {e}");
        }
    }
}
