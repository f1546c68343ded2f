//! Best-effort reporting that a service was opened.
//!
//! Recording is advisory: it must never block or fail the user action of
//! opening the service window. Every failure collapses into a typed
//! fallback carrying the locally known token.

use crate::backend::PortalClient;
use crate::identity::SessionIdentityStore;
use crate::protocol::SessionToken;

/// Outcome of an access record attempt.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RecordStatus {
    /// The server acknowledged the access.
    Recorded,
    /// The request failed; the session proceeds on the local token.
    Error,
}

/// Result of [`record_access`]. The session token is always present: either
/// the server's echoed/assigned token or the local one we tried to submit.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AccessRecord {
    pub status: RecordStatus,
    pub session_id: SessionToken,
}

/// Report `{service_id, session_id}` to the portal.
///
/// If `session_token` is `None`, a token is taken from the identity store
/// first. On success the server's token wins (it may differ from what we
/// sent). On any failure the error is logged and swallowed and the local
/// token is returned with `RecordStatus::Error`.
pub async fn record_access(
    client: &PortalClient,
    identity: &SessionIdentityStore,
    service_id: &str,
    session_token: Option<SessionToken>,
) -> AccessRecord {
    let local_token = session_token.unwrap_or_else(|| identity.get_or_create());
    match client.record_access(service_id, &local_token).await {
        Ok(resp) => AccessRecord {
            status: RecordStatus::Recorded,
            session_id: resp.session_id,
        },
        Err(e) => {
            tracing::warn!(service_id, "failed to record service access: {e}");
            AccessRecord {
                status: RecordStatus::Error,
                session_id: local_token,
            }
        }
    }
}
