//! Wire types for the portal REST API and the catalog data model.
//!
//! The portal backend is authoritative for everything here except the
//! preference fields on [`ServiceRecord`] (`is_favorite`, `group_id`), which
//! may be locally overridden by the preference cache until the server
//! catches up.

use std::collections::HashMap;

use serde::{Deserialize, Serialize};

/// Opaque token correlating a client's access events server-side.
///
/// Generated client-side when the server does not supply one; otherwise
/// echoed back by the access-record response. Never reused across distinct
/// "open service" actions.
pub type SessionToken = String;

/// A catalog entry as served by `GET /services`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ServiceRecord {
    pub id: String,
    pub name: String,
    #[serde(default)]
    pub description: Option<String>,
    pub url: String,
    #[serde(default)]
    pub protocol: Option<String>,
    /// Group assignment. Absent when the server has no opinion; the
    /// preference cache fills it in from the last-known local value.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub group_id: Option<String>,
    /// Favorite flag. Same merge semantics as `group_id`.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub is_favorite: Option<bool>,
}

/// Whether the current user may reach a service through the proxy.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Availability {
    Available,
    Unavailable,
}

/// Whether the backing service process is up.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RunState {
    Online,
    Offline,
}

/// Server-sourced status for one service. Read-only to the client.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct ServiceStatus {
    pub access: Availability,
    pub running: RunState,
}

/// The aggregate map returned by `GET /services/status`.
pub type StatusSnapshot = HashMap<String, ServiceStatus>;

/// Body of `POST /services/access`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AccessRecordRequest {
    pub service_id: String,
    pub session_id: SessionToken,
}

/// Response of `POST /services/access`. The server may echo the submitted
/// token or assign its own; extra fields are ignored.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AccessRecordResponse {
    pub session_id: SessionToken,
}

/// Body of `POST /services/heartbeat` and `POST /services/session/end`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SessionRef {
    pub session_id: SessionToken,
}

/// Response of `GET /services/verify-service-access`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct VerifyAccessResponse {
    pub allowed: bool,
}

/// Body of `PUT /services/{id}/favorite`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SetFavoriteRequest {
    pub is_favorite: bool,
}

/// Body of `PUT /services/{id}/group`. `group_id: None` clears the
/// assignment.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SetGroupRequest {
    pub group_id: Option<String>,
}
