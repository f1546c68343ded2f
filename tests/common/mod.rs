#![allow(dead_code)]

//! Shared mock portal backend for integration tests.
//!
//! Stands up a real axum server on an ephemeral port implementing the
//! portal routes the telemetry engine consumes, with per-route counters and
//! switchable failure injection.

use std::collections::HashMap;
use std::net::SocketAddr;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Arc;

use axum::extract::{Path, Query, State};
use axum::http::StatusCode;
use axum::response::IntoResponse;
use axum::routing::{get, post, put};
use axum::{Json, Router};
use parking_lot::Mutex;

use svcwatch::backend::PortalClient;

/// Observable state of the mock portal.
#[derive(Default)]
pub struct PortalState {
    /// `(service_id, session_id)` pairs received on /services/access.
    pub accesses: Mutex<Vec<(String, String)>>,
    /// Session ids received on /services/heartbeat.
    pub heartbeats: Mutex<Vec<String>>,
    /// Session ids received on /services/session/end.
    pub ends: Mutex<Vec<String>>,
    /// Favorite writes `(service_id, value)`.
    pub favorite_writes: Mutex<Vec<(String, bool)>>,
    /// Group writes `(service_id, group_id)`.
    pub group_writes: Mutex<Vec<(String, Option<String>)>>,
    /// Token assigned to every recorded access (echoes the client's if None).
    pub assigned_token: Mutex<Option<String>>,
    /// When set, /services/status answers 500.
    pub status_failing: AtomicBool,
    /// When set, preference writes answer 500.
    pub writes_failing: AtomicBool,
    /// Whether verify-service-access allows.
    pub allow_access: AtomicBool,
    /// Number of /services/status calls served (success or not).
    pub status_calls: AtomicUsize,
    /// Catalog served by /services.
    pub services: Mutex<serde_json::Value>,
    /// Status map served by /services/status.
    pub status: Mutex<serde_json::Value>,
}

pub struct MockPortal {
    pub addr: SocketAddr,
    pub state: Arc<PortalState>,
}

impl MockPortal {
    pub async fn start() -> Self {
        let state = Arc::new(PortalState {
            allow_access: AtomicBool::new(true),
            services: Mutex::new(serde_json::json!([
                {"id": "svc-1", "name": "Notebook", "url": "http://10.0.0.1/", "protocol": "http"},
                {"id": "svc-2", "name": "Board", "url": "http://10.0.0.2/", "protocol": "http"}
            ])),
            status: Mutex::new(serde_json::json!({
                "svc-1": {"access": "available", "running": "online"},
                "svc-2": {"access": "unavailable", "running": "offline"}
            })),
            ..Default::default()
        });

        let app = Router::new()
            .route("/services", get(list_services))
            .route("/services/status", get(fetch_status))
            .route("/services/access", post(record_access))
            .route("/services/heartbeat", post(heartbeat))
            .route("/services/session/end", post(end_session))
            .route("/services/verify-service-access", get(verify_access))
            .route("/services/{id}/favorite", put(set_favorite))
            .route("/services/{id}/group", put(set_group))
            .with_state(state.clone());

        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        tokio::spawn(async move {
            axum::serve(listener, app).await.unwrap();
        });

        Self { addr, state }
    }

    pub fn client(&self) -> PortalClient {
        PortalClient::new(&format!("http://{}", self.addr), None)
    }

    pub fn assign_token(&self, token: &str) {
        *self.state.assigned_token.lock() = Some(token.to_string());
    }

    pub fn heartbeat_count(&self) -> usize {
        self.state.heartbeats.lock().len()
    }

    pub fn end_count(&self) -> usize {
        self.state.ends.lock().len()
    }
}

async fn list_services(State(state): State<Arc<PortalState>>) -> Json<serde_json::Value> {
    Json(state.services.lock().clone())
}

async fn fetch_status(State(state): State<Arc<PortalState>>) -> axum::response::Response {
    state.status_calls.fetch_add(1, Ordering::SeqCst);
    if state.status_failing.load(Ordering::SeqCst) {
        return StatusCode::INTERNAL_SERVER_ERROR.into_response();
    }
    Json(state.status.lock().clone()).into_response()
}

async fn record_access(
    State(state): State<Arc<PortalState>>,
    Json(body): Json<serde_json::Value>,
) -> Json<serde_json::Value> {
    let service_id = body["service_id"].as_str().unwrap_or_default().to_string();
    let session_id = body["session_id"].as_str().unwrap_or_default().to_string();
    state
        .accesses
        .lock()
        .push((service_id, session_id.clone()));
    let token = state
        .assigned_token
        .lock()
        .clone()
        .unwrap_or(session_id);
    Json(serde_json::json!({"session_id": token}))
}

async fn heartbeat(
    State(state): State<Arc<PortalState>>,
    Json(body): Json<serde_json::Value>,
) -> Json<serde_json::Value> {
    let session_id = body["session_id"].as_str().unwrap_or_default().to_string();
    state.heartbeats.lock().push(session_id);
    Json(serde_json::json!({}))
}

async fn end_session(
    State(state): State<Arc<PortalState>>,
    Json(body): Json<serde_json::Value>,
) -> Json<serde_json::Value> {
    let session_id = body["session_id"].as_str().unwrap_or_default().to_string();
    state.ends.lock().push(session_id);
    Json(serde_json::json!({}))
}

async fn verify_access(
    State(state): State<Arc<PortalState>>,
    Query(params): Query<HashMap<String, String>>,
) -> axum::response::Response {
    if !params.contains_key("serviceId") {
        return StatusCode::UNPROCESSABLE_ENTITY.into_response();
    }
    let allowed = state.allow_access.load(Ordering::SeqCst);
    Json(serde_json::json!({"allowed": allowed})).into_response()
}

async fn set_favorite(
    State(state): State<Arc<PortalState>>,
    Path(id): Path<String>,
    Json(body): Json<serde_json::Value>,
) -> axum::response::Response {
    if state.writes_failing.load(Ordering::SeqCst) {
        return StatusCode::INTERNAL_SERVER_ERROR.into_response();
    }
    let value = body["is_favorite"].as_bool().unwrap_or_default();
    state.favorite_writes.lock().push((id, value));
    Json(serde_json::json!({})).into_response()
}

async fn set_group(
    State(state): State<Arc<PortalState>>,
    Path(id): Path<String>,
    Json(body): Json<serde_json::Value>,
) -> axum::response::Response {
    if state.writes_failing.load(Ordering::SeqCst) {
        return StatusCode::INTERNAL_SERVER_ERROR.into_response();
    }
    let group = body["group_id"].as_str().map(str::to_string);
    state.group_writes.lock().push((id, group));
    Json(serde_json::json!({})).into_response()
}
