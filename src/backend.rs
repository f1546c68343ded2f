//! HTTP client for the portal backend.
//!
//! One method per REST endpoint, all returning `Result<_, BackendError>`.
//! The error taxonomy matters more than the payloads here: telemetry callers
//! (recorder, heartbeat, session end, status poll) swallow every variant,
//! while user-facing callers (the `status` subcommand, verify-access) surface
//! them.

use std::time::Duration;

use thiserror::Error;

use crate::protocol::*;

/// Default per-request timeout for all portal calls. Telemetry requests are
/// fire-and-forget; a hung request must not accumulate.
pub const DEFAULT_REQUEST_TIMEOUT: Duration = Duration::from_secs(5);

/// Classified failure from a portal request.
#[derive(Debug, Error)]
pub enum BackendError {
    /// The request never completed (connect failure, timeout, DNS).
    #[error("portal unreachable: {0}")]
    Network(#[source] reqwest::Error),
    /// 401/403 - credentials missing or rejected. Telemetry paths log this
    /// and move on; they never trigger a credential clear or redirect.
    #[error("portal rejected credentials (status {0})")]
    Auth(u16),
    /// 404 - typically a misconfigured endpoint path.
    #[error("portal endpoint not found: {0}")]
    NotFound(String),
    /// 422 - malformed body. Not expected on telemetry calls.
    #[error("portal rejected request body: {0}")]
    Validation(String),
    /// Any other non-2xx status.
    #[error("portal returned unexpected status {0}")]
    Status(u16),
    /// 2xx with a body we could not decode.
    #[error("failed to decode portal response: {0}")]
    Decode(#[source] reqwest::Error),
}

impl BackendError {
    /// Classify a non-2xx response status.
    fn from_status(status: reqwest::StatusCode, path: &str) -> Self {
        match status.as_u16() {
            401 | 403 => BackendError::Auth(status.as_u16()),
            404 => BackendError::NotFound(path.to_string()),
            422 => BackendError::Validation(path.to_string()),
            code => BackendError::Status(code),
        }
    }
}

/// Client for the portal REST API.
///
/// Cheap to clone; the inner `reqwest::Client` is an Arc internally.
#[derive(Clone)]
pub struct PortalClient {
    http: reqwest::Client,
    base_url: String,
    token: Option<String>,
}

impl PortalClient {
    /// Build a client against `base_url` (no trailing slash required) with
    /// the default request timeout.
    pub fn new(base_url: &str, token: Option<String>) -> Self {
        Self::with_timeout(base_url, token, DEFAULT_REQUEST_TIMEOUT)
    }

    pub fn with_timeout(base_url: &str, token: Option<String>, timeout: Duration) -> Self {
        let http = match reqwest::Client::builder().timeout(timeout).build() {
            Ok(http) => http,
            Err(e) => {
                tracing::warn!("failed to build HTTP client, falling back to defaults without the request timeout: {e}");
                reqwest::Client::default()
            }
        };
        Self {
            http,
            base_url: base_url.trim_end_matches('/').to_string(),
            token,
        }
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    fn url(&self, path: &str) -> String {
        format!("{}{}", self.base_url, path)
    }

    fn apply_auth(&self, req: reqwest::RequestBuilder) -> reqwest::RequestBuilder {
        match &self.token {
            Some(t) => req.bearer_auth(t),
            None => req,
        }
    }

    async fn post_json<B, T>(&self, path: &str, body: &B) -> Result<T, BackendError>
    where
        B: serde::Serialize,
        T: serde::de::DeserializeOwned,
    {
        let req = self.apply_auth(self.http.post(self.url(path))).json(body);
        let resp = req.send().await.map_err(BackendError::Network)?;
        if !resp.status().is_success() {
            return Err(BackendError::from_status(resp.status(), path));
        }
        resp.json().await.map_err(BackendError::Decode)
    }

    async fn get_json<T>(&self, path: &str) -> Result<T, BackendError>
    where
        T: serde::de::DeserializeOwned,
    {
        let req = self.apply_auth(self.http.get(self.url(path)));
        let resp = req.send().await.map_err(BackendError::Network)?;
        if !resp.status().is_success() {
            return Err(BackendError::from_status(resp.status(), path));
        }
        resp.json().await.map_err(BackendError::Decode)
    }

    /// `POST /services/access` - report that a service was opened.
    pub async fn record_access(
        &self,
        service_id: &str,
        session_id: &str,
    ) -> Result<AccessRecordResponse, BackendError> {
        self.post_json(
            "/services/access",
            &AccessRecordRequest {
                service_id: service_id.to_string(),
                session_id: session_id.to_string(),
            },
        )
        .await
    }

    /// `POST /services/heartbeat` - reassert liveness of an open session.
    pub async fn heartbeat(&self, session_id: &str) -> Result<(), BackendError> {
        let _: serde_json::Value = self
            .post_json(
                "/services/heartbeat",
                &SessionRef {
                    session_id: session_id.to_string(),
                },
            )
            .await?;
        Ok(())
    }

    /// `POST /services/session/end` - finalize a session.
    pub async fn end_session(&self, session_id: &str) -> Result<(), BackendError> {
        let _: serde_json::Value = self
            .post_json(
                "/services/session/end",
                &SessionRef {
                    session_id: session_id.to_string(),
                },
            )
            .await?;
        Ok(())
    }

    /// `GET /services/status` - aggregate availability for all services.
    pub async fn fetch_status(&self) -> Result<StatusSnapshot, BackendError> {
        self.get_json("/services/status").await
    }

    /// `GET /services/verify-service-access?serviceId=` - pre-open check.
    pub async fn verify_access(&self, service_id: &str) -> Result<bool, BackendError> {
        let path = format!("/services/verify-service-access?serviceId={service_id}");
        let resp: VerifyAccessResponse = self.get_json(&path).await?;
        Ok(resp.allowed)
    }

    /// `GET /services` - the catalog visible to the current user.
    pub async fn fetch_services(&self) -> Result<Vec<ServiceRecord>, BackendError> {
        self.get_json("/services").await
    }

    /// `PUT /services/{id}/favorite` - best-effort preference write.
    pub async fn set_favorite(&self, service_id: &str, value: bool) -> Result<(), BackendError> {
        let path = format!("/services/{service_id}/favorite");
        let req = self
            .apply_auth(self.http.put(self.url(&path)))
            .json(&SetFavoriteRequest { is_favorite: value });
        let resp = req.send().await.map_err(BackendError::Network)?;
        if !resp.status().is_success() {
            return Err(BackendError::from_status(resp.status(), &path));
        }
        Ok(())
    }

    /// `PUT /services/{id}/group` - best-effort preference write.
    pub async fn set_group(
        &self,
        service_id: &str,
        group_id: Option<&str>,
    ) -> Result<(), BackendError> {
        let path = format!("/services/{service_id}/group");
        let req = self
            .apply_auth(self.http.put(self.url(&path)))
            .json(&SetGroupRequest {
                group_id: group_id.map(str::to_string),
            });
        let resp = req.send().await.map_err(BackendError::Network)?;
        if !resp.status().is_success() {
            return Err(BackendError::from_status(resp.status(), &path));
        }
        Ok(())
    }
}

impl std::fmt::Debug for PortalClient {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PortalClient")
            .field("base_url", &self.base_url)
            .field("token", &self.token.as_ref().map(|_| "<redacted>"))
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn network_error_on_unreachable_host() {
        // Reserved TEST-NET address; connect fails fast.
        let client = PortalClient::with_timeout(
            "http://192.0.2.1:9",
            None,
            Duration::from_millis(200),
        );
        let err = client.heartbeat("tok").await.unwrap_err();
        assert!(matches!(err, BackendError::Network(_)), "got {err:?}");
    }

    #[tokio::test]
    async fn configured_timeout_bounds_slow_requests() {
        use axum::routing::get;
        let app = axum::Router::new().route(
            "/services/status",
            get(|| async {
                tokio::time::sleep(Duration::from_millis(500)).await;
                axum::Json(serde_json::json!({}))
            }),
        );
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        tokio::spawn(async move {
            axum::serve(listener, app).await.unwrap();
        });

        let client = PortalClient::with_timeout(
            &format!("http://{addr}"),
            None,
            Duration::from_millis(100),
        );
        let err = client.fetch_status().await.unwrap_err();
        assert!(matches!(err, BackendError::Network(_)), "got {err:?}");
    }

    #[test]
    fn base_url_trailing_slash_is_stripped() {
        let client = PortalClient::new("http://portal.local/", None);
        assert_eq!(client.base_url(), "http://portal.local");
        assert_eq!(client.url("/services"), "http://portal.local/services");
    }

    #[test]
    fn status_classification() {
        let auth = BackendError::from_status(reqwest::StatusCode::UNAUTHORIZED, "/x");
        assert!(matches!(auth, BackendError::Auth(401)));
        let nf = BackendError::from_status(reqwest::StatusCode::NOT_FOUND, "/x");
        assert!(matches!(nf, BackendError::NotFound(_)));
        let val = BackendError::from_status(reqwest::StatusCode::UNPROCESSABLE_ENTITY, "/x");
        assert!(matches!(val, BackendError::Validation(_)));
        let other = BackendError::from_status(reqwest::StatusCode::BAD_GATEWAY, "/x");
        assert!(matches!(other, BackendError::Status(502)));
    }

    #[test]
    fn debug_redacts_token() {
        let client = PortalClient::new("http://portal.local", Some("secret".into()));
        let rendered = format!("{client:?}");
        assert!(!rendered.contains("secret"));
    }
}
