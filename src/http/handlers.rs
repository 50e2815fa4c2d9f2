//! Page routes guarded by the admission gate.

use axum::extract::{ConnectInfo, Path, State};
use axum::http::{HeaderMap, HeaderValue};
use axum::response::Html;
use axum::routing::get;
use axum::{Json, Router};
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;
use tower_http::timeout::TimeoutLayer;
use tracing::{debug, instrument};

use super::error::ApiError;
use crate::admission::{AdmissionGate, AdmissionTicket, ClientIdentity};
use crate::backend::PageBackend;
use crate::error::AdmissionError;
use crate::metrics::PageCalls;

/// Upper bound on handling a single request.
const REQUEST_TIMEOUT: Duration = Duration::from_secs(10);

const X_FORWARDED_FOR: &str = "x-forwarded-for";
const X_REAL_IP: &str = "x-real-ip";

/// Shared state for page handlers.
#[derive(Clone)]
pub struct AppState {
    pub gate: AdmissionGate,
    pub backend: Arc<dyn PageBackend>,
    pub page_calls: Arc<PageCalls>,
    /// Prefer forwarding headers over the socket peer address
    pub trust_forwarded_headers: bool,
}

impl AppState {
    /// Admit the request or explain why not.
    async fn admit(
        &self,
        headers: &HeaderMap,
        peer: SocketAddr,
    ) -> Result<AdmissionTicket, ApiError> {
        let admitted = match self.forwarded_identity(headers)? {
            Some(identity) => self.gate.admit_identity(identity).await,
            None => self.gate.admit(&peer.to_string()).await,
        };

        admitted.map_err(|err| match err {
            AdmissionError::RateLimitExceeded => ApiError::RateLimited {
                retry_after: self.gate.retry_after(),
            },
            other => ApiError::Admission(other),
        })
    }

    /// Identity from the first non-blank forwarding header, if trusted.
    fn forwarded_identity(
        &self,
        headers: &HeaderMap,
    ) -> Result<Option<ClientIdentity>, AdmissionError> {
        if !self.trust_forwarded_headers {
            return Ok(None);
        }

        let Some(value) = [X_FORWARDED_FOR, X_REAL_IP]
            .into_iter()
            .filter_map(|name| headers.get(name))
            .find(|value| !is_blank(value))
        else {
            return Ok(None);
        };

        let value = value.to_str().map_err(|_| AdmissionError::IdentityParse {
            addr: String::from_utf8_lossy(value.as_bytes()).into_owned(),
            reason: "forwarding header is not valid text",
        })?;
        ClientIdentity::from_forwarded(value).map(Some)
    }
}

fn is_blank(value: &HeaderValue) -> bool {
    value.as_bytes().iter().all(u8::is_ascii_whitespace)
}

/// Build the page router.
pub fn create_router(state: AppState) -> Router {
    Router::new()
        .route("/recognition/:id", get(recognition_page))
        .route("/lyrics/:id", get(lyrics))
        .layer(TimeoutLayer::new(REQUEST_TIMEOUT))
        .with_state(state)
}

#[instrument(skip_all, fields(peer = %peer, id = %id))]
async fn recognition_page(
    State(state): State<AppState>,
    ConnectInfo(peer): ConnectInfo<SocketAddr>,
    headers: HeaderMap,
    Path(id): Path<String>,
) -> Result<Html<String>, ApiError> {
    let ticket = state.admit(&headers, peer).await?;
    state.page_calls.record();

    debug!(identity = %ticket.identity(), id = %id, "Serving recognition page");
    let page = state.backend.recognition_page(&id).await?;
    Ok(Html(page))
}

#[instrument(skip_all, fields(peer = %peer, id = %id))]
async fn lyrics(
    State(state): State<AppState>,
    ConnectInfo(peer): ConnectInfo<SocketAddr>,
    headers: HeaderMap,
    Path(id): Path<String>,
) -> Result<Json<String>, ApiError> {
    let ticket = state.admit(&headers, peer).await?;
    state.page_calls.record();

    debug!(identity = %ticket.identity(), id = %id, "Serving lyrics");
    let text = state.backend.lyrics(&id).await?;
    Ok(Json(text))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::backend::BackendError;
    use crate::ratelimit::VisitorRegistry;
    use async_trait::async_trait;
    use axum::body::Body;
    use axum::extract::connect_info::MockConnectInfo;
    use axum::http::{Request, StatusCode};
    use tower::ServiceExt;

    struct CannedBackend;

    #[async_trait]
    impl PageBackend for CannedBackend {
        async fn recognition_page(&self, id: &str) -> Result<String, BackendError> {
            Ok(format!("<p>{}</p>", id))
        }

        async fn lyrics(&self, id: &str) -> Result<String, BackendError> {
            if id == "missing" {
                return Err(BackendError::NotFound(id.to_string()));
            }
            Ok("la la la".to_string())
        }
    }

    fn test_app(capacity: u32, trust_forwarded_headers: bool) -> (Router, AppState) {
        let registry = Arc::new(VisitorRegistry::new(0.0, capacity));
        let state = AppState {
            gate: AdmissionGate::new(registry),
            backend: Arc::new(CannedBackend),
            page_calls: Arc::new(PageCalls::new()),
            trust_forwarded_headers,
        };
        let peer: SocketAddr = "10.1.1.1:5555".parse().unwrap();
        let app = create_router(state.clone()).layer(MockConnectInfo(peer));
        (app, state)
    }

    async fn body_string(response: axum::response::Response) -> String {
        let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
            .await
            .unwrap();
        String::from_utf8(bytes.to_vec()).unwrap()
    }

    fn get_request(uri: &str) -> Request<Body> {
        Request::builder().uri(uri).body(Body::empty()).unwrap()
    }

    #[tokio::test]
    async fn test_recognition_page_served() {
        let (app, state) = test_app(5, false);

        let response = app.oneshot(get_request("/recognition/abc")).await.unwrap();

        assert_eq!(response.status(), StatusCode::OK);
        assert_eq!(body_string(response).await, "<p>abc</p>");
        assert_eq!(state.page_calls.total(), 1);
        assert!(state.gate.registry().contains("10.1.1.1"));
    }

    #[tokio::test]
    async fn test_lyrics_served_as_json_string() {
        let (app, _) = test_app(5, false);

        let response = app.oneshot(get_request("/lyrics/abc")).await.unwrap();

        assert_eq!(response.status(), StatusCode::OK);
        assert_eq!(body_string(response).await, "\"la la la\"");
    }

    #[tokio::test]
    async fn test_lyrics_not_found() {
        let (app, _) = test_app(5, false);

        let response = app.oneshot(get_request("/lyrics/missing")).await.unwrap();
        assert_eq!(response.status(), StatusCode::NOT_FOUND);
    }

    #[tokio::test]
    async fn test_rate_limited_after_burst() {
        let (app, state) = test_app(2, false);

        for _ in 0..2 {
            let response = app.clone().oneshot(get_request("/recognition/abc")).await.unwrap();
            assert_eq!(response.status(), StatusCode::OK);
        }

        let response = app.clone().oneshot(get_request("/lyrics/abc")).await.unwrap();
        assert_eq!(response.status(), StatusCode::TOO_MANY_REQUESTS);
        // Denied requests are not counted as page calls
        assert_eq!(state.page_calls.total(), 2);
    }

    #[tokio::test]
    async fn test_forwarded_for_used_when_trusted() {
        let (app, state) = test_app(1, true);

        let request = Request::builder()
            .uri("/recognition/abc")
            .header(X_FORWARDED_FOR, "203.0.113.7, 10.0.0.1")
            .body(Body::empty())
            .unwrap();
        let response = app.oneshot(request).await.unwrap();

        assert_eq!(response.status(), StatusCode::OK);
        assert!(state.gate.registry().contains("203.0.113.7"));
        assert!(!state.gate.registry().contains("10.1.1.1"));
    }

    #[tokio::test]
    async fn test_real_ip_used_when_trusted() {
        let (app, state) = test_app(1, true);

        let request = Request::builder()
            .uri("/recognition/abc")
            .header(X_REAL_IP, "198.51.100.2")
            .body(Body::empty())
            .unwrap();
        app.oneshot(request).await.unwrap();

        assert!(state.gate.registry().contains("198.51.100.2"));
    }

    #[tokio::test]
    async fn test_forwarded_headers_ignored_when_untrusted() {
        let (app, state) = test_app(1, false);

        let request = Request::builder()
            .uri("/recognition/abc")
            .header(X_FORWARDED_FOR, "203.0.113.7")
            .body(Body::empty())
            .unwrap();
        app.oneshot(request).await.unwrap();

        assert!(state.gate.registry().contains("10.1.1.1"));
        assert!(!state.gate.registry().contains("203.0.113.7"));
    }

    #[tokio::test]
    async fn test_rate_limited_response_carries_retry_after() {
        let registry = Arc::new(VisitorRegistry::new(0.5, 1));
        let state = AppState {
            gate: AdmissionGate::new(registry),
            backend: Arc::new(CannedBackend),
            page_calls: Arc::new(PageCalls::new()),
            trust_forwarded_headers: false,
        };
        let peer: SocketAddr = "10.1.1.1:5555".parse().unwrap();
        let app = create_router(state).layer(MockConnectInfo(peer));

        let response = app.clone().oneshot(get_request("/recognition/abc")).await.unwrap();
        assert_eq!(response.status(), StatusCode::OK);

        let response = app.oneshot(get_request("/recognition/abc")).await.unwrap();
        assert_eq!(response.status(), StatusCode::TOO_MANY_REQUESTS);
        assert_eq!(response.headers()[axum::http::header::RETRY_AFTER], "2");
        assert_eq!(
            body_string(response).await,
            r#"{"error":"sorry, your recognition limit has exceeded"}"#
        );
    }

    #[tokio::test]
    async fn test_empty_forwarded_for_falls_through_to_real_ip() {
        let (app, state) = test_app(1, true);

        let request = Request::builder()
            .uri("/recognition/abc")
            .header(X_FORWARDED_FOR, "")
            .header(X_REAL_IP, "198.51.100.2")
            .body(Body::empty())
            .unwrap();
        let response = app.oneshot(request).await.unwrap();

        assert_eq!(response.status(), StatusCode::OK);
        assert!(state.gate.registry().contains("198.51.100.2"));
        assert_eq!(state.gate.registry().len(), 1);
    }

    #[tokio::test]
    async fn test_blank_forwarded_for_falls_back_to_peer() {
        let (app, state) = test_app(1, true);

        let request = Request::builder()
            .uri("/recognition/abc")
            .header(X_FORWARDED_FOR, "  ")
            .body(Body::empty())
            .unwrap();
        let response = app.oneshot(request).await.unwrap();

        assert_eq!(response.status(), StatusCode::OK);
        assert!(state.gate.registry().contains("10.1.1.1"));
        assert_eq!(state.page_calls.total(), 1);
    }

    #[tokio::test]
    async fn test_bad_forwarded_header_rejected() {
        let (app, state) = test_app(1, true);

        let request = Request::builder()
            .uri("/recognition/abc")
            .header(X_FORWARDED_FOR, "unknown")
            .body(Body::empty())
            .unwrap();
        let response = app.oneshot(request).await.unwrap();

        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
        assert!(state.gate.registry().is_empty());
        assert_eq!(state.page_calls.total(), 0);
    }
}
