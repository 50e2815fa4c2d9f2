//! Mapping of admission and backend failures onto HTTP responses.

use axum::http::{header, HeaderValue, StatusCode};
use axum::response::{IntoResponse, Response};
use axum::Json;
use serde_json::json;
use std::time::Duration;
use tracing::error;

use crate::backend::BackendError;
use crate::error::AdmissionError;

const RATE_LIMITED_MESSAGE: &str = "sorry, your recognition limit has exceeded";

/// Error returned by page handlers.
///
/// - `Admission(IdentityParse)` → 400
/// - `RateLimited` and `Admission(RateLimitExceeded | BacklogFull | BacklogTimeout)` → 429
/// - `Backend(NotFound)` → 404
/// - any other backend failure → 500
#[derive(Debug)]
pub enum ApiError {
    /// The request was turned away before any work was done.
    Admission(AdmissionError),
    /// The client's bucket is empty; sent with `Retry-After` when known.
    RateLimited { retry_after: Option<Duration> },
    /// The backend failed to produce the page.
    Backend(BackendError),
}

impl From<AdmissionError> for ApiError {
    fn from(err: AdmissionError) -> Self {
        ApiError::Admission(err)
    }
}

impl From<BackendError> for ApiError {
    fn from(err: BackendError) -> Self {
        ApiError::Backend(err)
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let mut retry_after = None;
        let (status, message) = match self {
            ApiError::Admission(AdmissionError::IdentityParse { .. }) => {
                (StatusCode::BAD_REQUEST, "invalid client address".to_string())
            }
            ApiError::RateLimited { retry_after: wait } => {
                retry_after = wait;
                (StatusCode::TOO_MANY_REQUESTS, RATE_LIMITED_MESSAGE.to_string())
            }
            ApiError::Admission(AdmissionError::RateLimitExceeded) => {
                (StatusCode::TOO_MANY_REQUESTS, RATE_LIMITED_MESSAGE.to_string())
            }
            ApiError::Admission(err) => (StatusCode::TOO_MANY_REQUESTS, err.to_string()),
            ApiError::Backend(BackendError::NotFound(id)) => {
                (StatusCode::NOT_FOUND, format!("recognition {} not found", id))
            }
            ApiError::Backend(err) => {
                error!(error = %err, "Backend failed to serve page");
                (
                    StatusCode::INTERNAL_SERVER_ERROR,
                    "oops, internal error, be right back".to_string(),
                )
            }
        };

        let mut response = (status, Json(json!({ "error": message }))).into_response();
        if let Some(wait) = retry_after {
            response
                .headers_mut()
                .insert(header::RETRY_AFTER, HeaderValue::from(wait.as_secs()));
        }
        response
    }
}
