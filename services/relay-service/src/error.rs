//! HTTP error responses
//!
//! Every failure leaves the service as
//! `{"error":{"type":"...","message":"...","request_id":"req_..."}}`.
//! Upstream failures also carry the upstream status and body so clients can
//! see what the relay target said.

use axum::http::{StatusCode, header};
use axum::response::{IntoResponse, Response};
use relay_core::ErrorKind;

/// Fresh request id, `req_` followed by a simple-format v4 UUID.
pub fn request_id() -> String {
    format!("req_{}", uuid::Uuid::new_v4().as_simple())
}

#[derive(Debug)]
pub struct ApiError {
    status: StatusCode,
    error_type: &'static str,
    message: String,
    request_id: String,
    upstream: Option<(u16, String)>,
}

impl ApiError {
    pub fn new(status: StatusCode, error_type: &'static str, message: impl Into<String>) -> Self {
        Self {
            status,
            error_type,
            message: message.into(),
            request_id: request_id(),
            upstream: None,
        }
    }

    pub fn bad_request(message: impl Into<String>) -> Self {
        Self::new(StatusCode::BAD_REQUEST, "invalid_request", message)
    }

    pub fn not_found(message: impl Into<String>) -> Self {
        Self::new(StatusCode::NOT_FOUND, "not_found", message)
    }

    pub fn with_request_id(mut self, request_id: impl Into<String>) -> Self {
        self.request_id = request_id.into();
        self
    }

    pub fn status(&self) -> StatusCode {
        self.status
    }

    pub fn error_type(&self) -> &'static str {
        self.error_type
    }
}

/// Status code for a core failure class.
fn status_for(err: &relay_core::Error) -> StatusCode {
    match err.kind() {
        ErrorKind::Auth => StatusCode::UNAUTHORIZED,
        ErrorKind::RateLimited => StatusCode::TOO_MANY_REQUESTS,
        ErrorKind::Upstream => StatusCode::BAD_GATEWAY,
        ErrorKind::Network if err.is_timeout() => StatusCode::GATEWAY_TIMEOUT,
        ErrorKind::Network => StatusCode::BAD_GATEWAY,
        ErrorKind::InvalidRequest => StatusCode::BAD_REQUEST,
        ErrorKind::Configuration | ErrorKind::Internal => StatusCode::INTERNAL_SERVER_ERROR,
    }
}

impl From<relay_core::Error> for ApiError {
    fn from(err: relay_core::Error) -> Self {
        let upstream = err
            .upstream_status()
            .map(|status| (status, err.upstream_body().unwrap_or_default().to_string()));
        Self {
            status: status_for(&err),
            error_type: err.label(),
            message: err.to_string(),
            request_id: request_id(),
            upstream,
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let mut error = serde_json::json!({
            "type": self.error_type,
            "message": self.message,
            "request_id": self.request_id,
        });
        if let Some((status, body)) = self.upstream {
            error["upstream_status"] = status.into();
            error["upstream_body"] = body.into();
        }
        (
            self.status,
            [(header::CONTENT_TYPE, "application/json")],
            serde_json::json!({ "error": error }).to_string(),
        )
            .into_response()
    }
}
