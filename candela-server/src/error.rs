use axum::Json;
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use candela::CandelaError;
use serde_json::json;
use thiserror::Error;

/// Error returned by HTTP handlers, rendered as `{"error": ...}`.
#[derive(Debug, Error)]
pub enum ApiError {
    /// Malformed request, rendered as 400.
    #[error("{0}")]
    BadRequest(String),
    /// Unknown symbol, timeframe or file, rendered as 404.
    #[error("{0}")]
    NotFound(String),
    /// Storage or other server-side failure, rendered as 500.
    #[error("{0}")]
    Internal(String),
}

impl ApiError {
    /// HTTP status for this error.
    #[must_use]
    pub const fn status(&self) -> StatusCode {
        match self {
            Self::BadRequest(_) => StatusCode::BAD_REQUEST,
            Self::NotFound(_) => StatusCode::NOT_FOUND,
            Self::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

impl From<CandelaError> for ApiError {
    fn from(e: CandelaError) -> Self {
        match e {
            CandelaError::InvalidArg(msg) => Self::BadRequest(msg),
            CandelaError::NotFound { what } => Self::NotFound(format!("not found: {what}")),
            other => Self::Internal(other.to_string()),
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = self.status();
        if status.is_server_error() {
            tracing::error!(error = %self, "request failed");
        }
        (status, Json(json!({ "error": self.to_string() }))).into_response()
    }
}
