//! Gateway error types.
//!
//! [`GatewayError`] covers everything the server itself can hit: envelope
//! decoding and encoding, dispatch, the worker pool, and startup. [`HandlerError`] is
//! what an action handler reports; it crosses the worker pool boundary and
//! can be forwarded to the client as an error envelope.

use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use serde::Serialize;

/// Structured JSON error response body for the HTTP endpoints.
///
/// ```json
/// {
///   "error": {
///     "code": 3002,
///     "message": "server is shutting down"
///   }
/// }
/// ```
#[derive(Debug, Serialize)]
pub struct ErrorResponse {
    /// Structured error payload.
    pub error: ErrorBody,
}

/// Inner error body with numeric code and human-readable message.
#[derive(Debug, Serialize)]
pub struct ErrorBody {
    /// Numeric error code.
    pub code: u32,
    /// Human-readable error message.
    pub message: String,
}

/// Server-side error enum.
///
/// # Error Code Ranges
///
/// | Range     | Category   | HTTP Status               |
/// |-----------|------------|---------------------------|
/// | 1000–1999 | Protocol   | 400 Bad Request           |
/// | 3000–3999 | Server     | 500 / 503                 |
#[derive(Debug, thiserror::Error)]
pub enum GatewayError {
    /// Inbound frame is not a valid envelope.
    #[error("malformed envelope: {0}")]
    Decode(#[from] serde_json::Error),

    /// Envelope names an action that is not registered.
    #[error("unknown action: {0}")]
    UnknownAction(i64),

    /// An outbound envelope could not be serialized.
    #[error("failed to encode envelope: {0}")]
    Encode(#[source] serde_json::Error),

    /// Work was submitted after the worker pool was drained.
    #[error("worker pool is stopped")]
    ExecutorStopped,

    /// The server is draining and no longer accepts connections.
    #[error("server is shutting down")]
    ShuttingDown,

    /// Configuration could not be loaded.
    #[error("invalid configuration: {0}")]
    Config(String),

    /// Socket bind or serve failure.
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
}

impl GatewayError {
    /// Returns the numeric error code for this variant.
    #[must_use]
    pub const fn error_code(&self) -> u32 {
        match self {
            Self::Decode(_) => 1001,
            Self::UnknownAction(_) => 1002,
            Self::ExecutorStopped => 3001,
            Self::ShuttingDown => 3002,
            Self::Config(_) => 3003,
            Self::Encode(_) => 3004,
            Self::Io(_) => 3000,
        }
    }

    /// Returns the HTTP status code for this variant.
    #[must_use]
    pub const fn status_code(&self) -> StatusCode {
        match self {
            Self::Decode(_) | Self::UnknownAction(_) => StatusCode::BAD_REQUEST,
            Self::ExecutorStopped | Self::ShuttingDown => StatusCode::SERVICE_UNAVAILABLE,
            Self::Config(_) | Self::Encode(_) | Self::Io(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

impl IntoResponse for GatewayError {
    fn into_response(self) -> Response {
        let status = self.status_code();
        let body = ErrorResponse {
            error: ErrorBody {
                code: self.error_code(),
                message: self.to_string(),
            },
        };
        let mut response = axum::Json(body).into_response();
        *response.status_mut() = status;
        response
    }
}

/// Failure reported by an action handler or by the worker running it.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum HandlerError {
    /// Named resource does not exist.
    #[error("not found: {0}")]
    NotFound(String),

    /// Source data is malformed.
    #[error("format error: {0}")]
    Format(String),

    /// Graph references a node that was not declared.
    #[error("invalid graph: {0}")]
    InvalidGraph(String),

    /// Request content does not match the action's schema.
    #[error("invalid payload: {0}")]
    InvalidPayload(String),

    /// The handler panicked.
    #[error("handler panicked: {0}")]
    Panicked(String),

    /// The job was cancelled before it produced a result.
    #[error("job cancelled")]
    Cancelled,
}

impl HandlerError {
    /// Stable machine-readable kind, used in error envelopes.
    #[must_use]
    pub const fn kind(&self) -> &'static str {
        match self {
            Self::NotFound(_) => "not_found",
            Self::Format(_) => "format_error",
            Self::InvalidGraph(_) => "invalid_graph",
            Self::InvalidPayload(_) => "invalid_payload",
            Self::Panicked(_) => "panicked",
            Self::Cancelled => "cancelled",
        }
    }
}
