//! Shared error handling for proxy endpoints.

use axum::{
    Json,
    http::StatusCode,
    response::{IntoResponse, Response},
};
use serde::Serialize;
use tracing::error;

/// Extension trait for concise error mapping on Results.
pub trait ResultExt<T> {
    fn internal_err(self, msg: &str) -> Result<T, ApiError>;
}

impl<T, E: std::fmt::Display> ResultExt<T> for Result<T, E> {
    fn internal_err(self, msg: &str) -> Result<T, ApiError> {
        self.map_err(|e| ApiError::internal_error(msg, e))
    }
}

/// API error type with automatic response conversion.
#[derive(Debug)]
pub enum ApiError {
    BadRequest(String),
    Forbidden(String),
    PayloadTooLarge(String),
    TooManyRequests(String),
    /// Missing configuration. Raised before any network call.
    Config(String),
    /// The backend answered 2xx with a payload that fails validation.
    BadGateway(String),
    /// The upstream call itself failed (connect, timeout, broken body).
    Upstream { message: String, detail: String },
    Internal(String),
}

impl ApiError {
    pub fn bad_request(msg: impl Into<String>) -> Self {
        Self::BadRequest(msg.into())
    }

    pub fn forbidden(msg: impl Into<String>) -> Self {
        Self::Forbidden(msg.into())
    }

    pub fn config(msg: impl Into<String>) -> Self {
        Self::Config(msg.into())
    }

    pub fn internal(msg: impl Into<String>) -> Self {
        Self::Internal(msg.into())
    }

    /// Transport failure talking to the backend. The detail is the error's
    /// source chain, which names no backend address.
    pub fn upstream(context: &str, e: &(dyn std::error::Error + 'static)) -> Self {
        let mut detail = e.to_string();
        let mut source = e.source();
        while let Some(cause) = source {
            detail.push_str(": ");
            detail.push_str(&cause.to_string());
            source = cause.source();
        }
        error!(error = %detail, "{}", context);
        Self::Upstream {
            message: context.to_string(),
            detail,
        }
    }

    pub fn internal_error(context: &str, e: impl std::fmt::Display) -> Self {
        error!("{}: {}", context, e);
        Self::Internal(context.into())
    }
}

#[derive(Serialize)]
struct ErrorResponse {
    error: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    detail: Option<String>,
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let (status, message, detail) = match self {
            ApiError::BadRequest(msg) => (StatusCode::BAD_REQUEST, msg, None),
            ApiError::Forbidden(msg) => (StatusCode::FORBIDDEN, msg, None),
            ApiError::PayloadTooLarge(msg) => (StatusCode::PAYLOAD_TOO_LARGE, msg, None),
            ApiError::TooManyRequests(msg) => (StatusCode::TOO_MANY_REQUESTS, msg, None),
            ApiError::Config(msg) => (StatusCode::INTERNAL_SERVER_ERROR, msg, None),
            ApiError::BadGateway(msg) => (StatusCode::BAD_GATEWAY, msg, None),
            ApiError::Upstream { message, detail } => {
                (StatusCode::INTERNAL_SERVER_ERROR, message, Some(detail))
            }
            ApiError::Internal(msg) => (StatusCode::INTERNAL_SERVER_ERROR, msg, None),
        };
        (
            status,
            Json(ErrorResponse {
                error: message,
                detail,
            }),
        )
            .into_response()
    }
}
