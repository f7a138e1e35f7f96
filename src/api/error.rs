//! Structured API error responses.
//!
//! One stable error-code enum maps every failure class to an HTTP status
//! and a `{success: false, code, message}` JSON body. Internal error text
//! stays in the tracing/operation logs; clients get the generic message.

use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use serde::{Deserialize, Serialize};

use crate::domain::BlacklistError;
use crate::infra::StoreError;

/// Stable machine-readable error codes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ErrorCode {
    /// Missing, invalid, or expired credential.
    Unauthorized,
    /// Valid credential, insufficient permission.
    Forbidden,
    /// Resource absent (unknown key, IP not listed).
    NotFound,
    /// Duplicate add.
    Conflict,
    /// Bad JSON, bad IP format, missing field.
    MalformedRequest,
    /// Backing KV not bound or unreachable.
    StoreUnavailable,
    /// Anything uncaught.
    SystemError,
}

impl ErrorCode {
    pub fn http_status(&self) -> StatusCode {
        match self {
            ErrorCode::Unauthorized => StatusCode::UNAUTHORIZED,
            ErrorCode::Forbidden => StatusCode::FORBIDDEN,
            ErrorCode::NotFound => StatusCode::NOT_FOUND,
            ErrorCode::Conflict => StatusCode::CONFLICT,
            ErrorCode::MalformedRequest => StatusCode::BAD_REQUEST,
            ErrorCode::StoreUnavailable => StatusCode::INTERNAL_SERVER_ERROR,
            ErrorCode::SystemError => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

impl std::fmt::Display for ErrorCode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let code = match self {
            ErrorCode::Unauthorized => "UNAUTHORIZED",
            ErrorCode::Forbidden => "FORBIDDEN",
            ErrorCode::NotFound => "NOT_FOUND",
            ErrorCode::Conflict => "CONFLICT",
            ErrorCode::MalformedRequest => "MALFORMED_REQUEST",
            ErrorCode::StoreUnavailable => "STORE_UNAVAILABLE",
            ErrorCode::SystemError => "SYSTEM_ERROR",
        };
        write!(f, "{code}")
    }
}

/// JSON error body returned by every failing endpoint.
#[derive(Debug, Clone, Serialize)]
pub struct ApiError {
    pub success: bool,
    pub code: ErrorCode,
    pub message: String,
}

impl ApiError {
    pub fn new(code: ErrorCode, message: impl Into<String>) -> Self {
        Self {
            success: false,
            code,
            message: message.into(),
        }
    }

    pub fn unauthorized(message: impl Into<String>) -> Self {
        Self::new(ErrorCode::Unauthorized, message)
    }

    pub fn forbidden(message: impl Into<String>) -> Self {
        Self::new(ErrorCode::Forbidden, message)
    }

    pub fn not_found(message: impl Into<String>) -> Self {
        Self::new(ErrorCode::NotFound, message)
    }

    pub fn conflict(message: impl Into<String>) -> Self {
        Self::new(ErrorCode::Conflict, message)
    }

    pub fn malformed(message: impl Into<String>) -> Self {
        Self::new(ErrorCode::MalformedRequest, message)
    }

    pub fn status(&self) -> StatusCode {
        self.code.http_status()
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = self.status();
        let code = self.code.to_string();
        let mut response = (status, Json(self)).into_response();
        if let Ok(value) = axum::http::HeaderValue::from_str(&code) {
            response.headers_mut().insert(
                axum::http::HeaderName::from_static("x-error-code"),
                value,
            );
        }
        response
    }
}

impl From<StoreError> for ApiError {
    fn from(err: StoreError) -> Self {
        match err {
            StoreError::NotFound(what) => Self::not_found(format!("not found: {what}")),
            // internal detail goes to the logs, not the client
            StoreError::Unavailable(detail) => {
                tracing::error!(error = %detail, "store unavailable");
                Self::new(ErrorCode::StoreUnavailable, "storage unavailable")
            }
            StoreError::Corrupt { key, reason } => {
                tracing::error!(%key, %reason, "corrupt store record");
                Self::new(ErrorCode::SystemError, "internal error")
            }
        }
    }
}

impl From<BlacklistError> for ApiError {
    fn from(err: BlacklistError) -> Self {
        match &err {
            BlacklistError::Duplicate(_) => Self::conflict(err.to_string()),
            BlacklistError::Missing(_) => Self::not_found(err.to_string()),
            BlacklistError::InvalidIp(_) => Self::malformed(err.to_string()),
        }
    }
}
