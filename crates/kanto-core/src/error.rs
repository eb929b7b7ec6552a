//! Error types for Kanto.
//!
//! [`KantoError`] is the error a handler or middleware returns while serving a
//! request. The dispatcher turns it into the JSON error envelope:
//!
//! ```json
//! { "error": { "code": "NOT_FOUND", "message": "Not Found", "status": 404 } }
//! ```
//!
//! Internal errors never leak their message or source chain to the caller;
//! they are logged and reported as a generic `INTERNAL_ERROR`.

use http::StatusCode;
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::di::ContainerError;

/// Result type alias using [`KantoError`].
pub type KantoResult<T> = Result<T, KantoError>;

/// Public message used for every internal error.
pub(crate) const INTERNAL_MESSAGE: &str = "Internal Server Error";

/// Categories of errors for classification and handling.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorCategory {
    /// Caller input could not be accepted.
    BadRequest,
    /// Missing or invalid credentials.
    Unauthorized,
    /// Permission denied.
    Forbidden,
    /// Route or resource not found.
    NotFound,
    /// Conflicting state.
    Conflict,
    /// Rate limit exceeded.
    RateLimited,
    /// A dependency is unavailable (for example an open circuit).
    Unavailable,
    /// Unhandled failure.
    Internal,
}

impl ErrorCategory {
    /// Returns the HTTP status code for this category.
    #[must_use]
    pub const fn status_code(&self) -> StatusCode {
        match self {
            Self::BadRequest => StatusCode::BAD_REQUEST,
            Self::Unauthorized => StatusCode::UNAUTHORIZED,
            Self::Forbidden => StatusCode::FORBIDDEN,
            Self::NotFound => StatusCode::NOT_FOUND,
            Self::Conflict => StatusCode::CONFLICT,
            Self::RateLimited => StatusCode::TOO_MANY_REQUESTS,
            Self::Unavailable => StatusCode::SERVICE_UNAVAILABLE,
            Self::Internal => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    /// Returns the machine-readable code used in the envelope.
    #[must_use]
    pub const fn code(&self) -> &'static str {
        match self {
            Self::BadRequest => "BAD_REQUEST",
            Self::Unauthorized => "UNAUTHORIZED",
            Self::Forbidden => "FORBIDDEN",
            Self::NotFound => "NOT_FOUND",
            Self::Conflict => "CONFLICT",
            Self::RateLimited => "RATE_LIMITED",
            Self::Unavailable => "SERVICE_UNAVAILABLE",
            Self::Internal => "INTERNAL_ERROR",
        }
    }
}

/// Standard request-time error type for Kanto.
///
/// # Example
///
/// ```
/// use kanto_core::{KantoError, ErrorCategory};
///
/// fn parse_limit(raw: &str) -> Result<u32, KantoError> {
///     raw.parse()
///         .map_err(|_| KantoError::bad_request("limit must be a number"))
/// }
///
/// let err = parse_limit("ten").unwrap_err();
/// assert_eq!(err.category(), ErrorCategory::BadRequest);
/// assert_eq!(err.status_code(), 400);
/// ```
#[derive(Error, Debug)]
pub enum KantoError {
    /// Caller input could not be accepted.
    #[error("Bad request: {message}")]
    BadRequest {
        /// Human-readable error message.
        message: String,
        /// Structured details added to the envelope.
        details: Option<serde_json::Value>,
    },

    /// Missing or invalid credentials.
    #[error("Unauthorized: {message}")]
    Unauthorized {
        /// Human-readable error message.
        message: String,
    },

    /// Permission denied.
    #[error("Forbidden: {message}")]
    Forbidden {
        /// Human-readable error message.
        message: String,
    },

    /// Route or resource not found.
    #[error("Not found: {message}")]
    NotFound {
        /// Human-readable error message.
        message: String,
    },

    /// Conflicting state.
    #[error("Conflict: {message}")]
    Conflict {
        /// Human-readable error message.
        message: String,
    },

    /// Rate limit exceeded.
    #[error("Rate limited: {message}")]
    RateLimited {
        /// Human-readable error message.
        message: String,
        /// Seconds until the window resets.
        retry_after_seconds: Option<u64>,
    },

    /// A dependency is unavailable.
    #[error("Service unavailable: {message}")]
    Unavailable {
        /// Human-readable error message.
        message: String,
    },

    /// Unhandled failure. Only logged, never exposed.
    #[error("Internal error: {message}")]
    Internal {
        /// Message for logs.
        message: String,
        /// The underlying error.
        #[source]
        source: Option<anyhow::Error>,
    },
}

impl KantoError {
    /// Creates a bad request error.
    #[must_use]
    pub fn bad_request(message: impl Into<String>) -> Self {
        Self::BadRequest {
            message: message.into(),
            details: None,
        }
    }

    /// Creates a bad request error with structured details.
    #[must_use]
    pub fn bad_request_with_details(
        message: impl Into<String>,
        details: serde_json::Value,
    ) -> Self {
        Self::BadRequest {
            message: message.into(),
            details: Some(details),
        }
    }

    /// Creates an unauthorized error.
    #[must_use]
    pub fn unauthorized(message: impl Into<String>) -> Self {
        Self::Unauthorized {
            message: message.into(),
        }
    }

    /// Creates a forbidden error.
    #[must_use]
    pub fn forbidden(message: impl Into<String>) -> Self {
        Self::Forbidden {
            message: message.into(),
        }
    }

    /// Creates a not found error.
    #[must_use]
    pub fn not_found(message: impl Into<String>) -> Self {
        Self::NotFound {
            message: message.into(),
        }
    }

    /// Creates a conflict error.
    #[must_use]
    pub fn conflict(message: impl Into<String>) -> Self {
        Self::Conflict {
            message: message.into(),
        }
    }

    /// Creates a rate limited error.
    #[must_use]
    pub fn rate_limited(message: impl Into<String>, retry_after_seconds: Option<u64>) -> Self {
        Self::RateLimited {
            message: message.into(),
            retry_after_seconds,
        }
    }

    /// Creates a service unavailable error.
    #[must_use]
    pub fn unavailable(message: impl Into<String>) -> Self {
        Self::Unavailable {
            message: message.into(),
        }
    }

    /// Creates an internal error.
    #[must_use]
    pub fn internal(message: impl Into<String>) -> Self {
        Self::Internal {
            message: message.into(),
            source: None,
        }
    }

    /// Creates an internal error with a source error.
    pub fn internal_with_source(
        message: impl Into<String>,
        source: impl Into<anyhow::Error>,
    ) -> Self {
        Self::Internal {
            message: message.into(),
            source: Some(source.into()),
        }
    }

    /// Returns the error category.
    #[must_use]
    pub const fn category(&self) -> ErrorCategory {
        match self {
            Self::BadRequest { .. } => ErrorCategory::BadRequest,
            Self::Unauthorized { .. } => ErrorCategory::Unauthorized,
            Self::Forbidden { .. } => ErrorCategory::Forbidden,
            Self::NotFound { .. } => ErrorCategory::NotFound,
            Self::Conflict { .. } => ErrorCategory::Conflict,
            Self::RateLimited { .. } => ErrorCategory::RateLimited,
            Self::Unavailable { .. } => ErrorCategory::Unavailable,
            Self::Internal { .. } => ErrorCategory::Internal,
        }
    }

    /// Returns the HTTP status code for this error.
    #[must_use]
    pub const fn status_code(&self) -> StatusCode {
        self.category().status_code()
    }

    /// Returns `true` for errors that are reported as a generic 500.
    #[must_use]
    pub const fn is_internal(&self) -> bool {
        matches!(self, Self::Internal { .. })
    }

    /// Returns the message shown to the caller.
    #[must_use]
    pub fn public_message(&self) -> &str {
        match self {
            Self::BadRequest { message, .. }
            | Self::Unauthorized { message }
            | Self::Forbidden { message }
            | Self::NotFound { message }
            | Self::Conflict { message }
            | Self::RateLimited { message, .. }
            | Self::Unavailable { message } => message,
            Self::Internal { .. } => INTERNAL_MESSAGE,
        }
    }

    /// Converts this error to the serializable error envelope.
    #[must_use]
    pub fn to_envelope(&self) -> ErrorEnvelope {
        ErrorEnvelope {
            error: ErrorDetail {
                code: self.category().code().to_string(),
                message: self.public_message().to_string(),
                status: self.status_code().as_u16(),
                details: self.details(),
            },
        }
    }

    fn details(&self) -> Option<serde_json::Value> {
        match self {
            Self::BadRequest { details, .. } => details.clone(),
            Self::RateLimited {
                retry_after_seconds: Some(seconds),
                ..
            } => Some(serde_json::json!({ "retry_after_seconds": seconds })),
            _ => None,
        }
    }
}

impl From<ContainerError> for KantoError {
    fn from(err: ContainerError) -> Self {
        Self::internal_with_source("service resolution failed", err)
    }
}

impl From<serde_json::Error> for KantoError {
    fn from(err: serde_json::Error) -> Self {
        Self::internal_with_source("JSON serialization failed", err)
    }
}

/// Serializable error envelope for HTTP responses.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ErrorEnvelope {
    /// The error details.
    pub error: ErrorDetail,
}

impl ErrorEnvelope {
    /// Builds an envelope from its parts.
    #[must_use]
    pub fn new(status: StatusCode, code: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            error: ErrorDetail {
                code: code.into(),
                message: message.into(),
                status: status.as_u16(),
                details: None,
            },
        }
    }
}

/// Error detail within an envelope.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ErrorDetail {
    /// Machine-readable error code.
    pub code: String,
    /// Human-readable error message.
    pub message: String,
    /// HTTP status code.
    pub status: u16,
    /// Additional error details.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub details: Option<serde_json::Value>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_not_found_envelope() {
        let error = KantoError::not_found("Not Found");
        assert_eq!(error.status_code(), StatusCode::NOT_FOUND);

        let json = serde_json::to_value(error.to_envelope()).unwrap();
        assert_eq!(
            json,
            serde_json::json!({
                "error": { "code": "NOT_FOUND", "message": "Not Found", "status": 404 }
            })
        );
    }

    #[test]
    fn test_bad_request_details() {
        let error =
            KantoError::bad_request_with_details("invalid page", serde_json::json!({"page": "x"}));
        let envelope = error.to_envelope();
        assert_eq!(envelope.error.code, "BAD_REQUEST");
        assert_eq!(envelope.error.status, 400);
        assert_eq!(envelope.error.details.unwrap()["page"], "x");
    }

    #[test]
    fn test_internal_message_hidden() {
        let error = KantoError::internal_with_source(
            "database connection refused",
            std::io::Error::other("connect: refused"),
        );
        assert!(error.is_internal());
        assert!(error.to_string().contains("database connection refused"));

        let envelope = error.to_envelope();
        assert_eq!(envelope.error.code, "INTERNAL_ERROR");
        assert_eq!(envelope.error.message, "Internal Server Error");
        assert_eq!(envelope.error.status, 500);
        assert!(!serde_json::to_string(&envelope).unwrap().contains("refused"));
    }

    #[test]
    fn test_internal_keeps_source() {
        use std::error::Error as _;

        let error = KantoError::internal_with_source("boom", std::io::Error::other("disk"));
        assert!(error.source().is_some());
    }

    #[test]
    fn test_rate_limited() {
        let error = KantoError::rate_limited("Too many requests", Some(30));
        assert_eq!(error.status_code(), StatusCode::TOO_MANY_REQUESTS);
        let details = error.to_envelope().error.details.unwrap();
        assert_eq!(details["retry_after_seconds"], 30);
    }

    #[test]
    fn test_category_mapping() {
        let cases = [
            (KantoError::unauthorized("x"), 401, "UNAUTHORIZED"),
            (KantoError::forbidden("x"), 403, "FORBIDDEN"),
            (KantoError::conflict("x"), 409, "CONFLICT"),
            (KantoError::unavailable("x"), 503, "SERVICE_UNAVAILABLE"),
        ];
        for (error, status, code) in cases {
            assert_eq!(error.status_code().as_u16(), status);
            assert_eq!(error.category().code(), code);
        }
    }

    #[test]
    fn test_container_error_is_internal() {
        let error: KantoError = ContainerError::NotRegistered {
            name: "cards".to_string(),
        }
        .into();
        assert!(error.is_internal());
    }

    #[test]
    fn test_envelope_round_trip() {
        let envelope = ErrorEnvelope::new(StatusCode::CONFLICT, "CONFLICT", "exists");
        let json = serde_json::to_string(&envelope).unwrap();
        let back: ErrorEnvelope = serde_json::from_str(&json).unwrap();
        assert_eq!(back, envelope);
    }
}
