//! Error handling for the REST API server.

use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use hush_core::error::HushError;
use serde::Serialize;
use std::fmt;

/// API error type.
#[derive(Debug)]
pub struct ApiError {
    pub status: StatusCode,
    pub code: String,
    pub message: String,
    pub details: Option<serde_json::Value>,
}

impl ApiError {
    pub fn new(status: StatusCode, code: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            status,
            code: code.into(),
            message: message.into(),
            details: None,
        }
    }

    pub fn with_details(mut self, details: serde_json::Value) -> Self {
        self.details = Some(details);
        self
    }

    pub fn bad_request(message: impl Into<String>) -> Self {
        Self::new(StatusCode::BAD_REQUEST, "BAD_REQUEST", message)
    }

    pub fn not_found(message: impl Into<String>) -> Self {
        Self::new(StatusCode::NOT_FOUND, "NOT_FOUND", message)
    }

    pub fn forbidden(message: impl Into<String>) -> Self {
        Self::new(StatusCode::FORBIDDEN, "FORBIDDEN", message)
    }

    pub fn unauthorized(message: impl Into<String>) -> Self {
        Self::new(StatusCode::UNAUTHORIZED, "UNAUTHORIZED", message)
    }

    pub fn internal(message: impl Into<String>) -> Self {
        Self::new(StatusCode::INTERNAL_SERVER_ERROR, "INTERNAL_ERROR", message)
    }

    pub fn validation(message: impl Into<String>) -> Self {
        Self::new(StatusCode::UNPROCESSABLE_ENTITY, "VALIDATION_ERROR", message)
    }
}

impl fmt::Display for ApiError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "[{}] {}: {}", self.status, self.code, self.message)
    }
}

impl std::error::Error for ApiError {}

/// Error response body.
#[derive(Debug, Serialize)]
pub struct ErrorResponse {
    pub error: ErrorBody,
}

#[derive(Debug, Serialize)]
pub struct ErrorBody {
    pub code: String,
    pub message: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub details: Option<serde_json::Value>,
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let body = ErrorResponse {
            error: ErrorBody {
                code: self.code,
                message: self.message,
                details: self.details,
            },
        };

        (self.status, Json(body)).into_response()
    }
}

impl From<HushError> for ApiError {
    fn from(err: HushError) -> Self {
        let code = err.code().as_str();

        match err {
            HushError::PermissionDenied { message, .. } => {
                ApiError::new(StatusCode::FORBIDDEN, code, message)
            }
            HushError::NotFound { message, .. } => {
                ApiError::new(StatusCode::NOT_FOUND, code, message)
            }
            HushError::Validation {
                message,
                details,
                suggestion,
                ..
            } => {
                let mut error = ApiError::new(StatusCode::UNPROCESSABLE_ENTITY, code, message);
                if !details.is_empty() || suggestion.is_some() {
                    error = error.with_details(serde_json::json!({
                        "fields": details,
                        "suggestion": suggestion,
                    }));
                }
                error
            }
            HushError::Authentication { message, .. } => {
                ApiError::new(StatusCode::UNAUTHORIZED, code, message)
            }
            HushError::Configuration(msg) => ApiError::new(StatusCode::BAD_REQUEST, code, msg),
            HushError::UnsupportedProvider { provider } => ApiError::new(
                StatusCode::BAD_REQUEST,
                code,
                format!("Unsupported provider: {}", provider),
            ),
            // Backend failures never leak their details to clients.
            other => {
                tracing::error!(error = %other, code, "Request failed");
                ApiError::new(StatusCode::INTERNAL_SERVER_ERROR, code, "Internal server error")
            }
        }
    }
}

/// Result type alias for API handlers.
pub type ApiResult<T> = Result<T, ApiError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_permission_denied_is_forbidden() {
        let err: ApiError = HushError::permission_denied("mallory", "conv-1").into();
        assert_eq!(err.status, StatusCode::FORBIDDEN);
        assert_eq!(err.code, "PERM_001");
    }

    #[test]
    fn test_missing_decision_is_not_found() {
        let err: ApiError = HushError::decision_not_found("d-1").into();
        assert_eq!(err.status, StatusCode::NOT_FOUND);
        assert_eq!(err.code, "NF_001");
    }

    #[test]
    fn test_validation_maps_to_422() {
        let err: ApiError = HushError::validation("message_count_threshold must be at least 1").into();
        assert_eq!(err.status, StatusCode::UNPROCESSABLE_ENTITY);
        assert!(err.message.contains("message_count_threshold"));
    }

    #[test]
    fn test_backend_errors_are_opaque() {
        let err: ApiError = HushError::llm("upstream said: secret details").into();
        assert_eq!(err.status, StatusCode::INTERNAL_SERVER_ERROR);
        assert_eq!(err.message, "Internal server error");
    }
}
