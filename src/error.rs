//! HTTP-facing errors
//!
//! Handlers return [`ApiError`] for malformed input and lookups; payment
//! outcomes are not errors here, they travel as `PaymentResult` bodies.

use crate::payments::error::{ErrorKind, RequestError};
use axum::{
    extract::rejection::JsonRejection,
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use chrono::Utc;
use serde::{Deserialize, Serialize};

/// Standardized error body for every non-payment failure.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ErrorResponse {
    /// Machine-readable code
    pub error: String,

    /// Human-readable message
    pub message: String,

    /// RFC 3339 timestamp
    pub timestamp: String,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub details: Option<serde_json::Value>,
}

impl ErrorResponse {
    pub fn new(error: &str, message: impl Into<String>) -> Self {
        Self {
            error: error.to_string(),
            message: message.into(),
            timestamp: Utc::now().to_rfc3339(),
            details: None,
        }
    }

    pub fn with_details(mut self, details: serde_json::Value) -> Self {
        self.details = Some(details);
        self
    }
}

#[derive(Debug, thiserror::Error)]
pub enum ApiError {
    #[error("Invalid request body: {0}")]
    BadRequest(String),

    #[error("Validation failed for field '{field}': {message}")]
    Validation { field: String, message: String },

    #[error("Not found: {0}")]
    NotFound(String),

    #[error("Internal error: {0}")]
    Internal(String),
}

impl ApiError {
    pub fn status_code(&self) -> StatusCode {
        match self {
            ApiError::BadRequest(_) | ApiError::Validation { .. } => StatusCode::BAD_REQUEST,
            ApiError::NotFound(_) => StatusCode::NOT_FOUND,
            ApiError::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    pub fn code(&self) -> &'static str {
        match self {
            ApiError::BadRequest(_) => "bad_request",
            ApiError::Validation { .. } => ErrorKind::ValidationFailed.as_str(),
            ApiError::NotFound(_) => "not_found",
            ApiError::Internal(_) => "internal_error",
        }
    }

    fn body(&self) -> ErrorResponse {
        match self {
            ApiError::Validation { field, message } => {
                ErrorResponse::new(self.code(), format!("Validation failed for field '{}'", field))
                    .with_details(serde_json::json!({ "field": field, "error": message }))
            }
            // Internal detail stays in the logs.
            ApiError::Internal(_) => ErrorResponse::new(
                self.code(),
                "An internal server error occurred. Please try again later.",
            ),
            other => ErrorResponse::new(self.code(), other.to_string()),
        }
    }
}

impl From<RequestError> for ApiError {
    fn from(err: RequestError) -> Self {
        ApiError::Validation {
            field: err.field().to_string(),
            message: err.to_string(),
        }
    }
}

impl From<JsonRejection> for ApiError {
    fn from(rejection: JsonRejection) -> Self {
        ApiError::BadRequest(rejection.body_text())
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = self.status_code();
        if status.is_server_error() {
            tracing::error!(error = %self, status = status.as_u16(), "Server error occurred");
        } else {
            tracing::warn!(error = %self, status = status.as_u16(), "Client error occurred");
        }
        (status, Json(self.body())).into_response()
    }
}
