//! API error handling

use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use certy_records::RecordError;
use serde::{Deserialize, Serialize};
use utoipa::ToSchema;

/// API error response
#[derive(Debug, Serialize, Deserialize, ToSchema)]
pub struct ApiError {
    /// Error code
    pub code: String,
    /// Human-readable message
    pub message: String,
    /// Additional details
    #[serde(skip_serializing_if = "Option::is_none")]
    pub details: Option<String>,
}

impl ApiError {
    pub fn new(code: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            code: code.into(),
            message: message.into(),
            details: None,
        }
    }

    pub fn with_details(mut self, details: impl Into<String>) -> Self {
        self.details = Some(details.into());
        self
    }

    pub fn not_found(resource: &str) -> Self {
        Self::new("NOT_FOUND", format!("{resource} not found"))
    }

    pub fn bad_request(message: impl Into<String>) -> Self {
        Self::new("BAD_REQUEST", message)
    }

    pub fn internal_error() -> Self {
        Self::new("INTERNAL_ERROR", "Internal server error")
    }
}

/// Application error type
#[derive(Debug)]
pub enum AppError {
    NotFound(String),
    BadRequest(String),
    Internal(String),
    Storage(String),
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let (status, error) = match self {
            AppError::NotFound(what) => (StatusCode::NOT_FOUND, ApiError::not_found(&what)),
            AppError::BadRequest(msg) => (StatusCode::BAD_REQUEST, ApiError::bad_request(msg)),
            AppError::Internal(msg) => (
                StatusCode::INTERNAL_SERVER_ERROR,
                ApiError::internal_error().with_details(msg),
            ),
            AppError::Storage(msg) => (
                StatusCode::INTERNAL_SERVER_ERROR,
                ApiError::new("STORAGE_ERROR", "File storage operation failed").with_details(msg),
            ),
        };

        (status, Json(error)).into_response()
    }
}

impl From<anyhow::Error> for AppError {
    fn from(err: anyhow::Error) -> Self {
        AppError::Internal(err.to_string())
    }
}

impl From<std::io::Error> for AppError {
    fn from(err: std::io::Error) -> Self {
        AppError::Storage(err.to_string())
    }
}

impl From<tokio::task::JoinError> for AppError {
    fn from(err: tokio::task::JoinError) -> Self {
        AppError::Internal(format!("background work failed: {err}"))
    }
}

impl From<certy_core::CertyError> for AppError {
    fn from(err: certy_core::CertyError) -> Self {
        use certy_core::CertyError;

        match err {
            CertyError::NotFound(what) => AppError::NotFound(what),
            CertyError::ValidationError(msg) | CertyError::InvalidInput(msg) => {
                AppError::BadRequest(msg)
            }
            CertyError::StorageError(msg) => AppError::Storage(msg),
            CertyError::ModelUnavailable(msg) => {
                AppError::Internal(format!("Model unavailable: {msg}"))
            }
            CertyError::ConfigError(msg) => AppError::Internal(format!("Configuration error: {msg}")),
            CertyError::Other(err) => AppError::Internal(err.to_string()),
        }
    }
}

impl From<RecordError> for AppError {
    fn from(err: RecordError) -> Self {
        match err {
            RecordError::IoError { .. } => AppError::Storage(err.to_string()),
            other => AppError::BadRequest(other.to_string()),
        }
    }
}

impl From<certy_delivery::DeliveryError> for AppError {
    fn from(err: certy_delivery::DeliveryError) -> Self {
        AppError::Internal(err.to_string())
    }
}
