//! Error handling module

use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use thiserror::Error;

/// Failures of the vendor adapters, shared by the setup wizard and the poller
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ApiError {
    #[error("Invalid credentials")]
    InvalidAuth,

    #[error("Cannot connect: {0}")]
    CannotConnect(String),

    #[error("No devices found on the account")]
    NoDevices,

    #[error("Unexpected error: {0}")]
    Unknown(String),
}

impl ApiError {
    /// Error code shown by the setup wizard
    pub fn code(&self) -> &'static str {
        match self {
            ApiError::InvalidAuth => "invalid_auth",
            ApiError::CannotConnect(_) => "cannot_connect",
            ApiError::NoDevices => "no_devices",
            ApiError::Unknown(_) => "unknown",
        }
    }
}

impl From<reqwest::Error> for ApiError {
    fn from(e: reqwest::Error) -> Self {
        if e.is_decode() {
            ApiError::Unknown(format!("Malformed response: {}", e))
        } else {
            ApiError::CannotConnect(e.to_string())
        }
    }
}

#[derive(Error, Debug)]
pub enum AppError {
    #[error("Not found: {0}")]
    NotFound(String),

    #[error("Conflict: {0}")]
    Conflict(String),

    #[error("Internal server error: {0}")]
    InternalError(String),

    #[error("Configuration error: {0}")]
    ConfigError(String),

    #[error("Vendor API error: {0}")]
    Api(#[from] ApiError),
}

impl From<std::io::Error> for AppError {
    fn from(e: std::io::Error) -> Self {
        AppError::InternalError(format!("I/O error: {}", e))
    }
}

impl From<serde_json::Error> for AppError {
    fn from(e: serde_json::Error) -> Self {
        AppError::InternalError(format!("JSON error: {}", e))
    }
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let (status, message) = match &self {
            AppError::NotFound(msg) => (StatusCode::NOT_FOUND, msg.clone()),
            AppError::Conflict(msg) => (StatusCode::CONFLICT, msg.clone()),
            AppError::InternalError(msg) => (StatusCode::INTERNAL_SERVER_ERROR, msg.clone()),
            AppError::ConfigError(msg) => (StatusCode::UNPROCESSABLE_ENTITY, msg.clone()),
            AppError::Api(e) => (StatusCode::BAD_GATEWAY, e.to_string()),
        };

        let body = Json(serde_json::json!({
            "error": message,
            "status": status.as_u16()
        }));

        (status, body).into_response()
    }
}
