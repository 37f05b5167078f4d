//! Error types for the rewrite router
//!
//! All errors implement `IntoResponse` for Axum handlers. Bodies are plain text so
//! that clients of the chat route see the same shape for validation and upstream
//! failures.

use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
};
use thiserror::Error;

/// Main error type for the application
#[derive(Error, Debug)]
pub enum AppError {
    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Failed to read config file '{path}': {source}")]
    ConfigFileRead {
        path: String,
        #[source]
        source: std::io::Error,
    },

    #[error("Failed to parse config file '{path}': {source}")]
    ConfigParseFailed {
        path: String,
        #[source]
        source: toml::de::Error,
    },

    #[error("Invalid configuration in '{path}': {reason}")]
    ConfigValidationFailed { path: String, reason: String },

    #[error("Invalid request: {0}")]
    Validation(String),

    /// Transport-level failure talking to the backend (DNS, refused, timeout)
    #[error("Error forwarding request to {url}: {reason}")]
    UpstreamConnectivity { url: String, reason: String },

    /// Backend answered with a non-2xx status before any body was streamed
    #[error("Backend at {url} returned HTTP {status}: {detail}")]
    UpstreamStatus {
        url: String,
        status: u16,
        detail: String,
    },

    /// Backend answered 2xx but the payload is not what the protocol requires
    #[error("Invalid response from backend at {url}: {reason}")]
    UpstreamProtocol { url: String, reason: String },

    #[error("Internal error: {0}")]
    Internal(String),
}

impl AppError {
    /// Short, bounded label used for metrics and log fields
    pub fn error_type(&self) -> &'static str {
        match self {
            Self::Config(_)
            | Self::ConfigFileRead { .. }
            | Self::ConfigParseFailed { .. }
            | Self::ConfigValidationFailed { .. } => "config",
            Self::Validation(_) => "validation",
            Self::UpstreamConnectivity { .. } => "connectivity",
            Self::UpstreamStatus { .. } => "status",
            Self::UpstreamProtocol { .. } => "protocol",
            Self::Internal(_) => "internal",
        }
    }

    /// HTTP status returned to the client for this error
    pub fn status_code(&self) -> StatusCode {
        match self {
            Self::Validation(_) => StatusCode::BAD_REQUEST,
            Self::UpstreamConnectivity { .. } | Self::UpstreamStatus { .. } => {
                StatusCode::BAD_GATEWAY
            }
            Self::UpstreamProtocol { .. } => StatusCode::INTERNAL_SERVER_ERROR,
            Self::Config(_)
            | Self::ConfigFileRead { .. }
            | Self::ConfigParseFailed { .. }
            | Self::ConfigValidationFailed { .. }
            | Self::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let status = self.status_code();
        (status, self.to_string()).into_response()
    }
}

/// Convenience type alias for Results
pub type AppResult<T> = Result<T, AppError>;
