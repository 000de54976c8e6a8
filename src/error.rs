//! Error types for signin-starter
//!
//! Request-level failures are converted to `AppError`, which implements
//! `IntoResponse`. Token decode failures never reach this type: the loader
//! recovers them to "no session".

use axum::http::StatusCode;
use axum::response::{Html, IntoResponse, Response};
use thiserror::Error;

use crate::session::ValidationErrors;

/// Application-wide error type
#[derive(Debug, Error)]
pub enum AppError {
    /// Decoded session claims failed schema validation (500)
    #[error("Invalid session claims: {0}")]
    InvalidSession(#[from] ValidationErrors),

    /// OAuth provider returned an unusable response (502)
    #[error("OAuth error: {0}")]
    OAuth(String),

    /// HTTP client error (502)
    #[error("HTTP client error: {0}")]
    HttpClient(#[from] reqwest::Error),

    /// Configuration error (500)
    #[error("Configuration error: {0}")]
    Config(String),

    /// Encryption/decryption error (500)
    #[error("Encryption error: {0}")]
    Encryption(String),

    /// Internal server error (500)
    #[error("Internal error: {0}")]
    Internal(#[from] anyhow::Error),
}

impl From<config::ConfigError> for AppError {
    fn from(err: config::ConfigError) -> Self {
        AppError::Config(err.to_string())
    }
}

impl AppError {
    fn status_and_type(&self) -> (StatusCode, &'static str) {
        match self {
            AppError::InvalidSession(_) => (StatusCode::INTERNAL_SERVER_ERROR, "invalid_session"),
            AppError::OAuth(_) => (StatusCode::BAD_GATEWAY, "oauth"),
            AppError::HttpClient(_) => (StatusCode::BAD_GATEWAY, "http_client"),
            AppError::Config(_) => (StatusCode::INTERNAL_SERVER_ERROR, "config"),
            AppError::Encryption(_) => (StatusCode::INTERNAL_SERVER_ERROR, "encryption"),
            AppError::Internal(_) => (StatusCode::INTERNAL_SERVER_ERROR, "internal"),
        }
    }
}

impl IntoResponse for AppError {
    /// Convert error to an HTML error page
    ///
    /// Server-side failures only ever show a generic message; the detail
    /// goes to the log.
    fn into_response(self) -> Response {
        let (status, error_type) = self.status_and_type();

        tracing::error!(error = %self, error_type, "Request failed");

        crate::metrics::ERRORS_TOTAL
            .with_label_values(&[error_type])
            .inc();

        let body = format!(
            "<!DOCTYPE html><html><head><meta charset=\"utf-8\"><title>{status}</title></head>\
             <body><h1>{status}</h1><p>Application error</p></body></html>"
        );

        (status, Html(body)).into_response()
    }
}
