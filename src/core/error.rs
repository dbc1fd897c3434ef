//! # Error Handling Module
//!
//! This module defines every error the gateway can produce and how each one is
//! presented to a caller. Errors are plain data built with the `thiserror` crate,
//! and each variant knows its HTTP status code and the short public message that
//! goes into the response body.
//!
//! ## Error Taxonomy
//!
//! - **Routing errors** (`InvalidPath`, `ServiceNotFound`): the caller asked for
//!   something the gateway cannot route. Client-visible 404, never retried.
//! - **Upstream unavailability** (`ServiceUnavailable`): the backend
//!   could not be reached or did not answer in time. Client-visible 503.
//! - **Configuration errors** (`Configuration`): detected at startup, abort the
//!   process before the listener is bound.
//!
//! ## Rust Concepts Used
//!
//! - `Result<T, E>` with the `?` operator for explicit error propagation
//! - `IntoResponse` so handlers can return `GatewayResult<Response>` directly

use axum::body::Body;
use axum::http::{header, HeaderValue, StatusCode};
use axum::response::{IntoResponse, Response};
use thiserror::Error;

/// Main result type used throughout the gateway
pub type GatewayResult<T> = Result<T, GatewayError>;

/// Error types for the gateway
///
/// The `#[error("...")]` text is the internal description used in logs. What the
/// caller sees is [`GatewayError::client_message`].
#[derive(Debug, Error, Clone)]
pub enum GatewayError {
    /// Configuration-related errors (missing backend URL, invalid values, etc.)
    #[error("Configuration error: {message}")]
    Configuration { message: String },

    /// The request path does not have the `/<prefix>/<service>` shape
    #[error("Invalid path: {path}")]
    InvalidPath { path: String },

    /// The service token in the path has no registered backend
    #[error("Service not found: {service}")]
    ServiceNotFound { service: String },

    /// Upstream service is unavailable, unreachable or timed out
    #[error("Service unavailable: {service} - {reason}")]
    ServiceUnavailable { service: String, reason: String },

    /// Request body exceeded the configured size limit
    #[error("Request body exceeds {limit} bytes")]
    PayloadTooLarge { limit: usize },

    /// Internal server errors for unexpected failures
    #[error("Internal server error: {message}")]
    Internal { message: String },
}

impl GatewayError {
    /// Create a configuration error with a custom message
    pub fn config<S: Into<String>>(message: S) -> Self {
        Self::Configuration {
            message: message.into(),
        }
    }

    /// Create an invalid path error for the given request path
    pub fn invalid_path<S: Into<String>>(path: S) -> Self {
        Self::InvalidPath { path: path.into() }
    }

    /// Create a service not found error for the given service token
    pub fn service_not_found<S: Into<String>>(service: S) -> Self {
        Self::ServiceNotFound {
            service: service.into(),
        }
    }

    /// Create a service unavailable error
    pub fn service_unavailable<S: Into<String>, R: Into<String>>(service: S, reason: R) -> Self {
        Self::ServiceUnavailable {
            service: service.into(),
            reason: reason.into(),
        }
    }

    /// Create an internal error with a custom message
    pub fn internal<S: Into<String>>(message: S) -> Self {
        Self::Internal {
            message: message.into(),
        }
    }

    /// Get the appropriate HTTP status code for this error
    pub fn status_code(&self) -> StatusCode {
        match self {
            Self::InvalidPath { .. } => StatusCode::NOT_FOUND,
            Self::ServiceNotFound { .. } => StatusCode::NOT_FOUND,
            Self::ServiceUnavailable { .. } => StatusCode::SERVICE_UNAVAILABLE,
            Self::PayloadTooLarge { .. } => StatusCode::PAYLOAD_TOO_LARGE,
            Self::Configuration { .. } => StatusCode::INTERNAL_SERVER_ERROR,
            Self::Internal { .. } => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    /// Get a string representation of the error type for logs
    pub fn error_type(&self) -> &'static str {
        match self {
            Self::Configuration { .. } => "configuration_error",
            Self::InvalidPath { .. } => "invalid_path",
            Self::ServiceNotFound { .. } => "service_not_found",
            Self::ServiceUnavailable { .. } => "service_unavailable",
            Self::PayloadTooLarge { .. } => "payload_too_large",
            Self::Internal { .. } => "internal_error",
        }
    }

    /// Short message written to the response body
    ///
    /// Internal details (backend addresses, parser messages) stay in the logs.
    pub fn client_message(&self) -> &'static str {
        match self {
            Self::InvalidPath { .. } => "Invalid path",
            Self::ServiceNotFound { .. } => "Service not found",
            Self::ServiceUnavailable { .. } => "Service unavailable",
            Self::PayloadTooLarge { .. } => "Payload too large",
            Self::Configuration { .. } | Self::Internal { .. } => "Internal server error",
        }
    }
}

/// Convert errors into plain-text HTTP responses
///
/// Bodies are deliberately short: `Invalid path`, `Service not found`,
/// `Service unavailable`. CORS headers are added by the surrounding middleware.
impl IntoResponse for GatewayError {
    fn into_response(self) -> Response {
        let mut response = Response::new(Body::from(self.client_message()));
        *response.status_mut() = self.status_code();

        let headers = response.headers_mut();
        headers.insert(
            header::CONTENT_TYPE,
            HeaderValue::from_static("text/plain; charset=utf-8"),
        );
        headers.insert(
            header::X_CONTENT_TYPE_OPTIONS,
            HeaderValue::from_static("nosniff"),
        );

        response
    }
}
