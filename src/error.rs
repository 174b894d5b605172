//! Application error type and its HTTP mapping.
//!
//! Validation failures become `400` with a field list. Everything else becomes
//! `500` with a generic body; the detail only goes to the log.

use std::any::Any;

use axum::Json;
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::{debug, error};
use utoipa::ToSchema;

use crate::validation::{FieldError, ValidationReport};

/// Errors produced while building, serving or handling requests.
#[derive(Debug, Error)]
pub enum AppError {
    #[error("validation failed: {0}")]
    Validation(ValidationReport),

    #[error("invalid route: {0}")]
    Route(String),

    #[error("configuration error: {0}")]
    Config(String),

    #[error("i/o error: {0}")]
    Io(#[from] std::io::Error),

    #[error(transparent)]
    Internal(#[from] anyhow::Error),
}

impl AppError {
    /// Shortcut for a one-field validation failure raised from a handler.
    pub fn invalid(field: impl Into<String>, message: impl Into<String>) -> Self {
        Self::Validation(ValidationReport::single(field, message))
    }

    pub fn status(&self) -> StatusCode {
        match self {
            Self::Validation(_) => StatusCode::BAD_REQUEST,
            _ => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

impl From<ValidationReport> for AppError {
    fn from(report: ValidationReport) -> Self {
        Self::Validation(report)
    }
}

impl From<validator::ValidationErrors> for AppError {
    fn from(errors: validator::ValidationErrors) -> Self {
        Self::Validation(ValidationReport::from_validator(&errors))
    }
}

impl From<config::ConfigError> for AppError {
    fn from(err: config::ConfigError) -> Self {
        Self::Config(err.to_string())
    }
}

/// Body of every error response.
#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct ErrorResponse {
    /// Machine readable error code.
    pub error: String,
    pub message: String,
    /// Failed fields, present on validation errors only.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub errors: Vec<FieldError>,
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let status = self.status();
        let body = match self {
            Self::Validation(report) => {
                debug!(%report, "request validation failed");
                ErrorResponse {
                    error: "validation_error".to_string(),
                    message: "Request validation failed".to_string(),
                    errors: report.into_errors(),
                }
            }
            other => {
                error!(error = %other, "request failed");
                ErrorResponse::internal()
            }
        };

        (status, Json(body)).into_response()
    }
}

impl ErrorResponse {
    fn internal() -> Self {
        Self {
            error: "internal_error".to_string(),
            message: "Internal server error".to_string(),
            errors: Vec::new(),
        }
    }
}

/// Turns a handler panic caught by `CatchPanicLayer` into the generic 500.
pub(crate) fn panic_response(panic: Box<dyn Any + Send + 'static>) -> Response {
    let detail = panic
        .downcast_ref::<String>()
        .map(String::as_str)
        .or_else(|| panic.downcast_ref::<&str>().copied())
        .unwrap_or("unknown panic payload");
    error!(panic = %detail, "handler panicked");

    (StatusCode::INTERNAL_SERVER_ERROR, Json(ErrorResponse::internal())).into_response()
}
