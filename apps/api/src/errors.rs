use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde_json::json;
use thiserror::Error;
use validator::ValidationErrors;

use crate::auth::AuthError;
use crate::flows::engine::FlowError;
use crate::llm_client::GenerationError;

/// Application-level error type.
/// Implements `IntoResponse` so Axum handlers can return `Result<T, AppError>`.
#[derive(Debug, Error)]
pub enum AppError {
    #[error("Not found: {0}")]
    NotFound(String),

    #[error("Validation error: {0}")]
    Validation(String),

    #[error("Payload too large: {0}")]
    PayloadTooLarge(String),

    #[error(transparent)]
    Auth(#[from] AuthError),

    #[error(transparent)]
    Flow(#[from] FlowError),
}

impl AppError {
    /// A rejected request body. Oversized bodies keep their 413; every other
    /// rejection is reported as a validation error.
    pub fn rejected(status: StatusCode, message: String) -> Self {
        if status == StatusCode::PAYLOAD_TOO_LARGE {
            AppError::PayloadTooLarge(message)
        } else {
            AppError::Validation(message)
        }
    }
}

impl From<ValidationErrors> for AppError {
    fn from(errors: ValidationErrors) -> Self {
        let mut messages: Vec<(String, String)> = errors
            .field_errors()
            .into_iter()
            .flat_map(|(field, errs)| {
                errs.iter().map(move |err| {
                    let message = err
                        .message
                        .as_ref()
                        .map(ToString::to_string)
                        .unwrap_or_else(|| format!("{field}: {}", err.code));
                    (field.to_string(), message)
                })
            })
            .collect();
        messages.sort();
        let message = messages
            .into_iter()
            .map(|(_, message)| message)
            .collect::<Vec<_>>()
            .join(" ");
        AppError::Validation(message)
    }
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let (status, code, message) = match &self {
            AppError::NotFound(msg) => (StatusCode::NOT_FOUND, "NOT_FOUND", msg.clone()),
            AppError::Validation(msg) => {
                (StatusCode::BAD_REQUEST, "VALIDATION_ERROR", msg.clone())
            }
            AppError::PayloadTooLarge(msg) => {
                (StatusCode::PAYLOAD_TOO_LARGE, "PAYLOAD_TOO_LARGE", msg.clone())
            }
            AppError::Auth(e) => (StatusCode::UNAUTHORIZED, "UNAUTHORIZED", e.to_string()),
            AppError::Flow(e) => flow_error_parts(e),
        };

        let body = Json(json!({
            "error": {
                "code": code,
                "message": message
            }
        }));

        (status, body).into_response()
    }
}

fn flow_error_parts(err: &FlowError) -> (StatusCode, &'static str, String) {
    let flow = err.flow();
    match err {
        FlowError::InvalidInput { violation, .. } => (
            StatusCode::BAD_REQUEST,
            "VALIDATION_ERROR",
            violation.to_string(),
        ),
        FlowError::TemplateRender { source, .. } => {
            tracing::error!("Template error in {flow}: {source}");
            (
                StatusCode::INTERNAL_SERVER_ERROR,
                "INTERNAL_ERROR",
                "An internal server error occurred".to_string(),
            )
        }
        FlowError::OutputValidation { violation, .. } => {
            tracing::error!("Invalid output from {flow}: {violation}");
            (
                StatusCode::BAD_GATEWAY,
                "OUTPUT_VALIDATION_ERROR",
                format!(
                    "The AI service returned an invalid response ({})",
                    violation.field
                ),
            )
        }
        FlowError::Upstream { source, .. } => {
            tracing::error!("Generation service error in {flow}: {source}");
            let (status, message) = match source {
                GenerationError::Timeout(_) => (
                    StatusCode::GATEWAY_TIMEOUT,
                    "The AI service did not respond in time",
                ),
                GenerationError::RateLimited => (
                    StatusCode::TOO_MANY_REQUESTS,
                    "The AI service is busy, please try again later",
                ),
                GenerationError::Http(_)
                | GenerationError::Api { .. }
                | GenerationError::MalformedResponse(_) => (
                    StatusCode::BAD_GATEWAY,
                    "An AI processing error occurred",
                ),
            };
            (status, "UPSTREAM_ERROR", message.to_string())
        }
        FlowError::Cancelled { .. } => {
            tracing::warn!("{flow} was cancelled before the AI service replied");
            (
                StatusCode::SERVICE_UNAVAILABLE,
                "CANCELLED",
                "The request was cancelled".to_string(),
            )
        }
    }
}
