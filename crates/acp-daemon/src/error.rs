//! API error type: maps domain failures to structured HTTP responses.
//!
//! Policy decisions are not errors: `deny` / `require_approval` travel in
//! a 200 body. Everything here is a request that could not be served.

use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use thiserror::Error;
use tracing::error;

#[derive(Error, Debug)]
pub enum ApiError {
    /// Malformed input; `code` is the machine-readable reason
    /// (e.g. `lesson_context_required`, `evidence_run_mismatch`).
    #[error("validation error: {code}")]
    Validation { code: String, message: String },

    /// Unknown id within the workspace.
    #[error("not found: {0}")]
    NotFound(String),

    /// State conflict (wrong lifecycle state, contradictory decision).
    #[error("conflict: {0}")]
    Conflict(String),

    /// Database or other transient failure; idempotent calls may retry.
    #[error("internal error")]
    Internal(#[from] anyhow::Error),
}

impl ApiError {
    pub fn validation(code: &str, message: impl Into<String>) -> Self {
        ApiError::Validation {
            code: code.to_string(),
            message: message.into(),
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let (status, code, message) = match &self {
            ApiError::Validation { code, message } => {
                (StatusCode::BAD_REQUEST, code.clone(), message.clone())
            }
            ApiError::NotFound(what) => (
                StatusCode::NOT_FOUND,
                "not_found".to_string(),
                what.clone(),
            ),
            ApiError::Conflict(what) => {
                (StatusCode::CONFLICT, "conflict".to_string(), what.clone())
            }
            ApiError::Internal(err) => {
                // Full chain to the log; a generic message to the client.
                error!(error = ?err, "internal error");
                (
                    StatusCode::INTERNAL_SERVER_ERROR,
                    "internal".to_string(),
                    "internal error".to_string(),
                )
            }
        };

        let body = serde_json::json!({
            "error": {
                "code": code,
                "message": message,
            }
        });
        (status, axum::Json(body)).into_response()
    }
}
