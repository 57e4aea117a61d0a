use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use serde_json::json;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum AppError {
    #[error("validation: {0}")]
    Validation(String),

    #[error("not found: {0}")]
    NotFound(String),

    #[error("conflict: {0}")]
    Conflict(String),

    #[error("illegal transition: {0}")]
    IllegalTransition(String),

    #[error("upstream failure ({collaborator}): {reason}")]
    Upstream { collaborator: String, reason: String },

    #[error("internal error: {0}")]
    Internal(String),
}

impl AppError {
    pub fn upstream(collaborator: &str, reason: impl Into<String>) -> Self {
        Self::Upstream {
            collaborator: collaborator.to_string(),
            reason: reason.into(),
        }
    }

    /// Stable machine-readable kind carried on every error response.
    pub fn kind(&self) -> &'static str {
        match self {
            AppError::Validation(_) => "validation_error",
            AppError::NotFound(_) => "not_found",
            AppError::Conflict(_) => "conflict",
            AppError::IllegalTransition(_) => "illegal_transition",
            AppError::Upstream { .. } => "upstream_error",
            AppError::Internal(_) => "internal_error",
        }
    }
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let status = match &self {
            AppError::Validation(_) => StatusCode::BAD_REQUEST,
            AppError::NotFound(_) => StatusCode::NOT_FOUND,
            AppError::Conflict(_) | AppError::IllegalTransition(_) => StatusCode::CONFLICT,
            AppError::Upstream { .. } => StatusCode::BAD_GATEWAY,
            AppError::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
        };

        let body = Json(json!({
            "kind": self.kind(),
            "error": self.to_string()
        }));

        (status, body).into_response()
    }
}
