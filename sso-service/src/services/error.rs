use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use thiserror::Error;

use crate::dtos::ApiResponse;

/// Terminal failure of a registration request.
#[derive(Error, Debug)]
pub enum ServiceError {
    /// Per-field messages, already itemized for the caller.
    #[error("Validation error: {0}")]
    Validation(String),

    #[error("Email already registered")]
    EmailAlreadyRegistered,

    #[error("Internal server error: {0:#}")]
    Internal(#[from] anyhow::Error),
}

impl ServiceError {
    /// Label used for metrics and structured logs.
    pub fn outcome(&self) -> &'static str {
        match self {
            ServiceError::Validation(_) => "validation_failed",
            ServiceError::EmailAlreadyRegistered => "conflict",
            ServiceError::Internal(_) => "internal_error",
        }
    }
}

impl IntoResponse for ServiceError {
    fn into_response(self) -> Response {
        let (status, message) = match &self {
            ServiceError::Validation(details) => {
                (StatusCode::UNPROCESSABLE_ENTITY, details.clone())
            }
            ServiceError::EmailAlreadyRegistered => {
                (StatusCode::CONFLICT, "user already exists".to_string())
            }
            ServiceError::Internal(e) => {
                tracing::error!(error = %format!("{:#}", e), "Registration failed");
                (
                    StatusCode::INTERNAL_SERVER_ERROR,
                    "internal error".to_string(),
                )
            }
        };

        (status, Json(ApiResponse::error(message))).into_response()
    }
}
