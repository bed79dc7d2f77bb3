//! Typed error enum and its HTTP mapping.

use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use serde_json::json;

/// Errors the ERP service's handlers and repository layer can raise.
#[derive(Debug, thiserror::Error)]
pub enum ErpError {
    /// Requested entity does not exist.
    #[error("not found")]
    NotFound,
    /// Installment already has a successful payment.
    #[error("installment already paid")]
    AlreadyPaid,
    /// Malformed request (negative amount, missing field).
    #[error("validation error: {0}")]
    Validation(String),
    /// Underlying database failure.
    #[error("database error: {0}")]
    Database(#[from] sqlx::Error),
}

impl IntoResponse for ErpError {
    fn into_response(self) -> Response {
        let (status, kind) = match &self {
            Self::NotFound => (StatusCode::NOT_FOUND, "not_found"),
            Self::AlreadyPaid => (StatusCode::BAD_REQUEST, "already_paid"),
            Self::Validation(_) => (StatusCode::UNPROCESSABLE_ENTITY, "validation_error"),
            Self::Database(_) => (StatusCode::INTERNAL_SERVER_ERROR, "database_error"),
        };
        (status, Json(json!({ "error": kind, "message": self.to_string() }))).into_response()
    }
}
