//! Orchestrator-wide error kinds and their HTTP mapping.
//!
//! One variant per failure kind named in the error handling design: the
//! synthesizer never surfaces these directly to a user, it reformulates
//! them; the `IntoResponse` impl below only matters at the `/webhook/*`
//! boundary.

use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use serde_json::json;

/// Errors that can surface at the orchestrator's HTTP boundary.
#[derive(Debug, thiserror::Error)]
pub enum GestorError {
    /// ERP/mirror lookup miss.
    #[error("not found: {0}")]
    NotFound(String),
    /// Installment already has a successful payment.
    #[error("already paid: {0}")]
    AlreadyPaid(String),
    /// Malformed request body or parameters.
    #[error("validation error: {0}")]
    Validation(String),
    /// ERP, LLM, or tool server unreachable or erroring.
    #[error("upstream unavailable: {0}")]
    UpstreamUnavailable(String),
    /// Model output failed to parse as the expected JSON shape.
    #[error("LLM output parse error: {0}")]
    LlmParse(String),
    /// Code-planner DSL program raised during interpretation.
    #[error("execution error: {0}")]
    Execution(String),
    /// A bounded operation exceeded its deadline.
    #[error("timeout: {0}")]
    Timeout(String),
    /// Persistence layer failure.
    #[error("database error: {0}")]
    Database(#[from] sqlx::Error),
    /// Outbound HTTP call failure (ERP adapter, tool client, messaging send).
    #[error("http error: {0}")]
    Http(#[from] reqwest::Error),
}

impl IntoResponse for GestorError {
    fn into_response(self) -> Response {
        let (status, kind) = match &self {
            Self::NotFound(_) => (StatusCode::NOT_FOUND, "not_found"),
            Self::AlreadyPaid(_) => (StatusCode::BAD_REQUEST, "already_paid"),
            Self::Validation(_) => (StatusCode::UNPROCESSABLE_ENTITY, "validation_error"),
            Self::UpstreamUnavailable(_) | Self::Http(_) => {
                (StatusCode::BAD_GATEWAY, "upstream_unavailable")
            }
            Self::LlmParse(_) => (StatusCode::INTERNAL_SERVER_ERROR, "llm_parse_error"),
            Self::Execution(_) => (StatusCode::INTERNAL_SERVER_ERROR, "execution_error"),
            Self::Timeout(_) => (StatusCode::GATEWAY_TIMEOUT, "timeout"),
            Self::Database(_) => (StatusCode::INTERNAL_SERVER_ERROR, "database_error"),
        };
        let body = json!({ "error": kind, "message": self.to_string() });
        (status, axum::Json(body)).into_response()
    }
}
