//! Typed errors for the tool server's transports.

use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use serde_json::json;

/// Errors the REST transport can raise directly (tool invocation failures
/// are carried inside the `{success, error, data}` envelope instead, per
/// the registry's own contract).
#[derive(Debug, thiserror::Error)]
pub enum ToolServerError {
    /// No tool with this name is registered.
    #[error("tool not found")]
    UnknownTool,
}

impl IntoResponse for ToolServerError {
    fn into_response(self) -> Response {
        let (status, kind) = match &self {
            Self::UnknownTool => (StatusCode::NOT_FOUND, "not_found"),
        };
        (status, Json(json!({ "error": kind, "message": self.to_string() }))).into_response()
    }
}
