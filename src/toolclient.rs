//! Typed HTTP client to the tool server, used by specialists and the
//! code-planner. Grounded on the provider structs' one-`reqwest::Client`-
//! per-collaborator idiom.

use async_trait::async_trait;
use serde::Deserialize;
use serde_json::Value;
use std::collections::HashMap;
use std::sync::Mutex;

use crate::errors::GestorError;

/// Result of one `call_tool` round-trip.
#[derive(Debug, Clone, Deserialize)]
pub struct ToolCallResult {
    /// Whether the tool reported success.
    pub success: bool,
    /// Error message, if any.
    pub error: Option<String>,
    /// Structured data returned by the tool, if any.
    pub data: Option<Value>,
}

/// Anything that can invoke a named tool, abstracting over the real
/// HTTP-backed `ToolClient` so specialists and the code-planner executor
/// are testable against a canned backend.
#[async_trait]
pub trait ToolInvoker: Send + Sync {
    /// Invokes `name` with `args`.
    ///
    /// # Errors
    ///
    /// Returns an error only on transport-level failure.
    async fn call_tool(&self, name: &str, args: Value) -> Result<ToolCallResult, GestorError>;
}

/// Singleton-per-process client to `tool-server`'s REST surface.
pub struct ToolClient {
    http: reqwest::Client,
    base_url: String,
}

impl ToolClient {
    /// Builds a client against `base_url` (the tool server's `MCP_TOOLS_URL`).
    #[must_use]
    pub fn new(base_url: impl Into<String>) -> Self {
        Self {
            http: reqwest::Client::new(),
            base_url: base_url.into(),
        }
    }

    /// Invokes `name` with `args` via `POST /tools/{name}/call`.
    ///
    /// Unknown tools and handler-level failures both come back as an
    /// `Ok(ToolCallResult { success: false, .. })` per invariant 3 — only
    /// transport-level failures surface as `Err`.
    ///
    /// # Errors
    ///
    /// Returns an error if the tool server is unreachable or returns a
    /// non-JSON body.
    pub async fn call_tool(&self, name: &str, args: Value) -> Result<ToolCallResult, GestorError> {
        let response = self
            .http
            .post(format!("{}/tools/{name}/call", self.base_url))
            .json(&args)
            .send()
            .await
            .map_err(|e| GestorError::UpstreamUnavailable(e.to_string()))?;

        response
            .json::<ToolCallResult>()
            .await
            .map_err(|e| GestorError::UpstreamUnavailable(e.to_string()))
    }

    /// Fetches tool descriptions for the code-planner's prompt assembly
    /// via `GET /tools`.
    ///
    /// # Errors
    ///
    /// Returns an error if the tool server is unreachable.
    pub async fn list_tools(&self) -> Result<Value, GestorError> {
        let response = self
            .http
            .get(format!("{}/tools", self.base_url))
            .send()
            .await
            .map_err(|e| GestorError::UpstreamUnavailable(e.to_string()))?;
        response
            .json()
            .await
            .map_err(|e| GestorError::UpstreamUnavailable(e.to_string()))
    }
}

#[async_trait]
impl ToolInvoker for ToolClient {
    async fn call_tool(&self, name: &str, args: Value) -> Result<ToolCallResult, GestorError> {
        Self::call_tool(self, name, args).await
    }
}

/// Test double returning scripted results keyed by tool name, grounded on
/// the kernel test suite's `MockTool` builders.
#[derive(Default)]
pub struct MockToolInvoker {
    scripted: Mutex<HashMap<String, ToolCallResult>>,
}

impl MockToolInvoker {
    /// Builds an empty mock; unscripted calls return `{success:false,
    /// error:"not found"}` per invariant 3.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Scripts the result for `name`.
    pub fn script(&self, name: impl Into<String>, result: ToolCallResult) {
        self.scripted
            .lock()
            .expect("mock tool invoker mutex")
            .insert(name.into(), result);
    }
}

#[async_trait]
impl ToolInvoker for MockToolInvoker {
    async fn call_tool(&self, name: &str, _args: Value) -> Result<ToolCallResult, GestorError> {
        let scripted = self.scripted.lock().expect("mock tool invoker mutex");
        Ok(scripted.get(name).cloned().unwrap_or(ToolCallResult {
            success: false,
            error: Some("not found".to_string()),
            data: None,
        }))
    }
}
