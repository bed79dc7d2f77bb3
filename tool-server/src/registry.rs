//! Process-global tool registry: written once at startup, read-only
//! thereafter.

use std::collections::HashMap;
use std::sync::{Arc, OnceLock};

use async_trait::async_trait;
use serde_json::Value;

/// The four tool categories a client can filter by.
#[derive(Debug, Clone, Copy, PartialEq, Eq, serde::Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ToolCategory {
    /// ERP-backed tools (account status, payment links, payment claims).
    Erp,
    /// Administrative tools (tickets, escalation).
    Admin,
    /// Knowledge-graph / institutional-information tools.
    Kg,
    /// Notification tools.
    Notif,
}

/// A handler invoked by `call_tool`. Receives the raw argument object and
/// the process-wide mock flag, and returns the tool's `data` payload or a
/// human-readable error.
#[async_trait]
pub trait ToolHandler: Send + Sync {
    /// Executes the tool against `args`.
    async fn call(&self, args: Value, mock_mode: bool) -> Result<Value, String>;
}

#[async_trait]
impl<F, Fut> ToolHandler for F
where
    F: Fn(Value, bool) -> Fut + Send + Sync,
    Fut: std::future::Future<Output = Result<Value, String>> + Send,
{
    async fn call(&self, args: Value, mock_mode: bool) -> Result<Value, String> {
        (self)(args, mock_mode).await
    }
}

/// A registered tool's metadata and handler.
pub struct ToolDefinition {
    /// Stable tool name, e.g. `"account_status"`.
    pub name: &'static str,
    /// Human-readable description, surfaced to the planner.
    pub description: &'static str,
    /// Category for REST filtering and JSON-RPC schema listing.
    pub category: ToolCategory,
    /// JSON-schema-like parameter shape: `{type, properties, required}`.
    pub parameter_schema: Value,
    /// Handler invoked on a live (non-mock-short-circuit) call.
    pub handler: Arc<dyn ToolHandler>,
    /// Fixed payload returned verbatim when `mock_mode` is set and this
    /// field is present, bypassing the handler entirely.
    pub mock_response: Option<Value>,
}

/// The process-global registry: name -> definition.
pub struct ToolRegistry {
    tools: HashMap<&'static str, ToolDefinition>,
}

static REGISTRY: OnceLock<ToolRegistry> = OnceLock::new();

impl ToolRegistry {
    /// Initializes the process-global registry. Must be called exactly
    /// once, before the server starts accepting requests.
    pub fn install(tools: Vec<ToolDefinition>) {
        let map = tools.into_iter().map(|t| (t.name, t)).collect();
        REGISTRY
            .set(Self { tools: map })
            .unwrap_or_else(|_| panic!("tool registry installed more than once"));
    }

    /// Returns the installed registry.
    ///
    /// # Panics
    ///
    /// Panics if [`ToolRegistry::install`] was never called.
    #[must_use]
    pub fn get() -> &'static Self {
        REGISTRY.get().expect("tool registry not installed")
    }

    /// Looks up a tool definition by name.
    #[must_use]
    pub fn find(&self, name: &str) -> Option<&ToolDefinition> {
        self.tools.get(name)
    }

    /// Lists every registered tool, optionally filtered by category.
    #[must_use]
    pub fn list(&self, category: Option<ToolCategory>) -> Vec<&ToolDefinition> {
        self.tools
            .values()
            .filter(|t| category.map_or(true, |c| t.category == c))
            .collect()
    }

    /// `call_tool(name, args, mock_mode)`: unknown tools are not an
    /// error at this layer, they're a `success:false` envelope, matching
    /// the registry's own invocation contract.
    pub async fn call(&self, name: &str, args: Value, mock_mode: bool) -> ToolCallResult {
        let Some(tool) = self.find(name) else {
            return ToolCallResult::not_found();
        };

        if mock_mode {
            if let Some(mock) = &tool.mock_response {
                return ToolCallResult::success(mock.clone());
            }
        }

        match tool.handler.call(args, mock_mode).await {
            Ok(data) => ToolCallResult::success(data),
            Err(error) => ToolCallResult::failure(error),
        }
    }
}

/// The `{success, error, data}` envelope every tool call returns,
/// regardless of transport.
#[derive(Debug, Clone, serde::Serialize)]
pub struct ToolCallResult {
    /// Whether the call succeeded.
    pub success: bool,
    /// Error message, present only when `success` is `false`.
    pub error: Option<String>,
    /// Result payload, present only when `success` is `true`.
    pub data: Option<Value>,
}

impl ToolCallResult {
    fn success(data: Value) -> Self {
        Self { success: true, error: None, data: Some(data) }
    }

    fn failure(error: String) -> Self {
        Self { success: false, error: Some(error), data: None }
    }

    fn not_found() -> Self {
        Self { success: false, error: Some("not found".to_string()), data: None }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn install_once() {
        static INIT: std::sync::Once = std::sync::Once::new();
        INIT.call_once(|| {
            ToolRegistry::install(vec![ToolDefinition {
                name: "echo",
                description: "echoes its input",
                category: ToolCategory::Admin,
                parameter_schema: json!({"type": "object", "properties": {}, "required": []}),
                handler: Arc::new(|args: Value, _mock: bool| async move { Ok(args) }),
                mock_response: Some(json!({"mocked": true})),
            }]);
        });
    }

    #[tokio::test]
    async fn unknown_tool_returns_not_found_envelope() {
        install_once();
        let result = ToolRegistry::get().call("nonexistent", json!({}), false).await;
        assert!(!result.success);
        assert_eq!(result.error.as_deref(), Some("not found"));
    }

    #[tokio::test]
    async fn mock_mode_short_circuits_to_mock_response() {
        install_once();
        let result = ToolRegistry::get().call("echo", json!({"x": 1}), true).await;
        assert!(result.success);
        assert_eq!(result.data, Some(json!({"mocked": true})));
    }

    #[tokio::test]
    async fn live_call_invokes_handler() {
        install_once();
        let result = ToolRegistry::get().call("echo", json!({"x": 1}), false).await;
        assert!(result.success);
        assert_eq!(result.data, Some(json!({"x": 1})));
    }
}
