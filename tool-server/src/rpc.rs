//! JSON-RPC transport: `POST /mcp` with methods `tools/list`,
//! `tools/call`, `tools/schema`, `ping`.

use axum::extract::State;
use axum::routing::post;
use axum::{Json, Router};
use serde::Deserialize;
use serde_json::{json, Value};

use crate::registry::{ToolCategory, ToolRegistry};
use crate::AppState;

const METHOD_NOT_FOUND: i64 = -32601;
const INTERNAL_ERROR: i64 = -32603;

/// Builds the JSON-RPC router.
pub fn router() -> Router<AppState> {
    Router::new().route("/mcp", post(handle_rpc))
}

#[derive(Debug, Deserialize)]
struct RpcRequest {
    #[allow(dead_code)]
    jsonrpc: Option<String>,
    method: String,
    params: Option<Value>,
    id: Value,
}

async fn handle_rpc(State(state): State<AppState>, Json(request): Json<RpcRequest>) -> Json<Value> {
    let result = match request.method.as_str() {
        "ping" => Ok(json!("pong")),
        "tools/list" => Ok(handle_list(&request.params)),
        "tools/schema" => handle_schema(&request.params),
        "tools/call" => handle_call(&request.params, state.mock_mode).await,
        _ => Err((METHOD_NOT_FOUND, "method not found".to_string())),
    };

    match result {
        Ok(value) => Json(json!({ "jsonrpc": "2.0", "result": value, "id": request.id })),
        Err((code, message)) => Json(json!({
            "jsonrpc": "2.0",
            "error": { "code": code, "message": message },
            "id": request.id
        })),
    }
}

fn handle_list(params: &Option<Value>) -> Value {
    let category = params
        .as_ref()
        .and_then(|p| p.get("category"))
        .and_then(Value::as_str)
        .and_then(parse_category);
    let tools: Vec<Value> = ToolRegistry::get()
        .list(category)
        .into_iter()
        .map(|t| json!({ "name": t.name, "description": t.description, "category": t.category }))
        .collect();
    json!({ "tools": tools })
}

fn handle_schema(params: &Option<Value>) -> Result<Value, (i64, String)> {
    let name = params
        .as_ref()
        .and_then(|p| p.get("name"))
        .and_then(Value::as_str)
        .ok_or((INTERNAL_ERROR, "missing name".to_string()))?;
    let tool = ToolRegistry::get()
        .find(name)
        .ok_or((METHOD_NOT_FOUND, "tool not found".to_string()))?;
    Ok(json!({ "name": tool.name, "parameters": tool.parameter_schema }))
}

async fn handle_call(params: &Option<Value>, mock_mode: bool) -> Result<Value, (i64, String)> {
    let params = params.as_ref().ok_or((INTERNAL_ERROR, "missing params".to_string()))?;
    let name = params
        .get("name")
        .and_then(Value::as_str)
        .ok_or((INTERNAL_ERROR, "missing tool name".to_string()))?;
    let arguments = params.get("arguments").cloned().unwrap_or(json!({}));
    let result = ToolRegistry::get().call(name, arguments, mock_mode).await;
    Ok(json!(result))
}

fn parse_category(raw: &str) -> Option<ToolCategory> {
    match raw {
        "erp" => Some(ToolCategory::Erp),
        "admin" => Some(ToolCategory::Admin),
        "kg" => Some(ToolCategory::Kg),
        "notif" => Some(ToolCategory::Notif),
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::registry::ToolDefinition;
    use axum::body::Body;
    use axum::http::{Request, StatusCode};
    use std::sync::Arc;
    use tower::ServiceExt;

    fn install_test_registry() {
        static INIT: std::sync::Once = std::sync::Once::new();
        INIT.call_once(|| {
            ToolRegistry::install(vec![ToolDefinition {
                name: "ping_tool",
                description: "test tool",
                category: ToolCategory::Admin,
                parameter_schema: json!({"type": "object", "properties": {}, "required": []}),
                handler: Arc::new(|_args: Value, _mock: bool| async move { Ok(json!({"pong": true})) }),
                mock_response: None,
            }]);
        });
    }

    #[tokio::test]
    async fn unknown_method_returns_method_not_found() {
        install_test_registry();
        let app = router().with_state(AppState { mock_mode: false });
        let body = json!({"jsonrpc": "2.0", "method": "bogus", "id": 1}).to_string();
        let response = app
            .oneshot(
                Request::builder()
                    .method("POST")
                    .uri("/mcp")
                    .header("content-type", "application/json")
                    .body(Body::from(body))
                    .unwrap(),
            )
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);
        let bytes = axum::body::to_bytes(response.into_body(), usize::MAX).await.unwrap();
        let json: Value = serde_json::from_slice(&bytes).unwrap();
        assert_eq!(json["error"]["code"], METHOD_NOT_FOUND);
    }

    #[tokio::test]
    async fn tools_call_routes_to_registry() {
        install_test_registry();
        let app = router().with_state(AppState { mock_mode: false });
        let body = json!({
            "jsonrpc": "2.0",
            "method": "tools/call",
            "params": {"name": "ping_tool", "arguments": {}},
            "id": 2
        })
        .to_string();
        let response = app
            .oneshot(
                Request::builder()
                    .method("POST")
                    .uri("/mcp")
                    .header("content-type", "application/json")
                    .body(Body::from(body))
                    .unwrap(),
            )
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);
        let bytes = axum::body::to_bytes(response.into_body(), usize::MAX).await.unwrap();
        let json: Value = serde_json::from_slice(&bytes).unwrap();
        assert_eq!(json["result"]["success"], true);
    }
}
