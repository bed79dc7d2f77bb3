//! REST transport: `GET /tools[?category=]`, `GET /tools/{name}`,
//! `POST /tools/{name}/call`.

use axum::extract::{Path, Query, State};
use axum::routing::{get, post};
use axum::{Json, Router};
use serde::Deserialize;
use serde_json::{json, Value};

use crate::errors::ToolServerError;
use crate::registry::{ToolCategory, ToolRegistry};
use crate::AppState;

/// Builds the REST router.
pub fn router() -> Router<AppState> {
    Router::new()
        .route("/tools", get(list_tools))
        .route("/tools/:name", get(describe_tool))
        .route("/tools/:name/call", post(call_tool))
}

#[derive(Debug, Deserialize)]
struct CategoryQuery {
    category: Option<String>,
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

async fn list_tools(Query(query): Query<CategoryQuery>) -> Json<Value> {
    let category = query.category.as_deref().and_then(parse_category);
    let tools: Vec<Value> = ToolRegistry::get()
        .list(category)
        .into_iter()
        .map(|t| {
            json!({
                "name": t.name,
                "description": t.description,
                "category": t.category,
                "parameters": t.parameter_schema,
            })
        })
        .collect();
    Json(json!({ "tools": tools }))
}

async fn describe_tool(Path(name): Path<String>) -> Result<Json<Value>, ToolServerError> {
    let tool = ToolRegistry::get().find(&name).ok_or(ToolServerError::UnknownTool)?;
    Ok(Json(json!({
        "name": tool.name,
        "description": tool.description,
        "category": tool.category,
        "parameters": tool.parameter_schema,
    })))
}

async fn call_tool(
    State(state): State<AppState>,
    Path(name): Path<String>,
    Json(args): Json<Value>,
) -> Json<Value> {
    let result = ToolRegistry::get().call(&name, args, state.mock_mode).await;
    Json(json!(result))
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
    async fn list_tools_returns_registered_tool() {
        install_test_registry();
        let app = router().with_state(AppState { mock_mode: false });
        let response = app
            .oneshot(Request::builder().uri("/tools").body(Body::empty()).unwrap())
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);
    }

    #[tokio::test]
    async fn describe_unknown_tool_is_404() {
        install_test_registry();
        let app = router().with_state(AppState { mock_mode: false });
        let response = app
            .oneshot(Request::builder().uri("/tools/nope").body(Body::empty()).unwrap())
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::NOT_FOUND);
    }

    #[tokio::test]
    async fn call_known_tool_succeeds() {
        install_test_registry();
        let app = router().with_state(AppState { mock_mode: false });
        let response = app
            .oneshot(
                Request::builder()
                    .method("POST")
                    .uri("/tools/ping_tool/call")
                    .header("content-type", "application/json")
                    .body(Body::from("{}"))
                    .unwrap(),
            )
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);
    }
}
