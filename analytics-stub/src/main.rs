//! Interface-level stand-in for the graph analytics collaborator.
//!
//! The real service reads the orchestrator's mirror tables and
//! interaction logs, builds a graph of Guardian/Student/Installment/
//! Grade/Ticket/BehaviorCluster/PredictiveInsights nodes, and answers
//! risk-score, cash-projection, behavior-pattern, and executive-summary
//! queries. This stub only exposes the admin-facing report surface with
//! a canned shape; it never reads the orchestrator's database and the
//! orchestrator never calls it to answer a message.

use axum::routing::get;
use axum::{Json, Router};
use serde_json::{json, Value};
use tracing::info;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::new(
            std::env::var("LOG_LEVEL").unwrap_or_else(|_| "info".to_string()),
        ))
        .init();

    let port: u16 = std::env::var("API_PORT").ok().and_then(|v| v.parse().ok()).unwrap_or(8083);

    let app = Router::new()
        .route("/api/v1/reports/health", get(health))
        .route("/api/v1/reports/summary", get(summary));

    let listener = tokio::net::TcpListener::bind(("0.0.0.0", port)).await?;
    info!(api_port = port, "analytics-stub listening");
    axum::serve(listener, app).await?;
    Ok(())
}

async fn health() -> Json<Value> {
    Json(json!({ "status": "ok" }))
}

/// Canned executive summary: the shape an admin dashboard would render,
/// with zeroed/empty values since this stub never reads real data.
async fn summary() -> Json<Value> {
    Json(json!({
        "risk_score": null,
        "cash_projection": null,
        "behavior_patterns": [],
        "executive_summary": "analytics is not connected to live data in this deployment",
    }))
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::body::Body;
    use axum::http::{Request, StatusCode};
    use tower::ServiceExt;

    fn test_router() -> Router {
        Router::new()
            .route("/api/v1/reports/health", get(health))
            .route("/api/v1/reports/summary", get(summary))
    }

    #[tokio::test]
    async fn health_reports_ok() {
        let response = test_router()
            .oneshot(Request::builder().uri("/api/v1/reports/health").body(Body::empty()).unwrap())
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);
    }

    #[tokio::test]
    async fn summary_returns_canned_shape() {
        let response = test_router()
            .oneshot(Request::builder().uri("/api/v1/reports/summary").body(Body::empty()).unwrap())
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);
        let bytes = axum::body::to_bytes(response.into_body(), usize::MAX).await.unwrap();
        let body: Value = serde_json::from_slice(&bytes).unwrap();
        assert!(body["behavior_patterns"].is_array());
    }
}
