//! Axum router for the orchestrator's HTTP fan-in: inbound WhatsApp
//! messages, ERP state-change webhooks, and the messaging provider's
//! verification handshake.

use std::sync::Arc;

use axum::extract::{Query, State};
use axum::http::StatusCode;
use axum::response::IntoResponse;
use axum::routing::{get, post};
use axum::{Json, Router};
use chrono::Utc;
use serde::Deserialize;
use serde_json::{json, Value};
use uuid::Uuid;

use crate::agent::{AgentRuntime, CodePlannerRuntime};
use crate::config::{AgentMode, AppConfig};
use crate::db::{Checkpointer, MirrorStore};
use crate::llm::{InferenceProvider, TokenSession, TrackingLlm};
use crate::toolclient::ToolInvoker;
use crate::types::{
    GuardianMirror, InstallmentMirror, InstallmentState, Interaction, InteractionKind,
    NotificationKind, StudentMirror,
};
use crate::whatsapp::WhatsAppClient;

/// Everything an HTTP handler needs, shared behind `Arc` clones.
#[derive(Clone)]
pub struct AppState {
    /// Eventually-consistent local mirror of ERP state.
    pub mirror: Arc<MirrorStore>,
    /// Agent checkpoint store.
    pub checkpointer: Arc<dyn Checkpointer>,
    /// Client to the central tool registry.
    pub tools: Arc<dyn ToolInvoker>,
    /// Messaging provider client.
    pub whatsapp: Arc<WhatsAppClient>,
    /// LLM backend shared by every node (tagged per-call via `TrackingLlm`).
    pub llm: Arc<dyn InferenceProvider>,
    /// Resolved service configuration.
    pub config: AppConfig,
}

/// Builds the axum router for all five fan-in endpoints.
pub fn router(state: AppState) -> Router {
    Router::new()
        .route(
            "/webhook/whatsapp",
            get(verify_whatsapp).post(inbound_whatsapp),
        )
        .route("/webhook/erp/payment-confirmed", post(payment_confirmed))
        .route(
            "/webhook/erp/installment-generated",
            post(installment_generated),
        )
        .route("/webhook/erp/student-updated", post(student_updated))
        .route("/webhook/erp/guardian-updated", post(guardian_updated))
        .with_state(state)
}

#[derive(Debug, Deserialize)]
struct VerifyParams {
    #[serde(rename = "hub.mode")]
    mode: Option<String>,
    #[serde(rename = "hub.verify_token")]
    verify_token: Option<String>,
    #[serde(rename = "hub.challenge")]
    challenge: Option<String>,
}

/// `GET /webhook/whatsapp`: the messaging provider's verification
/// handshake.
async fn verify_whatsapp(
    State(state): State<AppState>,
    Query(params): Query<VerifyParams>,
) -> impl IntoResponse {
    let mode = params.mode.unwrap_or_default();
    let token = params.verify_token.unwrap_or_default();
    let challenge = params.challenge.unwrap_or_default();
    match crate::whatsapp::verify_handshake(&mode, &token, &challenge, &state.config.whatsapp_verify_token) {
        Some(echoed) => (StatusCode::OK, echoed).into_response(),
        None => StatusCode::FORBIDDEN.into_response(),
    }
}

/// `POST /webhook/whatsapp`: runs the full agent pipeline in the
/// background and acks immediately, rather than blocking the provider's
/// delivery retry on a full conversation turn.
async fn inbound_whatsapp(State(state): State<AppState>, Json(body): Json<Value>) -> impl IntoResponse {
    let Some(inbound) = crate::whatsapp::flatten_inbound(&body) else {
        return StatusCode::OK;
    };
    tokio::spawn(async move {
        process_inbound_message(state, inbound).await;
    });
    StatusCode::OK
}

async fn process_inbound_message(state: AppState, inbound: crate::whatsapp::InboundMessage) {
    let handle = crate::types::normalize_handle(&inbound.from_number);
    let query_id = Uuid::new_v4().to_string();

    let inbound_row = Interaction {
        id: Uuid::new_v4().to_string(),
        handle: handle.clone(),
        installment_id: None,
        kind: InteractionKind::Inbound,
        text: inbound.text.clone(),
        agent_tag: None,
        extras: Value::Null,
        timestamp: Utc::now(),
    };
    if let Err(e) = state.mirror.insert_interaction(&inbound_row).await {
        tracing::warn!(error = %e, "failed to log inbound interaction");
    }

    let response = dispatch(&state, &query_id, &handle, &inbound.text).await;

    if let Err(e) = state
        .whatsapp
        .send_text(&handle, &response, inbound.message_id.as_deref())
        .await
    {
        tracing::error!(error = %e, handle, "failed to send outbound WhatsApp reply");
    }

    let reply_row = Interaction {
        id: Uuid::new_v4().to_string(),
        handle,
        installment_id: None,
        kind: InteractionKind::BotReply,
        text: response,
        agent_tag: Some("agent_runtime".to_string()),
        extras: Value::Null,
        timestamp: Utc::now(),
    };
    if let Err(e) = state.mirror.insert_interaction(&reply_row).await {
        tracing::warn!(error = %e, "failed to log bot reply interaction");
    }
}

/// Dispatches to the hierarchical planner or the code-planner per
/// `AppConfig::agent_mode`, within one `TokenSession` scope.
async fn dispatch(state: &AppState, query_id: &str, handle: &str, inbound_text: &str) -> String {
    let mirror = Arc::clone(&state.mirror);
    let checkpointer = Arc::clone(&state.checkpointer);
    let tools = Arc::clone(&state.tools);
    let llm = Arc::clone(&state.llm);
    let mode = state.config.agent_mode;
    let replan_cap = state.config.max_replans;
    let model = state.config.llm_model.clone();
    let provider_tag = match state.config.llm_provider {
        crate::config::LlmProvider::OpenAi => "openai",
        crate::config::LlmProvider::Google => "google",
    };
    let handle_owned = handle.to_string();
    let inbound_owned = inbound_text.to_string();

    TokenSession::start(query_id, handle, inbound_text, provider_tag, &model, move || async move {
        match mode {
            AgentMode::Hierarchical => {
                let manager_llm = TrackingLlm::new(Arc::clone(&llm), "manager", "plan");
                let specialist_llm = TrackingLlm::new(Arc::clone(&llm), "specialist", "plan");
                let synthesizer_llm = TrackingLlm::new(Arc::clone(&llm), "synthesizer", "synthesize");
                let runtime = AgentRuntime::new(mirror, checkpointer, tools);
                runtime
                    .run(
                        &handle_owned,
                        &handle_owned,
                        &inbound_owned,
                        &manager_llm,
                        &specialist_llm,
                        &synthesizer_llm,
                        replan_cap,
                    )
                    .await
            }
            AgentMode::CodePlanner => {
                let planner_llm = TrackingLlm::new(Arc::clone(&llm), "code_planner", "plan");
                let reflect_llm = TrackingLlm::new(Arc::clone(&llm), "reflect", "judge");
                let respond_llm = TrackingLlm::new(Arc::clone(&llm), "respond", "synthesize");
                let runtime = CodePlannerRuntime::new(tools);
                // No live tool catalog endpoint on `ToolInvoker`; the
                // planner prompt ships an empty catalog and falls back to
                // tool-name knowledge baked into its own prompt template.
                runtime
                    .run(&inbound_owned, &json!([]), &planner_llm, &reflect_llm, &respond_llm)
                    .await
            }
        }
    })
    .await
}

/// `POST /webhook/erp/payment-confirmed`: mark the mirror installment
/// paid, then enqueue an idempotent outbound confirmation notification.
async fn payment_confirmed(State(state): State<AppState>, Json(payload): Json<Value>) -> impl IntoResponse {
    let Some(installment_id) = payload
        .get("data")
        .and_then(|d| d.get("installment_id"))
        .and_then(Value::as_str)
    else {
        return StatusCode::UNPROCESSABLE_ENTITY;
    };
    if let Err(e) = state.mirror.mark_installment_paid(installment_id).await {
        tracing::error!(error = %e, installment_id, "failed to mark installment paid in mirror");
        return StatusCode::INTERNAL_SERVER_ERROR;
    }

    let installment_id = installment_id.to_string();
    let whatsapp = Arc::clone(&state.whatsapp);
    let mirror = Arc::clone(&state.mirror);
    tokio::spawn(async move {
        send_payment_confirmation_once(&mirror, &whatsapp, &installment_id).await;
    });

    StatusCode::OK
}

async fn send_payment_confirmation_once(mirror: &MirrorStore, whatsapp: &WhatsAppClient, installment_id: &str) {
    let notification_id = Uuid::new_v4().to_string();
    match mirror
        .record_notification_once(&notification_id, installment_id, installment_id, NotificationKind::PaymentConfirmation)
        .await
    {
        Ok(true) => {
            let body = format!("¡Gracias! Confirmamos el pago de la cuota {installment_id}.");
            if let Err(e) = whatsapp.send_text(installment_id, &body, None).await {
                tracing::error!(error = %e, installment_id, "failed to send payment confirmation");
            }
        }
        Ok(false) => tracing::debug!(installment_id, "payment confirmation already sent, skipping"),
        Err(e) => tracing::error!(error = %e, installment_id, "failed to record notification dedup row"),
    }
}

/// `POST /webhook/erp/installment-generated`: upsert the mirror row.
async fn installment_generated(State(state): State<AppState>, Json(payload): Json<Value>) -> impl IntoResponse {
    match parse_installment_mirror(&payload) {
        Some(row) => match state.mirror.upsert_installment(&row).await {
            Ok(()) => StatusCode::OK,
            Err(_) => StatusCode::INTERNAL_SERVER_ERROR,
        },
        None => StatusCode::UNPROCESSABLE_ENTITY,
    }
}

/// `POST /webhook/erp/student-updated`: upsert the student-mirror row.
async fn student_updated(State(state): State<AppState>, Json(payload): Json<Value>) -> impl IntoResponse {
    let Some(id) = payload.get("id").and_then(Value::as_str) else {
        return StatusCode::UNPROCESSABLE_ENTITY;
    };
    let row = StudentMirror {
        id: id.to_string(),
        name: payload.get("name").and_then(Value::as_str).unwrap_or_default().to_string(),
        grade: payload.get("grade").and_then(Value::as_str).unwrap_or_default().to_string(),
        last_sync: Utc::now(),
    };
    match state.mirror.upsert_student(&row).await {
        Ok(()) => StatusCode::OK,
        Err(_) => StatusCode::INTERNAL_SERVER_ERROR,
    }
}

/// `POST /webhook/erp/guardian-updated`: upsert the guardian-mirror row
/// and its student links.
async fn guardian_updated(State(state): State<AppState>, Json(payload): Json<Value>) -> impl IntoResponse {
    let Some(id) = payload.get("id").and_then(Value::as_str) else {
        return StatusCode::UNPROCESSABLE_ENTITY;
    };
    let handle = payload.get("handle").and_then(Value::as_str).unwrap_or_default();
    let row = GuardianMirror {
        id: id.to_string(),
        name: payload.get("name").and_then(Value::as_str).unwrap_or_default().to_string(),
        handle: crate::types::normalize_handle(handle),
        last_sync: Utc::now(),
    };
    if let Err(e) = state.mirror.upsert_guardian(&row).await {
        tracing::error!(error = %e, "failed to upsert guardian mirror");
        return StatusCode::INTERNAL_SERVER_ERROR;
    }
    if let Some(students) = payload.get("student_ids").and_then(Value::as_array) {
        for student_id in students.iter().filter_map(Value::as_str) {
            if let Err(e) = state.mirror.link_guardian_student(id, student_id).await {
                tracing::warn!(error = %e, student_id, "failed to link guardian to student");
            }
        }
    }
    StatusCode::OK
}

fn parse_installment_mirror(payload: &Value) -> Option<InstallmentMirror> {
    let id = payload.get("id")?.as_str()?.to_string();
    let student_id = payload.get("student_id")?.as_str()?.to_string();
    let amount = payload.get("amount")?.as_f64()?;
    let due_date = payload.get("due_date")?.as_str()?.parse().ok()?;
    let state_tag = payload.get("state").and_then(Value::as_str).unwrap_or("pending");
    let state = match state_tag {
        "paid" => InstallmentState::Paid,
        "overdue" => InstallmentState::Overdue,
        _ => InstallmentState::Pending,
    };
    Some(InstallmentMirror {
        id,
        student_id,
        amount: crate::types::Money::try_from(amount).ok()?,
        due_date,
        state,
        last_sync: Utc::now(),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::{connect, NullCheckpointer};
    use crate::llm::provider::MockProvider;
    use crate::toolclient::MockToolInvoker;
    use axum::body::Body;
    use axum::http::Request;
    use tower::ServiceExt;

    async fn test_state() -> AppState {
        let pool = connect("sqlite::memory:").await.expect("connect");
        let mirror = Arc::new(MirrorStore::new(pool));
        let checkpointer: Arc<dyn Checkpointer> = Arc::new(NullCheckpointer);
        let tools: Arc<dyn ToolInvoker> = Arc::new(MockToolInvoker::new());
        let whatsapp = Arc::new(WhatsAppClient::new(
            "http://localhost",
            "0",
            crate::config::Secret(Some("dummy-token".to_string())),
        ));
        let llm: Arc<dyn InferenceProvider> = Arc::new(MockProvider::new(vec![
            serde_json::to_string(&json!({
                "intent": "greeting", "confidence": 0.9, "steps": [],
                "requires_human": false, "reasoning": "greeting",
            }))
            .expect("ser"),
        ]));
        AppState {
            mirror,
            checkpointer,
            tools,
            whatsapp,
            llm,
            config: AppConfig::default(),
        }
    }

    #[tokio::test]
    async fn verify_handshake_echoes_challenge_on_token_match() {
        let state = test_state().await;
        let app = router(state);
        let response = app
            .oneshot(
                Request::builder()
                    .uri("/webhook/whatsapp?hub.mode=subscribe&hub.verify_token=verify-me&hub.challenge=42")
                    .body(Body::empty())
                    .expect("request"),
            )
            .await
            .expect("response");
        assert_eq!(response.status(), StatusCode::OK);
    }

    #[tokio::test]
    async fn verify_handshake_rejects_wrong_token() {
        let state = test_state().await;
        let app = router(state);
        let response = app
            .oneshot(
                Request::builder()
                    .uri("/webhook/whatsapp?hub.mode=subscribe&hub.verify_token=wrong&hub.challenge=42")
                    .body(Body::empty())
                    .expect("request"),
            )
            .await
            .expect("response");
        assert_eq!(response.status(), StatusCode::FORBIDDEN);
    }

    #[tokio::test]
    async fn payment_confirmed_without_installment_id_is_rejected() {
        let state = test_state().await;
        let app = router(state);
        let response = app
            .oneshot(
                Request::builder()
                    .method("POST")
                    .uri("/webhook/erp/payment-confirmed")
                    .header("content-type", "application/json")
                    .body(Body::from(json!({"type": "payment_confirmed", "data": {}}).to_string()))
                    .expect("request"),
            )
            .await
            .expect("response");
        assert_eq!(response.status(), StatusCode::UNPROCESSABLE_ENTITY);
    }

    #[tokio::test]
    async fn installment_generated_upserts_mirror_row() {
        let state = test_state().await;
        let mirror = Arc::clone(&state.mirror);
        let app = router(state);
        let response = app
            .oneshot(
                Request::builder()
                    .method("POST")
                    .uri("/webhook/erp/installment-generated")
                    .header("content-type", "application/json")
                    .body(Body::from(
                        json!({
                            "id": "C-A001-04", "student_id": "S-1", "amount": 50000.0,
                            "due_date": "2026-04-10", "state": "pending",
                        })
                        .to_string(),
                    ))
                    .expect("request"),
            )
            .await
            .expect("response");
        assert_eq!(response.status(), StatusCode::OK);
        mirror.mark_installment_paid("C-A001-04").await.expect("mark paid");
    }
}
