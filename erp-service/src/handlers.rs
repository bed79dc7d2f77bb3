//! REST surface: the 6 endpoints the orchestrator's ERP adapter
//! consumes.

use std::sync::Arc;

use axum::extract::{Path, Query, State};
use axum::routing::{get, post};
use axum::{Json, Router};
use chrono::NaiveDate;
use serde::Deserialize;
use serde_json::{json, Value};

use crate::db::ErpRepository;
use crate::errors::ErpError;
use crate::types::{normalize_handle, ConfirmPaymentRequest, ConfirmPaymentResponse, InstallmentView};
use crate::webhook::WebhookClient;

/// Shared state for the ERP service's handlers.
#[derive(Clone)]
pub struct AppState {
    /// Repository over the canonical tables.
    pub repo: ErpRepository,
    /// Outbound webhook client for `payment_confirmed` events.
    pub webhook: Arc<WebhookClient>,
}

/// Builds the ERP service's axum router.
pub fn router(state: AppState) -> Router {
    Router::new()
        .route("/api/v1/students/:id", get(get_student))
        .route("/api/v1/students/:id/installments", get(get_student_installments))
        .route("/api/v1/guardians/by-handle/:handle", get(get_guardian_by_handle))
        .route("/api/v1/installments/:id", get(get_installment))
        .route("/api/v1/installments", get(list_installments))
        .route("/api/v1/payments/confirm", post(confirm_payment))
        .with_state(state)
}

#[derive(Debug, Deserialize)]
struct EmbedQuery {
    embed: Option<String>,
}

async fn get_student(
    State(state): State<AppState>,
    Path(id): Path<String>,
    Query(query): Query<EmbedQuery>,
) -> Result<Json<Value>, ErpError> {
    let student = state.repo.get_student(&id).await?.ok_or(ErpError::NotFound)?;

    let wants_guardians = query.embed.as_deref().is_some_and(|e| e.contains("guardians"));
    if !wants_guardians {
        return Ok(Json(json!(student)));
    }

    // Embedding guardians means finding every guardian linked to this
    // student; the repository only exposes the inverse (handle -> students)
    // lookup, so scan guardian_students the other way via a small query.
    let guardians = state.repo.guardians_for_student(&id).await?;
    Ok(Json(json!({
        "id": student.id,
        "name": student.name,
        "grade": student.grade,
        "active": student.active,
        "date_of_birth": student.date_of_birth,
        "guardians": guardians,
    })))
}

#[derive(Debug, Deserialize)]
struct StateQuery {
    state: Option<String>,
}

async fn get_student_installments(
    State(state): State<AppState>,
    Path(id): Path<String>,
    Query(query): Query<StateQuery>,
) -> Result<Json<Value>, ErpError> {
    let installments = state
        .repo
        .get_student_installments(&id, query.state.as_deref())
        .await?;
    Ok(Json(json!(installments)))
}

async fn get_guardian_by_handle(
    State(state): State<AppState>,
    Path(handle): Path<String>,
) -> Result<Json<Value>, ErpError> {
    let normalized = normalize_handle(&handle);
    let view = state
        .repo
        .get_guardian_by_handle(&normalized)
        .await?
        .ok_or(ErpError::NotFound)?;
    Ok(Json(json!(view)))
}

async fn get_installment(
    State(state): State<AppState>,
    Path(id): Path<String>,
    Query(query): Query<EmbedQuery>,
) -> Result<Json<Value>, ErpError> {
    let installment = state.repo.get_installment(&id).await?.ok_or(ErpError::NotFound)?;

    let embed = query.embed.as_deref().unwrap_or_default();
    let student = if embed.contains("student") {
        state.repo.get_student(&installment.student_id).await?
    } else {
        None
    };
    let plan = if embed.contains("plan") {
        state.repo.get_plan(&installment.plan_id).await?
    } else {
        None
    };

    Ok(Json(json!(InstallmentView { installment, student, plan })))
}

#[derive(Debug, Deserialize)]
struct ListInstallmentsQuery {
    state: Option<String>,
    due_from: Option<NaiveDate>,
    due_to: Option<NaiveDate>,
    limit: Option<i64>,
}

async fn list_installments(
    State(state): State<AppState>,
    Query(query): Query<ListInstallmentsQuery>,
) -> Result<Json<Value>, ErpError> {
    let installments = state
        .repo
        .list_installments(
            query.state.as_deref(),
            query.due_from,
            query.due_to,
            query.limit.unwrap_or(100),
        )
        .await?;
    Ok(Json(json!(installments)))
}

/// Confirms a payment against an installment. On success, enqueues the
/// outbound `payment_confirmed` webhook without blocking the response
///.
async fn confirm_payment(
    State(state): State<AppState>,
    Json(request): Json<ConfirmPaymentRequest>,
) -> Result<Json<ConfirmPaymentResponse>, ErpError> {
    if request.amount <= 0.0 {
        return Err(ErpError::Validation("amount must be positive".to_string()));
    }

    let money: crate::types::Money = request
        .amount
        .try_into()
        .map_err(|_| ErpError::Validation("amount out of range".to_string()))?;
    let cents = money.cents();
    let method = request.method.as_deref().unwrap_or("transfer");
    let (payment, installment) = state
        .repo
        .confirm_payment(&request.installment_id, cents, method, request.reference.as_deref())
        .await?;

    let webhook = Arc::clone(&state.webhook);
    let installment_id = payment.installment_id.clone();
    let student_id = installment.student_id.clone();
    let amount = request.amount;
    let paid_at = payment.paid_at;
    tokio::spawn(async move {
        webhook
            .send_payment_confirmed(&installment_id, &student_id, amount, paid_at)
            .await;
    });

    Ok(Json(ConfirmPaymentResponse {
        success: true,
        message: "payment confirmed".to_string(),
        payment,
        installment,
    }))
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::body::Body;
    use axum::http::{Request, StatusCode};
    use tower::ServiceExt;

    async fn test_state() -> AppState {
        let pool = crate::db::connect("sqlite::memory:").await.expect("connect");
        sqlx::query("INSERT INTO students (id, name, grade, active, date_of_birth) VALUES ('S-1', 'Juan Perez', '5A', 1, '2015-03-01')")
            .execute(&pool)
            .await
            .expect("seed student");
        sqlx::query("INSERT INTO guardians (id, name, handle, email, relation) VALUES ('G-1', 'Ana Perez', '5491112345001', NULL, 'mother')")
            .execute(&pool)
            .await
            .expect("seed guardian");
        sqlx::query("INSERT INTO guardian_students (guardian_id, student_id) VALUES ('G-1', 'S-1')")
            .execute(&pool)
            .await
            .expect("seed link");
        sqlx::query("INSERT INTO payment_plans (id, label, installment_count, installment_amount_cents, year) VALUES ('P-1', '12 cuotas 2026', 12, 5000000, 2026)")
            .execute(&pool)
            .await
            .expect("seed plan");
        sqlx::query(
            "INSERT INTO installments (id, student_id, plan_id, sequence, amount_cents, due_date, state)
             VALUES ('C-A001-03', 'S-1', 'P-1', 3, 5000000, '2026-03-10', 'pending')",
        )
        .execute(&pool)
        .await
        .expect("seed installment");

        AppState {
            repo: ErpRepository::new(pool),
            webhook: Arc::new(WebhookClient::new("http://127.0.0.1:1", 0, std::time::Duration::from_millis(1))),
        }
    }

    #[tokio::test]
    async fn get_student_returns_200() {
        let app = router(test_state().await);
        let response = app
            .oneshot(Request::builder().uri("/api/v1/students/S-1").body(Body::empty()).unwrap())
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);
    }

    #[tokio::test]
    async fn get_student_missing_is_404() {
        let app = router(test_state().await);
        let response = app
            .oneshot(Request::builder().uri("/api/v1/students/NOPE").body(Body::empty()).unwrap())
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::NOT_FOUND);
    }

    #[tokio::test]
    async fn guardian_lookup_normalizes_handle() {
        let app = router(test_state().await);
        let response = app
            .oneshot(
                Request::builder()
                    .uri("/api/v1/guardians/by-handle/549-1112345001")
                    .body(Body::empty())
                    .unwrap(),
            )
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);
    }

    #[tokio::test]
    async fn confirm_payment_then_second_attempt_is_400() {
        let app = router(test_state().await);
        let body = Body::from(
            json!({"installment_id": "C-A001-03", "amount": 50000.0}).to_string(),
        );
        let response = app
            .clone()
            .oneshot(
                Request::builder()
                    .method("POST")
                    .uri("/api/v1/payments/confirm")
                    .header("content-type", "application/json")
                    .body(body)
                    .unwrap(),
            )
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);

        let body2 = Body::from(json!({"installment_id": "C-A001-03", "amount": 50000.0}).to_string());
        let response2 = app
            .oneshot(
                Request::builder()
                    .method("POST")
                    .uri("/api/v1/payments/confirm")
                    .header("content-type", "application/json")
                    .body(body2)
                    .unwrap(),
            )
            .await
            .unwrap();
        assert_eq!(response2.status(), StatusCode::BAD_REQUEST);
    }
}
