//! Outbound webhook delivery to the orchestrator, grounded on
//! `original_source/erp_mock/app/webhooks.py`'s `WebhookClient`.

use std::time::Duration;

use chrono::{DateTime, Utc};
use serde::Serialize;
use serde_json::json;
use tracing::{info, warn};

/// Delivers the `payment_confirmed` event with exponential backoff.
#[derive(Clone)]
pub struct WebhookClient {
    http: reqwest::Client,
    target_url: String,
    max_retries: u32,
    base_delay: Duration,
}

/// Payload sent on `POST {target_url}` after a successful payment
/// confirmation.
#[derive(Debug, Serialize)]
struct PaymentConfirmedPayload {
    #[serde(rename = "type")]
    kind: &'static str,
    timestamp: DateTime<Utc>,
    data: PaymentConfirmedData,
}

#[derive(Debug, Serialize)]
struct PaymentConfirmedData {
    installment_id: String,
    student_id: String,
    amount: f64,
    paid_at: DateTime<Utc>,
}

impl WebhookClient {
    /// Builds a client targeting the orchestrator's webhook endpoint.
    #[must_use]
    pub fn new(target_url: impl Into<String>, max_retries: u32, base_delay: Duration) -> Self {
        Self {
            http: reqwest::Client::new(),
            target_url: target_url.into(),
            max_retries,
            base_delay,
        }
    }

    /// Sends the `payment_confirmed` event, retrying transient failures
    /// with `base_delay * 2^attempt` backoff. 200/201/202 count as success;
    /// other statuses, connection errors, and timeouts are retried up to
    /// `max_retries` times, after which the failure is logged and dropped.
    ///
    /// Never propagates an error: delivery failures must not surface to
    /// the caller of `confirm_payment`.
    pub async fn send_payment_confirmed(
        &self,
        installment_id: &str,
        student_id: &str,
        amount: f64,
        paid_at: DateTime<Utc>,
    ) {
        let payload = PaymentConfirmedPayload {
            kind: "payment_confirmed",
            timestamp: Utc::now(),
            data: PaymentConfirmedData {
                installment_id: installment_id.to_string(),
                student_id: student_id.to_string(),
                amount,
                paid_at,
            },
        };

        for attempt in 0..=self.max_retries {
            match self.try_send(&payload).await {
                Ok(()) => {
                    info!(installment_id, attempt, "webhook delivered");
                    return;
                }
                Err(err) if attempt < self.max_retries => {
                    let delay = self.base_delay.mul_f64(2f64.powi(i32::try_from(attempt).unwrap_or(i32::MAX)));
                    warn!(installment_id, attempt, delay_secs = delay.as_secs_f64(), error = %err, "webhook delivery failed, retrying");
                    tokio::time::sleep(delay).await;
                }
                Err(err) => {
                    warn!(installment_id, attempt, error = %err, "webhook delivery exhausted retries, giving up");
                }
            }
        }
    }

    async fn try_send(&self, payload: &PaymentConfirmedPayload) -> Result<(), String> {
        let response = self
            .http
            .post(&self.target_url)
            .header("X-Webhook-Source", "erp")
            .timeout(Duration::from_secs(10))
            .json(payload)
            .send()
            .await
            .map_err(|err| err.to_string())?;

        match response.status().as_u16() {
            200..=202 => Ok(()),
            other => Err(format!("unexpected status {other}")),
        }
    }
}

/// Builds the JSON body a caller could use to reconstruct the payload for
/// diagnostics or replay (not used on the hot path; handlers call
/// [`WebhookClient::send_payment_confirmed`] directly).
#[must_use]
pub fn preview_payload(
    installment_id: &str,
    student_id: &str,
    amount: f64,
    paid_at: DateTime<Utc>,
) -> serde_json::Value {
    json!({
        "type": "payment_confirmed",
        "timestamp": Utc::now(),
        "data": {
            "installment_id": installment_id,
            "student_id": student_id,
            "amount": amount,
            "paid_at": paid_at,
        }
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn delivery_to_unreachable_target_does_not_panic() {
        let client = WebhookClient::new("http://127.0.0.1:1", 1, Duration::from_millis(1));
        client
            .send_payment_confirmed("C-A001-03", "S-1", 50_000.0, Utc::now())
            .await;
    }

    #[test]
    fn preview_payload_has_expected_shape() {
        let value = preview_payload("C-A001-03", "S-1", 50_000.0, Utc::now());
        assert_eq!(value["type"], "payment_confirmed");
        assert_eq!(value["data"]["installment_id"], "C-A001-03");
    }
}
