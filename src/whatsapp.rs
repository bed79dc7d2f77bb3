//! Messaging provider client: outbound send, inbound payload flattening,
//! and the verification handshake.

use serde::{Deserialize, Serialize};
use serde_json::{json, Value};

use crate::config::Secret;
use crate::errors::GestorError;

/// The simplified inbound shape the orchestrator's agent actually consumes,
/// regardless of which wire shape the provider sent.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct InboundMessage {
    /// Sender's phone number, not yet normalized.
    pub from_number: String,
    /// Message body.
    pub text: String,
    /// Provider message id, if present.
    pub message_id: Option<String>,
    /// Provider timestamp, if present.
    pub timestamp: Option<String>,
}

/// Flattens either the simplified test shape `{from_number, text, ...}` or
/// the provider's native `object/entry/changes/value/messages` payload into
/// an `InboundMessage`. Returns `None` when neither shape yields a message
/// (e.g. a status-update callback with no `messages` array).
#[must_use]
pub fn flatten_inbound(body: &Value) -> Option<InboundMessage> {
    if let Some(from_number) = body.get("from_number").and_then(Value::as_str) {
        let text = body.get("text").and_then(Value::as_str).unwrap_or_default();
        return Some(InboundMessage {
            from_number: from_number.to_string(),
            text: text.to_string(),
            message_id: body
                .get("message_id")
                .and_then(Value::as_str)
                .map(ToString::to_string),
            timestamp: body
                .get("timestamp")
                .and_then(Value::as_str)
                .map(ToString::to_string),
        });
    }

    let message = body
        .get("entry")?
        .as_array()?
        .iter()
        .find_map(|entry| entry.get("changes")?.as_array()?.first())
        .and_then(|change| change.get("value"))
        .and_then(|value| value.get("messages")?.as_array()?.first().cloned())?;

    let from_number = message.get("from").and_then(Value::as_str)?.to_string();
    let text = message
        .get("text")
        .and_then(|t| t.get("body"))
        .and_then(Value::as_str)
        .unwrap_or_default()
        .to_string();
    let message_id = message
        .get("id")
        .and_then(Value::as_str)
        .map(ToString::to_string);
    let timestamp = message
        .get("timestamp")
        .and_then(Value::as_str)
        .map(ToString::to_string);

    Some(InboundMessage {
        from_number,
        text,
        message_id,
        timestamp,
    })
}

/// Resolves the inbound verification handshake (`GET /webhook/whatsapp`):
/// returns the challenge iff the submitted token matches the configured
/// one.
#[must_use]
pub fn verify_handshake(
    submitted_mode: &str,
    submitted_token: &str,
    submitted_challenge: &str,
    configured_token: &str,
) -> Option<String> {
    if submitted_mode == "subscribe" && submitted_token == configured_token {
        Some(submitted_challenge.to_string())
    } else {
        None
    }
}

/// Client for the outbound WhatsApp send contract.
pub struct WhatsAppClient {
    http: reqwest::Client,
    provider_base: String,
    phone_id: String,
    token: Secret,
}

impl WhatsAppClient {
    /// Builds a client. `provider_base` is the messaging provider's base
    /// URL, `phone_id` is `WHATSAPP_PHONE_NUMBER_ID`, `token` is
    /// `WHATSAPP_TOKEN`.
    #[must_use]
    pub fn new(provider_base: impl Into<String>, phone_id: impl Into<String>, token: Secret) -> Self {
        Self {
            http: reqwest::Client::new(),
            provider_base: provider_base.into(),
            phone_id: phone_id.into(),
            token,
        }
    }

    /// Sends a text message to `to`. In dummy-token mode (`WHATSAPP_TOKEN`
    /// starting with `dummy`), short-circuits to a log line and a simulated
    /// response instead of calling the provider.
    ///
    /// # Errors
    ///
    /// Returns an error if the live send fails at the transport level.
    pub async fn send_text(
        &self,
        to: &str,
        body: &str,
        reply_to_message_id: Option<&str>,
    ) -> Result<Value, GestorError> {
        if self.token.is_dummy() {
            tracing::info!(to, body, "simulated WhatsApp send (dummy token)");
            return Ok(json!({
                "success": true,
                "simulated": true,
                "message_id": format!("sim_{}", uuid::Uuid::new_v4()),
            }));
        }

        let mut payload = json!({
            "messaging_product": "whatsapp",
            "to": to,
            "type": "text",
            "text": { "body": body },
        });
        if let Some(reply_id) = reply_to_message_id {
            payload["context"] = json!({ "message_id": reply_id });
        }

        let token = self.token.expose().unwrap_or_default();
        let response = self
            .http
            .post(format!("{}/{}/messages", self.provider_base, self.phone_id))
            .bearer_auth(token)
            .json(&payload)
            .send()
            .await
            .map_err(|e| GestorError::UpstreamUnavailable(e.to_string()))?;

        response
            .json::<Value>()
            .await
            .map_err(|e| GestorError::UpstreamUnavailable(e.to_string()))
    }
}
