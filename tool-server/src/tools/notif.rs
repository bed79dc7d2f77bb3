//! Notification tools, supplementing the specialist list with the
//! `notif` category, grounded on
//! `original_source/mcp_tools/app/tools/notif_tools.py`.

use std::sync::Arc;

use serde_json::{json, Value};

use crate::registry::{ToolCategory, ToolDefinition};

/// `send_notification(handle, message)`: dispatches an outbound message
/// outside the normal inbound-reply flow (e.g. a proactive due-date
/// reminder). The handler here only validates and echoes back an
/// acknowledgement; actual WhatsApp delivery is the orchestrator's
/// concern.
pub fn send_notification_tool() -> ToolDefinition {
    ToolDefinition {
        name: "send_notification",
        description: "Queues an outbound notification to a guardian handle.",
        category: ToolCategory::Notif,
        parameter_schema: json!({
            "type": "object",
            "properties": {
                "handle": { "type": "string" },
                "message": { "type": "string" }
            },
            "required": ["handle", "message"]
        }),
        handler: Arc::new(|args: Value, _mock: bool| async move {
            let handle = args.get("handle").and_then(Value::as_str).ok_or_else(|| "missing handle".to_string())?;
            let message = args.get("message").and_then(Value::as_str).ok_or_else(|| "missing message".to_string())?;
            Ok(json!({ "queued": true, "handle": handle, "length": message.len() }))
        }),
        mock_response: Some(json!({ "queued": true })),
    }
}
