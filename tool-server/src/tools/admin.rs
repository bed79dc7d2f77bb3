//! Administrative tools for the Administrative specialist, grounded on
//! `original_source/mcp_tools/app/tools/admin_tools.py`.

use std::sync::{Arc, Mutex};
use std::collections::HashMap;

use serde_json::{json, Value};
use uuid::Uuid;

use crate::registry::{ToolCategory, ToolDefinition};

/// Tool-server-local ticket store. Separate from the orchestrator's
/// sqlite-persisted `Ticket` rows: this map backs the tool's own
/// `lookup_ticket` semantics when invoked outside an orchestrator run
/// (e.g. via direct REST/JSON-RPC calls against the tool server).
#[derive(Default, Clone)]
pub struct TicketStore {
    tickets: Arc<Mutex<HashMap<String, Value>>>,
}

impl TicketStore {
    /// Builds an empty store.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }
}

/// `create_ticket(category, description, priority?)`: opens an
/// administrative ticket and returns its short id.
pub fn create_ticket_tool(store: TicketStore) -> ToolDefinition {
    ToolDefinition {
        name: "create_ticket",
        description: "Opens an administrative ticket.",
        category: ToolCategory::Admin,
        parameter_schema: json!({
            "type": "object",
            "properties": {
                "category": { "type": "string" },
                "description": { "type": "string" },
                "priority": { "type": "string" }
            },
            "required": ["category", "description"]
        }),
        handler: Arc::new(move |args: Value, _mock: bool| {
            let store = store.clone();
            async move {
                let category = args
                    .get("category")
                    .and_then(Value::as_str)
                    .ok_or_else(|| "missing category".to_string())?
                    .to_string();
                let description = args
                    .get("description")
                    .and_then(Value::as_str)
                    .ok_or_else(|| "missing description".to_string())?
                    .to_string();
                let priority = args.get("priority").and_then(Value::as_str).unwrap_or("normal").to_string();

                let short_id = Uuid::new_v4().to_string()[..8].to_string();
                let ticket = json!({
                    "id": short_id,
                    "category": category,
                    "description": description,
                    "priority": priority,
                    "state": "open",
                });
                store
                    .tickets
                    .lock()
                    .map_err(|_| "ticket store poisoned".to_string())?
                    .insert(short_id.clone(), ticket.clone());
                Ok(ticket)
            }
        }),
        mock_response: None,
    }
}

/// `lookup_ticket(id)`: fetches a previously created ticket by its short
/// id.
pub fn lookup_ticket_tool(store: TicketStore) -> ToolDefinition {
    ToolDefinition {
        name: "lookup_ticket",
        description: "Looks up an administrative ticket by id.",
        category: ToolCategory::Admin,
        parameter_schema: json!({
            "type": "object",
            "properties": { "id": { "type": "string" } },
            "required": ["id"]
        }),
        handler: Arc::new(move |args: Value, _mock: bool| {
            let store = store.clone();
            async move {
                let id = args.get("id").and_then(Value::as_str).ok_or_else(|| "missing id".to_string())?;
                store
                    .tickets
                    .lock()
                    .map_err(|_| "ticket store poisoned".to_string())?
                    .get(id)
                    .cloned()
                    .ok_or_else(|| "not found".to_string())
            }
        }),
        mock_response: None,
    }
}

/// `classify_priority(description)`: heuristic triage, no upstream call.
pub fn classify_priority_tool() -> ToolDefinition {
    ToolDefinition {
        name: "classify_priority",
        description: "Classifies a ticket description into a priority tier.",
        category: ToolCategory::Admin,
        parameter_schema: json!({
            "type": "object",
            "properties": { "description": { "type": "string" } },
            "required": ["description"]
        }),
        handler: Arc::new(|args: Value, _mock: bool| async move {
            let description = args.get("description").and_then(Value::as_str).unwrap_or_default();
            let lowered = description.to_lowercase();
            let priority = if lowered.contains("urgente") || lowered.contains("urgent") {
                "high"
            } else if lowered.contains("baja") || lowered.contains("reclamo") {
                "normal"
            } else {
                "low"
            };
            Ok(json!({ "priority": priority }))
        }),
        mock_response: Some(json!({ "priority": "normal" })),
    }
}
