//! Institutional-information tools for the Institutional specialist,
//! grounded on `original_source/mcp_tools/app/tools/kg_tools.py`. These
//! answer static/slow-changing questions and carry their own mock
//! payloads rather than calling out to the analytics graph.

use std::sync::Arc;

use serde_json::{json, Value};

use crate::registry::{ToolCategory, ToolDefinition};

fn static_tool(
    name: &'static str,
    description: &'static str,
    response: Value,
) -> ToolDefinition {
    let canned = response.clone();
    ToolDefinition {
        name,
        description,
        category: ToolCategory::Kg,
        parameter_schema: json!({ "type": "object", "properties": {}, "required": [] }),
        handler: Arc::new(move |_args: Value, _mock: bool| {
            let canned = canned.clone();
            async move { Ok(canned) }
        }),
        mock_response: Some(response),
    }
}

/// `hours()`: school opening hours.
pub fn hours_tool() -> ToolDefinition {
    static_tool(
        "hours",
        "Returns the school's opening hours.",
        json!({ "weekdays": "08:00-17:00", "saturday": "08:00-12:00" }),
    )
}

/// `calendar()`: upcoming school-year calendar milestones.
pub fn calendar_tool() -> ToolDefinition {
    static_tool(
        "calendar",
        "Returns upcoming calendar milestones.",
        json!({ "milestones": [] }),
    )
}

/// `authorities()`: school leadership/contact roster.
pub fn authorities_tool() -> ToolDefinition {
    static_tool(
        "authorities",
        "Returns the school's leadership roster.",
        json!({ "principal": "", "vice_principal": "" }),
    )
}

/// `contact()`: general contact information.
pub fn contact_tool() -> ToolDefinition {
    static_tool(
        "contact",
        "Returns the school's general contact information.",
        json!({ "phone": "", "email": "", "address": "" }),
    )
}

/// `general_info()`: catch-all institutional facts.
pub fn general_info_tool() -> ToolDefinition {
    static_tool(
        "general_info",
        "Returns miscellaneous institutional information.",
        json!({ "facts": [] }),
    )
}
