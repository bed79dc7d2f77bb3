//! ERP-backed tools for the Financial specialist,
//! grounded on `original_source/mcp_tools/app/tools/erp_tools.py`.

use std::sync::Arc;

use serde_json::{json, Value};

use crate::erp_client::ErpClient;
use crate::registry::{ToolCategory, ToolDefinition};

/// `account_status(student_id)`: current installment balance for a
/// student, used by the Financial specialist to answer "how much do I
/// owe" questions.
pub fn account_status_tool(erp: Arc<ErpClient>) -> ToolDefinition {
    ToolDefinition {
        name: "account_status",
        description: "Returns a student's pending and overdue installments.",
        category: ToolCategory::Erp,
        parameter_schema: json!({
            "type": "object",
            "properties": { "student_id": { "type": "string" } },
            "required": ["student_id"]
        }),
        handler: Arc::new(move |args: Value, mock_mode: bool| {
            let erp = Arc::clone(&erp);
            async move {
                if mock_mode {
                    return Ok(json!({
                        "student_id": args.get("student_id").cloned().unwrap_or(Value::Null),
                        "pending": [],
                        "overdue": [],
                    }));
                }
                let student_id = args
                    .get("student_id")
                    .and_then(Value::as_str)
                    .ok_or_else(|| "missing student_id".to_string())?;
                erp.get_student_installments(student_id, None)
                    .await
                    .map_err(|e| e.to_string())
            }
        }),
        mock_response: None,
    }
}

/// `payment_link(installment_id)`: fetches or synthesizes a pay-link for
/// a specific installment.
pub fn payment_link_tool(erp: Arc<ErpClient>) -> ToolDefinition {
    ToolDefinition {
        name: "payment_link",
        description: "Returns the hosted payment link for an installment.",
        category: ToolCategory::Erp,
        parameter_schema: json!({
            "type": "object",
            "properties": { "installment_id": { "type": "string" } },
            "required": ["installment_id"]
        }),
        handler: Arc::new(move |args: Value, mock_mode: bool| {
            let erp = Arc::clone(&erp);
            async move {
                if mock_mode {
                    return Ok(json!({ "pay_link": "https://pay.example.com/mock" }));
                }
                let installment_id = args
                    .get("installment_id")
                    .and_then(Value::as_str)
                    .ok_or_else(|| "missing installment_id".to_string())?;
                erp.get_installment(installment_id).await.map_err(|e| e.to_string())
            }
        }),
        mock_response: None,
    }
}

/// `record_payment_claim(installment_id, amount, reference?)`: guardian
/// self-reports having paid; forwarded to the ERP as a payment
/// confirmation. Non-idempotent on the ERP side, so a second claim
/// against an already-paid installment surfaces as `{registered:false}`.
pub fn record_payment_claim_tool(erp: Arc<ErpClient>) -> ToolDefinition {
    ToolDefinition {
        name: "record_payment_claim",
        description: "Registers a guardian-reported payment against an installment.",
        category: ToolCategory::Erp,
        parameter_schema: json!({
            "type": "object",
            "properties": {
                "installment_id": { "type": "string" },
                "amount": { "type": "number" },
                "reference": { "type": "string" }
            },
            "required": ["installment_id", "amount"]
        }),
        handler: Arc::new(move |args: Value, mock_mode: bool| {
            let erp = Arc::clone(&erp);
            async move {
                if mock_mode {
                    return Ok(json!({ "registered": true }));
                }
                let installment_id = args
                    .get("installment_id")
                    .and_then(Value::as_str)
                    .ok_or_else(|| "missing installment_id".to_string())?;
                let amount = args
                    .get("amount")
                    .and_then(Value::as_f64)
                    .ok_or_else(|| "missing amount".to_string())?;
                let reference = args.get("reference").and_then(Value::as_str);
                match erp.confirm_payment(installment_id, amount, "transfer", reference).await {
                    Ok(payment) => Ok(json!({ "registered": true, "payment": payment })),
                    Err(crate::erp_client::ErpClientError::AlreadyPaid) => {
                        Ok(json!({ "registered": false, "error": "already paid" }))
                    }
                    Err(e) => Err(e.to_string()),
                }
            }
        }),
        mock_response: None,
    }
}
