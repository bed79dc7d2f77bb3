//! Tagged-variant specialist dispatch, replacing dynamic dispatch by name.
//! Each variant runs the same `plan` / `execute_action` loop / `report`
//! shape over its own fixed tool set.

use std::sync::Arc;

use serde_json::json;

use crate::llm::TrackingLlm;
use crate::toolclient::ToolInvoker;
use crate::types::{SpecialistKind, SpecialistReport, SubPlan};

/// One of the three fixed specialist subgraphs.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Specialist {
    /// Account status, payment links, payment claims.
    Financial,
    /// Tickets.
    Administrative,
    /// Hours, calendar, authorities, contact, general info.
    Institutional,
}

impl Specialist {
    /// Tools this specialist is allowed to call.
    #[must_use]
    pub const fn allowed_tools(self) -> &'static [&'static str] {
        match self {
            Self::Financial => &["account_status", "payment_link", "record_payment_claim"],
            Self::Administrative => &["create_ticket", "lookup_ticket", "classify_priority"],
            Self::Institutional => &["hours", "calendar", "authorities", "contact", "general_info"],
        }
    }

    /// This specialist's tagged kind, as carried in a `MasterPlan` step.
    #[must_use]
    pub const fn kind(self) -> SpecialistKind {
        match self {
            Self::Financial => SpecialistKind::Financial,
            Self::Administrative => SpecialistKind::Administrative,
            Self::Institutional => SpecialistKind::Institutional,
        }
    }

    /// The default single action used when `plan` fails to parse the LLM's
    /// output.
    fn default_sub_plan(self) -> SubPlan {
        let action = match self {
            Self::Financial => crate::types::SubPlanAction {
                tool: "account_status".to_string(),
                params: json!({}),
                description: "fallback: check account status".to_string(),
            },
            Self::Administrative => crate::types::SubPlanAction {
                tool: "create_ticket".to_string(),
                params: json!({ "category": "generic" }),
                description: "fallback: escalate as a generic ticket".to_string(),
            },
            Self::Institutional => crate::types::SubPlanAction {
                tool: "general_info".to_string(),
                params: json!({}),
                description: "fallback: provide general info".to_string(),
            },
        };
        SubPlan {
            actions: vec![action],
            reasoning: "fallback plan after LLM parse failure".to_string(),
        }
    }

    /// Runs `plan` -> `execute_action` loop -> `report` for this
    /// specialist given a goal from the manager's `MasterPlan`.
    pub async fn run(
        self,
        goal: &str,
        params: &serde_json::Value,
        llm: &TrackingLlm,
        tools: &Arc<dyn ToolInvoker>,
    ) -> SpecialistReport {
        let sub_plan = self.plan(goal, params, llm).await;

        let mut results = Vec::new();
        let mut any_failed = false;
        for action in &sub_plan.actions {
            if !self.allowed_tools().contains(&action.tool.as_str()) {
                any_failed = true;
                results.push(json!({
                    "tool": action.tool,
                    "success": false,
                    "error": "tool not allowed for this specialist",
                }));
                continue;
            }
            match tools.call_tool(&action.tool, action.params.clone()).await {
                Ok(result) => {
                    if !result.success {
                        any_failed = true;
                    }
                    results.push(json!({
                        "tool": action.tool,
                        "success": result.success,
                        "error": result.error,
                        "data": result.data,
                    }));
                }
                Err(e) => {
                    any_failed = true;
                    results.push(json!({
                        "tool": action.tool,
                        "success": false,
                        "error": e.to_string(),
                    }));
                }
            }
        }

        self.report(results, any_failed)
    }

    async fn plan(self, goal: &str, params: &serde_json::Value, llm: &TrackingLlm) -> SubPlan {
        let prompt = format!(
            "You are the {self:?} specialist. Goal: {goal}\nParams: {params}\nAllowed tools: {:?}\nEmit a SubPlan JSON.",
            self.allowed_tools(),
        );
        match llm.generate("specialist", &prompt, 512).await {
            Ok(completion) => serde_json::from_str::<SubPlan>(&completion.text)
                .unwrap_or_else(|_| self.default_sub_plan()),
            Err(_) => self.default_sub_plan(),
        }
    }

    fn report(self, results: Vec<serde_json::Value>, any_failed: bool) -> SpecialistReport {
        let summary = if any_failed {
            format!("{self:?} specialist completed with one or more failed actions")
        } else {
            format!("{self:?} specialist completed successfully")
        };
        SpecialistReport {
            specialist: self.kind(),
            success: !any_failed,
            data: json!({ "results": results }),
            summary,
            error: if any_failed {
                Some("one or more tool calls failed".to_string())
            } else {
                None
            },
            requires_replan: any_failed,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::llm::provider::MockProvider;
    use crate::toolclient::{MockToolInvoker, ToolCallResult};

    fn tracking_llm(responses: Vec<String>) -> TrackingLlm {
        let provider: Arc<dyn crate::llm::InferenceProvider> =
            Arc::new(MockProvider::new(responses));
        TrackingLlm::new(provider, "specialist", "plan")
    }

    #[tokio::test]
    async fn financial_specialist_runs_planned_action() {
        let invoker = MockToolInvoker::new();
        invoker.script(
            "account_status",
            ToolCallResult {
                success: true,
                error: None,
                data: Some(json!({"total_debt": 100000})),
            },
        );
        let tools: Arc<dyn ToolInvoker> = Arc::new(invoker);
        let llm = tracking_llm(vec![serde_json::to_string(&SubPlan {
            actions: vec![crate::types::SubPlanAction {
                tool: "account_status".to_string(),
                params: json!({}),
                description: "check status".to_string(),
            }],
            reasoning: "need balance".to_string(),
        })
        .expect("serialize")]);

        let report = Specialist::Financial.run("how much do I owe", &json!({}), &llm, &tools).await;
        assert!(report.success);
        assert_eq!(report.specialist, SpecialistKind::Financial);
    }

    #[tokio::test]
    async fn malformed_llm_output_falls_back_to_default_action() {
        let invoker = MockToolInvoker::new();
        invoker.script(
            "create_ticket",
            ToolCallResult {
                success: true,
                error: None,
                data: Some(json!({"id": "T-1"})),
            },
        );
        let tools: Arc<dyn ToolInvoker> = Arc::new(invoker);
        let llm = tracking_llm(vec!["not valid json".to_string()]);

        let report = Specialist::Administrative
            .run("quiero un plan de pagos", &json!({}), &llm, &tools)
            .await;
        assert!(report.success);
        assert_eq!(report.specialist, SpecialistKind::Administrative);
    }

    #[tokio::test]
    async fn unknown_tool_in_plan_is_rejected_without_panicking() {
        let tools: Arc<dyn ToolInvoker> = Arc::new(MockToolInvoker::new());
        let llm = tracking_llm(vec![serde_json::to_string(&SubPlan {
            actions: vec![crate::types::SubPlanAction {
                tool: "not_allowed_tool".to_string(),
                params: json!({}),
                description: "oops".to_string(),
            }],
            reasoning: "bad plan".to_string(),
        })
        .expect("serialize")]);

        let report = Specialist::Financial.run("goal", &json!({}), &llm, &tools).await;
        assert!(!report.success);
        assert!(report.requires_replan);
    }
}
