//! The hierarchical planner: `load_context` -> `manager` -> post-manager
//! router -> `execute_specialist` -> `evaluate` -> post-evaluate router ->
//! `synthesize`, with a replan loop back into `manager`.

use std::sync::Arc;

use serde_json::json;

use crate::db::{Checkpointer, MirrorStore};
use crate::llm::TrackingLlm;
use crate::toolclient::ToolInvoker;
use crate::types::{Intent, MasterPlan, SpecialistKind};

use super::specialist::Specialist;
use super::state::{ConversationState, UserContext};

/// Holds `Arc`s to every collaborator a run needs, mirroring the kernel
/// pipeline's own field shape (policy/inference/executor/sessions/egress/
/// tools/audit), generalized to this runtime's collaborators.
pub struct AgentRuntime {
    mirror: Arc<MirrorStore>,
    checkpointer: Arc<dyn Checkpointer>,
    tools: Arc<dyn ToolInvoker>,
}

impl AgentRuntime {
    /// Builds a runtime over its shared collaborators.
    #[must_use]
    pub fn new(
        mirror: Arc<MirrorStore>,
        checkpointer: Arc<dyn Checkpointer>,
        tools: Arc<dyn ToolInvoker>,
    ) -> Self {
        Self {
            mirror,
            checkpointer,
            tools,
        }
    }

    /// Runs one inbound message to completion, checkpointing after each
    /// node transition under `thread_id` (default: the handle).
    ///
    /// `llm` is a node-tagged `TrackingLlm`; callers typically retag it per
    /// node by constructing fresh `TrackingLlm`s sharing the same inner
    /// provider, since the tag is metadata-only.
    pub async fn run(
        &self,
        thread_id: &str,
        handle: &str,
        inbound_text: &str,
        manager_llm: &TrackingLlm,
        specialist_llm: &TrackingLlm,
        synthesizer_llm: &TrackingLlm,
        replan_cap: u32,
    ) -> String {
        let mut state = self.load_checkpoint(thread_id, handle, inbound_text, replan_cap).await;

        self.load_context(&mut state).await;
        self.checkpoint(thread_id, &state).await;

        loop {
            self.manager(&mut state, manager_llm).await;
            self.checkpoint(thread_id, &state).await;

            if state.error.is_some()
                || state
                    .plan
                    .as_ref()
                    .is_some_and(|p| p.intent == Intent::Greeting || p.steps.is_empty())
            {
                break;
            }

            loop {
                self.execute_specialist(&mut state, specialist_llm).await;
                self.checkpoint(thread_id, &state).await;

                let needs_replan = self.evaluate(&mut state);
                self.checkpoint(thread_id, &state).await;

                if needs_replan {
                    break;
                }
                if state.plan_exhausted() {
                    break;
                }
            }

            if !state
                .reports
                .last()
                .is_some_and(|r| r.requires_replan && state.replan_count < state.replan_cap)
            {
                break;
            }
        }

        let response = self.synthesize(&mut state, synthesizer_llm).await;
        self.checkpoint(thread_id, &state).await;
        response
    }

    async fn load_checkpoint(
        &self,
        thread_id: &str,
        handle: &str,
        inbound_text: &str,
        replan_cap: u32,
    ) -> ConversationState {
        match self.checkpointer.get(thread_id).await {
            Ok(Some(bytes)) => serde_json::from_slice::<ConversationState>(&bytes).unwrap_or_else(
                |_| ConversationState::new(handle, inbound_text, replan_cap),
            ),
            _ => ConversationState::new(handle, inbound_text, replan_cap),
        }
    }

    async fn checkpoint(&self, thread_id: &str, state: &ConversationState) {
        if let Ok(bytes) = serde_json::to_vec(state) {
            let _ = self.checkpointer.put(thread_id, &bytes).await;
        }
    }

    /// Node 1: look up the guardian-mirror by normalized handle. Failure
    /// sets context to `None` without aborting the run.
    async fn load_context(&self, state: &mut ConversationState) {
        if let Ok(Some(guardian)) = self.mirror.guardian_by_handle(&state.handle).await {
            let students = self
                .mirror
                .students_of_guardian(&guardian.id)
                .await
                .unwrap_or_default();
            state.user_context = Some(UserContext {
                name: guardian.name,
                students,
            });
        } else {
            state.user_context = None;
        }
    }

    /// Node 2: prompt the manager LLM for a `MasterPlan`.
    async fn manager(&self, state: &mut ConversationState, llm: &TrackingLlm) {
        let prior_reports = serde_json::to_string(&state.reports).unwrap_or_default();
        let context_summary = state
            .user_context
            .as_ref()
            .map_or_else(|| "unknown guardian".to_string(), |c| c.name.clone());
        let prompt = format!(
            "Inbound: {}\nGuardian: {context_summary}\nPrior reports: {prior_reports}\nEmit a MasterPlan JSON.",
            state.inbound_text,
        );

        match llm.generate("manager", &prompt, 800).await {
            Ok(completion) => match serde_json::from_str::<MasterPlan>(&completion.text) {
                Ok(plan) => {
                    state.plan = Some(plan);
                    state.cursor = 0;
                    state.error = None;
                }
                Err(e) => {
                    state.error = Some(format!("LLM parse error: {e}"));
                }
            },
            Err(e) => {
                state.error = Some(format!("manager LLM error: {e}"));
            }
        }
    }

    /// Node 4: dispatch the step at `cursor` to its named specialist.
    async fn execute_specialist(&self, state: &mut ConversationState, llm: &TrackingLlm) {
        let Some(plan) = state.plan.clone() else {
            return;
        };
        let Some(step) = plan.steps.get(state.cursor) else {
            return;
        };

        let specialist = match step.specialist {
            SpecialistKind::Financial => Specialist::Financial,
            SpecialistKind::Administrative => Specialist::Administrative,
            SpecialistKind::Institutional => Specialist::Institutional,
        };

        let report = specialist.run(&step.goal, &step.params, llm, &self.tools).await;
        state.reports.push(report);
        state.cursor += 1;
    }

    /// Node 5: decide whether the last report demands a replan.
    ///
    /// Returns `true` iff the manager should run again.
    fn evaluate(&self, state: &mut ConversationState) -> bool {
        let Some(last) = state.reports.last() else {
            return false;
        };
        if last.requires_replan && state.replan_count < state.replan_cap {
            state.replan_count += 1;
            true
        } else {
            false
        }
    }

    /// Node 7: produce the single final user-facing message. Never
    /// surfaces technical error details.
    async fn synthesize(&self, state: &mut ConversationState, llm: &TrackingLlm) -> String {
        if state.error.is_some() || state.plan.is_none() {
            let response = "Lo sentimos, no pudimos procesar tu mensaje en este momento. Un miembro del equipo lo revisará en breve.".to_string();
            state.final_response = Some(response.clone());
            return response;
        }

        let plan = state.plan.as_ref().expect("checked above");
        if plan.intent == Intent::Greeting || plan.steps.is_empty() {
            let response = "¡Hola! Puedo ayudarte con consultas de estado de cuenta, pagos, planes de pago y trámites institucionales. ¿En qué puedo ayudarte hoy?".to_string();
            state.final_response = Some(response.clone());
            return response;
        }

        if state.reports.len() == 1 && state.reports[0].success {
            let response = state.reports[0].summary.clone();
            state.final_response = Some(response.clone());
            return response;
        }

        let reports_json = serde_json::to_string(&state.reports).unwrap_or_default();
        let prompt = format!(
            "Inbound: {}\nReports: {reports_json}\nWrite one empathetic reply (max 3 short paragraphs). \
             Never mention technical errors; reframe failures as \"under manual review\".",
            state.inbound_text,
        );

        let response = match llm.generate("synthesizer", &prompt, 600).await {
            Ok(completion) => completion.text,
            Err(_) => reformulate_reports_as_fallback(state),
        };
        state.final_response = Some(response.clone());
        response
    }
}

fn reformulate_reports_as_fallback(state: &ConversationState) -> String {
    let summaries: Vec<&str> = state
        .reports
        .iter()
        .map(|r| {
            if r.success {
                r.summary.as_str()
            } else {
                "Tu consulta quedó en revisión manual."
            }
        })
        .collect();
    if summaries.is_empty() {
        "Un miembro del equipo te responderá en breve.".to_string()
    } else {
        summaries.join(" ")
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::{connect, MirrorStore, NullCheckpointer};
    use crate::llm::provider::MockProvider;
    use crate::toolclient::{MockToolInvoker, ToolCallResult};
    use crate::types::{GuardianMirror, PlanStep, SpecialistKind};
    use chrono::Utc;

    async fn empty_mirror() -> Arc<MirrorStore> {
        let pool = connect("sqlite::memory:").await.expect("connect");
        Arc::new(MirrorStore::new(pool))
    }

    fn tracking_llm(responses: Vec<String>) -> TrackingLlm {
        let provider: Arc<dyn crate::llm::InferenceProvider> =
            Arc::new(MockProvider::new(responses));
        TrackingLlm::new(provider, "node", "kind")
    }

    #[tokio::test]
    async fn greeting_short_circuits_to_welcome() {
        let mirror = empty_mirror().await;
        let checkpointer: Arc<dyn Checkpointer> = Arc::new(NullCheckpointer);
        let tools: Arc<dyn ToolInvoker> = Arc::new(MockToolInvoker::new());
        let runtime = AgentRuntime::new(mirror, checkpointer, tools);

        let greeting_plan = MasterPlan {
            intent: Intent::Greeting,
            confidence: 0.9,
            steps: vec![],
            requires_human: false,
            reasoning: "just a greeting".to_string(),
        };
        let manager_llm = tracking_llm(vec![serde_json::to_string(&greeting_plan).expect("ser")]);
        let specialist_llm = tracking_llm(vec![]);
        let synthesizer_llm = tracking_llm(vec![]);

        let response = runtime
            .run(
                "+5491112345001",
                "+5491112345001",
                "Hola",
                &manager_llm,
                &specialist_llm,
                &synthesizer_llm,
                3,
            )
            .await;

        assert!(response.to_lowercase().contains("hola") || response.contains('!'));
    }

    #[tokio::test]
    async fn single_successful_report_short_circuits_synthesize() {
        let mirror = empty_mirror().await;
        mirror
            .upsert_guardian(&GuardianMirror {
                id: "G-1".to_string(),
                name: "Ana Perez".to_string(),
                handle: "+5491112345001".to_string(),
                last_sync: Utc::now(),
            })
            .await
            .expect("upsert");
        let checkpointer: Arc<dyn Checkpointer> = Arc::new(NullCheckpointer);
        let invoker = MockToolInvoker::new();
        invoker.script(
            "account_status",
            ToolCallResult {
                success: true,
                error: None,
                data: Some(json!({"total_debt": 50000})),
            },
        );
        let tools: Arc<dyn ToolInvoker> = Arc::new(invoker);
        let runtime = AgentRuntime::new(mirror, checkpointer, tools);

        let plan = MasterPlan {
            intent: Intent::FinancialQuery,
            confidence: 0.9,
            steps: vec![PlanStep {
                specialist: SpecialistKind::Financial,
                goal: "check balance".to_string(),
                params: json!({}),
                priority: 0,
            }],
            requires_human: false,
            reasoning: "financial query".to_string(),
        };
        let sub_plan = crate::types::SubPlan {
            actions: vec![crate::types::SubPlanAction {
                tool: "account_status".to_string(),
                params: json!({}),
                description: "check status".to_string(),
            }],
            reasoning: "need balance".to_string(),
        };
        let manager_llm = tracking_llm(vec![serde_json::to_string(&plan).expect("ser")]);
        let specialist_llm = tracking_llm(vec![serde_json::to_string(&sub_plan).expect("ser")]);
        let synthesizer_llm = tracking_llm(vec![]);

        let response = runtime
            .run(
                "+5491112345001",
                "+5491112345001",
                "Cuánto debo?",
                &manager_llm,
                &specialist_llm,
                &synthesizer_llm,
                3,
            )
            .await;

        assert!(!response.is_empty());
    }

    #[tokio::test]
    async fn manager_parse_failure_never_panics_and_reaches_synthesize() {
        let mirror = empty_mirror().await;
        let checkpointer: Arc<dyn Checkpointer> = Arc::new(NullCheckpointer);
        let tools: Arc<dyn ToolInvoker> = Arc::new(MockToolInvoker::new());
        let runtime = AgentRuntime::new(mirror, checkpointer, tools);

        let manager_llm = tracking_llm(vec!["not json".to_string()]);
        let specialist_llm = tracking_llm(vec![]);
        let synthesizer_llm = tracking_llm(vec![]);

        let response = runtime
            .run(
                "+549",
                "+549",
                "???",
                &manager_llm,
                &specialist_llm,
                &synthesizer_llm,
                3,
            )
            .await;

        assert!(!response.is_empty());
    }
}
