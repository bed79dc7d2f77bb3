//! Code-planner agent: the alternative runtime selected by
//! `AppConfig::agent_mode == AgentMode::CodePlanner`.
//!
//! Rather than LLM-emitted source run through an interpreter, the model
//! emits a small JSON program (a sequence of tool calls with simple
//! binding of one step's output to a later step's input), interpreted
//! here by a bounded executor. The reflection and self-correction loops
//! mirror the hierarchical planner's own replan loop; the 30s wall-clock
//! timeout becomes a cancellation deadline on the executor future
//! (`tokio::time::timeout`).

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use serde_json::{json, Value};

use crate::llm::TrackingLlm;
use crate::toolclient::ToolInvoker;

/// One step of a generated program: call `tool` with `args`, optionally
/// binding the result under `bind_as` so a later step's `args` can
/// reference it via a `"$name"` placeholder string.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CodeStep {
    /// Tool to invoke.
    pub tool: String,
    /// Arguments, possibly containing `"$name"` placeholders.
    pub args: Value,
    /// Variable name this step's result is bound to, if any.
    #[serde(default)]
    pub bind_as: Option<String>,
}

/// A generated tool-invocation program (the code-planner's "code").
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct CodeProgram {
    /// Ordered steps.
    pub steps: Vec<CodeStep>,
}

/// Result of one `execute` pass over a `CodeProgram`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ExecutionResult {
    /// Whether every step succeeded.
    pub success: bool,
    /// Bound variables plus each step's raw result, for `reflect`/`respond`.
    pub data: Value,
    /// Error detail from the first failing step, if any.
    pub error: Option<String>,
}

/// Outcome of the `reflect` node's judgment.
#[derive(Debug, Clone, Deserialize)]
struct Reflection {
    valid: bool,
    reason: String,
}

/// Default wall-clock timeout for one `execute` pass.
pub const DEFAULT_EXECUTION_TIMEOUT: Duration = Duration::from_secs(30);

/// The code-planner runtime: `plan` -> `execute` -> (`self_correct` loop) ->
/// `reflect` -> (loop back to `plan`) -> `respond`.
pub struct CodePlannerRuntime {
    tools: Arc<dyn ToolInvoker>,
    max_corrections: u32,
    max_planner_iterations: u32,
    execution_timeout: Duration,
}

impl CodePlannerRuntime {
    /// Builds a runtime with the spec's defaults (`max_corrections=3`,
    /// `max_planner_iterations=5`, 30s execution timeout).
    #[must_use]
    pub fn new(tools: Arc<dyn ToolInvoker>) -> Self {
        Self {
            tools,
            max_corrections: 3,
            max_planner_iterations: 5,
            execution_timeout: DEFAULT_EXECUTION_TIMEOUT,
        }
    }

    /// Overrides the default bounds, for tests exercising invariant 6.
    #[must_use]
    pub const fn with_limits(mut self, max_corrections: u32, max_planner_iterations: u32) -> Self {
        self.max_corrections = max_corrections;
        self.max_planner_iterations = max_planner_iterations;
        self
    }

    /// Runs the full code-planner cycle for one inbound message, returning
    /// the final user-facing text. Both iteration counters are finite:
    /// exhausting either routes straight to `respond` with the best
    /// available data.
    pub async fn run(
        &self,
        inbound_text: &str,
        tool_catalog: &Value,
        planner_llm: &TrackingLlm,
        reflect_llm: &TrackingLlm,
        respond_llm: &TrackingLlm,
    ) -> String {
        let mut reflection_reason: Option<String> = None;
        let mut best_result = ExecutionResult {
            success: false,
            data: json!({}),
            error: None,
        };

        for _planner_iteration in 0..self.max_planner_iterations.max(1) {
            let mut program = self
                .plan(inbound_text, tool_catalog, reflection_reason.as_deref(), planner_llm)
                .await;

            let mut result = self.execute(&program).await;
            let mut corrections = 0;
            while !result.success && corrections < self.max_corrections {
                corrections += 1;
                let error_context = result.error.clone();
                program = self
                    .plan(inbound_text, tool_catalog, error_context.as_deref(), planner_llm)
                    .await;
                result = self.execute(&program).await;
            }

            best_result = result.clone();

            let reflection = self.reflect(inbound_text, &result, reflect_llm).await;
            if reflection.valid {
                return self.respond(inbound_text, &result, respond_llm).await;
            }
            reflection_reason = Some(reflection.reason);
        }

        self.respond(inbound_text, &best_result, respond_llm).await
    }

    /// `plan`: prompts the LLM with the tool catalog and inbound text
    /// (plus optional error/reflection context); falls back to an empty
    /// program if the response doesn't parse.
    async fn plan(
        &self,
        inbound_text: &str,
        tool_catalog: &Value,
        context: Option<&str>,
        llm: &TrackingLlm,
    ) -> CodeProgram {
        let mut prompt = format!(
            "Inbound: {inbound_text}\nAvailable tools: {tool_catalog}\nEmit a CodeProgram JSON (steps of {{tool, args, bind_as}})."
        );
        if let Some(ctx) = context {
            prompt.push_str(&format!("\nPrevious attempt context: {ctx}"));
        }
        match llm.generate("code_planner", &prompt, 900).await {
            Ok(completion) => serde_json::from_str(&completion.text).unwrap_or_default(),
            Err(_) => CodeProgram::default(),
        }
    }

    /// `execute`: interprets the program's steps under a wall-clock
    /// deadline, binding each step's result into a variable table that
    /// later steps' `"$name"` placeholders resolve against.
    async fn execute(&self, program: &CodeProgram) -> ExecutionResult {
        let run = async {
            let mut bindings: HashMap<String, Value> = HashMap::new();
            let mut step_results = Vec::new();
            for step in &program.steps {
                let resolved_args = resolve_placeholders(&step.args, &bindings);
                match self.tools.call_tool(&step.tool, resolved_args).await {
                    Ok(result) if result.success => {
                        let data = result.data.unwrap_or(Value::Null);
                        if let Some(name) = &step.bind_as {
                            bindings.insert(name.clone(), data.clone());
                        }
                        step_results.push(json!({"tool": step.tool, "success": true, "data": data}));
                    }
                    Ok(result) => {
                        step_results.push(json!({
                            "tool": step.tool, "success": false, "error": result.error,
                        }));
                        return ExecutionResult {
                            success: false,
                            data: json!({"steps": step_results, "bindings": bindings}),
                            error: result.error.or_else(|| Some("tool call failed".to_string())),
                        };
                    }
                    Err(e) => {
                        step_results.push(json!({"tool": step.tool, "success": false, "error": e.to_string()}));
                        return ExecutionResult {
                            success: false,
                            data: json!({"steps": step_results, "bindings": bindings}),
                            error: Some(e.to_string()),
                        };
                    }
                }
            }
            ExecutionResult {
                success: true,
                data: json!({"steps": step_results, "bindings": bindings}),
                error: None,
            }
        };

        match tokio::time::timeout(self.execution_timeout, run).await {
            Ok(result) => result,
            Err(_) => ExecutionResult {
                success: false,
                data: json!({}),
                error: Some("execution timed out".to_string()),
            },
        }
    }

    /// `reflect`: asks the LLM whether `result` answers `inbound_text`.
    /// Parse failure is treated as "valid" so a broken judge never traps
    /// the run in an unbounded-seeming loop (still bounded by
    /// `max_planner_iterations` regardless).
    async fn reflect(&self, inbound_text: &str, result: &ExecutionResult, llm: &TrackingLlm) -> Reflection {
        let prompt = format!(
            "Inbound: {inbound_text}\nExecution result: {}\nDoes this fully answer the question? Emit {{valid, reason}} JSON.",
            result.data,
        );
        match llm.generate("reflect", &prompt, 300).await {
            Ok(completion) => serde_json::from_str(&completion.text).unwrap_or(Reflection {
                valid: true,
                reason: "reflection parse failure, treated as valid".to_string(),
            }),
            Err(_) => Reflection {
                valid: true,
                reason: "reflection LLM error, treated as valid".to_string(),
            },
        }
    }

    /// `respond`: formulates the final user-facing message from the
    /// execution data, addressing every part of the inbound question.
    async fn respond(&self, inbound_text: &str, result: &ExecutionResult, llm: &TrackingLlm) -> String {
        let prompt = format!(
            "Inbound: {inbound_text}\nExecution data: {}\nWrite one empathetic final reply addressing every part of the question.",
            result.data,
        );
        match llm.generate("respond", &prompt, 600).await {
            Ok(completion) => completion.text,
            Err(_) => "Un miembro del equipo te responderá en breve.".to_string(),
        }
    }
}

fn resolve_placeholders(args: &Value, bindings: &HashMap<String, Value>) -> Value {
    match args {
        Value::String(s) => {
            if let Some(name) = s.strip_prefix('$') {
                bindings.get(name).cloned().unwrap_or_else(|| args.clone())
            } else {
                args.clone()
            }
        }
        Value::Object(map) => Value::Object(
            map.iter()
                .map(|(k, v)| (k.clone(), resolve_placeholders(v, bindings)))
                .collect(),
        ),
        Value::Array(items) => {
            Value::Array(items.iter().map(|v| resolve_placeholders(v, bindings)).collect())
        }
        other => other.clone(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::llm::provider::MockProvider;
    use crate::llm::InferenceProvider;
    use crate::toolclient::{MockToolInvoker, ToolCallResult};

    fn tracking_llm(responses: Vec<String>) -> TrackingLlm {
        let provider: Arc<dyn InferenceProvider> = Arc::new(MockProvider::new(responses));
        TrackingLlm::new(provider, "node", "kind")
    }

    #[tokio::test]
    async fn single_step_program_resolves_and_responds() {
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
        let runtime = CodePlannerRuntime::new(tools);

        let program = CodeProgram {
            steps: vec![CodeStep {
                tool: "account_status".to_string(),
                args: json!({}),
                bind_as: Some("status".to_string()),
            }],
        };
        let planner_llm = tracking_llm(vec![serde_json::to_string(&program).expect("ser")]);
        let reflect_llm = tracking_llm(vec![serde_json::to_string(&json!({"valid": true, "reason": "ok"})).expect("ser")]);
        let respond_llm = tracking_llm(vec!["Debés 1000 pesos.".to_string()]);

        let response = runtime
            .run("cuanto debo", &json!([]), &planner_llm, &reflect_llm, &respond_llm)
            .await;
        assert_eq!(response, "Debés 1000 pesos.");
    }

    #[tokio::test]
    async fn exhausting_reflection_loop_still_produces_a_response() {
        let tools: Arc<dyn ToolInvoker> = Arc::new(MockToolInvoker::new());
        let runtime = CodePlannerRuntime::new(tools).with_limits(3, 2);

        let program = CodeProgram { steps: vec![] };
        let planner_llm = tracking_llm(vec![serde_json::to_string(&program).expect("ser")]);
        let reflect_llm = tracking_llm(vec![
            serde_json::to_string(&json!({"valid": false, "reason": "missing data"})).expect("ser"),
        ]);
        let respond_llm = tracking_llm(vec!["Lo mejor que podemos decir por ahora.".to_string()]);

        let response = runtime
            .run("pregunta dificil", &json!([]), &planner_llm, &reflect_llm, &respond_llm)
            .await;
        assert!(!response.is_empty());
    }

    #[tokio::test]
    async fn execution_failure_triggers_self_correction_then_succeeds() {
        let invoker = MockToolInvoker::new();
        invoker.script(
            "payment_link",
            ToolCallResult {
                success: true,
                error: None,
                data: Some(json!({"url": "https://pay.example/x"})),
            },
        );
        let tools: Arc<dyn ToolInvoker> = Arc::new(invoker);
        let runtime = CodePlannerRuntime::new(tools);

        let broken_program = CodeProgram {
            steps: vec![CodeStep {
                tool: "nonexistent_tool".to_string(),
                args: json!({}),
                bind_as: None,
            }],
        };
        let fixed_program = CodeProgram {
            steps: vec![CodeStep {
                tool: "payment_link".to_string(),
                args: json!({}),
                bind_as: Some("link".to_string()),
            }],
        };
        let planner_llm = tracking_llm(vec![
            serde_json::to_string(&broken_program).expect("ser"),
            serde_json::to_string(&fixed_program).expect("ser"),
        ]);
        let reflect_llm = tracking_llm(vec![serde_json::to_string(&json!({"valid": true, "reason": "ok"})).expect("ser")]);
        let respond_llm = tracking_llm(vec!["Acá tenés el link de pago.".to_string()]);

        let response = runtime
            .run("quiero pagar", &json!([]), &planner_llm, &reflect_llm, &respond_llm)
            .await;
        assert_eq!(response, "Acá tenés el link de pago.");
    }

    #[test]
    fn placeholder_resolution_substitutes_bound_variable() {
        let mut bindings = HashMap::new();
        bindings.insert("status".to_string(), json!({"total_debt": 5}));
        let resolved = resolve_placeholders(&json!({"prior": "$status"}), &bindings);
        assert_eq!(resolved, json!({"prior": {"total_debt": 5}}));
    }
}
