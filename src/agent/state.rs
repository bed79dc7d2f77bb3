//! Per-request mutable state threaded explicitly through the hierarchical
//! planner's node functions.

use std::collections::HashMap;

use serde::{Deserialize, Serialize};

use crate::types::{MasterPlan, SpecialistReport};

/// Context loaded for a known guardian at `load_context` time.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct UserContext {
    /// Guardian display name.
    pub name: String,
    /// Names of the guardian's students.
    pub students: Vec<String>,
}

/// The mutable state threaded through one inbound-message run.
///
/// Serializable as-is for checkpointing; the schema must stay stable so
/// restarts after a deploy can still resume in-flight conversations.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ConversationState {
    /// Normalized inbound handle.
    pub handle: String,
    /// Raw inbound message text.
    pub inbound_text: String,
    /// Loaded guardian context, if the handle matched a known guardian.
    pub user_context: Option<UserContext>,
    /// Current strategic plan, once the manager has run at least once.
    pub plan: Option<MasterPlan>,
    /// Index into `plan.steps` of the next step to execute.
    pub cursor: usize,
    /// Reports accumulated from specialist runs so far.
    pub reports: Vec<SpecialistReport>,
    /// How many times the manager has re-planned.
    pub replan_count: u32,
    /// Upper bound on `replan_count` (default 3, invariant 5).
    pub replan_cap: u32,
    /// Final synthesized response, once `synthesize` has run.
    pub final_response: Option<String>,
    /// Set when a node hits an unrecoverable error (routes to the
    /// synthesize-error path).
    pub error: Option<String>,
    /// Opaque scratch space for node-to-node data that doesn't belong in a
    /// typed field.
    pub memory: HashMap<String, serde_json::Value>,
}

impl ConversationState {
    /// Starts a fresh run for one inbound message.
    #[must_use]
    pub fn new(handle: impl Into<String>, inbound_text: impl Into<String>, replan_cap: u32) -> Self {
        Self {
            handle: handle.into(),
            inbound_text: inbound_text.into(),
            user_context: None,
            plan: None,
            cursor: 0,
            reports: Vec::new(),
            replan_count: 0,
            replan_cap,
            final_response: None,
            error: None,
            memory: HashMap::new(),
        }
    }

    /// Whether every step of the current plan has been executed.
    #[must_use]
    pub fn plan_exhausted(&self) -> bool {
        self.plan
            .as_ref()
            .map_or(true, |plan| self.cursor >= plan.steps.len())
    }
}
