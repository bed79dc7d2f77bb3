//! Per-request token tracking: `TokenSession` bound task-locally, never
//! process-globally, and the `TrackingLlm` wrapper that every runtime LLM
//! call must go through.

use std::sync::{Arc, Mutex};
use std::time::Instant;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::Serialize;
use serde_json::json;

use super::provider::{Completion, InferenceError, InferenceProvider};

tokio::task_local! {
    static CURRENT_SESSION: Arc<Mutex<TokenSessionState>>;
}

/// One LLM invocation's token accounting, appended to the active session.
#[derive(Debug, Clone, Serialize)]
pub struct InferenceRecord {
    /// Name of the runtime node that issued the call (e.g. `"manager"`).
    pub node: String,
    /// Free-form kind tag (e.g. `"plan"`, `"synthesize"`).
    pub kind: String,
    /// Prompt tokens, estimated if the provider didn't report them.
    pub prompt_tokens: u32,
    /// Completion tokens, estimated if the provider didn't report them.
    pub completion_tokens: u32,
    /// Sum of prompt and completion tokens.
    pub total_tokens: u32,
    /// When the call was recorded.
    pub timestamp: DateTime<Utc>,
    /// Free-form metadata (model name, provider tag, etc).
    pub metadata: serde_json::Value,
}

#[derive(Debug)]
struct TokenSessionState {
    query_id: String,
    handle: String,
    inbound_text: String,
    start: Instant,
    started_at: DateTime<Utc>,
    records: Vec<InferenceRecord>,
    provider_tag: String,
    model_tag: String,
}

/// Handle to the currently-bound token session; cheap to clone, all clones
/// share the same underlying state.
#[derive(Clone)]
pub struct TokenSession {
    inner: Arc<Mutex<TokenSessionState>>,
}

impl TokenSession {
    /// Runs `fut` with a freshly-started session bound task-locally for its
    /// entire duration, then finalizes (logs totals) before returning.
    pub async fn start<F, Fut, T>(
        query_id: impl Into<String>,
        handle: impl Into<String>,
        inbound_text: impl Into<String>,
        provider_tag: impl Into<String>,
        model_tag: impl Into<String>,
        fut: F,
    ) -> T
    where
        F: FnOnce() -> Fut,
        Fut: std::future::Future<Output = T>,
    {
        let state = Arc::new(Mutex::new(TokenSessionState {
            query_id: query_id.into(),
            handle: handle.into(),
            inbound_text: inbound_text.into(),
            start: Instant::now(),
            started_at: Utc::now(),
            records: Vec::new(),
            provider_tag: provider_tag.into(),
            model_tag: model_tag.into(),
        }));
        let result = CURRENT_SESSION.scope(Arc::clone(&state), fut()).await;
        finalize(&state);
        result
    }

    /// Appends a record to the currently-bound session, if one is bound.
    /// Silently does nothing outside a `start` scope (e.g. in unit tests
    /// that call a provider directly).
    fn record(record: InferenceRecord) {
        let _ = CURRENT_SESSION.try_with(|session| {
            session.lock().expect("token session mutex").records.push(record);
        });
    }
}

fn finalize(state: &Arc<Mutex<TokenSessionState>>) {
    let guard = state.lock().expect("token session mutex");
    let total_prompt: u32 = guard.records.iter().map(|r| r.prompt_tokens).sum();
    let total_completion: u32 = guard.records.iter().map(|r| r.completion_tokens).sum();
    let total: u32 = guard.records.iter().map(|r| r.total_tokens).sum();
    let elapsed_ms = guard.start.elapsed().as_millis();

    let summary = json!({
        "query_id": guard.query_id,
        "handle": guard.handle,
        "provider": guard.provider_tag,
        "model": guard.model_tag,
        "started_at": guard.started_at.to_rfc3339(),
        "inference_count": guard.records.len(),
        "total_prompt_tokens": total_prompt,
        "total_completion_tokens": total_completion,
        "total_tokens": total,
        "elapsed_ms": elapsed_ms,
    });
    tracing::info!("[TOKEN_USAGE] {}", summary);
    tracing::info!(
        "token session {} for {}: {} calls, {} prompt + {} completion = {} tokens in {}ms",
        guard.query_id,
        guard.handle,
        guard.records.len(),
        total_prompt,
        total_completion,
        total,
        elapsed_ms,
    );
}

/// Estimates a token count from text when provider metadata is absent.
///
/// A rough 4-characters-per-token heuristic, good enough as a fallback —
/// the tracking contract only requires *a* number, not a precise one.
fn estimate_tokens(text: &str) -> u32 {
    u32::try_from(text.len().div_ceil(4)).unwrap_or(u32::MAX)
}

/// Wraps any `InferenceProvider` so every call is recorded against the
/// task-local `TokenSession`, tolerating provider-specific usage-field
/// layouts and falling back to an estimate when absent.
pub struct TrackingLlm {
    inner: Arc<dyn InferenceProvider>,
    node: String,
    kind: String,
}

impl TrackingLlm {
    /// Wraps `inner`, tagging every recorded call with `node`/`kind`.
    #[must_use]
    pub fn new(inner: Arc<dyn InferenceProvider>, node: impl Into<String>, kind: impl Into<String>) -> Self {
        Self {
            inner,
            node: node.into(),
            kind: kind.into(),
        }
    }

    /// Generates a completion, recording token usage against the active
    /// session (a no-op if no session is bound).
    ///
    /// # Errors
    ///
    /// Propagates whatever the wrapped provider returns.
    pub async fn generate(
        &self,
        model: &str,
        prompt: &str,
        max_tokens: u32,
    ) -> Result<Completion, InferenceError> {
        let completion = self.inner.generate(model, prompt, max_tokens).await?;

        let prompt_tokens = completion
            .usage
            .prompt_tokens
            .unwrap_or_else(|| estimate_tokens(prompt));
        let completion_tokens = completion
            .usage
            .completion_tokens
            .unwrap_or_else(|| estimate_tokens(&completion.text));

        TokenSession::record(InferenceRecord {
            node: self.node.clone(),
            kind: self.kind.clone(),
            prompt_tokens,
            completion_tokens,
            total_tokens: prompt_tokens.saturating_add(completion_tokens),
            timestamp: Utc::now(),
            metadata: json!({ "model": model }),
        });

        Ok(completion)
    }
}

#[async_trait]
impl InferenceProvider for TrackingLlm {
    async fn generate(
        &self,
        model: &str,
        prompt: &str,
        max_tokens: u32,
    ) -> Result<Completion, InferenceError> {
        TrackingLlm::generate(self, model, prompt, max_tokens).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::llm::provider::MockProvider;

    #[tokio::test]
    async fn records_accumulate_and_sum_matches_totals() {
        let provider: Arc<dyn InferenceProvider> = Arc::new(MockProvider::new(vec![
            "one".to_string(),
            "two".to_string(),
        ]));
        let tracked = TrackingLlm::new(Arc::clone(&provider), "manager", "plan");

        TokenSession::start("q1", "+54911", "hola", "mock", "mock-model", || async {
            tracked.generate("mock-model", "prompt one", 50).await.expect("ok");
            tracked.generate("mock-model", "prompt two", 50).await.expect("ok");
        })
        .await;
    }

    #[tokio::test]
    async fn generate_outside_session_does_not_panic() {
        let provider: Arc<dyn InferenceProvider> = Arc::new(MockProvider::new(vec!["x".to_string()]));
        let tracked = TrackingLlm::new(provider, "manager", "plan");
        let completion = tracked.generate("m", "p", 10).await.expect("ok");
        assert_eq!(completion.text, "x");
    }

    #[test]
    fn estimate_tokens_is_roughly_length_over_four() {
        assert_eq!(estimate_tokens("abcd"), 1);
        assert_eq!(estimate_tokens("abcdefgh"), 2);
        assert_eq!(estimate_tokens(""), 0);
    }
}
