//! `InferenceProvider` trait plus concrete OpenAI/Google/mock
//! implementations, grounded on the kernel's `InferenceProvider` /
//! `OllamaProvider` / `OpenAiProvider` shape.

use async_trait::async_trait;
use serde::Deserialize;
use serde_json::json;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Mutex;

/// Errors a provider can raise while generating a completion.
#[derive(Debug, thiserror::Error)]
pub enum InferenceError {
    /// The HTTP request itself failed (network, TLS, etc).
    #[error("request failed: {0}")]
    RequestFailed(String),
    /// The model name is not recognized by the provider.
    #[error("model unavailable: {0}")]
    ModelUnavailable(String),
    /// The response could not be parsed into the expected shape.
    #[error("response parse error: {0}")]
    ParseError(String),
}

/// Raw token usage as reported by a provider, tolerating missing fields.
#[derive(Debug, Clone, Copy, Default)]
pub struct TokenUsageHint {
    /// Prompt tokens, if the provider reported them.
    pub prompt_tokens: Option<u32>,
    /// Completion tokens, if the provider reported them.
    pub completion_tokens: Option<u32>,
}

/// Result of one `generate` call: the text plus whatever usage hint the
/// provider returned (possibly empty; the tracking wrapper estimates the
/// rest when a provider doesn't report token counts).
#[derive(Debug, Clone)]
pub struct Completion {
    /// Generated text.
    pub text: String,
    /// Token usage as reported by the provider, if any.
    pub usage: TokenUsageHint,
}

/// A pluggable chat-completion backend.
#[async_trait]
pub trait InferenceProvider: Send + Sync {
    /// Generates a completion for `prompt` using `model`, capped at
    /// `max_tokens` output tokens.
    ///
    /// # Errors
    ///
    /// Returns `InferenceError` on network failure, an unrecognized model,
    /// or a response that doesn't parse.
    async fn generate(
        &self,
        model: &str,
        prompt: &str,
        max_tokens: u32,
    ) -> Result<Completion, InferenceError>;
}

/// OpenAI-compatible chat completions provider.
pub struct OpenAiProvider {
    client: reqwest::Client,
    api_key: String,
    base_url: String,
}

impl OpenAiProvider {
    /// Builds a provider against the public OpenAI API.
    #[must_use]
    pub fn new(api_key: impl Into<String>) -> Self {
        Self {
            client: reqwest::Client::new(),
            api_key: api_key.into(),
            base_url: "https://api.openai.com/v1".to_string(),
        }
    }
}

#[derive(Deserialize)]
struct OpenAiResponse {
    choices: Vec<OpenAiChoice>,
    usage: Option<OpenAiUsage>,
}

#[derive(Deserialize)]
struct OpenAiChoice {
    message: OpenAiMessage,
}

#[derive(Deserialize)]
struct OpenAiMessage {
    content: String,
}

#[derive(Deserialize)]
struct OpenAiUsage {
    prompt_tokens: Option<u32>,
    completion_tokens: Option<u32>,
}

#[async_trait]
impl InferenceProvider for OpenAiProvider {
    async fn generate(
        &self,
        model: &str,
        prompt: &str,
        max_tokens: u32,
    ) -> Result<Completion, InferenceError> {
        let response = self
            .client
            .post(format!("{}/chat/completions", self.base_url))
            .bearer_auth(&self.api_key)
            .json(&json!({
                "model": model,
                "max_tokens": max_tokens,
                "messages": [{"role": "user", "content": prompt}],
            }))
            .send()
            .await
            .map_err(|e| InferenceError::RequestFailed(e.to_string()))?;

        if response.status().as_u16() == 404 {
            return Err(InferenceError::ModelUnavailable(model.to_string()));
        }

        let parsed: OpenAiResponse = response
            .json()
            .await
            .map_err(|e| InferenceError::ParseError(e.to_string()))?;

        let text = parsed
            .choices
            .into_iter()
            .next()
            .map(|c| c.message.content)
            .ok_or_else(|| InferenceError::ParseError("no choices in response".to_string()))?;

        Ok(Completion {
            text,
            usage: TokenUsageHint {
                prompt_tokens: parsed.usage.as_ref().and_then(|u| u.prompt_tokens),
                completion_tokens: parsed.usage.and_then(|u| u.completion_tokens),
            },
        })
    }
}

/// Google Generative Language API provider.
pub struct GoogleProvider {
    client: reqwest::Client,
    api_key: String,
    base_url: String,
}

impl GoogleProvider {
    /// Builds a provider against the public Gemini API.
    #[must_use]
    pub fn new(api_key: impl Into<String>) -> Self {
        Self {
            client: reqwest::Client::new(),
            api_key: api_key.into(),
            base_url: "https://generativelanguage.googleapis.com/v1beta".to_string(),
        }
    }
}

#[derive(Deserialize)]
struct GoogleResponse {
    candidates: Vec<GoogleCandidate>,
    #[serde(rename = "usageMetadata")]
    usage_metadata: Option<GoogleUsage>,
}

#[derive(Deserialize)]
struct GoogleCandidate {
    content: GoogleContent,
}

#[derive(Deserialize)]
struct GoogleContent {
    parts: Vec<GooglePart>,
}

#[derive(Deserialize)]
struct GooglePart {
    text: String,
}

#[derive(Deserialize)]
struct GoogleUsage {
    #[serde(rename = "promptTokenCount")]
    prompt_token_count: Option<u32>,
    #[serde(rename = "candidatesTokenCount")]
    candidates_token_count: Option<u32>,
}

#[async_trait]
impl InferenceProvider for GoogleProvider {
    async fn generate(
        &self,
        model: &str,
        prompt: &str,
        max_tokens: u32,
    ) -> Result<Completion, InferenceError> {
        let url = format!(
            "{}/models/{model}:generateContent?key={}",
            self.base_url, self.api_key
        );
        let response = self
            .client
            .post(url)
            .json(&json!({
                "contents": [{"parts": [{"text": prompt}]}],
                "generationConfig": {"maxOutputTokens": max_tokens},
            }))
            .send()
            .await
            .map_err(|e| InferenceError::RequestFailed(e.to_string()))?;

        if response.status().as_u16() == 404 {
            return Err(InferenceError::ModelUnavailable(model.to_string()));
        }

        let parsed: GoogleResponse = response
            .json()
            .await
            .map_err(|e| InferenceError::ParseError(e.to_string()))?;

        let text = parsed
            .candidates
            .into_iter()
            .next()
            .and_then(|c| c.content.parts.into_iter().next())
            .map(|p| p.text)
            .ok_or_else(|| InferenceError::ParseError("no candidates in response".to_string()))?;

        Ok(Completion {
            text,
            usage: TokenUsageHint {
                prompt_tokens: parsed
                    .usage_metadata
                    .as_ref()
                    .and_then(|u| u.prompt_token_count),
                completion_tokens: parsed
                    .usage_metadata
                    .and_then(|u| u.candidates_token_count),
            },
        })
    }
}

/// Test double that returns queued scripted responses and counts calls,
/// mirroring `MockPlannerProvider` in the kernel's own test suite.
pub struct MockProvider {
    responses: Mutex<Vec<String>>,
    calls: AtomicUsize,
}

impl MockProvider {
    /// Builds a provider that yields `responses` in order, then repeats
    /// the last one once exhausted.
    #[must_use]
    pub fn new(responses: Vec<String>) -> Self {
        Self {
            responses: Mutex::new(responses),
            calls: AtomicUsize::new(0),
        }
    }

    /// Number of `generate` calls made so far.
    pub fn call_count(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl InferenceProvider for MockProvider {
    async fn generate(
        &self,
        _model: &str,
        _prompt: &str,
        _max_tokens: u32,
    ) -> Result<Completion, InferenceError> {
        let idx = self.calls.fetch_add(1, Ordering::SeqCst);
        let responses = self.responses.lock().expect("mock provider mutex");
        let text = responses
            .get(idx)
            .or_else(|| responses.last())
            .cloned()
            .unwrap_or_default();
        Ok(Completion {
            text,
            usage: TokenUsageHint {
                prompt_tokens: Some(10),
                completion_tokens: Some(5),
            },
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn mock_provider_counts_calls_and_cycles_last_response() {
        let provider = MockProvider::new(vec!["first".to_string(), "second".to_string()]);
        let a = provider.generate("m", "p", 10).await.expect("ok");
        let b = provider.generate("m", "p", 10).await.expect("ok");
        let c = provider.generate("m", "p", 10).await.expect("ok");
        assert_eq!(a.text, "first");
        assert_eq!(b.text, "second");
        assert_eq!(c.text, "second");
        assert_eq!(provider.call_count(), 3);
    }
}
