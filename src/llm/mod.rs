//! Pluggable LLM providers plus the token-tracking wrapper around them.

pub mod provider;
pub mod tracking;

pub use provider::{GoogleProvider, InferenceError, InferenceProvider, MockProvider, OpenAiProvider};
pub use tracking::{InferenceRecord, TokenSession, TrackingLlm};
