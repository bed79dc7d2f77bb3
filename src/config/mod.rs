//! Layered configuration: defaults, then environment variable overrides.
//!
//! Mirrors the env-var table the whole system recognizes (each service only
//! reads the subset it cares about). Resolution always goes through an
//! injectable `env_fn: impl Fn(&str) -> Option<String>` so tests can supply a
//! fake environment instead of mutating the real process environment.

use std::fmt;

/// Which LLM vendor the orchestrator talks to.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LlmProvider {
    /// OpenAI-compatible chat completions API.
    OpenAi,
    /// Google Generative Language API.
    Google,
}

impl LlmProvider {
    fn parse(raw: &str) -> Self {
        match raw.to_ascii_lowercase().as_str() {
            "google" => Self::Google,
            _ => Self::OpenAi,
        }
    }
}

/// Which agent architecture dispatches inbound messages.
///
/// The hierarchical planner is primary; the code-planner is selectable.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AgentMode {
    /// Manager + specialist subgraphs.
    Hierarchical,
    /// Tool-invocation DSL emitted and interpreted by a bounded executor.
    CodePlanner,
}

impl AgentMode {
    fn parse(raw: &str) -> Self {
        match raw.to_ascii_lowercase().as_str() {
            "code_planner" | "code-planner" => Self::CodePlanner,
            _ => Self::Hierarchical,
        }
    }
}

/// A value that must never appear verbatim in logs or `Debug` output.
#[derive(Clone, Default, PartialEq, Eq)]
pub struct Secret(pub Option<String>);

impl Secret {
    /// Returns the underlying value, if any.
    #[must_use]
    pub fn expose(&self) -> Option<&str> {
        self.0.as_deref()
    }

    /// True when a WhatsApp-style token begins with `dummy`, signalling
    /// simulation mode rather than a live credential.
    #[must_use]
    pub fn is_dummy(&self) -> bool {
        self.0
            .as_deref()
            .is_some_and(|v| v.to_ascii_lowercase().starts_with("dummy"))
    }
}

impl fmt::Debug for Secret {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.0 {
            Some(_) => write!(f, "__REDACTED__"),
            None => write!(f, "None"),
        }
    }
}

/// Orchestrator (`gestor`) configuration, loaded once at startup.
#[derive(Clone)]
pub struct AppConfig {
    /// Mirror store connection string (`DATABASE_URL`).
    pub database_url: String,
    /// Base URL for the ERP adapter (`ERP_URL` or `MOCK_ERP_URL`).
    pub erp_url: String,
    /// Base URL the ERP posts outbound webhooks to (`GESTOR_WS_URL`).
    pub gestor_ws_url: String,
    /// Graph store URI (`NEO4J_URI`) — carried for completeness; analytics
    /// is an external collaborator this orchestrator never queries directly.
    pub neo4j_uri: Option<String>,
    /// Graph store user (`NEO4J_USER`).
    pub neo4j_user: Option<String>,
    /// Graph store password (`NEO4J_PASSWORD`).
    pub neo4j_password: Secret,
    /// Which model family to use (`LLM_PROVIDER`).
    pub llm_provider: LlmProvider,
    /// Model name (`LLM_MODEL`).
    pub llm_model: String,
    /// Sampling temperature (`LLM_TEMPERATURE`).
    pub llm_temperature: f32,
    /// Max output tokens (`LLM_MAX_TOKENS`).
    pub llm_max_tokens: u32,
    /// OpenAI credential (`OPENAI_API_KEY`).
    pub openai_api_key: Secret,
    /// Google credential (`GOOGLE_API_KEY`).
    pub google_api_key: Secret,
    /// Messaging auth token (`WHATSAPP_TOKEN`); `dummy*` triggers simulation.
    pub whatsapp_token: Secret,
    /// Outbound path segment (`WHATSAPP_PHONE_NUMBER_ID`).
    pub whatsapp_phone_number_id: String,
    /// Inbound verification handshake token (`WHATSAPP_VERIFY_TOKEN`).
    pub whatsapp_verify_token: String,
    /// Outbound webhook retry cap (`WEBHOOK_MAX_RETRIES`).
    pub webhook_max_retries: u32,
    /// Outbound webhook base delay in seconds (`WEBHOOK_BASE_DELAY`).
    pub webhook_base_delay_secs: f64,
    /// Tool server base URL (`MCP_TOOLS_URL`).
    pub mcp_tools_url: String,
    /// HTTP bind port (`API_PORT`).
    pub api_port: u16,
    /// `tracing` env-filter default (`LOG_LEVEL`).
    pub log_level: String,
    /// Replan cap for the hierarchical planner (default 3, not in the env
    /// table but exposed for tests).
    pub max_replans: u32,
    /// Which agent architecture dispatches inbound messages.
    pub agent_mode: AgentMode,
}

impl fmt::Debug for AppConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("AppConfig")
            .field("database_url", &self.database_url)
            .field("erp_url", &self.erp_url)
            .field("gestor_ws_url", &self.gestor_ws_url)
            .field("neo4j_uri", &self.neo4j_uri)
            .field("neo4j_user", &self.neo4j_user)
            .field("neo4j_password", &self.neo4j_password)
            .field("llm_provider", &self.llm_provider)
            .field("llm_model", &self.llm_model)
            .field("llm_temperature", &self.llm_temperature)
            .field("llm_max_tokens", &self.llm_max_tokens)
            .field("openai_api_key", &self.openai_api_key)
            .field("google_api_key", &self.google_api_key)
            .field("whatsapp_token", &self.whatsapp_token)
            .field("whatsapp_phone_number_id", &self.whatsapp_phone_number_id)
            .field("whatsapp_verify_token", &"__REDACTED__")
            .field("webhook_max_retries", &self.webhook_max_retries)
            .field("webhook_base_delay_secs", &self.webhook_base_delay_secs)
            .field("mcp_tools_url", &self.mcp_tools_url)
            .field("api_port", &self.api_port)
            .field("log_level", &self.log_level)
            .field("max_replans", &self.max_replans)
            .field("agent_mode", &self.agent_mode)
            .finish()
    }
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            database_url: "sqlite://gestor.db".to_string(),
            erp_url: "http://localhost:8001".to_string(),
            gestor_ws_url: "http://localhost:8000".to_string(),
            neo4j_uri: None,
            neo4j_user: None,
            neo4j_password: Secret::default(),
            llm_provider: LlmProvider::OpenAi,
            llm_model: "gpt-4o-mini".to_string(),
            llm_temperature: 0.3,
            llm_max_tokens: 1024,
            openai_api_key: Secret::default(),
            google_api_key: Secret::default(),
            whatsapp_token: Secret(Some("dummy-token".to_string())),
            whatsapp_phone_number_id: "0".to_string(),
            whatsapp_verify_token: "verify-me".to_string(),
            webhook_max_retries: 3,
            webhook_base_delay_secs: 1.0,
            mcp_tools_url: "http://localhost:8002".to_string(),
            api_port: 8000,
            log_level: "info".to_string(),
            max_replans: 3,
            agent_mode: AgentMode::Hierarchical,
        }
    }
}

impl AppConfig {
    /// Loads configuration from the real process environment.
    #[must_use]
    pub fn from_env() -> Self {
        Self::default().apply_overrides(|key| std::env::var(key).ok())
    }

    /// Applies environment overrides through an injectable resolver,
    /// field by field, leaving defaults in place when the resolver returns
    /// `None`.
    #[must_use]
    pub fn apply_overrides(mut self, env_fn: impl Fn(&str) -> Option<String>) -> Self {
        if let Some(v) = env_fn("DATABASE_URL") {
            self.database_url = v;
        }
        if let Some(v) = env_fn("ERP_URL").or_else(|| env_fn("MOCK_ERP_URL")) {
            self.erp_url = v;
        }
        if let Some(v) = env_fn("GESTOR_WS_URL") {
            self.gestor_ws_url = v;
        }
        if let Some(v) = env_fn("NEO4J_URI") {
            self.neo4j_uri = Some(v);
        }
        if let Some(v) = env_fn("NEO4J_USER") {
            self.neo4j_user = Some(v);
        }
        if let Some(v) = env_fn("NEO4J_PASSWORD") {
            self.neo4j_password = Secret(Some(v));
        }
        if let Some(v) = env_fn("LLM_PROVIDER") {
            self.llm_provider = LlmProvider::parse(&v);
        }
        if let Some(v) = env_fn("LLM_MODEL") {
            self.llm_model = v;
        }
        if let Some(v) = env_fn("LLM_TEMPERATURE") {
            if let Ok(parsed) = v.parse() {
                self.llm_temperature = parsed;
            }
        }
        if let Some(v) = env_fn("LLM_MAX_TOKENS") {
            if let Ok(parsed) = v.parse() {
                self.llm_max_tokens = parsed;
            }
        }
        if let Some(v) = env_fn("OPENAI_API_KEY") {
            self.openai_api_key = Secret(Some(v));
        }
        if let Some(v) = env_fn("GOOGLE_API_KEY") {
            self.google_api_key = Secret(Some(v));
        }
        if let Some(v) = env_fn("WHATSAPP_TOKEN") {
            self.whatsapp_token = Secret(Some(v));
        }
        if let Some(v) = env_fn("WHATSAPP_PHONE_NUMBER_ID") {
            self.whatsapp_phone_number_id = v;
        }
        if let Some(v) = env_fn("WHATSAPP_VERIFY_TOKEN") {
            self.whatsapp_verify_token = v;
        }
        if let Some(v) = env_fn("WEBHOOK_MAX_RETRIES") {
            if let Ok(parsed) = v.parse() {
                self.webhook_max_retries = parsed;
            }
        }
        if let Some(v) = env_fn("WEBHOOK_BASE_DELAY") {
            if let Ok(parsed) = v.parse() {
                self.webhook_base_delay_secs = parsed;
            }
        }
        if let Some(v) = env_fn("MCP_TOOLS_URL") {
            self.mcp_tools_url = v;
        }
        if let Some(v) = env_fn("API_PORT") {
            if let Ok(parsed) = v.parse() {
                self.api_port = parsed;
            }
        }
        if let Some(v) = env_fn("LOG_LEVEL") {
            self.log_level = v;
        }
        if let Some(v) = env_fn("AGENT_MODE") {
            self.agent_mode = AgentMode::parse(&v);
        }
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn env_map(pairs: &[(&str, &str)]) -> HashMap<String, String> {
        pairs
            .iter()
            .map(|(k, v)| ((*k).to_string(), (*v).to_string()))
            .collect()
    }

    #[test]
    fn defaults_are_sane() {
        let cfg = AppConfig::default();
        assert_eq!(cfg.webhook_max_retries, 3);
        assert!((cfg.webhook_base_delay_secs - 1.0).abs() < f64::EPSILON);
        assert_eq!(cfg.agent_mode, AgentMode::Hierarchical);
        assert!(cfg.whatsapp_token.is_dummy());
    }

    #[test]
    fn env_overrides_take_precedence() {
        let env = env_map(&[
            ("DATABASE_URL", "sqlite://test.db"),
            ("LLM_PROVIDER", "google"),
            ("WEBHOOK_MAX_RETRIES", "5"),
            ("AGENT_MODE", "code_planner"),
        ]);
        let cfg = AppConfig::default().apply_overrides(|k| env.get(k).cloned());
        assert_eq!(cfg.database_url, "sqlite://test.db");
        assert_eq!(cfg.llm_provider, LlmProvider::Google);
        assert_eq!(cfg.webhook_max_retries, 5);
        assert_eq!(cfg.agent_mode, AgentMode::CodePlanner);
    }

    #[test]
    fn mock_erp_url_is_a_fallback_for_erp_url() {
        let env = env_map(&[("MOCK_ERP_URL", "http://mock:9999")]);
        let cfg = AppConfig::default().apply_overrides(|k| env.get(k).cloned());
        assert_eq!(cfg.erp_url, "http://mock:9999");
    }

    #[test]
    fn debug_redacts_secrets() {
        let env = env_map(&[("OPENAI_API_KEY", "sk-super-secret")]);
        let cfg = AppConfig::default().apply_overrides(|k| env.get(k).cloned());
        let rendered = format!("{cfg:?}");
        assert!(!rendered.contains("sk-super-secret"));
        assert!(rendered.contains("__REDACTED__"));
    }

    #[test]
    fn invalid_numeric_override_keeps_default() {
        let env = env_map(&[("API_PORT", "not-a-number")]);
        let cfg = AppConfig::default().apply_overrides(|k| env.get(k).cloned());
        assert_eq!(cfg.api_port, 8000);
    }
}
