//! Environment-driven configuration, following the same
//! `apply_overrides(env_fn)` pattern as the orchestrator's config layer.

use std::time::Duration;

/// Runtime configuration for the ERP service.
#[derive(Debug, Clone)]
pub struct AppConfig {
    /// Sqlite connection string.
    pub database_url: String,
    /// Orchestrator's webhook endpoint, target of outbound delivery.
    pub gestor_ws_url: String,
    /// Maximum retry attempts for outbound webhook delivery.
    pub webhook_max_retries: u32,
    /// Base delay for the webhook's exponential backoff.
    pub webhook_base_delay: Duration,
    /// HTTP port this service listens on.
    pub api_port: u16,
    /// `tracing-subscriber` env filter directive.
    pub log_level: String,
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            database_url: "sqlite://erp.db".to_string(),
            gestor_ws_url: "http://localhost:8080/webhook/erp/payment-confirmed".to_string(),
            webhook_max_retries: 3,
            webhook_base_delay: Duration::from_secs_f64(1.0),
            api_port: 8081,
            log_level: "info".to_string(),
        }
    }
}

impl AppConfig {
    /// Builds configuration from the process environment.
    #[must_use]
    pub fn from_env() -> Self {
        let mut config = Self::default();
        config.apply_overrides(|key| std::env::var(key).ok());
        config
    }

    /// Applies overrides from an injectable lookup function, for testing.
    pub fn apply_overrides(&mut self, env_fn: impl Fn(&str) -> Option<String>) {
        if let Some(v) = env_fn("DATABASE_URL") {
            self.database_url = v;
        }
        if let Some(v) = env_fn("GESTOR_WS_URL") {
            self.gestor_ws_url = v;
        }
        if let Some(v) = env_fn("WEBHOOK_MAX_RETRIES").and_then(|v| v.parse().ok()) {
            self.webhook_max_retries = v;
        }
        if let Some(v) = env_fn("WEBHOOK_BASE_DELAY").and_then(|v| v.parse::<f64>().ok()) {
            self.webhook_base_delay = Duration::from_secs_f64(v);
        }
        if let Some(v) = env_fn("API_PORT").and_then(|v| v.parse().ok()) {
            self.api_port = v;
        }
        if let Some(v) = env_fn("LOG_LEVEL") {
            self.log_level = v;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn overrides_apply_only_present_keys() {
        let mut config = AppConfig::default();
        config.apply_overrides(|key| match key {
            "API_PORT" => Some("9090".to_string()),
            _ => None,
        });
        assert_eq!(config.api_port, 9090);
        assert_eq!(config.database_url, "sqlite://erp.db");
    }
}
