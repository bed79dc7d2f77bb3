//! Environment-driven configuration.

/// Runtime configuration for the tool server.
#[derive(Debug, Clone)]
pub struct AppConfig {
    /// Base URL of the ERP service the erp-category tools call.
    pub erp_url: String,
    /// Process-wide mock flag: short-circuits tools with a
    /// `mock_response` and lets handlers branch on it themselves.
    pub mock_mode: bool,
    /// HTTP port this service listens on.
    pub api_port: u16,
    /// `tracing-subscriber` env filter directive.
    pub log_level: String,
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            erp_url: "http://localhost:8081".to_string(),
            mock_mode: false,
            api_port: 8082,
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
        if let Some(v) = env_fn("ERP_URL") {
            self.erp_url = v;
        }
        if let Some(v) = env_fn("MOCK_MODE").and_then(|v| v.parse().ok()) {
            self.mock_mode = v;
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
    fn mock_mode_parses_from_env() {
        let mut config = AppConfig::default();
        config.apply_overrides(|key| match key {
            "MOCK_MODE" => Some("true".to_string()),
            _ => None,
        });
        assert!(config.mock_mode);
    }
}
