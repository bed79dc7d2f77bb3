use std::sync::Arc;

use anyhow::{Context, Result};
use tool_server::config::AppConfig;
use tool_server::erp_client::ErpClient;
use tool_server::registry::ToolRegistry;
use tool_server::tools::build_all;
use tool_server::{router, AppState};
use tracing::info;

#[tokio::main]
async fn main() -> Result<()> {
    dotenvy::dotenv().ok();
    let config = AppConfig::from_env();

    tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::new(&config.log_level))
        .init();

    info!(api_port = config.api_port, mock_mode = config.mock_mode, "tool-server starting");

    let erp = Arc::new(ErpClient::new(config.erp_url.clone()));
    ToolRegistry::install(build_all(erp));

    let app = router(AppState { mock_mode: config.mock_mode });

    let listener = tokio::net::TcpListener::bind(("0.0.0.0", config.api_port))
        .await
        .with_context(|| format!("failed to bind to port {}", config.api_port))?;
    info!(api_port = config.api_port, "listening");
    axum::serve(listener, app).await.context("server error")?;
    Ok(())
}
