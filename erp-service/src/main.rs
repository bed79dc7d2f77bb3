use std::sync::Arc;

use anyhow::{Context, Result};
use erp_service::config::AppConfig;
use erp_service::db::{connect, ErpRepository};
use erp_service::handlers::{router, AppState};
use erp_service::webhook::WebhookClient;
use tracing::info;

#[tokio::main]
async fn main() -> Result<()> {
    dotenvy::dotenv().ok();
    let config = AppConfig::from_env();

    tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::new(&config.log_level))
        .json()
        .init();

    info!(api_port = config.api_port, "erp-service starting");

    let pool = connect(&config.database_url)
        .await
        .context("failed to connect to erp database")?;
    let repo = ErpRepository::new(pool);
    let webhook = Arc::new(WebhookClient::new(
        config.gestor_ws_url.clone(),
        config.webhook_max_retries,
        config.webhook_base_delay,
    ));

    let app = router(AppState { repo, webhook });

    let listener = tokio::net::TcpListener::bind(("0.0.0.0", config.api_port))
        .await
        .with_context(|| format!("failed to bind to port {}", config.api_port))?;
    info!(api_port = config.api_port, "listening");
    axum::serve(listener, app).await.context("server error")?;
    Ok(())
}
