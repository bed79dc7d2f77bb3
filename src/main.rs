//! `gestor` — WhatsApp collections orchestrator binary.
//!
//! Wires configuration, persistence, the LLM/tool/messaging clients, and
//! the agent runtime into an axum server listening on `API_PORT`.

use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use tracing::info;

use gestor::config::{AppConfig, LlmProvider};
use gestor::db::{connect, MirrorStore, SqliteCheckpointer};
use gestor::llm::{InferenceProvider, OpenAiProvider, GoogleProvider};
use gestor::logging;
use gestor::toolclient::ToolClient;
use gestor::webhook::{self, AppState};
use gestor::whatsapp::WhatsAppClient;

/// WhatsApp collections orchestrator.
#[derive(Parser)]
#[command(name = "gestor", version, about)]
struct Cli {
    #[command(subcommand)]
    command: Option<Command>,
}

#[derive(Subcommand)]
enum Command {
    /// Starts the HTTP server (default when no subcommand is given).
    Start {
        /// Directory for rotated JSON log files.
        #[arg(long, default_value = "logs")]
        logs_dir: PathBuf,
    },
    /// Prints the resolved configuration (secrets redacted) and exits.
    ShowConfig,
}

#[tokio::main]
async fn main() -> Result<()> {
    dotenvy::dotenv().ok();
    let cli = Cli::parse();

    match cli.command.unwrap_or(Command::Start {
        logs_dir: PathBuf::from("logs"),
    }) {
        Command::Start { logs_dir } => {
            let _guard = logging::init_production(&logs_dir).context("failed to initialize logging")?;
            run_server().await
        }
        Command::ShowConfig => {
            logging::init_cli();
            let config = AppConfig::from_env();
            println!("{config:#?}");
            Ok(())
        }
    }
}

async fn run_server() -> Result<()> {
    let config = AppConfig::from_env();
    info!(api_port = config.api_port, agent_mode = ?config.agent_mode, "gestor starting");

    let pool = connect(&config.database_url)
        .await
        .context("failed to connect to mirror store")?;
    let mirror = Arc::new(MirrorStore::new(pool.clone()));
    let checkpointer: Arc<dyn gestor::db::Checkpointer> = Arc::new(SqliteCheckpointer::new(pool));

    let tools: Arc<dyn gestor::toolclient::ToolInvoker> = Arc::new(ToolClient::new(&config.mcp_tools_url));
    let whatsapp = Arc::new(WhatsAppClient::new(
        "https://graph.facebook.com/v21.0",
        &config.whatsapp_phone_number_id,
        config.whatsapp_token.clone(),
    ));

    let llm: Arc<dyn InferenceProvider> = match config.llm_provider {
        LlmProvider::OpenAi => Arc::new(OpenAiProvider::new(
            config.openai_api_key.expose().unwrap_or_default().to_string(),
        )),
        LlmProvider::Google => Arc::new(GoogleProvider::new(
            config.google_api_key.expose().unwrap_or_default().to_string(),
        )),
    };

    let api_port = config.api_port;
    let state = AppState {
        mirror,
        checkpointer,
        tools,
        whatsapp,
        llm,
        config,
    };

    let app = webhook::router(state).layer(tower_http::trace::TraceLayer::new_for_http());

    let listener = tokio::net::TcpListener::bind(("0.0.0.0", api_port))
        .await
        .with_context(|| format!("failed to bind to port {api_port}"))?;
    info!(api_port, "listening");
    axum::serve(listener, app)
        .await
        .context("server error")?;
    Ok(())
}
