//! Tool server: a process-global registry of named, schema-described
//! tools, exposed over both a REST surface and a JSON-RPC (`/mcp`)
//! surface, consumed by the orchestrator's specialists and code-planner.

pub mod config;
pub mod erp_client;
pub mod errors;
pub mod registry;
pub mod rest;
pub mod rpc;
pub mod tools;

/// Shared state threaded through both transports.
#[derive(Clone, Copy)]
pub struct AppState {
    /// Process-wide mock flag, read by `call_tool`.
    pub mock_mode: bool,
}

/// Builds the combined REST + JSON-RPC router.
#[must_use]
pub fn router(state: AppState) -> axum::Router {
    axum::Router::new().merge(rest::router()).merge(rpc::router()).with_state(state)
}
