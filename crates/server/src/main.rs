//! mcp-shelf server entry point.
//!
//! Boots the cache agent over the configured SQLite file, then serves the
//! offline cache tools on stdio. Logging goes to stderr so stdout stays
//! reserved for JSON-RPC.

use std::sync::Arc;

use anyhow::Result;
use rmcp::service::serve_server;
use rmcp::transport::io::stdio;
use shelf_core::{AgentSettings, AppConfig, CacheClient, CacheDb, ConsentPolicy, SystemClock, spawn_agent};
use tracing_subscriber::EnvFilter;

mod error;
mod handler;
mod tools;

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .with_writer(std::io::stderr)
        .json()
        .init();

    let config = AppConfig::load()?;
    tracing::info!(db_path = %config.db_path.display(), "Starting mcp-shelf server on stdio transport");

    let db = CacheDb::open(&config.db_path).await?;
    let (agent, _agent_task) = spawn_agent(
        db,
        ConsentPolicy::from_config(&config),
        Arc::new(SystemClock),
        AgentSettings::from(&config),
    );
    if !agent.wait_ready().await {
        anyhow::bail!("cache agent stopped during startup");
    }

    let client = CacheClient::connect(&agent);
    let handler = handler::ShelfServer::new(Arc::new(client));
    let server = serve_server(handler, stdio()).await?;

    let reason = server.waiting().await?;
    tracing::info!(?reason, "mcp-shelf server stopped");

    Ok(())
}
