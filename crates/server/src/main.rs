//! kindly-mcp server entry point.
//!
//! This is the main binary that boots the MCP server on stdio transport.
//! Logging goes to stderr to avoid interfering with the JSON-RPC protocol on stdout.

use std::sync::Arc;

use anyhow::{Context, Result};
use kindly_client::CacheManager;
use kindly_core::AppConfig;
use rmcp::service::serve_server;
use rmcp::transport::io::stdio;
use tracing_subscriber::EnvFilter;

mod handler;
mod tools;

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .with_writer(std::io::stderr)
        .json()
        .init();

    let config = AppConfig::load().context("failed to load configuration")?;
    let manager = Arc::new(
        CacheManager::from_config(&config)
            .await
            .context("failed to initialize cache")?,
    );

    tracing::info!(backend = ?config.cache.backend, "Starting kindly-mcp server on stdio transport");

    let handler = handler::KindlyServer::new(Arc::clone(&manager));
    let transport = stdio();
    let server = serve_server(handler, transport).await?;

    let quit = server.waiting().await;

    if let Err(e) = manager.shutdown().await {
        tracing::warn!(error = %e, "cache shutdown failed");
    }

    quit?;
    Ok(())
}
