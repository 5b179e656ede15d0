//! tidecache server entry point.
//!
//! Boots the cache engine and serves it as MCP tools on stdio transport.
//! Logging goes to stderr to avoid interfering with the JSON-RPC protocol on stdout.

use std::sync::Arc;

use anyhow::Result;
use rmcp::service::serve_server;
use rmcp::transport::io::stdio;
use tidecache_core::{AppConfig, CacheEngine, ResourcePolicy};
use tracing_subscriber::EnvFilter;

mod handler;
mod scheduler;
mod tools;

/// Upsert configured policies as enabled resources.
async fn seed_resources(engine: &CacheEngine, resources: &[ResourcePolicy]) -> Result<()> {
    for policy in resources {
        engine.db().upsert_resource(policy, true).await?;
    }
    engine.resolver().clear();
    if !resources.is_empty() {
        tracing::info!(count = resources.len(), "seeded resource policies");
    }
    Ok(())
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .with_writer(std::io::stderr)
        .json()
        .init();

    let config = AppConfig::load()?;
    tracing::info!(
        db_path = %config.db_path.display(),
        cache_dir = %config.cache_dir.display(),
        "Starting tidecache server on stdio transport"
    );

    let engine = Arc::new(CacheEngine::open(&config.db_path, config.engine_options()).await?);
    seed_resources(&engine, &config.resources).await?;
    let _cleanup = scheduler::spawn_cleanup(Arc::clone(&engine), config.cleanup_interval());

    let handler = handler::TidecacheServer::new(engine);
    let transport = stdio();
    let server = serve_server(handler, transport).await?;

    server.waiting().await?;

    Ok(())
}
