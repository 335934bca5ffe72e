//! binsync worker entry point.
//!
//! Boots the offline worker and serves its control channel as MCP tools on
//! stdio. Logging goes to stderr to avoid interfering with the JSON-RPC
//! protocol on stdout.

use anyhow::Result;
use binsync_core::AppConfig;
use rmcp::service::serve_server;
use rmcp::transport::io::stdio;
use tracing_subscriber::EnvFilter;

mod handler;
mod tools;
mod worker;

use worker::{Services, Worker};

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .with_writer(std::io::stderr)
        .json()
        .init();

    let config = AppConfig::load()?;
    tracing::info!(
        version = %config.version_tag,
        db = %config.db_path.display(),
        "Starting binsync worker on stdio transport"
    );

    let services = Services::from_config(&config).await?;
    let worker = Worker::start(config, services, true).await?;
    let background = worker.spawn_background()?;

    let handler = handler::WorkerServer::new(worker.clone());
    let transport = stdio();
    let server = serve_server(handler, transport).await?;

    server.waiting().await?;

    for task in background {
        task.abort();
    }
    worker.shutdown().await;

    Ok(())
}
