// Standalone MCP server binary

use anyhow::Result;
use cacd_mcp::tools::default_registry;
use cacd_mcp::{McpContext, McpServer};
use std::path::PathBuf;
use std::sync::Arc;

#[tokio::main]
async fn main() -> Result<()> {
    // stdout carries the protocol, so logs go to stderr
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "cacd_mcp=info,cacd_core=info".into()),
        )
        .with_writer(std::io::stderr)
        .with_target(false)
        .init();

    tracing::info!("CACD MCP server starting");

    let data_dir = std::env::var("CACD_DATA_DIR").unwrap_or_else(|_| "./data".to_string());
    let data_path = PathBuf::from(data_dir);
    tracing::info!("Data directory: {}", data_path.display());

    let ctx = Arc::new(McpContext::open(&data_path)?);
    let registry = default_registry(ctx);
    tracing::info!("Registered {} tools", registry.len());

    let server = McpServer::new(registry);
    server.start().await?;

    Ok(())
}
