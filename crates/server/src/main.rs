use anyhow::{Context, Result};
use clap::Parser;
use infra_mcp::McpServer;
use std::path::PathBuf;
use std::sync::Arc;

mod api;
mod config;
mod shutdown;

use config::{ServerConfig, TransportMode};

const DEFAULT_LOG_FILTER: &str = "infra_mcp=info,infra_mcp_server=info,tower_http=info";

#[derive(Parser, Debug)]
#[command(name = "infra-mcp")]
#[command(about = "MCP server exposing infrastructure tools over stdio or HTTP", long_about = None)]
struct Args {
    /// Transport to serve on: stdio or http (MCP_TRANSPORT overrides)
    #[arg(long, default_value = "stdio")]
    transport: String,

    /// Listen address for the http transport (MCP_ADDR overrides)
    #[arg(long, default_value = ":8080")]
    addr: String,

    /// Path to configuration file
    #[arg(short, long, default_value = "infra-mcp.toml")]
    config: PathBuf,

    /// Emit logs as JSON
    #[arg(long)]
    json_logs: bool,
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();

    // Logs go to stderr; stdout belongs to the stdio transport
    let filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| DEFAULT_LOG_FILTER.into());
    if args.json_logs {
        tracing_subscriber::fmt()
            .json()
            .with_env_filter(filter)
            .with_writer(std::io::stderr)
            .init();
    } else {
        tracing_subscriber::fmt()
            .with_env_filter(filter)
            .with_writer(std::io::stderr)
            .with_target(false)
            .init();
    }

    let config = ServerConfig::resolve(&args.transport, &args.addr, &args.config, |key| {
        std::env::var(key).ok()
    })
    .inspect_err(|e| tracing::error!("Invalid configuration: {}", e))?;

    tracing::info!(
        "Starting infra-mcp {} ({} transport)",
        env!("CARGO_PKG_VERSION"),
        config.transport
    );

    let handler = Arc::new(
        infra_mcp::builtin_handler(config.handler_deadline())
            .context("Failed to register built-in tools and resources")?,
    );

    match config.transport {
        TransportMode::Stdio => {
            let server = McpServer::new(handler);
            tokio::select! {
                result = server.start() => result?,
                _ = shutdown::signal() => {}
            }
        }
        TransportMode::Http => api::serve(&config, handler).await?,
    }

    Ok(())
}
