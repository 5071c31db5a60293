//! Kommo MCP server binary
//!
//! ## Usage
//!
//! ```bash
//! # Read kommo.toml (or config/kommo.toml) from the working directory
//! kommo-mcp
//!
//! # Configure from the environment only
//! KOMMO_CRM_SUBDOMAIN=acme KOMMO_CRM_ACCESS_TOKEN=... kommo-mcp
//! ```
//!
//! stdout carries the protocol, so logs go to stderr.

use anyhow::Result;
use kommo_core::config::{AppConfig, LoadOptions, LogFormat};
use kommo_mcp::KommoMcpServer;
use tracing::info;

fn init_logging(config: &AppConfig) {
    use tracing::Level;

    let log_level = config.logging.level.parse::<Level>().unwrap_or(Level::INFO);
    let builder = tracing_subscriber::fmt()
        .with_writer(std::io::stderr)
        .with_ansi(false)
        .with_target(false)
        .with_max_level(log_level);

    match config.logging.format {
        LogFormat::Compact => builder.compact().init(),
        LogFormat::Pretty => builder.pretty().init(),
        LogFormat::Json => builder.json().init(),
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    let config = AppConfig::load(LoadOptions::default())?;
    init_logging(&config);

    info!(event_name = "mcp.bootstrap.start", "starting Kommo MCP server");
    let server = KommoMcpServer::from_config(&config)?;
    server.run_stdio().await?;

    Ok(())
}
