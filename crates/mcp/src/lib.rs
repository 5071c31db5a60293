//! Kommo MCP (Model Context Protocol) server
//!
//! Exposes the Kommo tool catalog to an agent over stdio. Every request is
//! delegated to [`kommo_agent::ToolRegistry`]; this crate only adapts the
//! registry to the protocol.
//!
//! ## Example Usage
//!
//! ```no_run
//! use kommo_core::config::{AppConfig, LoadOptions};
//! use kommo_mcp::KommoMcpServer;
//!
//! #[tokio::main]
//! async fn main() -> anyhow::Result<()> {
//!     let config = AppConfig::load(LoadOptions::default())?;
//!     KommoMcpServer::from_config(&config)?.run_stdio().await?;
//!     Ok(())
//! }
//! ```

mod server;

pub use server::KommoMcpServer;

use kommo_core::ConfigError;
use kommo_crm::CrmError;
use thiserror::Error;

/// Errors raised while building or running the MCP server.
#[derive(Error, Debug)]
pub enum McpError {
    #[error(transparent)]
    Config(#[from] ConfigError),

    #[error("CRM access is not configured: set {0}")]
    NotConfigured(&'static str),

    #[error("client setup failed: {0}")]
    Client(#[from] CrmError),

    #[error("transport error: {0}")]
    Transport(String),
}

pub type McpResult<T> = Result<T, McpError>;
