//! MCP server implementation.
//!
//! The handler is written by hand instead of with the `#[tool]` macros because the
//! catalog is dynamic: tool descriptions carry the account's pipelines.

use std::sync::Arc;
use std::time::Duration;

use kommo_agent::{ToolContext, ToolDefinition, ToolRegistry, ToolResult};
use kommo_core::config::AppConfig;
use kommo_core::{SessionGuard, TtlCache};
use kommo_crm::{HttpCrmClient, HttpSheetsClient};
use rmcp::model::{
    CallToolRequestParam, CallToolResult, Content, ErrorCode, Implementation, JsonObject,
    ListToolsResult, PaginatedRequestParam, ProtocolVersion, ServerCapabilities, ServerInfo, Tool,
};
use rmcp::service::RequestContext;
use rmcp::{ErrorData, RoleServer, ServerHandler, ServiceExt};
use serde_json::Value;
use tracing::{debug, info};

use crate::{McpError, McpResult};

/// MCP server over one CRM account.
#[derive(Clone)]
pub struct KommoMcpServer {
    registry: Arc<ToolRegistry>,
    ctx: Arc<ToolContext>,
}

impl KommoMcpServer {
    pub fn new(registry: ToolRegistry, ctx: ToolContext) -> Self {
        Self { registry: Arc::new(registry), ctx: Arc::new(ctx) }
    }

    /// Builds the server for the account in `config`. Spreadsheet tools are wired only
    /// when `[sheets]` is complete.
    pub fn from_config(config: &AppConfig) -> McpResult<Self> {
        config.validate()?;
        let base_url = config
            .crm
            .resolved_base_url()
            .ok_or(McpError::NotConfigured("crm.subdomain or crm.base_url"))?;
        let access_token =
            config.crm.access_token.clone().ok_or(McpError::NotConfigured("crm.access_token"))?;
        let timeout = Duration::from_secs(config.crm.timeout_secs);

        let crm = HttpCrmClient::new(&base_url, access_token, timeout)?;
        info!(event_name = "mcp.bootstrap.crm", api_url = crm.api_url(), "CRM client ready");

        let mut ctx = ToolContext::new(Arc::new(SessionGuard::new()), Arc::new(TtlCache::new()), Arc::new(crm))
            .with_ttls(config.cache.ttls());

        if let (Some(api_key), Some(spreadsheet_id)) = (&config.sheets.api_key, &config.sheets.spreadsheet_id) {
            let sheets =
                HttpSheetsClient::new(api_key.clone(), spreadsheet_id.clone(), config.sheets.sheet_name.clone(), timeout)?;
            ctx = ctx.with_sheets(Arc::new(sheets));
            info!(event_name = "mcp.bootstrap.sheets", "spreadsheet reporting enabled");
        }

        Ok(Self::new(ToolRegistry::with_default_tools(), ctx))
    }

    /// Current catalog, with pipeline hints when the CRM answers.
    pub async fn tools(&self) -> Vec<Tool> {
        self.registry.enriched_definitions(&self.ctx).await.into_iter().map(to_mcp_tool).collect()
    }

    /// Runs one tool. Unknown names are protocol errors; every other failure is an
    /// error result the agent can read.
    pub async fn invoke(&self, name: &str, arguments: Option<JsonObject>) -> Result<CallToolResult, ErrorData> {
        if !self.registry.contains(name) {
            return Err(ErrorData::new(ErrorCode::METHOD_NOT_FOUND, format!("Unknown tool: {name}"), None));
        }
        let args = arguments.map(Value::Object).unwrap_or(Value::Null);
        debug!(event_name = "mcp.tools.call", tool = name, "tool call received");
        Ok(to_call_result(self.registry.call(name, &args, &self.ctx).await))
    }

    /// Serves the protocol on stdin/stdout until the client disconnects.
    pub async fn run_stdio(self) -> McpResult<()> {
        use tokio::io::{stdin, stdout};

        info!(event_name = "mcp.server.started", tools = self.registry.len(), "serving MCP over stdio");
        let service = self.serve((stdin(), stdout())).await.map_err(|error| McpError::Transport(error.to_string()))?;
        let reason = service.waiting().await.map_err(|error| McpError::Transport(error.to_string()))?;
        info!(event_name = "mcp.server.stopped", reason = ?reason, "MCP server shutdown complete");
        Ok(())
    }
}

fn to_mcp_tool(definition: ToolDefinition) -> Tool {
    let schema = match definition.input_schema {
        Value::Object(schema) => schema,
        _ => JsonObject::new(),
    };
    Tool::new(definition.name, definition.description, Arc::new(schema))
}

fn to_call_result(result: ToolResult) -> CallToolResult {
    let content = vec![Content::text(result.text)];
    if result.is_error {
        CallToolResult::error(content)
    } else {
        CallToolResult::success(content)
    }
}

impl ServerHandler for KommoMcpServer {
    fn get_info(&self) -> ServerInfo {
        ServerInfo {
            protocol_version: ProtocolVersion::V_2024_11_05,
            capabilities: ServerCapabilities::builder().enable_tools().build(),
            server_info: Implementation {
                name: "kommo-mcp".to_string(),
                version: env!("CARGO_PKG_VERSION").to_string(),
                ..Default::default()
            },
            instructions: Some(
                "Kommo CRM tools for sales agents. Read leads, contacts, pipelines and funnel \
                 reports freely; open a lead with kommo_start_session before changing it."
                    .to_string(),
            ),
            ..Default::default()
        }
    }

    async fn list_tools(
        &self,
        _request: Option<PaginatedRequestParam>,
        _context: RequestContext<RoleServer>,
    ) -> Result<ListToolsResult, ErrorData> {
        Ok(ListToolsResult::with_all_items(self.tools().await))
    }

    async fn call_tool(
        &self,
        request: CallToolRequestParam,
        _context: RequestContext<RoleServer>,
    ) -> Result<CallToolResult, ErrorData> {
        self.invoke(&request.name, request.arguments).await
    }
}
