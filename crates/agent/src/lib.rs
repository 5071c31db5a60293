//! Tool layer of the Kommo agent.
//!
//! This crate holds everything a transport needs to expose the CRM to an agent:
//! - `schema` renders each tool's derived parameter schema and validates against it
//! - `guardrails` confines writes to the lead opened with `kommo_start_session`
//! - `tools` implements the catalog and dispatches calls
//! - `format` renders outcomes as the text returned to the agent
//!
//! # Architecture
//!
//! Transports (the stdio MCP server and the HTTP server) build one
//! [`tools::ToolContext`] per tenant and route every call through
//! [`tools::ToolRegistry::call`]:
//! 1. **Lookup** - unknown names fail as `not_found`
//! 2. **Validation** - arguments are checked against the tool's derived JSON Schema
//! 3. **Guardrail** - mutating tools verify the active session
//! 4. **Execution** - the handler talks to the CRM or the spreadsheet
//!
//! No failure escapes `call`; it always yields a [`tools::ToolResult`].

pub mod format;
pub mod guardrails;
pub mod schema;
pub mod tools;

pub use guardrails::{GuardrailDecision, MutationIntent};
pub use schema::{input_schema, FieldViolation};
pub use tools::{Tool, ToolContext, ToolDefinition, ToolError, ToolOutput, ToolRegistry, ToolResult};
