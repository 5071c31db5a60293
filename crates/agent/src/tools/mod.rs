//! Tool dispatch.
//!
//! Every tool derives its input schema from a typed params struct; the registry
//! renders it once at registration and [`ToolRegistry::dispatch`] validates the raw
//! argument bag against it before the handler runs. [`ToolRegistry::call`]
//! additionally folds every failure into a [`ToolResult`] so transports never see
//! a handler error.

pub mod activity;
pub mod contacts;
pub mod leads;
pub mod reference;
pub mod reports;
pub mod session;

use std::collections::HashMap;
use std::future::Future;
use std::sync::Arc;
use std::time::{Duration, Instant};

use async_trait::async_trait;
use kommo_core::{namespaced_key, CacheTtls, SessionGuard, TtlCache};
use kommo_crm::{CrmApi, CrmError, SheetsSource};
use schemars::JsonSchema;
use serde::de::DeserializeOwned;
use serde::Serialize;
use serde_json::{Map, Value};
use thiserror::Error;
use tracing::{info, warn};

use crate::format;
use crate::schema::{self, FieldViolation};

/// Tools whose catalog description is extended with the account's pipelines.
const PIPELINE_HINT_TOOLS: [&str; 3] = ["kommo_list_leads", "kommo_update_lead", "kommo_create_lead"];

#[derive(Debug, Error)]
pub enum ToolError {
    #[error("{0}")]
    Unauthorized(String),
    #[error("invalid parameters: {}", list_violations(.0))]
    Validation(Vec<FieldViolation>),
    #[error("unknown tool `{0}`")]
    NotFound(String),
    #[error("{0}")]
    Rejected(String),
    #[error(transparent)]
    Upstream(#[from] CrmError),
}

fn list_violations(violations: &[FieldViolation]) -> String {
    violations.iter().map(ToString::to_string).collect::<Vec<_>>().join("; ")
}

impl ToolError {
    pub fn kind(&self) -> &'static str {
        match self {
            Self::Unauthorized(_) => "unauthorized",
            Self::Validation(_) => "validation",
            Self::NotFound(_) => "not_found",
            Self::Rejected(_) => "rejected",
            Self::Upstream(_) => "upstream",
        }
    }

    /// Text shown to the agent, including the upstream suggestion when there is one.
    pub fn user_message(&self) -> String {
        match self {
            Self::Upstream(error) => error.user_message(),
            other => other.to_string(),
        }
    }
}

#[derive(Clone, Debug, PartialEq)]
pub struct ToolOutput {
    pub message: String,
    pub data: Value,
}

impl ToolOutput {
    pub fn new(message: impl Into<String>, data: impl Serialize) -> Result<Self, ToolError> {
        let data = serde_json::to_value(data)
            .map_err(|error| ToolError::Rejected(format!("could not encode result: {error}")))?;
        Ok(Self { message: message.into(), data })
    }
}

/// Transport-neutral outcome of a tool call.
#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct ToolResult {
    pub text: String,
    pub is_error: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub data: Option<Value>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error_kind: Option<&'static str>,
}

impl ToolResult {
    pub fn from_outcome(outcome: Result<ToolOutput, ToolError>) -> Self {
        match outcome {
            Ok(output) => Self {
                text: format::success_text(&output.message, &output.data),
                is_error: false,
                data: Some(output.data),
                error_kind: None,
            },
            Err(error) => Self {
                text: format::error_text(&error),
                is_error: true,
                data: None,
                error_kind: Some(error.kind()),
            },
        }
    }
}

#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct ToolDefinition {
    pub name: String,
    pub description: String,
    #[serde(rename = "inputSchema")]
    pub input_schema: Value,
}

/// Everything a handler may touch for one call.
#[derive(Clone)]
pub struct ToolContext {
    pub session: Arc<SessionGuard>,
    pub cache: Arc<TtlCache>,
    pub crm: Arc<dyn CrmApi>,
    pub sheets: Option<Arc<dyn SheetsSource>>,
    pub ttls: CacheTtls,
    pub cache_namespace: Option<String>,
}

impl ToolContext {
    pub fn new(session: Arc<SessionGuard>, cache: Arc<TtlCache>, crm: Arc<dyn CrmApi>) -> Self {
        Self { session, cache, crm, sheets: None, ttls: CacheTtls::default(), cache_namespace: None }
    }

    pub fn with_sheets(mut self, sheets: Arc<dyn SheetsSource>) -> Self {
        self.sheets = Some(sheets);
        self
    }

    pub fn with_ttls(mut self, ttls: CacheTtls) -> Self {
        self.ttls = ttls;
        self
    }

    pub fn with_cache_namespace(mut self, namespace: impl Into<String>) -> Self {
        self.cache_namespace = Some(namespace.into());
        self
    }

    pub fn cache_key(&self, key: &str) -> String {
        namespaced_key(self.cache_namespace.as_deref(), key)
    }

    pub fn sheets(&self) -> Result<&dyn SheetsSource, ToolError> {
        self.sheets.as_deref().ok_or_else(|| {
            ToolError::Rejected(
                "spreadsheet reporting is not configured; set sheets.api_key and sheets.spreadsheet_id"
                    .to_string(),
            )
        })
    }

    /// Memoizes an upstream read under the namespaced `key`. Failures are not cached.
    pub async fn cached<T, F, Fut>(&self, key: &str, ttl: Duration, compute: F) -> Result<Arc<T>, ToolError>
    where
        T: Send + Sync + 'static,
        F: FnOnce() -> Fut,
        Fut: Future<Output = Result<T, CrmError>>,
    {
        let key = self.cache_key(key);
        Ok(self.cache.get_or_set(&key, ttl, compute).await?)
    }
}

#[async_trait]
pub trait Tool: Send + Sync {
    fn name(&self) -> &'static str;
    fn description(&self) -> &'static str;

    /// JSON Schema of the arguments, normally `schema::input_schema::<Params>()`.
    fn input_schema(&self) -> Value;

    /// Mutating tools write upstream and must pass the session guard first.
    fn mutates(&self) -> bool {
        false
    }

    async fn execute(&self, params: Map<String, Value>, ctx: &ToolContext) -> Result<ToolOutput, ToolError>;
}

/// Input of the tools that take no arguments.
#[derive(Debug, JsonSchema)]
pub struct NoParams {}

/// Decodes validated parameters into a handler's typed input.
pub fn parse_params<T: DeserializeOwned>(params: Map<String, Value>) -> Result<T, ToolError> {
    serde_json::from_value(Value::Object(params)).map_err(|error| {
        ToolError::Validation(vec![FieldViolation::new("arguments", error.to_string())])
    })
}

struct Registered {
    tool: Box<dyn Tool>,
    input_schema: Value,
}

#[derive(Default)]
pub struct ToolRegistry {
    tools: HashMap<String, Registered>,
    order: Vec<String>,
}

impl ToolRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Registry holding the full catalog.
    pub fn with_default_tools() -> Self {
        let mut registry = Self::new();
        session::register(&mut registry);
        leads::register(&mut registry);
        activity::register(&mut registry);
        reference::register(&mut registry);
        contacts::register(&mut registry);
        reports::register(&mut registry);
        registry
    }

    pub fn register<T>(&mut self, tool: T)
    where
        T: Tool + 'static,
    {
        let name = tool.name().to_string();
        let input_schema = tool.input_schema();
        if self.tools.insert(name.clone(), Registered { tool: Box::new(tool), input_schema }).is_none() {
            self.order.push(name);
        }
    }

    pub fn len(&self) -> usize {
        self.tools.len()
    }

    pub fn is_empty(&self) -> bool {
        self.tools.is_empty()
    }

    pub fn contains(&self, name: &str) -> bool {
        self.tools.contains_key(name)
    }

    /// True when the named tool writes to the CRM. Unknown names are read-only.
    pub fn mutates(&self, name: &str) -> bool {
        self.tools.get(name).is_some_and(|entry| entry.tool.mutates())
    }

    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.order.iter().map(String::as_str)
    }

    pub fn definitions(&self) -> Vec<ToolDefinition> {
        self.order
            .iter()
            .filter_map(|name| self.tools.get(name))
            .map(|entry| ToolDefinition {
                name: entry.tool.name().to_string(),
                description: entry.tool.description().to_string(),
                input_schema: entry.input_schema.clone(),
            })
            .collect()
    }

    /// Catalog with the account's pipelines and stages appended to the lead tools.
    ///
    /// A failed pipeline lookup leaves the descriptions unchanged.
    pub async fn enriched_definitions(&self, ctx: &ToolContext) -> Vec<ToolDefinition> {
        let mut definitions = self.definitions();
        let hint = match reference::pipeline_hint(ctx).await {
            Ok(hint) => hint,
            Err(error) => {
                warn!(
                    event_name = "tools.catalog.pipeline_hint_failed",
                    error = %error,
                    "pipeline lookup for tool descriptions failed"
                );
                return definitions;
            }
        };
        if hint.is_empty() {
            return definitions;
        }
        for definition in &mut definitions {
            if PIPELINE_HINT_TOOLS.contains(&definition.name.as_str()) {
                definition.description.push_str(&hint);
            }
        }
        definitions
    }

    pub async fn dispatch(&self, name: &str, args: &Value, ctx: &ToolContext) -> Result<ToolOutput, ToolError> {
        let entry = self.tools.get(name).ok_or_else(|| ToolError::NotFound(name.to_string()))?;
        let params = schema::validate(&entry.input_schema, args).map_err(ToolError::Validation)?;
        entry.tool.execute(params, ctx).await
    }

    /// Runs a tool and folds any failure, including an unknown name, into the result.
    pub async fn call(&self, name: &str, args: &Value, ctx: &ToolContext) -> ToolResult {
        let started = Instant::now();
        let outcome = self.dispatch(name, args, ctx).await;
        let elapsed_ms = started.elapsed().as_millis() as u64;
        match &outcome {
            Ok(_) => info!(event_name = "tools.call", tool = name, elapsed_ms, "tool call succeeded"),
            Err(error) => warn!(
                event_name = "tools.call.failed",
                tool = name,
                elapsed_ms,
                kind = error.kind(),
                error = %error,
                "tool call failed"
            ),
        }
        ToolResult::from_outcome(outcome)
    }
}


#[cfg(test)]
mod tests {
    use kommo_crm::HttpMethod;
    use serde_json::json;

    use super::test_support::harness;
    use super::{ToolError, ToolRegistry};

    #[test]
    fn default_catalog_registers_every_tool_once() {
        let registry = ToolRegistry::with_default_tools();
        assert_eq!(registry.len(), 19);
        assert_eq!(registry.names().next(), Some("kommo_start_session"));

        let definitions = registry.definitions();
        assert_eq!(definitions.len(), 19);
        assert!(definitions.iter().all(|definition| definition.input_schema["type"] == "object"));
    }

    #[test]
    fn catalog_schemas_come_from_the_param_structs() {
        let registry = ToolRegistry::with_default_tools();
        let definitions = registry.definitions();
        let schema = |name: &str| {
            definitions
                .iter()
                .find(|definition| definition.name == name)
                .map(|definition| definition.input_schema.clone())
                .unwrap_or_default()
        };

        assert_eq!(schema("kommo_get_lead_by_id")["required"], json!(["lead_id"]));
        assert_eq!(schema("kommo_list_leads")["properties"]["limit"]["maximum"], json!(250));
        assert_eq!(schema("kommo_add_tasks")["properties"]["task_type_id"]["maximum"], json!(3));
        assert!(schema("kommo_add_notes")["properties"]["note_type"]["enum"]
            .as_array()
            .is_some_and(|options| options.contains(&json!("sms_out"))));
        assert_eq!(schema("kommo_list_users")["properties"], json!({}));
    }

    #[test]
    fn only_lead_writes_are_marked_mutating() {
        let registry = ToolRegistry::with_default_tools();
        let mut writers: Vec<&str> = registry.names().filter(|name| registry.mutates(name)).collect();
        writers.sort_unstable();

        assert_eq!(writers, ["kommo_add_notes", "kommo_add_tasks", "kommo_create_lead", "kommo_update_lead"]);
        assert!(!registry.mutates("kommo_nope"));
    }

    #[tokio::test]
    async fn unknown_tool_is_not_found_not_validation() {
        let h = harness();
        let registry = ToolRegistry::with_default_tools();

        let error = registry.dispatch("kommo_delete_everything", &json!({}), &h.ctx).await.err();
        assert!(matches!(error, Some(ToolError::NotFound(name)) if name == "kommo_delete_everything"));

        let result = registry.call("kommo_delete_everything", &json!({}), &h.ctx).await;
        assert!(result.is_error);
        assert_eq!(result.error_kind, Some("not_found"));
        assert!(h.crm.calls().is_empty());
    }

    #[tokio::test]
    async fn validation_failure_names_field_and_constraint_before_any_upstream_call() {
        let h = harness();
        let registry = ToolRegistry::with_default_tools();

        let result = registry.call("kommo_list_leads", &json!({ "limit": 500 }), &h.ctx).await;
        assert!(result.is_error);
        assert_eq!(result.error_kind, Some("validation"));
        assert!(result.text.starts_with("Error:"));
        assert!(result.text.contains("limit: must be <= 250"));
        assert!(h.crm.calls().is_empty());
    }

    #[tokio::test]
    async fn upstream_failures_become_error_results_with_suggestion() {
        let h = harness();
        h.crm.fail(HttpMethod::Get, "/users", 401);
        let registry = ToolRegistry::with_default_tools();

        let result = registry.call("kommo_list_users", &json!(null), &h.ctx).await;
        assert!(result.is_error);
        assert_eq!(result.error_kind, Some("upstream"));
        assert!(result.text.contains("Unauthorized (401)"));
        assert!(result.text.contains("Suggestion:"));
    }

    #[tokio::test]
    async fn enriched_catalog_appends_pipelines_to_lead_tools_only() {
        let h = harness();
        h.crm.respond(
            HttpMethod::Get,
            "/leads/pipelines",
            json!({ "_embedded": { "pipelines": [{
                "id": 7, "name": "Sales", "is_main": true,
                "_embedded": { "statuses": [{ "id": 70, "name": "New" }] }
            }] } }),
        );
        let registry = ToolRegistry::with_default_tools();

        let definitions = registry.enriched_definitions(&h.ctx).await;
        let description = |name: &str| {
            definitions
                .iter()
                .find(|definition| definition.name == name)
                .map(|definition| definition.description.clone())
                .unwrap_or_default()
        };

        assert!(description("kommo_update_lead").contains("Sales (pipeline_id: 7) [main]"));
        assert!(description("kommo_create_lead").contains("New (status_id: 70)"));
        assert!(!description("kommo_add_notes").contains("pipeline_id: 7"));
    }

    #[tokio::test]
    async fn enriched_catalog_falls_back_when_pipelines_fail() {
        let h = harness();
        h.crm.fail(HttpMethod::Get, "/leads/pipelines", 503);
        let registry = ToolRegistry::with_default_tools();

        assert_eq!(registry.enriched_definitions(&h.ctx).await, registry.definitions());
    }
}
