use async_trait::async_trait;
use chrono::Utc;
use kommo_core::domain::Lead;
use kommo_crm::{fetch_list, Query};
use schemars::JsonSchema;
use serde::Deserialize;
use serde_json::{json, Map, Value};
use tracing::info;

use super::{parse_params, NoParams, Tool, ToolContext, ToolError, ToolOutput, ToolRegistry};
use crate::schema::{input_schema, FieldViolation};

pub fn register(registry: &mut ToolRegistry) {
    registry.register(StartSession);
    registry.register(EndSession);
    registry.register(GetSession);
}

pub struct StartSession;

#[derive(Debug, Deserialize, JsonSchema)]
struct StartParams {
    #[schemars(description = "Id of the lead to open (see kommo_list_leads)", range(min = 1))]
    lead_id: Option<i64>,
    #[schemars(description = "Lead name to search for when the id is unknown", length(min = 1))]
    query: Option<String>,
}

#[async_trait]
impl Tool for StartSession {
    fn name(&self) -> &'static str {
        "kommo_start_session"
    }

    fn description(&self) -> &'static str {
        "Opens a session with one lead. Must be called before any change to a lead: while \
         the session is open only that lead can be updated, annotated or given tasks. \
         Identify the lead by lead_id, or by query (its name; the first match is used). \
         Starting a new session replaces the current one."
    }

    fn input_schema(&self) -> Value {
        input_schema::<StartParams>()
    }

    async fn execute(&self, params: Map<String, Value>, ctx: &ToolContext) -> Result<ToolOutput, ToolError> {
        let params: StartParams = parse_params(params)?;

        let lead = match (params.lead_id, params.query.as_deref()) {
            (Some(lead_id), _) => {
                let query = Query::new().param("filter[id]", lead_id);
                let leads: Vec<Lead> = fetch_list(ctx.crm.as_ref(), "/leads", &query, "leads").await?;
                leads.into_iter().next().ok_or_else(|| {
                    ToolError::Rejected(format!(
                        "Lead with ID {lead_id} not found. Use kommo_list_leads to see valid IDs."
                    ))
                })?
            }
            (None, Some(search)) => {
                let query = Query::new().param("query", search).param("limit", 1);
                let leads: Vec<Lead> = fetch_list(ctx.crm.as_ref(), "/leads", &query, "leads").await?;
                leads.into_iter().next().ok_or_else(|| {
                    ToolError::Rejected(format!(
                        "No lead found matching \"{search}\". Use kommo_list_leads to browse leads."
                    ))
                })?
            }
            (None, None) => {
                return Err(ToolError::Validation(vec![FieldViolation::new(
                    "lead_id|query",
                    "one of lead_id, query is required",
                )]))
            }
        };

        ctx.session.start(lead.id, lead.name.clone(), None);
        info!(event_name = "session.started", lead_id = lead.id, "session started");

        let snapshot = ctx.session.get();
        ToolOutput::new(
            format!("Session started with \"{}\"", lead.name),
            json!({
                "lead_id": lead.id,
                "lead_name": lead.name,
                "session_started_at": snapshot.started_at,
                "message": "Session open. Only this lead can be modified until the session ends.",
            }),
        )
    }
}

pub struct EndSession;

#[async_trait]
impl Tool for EndSession {
    fn name(&self) -> &'static str {
        "kommo_end_session"
    }

    fn description(&self) -> &'static str {
        "Ends the current lead session. Call it when the work on the lead is done or \
         before switching to another lead."
    }

    fn input_schema(&self) -> Value {
        input_schema::<NoParams>()
    }

    async fn execute(&self, _params: Map<String, Value>, ctx: &ToolContext) -> Result<ToolOutput, ToolError> {
        let snapshot = ctx.session.get();
        let Some(lead_id) = snapshot.subject_id else {
            return Err(ToolError::Rejected("No active session to end.".to_string()));
        };

        let ended_at = Utc::now();
        let duration_minutes = snapshot.elapsed_minutes(ended_at);
        ctx.session.end();
        info!(event_name = "session.ended", lead_id, duration_minutes, "session ended");

        let lead_name = snapshot.subject_label.unwrap_or_default();
        ToolOutput::new(
            format!("Session with \"{lead_name}\" ended"),
            json!({
                "lead_id": lead_id,
                "lead_name": lead_name,
                "duration_minutes": duration_minutes,
                "ended_at": ended_at,
            }),
        )
    }
}

pub struct GetSession;

#[async_trait]
impl Tool for GetSession {
    fn name(&self) -> &'static str {
        "kommo_get_session"
    }

    fn description(&self) -> &'static str {
        "Shows which lead, if any, has an open session."
    }

    fn input_schema(&self) -> Value {
        input_schema::<NoParams>()
    }

    async fn execute(&self, _params: Map<String, Value>, ctx: &ToolContext) -> Result<ToolOutput, ToolError> {
        let snapshot = ctx.session.get();
        match snapshot.subject_id {
            None => ToolOutput::new(
                "No active session",
                json!({ "active": false, "message": "Use kommo_start_session to open a lead." }),
            ),
            Some(lead_id) => {
                let lead_name = snapshot.subject_label.unwrap_or_default();
                ToolOutput::new(
                    format!("Active session: {lead_name}"),
                    json!({
                        "active": true,
                        "lead_id": lead_id,
                        "lead_name": lead_name,
                        "started_at": snapshot.started_at,
                    }),
                )
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use kommo_crm::HttpMethod;
    use serde_json::json;

    use crate::tools::test_support::harness;
    use crate::tools::ToolRegistry;

    #[tokio::test]
    async fn start_by_id_verifies_the_lead_and_opens_the_guard() {
        let h = harness();
        h.crm.respond_when(
            HttpMethod::Get,
            "/leads",
            ("filter[id]", "42"),
            json!({ "_embedded": { "leads": [{ "id": 42, "name": "Acme renewal" }] } }),
        );
        let registry = ToolRegistry::with_default_tools();

        let result = registry.call("kommo_start_session", &json!({ "lead_id": 42 }), &h.ctx).await;

        assert!(!result.is_error, "{}", result.text);
        assert!(result.text.starts_with("Session started with \"Acme renewal\""));
        assert!(h.session.is_authorized(42));
        assert_eq!(h.session.active_subject_label().as_deref(), Some("Acme renewal"));
    }

    #[tokio::test]
    async fn start_with_unknown_id_leaves_guard_untouched() {
        let h = harness();
        h.crm.respond(HttpMethod::Get, "/leads", json!({}));
        let registry = ToolRegistry::with_default_tools();

        let result = registry.call("kommo_start_session", &json!({ "lead_id": 9 }), &h.ctx).await;

        assert!(result.is_error);
        assert!(result.text.contains("Lead with ID 9 not found"));
        assert!(!h.session.has_active());
    }

    #[tokio::test]
    async fn start_by_query_takes_first_match() {
        let h = harness();
        h.crm.respond_when(
            HttpMethod::Get,
            "/leads",
            ("query", "Globex"),
            json!({ "_embedded": { "leads": [{ "id": 8, "name": "Globex expansion" }] } }),
        );
        let registry = ToolRegistry::with_default_tools();

        let result = registry.call("kommo_start_session", &json!({ "query": "Globex" }), &h.ctx).await;

        assert!(!result.is_error, "{}", result.text);
        assert_eq!(h.session.active_subject_id(), Some(8));
        assert_eq!(h.crm.calls()[0].query_value("limit"), Some("1"));
    }

    #[tokio::test]
    async fn start_needs_an_identifier() {
        let h = harness();
        let registry = ToolRegistry::with_default_tools();

        let result = registry.call("kommo_start_session", &json!({}), &h.ctx).await;
        assert_eq!(result.error_kind, Some("validation"));
        assert!(result.text.contains("lead_id|query: one of lead_id, query is required"));
        assert!(h.crm.calls().is_empty());
    }

    #[tokio::test]
    async fn end_reports_duration_and_clears_the_guard() {
        let h = harness();
        h.session.start(42, "Acme renewal", None);
        let registry = ToolRegistry::with_default_tools();

        let result = registry.call("kommo_end_session", &json!({}), &h.ctx).await;

        assert!(!result.is_error);
        let data = result.data.unwrap_or_default();
        assert_eq!(data["lead_name"], "Acme renewal");
        assert_eq!(data["duration_minutes"], 0);
        assert!(!h.session.has_active());
    }

    #[tokio::test]
    async fn end_without_session_is_an_error() {
        let h = harness();
        let registry = ToolRegistry::with_default_tools();

        let result = registry.call("kommo_end_session", &json!({}), &h.ctx).await;
        assert!(result.is_error);
        assert!(result.text.contains("No active session to end"));
    }

    #[tokio::test]
    async fn get_session_reports_inactive_and_active_states() {
        let h = harness();
        let registry = ToolRegistry::with_default_tools();

        let idle = registry.call("kommo_get_session", &json!({}), &h.ctx).await;
        assert_eq!(idle.data.unwrap_or_default()["active"], false);

        h.session.start(5, "Initech", None);
        let active = registry.call("kommo_get_session", &json!({}), &h.ctx).await;
        let data = active.data.unwrap_or_default();
        assert_eq!(data["active"], true);
        assert_eq!(data["lead_id"], 5);
        assert_eq!(data["lead_name"], "Initech");
    }
}
