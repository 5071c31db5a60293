use async_trait::async_trait;
use chrono::Utc;
use kommo_core::domain::{NewNote, NewTask, NoteType, TaskType};
use kommo_crm::decode_embedded;
use schemars::{json_schema, JsonSchema, Schema, SchemaGenerator};
use serde::Deserialize;
use serde_json::{Map, Value};
use tracing::info;

use super::{parse_params, Tool, ToolContext, ToolError, ToolOutput, ToolRegistry};
use crate::guardrails::authorize_lead;
use crate::schema::input_schema;

pub fn register(registry: &mut ToolRegistry) {
    registry.register(AddNotes);
    registry.register(AddTasks);
}

fn note_type_schema(_: &mut SchemaGenerator) -> Schema {
    let options: Vec<&str> = NoteType::ALL.iter().map(|kind| kind.as_str()).collect();
    json_schema!({ "type": "string", "enum": options })
}

fn default_task_type() -> i64 {
    1
}

fn encode<T: serde::Serialize>(value: &T) -> Result<Value, ToolError> {
    serde_json::to_value(value).map_err(|error| ToolError::Rejected(format!("could not encode request: {error}")))
}

pub struct AddNotes;

#[derive(Debug, Deserialize, JsonSchema)]
struct NoteParams {
    #[schemars(description = "Lead id; must be the session lead. Defaults to it", range(min = 1))]
    lead_id: Option<i64>,
    #[schemars(description = "Note text", length(min = 1))]
    text: String,
    #[serde(default)]
    #[schemars(description = "Note type; common for plain text", schema_with = "note_type_schema")]
    note_type: NoteType,
}

#[async_trait]
impl Tool for AddNotes {
    fn name(&self) -> &'static str {
        "kommo_add_notes"
    }

    fn description(&self) -> &'static str {
        "Adds a note to the lead in the active session. Notes stay in the lead history and \
         are visible to the whole team: record facts, agreements and context, not opinions. \
         Requires kommo_start_session first."
    }

    fn input_schema(&self) -> Value {
        input_schema::<NoteParams>()
    }

    fn mutates(&self) -> bool {
        true
    }

    async fn execute(&self, params: Map<String, Value>, ctx: &ToolContext) -> Result<ToolOutput, ToolError> {
        let params: NoteParams = parse_params(params)?;
        let lead_id = authorize_lead(&ctx.session, self.name(), params.lead_id)?;

        info!(event_name = "lead.note.add", lead_id, note_type = params.note_type.as_str(), "adding note");
        let body = encode(&[NewNote::new(lead_id, params.note_type, params.text)])?;
        let response = ctx.crm.post("/leads/notes", &body).await?;
        let notes: Vec<Value> = decode_embedded(&response, "notes")?;

        let label = ctx.session.active_subject_label().unwrap_or_else(|| lead_id.to_string());
        ToolOutput::new(format!("Note added to lead \"{label}\""), notes)
    }
}

pub struct AddTasks;

#[derive(Debug, Deserialize, JsonSchema)]
struct TaskParams {
    #[schemars(description = "Lead id; must be the session lead. Defaults to it", range(min = 1))]
    lead_id: Option<i64>,
    #[schemars(description = "Task description", length(min = 1))]
    text: String,
    #[schemars(description = "Deadline as unix timestamp in seconds", range(min = 1))]
    complete_till: i64,
    #[serde(default = "default_task_type")]
    #[schemars(description = "1 call, 2 meeting, 3 email", range(min = 1, max = 3))]
    task_type_id: i64,
    #[schemars(description = "Owner of the task (see kommo_list_users)", range(min = 1))]
    responsible_user_id: Option<i64>,
}

#[async_trait]
impl Tool for AddTasks {
    fn name(&self) -> &'static str {
        "kommo_add_tasks"
    }

    fn description(&self) -> &'static str {
        "Creates a task for the lead in the active session. complete_till is a unix timestamp \
         in seconds (tomorrow = now + 86400). task_type_id: 1 call (default), 2 meeting, \
         3 email. Requires kommo_start_session first."
    }

    fn input_schema(&self) -> Value {
        input_schema::<TaskParams>()
    }

    fn mutates(&self) -> bool {
        true
    }

    async fn execute(&self, params: Map<String, Value>, ctx: &ToolContext) -> Result<ToolOutput, ToolError> {
        let params: TaskParams = parse_params(params)?;
        let task_type = TaskType::from_id(params.task_type_id)
            .ok_or_else(|| ToolError::Rejected(format!("unknown task type {}", params.task_type_id)))?;
        let lead_id = authorize_lead(&ctx.session, self.name(), params.lead_id)?;

        let mut task = NewTask::for_lead(lead_id, task_type, params.text, params.complete_till);
        task.responsible_user_id = params.responsible_user_id;
        task.request_id = Some(format!("task_{}_0", Utc::now().timestamp_millis()));

        info!(event_name = "lead.task.add", lead_id, task_type = task_type.label(), "creating task");
        let response = ctx.crm.post("/tasks", &encode(&[task])?).await?;
        let tasks: Vec<Value> = decode_embedded(&response, "tasks")?;

        let label = ctx.session.active_subject_label().unwrap_or_else(|| lead_id.to_string());
        ToolOutput::new(format!("{} task created for \"{label}\"", task_type.label()), tasks)
    }
}

#[cfg(test)]
mod tests {
    use kommo_crm::HttpMethod;
    use serde_json::json;

    use crate::tools::test_support::harness;
    use crate::tools::ToolRegistry;

    #[tokio::test]
    async fn note_goes_to_session_lead_with_default_type() {
        let h = harness();
        h.session.start(42, "Acme", None);
        h.crm.respond(HttpMethod::Post, "/leads/notes", json!({ "_embedded": { "notes": [{ "id": 1 }] } }));
        let registry = ToolRegistry::with_default_tools();

        let result = registry.call("kommo_add_notes", &json!({ "text": "Asked for a quote" }), &h.ctx).await;

        assert!(!result.is_error, "{}", result.text);
        assert!(result.text.starts_with("Note added to lead \"Acme\""));
        assert_eq!(
            h.crm.writes()[0].body,
            Some(json!([{ "entity_id": 42, "note_type": "common", "params": { "text": "Asked for a quote" } }]))
        );
    }

    #[tokio::test]
    async fn note_for_unopened_lead_never_reaches_the_crm() {
        let h = harness();
        h.session.start(42, "Acme", None);
        let registry = ToolRegistry::with_default_tools();

        let result =
            registry.call("kommo_add_notes", &json!({ "lead_id": 43, "text": "Wrong lead" }), &h.ctx).await;

        assert_eq!(result.error_kind, Some("unauthorized"));
        assert!(h.crm.writes().is_empty());
    }

    #[tokio::test]
    async fn unknown_note_type_is_a_validation_error() {
        let h = harness();
        h.session.start(42, "Acme", None);
        let registry = ToolRegistry::with_default_tools();

        let result = registry
            .call("kommo_add_notes", &json!({ "text": "Hi", "note_type": "voicemail" }), &h.ctx)
            .await;
        assert_eq!(result.error_kind, Some("validation"));
        assert!(result.text.contains("note_type: must be one of common"));
    }

    #[tokio::test]
    async fn task_carries_type_deadline_and_request_id() {
        let h = harness();
        h.session.start(42, "Acme", None);
        h.crm.respond(HttpMethod::Post, "/tasks", json!({ "_embedded": { "tasks": [{ "id": 3 }] } }));
        let registry = ToolRegistry::with_default_tools();

        let result = registry
            .call(
                "kommo_add_tasks",
                &json!({ "lead_id": 42, "text": "Call back", "complete_till": 1900000000, "task_type_id": 2 }),
                &h.ctx,
            )
            .await;

        assert!(!result.is_error, "{}", result.text);
        assert!(result.text.starts_with("Meeting task created for \"Acme\""));
        let body = h.crm.writes()[0].body.clone().unwrap_or_default();
        assert_eq!(body[0]["task_type_id"], 2);
        assert_eq!(body[0]["entity_type"], "leads");
        assert_eq!(body[0]["complete_till"], 1900000000);
        assert!(body[0]["request_id"].as_str().is_some_and(|id| id.starts_with("task_")));
    }

    #[tokio::test]
    async fn task_without_session_is_unauthorized() {
        let h = harness();
        let registry = ToolRegistry::with_default_tools();

        let result = registry
            .call("kommo_add_tasks", &json!({ "text": "Call", "complete_till": 1900000000 }), &h.ctx)
            .await;
        assert_eq!(result.error_kind, Some("unauthorized"));
        assert!(h.crm.calls().is_empty());
    }
}
