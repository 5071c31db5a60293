//! Cached reference data: pipelines, stages, custom fields and users.

use std::fmt::Write as _;
use std::sync::Arc;

use async_trait::async_trait;
use kommo_core::domain::pipeline::{FieldEnum, RequiredStatus};
use kommo_core::domain::{CustomFieldDefinition, Pipeline, Stage, User};
use kommo_crm::{fetch_list, Query};
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};
use serde_json::{json, Map, Value};

use super::{parse_params, NoParams, Tool, ToolContext, ToolError, ToolOutput, ToolRegistry};
use crate::schema::input_schema;

pub const PIPELINES_KEY: &str = "pipelines_all";
pub const CUSTOM_FIELDS_KEY: &str = "lead_custom_fields";
pub const USERS_KEY: &str = "users_all";

pub fn stages_key(pipeline_id: i64) -> String {
    format!("pipeline_stages_{pipeline_id}")
}

pub fn register(registry: &mut ToolRegistry) {
    registry.register(ListPipelines);
    registry.register(ListPipelineStages);
    registry.register(ListLeadCustomFields);
    registry.register(ListUsers);
}

pub async fn pipelines(ctx: &ToolContext) -> Result<Arc<Vec<Pipeline>>, ToolError> {
    ctx.cached(PIPELINES_KEY, ctx.ttls.pipelines, || async move {
        fetch_list::<Pipeline>(ctx.crm.as_ref(), "/leads/pipelines", &Query::new(), "pipelines").await
    })
    .await
}

/// Pipelines and their stages as text, for tool descriptions. Empty when the account has none.
pub async fn pipeline_hint(ctx: &ToolContext) -> Result<String, ToolError> {
    let pipelines = pipelines(ctx).await?;
    if pipelines.is_empty() {
        return Ok(String::new());
    }
    let mut hint = String::from("\n\nPipelines and stages available in this CRM:\n");
    for pipeline in pipelines.iter() {
        let main = if pipeline.is_main { " [main]" } else { "" };
        let _ = writeln!(hint, "\n- {} (pipeline_id: {}){main}", pipeline.name, pipeline.id);
        for stage in pipeline.stages() {
            let _ = writeln!(hint, "   - {} (status_id: {})", stage.name, stage.id);
        }
    }
    Ok(hint)
}

#[derive(Debug, Serialize)]
struct StageView {
    id: i64,
    name: String,
    color: Option<String>,
    sort: i64,
    #[serde(rename = "type")]
    kind: &'static str,
}

impl From<&Stage> for StageView {
    fn from(stage: &Stage) -> Self {
        Self { id: stage.id, name: stage.name.clone(), color: stage.color.clone(), sort: stage.sort, kind: stage.kind() }
    }
}

#[derive(Debug, Serialize)]
struct PipelineView {
    id: i64,
    name: String,
    is_main: bool,
    is_archive: bool,
    sort: i64,
    stages: Vec<StageView>,
}

pub struct ListPipelines;

#[async_trait]
impl Tool for ListPipelines {
    fn name(&self) -> &'static str {
        "kommo_list_pipelines"
    }

    fn description(&self) -> &'static str {
        "Lists every sales pipeline with its stages (status_id, name, color, order, type). \
         Use it to find the status_id to move a lead to with kommo_update_lead. Results are \
         cached for 10 minutes."
    }

    fn input_schema(&self) -> Value {
        input_schema::<NoParams>()
    }

    async fn execute(&self, _params: Map<String, Value>, ctx: &ToolContext) -> Result<ToolOutput, ToolError> {
        let pipelines = pipelines(ctx).await?;
        let views: Vec<PipelineView> = pipelines
            .iter()
            .map(|pipeline| PipelineView {
                id: pipeline.id,
                name: pipeline.name.clone(),
                is_main: pipeline.is_main,
                is_archive: pipeline.is_archive,
                sort: pipeline.sort,
                stages: pipeline.stages().iter().map(StageView::from).collect(),
            })
            .collect();
        ToolOutput::new(format!("{} pipelines", views.len()), json!({ "total": views.len(), "pipelines": views }))
    }
}

pub struct ListPipelineStages;

#[derive(Debug, Deserialize, JsonSchema)]
struct StagesParams {
    #[schemars(description = "Pipeline id", range(min = 1))]
    pipeline_id: i64,
}

#[async_trait]
impl Tool for ListPipelineStages {
    fn name(&self) -> &'static str {
        "kommo_list_pipeline_stages"
    }

    fn description(&self) -> &'static str {
        "Lists the stages of one pipeline. Use kommo_list_pipelines first when the \
         pipeline_id is unknown."
    }

    fn input_schema(&self) -> Value {
        input_schema::<StagesParams>()
    }

    async fn execute(&self, params: Map<String, Value>, ctx: &ToolContext) -> Result<ToolOutput, ToolError> {
        let StagesParams { pipeline_id } = parse_params(params)?;
        let endpoint = format!("/leads/pipelines/{pipeline_id}/statuses");
        let stages = ctx
            .cached(&stages_key(pipeline_id), ctx.ttls.stages, || async move {
                fetch_list::<Stage>(ctx.crm.as_ref(), &endpoint, &Query::new(), "statuses").await
            })
            .await?;

        let views: Vec<StageView> = stages.iter().map(StageView::from).collect();
        ToolOutput::new(
            format!("{} stages in pipeline {pipeline_id}", views.len()),
            json!({ "pipeline_id": pipeline_id, "total": views.len(), "stages": views }),
        )
    }
}

#[derive(Debug, Serialize)]
struct CustomFieldView<'a> {
    id: i64,
    name: &'a str,
    #[serde(rename = "type")]
    field_type: &'a str,
    code: Option<&'a str>,
    sort: Option<i64>,
    entity_type: Option<&'a str>,
    is_required: bool,
    is_predefined: bool,
    is_deletable: bool,
    is_api_only: bool,
    group_id: Option<&'a str>,
    enums: Option<&'a [FieldEnum]>,
    required_statuses: Option<&'a [RequiredStatus]>,
}

impl<'a> From<&'a CustomFieldDefinition> for CustomFieldView<'a> {
    fn from(field: &'a CustomFieldDefinition) -> Self {
        Self {
            id: field.id,
            name: &field.name,
            field_type: &field.field_type,
            code: field.code.as_deref(),
            sort: field.sort,
            entity_type: field.entity_type.as_deref(),
            is_required: field.is_required,
            is_predefined: field.is_predefined,
            is_deletable: field.is_deletable,
            is_api_only: field.is_api_only,
            group_id: field.group_id.as_deref(),
            enums: field.enums.as_deref(),
            required_statuses: field.required_statuses.as_deref(),
        }
    }
}

pub struct ListLeadCustomFields;

#[async_trait]
impl Tool for ListLeadCustomFields {
    fn name(&self) -> &'static str {
        "kommo_list_lead_custom_fields"
    }

    fn description(&self) -> &'static str {
        "Lists the lead custom fields of this CRM: id, name, code, type, allowed enum values \
         and required flags. Every account has different fields, so check here before \
         setting custom_fields_values."
    }

    fn input_schema(&self) -> Value {
        input_schema::<NoParams>()
    }

    async fn execute(&self, _params: Map<String, Value>, ctx: &ToolContext) -> Result<ToolOutput, ToolError> {
        let fields = ctx
            .cached(CUSTOM_FIELDS_KEY, ctx.ttls.custom_fields, || async move {
                let query = Query::new();
                fetch_list::<CustomFieldDefinition>(ctx.crm.as_ref(), "/leads/custom_fields", &query, "custom_fields")
                    .await
            })
            .await?;

        let views: Vec<CustomFieldView<'_>> = fields.iter().map(CustomFieldView::from).collect();
        ToolOutput::new(format!("{} custom fields", views.len()), json!({ "total": views.len(), "custom_fields": views }))
    }
}

#[derive(Debug, Serialize)]
struct UserView<'a> {
    id: i64,
    name: &'a str,
    email: Option<&'a str>,
    lang: Option<&'a str>,
    can_add_leads: bool,
    can_edit_leads: bool,
}

pub struct ListUsers;

#[async_trait]
impl Tool for ListUsers {
    fn name(&self) -> &'static str {
        "kommo_list_users"
    }

    fn description(&self) -> &'static str {
        "Lists the CRM users with email and lead permissions. Use it to pick a \
         responsible_user_id when creating or updating leads and tasks."
    }

    fn input_schema(&self) -> Value {
        input_schema::<NoParams>()
    }

    async fn execute(&self, _params: Map<String, Value>, ctx: &ToolContext) -> Result<ToolOutput, ToolError> {
        let users = ctx
            .cached(USERS_KEY, ctx.ttls.users, || async move {
                fetch_list::<User>(ctx.crm.as_ref(), "/users", &Query::new(), "users").await
            })
            .await?;

        let views: Vec<UserView<'_>> = users
            .iter()
            .map(|user| UserView {
                id: user.id,
                name: &user.name,
                email: user.email.as_deref(),
                lang: user.lang.as_deref(),
                can_add_leads: user.can_add_leads(),
                can_edit_leads: user.can_edit_leads(),
            })
            .collect();
        ToolOutput::new(format!("{} users", views.len()), json!({ "total": views.len(), "users": views }))
    }
}
