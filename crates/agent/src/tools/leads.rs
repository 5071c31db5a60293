use std::collections::{BTreeSet, HashMap, HashSet};

use async_trait::async_trait;
use kommo_core::domain::{
    Company, Contact, ContactInfo, CustomFieldValue, CustomFieldValueItem, Event, Lead, LeadDraft,
    LeadUpdate, NewCompany, NewContact, Note, TagRef, Task,
};
use kommo_crm::{decode, decode_embedded, fetch_list, CrmError, Query};
use schemars::{json_schema, JsonSchema, Schema, SchemaGenerator};
use serde::{Deserialize, Serialize};
use serde_json::{json, Map, Value};
use tracing::{info, warn};

use super::{parse_params, Tool, ToolContext, ToolError, ToolOutput, ToolRegistry};
use crate::guardrails::{authorize, authorize_lead, MutationIntent};
use crate::schema::{input_schema, FieldViolation};

/// Leads beyond this many in one page are returned as summaries.
pub const DETAILED_LEADS: usize = 10;

pub fn register(registry: &mut ToolRegistry) {
    registry.register(ListLeads);
    registry.register(GetLeadById);
    registry.register(SearchLeadsByPhone);
    registry.register(GetLeadEvents);
    registry.register(UpdateLead);
    registry.register(CreateLead);
}

/// Returns the list or an empty one, logging the failure. Used for optional enrichment.
fn or_empty<T>(result: Result<Vec<T>, CrmError>, what: &'static str, lead_id: Option<i64>) -> Vec<T> {
    result.unwrap_or_else(|error| {
        warn!(event_name = "tools.enrichment_failed", what, lead_id, error = %error, "enrichment fetch failed");
        Vec::new()
    })
}

fn scalar_schema(_: &mut SchemaGenerator) -> Schema {
    json_schema!({ "type": ["string", "number", "boolean"] })
}

fn first_page() -> i64 {
    1
}

#[derive(Debug, Deserialize, JsonSchema)]
struct FieldInput {
    #[schemars(description = "Custom field id (see kommo_list_lead_custom_fields)", range(min = 1))]
    field_id: i64,
    #[schemars(description = "Values of the field")]
    values: Vec<FieldValueInput>,
}

#[derive(Debug, Deserialize, JsonSchema)]
struct FieldValueInput {
    #[schemars(description = "Field value", schema_with = "scalar_schema")]
    value: Value,
    #[schemars(description = "Enum option id, for select and multiselect fields", range(min = 1))]
    enum_id: Option<i64>,
}

#[derive(Debug, Deserialize, JsonSchema)]
struct TagInput {
    #[schemars(description = "Existing tag id", range(min = 1))]
    id: Option<i64>,
    #[schemars(description = "Tag name; created if missing", length(min = 1))]
    name: Option<String>,
}

impl From<TagInput> for TagRef {
    fn from(tag: TagInput) -> Self {
        TagRef { id: tag.id, name: tag.name }
    }
}

fn to_custom_fields(fields: Option<Vec<FieldInput>>) -> Option<Vec<CustomFieldValue>> {
    fields.map(|fields| {
        fields
            .into_iter()
            .map(|field| CustomFieldValue {
                field_id: Some(field.field_id),
                values: field
                    .values
                    .into_iter()
                    .map(|item| CustomFieldValueItem { value: item.value, enum_id: item.enum_id, enum_code: None })
                    .collect(),
                ..CustomFieldValue::default()
            })
            .collect()
    })
}

async fn contacts_by_id(ctx: &ToolContext, ids: &BTreeSet<i64>) -> Result<Vec<Contact>, CrmError> {
    if ids.is_empty() {
        return Ok(Vec::new());
    }
    fetch_list(ctx.crm.as_ref(), "/contacts", &Query::new().list("id", ids), "contacts").await
}

pub struct ListLeads;

fn default_list_limit() -> i64 {
    10
}

#[derive(Debug, Deserialize, JsonSchema)]
struct ListParams {
    #[schemars(description = "Text to search in lead name or phone", length(min = 1))]
    query: Option<String>,
    #[serde(default = "default_list_limit")]
    #[schemars(description = "Results per page", range(min = 1, max = 250))]
    limit: i64,
    #[serde(default = "first_page")]
    #[schemars(description = "Page number", range(min = 1))]
    page: i64,
    #[schemars(description = "Only leads created at or after this unix timestamp (seconds)", range(min = 0))]
    created_at_from: Option<i64>,
    #[schemars(description = "Only leads created at or before this unix timestamp (seconds)", range(min = 0))]
    created_at_to: Option<i64>,
    #[schemars(description = "Stage id filter", range(min = 1))]
    status_id: Option<i64>,
    #[schemars(description = "Pipeline id filter", range(min = 1))]
    pipeline_id: Option<i64>,
}

#[derive(Debug, Serialize)]
struct EnrichedLead {
    #[serde(flatten)]
    lead: Lead,
    contact_info: Option<ContactInfo>,
}

#[derive(Debug, Serialize)]
struct LeadSummary {
    id: i64,
    name: String,
    price: Option<f64>,
    status_id: Option<i64>,
    pipeline_id: Option<i64>,
    contact_info: Option<ContactInfo>,
}

impl From<EnrichedLead> for LeadSummary {
    fn from(enriched: EnrichedLead) -> Self {
        Self {
            id: enriched.lead.id,
            name: enriched.lead.name,
            price: enriched.lead.price,
            status_id: enriched.lead.status_id,
            pipeline_id: enriched.lead.pipeline_id,
            contact_info: enriched.contact_info,
        }
    }
}

#[async_trait]
impl Tool for ListLeads {
    fn name(&self) -> &'static str {
        "kommo_list_leads"
    }

    fn description(&self) -> &'static str {
        "Lists leads with the main contact of each (name and phone). Filter by free text \
         (name or phone), creation date range (unix seconds), status_id or pipeline_id. \
         Use it to find the lead_id before opening a session. Only the first 10 leads are \
         returned in full; the rest come as summaries (id, name, price, status, contact)."
    }

    fn input_schema(&self) -> Value {
        input_schema::<ListParams>()
    }

    async fn execute(&self, params: Map<String, Value>, ctx: &ToolContext) -> Result<ToolOutput, ToolError> {
        let params: ListParams = parse_params(params)?;
        let query = Query::new()
            .param("limit", params.limit)
            .param("page", params.page)
            .param("with", "contacts")
            .opt("query", params.query.as_deref())
            .opt("filter[created_at][from]", params.created_at_from)
            .opt("filter[created_at][to]", params.created_at_to)
            .opt("filter[statuses][0][status_id]", params.status_id)
            .opt("filter[statuses][0][pipeline_id]", params.pipeline_id);

        let leads: Vec<Lead> = fetch_list(ctx.crm.as_ref(), "/leads", &query, "leads").await?;
        let contact_ids: BTreeSet<i64> =
            leads.iter().flat_map(|lead| lead.contact_refs().iter().map(|contact| contact.id)).collect();
        let contacts: HashMap<i64, Contact> = or_empty(contacts_by_id(ctx, &contact_ids).await, "contacts", None)
            .into_iter()
            .map(|contact| (contact.id, contact))
            .collect();

        let total = leads.len();
        let mut enriched = leads.into_iter().map(|lead| {
            let contact_info =
                lead.main_contact_id().and_then(|id| contacts.get(&id)).map(Contact::info);
            EnrichedLead { lead, contact_info }
        });

        if total > DETAILED_LEADS {
            let detailed: Vec<EnrichedLead> = enriched.by_ref().take(DETAILED_LEADS).collect();
            let summaries: Vec<LeadSummary> = enriched.map(LeadSummary::from).collect();
            let message = format!(
                "Showing full details for the first {DETAILED_LEADS} leads. The remaining {} are \
                 summarized (id, name, price, status, contact_info).",
                summaries.len()
            );
            return ToolOutput::new(
                format!("{total} leads found"),
                json!({
                    "total": total,
                    "showing_details": DETAILED_LEADS,
                    "detailed_leads": detailed,
                    "summary_leads": summaries,
                    "message": message,
                }),
            );
        }

        let leads: Vec<EnrichedLead> = enriched.collect();
        ToolOutput::new(format!("{total} leads found"), json!({ "total": total, "leads": leads }))
    }
}

pub struct GetLeadById;

#[derive(Debug, Deserialize, JsonSchema)]
struct LeadIdParams {
    #[schemars(description = "Lead id", range(min = 1))]
    lead_id: i64,
}

#[derive(Clone, Debug, Serialize)]
struct LeadContactView {
    id: i64,
    name: String,
    first_name: Option<String>,
    last_name: Option<String>,
    is_main: bool,
    phone: Option<String>,
    email: Option<String>,
    custom_fields: Option<Vec<CustomFieldValue>>,
}

#[derive(Debug, Serialize)]
struct CompanyView {
    id: i64,
    name: String,
    custom_fields: Option<Vec<CustomFieldValue>>,
}

#[derive(Debug, Serialize)]
struct TaskView {
    id: i64,
    text: String,
    is_completed: bool,
    complete_till: Option<i64>,
    task_type_id: Option<i64>,
    responsible_user_id: Option<i64>,
    result: Option<String>,
    created_at: Option<i64>,
}

impl From<Task> for TaskView {
    fn from(task: Task) -> Self {
        Self {
            id: task.id,
            text: task.text,
            is_completed: task.is_completed,
            complete_till: task.complete_till,
            task_type_id: task.task_type_id,
            responsible_user_id: task.responsible_user_id,
            result: task.result.and_then(|result| result.text),
            created_at: task.created_at,
        }
    }
}

#[derive(Debug, Serialize)]
struct NoteView {
    id: i64,
    note_type: String,
    text: Option<String>,
    created_at: Option<i64>,
    created_by: Option<i64>,
}

impl From<Note> for NoteView {
    fn from(note: Note) -> Self {
        Self {
            id: note.id,
            text: note.text().map(str::to_string),
            note_type: note.note_type,
            created_at: note.created_at,
            created_by: note.created_by,
        }
    }
}

#[derive(Debug, Serialize)]
struct EventView {
    id: String,
    #[serde(rename = "type")]
    event_type: String,
    created_at: Option<i64>,
    value_after: Vec<Value>,
}

#[derive(Debug, Serialize)]
struct LeadDetailSummary {
    total_contacts: usize,
    total_companies: usize,
    total_tasks: usize,
    pending_tasks: usize,
    total_notes: usize,
    total_events: usize,
    main_contact: Option<LeadContactView>,
}

#[derive(Debug, Serialize)]
struct LeadDetail {
    id: i64,
    name: String,
    price: Option<f64>,
    status_id: Option<i64>,
    pipeline_id: Option<i64>,
    responsible_user_id: Option<i64>,
    created_at: Option<i64>,
    updated_at: Option<i64>,
    closed_at: Option<i64>,
    loss_reason_id: Option<i64>,
    custom_fields_values: Option<Vec<CustomFieldValue>>,
    tags: Vec<TagRef>,
    contacts: Vec<LeadContactView>,
    companies: Vec<CompanyView>,
    tasks: Vec<TaskView>,
    notes: Vec<NoteView>,
    events: Vec<EventView>,
    summary: LeadDetailSummary,
}

#[async_trait]
impl Tool for GetLeadById {
    fn name(&self) -> &'static str {
        "kommo_get_lead_by_id"
    }

    fn description(&self) -> &'static str {
        "Fetches one lead by id with everything attached: contacts, companies, tasks, notes \
         and recent events, plus a short summary. Prefer it over kommo_list_leads when the id \
         is known."
    }

    fn input_schema(&self) -> Value {
        input_schema::<LeadIdParams>()
    }

    async fn execute(&self, params: Map<String, Value>, ctx: &ToolContext) -> Result<ToolOutput, ToolError> {
        let LeadIdParams { lead_id } = parse_params(params)?;
        let crm = ctx.crm.as_ref();

        let payload =
            crm.get(&format!("/leads/{lead_id}"), &Query::new().param("with", "contacts,companies")).await?;
        let lead: Lead = decode(payload)?;

        let contact_ids: BTreeSet<i64> = lead.contact_refs().iter().map(|contact| contact.id).collect();
        let main_ids: HashSet<i64> =
            lead.contact_refs().iter().filter(|contact| contact.is_main).map(|contact| contact.id).collect();
        let contacts: Vec<LeadContactView> = or_empty(contacts_by_id(ctx, &contact_ids).await, "contacts", Some(lead_id))
            .into_iter()
            .map(|contact| LeadContactView {
                is_main: main_ids.contains(&contact.id),
                phone: contact.phone(),
                email: contact.email(),
                id: contact.id,
                name: contact.name,
                first_name: contact.first_name,
                last_name: contact.last_name,
                custom_fields: contact.custom_fields_values,
            })
            .collect();

        let company_ids: Vec<i64> = lead.company_refs().iter().map(|company| company.id).collect();
        let companies: Vec<CompanyView> = if company_ids.is_empty() {
            Vec::new()
        } else {
            let query = Query::new().list("id", &company_ids);
            or_empty(fetch_list::<Company>(crm, "/companies", &query, "companies").await, "companies", Some(lead_id))
                .into_iter()
                .map(|company| CompanyView {
                    id: company.id,
                    name: company.name,
                    custom_fields: company.custom_fields_values,
                })
                .collect()
        };

        let tasks_query = Query::new()
            .param("filter[entity_type]", "leads")
            .param("filter[entity_id][]", lead_id)
            .param("limit", 50);
        let tasks: Vec<TaskView> =
            or_empty(fetch_list::<Task>(crm, "/tasks", &tasks_query, "tasks").await, "tasks", Some(lead_id))
                .into_iter()
                .map(TaskView::from)
                .collect();

        let notes_endpoint = format!("/leads/{lead_id}/notes");
        let notes: Vec<NoteView> = or_empty(
            fetch_list::<Note>(crm, &notes_endpoint, &Query::new().param("limit", 50), "notes").await,
            "notes",
            Some(lead_id),
        )
        .into_iter()
        .map(NoteView::from)
        .collect();

        let events: Vec<EventView> =
            or_empty(fetch_list::<Event>(crm, "/events", &events_query(lead_id, 20), "events").await, "events", Some(lead_id))
                .into_iter()
                .map(|event| EventView {
                    id: event.id,
                    event_type: event.event_type,
                    created_at: event.created_at,
                    value_after: event.value_after,
                })
                .collect();

        let summary = LeadDetailSummary {
            total_contacts: contacts.len(),
            total_companies: companies.len(),
            total_tasks: tasks.len(),
            pending_tasks: tasks.iter().filter(|task| !task.is_completed).count(),
            total_notes: notes.len(),
            total_events: events.len(),
            main_contact: contacts.iter().find(|contact| contact.is_main).cloned(),
        };

        let message = format!("Lead \"{}\" ({lead_id})", lead.name);
        let tags = lead.tags().to_vec();
        let detail = LeadDetail {
            id: lead.id,
            name: lead.name,
            price: lead.price,
            status_id: lead.status_id,
            pipeline_id: lead.pipeline_id,
            responsible_user_id: lead.responsible_user_id,
            created_at: lead.created_at,
            updated_at: lead.updated_at,
            closed_at: lead.closed_at,
            loss_reason_id: lead.loss_reason_id,
            custom_fields_values: lead.custom_fields_values,
            tags,
            contacts,
            companies,
            tasks,
            notes,
            events,
            summary,
        };
        ToolOutput::new(message, detail)
    }
}

fn events_query(lead_id: i64, limit: i64) -> Query {
    Query::new()
        .param("filter[entity]", "lead")
        .param("filter[entity_id][]", lead_id)
        .param("limit", limit)
}

pub struct SearchLeadsByPhone;

#[derive(Debug, Deserialize, JsonSchema)]
struct PhoneParams {
    #[schemars(description = "Full or partial phone number", length(min = 3))]
    phone: String,
}

#[derive(Debug, Serialize)]
struct MatchedContact {
    id: i64,
    name: String,
    phone: Option<String>,
}

#[derive(Debug, Serialize)]
struct PhoneMatch {
    #[serde(flatten)]
    lead: Lead,
    #[serde(skip_serializing_if = "Option::is_none")]
    contact_info: Option<MatchedContact>,
}

#[async_trait]
impl Tool for SearchLeadsByPhone {
    fn name(&self) -> &'static str {
        "kommo_search_leads_by_phone"
    }

    fn description(&self) -> &'static str {
        "Finds leads by the phone number of their contacts. Full numbers with country code \
         (+5511999999999) work best; partial numbers also match. Returns every lead linked \
         to a matching contact."
    }

    fn input_schema(&self) -> Value {
        input_schema::<PhoneParams>()
    }

    async fn execute(&self, params: Map<String, Value>, ctx: &ToolContext) -> Result<ToolOutput, ToolError> {
        let PhoneParams { phone } = parse_params(params)?;
        let crm = ctx.crm.as_ref();

        let contacts: Vec<Contact> =
            fetch_list(crm, "/contacts", &Query::new().param("query", &phone), "contacts").await?;
        if contacts.is_empty() {
            return ToolOutput::new(
                format!("No contact found with phone {phone}"),
                json!({ "total": 0, "leads": [], "message": "No contact found with this phone" }),
            );
        }

        let mut seen = HashSet::new();
        let mut leads = Vec::new();
        for contact in &contacts {
            let query = Query::new()
                .param("query", contact.id)
                .param("with", "contacts")
                .param("limit", 250);
            let found: Vec<Lead> =
                or_empty(fetch_list(crm, "/leads", &query, "leads").await, "leads_by_contact", None);
            leads.extend(found.into_iter().filter(|lead| seen.insert(lead.id)));
        }

        let matches: Vec<PhoneMatch> = leads
            .into_iter()
            .map(|lead| {
                let contact_info = lead
                    .main_contact_id()
                    .and_then(|id| contacts.iter().find(|contact| contact.id == id))
                    .map(|contact| MatchedContact {
                        id: contact.id,
                        name: contact.name.clone(),
                        phone: contact.phone(),
                    });
                PhoneMatch { lead, contact_info }
            })
            .collect();

        ToolOutput::new(
            format!("{} leads found for phone {phone}", matches.len()),
            json!({ "total": matches.len(), "leads": matches, "contacts_found": contacts.len() }),
        )
    }
}

pub struct GetLeadEvents;

fn default_events_limit() -> i64 {
    20
}

#[derive(Debug, Deserialize, JsonSchema)]
struct EventsParams {
    #[schemars(description = "Lead id", range(min = 1))]
    lead_id: i64,
    #[serde(default = "default_events_limit")]
    #[schemars(description = "Number of events", range(min = 1, max = 100))]
    limit: i64,
}

#[derive(Debug, Serialize)]
struct EventEntry {
    id: String,
    #[serde(rename = "type")]
    event_type: String,
    created_at: Option<i64>,
    created_by: Option<i64>,
    value_after: Vec<Value>,
    message_info: Option<Value>,
}

#[async_trait]
impl Tool for GetLeadEvents {
    fn name(&self) -> &'static str {
        "kommo_get_lead_events"
    }

    fn description(&self) -> &'static str {
        "Event history of a lead: stage changes, incoming and outgoing chat messages, calls, \
         emails and completed tasks. Chat message events carry origin and talk id."
    }

    fn input_schema(&self) -> Value {
        input_schema::<EventsParams>()
    }

    async fn execute(&self, params: Map<String, Value>, ctx: &ToolContext) -> Result<ToolOutput, ToolError> {
        let EventsParams { lead_id, limit } = parse_params(params)?;
        let events: Vec<Event> =
            fetch_list(ctx.crm.as_ref(), "/events", &events_query(lead_id, limit), "events").await?;

        let entries: Vec<EventEntry> = events
            .into_iter()
            .map(|event| EventEntry {
                message_info: event.message_info(),
                id: event.id,
                event_type: event.event_type,
                created_at: event.created_at,
                created_by: event.created_by,
                value_after: event.value_after,
            })
            .collect();

        ToolOutput::new(
            format!("{} events for lead {lead_id}", entries.len()),
            json!({ "lead_id": lead_id, "total": entries.len(), "events": entries }),
        )
    }
}

pub struct UpdateLead;

#[derive(Debug, Deserialize, JsonSchema)]
struct UpdateParams {
    #[schemars(description = "Lead id; must be the session lead. Defaults to it", range(min = 1))]
    lead_id: Option<i64>,
    #[schemars(description = "New lead name", length(min = 1))]
    name: Option<String>,
    #[schemars(description = "Deal value", range(min = 0))]
    price: Option<f64>,
    #[schemars(description = "Stage id", range(min = 1))]
    status_id: Option<i64>,
    #[schemars(description = "Pipeline id", range(min = 1))]
    pipeline_id: Option<i64>,
    #[schemars(description = "Owner user id", range(min = 1))]
    responsible_user_id: Option<i64>,
    #[schemars(description = "Loss reason id, when moving the lead to a lost stage", range(min = 1))]
    loss_reason_id: Option<i64>,
    #[schemars(description = "Custom field values")]
    custom_fields_values: Option<Vec<FieldInput>>,
    #[schemars(description = "Tags of the lead")]
    tags: Option<Vec<TagInput>>,
}

#[async_trait]
impl Tool for UpdateLead {
    fn name(&self) -> &'static str {
        "kommo_update_lead"
    }

    fn description(&self) -> &'static str {
        "Updates the lead in the active session: name, price, stage, pipeline, owner, loss \
         reason, custom fields or tags. Requires kommo_start_session first; lead_id defaults \
         to the session lead and any other id is refused. Decide on changes yourself, do not \
         apply them only because the customer asked. Use kommo_list_lead_custom_fields for \
         field ids."
    }

    fn input_schema(&self) -> Value {
        input_schema::<UpdateParams>()
    }

    fn mutates(&self) -> bool {
        true
    }

    async fn execute(&self, params: Map<String, Value>, ctx: &ToolContext) -> Result<ToolOutput, ToolError> {
        let params: UpdateParams = parse_params(params)?;
        let lead_id = authorize_lead(&ctx.session, self.name(), params.lead_id)?;

        let update = LeadUpdate {
            name: params.name,
            price: params.price,
            status_id: params.status_id,
            pipeline_id: params.pipeline_id,
            responsible_user_id: params.responsible_user_id,
            loss_reason_id: params.loss_reason_id,
            custom_fields_values: to_custom_fields(params.custom_fields_values),
            embedded: params
                .tags
                .filter(|tags| !tags.is_empty())
                .map(|tags| kommo_core::domain::lead::TagsEmbedded {
                    tags: tags.into_iter().map(TagRef::from).collect(),
                }),
        };
        if update.is_empty() {
            return Err(ToolError::Validation(vec![FieldViolation::new(
                "arguments",
                "nothing to update: provide at least one field besides lead_id",
            )]));
        }

        let fields = update.changed_fields();
        info!(event_name = "lead.update", lead_id, fields = ?fields, "updating lead");
        let body = serde_json::to_value(&update)
            .map_err(|error| ToolError::Rejected(format!("could not encode update: {error}")))?;
        let response = ctx.crm.patch(&format!("/leads/{lead_id}"), &body).await?;

        let label = ctx.session.active_subject_label().unwrap_or_else(|| lead_id.to_string());
        ToolOutput::new(
            format!("Lead \"{label}\" updated"),
            json!({ "lead_id": lead_id, "updated_fields": fields, "response": response }),
        )
    }
}

pub struct CreateLead;

#[derive(Debug, Deserialize, JsonSchema)]
struct CreateParams {
    #[schemars(description = "Lead name", length(min = 1))]
    name: String,
    #[schemars(description = "Deal value", range(min = 0))]
    price: Option<f64>,
    #[schemars(description = "Initial stage id", range(min = 1))]
    status_id: Option<i64>,
    #[schemars(description = "Pipeline id", range(min = 1))]
    pipeline_id: Option<i64>,
    #[schemars(description = "Owner user id", range(min = 1))]
    responsible_user_id: Option<i64>,
    #[schemars(description = "Contact first name", length(min = 1))]
    contact_first_name: Option<String>,
    #[schemars(description = "Contact last name")]
    contact_last_name: Option<String>,
    #[schemars(description = "Contact phone, e.g. +5511999999999", length(min = 1))]
    contact_phone: Option<String>,
    #[schemars(description = "Contact email", length(min = 1))]
    contact_email: Option<String>,
    #[schemars(description = "Company name", length(min = 1))]
    company_name: Option<String>,
    #[schemars(description = "Company phone", length(min = 1))]
    company_phone: Option<String>,
    #[schemars(description = "Custom field values")]
    custom_fields_values: Option<Vec<FieldInput>>,
}

impl CreateParams {
    fn into_draft(self) -> LeadDraft {
        let mut draft = LeadDraft {
            name: self.name,
            price: self.price,
            status_id: self.status_id,
            pipeline_id: self.pipeline_id,
            responsible_user_id: self.responsible_user_id,
            custom_fields_values: to_custom_fields(self.custom_fields_values),
            ..LeadDraft::default()
        };

        if self.contact_first_name.is_some() || self.contact_phone.is_some() || self.contact_email.is_some() {
            let mut fields = Vec::new();
            if let Some(phone) = self.contact_phone {
                fields.push(CustomFieldValue::work_entry("PHONE", phone));
            }
            if let Some(email) = self.contact_email {
                fields.push(CustomFieldValue::work_entry("EMAIL", email));
            }
            let contact = NewContact::named(
                self.contact_first_name.as_deref().unwrap_or_default(),
                self.contact_last_name.as_deref(),
            )
            .with_fields(fields);
            draft.embedded.contacts.push(contact);
        }

        if let Some(company_name) = self.company_name {
            let fields: Vec<CustomFieldValue> =
                self.company_phone.map(|phone| CustomFieldValue::work_entry("PHONE", phone)).into_iter().collect();
            draft.embedded.companies.push(NewCompany {
                name: company_name,
                custom_fields_values: (!fields.is_empty()).then_some(fields),
            });
        }
        draft
    }
}

/// First created lead in a `/leads` (`_embedded.leads`) or `/leads/complex` (bare array) reply.
fn created_lead(response: &Value) -> Option<Value> {
    let embedded: Vec<Value> = decode_embedded(response, "leads").unwrap_or_default();
    embedded.into_iter().next().or_else(|| response.as_array().and_then(|items| items.first().cloned()))
}

#[async_trait]
impl Tool for CreateLead {
    fn name(&self) -> &'static str {
        "kommo_create_lead"
    }

    fn description(&self) -> &'static str {
        "Creates a new lead, optionally with a contact (first/last name, phone, email) and a \
         company, in one request. Requires an active session. Give the contact's first name \
         whenever a phone is given. Use kommo_list_users for responsible_user_id."
    }

    fn input_schema(&self) -> Value {
        input_schema::<CreateParams>()
    }

    fn mutates(&self) -> bool {
        true
    }

    async fn execute(&self, params: Map<String, Value>, ctx: &ToolContext) -> Result<ToolOutput, ToolError> {
        let params: CreateParams = parse_params(params)?;
        authorize(&ctx.session, self.name(), MutationIntent::NewRecord)?;

        let draft = params.into_draft();
        let endpoint = draft.endpoint();
        let body = serde_json::to_value([&draft])
            .map_err(|error| ToolError::Rejected(format!("could not encode lead: {error}")))?;
        let response = ctx.crm.post(endpoint, &body).await?;

        let Some(lead) = created_lead(&response) else {
            return ToolOutput::new(format!("Lead \"{}\" submitted", draft.name), response);
        };
        let id = lead.get("id").cloned().unwrap_or(Value::Null);
        info!(event_name = "lead.created", endpoint, lead_id = %id, "lead created");
        let message = format!("Lead \"{}\" created with ID {id}", draft.name);
        ToolOutput::new(message.clone(), json!({ "success": true, "lead": lead, "message": message }))
    }
}

#[cfg(test)]
mod tests {
    use kommo_crm::HttpMethod;
    use serde_json::{json, Value};

    use crate::tools::test_support::harness;
    use crate::tools::{ToolError, ToolRegistry};

    fn lead(id: i64, contact_id: i64) -> Value {
        json!({
            "id": id,
            "name": format!("Lead {id}"),
            "price": 100,
            "status_id": 5,
            "pipeline_id": 1,
            "_embedded": { "contacts": [{ "id": contact_id, "is_main": true }] }
        })
    }

    fn contact(id: i64, phone: &str) -> Value {
        json!({
            "id": id,
            "name": format!("Contact {id}"),
            "first_name": "Ana",
            "custom_fields_values": [{
                "field_code": "PHONE",
                "values": [{ "value": phone, "enum_code": "WORK" }]
            }]
        })
    }

    #[tokio::test]
    async fn list_leads_builds_filters_and_attaches_main_contact() {
        let h = harness();
        h.crm
            .respond(HttpMethod::Get, "/leads", json!({ "_embedded": { "leads": [lead(1, 10), lead(2, 20)] } }))
            .respond(
                HttpMethod::Get,
                "/contacts",
                json!({ "_embedded": { "contacts": [contact(10, "+551100"), contact(20, "+552200")] } }),
            );
        let registry = ToolRegistry::with_default_tools();

        let result = registry
            .call("kommo_list_leads", &json!({ "status_id": 5, "created_at_from": 1700000000 }), &h.ctx)
            .await;

        assert!(!result.is_error, "{}", result.text);
        let data = result.data.unwrap_or_default();
        assert_eq!(data["total"], 2);
        assert_eq!(data["leads"][1]["contact_info"]["phone"], "+552200");

        let request = &h.crm.calls_to(HttpMethod::Get, "/leads")[0];
        assert_eq!(request.query_value("limit"), Some("10"));
        assert_eq!(request.query_value("with"), Some("contacts"));
        assert_eq!(request.query_value("filter[statuses][0][status_id]"), Some("5"));
        assert_eq!(request.query_value("filter[created_at][from]"), Some("1700000000"));
        let contacts = &h.crm.calls_to(HttpMethod::Get, "/contacts")[0];
        assert_eq!(contacts.query_value("id[0]"), Some("10"));
        assert_eq!(contacts.query_value("id[1]"), Some("20"));
    }

    #[tokio::test]
    async fn list_leads_summarizes_beyond_ten() {
        let h = harness();
        let leads: Vec<Value> = (1..=12).map(|id| lead(id, 100 + id)).collect();
        h.crm.respond(HttpMethod::Get, "/leads", json!({ "_embedded": { "leads": leads } }));
        h.crm.fail(HttpMethod::Get, "/contacts", 500);
        let registry = ToolRegistry::with_default_tools();

        let result = registry.call("kommo_list_leads", &json!({ "limit": 12 }), &h.ctx).await;

        assert!(!result.is_error, "{}", result.text);
        let data = result.data.unwrap_or_default();
        assert_eq!(data["total"], 12);
        assert_eq!(data["showing_details"], 10);
        assert_eq!(data["detailed_leads"].as_array().map(Vec::len), Some(10));
        assert_eq!(data["summary_leads"].as_array().map(Vec::len), Some(2));
        assert_eq!(data["summary_leads"][0]["id"], 11);
        assert!(data["summary_leads"][0].get("_embedded").is_none());
        assert_eq!(data["detailed_leads"][0]["contact_info"], Value::Null);
    }

    #[tokio::test]
    async fn lead_detail_degrades_failed_sub_fetches_to_empty_lists() {
        let h = harness();
        h.crm
            .respond(HttpMethod::Get, "/leads/7", lead(7, 70))
            .respond(HttpMethod::Get, "/contacts", json!({ "_embedded": { "contacts": [contact(70, "+5511")] } }))
            .respond(
                HttpMethod::Get,
                "/tasks",
                json!({ "_embedded": { "tasks": [
                    { "id": 1, "text": "Call", "is_completed": false },
                    { "id": 2, "text": "Mail", "is_completed": true, "result": { "text": "sent" } }
                ] } }),
            )
            .fail(HttpMethod::Get, "/leads/7/notes", 500)
            .fail(HttpMethod::Get, "/events", 403);
        let registry = ToolRegistry::with_default_tools();

        let result = registry.call("kommo_get_lead_by_id", &json!({ "lead_id": 7 }), &h.ctx).await;

        assert!(!result.is_error, "{}", result.text);
        let data = result.data.unwrap_or_default();
        assert_eq!(data["notes"], json!([]));
        assert_eq!(data["events"], json!([]));
        assert_eq!(data["tasks"][1]["result"], "sent");
        assert_eq!(data["summary"]["pending_tasks"], 1);
        assert_eq!(data["summary"]["main_contact"]["phone"], "+5511");
        assert_eq!(
            h.crm.calls_to(HttpMethod::Get, "/leads/7")[0].query_value("with"),
            Some("contacts,companies")
        );
        assert!(h.crm.calls_to(HttpMethod::Get, "/companies").is_empty());
    }

    #[tokio::test]
    async fn lead_detail_fails_when_the_lead_itself_fails() {
        let h = harness();
        h.crm.fail(HttpMethod::Get, "/leads/8", 404);
        let registry = ToolRegistry::with_default_tools();

        let result = registry.call("kommo_get_lead_by_id", &json!({ "lead_id": 8 }), &h.ctx).await;
        assert!(result.is_error);
        assert!(result.text.contains("Resource not found (404)"));
    }

    #[tokio::test]
    async fn phone_search_deduplicates_leads_across_contacts() {
        let h = harness();
        h.crm
            .respond(
                HttpMethod::Get,
                "/contacts",
                json!({ "_embedded": { "contacts": [contact(10, "+5511"), contact(20, "+5511")] } }),
            )
            .respond_when(HttpMethod::Get, "/leads", ("query", "10"), json!({ "_embedded": { "leads": [lead(1, 10)] } }))
            .respond_when(
                HttpMethod::Get,
                "/leads",
                ("query", "20"),
                json!({ "_embedded": { "leads": [lead(1, 10), lead(2, 99)] } }),
            );
        let registry = ToolRegistry::with_default_tools();

        let result = registry.call("kommo_search_leads_by_phone", &json!({ "phone": "+5511" }), &h.ctx).await;

        let data = result.data.unwrap_or_default();
        assert_eq!(data["total"], 2);
        assert_eq!(data["contacts_found"], 2);
        assert_eq!(data["leads"][0]["contact_info"]["id"], 10);
        assert!(data["leads"][1].get("contact_info").is_none());
    }

    #[tokio::test]
    async fn phone_search_without_contacts_returns_empty_result() {
        let h = harness();
        h.crm.respond(HttpMethod::Get, "/contacts", json!({}));
        let registry = ToolRegistry::with_default_tools();

        let result = registry.call("kommo_search_leads_by_phone", &json!({ "phone": "000" }), &h.ctx).await;
        assert!(!result.is_error);
        assert_eq!(result.data.unwrap_or_default()["total"], 0);
        assert!(h.crm.calls_to(HttpMethod::Get, "/leads").is_empty());
    }

    #[tokio::test]
    async fn lead_events_extract_message_info() {
        let h = harness();
        h.crm.respond(
            HttpMethod::Get,
            "/events",
            json!({ "_embedded": { "events": [{
                "id": "ev1",
                "type": "incoming_chat_message",
                "value_after": [{ "message": { "origin": "whatsapp", "talk_id": 55 } }]
            }] } }),
        );
        let registry = ToolRegistry::with_default_tools();

        let result = registry.call("kommo_get_lead_events", &json!({ "lead_id": 3 }), &h.ctx).await;

        let data = result.data.unwrap_or_default();
        assert_eq!(data["events"][0]["message_info"]["origin"], "whatsapp");
        let calls = h.crm.calls();
        let request = &calls[0];
        assert_eq!(request.query_value("filter[entity_id][]"), Some("3"));
        assert_eq!(request.query_value("limit"), Some("20"));
    }

    #[tokio::test]
    async fn update_without_session_is_rejected_before_any_write() {
        let h = harness();
        let registry = ToolRegistry::with_default_tools();

        let result = registry.call("kommo_update_lead", &json!({ "lead_id": 5, "price": 900 }), &h.ctx).await;

        assert!(result.is_error);
        assert_eq!(result.error_kind, Some("unauthorized"));
        assert!(h.crm.writes().is_empty());
    }

    #[tokio::test]
    async fn update_for_another_lead_is_rejected() {
        let h = harness();
        h.session.start(10, "Lead A", None);
        let registry = ToolRegistry::with_default_tools();

        let result = registry.call("kommo_update_lead", &json!({ "lead_id": 20, "price": 1 }), &h.ctx).await;

        assert_eq!(result.error_kind, Some("unauthorized"));
        assert!(h.crm.writes().is_empty());
    }

    #[tokio::test]
    async fn update_defaults_to_session_lead_and_patches_only_given_fields() {
        let h = harness();
        h.session.start(10, "Lead A", None);
        h.crm.respond(HttpMethod::Patch, "/leads/10", json!({ "id": 10 }));
        let registry = ToolRegistry::with_default_tools();

        let result = registry
            .call(
                "kommo_update_lead",
                &json!({
                    "price": 1500.5,
                    "custom_fields_values": [{ "field_id": 99, "values": [{ "value": "blue", "enum_id": 3 }] }],
                    "tags": [{ "name": "vip" }]
                }),
                &h.ctx,
            )
            .await;

        assert!(!result.is_error, "{}", result.text);
        assert!(result.text.starts_with("Lead \"Lead A\" updated"));
        let writes = h.crm.writes();
        assert_eq!(writes.len(), 1);
        assert_eq!(
            writes[0].body,
            Some(json!({
                "price": 1500.5,
                "custom_fields_values": [{ "field_id": 99, "values": [{ "value": "blue", "enum_id": 3 }] }],
                "_embedded": { "tags": [{ "name": "vip" }] }
            }))
        );
    }

    #[tokio::test]
    async fn empty_update_is_a_validation_error() {
        let h = harness();
        h.session.start(10, "Lead A", None);
        let registry = ToolRegistry::with_default_tools();

        let error = registry.dispatch("kommo_update_lead", &json!({ "lead_id": 10 }), &h.ctx).await.err();
        let Some(ToolError::Validation(violations)) = error else {
            panic!("expected a validation error");
        };
        assert_eq!(violations[0].field, "arguments");
        assert!(violations[0].constraint.starts_with("nothing to update"));

        let result = registry.call("kommo_update_lead", &json!({}), &h.ctx).await;
        assert_eq!(result.error_kind, Some("validation"));
        assert!(h.crm.writes().is_empty());
    }

    #[tokio::test]
    async fn nested_update_fields_are_validated_by_path() {
        let h = harness();
        h.session.start(10, "Lead A", None);
        let registry = ToolRegistry::with_default_tools();

        let result = registry
            .call(
                "kommo_update_lead",
                &json!({
                    "custom_fields_values": [{ "field_id": 0, "values": [{ "value": ["x"] }] }],
                    "tags": [{ "name": "" }]
                }),
                &h.ctx,
            )
            .await;

        assert_eq!(result.error_kind, Some("validation"));
        assert!(result.text.contains("custom_fields_values[0].field_id: must be >= 1"), "{}", result.text);
        assert!(result.text.contains("custom_fields_values[0].values[0].value: must be a string"));
        assert!(result.text.contains("tags[0].name: must be at least 1 characters"));
        assert!(h.crm.calls().is_empty());
    }

    #[tokio::test]
    async fn session_lifecycle_gates_lead_writes() {
        let h = harness();
        h.crm.respond(HttpMethod::Get, "/leads", json!({ "_embedded": { "leads": [lead(42, 0)] } }));
        h.crm.respond(HttpMethod::Patch, "/leads/42", json!({ "id": 42 }));
        let registry = ToolRegistry::with_default_tools();
        let update = json!({ "lead_id": 42, "price": 700 });

        let started = registry.call("kommo_start_session", &json!({ "lead_id": 42 }), &h.ctx).await;
        assert!(!started.is_error, "{}", started.text);

        let first = registry.call("kommo_update_lead", &update, &h.ctx).await;
        assert!(!first.is_error, "{}", first.text);

        let ended = registry.call("kommo_end_session", &json!({}), &h.ctx).await;
        assert!(!ended.is_error, "{}", ended.text);

        let second = registry.call("kommo_update_lead", &update, &h.ctx).await;
        assert!(second.is_error);
        assert_eq!(second.error_kind, Some("unauthorized"));

        let writes = h.crm.writes();
        assert_eq!(writes.len(), 1);
        assert_eq!(writes[0].endpoint, "/leads/42");
    }

    #[tokio::test]
    async fn create_requires_an_active_session() {
        let h = harness();
        let registry = ToolRegistry::with_default_tools();

        let result = registry.call("kommo_create_lead", &json!({ "name": "New deal" }), &h.ctx).await;
        assert_eq!(result.error_kind, Some("unauthorized"));
        assert!(h.crm.writes().is_empty());
    }

    #[tokio::test]
    async fn create_with_contact_uses_complex_endpoint() {
        let h = harness();
        h.session.start(1, "Current", None);
        h.crm.respond(HttpMethod::Post, "/leads/complex", json!([{ "id": 501, "contact_id": 9 }]));
        let registry = ToolRegistry::with_default_tools();

        let result = registry
            .call(
                "kommo_create_lead",
                &json!({
                    "name": "Proposal X",
                    "contact_first_name": "Joao",
                    "contact_phone": "+5511999999999",
                    "company_name": "Acme"
                }),
                &h.ctx,
            )
            .await;

        assert!(!result.is_error, "{}", result.text);
        assert!(result.text.starts_with("Lead \"Proposal X\" created with ID 501"));
        let body = h.crm.writes()[0].body.clone().unwrap_or_default();
        assert_eq!(body[0]["_embedded"]["contacts"][0]["name"], "Joao");
        assert_eq!(
            body[0]["_embedded"]["contacts"][0]["custom_fields_values"][0],
            json!({ "field_code": "PHONE", "values": [{ "value": "+5511999999999", "enum_code": "WORK" }] })
        );
        assert_eq!(body[0]["_embedded"]["companies"][0]["name"], "Acme");
    }

    #[tokio::test]
    async fn create_without_contact_posts_plain_lead() {
        let h = harness();
        h.session.start(1, "Current", None);
        h.crm.respond(HttpMethod::Post, "/leads", json!({ "_embedded": { "leads": [{ "id": 77 }] } }));
        let registry = ToolRegistry::with_default_tools();

        let result =
            registry.call("kommo_create_lead", &json!({ "name": "Bare", "price": 10 }), &h.ctx).await;

        assert!(!result.is_error, "{}", result.text);
        let data = result.data.unwrap_or_default();
        assert_eq!(data["lead"]["id"], 77);
        assert_eq!(h.crm.writes()[0].body, Some(json!([{ "name": "Bare", "price": 10.0 }])));
    }
}
