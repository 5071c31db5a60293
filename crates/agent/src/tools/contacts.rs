use async_trait::async_trait;
use kommo_core::domain::fields::{email_field, phone_field};
use kommo_core::domain::Contact;
use kommo_crm::{fetch_list, Query};
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};
use serde_json::{json, Map, Value};

use super::{parse_params, Tool, ToolContext, ToolError, ToolOutput, ToolRegistry};
use crate::schema::input_schema;

pub fn register(registry: &mut ToolRegistry) {
    registry.register(ListContacts);
}

pub struct ListContacts;

fn default_limit() -> u32 {
    50
}

fn first_page() -> u32 {
    1
}

#[derive(Debug, Deserialize, JsonSchema)]
struct ListParams {
    #[schemars(description = "Free text search", length(min = 1))]
    query: Option<String>,
    #[serde(default = "default_limit")]
    #[schemars(description = "Page size (max 250)", range(min = 1, max = 250))]
    limit: u32,
    #[serde(default = "first_page")]
    #[schemars(description = "Page number", range(min = 1))]
    page: u32,
}

#[derive(Debug, Serialize)]
struct ContactRow {
    id: i64,
    name: String,
    first_name: Option<String>,
    last_name: Option<String>,
    phones: Vec<String>,
    emails: Vec<String>,
    created_at: Option<i64>,
    updated_at: Option<i64>,
}

impl From<Contact> for ContactRow {
    fn from(contact: Contact) -> Self {
        let phones = phone_field(contact.fields()).map(|field| field.texts()).unwrap_or_default();
        let emails = email_field(contact.fields()).map(|field| field.texts()).unwrap_or_default();
        Self {
            id: contact.id,
            name: contact.name,
            first_name: contact.first_name,
            last_name: contact.last_name,
            phones,
            emails,
            created_at: contact.created_at,
            updated_at: contact.updated_at,
        }
    }
}

#[async_trait]
impl Tool for ListContacts {
    fn name(&self) -> &'static str {
        "kommo_list_contacts"
    }

    fn description(&self) -> &'static str {
        "Lists contacts with their phones and emails. query searches names, phones and emails."
    }

    fn input_schema(&self) -> Value {
        input_schema::<ListParams>()
    }

    async fn execute(&self, params: Map<String, Value>, ctx: &ToolContext) -> Result<ToolOutput, ToolError> {
        let params: ListParams = parse_params(params)?;
        let query = Query::new()
            .param("limit", params.limit)
            .param("page", params.page)
            .opt("query", params.query.as_deref());

        let contacts: Vec<Contact> = fetch_list(ctx.crm.as_ref(), "/contacts", &query, "contacts").await?;
        let rows: Vec<ContactRow> = contacts.into_iter().map(ContactRow::from).collect();

        ToolOutput::new(
            format!("{} contact(s) found", rows.len()),
            json!({ "total": rows.len(), "contacts": rows }),
        )
    }
}
