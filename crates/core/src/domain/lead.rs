use serde::{Deserialize, Serialize};

use super::contact::{NewCompany, NewContact};
use super::fields::CustomFieldValue;

#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct Lead {
    pub id: i64,
    #[serde(default)]
    pub name: String,
    #[serde(default)]
    pub price: Option<f64>,
    #[serde(default)]
    pub responsible_user_id: Option<i64>,
    #[serde(default)]
    pub group_id: Option<i64>,
    #[serde(default)]
    pub status_id: Option<i64>,
    #[serde(default)]
    pub pipeline_id: Option<i64>,
    #[serde(default)]
    pub loss_reason_id: Option<i64>,
    #[serde(default)]
    pub created_by: Option<i64>,
    #[serde(default)]
    pub updated_by: Option<i64>,
    #[serde(default)]
    pub created_at: Option<i64>,
    #[serde(default)]
    pub updated_at: Option<i64>,
    #[serde(default)]
    pub closed_at: Option<i64>,
    #[serde(default)]
    pub closest_task_at: Option<i64>,
    #[serde(default)]
    pub is_deleted: Option<bool>,
    #[serde(default)]
    pub custom_fields_values: Option<Vec<CustomFieldValue>>,
    #[serde(default)]
    pub score: Option<f64>,
    #[serde(default)]
    pub account_id: Option<i64>,
    #[serde(rename = "_embedded", default, skip_serializing_if = "Option::is_none")]
    pub embedded: Option<LeadEmbedded>,
}

#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct LeadEmbedded {
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub tags: Vec<TagRef>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub contacts: Vec<EmbeddedRef>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub companies: Vec<EmbeddedRef>,
}

/// Link from one record to another inside an `_embedded` block.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct EmbeddedRef {
    pub id: i64,
    #[serde(default)]
    pub is_main: bool,
}

#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct TagRef {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub id: Option<i64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
}

impl Lead {
    pub fn contact_refs(&self) -> &[EmbeddedRef] {
        self.embedded.as_ref().map(|embedded| embedded.contacts.as_slice()).unwrap_or_default()
    }

    pub fn company_refs(&self) -> &[EmbeddedRef] {
        self.embedded.as_ref().map(|embedded| embedded.companies.as_slice()).unwrap_or_default()
    }

    pub fn tags(&self) -> &[TagRef] {
        self.embedded.as_ref().map(|embedded| embedded.tags.as_slice()).unwrap_or_default()
    }

    pub fn main_contact_id(&self) -> Option<i64> {
        self.contact_refs().iter().find(|contact| contact.is_main).map(|contact| contact.id)
    }
}

/// Body of `PATCH /leads/{id}`. Unset fields are left untouched upstream.
#[derive(Clone, Debug, Default, PartialEq, Serialize)]
pub struct LeadUpdate {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub price: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub status_id: Option<i64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub pipeline_id: Option<i64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub responsible_user_id: Option<i64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub loss_reason_id: Option<i64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub custom_fields_values: Option<Vec<CustomFieldValue>>,
    #[serde(rename = "_embedded", skip_serializing_if = "Option::is_none")]
    pub embedded: Option<TagsEmbedded>,
}

#[derive(Clone, Debug, Default, PartialEq, Serialize)]
pub struct TagsEmbedded {
    pub tags: Vec<TagRef>,
}

impl LeadUpdate {
    pub fn is_empty(&self) -> bool {
        *self == Self::default()
    }

    /// Names of the fields this update sets, for logging.
    pub fn changed_fields(&self) -> Vec<&'static str> {
        let mut fields = Vec::new();
        if self.name.is_some() {
            fields.push("name");
        }
        if self.price.is_some() {
            fields.push("price");
        }
        if self.status_id.is_some() {
            fields.push("status_id");
        }
        if self.pipeline_id.is_some() {
            fields.push("pipeline_id");
        }
        if self.responsible_user_id.is_some() {
            fields.push("responsible_user_id");
        }
        if self.loss_reason_id.is_some() {
            fields.push("loss_reason_id");
        }
        if self.custom_fields_values.is_some() {
            fields.push("custom_fields_values");
        }
        if self.embedded.is_some() {
            fields.push("tags");
        }
        fields
    }
}

/// One element of the `POST /leads` or `POST /leads/complex` body.
#[derive(Clone, Debug, Default, PartialEq, Serialize)]
pub struct LeadDraft {
    pub name: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub price: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub status_id: Option<i64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub pipeline_id: Option<i64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub responsible_user_id: Option<i64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub custom_fields_values: Option<Vec<CustomFieldValue>>,
    #[serde(rename = "_embedded", skip_serializing_if = "LeadDraftEmbedded::is_empty")]
    pub embedded: LeadDraftEmbedded,
}

#[derive(Clone, Debug, Default, PartialEq, Serialize)]
pub struct LeadDraftEmbedded {
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub contacts: Vec<NewContact>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub companies: Vec<NewCompany>,
}

impl LeadDraftEmbedded {
    pub fn is_empty(&self) -> bool {
        self.contacts.is_empty() && self.companies.is_empty()
    }
}

impl LeadDraft {
    /// Leads carrying a contact or company must go through the complex endpoint.
    pub fn endpoint(&self) -> &'static str {
        if self.embedded.is_empty() {
            "/leads"
        } else {
            "/leads/complex"
        }
    }
}
