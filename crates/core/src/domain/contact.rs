use serde::{Deserialize, Serialize};

use super::fields::{first_email, first_phone, CustomFieldValue};
use super::lead::EmbeddedRef;

#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct Contact {
    pub id: i64,
    #[serde(default)]
    pub name: String,
    #[serde(default)]
    pub first_name: Option<String>,
    #[serde(default)]
    pub last_name: Option<String>,
    #[serde(default)]
    pub responsible_user_id: Option<i64>,
    #[serde(default)]
    pub created_at: Option<i64>,
    #[serde(default)]
    pub updated_at: Option<i64>,
    #[serde(default)]
    pub custom_fields_values: Option<Vec<CustomFieldValue>>,
    #[serde(rename = "_embedded", default, skip_serializing_if = "Option::is_none")]
    pub embedded: Option<ContactEmbedded>,
}

#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct ContactEmbedded {
    #[serde(default)]
    pub leads: Vec<EmbeddedRef>,
    #[serde(default)]
    pub companies: Vec<EmbeddedRef>,
}

impl Contact {
    pub fn fields(&self) -> &[CustomFieldValue] {
        self.custom_fields_values.as_deref().unwrap_or_default()
    }

    pub fn phone(&self) -> Option<String> {
        first_phone(self.fields())
    }

    pub fn email(&self) -> Option<String> {
        first_email(self.fields())
    }

    pub fn lead_ids(&self) -> Vec<i64> {
        self.embedded
            .as_ref()
            .map(|embedded| embedded.leads.iter().map(|lead| lead.id).collect())
            .unwrap_or_default()
    }

    pub fn info(&self) -> ContactInfo {
        ContactInfo {
            id: self.id,
            name: self.name.clone(),
            first_name: self.first_name.clone(),
            last_name: self.last_name.clone(),
            phone: self.phone(),
        }
    }
}

/// Short contact summary attached to leads in list responses.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct ContactInfo {
    pub id: i64,
    pub name: String,
    pub first_name: Option<String>,
    pub last_name: Option<String>,
    pub phone: Option<String>,
}

#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct Company {
    pub id: i64,
    #[serde(default)]
    pub name: String,
    #[serde(default)]
    pub custom_fields_values: Option<Vec<CustomFieldValue>>,
}

#[derive(Clone, Debug, Default, PartialEq, Serialize)]
pub struct NewContact {
    pub first_name: String,
    pub last_name: String,
    pub name: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub custom_fields_values: Option<Vec<CustomFieldValue>>,
}

impl NewContact {
    pub fn named(first_name: &str, last_name: Option<&str>) -> Self {
        let name = match (first_name.trim(), last_name.map(str::trim)) {
            ("", None) | ("", Some("")) => "Contact".to_string(),
            (first, None) | (first, Some("")) => first.to_string(),
            ("", Some(last)) => last.to_string(),
            (first, Some(last)) => format!("{first} {last}"),
        };
        Self {
            first_name: first_name.to_string(),
            last_name: last_name.unwrap_or_default().to_string(),
            name,
            custom_fields_values: None,
        }
    }

    pub fn with_fields(mut self, fields: Vec<CustomFieldValue>) -> Self {
        self.custom_fields_values = (!fields.is_empty()).then_some(fields);
        self
    }
}

#[derive(Clone, Debug, Default, PartialEq, Serialize)]
pub struct NewCompany {
    pub name: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub custom_fields_values: Option<Vec<CustomFieldValue>>,
}
