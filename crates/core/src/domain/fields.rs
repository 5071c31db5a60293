use serde::{Deserialize, Serialize};
use serde_json::Value;

#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct CustomFieldValue {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub field_id: Option<i64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub field_name: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub field_code: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub field_type: Option<String>,
    #[serde(default)]
    pub values: Vec<CustomFieldValueItem>,
}

#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct CustomFieldValueItem {
    pub value: Value,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub enum_id: Option<i64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub enum_code: Option<String>,
}

impl CustomFieldValue {
    /// A `field_code` keyed value with a single `WORK` entry, as used for contact phones and emails.
    pub fn work_entry(field_code: &str, value: impl Into<String>) -> Self {
        Self {
            field_code: Some(field_code.to_string()),
            values: vec![CustomFieldValueItem {
                value: Value::String(value.into()),
                enum_code: Some("WORK".to_string()),
                ..CustomFieldValueItem::default()
            }],
            ..Self::default()
        }
    }

    pub fn texts(&self) -> Vec<String> {
        self.values.iter().map(|item| value_text(&item.value)).collect()
    }

    fn is_phone(&self) -> bool {
        self.field_code.as_deref() == Some("PHONE") || self.field_type.as_deref() == Some("multitext")
    }

    fn is_email(&self) -> bool {
        self.field_code.as_deref() == Some("EMAIL")
    }
}

pub fn phone_field(fields: &[CustomFieldValue]) -> Option<&CustomFieldValue> {
    fields.iter().find(|field| field.is_phone())
}

pub fn email_field(fields: &[CustomFieldValue]) -> Option<&CustomFieldValue> {
    fields.iter().find(|field| field.is_email())
}

pub fn first_phone(fields: &[CustomFieldValue]) -> Option<String> {
    phone_field(fields).and_then(|field| field.texts().into_iter().next())
}

pub fn first_email(fields: &[CustomFieldValue]) -> Option<String> {
    email_field(fields).and_then(|field| field.texts().into_iter().next())
}

fn value_text(value: &Value) -> String {
    match value {
        Value::String(text) => text.clone(),
        other => other.to_string(),
    }
}
