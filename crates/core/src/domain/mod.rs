//! Wire types for the CRM REST API (`/api/v4`).
//!
//! List endpoints wrap their items in a HAL style `_embedded` object keyed by
//! resource name; [`embedded`] unwraps one of those lists.

pub mod activity;
pub mod contact;
pub mod fields;
pub mod lead;
pub mod pipeline;
pub mod user;

use serde::de::DeserializeOwned;
use serde_json::Value;

pub use activity::{Event, NewNote, NewTask, Note, NoteType, Task, TaskType};
pub use contact::{Company, Contact, ContactInfo, NewCompany, NewContact};
pub use fields::{CustomFieldValue, CustomFieldValueItem};
pub use lead::{EmbeddedRef, Lead, LeadDraft, LeadUpdate, TagRef};
pub use pipeline::{CustomFieldDefinition, Pipeline, Stage};
pub use user::User;

/// Reads `payload._embedded.<key>` as a list. A missing key yields an empty list.
pub fn embedded<T>(payload: &Value, key: &str) -> Result<Vec<T>, serde_json::Error>
where
    T: DeserializeOwned,
{
    match payload.get("_embedded").and_then(|embedded| embedded.get(key)) {
        Some(items) if !items.is_null() => serde_json::from_value(items.clone()),
        _ => Ok(Vec::new()),
    }
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::{embedded, Lead};

    #[test]
    fn embedded_reads_list_under_resource_key() {
        let payload = json!({
            "_page": 2,
            "_embedded": { "leads": [{ "id": 1, "name": "Acme" }, { "id": 2, "name": "Globex" }] }
        });

        let leads: Vec<Lead> = embedded(&payload, "leads").expect("leads should decode");
        assert_eq!(leads.len(), 2);
        assert_eq!(leads[1].name, "Globex");
    }

    #[test]
    fn embedded_tolerates_missing_envelope() {
        let leads: Vec<Lead> = embedded(&json!({}), "leads").expect("empty payload is fine");
        assert!(leads.is_empty());

        let leads: Vec<Lead> =
            embedded(&json!({ "_embedded": { "leads": null } }), "leads").expect("null is empty");
        assert!(leads.is_empty());
    }
}
