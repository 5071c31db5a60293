use serde::{Deserialize, Serialize};

#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct Pipeline {
    pub id: i64,
    #[serde(default)]
    pub name: String,
    #[serde(default)]
    pub sort: i64,
    #[serde(default)]
    pub is_main: bool,
    #[serde(default)]
    pub is_unsorted_on: bool,
    #[serde(default)]
    pub is_archive: bool,
    #[serde(rename = "_embedded", default)]
    pub embedded: PipelineEmbedded,
}

#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct PipelineEmbedded {
    #[serde(default)]
    pub statuses: Vec<Stage>,
}

#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct Stage {
    pub id: i64,
    #[serde(default)]
    pub name: String,
    #[serde(default)]
    pub sort: i64,
    #[serde(default)]
    pub is_editable: bool,
    #[serde(default)]
    pub pipeline_id: Option<i64>,
    #[serde(default)]
    pub color: Option<String>,
    #[serde(rename = "type", default)]
    pub stage_type: i64,
}

impl Pipeline {
    pub fn stages(&self) -> &[Stage] {
        &self.embedded.statuses
    }
}

impl Stage {
    pub fn kind(&self) -> &'static str {
        if self.stage_type == 0 {
            "regular"
        } else {
            "incoming_leads"
        }
    }
}

#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct CustomFieldDefinition {
    pub id: i64,
    #[serde(default)]
    pub name: String,
    #[serde(rename = "type", default)]
    pub field_type: String,
    #[serde(default)]
    pub code: Option<String>,
    #[serde(default)]
    pub sort: Option<i64>,
    #[serde(default)]
    pub entity_type: Option<String>,
    #[serde(default)]
    pub is_required: bool,
    #[serde(default)]
    pub is_predefined: bool,
    #[serde(default)]
    pub is_deletable: bool,
    #[serde(default)]
    pub is_api_only: bool,
    #[serde(default)]
    pub group_id: Option<String>,
    #[serde(default)]
    pub enums: Option<Vec<FieldEnum>>,
    #[serde(default)]
    pub required_statuses: Option<Vec<RequiredStatus>>,
}

#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct FieldEnum {
    pub id: i64,
    pub value: String,
    #[serde(default)]
    pub sort: Option<i64>,
}

#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct RequiredStatus {
    pub status_id: i64,
    pub pipeline_id: i64,
}
