use serde::{Deserialize, Serialize};
use serde_json::Value;

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum NoteType {
    #[default]
    Common,
    CallIn,
    CallOut,
    ServiceMessage,
    MessageCashier,
    SmsIn,
    SmsOut,
}

impl NoteType {
    pub const ALL: [NoteType; 7] = [
        Self::Common,
        Self::CallIn,
        Self::CallOut,
        Self::ServiceMessage,
        Self::MessageCashier,
        Self::SmsIn,
        Self::SmsOut,
    ];

    pub fn as_str(self) -> &'static str {
        match self {
            Self::Common => "common",
            Self::CallIn => "call_in",
            Self::CallOut => "call_out",
            Self::ServiceMessage => "service_message",
            Self::MessageCashier => "message_cashier",
            Self::SmsIn => "sms_in",
            Self::SmsOut => "sms_out",
        }
    }
}

impl std::str::FromStr for NoteType {
    type Err = String;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        Self::ALL
            .into_iter()
            .find(|note_type| note_type.as_str() == value)
            .ok_or_else(|| format!("unknown note type `{value}`"))
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum TaskType {
    Call,
    Meeting,
    Email,
}

impl TaskType {
    pub fn from_id(id: i64) -> Option<Self> {
        match id {
            1 => Some(Self::Call),
            2 => Some(Self::Meeting),
            3 => Some(Self::Email),
            _ => None,
        }
    }

    pub fn id(self) -> i64 {
        match self {
            Self::Call => 1,
            Self::Meeting => 2,
            Self::Email => 3,
        }
    }

    pub fn label(self) -> &'static str {
        match self {
            Self::Call => "Call",
            Self::Meeting => "Meeting",
            Self::Email => "Email",
        }
    }
}

#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct Note {
    pub id: i64,
    #[serde(default)]
    pub entity_id: Option<i64>,
    #[serde(default)]
    pub note_type: String,
    #[serde(default)]
    pub params: Value,
    #[serde(default)]
    pub created_at: Option<i64>,
    #[serde(default)]
    pub created_by: Option<i64>,
}

impl Note {
    pub fn text(&self) -> Option<&str> {
        self.params.get("text").and_then(Value::as_str)
    }
}

#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct NewNote {
    pub entity_id: i64,
    pub note_type: NoteType,
    pub params: NoteParams,
}

#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct NoteParams {
    pub text: String,
}

impl NewNote {
    pub fn new(entity_id: i64, note_type: NoteType, text: impl Into<String>) -> Self {
        Self { entity_id, note_type, params: NoteParams { text: text.into() } }
    }
}

#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct Task {
    pub id: i64,
    #[serde(default)]
    pub text: String,
    #[serde(default)]
    pub is_completed: bool,
    #[serde(default)]
    pub complete_till: Option<i64>,
    #[serde(default)]
    pub task_type_id: Option<i64>,
    #[serde(default)]
    pub responsible_user_id: Option<i64>,
    #[serde(default)]
    pub entity_id: Option<i64>,
    #[serde(default)]
    pub entity_type: Option<String>,
    #[serde(default)]
    pub result: Option<TaskResult>,
    #[serde(default)]
    pub created_at: Option<i64>,
}

#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct TaskResult {
    #[serde(default)]
    pub text: Option<String>,
}

#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct NewTask {
    pub task_type_id: i64,
    pub text: String,
    pub complete_till: i64,
    pub entity_id: i64,
    pub entity_type: &'static str,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub responsible_user_id: Option<i64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub request_id: Option<String>,
}

impl NewTask {
    pub fn for_lead(lead_id: i64, task_type: TaskType, text: String, complete_till: i64) -> Self {
        Self {
            task_type_id: task_type.id(),
            text,
            complete_till,
            entity_id: lead_id,
            entity_type: "leads",
            responsible_user_id: None,
            request_id: None,
        }
    }
}

#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct Event {
    pub id: String,
    #[serde(rename = "type", default)]
    pub event_type: String,
    #[serde(default)]
    pub entity_id: Option<i64>,
    #[serde(default)]
    pub entity_type: Option<String>,
    #[serde(default)]
    pub created_by: Option<i64>,
    #[serde(default)]
    pub created_at: Option<i64>,
    #[serde(default)]
    pub value_after: Vec<Value>,
    #[serde(default)]
    pub value_before: Vec<Value>,
}

impl Event {
    /// Origin and talk id of a chat message event, when the event carries one.
    pub fn message_info(&self) -> Option<Value> {
        let message = self.value_after.first()?.get("message")?;
        Some(serde_json::json!({
            "origin": message.get("origin").cloned().unwrap_or(Value::Null),
            "talk_id": message.get("talk_id").cloned().unwrap_or(Value::Null),
        }))
    }
}
