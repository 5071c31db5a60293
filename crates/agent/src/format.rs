//! Text rendering of tool outcomes for the single text content block.

use serde_json::Value;

use crate::tools::ToolError;

/// `"<message>\n\n<pretty json>"`, or just the JSON when there is no message.
pub fn success_text(message: &str, data: &Value) -> String {
    let body = serde_json::to_string_pretty(data).unwrap_or_else(|_| data.to_string());
    if message.is_empty() {
        body
    } else {
        format!("{message}\n\n{body}")
    }
}

pub fn error_text(error: &ToolError) -> String {
    format!("Error: {}", error.user_message())
}

#[cfg(test)]
mod tests {
    use kommo_crm::CrmError;
    use serde_json::json;

    use super::{error_text, success_text};
    use crate::tools::ToolError;

    #[test]
    fn success_text_puts_message_above_pretty_json() {
        let text = success_text("Lead updated", &json!({ "id": 5 }));
        assert_eq!(text, "Lead updated\n\n{\n  \"id\": 5\n}");
        assert_eq!(success_text("", &json!([])), "[]");
    }

    #[test]
    fn error_text_carries_upstream_suggestion() {
        let text = error_text(&ToolError::Upstream(CrmError::from_status(429, None)));
        assert!(text.starts_with("Error: Rate limit exceeded (429)"));
        assert!(text.ends_with("Suggestion: Wait a few seconds before trying again."));

        let text = error_text(&ToolError::Unauthorized("no active session".to_string()));
        assert_eq!(text, "Error: no active session");
    }
}
