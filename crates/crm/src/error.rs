use thiserror::Error;

#[derive(Debug, Error)]
pub enum CrmError {
    #[error("{}", status_text(.status, .message, .detail))]
    Status { status: u16, message: String, detail: Option<String>, suggestion: Option<&'static str> },
    #[error("timeout: the request took longer than {timeout_secs} seconds")]
    Timeout { timeout_secs: u64 },
    #[error("connection error: could not reach {host}")]
    Connect { host: String },
    #[error("network error: {0}")]
    Transport(String),
    #[error("could not decode CRM response: {0}")]
    Decode(String),
    #[error("spreadsheet request failed: {status} - {body}")]
    Sheets { status: u16, body: String },
    #[error("invalid CRM client configuration: {0}")]
    Configuration(String),
}

fn status_text(status: &u16, message: &str, detail: &Option<String>) -> String {
    match detail.as_deref().filter(|detail| !detail.is_empty()) {
        Some(detail) => format!("{message} ({status}): {detail}"),
        None => format!("{message} ({status})"),
    }
}

struct StatusCopy {
    message: &'static str,
    suggestion: &'static str,
}

fn status_copy(status: u16) -> Option<StatusCopy> {
    let (message, suggestion) = match status {
        400 => ("Invalid request", "Check that the parameters are correct. IDs must be positive numbers."),
        401 => ("Unauthorized", "The access token expired or is invalid. Generate a new token in Kommo."),
        403 => ("Access denied", "The user lacks permission for this operation. Check the user's permissions in Kommo."),
        404 => ("Resource not found", "The given ID does not exist. Use kommo_list_leads to see valid IDs."),
        422 => ("Invalid data", "The submitted data is not valid. Check required fields and formats."),
        429 => ("Rate limit exceeded", "Wait a few seconds before trying again."),
        500 => ("Kommo internal server error", "Temporary problem. Try again in a few seconds."),
        502 => ("Kommo server unavailable", "Temporary problem. Try again in a few seconds."),
        503 => ("Kommo service under maintenance", "Wait a few minutes and try again."),
        504 => ("Kommo API timeout", "The request took too long. Try again or request less data."),
        _ => return None,
    };
    Some(StatusCopy { message, suggestion })
}

impl CrmError {
    /// Builds the error for a non-success HTTP status. `detail` comes from the API's
    /// `detail` or `title` field.
    pub fn from_status(status: u16, detail: Option<String>) -> Self {
        match status_copy(status) {
            Some(copy) => Self::Status {
                status,
                message: copy.message.to_string(),
                detail,
                suggestion: Some(copy.suggestion),
            },
            None => Self::Status {
                status,
                message: "HTTP error".to_string(),
                detail,
                suggestion: None,
            },
        }
    }

    pub fn status(&self) -> Option<u16> {
        match self {
            Self::Status { status, .. } | Self::Sheets { status, .. } => Some(*status),
            _ => None,
        }
    }

    pub fn suggestion(&self) -> Option<&'static str> {
        match self {
            Self::Status { suggestion, .. } => *suggestion,
            Self::Timeout { .. } => Some("Try again or request less data."),
            Self::Connect { .. } => Some("Check the network connection to Kommo."),
            _ => None,
        }
    }

    /// Message plus suggestion, as shown to the agent.
    pub fn user_message(&self) -> String {
        match self.suggestion() {
            Some(suggestion) => format!("{self}\nSuggestion: {suggestion}"),
            None => self.to_string(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::CrmError;

    #[test]
    fn known_status_carries_message_detail_and_suggestion() {
        let error = CrmError::from_status(422, Some("price must be a number".to_string()));
        assert_eq!(error.to_string(), "Invalid data (422): price must be a number");
        assert_eq!(error.status(), Some(422));
        assert!(error.user_message().contains("\nSuggestion: "));
    }

    #[test]
    fn unknown_status_falls_back_to_generic_text() {
        let error = CrmError::from_status(418, None);
        assert_eq!(error.to_string(), "HTTP error (418)");
        assert_eq!(error.suggestion(), None);
        assert_eq!(error.user_message(), "HTTP error (418)");
    }

    #[test]
    fn not_found_points_at_lead_listing() {
        let error = CrmError::from_status(404, Some(String::new()));
        assert_eq!(error.to_string(), "Resource not found (404)");
        assert!(error.suggestion().unwrap_or_default().contains("kommo_list_leads"));
    }
}
