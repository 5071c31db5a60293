//! Session guardrails for mutating tools.
//!
//! A mutation is allowed only against the lead the operator opened with
//! `kommo_start_session`. The check and the upstream write are not atomic; a
//! concurrent session switch between them is accepted.

use kommo_core::SessionGuard;
use tracing::warn;

use crate::tools::ToolError;

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum MutationIntent {
    /// Write to an existing lead. `None` means the active lead.
    ExistingLead { requested: Option<i64> },
    /// Create a new record; requires an open session but names no lead.
    NewRecord,
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub enum GuardrailDecision {
    /// `lead_id` is the authorized target, absent for new records.
    Allow { lead_id: Option<i64> },
    Deny { reason_code: &'static str, user_message: String, fallback_path: &'static str },
}

pub fn evaluate(session: &SessionGuard, intent: MutationIntent) -> GuardrailDecision {
    let active = session.active_subject_id();
    match (intent, active) {
        (_, None) => GuardrailDecision::Deny {
            reason_code: "no_active_session",
            user_message: "No active session. Use kommo_start_session to open the lead first."
                .to_string(),
            fallback_path: "kommo_start_session",
        },
        (MutationIntent::NewRecord, Some(_)) => GuardrailDecision::Allow { lead_id: None },
        (MutationIntent::ExistingLead { requested: None }, Some(active)) => {
            GuardrailDecision::Allow { lead_id: Some(active) }
        }
        (MutationIntent::ExistingLead { requested: Some(requested) }, Some(active)) => {
            if session.is_authorized(requested) {
                GuardrailDecision::Allow { lead_id: Some(requested) }
            } else {
                GuardrailDecision::Deny {
                    reason_code: "session_subject_mismatch",
                    user_message: format!(
                        "Lead {requested} is not the lead in the active session ({active}). \
                         End the session and start one for lead {requested} first."
                    ),
                    fallback_path: "kommo_end_session",
                }
            }
        }
    }
}

/// Evaluates `intent` for `tool` and turns a denial into [`ToolError::Unauthorized`].
pub fn authorize(session: &SessionGuard, tool: &str, intent: MutationIntent) -> Result<Option<i64>, ToolError> {
    match evaluate(session, intent) {
        GuardrailDecision::Allow { lead_id } => Ok(lead_id),
        GuardrailDecision::Deny { reason_code, user_message, fallback_path } => {
            warn!(
                event_name = "guardrail.denied",
                tool,
                reason_code,
                fallback_path,
                "mutation rejected by session guard"
            );
            Err(ToolError::Unauthorized(user_message))
        }
    }
}

/// Authorized lead id for a write to an existing lead.
pub fn authorize_lead(session: &SessionGuard, tool: &str, requested: Option<i64>) -> Result<i64, ToolError> {
    authorize(session, tool, MutationIntent::ExistingLead { requested })?
        .ok_or_else(|| ToolError::Unauthorized("No active session.".to_string()))
}
