//! Single-slot session guard.
//!
//! The guard records which CRM lead is currently "checked out" by the operator.
//! Every mutating tool consults [`SessionGuard::is_authorized`] (or
//! [`SessionGuard::has_active`] when the tool does not target a specific lead)
//! before it performs an upstream write.
//!
//! Starting a session while another one is active replaces it: the last start
//! wins and no error is raised. Ending an empty session is a no-op.

use std::sync::{RwLock, RwLockReadGuard, RwLockWriteGuard};

use chrono::{DateTime, Utc};
use serde::Serialize;

/// Owned copy of the guard state. Mutating it never affects the guard.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize)]
pub struct SessionSnapshot {
    pub subject_id: Option<i64>,
    pub subject_label: Option<String>,
    pub started_at: Option<DateTime<Utc>>,
    pub operator_id: Option<i64>,
}

impl SessionSnapshot {
    pub fn is_active(&self) -> bool {
        self.subject_id.is_some()
    }

    /// Whole minutes elapsed between `started_at` and `now`, rounded to the nearest minute.
    pub fn elapsed_minutes(&self, now: DateTime<Utc>) -> i64 {
        match self.started_at {
            Some(started_at) => {
                let seconds = (now - started_at).num_seconds().max(0);
                (seconds + 30) / 60
            }
            None => 0,
        }
    }
}

#[derive(Debug, Default)]
pub struct SessionGuard {
    state: RwLock<SessionSnapshot>,
}

impl SessionGuard {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn start(&self, subject_id: i64, label: impl Into<String>, operator_id: Option<i64>) {
        let label = label.into();
        let mut state = self.write();
        if let Some(previous) = state.subject_id.filter(|previous| *previous != subject_id) {
            tracing::warn!(
                event_name = "session.replaced",
                previous_subject_id = previous,
                subject_id,
                "starting a session replaced the active one"
            );
        }
        *state = SessionSnapshot {
            subject_id: Some(subject_id),
            subject_label: Some(label),
            started_at: Some(Utc::now()),
            operator_id,
        };
    }

    pub fn end(&self) {
        *self.write() = SessionSnapshot::default();
    }

    pub fn get(&self) -> SessionSnapshot {
        self.read().clone()
    }

    pub fn has_active(&self) -> bool {
        self.read().subject_id.is_some()
    }

    pub fn is_authorized(&self, subject_id: i64) -> bool {
        self.read().subject_id == Some(subject_id)
    }

    pub fn active_subject_id(&self) -> Option<i64> {
        self.read().subject_id
    }

    pub fn active_subject_label(&self) -> Option<String> {
        self.read().subject_label.clone()
    }

    // Writers only assign whole snapshots, so a poisoned lock still holds a complete value.
    fn read(&self) -> RwLockReadGuard<'_, SessionSnapshot> {
        self.state.read().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    fn write(&self) -> RwLockWriteGuard<'_, SessionSnapshot> {
        self.state.write().unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}

#[cfg(test)]
mod tests {
    use chrono::{Duration, Utc};

    use super::{SessionGuard, SessionSnapshot};

    #[test]
    fn start_authorizes_only_the_started_subject() {
        let guard = SessionGuard::new();
        guard.start(42, "Acme Co", None);

        assert!(guard.has_active());
        assert!(guard.is_authorized(42));
        assert!(!guard.is_authorized(99));
        assert_eq!(guard.active_subject_id(), Some(42));
        assert_eq!(guard.active_subject_label().as_deref(), Some("Acme Co"));
    }

    #[test]
    fn end_clears_authorization_for_every_subject() {
        let guard = SessionGuard::new();
        guard.start(42, "Acme Co", Some(7));
        guard.end();

        assert!(!guard.has_active());
        assert!(!guard.is_authorized(42));
        assert_eq!(guard.get(), SessionSnapshot::default());
    }

    #[test]
    fn end_on_empty_guard_is_a_no_op() {
        let guard = SessionGuard::new();
        guard.end();
        guard.end();

        assert!(!guard.has_active());
    }

    #[test]
    fn last_start_wins() {
        let guard = SessionGuard::new();
        guard.start(1, "First", None);
        guard.start(2, "Second", Some(11));

        assert!(!guard.is_authorized(1));
        assert!(guard.is_authorized(2));

        let snapshot = guard.get();
        assert_eq!(snapshot.subject_id, Some(2));
        assert_eq!(snapshot.subject_label.as_deref(), Some("Second"));
        assert_eq!(snapshot.operator_id, Some(11));
    }

    #[test]
    fn snapshot_is_detached_from_guard_state() {
        let guard = SessionGuard::new();
        guard.start(42, "Acme Co", None);

        let mut snapshot = guard.get();
        snapshot.subject_id = Some(99);
        snapshot.subject_label = Some("Tampered".to_string());

        let fresh = guard.get();
        assert_eq!(fresh.subject_id, Some(42));
        assert_eq!(fresh.subject_label.as_deref(), Some("Acme Co"));
        assert!(!guard.is_authorized(99));
    }

    #[test]
    fn start_records_timestamp() {
        let before = Utc::now();
        let guard = SessionGuard::new();
        guard.start(5, "Timed", None);

        let started_at = guard.get().started_at.expect("start should record a timestamp");
        assert!(started_at >= before);
        assert!(started_at <= Utc::now());
    }

    #[test]
    fn elapsed_minutes_rounds_to_nearest_minute() {
        let now = Utc::now();
        let snapshot = SessionSnapshot {
            subject_id: Some(1),
            subject_label: Some("Lead".to_string()),
            started_at: Some(now - Duration::seconds(150)),
            operator_id: None,
        };

        assert_eq!(snapshot.elapsed_minutes(now), 3);
        assert_eq!(SessionSnapshot::default().elapsed_minutes(now), 0);
    }
}
