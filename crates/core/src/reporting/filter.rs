use std::sync::OnceLock;

use chrono::{NaiveDate, NaiveDateTime, NaiveTime};
use regex::Regex;

use super::row::SheetEvent;

/// Parses the sheet's `dd/mm/yyyy [HH[:mm[:ss]]]` timestamps. Missing time parts are zero.
pub fn parse_br_date(raw: &str) -> Option<NaiveDateTime> {
    static PATTERN: OnceLock<Option<Regex>> = OnceLock::new();
    let pattern = PATTERN
        .get_or_init(|| {
            Regex::new(r"(\d{2})/(\d{2})/(\d{4})\s*(\d{2})?:?(\d{2})?:?(\d{2})?").ok()
        })
        .as_ref()?;

    let captures = pattern.captures(raw.trim())?;
    let part = |index: usize| -> Option<u32> {
        captures.get(index).map_or(Some(0), |found| found.as_str().parse().ok())
    };

    let day = part(1)?;
    let month = part(2)?;
    let year = captures.get(3)?.as_str().parse::<i32>().ok()?;
    let date = NaiveDate::from_ymd_opt(year, month, day)?;
    let time = NaiveTime::from_hms_opt(part(4)?, part(5)?, part(6)?)?;
    Some(date.and_time(time))
}

/// Parses a caller supplied bound: ISO `yyyy-mm-dd[THH:MM:SS]` or the sheet's own format.
///
/// Date-only upper bounds cover the whole day.
pub fn parse_bound(raw: &str, upper: bool) -> Option<NaiveDateTime> {
    let raw = raw.trim();
    if let Ok(datetime) = NaiveDateTime::parse_from_str(raw, "%Y-%m-%dT%H:%M:%S") {
        return Some(datetime);
    }
    if let Ok(date) = NaiveDate::parse_from_str(raw, "%Y-%m-%d") {
        return Some(if upper { end_of_day(date) } else { date.and_time(NaiveTime::MIN) });
    }
    let parsed = parse_br_date(raw)?;
    let date_only = !raw.contains(':') && raw.len() <= 10;
    Some(if upper && date_only { end_of_day(parsed.date()) } else { parsed })
}

fn end_of_day(date: NaiveDate) -> NaiveDateTime {
    date.and_time(NaiveTime::from_hms_opt(23, 59, 59).unwrap_or(NaiveTime::MIN))
}

/// Inclusive datetime window. An open side is unbounded.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct DateWindow {
    pub from: Option<NaiveDateTime>,
    pub to: Option<NaiveDateTime>,
}

impl DateWindow {
    pub fn is_open(&self) -> bool {
        self.from.is_none() && self.to.is_none()
    }

    /// An unparsable or empty timestamp only matches an open window.
    pub fn contains(&self, raw: &str) -> bool {
        if self.is_open() {
            return true;
        }
        let Some(at) = parse_br_date(raw) else {
            return false;
        };
        self.from.map_or(true, |from| at >= from) && self.to.map_or(true, |to| at <= to)
    }
}

/// Case-insensitive pipeline match. `closers` also matches pipelines named `closer`.
pub fn matches_pipeline(event: &SheetEvent, wanted: &str) -> bool {
    let wanted = wanted.to_lowercase();
    let pipeline = event.pipeline.to_lowercase();
    pipeline.contains(&wanted) || (wanted == "closers" && pipeline.contains("closer"))
}

fn contains_ci(haystack: &str, needle: &str) -> bool {
    haystack.to_lowercase().contains(&needle.to_lowercase())
}

#[derive(Clone, Debug, Default, PartialEq)]
pub struct EventFilter {
    pub pipeline: Option<String>,
    pub event_type: Option<String>,
    pub sdr_owner: Option<String>,
    pub closer_owner: Option<String>,
    /// Window over the event date column.
    pub event_window: DateWindow,
    /// Window over the scheduled meeting date column.
    pub meeting_window: DateWindow,
    pub limit: Option<usize>,
}

impl EventFilter {
    pub fn matches(&self, event: &SheetEvent) -> bool {
        if let Some(pipeline) = &self.pipeline {
            if !matches_pipeline(event, pipeline) {
                return false;
            }
        }
        if let Some(event_type) = &self.event_type {
            if !contains_ci(&event.event_type, event_type) {
                return false;
            }
        }
        if let Some(sdr) = &self.sdr_owner {
            if !contains_ci(&event.sdr_owner, sdr) {
                return false;
            }
        }
        if let Some(closer) = &self.closer_owner {
            if !contains_ci(&event.closer_owner, closer) {
                return false;
            }
        }
        self.event_window.contains(&event.event_at) && self.meeting_window.contains(&event.meeting_at)
    }

    pub fn apply(&self, events: Vec<SheetEvent>) -> Vec<SheetEvent> {
        let matching = events.into_iter().filter(|event| self.matches(event));
        match self.limit.filter(|limit| *limit > 0) {
            Some(limit) => matching.take(limit).collect(),
            None => matching.collect(),
        }
    }
}

#[cfg(test)]
mod tests {
    use chrono::{NaiveDate, NaiveDateTime};

    use super::{parse_bound, parse_br_date, DateWindow, EventFilter};
    use crate::reporting::row::SheetEvent;

    fn at(y: i32, m: u32, d: u32, h: u32, min: u32, s: u32) -> NaiveDateTime {
        NaiveDate::from_ymd_opt(y, m, d)
            .and_then(|date| date.and_hms_opt(h, min, s))
            .expect("valid fixture date")
    }

    fn event(pipeline: &str, event_type: &str, event_at: &str) -> SheetEvent {
        SheetEvent {
            pipeline: pipeline.to_string(),
            event_type: event_type.to_string(),
            event_at: event_at.to_string(),
            sdr_owner: "Joana Lima".to_string(),
            closer_owner: "Rafael Costa".to_string(),
            lead_id: 1,
            ..SheetEvent::default()
        }
    }

    #[test]
    fn br_dates_parse_with_optional_time() {
        assert_eq!(parse_br_date("30/08/2025 22:00:29"), Some(at(2025, 8, 30, 22, 0, 29)));
        assert_eq!(parse_br_date("01/09/2025"), Some(at(2025, 9, 1, 0, 0, 0)));
        assert_eq!(parse_br_date("01/09/2025 14:30"), Some(at(2025, 9, 1, 14, 30, 0)));
        assert_eq!(parse_br_date("31/02/2025"), None);
        assert_eq!(parse_br_date("2025-09-01"), None);
        assert_eq!(parse_br_date(""), None);
    }

    #[test]
    fn date_only_upper_bound_covers_the_day() {
        assert_eq!(parse_bound("2025-09-01", true), Some(at(2025, 9, 1, 23, 59, 59)));
        assert_eq!(parse_bound("2025-09-01", false), Some(at(2025, 9, 1, 0, 0, 0)));
        assert_eq!(parse_bound("01/09/2025", true), Some(at(2025, 9, 1, 23, 59, 59)));
        assert_eq!(parse_bound("tomorrow", false), None);
    }

    #[test]
    fn window_excludes_rows_without_parsable_dates() {
        let window = DateWindow { from: Some(at(2025, 9, 1, 0, 0, 0)), to: None };
        assert!(window.contains("02/09/2025 10:00:00"));
        assert!(!window.contains("31/08/2025 23:59:59"));
        assert!(!window.contains(""));
        assert!(DateWindow::default().contains(""));
    }

    #[test]
    fn closers_pipeline_alias_and_substring_filters() {
        let events = vec![
            event("Closer", "Venda realizada", "05/09/2025"),
            event("SDR", "Agendamento", "05/09/2025"),
            event("Match Sales", "Reunião Realizada", "05/09/2025"),
        ];

        let closers = EventFilter { pipeline: Some("closers".to_string()), ..EventFilter::default() };
        assert_eq!(closers.apply(events.clone()).len(), 1);

        let meetings =
            EventFilter { event_type: Some("reunião".to_string()), ..EventFilter::default() };
        assert_eq!(meetings.apply(events.clone())[0].pipeline, "Match Sales");

        let by_owner = EventFilter {
            closer_owner: Some("rafael".to_string()),
            limit: Some(2),
            ..EventFilter::default()
        };
        assert_eq!(by_owner.apply(events).len(), 2);
    }
}
