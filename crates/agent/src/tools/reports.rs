//! Funnel reporting over the events spreadsheet.
//!
//! These tools only read. They fail with a rejection when no spreadsheet is configured.

use async_trait::async_trait;
use chrono::NaiveDateTime;
use kommo_core::reporting::{parse_bound, DateWindow};
use kommo_core::{EventFilter, MetricsFilter};
use schemars::JsonSchema;
use serde::Deserialize;
use serde_json::{json, Map, Value};
use tracing::info;

use super::{parse_params, Tool, ToolContext, ToolError, ToolOutput, ToolRegistry};
use crate::schema::{input_schema, FieldViolation};

const DATE_HINT: &str = "yyyy-mm-dd, yyyy-mm-ddTHH:MM:SS or dd/mm/yyyy";

pub fn register(registry: &mut ToolRegistry) {
    registry.register(ListEvents);
    registry.register(LeadEvents);
    registry.register(Metrics);
}

fn default_limit() -> usize {
    100
}

/// Builds a window from two optional bounds, collecting one violation per unreadable bound.
fn window(
    from: (&'static str, Option<&str>),
    to: (&'static str, Option<&str>),
    violations: &mut Vec<FieldViolation>,
) -> DateWindow {
    let mut bound = |(field, raw): (&'static str, Option<&str>), upper: bool| -> Option<NaiveDateTime> {
        let raw = raw?;
        let parsed = parse_bound(raw, upper);
        if parsed.is_none() {
            violations.push(FieldViolation::new(field, format!("must be a date ({DATE_HINT})")));
        }
        parsed
    };
    let from = bound(from, false);
    let to = bound(to, true);
    DateWindow { from, to }
}

fn check(violations: Vec<FieldViolation>) -> Result<(), ToolError> {
    if violations.is_empty() {
        Ok(())
    } else {
        Err(ToolError::Validation(violations))
    }
}

pub struct ListEvents;

#[derive(Debug, Deserialize, JsonSchema)]
struct ListParams {
    #[schemars(description = "Pipeline name, e.g. SDR or closers", length(min = 1))]
    pipeline: Option<String>,
    #[schemars(description = "Event type, e.g. Agendamento or Venda realizada", length(min = 1))]
    event_type: Option<String>,
    #[schemars(description = "SDR owner name", length(min = 1))]
    sdr_owner: Option<String>,
    #[schemars(description = "Closer owner name", length(min = 1))]
    closer_owner: Option<String>,
    #[schemars(description = "Earliest event date", length(min = 1))]
    date_from: Option<String>,
    #[schemars(description = "Latest event date; a bare date covers the whole day", length(min = 1))]
    date_to: Option<String>,
    #[schemars(description = "Earliest scheduled meeting date", length(min = 1))]
    meeting_from: Option<String>,
    #[schemars(description = "Latest scheduled meeting date", length(min = 1))]
    meeting_to: Option<String>,
    #[serde(default = "default_limit")]
    #[schemars(description = "Maximum events returned", range(min = 1, max = 1000))]
    limit: usize,
}

#[async_trait]
impl Tool for ListEvents {
    fn name(&self) -> &'static str {
        "sheets_list_events"
    }

    fn description(&self) -> &'static str {
        "Lists funnel events from the reporting spreadsheet (meetings booked, meetings held, \
         proposals, contracts, sales, losses). Text filters are case-insensitive substrings; \
         pipeline \"closers\" also matches the Closer pipeline. Date filters apply to the event \
         date, meeting filters to the scheduled meeting date."
    }

    fn input_schema(&self) -> Value {
        input_schema::<ListParams>()
    }

    async fn execute(&self, params: Map<String, Value>, ctx: &ToolContext) -> Result<ToolOutput, ToolError> {
        let params: ListParams = parse_params(params)?;
        let mut violations = Vec::new();
        let event_window = window(
            ("date_from", params.date_from.as_deref()),
            ("date_to", params.date_to.as_deref()),
            &mut violations,
        );
        let meeting_window = window(
            ("meeting_from", params.meeting_from.as_deref()),
            ("meeting_to", params.meeting_to.as_deref()),
            &mut violations,
        );
        check(violations)?;

        let filter = EventFilter {
            pipeline: params.pipeline,
            event_type: params.event_type,
            sdr_owner: params.sdr_owner,
            closer_owner: params.closer_owner,
            event_window,
            meeting_window,
            limit: Some(params.limit),
        };
        let events = ctx.sheets()?.events(&filter).await?;
        info!(event_name = "sheets.events.listed", total = events.len(), "spreadsheet events listed");

        ToolOutput::new(
            format!("{} event(s) found", events.len()),
            json!({ "total": events.len(), "events": events }),
        )
    }
}

pub struct LeadEvents;

#[derive(Debug, Deserialize, JsonSchema)]
struct LeadParams {
    #[schemars(description = "CRM lead id", range(min = 1))]
    lead_id: i64,
}

#[async_trait]
impl Tool for LeadEvents {
    fn name(&self) -> &'static str {
        "sheets_lead_events"
    }

    fn description(&self) -> &'static str {
        "Shows the funnel history of one lead as recorded in the reporting spreadsheet."
    }

    fn input_schema(&self) -> Value {
        input_schema::<LeadParams>()
    }

    async fn execute(&self, params: Map<String, Value>, ctx: &ToolContext) -> Result<ToolOutput, ToolError> {
        let params: LeadParams = parse_params(params)?;
        let events = ctx.sheets()?.events_for_lead(params.lead_id).await?;

        let message = match events.len() {
            0 => format!("No spreadsheet events for lead {}", params.lead_id),
            total => format!("{total} event(s) for lead {}", params.lead_id),
        };
        ToolOutput::new(message, json!({ "lead_id": params.lead_id, "total": events.len(), "events": events }))
    }
}

pub struct Metrics;

#[derive(Debug, Deserialize, JsonSchema)]
struct MetricsParams {
    #[schemars(description = "Pipeline name", length(min = 1))]
    pipeline: Option<String>,
    #[schemars(description = "SDR or closer name", length(min = 1))]
    owner: Option<String>,
    #[schemars(description = "Earliest event date", length(min = 1))]
    date_from: Option<String>,
    #[schemars(description = "Latest event date; a bare date covers the whole day", length(min = 1))]
    date_to: Option<String>,
}

#[async_trait]
impl Tool for Metrics {
    fn name(&self) -> &'static str {
        "sheets_metrics"
    }

    fn description(&self) -> &'static str {
        "Computes funnel metrics from the reporting spreadsheet: meetings booked and held, \
         proposals, contracts, sales, losses, conversion rates and average ticket. owner \
         matches either the SDR or the closer."
    }

    fn input_schema(&self) -> Value {
        input_schema::<MetricsParams>()
    }

    async fn execute(&self, params: Map<String, Value>, ctx: &ToolContext) -> Result<ToolOutput, ToolError> {
        let params: MetricsParams = parse_params(params)?;
        let mut violations = Vec::new();
        let window = window(
            ("date_from", params.date_from.as_deref()),
            ("date_to", params.date_to.as_deref()),
            &mut violations,
        );
        check(violations)?;

        let filter = MetricsFilter { pipeline: params.pipeline, owner: params.owner, window };
        let metrics = ctx.sheets()?.metrics(&filter).await?;
        info!(
            event_name = "sheets.metrics.computed",
            total_leads = metrics.total_leads,
            sales = metrics.sales,
            "funnel metrics computed"
        );

        ToolOutput::new(
            format!(
                "{} lead(s): {} meeting(s) booked, {} held, {} sale(s)",
                metrics.total_leads, metrics.scheduled, metrics.meetings_done, metrics.sales
            ),
            json!({
                "filters": {
                    "pipeline": filter.pipeline,
                    "owner": filter.owner,
                    "date_from": params.date_from,
                    "date_to": params.date_to,
                },
                "metrics": metrics,
            }),
        )
    }
}
