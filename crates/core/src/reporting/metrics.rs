use std::collections::HashSet;

use serde::Serialize;

use super::filter::{matches_pipeline, DateWindow};
use super::row::SheetEvent;

const SUMMARY_LIMIT: usize = 10;

pub const SCHEDULED: &str = "agendamento";
pub const MEETING_DONE: &str = "reunião realizada";
pub const PROPOSAL_SENT: &str = "proposta enviada";
pub const CONTRACT_SENT: &str = "contrato enviado";
pub const SALE_CLOSED: &str = "venda realizada";
pub const LOST: &str = "perdido";

#[derive(Clone, Debug, Default, PartialEq)]
pub struct MetricsFilter {
    pub pipeline: Option<String>,
    /// Matches either the SDR or the closer owner.
    pub owner: Option<String>,
    pub window: DateWindow,
}

#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct LeadDigest {
    pub lead_id: i64,
    pub name: String,
    pub pipeline: String,
    pub sdr_owner: String,
    pub closer_owner: String,
    pub current_status: String,
    pub sale_value: Option<f64>,
    pub contract_value: Option<f64>,
    pub last_event_at: String,
    pub lead_url: String,
}

impl From<&SheetEvent> for LeadDigest {
    fn from(event: &SheetEvent) -> Self {
        Self {
            lead_id: event.lead_id,
            name: event.lead_name.clone(),
            pipeline: event.pipeline.clone(),
            sdr_owner: event.sdr_owner.clone(),
            closer_owner: event.closer_owner.clone(),
            current_status: event.scheduling_status.clone(),
            sale_value: event.sale_value,
            contract_value: event.contract_value,
            last_event_at: event.event_at.clone(),
            lead_url: event.lead_url.clone(),
        }
    }
}

/// Funnel counts over a set of sheet events. Counts are per event row, not per lead.
#[derive(Clone, Debug, Default, PartialEq, Serialize)]
pub struct FunnelMetrics {
    pub total_leads: usize,
    pub scheduled: usize,
    pub meetings_done: usize,
    pub proposals: usize,
    pub contracts: usize,
    pub sales: usize,
    pub lost: usize,
    pub total_sales_value: f64,
    pub total_contract_value: f64,
    /// Percentage of scheduled meetings that happened.
    pub meeting_conversion_rate: i64,
    /// Percentage of held meetings that closed.
    pub sale_conversion_rate: i64,
    pub average_ticket: i64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub sale_leads: Option<Vec<LeadDigest>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub proposal_leads: Option<Vec<LeadDigest>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub scheduled_leads: Option<Vec<LeadDigest>>,
}

fn percent(part: usize, whole: usize) -> i64 {
    if whole == 0 {
        return 0;
    }
    ((part as f64 / whole as f64) * 100.0).round() as i64
}

fn non_empty(list: Vec<LeadDigest>) -> Option<Vec<LeadDigest>> {
    (!list.is_empty()).then_some(list)
}

fn push_digest(list: &mut Vec<LeadDigest>, event: &SheetEvent) {
    if list.len() < SUMMARY_LIMIT {
        list.push(LeadDigest::from(event));
    }
}

pub fn compute_metrics(events: &[SheetEvent], filter: &MetricsFilter) -> FunnelMetrics {
    let selected = events.iter().filter(|event| {
        if !filter.window.contains(&event.event_at) {
            return false;
        }
        if let Some(pipeline) = &filter.pipeline {
            if !matches_pipeline(event, pipeline) {
                return false;
            }
        }
        if let Some(owner) = &filter.owner {
            let owner = owner.to_lowercase();
            let sdr = event.sdr_owner.to_lowercase();
            let closer = event.closer_owner.to_lowercase();
            if !sdr.contains(&owner) && !closer.contains(&owner) {
                return false;
            }
        }
        true
    });

    let mut metrics = FunnelMetrics::default();
    let mut unique_leads = HashSet::new();
    let mut sale_leads = Vec::new();
    let mut proposal_leads = Vec::new();
    let mut scheduled_leads = Vec::new();

    for event in selected {
        unique_leads.insert(event.lead_id);

        match event.event_type.to_lowercase().as_str() {
            SCHEDULED => {
                metrics.scheduled += 1;
                push_digest(&mut scheduled_leads, event);
            }
            MEETING_DONE => metrics.meetings_done += 1,
            PROPOSAL_SENT => {
                metrics.proposals += 1;
                push_digest(&mut proposal_leads, event);
            }
            CONTRACT_SENT => {
                metrics.contracts += 1;
                metrics.total_contract_value += event.contract_value.unwrap_or(0.0);
            }
            SALE_CLOSED => {
                metrics.sales += 1;
                metrics.total_sales_value += event.sale_value.unwrap_or(0.0);
                push_digest(&mut sale_leads, event);
            }
            LOST => metrics.lost += 1,
            _ => {}
        }
    }

    metrics.total_leads = unique_leads.len();
    metrics.meeting_conversion_rate = percent(metrics.meetings_done, metrics.scheduled);
    metrics.sale_conversion_rate = percent(metrics.sales, metrics.meetings_done);
    metrics.average_ticket = if metrics.sales > 0 {
        (metrics.total_sales_value / metrics.sales as f64).round() as i64
    } else {
        0
    };
    metrics.sale_leads = non_empty(sale_leads);
    metrics.proposal_leads = non_empty(proposal_leads);
    metrics.scheduled_leads = non_empty(scheduled_leads);
    metrics
}
