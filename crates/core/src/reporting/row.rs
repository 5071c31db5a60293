use serde::Serialize;

/// Zero-based column positions in the `A:AV` range of the events sheet.
pub mod column {
    pub const LEAD_NAME: usize = 0;
    pub const SDR_OWNER: usize = 1;
    pub const SCHEDULING_STATUS: usize = 2;
    pub const EVENT_TYPE: usize = 3;
    pub const LEAD_CREATED_AT: usize = 4;
    pub const SCHEDULING_RECORDED_AT: usize = 5;
    pub const MEETING_AT: usize = 6;
    pub const EVENT_AT: usize = 7;
    pub const MEETING_DONE_RECORDED_AT: usize = 8;
    pub const PROPOSAL_RECORDED_AT: usize = 9;
    pub const CONTRACT_RECORDED_AT: usize = 10;
    pub const SALE_RECORDED_AT: usize = 11;
    pub const SALE_VALUE: usize = 12;
    pub const CONTRACT_VALUE: usize = 13;
    pub const PRODUCT: usize = 14;
    pub const LOST_RECORDED_AT: usize = 15;
    pub const LOSS_REASON: usize = 16;
    pub const CLOSER_OWNER: usize = 17;
    pub const LEAD_ORIGIN: usize = 18;
    pub const SCHEDULING_CHANNEL: usize = 19;
    pub const EVENT_ID: usize = 20;
    pub const LEAD_ID: usize = 21;
    pub const LEAD_OWNER_ID: usize = 22;
    pub const LEAD_URL: usize = 23;
    pub const PREVIOUS_STAGE: usize = 24;
    pub const CURRENT_STAGE: usize = 25;
    pub const PIPELINE: usize = 26;
    pub const ROLE: usize = 27;
    pub const USES_VOIP: usize = 28;
    pub const REVENUE_BAND: usize = 29;
    pub const MEETING_COUNT: usize = 30;
    pub const TEAM_SIZE: usize = 31;
    pub const UTM_SOURCE: usize = 32;
    pub const UTM_CAMPAIGN: usize = 33;
    pub const UTM_MEDIUM: usize = 34;
    pub const UTM_CONTENT: usize = 35;
    pub const UTM_TERM: usize = 36;
    pub const TAGS: usize = 37;
    pub const CONTACT_NAME: usize = 38;
    pub const CONTACT_ID: usize = 39;
    pub const CONTACT_OWNER: usize = 40;
    pub const CONTACT_CREATED_AT: usize = 41;
    pub const CONTACT_OWNER_ID: usize = 42;
    pub const CONTACT_PHONE: usize = 43;
    pub const CONTACT_EMAIL: usize = 44;
    pub const CONTACT_ROLE: usize = 45;
    pub const CONTACT_URL: usize = 46;
    pub const NOTES: usize = 47;
}

/// One row of the events sheet. Each row records a single funnel event for a lead.
#[derive(Clone, Debug, Default, PartialEq, Serialize)]
pub struct SheetEvent {
    pub lead_name: String,
    pub event_id: String,
    pub lead_id: i64,
    pub lead_url: String,

    pub sdr_owner: String,
    pub closer_owner: String,
    pub lead_owner_id: i64,

    pub scheduling_status: String,
    pub event_type: String,
    pub previous_stage: String,
    pub current_stage: String,
    pub pipeline: String,

    pub lead_created_at: String,
    pub scheduling_recorded_at: String,
    pub meeting_at: String,
    pub event_at: String,
    pub meeting_done_recorded_at: String,
    pub proposal_recorded_at: String,
    pub contract_recorded_at: String,
    pub sale_recorded_at: String,
    pub lost_recorded_at: String,

    pub sale_value: Option<f64>,
    pub contract_value: Option<f64>,

    pub product: String,
    pub lead_origin: String,
    pub scheduling_channel: String,
    pub loss_reason: String,

    pub contact_name: String,
    pub contact_id: i64,
    pub contact_owner: String,
    pub contact_created_at: String,
    pub contact_owner_id: i64,
    pub contact_phone: String,
    pub contact_email: String,
    pub contact_role: String,
    pub contact_url: String,

    pub role: String,
    pub uses_voip: String,
    pub revenue_band: String,
    pub meeting_count: String,
    pub team_size: String,
    pub utm_source: String,
    pub utm_campaign: String,
    pub utm_medium: String,
    pub utm_content: String,
    pub utm_term: String,
    pub tags: String,
    pub notes: String,
}

struct Cells<'a>(&'a [String]);

impl Cells<'_> {
    fn text(&self, index: usize) -> String {
        self.0.get(index).map(|cell| cell.trim().to_string()).unwrap_or_default()
    }

    fn money(&self, index: usize) -> Option<f64> {
        parse_money(&self.text(index))
    }

    fn int(&self, index: usize) -> i64 {
        self.text(index).parse().unwrap_or(0)
    }
}

/// Parses a `R$ 1.234,56` style amount. Thousands dots are dropped and the decimal comma
/// becomes a point.
pub fn parse_money(raw: &str) -> Option<f64> {
    let stripped: String =
        raw.chars().filter(|ch| !matches!(ch, 'R' | '$' | '.') && !ch.is_whitespace()).collect();
    let normalized = stripped.replacen(',', ".", 1);
    normalized.parse::<f64>().ok().filter(|value| value.is_finite())
}

impl SheetEvent {
    pub fn from_row(row: &[String]) -> Self {
        use column::*;

        let cells = Cells(row);
        Self {
            lead_name: cells.text(LEAD_NAME),
            event_id: cells.text(EVENT_ID),
            lead_id: cells.int(LEAD_ID),
            lead_url: cells.text(LEAD_URL),
            sdr_owner: cells.text(SDR_OWNER),
            closer_owner: cells.text(CLOSER_OWNER),
            lead_owner_id: cells.int(LEAD_OWNER_ID),
            scheduling_status: cells.text(SCHEDULING_STATUS),
            event_type: cells.text(EVENT_TYPE),
            previous_stage: cells.text(PREVIOUS_STAGE),
            current_stage: cells.text(CURRENT_STAGE),
            pipeline: cells.text(PIPELINE),
            lead_created_at: cells.text(LEAD_CREATED_AT),
            scheduling_recorded_at: cells.text(SCHEDULING_RECORDED_AT),
            meeting_at: cells.text(MEETING_AT),
            event_at: cells.text(EVENT_AT),
            meeting_done_recorded_at: cells.text(MEETING_DONE_RECORDED_AT),
            proposal_recorded_at: cells.text(PROPOSAL_RECORDED_AT),
            contract_recorded_at: cells.text(CONTRACT_RECORDED_AT),
            sale_recorded_at: cells.text(SALE_RECORDED_AT),
            lost_recorded_at: cells.text(LOST_RECORDED_AT),
            sale_value: cells.money(SALE_VALUE),
            contract_value: cells.money(CONTRACT_VALUE),
            product: cells.text(PRODUCT),
            lead_origin: cells.text(LEAD_ORIGIN),
            scheduling_channel: cells.text(SCHEDULING_CHANNEL),
            loss_reason: cells.text(LOSS_REASON),
            contact_name: cells.text(CONTACT_NAME),
            contact_id: cells.int(CONTACT_ID),
            contact_owner: cells.text(CONTACT_OWNER),
            contact_created_at: cells.text(CONTACT_CREATED_AT),
            contact_owner_id: cells.int(CONTACT_OWNER_ID),
            contact_phone: cells.text(CONTACT_PHONE),
            contact_email: cells.text(CONTACT_EMAIL),
            contact_role: cells.text(CONTACT_ROLE),
            contact_url: cells.text(CONTACT_URL),
            role: cells.text(ROLE),
            uses_voip: cells.text(USES_VOIP),
            revenue_band: cells.text(REVENUE_BAND),
            meeting_count: cells.text(MEETING_COUNT),
            team_size: cells.text(TEAM_SIZE),
            utm_source: cells.text(UTM_SOURCE),
            utm_campaign: cells.text(UTM_CAMPAIGN),
            utm_medium: cells.text(UTM_MEDIUM),
            utm_content: cells.text(UTM_CONTENT),
            utm_term: cells.text(UTM_TERM),
            tags: cells.text(TAGS),
            notes: cells.text(NOTES),
        }
    }
}

/// Converts the raw `values` grid of the sheet into events.
///
/// The first row is the header. Rows without a lead id are blank or partial and are skipped.
pub fn parse_rows(rows: &[Vec<String>]) -> Vec<SheetEvent> {
    rows.iter()
        .skip(1)
        .filter(|row| row.get(column::LEAD_ID).map(|cell| !cell.trim().is_empty()).unwrap_or(false))
        .map(|row| SheetEvent::from_row(row))
        .collect()
}
