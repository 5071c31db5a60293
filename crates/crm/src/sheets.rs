use std::time::Duration;

use async_trait::async_trait;
use kommo_core::reporting::{compute_metrics, parse_rows, EventFilter, FunnelMetrics, MetricsFilter};
use kommo_core::SheetEvent;
use reqwest::{Client, Url};
use secrecy::{ExposeSecret, SecretString};
use serde::Deserialize;
use tracing::debug;

use crate::CrmError;

const SHEETS_API: &str = "https://sheets.googleapis.com/v4/spreadsheets/";
const SHEET_RANGE: &str = "A:AV";

/// Read access to the funnel events spreadsheet.
///
/// Implementors only provide the raw cell grid; parsing and filtering are shared.
#[async_trait]
pub trait SheetsSource: Send + Sync {
    async fn rows(&self) -> Result<Vec<Vec<String>>, CrmError>;

    async fn events(&self, filter: &EventFilter) -> Result<Vec<SheetEvent>, CrmError> {
        let rows = self.rows().await?;
        Ok(filter.apply(parse_rows(&rows)))
    }

    async fn events_for_lead(&self, lead_id: i64) -> Result<Vec<SheetEvent>, CrmError> {
        let rows = self.rows().await?;
        Ok(parse_rows(&rows).into_iter().filter(|event| event.lead_id == lead_id).collect())
    }

    async fn metrics(&self, filter: &MetricsFilter) -> Result<FunnelMetrics, CrmError> {
        let rows = self.rows().await?;
        Ok(compute_metrics(&parse_rows(&rows), filter))
    }
}

#[derive(Debug, Default, Deserialize)]
struct ValueRange {
    #[serde(default)]
    values: Vec<Vec<String>>,
}

pub struct HttpSheetsClient {
    client: Client,
    api_root: Url,
    api_key: SecretString,
    spreadsheet_id: String,
    sheet_name: String,
    timeout_secs: u64,
}

impl std::fmt::Debug for HttpSheetsClient {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("HttpSheetsClient")
            .field("spreadsheet_id", &self.spreadsheet_id)
            .field("sheet_name", &self.sheet_name)
            .finish_non_exhaustive()
    }
}

impl HttpSheetsClient {
    pub fn new(
        api_key: SecretString,
        spreadsheet_id: impl Into<String>,
        sheet_name: impl Into<String>,
        timeout: Duration,
    ) -> Result<Self, CrmError> {
        let api_root =
            Url::parse(SHEETS_API).map_err(|error| CrmError::Configuration(error.to_string()))?;
        let client = Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|error| CrmError::Configuration(error.to_string()))?;
        Ok(Self {
            client,
            api_root,
            api_key,
            spreadsheet_id: spreadsheet_id.into(),
            sheet_name: sheet_name.into(),
            timeout_secs: timeout.as_secs(),
        })
    }

    /// Points the client at another API root, for local fakes.
    pub fn with_api_root(mut self, api_root: &str) -> Result<Self, CrmError> {
        self.api_root =
            Url::parse(api_root).map_err(|error| CrmError::Configuration(error.to_string()))?;
        Ok(self)
    }

    pub fn values_url(&self) -> Result<Url, CrmError> {
        let mut url = self.api_root.clone();
        let range = format!("{}!{SHEET_RANGE}", self.sheet_name);
        url.path_segments_mut()
            .map_err(|()| CrmError::Configuration("sheets api root cannot be a base".to_string()))?
            .pop_if_empty()
            .push(&self.spreadsheet_id)
            .push("values")
            .push(&range);
        url.query_pairs_mut().append_pair("key", self.api_key.expose_secret());
        Ok(url)
    }
}

#[async_trait]
impl SheetsSource for HttpSheetsClient {
    async fn rows(&self) -> Result<Vec<Vec<String>>, CrmError> {
        let url = self.values_url()?;
        let response = self.client.get(url).send().await.map_err(|error| {
            if error.is_timeout() {
                CrmError::Timeout { timeout_secs: self.timeout_secs }
            } else {
                CrmError::Transport(error.without_url().to_string())
            }
        })?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(CrmError::Sheets { status: status.as_u16(), body });
        }

        let range: ValueRange =
            response.json().await.map_err(|error| CrmError::Decode(error.to_string()))?;
        debug!(
            event_name = "sheets.fetch",
            sheet = %self.sheet_name,
            rows = range.values.len(),
            "spreadsheet rows fetched"
        );
        Ok(range.values)
    }
}
