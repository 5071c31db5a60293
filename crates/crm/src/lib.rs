//! Clients for the Kommo CRM REST API and the reporting spreadsheet.
//!
//! Tool handlers only see the [`CrmApi`] and [`SheetsSource`] traits. The HTTP
//! implementations live in [`client`] and [`sheets`]; [`memory`] holds recording fakes.

pub mod client;
pub mod connector;
pub mod error;
pub mod memory;
pub mod query;
pub mod sheets;

use async_trait::async_trait;
use serde::de::DeserializeOwned;
use serde_json::Value;

pub use client::HttpCrmClient;
pub use connector::{CrmConnector, HttpCrmConnector};
pub use error::CrmError;
pub use memory::{InMemoryCrm, InMemorySheets, RecordedCall};
pub use query::Query;
pub use sheets::{HttpSheetsClient, SheetsSource};

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum HttpMethod {
    Get,
    Post,
    Patch,
}

impl HttpMethod {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Get => "GET",
            Self::Post => "POST",
            Self::Patch => "PATCH",
        }
    }
}

/// Authenticated access to one CRM account. Endpoints are relative to `/api/v4`.
#[async_trait]
pub trait CrmApi: Send + Sync {
    async fn get(&self, endpoint: &str, query: &Query) -> Result<Value, CrmError>;
    async fn post(&self, endpoint: &str, body: &Value) -> Result<Value, CrmError>;
    async fn patch(&self, endpoint: &str, body: &Value) -> Result<Value, CrmError>;
}

/// Decodes a JSON payload into a wire type, mapping failures to [`CrmError::Decode`].
pub fn decode<T: DeserializeOwned>(payload: Value) -> Result<T, CrmError> {
    serde_json::from_value(payload).map_err(|error| CrmError::Decode(error.to_string()))
}

/// Reads the `_embedded.<key>` list of a list endpoint response.
pub fn decode_embedded<T: DeserializeOwned>(payload: &Value, key: &str) -> Result<Vec<T>, CrmError> {
    kommo_core::domain::embedded(payload, key).map_err(|error| CrmError::Decode(error.to_string()))
}

/// `GET` a list endpoint and decode its `_embedded.<key>` items.
pub async fn fetch_list<T: DeserializeOwned>(
    crm: &dyn CrmApi,
    endpoint: &str,
    query: &Query,
    key: &str,
) -> Result<Vec<T>, CrmError> {
    let payload = crm.get(endpoint, query).await?;
    decode_embedded(&payload, key)
}
