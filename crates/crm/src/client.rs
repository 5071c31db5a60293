use std::time::{Duration, Instant};

use async_trait::async_trait;
use reqwest::{Client, Method, StatusCode};
use secrecy::{ExposeSecret, SecretString};
use serde_json::{json, Value};
use tracing::{debug, warn};

use crate::{CrmApi, CrmError, HttpMethod, Query};

/// reqwest-backed [`CrmApi`] for one account.
#[derive(Clone)]
pub struct HttpCrmClient {
    client: Client,
    api_url: String,
    access_token: SecretString,
    timeout_secs: u64,
}

impl std::fmt::Debug for HttpCrmClient {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("HttpCrmClient").field("api_url", &self.api_url).finish_non_exhaustive()
    }
}

/// reqwest client with the per-request timeout. Cloning it shares the connection pool.
pub(crate) fn build_http_client(timeout: Duration) -> Result<Client, CrmError> {
    Client::builder()
        .timeout(timeout)
        .build()
        .map_err(|error| CrmError::Configuration(error.to_string()))
}

impl HttpCrmClient {
    pub fn new(
        base_url: &str,
        access_token: SecretString,
        timeout: Duration,
    ) -> Result<Self, CrmError> {
        Self::with_client(build_http_client(timeout)?, base_url, access_token, timeout)
    }

    /// Account client on an existing reqwest `Client`, reusing its pool.
    ///
    /// `timeout` must be the one `client` was built with; it is only used in error messages.
    pub fn with_client(
        client: Client,
        base_url: &str,
        access_token: SecretString,
        timeout: Duration,
    ) -> Result<Self, CrmError> {
        let base_url = base_url.trim().trim_end_matches('/');
        if !base_url.starts_with("http://") && !base_url.starts_with("https://") {
            return Err(CrmError::Configuration(format!(
                "base url `{base_url}` must start with http:// or https://"
            )));
        }
        if access_token.expose_secret().trim().is_empty() {
            return Err(CrmError::Configuration("access token is empty".to_string()));
        }

        Ok(Self {
            client,
            api_url: format!("{base_url}/api/v4"),
            access_token,
            timeout_secs: timeout.as_secs(),
        })
    }

    pub fn api_url(&self) -> &str {
        &self.api_url
    }

    async fn request(
        &self,
        method: HttpMethod,
        endpoint: &str,
        query: Option<&Query>,
        body: Option<&Value>,
    ) -> Result<Value, CrmError> {
        let url = format!("{}{endpoint}", self.api_url);
        let reqwest_method = match method {
            HttpMethod::Get => Method::GET,
            HttpMethod::Post => Method::POST,
            HttpMethod::Patch => Method::PATCH,
        };

        let mut request = self
            .client
            .request(reqwest_method, &url)
            .bearer_auth(self.access_token.expose_secret());
        if let Some(query) = query.filter(|query| !query.is_empty()) {
            request = request.query(query.pairs());
        }
        if let Some(body) = body {
            request = request.json(body);
        }

        let started = Instant::now();
        let response = request.send().await.map_err(|error| self.transport_error(error))?;
        let status = response.status();

        debug!(
            event_name = "crm.request",
            method = method.as_str(),
            endpoint,
            status = status.as_u16(),
            elapsed_ms = started.elapsed().as_millis() as u64,
            "crm request completed"
        );

        if !status.is_success() {
            let payload: Value = response.json().await.unwrap_or(Value::Null);
            let detail = payload
                .get("detail")
                .or_else(|| payload.get("title"))
                .and_then(Value::as_str)
                .map(str::to_string);
            warn!(
                event_name = "crm.request.failed",
                method = method.as_str(),
                endpoint,
                status = status.as_u16(),
                "crm request returned an error status"
            );
            return Err(CrmError::from_status(status.as_u16(), detail));
        }

        if status == StatusCode::NO_CONTENT {
            return Ok(json!({}));
        }

        let bytes = response.bytes().await.map_err(|error| self.transport_error(error))?;
        if bytes.is_empty() {
            return Ok(json!({}));
        }
        serde_json::from_slice(&bytes).map_err(|error| CrmError::Decode(error.to_string()))
    }

    fn transport_error(&self, error: reqwest::Error) -> CrmError {
        if error.is_timeout() {
            return CrmError::Timeout { timeout_secs: self.timeout_secs };
        }
        if error.is_connect() {
            let host = error
                .url()
                .and_then(|url| url.host_str().map(str::to_string))
                .unwrap_or_else(|| self.api_url.clone());
            return CrmError::Connect { host };
        }
        CrmError::Transport(error.to_string())
    }
}

#[async_trait]
impl CrmApi for HttpCrmClient {
    async fn get(&self, endpoint: &str, query: &Query) -> Result<Value, CrmError> {
        self.request(HttpMethod::Get, endpoint, Some(query), None).await
    }

    async fn post(&self, endpoint: &str, body: &Value) -> Result<Value, CrmError> {
        self.request(HttpMethod::Post, endpoint, None, Some(body)).await
    }

    async fn patch(&self, endpoint: &str, body: &Value) -> Result<Value, CrmError> {
        self.request(HttpMethod::Patch, endpoint, None, Some(body)).await
    }
}
