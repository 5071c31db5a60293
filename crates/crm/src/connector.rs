use std::sync::Arc;
use std::time::Duration;

use reqwest::Client;
use secrecy::SecretString;

use crate::client::build_http_client;
use crate::{CrmApi, CrmError, HttpCrmClient};

/// Opens a [`CrmApi`] for a given account. The HTTP server resolves the account per
/// request from the caller's credentials.
pub trait CrmConnector: Send + Sync {
    fn connect(&self, base_url: &str, access_token: SecretString)
        -> Result<Arc<dyn CrmApi>, CrmError>;
}

/// Hands out per-account clients that all share one reqwest connection pool.
#[derive(Clone, Debug)]
pub struct HttpCrmConnector {
    client: Client,
    timeout: Duration,
}

impl HttpCrmConnector {
    pub fn new(timeout: Duration) -> Result<Self, CrmError> {
        Ok(Self { client: build_http_client(timeout)?, timeout })
    }
}

impl CrmConnector for HttpCrmConnector {
    fn connect(
        &self,
        base_url: &str,
        access_token: SecretString,
    ) -> Result<Arc<dyn CrmApi>, CrmError> {
        let client = HttpCrmClient::with_client(self.client.clone(), base_url, access_token, self.timeout)?;
        Ok(Arc::new(client))
    }
}
