use std::sync::Arc;
use std::time::Duration;

use kommo_core::config::{AppConfig, ConfigError};
use kommo_crm::{CrmError, HttpCrmConnector, HttpSheetsClient};
use thiserror::Error;
use tracing::info;

use crate::app::AppState;

pub struct Application {
    pub config: AppConfig,
    pub state: AppState,
}

#[derive(Debug, Error)]
pub enum BootstrapError {
    #[error(transparent)]
    Config(#[from] ConfigError),
    #[error("auth.password must be set to serve HTTP (KOMMO_AUTH_PASSWORD)")]
    MissingPassword,
    #[error("CRM client setup failed: {0}")]
    Crm(#[source] CrmError),
    #[error("spreadsheet client setup failed: {0}")]
    Sheets(#[source] CrmError),
}

pub fn bootstrap_with_config(config: AppConfig) -> Result<Application, BootstrapError> {
    info!(event_name = "system.bootstrap.start", "starting application bootstrap");
    config.validate()?;

    let password = config.auth.password.clone().ok_or(BootstrapError::MissingPassword)?;
    let timeout = Duration::from_secs(config.crm.timeout_secs);
    let connector = HttpCrmConnector::new(timeout).map_err(BootstrapError::Crm)?;
    let mut state = AppState::new(Arc::new(connector), password).with_ttls(config.cache.ttls());

    if let (Some(api_key), Some(spreadsheet_id)) = (&config.sheets.api_key, &config.sheets.spreadsheet_id) {
        let sheets =
            HttpSheetsClient::new(api_key.clone(), spreadsheet_id.clone(), config.sheets.sheet_name.clone(), timeout)
                .map_err(BootstrapError::Sheets)?;
        state = state.with_sheets(Arc::new(sheets));
        info!(event_name = "system.bootstrap.sheets", spreadsheet_id = %spreadsheet_id, "spreadsheet reporting enabled");
    }

    info!(event_name = "system.bootstrap.ready", tools = state.registry.len(), "application bootstrap complete");
    Ok(Application { config, state })
}
