use std::time::Duration;

use kommo_core::config::{AppConfig, LoadOptions};
use kommo_crm::{CrmApi, HttpCrmClient, Query};
use secrecy::SecretString;
use serde::Serialize;

use super::{escape_json, CommandResult};

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
enum CheckStatus {
    Pass,
    Fail,
    Skipped,
}

#[derive(Debug, Serialize)]
struct DoctorCheck {
    name: &'static str,
    status: CheckStatus,
    details: String,
}

impl DoctorCheck {
    fn new(name: &'static str, status: CheckStatus, details: impl Into<String>) -> Self {
        Self { name, status, details: details.into() }
    }
}

#[derive(Debug, Serialize)]
struct DoctorReport {
    overall_status: CheckStatus,
    summary: String,
    checks: Vec<DoctorCheck>,
}

pub fn run(options: &LoadOptions, json_output: bool) -> CommandResult {
    let report = build_report(options);
    let exit_code = if report.overall_status == CheckStatus::Pass { 0 } else { 1 };

    let output = if json_output {
        serde_json::to_string_pretty(&report).unwrap_or_else(|error| {
            format!(
                "{{\"overall_status\":\"fail\",\"summary\":\"doctor serialization failed\",\"error\":\"{}\"}}",
                escape_json(&error.to_string())
            )
        })
    } else {
        render_human(&report)
    };

    CommandResult { exit_code, output }
}

fn build_report(options: &LoadOptions) -> DoctorReport {
    let mut checks = Vec::new();

    match AppConfig::load(options.clone()) {
        Ok(config) => {
            checks.push(DoctorCheck::new(
                "config_validation",
                CheckStatus::Pass,
                "configuration loaded and validated",
            ));
            checks.push(check_auth_password(&config));
            checks.push(check_sheets(&config));
            checks.push(check_crm_connectivity(&config));
        }
        Err(error) => {
            checks.push(DoctorCheck::new("config_validation", CheckStatus::Fail, error.to_string()));
            for name in ["auth_password", "sheets_readiness", "crm_connectivity"] {
                checks.push(DoctorCheck::new(
                    name,
                    CheckStatus::Skipped,
                    "skipped because configuration did not load",
                ));
            }
        }
    }

    let failed = checks.iter().any(|check| check.status == CheckStatus::Fail);
    let overall_status = if failed { CheckStatus::Fail } else { CheckStatus::Pass };
    let summary = if failed {
        "doctor: one or more readiness checks failed".to_string()
    } else {
        "doctor: all readiness checks passed".to_string()
    };

    DoctorReport { overall_status, summary, checks }
}

fn check_auth_password(config: &AppConfig) -> DoctorCheck {
    match &config.auth.password {
        Some(_) => DoctorCheck::new("auth_password", CheckStatus::Pass, "HTTP bearer password is set"),
        None => DoctorCheck::new(
            "auth_password",
            CheckStatus::Skipped,
            "auth.password is unset; kommo-server will refuse to start, kommo-mcp is unaffected",
        ),
    }
}

fn check_sheets(config: &AppConfig) -> DoctorCheck {
    if config.sheets.is_configured() {
        DoctorCheck::new(
            "sheets_readiness",
            CheckStatus::Pass,
            format!("reading sheet `{}`", config.sheets.sheet_name),
        )
    } else {
        DoctorCheck::new(
            "sheets_readiness",
            CheckStatus::Skipped,
            "sheets.api_key or sheets.spreadsheet_id unset; report tools will answer with a configuration error",
        )
    }
}

fn check_crm_connectivity(config: &AppConfig) -> DoctorCheck {
    let (Some(base_url), Some(token)) = (config.crm.resolved_base_url(), config.crm.access_token.clone())
    else {
        return DoctorCheck::new(
            "crm_connectivity",
            CheckStatus::Skipped,
            "no account configured; HTTP callers supply credentials per request",
        );
    };

    let runtime = match tokio::runtime::Builder::new_current_thread().enable_all().build() {
        Ok(runtime) => runtime,
        Err(error) => {
            return DoctorCheck::new(
                "crm_connectivity",
                CheckStatus::Fail,
                format!("failed to initialize async runtime: {error}"),
            );
        }
    };

    match runtime.block_on(probe_account(&base_url, token, config.crm.timeout_secs)) {
        Ok(api_url) => DoctorCheck::new("crm_connectivity", CheckStatus::Pass, format!("reached `{api_url}`")),
        Err(error) => DoctorCheck::new("crm_connectivity", CheckStatus::Fail, error),
    }
}

async fn probe_account(base_url: &str, token: SecretString, timeout_secs: u64) -> Result<String, String> {
    let client = HttpCrmClient::new(base_url, token, Duration::from_secs(timeout_secs))
        .map_err(|error| format!("invalid CRM settings: {error}"))?;
    client
        .get("/account", &Query::new())
        .await
        .map_err(|error| format!("account lookup failed: {error}"))?;
    Ok(client.api_url().to_string())
}

fn render_human(report: &DoctorReport) -> String {
    let mut lines = Vec::new();
    lines.push(report.summary.clone());

    for check in &report.checks {
        let marker = match check.status {
            CheckStatus::Pass => "ok",
            CheckStatus::Fail => "fail",
            CheckStatus::Skipped => "skip",
        };
        lines.push(format!("- [{marker}] {}: {}", check.name, check.details));
    }

    lines.join("\n")
}
