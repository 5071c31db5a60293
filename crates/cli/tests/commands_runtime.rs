use std::env;
use std::fs;
use std::sync::{Mutex, OnceLock};

use kommo_cli::commands::{config, doctor, tools};
use kommo_core::config::LoadOptions;
use serde_json::Value;
use tempfile::TempDir;

#[test]
fn config_attributes_sources_and_redacts_secrets() {
    let dir = TempDir::new().expect("temp dir should be created");
    let path = dir.path().join("kommo.toml");
    fs::write(&path, "[crm]\ntimeout_secs = 12\n").expect("config file should be written");

    with_env(
        &[("KOMMO_CRM_SUBDOMAIN", "acme"), ("KOMMO_AUTH_PASSWORD", "super-secret-password")],
        || {
            let options = LoadOptions { config_path: Some(path.clone()), ..LoadOptions::default() };
            let result = config::run(&options);
            assert_eq!(result.exit_code, 0, "expected config to load");

            let output = &result.output;
            assert!(output.contains("- crm.subdomain = acme (source: env (KOMMO_CRM_SUBDOMAIN))"));
            assert!(output.contains(&format!("- crm.timeout_secs = 12 (source: file ({}))", path.display())));
            assert!(output.contains("- server.port = 3000 (source: default)"));
            assert!(output.contains("- auth.password = supe*** (source: env (KOMMO_AUTH_PASSWORD))"));
            assert!(!output.contains("super-secret-password"));
        },
    );
}

#[test]
fn config_reports_invalid_overrides() {
    with_env(&[("KOMMO_CRM_TIMEOUT_SECS", "soon")], || {
        let result = config::run(&LoadOptions::default());
        assert_eq!(result.exit_code, 2);
        assert!(result.output.contains("KOMMO_CRM_TIMEOUT_SECS"));
    });
}

#[test]
fn doctor_passes_with_defaults_and_skips_remote_checks() {
    with_env(&[], || {
        let result = doctor::run(&LoadOptions::default(), true);
        assert_eq!(result.exit_code, 0, "skipped checks should not fail the report");

        let payload = parse_payload(&result.output);
        assert_eq!(payload["overall_status"], "pass");
        assert_eq!(check_status(&payload, "config_validation"), "pass");
        assert_eq!(check_status(&payload, "auth_password"), "skipped");
        assert_eq!(check_status(&payload, "sheets_readiness"), "skipped");
        assert_eq!(check_status(&payload, "crm_connectivity"), "skipped");
    });
}

#[test]
fn doctor_marks_configured_sheets_and_password_ready() {
    with_env(
        &[
            ("KOMMO_AUTH_PASSWORD", "s3cret"),
            ("KOMMO_SHEETS_API_KEY", "sheets-key"),
            ("KOMMO_SHEETS_SPREADSHEET_ID", "sheet-1"),
        ],
        || {
            let result = doctor::run(&LoadOptions::default(), true);
            let payload = parse_payload(&result.output);
            assert_eq!(check_status(&payload, "auth_password"), "pass");
            assert_eq!(check_status(&payload, "sheets_readiness"), "pass");
        },
    );
}

#[test]
fn doctor_fails_when_config_does_not_load() {
    with_env(&[("KOMMO_SERVER_PORT", "not-a-port")], || {
        let result = doctor::run(&LoadOptions::default(), false);
        assert_eq!(result.exit_code, 1);
        assert!(result.output.starts_with("doctor: one or more readiness checks failed"));
        assert!(result.output.contains("- [fail] config_validation:"));
        assert!(result.output.contains("- [skip] crm_connectivity:"));
    });
}

#[test]
fn tools_lists_catalog_and_marks_writes() {
    let result = tools::run(false);
    assert_eq!(result.exit_code, 0);
    assert!(result.output.starts_with("19 tools:"));
    assert!(result.output.contains("- kommo_update_lead [writes]:"));
    assert!(result.output.contains("- kommo_list_leads:"));
}

#[test]
fn tools_json_carries_schemas() {
    let result = tools::run(true);
    let payload = parse_payload(&result.output);
    let entries = payload.as_array().cloned().unwrap_or_default();

    assert_eq!(entries.len(), 19);
    let create = entries.iter().find(|entry| entry["name"] == "kommo_create_lead").cloned().unwrap_or_default();
    assert_eq!(create["mutates"], true);
    assert_eq!(create["inputSchema"]["type"], "object");
}

fn parse_payload(output: &str) -> Value {
    serde_json::from_str(output).expect("command output should be valid JSON")
}

fn check_status(payload: &Value, name: &str) -> String {
    payload["checks"]
        .as_array()
        .and_then(|checks| checks.iter().find(|check| check["name"] == name))
        .and_then(|check| check["status"].as_str())
        .unwrap_or_default()
        .to_string()
}

fn with_env(vars: &[(&str, &str)], test_fn: impl FnOnce()) {
    static ENV_LOCK: OnceLock<Mutex<()>> = OnceLock::new();
    let _guard =
        ENV_LOCK.get_or_init(|| Mutex::new(())).lock().expect("env mutex should not be poisoned");

    let keys = [
        "KOMMO_CRM_SUBDOMAIN",
        "KOMMO_CRM_BASE_URL",
        "KOMMO_CRM_ACCESS_TOKEN",
        "KOMMO_ACCESS_TOKEN",
        "KOMMO_CRM_TIMEOUT_SECS",
        "KOMMO_SHEETS_API_KEY",
        "KOMMO_SHEETS_SPREADSHEET_ID",
        "KOMMO_SHEETS_SHEET_NAME",
        "KOMMO_SERVER_BIND_ADDRESS",
        "KOMMO_SERVER_PORT",
        "PORT",
        "KOMMO_AUTH_PASSWORD",
        "KOMMO_CACHE_PIPELINES_TTL_SECS",
        "KOMMO_CACHE_STAGES_TTL_SECS",
        "KOMMO_CACHE_CUSTOM_FIELDS_TTL_SECS",
        "KOMMO_CACHE_USERS_TTL_SECS",
        "KOMMO_LOGGING_LEVEL",
        "KOMMO_LOGGING_FORMAT",
        "KOMMO_LOG_LEVEL",
        "KOMMO_LOG_FORMAT",
    ];

    let previous_values: Vec<(&str, Option<String>)> =
        keys.iter().map(|key| (*key, env::var(key).ok())).collect();

    for key in &keys {
        env::remove_var(key);
    }
    for (key, value) in vars {
        env::set_var(key, value);
    }

    test_fn();

    for (key, value) in previous_values {
        if let Some(value) = value {
            env::set_var(key, value);
        } else {
            env::remove_var(key);
        }
    }
}
