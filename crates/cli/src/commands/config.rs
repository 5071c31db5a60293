use std::env;
use std::fs;
use std::path::{Path, PathBuf};

use kommo_core::config::{AppConfig, LoadOptions};
use secrecy::{ExposeSecret, SecretString};
use toml::Value;

use super::CommandResult;

/// One rendered setting: dotted key, display value and the env vars that can set it.
struct Setting {
    key: &'static str,
    value: String,
    env_keys: &'static [&'static str],
}

impl Setting {
    fn new(key: &'static str, value: impl Into<String>, env_keys: &'static [&'static str]) -> Self {
        Self { key, value: value.into(), env_keys }
    }
}

pub fn run(options: &LoadOptions) -> CommandResult {
    let config = match AppConfig::load(options.clone()) {
        Ok(config) => config,
        Err(error) => return CommandResult::failed(2, format!("config validation failed: {error}")),
    };

    let config_file_path = detect_config_path(options.config_path.as_deref());
    let config_file_doc = load_config_file_doc(config_file_path.as_deref());

    let mut lines = vec!["effective config (source precedence: env > file > default):".to_string()];
    for setting in settings(&config) {
        let source =
            field_source(&setting, config_file_doc.as_ref(), config_file_path.as_deref());
        lines.push(format!("- {} = {} (source: {source})", setting.key, setting.value));
    }

    CommandResult::ok(lines.join("\n"))
}

fn settings(config: &AppConfig) -> Vec<Setting> {
    vec![
        Setting::new("crm.subdomain", unset_or(config.crm.subdomain.as_deref()), &["KOMMO_CRM_SUBDOMAIN"]),
        Setting::new("crm.base_url", unset_or(config.crm.base_url.as_deref()), &["KOMMO_CRM_BASE_URL"]),
        Setting::new(
            "crm.access_token",
            redact_token(config.crm.access_token.as_ref()),
            &["KOMMO_CRM_ACCESS_TOKEN", "KOMMO_ACCESS_TOKEN"],
        ),
        Setting::new("crm.timeout_secs", config.crm.timeout_secs.to_string(), &["KOMMO_CRM_TIMEOUT_SECS"]),
        Setting::new("sheets.api_key", redact_token(config.sheets.api_key.as_ref()), &["KOMMO_SHEETS_API_KEY"]),
        Setting::new(
            "sheets.spreadsheet_id",
            unset_or(config.sheets.spreadsheet_id.as_deref()),
            &["KOMMO_SHEETS_SPREADSHEET_ID"],
        ),
        Setting::new("sheets.sheet_name", config.sheets.sheet_name.clone(), &["KOMMO_SHEETS_SHEET_NAME"]),
        Setting::new("server.bind_address", config.server.bind_address.clone(), &["KOMMO_SERVER_BIND_ADDRESS"]),
        Setting::new("server.port", config.server.port.to_string(), &["KOMMO_SERVER_PORT", "PORT"]),
        Setting::new("auth.password", redact_token(config.auth.password.as_ref()), &["KOMMO_AUTH_PASSWORD"]),
        Setting::new(
            "cache.pipelines_ttl_secs",
            config.cache.pipelines_ttl_secs.to_string(),
            &["KOMMO_CACHE_PIPELINES_TTL_SECS"],
        ),
        Setting::new(
            "cache.stages_ttl_secs",
            config.cache.stages_ttl_secs.to_string(),
            &["KOMMO_CACHE_STAGES_TTL_SECS"],
        ),
        Setting::new(
            "cache.custom_fields_ttl_secs",
            config.cache.custom_fields_ttl_secs.to_string(),
            &["KOMMO_CACHE_CUSTOM_FIELDS_TTL_SECS"],
        ),
        Setting::new(
            "cache.users_ttl_secs",
            config.cache.users_ttl_secs.to_string(),
            &["KOMMO_CACHE_USERS_TTL_SECS"],
        ),
        Setting::new("logging.level", config.logging.level.clone(), &["KOMMO_LOGGING_LEVEL", "KOMMO_LOG_LEVEL"]),
        Setting::new(
            "logging.format",
            format!("{:?}", config.logging.format),
            &["KOMMO_LOGGING_FORMAT", "KOMMO_LOG_FORMAT"],
        ),
    ]
}

fn detect_config_path(explicit: Option<&Path>) -> Option<PathBuf> {
    if let Some(path) = explicit {
        return path.exists().then(|| path.to_path_buf());
    }

    [PathBuf::from("kommo.toml"), PathBuf::from("config/kommo.toml")].into_iter().find(|path| path.exists())
}

fn load_config_file_doc(path: Option<&Path>) -> Option<Value> {
    let path = path?;
    let raw = fs::read_to_string(path).ok()?;
    raw.parse::<Value>().ok()
}

fn field_source(setting: &Setting, config_file_doc: Option<&Value>, config_file_path: Option<&Path>) -> String {
    if let Some(env_key) =
        setting.env_keys.iter().find(|key| env::var(key).is_ok_and(|value| !value.trim().is_empty()))
    {
        return format!("env ({env_key})");
    }

    if let Some(doc) = config_file_doc {
        if contains_path(doc, setting.key) {
            let file_path = config_file_path
                .map(|path| path.display().to_string())
                .unwrap_or_else(|| "config file".to_string());
            return format!("file ({file_path})");
        }
    }

    "default".to_string()
}

fn contains_path(root: &Value, key_path: &str) -> bool {
    let mut current = root;
    for key in key_path.split('.') {
        let Some(next) = current.get(key) else {
            return false;
        };
        current = next;
    }
    true
}

fn unset_or(value: Option<&str>) -> String {
    value.unwrap_or("<unset>").to_string()
}

/// Shows at most the first four characters of a secret.
fn redact_token(token: Option<&SecretString>) -> String {
    let Some(token) = token else {
        return "<unset>".to_string();
    };
    let trimmed = token.expose_secret().trim();
    if trimmed.is_empty() {
        return "<empty>".to_string();
    }
    if trimmed.chars().count() <= 8 {
        return "<redacted>".to_string();
    }

    let prefix: String = trimmed.chars().take(4).collect();
    format!("{prefix}***")
}

#[cfg(test)]
mod tests {
    use secrecy::SecretString;

    use super::redact_token;

    #[test]
    fn secrets_never_render_in_full() {
        let long = SecretString::from("eyJhbGciOiJSUzI1NiJ9.payload".to_string());
        let short = SecretString::from("s3cret".to_string());

        assert_eq!(redact_token(Some(&long)), "eyJh***");
        assert_eq!(redact_token(Some(&short)), "<redacted>");
        assert_eq!(redact_token(None), "<unset>");
    }
}
