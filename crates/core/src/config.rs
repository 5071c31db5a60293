use std::env;
use std::fs;
use std::path::{Path, PathBuf};

use secrecy::{ExposeSecret, SecretString};
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::cache::CacheTtls;

#[derive(Clone, Debug)]
pub struct AppConfig {
    pub crm: CrmConfig,
    pub sheets: SheetsConfig,
    pub server: ServerConfig,
    pub auth: AuthConfig,
    pub cache: CacheConfig,
    pub logging: LoggingConfig,
}

#[derive(Clone, Debug)]
pub struct CrmConfig {
    pub subdomain: Option<String>,
    pub base_url: Option<String>,
    pub access_token: Option<SecretString>,
    pub timeout_secs: u64,
}

#[derive(Clone, Debug)]
pub struct SheetsConfig {
    pub api_key: Option<SecretString>,
    pub spreadsheet_id: Option<String>,
    pub sheet_name: String,
}

#[derive(Clone, Debug)]
pub struct ServerConfig {
    pub bind_address: String,
    pub port: u16,
}

#[derive(Clone, Debug)]
pub struct AuthConfig {
    pub password: Option<SecretString>,
}

#[derive(Clone, Debug)]
pub struct CacheConfig {
    pub pipelines_ttl_secs: u64,
    pub stages_ttl_secs: u64,
    pub custom_fields_ttl_secs: u64,
    pub users_ttl_secs: u64,
}

#[derive(Clone, Debug)]
pub struct LoggingConfig {
    pub level: String,
    pub format: LogFormat,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LogFormat {
    Compact,
    Pretty,
    Json,
}

#[derive(Clone, Debug, Default)]
pub struct ConfigOverrides {
    pub crm_subdomain: Option<String>,
    pub crm_base_url: Option<String>,
    pub crm_access_token: Option<String>,
    pub server_port: Option<u16>,
    pub log_level: Option<String>,
    pub log_format: Option<LogFormat>,
}

#[derive(Clone, Debug, Default)]
pub struct LoadOptions {
    pub config_path: Option<PathBuf>,
    pub require_file: bool,
    pub overrides: ConfigOverrides,
}

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("could not read config file `{path}`: {source}")]
    ReadFile { path: PathBuf, source: std::io::Error },
    #[error("could not parse config file `{path}`: {source}")]
    ParseFile { path: PathBuf, source: toml::de::Error },
    #[error("required config file was not found: `{0}`")]
    MissingConfigFile(PathBuf),
    #[error("environment variable interpolation failed for `{var}`")]
    MissingEnvInterpolation { var: String },
    #[error("unterminated environment interpolation expression")]
    UnterminatedInterpolation,
    #[error("invalid environment override for `{key}`: `{value}`")]
    InvalidEnvOverride { key: String, value: String },
    #[error("configuration validation failed: {0}")]
    Validation(String),
}

impl Default for AppConfig {
    fn default() -> Self {
        let ttls = CacheTtls::default();
        Self {
            crm: CrmConfig { subdomain: None, base_url: None, access_token: None, timeout_secs: 30 },
            sheets: SheetsConfig {
                api_key: None,
                spreadsheet_id: None,
                sheet_name: "Eventos".to_string(),
            },
            server: ServerConfig { bind_address: "0.0.0.0".to_string(), port: 3000 },
            auth: AuthConfig { password: None },
            cache: CacheConfig {
                pipelines_ttl_secs: ttls.pipelines.as_secs(),
                stages_ttl_secs: ttls.stages.as_secs(),
                custom_fields_ttl_secs: ttls.custom_fields.as_secs(),
                users_ttl_secs: ttls.users.as_secs(),
            },
            logging: LoggingConfig { level: "info".to_string(), format: LogFormat::Compact },
        }
    }
}

fn secret_value(value: String) -> SecretString {
    value.into()
}

impl std::str::FromStr for LogFormat {
    type Err = ConfigError;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match value.trim().to_ascii_lowercase().as_str() {
            "compact" => Ok(Self::Compact),
            "pretty" => Ok(Self::Pretty),
            "json" => Ok(Self::Json),
            other => Err(ConfigError::Validation(format!(
                "unsupported log format `{other}` (expected compact|pretty|json)"
            ))),
        }
    }
}

impl CrmConfig {
    /// Account base URL: the explicit `base_url` wins over one derived from `subdomain`.
    pub fn resolved_base_url(&self) -> Option<String> {
        if let Some(base_url) = &self.base_url {
            return Some(base_url.trim_end_matches('/').to_string());
        }
        self.subdomain.as_ref().map(|subdomain| subdomain_base_url(subdomain))
    }

    pub fn is_configured(&self) -> bool {
        self.resolved_base_url().is_some()
            && self
                .access_token
                .as_ref()
                .map(|token| !token.expose_secret().trim().is_empty())
                .unwrap_or(false)
    }
}

impl SheetsConfig {
    pub fn is_configured(&self) -> bool {
        self.api_key.is_some() && self.spreadsheet_id.is_some()
    }
}

impl CacheConfig {
    pub fn ttls(&self) -> CacheTtls {
        CacheTtls {
            pipelines: std::time::Duration::from_secs(self.pipelines_ttl_secs),
            stages: std::time::Duration::from_secs(self.stages_ttl_secs),
            custom_fields: std::time::Duration::from_secs(self.custom_fields_ttl_secs),
            users: std::time::Duration::from_secs(self.users_ttl_secs),
        }
    }
}

pub fn subdomain_base_url(subdomain: &str) -> String {
    format!("https://{}.kommo.com", subdomain.trim())
}

impl AppConfig {
    pub fn load(options: LoadOptions) -> Result<Self, ConfigError> {
        let mut config = Self::default();
        let maybe_path = resolve_config_path(options.config_path.as_deref());

        if let Some(path) = maybe_path {
            let patch = read_patch(&path)?;
            config.apply_patch(patch);
        } else if options.require_file {
            let expected = options.config_path.unwrap_or_else(|| PathBuf::from("kommo.toml"));
            return Err(ConfigError::MissingConfigFile(expected));
        }

        config.apply_env_overrides()?;
        config.apply_overrides(options.overrides);
        config.validate()?;

        Ok(config)
    }

    fn apply_patch(&mut self, patch: ConfigPatch) {
        if let Some(crm) = patch.crm {
            if let Some(subdomain) = crm.subdomain {
                self.crm.subdomain = Some(subdomain);
            }
            if let Some(base_url) = crm.base_url {
                self.crm.base_url = Some(base_url);
            }
            if let Some(crm_access_token_value) = crm.access_token {
                self.crm.access_token = Some(secret_value(crm_access_token_value));
            }
            if let Some(timeout_secs) = crm.timeout_secs {
                self.crm.timeout_secs = timeout_secs;
            }
        }

        if let Some(sheets) = patch.sheets {
            if let Some(sheets_api_key_value) = sheets.api_key {
                self.sheets.api_key = Some(secret_value(sheets_api_key_value));
            }
            if let Some(spreadsheet_id) = sheets.spreadsheet_id {
                self.sheets.spreadsheet_id = Some(spreadsheet_id);
            }
            if let Some(sheet_name) = sheets.sheet_name {
                self.sheets.sheet_name = sheet_name;
            }
        }

        if let Some(server) = patch.server {
            if let Some(bind_address) = server.bind_address {
                self.server.bind_address = bind_address;
            }
            if let Some(port) = server.port {
                self.server.port = port;
            }
        }

        if let Some(auth) = patch.auth {
            if let Some(auth_password_value) = auth.password {
                self.auth.password = Some(secret_value(auth_password_value));
            }
        }

        if let Some(cache) = patch.cache {
            if let Some(value) = cache.pipelines_ttl_secs {
                self.cache.pipelines_ttl_secs = value;
            }
            if let Some(value) = cache.stages_ttl_secs {
                self.cache.stages_ttl_secs = value;
            }
            if let Some(value) = cache.custom_fields_ttl_secs {
                self.cache.custom_fields_ttl_secs = value;
            }
            if let Some(value) = cache.users_ttl_secs {
                self.cache.users_ttl_secs = value;
            }
        }

        if let Some(logging) = patch.logging {
            if let Some(level) = logging.level {
                self.logging.level = level;
            }
            if let Some(format) = logging.format {
                self.logging.format = format;
            }
        }
    }

    fn apply_env_overrides(&mut self) -> Result<(), ConfigError> {
        if let Some(value) = read_env("KOMMO_CRM_SUBDOMAIN") {
            self.crm.subdomain = Some(value);
        }
        if let Some(value) = read_env("KOMMO_CRM_BASE_URL") {
            self.crm.base_url = Some(value);
        }
        let access_token =
            read_env("KOMMO_CRM_ACCESS_TOKEN").or_else(|| read_env("KOMMO_ACCESS_TOKEN"));
        if let Some(value) = access_token {
            self.crm.access_token = Some(secret_value(value));
        }
        if let Some(value) = read_env("KOMMO_CRM_TIMEOUT_SECS") {
            self.crm.timeout_secs = parse_u64("KOMMO_CRM_TIMEOUT_SECS", &value)?;
        }

        if let Some(value) = read_env("KOMMO_SHEETS_API_KEY") {
            self.sheets.api_key = Some(secret_value(value));
        }
        if let Some(value) = read_env("KOMMO_SHEETS_SPREADSHEET_ID") {
            self.sheets.spreadsheet_id = Some(value);
        }
        if let Some(value) = read_env("KOMMO_SHEETS_SHEET_NAME") {
            self.sheets.sheet_name = value;
        }

        if let Some(value) = read_env("KOMMO_SERVER_BIND_ADDRESS") {
            self.server.bind_address = value;
        }
        let port = read_env("KOMMO_SERVER_PORT").map(|value| ("KOMMO_SERVER_PORT", value));
        let port = port.or_else(|| read_env("PORT").map(|value| ("PORT", value)));
        if let Some((key, value)) = port {
            self.server.port = parse_u16(key, &value)?;
        }

        if let Some(value) = read_env("KOMMO_AUTH_PASSWORD") {
            self.auth.password = Some(secret_value(value));
        }

        if let Some(value) = read_env("KOMMO_CACHE_PIPELINES_TTL_SECS") {
            self.cache.pipelines_ttl_secs = parse_u64("KOMMO_CACHE_PIPELINES_TTL_SECS", &value)?;
        }
        if let Some(value) = read_env("KOMMO_CACHE_STAGES_TTL_SECS") {
            self.cache.stages_ttl_secs = parse_u64("KOMMO_CACHE_STAGES_TTL_SECS", &value)?;
        }
        if let Some(value) = read_env("KOMMO_CACHE_CUSTOM_FIELDS_TTL_SECS") {
            self.cache.custom_fields_ttl_secs =
                parse_u64("KOMMO_CACHE_CUSTOM_FIELDS_TTL_SECS", &value)?;
        }
        if let Some(value) = read_env("KOMMO_CACHE_USERS_TTL_SECS") {
            self.cache.users_ttl_secs = parse_u64("KOMMO_CACHE_USERS_TTL_SECS", &value)?;
        }

        let log_level = read_env("KOMMO_LOGGING_LEVEL").or_else(|| read_env("KOMMO_LOG_LEVEL"));
        if let Some(value) = log_level {
            self.logging.level = value;
        }
        let log_format = read_env("KOMMO_LOGGING_FORMAT").or_else(|| read_env("KOMMO_LOG_FORMAT"));
        if let Some(value) = log_format {
            self.logging.format = value.parse()?;
        }

        Ok(())
    }

    fn apply_overrides(&mut self, overrides: ConfigOverrides) {
        if let Some(subdomain) = overrides.crm_subdomain {
            self.crm.subdomain = Some(subdomain);
        }
        if let Some(base_url) = overrides.crm_base_url {
            self.crm.base_url = Some(base_url);
        }
        if let Some(access_token) = overrides.crm_access_token {
            self.crm.access_token = Some(secret_value(access_token));
        }
        if let Some(port) = overrides.server_port {
            self.server.port = port;
        }
        if let Some(log_level) = overrides.log_level {
            self.logging.level = log_level;
        }
        if let Some(log_format) = overrides.log_format {
            self.logging.format = log_format;
        }
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        validate_crm(&self.crm)?;
        validate_sheets(&self.sheets)?;
        validate_server(&self.server)?;
        validate_cache(&self.cache)?;
        validate_logging(&self.logging)?;
        Ok(())
    }
}

fn resolve_config_path(explicit_path: Option<&Path>) -> Option<PathBuf> {
    if let Some(path) = explicit_path {
        return path.exists().then_some(path.to_path_buf());
    }

    [PathBuf::from("kommo.toml"), PathBuf::from("config/kommo.toml")]
        .into_iter()
        .find(|path| path.exists())
}

fn read_patch(path: &Path) -> Result<ConfigPatch, ConfigError> {
    let raw = fs::read_to_string(path)
        .map_err(|source| ConfigError::ReadFile { path: path.to_path_buf(), source })?;

    let interpolated = interpolate_env_vars(&raw)?;
    toml::from_str::<ConfigPatch>(&interpolated)
        .map_err(|source| ConfigError::ParseFile { path: path.to_path_buf(), source })
}

fn interpolate_env_vars(input: &str) -> Result<String, ConfigError> {
    let mut output = String::with_capacity(input.len());
    let mut chars = input.chars().peekable();

    while let Some(ch) = chars.next() {
        if ch == '$' && matches!(chars.peek(), Some('{')) {
            chars.next();
            let mut key = String::new();

            loop {
                match chars.next() {
                    Some('}') => break,
                    Some(next) => key.push(next),
                    None => return Err(ConfigError::UnterminatedInterpolation),
                }
            }

            let value = env::var(&key)
                .map_err(|_| ConfigError::MissingEnvInterpolation { var: key.clone() })?;
            output.push_str(&value);
            continue;
        }

        output.push(ch);
    }

    Ok(output)
}

fn validate_crm(crm: &CrmConfig) -> Result<(), ConfigError> {
    if let Some(subdomain) = &crm.subdomain {
        let valid = !subdomain.trim().is_empty()
            && subdomain.chars().all(|ch| ch.is_ascii_alphanumeric() || ch == '-');
        if !valid {
            return Err(ConfigError::Validation(
                "crm.subdomain must contain only letters, digits and `-`".to_string(),
            ));
        }
    }

    if let Some(base_url) = &crm.base_url {
        if !base_url.starts_with("http://") && !base_url.starts_with("https://") {
            return Err(ConfigError::Validation(
                "crm.base_url must start with http:// or https://".to_string(),
            ));
        }
    }

    if crm.timeout_secs == 0 || crm.timeout_secs > 300 {
        return Err(ConfigError::Validation(
            "crm.timeout_secs must be in range 1..=300".to_string(),
        ));
    }

    Ok(())
}

fn validate_sheets(sheets: &SheetsConfig) -> Result<(), ConfigError> {
    if sheets.sheet_name.trim().is_empty() {
        return Err(ConfigError::Validation("sheets.sheet_name must not be empty".to_string()));
    }

    if sheets.api_key.is_some() != sheets.spreadsheet_id.is_some() {
        return Err(ConfigError::Validation(
            "sheets.api_key and sheets.spreadsheet_id must be configured together".to_string(),
        ));
    }

    Ok(())
}

fn validate_server(server: &ServerConfig) -> Result<(), ConfigError> {
    if server.port == 0 {
        return Err(ConfigError::Validation("server.port must be greater than zero".to_string()));
    }

    if server.bind_address.trim().is_empty() {
        return Err(ConfigError::Validation("server.bind_address must not be empty".to_string()));
    }

    Ok(())
}

fn validate_cache(cache: &CacheConfig) -> Result<(), ConfigError> {
    let ttls = [
        ("cache.pipelines_ttl_secs", cache.pipelines_ttl_secs),
        ("cache.stages_ttl_secs", cache.stages_ttl_secs),
        ("cache.custom_fields_ttl_secs", cache.custom_fields_ttl_secs),
        ("cache.users_ttl_secs", cache.users_ttl_secs),
    ];
    if let Some((name, _)) = ttls.iter().find(|(_, secs)| *secs == 0) {
        return Err(ConfigError::Validation(format!("{name} must be greater than zero")));
    }

    Ok(())
}

fn validate_logging(logging: &LoggingConfig) -> Result<(), ConfigError> {
    let level = logging.level.trim().to_ascii_lowercase();
    match level.as_str() {
        "trace" | "debug" | "info" | "warn" | "error" => Ok(()),
        _ => Err(ConfigError::Validation(
            "logging.level must be one of trace|debug|info|warn|error".to_string(),
        )),
    }
}

fn read_env(key: &str) -> Option<String> {
    env::var(key).ok().filter(|value| !value.trim().is_empty())
}

fn parse_u16(key: &str, value: &str) -> Result<u16, ConfigError> {
    value.parse::<u16>().map_err(|_| ConfigError::InvalidEnvOverride {
        key: key.to_string(),
        value: value.to_string(),
    })
}

fn parse_u64(key: &str, value: &str) -> Result<u64, ConfigError> {
    value.parse::<u64>().map_err(|_| ConfigError::InvalidEnvOverride {
        key: key.to_string(),
        value: value.to_string(),
    })
}

#[derive(Debug, Default, Deserialize)]
struct ConfigPatch {
    crm: Option<CrmPatch>,
    sheets: Option<SheetsPatch>,
    server: Option<ServerPatch>,
    auth: Option<AuthPatch>,
    cache: Option<CachePatch>,
    logging: Option<LoggingPatch>,
}

#[derive(Debug, Default, Deserialize)]
struct CrmPatch {
    subdomain: Option<String>,
    base_url: Option<String>,
    access_token: Option<String>,
    timeout_secs: Option<u64>,
}

#[derive(Debug, Default, Deserialize)]
struct SheetsPatch {
    api_key: Option<String>,
    spreadsheet_id: Option<String>,
    sheet_name: Option<String>,
}

#[derive(Debug, Default, Deserialize)]
struct ServerPatch {
    bind_address: Option<String>,
    port: Option<u16>,
}

#[derive(Debug, Default, Deserialize)]
struct AuthPatch {
    password: Option<String>,
}

#[derive(Debug, Default, Deserialize)]
struct CachePatch {
    pipelines_ttl_secs: Option<u64>,
    stages_ttl_secs: Option<u64>,
    custom_fields_ttl_secs: Option<u64>,
    users_ttl_secs: Option<u64>,
}

#[derive(Debug, Default, Deserialize)]
struct LoggingPatch {
    level: Option<String>,
    format: Option<LogFormat>,
}

#[cfg(test)]
mod tests {
    use std::env;
    use std::fs;
    use std::io;
    use std::sync::{Mutex, OnceLock};

    use secrecy::ExposeSecret;
    use tempfile::TempDir;

    use super::{AppConfig, ConfigError, ConfigOverrides, LoadOptions, LogFormat};

    static ENV_LOCK: OnceLock<Mutex<()>> = OnceLock::new();

    fn env_lock() -> &'static Mutex<()> {
        ENV_LOCK.get_or_init(|| Mutex::new(()))
    }

    fn clear_vars(vars: &[&str]) {
        for var in vars {
            env::remove_var(var);
        }
    }

    fn ensure(condition: bool, message: &'static str) -> Result<(), String> {
        if condition {
            Ok(())
        } else {
            Err(message.to_string())
        }
    }

    #[test]
    fn defaults_load_without_credentials() -> Result<(), String> {
        let _guard = env_lock().lock().map_err(|_| "env lock is poisoned".to_string())?;

        let config = AppConfig::load(LoadOptions::default())
            .map_err(|err| format!("config load failed: {err}"))?;

        ensure(config.server.port == 3000, "default port should be 3000")?;
        ensure(config.server.bind_address == "0.0.0.0", "default bind should be all interfaces")?;
        ensure(config.sheets.sheet_name == "Eventos", "default sheet name should be Eventos")?;
        ensure(!config.crm.is_configured(), "crm should not be configured by default")?;
        ensure(config.cache.custom_fields_ttl_secs == 3600, "custom fields ttl should be 1h")?;
        Ok(())
    }

    #[test]
    fn file_load_supports_env_interpolation() -> Result<(), String> {
        let _guard = env_lock().lock().map_err(|_| "env lock is poisoned".to_string())?;

        env::set_var("TEST_KOMMO_TOKEN", "token-from-env");

        let result = (|| -> Result<(), String> {
            let dir = TempDir::new().map_err(|err: io::Error| err.to_string())?;
            let path = dir.path().join("kommo.toml");
            fs::write(
                &path,
                r#"
[crm]
subdomain = "acme"
access_token = "${TEST_KOMMO_TOKEN}"
"#,
            )
            .map_err(|err| err.to_string())?;

            let config =
                AppConfig::load(LoadOptions { config_path: Some(path), ..LoadOptions::default() })
                    .map_err(|err| format!("config load failed: {err}"))?;

            let token = config.crm.access_token.as_ref().map(|token| token.expose_secret());
            ensure(token == Some("token-from-env"), "token should be interpolated from env")?;
            ensure(
                config.crm.resolved_base_url().as_deref() == Some("https://acme.kommo.com"),
                "base url should be derived from subdomain",
            )?;
            ensure(config.crm.is_configured(), "crm should be configured")?;
            Ok(())
        })();

        clear_vars(&["TEST_KOMMO_TOKEN"]);
        result
    }

    #[test]
    fn missing_interpolation_variable_is_reported() -> Result<(), String> {
        let _guard = env_lock().lock().map_err(|_| "env lock is poisoned".to_string())?;

        let dir = TempDir::new().map_err(|err: io::Error| err.to_string())?;
        let path = dir.path().join("kommo.toml");
        fs::write(&path, "[auth]\npassword = \"${KOMMO_TEST_UNSET_VAR}\"\n")
            .map_err(|err| err.to_string())?;

        let error = AppConfig::load(LoadOptions { config_path: Some(path), ..LoadOptions::default() })
            .err()
            .ok_or_else(|| "expected interpolation failure".to_string())?;
        ensure(
            matches!(error, ConfigError::MissingEnvInterpolation { ref var } if var == "KOMMO_TEST_UNSET_VAR"),
            "error should name the missing variable",
        )
    }

    #[test]
    fn logging_env_aliases_are_supported() -> Result<(), String> {
        let _guard = env_lock().lock().map_err(|_| "env lock is poisoned".to_string())?;

        env::set_var("KOMMO_LOG_LEVEL", "warn");
        env::set_var("KOMMO_LOG_FORMAT", "json");

        let result = (|| -> Result<(), String> {
            let config = AppConfig::load(LoadOptions::default())
                .map_err(|err| format!("config load failed: {err}"))?;

            ensure(config.logging.level == "warn", "warning log level should be set from env var")?;
            ensure(
                matches!(config.logging.format, LogFormat::Json),
                "json logging format should be set from env var",
            )?;
            Ok(())
        })();

        clear_vars(&["KOMMO_LOG_LEVEL", "KOMMO_LOG_FORMAT"]);
        result
    }

    #[test]
    fn precedence_defaults_file_env_overrides() -> Result<(), String> {
        let _guard = env_lock().lock().map_err(|_| "env lock is poisoned".to_string())?;

        env::set_var("KOMMO_CRM_SUBDOMAIN", "from-env");
        env::set_var("KOMMO_SERVER_PORT", "4100");

        let result = (|| -> Result<(), String> {
            let dir = TempDir::new().map_err(|err: io::Error| err.to_string())?;
            let path = dir.path().join("kommo.toml");
            fs::write(
                &path,
                r#"
[crm]
subdomain = "from-file"
timeout_secs = 12

[server]
port = 4000

[logging]
level = "warn"
"#,
            )
            .map_err(|err| err.to_string())?;

            let config = AppConfig::load(LoadOptions {
                config_path: Some(path),
                overrides: ConfigOverrides {
                    server_port: Some(4200),
                    log_level: Some("debug".to_string()),
                    ..ConfigOverrides::default()
                },
                ..LoadOptions::default()
            })
            .map_err(|err| format!("config load failed: {err}"))?;

            ensure(config.server.port == 4200, "override port should win")?;
            ensure(config.logging.level == "debug", "overridden log level should be debug")?;
            ensure(
                config.crm.subdomain.as_deref() == Some("from-env"),
                "env subdomain should win over file",
            )?;
            ensure(config.crm.timeout_secs == 12, "file timeout should win over default")?;
            Ok(())
        })();

        clear_vars(&["KOMMO_CRM_SUBDOMAIN", "KOMMO_SERVER_PORT"]);
        result
    }

    #[test]
    fn invalid_numeric_env_override_is_rejected() -> Result<(), String> {
        let _guard = env_lock().lock().map_err(|_| "env lock is poisoned".to_string())?;

        env::set_var("KOMMO_CRM_TIMEOUT_SECS", "soon");

        let result = (|| -> Result<(), String> {
            let error = match AppConfig::load(LoadOptions::default()) {
                Ok(_) => return Err("expected override failure".to_string()),
                Err(error) => error,
            };
            ensure(
                matches!(error, ConfigError::InvalidEnvOverride { ref key, .. } if key == "KOMMO_CRM_TIMEOUT_SECS"),
                "error should name the env var",
            )
        })();

        clear_vars(&["KOMMO_CRM_TIMEOUT_SECS"]);
        result
    }

    #[test]
    fn validation_fails_fast_with_actionable_error() -> Result<(), String> {
        let _guard = env_lock().lock().map_err(|_| "env lock is poisoned".to_string())?;

        env::set_var("KOMMO_CRM_BASE_URL", "acme.kommo.com");

        let result = (|| -> Result<(), String> {
            let error = match AppConfig::load(LoadOptions::default()) {
                Ok(_) => {
                    return Err("expected validation failure but config load succeeded".to_string())
                }
                Err(error) => error,
            };
            let has_message = matches!(
                error,
                ConfigError::Validation(ref message) if message.contains("crm.base_url")
            );
            ensure(has_message, "validation failure should mention crm.base_url")
        })();

        clear_vars(&["KOMMO_CRM_BASE_URL"]);
        result
    }

    #[test]
    fn sheets_credentials_must_come_together() -> Result<(), String> {
        let _guard = env_lock().lock().map_err(|_| "env lock is poisoned".to_string())?;

        env::set_var("KOMMO_SHEETS_API_KEY", "sheets-key");

        let result = (|| -> Result<(), String> {
            let error = AppConfig::load(LoadOptions::default())
                .err()
                .ok_or_else(|| "expected validation failure".to_string())?;
            ensure(
                matches!(error, ConfigError::Validation(ref message) if message.contains("sheets.spreadsheet_id")),
                "validation failure should mention sheets.spreadsheet_id",
            )
        })();

        clear_vars(&["KOMMO_SHEETS_API_KEY"]);
        result
    }

    #[test]
    fn secret_values_are_not_leaked_by_debug() -> Result<(), String> {
        let _guard = env_lock().lock().map_err(|_| "env lock is poisoned".to_string())?;

        env::set_var("KOMMO_CRM_ACCESS_TOKEN", "crm-secret-value");
        env::set_var("KOMMO_AUTH_PASSWORD", "auth-secret-value");

        let result = (|| -> Result<(), String> {
            let config = AppConfig::load(LoadOptions::default())
                .map_err(|err| format!("config load failed: {err}"))?;
            let debug = format!("{config:?}");

            ensure(!debug.contains("crm-secret-value"), "debug output should not contain token")?;
            ensure(
                !debug.contains("auth-secret-value"),
                "debug output should not contain password",
            )?;
            ensure(
                matches!(config.logging.format, LogFormat::Compact),
                "default logging format should be compact",
            )?;
            Ok(())
        })();

        clear_vars(&["KOMMO_CRM_ACCESS_TOKEN", "KOMMO_AUTH_PASSWORD"]);
        result
    }
}
