use std::env;
use std::fs;
use std::path::{Path, PathBuf};

use secrecy::{ExposeSecret, SecretString};
use serde::{Deserialize, Serialize};
use thiserror::Error;

#[derive(Clone, Debug)]
pub struct AppConfig {
    pub database: DatabaseConfig,
    pub telegram: TelegramConfig,
    pub sheets: SheetsConfig,
    pub logging: LoggingConfig,
}

#[derive(Clone, Debug)]
pub struct DatabaseConfig {
    pub url: String,
    pub max_connections: u32,
    pub timeout_secs: u64,
}

#[derive(Clone, Debug)]
pub struct TelegramConfig {
    pub bot_token: SecretString,
    /// Static admin allow-list; immutable input to the lifecycle front end.
    pub admin_ids: Vec<i64>,
    pub poll_timeout_secs: u64,
}

#[derive(Clone, Debug)]
pub struct SheetsConfig {
    pub spreadsheet_id: String,
    pub access_token: SecretString,
    pub timeout_secs: u64,
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
    pub database_url: Option<String>,
    pub log_level: Option<String>,
    pub bot_token: Option<String>,
    pub admin_ids: Option<Vec<i64>>,
    pub spreadsheet_id: Option<String>,
    pub sheets_access_token: Option<String>,
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
        Self {
            database: DatabaseConfig {
                url: "sqlite://paydesk.db".to_string(),
                max_connections: 5,
                timeout_secs: 30,
            },
            telegram: TelegramConfig {
                bot_token: String::new().into(),
                admin_ids: Vec::new(),
                poll_timeout_secs: 25,
            },
            sheets: SheetsConfig {
                spreadsheet_id: String::new(),
                access_token: String::new().into(),
                timeout_secs: 30,
            },
            logging: LoggingConfig { level: "info".to_string(), format: LogFormat::Compact },
        }
    }
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

impl AppConfig {
    /// Load order: defaults, then the TOML file (with `${VAR}`
    /// interpolation), then `PAYDESK_*` environment overrides, then
    /// programmatic overrides, then validation.
    pub fn load(options: LoadOptions) -> Result<Self, ConfigError> {
        let mut config = Self::default();
        let maybe_path = resolve_config_path(options.config_path.as_deref());

        if let Some(path) = maybe_path {
            let patch = read_patch(&path)?;
            config.apply_patch(patch);
        } else if options.require_file {
            let expected = options.config_path.unwrap_or_else(|| PathBuf::from("paydesk.toml"));
            return Err(ConfigError::MissingConfigFile(expected));
        }

        config.apply_env_overrides()?;
        config.apply_overrides(options.overrides);
        config.validate()?;

        Ok(config)
    }

    fn apply_patch(&mut self, patch: ConfigPatch) {
        if let Some(database) = patch.database {
            if let Some(url) = database.url {
                self.database.url = url;
            }
            if let Some(max_connections) = database.max_connections {
                self.database.max_connections = max_connections;
            }
            if let Some(timeout_secs) = database.timeout_secs {
                self.database.timeout_secs = timeout_secs;
            }
        }

        if let Some(telegram) = patch.telegram {
            if let Some(bot_token_value) = telegram.bot_token {
                self.telegram.bot_token = bot_token_value.into();
            }
            if let Some(admin_ids) = telegram.admin_ids {
                self.telegram.admin_ids = admin_ids;
            }
            if let Some(poll_timeout_secs) = telegram.poll_timeout_secs {
                self.telegram.poll_timeout_secs = poll_timeout_secs;
            }
        }

        if let Some(sheets) = patch.sheets {
            if let Some(spreadsheet_id) = sheets.spreadsheet_id {
                self.sheets.spreadsheet_id = spreadsheet_id;
            }
            if let Some(access_token_value) = sheets.access_token {
                self.sheets.access_token = access_token_value.into();
            }
            if let Some(timeout_secs) = sheets.timeout_secs {
                self.sheets.timeout_secs = timeout_secs;
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
        if let Some(value) = read_env("PAYDESK_DATABASE_URL") {
            self.database.url = value;
        }
        if let Some(value) = read_env("PAYDESK_DATABASE_MAX_CONNECTIONS") {
            self.database.max_connections = parse_u32("PAYDESK_DATABASE_MAX_CONNECTIONS", &value)?;
        }
        if let Some(value) = read_env("PAYDESK_DATABASE_TIMEOUT_SECS") {
            self.database.timeout_secs = parse_u64("PAYDESK_DATABASE_TIMEOUT_SECS", &value)?;
        }

        if let Some(value) = read_env("PAYDESK_TELEGRAM_BOT_TOKEN") {
            self.telegram.bot_token = value.into();
        }
        if let Some(value) = read_env("PAYDESK_TELEGRAM_ADMIN_IDS") {
            self.telegram.admin_ids = parse_admin_ids("PAYDESK_TELEGRAM_ADMIN_IDS", &value)?;
        }
        if let Some(value) = read_env("PAYDESK_TELEGRAM_POLL_TIMEOUT_SECS") {
            self.telegram.poll_timeout_secs =
                parse_u64("PAYDESK_TELEGRAM_POLL_TIMEOUT_SECS", &value)?;
        }

        if let Some(value) = read_env("PAYDESK_SHEETS_SPREADSHEET_ID") {
            self.sheets.spreadsheet_id = value;
        }
        if let Some(value) = read_env("PAYDESK_SHEETS_ACCESS_TOKEN") {
            self.sheets.access_token = value.into();
        }
        if let Some(value) = read_env("PAYDESK_SHEETS_TIMEOUT_SECS") {
            self.sheets.timeout_secs = parse_u64("PAYDESK_SHEETS_TIMEOUT_SECS", &value)?;
        }

        let log_level = read_env("PAYDESK_LOGGING_LEVEL").or_else(|| read_env("PAYDESK_LOG_LEVEL"));
        if let Some(value) = log_level {
            self.logging.level = value;
        }
        let log_format =
            read_env("PAYDESK_LOGGING_FORMAT").or_else(|| read_env("PAYDESK_LOG_FORMAT"));
        if let Some(value) = log_format {
            self.logging.format = value.parse()?;
        }

        Ok(())
    }

    fn apply_overrides(&mut self, overrides: ConfigOverrides) {
        if let Some(database_url) = overrides.database_url {
            self.database.url = database_url;
        }
        if let Some(log_level) = overrides.log_level {
            self.logging.level = log_level;
        }
        if let Some(bot_token) = overrides.bot_token {
            self.telegram.bot_token = bot_token.into();
        }
        if let Some(admin_ids) = overrides.admin_ids {
            self.telegram.admin_ids = admin_ids;
        }
        if let Some(spreadsheet_id) = overrides.spreadsheet_id {
            self.sheets.spreadsheet_id = spreadsheet_id;
        }
        if let Some(access_token) = overrides.sheets_access_token {
            self.sheets.access_token = access_token.into();
        }
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        validate_database(&self.database)?;
        validate_telegram(&self.telegram)?;
        validate_sheets(&self.sheets)?;
        validate_logging(&self.logging)?;
        Ok(())
    }

    pub fn is_admin(&self, user_id: i64) -> bool {
        self.telegram.admin_ids.contains(&user_id)
    }
}

fn resolve_config_path(explicit_path: Option<&Path>) -> Option<PathBuf> {
    if let Some(path) = explicit_path {
        return path.exists().then_some(path.to_path_buf());
    }

    [PathBuf::from("paydesk.toml"), PathBuf::from("config/paydesk.toml")]
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

fn validate_database(database: &DatabaseConfig) -> Result<(), ConfigError> {
    let url = database.url.trim();
    let sqlite_url =
        url.starts_with("sqlite://") || url.starts_with("sqlite::") || url == ":memory:";
    if !sqlite_url {
        return Err(ConfigError::Validation(
            "database.url must be a sqlite URL (`sqlite://...`, `sqlite::...`, or `:memory:`)"
                .to_string(),
        ));
    }

    if database.max_connections == 0 {
        return Err(ConfigError::Validation(
            "database.max_connections must be greater than zero".to_string(),
        ));
    }

    if database.timeout_secs == 0 || database.timeout_secs > 300 {
        return Err(ConfigError::Validation(
            "database.timeout_secs must be in range 1..=300".to_string(),
        ));
    }

    Ok(())
}

fn validate_telegram(telegram: &TelegramConfig) -> Result<(), ConfigError> {
    if telegram.bot_token.expose_secret().trim().is_empty() {
        return Err(ConfigError::Validation(
            "telegram.bot_token is required. Get it from @BotFather".to_string(),
        ));
    }

    if telegram.poll_timeout_secs == 0 || telegram.poll_timeout_secs > 50 {
        return Err(ConfigError::Validation(
            "telegram.poll_timeout_secs must be in range 1..=50".to_string(),
        ));
    }

    Ok(())
}

fn validate_sheets(sheets: &SheetsConfig) -> Result<(), ConfigError> {
    if sheets.spreadsheet_id.trim().is_empty() {
        return Err(ConfigError::Validation("sheets.spreadsheet_id is required".to_string()));
    }

    if sheets.access_token.expose_secret().trim().is_empty() {
        return Err(ConfigError::Validation("sheets.access_token is required".to_string()));
    }

    if sheets.timeout_secs == 0 || sheets.timeout_secs > 300 {
        return Err(ConfigError::Validation(
            "sheets.timeout_secs must be in range 1..=300".to_string(),
        ));
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

fn parse_u32(key: &str, value: &str) -> Result<u32, ConfigError> {
    value.parse::<u32>().map_err(|_| ConfigError::InvalidEnvOverride {
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

fn parse_admin_ids(key: &str, value: &str) -> Result<Vec<i64>, ConfigError> {
    value
        .split(',')
        .map(str::trim)
        .filter(|part| !part.is_empty())
        .map(|part| {
            part.parse::<i64>().map_err(|_| ConfigError::InvalidEnvOverride {
                key: key.to_string(),
                value: value.to_string(),
            })
        })
        .collect()
}

#[derive(Debug, Default, Deserialize)]
struct ConfigPatch {
    database: Option<DatabasePatch>,
    telegram: Option<TelegramPatch>,
    sheets: Option<SheetsPatch>,
    logging: Option<LoggingPatch>,
}

#[derive(Debug, Default, Deserialize)]
struct DatabasePatch {
    url: Option<String>,
    max_connections: Option<u32>,
    timeout_secs: Option<u64>,
}

#[derive(Debug, Default, Deserialize)]
struct TelegramPatch {
    bot_token: Option<String>,
    admin_ids: Option<Vec<i64>>,
    poll_timeout_secs: Option<u64>,
}

#[derive(Debug, Default, Deserialize)]
struct SheetsPatch {
    spreadsheet_id: Option<String>,
    access_token: Option<String>,
    timeout_secs: Option<u64>,
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

    fn valid_overrides() -> ConfigOverrides {
        ConfigOverrides {
            bot_token: Some("123456:test-token".to_string()),
            spreadsheet_id: Some("sheet-1".to_string()),
            sheets_access_token: Some("ya29.test".to_string()),
            ..ConfigOverrides::default()
        }
    }

    #[test]
    fn defaults_plus_required_overrides_validate() {
        let _guard = env_lock().lock().expect("env lock");

        let config = AppConfig::load(LoadOptions {
            overrides: valid_overrides(),
            ..LoadOptions::default()
        })
        .expect("load");

        assert_eq!(config.database.url, "sqlite://paydesk.db");
        assert_eq!(config.logging.level, "info");
        assert!(config.telegram.admin_ids.is_empty());
    }

    #[test]
    fn file_values_and_env_interpolation_apply() {
        let _guard = env_lock().lock().expect("env lock");
        env::set_var("TEST_PAYDESK_BOT_TOKEN", "123:from-env");

        let dir = TempDir::new().expect("tempdir");
        let path = dir.path().join("paydesk.toml");
        fs::write(
            &path,
            r#"
[database]
url = "sqlite://from-file.db"

[telegram]
bot_token = "${TEST_PAYDESK_BOT_TOKEN}"
admin_ids = [10, 20]

[sheets]
spreadsheet_id = "sheet-from-file"
access_token = "tok-from-file"

[logging]
level = "warn"
format = "json"
"#,
        )
        .expect("write config");

        let config =
            AppConfig::load(LoadOptions { config_path: Some(path), ..LoadOptions::default() })
                .expect("load");

        assert_eq!(config.database.url, "sqlite://from-file.db");
        assert_eq!(config.telegram.bot_token.expose_secret(), "123:from-env");
        assert_eq!(config.telegram.admin_ids, vec![10, 20]);
        assert!(config.is_admin(10));
        assert!(!config.is_admin(11));
        assert_eq!(config.logging.level, "warn");
        assert_eq!(config.logging.format, LogFormat::Json);

        clear_vars(&["TEST_PAYDESK_BOT_TOKEN"]);
    }

    #[test]
    fn env_wins_over_file_and_overrides_win_over_env() {
        let _guard = env_lock().lock().expect("env lock");
        env::set_var("PAYDESK_DATABASE_URL", "sqlite://from-env.db");
        env::set_var("PAYDESK_TELEGRAM_ADMIN_IDS", "1, 2,3");

        let dir = TempDir::new().expect("tempdir");
        let path = dir.path().join("paydesk.toml");
        fs::write(
            &path,
            r#"
[database]
url = "sqlite://from-file.db"
"#,
        )
        .expect("write config");

        let config = AppConfig::load(LoadOptions {
            config_path: Some(path),
            overrides: ConfigOverrides {
                log_level: Some("debug".to_string()),
                ..valid_overrides()
            },
            ..LoadOptions::default()
        })
        .expect("load");

        assert_eq!(config.database.url, "sqlite://from-env.db");
        assert_eq!(config.telegram.admin_ids, vec![1, 2, 3]);
        assert_eq!(config.logging.level, "debug");

        clear_vars(&["PAYDESK_DATABASE_URL", "PAYDESK_TELEGRAM_ADMIN_IDS"]);
    }

    #[test]
    fn missing_bot_token_fails_validation() {
        let _guard = env_lock().lock().expect("env lock");

        let error = AppConfig::load(LoadOptions {
            overrides: ConfigOverrides { bot_token: None, ..valid_overrides() },
            ..LoadOptions::default()
        })
        .expect_err("token required");

        assert!(matches!(
            error,
            ConfigError::Validation(ref message) if message.contains("telegram.bot_token")
        ));
    }

    #[test]
    fn malformed_admin_ids_env_is_rejected() {
        let _guard = env_lock().lock().expect("env lock");
        env::set_var("PAYDESK_TELEGRAM_ADMIN_IDS", "1,abc");

        let error = AppConfig::load(LoadOptions {
            overrides: valid_overrides(),
            ..LoadOptions::default()
        })
        .expect_err("bad ids");

        assert!(matches!(error, ConfigError::InvalidEnvOverride { .. }));
        clear_vars(&["PAYDESK_TELEGRAM_ADMIN_IDS"]);
    }

    #[test]
    fn secrets_do_not_leak_through_debug() {
        let _guard = env_lock().lock().expect("env lock");

        let config = AppConfig::load(LoadOptions {
            overrides: ConfigOverrides {
                bot_token: Some("123456:very-secret".to_string()),
                sheets_access_token: Some("ya29.very-secret".to_string()),
                ..valid_overrides()
            },
            ..LoadOptions::default()
        })
        .expect("load");

        let debug = format!("{config:?}");
        assert!(!debug.contains("very-secret"));
    }
}
