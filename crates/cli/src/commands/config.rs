use std::env;
use std::fs;
use std::path::{Path, PathBuf};

use paydesk_core::config::{AppConfig, LoadOptions};
use secrecy::ExposeSecret;
use toml::Value;

pub fn run() -> String {
    let config = match AppConfig::load(LoadOptions::default()) {
        Ok(config) => config,
        Err(error) => return format!("config validation failed: {error}"),
    };

    let config_file_path = detect_config_path();
    let config_file_doc = load_config_file_doc(config_file_path.as_deref());

    let mut lines = vec!["effective config (source precedence: env > file > default):".to_string()];
    let mut push = |key: &str, value: &str, env_key: &str| {
        lines.push(render_line(
            key,
            value,
            field_source(key, env_key, config_file_doc.as_ref(), config_file_path.as_deref()),
        ));
    };

    push("database.url", &config.database.url, "PAYDESK_DATABASE_URL");
    push(
        "database.max_connections",
        &config.database.max_connections.to_string(),
        "PAYDESK_DATABASE_MAX_CONNECTIONS",
    );
    push(
        "database.timeout_secs",
        &config.database.timeout_secs.to_string(),
        "PAYDESK_DATABASE_TIMEOUT_SECS",
    );

    let bot_token = redact_token(config.telegram.bot_token.expose_secret());
    push("telegram.bot_token", &bot_token, "PAYDESK_TELEGRAM_BOT_TOKEN");
    let admin_ids: Vec<String> =
        config.telegram.admin_ids.iter().map(|id| id.to_string()).collect();
    push("telegram.admin_ids", &admin_ids.join(","), "PAYDESK_TELEGRAM_ADMIN_IDS");
    push(
        "telegram.poll_timeout_secs",
        &config.telegram.poll_timeout_secs.to_string(),
        "PAYDESK_TELEGRAM_POLL_TIMEOUT_SECS",
    );

    push("sheets.spreadsheet_id", &config.sheets.spreadsheet_id, "PAYDESK_SHEETS_SPREADSHEET_ID");
    let access_token = redact_token(config.sheets.access_token.expose_secret());
    push("sheets.access_token", &access_token, "PAYDESK_SHEETS_ACCESS_TOKEN");
    push(
        "sheets.timeout_secs",
        &config.sheets.timeout_secs.to_string(),
        "PAYDESK_SHEETS_TIMEOUT_SECS",
    );

    push("logging.level", &config.logging.level, "PAYDESK_LOGGING_LEVEL");
    push("logging.format", &format!("{:?}", config.logging.format), "PAYDESK_LOGGING_FORMAT");

    lines.join("\n")
}

fn detect_config_path() -> Option<PathBuf> {
    let root = PathBuf::from("paydesk.toml");
    if root.exists() {
        return Some(root);
    }

    let nested = PathBuf::from("config/paydesk.toml");
    if nested.exists() {
        return Some(nested);
    }

    None
}

fn load_config_file_doc(path: Option<&Path>) -> Option<Value> {
    let path = path?;
    let raw = fs::read_to_string(path).ok()?;
    raw.parse::<Value>().ok()
}

fn field_source(
    key_path: &str,
    env_key: &str,
    config_file_doc: Option<&Value>,
    config_file_path: Option<&Path>,
) -> String {
    if env::var_os(env_key).is_some() {
        return format!("env ({env_key})");
    }

    if let Some(doc) = config_file_doc {
        if contains_path(doc, key_path) {
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

fn render_line(key: &str, value: &str, source: String) -> String {
    format!("- {key} = {value} (source: {source})")
}

fn redact_token(token: &str) -> String {
    let trimmed = token.trim();
    if trimmed.is_empty() {
        return "<empty>".to_string();
    }

    if let Some((prefix, _)) = trimmed.split_once(':') {
        return format!("{prefix}:***");
    }
    if let Some((prefix, _)) = trimmed.split_once('.') {
        return format!("{prefix}.***");
    }

    "<redacted>".to_string()
}
