use std::env;
use std::sync::{Mutex, OnceLock};

use paydesk_cli::commands::{config, doctor, export, migrate};
use serde_json::Value;

#[test]
fn migrate_returns_success_with_valid_env() {
    with_env(
        &[
            ("PAYDESK_DATABASE_URL", "sqlite::memory:"),
            ("PAYDESK_TELEGRAM_BOT_TOKEN", "123456:test-token"),
            ("PAYDESK_TELEGRAM_ADMIN_IDS", "1"),
            ("PAYDESK_SHEETS_SPREADSHEET_ID", "sheet-test"),
            ("PAYDESK_SHEETS_ACCESS_TOKEN", "ya29.test"),
        ],
        || {
            let result = migrate::run();
            assert_eq!(result.exit_code, 0, "expected successful migrate run");

            let payload = parse_payload(&result.output);
            assert_eq!(payload["command"], "migrate");
            assert_eq!(payload["status"], "ok");
        },
    );
}

#[test]
fn migrate_returns_config_failure_without_env() {
    with_env(&[], || {
        let result = migrate::run();
        assert_eq!(result.exit_code, 2, "expected config validation failure code");

        let payload = parse_payload(&result.output);
        assert_eq!(payload["command"], "migrate");
        assert_eq!(payload["status"], "error");
        assert_eq!(payload["error_class"], "config_validation");
    });
}

#[test]
fn export_drains_an_empty_backlog_without_touching_the_ledger() {
    with_env(
        &[
            ("PAYDESK_DATABASE_URL", "sqlite::memory:"),
            ("PAYDESK_TELEGRAM_BOT_TOKEN", "123456:test-token"),
            ("PAYDESK_TELEGRAM_ADMIN_IDS", "1"),
            ("PAYDESK_SHEETS_SPREADSHEET_ID", "sheet-test"),
            ("PAYDESK_SHEETS_ACCESS_TOKEN", "ya29.test"),
        ],
        || {
            // A fresh database has no decided requests, so the drain is a
            // no-op and never issues a Sheets call.
            let result = export::run();
            assert_eq!(result.exit_code, 0, "expected successful export run");

            let payload = parse_payload(&result.output);
            assert_eq!(payload["command"], "export");
            assert_eq!(payload["status"], "ok");
            assert_eq!(payload["message"], "exported 0 request(s)");
        },
    );
}

#[test]
fn export_returns_config_failure_without_env() {
    with_env(&[], || {
        let result = export::run();
        assert_eq!(result.exit_code, 2, "expected config validation failure code");

        let payload = parse_payload(&result.output);
        assert_eq!(payload["command"], "export");
        assert_eq!(payload["error_class"], "config_validation");
    });
}

#[test]
fn doctor_passes_all_checks_with_valid_env() {
    with_env(
        &[
            ("PAYDESK_DATABASE_URL", "sqlite::memory:"),
            ("PAYDESK_TELEGRAM_BOT_TOKEN", "123456:test-token"),
            ("PAYDESK_TELEGRAM_ADMIN_IDS", "1"),
            ("PAYDESK_SHEETS_SPREADSHEET_ID", "sheet-test"),
            ("PAYDESK_SHEETS_ACCESS_TOKEN", "ya29.test"),
        ],
        || {
            let report: Value = serde_json::from_str(&doctor::run(true))
                .expect("doctor --json output should be valid JSON");
            assert_eq!(report["overall_status"], "pass");

            let checks = report["checks"].as_array().expect("checks array");
            assert_eq!(checks.len(), 4);
            assert!(checks.iter().all(|check| check["status"] == "pass"));
        },
    );
}

#[test]
fn doctor_skips_dependent_checks_when_config_is_invalid() {
    with_env(&[], || {
        let report: Value = serde_json::from_str(&doctor::run(true))
            .expect("doctor --json output should be valid JSON");
        assert_eq!(report["overall_status"], "fail");

        let checks = report["checks"].as_array().expect("checks array");
        let config_check = checks
            .iter()
            .find(|check| check["name"] == "config_validation")
            .expect("config_validation check");
        assert_eq!(config_check["status"], "fail");
        assert!(checks.iter().any(|check| check["status"] == "skipped"));
    });
}

#[test]
fn config_attributes_env_sources_and_redacts_secrets() {
    with_env(
        &[
            ("PAYDESK_DATABASE_URL", "sqlite::memory:"),
            ("PAYDESK_TELEGRAM_BOT_TOKEN", "123456:super-secret"),
            ("PAYDESK_TELEGRAM_ADMIN_IDS", "1,2"),
            ("PAYDESK_SHEETS_SPREADSHEET_ID", "sheet-test"),
            ("PAYDESK_SHEETS_ACCESS_TOKEN", "ya29.super-secret"),
        ],
        || {
            let output = config::run();
            assert!(output
                .contains("- database.url = sqlite::memory: (source: env (PAYDESK_DATABASE_URL))"));
            assert!(output.contains("- telegram.bot_token = 123456:***"));
            assert!(output.contains("- sheets.access_token = ya29.***"));
            assert!(!output.contains("super-secret"), "secrets must never render in full");
            assert!(output.contains("- logging.level = info (source: default)"));
        },
    );
}

fn parse_payload(output: &str) -> Value {
    serde_json::from_str(output).expect("command output should be valid JSON")
}

fn with_env(vars: &[(&str, &str)], test_fn: impl FnOnce()) {
    static ENV_LOCK: OnceLock<Mutex<()>> = OnceLock::new();
    let _guard =
        ENV_LOCK.get_or_init(|| Mutex::new(())).lock().expect("env mutex should not be poisoned");

    let keys = [
        "PAYDESK_DATABASE_URL",
        "PAYDESK_DATABASE_MAX_CONNECTIONS",
        "PAYDESK_DATABASE_TIMEOUT_SECS",
        "PAYDESK_TELEGRAM_BOT_TOKEN",
        "PAYDESK_TELEGRAM_ADMIN_IDS",
        "PAYDESK_TELEGRAM_POLL_TIMEOUT_SECS",
        "PAYDESK_SHEETS_SPREADSHEET_ID",
        "PAYDESK_SHEETS_ACCESS_TOKEN",
        "PAYDESK_SHEETS_TIMEOUT_SECS",
        "PAYDESK_LOGGING_LEVEL",
        "PAYDESK_LOGGING_FORMAT",
        "PAYDESK_LOG_LEVEL",
        "PAYDESK_LOG_FORMAT",
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
