use std::sync::Arc;

use thiserror::Error;
use tracing::info;

use paydesk_core::config::{AppConfig, ConfigError, LoadOptions};
use paydesk_db::{connect_with_settings, migrations, DbPool, SqlRequestStore};

pub struct Application {
    pub config: AppConfig,
    pub db_pool: DbPool,
    pub store: Arc<SqlRequestStore>,
}

#[derive(Debug, Error)]
pub enum BootstrapError {
    #[error(transparent)]
    Config(#[from] ConfigError),
    #[error("database connection failed: {0}")]
    DatabaseConnect(#[source] sqlx::Error),
    #[error("database migration failed: {0}")]
    Migration(#[source] sqlx::migrate::MigrateError),
}

pub async fn bootstrap(options: LoadOptions) -> Result<Application, BootstrapError> {
    let config = AppConfig::load(options)?;
    bootstrap_with_config(config).await
}

pub async fn bootstrap_with_config(config: AppConfig) -> Result<Application, BootstrapError> {
    info!(event_name = "system.bootstrap.start", "starting application bootstrap");

    let db_pool = connect_with_settings(
        &config.database.url,
        config.database.max_connections,
        config.database.timeout_secs,
    )
    .await
    .map_err(BootstrapError::DatabaseConnect)?;
    info!(event_name = "system.bootstrap.database_connected", "database connection established");

    migrations::run_pending(&db_pool).await.map_err(BootstrapError::Migration)?;
    info!(event_name = "system.bootstrap.migrations_applied", "database migrations applied");

    let store = Arc::new(SqlRequestStore::new(db_pool.clone()));

    Ok(Application { config, db_pool, store })
}

#[cfg(test)]
mod tests {
    use paydesk_core::config::{ConfigOverrides, LoadOptions};
    use paydesk_core::domain::request::{
        Actor, BudgetCategory, PaymentMethod, RequestStatus,
    };
    use paydesk_core::store::{NewRequestRecord, RequestStore};
    use rust_decimal::Decimal;

    use crate::bootstrap::bootstrap;

    fn valid_overrides(database_url: &str) -> LoadOptions {
        LoadOptions {
            overrides: ConfigOverrides {
                database_url: Some(database_url.to_string()),
                bot_token: Some("123456:test-token".to_string()),
                admin_ids: Some(vec![1]),
                spreadsheet_id: Some("sheet-1".to_string()),
                sheets_access_token: Some("ya29.test".to_string()),
                ..ConfigOverrides::default()
            },
            ..LoadOptions::default()
        }
    }

    #[tokio::test]
    async fn bootstrap_fails_fast_without_a_bot_token() {
        let result = bootstrap(LoadOptions {
            overrides: ConfigOverrides {
                database_url: Some("sqlite::memory:".to_string()),
                spreadsheet_id: Some("sheet-1".to_string()),
                sheets_access_token: Some("ya29.test".to_string()),
                ..ConfigOverrides::default()
            },
            ..LoadOptions::default()
        })
        .await;

        let message = result.err().expect("error").to_string();
        assert!(message.contains("telegram.bot_token"));
    }

    #[tokio::test]
    async fn bootstrap_migrates_and_exposes_a_working_store() {
        let app = bootstrap(valid_overrides("sqlite::memory:?cache=shared"))
            .await
            .expect("bootstrap should succeed with valid overrides");

        let (table_count,): (i64,) = sqlx::query_as(
            "SELECT COUNT(*) FROM sqlite_master \
             WHERE type = 'table' AND name IN ('requests', 'request_comments')",
        )
        .fetch_one(&app.db_pool)
        .await
        .expect("expected baseline tables after bootstrap");
        assert_eq!(table_count, 2);

        let request = app
            .store
            .insert(NewRequestRecord {
                author: Actor::new(100, "Dana"),
                title: "smoke".to_string(),
                amount: Decimal::TEN,
                payment_method: PaymentMethod::Cash,
                budget_category: BudgetCategory::Other,
                attachment: None,
                created_at: chrono::Utc::now(),
            })
            .await
            .expect("insert through bootstrapped store");
        assert_eq!(request.status, RequestStatus::New);
    }
}
