use crate::commands::{preflight, CommandResult};
use paydesk_db::{connect_with_settings, migrations, SqlRequestStore};
use paydesk_export::{ExportReconciler, GoogleSheetsLedger};

/// Drains the export backlog: every decided, unexported request goes to the
/// ledger, oldest decision first, one per pass.
pub fn run() -> CommandResult {
    let (config, runtime) = match preflight("export") {
        Ok(ready) => ready,
        Err(result) => return result,
    };

    let outcome = runtime.block_on(async {
        let pool = connect_with_settings(
            &config.database.url,
            config.database.max_connections,
            config.database.timeout_secs,
        )
        .await
        .map_err(|error| ("db_connectivity", error.to_string(), 4u8))?;

        migrations::run_pending(&pool)
            .await
            .map_err(|error| ("migration", error.to_string(), 5u8))?;

        let ledger = GoogleSheetsLedger::new(&config.sheets)
            .map_err(|error| ("ledger_init", error.to_string(), 6u8))?;
        let reconciler = ExportReconciler::new(SqlRequestStore::new(pool.clone()), ledger);

        let exported =
            reconciler.drain().await.map_err(|error| ("export", error.to_string(), 7u8))?;

        pool.close().await;
        Ok::<u64, (&'static str, String, u8)>(exported)
    });

    match outcome {
        Ok(exported) => {
            CommandResult::success("export", format!("exported {exported} request(s)"))
        }
        Err((error_class, message, exit_code)) => {
            CommandResult::failure("export", error_class, message, exit_code)
        }
    }
}
