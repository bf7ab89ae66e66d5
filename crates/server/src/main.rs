mod bootstrap;
mod scheduler;

use std::sync::Arc;
use std::time::Duration;

use anyhow::Result;

use paydesk_core::config::{AppConfig, LoadOptions};
use paydesk_core::lifecycle::LifecycleEngine;
use paydesk_export::{ExportReconciler, GoogleSheetsLedger};
use paydesk_telegram::{
    Dispatcher, HttpTelegramApi, LongPollRunner, TelegramApi, TelegramNotifier,
};

const EXPORT_DRAIN_INTERVAL: Duration = Duration::from_secs(300);

fn init_logging(config: &AppConfig) {
    use paydesk_core::config::LogFormat::*;
    use tracing::Level;

    let log_level = config.logging.level.parse::<Level>().unwrap_or(Level::INFO);

    match config.logging.format {
        Compact => {
            tracing_subscriber::fmt().with_target(false).with_max_level(log_level).compact().init();
        }
        Pretty => {
            tracing_subscriber::fmt().with_target(false).with_max_level(log_level).pretty().init();
        }
        Json => {
            tracing_subscriber::fmt().with_target(false).with_max_level(log_level).json().init();
        }
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    run().await
}

pub async fn run() -> Result<()> {
    // Load config and initialize logging before any other operations
    let config = AppConfig::load(LoadOptions::default())?;
    init_logging(&config);

    let app = bootstrap::bootstrap_with_config(config).await?;

    let api: Arc<dyn TelegramApi> =
        Arc::new(HttpTelegramApi::new(app.config.telegram.bot_token.clone())?);
    let notifier = Arc::new(TelegramNotifier::new(
        Arc::clone(&api),
        app.config.telegram.admin_ids.clone(),
    ));
    let engine = Arc::new(LifecycleEngine::new(Arc::clone(&app.store), notifier));

    let ledger = GoogleSheetsLedger::new(&app.config.sheets)?;
    let reconciler = Arc::new(ExportReconciler::new(Arc::clone(&app.store), ledger));

    let drain_task =
        scheduler::spawn_periodic_drain(Arc::clone(&reconciler), EXPORT_DRAIN_INTERVAL);

    let dispatcher = Arc::new(Dispatcher::new(
        engine,
        Arc::clone(&api),
        app.config.telegram.admin_ids.clone(),
        scheduler::ReconcilerTrigger::new(reconciler),
    ));
    let runner = LongPollRunner::new(api, dispatcher, app.config.telegram.poll_timeout_secs);

    tracing::info!(
        event_name = "system.server.started",
        admins = app.config.telegram.admin_ids.len(),
        "paydesk-server started"
    );

    tokio::select! {
        () = runner.start() => {}
        result = tokio::signal::ctrl_c() => {
            result?;
            tracing::info!(event_name = "system.server.stopping", "paydesk-server stopping");
        }
    }

    drain_task.abort();
    Ok(())
}
