use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use tracing::{info, warn};

use paydesk_core::store::RequestStore;
use paydesk_export::{ExportReconciler, LedgerSink};
use paydesk_telegram::ExportTrigger;

/// Runs an export drain right after a committed decision. The returned
/// error text reaches the deciding admin; the decision itself is already
/// durable and will be retried by the periodic pass.
pub struct ReconcilerTrigger<S, L> {
    reconciler: Arc<ExportReconciler<S, L>>,
}

impl<S, L> ReconcilerTrigger<S, L> {
    pub fn new(reconciler: Arc<ExportReconciler<S, L>>) -> Self {
        Self { reconciler }
    }
}

#[async_trait]
impl<S: RequestStore, L: LedgerSink> ExportTrigger for ReconcilerTrigger<S, L> {
    async fn kick(&self) -> Result<(), String> {
        self.reconciler.drain().await.map(|_| ()).map_err(|error| error.to_string())
    }
}

/// Periodic backstop for requests whose immediate export failed or whose
/// decision landed while the process was down.
pub fn spawn_periodic_drain<S, L>(
    reconciler: Arc<ExportReconciler<S, L>>,
    interval: Duration,
) -> tokio::task::JoinHandle<()>
where
    S: RequestStore + 'static,
    L: LedgerSink + 'static,
{
    tokio::spawn(async move {
        let mut ticker = tokio::time::interval(interval);
        // The bootstrap pass runs immediately and catches any backlog.
        loop {
            ticker.tick().await;
            match reconciler.drain().await {
                Ok(0) => {}
                Ok(exported) => {
                    info!(
                        event_name = "export.periodic.drained",
                        exported,
                        "periodic export pass drained backlog"
                    );
                }
                Err(error) => {
                    warn!(
                        event_name = "export.periodic.failed",
                        error = %error,
                        "periodic export pass failed, will retry next tick"
                    );
                }
            }
        }
    })
}
