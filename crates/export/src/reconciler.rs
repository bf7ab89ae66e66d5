use tracing::{debug, info, warn};

use paydesk_core::domain::period::PeriodKey;
use paydesk_core::domain::request::RequestId;
use paydesk_core::errors::{SinkError, StoreError};
use paydesk_core::store::RequestStore;

use crate::sink::{LedgerRow, LedgerSink};

/// Result of one reconciler pass.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ExportOutcome {
    /// No decided, unexported request exists.
    Idle,
    Exported(RequestId),
}

#[derive(Debug, thiserror::Error)]
pub enum ExportError {
    #[error(transparent)]
    Store(#[from] StoreError),
    #[error(transparent)]
    Sink(#[from] SinkError),
}

/// Moves decided requests into the ledger, one per pass, oldest decision
/// first. The export flag flips only after the ledger acknowledges the
/// append, so a crash in between can duplicate the appended row but can
/// never lose a request.
pub struct ExportReconciler<S, L> {
    store: S,
    sink: L,
}

impl<S: RequestStore, L: LedgerSink> ExportReconciler<S, L> {
    pub fn new(store: S, sink: L) -> Self {
        Self { store, sink }
    }

    pub async fn run_once(&self) -> Result<ExportOutcome, ExportError> {
        let Some(request) = self.store.next_unexported().await? else {
            debug!(event_name = "export.pass.idle", "nothing to export");
            return Ok(ExportOutcome::Idle);
        };

        let period = PeriodKey::from_timestamp(request.export_timestamp());
        let section = self.sink.ensure_section(&period).await?;

        // Totals are recomputed from the store every pass, so a duplicated
        // data row never inflates them.
        let totals = self.store.month_totals(&period).await?;
        self.sink.rewrite_totals(&section, &totals).await?;

        self.sink.append_row(&section, &LedgerRow::from_request(&request)).await?;

        let affected = self.store.mark_exported(request.id).await?;
        if affected == 0 {
            // Row vanished between selection and flag flip; the append
            // already happened, nothing further to do.
            warn!(
                event_name = "export.mark.missing_row",
                request_id = request.id.0,
                "exported row no longer present"
            );
        }

        info!(
            event_name = "export.request.exported",
            request_id = request.id.0,
            section = %section.title,
            "request exported"
        );
        Ok(ExportOutcome::Exported(request.id))
    }

    /// Runs passes until the store is idle. Each pass re-selects, so
    /// requests decided mid-drain are picked up too.
    pub async fn drain(&self) -> Result<u64, ExportError> {
        let mut exported = 0;
        while let ExportOutcome::Exported(_) = self.run_once().await? {
            exported += 1;
        }
        Ok(exported)
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use chrono::{Duration, TimeZone, Utc};
    use rust_decimal::Decimal;

    use paydesk_core::domain::request::{
        Actor, BudgetCategory, DecisionOutcome, PaymentMethod, RequestId, RequestStatus,
    };
    use paydesk_core::store::{DecisionRecord, InMemoryRequestStore, NewRequestRecord, RequestStore};

    use super::{ExportError, ExportOutcome, ExportReconciler};
    use crate::sink::InMemoryLedger;

    fn record(title: &str, amount: Decimal) -> NewRequestRecord {
        NewRequestRecord {
            author: Actor::new(100, "Dana"),
            title: title.to_string(),
            amount,
            payment_method: PaymentMethod::Cash,
            budget_category: BudgetCategory::Tech,
            attachment: None,
            created_at: Utc::now(),
        }
    }

    async fn decide(
        store: &InMemoryRequestStore,
        id: RequestId,
        outcome: DecisionOutcome,
        decided_at: chrono::DateTime<Utc>,
    ) {
        let affected = store
            .record_decision(
                id,
                &DecisionRecord {
                    outcome,
                    decided_by: Actor::new(1, "Admin"),
                    comment: String::new(),
                    decided_at,
                },
            )
            .await
            .unwrap();
        assert_eq!(affected, 1);
    }

    #[tokio::test]
    async fn idle_when_nothing_is_decided() {
        let store = Arc::new(InMemoryRequestStore::new());
        store.insert(record("pending", Decimal::TEN)).await.unwrap();

        let reconciler = ExportReconciler::new(store, Arc::new(InMemoryLedger::new()));
        assert_eq!(reconciler.run_once().await.unwrap(), ExportOutcome::Idle);
    }

    #[tokio::test]
    async fn exports_one_request_per_pass_oldest_decision_first() {
        let store = Arc::new(InMemoryRequestStore::new());
        let ledger = Arc::new(InMemoryLedger::new());

        let first = store.insert(record("later", Decimal::ONE)).await.unwrap();
        let second = store.insert(record("earlier", Decimal::ONE)).await.unwrap();

        let now = Utc::now();
        decide(&store, first.id, DecisionOutcome::Approved, now).await;
        decide(&store, second.id, DecisionOutcome::Rejected, now - Duration::hours(1)).await;

        let reconciler = ExportReconciler::new(Arc::clone(&store), Arc::clone(&ledger));

        assert_eq!(reconciler.run_once().await.unwrap(), ExportOutcome::Exported(second.id));
        assert_eq!(reconciler.run_once().await.unwrap(), ExportOutcome::Exported(first.id));
        assert_eq!(reconciler.run_once().await.unwrap(), ExportOutcome::Idle);

        let row = store.fetch(first.id).await.unwrap().unwrap();
        assert!(row.exported);
    }

    #[tokio::test]
    async fn ledger_rows_carry_decision_metadata_and_totals_stay_fresh() {
        let store = Arc::new(InMemoryRequestStore::new());
        let ledger = Arc::new(InMemoryLedger::new());

        let coffee = store.insert(record("coffee machine", Decimal::new(12400, 0))).await.unwrap();
        let decided_at = Utc.with_ymd_and_hms(2025, 3, 12, 10, 0, 0).unwrap();
        decide(&store, coffee.id, DecisionOutcome::Approved, decided_at).await;

        let reconciler = ExportReconciler::new(Arc::clone(&store), Arc::clone(&ledger));
        reconciler.drain().await.unwrap();

        let data = ledger.data_rows("03.2025");
        assert_eq!(data.len(), 1);
        assert_eq!(data[0][3], "coffee machine");
        assert_eq!(data[0][4], "12400");
        assert_eq!(data[0][6], "Tech");
        assert_eq!(data[0][7], "approved");
        assert_eq!(data[0][8], "Admin");

        let totals = ledger.totals_rows("03.2025");
        assert_eq!(totals.len(), 2);
        assert_eq!(totals[0][4], "12400");

        // Another approval in the same month replaces the totals rows
        // instead of stacking new ones.
        let chairs = store.insert(record("chairs", Decimal::new(600, 0))).await.unwrap();
        decide(&store, chairs.id, DecisionOutcome::Approved, decided_at + Duration::hours(2)).await;
        reconciler.drain().await.unwrap();

        let totals = ledger.totals_rows("03.2025");
        assert_eq!(totals.len(), 2);
        assert_eq!(totals[0][4], "13000");
        assert_eq!(ledger.data_rows("03.2025").len(), 2);
    }

    #[tokio::test]
    async fn sink_failure_aborts_the_pass_and_keeps_the_request_unexported() {
        let store = Arc::new(InMemoryRequestStore::new());
        let ledger = Arc::new(InMemoryLedger::new());

        let request = store.insert(record("ink", Decimal::TEN)).await.unwrap();
        decide(&store, request.id, DecisionOutcome::Approved, Utc::now()).await;

        ledger.fail_on("append", true);
        let reconciler = ExportReconciler::new(Arc::clone(&store), Arc::clone(&ledger));
        let error = reconciler.run_once().await.expect_err("append fails");
        assert!(matches!(error, ExportError::Sink(_)));

        let row = store.fetch(request.id).await.unwrap().unwrap();
        assert!(!row.exported);
        assert_eq!(row.status, RequestStatus::Approved);

        // Same request is retried once the sink recovers.
        ledger.fail_on("append", false);
        assert_eq!(reconciler.run_once().await.unwrap(), ExportOutcome::Exported(request.id));
    }

    #[tokio::test]
    async fn requests_land_in_their_decision_month_section() {
        let store = Arc::new(InMemoryRequestStore::new());
        let ledger = Arc::new(InMemoryLedger::new());

        let march = store.insert(record("march", Decimal::ONE)).await.unwrap();
        let april = store.insert(record("april", Decimal::ONE)).await.unwrap();
        decide(
            &store,
            march.id,
            DecisionOutcome::Approved,
            Utc.with_ymd_and_hms(2025, 3, 31, 23, 0, 0).unwrap(),
        )
        .await;
        decide(
            &store,
            april.id,
            DecisionOutcome::Approved,
            Utc.with_ymd_and_hms(2025, 4, 1, 1, 0, 0).unwrap(),
        )
        .await;

        let reconciler = ExportReconciler::new(Arc::clone(&store), Arc::clone(&ledger));
        assert_eq!(reconciler.drain().await.unwrap(), 2);

        assert_eq!(ledger.data_rows("03.2025").len(), 1);
        assert_eq!(ledger.data_rows("04.2025").len(), 1);
    }
}
