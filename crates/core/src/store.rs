use async_trait::async_trait;
use chrono::{DateTime, Utc};

use crate::domain::comment::Comment;
use crate::domain::period::{MonthTotals, PeriodKey};
use crate::domain::request::{
    Actor, Attachment, BudgetCategory, DecisionOutcome, EditField, PaymentMethod, Request,
    RequestId,
};
use crate::errors::StoreError;

/// Insert payload for a fresh submission. Status is always `new` and the
/// export flag false; neither is a caller choice.
#[derive(Clone, Debug, PartialEq)]
pub struct NewRequestRecord {
    pub author: Actor,
    pub title: String,
    pub amount: rust_decimal::Decimal,
    pub payment_method: PaymentMethod,
    pub budget_category: BudgetCategory,
    pub attachment: Option<Attachment>,
    pub created_at: DateTime<Utc>,
}

/// Payload for the terminal decision update.
#[derive(Clone, Debug, PartialEq)]
pub struct DecisionRecord {
    pub outcome: DecisionOutcome,
    pub decided_by: Actor,
    pub comment: String,
    pub decided_at: DateTime<Utc>,
}

/// Durable request table with transactional, conditional updates. The
/// conditional operations return the affected-row count; that count is the
/// sole concurrency oracle, so implementations must apply the predicate and
/// the mutation as one atomic statement.
#[async_trait]
pub trait RequestStore: Send + Sync {
    async fn insert(&self, record: NewRequestRecord) -> Result<Request, StoreError>;

    async fn fetch(&self, id: RequestId) -> Result<Option<Request>, StoreError>;

    /// Applies one field edit and forces status to `rework`, guarded by
    /// `status IN (new, rework)`. Returns the affected-row count.
    async fn apply_edit(&self, id: RequestId, field: &EditField) -> Result<u64, StoreError>;

    /// Records the terminal decision and clears the export flag, guarded by
    /// `status IN (new, rework)`. Returns the affected-row count.
    async fn record_decision(
        &self,
        id: RequestId,
        decision: &DecisionRecord,
    ) -> Result<u64, StoreError>;

    async fn append_comment(
        &self,
        id: RequestId,
        author: &Actor,
        text: &str,
    ) -> Result<Comment, StoreError>;

    async fn list_comments(&self, id: RequestId, limit: u32) -> Result<Vec<Comment>, StoreError>;

    /// The single oldest decided-but-unexported request, ordered by decision
    /// timestamp ascending with id as the tie-breaker. `None` means the
    /// reconciler is idle.
    async fn next_unexported(&self) -> Result<Option<Request>, StoreError>;

    /// Flips the export flag after a confirmed ledger append. Returns the
    /// affected-row count.
    async fn mark_exported(&self, id: RequestId) -> Result<u64, StoreError>;

    /// Count and sum of approved and rejected requests whose decision
    /// timestamp falls in the given month.
    async fn month_totals(&self, period: &PeriodKey) -> Result<MonthTotals, StoreError>;
}

#[async_trait]
impl<T: RequestStore + ?Sized> RequestStore for std::sync::Arc<T> {
    async fn insert(&self, record: NewRequestRecord) -> Result<Request, StoreError> {
        (**self).insert(record).await
    }

    async fn fetch(&self, id: RequestId) -> Result<Option<Request>, StoreError> {
        (**self).fetch(id).await
    }

    async fn apply_edit(&self, id: RequestId, field: &EditField) -> Result<u64, StoreError> {
        (**self).apply_edit(id, field).await
    }

    async fn record_decision(
        &self,
        id: RequestId,
        decision: &DecisionRecord,
    ) -> Result<u64, StoreError> {
        (**self).record_decision(id, decision).await
    }

    async fn append_comment(
        &self,
        id: RequestId,
        author: &Actor,
        text: &str,
    ) -> Result<Comment, StoreError> {
        (**self).append_comment(id, author, text).await
    }

    async fn list_comments(&self, id: RequestId, limit: u32) -> Result<Vec<Comment>, StoreError> {
        (**self).list_comments(id, limit).await
    }

    async fn next_unexported(&self) -> Result<Option<Request>, StoreError> {
        (**self).next_unexported().await
    }

    async fn mark_exported(&self, id: RequestId) -> Result<u64, StoreError> {
        (**self).mark_exported(id).await
    }

    async fn month_totals(&self, period: &PeriodKey) -> Result<MonthTotals, StoreError> {
        (**self).month_totals(period).await
    }
}

pub use memory::InMemoryRequestStore;

mod memory {
    use std::sync::Mutex;

    use async_trait::async_trait;

    use super::{DecisionRecord, NewRequestRecord, RequestStore};
    use crate::domain::comment::{Comment, CommentId};
    use crate::domain::period::{MonthTotals, PeriodKey};
    use crate::domain::request::{
        Actor, Decision, EditField, Request, RequestId, RequestStatus,
    };
    use crate::errors::StoreError;

    #[derive(Default)]
    struct Tables {
        requests: Vec<Request>,
        comments: Vec<Comment>,
    }

    /// In-memory store for tests and wiring without a database. Mirrors the
    /// conditional-update semantics of the SQL implementation, including the
    /// affected-row counts.
    #[derive(Default)]
    pub struct InMemoryRequestStore {
        tables: Mutex<Tables>,
    }

    impl InMemoryRequestStore {
        pub fn new() -> Self {
            Self::default()
        }

        /// Test hook: overwrite a stored row wholesale, bypassing the
        /// lifecycle guards.
        pub fn put(&self, request: Request) {
            let mut tables = self.tables.lock().expect("store mutex");
            match tables.requests.iter_mut().find(|row| row.id == request.id) {
                Some(row) => *row = request,
                None => tables.requests.push(request),
            }
        }
    }

    #[async_trait]
    impl RequestStore for InMemoryRequestStore {
        async fn insert(&self, record: NewRequestRecord) -> Result<Request, StoreError> {
            let mut tables = self.tables.lock().expect("store mutex");
            let next_id = tables.requests.iter().map(|row| row.id.0).max().unwrap_or(0) + 1;
            let request = Request {
                id: RequestId(next_id),
                author: record.author,
                title: record.title,
                amount: record.amount,
                payment_method: record.payment_method,
                budget_category: record.budget_category,
                attachment: record.attachment,
                status: RequestStatus::New,
                decision: None,
                exported: false,
                created_at: record.created_at,
            };
            tables.requests.push(request.clone());
            Ok(request)
        }

        async fn fetch(&self, id: RequestId) -> Result<Option<Request>, StoreError> {
            let tables = self.tables.lock().expect("store mutex");
            Ok(tables.requests.iter().find(|row| row.id == id).cloned())
        }

        async fn apply_edit(&self, id: RequestId, field: &EditField) -> Result<u64, StoreError> {
            let mut tables = self.tables.lock().expect("store mutex");
            let Some(row) =
                tables.requests.iter_mut().find(|row| row.id == id && row.is_editable())
            else {
                return Ok(0);
            };
            match field {
                EditField::Title(title) => row.title = title.clone(),
                EditField::Amount(amount) => row.amount = *amount,
                EditField::PaymentMethod(method) => row.payment_method = *method,
                EditField::BudgetCategory(category) => row.budget_category = *category,
            }
            row.status = RequestStatus::Rework;
            Ok(1)
        }

        async fn record_decision(
            &self,
            id: RequestId,
            decision: &DecisionRecord,
        ) -> Result<u64, StoreError> {
            let mut tables = self.tables.lock().expect("store mutex");
            let Some(row) =
                tables.requests.iter_mut().find(|row| row.id == id && row.is_editable())
            else {
                return Ok(0);
            };
            row.status = decision.outcome.status();
            row.decision = Some(Decision {
                decided_at: decision.decided_at,
                decided_by: decision.decided_by.clone(),
                comment: decision.comment.clone(),
            });
            row.exported = false;
            Ok(1)
        }

        async fn append_comment(
            &self,
            id: RequestId,
            author: &Actor,
            text: &str,
        ) -> Result<Comment, StoreError> {
            let mut tables = self.tables.lock().expect("store mutex");
            let next_id = tables.comments.iter().map(|note| note.id.0).max().unwrap_or(0) + 1;
            let comment = Comment {
                id: CommentId(next_id),
                request_id: id,
                author: author.clone(),
                text: text.to_string(),
                created_at: chrono::Utc::now(),
            };
            tables.comments.push(comment.clone());
            Ok(comment)
        }

        async fn list_comments(
            &self,
            id: RequestId,
            limit: u32,
        ) -> Result<Vec<Comment>, StoreError> {
            let tables = self.tables.lock().expect("store mutex");
            let mut comments: Vec<Comment> =
                tables.comments.iter().filter(|note| note.request_id == id).cloned().collect();
            comments.sort_by_key(|note| std::cmp::Reverse(note.id));
            comments.truncate(limit as usize);
            Ok(comments)
        }

        async fn next_unexported(&self) -> Result<Option<Request>, StoreError> {
            let tables = self.tables.lock().expect("store mutex");
            Ok(tables
                .requests
                .iter()
                .filter(|row| row.status.is_terminal() && !row.exported)
                .min_by_key(|row| (row.export_timestamp(), row.id))
                .cloned())
        }

        async fn mark_exported(&self, id: RequestId) -> Result<u64, StoreError> {
            let mut tables = self.tables.lock().expect("store mutex");
            match tables.requests.iter_mut().find(|row| row.id == id) {
                Some(row) => {
                    row.exported = true;
                    Ok(1)
                }
                None => Ok(0),
            }
        }

        async fn month_totals(&self, period: &PeriodKey) -> Result<MonthTotals, StoreError> {
            let tables = self.tables.lock().expect("store mutex");
            let mut totals = MonthTotals::default();
            for row in &tables.requests {
                let Some(decision) = row.decision.as_ref() else { continue };
                if PeriodKey::from_timestamp(decision.decided_at) != *period {
                    continue;
                }
                match row.status {
                    RequestStatus::Approved => {
                        totals.approved_count += 1;
                        totals.approved_sum += row.amount;
                    }
                    RequestStatus::Rejected => {
                        totals.rejected_count += 1;
                        totals.rejected_sum += row.amount;
                    }
                    _ => {}
                }
            }
            Ok(totals)
        }
    }
}

#[cfg(test)]
mod tests {
    use chrono::{Duration, Utc};
    use rust_decimal::Decimal;

    use super::{DecisionRecord, InMemoryRequestStore, NewRequestRecord, RequestStore};
    use crate::domain::request::{
        Actor, BudgetCategory, DecisionOutcome, EditField, PaymentMethod, RequestStatus,
    };

    fn record(title: &str) -> NewRequestRecord {
        NewRequestRecord {
            author: Actor::new(100, "Dana"),
            title: title.to_string(),
            amount: Decimal::new(500, 0),
            payment_method: PaymentMethod::Cash,
            budget_category: BudgetCategory::Other,
            attachment: None,
            created_at: Utc::now(),
        }
    }

    fn decision(outcome: DecisionOutcome) -> DecisionRecord {
        DecisionRecord {
            outcome,
            decided_by: Actor::new(1, "Admin"),
            comment: String::new(),
            decided_at: Utc::now(),
        }
    }

    #[tokio::test]
    async fn edit_after_decision_affects_zero_rows() {
        let store = InMemoryRequestStore::new();
        let request = store.insert(record("printer ink")).await.unwrap();

        assert_eq!(
            store.record_decision(request.id, &decision(DecisionOutcome::Approved)).await.unwrap(),
            1
        );
        assert_eq!(
            store.apply_edit(request.id, &EditField::Amount(Decimal::ONE)).await.unwrap(),
            0
        );

        let row = store.fetch(request.id).await.unwrap().unwrap();
        assert_eq!(row.status, RequestStatus::Approved);
        assert_eq!(row.amount, Decimal::new(500, 0));
    }

    #[tokio::test]
    async fn next_unexported_prefers_oldest_decision() {
        let store = InMemoryRequestStore::new();
        let first = store.insert(record("a")).await.unwrap();
        let second = store.insert(record("b")).await.unwrap();

        let now = Utc::now();
        let mut early = decision(DecisionOutcome::Approved);
        early.decided_at = now - Duration::minutes(10);
        let mut late = decision(DecisionOutcome::Rejected);
        late.decided_at = now;

        store.record_decision(second.id, &early).await.unwrap();
        store.record_decision(first.id, &late).await.unwrap();

        let picked = store.next_unexported().await.unwrap().unwrap();
        assert_eq!(picked.id, second.id);

        store.mark_exported(second.id).await.unwrap();
        let picked = store.next_unexported().await.unwrap().unwrap();
        assert_eq!(picked.id, first.id);

        store.mark_exported(first.id).await.unwrap();
        assert!(store.next_unexported().await.unwrap().is_none());
    }
}
