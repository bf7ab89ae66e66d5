use chrono::Utc;
use rust_decimal::Decimal;
use tracing::{info, warn};

use crate::domain::comment::Comment;
use crate::domain::request::{
    Actor, DecisionOutcome, EditField, Request, RequestDraft, RequestId,
};
use crate::errors::LifecycleError;
use crate::notify::{NotificationSink, RequestSummary};
use crate::store::{DecisionRecord, NewRequestRecord, RequestStore};

/// Enforces the legal transition graph and provides exactly-once decision
/// semantics under concurrent callers. Correctness comes entirely from the
/// store's conditional updates: the affected-row count is the concurrency
/// oracle, never a separate read.
pub struct LifecycleEngine<S, N> {
    store: S,
    notifier: N,
}

impl<S: RequestStore, N: NotificationSink> LifecycleEngine<S, N> {
    pub fn new(store: S, notifier: N) -> Self {
        Self { store, notifier }
    }

    pub fn store(&self) -> &S {
        &self.store
    }

    /// Creates a request in state `new` and notifies admins best-effort.
    pub async fn submit(
        &self,
        author: Actor,
        draft: RequestDraft,
    ) -> Result<Request, LifecycleError> {
        let title = validate_title(&draft.title)?;
        validate_amount(draft.amount)?;

        let request = self
            .store
            .insert(NewRequestRecord {
                author,
                title,
                amount: draft.amount,
                payment_method: draft.payment_method,
                budget_category: draft.budget_category,
                attachment: draft.attachment,
                created_at: Utc::now(),
            })
            .await?;

        info!(
            event_name = "lifecycle.request.submitted",
            request_id = request.id.0,
            author_id = request.author.id.0,
            "request submitted"
        );

        let summary = RequestSummary::from(&request);
        if let Err(error) = self.notifier.notify_admins(&summary).await {
            warn!(
                event_name = "lifecycle.notify.admins_failed",
                request_id = request.id.0,
                error = %error,
                "admin notification dropped"
            );
        }

        Ok(request)
    }

    /// Applies one field edit through the conditional-update guard. On
    /// success the request is forced to `rework` and the author is told
    /// best-effort.
    pub async fn edit_field(
        &self,
        id: RequestId,
        field: EditField,
    ) -> Result<(), LifecycleError> {
        match &field {
            EditField::Title(title) => {
                validate_title(title)?;
            }
            EditField::Amount(amount) => validate_amount(*amount)?,
            EditField::PaymentMethod(_) | EditField::BudgetCategory(_) => {}
        }

        let affected = self.store.apply_edit(id, &field).await?;
        if affected == 0 {
            return Err(self.classify_guard_miss(id).await?);
        }

        info!(
            event_name = "lifecycle.request.edited",
            request_id = id.0,
            field = field.name(),
            "request field edited, status forced to rework"
        );

        self.tell_author(
            id,
            &format!("Request #{id}: an admin updated the {}. Please review.", field.name()),
        )
        .await;

        Ok(())
    }

    /// The concurrency-critical terminal transition. Exactly one concurrent
    /// caller observes an affected-row count of 1 for a given request; every
    /// other caller gets `AlreadyDecided` and must not retry.
    pub async fn decide(
        &self,
        id: RequestId,
        outcome: DecisionOutcome,
        admin: Actor,
        comment: String,
    ) -> Result<(), LifecycleError> {
        let decision = DecisionRecord {
            outcome,
            decided_by: admin,
            comment: comment.trim().to_string(),
            decided_at: Utc::now(),
        };

        let affected = self.store.record_decision(id, &decision).await?;
        if affected == 0 {
            return Err(self.classify_guard_miss(id).await?);
        }

        info!(
            event_name = "lifecycle.request.decided",
            request_id = id.0,
            outcome = outcome.status().as_str(),
            admin_id = decision.decided_by.id.0,
            "decision committed"
        );

        self.tell_author(id, &format!("Request #{id} was {}.", outcome.status())).await;

        Ok(())
    }

    /// Appends a note; permitted at any status, never changes status.
    pub async fn add_note(
        &self,
        id: RequestId,
        author: Actor,
        text: String,
    ) -> Result<Comment, LifecycleError> {
        let text = text.trim().to_string();
        if text.is_empty() {
            return Err(LifecycleError::Validation("note text must not be empty".to_string()));
        }

        let Some(request) = self.store.fetch(id).await? else {
            return Err(LifecycleError::NotFound(id));
        };

        let comment = self.store.append_comment(id, &author, &text).await?;

        info!(
            event_name = "lifecycle.request.note_added",
            request_id = id.0,
            author_id = author.id.0,
            "note appended"
        );

        if author.id != request.author.id {
            self.tell_author(id, &format!("Request #{id}, note from an admin:\n{text}")).await;
        }

        Ok(comment)
    }

    /// A conditional update that matched nothing means either the row never
    /// existed or it already reached a terminal state. The follow-up
    /// existence probe is race-free: terminal states are absorbing, so the
    /// answer cannot change under our feet.
    async fn classify_guard_miss(&self, id: RequestId) -> Result<LifecycleError, LifecycleError> {
        match self.store.fetch(id).await? {
            None => Ok(LifecycleError::NotFound(id)),
            Some(_) => Ok(LifecycleError::AlreadyDecided(id)),
        }
    }

    async fn tell_author(&self, id: RequestId, text: &str) {
        let author = match self.store.fetch(id).await {
            Ok(Some(request)) => request.author.id,
            Ok(None) => return,
            Err(error) => {
                warn!(
                    event_name = "lifecycle.notify.author_lookup_failed",
                    request_id = id.0,
                    error = %error,
                    "author notification dropped"
                );
                return;
            }
        };
        if let Err(error) = self.notifier.notify_author(author, text).await {
            warn!(
                event_name = "lifecycle.notify.author_failed",
                request_id = id.0,
                error = %error,
                "author notification dropped"
            );
        }
    }
}

fn validate_title(title: &str) -> Result<String, LifecycleError> {
    let title = title.trim();
    if title.is_empty() {
        return Err(LifecycleError::Validation("title must not be empty".to_string()));
    }
    Ok(title.to_string())
}

fn validate_amount(amount: Decimal) -> Result<(), LifecycleError> {
    if amount <= Decimal::ZERO {
        return Err(LifecycleError::Validation("amount must be greater than zero".to_string()));
    }
    Ok(())
}
