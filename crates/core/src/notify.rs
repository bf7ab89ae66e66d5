use async_trait::async_trait;
use rust_decimal::Decimal;

use crate::domain::request::{
    Attachment, BudgetCategory, PaymentMethod, Request, RequestId, RequestStatus, UserId,
};
use crate::errors::SinkError;

/// Snapshot of a request handed to the notification sink when admins are
/// told about a new submission.
#[derive(Clone, Debug, PartialEq)]
pub struct RequestSummary {
    pub id: RequestId,
    pub author_id: UserId,
    pub author_name: String,
    pub title: String,
    pub amount: Decimal,
    pub payment_method: PaymentMethod,
    pub budget_category: BudgetCategory,
    pub status: RequestStatus,
    pub attachment: Option<Attachment>,
}

impl From<&Request> for RequestSummary {
    fn from(request: &Request) -> Self {
        Self {
            id: request.id,
            author_id: request.author.id,
            author_name: request.author.name.clone(),
            title: request.title.clone(),
            amount: request.amount,
            payment_method: request.payment_method,
            budget_category: request.budget_category,
            status: request.status,
            attachment: request.attachment.clone(),
        }
    }
}

/// Fire-and-forget notification channel. The lifecycle engine swallows every
/// failure from this sink (logged, never propagated): notification has no
/// correctness impact.
#[async_trait]
pub trait NotificationSink: Send + Sync {
    async fn notify_admins(&self, summary: &RequestSummary) -> Result<(), SinkError>;
    async fn notify_author(&self, author: UserId, text: &str) -> Result<(), SinkError>;
}

#[async_trait]
impl<T: NotificationSink + ?Sized> NotificationSink for std::sync::Arc<T> {
    async fn notify_admins(&self, summary: &RequestSummary) -> Result<(), SinkError> {
        (**self).notify_admins(summary).await
    }

    async fn notify_author(&self, author: UserId, text: &str) -> Result<(), SinkError> {
        (**self).notify_author(author, text).await
    }
}

/// Discards every notification. Used when no front end is wired up.
#[derive(Default)]
pub struct NoopNotificationSink;

#[async_trait]
impl NotificationSink for NoopNotificationSink {
    async fn notify_admins(&self, _summary: &RequestSummary) -> Result<(), SinkError> {
        Ok(())
    }

    async fn notify_author(&self, _author: UserId, _text: &str) -> Result<(), SinkError> {
        Ok(())
    }
}

/// Records notifications for assertions; optionally fails every call to
/// exercise the engine's absorb-and-log path.
#[derive(Default)]
pub struct RecordingNotificationSink {
    events: std::sync::Mutex<Vec<NotificationEvent>>,
    fail: bool,
}

#[derive(Clone, Debug, PartialEq)]
pub enum NotificationEvent {
    Admins(RequestSummary),
    Author { author: UserId, text: String },
}

impl RecordingNotificationSink {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn failing() -> Self {
        Self { fail: true, ..Self::default() }
    }

    pub fn events(&self) -> Vec<NotificationEvent> {
        self.events.lock().expect("sink mutex").clone()
    }
}

#[async_trait]
impl NotificationSink for RecordingNotificationSink {
    async fn notify_admins(&self, summary: &RequestSummary) -> Result<(), SinkError> {
        if self.fail {
            return Err(SinkError::Unavailable("recording sink set to fail".to_string()));
        }
        self.events.lock().expect("sink mutex").push(NotificationEvent::Admins(summary.clone()));
        Ok(())
    }

    async fn notify_author(&self, author: UserId, text: &str) -> Result<(), SinkError> {
        if self.fail {
            return Err(SinkError::Unavailable("recording sink set to fail".to_string()));
        }
        self.events
            .lock()
            .expect("sink mutex")
            .push(NotificationEvent::Author { author, text: text.to_string() });
        Ok(())
    }
}
