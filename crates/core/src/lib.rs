pub mod config;
pub mod domain;
pub mod errors;
pub mod lifecycle;
pub mod notify;
pub mod store;

pub use config::{AppConfig, ConfigError, ConfigOverrides, LoadOptions, LogFormat};
pub use domain::comment::{Comment, CommentId};
pub use domain::period::{MonthTotals, PeriodKey};
pub use domain::request::{
    Actor, Attachment, AttachmentKind, BudgetCategory, Decision, DecisionOutcome, EditField,
    PaymentMethod, Request, RequestDraft, RequestId, RequestStatus, UserId,
};
pub use errors::{LifecycleError, SinkError, StoreError};
pub use lifecycle::LifecycleEngine;
pub use notify::{
    NoopNotificationSink, NotificationEvent, NotificationSink, RecordingNotificationSink,
    RequestSummary,
};
pub use store::{DecisionRecord, InMemoryRequestStore, NewRequestRecord, RequestStore};
