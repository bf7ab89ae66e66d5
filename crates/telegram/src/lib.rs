//! Telegram front end for paydesk:
//! - **Bot API transport** (`api`, `http`) - trait plus reqwest client
//! - **Long polling** (`poll`) - `getUpdates` loop with capped backoff
//! - **Dialogue** (`dialogue`) - per-chat submission and admin input states
//! - **Dispatch** (`dispatch`) - routes updates to lifecycle operations
//! - **Notifier** (`notifier`) - `NotificationSink` over private chats

pub mod api;
pub mod dialogue;
pub mod dispatch;
pub mod format;
pub mod http;
pub mod notifier;
pub mod poll;

pub use api::{ApiError, ChatId, ScriptedTelegramApi, TelegramApi, Update};
pub use dispatch::{Dispatcher, ExportTrigger, NoopExportTrigger};
pub use http::HttpTelegramApi;
pub use notifier::TelegramNotifier;
pub use poll::{LongPollRunner, RetryPolicy, UpdateHandler};
