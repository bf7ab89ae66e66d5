use std::collections::{HashSet, VecDeque};
use std::sync::Mutex;

use async_trait::async_trait;
use thiserror::Error;

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct ChatId(pub i64);

impl std::fmt::Display for ChatId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        self.0.fmt(f)
    }
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Sender {
    pub id: i64,
    pub first_name: String,
}

/// One long-poll update, reduced to the shapes the dispatcher consumes.
#[derive(Clone, Debug, PartialEq, Eq, Default)]
pub struct Update {
    pub update_id: i64,
    pub message: Option<IncomingMessage>,
    pub callback: Option<Callback>,
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct IncomingMessage {
    pub chat: ChatId,
    pub from: Option<Sender>,
    pub text: Option<String>,
    pub document_id: Option<String>,
    /// Largest size variant when the message carried a photo.
    pub photo_id: Option<String>,
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Callback {
    pub id: String,
    pub from: Sender,
    pub chat: Option<ChatId>,
    pub message_id: Option<i64>,
    pub data: Option<String>,
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Button {
    pub text: String,
    pub data: String,
}

impl Button {
    pub fn new(text: impl Into<String>, data: impl Into<String>) -> Self {
        Self { text: text.into(), data: data.into() }
    }
}

#[derive(Clone, Debug, PartialEq, Eq, Default)]
pub struct Keyboard {
    pub rows: Vec<Vec<Button>>,
}

impl Keyboard {
    pub fn row(mut self, buttons: Vec<Button>) -> Self {
        self.rows.push(buttons);
        self
    }
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct OutgoingMessage {
    pub chat: ChatId,
    pub text: String,
    pub keyboard: Option<Keyboard>,
}

impl OutgoingMessage {
    pub fn text(chat: ChatId, text: impl Into<String>) -> Self {
        Self { chat, text: text.into(), keyboard: None }
    }

    pub fn with_keyboard(chat: ChatId, text: impl Into<String>, keyboard: Keyboard) -> Self {
        Self { chat, text: text.into(), keyboard: Some(keyboard) }
    }
}

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum ApiError {
    #[error("bot api request failed: {0}")]
    Request(String),
    #[error("bot api rejected the call: {0}")]
    Rejected(String),
    #[error("bot api reply could not be decoded: {0}")]
    Decode(String),
}

/// Bot API surface the front end needs. The HTTP implementation lives in
/// `http`; tests script this trait directly.
#[async_trait]
pub trait TelegramApi: Send + Sync {
    async fn get_updates(&self, offset: i64, timeout_secs: u64) -> Result<Vec<Update>, ApiError>;

    async fn send_message(&self, message: &OutgoingMessage) -> Result<(), ApiError>;

    async fn send_document(
        &self,
        chat: ChatId,
        file_id: &str,
        caption: &str,
    ) -> Result<(), ApiError>;

    async fn send_photo(&self, chat: ChatId, file_id: &str, caption: &str)
        -> Result<(), ApiError>;

    async fn answer_callback(
        &self,
        callback_id: &str,
        text: Option<&str>,
        alert: bool,
    ) -> Result<(), ApiError>;

    /// Removes the inline keyboard from an already sent message.
    async fn clear_keyboard(&self, chat: ChatId, message_id: i64) -> Result<(), ApiError>;
}

#[async_trait]
impl<T: TelegramApi + ?Sized> TelegramApi for std::sync::Arc<T> {
    async fn get_updates(&self, offset: i64, timeout_secs: u64) -> Result<Vec<Update>, ApiError> {
        (**self).get_updates(offset, timeout_secs).await
    }

    async fn send_message(&self, message: &OutgoingMessage) -> Result<(), ApiError> {
        (**self).send_message(message).await
    }

    async fn send_document(
        &self,
        chat: ChatId,
        file_id: &str,
        caption: &str,
    ) -> Result<(), ApiError> {
        (**self).send_document(chat, file_id, caption).await
    }

    async fn send_photo(
        &self,
        chat: ChatId,
        file_id: &str,
        caption: &str,
    ) -> Result<(), ApiError> {
        (**self).send_photo(chat, file_id, caption).await
    }

    async fn answer_callback(
        &self,
        callback_id: &str,
        text: Option<&str>,
        alert: bool,
    ) -> Result<(), ApiError> {
        (**self).answer_callback(callback_id, text, alert).await
    }

    async fn clear_keyboard(&self, chat: ChatId, message_id: i64) -> Result<(), ApiError> {
        (**self).clear_keyboard(chat, message_id).await
    }
}

/// Everything the scripted double observed going out.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum SentItem {
    Message(OutgoingMessage),
    Document { chat: ChatId, file_id: String, caption: String },
    Photo { chat: ChatId, file_id: String, caption: String },
    CallbackAnswer { callback_id: String, text: Option<String>, alert: bool },
    KeyboardCleared { chat: ChatId, message_id: i64 },
}

/// Scripted transport double: each `get_updates` call pops one scripted
/// batch; an empty script yields an empty batch. Outgoing traffic is
/// recorded for assertions.
#[derive(Default)]
pub struct ScriptedTelegramApi {
    batches: Mutex<VecDeque<Result<Vec<Update>, ApiError>>>,
    sent: Mutex<Vec<SentItem>>,
    blocked: Mutex<HashSet<i64>>,
}

impl ScriptedTelegramApi {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push_batch(&self, updates: Vec<Update>) {
        self.batches.lock().expect("script mutex").push_back(Ok(updates));
    }

    pub fn push_failure(&self, error: ApiError) {
        self.batches.lock().expect("script mutex").push_back(Err(error));
    }

    /// Makes every send toward the chat fail, like a user who blocked the
    /// bot.
    pub fn block_chat(&self, chat: ChatId) {
        self.blocked.lock().expect("script mutex").insert(chat.0);
    }

    fn check_blocked(&self, chat: ChatId) -> Result<(), ApiError> {
        if self.blocked.lock().expect("script mutex").contains(&chat.0) {
            return Err(ApiError::Rejected("bot was blocked by the user".to_string()));
        }
        Ok(())
    }

    pub fn sent(&self) -> Vec<SentItem> {
        self.sent.lock().expect("script mutex").clone()
    }

    pub fn messages_to(&self, chat: ChatId) -> Vec<OutgoingMessage> {
        self.sent()
            .into_iter()
            .filter_map(|item| match item {
                SentItem::Message(message) if message.chat == chat => Some(message),
                _ => None,
            })
            .collect()
    }

    fn record(&self, item: SentItem) {
        self.sent.lock().expect("script mutex").push(item);
    }
}

#[async_trait]
impl TelegramApi for ScriptedTelegramApi {
    async fn get_updates(
        &self,
        _offset: i64,
        _timeout_secs: u64,
    ) -> Result<Vec<Update>, ApiError> {
        self.batches.lock().expect("script mutex").pop_front().unwrap_or(Ok(Vec::new()))
    }

    async fn send_message(&self, message: &OutgoingMessage) -> Result<(), ApiError> {
        self.check_blocked(message.chat)?;
        self.record(SentItem::Message(message.clone()));
        Ok(())
    }

    async fn send_document(
        &self,
        chat: ChatId,
        file_id: &str,
        caption: &str,
    ) -> Result<(), ApiError> {
        self.check_blocked(chat)?;
        self.record(SentItem::Document {
            chat,
            file_id: file_id.to_string(),
            caption: caption.to_string(),
        });
        Ok(())
    }

    async fn send_photo(
        &self,
        chat: ChatId,
        file_id: &str,
        caption: &str,
    ) -> Result<(), ApiError> {
        self.check_blocked(chat)?;
        self.record(SentItem::Photo {
            chat,
            file_id: file_id.to_string(),
            caption: caption.to_string(),
        });
        Ok(())
    }

    async fn answer_callback(
        &self,
        callback_id: &str,
        text: Option<&str>,
        alert: bool,
    ) -> Result<(), ApiError> {
        self.record(SentItem::CallbackAnswer {
            callback_id: callback_id.to_string(),
            text: text.map(str::to_string),
            alert,
        });
        Ok(())
    }

    async fn clear_keyboard(&self, chat: ChatId, message_id: i64) -> Result<(), ApiError> {
        self.record(SentItem::KeyboardCleared { chat, message_id });
        Ok(())
    }
}
