use std::time::Duration;

use async_trait::async_trait;
use secrecy::{ExposeSecret, SecretString};
use serde::Deserialize;
use serde_json::json;

use crate::api::{
    ApiError, Callback, ChatId, IncomingMessage, Keyboard, OutgoingMessage, Sender, TelegramApi,
    Update,
};

const DEFAULT_BASE_URL: &str = "https://api.telegram.org";

// Long-poll requests must outlive the server-side hold time.
const POLL_GRACE_SECS: u64 = 10;

pub struct HttpTelegramApi {
    http: reqwest::Client,
    base_url: String,
    token: SecretString,
}

#[derive(Debug, Deserialize)]
struct ApiReply<T> {
    ok: bool,
    result: Option<T>,
    description: Option<String>,
}

#[derive(Debug, Deserialize)]
struct RawUpdate {
    update_id: i64,
    message: Option<RawMessage>,
    callback_query: Option<RawCallback>,
}

#[derive(Debug, Deserialize)]
struct RawMessage {
    message_id: i64,
    chat: RawChat,
    from: Option<RawUser>,
    text: Option<String>,
    document: Option<RawDocument>,
    #[serde(default)]
    photo: Vec<RawPhotoSize>,
}

#[derive(Debug, Deserialize)]
struct RawChat {
    id: i64,
}

#[derive(Debug, Deserialize)]
struct RawUser {
    id: i64,
    #[serde(default)]
    first_name: String,
}

#[derive(Debug, Deserialize)]
struct RawDocument {
    file_id: String,
}

#[derive(Debug, Deserialize)]
struct RawPhotoSize {
    file_id: String,
}

#[derive(Debug, Deserialize)]
struct RawCallback {
    id: String,
    from: RawUser,
    message: Option<RawMessage>,
    data: Option<String>,
}

impl HttpTelegramApi {
    pub fn new(token: SecretString) -> Result<Self, ApiError> {
        // No client-wide timeout: get_updates holds the connection open for
        // the poll window. Per-call timeouts are set on each request.
        let http = reqwest::Client::builder()
            .build()
            .map_err(|error| ApiError::Request(error.to_string()))?;

        Ok(Self { http, base_url: DEFAULT_BASE_URL.to_string(), token })
    }

    pub fn with_base_url(mut self, base_url: impl Into<String>) -> Self {
        self.base_url = base_url.into();
        self
    }

    fn method_url(&self, method: &str) -> String {
        format!("{}/bot{}/{method}", self.base_url, self.token.expose_secret())
    }

    async fn call<T: serde::de::DeserializeOwned>(
        &self,
        method: &str,
        body: serde_json::Value,
        timeout: Duration,
    ) -> Result<T, ApiError> {
        let response = self
            .http
            .post(self.method_url(method))
            .timeout(timeout)
            .json(&body)
            .send()
            .await
            .map_err(|error| ApiError::Request(error.to_string()))?;

        let reply: ApiReply<T> = response
            .json()
            .await
            .map_err(|error| ApiError::Decode(error.to_string()))?;

        if !reply.ok {
            return Err(ApiError::Rejected(
                reply.description.unwrap_or_else(|| format!("{method} returned ok=false")),
            ));
        }

        reply.result.ok_or_else(|| ApiError::Decode(format!("{method} reply had no result")))
    }
}

fn keyboard_markup(keyboard: &Keyboard) -> serde_json::Value {
    let rows: Vec<Vec<serde_json::Value>> = keyboard
        .rows
        .iter()
        .map(|row| {
            row.iter()
                .map(|button| json!({ "text": button.text, "callback_data": button.data }))
                .collect()
        })
        .collect();
    json!({ "inline_keyboard": rows })
}

fn reduce_update(raw: RawUpdate) -> Update {
    let message = raw.message.map(reduce_message);
    let callback = raw.callback_query.map(|callback| Callback {
        id: callback.id,
        from: Sender { id: callback.from.id, first_name: callback.from.first_name },
        chat: callback.message.as_ref().map(|message| ChatId(message.chat.id)),
        message_id: callback.message.as_ref().map(|message| message.message_id),
        data: callback.data,
    });

    Update { update_id: raw.update_id, message, callback }
}

fn reduce_message(raw: RawMessage) -> IncomingMessage {
    IncomingMessage {
        chat: ChatId(raw.chat.id),
        from: raw.from.map(|user| Sender { id: user.id, first_name: user.first_name }),
        text: raw.text,
        document_id: raw.document.map(|document| document.file_id),
        // Photo sizes arrive smallest first; the last one is the original.
        photo_id: raw.photo.into_iter().last().map(|photo| photo.file_id),
    }
}

#[async_trait]
impl TelegramApi for HttpTelegramApi {
    async fn get_updates(&self, offset: i64, timeout_secs: u64) -> Result<Vec<Update>, ApiError> {
        let raw: Vec<RawUpdate> = self
            .call(
                "getUpdates",
                json!({
                    "offset": offset,
                    "timeout": timeout_secs,
                    "allowed_updates": ["message", "callback_query"],
                }),
                Duration::from_secs(timeout_secs + POLL_GRACE_SECS),
            )
            .await?;

        Ok(raw.into_iter().map(reduce_update).collect())
    }

    async fn send_message(&self, message: &OutgoingMessage) -> Result<(), ApiError> {
        let mut body = json!({
            "chat_id": message.chat.0,
            "text": message.text,
        });
        if let Some(keyboard) = &message.keyboard {
            body["reply_markup"] = keyboard_markup(keyboard);
        }

        let _: serde_json::Value =
            self.call("sendMessage", body, Duration::from_secs(POLL_GRACE_SECS)).await?;
        Ok(())
    }

    async fn send_document(
        &self,
        chat: ChatId,
        file_id: &str,
        caption: &str,
    ) -> Result<(), ApiError> {
        let _: serde_json::Value = self
            .call(
                "sendDocument",
                json!({ "chat_id": chat.0, "document": file_id, "caption": caption }),
                Duration::from_secs(POLL_GRACE_SECS),
            )
            .await?;
        Ok(())
    }

    async fn send_photo(
        &self,
        chat: ChatId,
        file_id: &str,
        caption: &str,
    ) -> Result<(), ApiError> {
        let _: serde_json::Value = self
            .call(
                "sendPhoto",
                json!({ "chat_id": chat.0, "photo": file_id, "caption": caption }),
                Duration::from_secs(POLL_GRACE_SECS),
            )
            .await?;
        Ok(())
    }

    async fn answer_callback(
        &self,
        callback_id: &str,
        text: Option<&str>,
        alert: bool,
    ) -> Result<(), ApiError> {
        let mut body = json!({ "callback_query_id": callback_id, "show_alert": alert });
        if let Some(text) = text {
            body["text"] = json!(text);
        }

        // answerCallbackQuery returns a bare boolean.
        let _: serde_json::Value =
            self.call("answerCallbackQuery", body, Duration::from_secs(POLL_GRACE_SECS)).await?;
        Ok(())
    }

    async fn clear_keyboard(&self, chat: ChatId, message_id: i64) -> Result<(), ApiError> {
        let _: serde_json::Value = self
            .call(
                "editMessageReplyMarkup",
                json!({
                    "chat_id": chat.0,
                    "message_id": message_id,
                    "reply_markup": { "inline_keyboard": [] },
                }),
                Duration::from_secs(POLL_GRACE_SECS),
            )
            .await?;
        Ok(())
    }
}
