use std::sync::Arc;

use async_trait::async_trait;
use tracing::warn;

use paydesk_core::domain::request::UserId;
use paydesk_core::errors::SinkError;
use paydesk_core::notify::{NotificationSink, RequestSummary};

use crate::api::{ApiError, ChatId, OutgoingMessage, TelegramApi};
use crate::format;

/// Notification sink that talks to admins and authors over their private
/// bot chats. Admin copies of a submission carry the decision keyboard and
/// the attachment, if any.
pub struct TelegramNotifier {
    api: Arc<dyn TelegramApi>,
    admin_ids: Vec<i64>,
}

impl TelegramNotifier {
    pub fn new(api: Arc<dyn TelegramApi>, admin_ids: Vec<i64>) -> Self {
        Self { api, admin_ids }
    }

    async fn notify_one_admin(
        &self,
        chat: ChatId,
        summary: &RequestSummary,
        text: &str,
    ) -> Result<(), SinkError> {
        if let Some(attachment) = &summary.attachment {
            use paydesk_core::domain::request::AttachmentKind;
            let caption = format!("Request #{}", summary.id);
            let send = match attachment.kind {
                AttachmentKind::Document => {
                    self.api.send_document(chat, &attachment.file_id, &caption).await
                }
                AttachmentKind::Photo => {
                    self.api.send_photo(chat, &attachment.file_id, &caption).await
                }
            };
            send.map_err(sink_error)?;
        }

        self.api
            .send_message(&OutgoingMessage::with_keyboard(
                chat,
                text.to_string(),
                format::admin_keyboard(summary.id),
            ))
            .await
            .map_err(sink_error)
    }
}

fn sink_error(error: ApiError) -> SinkError {
    match error {
        ApiError::Request(reason) => SinkError::Unavailable(reason),
        ApiError::Rejected(reason) => SinkError::Rejected(reason),
        ApiError::Decode(reason) => SinkError::Rejected(reason),
    }
}

#[async_trait]
impl NotificationSink for TelegramNotifier {
    async fn notify_admins(&self, summary: &RequestSummary) -> Result<(), SinkError> {
        let text = format::summary_text(summary);

        // One unreachable admin (blocked bot, closed chat) must not stop the
        // fan-out to the rest; the last failure is reported after the loop.
        let mut last_error = None;
        for admin in &self.admin_ids {
            let chat = ChatId(*admin);
            if let Err(error) = self.notify_one_admin(chat, summary, &text).await {
                warn!(
                    event_name = "telegram.notify.admin_failed",
                    admin_id = *admin,
                    request_id = summary.id.0,
                    error = %error,
                    "admin copy dropped"
                );
                last_error = Some(error);
            }
        }

        match last_error {
            None => Ok(()),
            Some(error) => Err(error),
        }
    }

    async fn notify_author(&self, author: UserId, text: &str) -> Result<(), SinkError> {
        self.api
            .send_message(&OutgoingMessage::text(ChatId(author.0), text))
            .await
            .map_err(sink_error)
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use rust_decimal::Decimal;

    use paydesk_core::domain::request::{
        Attachment, AttachmentKind, BudgetCategory, PaymentMethod, RequestId, RequestStatus,
        UserId,
    };
    use paydesk_core::notify::{NotificationSink, RequestSummary};

    use super::TelegramNotifier;
    use crate::api::{ChatId, ScriptedTelegramApi, SentItem};

    fn summary() -> RequestSummary {
        RequestSummary {
            id: RequestId(3),
            author_id: UserId(100),
            author_name: "Dana".to_string(),
            title: "coffee machine".to_string(),
            amount: Decimal::new(12400, 0),
            payment_method: PaymentMethod::BankTransfer,
            budget_category: BudgetCategory::Tech,
            status: RequestStatus::New,
            attachment: Some(Attachment {
                file_id: "doc-1".to_string(),
                kind: AttachmentKind::Document,
            }),
        }
    }

    #[tokio::test]
    async fn every_admin_gets_the_attachment_and_the_decision_keyboard() {
        let api = Arc::new(ScriptedTelegramApi::new());
        let notifier = TelegramNotifier::new(api.clone(), vec![1, 2]);

        notifier.notify_admins(&summary()).await.unwrap();

        let documents: Vec<_> = api
            .sent()
            .into_iter()
            .filter(|item| matches!(item, SentItem::Document { .. }))
            .collect();
        assert_eq!(documents.len(), 2);

        for admin in [1, 2] {
            let messages = api.messages_to(ChatId(admin));
            assert_eq!(messages.len(), 1);
            assert!(messages[0].text.contains("coffee machine"));
            let keyboard = messages[0].keyboard.as_ref().expect("decision keyboard");
            assert_eq!(keyboard.rows[0][0].data, "decide:approve:3");
        }
    }

    #[tokio::test]
    async fn one_blocked_admin_does_not_stop_the_fan_out() {
        let api = Arc::new(ScriptedTelegramApi::new());
        api.block_chat(ChatId(1));
        let notifier = TelegramNotifier::new(api.clone(), vec![1, 2, 3]);

        let result = notifier.notify_admins(&summary()).await;
        assert!(result.is_err(), "the failure still surfaces to the caller");

        for admin in [2, 3] {
            let messages = api.messages_to(ChatId(admin));
            assert_eq!(messages.len(), 1, "admin {admin} must still get the summary");
        }
        assert!(api.messages_to(ChatId(1)).is_empty());
    }

    #[tokio::test]
    async fn author_notification_is_a_plain_message() {
        let api = Arc::new(ScriptedTelegramApi::new());
        let notifier = TelegramNotifier::new(api.clone(), vec![1]);

        notifier.notify_author(UserId(100), "Request #3 was approved.").await.unwrap();

        let messages = api.messages_to(ChatId(100));
        assert_eq!(messages.len(), 1);
        assert!(messages[0].keyboard.is_none());
    }
}
