use std::sync::Arc;

use async_trait::async_trait;
use tracing::{info, warn};

use paydesk_core::domain::request::{
    Actor, BudgetCategory, DecisionOutcome, EditField, PaymentMethod, RequestId,
};
use paydesk_core::errors::LifecycleError;
use paydesk_core::lifecycle::LifecycleEngine;
use paydesk_core::notify::NotificationSink;
use paydesk_core::store::RequestStore;

use crate::api::{Callback, ChatId, IncomingMessage, OutgoingMessage, TelegramApi, Update};
use crate::dialogue::{is_skip_word, parse_amount, DialogueState, DialogueStore, PendingEdit};
use crate::format;
use crate::poll::UpdateHandler;

/// Export pass hook fired right after a committed decision. The error value
/// is a human-readable reason shown to the admin; the decision itself is
/// already durable at that point.
#[async_trait]
pub trait ExportTrigger: Send + Sync {
    async fn kick(&self) -> Result<(), String>;
}

/// For wirings without a ledger, and for tests.
#[derive(Default)]
pub struct NoopExportTrigger;

#[async_trait]
impl ExportTrigger for NoopExportTrigger {
    async fn kick(&self) -> Result<(), String> {
        Ok(())
    }
}

/// Routes updates from the poll loop to lifecycle operations. Holds the
/// per-chat dialogue positions and enforces the static admin allow-list on
/// every admin callback.
pub struct Dispatcher<S, N, A, E> {
    engine: Arc<LifecycleEngine<S, N>>,
    api: A,
    dialogues: DialogueStore,
    admin_ids: Vec<i64>,
    exporter: E,
}

impl<S, N, A, E> Dispatcher<S, N, A, E>
where
    S: RequestStore,
    N: NotificationSink,
    A: TelegramApi,
    E: ExportTrigger,
{
    pub fn new(
        engine: Arc<LifecycleEngine<S, N>>,
        api: A,
        admin_ids: Vec<i64>,
        exporter: E,
    ) -> Self {
        Self { engine, api, dialogues: DialogueStore::new(), admin_ids, exporter }
    }

    fn is_admin(&self, user_id: i64) -> bool {
        self.admin_ids.contains(&user_id)
    }

    async fn send(&self, message: OutgoingMessage) {
        if let Err(error) = self.api.send_message(&message).await {
            warn!(
                event_name = "telegram.send_failed",
                chat_id = message.chat.0,
                error = %error,
                "outgoing message dropped"
            );
        }
    }

    async fn send_text(&self, chat: ChatId, text: impl Into<String>) {
        self.send(OutgoingMessage::text(chat, text)).await;
    }

    async fn answer(&self, callback: &Callback, text: Option<&str>, alert: bool) {
        if let Err(error) = self.api.answer_callback(&callback.id, text, alert).await {
            warn!(
                event_name = "telegram.callback_answer_failed",
                callback_id = %callback.id,
                error = %error,
                "callback answer dropped"
            );
        }
    }

    async fn on_message(&self, message: IncomingMessage) {
        let chat = message.chat;
        let Some(sender) = message.from.clone() else { return };
        let text = message.text.clone().unwrap_or_default();

        match text.trim() {
            "/start" => {
                self.dialogues.clear(chat);
                self.send_text(chat, format::GREETING).await;
                return;
            }
            "/whoami" => {
                let role = if self.is_admin(sender.id) { " (admin)" } else { "" };
                self.send_text(chat, format!("Your id: {}{role}", sender.id)).await;
                return;
            }
            "/new" => {
                self.dialogues.set(chat, DialogueState::AwaitTitle);
                self.send_text(chat, format::TITLE_PROMPT).await;
                return;
            }
            _ => {}
        }

        match self.dialogues.get(chat) {
            Some(DialogueState::AwaitTitle) => {
                let title = text.trim().to_string();
                if title.is_empty() {
                    self.send_text(chat, format::TITLE_PROMPT).await;
                    return;
                }
                self.dialogues.set(chat, DialogueState::AwaitAmount { title });
                self.send_text(chat, format::AMOUNT_PROMPT).await;
            }
            Some(DialogueState::AwaitAmount { title }) => {
                let Some(amount) = parse_amount(&text) else {
                    self.send_text(chat, format::AMOUNT_PROMPT).await;
                    return;
                };
                self.dialogues.set(chat, DialogueState::AwaitPayment { title, amount });
                self.send(OutgoingMessage::with_keyboard(
                    chat,
                    format::PAYMENT_PROMPT,
                    format::payment_keyboard(),
                ))
                .await;
            }
            Some(DialogueState::AwaitPayment { .. }) => {
                self.send(OutgoingMessage::with_keyboard(
                    chat,
                    format::PAYMENT_PROMPT,
                    format::payment_keyboard(),
                ))
                .await;
            }
            Some(DialogueState::AwaitBudget { .. }) => {
                self.send(OutgoingMessage::with_keyboard(
                    chat,
                    format::BUDGET_PROMPT,
                    format::budget_keyboard(),
                ))
                .await;
            }
            Some(DialogueState::AwaitAttachment { title, amount, payment, budget }) => {
                let attachment = if let Some(file_id) = message.document_id.clone() {
                    Some(paydesk_core::domain::request::Attachment {
                        file_id,
                        kind: paydesk_core::domain::request::AttachmentKind::Document,
                    })
                } else if let Some(file_id) = message.photo_id.clone() {
                    Some(paydesk_core::domain::request::Attachment {
                        file_id,
                        kind: paydesk_core::domain::request::AttachmentKind::Photo,
                    })
                } else if is_skip_word(&text) {
                    None
                } else {
                    self.send_text(chat, format::ATTACHMENT_PROMPT).await;
                    return;
                };

                let draft = DialogueState::draft(title, amount, payment, budget, attachment);
                let author = Actor::new(sender.id, &sender.first_name);
                match self.engine.submit(author, draft).await {
                    Ok(request) => {
                        self.dialogues.clear(chat);
                        self.send_text(
                            chat,
                            format!("Request #{} submitted for review.", request.id),
                        )
                        .await;
                    }
                    Err(LifecycleError::Validation(reason)) => {
                        self.send_text(chat, format!("That does not work: {reason}")).await;
                    }
                    Err(error) => {
                        warn!(
                            event_name = "telegram.submit_failed",
                            chat_id = chat.0,
                            error = %error,
                            "submission failed"
                        );
                        self.send_text(chat, "Something went wrong, try again later.").await;
                    }
                }
            }
            Some(DialogueState::AwaitDecisionComment { request_id, outcome }) => {
                // The pending state belongs to the admin who tapped the
                // button; anyone else in the chat must not finish the flow.
                if !self.is_admin(sender.id) {
                    self.send_text(chat, format::NOT_ALLOWED).await;
                    return;
                }
                let comment =
                    if text.trim() == "-" { String::new() } else { text.trim().to_string() };
                let admin = Actor::new(sender.id, &sender.first_name);
                match self.engine.decide(request_id, outcome, admin, comment).await {
                    Ok(()) => {
                        self.dialogues.clear(chat);
                        match self.exporter.kick().await {
                            Ok(()) => {
                                self.send_text(
                                    chat,
                                    format!("Request #{request_id}: decision saved."),
                                )
                                .await;
                            }
                            Err(reason) => {
                                self.send_text(
                                    chat,
                                    format!(
                                        "Request #{request_id}: decision saved, export failed \
                                         ({reason}). It will be retried."
                                    ),
                                )
                                .await;
                            }
                        }
                    }
                    Err(error) => {
                        self.dialogues.clear(chat);
                        self.send_text(chat, lifecycle_error_text(&error)).await;
                    }
                }
            }
            Some(DialogueState::AwaitEditValue { request_id, edit }) => {
                if !self.is_admin(sender.id) {
                    self.send_text(chat, format::NOT_ALLOWED).await;
                    return;
                }
                let admin = Actor::new(sender.id, &sender.first_name);
                let result = match edit {
                    PendingEdit::Title => {
                        self.engine
                            .edit_field(request_id, EditField::Title(text.trim().to_string()))
                            .await
                    }
                    PendingEdit::Amount => match parse_amount(&text) {
                        Some(amount) => {
                            self.engine.edit_field(request_id, EditField::Amount(amount)).await
                        }
                        None => {
                            self.send_text(chat, format::AMOUNT_PROMPT).await;
                            return;
                        }
                    },
                    PendingEdit::Note => {
                        self.engine.add_note(request_id, admin, text).await.map(|_| ())
                    }
                };

                match result {
                    Ok(()) => {
                        self.dialogues.clear(chat);
                        self.send_text(chat, format!("Request #{request_id} updated.")).await;
                    }
                    Err(LifecycleError::Validation(reason)) => {
                        self.send_text(chat, format!("That does not work: {reason}")).await;
                    }
                    Err(error) => {
                        self.dialogues.clear(chat);
                        self.send_text(chat, lifecycle_error_text(&error)).await;
                    }
                }
            }
            None => {
                self.send_text(chat, "Send /new to submit a payment request.").await;
            }
        }
    }

    async fn on_callback(&self, callback: Callback) {
        let chat = callback.chat.unwrap_or(ChatId(callback.from.id));
        let Some(data) = callback.data.clone() else {
            self.answer(&callback, None, false).await;
            return;
        };

        let parts: Vec<&str> = data.split(':').collect();
        match parts.as_slice() {
            ["pay", method] => {
                let Some(DialogueState::AwaitPayment { title, amount }) = self.dialogues.get(chat)
                else {
                    self.answer(&callback, None, false).await;
                    return;
                };
                let Some(payment) = PaymentMethod::parse(method) else {
                    self.answer(&callback, None, false).await;
                    return;
                };
                self.dialogues.set(chat, DialogueState::AwaitBudget { title, amount, payment });
                self.answer(&callback, None, false).await;
                self.send(OutgoingMessage::with_keyboard(
                    chat,
                    format::BUDGET_PROMPT,
                    format::budget_keyboard(),
                ))
                .await;
            }
            ["budget", category] => {
                let Some(DialogueState::AwaitBudget { title, amount, payment }) =
                    self.dialogues.get(chat)
                else {
                    self.answer(&callback, None, false).await;
                    return;
                };
                let Some(budget) = BudgetCategory::parse(category) else {
                    self.answer(&callback, None, false).await;
                    return;
                };
                self.dialogues.set(
                    chat,
                    DialogueState::AwaitAttachment { title, amount, payment, budget },
                );
                self.answer(&callback, None, false).await;
                self.send_text(chat, format::ATTACHMENT_PROMPT).await;
            }
            ["decide", outcome, id] => {
                if !self.is_admin(callback.from.id) {
                    self.answer(&callback, Some(format::NOT_ALLOWED), true).await;
                    return;
                }
                let (Some(outcome), Some(id)) = (parse_outcome(outcome), parse_id(id)) else {
                    self.answer(&callback, None, false).await;
                    return;
                };

                if let Some(message_id) = callback.message_id {
                    if let Err(error) = self.api.clear_keyboard(chat, message_id).await {
                        warn!(
                            event_name = "telegram.keyboard_clear_failed",
                            chat_id = chat.0,
                            error = %error,
                            "stale keyboard left in place"
                        );
                    }
                }

                self.dialogues
                    .set(chat, DialogueState::AwaitDecisionComment { request_id: id, outcome });
                self.answer(&callback, None, false).await;
                self.send_text(chat, format::DECISION_COMMENT_PROMPT).await;
            }
            ["edit", id] => {
                if !self.is_admin(callback.from.id) {
                    self.answer(&callback, Some(format::NOT_ALLOWED), true).await;
                    return;
                }
                let Some(id) = parse_id(id) else {
                    self.answer(&callback, None, false).await;
                    return;
                };
                self.answer(&callback, None, false).await;
                self.send(OutgoingMessage::with_keyboard(
                    chat,
                    format!("Request #{id}: what should change?"),
                    format::edit_menu_keyboard(id),
                ))
                .await;
            }
            ["editfield", field, id] => {
                if !self.is_admin(callback.from.id) {
                    self.answer(&callback, Some(format::NOT_ALLOWED), true).await;
                    return;
                }
                let Some(id) = parse_id(id) else {
                    self.answer(&callback, None, false).await;
                    return;
                };
                self.answer(&callback, None, false).await;
                match *field {
                    "title" => {
                        self.dialogues.set(
                            chat,
                            DialogueState::AwaitEditValue {
                                request_id: id,
                                edit: PendingEdit::Title,
                            },
                        );
                        self.send_text(chat, "New title:").await;
                    }
                    "amount" => {
                        self.dialogues.set(
                            chat,
                            DialogueState::AwaitEditValue {
                                request_id: id,
                                edit: PendingEdit::Amount,
                            },
                        );
                        self.send_text(chat, "New amount:").await;
                    }
                    "note" => {
                        self.dialogues.set(
                            chat,
                            DialogueState::AwaitEditValue {
                                request_id: id,
                                edit: PendingEdit::Note,
                            },
                        );
                        self.send_text(chat, "Note text:").await;
                    }
                    "payment" => {
                        self.send(OutgoingMessage::with_keyboard(
                            chat,
                            format::PAYMENT_PROMPT,
                            format::set_payment_keyboard(id),
                        ))
                        .await;
                    }
                    "budget" => {
                        self.send(OutgoingMessage::with_keyboard(
                            chat,
                            format::BUDGET_PROMPT,
                            format::set_budget_keyboard(id),
                        ))
                        .await;
                    }
                    _ => {}
                }
            }
            ["setpay", method, id] => {
                if !self.is_admin(callback.from.id) {
                    self.answer(&callback, Some(format::NOT_ALLOWED), true).await;
                    return;
                }
                let (Some(method), Some(id)) = (PaymentMethod::parse(method), parse_id(id))
                else {
                    self.answer(&callback, None, false).await;
                    return;
                };
                self.answer(&callback, None, false).await;
                self.apply_admin_edit(chat, id, EditField::PaymentMethod(method)).await;
            }
            ["setbudget", category, id] => {
                if !self.is_admin(callback.from.id) {
                    self.answer(&callback, Some(format::NOT_ALLOWED), true).await;
                    return;
                }
                let (Some(category), Some(id)) = (BudgetCategory::parse(category), parse_id(id))
                else {
                    self.answer(&callback, None, false).await;
                    return;
                };
                self.answer(&callback, None, false).await;
                self.apply_admin_edit(chat, id, EditField::BudgetCategory(category)).await;
            }
            _ => {
                self.answer(&callback, None, false).await;
            }
        }
    }

    async fn apply_admin_edit(&self, chat: ChatId, id: RequestId, field: EditField) {
        match self.engine.edit_field(id, field).await {
            Ok(()) => self.send_text(chat, format!("Request #{id} updated.")).await,
            Err(error) => self.send_text(chat, lifecycle_error_text(&error)).await,
        }
    }
}

#[async_trait]
impl<S, N, A, E> UpdateHandler for Dispatcher<S, N, A, E>
where
    S: RequestStore,
    N: NotificationSink,
    A: TelegramApi,
    E: ExportTrigger,
{
    async fn handle(&self, update: Update) {
        info!(
            event_name = "ingress.telegram.update_received",
            update_id = update.update_id,
            has_message = update.message.is_some(),
            has_callback = update.callback.is_some(),
            "received update"
        );

        if let Some(message) = update.message {
            self.on_message(message).await;
        }
        if let Some(callback) = update.callback {
            self.on_callback(callback).await;
        }
    }
}

fn parse_id(value: &str) -> Option<RequestId> {
    value.parse::<i64>().ok().map(RequestId)
}

fn parse_outcome(value: &str) -> Option<DecisionOutcome> {
    match value {
        "approve" => Some(DecisionOutcome::Approved),
        "reject" => Some(DecisionOutcome::Rejected),
        _ => None,
    }
}

fn lifecycle_error_text(error: &LifecycleError) -> String {
    match error {
        LifecycleError::Validation(reason) => format!("That does not work: {reason}"),
        LifecycleError::NotFound(id) => format!("Request #{id} does not exist."),
        LifecycleError::AlreadyDecided(id) => {
            format!("Request #{id} is already decided; nothing was changed.")
        }
        LifecycleError::Store(_) => "Something went wrong, try again later.".to_string(),
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use rust_decimal::Decimal;

    use paydesk_core::domain::request::{
        BudgetCategory, PaymentMethod, RequestStatus,
    };
    use paydesk_core::lifecycle::LifecycleEngine;
    use paydesk_core::notify::NoopNotificationSink;
    use paydesk_core::store::{InMemoryRequestStore, RequestStore};

    use super::{Dispatcher, ExportTrigger, NoopExportTrigger};
    use crate::api::{
        Callback, ChatId, IncomingMessage, ScriptedTelegramApi, Sender, SentItem, Update,
    };
    use crate::poll::UpdateHandler;

    const ADMIN: i64 = 1;
    const AUTHOR: i64 = 100;

    type TestDispatcher<E = NoopExportTrigger> = Dispatcher<
        Arc<InMemoryRequestStore>,
        NoopNotificationSink,
        Arc<ScriptedTelegramApi>,
        E,
    >;

    fn dispatcher() -> (Arc<InMemoryRequestStore>, Arc<ScriptedTelegramApi>, TestDispatcher) {
        dispatcher_with(NoopExportTrigger)
    }

    fn dispatcher_with<E: ExportTrigger>(
        exporter: E,
    ) -> (Arc<InMemoryRequestStore>, Arc<ScriptedTelegramApi>, TestDispatcher<E>) {
        let store = Arc::new(InMemoryRequestStore::new());
        let api = Arc::new(ScriptedTelegramApi::new());
        let engine =
            Arc::new(LifecycleEngine::new(Arc::clone(&store), NoopNotificationSink));
        let dispatcher = Dispatcher::new(engine, Arc::clone(&api), vec![ADMIN], exporter);
        (store, api, dispatcher)
    }

    fn message(chat: i64, from: i64, text: &str) -> Update {
        Update {
            update_id: 0,
            message: Some(IncomingMessage {
                chat: ChatId(chat),
                from: Some(Sender { id: from, first_name: "Someone".to_string() }),
                text: Some(text.to_string()),
                document_id: None,
                photo_id: None,
            }),
            callback: None,
        }
    }

    fn callback(from: i64, data: &str) -> Update {
        callback_in(from, from, data)
    }

    fn callback_in(chat: i64, from: i64, data: &str) -> Update {
        Update {
            update_id: 0,
            message: None,
            callback: Some(Callback {
                id: "cb".to_string(),
                from: Sender { id: from, first_name: "Someone".to_string() },
                chat: Some(ChatId(chat)),
                message_id: Some(5),
                data: Some(data.to_string()),
            }),
        }
    }

    async fn run_submission<E: ExportTrigger>(dispatcher: &TestDispatcher<E>) {
        dispatcher.handle(message(AUTHOR, AUTHOR, "/new")).await;
        dispatcher.handle(message(AUTHOR, AUTHOR, "coffee machine")).await;
        dispatcher.handle(message(AUTHOR, AUTHOR, "12 400")).await;
        dispatcher.handle(callback(AUTHOR, "pay:bank-transfer")).await;
        dispatcher.handle(callback(AUTHOR, "budget:tech")).await;
        dispatcher.handle(message(AUTHOR, AUTHOR, "skip")).await;
    }

    #[tokio::test]
    async fn full_dialogue_produces_one_submission() {
        let (store, api, dispatcher) = dispatcher();
        run_submission(&dispatcher).await;

        let request = store.next_unexported().await.unwrap();
        assert!(request.is_none(), "not decided yet, nothing to export");

        let request = store
            .fetch(paydesk_core::domain::request::RequestId(1))
            .await
            .unwrap()
            .expect("submitted request");
        assert_eq!(request.title, "coffee machine");
        assert_eq!(request.amount, Decimal::new(12400, 0));
        assert_eq!(request.payment_method, PaymentMethod::BankTransfer);
        assert_eq!(request.budget_category, BudgetCategory::Tech);
        assert!(request.attachment.is_none());
        assert_eq!(request.status, RequestStatus::New);

        let confirmations = api.messages_to(ChatId(AUTHOR));
        assert!(confirmations.iter().any(|m| m.text.contains("Request #1 submitted")));
    }

    #[tokio::test]
    async fn decision_flow_commits_and_reports() {
        let (store, api, dispatcher) = dispatcher();
        run_submission(&dispatcher).await;

        dispatcher.handle(callback(ADMIN, "decide:approve:1")).await;
        dispatcher.handle(message(ADMIN, ADMIN, "-")).await;

        let request = store
            .fetch(paydesk_core::domain::request::RequestId(1))
            .await
            .unwrap()
            .unwrap();
        assert_eq!(request.status, RequestStatus::Approved);
        assert_eq!(request.decision.unwrap().comment, "");

        // Decision buttons are retired from the prompt message.
        assert!(api
            .sent()
            .iter()
            .any(|item| matches!(item, SentItem::KeyboardCleared { message_id: 5, .. })));
        assert!(api
            .messages_to(ChatId(ADMIN))
            .iter()
            .any(|m| m.text.contains("decision saved")));
    }

    #[tokio::test]
    async fn non_admins_are_rejected_with_an_alert() {
        let (store, api, dispatcher) = dispatcher();
        run_submission(&dispatcher).await;

        dispatcher.handle(callback(AUTHOR, "decide:approve:1")).await;

        let request = store
            .fetch(paydesk_core::domain::request::RequestId(1))
            .await
            .unwrap()
            .unwrap();
        assert_eq!(request.status, RequestStatus::New);

        assert!(api.sent().iter().any(|item| matches!(
            item,
            SentItem::CallbackAnswer { alert: true, .. }
        )));
    }

    #[tokio::test]
    async fn pending_decision_comment_ignores_non_admin_input() {
        let (store, api, dispatcher) = dispatcher();
        run_submission(&dispatcher).await;

        // Admin opens the decision flow in a group chat; another member
        // answers first.
        let group = 50;
        dispatcher.handle(callback_in(group, ADMIN, "decide:approve:1")).await;
        dispatcher.handle(message(group, AUTHOR, "-")).await;

        let request = store
            .fetch(paydesk_core::domain::request::RequestId(1))
            .await
            .unwrap()
            .unwrap();
        assert_eq!(request.status, RequestStatus::New, "non-admin input must not commit");
        assert!(api
            .messages_to(ChatId(group))
            .iter()
            .any(|m| m.text.contains("Not allowed")));

        // The flow stays open for the admin.
        dispatcher.handle(message(group, ADMIN, "-")).await;
        let request = store
            .fetch(paydesk_core::domain::request::RequestId(1))
            .await
            .unwrap()
            .unwrap();
        assert_eq!(request.status, RequestStatus::Approved);
        assert_eq!(request.decision.unwrap().decided_by.id.0, ADMIN);
    }

    #[tokio::test]
    async fn pending_edit_value_ignores_non_admin_input() {
        let (store, _api, dispatcher) = dispatcher();
        run_submission(&dispatcher).await;

        let group = 50;
        dispatcher.handle(callback_in(group, ADMIN, "editfield:amount:1")).await;
        dispatcher.handle(message(group, AUTHOR, "1")).await;

        let request = store
            .fetch(paydesk_core::domain::request::RequestId(1))
            .await
            .unwrap()
            .unwrap();
        assert_eq!(request.status, RequestStatus::New, "non-admin input must not edit");
        assert_eq!(request.amount, Decimal::new(12400, 0));
    }

    #[tokio::test]
    async fn second_decision_reports_already_decided() {
        let (_store, api, dispatcher) = dispatcher();
        run_submission(&dispatcher).await;

        dispatcher.handle(callback(ADMIN, "decide:approve:1")).await;
        dispatcher.handle(message(ADMIN, ADMIN, "-")).await;

        dispatcher.handle(callback(ADMIN, "decide:reject:1")).await;
        dispatcher.handle(message(ADMIN, ADMIN, "too late")).await;

        assert!(api
            .messages_to(ChatId(ADMIN))
            .iter()
            .any(|m| m.text.contains("already decided")));
    }

    #[tokio::test]
    async fn admin_edit_forces_rework_via_buttons() {
        let (store, _api, dispatcher) = dispatcher();
        run_submission(&dispatcher).await;

        dispatcher.handle(callback(ADMIN, "editfield:amount:1")).await;
        dispatcher.handle(message(ADMIN, ADMIN, "11 900")).await;

        let request = store
            .fetch(paydesk_core::domain::request::RequestId(1))
            .await
            .unwrap()
            .unwrap();
        assert_eq!(request.status, RequestStatus::Rework);
        assert_eq!(request.amount, Decimal::new(11900, 0));
    }

    #[tokio::test]
    async fn export_failure_after_decision_is_reported_but_not_fatal() {
        struct FailingTrigger;

        #[async_trait::async_trait]
        impl ExportTrigger for FailingTrigger {
            async fn kick(&self) -> Result<(), String> {
                Err("ledger offline".to_string())
            }
        }

        let (store, api, dispatcher) = dispatcher_with(FailingTrigger);
        run_submission(&dispatcher).await;

        dispatcher.handle(callback(ADMIN, "decide:reject:1")).await;
        dispatcher.handle(message(ADMIN, ADMIN, "duplicate purchase")).await;

        let request = store
            .fetch(paydesk_core::domain::request::RequestId(1))
            .await
            .unwrap()
            .unwrap();
        assert_eq!(request.status, RequestStatus::Rejected);
        assert!(!request.exported);

        assert!(api
            .messages_to(ChatId(ADMIN))
            .iter()
            .any(|m| m.text.contains("export failed")));
    }
}
