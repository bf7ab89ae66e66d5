use std::collections::HashMap;
use std::sync::Mutex;

use rust_decimal::Decimal;

use paydesk_core::domain::request::{
    Attachment, BudgetCategory, DecisionOutcome, PaymentMethod, RequestDraft, RequestId,
};

use crate::api::ChatId;

/// Field an admin is typing a replacement value for.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum PendingEdit {
    Title,
    Amount,
    Note,
}

/// Per-chat conversation position. Submission walks the variants top to
/// bottom; admin states are entered from callback buttons.
#[derive(Clone, Debug, PartialEq)]
pub enum DialogueState {
    AwaitTitle,
    AwaitAmount {
        title: String,
    },
    AwaitPayment {
        title: String,
        amount: Decimal,
    },
    AwaitBudget {
        title: String,
        amount: Decimal,
        payment: PaymentMethod,
    },
    AwaitAttachment {
        title: String,
        amount: Decimal,
        payment: PaymentMethod,
        budget: BudgetCategory,
    },
    AwaitDecisionComment {
        request_id: RequestId,
        outcome: DecisionOutcome,
    },
    AwaitEditValue {
        request_id: RequestId,
        edit: PendingEdit,
    },
}

impl DialogueState {
    pub fn draft(
        title: String,
        amount: Decimal,
        payment: PaymentMethod,
        budget: BudgetCategory,
        attachment: Option<Attachment>,
    ) -> RequestDraft {
        RequestDraft { title, amount, payment_method: payment, budget_category: budget, attachment }
    }
}

/// In-memory dialogue positions keyed by chat. State is deliberately
/// volatile; a restart just re-prompts.
#[derive(Default)]
pub struct DialogueStore {
    states: Mutex<HashMap<i64, DialogueState>>,
}

impl DialogueStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn get(&self, chat: ChatId) -> Option<DialogueState> {
        self.states.lock().expect("dialogue mutex").get(&chat.0).cloned()
    }

    pub fn set(&self, chat: ChatId, state: DialogueState) {
        self.states.lock().expect("dialogue mutex").insert(chat.0, state);
    }

    pub fn clear(&self, chat: ChatId) {
        self.states.lock().expect("dialogue mutex").remove(&chat.0);
    }
}

/// Parses a human-typed amount: thousands spaces (regular or non-breaking)
/// and a comma decimal separator are accepted. Must be positive.
pub fn parse_amount(text: &str) -> Option<Decimal> {
    let cleaned: String = text
        .trim()
        .chars()
        .filter(|ch| *ch != ' ' && *ch != '\u{a0}')
        .map(|ch| if ch == ',' { '.' } else { ch })
        .collect();

    let amount: Decimal = cleaned.parse().ok()?;
    (amount > Decimal::ZERO).then_some(amount)
}

/// The "no attachment" escape word for the final submission step.
pub fn is_skip_word(text: &str) -> bool {
    matches!(text.trim().to_lowercase().as_str(), "skip" | "-" | "no")
}
