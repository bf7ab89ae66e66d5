use paydesk_core::domain::request::{BudgetCategory, PaymentMethod, RequestId};
use paydesk_core::notify::RequestSummary;

use crate::api::{Button, Keyboard};

pub const GREETING: &str = "This bot tracks payment requests. Send /new to submit one, \
/whoami to see your id.";

pub const TITLE_PROMPT: &str = "What are we paying for? Send a short title.";
pub const AMOUNT_PROMPT: &str = "Amount? Digits only, comma or dot for kopecks.";
pub const PAYMENT_PROMPT: &str = "How should it be paid?";
pub const BUDGET_PROMPT: &str = "Which budget does it come from?";
pub const ATTACHMENT_PROMPT: &str =
    "Attach an invoice or receipt (document or photo), or send \"skip\".";
pub const DECISION_COMMENT_PROMPT: &str = "Comment for the author, or \"-\" for none.";
pub const NOT_ALLOWED: &str = "Not allowed.";

pub fn summary_text(summary: &RequestSummary) -> String {
    let mut text = format!(
        "Request #{id} from {author}\n{title}\n{amount} via {payment}\nBudget: {budget}",
        id = summary.id,
        author = summary.author_name,
        title = summary.title,
        amount = summary.amount,
        payment = summary.payment_method.label(),
        budget = summary.budget_category.label(),
    );
    if summary.attachment.is_some() {
        text.push_str("\nAttachment included.");
    }
    text
}

pub fn payment_keyboard() -> Keyboard {
    Keyboard::default().row(
        PaymentMethod::ALL
            .iter()
            .map(|method| Button::new(method.label(), format!("pay:{}", method.as_str())))
            .collect(),
    )
}

pub fn budget_keyboard() -> Keyboard {
    BudgetCategory::ALL.chunks(2).fold(Keyboard::default(), |keyboard, pair| {
        keyboard.row(
            pair.iter()
                .map(|category| {
                    Button::new(category.label(), format!("budget:{}", category.as_str()))
                })
                .collect(),
        )
    })
}

/// Decision buttons attached to the admin copy of a submission.
pub fn admin_keyboard(id: RequestId) -> Keyboard {
    Keyboard::default()
        .row(vec![
            Button::new("Approve", format!("decide:approve:{id}")),
            Button::new("Reject", format!("decide:reject:{id}")),
        ])
        .row(vec![Button::new("Edit", format!("edit:{id}"))])
}

pub fn edit_menu_keyboard(id: RequestId) -> Keyboard {
    Keyboard::default()
        .row(vec![
            Button::new("Title", format!("editfield:title:{id}")),
            Button::new("Amount", format!("editfield:amount:{id}")),
        ])
        .row(vec![
            Button::new("Payment", format!("editfield:payment:{id}")),
            Button::new("Budget", format!("editfield:budget:{id}")),
        ])
        .row(vec![Button::new("Note", format!("editfield:note:{id}"))])
}

pub fn set_payment_keyboard(id: RequestId) -> Keyboard {
    Keyboard::default().row(
        PaymentMethod::ALL
            .iter()
            .map(|method| Button::new(method.label(), format!("setpay:{}:{id}", method.as_str())))
            .collect(),
    )
}

pub fn set_budget_keyboard(id: RequestId) -> Keyboard {
    BudgetCategory::ALL.chunks(2).fold(Keyboard::default(), |keyboard, pair| {
        keyboard.row(
            pair.iter()
                .map(|category| {
                    Button::new(category.label(), format!("setbudget:{}:{id}", category.as_str()))
                })
                .collect(),
        )
    })
}
