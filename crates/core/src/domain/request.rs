use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct RequestId(pub i64);

impl std::fmt::Display for RequestId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct UserId(pub i64);

impl std::fmt::Display for UserId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// A human actor: the request author or a deciding admin.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Actor {
    pub id: UserId,
    pub name: String,
}

impl Actor {
    pub fn new(id: i64, name: impl Into<String>) -> Self {
        Self { id: UserId(id), name: name.into() }
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum RequestStatus {
    New,
    Rework,
    Approved,
    Rejected,
}

impl RequestStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::New => "new",
            Self::Rework => "rework",
            Self::Approved => "approved",
            Self::Rejected => "rejected",
        }
    }

    /// Terminal states have no outgoing transitions.
    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Approved | Self::Rejected)
    }
}

impl std::fmt::Display for RequestStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// The terminal act of an admin on a request.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum DecisionOutcome {
    Approved,
    Rejected,
}

impl DecisionOutcome {
    pub fn status(&self) -> RequestStatus {
        match self {
            Self::Approved => RequestStatus::Approved,
            Self::Rejected => RequestStatus::Rejected,
        }
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum PaymentMethod {
    Cash,
    BankTransfer,
    BusinessCard,
}

impl PaymentMethod {
    pub const ALL: [PaymentMethod; 3] = [Self::Cash, Self::BankTransfer, Self::BusinessCard];

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Cash => "cash",
            Self::BankTransfer => "bank-transfer",
            Self::BusinessCard => "business-card",
        }
    }

    /// Human-facing label used in chat messages and ledger rows.
    pub fn label(&self) -> &'static str {
        match self {
            Self::Cash => "Cash",
            Self::BankTransfer => "Bank transfer",
            Self::BusinessCard => "Business card",
        }
    }

    pub fn parse(value: &str) -> Option<Self> {
        Self::ALL.iter().copied().find(|method| method.as_str() == value.trim())
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum BudgetCategory {
    Facilities,
    SuppliesKitchen,
    SuppliesBar,
    Tech,
    Payroll,
    Marketing,
    Other,
}

impl BudgetCategory {
    pub const ALL: [BudgetCategory; 7] = [
        Self::Facilities,
        Self::SuppliesKitchen,
        Self::SuppliesBar,
        Self::Tech,
        Self::Payroll,
        Self::Marketing,
        Self::Other,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Facilities => "facilities",
            Self::SuppliesKitchen => "supplies-kitchen",
            Self::SuppliesBar => "supplies-bar",
            Self::Tech => "tech",
            Self::Payroll => "payroll",
            Self::Marketing => "marketing",
            Self::Other => "other",
        }
    }

    pub fn label(&self) -> &'static str {
        match self {
            Self::Facilities => "Facilities",
            Self::SuppliesKitchen => "Kitchen supplies",
            Self::SuppliesBar => "Bar supplies",
            Self::Tech => "Tech",
            Self::Payroll => "Payroll",
            Self::Marketing => "Marketing",
            Self::Other => "Other",
        }
    }

    pub fn parse(value: &str) -> Option<Self> {
        Self::ALL.iter().copied().find(|category| category.as_str() == value.trim())
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum AttachmentKind {
    Document,
    Photo,
}

impl AttachmentKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Document => "document",
            Self::Photo => "photo",
        }
    }

    pub fn parse(value: &str) -> Option<Self> {
        match value.trim() {
            "document" => Some(Self::Document),
            "photo" => Some(Self::Photo),
            _ => None,
        }
    }
}

/// Reference to an external binary object; at most one per request.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Attachment {
    pub file_id: String,
    pub kind: AttachmentKind,
}

/// Decision metadata; present iff the request is in a terminal state.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Decision {
    pub decided_at: DateTime<Utc>,
    pub decided_by: Actor,
    pub comment: String,
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Request {
    pub id: RequestId,
    pub author: Actor,
    pub title: String,
    pub amount: Decimal,
    pub payment_method: PaymentMethod,
    pub budget_category: BudgetCategory,
    pub attachment: Option<Attachment>,
    pub status: RequestStatus,
    pub decision: Option<Decision>,
    pub exported: bool,
    pub created_at: DateTime<Utc>,
}

impl Request {
    pub fn can_transition_to(&self, next: RequestStatus) -> bool {
        matches!(
            (self.status, next),
            (RequestStatus::New, RequestStatus::Rework)
                | (RequestStatus::New, RequestStatus::Approved)
                | (RequestStatus::New, RequestStatus::Rejected)
                | (RequestStatus::Rework, RequestStatus::Rework)
                | (RequestStatus::Rework, RequestStatus::Approved)
                | (RequestStatus::Rework, RequestStatus::Rejected)
        )
    }

    /// Content fields may only change before a terminal decision.
    pub fn is_editable(&self) -> bool {
        !self.status.is_terminal()
    }

    /// Timestamp that places the request into a ledger month section.
    /// Falls back to the creation time for legacy rows without a decision
    /// timestamp.
    pub fn export_timestamp(&self) -> DateTime<Utc> {
        self.decision.as_ref().map(|decision| decision.decided_at).unwrap_or(self.created_at)
    }
}

/// Validated submission content, produced by the front end once the input
/// dialogue has collected every field.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct RequestDraft {
    pub title: String,
    pub amount: Decimal,
    pub payment_method: PaymentMethod,
    pub budget_category: BudgetCategory,
    pub attachment: Option<Attachment>,
}

/// A single-field admin edit. One variant per editable column; the store
/// applies exactly one column plus the forced `rework` status in a single
/// conditional statement.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub enum EditField {
    Title(String),
    Amount(Decimal),
    PaymentMethod(PaymentMethod),
    BudgetCategory(BudgetCategory),
}

impl EditField {
    pub fn name(&self) -> &'static str {
        match self {
            Self::Title(_) => "title",
            Self::Amount(_) => "amount",
            Self::PaymentMethod(_) => "payment method",
            Self::BudgetCategory(_) => "budget category",
        }
    }
}
