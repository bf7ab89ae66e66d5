use std::collections::HashMap;
use std::sync::Mutex;

use async_trait::async_trait;
use rust_decimal::Decimal;

use paydesk_core::domain::period::{MonthTotals, PeriodKey};
use paydesk_core::domain::request::{Request, RequestId, RequestStatus};
use paydesk_core::errors::SinkError;

/// Title-column marker that identifies totals rows. Rewriting totals deletes
/// every row carrying it before appending fresh figures.
pub const TOTALS_MARKER: &str = "----- TOTALS -----";

pub const HEADER_CELLS: [&str; 10] = [
    "Date", "ID", "Author", "Title", "Amount", "Payment", "Budget", "Status", "Decided by",
    "Comment",
];

// Title lives at this offset in both data and totals rows.
const TITLE_COLUMN: usize = 3;

/// One exported request, flattened to ledger cells.
#[derive(Clone, Debug, PartialEq)]
pub struct LedgerRow {
    pub created_on: String,
    pub id: RequestId,
    pub author: String,
    pub title: String,
    pub amount: Decimal,
    pub payment: String,
    pub budget: String,
    pub status: RequestStatus,
    pub decided_by: String,
    pub comment: String,
}

impl LedgerRow {
    pub fn from_request(request: &Request) -> Self {
        let (decided_by, comment) = match &request.decision {
            Some(decision) => (decision.decided_by.name.clone(), decision.comment.clone()),
            None => (String::new(), String::new()),
        };

        Self {
            created_on: request.created_at.format("%Y-%m-%d").to_string(),
            id: request.id,
            author: request.author.name.clone(),
            title: request.title.clone(),
            amount: request.amount,
            payment: request.payment_method.label().to_string(),
            budget: request.budget_category.label().to_string(),
            status: request.status,
            decided_by,
            comment,
        }
    }

    pub fn cells(&self) -> Vec<String> {
        vec![
            self.created_on.clone(),
            self.id.to_string(),
            self.author.clone(),
            self.title.clone(),
            self.amount.to_string(),
            self.payment.clone(),
            self.budget.clone(),
            self.status.to_string(),
            self.decided_by.clone(),
            self.comment.clone(),
        ]
    }
}

/// Opaque reference to one month section inside the ledger.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct SectionHandle {
    pub section_id: i64,
    pub title: String,
}

pub fn is_totals_row(cells: &[String]) -> bool {
    cells.get(TITLE_COLUMN).map(String::as_str) == Some(TOTALS_MARKER)
}

/// Cell layout for the two totals rows a section carries.
pub fn totals_cells(totals: &MonthTotals) -> Vec<Vec<String>> {
    let row = |label: &str, count: u64, sum: &Decimal| {
        vec![
            String::new(),
            String::new(),
            String::new(),
            TOTALS_MARKER.to_string(),
            sum.to_string(),
            String::new(),
            String::new(),
            label.to_string(),
            String::new(),
            format!("{count} request(s)"),
        ]
    };

    vec![
        row("approved", totals.approved_count, &totals.approved_sum),
        row("rejected", totals.rejected_count, &totals.rejected_sum),
    ]
}

/// Append-only monthly ledger. Appends are at-least-once from the caller's
/// point of view; the sink itself never deduplicates data rows.
#[async_trait]
pub trait LedgerSink: Send + Sync {
    /// Returns the section for the period, creating it (with a header row)
    /// on first use.
    async fn ensure_section(&self, period: &PeriodKey) -> Result<SectionHandle, SinkError>;

    async fn append_row(&self, section: &SectionHandle, row: &LedgerRow)
        -> Result<(), SinkError>;

    /// Drops every totals row in the section and appends fresh ones.
    async fn rewrite_totals(
        &self,
        section: &SectionHandle,
        totals: &MonthTotals,
    ) -> Result<(), SinkError>;
}

#[async_trait]
impl<T: LedgerSink + ?Sized> LedgerSink for std::sync::Arc<T> {
    async fn ensure_section(&self, period: &PeriodKey) -> Result<SectionHandle, SinkError> {
        (**self).ensure_section(period).await
    }

    async fn append_row(
        &self,
        section: &SectionHandle,
        row: &LedgerRow,
    ) -> Result<(), SinkError> {
        (**self).append_row(section, row).await
    }

    async fn rewrite_totals(
        &self,
        section: &SectionHandle,
        totals: &MonthTotals,
    ) -> Result<(), SinkError> {
        (**self).rewrite_totals(section, totals).await
    }
}

#[derive(Default)]
struct LedgerPages {
    sections: Vec<(String, Vec<Vec<String>>)>,
}

/// In-memory ledger with the same observable behavior as the sheets sink,
/// plus an optional failure switch for exercising abort paths.
#[derive(Default)]
pub struct InMemoryLedger {
    pages: Mutex<LedgerPages>,
    fail: Mutex<HashMap<&'static str, bool>>,
}

impl InMemoryLedger {
    pub fn new() -> Self {
        Self::default()
    }

    /// Makes the named operation (`ensure`, `append`, `totals`) fail until
    /// cleared.
    pub fn fail_on(&self, operation: &'static str, fail: bool) {
        self.fail.lock().expect("ledger mutex").insert(operation, fail);
    }

    fn check(&self, operation: &'static str) -> Result<(), SinkError> {
        let failing =
            self.fail.lock().expect("ledger mutex").get(operation).copied().unwrap_or(false);
        if failing {
            return Err(SinkError::Unavailable(format!("ledger {operation} set to fail")));
        }
        Ok(())
    }

    pub fn section_titles(&self) -> Vec<String> {
        let pages = self.pages.lock().expect("ledger mutex");
        pages.sections.iter().map(|(title, _)| title.clone()).collect()
    }

    /// All rows of a section, header and totals included.
    pub fn rows(&self, title: &str) -> Vec<Vec<String>> {
        let pages = self.pages.lock().expect("ledger mutex");
        pages
            .sections
            .iter()
            .find(|(section, _)| section == title)
            .map(|(_, rows)| rows.clone())
            .unwrap_or_default()
    }

    pub fn data_rows(&self, title: &str) -> Vec<Vec<String>> {
        self.rows(title)
            .into_iter()
            .skip(1)
            .filter(|cells| !is_totals_row(cells))
            .collect()
    }

    pub fn totals_rows(&self, title: &str) -> Vec<Vec<String>> {
        self.rows(title).into_iter().filter(|cells| is_totals_row(cells)).collect()
    }
}

#[async_trait]
impl LedgerSink for InMemoryLedger {
    async fn ensure_section(&self, period: &PeriodKey) -> Result<SectionHandle, SinkError> {
        self.check("ensure")?;
        let title = period.to_string();
        let mut pages = self.pages.lock().expect("ledger mutex");

        let position = match pages.sections.iter().position(|(section, _)| *section == title) {
            Some(position) => position,
            None => {
                let header = HEADER_CELLS.iter().map(|cell| cell.to_string()).collect();
                pages.sections.push((title.clone(), vec![header]));
                pages.sections.len() - 1
            }
        };

        Ok(SectionHandle { section_id: position as i64, title })
    }

    async fn append_row(
        &self,
        section: &SectionHandle,
        row: &LedgerRow,
    ) -> Result<(), SinkError> {
        self.check("append")?;
        let mut pages = self.pages.lock().expect("ledger mutex");
        let Some((_, rows)) =
            pages.sections.iter_mut().find(|(title, _)| *title == section.title)
        else {
            return Err(SinkError::Rejected(format!("no such section `{}`", section.title)));
        };
        rows.push(row.cells());
        Ok(())
    }

    async fn rewrite_totals(
        &self,
        section: &SectionHandle,
        totals: &MonthTotals,
    ) -> Result<(), SinkError> {
        self.check("totals")?;
        let mut pages = self.pages.lock().expect("ledger mutex");
        let Some((_, rows)) =
            pages.sections.iter_mut().find(|(title, _)| *title == section.title)
        else {
            return Err(SinkError::Rejected(format!("no such section `{}`", section.title)));
        };
        rows.retain(|cells| !is_totals_row(cells));
        rows.extend(totals_cells(totals));
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use rust_decimal::Decimal;

    use paydesk_core::domain::period::{MonthTotals, PeriodKey};

    use super::{is_totals_row, totals_cells, InMemoryLedger, LedgerSink, TOTALS_MARKER};

    #[tokio::test]
    async fn ensure_section_is_idempotent_and_writes_a_header() {
        let ledger = InMemoryLedger::new();
        let period = PeriodKey { year: 2025, month: 3 };

        let first = ledger.ensure_section(&period).await.unwrap();
        let second = ledger.ensure_section(&period).await.unwrap();

        assert_eq!(first, second);
        assert_eq!(first.title, "03.2025");
        assert_eq!(ledger.section_titles(), vec!["03.2025".to_string()]);
        assert_eq!(ledger.rows("03.2025").len(), 1);
        assert_eq!(ledger.rows("03.2025")[0][0], "Date");
    }

    #[tokio::test]
    async fn rewriting_totals_twice_leaves_exactly_two_totals_rows() {
        let ledger = InMemoryLedger::new();
        let period = PeriodKey { year: 2025, month: 3 };
        let section = ledger.ensure_section(&period).await.unwrap();

        let mut totals = MonthTotals::default();
        totals.approved_count = 2;
        totals.approved_sum = Decimal::new(300, 0);
        ledger.rewrite_totals(&section, &totals).await.unwrap();

        totals.approved_count = 3;
        totals.approved_sum = Decimal::new(425, 0);
        ledger.rewrite_totals(&section, &totals).await.unwrap();

        let totals_rows = ledger.totals_rows("03.2025");
        assert_eq!(totals_rows.len(), 2);
        assert_eq!(totals_rows[0][4], "425");
        assert_eq!(totals_rows[0][9], "3 request(s)");
    }

    #[test]
    fn totals_rows_carry_the_marker_in_the_title_column() {
        let cells = totals_cells(&MonthTotals::default());
        assert!(cells.iter().all(|row| is_totals_row(row)));
        assert!(cells.iter().all(|row| row[3] == TOTALS_MARKER));
    }
}
