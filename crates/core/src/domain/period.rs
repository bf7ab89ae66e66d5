use chrono::{DateTime, Datelike, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

/// Ledger month section key, rendered as two-digit month + four-digit year
/// ("03.2025").
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct PeriodKey {
    pub year: i32,
    pub month: u32,
}

impl PeriodKey {
    pub fn from_timestamp(at: DateTime<Utc>) -> Self {
        Self { year: at.year(), month: at.month() }
    }

    /// Prefix that matches the first seven characters of an RFC 3339 UTC
    /// timestamp ("2025-03"), used for month-bounded store queries.
    pub fn ym_prefix(&self) -> String {
        format!("{:04}-{:02}", self.year, self.month)
    }
}

impl std::fmt::Display for PeriodKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{:02}.{:04}", self.month, self.year)
    }
}

/// Running totals for one ledger month, recomputed from the store on every
/// export pass.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct MonthTotals {
    pub approved_count: u64,
    pub approved_sum: Decimal,
    pub rejected_count: u64,
    pub rejected_sum: Decimal,
}
