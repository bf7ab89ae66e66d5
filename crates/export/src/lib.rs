pub mod reconciler;
pub mod sheets;
pub mod sink;

pub use reconciler::{ExportError, ExportOutcome, ExportReconciler};
pub use sheets::GoogleSheetsLedger;
pub use sink::{InMemoryLedger, LedgerRow, LedgerSink, SectionHandle, TOTALS_MARKER};
