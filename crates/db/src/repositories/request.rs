use std::str::FromStr;

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use sqlx::Row;

use paydesk_core::domain::comment::{Comment, CommentId};
use paydesk_core::domain::period::{MonthTotals, PeriodKey};
use paydesk_core::domain::request::{
    Actor, Attachment, AttachmentKind, BudgetCategory, Decision, EditField, PaymentMethod,
    Request, RequestId, RequestStatus, UserId,
};
use paydesk_core::errors::StoreError;
use paydesk_core::store::{DecisionRecord, NewRequestRecord, RequestStore};

use crate::DbPool;

const REQUEST_COLUMNS: &str = "id, author_id, author_name, title, amount, payment_method, \
     budget_category, attachment_file_id, attachment_kind, status, decided_at, decided_by_id, \
     decided_by_name, decision_comment, exported, created_at";

/// SQLite-backed request store. Every guarded mutation is a single
/// conditional UPDATE; the affected-row count it returns is the only
/// concurrency signal callers get.
pub struct SqlRequestStore {
    pool: DbPool,
}

impl SqlRequestStore {
    pub fn new(pool: DbPool) -> Self {
        Self { pool }
    }
}

fn db_err(error: sqlx::Error) -> StoreError {
    StoreError::Unavailable(error.to_string())
}

fn decode_err(message: impl Into<String>) -> StoreError {
    StoreError::Decode(message.into())
}

fn parse_status(value: &str) -> Result<RequestStatus, StoreError> {
    match value {
        "new" => Ok(RequestStatus::New),
        "rework" => Ok(RequestStatus::Rework),
        "approved" => Ok(RequestStatus::Approved),
        "rejected" => Ok(RequestStatus::Rejected),
        other => Err(decode_err(format!("unknown request status `{other}`"))),
    }
}

fn parse_attachment_kind(value: &str) -> Result<AttachmentKind, StoreError> {
    match value {
        "document" => Ok(AttachmentKind::Document),
        "photo" => Ok(AttachmentKind::Photo),
        other => Err(decode_err(format!("unknown attachment kind `{other}`"))),
    }
}

fn parse_timestamp(value: &str) -> Result<DateTime<Utc>, StoreError> {
    DateTime::parse_from_rfc3339(value)
        .map(|dt| dt.with_timezone(&Utc))
        .map_err(|error| decode_err(format!("bad timestamp `{value}`: {error}")))
}

fn parse_amount(value: &str) -> Result<Decimal, StoreError> {
    Decimal::from_str(value).map_err(|error| decode_err(format!("bad amount `{value}`: {error}")))
}

fn row_to_request(row: &sqlx::sqlite::SqliteRow) -> Result<Request, StoreError> {
    let id: i64 = row.try_get("id").map_err(|e| decode_err(e.to_string()))?;
    let author_id: i64 = row.try_get("author_id").map_err(|e| decode_err(e.to_string()))?;
    let author_name: String =
        row.try_get("author_name").map_err(|e| decode_err(e.to_string()))?;
    let title: String = row.try_get("title").map_err(|e| decode_err(e.to_string()))?;
    let amount_str: String = row.try_get("amount").map_err(|e| decode_err(e.to_string()))?;
    let payment_method_str: String =
        row.try_get("payment_method").map_err(|e| decode_err(e.to_string()))?;
    let budget_category_str: String =
        row.try_get("budget_category").map_err(|e| decode_err(e.to_string()))?;
    let attachment_file_id: Option<String> =
        row.try_get("attachment_file_id").map_err(|e| decode_err(e.to_string()))?;
    let attachment_kind_str: Option<String> =
        row.try_get("attachment_kind").map_err(|e| decode_err(e.to_string()))?;
    let status_str: String = row.try_get("status").map_err(|e| decode_err(e.to_string()))?;
    let decided_at_str: Option<String> =
        row.try_get("decided_at").map_err(|e| decode_err(e.to_string()))?;
    let decided_by_id: Option<i64> =
        row.try_get("decided_by_id").map_err(|e| decode_err(e.to_string()))?;
    let decided_by_name: Option<String> =
        row.try_get("decided_by_name").map_err(|e| decode_err(e.to_string()))?;
    let decision_comment: String =
        row.try_get("decision_comment").map_err(|e| decode_err(e.to_string()))?;
    let exported: i64 = row.try_get("exported").map_err(|e| decode_err(e.to_string()))?;
    let created_at_str: String =
        row.try_get("created_at").map_err(|e| decode_err(e.to_string()))?;

    let attachment = match (attachment_file_id, attachment_kind_str) {
        (Some(file_id), Some(kind)) => {
            Some(Attachment { file_id, kind: parse_attachment_kind(&kind)? })
        }
        (None, None) => None,
        _ => return Err(decode_err("attachment file id and kind must be set together")),
    };

    let decision = match (decided_at_str, decided_by_id, decided_by_name) {
        (Some(decided_at), Some(by_id), Some(by_name)) => Some(Decision {
            decided_at: parse_timestamp(&decided_at)?,
            decided_by: Actor { id: UserId(by_id), name: by_name },
            comment: decision_comment,
        }),
        (None, None, None) => None,
        _ => return Err(decode_err("decision columns must be set together")),
    };

    Ok(Request {
        id: RequestId(id),
        author: Actor { id: UserId(author_id), name: author_name },
        title,
        amount: parse_amount(&amount_str)?,
        payment_method: PaymentMethod::parse(&payment_method_str)
            .ok_or_else(|| decode_err(format!("unknown payment method `{payment_method_str}`")))?,
        budget_category: BudgetCategory::parse(&budget_category_str).ok_or_else(|| {
            decode_err(format!("unknown budget category `{budget_category_str}`"))
        })?,
        attachment,
        status: parse_status(&status_str)?,
        decision,
        exported: exported != 0,
        created_at: parse_timestamp(&created_at_str)?,
    })
}

fn row_to_comment(row: &sqlx::sqlite::SqliteRow) -> Result<Comment, StoreError> {
    let id: i64 = row.try_get("id").map_err(|e| decode_err(e.to_string()))?;
    let request_id: i64 = row.try_get("request_id").map_err(|e| decode_err(e.to_string()))?;
    let author_id: i64 = row.try_get("author_id").map_err(|e| decode_err(e.to_string()))?;
    let author_name: String =
        row.try_get("author_name").map_err(|e| decode_err(e.to_string()))?;
    let body: String = row.try_get("body").map_err(|e| decode_err(e.to_string()))?;
    let created_at_str: String =
        row.try_get("created_at").map_err(|e| decode_err(e.to_string()))?;

    Ok(Comment {
        id: CommentId(id),
        request_id: RequestId(request_id),
        author: Actor { id: UserId(author_id), name: author_name },
        text: body,
        created_at: parse_timestamp(&created_at_str)?,
    })
}

#[async_trait::async_trait]
impl RequestStore for SqlRequestStore {
    async fn insert(&self, record: NewRequestRecord) -> Result<Request, StoreError> {
        let (attachment_file_id, attachment_kind) = match &record.attachment {
            Some(attachment) => {
                (Some(attachment.file_id.clone()), Some(attachment.kind.as_str()))
            }
            None => (None, None),
        };

        let result = sqlx::query(
            "INSERT INTO requests (author_id, author_name, title, amount, payment_method,
                                   budget_category, attachment_file_id, attachment_kind,
                                   status, exported, created_at)
             VALUES (?, ?, ?, ?, ?, ?, ?, ?, 'new', 0, ?)",
        )
        .bind(record.author.id.0)
        .bind(&record.author.name)
        .bind(&record.title)
        .bind(record.amount.to_string())
        .bind(record.payment_method.as_str())
        .bind(record.budget_category.as_str())
        .bind(&attachment_file_id)
        .bind(attachment_kind)
        .bind(record.created_at.to_rfc3339())
        .execute(&self.pool)
        .await
        .map_err(db_err)?;

        Ok(Request {
            id: RequestId(result.last_insert_rowid()),
            author: record.author,
            title: record.title,
            amount: record.amount,
            payment_method: record.payment_method,
            budget_category: record.budget_category,
            attachment: record.attachment,
            status: RequestStatus::New,
            decision: None,
            exported: false,
            created_at: record.created_at,
        })
    }

    async fn fetch(&self, id: RequestId) -> Result<Option<Request>, StoreError> {
        let row =
            sqlx::query(&format!("SELECT {REQUEST_COLUMNS} FROM requests WHERE id = ?"))
                .bind(id.0)
                .fetch_optional(&self.pool)
                .await
                .map_err(db_err)?;

        match row {
            Some(ref row) => Ok(Some(row_to_request(row)?)),
            None => Ok(None),
        }
    }

    async fn apply_edit(&self, id: RequestId, field: &EditField) -> Result<u64, StoreError> {
        // One statement carries both the guard and the mutation; there is no
        // separate read that a concurrent decision could slip between.
        let (column, value) = match field {
            EditField::Title(title) => ("title", title.clone()),
            EditField::Amount(amount) => ("amount", amount.to_string()),
            EditField::PaymentMethod(method) => ("payment_method", method.as_str().to_string()),
            EditField::BudgetCategory(category) => {
                ("budget_category", category.as_str().to_string())
            }
        };

        let result = sqlx::query(&format!(
            "UPDATE requests SET {column} = ?, status = 'rework'
             WHERE id = ? AND status IN ('new', 'rework')"
        ))
        .bind(value)
        .bind(id.0)
        .execute(&self.pool)
        .await
        .map_err(db_err)?;

        Ok(result.rows_affected())
    }

    async fn record_decision(
        &self,
        id: RequestId,
        decision: &DecisionRecord,
    ) -> Result<u64, StoreError> {
        let result = sqlx::query(
            "UPDATE requests SET status = ?, decided_at = ?, decided_by_id = ?,
                                 decided_by_name = ?, decision_comment = ?, exported = 0
             WHERE id = ? AND status IN ('new', 'rework')",
        )
        .bind(decision.outcome.status().as_str())
        .bind(decision.decided_at.to_rfc3339())
        .bind(decision.decided_by.id.0)
        .bind(&decision.decided_by.name)
        .bind(&decision.comment)
        .bind(id.0)
        .execute(&self.pool)
        .await
        .map_err(db_err)?;

        Ok(result.rows_affected())
    }

    async fn append_comment(
        &self,
        id: RequestId,
        author: &Actor,
        text: &str,
    ) -> Result<Comment, StoreError> {
        let created_at = Utc::now();
        let result = sqlx::query(
            "INSERT INTO request_comments (request_id, author_id, author_name, body, created_at)
             VALUES (?, ?, ?, ?, ?)",
        )
        .bind(id.0)
        .bind(author.id.0)
        .bind(&author.name)
        .bind(text)
        .bind(created_at.to_rfc3339())
        .execute(&self.pool)
        .await
        .map_err(db_err)?;

        Ok(Comment {
            id: CommentId(result.last_insert_rowid()),
            request_id: id,
            author: author.clone(),
            text: text.to_string(),
            created_at,
        })
    }

    async fn list_comments(&self, id: RequestId, limit: u32) -> Result<Vec<Comment>, StoreError> {
        let rows = sqlx::query(
            "SELECT id, request_id, author_id, author_name, body, created_at
             FROM request_comments WHERE request_id = ?
             ORDER BY id DESC LIMIT ?",
        )
        .bind(id.0)
        .bind(limit as i64)
        .fetch_all(&self.pool)
        .await
        .map_err(db_err)?;

        rows.iter().map(row_to_comment).collect()
    }

    async fn next_unexported(&self) -> Result<Option<Request>, StoreError> {
        // RFC 3339 UTC strings sort chronologically, so the string order of
        // decided_at is the decision order.
        let row = sqlx::query(&format!(
            "SELECT {REQUEST_COLUMNS} FROM requests
             WHERE status IN ('approved', 'rejected') AND exported = 0
             ORDER BY COALESCE(decided_at, created_at) ASC, id ASC
             LIMIT 1"
        ))
        .fetch_optional(&self.pool)
        .await
        .map_err(db_err)?;

        match row {
            Some(ref row) => Ok(Some(row_to_request(row)?)),
            None => Ok(None),
        }
    }

    async fn mark_exported(&self, id: RequestId) -> Result<u64, StoreError> {
        let result = sqlx::query("UPDATE requests SET exported = 1 WHERE id = ?")
            .bind(id.0)
            .execute(&self.pool)
            .await
            .map_err(db_err)?;

        Ok(result.rows_affected())
    }

    async fn month_totals(&self, period: &PeriodKey) -> Result<MonthTotals, StoreError> {
        let rows = sqlx::query(
            "SELECT status, amount FROM requests
             WHERE decided_at IS NOT NULL
               AND substr(decided_at, 1, 7) = ?
               AND status IN ('approved', 'rejected')",
        )
        .bind(period.ym_prefix())
        .fetch_all(&self.pool)
        .await
        .map_err(db_err)?;

        // Sums are computed here rather than in SQL so amounts stay exact
        // decimals instead of SQLite floats.
        let mut totals = MonthTotals::default();
        for row in &rows {
            let status: String = row.try_get("status").map_err(|e| decode_err(e.to_string()))?;
            let amount_str: String =
                row.try_get("amount").map_err(|e| decode_err(e.to_string()))?;
            let amount = parse_amount(&amount_str)?;

            match parse_status(&status)? {
                RequestStatus::Approved => {
                    totals.approved_count += 1;
                    totals.approved_sum += amount;
                }
                RequestStatus::Rejected => {
                    totals.rejected_count += 1;
                    totals.rejected_sum += amount;
                }
                _ => {}
            }
        }

        Ok(totals)
    }
}
