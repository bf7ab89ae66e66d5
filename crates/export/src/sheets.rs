use std::time::Duration;

use async_trait::async_trait;
use secrecy::{ExposeSecret, SecretString};
use serde::Deserialize;
use serde_json::json;
use tracing::debug;

use paydesk_core::config::SheetsConfig;
use paydesk_core::domain::period::{MonthTotals, PeriodKey};
use paydesk_core::errors::SinkError;

use crate::sink::{
    is_totals_row, totals_cells, LedgerRow, LedgerSink, SectionHandle, HEADER_CELLS,
};

const DEFAULT_BASE_URL: &str = "https://sheets.googleapis.com/v4";

/// Ledger sink backed by the Google Sheets v4 API. One spreadsheet, one
/// sheet per month; authentication is a pre-issued bearer token from
/// configuration.
pub struct GoogleSheetsLedger {
    http: reqwest::Client,
    base_url: String,
    spreadsheet_id: String,
    access_token: SecretString,
    timeout: Duration,
}

#[derive(Debug, Deserialize)]
struct SpreadsheetMeta {
    #[serde(default)]
    sheets: Vec<SheetEntry>,
}

#[derive(Debug, Deserialize)]
struct SheetEntry {
    properties: SheetProperties,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct SheetProperties {
    sheet_id: i64,
    title: String,
}

#[derive(Debug, Deserialize)]
struct BatchUpdateReply {
    #[serde(default)]
    replies: Vec<serde_json::Value>,
}

#[derive(Debug, Deserialize)]
struct ValueRange {
    #[serde(default)]
    values: Vec<Vec<String>>,
}

impl GoogleSheetsLedger {
    pub fn new(config: &SheetsConfig) -> Result<Self, SinkError> {
        let timeout = Duration::from_secs(config.timeout_secs.max(1));
        let http = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|error| SinkError::Unavailable(error.to_string()))?;

        Ok(Self {
            http,
            base_url: DEFAULT_BASE_URL.to_string(),
            spreadsheet_id: config.spreadsheet_id.clone(),
            access_token: config.access_token.clone(),
            timeout,
        })
    }

    pub fn with_base_url(mut self, base_url: impl Into<String>) -> Self {
        self.base_url = base_url.into();
        self
    }

    fn call_error(&self, error: reqwest::Error) -> SinkError {
        if error.is_timeout() {
            SinkError::Timeout(self.timeout)
        } else {
            SinkError::Unavailable(error.to_string())
        }
    }

    async fn check_status(&self, response: reqwest::Response) -> Result<reqwest::Response, SinkError> {
        if response.status().is_success() {
            return Ok(response);
        }
        let status = response.status();
        let body = response.text().await.unwrap_or_default();
        Err(SinkError::Rejected(format!("sheets api returned {status}: {body}")))
    }

    async fn get_json<T: serde::de::DeserializeOwned>(&self, url: &str) -> Result<T, SinkError> {
        let response = self
            .http
            .get(url)
            .bearer_auth(self.access_token.expose_secret())
            .send()
            .await
            .map_err(|error| self.call_error(error))?;

        self.check_status(response)
            .await?
            .json::<T>()
            .await
            .map_err(|error| SinkError::Rejected(format!("unexpected sheets reply: {error}")))
    }

    async fn post_json<T: serde::de::DeserializeOwned>(
        &self,
        url: &str,
        body: &serde_json::Value,
    ) -> Result<T, SinkError> {
        let response = self
            .http
            .post(url)
            .bearer_auth(self.access_token.expose_secret())
            .json(body)
            .send()
            .await
            .map_err(|error| self.call_error(error))?;

        self.check_status(response)
            .await?
            .json::<T>()
            .await
            .map_err(|error| SinkError::Rejected(format!("unexpected sheets reply: {error}")))
    }

    async fn append_cells(&self, title: &str, rows: &[Vec<String>]) -> Result<(), SinkError> {
        let url = format!(
            "{}/spreadsheets/{}/values/{}:append?valueInputOption=RAW&insertDataOption=INSERT_ROWS",
            self.base_url,
            self.spreadsheet_id,
            section_range(title),
        );
        let _: serde_json::Value = self.post_json(&url, &json!({ "values": rows })).await?;
        Ok(())
    }

    async fn find_section(&self, title: &str) -> Result<Option<SectionHandle>, SinkError> {
        let url = format!(
            "{}/spreadsheets/{}?fields=sheets.properties",
            self.base_url, self.spreadsheet_id
        );
        let meta: SpreadsheetMeta = self.get_json(&url).await?;

        Ok(meta
            .sheets
            .into_iter()
            .map(|entry| entry.properties)
            .find(|properties| properties.title == title)
            .map(|properties| SectionHandle {
                section_id: properties.sheet_id,
                title: properties.title,
            }))
    }

    async fn create_section(&self, title: &str) -> Result<SectionHandle, SinkError> {
        let url = format!("{}/spreadsheets/{}:batchUpdate", self.base_url, self.spreadsheet_id);
        let body = json!({
            "requests": [
                { "addSheet": { "properties": { "title": title } } }
            ]
        });
        let reply: BatchUpdateReply = self.post_json(&url, &body).await?;

        let section_id = reply
            .replies
            .first()
            .and_then(|reply| reply.pointer("/addSheet/properties/sheetId"))
            .and_then(serde_json::Value::as_i64)
            .ok_or_else(|| {
                SinkError::Rejected("addSheet reply carried no sheet id".to_string())
            })?;

        let header: Vec<String> = HEADER_CELLS.iter().map(|cell| cell.to_string()).collect();
        self.append_cells(title, &[header]).await?;

        debug!(event_name = "export.sheets.section_created", section = title, "section created");
        Ok(SectionHandle { section_id, title: title.to_string() })
    }

    async fn delete_rows(&self, section: &SectionHandle, rows: &[usize]) -> Result<(), SinkError> {
        if rows.is_empty() {
            return Ok(());
        }

        // Bottom-up so earlier deletions do not shift later indices.
        let mut ordered: Vec<usize> = rows.to_vec();
        ordered.sort_unstable_by(|a, b| b.cmp(a));

        let requests: Vec<serde_json::Value> = ordered
            .iter()
            .map(|row| {
                json!({
                    "deleteDimension": {
                        "range": {
                            "sheetId": section.section_id,
                            "dimension": "ROWS",
                            "startIndex": row,
                            "endIndex": row + 1
                        }
                    }
                })
            })
            .collect();

        let url = format!("{}/spreadsheets/{}:batchUpdate", self.base_url, self.spreadsheet_id);
        let _: serde_json::Value = self.post_json(&url, &json!({ "requests": requests })).await?;
        Ok(())
    }
}

#[async_trait]
impl LedgerSink for GoogleSheetsLedger {
    async fn ensure_section(&self, period: &PeriodKey) -> Result<SectionHandle, SinkError> {
        let title = period.to_string();
        match self.find_section(&title).await? {
            Some(section) => Ok(section),
            None => self.create_section(&title).await,
        }
    }

    async fn append_row(
        &self,
        section: &SectionHandle,
        row: &LedgerRow,
    ) -> Result<(), SinkError> {
        self.append_cells(&section.title, &[row.cells()]).await
    }

    async fn rewrite_totals(
        &self,
        section: &SectionHandle,
        totals: &MonthTotals,
    ) -> Result<(), SinkError> {
        let url = format!(
            "{}/spreadsheets/{}/values/{}",
            self.base_url,
            self.spreadsheet_id,
            section_range(&section.title),
        );
        let range: ValueRange = self.get_json(&url).await?;

        let stale: Vec<usize> = range
            .values
            .iter()
            .enumerate()
            .filter(|(_, cells)| is_totals_row(cells))
            .map(|(index, _)| index)
            .collect();
        self.delete_rows(section, &stale).await?;

        self.append_cells(&section.title, &totals_cells(totals)).await
    }
}

/// A1 range covering the ledger columns; the title is quoted because month
/// titles contain a dot.
fn section_range(title: &str) -> String {
    format!("'{title}'!A1:J")
}

#[cfg(test)]
mod tests {
    use super::section_range;

    #[test]
    fn section_range_quotes_the_month_title() {
        assert_eq!(section_range("03.2025"), "'03.2025'!A1:J");
    }
}
