//! Google Sheets store (v4 REST API)
//!
//! Reads with `values.get` and appends with `values.append`. Values are written with
//! `valueInputOption=RAW` so strings such as `50,000` are stored as-is and read back
//! unchanged; anything the sheet reinterpreted would change record identities.
//!
//! A range naming a tab the spreadsheet lacks reads as an empty store; the tab is added
//! with `batchUpdate` right before the first append.

use async_trait::async_trait;
use reqwest::Client;
use serde::{Deserialize, Serialize};
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;
use tracing::{debug, info};
use url::Url;

use super::{StoreError, TabularStore, Table};

/// Sheets store bound to one spreadsheet range
pub struct SheetsStore {
    client: Client,
    api_base_url: Url,
    spreadsheet_id: String,
    range: String,
    access_token: String,
    /// Set when the last read found no tab for the range
    missing_tab: AtomicBool,
}

/// Error text Sheets returns for a range whose tab does not exist
const MISSING_RANGE_MESSAGE: &str = "Unable to parse range";

#[derive(Debug, Deserialize)]
struct ValueRange {
    #[serde(default)]
    values: Vec<Vec<serde_json::Value>>,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct AppendBody<'a> {
    range: &'a str,
    major_dimension: &'static str,
    values: &'a [Vec<String>],
}

/// Title of the tab a range refers to: `'My Tab'!A1:C` names `My Tab`
fn tab_title(range: &str) -> String {
    let sheet = match range.rsplit_once('!') {
        Some((sheet, _)) => sheet,
        None => range,
    };
    match sheet.strip_prefix('\'').and_then(|s| s.strip_suffix('\'')) {
        Some(quoted) => quoted.replace("''", "'"),
        None => sheet.to_string(),
    }
}

impl SheetsStore {
    pub fn new(
        api_base_url: &str,
        spreadsheet_id: impl Into<String>,
        range: impl Into<String>,
        access_token: impl Into<String>,
        timeout: Duration,
    ) -> Result<Self, StoreError> {
        let api_base_url = Url::parse(api_base_url)
            .map_err(|e| StoreError::Rejected(format!("invalid Sheets API URL: {e}")))?;

        let client = Client::builder().timeout(timeout).build()?;

        Ok(Self {
            client,
            api_base_url,
            spreadsheet_id: spreadsheet_id.into(),
            range: range.into(),
            access_token: access_token.into(),
            missing_tab: AtomicBool::new(false),
        })
    }

    /// `{base}/v4/spreadsheets/{id}/values/{range}{suffix}`
    fn values_url(&self, suffix: &str) -> Result<Url, StoreError> {
        let range = format!("{}{}", self.range, suffix);
        let mut url = self.api_base_url.clone();
        url.path_segments_mut()
            .map_err(|_| StoreError::Rejected(format!("cannot use {} as base", self.api_base_url)))?
            .pop_if_empty()
            .extend(["v4", "spreadsheets", self.spreadsheet_id.as_str(), "values", range.as_str()]);
        Ok(url)
    }

    /// `{base}/v4/spreadsheets/{id}{suffix}`
    fn spreadsheet_url(&self, suffix: &str) -> Result<Url, StoreError> {
        let id = format!("{}{}", self.spreadsheet_id, suffix);
        let mut url = self.api_base_url.clone();
        url.path_segments_mut()
            .map_err(|_| StoreError::Rejected(format!("cannot use {} as base", self.api_base_url)))?
            .pop_if_empty()
            .extend(["v4", "spreadsheets", id.as_str()]);
        Ok(url)
    }

    /// Add the tab named by the range
    async fn add_tab(&self) -> Result<(), StoreError> {
        let title = tab_title(&self.range);
        let url = self.spreadsheet_url(":batchUpdate")?;
        let body = serde_json::json!({
            "requests": [{"addSheet": {"properties": {"title": title}}}]
        });

        let response = self
            .client
            .post(url)
            .bearer_auth(&self.access_token)
            .json(&body)
            .send()
            .await
            .map_err(send_error)?;
        Self::check(response).await?;

        info!(store = %self.describe(), tab = %title, "Created sheet tab");
        Ok(())
    }

    async fn check(response: reqwest::Response) -> Result<reqwest::Response, StoreError> {
        let status = response.status();
        if status.is_success() {
            return Ok(response);
        }
        let body = response.text().await.unwrap_or_default();
        Err(StoreError::Rejected(format!("HTTP {status}: {}", body.trim())))
    }
}

fn send_error(e: reqwest::Error) -> StoreError {
    if e.is_connect() || e.is_timeout() {
        StoreError::Unreachable(e.to_string())
    } else {
        StoreError::Http(e)
    }
}

fn cell_text(value: serde_json::Value) -> String {
    match value {
        serde_json::Value::String(s) => s,
        serde_json::Value::Null => String::new(),
        other => other.to_string(),
    }
}

#[async_trait]
impl TabularStore for SheetsStore {
    fn describe(&self) -> String {
        format!("sheets:{}/{}", self.spreadsheet_id, self.range)
    }

    async fn read_table(&self) -> Result<Table, StoreError> {
        let url = self.values_url("")?;
        debug!(%url, "Reading sheet values");

        let response = self
            .client
            .get(url)
            .bearer_auth(&self.access_token)
            .query(&[("valueRenderOption", "FORMATTED_VALUE"), ("majorDimension", "ROWS")])
            .send()
            .await
            .map_err(send_error)?;

        if response.status() == reqwest::StatusCode::BAD_REQUEST {
            let body = response.text().await.unwrap_or_default();
            if body.contains(MISSING_RANGE_MESSAGE) {
                info!(store = %self.describe(), "Sheet tab not found, treating store as empty");
                self.missing_tab.store(true, Ordering::SeqCst);
                return Ok(Table::default());
            }
            return Err(StoreError::Rejected(format!("HTTP 400 Bad Request: {}", body.trim())));
        }

        let range: ValueRange = Self::check(response).await?.json().await?;
        self.missing_tab.store(false, Ordering::SeqCst);
        let rows = range
            .values
            .into_iter()
            .map(|row| row.into_iter().map(cell_text).collect())
            .collect();

        Ok(Table::from_rows(rows))
    }

    async fn append_rows(&self, rows: Vec<Vec<String>>) -> Result<(), StoreError> {
        if rows.is_empty() {
            return Ok(());
        }
        if self.missing_tab.load(Ordering::SeqCst) {
            self.add_tab().await?;
            self.missing_tab.store(false, Ordering::SeqCst);
        }
        let url = self.values_url(":append")?;

        let response = self
            .client
            .post(url)
            .bearer_auth(&self.access_token)
            .query(&[("valueInputOption", "RAW"), ("insertDataOption", "INSERT_ROWS")])
            .json(&AppendBody {
                range: &self.range,
                major_dimension: "ROWS",
                values: &rows,
            })
            .send()
            .await
            .map_err(send_error)?;
        Self::check(response).await?;

        info!(store = %self.describe(), rows = rows.len(), "Appended rows to sheet");
        Ok(())
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::*;

    fn store(base: &str) -> SheetsStore {
        SheetsStore::new(base, "sheet-id", "Sheet1", "token", Duration::from_secs(5)).unwrap()
    }

    #[test]
    fn test_values_url() {
        let url = store("https://sheets.googleapis.com/").values_url(":append").unwrap();
        assert_eq!(
            url.as_str(),
            "https://sheets.googleapis.com/v4/spreadsheets/sheet-id/values/Sheet1:append"
        );
    }

    #[test]
    fn test_spreadsheet_url() {
        let url = store("https://sheets.googleapis.com").spreadsheet_url(":batchUpdate").unwrap();
        assert_eq!(
            url.as_str(),
            "https://sheets.googleapis.com/v4/spreadsheets/sheet-id:batchUpdate"
        );
    }

    #[test]
    fn test_tab_title() {
        assert_eq!(tab_title("Trades"), "Trades");
        assert_eq!(tab_title("Trades!A1:Z"), "Trades");
        assert_eq!(tab_title("'Apt Trades'!A:Z"), "Apt Trades");
        assert_eq!(tab_title("'Kim''s'!A1"), "Kim's");
    }

    #[test]
    fn test_cell_text() {
        assert_eq!(cell_text(serde_json::json!("50,000")), "50,000");
        assert_eq!(cell_text(serde_json::json!(7)), "7");
        assert_eq!(cell_text(serde_json::Value::Null), "");
    }

    #[test]
    fn test_invalid_base_url() {
        assert!(SheetsStore::new("not a url", "id", "r", "t", Duration::from_secs(1)).is_err());
    }
}
