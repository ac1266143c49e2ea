//! HTTP client for a Sheets-v4-style values API.

use std::time::Duration;

use async_trait::async_trait;
use reqwest::{StatusCode, Url};
use serde::Deserialize;
use sigla_core::RangeAddress;
use tracing::{debug, info};

use crate::{SheetInfo, SheetReader, SpreadsheetInfo, SyncError};

pub const DEFAULT_BASE_URL: &str = "https://sheets.googleapis.com";

/// Sheet service client.
///
/// Authentication is a ready-made bearer token; obtaining one is the
/// caller's business.
pub struct SheetsClient {
    client: reqwest::Client,
    base_url: String,
    token: Option<String>,
}

#[derive(Deserialize)]
struct SpreadsheetResponse {
    properties: SpreadsheetProperties,
    #[serde(default)]
    sheets: Vec<SheetEntry>,
}

#[derive(Deserialize)]
struct SpreadsheetProperties {
    title: String,
}

#[derive(Deserialize)]
struct SheetEntry {
    properties: SheetProperties,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct SheetProperties {
    sheet_id: i64,
    title: String,
}

#[derive(Deserialize)]
struct ValueRange {
    #[serde(default)]
    values: Vec<Vec<serde_json::Value>>,
}

fn cell_text(value: serde_json::Value) -> String {
    match value {
        serde_json::Value::String(s) => s,
        serde_json::Value::Null => String::new(),
        other => other.to_string(),
    }
}

impl SheetsClient {
    /// `base_url` should be like `https://sheets.googleapis.com` (no trailing slash).
    pub fn new(base_url: String) -> Self {
        Self {
            client: reqwest::Client::new(),
            base_url: base_url.trim_end_matches('/').to_string(),
            token: None,
        }
    }

    pub fn with_token(mut self, token: impl Into<String>) -> Self {
        self.token = Some(token.into());
        self
    }

    fn url(&self, segments: &[&str]) -> Result<Url, SyncError> {
        let mut url = Url::parse(&format!("{}/v4/spreadsheets", self.base_url)).map_err(|e| {
            SyncError::UnableToAccessSpreadsheet {
                spreadsheet_id: segments.first().copied().unwrap_or_default().to_string(),
                reason: format!("bad base url {}: {e}", self.base_url),
            }
        })?;
        if let Ok(mut path) = url.path_segments_mut() {
            path.extend(segments);
        }
        Ok(url)
    }

    async fn get<T: for<'de> Deserialize<'de>>(
        &self,
        spreadsheet_id: &str,
        url: Url,
    ) -> Result<T, SyncError> {
        debug!(url = %url, "requesting sheet service");
        let mut request = self.client.get(url);
        if let Some(token) = &self.token {
            request = request.bearer_auth(token);
        }
        let resp = request.send().await?;
        let status = resp.status();
        if status == StatusCode::TOO_MANY_REQUESTS {
            let retry_after = resp
                .headers()
                .get(reqwest::header::RETRY_AFTER)
                .and_then(|v| v.to_str().ok())
                .and_then(|v| v.trim().parse::<u64>().ok())
                .map(Duration::from_secs);
            return Err(SyncError::QuotaExceeded { retry_after });
        }
        if status == StatusCode::FORBIDDEN || status == StatusCode::NOT_FOUND {
            let body = resp.text().await.unwrap_or_default();
            return Err(SyncError::UnableToAccessSpreadsheet {
                spreadsheet_id: spreadsheet_id.to_string(),
                reason: format!("{status}: {body}"),
            });
        }
        if !status.is_success() {
            let body = resp.text().await.unwrap_or_default();
            return Err(SyncError::Server {
                status: status.as_u16(),
                body,
            });
        }
        Ok(resp.json().await?)
    }
}

#[async_trait]
impl SheetReader for SheetsClient {
    async fn spreadsheet(&self, spreadsheet_id: &str) -> Result<SpreadsheetInfo, SyncError> {
        let mut url = self.url(&[spreadsheet_id])?;
        url.query_pairs_mut()
            .append_pair("fields", "properties.title,sheets.properties");
        let resp: SpreadsheetResponse = self.get(spreadsheet_id, url).await?;
        let info = SpreadsheetInfo {
            spreadsheet_id: spreadsheet_id.to_string(),
            title: resp.properties.title,
            sheets: resp
                .sheets
                .into_iter()
                .map(|s| SheetInfo {
                    sheet_id: s.properties.sheet_id.to_string(),
                    title: s.properties.title,
                })
                .collect(),
        };
        info!(
            spreadsheet = %info.title,
            sheets = info.sheets.len(),
            "fetched spreadsheet"
        );
        Ok(info)
    }

    async fn read(
        &self,
        spreadsheet_id: &str,
        range: &RangeAddress,
    ) -> Result<Vec<Vec<String>>, SyncError> {
        let notation = range.to_string();
        let mut url = self.url(&[spreadsheet_id, "values", &notation])?;
        url.query_pairs_mut().append_pair("majorDimension", "ROWS");
        let resp: ValueRange = self.get(spreadsheet_id, url).await?;
        Ok(resp
            .values
            .into_iter()
            .map(|row| row.into_iter().map(cell_text).collect())
            .collect())
    }
}
