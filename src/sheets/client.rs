use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use reqwest::{Method, RequestBuilder, StatusCode};
use serde::Deserialize;
use serde_json::{json, Value};

use super::auth::{AccessTokenSource, ServiceAccountSource, ServiceAccountTokens};
use super::SpreadsheetApi;
use crate::error::{ConfigError, SinkError, SinkResult};
use crate::retry::{with_retry, RetryConfig};
use crate::types::{CellValue, TabularGrid};

pub const DEFAULT_SHEETS_URL: &str = "https://sheets.googleapis.com";

/// Bound on one HTTP exchange, connect to last body byte.
pub const DEFAULT_REQUEST_TIMEOUT: Duration = Duration::from_secs(60);

const SHEET_FIELDS: &str = "sheets.properties(sheetId,title,gridProperties(rowCount,columnCount))";

/// Google Sheets v4 REST client. Each request is bounded by a timeout and
/// retried on transport errors (timeouts included), 429 and 5xx.
pub struct SheetsClient {
    http: reqwest::Client,
    base_url: String,
    tokens: Arc<dyn AccessTokenSource>,
    retry: RetryConfig,
    timeout: Duration,
}

#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SheetProperties {
    pub sheet_id: i64,
    pub title: String,
    #[serde(default)]
    pub grid_properties: GridProperties,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GridProperties {
    #[serde(default)]
    pub row_count: usize,
    #[serde(default)]
    pub column_count: usize,
}

#[derive(Deserialize)]
struct SpreadsheetMetadata {
    #[serde(default)]
    sheets: Vec<SheetEntry>,
}

#[derive(Deserialize)]
struct SheetEntry {
    properties: SheetProperties,
}

#[derive(Deserialize)]
struct GoogleErrorBody {
    error: GoogleError,
}

#[derive(Deserialize)]
struct GoogleError {
    message: String,
    #[serde(default)]
    status: String,
}

impl SheetsClient {
    pub fn new(tokens: Arc<dyn AccessTokenSource>) -> Self {
        Self {
            http: reqwest::Client::new(),
            base_url: DEFAULT_SHEETS_URL.to_string(),
            tokens,
            retry: RetryConfig::default(),
            timeout: DEFAULT_REQUEST_TIMEOUT,
        }
    }

    /// Resolve the service account (materializing inline JSON) and build a
    /// ready client.
    pub fn connect(source: &ServiceAccountSource) -> Result<Self, ConfigError> {
        let key_file = source.resolve()?;
        let tokens = ServiceAccountTokens::from_file(&key_file)?;
        Ok(Self::new(Arc::new(tokens)))
    }

    pub fn with_base_url(mut self, base_url: impl Into<String>) -> Self {
        self.base_url = base_url.into().trim_end_matches('/').to_string();
        self
    }

    pub fn with_retry(mut self, retry: RetryConfig) -> Self {
        self.retry = retry;
        self
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    fn spreadsheet_url(&self, spreadsheet_id: &str) -> String {
        format!(
            "{}/v4/spreadsheets/{}",
            self.base_url,
            urlencoding::encode(spreadsheet_id)
        )
    }

    fn values_url(&self, spreadsheet_id: &str, range: &str) -> String {
        format!(
            "{}/values/{}",
            self.spreadsheet_url(spreadsheet_id),
            urlencoding::encode(range)
        )
    }

    /// Send with bearer auth and decode the JSON reply, retrying transient
    /// failures.
    async fn execute<F>(&self, operation: &'static str, request: F) -> SinkResult<Value>
    where
        F: Fn(&reqwest::Client) -> RequestBuilder,
    {
        let request = &request;
        with_retry(&self.retry, operation, |_| async move {
            let token = self.tokens.access_token().await?;
            let response = request(&self.http)
                .timeout(self.timeout)
                .bearer_auth(token)
                .send()
                .await
                .map_err(|source| SinkError::Transport { operation, source })?;

            let status = response.status();
            let body = response
                .text()
                .await
                .map_err(|source| SinkError::Transport { operation, source })?;

            if !status.is_success() {
                return Err(rejected(operation, status, &body));
            }
            if body.trim().is_empty() {
                return Ok(Value::Null);
            }
            serde_json::from_str(&body).map_err(|e| SinkError::RemoteRejected {
                operation,
                status: Some(status.as_u16()),
                detail: format!("unreadable response: {e}"),
            })
        })
        .await
    }

    /// Properties of every tab in the spreadsheet.
    pub async fn sheet_properties(&self, spreadsheet_id: &str) -> SinkResult<Vec<SheetProperties>> {
        let url = self.spreadsheet_url(spreadsheet_id);
        let reply = self
            .execute("spreadsheets.get", |http| {
                http.request(Method::GET, &url).query(&[("fields", SHEET_FIELDS)])
            })
            .await?;

        let metadata: SpreadsheetMetadata =
            serde_json::from_value(reply).map_err(|e| SinkError::RemoteRejected {
                operation: "spreadsheets.get",
                status: None,
                detail: format!("unexpected metadata shape: {e}"),
            })?;
        Ok(metadata.sheets.into_iter().map(|s| s.properties).collect())
    }
}

#[async_trait]
impl SpreadsheetApi for SheetsClient {
    async fn clear_values(&self, spreadsheet_id: &str, range: &str) -> SinkResult<()> {
        let url = format!("{}:clear", self.values_url(spreadsheet_id, range));
        self.execute("values.clear", |http| http.post(&url).json(&json!({})))
            .await?;
        tracing::debug!(range, "values cleared");
        Ok(())
    }

    async fn update_values(
        &self,
        spreadsheet_id: &str,
        range: &str,
        rows: Vec<Vec<Value>>,
    ) -> SinkResult<()> {
        let url = self.values_url(spreadsheet_id, range);
        let body = json!({ "range": range, "majorDimension": "ROWS", "values": rows });
        let reply = self
            .execute("values.update", |http| {
                http.put(&url)
                    .query(&[("valueInputOption", "RAW")])
                    .json(&body)
            })
            .await?;
        tracing::debug!(
            range,
            updated_cells = reply.get("updatedCells").and_then(serde_json::Value::as_u64),
            "values written"
        );
        Ok(())
    }

    async fn replace_sheet(
        &self,
        spreadsheet_id: &str,
        sheet_name: &str,
        grid: &TabularGrid,
    ) -> SinkResult<()> {
        let sheet = self
            .sheet_properties(spreadsheet_id)
            .await?
            .into_iter()
            .find(|p| p.title == sheet_name)
            .ok_or_else(|| SinkError::SheetNotFound(sheet_name.to_string()))?;

        let body = json!({ "requests": replace_requests(&sheet, grid) });
        let url = format!("{}:batchUpdate", self.spreadsheet_url(spreadsheet_id));
        self.execute("spreadsheets.batchUpdate", |http| http.post(&url).json(&body))
            .await?;
        tracing::debug!(sheet = sheet_name, sheet_id = sheet.sheet_id, "sheet replaced atomically");
        Ok(())
    }

    async fn sheet_titles(&self, spreadsheet_id: &str) -> SinkResult<Vec<String>> {
        Ok(self
            .sheet_properties(spreadsheet_id)
            .await?
            .into_iter()
            .map(|p| p.title)
            .collect())
    }
}

fn rejected(operation: &'static str, status: StatusCode, body: &str) -> SinkError {
    let detail = match serde_json::from_str::<GoogleErrorBody>(body) {
        Ok(parsed) if !parsed.error.status.is_empty() => {
            format!("{} [{}]", parsed.error.message, parsed.error.status)
        }
        Ok(parsed) => parsed.error.message,
        Err(_) if !body.trim().is_empty() => body.trim().to_string(),
        Err(_) => status
            .canonical_reason()
            .unwrap_or("unknown error")
            .to_string(),
    };
    SinkError::RemoteRejected {
        operation,
        status: Some(status.as_u16()),
        detail,
    }
}

/// Grow the tab if needed, then overwrite the whole tab. `updateCells` over
/// the full sheet range clears every cell the new rows do not cover.
fn replace_requests(sheet: &SheetProperties, grid: &TabularGrid) -> Vec<Value> {
    let mut requests = Vec::new();
    let grid_size = &sheet.grid_properties;

    if grid.row_count() > grid_size.row_count {
        requests.push(json!({ "appendDimension": {
            "sheetId": sheet.sheet_id,
            "dimension": "ROWS",
            "length": grid.row_count() - grid_size.row_count,
        }}));
    }
    if grid.width() > grid_size.column_count {
        requests.push(json!({ "appendDimension": {
            "sheetId": sheet.sheet_id,
            "dimension": "COLUMNS",
            "length": grid.width() - grid_size.column_count,
        }}));
    }

    let rows: Vec<Value> = grid
        .rows
        .iter()
        .map(|row| json!({ "values": row.iter().map(cell_data).collect::<Vec<_>>() }))
        .collect();
    requests.push(json!({ "updateCells": {
        "range": { "sheetId": sheet.sheet_id },
        "rows": rows,
        "fields": "userEnteredValue",
    }}));

    requests
}

fn cell_data(cell: &CellValue) -> Value {
    match cell {
        CellValue::Blank => json!({}),
        CellValue::Text(s) => json!({ "userEnteredValue": { "stringValue": s } }),
        CellValue::Number(n) if n.is_finite() => json!({ "userEnteredValue": { "numberValue": n } }),
        CellValue::Number(n) => json!({ "userEnteredValue": { "stringValue": n.to_string() } }),
        CellValue::Bool(b) => json!({ "userEnteredValue": { "boolValue": b } }),
    }
}
