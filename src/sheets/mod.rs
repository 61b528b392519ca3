//! Google Sheets destination
//!
//! [`SpreadsheetSink`] replaces the whole content of one tab with a new
//! grid. The remote calls go through [`SpreadsheetApi`], implemented over
//! the Sheets REST API by [`SheetsClient`].

pub mod auth;
mod client;
pub mod range;

use std::sync::Arc;

use async_trait::async_trait;
use serde_json::Value;

use crate::error::{SinkError, SinkResult};
use crate::types::TabularGrid;

pub use client::{
    GridProperties, SheetProperties, SheetsClient, DEFAULT_REQUEST_TIMEOUT, DEFAULT_SHEETS_URL,
};

/// Columns cleared by a clear-then-write replace.
pub const CLEAR_COLUMNS: &str = "A:ZZ";

/// Destination tab.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SheetTarget {
    pub spreadsheet_id: String,
    pub sheet_name: String,
}

impl SheetTarget {
    pub fn new(spreadsheet_id: impl Into<String>, sheet_name: impl Into<String>) -> Self {
        Self {
            spreadsheet_id: spreadsheet_id.into(),
            sheet_name: sheet_name.into(),
        }
    }

    pub fn has_spreadsheet(&self) -> bool {
        !self.spreadsheet_id.trim().is_empty()
    }

    /// Wide bound that covers any previous export.
    pub fn clear_range(&self) -> String {
        range::a1(&self.sheet_name, CLEAR_COLUMNS)
    }

    pub fn write_anchor(&self) -> String {
        range::a1(&self.sheet_name, "A1")
    }
}

/// Remote operations the sink needs.
#[async_trait]
pub trait SpreadsheetApi: Send + Sync {
    async fn clear_values(&self, spreadsheet_id: &str, range: &str) -> SinkResult<()>;

    /// RAW write of `rows` starting at the top-left of `range`.
    async fn update_values(
        &self,
        spreadsheet_id: &str,
        range: &str,
        rows: Vec<Vec<Value>>,
    ) -> SinkResult<()>;

    /// Replace every cell of the tab in one request: cells outside the grid
    /// end up empty, and the tab grows when the grid does not fit.
    async fn replace_sheet(
        &self,
        spreadsheet_id: &str,
        sheet_name: &str,
        grid: &TabularGrid,
    ) -> SinkResult<()>;

    /// Tab titles in display order.
    async fn sheet_titles(&self, spreadsheet_id: &str) -> SinkResult<Vec<String>>;
}

/// How a non-empty grid replaces the current tab content.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, clap::ValueEnum)]
pub enum ReplaceMode {
    /// One `batchUpdate`; readers never see a half-written tab
    #[default]
    Atomic,
    /// `values.clear` followed by `values.update`
    ClearThenWrite,
}

/// Acknowledgement of a successful replace.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Ack {
    pub rows_written: usize,
    /// A1 range now holding data, `None` when the tab was only cleared
    pub written_range: Option<String>,
}

pub struct SpreadsheetSink {
    api: Arc<dyn SpreadsheetApi>,
    mode: ReplaceMode,
}

impl SpreadsheetSink {
    pub fn new(api: Arc<dyn SpreadsheetApi>, mode: ReplaceMode) -> Self {
        Self { api, mode }
    }

    pub fn mode(&self) -> ReplaceMode {
        self.mode
    }

    /// Make the tab hold exactly `grid`, anchored at A1.
    ///
    /// Values are written literally; strings that look like formulas stay
    /// strings. A blank grid leaves the tab empty without issuing a write.
    pub async fn replace(&self, target: &SheetTarget, grid: &TabularGrid) -> SinkResult<Ack> {
        if !target.has_spreadsheet() {
            return Err(SinkError::MissingTarget);
        }
        let id = target.spreadsheet_id.as_str();

        if grid.is_blank() {
            let range = target.clear_range();
            self.api.clear_values(id, &range).await?;
            tracing::info!(%range, "grid is empty, sheet cleared");
            return Ok(Ack {
                rows_written: 0,
                written_range: None,
            });
        }

        match self.mode {
            ReplaceMode::Atomic => {
                self.api.replace_sheet(id, &target.sheet_name, grid).await?;
            }
            ReplaceMode::ClearThenWrite => {
                self.api.clear_values(id, &target.clear_range()).await?;
                self.api
                    .update_values(id, &target.write_anchor(), grid.to_json_rows())
                    .await?;
            }
        }

        let written_range = range::a1(
            &target.sheet_name,
            &format!("A1:{}{}", range::column_letter(grid.width() - 1), grid.row_count()),
        );
        tracing::info!(
            rows = grid.row_count(),
            range = %written_range,
            mode = ?self.mode,
            "sheet replaced"
        );
        Ok(Ack {
            rows_written: grid.row_count(),
            written_range: Some(written_range),
        })
    }
}
