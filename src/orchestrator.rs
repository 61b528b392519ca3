//! One sync run: login, export, persist, parse, publish.

use std::path::{Path, PathBuf};
use std::sync::Arc;

use chrono::{DateTime, Local};

use crate::browser::{BrowserLauncher, DownloadArtifact, Page};
use crate::error::{ConfigError, SyncResult};
use crate::excel;
use crate::retry::{with_retry, RetryConfig};
use crate::session::{BrowserSession, LoginSettings};
use crate::sheets::{ReplaceMode, SheetTarget, SpreadsheetApi, SpreadsheetSink};
use crate::types::{Credentials, ExportOutcome};
use crate::workflow::{ExportSettings, ExportWorkflow};

pub const ARTIFACT_PREFIX: &str = "stock-vehicles";
const DEFAULT_EXTENSION: &str = "xlsx";

#[derive(Debug, Clone)]
pub struct RunConfig {
    pub credentials: Credentials,
    pub target: SheetTarget,
    pub download_dir: PathBuf,
    pub replace_mode: ReplaceMode,
    pub retry: RetryConfig,
    pub login: LoginSettings,
    pub export: ExportSettings,
}

pub struct Orchestrator {
    config: RunConfig,
    launcher: Arc<dyn BrowserLauncher>,
    sink: SpreadsheetSink,
    session: BrowserSession,
    workflow: ExportWorkflow,
}

impl Orchestrator {
    pub fn new(
        config: RunConfig,
        launcher: Arc<dyn BrowserLauncher>,
        sheets: Arc<dyn SpreadsheetApi>,
    ) -> Self {
        let sink = SpreadsheetSink::new(sheets, config.replace_mode);
        let session = BrowserSession::new(config.login.clone());
        let workflow = ExportWorkflow::new(config.export.clone());
        Self {
            config,
            launcher,
            sink,
            session,
            workflow,
        }
    }

    /// Run the whole pipeline once.
    ///
    /// Configuration and credentials are checked before anything is
    /// launched. The browser is always closed, whichever stage fails.
    pub async fn run(&self) -> SyncResult<ExportOutcome> {
        if !self.config.target.has_spreadsheet() {
            return Err(ConfigError::Missing {
                name: "GOOGLE_SHEETS_ID",
            }
            .into());
        }
        self.config.credentials.ensure_present()?;
        tokio::fs::create_dir_all(&self.config.download_dir).await?;

        tracing::info!(
            spreadsheet = %self.config.target.spreadsheet_id,
            sheet = %self.config.target.sheet_name,
            "sync started"
        );

        let live = self.launcher.launch().await?;
        let fetched = self.fetch_export(live.page()).await;
        if let Err(e) = live.close().await {
            tracing::warn!(error = %e, "closing the browser failed");
        }
        let output_path = fetched?;

        let bytes = tokio::fs::read(&output_path).await?;
        let grid = excel::parse(&bytes)?;
        tracing::info!(rows = grid.row_count(), columns = grid.width(), "workbook parsed");

        let ack = self.sink.replace(&self.config.target, &grid).await?;

        tracing::info!(path = %output_path.display(), rows = ack.rows_written, "sync finished");
        Ok(ExportOutcome {
            output_path,
            rows_written: ack.rows_written,
        })
    }

    /// Login and export on the live page, then persist the download.
    async fn fetch_export(&self, page: &dyn Page) -> SyncResult<PathBuf> {
        let retry = &self.config.retry;
        let session = &self.session;
        let workflow = &self.workflow;
        let credentials = &self.config.credentials;

        with_retry(retry, "login", |_| async move {
            session.login(page, credentials).await
        })
        .await?;

        let artifact = with_retry(retry, "export", |attempt| async move {
            if attempt > 0 {
                workflow.reset(page).await?;
            }
            workflow.trigger_export(page).await
        })
        .await?;

        let dest = artifact_path(&self.config.download_dir, &artifact, Local::now());
        artifact.save_as(&dest).await?;
        tracing::info!(path = %dest.display(), "export saved");
        Ok(dest)
    }
}

/// `<dir>/stock-vehicles-<YYYYMMDD-HHMMSS>.<ext>`, with a `-N` suffix if a
/// file of that name already exists.
pub fn artifact_path(dir: &Path, artifact: &DownloadArtifact, now: DateTime<Local>) -> PathBuf {
    let ext = artifact
        .extension()
        .unwrap_or_else(|| DEFAULT_EXTENSION.to_string());
    let stem = format!("{ARTIFACT_PREFIX}-{}", now.format("%Y%m%d-%H%M%S"));

    let mut candidate = dir.join(format!("{stem}.{ext}"));
    let mut n = 1;
    while candidate.exists() {
        candidate = dir.join(format!("{stem}-{n}.{ext}"));
        n += 1;
    }
    candidate
}
