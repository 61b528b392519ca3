//! Run configuration from flags, environment and `.env`

use std::path::PathBuf;
use std::time::Duration;

use clap::builder::BoolishValueParser;
use clap::{ArgAction, Parser};

use crate::browser::ChromeConfig;
use crate::error::ConfigError;
use crate::orchestrator::RunConfig;
use crate::retry::RetryConfig;
use crate::session::{LoginSettings, DEFAULT_BASE_URL};
use crate::sheets::auth::ServiceAccountSource;
use crate::sheets::{ReplaceMode, SheetTarget};
use crate::types::Credentials;
use crate::workflow::ExportSettings;

#[derive(Parser, Debug, Clone)]
#[command(name = "stock-sync")]
#[command(version)]
#[command(about = "Export the OnePilot vehicle stock and publish it to a Google Sheet")]
#[command(long_about = "Export the OnePilot vehicle stock and publish it to a Google Sheet.

Logs into OnePilot with a fresh browser, downloads the vehicle stock
workbook, saves it as downloads/stock-vehicles-<YYYYMMDD-HHMMSS>.xlsx and
replaces the content of the target sheet with it.

Every option can also be set through the environment or a .env file.
On success the path of the saved workbook is printed on stdout.")]
pub struct Cli {
    /// OnePilot login e-mail
    #[arg(long, env = "ONEPILOT_EMAIL")]
    pub email: Option<String>,

    /// OnePilot password
    #[arg(long, env = "ONEPILOT_PASSWORD", hide_env_values = true)]
    pub password: Option<String>,

    /// Run the browser without a window
    #[arg(long, env = "HEADLESS", action = ArgAction::SetTrue, value_parser = BoolishValueParser::new())]
    pub headless: bool,

    /// Target spreadsheet id
    #[arg(long, env = "GOOGLE_SHEETS_ID")]
    pub spreadsheet_id: Option<String>,

    /// Service account key file
    #[arg(long, env = "GOOGLE_APPLICATION_CREDENTIALS")]
    pub credentials_file: Option<PathBuf>,

    /// Service account key as inline JSON
    #[arg(long, env = "GOOGLE_CREDENTIALS_JSON", hide = true, hide_env_values = true)]
    pub credentials_json: Option<String>,

    /// Destination tab
    #[arg(long, env = "SHEET_NAME", default_value = "Hoja1")]
    pub sheet_name: String,

    /// OnePilot web app URL
    #[arg(long, env = "ONEPILOT_BASE_URL", default_value = DEFAULT_BASE_URL)]
    pub base_url: String,

    /// Where exported workbooks are kept
    #[arg(long, env = "DOWNLOAD_DIR", default_value = "downloads")]
    pub download_dir: PathBuf,

    /// Chrome/Chromium executable (searched on PATH when unset)
    #[arg(long, env = "CHROME_PATH")]
    pub chrome_path: Option<PathBuf>,

    /// How the sheet content is replaced
    #[arg(long, env = "SHEETS_REPLACE_MODE", value_enum, default_value_t = ReplaceMode::Atomic)]
    pub replace_mode: ReplaceMode,

    /// Retries for each retryable step (0 disables retrying)
    #[arg(long, env = "SYNC_MAX_RETRIES", default_value_t = 2)]
    pub max_retries: u32,

    /// Seconds one Google Sheets request may take
    #[arg(long, env = "SHEETS_TIMEOUT_SECS", default_value_t = 60)]
    pub sheets_timeout: u64,
}

/// Validated configuration of one run.
#[derive(Debug, Clone)]
pub struct Settings {
    pub credentials: Credentials,
    pub target: SheetTarget,
    pub headless: bool,
    pub credentials_file: Option<PathBuf>,
    pub credentials_json: Option<String>,
    pub base_url: String,
    pub download_dir: PathBuf,
    pub chrome_path: Option<PathBuf>,
    pub replace_mode: ReplaceMode,
    pub retry: RetryConfig,
    pub sheets_timeout: Duration,
}

impl Settings {
    /// Checks what can be checked without I/O. A missing spreadsheet id is
    /// reported first; blank login credentials are left to the run, which
    /// refuses to start without them.
    pub fn from_cli(cli: Cli) -> Result<Self, ConfigError> {
        let spreadsheet_id = cli
            .spreadsheet_id
            .map(|id| id.trim().to_string())
            .filter(|id| !id.is_empty())
            .ok_or(ConfigError::Missing {
                name: "GOOGLE_SHEETS_ID",
            })?;

        let sheet_name = cli.sheet_name.trim().to_string();
        if sheet_name.is_empty() {
            return Err(ConfigError::Invalid {
                name: "SHEET_NAME",
                detail: "must not be empty".into(),
            });
        }

        if cli.sheets_timeout == 0 {
            return Err(ConfigError::Invalid {
                name: "SHEETS_TIMEOUT_SECS",
                detail: "must be at least 1".into(),
            });
        }

        let base_url = cli.base_url.trim().trim_end_matches('/').to_string();
        if !(base_url.starts_with("https://") || base_url.starts_with("http://")) {
            return Err(ConfigError::Invalid {
                name: "ONEPILOT_BASE_URL",
                detail: format!("'{base_url}' is not an http(s) URL"),
            });
        }

        Ok(Self {
            credentials: Credentials::new(
                cli.email.unwrap_or_default(),
                cli.password.unwrap_or_default(),
            ),
            target: SheetTarget::new(spreadsheet_id, sheet_name),
            headless: cli.headless,
            credentials_file: cli.credentials_file,
            credentials_json: cli.credentials_json,
            base_url,
            download_dir: cli.download_dir,
            chrome_path: cli.chrome_path.filter(|p| !p.as_os_str().is_empty()),
            replace_mode: cli.replace_mode,
            retry: RetryConfig {
                max_retries: cli.max_retries,
                ..RetryConfig::default()
            },
            sheets_timeout: Duration::from_secs(cli.sheets_timeout),
        })
    }

    pub fn service_account(&self) -> Result<ServiceAccountSource, ConfigError> {
        ServiceAccountSource::from_settings(
            self.credentials_file.clone(),
            self.credentials_json.clone(),
        )
    }

    pub fn chrome(&self) -> ChromeConfig {
        ChromeConfig {
            executable: self.chrome_path.clone(),
            headless: self.headless,
            ..ChromeConfig::default()
        }
    }

    pub fn run_config(&self) -> RunConfig {
        RunConfig {
            credentials: self.credentials.clone(),
            target: self.target.clone(),
            download_dir: self.download_dir.clone(),
            replace_mode: self.replace_mode,
            retry: self.retry.clone(),
            login: LoginSettings::for_base_url(&self.base_url),
            export: ExportSettings::for_base_url(&self.base_url),
        }
    }
}
