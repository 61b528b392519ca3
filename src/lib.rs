//! stock-sync - OnePilot vehicle stock to Google Sheets
//!
//! OnePilot has no public API for its vehicle stock, so this crate drives
//! the web app the way an operator would: log in, open the split menu next
//! to "Adicionar veículo", export the stock workbook, and then replace the
//! content of a Google Sheet tab with the exported rows.
//!
//! # Pipeline
//!
//! - [`session::BrowserSession`] logs in on a fresh browser context
//! - [`workflow::ExportWorkflow`] triggers the export and waits for the download
//! - [`excel::parse`] reads the first sheet of the workbook
//! - [`sheets::SpreadsheetSink`] replaces the tab content
//! - [`orchestrator::Orchestrator`] sequences the above and always closes the browser
//!
//! # Example
//!
//! ```no_run
//! use std::sync::Arc;
//! use stock_sync::browser::ChromeLauncher;
//! use stock_sync::config::{Cli, Settings};
//! use stock_sync::orchestrator::Orchestrator;
//! use stock_sync::sheets::SheetsClient;
//! use clap::Parser;
//!
//! # async fn run() -> Result<(), Box<dyn std::error::Error>> {
//! let settings = Settings::from_cli(Cli::parse())?;
//! let sheets = SheetsClient::connect(&settings.service_account()?)?;
//! let orchestrator = Orchestrator::new(
//!     settings.run_config(),
//!     Arc::new(ChromeLauncher::new(settings.chrome())),
//!     Arc::new(sheets),
//! );
//! let outcome = orchestrator.run().await?;
//! println!("{}", outcome.output_path.display());
//! # Ok(())
//! # }
//! ```

pub mod browser;
pub mod config;
pub mod error;
pub mod excel;
pub mod orchestrator;
pub mod retry;
pub mod session;
pub mod sheets;
pub mod types;
pub mod workflow;

// Re-export commonly used types
pub use error::{SyncError, SyncResult};
pub use types::{CellValue, Credentials, ExportOutcome, TabularGrid};
