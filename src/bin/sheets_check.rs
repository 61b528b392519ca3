//! Sheets access check
//!
//! Verifies that the configured service account can read and write the
//! target spreadsheet: prints the first tab's title and writes a marker
//! into its A1 cell.

use anyhow::{bail, Context};
use clap::Parser;
use serde_json::json;
use stock_sync::sheets::auth::ServiceAccountSource;
use stock_sync::sheets::{range, SheetsClient, SpreadsheetApi};

#[derive(Parser, Debug)]
#[command(name = "sheets-check")]
#[command(version)]
#[command(about = "Check that the service account can write to the target spreadsheet")]
struct Args {
    /// Spreadsheet to check
    #[arg(long, env = "GOOGLE_SHEETS_ID")]
    spreadsheet_id: String,

    /// Service account key file
    #[arg(long, env = "GOOGLE_APPLICATION_CREDENTIALS")]
    credentials_file: Option<std::path::PathBuf>,

    /// Service account key as inline JSON
    #[arg(long, env = "GOOGLE_CREDENTIALS_JSON", hide = true, hide_env_values = true)]
    credentials_json: Option<String>,

    /// Text written to A1 of the first tab
    #[arg(long, default_value = "OK from Service Account")]
    marker: String,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let _ = dotenvy::dotenv();
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "stock_sync=info,sheets_check=info".into()),
        )
        .with_writer(std::io::stderr)
        .init();

    let args = Args::parse();

    let source = ServiceAccountSource::from_settings(args.credentials_file, args.credentials_json)?;
    let client = SheetsClient::connect(&source).context("building the Sheets client")?;

    let titles = client
        .sheet_titles(&args.spreadsheet_id)
        .await
        .context("reading spreadsheet metadata")?;
    let Some(first) = titles.first() else {
        bail!("spreadsheet {} has no tabs", args.spreadsheet_id);
    };
    println!("Sheet: {first}");

    client
        .update_values(
            &args.spreadsheet_id,
            &range::a1(first, "A1"),
            vec![vec![json!(args.marker)]],
        )
        .await
        .context("writing the marker cell")?;
    println!("Write OK");

    Ok(())
}
