use std::process::ExitCode;
use std::sync::Arc;

use clap::Parser;
use colored::Colorize;
use stock_sync::browser::ChromeLauncher;
use stock_sync::config::{Cli, Settings};
use stock_sync::orchestrator::Orchestrator;
use stock_sync::sheets::SheetsClient;
use stock_sync::{ExportOutcome, SyncResult};

#[tokio::main]
async fn main() -> ExitCode {
    // A missing .env is normal
    let _ = dotenvy::dotenv();

    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "stock_sync=info".into()),
        )
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();

    match run(cli).await {
        Ok(outcome) => {
            println!("{}", outcome.output_path.display());
            ExitCode::SUCCESS
        }
        Err(err) => {
            eprintln!("{} {}", "error:".red().bold(), err);
            ExitCode::FAILURE
        }
    }
}

async fn run(cli: Cli) -> SyncResult<ExportOutcome> {
    let settings = Settings::from_cli(cli)?;

    let sheets = SheetsClient::connect(&settings.service_account()?)?
        .with_retry(settings.retry.clone())
        .with_timeout(settings.sheets_timeout);
    let launcher = ChromeLauncher::new(settings.chrome());

    Orchestrator::new(settings.run_config(), Arc::new(launcher), Arc::new(sheets))
        .run()
        .await
}
