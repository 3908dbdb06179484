use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use rusqlite::Connection;
use std::path::{Path, PathBuf};
use tokio_util::sync::CancellationToken;
use tracing_subscriber::EnvFilter;

use rate_tracker::{
    export_rates_csv, get_all_currencies, last_event_of_type, setup_database, Config,
    HttpFeedFetcher, IngestionPipeline, IngestionScheduler, SYNC_EVENT,
};

#[derive(Parser)]
#[command(name = "rate-tracker", version, about = "Daily exchange-rate ingestion worker")]
struct Cli {
    /// TOML config file layered over the built-in defaults
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    /// Log at debug level unless RUST_LOG says otherwise
    #[arg(long, short, global = true)]
    verbose: bool,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Run the scheduler until Ctrl-C
    Run,
    /// Run a single fetch → reconcile cycle
    Sync,
    /// Print stored rates
    List,
    /// Write stored rates as CSV
    Export {
        #[arg(long, short)]
        output: PathBuf,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    let default_level = if cli.verbose { "debug" } else { "info" };
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_level)),
        )
        .init();

    let config = Config::load(cli.config.as_deref())?;

    match cli.command {
        Command::Run => run_scheduler(&config).await,
        Command::Sync => run_sync(&config).await,
        Command::List => run_list(&config.database.path),
        Command::Export { output } => run_export(&config.database.path, &output),
    }
}

fn build_pipeline(config: &Config) -> Result<IngestionPipeline> {
    let fetcher = HttpFeedFetcher::from_config(&config.feed)?;
    Ok(IngestionPipeline::new(Box::new(fetcher), config.database.path.clone()))
}

async fn run_scheduler(config: &Config) -> Result<()> {
    let scheduler = IngestionScheduler::new(
        build_pipeline(config)?,
        config.schedule.tick_interval(),
        config.schedule.error_cooldown(),
    );

    let cancel = CancellationToken::new();
    let worker = {
        let cancel = cancel.clone();
        tokio::spawn(async move { scheduler.run(cancel).await })
    };

    tokio::signal::ctrl_c()
        .await
        .context("Failed to listen for Ctrl-C")?;
    tracing::info!("shutdown requested, waiting for the current cycle to finish");
    cancel.cancel();

    let stats = worker.await.context("Scheduler task panicked")?;
    println!(
        "✓ Stopped after {} cycles ({} ok, {} failed)",
        stats.cycles, stats.succeeded, stats.failed
    );

    Ok(())
}

async fn run_sync(config: &Config) -> Result<()> {
    let pipeline = build_pipeline(config)?;
    let report = pipeline.run_once().await.context("Sync cycle failed")?;

    println!("✓ Fetched {} bytes (sha256 {})", report.bytes, report.digest);
    println!("✓ Parsed {} rates", report.parsed);
    println!(
        "✓ Inserted {}, updated {} in {}",
        report.summary.inserted,
        report.summary.updated,
        pipeline.db_path().display()
    );

    Ok(())
}

fn open_database(db_path: &Path) -> Result<Connection> {
    let conn = Connection::open(db_path)
        .with_context(|| format!("Failed to open database {}", db_path.display()))?;
    setup_database(&conn)?;
    Ok(conn)
}

fn run_list(db_path: &Path) -> Result<()> {
    let conn = open_database(db_path)?;
    let currencies = get_all_currencies(&conn)?;

    if currencies.is_empty() {
        println!("No rates stored yet. Run: rate-tracker sync");
        return Ok(());
    }

    println!("{:<6} {:>16}  {}", "CODE", "RATE", "UPDATED");
    for currency in &currencies {
        println!(
            "{:<6} {:>16}  {}",
            currency.code,
            currency.rate.to_string(),
            currency.updated_at.format("%Y-%m-%d %H:%M:%S UTC")
        );
    }

    if let Some(event) = last_event_of_type(&conn, SYNC_EVENT)? {
        println!("\nLast sync: {} from {}", event.timestamp.to_rfc3339(), event.entity_id);
    }

    Ok(())
}

fn run_export(db_path: &Path, output: &Path) -> Result<()> {
    let conn = open_database(db_path)?;
    let rows = export_rates_csv(&conn, output)?;
    println!("✓ Exported {} rates to {}", rows, output.display());
    Ok(())
}
