use std::path::PathBuf;
use std::process::ExitCode;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use anyhow::{Context, Result};
use clap::{Args, Parser, Subcommand};

use oaipmh_provider::connector::{DataConnector, HttpTransport};
use oaipmh_provider::harvester::Harvester;
use oaipmh_provider::retry::RetryPolicy;
use oaipmh_provider::settings::Settings;
use oaipmh_provider::store::SqliteDocumentStore;

#[derive(Parser)]
#[command(version, about = "Harvests an upstream kernel's changelog into a local OAI-PMH mirror")]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Pull changes from the upstream kernel and update the local mirror.
    Sync(SyncArgs),
}

#[derive(Args)]
struct SyncArgs {
    /// Number of documents to fetch concurrently.
    #[arg(long, default_value_t = 4)]
    concurrency: usize,
    /// Replica set name, accepted for compatibility with the reference
    /// harvester's CLI; has no effect against the SQLite store used here.
    #[arg(long, default_value = "")]
    replicaset: String,
    /// Watermark to resume from. If absent, the previous
    /// `last_synced_timestamp` recorded in the store is used.
    #[arg(long)]
    since: Option<String>,
    /// Optional settings file overlaying the built-in defaults; `OAIPMH_*`
    /// environment variables still take precedence over it.
    #[arg(long, value_name = "FILE")]
    config: Option<PathBuf>,
    /// Upstream kernel base URL.
    source: String,
    /// Path to the destination SQLite database.
    store_dsn: PathBuf,
}

/// Marks a cycle that ended early because of `SIGINT`, so `main` can map it
/// to the shell's `128 + signal number` exit code convention.
#[derive(Debug)]
struct Interrupted;

impl std::fmt::Display for Interrupted {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "interrupted")
    }
}

impl std::error::Error for Interrupted {}

fn main() -> ExitCode {
    match inner_main() {
        Ok(()) => ExitCode::SUCCESS,
        Err(err) if err.downcast_ref::<Interrupted>().is_some() => ExitCode::from(130),
        Err(err) => {
            eprintln!("error: {err:#}");
            ExitCode::FAILURE
        }
    }
}

fn inner_main() -> Result<()> {
    let cli = Cli::parse();
    match cli.command {
        Commands::Sync(args) => run_sync(args),
    }
}

fn run_sync(args: SyncArgs) -> Result<()> {
    if !args.replicaset.is_empty() {
        eprintln!(
            "note: --replicaset {:?} has no effect against the SQLite store",
            args.replicaset
        );
    }

    let settings = Settings::load(args.config.as_deref())?;

    let store = SqliteDocumentStore::open(&args.store_dsn)
        .with_context(|| format!("opening store at {:?}", args.store_dsn))?;

    let transport = HttpTransport::new()?;
    let retry_policy = RetryPolicy::new(settings.max_retries, settings.backoff_factor);
    let connector = DataConnector::new(args.source.clone(), &transport).with_retry_policy(retry_policy);

    let harvester = Harvester::new(&connector, &store, &store, args.concurrency);

    let poisoned = Arc::new(AtomicBool::new(false));
    let handler_flag = Arc::clone(&poisoned);
    ctrlc::set_handler(move || {
        handler_flag.store(true, Ordering::SeqCst);
    })
    .context("installing SIGINT handler")?;

    let since = args.since.unwrap_or_default();
    let report = harvester.sync(&since, Arc::clone(&poisoned))?;

    println!(
        "synced {} fetched, {} deleted, {} failed (watermark: {})",
        report.fetched,
        report.deleted,
        report.failed,
        report.watermark.as_deref().unwrap_or("unchanged"),
    );

    if report.cancelled {
        return Err(Interrupted.into());
    }

    Ok(())
}
