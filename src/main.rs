use boxbook::application::booking::BookingOrchestrator;
use boxbook::application::compensation::CompensationQueue;
use boxbook::application::payments::PaymentService;
use boxbook::application::periodic::{TaskFailure, failure_channel};
use boxbook::application::sweeper::ExpirySweeper;
use boxbook::config::AppConfig;
use boxbook::domain::clock::{ClockRef, SystemClock};
use boxbook::domain::ports::{FundsLedgerRef, ReservationStoreRef};
use boxbook::infrastructure::in_memory::{InMemoryFundsLedger, InMemoryReservationStore};
use boxbook::interfaces::csv::batch::BatchRunner;
use boxbook::interfaces::csv::command_reader::CommandReader;
use boxbook::interfaces::csv::outcome_writer::OutcomeWriter;
use clap::Parser;
use miette::{IntoDiagnostic, Result};
use std::fs::File;
use std::io;
use std::path::PathBuf;
use std::sync::Arc;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use tracing::{error, info, warn};
use tracing_subscriber::EnvFilter;

#[derive(Parser)]
#[command(author, version, about, long_about = None)]
struct Cli {
    /// Input commands CSV file
    input: PathBuf,

    /// Path to persistent database (optional). If provided, uses RocksDB.
    #[arg(long)]
    db_path: Option<PathBuf>,

    /// JSON configuration file. Defaults apply when absent.
    #[arg(long, env = "BOXBOOK_CONFIG")]
    config: Option<PathBuf>,

    /// Overrides the configured expiry sweep period.
    #[arg(long)]
    sweep_interval_secs: Option<u64>,
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .with_writer(io::stderr)
        .init();

    let cli = Cli::parse();
    let mut config = AppConfig::load(cli.config.as_deref()).into_diagnostic()?;
    if let Some(secs) = cli.sweep_interval_secs.filter(|secs| *secs > 0) {
        config.sweep_interval_secs = secs;
    }

    let (store, ledger) = open_storage(cli.db_path)?;
    let clock: ClockRef = Arc::new(SystemClock);
    let compensations = CompensationQueue::new();
    let orchestrator = BookingOrchestrator::new(
        Arc::new(config.catalog().into_diagnostic()?),
        store.clone(),
        ledger.clone(),
        clock.clone(),
        compensations.clone(),
        config.policy(),
    );
    let sweeper = ExpirySweeper::new(store, clock, config.sweep_interval());

    // Background tasks
    let shutdown = CancellationToken::new();
    let (failures, failure_rx) = failure_channel(64);
    let background = [
        sweeper.clone().spawn(shutdown.clone(), failures.clone()),
        compensations.spawn_retrier(ledger.clone(), config.compensation_retry(), shutdown.clone(), failures),
        tokio::spawn(report_failures(failure_rx)),
    ];

    let runner = BatchRunner::new(orchestrator, PaymentService::new(ledger), sweeper);
    let file = File::open(&cli.input).into_diagnostic()?;

    let outcome = tokio::select! {
        result = process(&runner, file) => result,
        _ = tokio::signal::ctrl_c() => {
            warn!("interrupted, stopping before the end of input");
            Ok(())
        }
    };

    shutdown.cancel();
    for handle in background {
        if let Err(err) = handle.await {
            error!(error = %err, "background task panicked");
        }
    }

    let pending = compensations.len().await;
    if pending > 0 {
        warn!(pending, "exiting with compensating credits still queued");
    }
    outcome
}

async fn process(runner: &BatchRunner, file: File) -> Result<()> {
    let reader = CommandReader::new(file);
    let stdout = io::stdout();
    let mut writer = OutcomeWriter::new(stdout.lock());

    for row in reader.commands() {
        match row {
            Ok(command) => {
                let outcomes = runner.run(command).await;
                writer.write_all(outcomes).into_diagnostic()?;
            }
            Err(e) => {
                eprintln!("Error reading command: {}", e);
            }
        }
    }
    Ok(())
}

/// Drains the failure channel until every background task has dropped its sender.
async fn report_failures(mut failures: mpsc::Receiver<TaskFailure>) {
    while let Some(TaskFailure { task, error }) = failures.recv().await {
        error!(task, kind = %error.kind(), %error, "background task failed");
    }
}

#[cfg(feature = "storage-rocksdb")]
fn open_storage(db_path: Option<PathBuf>) -> Result<(ReservationStoreRef, FundsLedgerRef)> {
    use boxbook::infrastructure::rocksdb::RocksDBStore;

    if let Some(db_path) = db_path {
        let store = RocksDBStore::open(db_path).into_diagnostic()?;
        info!("using RocksDB storage");
        let ledger: FundsLedgerRef = Arc::new(store.clone());
        let reservations: ReservationStoreRef = Arc::new(store);
        return Ok((reservations, ledger));
    }
    Ok(in_memory())
}

#[cfg(not(feature = "storage-rocksdb"))]
fn open_storage(db_path: Option<PathBuf>) -> Result<(ReservationStoreRef, FundsLedgerRef)> {
    if db_path.is_some() {
        eprintln!(
            "WARNING: Persistent storage requested via --db-path, but 'storage-rocksdb' feature is not enabled. Falling back to In-Memory storage."
        );
    }
    Ok(in_memory())
}

fn in_memory() -> (ReservationStoreRef, FundsLedgerRef) {
    info!("using in-memory storage");
    (
        Arc::new(InMemoryReservationStore::new()),
        Arc::new(InMemoryFundsLedger::new()),
    )
}
