//! crawl-queue main entry point
//!
//! This is the command-line interface for the crawl-queue scheduler.

use anyhow::Context;
use clap::Parser;
use crawl_queue::config::{load_config_with_hash, Config};
use crawl_queue::output::{load_statistics, print_pool_statistics, print_statistics};
use crawl_queue::processor::HttpPageProcessor;
use crawl_queue::{Admission, Dispatcher, WorkerPool};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing_subscriber::EnvFilter;

/// crawl-queue: a durable crawl scheduler
///
/// Keeps a priority-ordered work queue and a visit ledger in SQLite and
/// runs a pool of workers that fetch pages and feed discovered links back
/// into the queue.
#[derive(Parser, Debug)]
#[command(name = "crawl-queue")]
#[command(version)]
#[command(about = "A durable crawl scheduler", long_about = None)]
struct Cli {
    /// Path to TOML configuration file
    #[arg(value_name = "CONFIG")]
    config: PathBuf,

    /// Increase logging verbosity (-v, -vv, -vvv)
    #[arg(short, long, action = clap::ArgAction::Count)]
    verbose: u8,

    /// Suppress non-error output
    #[arg(short, long, conflicts_with = "verbose")]
    quiet: bool,

    /// Show statistics from the database and exit
    #[arg(long, conflicts_with_all = ["peek", "submit", "clear_queue", "cleanup_days"])]
    stats: bool,

    /// Show the next N entries in claim order and exit
    #[arg(long, value_name = "N", conflicts_with_all = ["submit", "clear_queue", "cleanup_days"])]
    peek: Option<usize>,

    /// Submit one URL and exit
    #[arg(long, value_name = "URL", conflicts_with_all = ["clear_queue", "cleanup_days"])]
    submit: Option<String>,

    /// Priority for --submit (higher is claimed first)
    #[arg(long, value_name = "P", default_value_t = 0, requires = "submit")]
    priority: i64,

    /// Remove all pending entries and exit
    #[arg(long, conflicts_with = "cleanup_days")]
    clear_queue: bool,

    /// Delete finished entries, visits and saved pages older than D days and exit
    #[arg(long, value_name = "D")]
    cleanup_days: Option<u32>,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    // Setup logging based on verbosity
    setup_logging(cli.verbose, cli.quiet);

    // Load and validate configuration
    tracing::info!("Loading configuration from: {}", cli.config.display());
    let (config, config_hash) = load_config_with_hash(&cli.config)
        .with_context(|| format!("failed to load {}", cli.config.display()))?;
    tracing::info!("Configuration loaded successfully (hash: {})", config_hash);

    let dispatcher = open_dispatcher(&config)?;

    // Handle different modes
    if cli.stats {
        handle_stats(&dispatcher)
    } else if let Some(n) = cli.peek {
        handle_peek(&dispatcher, n)
    } else if let Some(url) = cli.submit.as_deref() {
        handle_submit(&dispatcher, url, cli.priority)
    } else if cli.clear_queue {
        handle_clear_queue(&dispatcher)
    } else if let Some(days) = cli.cleanup_days {
        handle_cleanup(&dispatcher, days)
    } else {
        handle_run(config, dispatcher).await
    }
}

/// Sets up the logging/tracing subscriber based on verbosity level
fn setup_logging(verbose: u8, quiet: bool) {
    let filter = if quiet {
        // Only show errors
        EnvFilter::new("error")
    } else {
        match verbose {
            0 => EnvFilter::new("crawl_queue=info,warn"),
            1 => EnvFilter::new("crawl_queue=debug,info"),
            2 => EnvFilter::new("crawl_queue=trace,debug"),
            _ => EnvFilter::new("trace"),
        }
    };

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .with_thread_ids(false)
        .with_file(false)
        .init();
}

fn open_dispatcher(config: &Config) -> anyhow::Result<Dispatcher> {
    let path = Path::new(&config.storage.database_path);
    Dispatcher::open(path, config.dispatcher.clone())
        .with_context(|| format!("failed to open database {}", path.display()))
}

/// Handles the --stats mode: shows statistics from the database
fn handle_stats(dispatcher: &Dispatcher) -> anyhow::Result<()> {
    let stats = load_statistics(dispatcher)?;
    print_statistics(&stats);
    Ok(())
}

/// Handles the --peek mode: lists upcoming entries without claiming them
fn handle_peek(dispatcher: &Dispatcher, n: usize) -> anyhow::Result<()> {
    let entries = dispatcher.peek(n)?;
    println!("=== Next {} of {} pending ===\n", entries.len(), dispatcher.size()?);
    for entry in entries {
        println!("  [{:>4}] {}", entry.priority, entry.url);
    }
    Ok(())
}

/// Handles the --submit mode
fn handle_submit(dispatcher: &Dispatcher, url: &str, priority: i64) -> anyhow::Result<()> {
    match dispatcher.submit(url, priority)? {
        Admission::Admitted => println!("✓ Admitted {} (priority {})", url, priority),
        Admission::Duplicate => println!("Already queued: {}", url),
        Admission::CooldownRejected => println!("Visited too recently: {}", url),
    }
    Ok(())
}

/// Handles the --clear-queue mode
fn handle_clear_queue(dispatcher: &Dispatcher) -> anyhow::Result<()> {
    let removed = dispatcher.clear_queue()?;
    println!("✓ Removed {} pending entries", removed);
    Ok(())
}

/// Handles the --cleanup-days mode
fn handle_cleanup(dispatcher: &Dispatcher, days: u32) -> anyhow::Result<()> {
    let report = dispatcher.cleanup_history(chrono::Duration::days(i64::from(days)))?;
    println!(
        "✓ Removed {} finished entries, {} visits and {} saved pages",
        report.entries_removed, report.visits_removed, report.pages_removed
    );
    Ok(())
}

/// Handles the main run: seeds the queue and runs workers until Ctrl-C
async fn handle_run(config: Config, dispatcher: Dispatcher) -> anyhow::Result<()> {
    for seed in &config.seed {
        match dispatcher.submit(&seed.url, seed.priority) {
            Ok(admission) => tracing::info!("Seed {}: {}", seed.url, admission),
            Err(e) => tracing::warn!("Seed {} not admitted: {}", seed.url, e),
        }
    }

    let processor =
        HttpPageProcessor::new(&config.http).context("failed to build HTTP client")?;
    let pool = WorkerPool::new(
        Arc::new(dispatcher),
        Arc::new(processor),
        config.workers.clone(),
        config.telemetry.clone(),
    );
    pool.start(config.workers.count);

    tracing::info!("Running; press Ctrl-C to stop");
    tokio::signal::ctrl_c()
        .await
        .context("failed to listen for Ctrl-C")?;

    tracing::info!("Shutdown requested, waiting for in-flight items");
    let pool_stats = pool.stop().await;

    println!();
    print_pool_statistics(&pool_stats);
    println!();
    handle_stats(pool.dispatcher())
}
