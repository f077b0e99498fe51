//! edgar-harvest main entry point
//!
//! This is the command-line interface for the EDGAR bulk harvester.

use anyhow::Context;
use clap::{Parser, Subcommand};
use edgar_harvest::config::{load_config_with_hash, Config};
use edgar_harvest::ledger::{load_pending, FileLedger, Ledger};
use edgar_harvest::output::{load_statistics, print_run_summary, print_statistics};
use edgar_harvest::resolver::{resolve_listing, resolve_quarters, Resolution};
use edgar_harvest::url::{cik_listing_url, parse_archive_base};
use edgar_harvest::Orchestrator;
use std::path::{Path, PathBuf};
use std::time::Duration;
use tracing_subscriber::EnvFilter;
use url::Url;

/// edgar-harvest: A polite bulk harvester for the SEC EDGAR archive
///
/// Discovers filings from directory listings or quarterly indexes, downloads
/// each one exactly once, and records every download in a hash-verified
/// ledger so interrupted runs can resume.
#[derive(Parser, Debug)]
#[command(name = "harvest")]
#[command(version)]
#[command(about = "A polite bulk harvester for the SEC EDGAR archive", long_about = None)]
struct Cli {
    /// Path to TOML configuration file
    #[arg(value_name = "CONFIG")]
    config: PathBuf,

    /// Increase logging verbosity (-v, -vv, -vvv)
    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    verbose: u8,

    /// Suppress non-error output
    #[arg(short, long, conflicts_with = "verbose", global = true)]
    quiet: bool,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Resolve a directory listing and download every filing in it
    Listing {
        /// Listing URL, or a bare CIK for that filer's directory
        #[arg(value_name = "URL_OR_CIK")]
        root: String,
    },

    /// Resolve quarterly master indexes and download the filings they list
    Index {
        /// Year of the index
        year: u16,

        /// Quarter (1-4); all four when omitted
        #[arg(value_parser = clap::value_parser!(u8).range(1..=4))]
        quarter: Option<u8>,
    },

    /// Download whatever the previous run left pending
    Resume,

    /// Show statistics from the ledger and exit
    Stats {
        /// Re-hash every recorded file
        #[arg(long)]
        verify: bool,
    },

    /// Rewrite the ledger with one line per resource
    Compact,

    /// Validate config and show the effective settings
    DryRun,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    // Setup logging based on verbosity
    setup_logging(cli.verbose, cli.quiet);

    // Load and validate configuration
    tracing::info!("Loading configuration from: {}", cli.config.display());
    let (config, config_hash) = load_config_with_hash(&cli.config)
        .with_context(|| format!("Failed to load configuration {}", cli.config.display()))?;
    tracing::info!("Configuration loaded successfully (hash: {})", config_hash);

    match cli.command {
        Command::Listing { root } => handle_listing(&config, &root).await,
        Command::Index { year, quarter } => handle_index(&config, year, quarter).await,
        Command::Resume => handle_resume(&config).await,
        Command::Stats { verify } => handle_stats(&config, verify),
        Command::Compact => handle_compact(&config),
        Command::DryRun => handle_dry_run(&config),
    }
}

/// Sets up the logging/tracing subscriber based on verbosity level
fn setup_logging(verbose: u8, quiet: bool) {
    let filter = if quiet {
        // Only show errors
        EnvFilter::new("error")
    } else {
        match verbose {
            0 => EnvFilter::new("edgar_harvest=info,harvest=info,warn"),
            1 => EnvFilter::new("edgar_harvest=debug,harvest=debug,info"),
            2 => EnvFilter::new("edgar_harvest=trace,harvest=trace,debug"),
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

/// Creates the orchestrator and wires Ctrl-C to its cancellation token
fn build_orchestrator(config: &Config) -> anyhow::Result<Orchestrator> {
    let orchestrator = Orchestrator::from_config(config).context("Failed to initialise harvester")?;

    let token = orchestrator.cancellation_token();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            tracing::warn!("Interrupt received; finishing in-flight downloads");
            token.cancel();
        }
    });

    Ok(orchestrator)
}

/// Downloads a resolution, or explains why there is nothing to do
async fn harvest(orchestrator: &mut Orchestrator, resolution: Resolution) -> anyhow::Result<()> {
    if resolution.is_empty() {
        println!("No filings found; nothing to download.");
        return Ok(());
    }

    let summary = orchestrator
        .run(resolution.children)
        .await
        .context("Harvest aborted")?;

    print_run_summary(&summary);
    if !summary.is_complete() {
        println!(
            "\n{} resources saved to {} for `resume`",
            summary.remaining().len(),
            orchestrator.pending_path().display()
        );
    }

    Ok(())
}

/// Handles the `listing` command
async fn handle_listing(config: &Config, root: &str) -> anyhow::Result<()> {
    let mut orchestrator = build_orchestrator(config)?;
    let archive_base = orchestrator.archive_base().clone();

    let listing_url = match root.parse::<u64>() {
        Ok(cik) => cik_listing_url(&archive_base, cik)?,
        Err(_) => Url::parse(root).with_context(|| format!("Invalid listing URL {}", root))?,
    };

    let resolution = resolve_listing(orchestrator.fetcher(), &listing_url, &archive_base)
        .await
        .context("Failed to resolve listing")?;

    harvest(&mut orchestrator, resolution).await
}

/// Handles the `index` command
async fn handle_index(config: &Config, year: u16, quarter: Option<u8>) -> anyhow::Result<()> {
    let mut orchestrator = build_orchestrator(config)?;
    let archive_base = orchestrator.archive_base().clone();

    let quarters: Vec<(u16, u8)> = match quarter {
        Some(q) => vec![(year, q)],
        None => (1..=4).map(|q| (year, q)).collect(),
    };

    if !config.edgar.forms.is_empty() {
        tracing::info!("Keeping form types: {}", config.edgar.forms.join(", "));
    }

    let resolution = resolve_quarters(
        orchestrator.fetcher(),
        &archive_base,
        &quarters,
        config.edgar.index_header_lines,
        &config.edgar.forms,
        Duration::from_millis(config.harvest.request_delay_ms),
    )
    .await
    .context("Failed to resolve index")?;

    harvest(&mut orchestrator, resolution).await
}

/// Handles the `resume` command
async fn handle_resume(config: &Config) -> anyhow::Result<()> {
    let mut orchestrator = build_orchestrator(config)?;

    let summary = orchestrator.resume().await.context("Harvest aborted")?;
    print_run_summary(&summary);

    Ok(())
}

/// Handles the `stats` command: shows statistics from the ledger
fn handle_stats(config: &Config, verify: bool) -> anyhow::Result<()> {
    println!("Ledger: {}\n", config.output.ledger_path);

    let ledger = FileLedger::load(Path::new(&config.output.ledger_path))
        .context("Failed to read ledger")?;
    let pending = load_pending(Path::new(&config.output.pending_path))
        .context("Failed to read pending list")?;

    let stats = load_statistics(
        &ledger,
        &pending,
        verify.then_some(config.harvest.hash_algorithm),
    );
    print_statistics(&stats);

    Ok(())
}

/// Handles the `compact` command
fn handle_compact(config: &Config) -> anyhow::Result<()> {
    let mut ledger = FileLedger::open(Path::new(&config.output.ledger_path))
        .context("Failed to open ledger")?;

    let dropped = ledger.compact().context("Failed to compact ledger")?;
    println!(
        "✓ Ledger compacted: {} lines dropped, {} entries kept",
        dropped,
        ledger.len()
    );

    Ok(())
}

/// Handles the `dry-run` command: validates config and shows the settings
fn handle_dry_run(config: &Config) -> anyhow::Result<()> {
    println!("=== edgar-harvest Dry Run ===\n");

    println!("Harvest Configuration:");
    println!("  Max concurrency: {}", config.harvest.max_concurrency);
    println!("  Request delay: {}ms", config.harvest.request_delay_ms);
    println!("  Timeout: {}s", config.harvest.timeout_secs);
    println!("  Max attempts: {}", config.harvest.max_attempts);
    println!("  Backoff base: {}ms", config.harvest.backoff_base_ms);
    println!("  Hash algorithm: {:?}", config.harvest.hash_algorithm);

    println!("\nUser Agent:");
    println!("  Header: {}", config.user_agent.header_value());
    if let Some(backup) = &config.user_agent.backup {
        println!("  Backup: {}", backup);
    }

    println!("\nOutput:");
    println!("  Downloads: {}", config.output.download_dir);
    println!("  Ledger: {}", config.output.ledger_path);
    println!("  Pending: {}", config.output.pending_path);

    let archive_base = parse_archive_base(&config.edgar.archive_base_url)?;
    println!("\nEDGAR:");
    println!("  Archive: {}", archive_base);
    println!("  Index header lines: {}", config.edgar.index_header_lines);
    if config.edgar.forms.is_empty() {
        println!("  Forms: all");
    } else {
        println!("  Forms: {}", config.edgar.forms.join(", "));
    }

    println!("\n✓ Configuration is valid");

    Ok(())
}
