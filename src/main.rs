//! Tender-Harvest main entry point
//!
//! This is the command-line interface for the Tender-Harvest feed collector.

use anyhow::{Context, Result};
use clap::Parser;
use std::path::PathBuf;
use tender_harvest::config::{load_config_with_hash, Config};
use tender_harvest::crawler::{build_http_client, crawl, PageFetcher};
use tender_harvest::storage::{open_store, CheckpointSource, CheckpointStore};
use tracing_subscriber::EnvFilter;

/// Tender-Harvest: collects a paginated tender feed into compressed packages
///
/// Each run continues from where the previous one stopped: an interrupted
/// run resumes from its continue package, a completed run leaves a next
/// package for the following one.
#[derive(Parser, Debug)]
#[command(name = "tender-harvest")]
#[command(version)]
#[command(about = "Collects a paginated tender feed into compressed packages", long_about = None)]
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

    /// Validate config and show the first request without crawling
    #[arg(long, conflicts_with = "status")]
    dry_run: bool,

    /// Show which checkpoint the next run would start from and exit
    #[arg(long, conflicts_with = "dry_run")]
    status: bool,
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    setup_logging(cli.verbose, cli.quiet);

    tracing::info!("Loading configuration from: {}", cli.config.display());
    let (config, hash) = load_config_with_hash(&cli.config)
        .with_context(|| format!("Failed to load configuration {}", cli.config.display()))?;
    tracing::info!("Configuration loaded successfully (hash: {})", hash);

    if cli.dry_run {
        handle_dry_run(&config)
    } else if cli.status {
        handle_status(&config)
    } else {
        handle_crawl(&config).await
    }
}

/// Sets up the logging/tracing subscriber based on verbosity level
fn setup_logging(verbose: u8, quiet: bool) {
    let filter = if quiet {
        EnvFilter::new("error")
    } else {
        match verbose {
            0 => EnvFilter::new("tender_harvest=info,warn"),
            1 => EnvFilter::new("tender_harvest=debug,info"),
            2 => EnvFilter::new("tender_harvest=trace,debug"),
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

/// Handles the --dry-run mode: shows the resolved configuration
fn handle_dry_run(config: &Config) -> Result<()> {
    println!("=== Tender-Harvest Dry Run ===\n");

    println!("Source:");
    println!("  Base URL: {}", config.source.base_url);
    println!("  Resource: {}", config.source.resource);
    if !config.source.sub_path.is_empty() {
        println!("  Sub-path: {}", config.source.sub_path);
    }
    println!("  Request timeout: {}s", config.source.request_timeout_secs);

    println!("\nStorage:");
    println!("  Data dir: {}", config.storage.data_dir.display());
    println!("  Staging dir: {}", config.storage.staging_path().display());

    println!("\nRetry:");
    println!("  Max attempts: {}", config.retry.max_attempts);
    println!("  Delay: {}ms", config.retry.delay_ms);

    println!("\nCompression:");
    println!("  xz level: {}", config.compression.level);

    let store = open_store(config);
    let state = store.load()?;
    let client = build_http_client(&config.source)?;
    let fetcher = PageFetcher::new(client, &config.source, config.storage.staging_path());

    println!("\n✓ Configuration is valid");
    println!("✓ Would start with: GET {}", fetcher.page_url(&state.cursor));

    Ok(())
}

/// Handles the --status mode: shows the checkpoint the next run starts from
fn handle_status(config: &Config) -> Result<()> {
    let store = open_store(config);

    match store.describe() {
        CheckpointSource::Resume(path) => {
            println!("Interrupted run found: {}", path.display())
        }
        CheckpointSource::Next(path) => println!("Next package found: {}", path.display()),
        CheckpointSource::Default => println!("No checkpoint found"),
    }

    let state = store.load()?;
    println!("  Started from: {}", state.first_timestamp());
    println!("  Cursor: {}", state.cursor);
    println!("  Files: {}", state.files.len());
    println!("  Errors: {}", state.errors.len());
    for name in &state.errors {
        println!("    * {}", name);
    }

    Ok(())
}

/// Handles the main crawl operation
async fn handle_crawl(config: &Config) -> Result<()> {
    tracing::info!(
        "Harvesting {} from {}",
        config.source.resource,
        config.source.base_url
    );

    let report = crawl(config).await?;
    tracing::info!(
        "Crawl completed: {} pages, {} files, {} errors, record {}",
        report.pages,
        report.files.len(),
        report.errors.len(),
        report.record.display()
    );

    Ok(())
}
