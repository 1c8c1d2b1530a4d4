//! Battle-Crawler main entry point
//!
//! This is the command-line interface for the resumable battle-statistics
//! crawler.

use anyhow::{Context, Result};
use battle_crawler::config::{load_config_with_hash, validate, Config};
use battle_crawler::crawler::{CrawlOutcome, Coordinator, TracingObserver};
use battle_crawler::output::{print_statistics, CrawlStatistics, ExportData, ExportWriter};
use battle_crawler::storage::ProgressStore;
use clap::Parser;
use std::path::PathBuf;
use std::sync::Arc;
use tracing_subscriber::EnvFilter;

/// Battle-Crawler: a resumable battle-statistics harvester
///
/// Starting from one player's recent battles, Battle-Crawler discovers
/// related battles and players, fetches their detail records, and exports
/// the dataset as JSON. Progress is checkpointed so an interrupted crawl
/// resumes where it stopped.
#[derive(Parser, Debug)]
#[command(name = "battle-crawler")]
#[command(version)]
#[command(about = "A resumable battle-statistics crawler", long_about = None)]
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

    /// Start a fresh crawl, discarding the checkpoint
    #[arg(long)]
    fresh: bool,

    /// Override the seed player id
    #[arg(long, value_name = "ID")]
    player: Option<String>,

    /// Override the number of players sampled into the pool
    #[arg(long, value_name = "N")]
    max_players: Option<usize>,

    /// Batch profile: wide fetch fan-out and up to 1000 attempts per request
    #[arg(long)]
    batch: bool,

    /// Validate config and show what would be crawled without crawling
    #[arg(long, conflicts_with_all = ["status", "export", "list_exports"])]
    dry_run: bool,

    /// Show checkpoint statistics and exit
    #[arg(long, conflicts_with_all = ["dry_run", "export", "list_exports"])]
    status: bool,

    /// Write a snapshot export from the checkpoint and exit
    #[arg(long, conflicts_with_all = ["dry_run", "status", "list_exports"])]
    export: bool,

    /// List export files, newest first, and exit
    #[arg(long, conflicts_with_all = ["dry_run", "status", "export"])]
    list_exports: bool,
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    // Setup logging based on verbosity
    setup_logging(cli.verbose, cli.quiet);

    // Load and validate configuration
    tracing::info!("Loading configuration from: {}", cli.config.display());
    let (mut config, config_hash) = load_config_with_hash(&cli.config)
        .with_context(|| format!("Failed to load {}", cli.config.display()))?;
    tracing::info!("Configuration loaded successfully (hash: {})", config_hash);

    apply_overrides(&mut config, &cli);
    validate(&config).context("Invalid configuration after command-line overrides")?;

    // Handle different modes
    if cli.dry_run {
        handle_dry_run(&config);
    } else if cli.status {
        handle_status(&config)?;
    } else if cli.export {
        handle_export(&config)?;
    } else if cli.list_exports {
        handle_list_exports(&config)?;
    } else {
        handle_crawl(config, config_hash, cli.fresh).await?;
    }

    Ok(())
}

/// Sets up the logging/tracing subscriber based on verbosity level
fn setup_logging(verbose: u8, quiet: bool) {
    let filter = if quiet {
        // Only show errors
        EnvFilter::new("error")
    } else {
        match verbose {
            0 => EnvFilter::new("battle_crawler=info,warn"),
            1 => EnvFilter::new("battle_crawler=debug,info"),
            2 => EnvFilter::new("battle_crawler=trace,debug"),
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

fn apply_overrides(config: &mut Config, cli: &Cli) {
    if let Some(player) = &cli.player {
        config.crawler.initial_player_id = player.clone();
    }
    if let Some(max_players) = cli.max_players {
        config.crawler.max_players = max_players;
    }
    if cli.batch {
        config.apply_batch_profile();
    }
}

/// Handles the --dry-run mode: shows the resolved configuration
fn handle_dry_run(config: &Config) {
    println!("=== Battle-Crawler Dry Run ===\n");

    println!("Crawler Configuration:");
    println!("  Seed player: {}", config.crawler.initial_player_id);
    println!("  Max players: {}", config.crawler.max_players);
    println!("  Save frequency: {}", config.crawler.save_frequency);
    println!("  Page size: {}", config.crawler.page_size);
    println!("  Concurrency: {}", config.crawler.concurrency);
    match config.crawler.shuffle_seed {
        Some(seed) => println!("  Shuffle seed: {}", seed),
        None => println!("  Shuffle seed: random"),
    }
    println!("  Clear on complete: {}", config.crawler.clear_on_complete);

    println!("\nHTTP:");
    println!("  Base URL: {}", config.http.base_url);
    println!("  Region: {}", config.http.region);
    println!("  Request delay: {}ms", config.http.request_delay_ms);
    println!("  Timeout: {}s", config.http.timeout_secs);
    println!("  Max attempts: {}", config.http.max_attempts);
    println!("  Retry base delay: {}ms", config.http.retry_base_delay_ms);
    println!("  User agent: {}", config.http.user_agent);

    println!("\nOutput:");
    println!("  Data directory: {}", config.output.data_dir);
    println!("  Export directory: {}", config.output.export_dir);
    println!("  Auto export: {}", config.output.auto_export);

    println!("\n✓ Configuration is valid");
}

/// Handles the --status mode: shows statistics from the checkpoint
fn handle_status(config: &Config) -> Result<()> {
    let store = ProgressStore::new(&config.output.data_dir)?;
    println!("Checkpoint: {}\n", store.paths().primary.display());

    match store.load() {
        Some(state) => print_statistics(&CrawlStatistics::from_state(&state)),
        None => println!("No checkpoint found"),
    }

    Ok(())
}

/// Handles the --export mode: writes a snapshot export from the checkpoint
fn handle_export(config: &Config) -> Result<()> {
    let store = ProgressStore::new(&config.output.data_dir)?;
    let state = store
        .load()
        .context("No checkpoint found, nothing to export")?;

    let writer = ExportWriter::new(&config.output.export_dir);
    let path = writer.export_snapshot(&ExportData::from(&state))?;

    println!("✓ Exported to: {}", path.display());
    Ok(())
}

/// Handles the --list-exports mode
fn handle_list_exports(config: &Config) -> Result<()> {
    let writer = ExportWriter::new(&config.output.export_dir);
    let files = writer.list_exports()?;

    println!("Exports in {} ({}):", config.output.export_dir, files.len());
    for file in files {
        println!(
            "  {}  {:>10} bytes  {}",
            file.modified.format("%Y-%m-%d %H:%M:%S"),
            file.size_bytes,
            file.name
        );
    }

    Ok(())
}

/// Handles the main crawl operation
async fn handle_crawl(config: Config, config_hash: String, fresh: bool) -> Result<()> {
    if fresh {
        tracing::info!("Starting fresh crawl (ignoring previous state)");
    } else {
        tracing::info!("Starting crawl (will resume if a checkpoint exists)");
    }

    let mut coordinator = Coordinator::new(config, fresh)?.with_config_hash(config_hash);
    coordinator.set_observer(Arc::new(TracingObserver));

    // First Ctrl-C pauses at the next safe point
    let stop = coordinator.stop_signal();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            tracing::info!("Stop requested, pausing after the current request");
            stop.request_stop();
        }
    });

    match coordinator.run().await {
        Ok(CrawlOutcome::Completed(data)) => {
            tracing::info!(
                "Crawl completed successfully: {} battle details, {} players",
                data.battle_details.len(),
                data.players.len()
            );
            Ok(())
        }
        Ok(CrawlOutcome::Paused(_)) => {
            tracing::info!("Crawl paused; run again to resume");
            Ok(())
        }
        Err(e) => {
            tracing::error!("Crawl failed: {}", e);
            Err(e.into())
        }
    }
}
