//! Agency Harvester main entry point
//!
//! This is the command-line interface for the agency document harvester.

use agency_harvester::config::{load_config_with_hash, Config};
use agency_harvester::output::{
    load_statistics, print_run_summary, print_statistics, RecordSink, SqliteRecordSink,
};
use agency_harvester::storage::{open_storage, share, Storage};
use agency_harvester::Harvester;
use anyhow::Context;
use clap::Parser;
use std::path::{Path, PathBuf};
use tokio_util::sync::CancellationToken;
use tracing_subscriber::EnvFilter;

/// Agency Harvester: collects published documents from government-agency websites
///
/// Discovers documents through paginated listings, sitemaps, feeds and link
/// crawling, extracts their metadata, and stores each document exactly once.
#[derive(Parser, Debug)]
#[command(name = "agency-harvester")]
#[command(version)]
#[command(about = "Crawl-and-deduplicate harvester for agency publications", long_about = None)]
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

    /// Ignore and clear saved traversal positions
    #[arg(long)]
    fresh: bool,

    /// Validate config and show what would be crawled without actually crawling
    #[arg(long, conflicts_with_all = ["stats", "export"])]
    dry_run: bool,

    /// Show statistics from the database and exit
    #[arg(long, conflicts_with_all = ["dry_run", "export"])]
    stats: bool,

    /// Write the tabular export from existing data and exit
    #[arg(long, conflicts_with_all = ["dry_run", "stats"])]
    export: bool,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    setup_logging(cli.verbose, cli.quiet);

    tracing::info!("Loading configuration from: {}", cli.config.display());
    let (config, config_hash) = load_config_with_hash(&cli.config)
        .with_context(|| format!("failed to load {}", cli.config.display()))?;
    tracing::info!("Configuration loaded successfully (hash: {})", config_hash);

    if cli.dry_run {
        handle_dry_run(&config);
    } else if cli.stats {
        handle_stats(&config)?;
    } else if cli.export {
        handle_export(&config)?;
    } else {
        handle_harvest(config, &config_hash, cli.fresh).await?;
    }

    Ok(())
}

/// Sets up the logging/tracing subscriber based on verbosity level
fn setup_logging(verbose: u8, quiet: bool) {
    let filter = if quiet {
        EnvFilter::new("error")
    } else {
        match verbose {
            0 => EnvFilter::new("agency_harvester=info,warn"),
            1 => EnvFilter::new("agency_harvester=debug,info"),
            2 => EnvFilter::new("agency_harvester=trace,debug"),
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

/// Handles the --dry-run mode: shows what would be crawled
fn handle_dry_run(config: &Config) {
    println!("=== Agency Harvester Dry Run ===\n");

    println!("Crawler Configuration:");
    println!(
        "  Max concurrent per domain: {}",
        config.crawler.max_concurrent_per_domain
    );
    println!(
        "  Minimum time between requests: {}ms",
        config.crawler.minimum_time_between_requests
    );
    println!("  Render sessions: {}", config.crawler.render_sessions);
    println!("  Max crawl depth: {}", config.crawler.max_depth);
    println!("  Max listing pages: {}", config.crawler.max_listing_pages);
    println!(
        "  Retry: {} attempts, {}-{}ms backoff",
        config.retry.max_attempts, config.retry.base_delay, config.retry.max_delay
    );

    println!("\nUser Agent: {}", config.user_agent.header_value());

    println!("\nOutput:");
    println!("  Database: {}", config.output.database_path);
    println!("  Downloads: {}", config.output.download_dir);
    println!("  Export: {}", config.output.export_path);

    println!("\nAuthorities ({}):", config.authorities.len());
    for authority in &config.authorities {
        println!("  - {} ({})", authority.name, authority.domain);
        for listing in &authority.listing {
            println!("    listing: {}", listing.url);
        }
        for sitemap in &authority.sitemaps {
            println!("    sitemap: {}", sitemap);
        }
        for feed in &authority.feeds {
            println!("    feed: {}", feed);
        }
        if let Some(crawl) = &authority.crawl {
            for seed in &crawl.seeds {
                println!(
                    "    crawl: {} (depth {})",
                    seed,
                    crawl.max_depth.unwrap_or(config.crawler.max_depth)
                );
            }
        }
    }

    println!("\n✓ Configuration is valid");
    println!("✓ Would start harvesting from {} seed locations", config.seed_count());
}

/// Handles the --stats mode: shows statistics from the database
fn handle_stats(config: &Config) -> anyhow::Result<()> {
    println!("Database: {}\n", config.output.database_path);

    let storage = open_storage(Path::new(&config.output.database_path))?;
    let stats = load_statistics(&storage)?;
    print_statistics(&stats);

    Ok(())
}

/// Handles the --export mode: writes the tabular snapshot
fn handle_export(config: &Config) -> anyhow::Result<()> {
    let storage = open_storage(Path::new(&config.output.database_path))?;
    let run_id = storage.get_latest_run()?.map(|r| r.id).unwrap_or(0);

    let sink = SqliteRecordSink::new(share(storage), run_id);
    let rows = sink.export(Path::new(&config.output.export_path))?;

    println!("✓ Exported {} records to: {}", rows, config.output.export_path);
    Ok(())
}

/// Handles the main harvest operation
async fn handle_harvest(config: Config, config_hash: &str, fresh: bool) -> anyhow::Result<()> {
    if fresh {
        tracing::info!("Starting fresh harvest (saved positions cleared)");
    }
    tracing::info!(
        "Authorities: {}, seed locations: {}",
        config.authorities.len(),
        config.seed_count()
    );

    let export_path = PathBuf::from(&config.output.export_path);
    let cancel = CancellationToken::new();
    let harvester = Harvester::new(config, config_hash, fresh, cancel.clone())?;

    let signal = cancel.clone();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            tracing::warn!("Interrupt received, stopping after in-flight work");
            signal.cancel();
        }
    });

    let summary = match harvester.run().await {
        Ok(summary) => summary,
        Err(e) => {
            tracing::error!("Harvest failed: {}", e);
            return Err(e.into());
        }
    };

    print_run_summary(&summary);
    if cancel.is_cancelled() {
        println!("\nRun interrupted; the next run resumes from the saved positions.");
    }

    harvester.sink().export(&export_path)?;
    Ok(())
}
