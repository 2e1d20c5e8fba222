//! # Hackathon Radar
//!
//! A crawler that discovers hackathons from multiple public listing
//! sites, normalizes their inconsistent HTML/JSON into one canonical
//! record shape, detects near-duplicate records across sources, and
//! keeps a deduplicated record store up to date.
//!
//! ## Features
//!
//! - Scrapes multiple listing sites (Devpost, Major League Hacking,
//!   HackerEarth) through one adapter contract
//! - Rate-limited, retrying fetch layer with robots.txt politeness
//! - Tiered fallback parsing per source to ride out markup drift
//! - Fuzzy cross-source deduplication with priority-ranked merging
//! - Cron-scheduled runs with a machine-readable report per run
//!
//! ## Usage
//!
//! ```sh
//! hackathon_radar --once          # one run now, report on stdout
//! hackathon_radar                 # run on the schedule (default 03:00 daily)
//! ```
//!
//! ## Architecture
//!
//! One ingestion run flows:
//! 1. **Politeness**: robots.txt check per source before any content fetch
//! 2. **Scraping**: each adapter extracts candidate records in turn
//! 3. **Deduplication**: candidates are matched against stored records
//! 4. **Persistence**: create-or-update decisions against the record store

use std::error::Error;
use std::sync::Arc;
use std::time::Duration;

use clap::Parser;
use tracing::{debug, info};
use tracing_subscriber::{fmt as tfmt, EnvFilter};

mod cli;
mod dedup;
mod error;
mod fetcher;
mod models;
mod normalize;
mod orchestrator;
mod robots;
mod scrapers;
mod store;

use cli::Cli;
use fetcher::{Fetcher, FetcherConfig};
use orchestrator::{Orchestrator, OrchestratorConfig};
use scrapers::devpost::DevpostAdapter;
use scrapers::hackerearth::HackerEarthAdapter;
use scrapers::mlh::MlhAdapter;
use scrapers::SourceAdapter;
use store::{JsonFileStore, MemoryStore, RecordStore};

#[tokio::main]
async fn main() -> Result<(), Box<dyn Error>> {
    // --- Tracing init ---
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    tfmt()
        .with_env_filter(filter)
        .with_target(true)
        .with_file(false)
        .with_line_number(false)
        .with_timer(tracing_subscriber::fmt::time::UtcTime::rfc_3339())
        .init();

    let start_time = std::time::Instant::now();
    info!("hackathon_radar starting up");

    let args = Cli::parse();
    debug!(?args.store_path, ?args.cron, args.once, "Parsed CLI arguments");

    // --- Fetch layer ---
    let fetcher = Fetcher::new(FetcherConfig {
        user_agent: args.user_agent.clone(),
        timeout: Duration::from_secs(args.fetch_timeout_secs),
        max_retries: args.max_retries,
        retry_delay: Duration::from_millis(args.retry_delay_ms),
        max_concurrency: args.max_concurrency,
        min_interval: Duration::from_millis(args.min_interval_ms),
    })?;

    // --- Adapter registry. Registration order is persistence order. ---
    let adapters: Vec<Box<dyn SourceAdapter>> = vec![
        Box::new(DevpostAdapter),
        Box::new(MlhAdapter),
        Box::new(HackerEarthAdapter),
    ];
    info!(count = adapters.len(), "Registered source adapters");

    // --- Record store ---
    let store: Arc<dyn RecordStore> = if args.dry_run {
        info!("Dry run: using in-memory record store");
        Arc::new(MemoryStore::new())
    } else {
        Arc::new(JsonFileStore::open(&args.store_path).await?)
    };

    let orchestrator = Arc::new(Orchestrator::new(
        fetcher,
        adapters,
        store,
        OrchestratorConfig {
            dedup_threshold: args.dedup_threshold,
            dedup_window: args.dedup_window,
        },
    ));

    if args.once {
        // Manual trigger: one run, report on stdout.
        if let Some(report) = orchestrator.trigger().await? {
            println!("{}", serde_json::to_string_pretty(&report)?);
        }
    } else {
        info!(cron = %args.cron, "Starting ingestion scheduler");
        let mut sched = orchestrator.clone().start_schedule(&args.cron).await?;

        tokio::signal::ctrl_c().await?;
        info!("Shutdown signal received; letting any in-flight run wind down");
        orchestrator.request_shutdown();
        sched.shutdown().await?;
        orchestrator.wait_idle().await;
    }

    let elapsed = start_time.elapsed();
    info!(
        ?elapsed,
        secs = elapsed.as_secs(),
        millis = elapsed.subsec_millis(),
        "Execution complete"
    );

    Ok(())
}
