//! Command-line interface definitions for Hackathon Radar.
//!
//! This module defines the CLI arguments and options using the `clap`
//! crate. Every knob can also be supplied through an environment variable,
//! and everything has a sensible default so `hackathon_radar` runs with no
//! arguments at all.

use clap::Parser;

/// Command-line arguments for the Hackathon Radar crawler.
///
/// # Examples
///
/// ```sh
/// # Run the scheduler with defaults (daily at 03:00)
/// hackathon_radar
///
/// # One immediate ingestion run, then exit
/// hackathon_radar --once
///
/// # Rehearse against an in-memory store
/// hackathon_radar --once --dry-run
/// ```
#[derive(Parser, Debug)]
#[command(author, version, about)]
pub struct Cli {
    /// Path of the JSON record store
    #[arg(short, long, env = "RADAR_STORE_PATH", default_value = "./data/records.json")]
    pub store_path: String,

    /// Cron expression for scheduled ingestion runs (seconds field first)
    #[arg(long, env = "RADAR_CRON", default_value = "0 0 3 * * *")]
    pub cron: String,

    /// Run one ingestion pass immediately and exit
    #[arg(long)]
    pub once: bool,

    /// Use an in-memory store; nothing is written to disk
    #[arg(long)]
    pub dry_run: bool,

    /// User-Agent header identifying the crawler and a contact channel
    #[arg(
        long,
        env = "RADAR_USER_AGENT",
        default_value = "hackathon-radar/0.1 (+mailto:crawler@awfulsec.com)"
    )]
    pub user_agent: String,

    /// Per-request fetch timeout in seconds
    #[arg(long, env = "RADAR_FETCH_TIMEOUT_SECS", default_value_t = 15)]
    pub fetch_timeout_secs: u64,

    /// Maximum fetch attempts per URL
    #[arg(long, env = "RADAR_MAX_RETRIES", default_value_t = 3)]
    pub max_retries: u32,

    /// Base delay between fetch retries, in milliseconds
    #[arg(long, env = "RADAR_RETRY_DELAY_MS", default_value_t = 1000)]
    pub retry_delay_ms: u64,

    /// Maximum concurrently in-flight requests
    #[arg(long, env = "RADAR_MAX_CONCURRENCY", default_value_t = 3)]
    pub max_concurrency: usize,

    /// Minimum gap between consecutive requests, in milliseconds
    #[arg(long, env = "RADAR_MIN_INTERVAL_MS", default_value_t = 1000)]
    pub min_interval_ms: u64,

    /// Similarity score at or above which two records are duplicates
    #[arg(long, env = "RADAR_DEDUP_THRESHOLD", default_value_t = 0.85)]
    pub dedup_threshold: f64,

    /// How many upcoming stored records to deduplicate against
    #[arg(long, env = "RADAR_DEDUP_WINDOW", default_value_t = 50)]
    pub dedup_window: usize,
}
