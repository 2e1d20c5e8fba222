//! Rate-limited HTTP fetching with exponential backoff retry.
//!
//! One [`Fetcher`] is shared by every adapter in a run, so its two gates
//! bound the process's total load on the wider internet regardless of how
//! many sources are registered:
//!
//! - a semaphore capping in-flight requests (default 3)
//! - a minimum inter-request interval (default 1000 ms), serialized
//!   through a single mutex
//!
//! # Retry Strategy
//!
//! A failed attempt (transport error or non-2xx status) backs off for
//! `retry_delay * 2^(attempt-1)`, capped at 30 seconds, plus 0-250 ms of
//! random jitter to avoid thundering-herd re-requests. After the attempt
//! budget is spent the fetch fails with a [`FetchError`] carrying the
//! source, URL, attempt count, and underlying cause.
//!
//! The fetcher also owns the crawl-politeness check: [`Fetcher::check_paths`]
//! retrieves and parses a source's robots.txt before that adapter's first
//! content fetch of a run.

use std::time::{Duration, Instant};

use tokio::sync::{Mutex, Semaphore};
use tokio::time::sleep;
use rand::{rng, Rng};
use tracing::{debug, error, info, instrument, warn};
use url::Url;

use crate::error::{FetchError, PolitenessError};
use crate::models::Source;
use crate::robots::RobotsTxt;

/// Hard ceiling on a single backoff delay.
const MAX_BACKOFF: Duration = Duration::from_secs(30);

/// Knobs for the fetch layer. Global, not per-adapter.
#[derive(Debug, Clone)]
pub struct FetcherConfig {
    /// User-Agent sent with every request. Identifies the crawler and a
    /// contact channel; also the identity the robots.txt check matches.
    pub user_agent: String,
    /// Per-request timeout.
    pub timeout: Duration,
    /// Maximum attempts per URL before a fetch is abandoned.
    pub max_retries: u32,
    /// Base delay for the exponential backoff between attempts.
    pub retry_delay: Duration,
    /// Maximum concurrently in-flight requests.
    pub max_concurrency: usize,
    /// Minimum wall-clock gap between consecutive requests.
    pub min_interval: Duration,
}

impl Default for FetcherConfig {
    fn default() -> Self {
        Self {
            user_agent: "hackathon-radar/0.1 (+mailto:crawler@awfulsec.com)".to_string(),
            timeout: Duration::from_secs(15),
            max_retries: 3,
            retry_delay: Duration::from_secs(1),
            max_concurrency: 3,
            min_interval: Duration::from_millis(1000),
        }
    }
}

/// Shared HTTP layer. Owned by the orchestrator, passed by reference to
/// adapters; there is no ambient/global scheduling state.
pub struct Fetcher {
    client: reqwest::Client,
    config: FetcherConfig,
    semaphore: Semaphore,
    last_request: Mutex<Option<Instant>>,
}

impl Fetcher {
    pub fn new(config: FetcherConfig) -> Result<Self, reqwest::Error> {
        let client = reqwest::Client::builder()
            .user_agent(config.user_agent.clone())
            .timeout(config.timeout)
            .build()?;
        info!(
            max_concurrency = config.max_concurrency,
            min_interval_ms = config.min_interval.as_millis() as u64,
            timeout_secs = config.timeout.as_secs(),
            "Fetcher initialized"
        );
        Ok(Self {
            semaphore: Semaphore::new(config.max_concurrency),
            last_request: Mutex::new(None),
            client,
            config,
        })
    }

    /// Fetch a URL's body text, retrying with exponential backoff.
    #[instrument(level = "debug", skip_all, fields(%source, %url))]
    pub async fn fetch(&self, source: Source, url: &str) -> Result<String, FetchError> {
        let _permit = self.semaphore.acquire().await.map_err(|e| {
            FetchError::Exhausted {
                source,
                url: url.to_string(),
                attempts: 0,
                cause: Box::new(e),
            }
        })?;

        let total_t0 = Instant::now();
        let mut attempt = 0u32;
        loop {
            attempt += 1;
            self.pace().await;

            match self.try_fetch(url).await {
                Ok(body) => {
                    debug!(
                        attempt,
                        bytes = body.len(),
                        elapsed_ms = total_t0.elapsed().as_millis() as u64,
                        "Fetched successfully"
                    );
                    return Ok(body);
                }
                Err(e) => {
                    if attempt >= self.config.max_retries {
                        error!(
                            attempt,
                            max = self.config.max_retries,
                            elapsed_ms = total_t0.elapsed().as_millis() as u64,
                            error = %e,
                            "Fetch exhausted retries"
                        );
                        return Err(FetchError::Exhausted {
                            source,
                            url: url.to_string(),
                            attempts: attempt,
                            cause: Box::new(e),
                        });
                    }
                    let delay = self.backoff_delay(attempt);
                    warn!(
                        attempt,
                        max = self.config.max_retries,
                        ?delay,
                        error = %e,
                        "Fetch attempt failed; backing off"
                    );
                    sleep(delay).await;
                }
            }
        }
    }

    /// Politeness check for one adapter: retrieve the source's robots.txt
    /// and verify every path the adapter intends to crawl. Must pass
    /// before the adapter's first content fetch of a run.
    ///
    /// Politeness is advisory: a missing, unreadable, or unparseable
    /// robots.txt permits everything.
    #[instrument(level = "info", skip_all, fields(%source, %base_url))]
    pub async fn check_paths(
        &self,
        source: Source,
        base_url: &str,
        paths: &[String],
    ) -> Result<(), PolitenessError> {
        let robots_url = match Url::parse(base_url).and_then(|b| b.join("/robots.txt")) {
            Ok(u) => u,
            Err(e) => {
                warn!(error = %e, "Could not build robots.txt URL; permitting");
                return Ok(());
            }
        };

        let Some(body) = self.fetch_once(robots_url.as_str()).await else {
            debug!("No robots.txt; all paths permitted");
            return Ok(());
        };

        let rules = RobotsTxt::parse(&body, &self.config.user_agent);
        for path in paths {
            if !rules.is_allowed(path) {
                return Err(PolitenessError {
                    source_id: source,
                    path: path.clone(),
                });
            }
        }
        info!(paths = paths.len(), "robots.txt permits all required paths");
        Ok(())
    }

    async fn try_fetch(&self, url: &str) -> Result<String, reqwest::Error> {
        self.client
            .get(url)
            .send()
            .await?
            .error_for_status()?
            .text()
            .await
    }

    /// Single rate-limited attempt with no retry; `None` on any failure.
    /// Used for the advisory robots.txt retrieval.
    async fn fetch_once(&self, url: &str) -> Option<String> {
        let _permit = self.semaphore.acquire().await.ok()?;
        self.pace().await;
        match self.try_fetch(url).await {
            Ok(body) => Some(body),
            Err(e) => {
                debug!(%url, error = %e, "robots.txt fetch failed");
                None
            }
        }
    }

    /// Enforce the minimum inter-request interval. The lock is held across
    /// the sleep so concurrent fetches serialize through one gate.
    async fn pace(&self) {
        let mut last = self.last_request.lock().await;
        if let Some(prev) = *last {
            let since = prev.elapsed();
            if since < self.config.min_interval {
                sleep(self.config.min_interval - since).await;
            }
        }
        *last = Some(Instant::now());
    }

    fn backoff_delay(&self, attempt: u32) -> Duration {
        let mut delay = self
            .config
            .retry_delay
            .saturating_mul(1u32 << (attempt - 1).min(16));
        if delay > MAX_BACKOFF {
            delay = MAX_BACKOFF;
        }
        let jitter_ms: u64 = rng().random_range(0..=250);
        delay + Duration::from_millis(jitter_ms)
    }
}
