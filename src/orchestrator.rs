//! Ingestion orchestration: the scheduler and the per-run pipeline.
//!
//! One run walks every registered adapter in registration order: robots
//! politeness check, scrape, then a persistence decision per candidate in
//! the order the adapter returned them. Exactly one run is in flight at a
//! time; a scheduled tick or manual trigger that lands while a run is
//! active is logged and dropped, never queued.
//!
//! Per-candidate decision:
//! 1. A canonical-URL match against the store updates that record in place.
//! 2. Otherwise the candidate is deduplicated against a window of upcoming
//!    stored records; a duplicate group merges into the matched record.
//! 3. Otherwise a new record is created.
//!
//! Every per-record failure is recorded in the owning adapter's error list
//! and processing continues; only store failures abort the run.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Instant;

use chrono::{DateTime, Utc};
use serde::Serialize;
use tokio::sync::Mutex;
use tokio_cron_scheduler::{Job, JobScheduler, JobSchedulerError};
use tracing::{debug, error, info, instrument, warn};
use uuid::Uuid;

use crate::dedup::{find_duplicate_groups, merge_group, DEFAULT_THRESHOLD};
use crate::error::{IngestError, StoreError};
use crate::fetcher::Fetcher;
use crate::models::{CandidateRecord, Source};
use crate::scrapers::SourceAdapter;
use crate::store::RecordStore;

/// Knobs for the deduplication pass.
#[derive(Debug, Clone)]
pub struct OrchestratorConfig {
    /// Similarity score at or above which two records are duplicates.
    pub dedup_threshold: f64,
    /// How many upcoming stored records each candidate is compared
    /// against. Bounded on purpose: it caps the pairwise work per
    /// candidate at the cost of missing duplicates of far-future or
    /// oddly dated records.
    pub dedup_window: usize,
}

impl Default for OrchestratorConfig {
    fn default() -> Self {
        Self {
            dedup_threshold: DEFAULT_THRESHOLD,
            dedup_window: 50,
        }
    }
}

/// What one adapter contributed to a run.
#[derive(Debug, Clone, Serialize)]
pub struct SourceRunSummary {
    pub source: Source,
    /// Candidates the adapter returned.
    pub found: usize,
    /// Candidates that resulted in a create or update.
    pub processed: usize,
    pub created: usize,
    pub updated: usize,
    pub errors: Vec<String>,
    pub duration_ms: u64,
}

impl SourceRunSummary {
    fn new(source: Source) -> Self {
        Self {
            source,
            found: 0,
            processed: 0,
            created: 0,
            updated: 0,
            errors: Vec::new(),
            duration_ms: 0,
        }
    }
}

/// Machine-readable summary of one completed ingestion run.
#[derive(Debug, Clone, Serialize)]
pub struct RunReport {
    pub run_id: Uuid,
    pub started_at: DateTime<Utc>,
    pub finished_at: DateTime<Utc>,
    pub duration_ms: u64,
    pub sources: Vec<SourceRunSummary>,
}

impl RunReport {
    pub fn total_created(&self) -> usize {
        self.sources.iter().map(|s| s.created).sum()
    }

    pub fn total_updated(&self) -> usize {
        self.sources.iter().map(|s| s.updated).sum()
    }

    pub fn total_errors(&self) -> usize {
        self.sources.iter().map(|s| s.errors.len()).sum()
    }
}

enum Outcome {
    Created,
    Updated,
}

/// Drives ingestion runs. Owns the fetcher and the adapter registry;
/// depends on the record store only through its narrow trait.
pub struct Orchestrator {
    fetcher: Fetcher,
    adapters: Vec<Box<dyn SourceAdapter>>,
    store: Arc<dyn RecordStore>,
    config: OrchestratorConfig,
    run_gate: Mutex<()>,
    shutdown: AtomicBool,
}

impl Orchestrator {
    pub fn new(
        fetcher: Fetcher,
        adapters: Vec<Box<dyn SourceAdapter>>,
        store: Arc<dyn RecordStore>,
        config: OrchestratorConfig,
    ) -> Self {
        Self {
            fetcher,
            adapters,
            store,
            config,
            run_gate: Mutex::new(()),
            shutdown: AtomicBool::new(false),
        }
    }

    /// Ask an in-flight run to stop at its next persistence boundary.
    /// Already-written creates and updates are kept; partial runs are
    /// durable partial progress, not transactions.
    pub fn request_shutdown(&self) {
        self.shutdown.store(true, Ordering::SeqCst);
    }

    fn shutting_down(&self) -> bool {
        self.shutdown.load(Ordering::SeqCst)
    }

    /// Resolves once no run is in flight.
    pub async fn wait_idle(&self) {
        let _guard = self.run_gate.lock().await;
    }

    /// Manual or scheduled trigger. Returns `Ok(None)` when a run was
    /// already in flight (the trigger is a no-op, never queued).
    pub async fn trigger(&self) -> Result<Option<RunReport>, IngestError> {
        let Ok(_guard) = self.run_gate.try_lock() else {
            info!("Ingestion run already in flight; skipping trigger");
            return Ok(None);
        };
        Ok(Some(self.run().await?))
    }

    #[instrument(level = "info", skip_all, fields(run_id = tracing::field::Empty))]
    async fn run(&self) -> Result<RunReport, IngestError> {
        let run_id = Uuid::new_v4();
        tracing::Span::current().record("run_id", tracing::field::display(run_id));
        let started_at = Utc::now();
        let t0 = Instant::now();
        info!(adapters = self.adapters.len(), "Ingestion run starting");

        let mut sources = Vec::with_capacity(self.adapters.len());
        for adapter in &self.adapters {
            if self.shutting_down() {
                warn!("Shutdown requested; ending run before next adapter");
                break;
            }
            sources.push(self.run_adapter(adapter.as_ref()).await?);
        }

        let finished_at = Utc::now();
        let report = RunReport {
            run_id,
            started_at,
            finished_at,
            duration_ms: t0.elapsed().as_millis() as u64,
            sources,
        };
        info!(
            created = report.total_created(),
            updated = report.total_updated(),
            errors = report.total_errors(),
            duration_ms = report.duration_ms,
            "Ingestion run complete"
        );
        Ok(report)
    }

    /// One adapter's contribution: politeness check, scrape, persist.
    /// Adapter-scoped failures land in the summary's error list; only
    /// store errors propagate and abort the run.
    async fn run_adapter(
        &self,
        adapter: &dyn SourceAdapter,
    ) -> Result<SourceRunSummary, IngestError> {
        let source = adapter.source();
        let t0 = Instant::now();
        let mut summary = SourceRunSummary::new(source);
        info!(%source, name = adapter.name(), "Scraping source");

        let paths = adapter.required_paths();
        if let Err(e) = self
            .fetcher
            .check_paths(source, adapter.base_url(), &paths)
            .await
        {
            warn!(%source, error = %e, "Politeness check failed; skipping adapter");
            summary.errors.push(e.to_string());
            summary.duration_ms = t0.elapsed().as_millis() as u64;
            return Ok(summary);
        }

        let candidates = match adapter.scrape(&self.fetcher).await {
            Ok(candidates) => candidates,
            Err(e) => {
                error!(%source, error = %e, "Adapter scrape failed");
                summary.errors.push(e.to_string());
                summary.duration_ms = t0.elapsed().as_millis() as u64;
                return Ok(summary);
            }
        };
        summary.found = candidates.len();

        for candidate in candidates {
            if self.shutting_down() {
                warn!(%source, "Shutdown requested; ending run mid-adapter");
                break;
            }
            match self.process_candidate(candidate).await {
                Ok(Outcome::Created) => {
                    summary.created += 1;
                    summary.processed += 1;
                }
                Ok(Outcome::Updated) => {
                    summary.updated += 1;
                    summary.processed += 1;
                }
                // Store failures are the one fatal category.
                Err(IngestError::Store(e)) => return Err(IngestError::Store(e)),
                Err(e) => {
                    warn!(%source, error = %e, "Failed to process candidate");
                    summary.errors.push(e.to_string());
                }
            }
        }

        summary.duration_ms = t0.elapsed().as_millis() as u64;
        info!(
            %source,
            found = summary.found,
            created = summary.created,
            updated = summary.updated,
            errors = summary.errors.len(),
            "Source ingestion finished"
        );
        Ok(summary)
    }

    async fn process_candidate(
        &self,
        candidate: CandidateRecord,
    ) -> Result<Outcome, IngestError> {
        candidate.validate()?;

        // Same listing, seen before: update in place.
        if let Some(url) = candidate.website_url.as_deref() {
            if let Some(existing) = self.store.find_by_canonical_url(url).await? {
                debug!(id = %existing.id, %url, "Canonical URL match; updating in place");
                self.store
                    .update(existing.id, candidate)
                    .await?
                    .ok_or(StoreError::MissingRecord { id: existing.id })?;
                return Ok(Outcome::Updated);
            }
        }

        // The store is re-queried for every candidate so records created
        // earlier in this same run participate in deduplication.
        let window = self.store.find_upcoming(self.config.dedup_window).await?;
        let mut records = Vec::with_capacity(window.len() + 1);
        records.push(candidate.clone());
        records.extend(window.iter().map(|p| p.record.clone()));

        let groups = find_duplicate_groups(&records, self.config.dedup_threshold);
        if let Some(group) = groups.iter().find(|g| g.members.contains(&0)) {
            if let Some(&target_idx) = group.members.iter().find(|&&m| m != 0) {
                let target = &window[target_idx - 1];
                let merged = merge_group(&records, group);
                debug!(
                    id = %target.id,
                    score_threshold = self.config.dedup_threshold,
                    "Duplicate of existing record; merging"
                );
                self.store
                    .update(target.id, merged)
                    .await?
                    .ok_or(StoreError::MissingRecord { id: target.id })?;
                return Ok(Outcome::Updated);
            }
        }

        let persisted = self.store.create(candidate).await?;
        debug!(id = %persisted.id, "Created new record");
        Ok(Outcome::Created)
    }

    /// Register the recurring ingestion job and start the scheduler.
    pub async fn start_schedule(
        self: Arc<Self>,
        cron: &str,
    ) -> Result<JobScheduler, JobSchedulerError> {
        let sched = JobScheduler::new().await?;
        let orchestrator = Arc::clone(&self);
        let job = Job::new_async(cron, move |_uuid, _lock| {
            let orchestrator = Arc::clone(&orchestrator);
            Box::pin(async move {
                match orchestrator.trigger().await {
                    Ok(Some(report)) => info!(
                        created = report.total_created(),
                        updated = report.total_updated(),
                        errors = report.total_errors(),
                        "Scheduled ingestion run finished"
                    ),
                    Ok(None) => {}
                    Err(e) => error!(error = %e, "Scheduled ingestion run failed"),
                }
            })
        })?;
        sched.add(job).await?;
        sched.start().await?;
        Ok(sched)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::fetcher::FetcherConfig;
    use crate::store::MemoryStore;
    use async_trait::async_trait;
    use chrono::Duration;
    use std::time::Duration as StdDuration;
    use tokio::io::{AsyncReadExt, AsyncWriteExt};

    fn candidate(title: &str, days_out: i64, url: Option<&str>) -> CandidateRecord {
        // Fixed timestamps keep similarity's exact-date credit deterministic.
        use chrono::TimeZone;
        let starts = Utc.with_ymd_and_hms(2030, 1, 1, 0, 0, 0).unwrap() + Duration::days(days_out);
        CandidateRecord {
            title: title.to_string(),
            description: None,
            starts_at: starts,
            ends_at: starts + Duration::days(2),
            registration_deadline: None,
            location: "Online".to_string(),
            is_online: true,
            website_url: url.map(str::to_string),
            registration_url: None,
            source: Source::Devpost,
            dates_synthesized: false,
        }
    }

    struct StubAdapter {
        candidates: Vec<CandidateRecord>,
        base_url: &'static str,
        paths: Vec<String>,
        scraped: Arc<AtomicBool>,
    }

    impl StubAdapter {
        fn new(candidates: Vec<CandidateRecord>) -> Self {
            Self {
                candidates,
                // Nothing listens here, so the advisory robots fetch
                // fails fast and permits everything.
                base_url: "http://127.0.0.1:9",
                paths: vec!["/hackathons".to_string()],
                scraped: Arc::new(AtomicBool::new(false)),
            }
        }
    }

    #[async_trait]
    impl SourceAdapter for StubAdapter {
        fn source(&self) -> Source {
            Source::Devpost
        }

        fn base_url(&self) -> &'static str {
            self.base_url
        }

        fn required_paths(&self) -> Vec<String> {
            self.paths.clone()
        }

        async fn scrape(&self, _fetcher: &Fetcher) -> Result<Vec<CandidateRecord>, IngestError> {
            self.scraped.store(true, Ordering::SeqCst);
            Ok(self.candidates.clone())
        }
    }

    fn test_fetcher() -> Fetcher {
        Fetcher::new(FetcherConfig {
            max_retries: 1,
            min_interval: StdDuration::from_millis(0),
            timeout: StdDuration::from_secs(2),
            ..FetcherConfig::default()
        })
        .unwrap()
    }

    fn orchestrator(
        adapters: Vec<Box<dyn SourceAdapter>>,
        store: Arc<dyn RecordStore>,
    ) -> Orchestrator {
        Orchestrator::new(
            test_fetcher(),
            adapters,
            store,
            OrchestratorConfig::default(),
        )
    }

    /// Minimal HTTP responder serving the same body for every request.
    async fn serve(body: &'static str) -> String {
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        tokio::spawn(async move {
            loop {
                let Ok((mut socket, _)) = listener.accept().await else {
                    break;
                };
                let mut buf = [0u8; 2048];
                let _ = socket.read(&mut buf).await;
                let response = format!(
                    "HTTP/1.1 200 OK\r\ncontent-type: text/plain\r\ncontent-length: {}\r\nconnection: close\r\n\r\n{}",
                    body.len(),
                    body
                );
                let _ = socket.write_all(response.as_bytes()).await;
            }
        });
        format!("http://{addr}")
    }

    #[tokio::test]
    async fn test_second_run_is_idempotent() {
        let store = Arc::new(MemoryStore::new());
        let adapter = StubAdapter::new(vec![
            candidate("AI Hack", 10, Some("https://ai-hack.devpost.com")),
            candidate("Web3 Jam", 20, Some("https://web3-jam.devpost.com")),
        ]);
        let orch = orchestrator(vec![Box::new(adapter)], store.clone());

        let first = orch.trigger().await.unwrap().unwrap();
        assert_eq!(first.total_created(), 2);
        assert_eq!(first.total_updated(), 0);

        let second = orch.trigger().await.unwrap().unwrap();
        assert_eq!(second.total_created(), 0);
        assert_eq!(second.total_updated(), 2);
        assert_eq!(store.len().await, 2);
    }

    #[tokio::test]
    async fn test_mixed_batch_counts() {
        // Five candidates: a duplicate pair, one pre-existing by URL,
        // and two fresh records.
        let store = Arc::new(MemoryStore::new());
        store
            .create(candidate(
                "Existing Hack",
                30,
                Some("https://existing.devpost.com"),
            ))
            .await
            .unwrap();

        let adapter = StubAdapter::new(vec![
            candidate("Space Apps Challenge", 10, Some("https://space-a.devpost.com")),
            candidate("Space Apps Challenge", 10, Some("https://space-b.devpost.com")),
            candidate("Existing Hack", 30, Some("https://existing.devpost.com")),
            candidate("Winter Robotics Cup", 40, Some("https://robotics.devpost.com")),
            candidate("Quantum Jam", 50, Some("https://quantum.devpost.com")),
        ]);
        let orch = orchestrator(vec![Box::new(adapter)], store.clone());

        let report = orch.trigger().await.unwrap().unwrap();
        // First copy of the pair creates; the second merges into it.
        assert_eq!(report.total_created(), 3);
        assert_eq!(report.total_updated(), 2);
        assert_eq!(report.total_errors(), 0);
        assert_eq!(store.len().await, 4);
    }

    #[tokio::test]
    async fn test_invalid_candidate_is_recorded_not_fatal() {
        let store = Arc::new(MemoryStore::new());
        let mut bad = candidate("Backwards", 10, None);
        bad.ends_at = bad.starts_at - Duration::days(1);
        let adapter = StubAdapter::new(vec![
            bad,
            candidate("Good Hack", 20, Some("https://good.devpost.com")),
        ]);
        let orch = orchestrator(vec![Box::new(adapter)], store.clone());

        let report = orch.trigger().await.unwrap().unwrap();
        let summary = &report.sources[0];
        assert_eq!(summary.found, 2);
        assert_eq!(summary.processed, 1);
        assert_eq!(summary.created, 1);
        assert_eq!(summary.errors.len(), 1);
    }

    #[tokio::test]
    async fn test_robots_disallow_aborts_adapter_before_any_fetch() {
        let base = serve("User-agent: *\nDisallow: /hackathons\n").await;
        let base: &'static str = Box::leak(base.into_boxed_str());

        let store = Arc::new(MemoryStore::new());
        let adapter = StubAdapter {
            candidates: vec![candidate("Hidden Hack", 10, None)],
            base_url: base,
            paths: vec!["/hackathons".to_string()],
            scraped: Arc::new(AtomicBool::new(false)),
        };
        let scraped = adapter.scraped.clone();
        let orch = orchestrator(vec![Box::new(adapter)], store.clone());

        let report = orch.trigger().await.unwrap().unwrap();
        let summary = &report.sources[0];
        assert_eq!(summary.found, 0);
        assert_eq!(summary.errors.len(), 1);
        assert!(summary.errors[0].contains("robots.txt"));
        // scrape() must never have been invoked.
        assert!(!scraped.load(Ordering::SeqCst));
        assert!(store.is_empty().await);
    }

    #[tokio::test]
    async fn test_cross_source_duplicate_merges_into_stored_record() {
        let store = Arc::new(MemoryStore::new());
        let orch = {
            let mut first = candidate("AI Hack 2026", 15, Some("https://ai-hack.devpost.com"));
            first.description = Some("short".to_string());
            let mut second = candidate("AI Hackathon 2026", 15, Some("https://mlh.example/ai"));
            second.source = Source::Mlh;
            second.description = Some("a much longer description of the event".to_string());
            let adapter = StubAdapter::new(vec![first, second]);
            orchestrator(vec![Box::new(adapter)], store.clone())
        };

        let report = orch.trigger().await.unwrap().unwrap();
        assert_eq!(report.total_created(), 1);
        assert_eq!(report.total_updated(), 1);

        let stored = store
            .find_upcoming(10)
            .await
            .unwrap();
        assert_eq!(stored.len(), 1);
        // Devpost outranks MLH, so its fields are the base, but the
        // longer description survives the merge.
        assert_eq!(stored[0].record.source, Source::Devpost);
        assert_eq!(stored[0].record.title, "AI Hack 2026");
        assert_eq!(
            stored[0].record.description.as_deref(),
            Some("a much longer description of the event")
        );
    }
}
