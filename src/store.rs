//! The record store boundary.
//!
//! The orchestrator depends only on the narrow [`RecordStore`] contract:
//! URL lookup, an upcoming-events window, create, and update. Everything
//! else about storage (querying, pagination, serving) lives with other
//! collaborators.
//!
//! Two implementations ship here: [`MemoryStore`] for tests and dry runs,
//! and [`JsonFileStore`], a single-file store that makes the binary useful
//! end-to-end without external services.

use std::path::{Path, PathBuf};

use async_trait::async_trait;
use chrono::Utc;
use tokio::fs;
use tokio::sync::RwLock;
use tracing::{debug, info, instrument};
use uuid::Uuid;

use crate::error::StoreResult;
use crate::models::{CandidateRecord, PersistedRecord};

/// Narrow persistence contract the ingestion pipeline writes through.
#[async_trait]
pub trait RecordStore: Send + Sync {
    /// Find a record whose canonical website URL matches exactly.
    async fn find_by_canonical_url(&self, url: &str) -> StoreResult<Option<PersistedRecord>>;

    /// Up to `limit` records starting now or later, soonest first.
    async fn find_upcoming(&self, limit: usize) -> StoreResult<Vec<PersistedRecord>>;

    /// Persist a new record, assigning its stable identifier.
    async fn create(&self, candidate: CandidateRecord) -> StoreResult<PersistedRecord>;

    /// Replace the event fields of an existing record. Returns `None` when
    /// no record has this id. The id and `created_at` never change.
    async fn update(
        &self,
        id: Uuid,
        fields: CandidateRecord,
    ) -> StoreResult<Option<PersistedRecord>>;
}

fn by_url(records: &[PersistedRecord], url: &str) -> Option<PersistedRecord> {
    records
        .iter()
        .find(|r| r.record.website_url.as_deref() == Some(url))
        .cloned()
}

fn upcoming_of(records: &[PersistedRecord], limit: usize) -> Vec<PersistedRecord> {
    let now = Utc::now();
    let mut upcoming: Vec<_> = records
        .iter()
        .filter(|r| r.record.starts_at >= now)
        .cloned()
        .collect();
    upcoming.sort_by_key(|r| r.record.starts_at);
    upcoming.truncate(limit);
    upcoming
}

fn apply_create(records: &mut Vec<PersistedRecord>, candidate: CandidateRecord) -> PersistedRecord {
    let now = Utc::now();
    let persisted = PersistedRecord {
        id: Uuid::new_v4(),
        created_at: now,
        updated_at: now,
        record: candidate,
    };
    records.push(persisted.clone());
    persisted
}

fn apply_update(
    records: &mut [PersistedRecord],
    id: Uuid,
    fields: CandidateRecord,
) -> Option<PersistedRecord> {
    let existing = records.iter_mut().find(|r| r.id == id)?;
    existing.record = fields;
    existing.updated_at = Utc::now();
    Some(existing.clone())
}

/// In-memory store. Used by tests and as the `--dry-run` backend.
#[derive(Default)]
pub struct MemoryStore {
    records: RwLock<Vec<PersistedRecord>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Total number of stored records.
    pub async fn len(&self) -> usize {
        self.records.read().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.records.read().await.is_empty()
    }
}

#[async_trait]
impl RecordStore for MemoryStore {
    async fn find_by_canonical_url(&self, url: &str) -> StoreResult<Option<PersistedRecord>> {
        Ok(by_url(&self.records.read().await, url))
    }

    async fn find_upcoming(&self, limit: usize) -> StoreResult<Vec<PersistedRecord>> {
        Ok(upcoming_of(&self.records.read().await, limit))
    }

    async fn create(&self, candidate: CandidateRecord) -> StoreResult<PersistedRecord> {
        Ok(apply_create(&mut *self.records.write().await, candidate))
    }

    async fn update(
        &self,
        id: Uuid,
        fields: CandidateRecord,
    ) -> StoreResult<Option<PersistedRecord>> {
        Ok(apply_update(&mut *self.records.write().await, id, fields))
    }
}

/// Single-file JSON store: loaded once on open, rewritten after every
/// mutation. Good enough for one process at this scale; the trait keeps a
/// real database swappable in later.
pub struct JsonFileStore {
    path: PathBuf,
    records: RwLock<Vec<PersistedRecord>>,
}

impl JsonFileStore {
    /// Open the store at `path`, creating an empty one if the file does
    /// not exist yet.
    #[instrument(level = "info", skip_all, fields(path = %path.as_ref().display()))]
    pub async fn open(path: impl AsRef<Path>) -> StoreResult<Self> {
        let path = path.as_ref().to_path_buf();
        let records = match fs::read_to_string(&path).await {
            Ok(text) => serde_json::from_str(&text)?,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                debug!("No existing store file; starting empty");
                Vec::new()
            }
            Err(e) => return Err(e.into()),
        };
        info!(records = records.len(), "Record store opened");
        Ok(Self {
            path,
            records: RwLock::new(records),
        })
    }

    async fn persist(&self, records: &[PersistedRecord]) -> StoreResult<()> {
        if let Some(parent) = self.path.parent() {
            if !parent.as_os_str().is_empty() {
                fs::create_dir_all(parent).await?;
            }
        }
        let json = serde_json::to_string_pretty(records)?;
        fs::write(&self.path, json).await?;
        Ok(())
    }
}

#[async_trait]
impl RecordStore for JsonFileStore {
    async fn find_by_canonical_url(&self, url: &str) -> StoreResult<Option<PersistedRecord>> {
        Ok(by_url(&self.records.read().await, url))
    }

    async fn find_upcoming(&self, limit: usize) -> StoreResult<Vec<PersistedRecord>> {
        Ok(upcoming_of(&self.records.read().await, limit))
    }

    async fn create(&self, candidate: CandidateRecord) -> StoreResult<PersistedRecord> {
        let mut records = self.records.write().await;
        let persisted = apply_create(&mut records, candidate);
        self.persist(&records).await?;
        Ok(persisted)
    }

    async fn update(
        &self,
        id: Uuid,
        fields: CandidateRecord,
    ) -> StoreResult<Option<PersistedRecord>> {
        let mut records = self.records.write().await;
        let updated = apply_update(&mut records, id, fields);
        if updated.is_some() {
            self.persist(&records).await?;
        }
        Ok(updated)
    }
}
