//! Typed errors for the ingestion pipeline.
//!
//! The taxonomy mirrors the blast radius of each failure:
//! - [`FetchError`]: one URL on one source, after retries were exhausted
//! - [`ValidationError`]: one candidate record
//! - [`PolitenessError`]: one adapter's whole run, before any content fetch
//! - [`StoreError`]: the record store; always fatal to the current run
//!
//! [`IngestError`] is the umbrella the orchestrator works with.

use chrono::{DateTime, Utc};
use thiserror::Error;
use uuid::Uuid;

use crate::models::Source;

/// Network/transport failure after the retry budget was spent.
#[derive(Debug, Error)]
pub enum FetchError {
    /// Every attempt at this URL failed.
    #[error("{source} fetch of {url} failed after {attempts} attempts: {cause}")]
    Exhausted {
        source: Source,
        url: String,
        attempts: u32,
        #[source]
        cause: Box<dyn std::error::Error + Send + Sync>,
    },
}

/// A candidate record failed the required-field or temporal checks.
#[derive(Debug, Error)]
pub enum ValidationError {
    #[error("missing required field `{field}`")]
    MissingField { field: &'static str },

    #[error("title is {len} characters, maximum is {max}")]
    TitleTooLong { len: usize, max: usize },

    #[error("end {end} is not strictly after start {start}")]
    TemporalOrder {
        start: DateTime<Utc>,
        end: DateTime<Utc>,
    },
}

/// robots.txt forbids a path the adapter needs. Raised before any content
/// fetch; aborts that adapter's contribution to the run.
#[derive(Debug, Error)]
#[error("robots.txt for {source_id} disallows required path {path}")]
pub struct PolitenessError {
    pub source_id: Source,
    pub path: String,
}

/// Record store failure. The one fatal category: persistence errors are
/// never caught-and-ignored because they risk applying decisions against
/// an inconsistent store.
#[derive(Debug, Error)]
pub enum StoreError {
    #[error("store I/O failed: {0}")]
    Io(#[from] std::io::Error),

    #[error("store (de)serialization failed: {0}")]
    Serde(#[from] serde_json::Error),

    #[error("no record with id {id}")]
    MissingRecord { id: Uuid },
}

/// Umbrella error for one ingestion run.
#[derive(Debug, Error)]
pub enum IngestError {
    #[error(transparent)]
    Fetch(#[from] FetchError),

    #[error(transparent)]
    Validation(#[from] ValidationError),

    #[error(transparent)]
    Politeness(#[from] PolitenessError),

    #[error(transparent)]
    Store(#[from] StoreError),
}

/// Result alias for store operations.
pub type StoreResult<T> = std::result::Result<T, StoreError>;
