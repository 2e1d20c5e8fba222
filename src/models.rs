//! Data models for hackathon event records.
//!
//! This module defines the core data structures used throughout the pipeline:
//! - [`Source`]: One tag per registered adapter, with a fixed merge-priority ranking
//! - [`CandidateRecord`]: A freshly scraped, not-yet-persisted event
//! - [`PersistedRecord`]: A stored event with a stable identifier
//!
//! A [`CandidateRecord`] is built once by an adapter, validated, and never
//! mutated afterwards. Identifiers exist only on [`PersistedRecord`]s and are
//! assigned by the record store on first create; adapters never see them.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::error::ValidationError;

/// Maximum accepted title length, in characters.
pub const MAX_TITLE_CHARS: usize = 500;

/// Origin site of a scraped record. One tag per adapter.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Source {
    Devpost,
    Mlh,
    HackerEarth,
}

impl Source {
    /// Stable identifier used in logs and serialized records.
    pub fn id(&self) -> &'static str {
        match self {
            Source::Devpost => "devpost",
            Source::Mlh => "mlh",
            Source::HackerEarth => "hackerearth",
        }
    }

    /// Human-readable name of the origin site.
    pub fn name(&self) -> &'static str {
        match self {
            Source::Devpost => "Devpost",
            Source::Mlh => "Major League Hacking",
            Source::HackerEarth => "HackerEarth",
        }
    }

    /// Fixed merge-priority ranking. Lower wins: when a duplicate group is
    /// merged, the record from the lowest-ranked source becomes the base
    /// record. Process-wide constant, never mutated at runtime.
    pub fn priority(&self) -> u8 {
        match self {
            Source::Devpost => 0,
            Source::Mlh => 1,
            Source::HackerEarth => 2,
        }
    }
}

impl std::fmt::Display for Source {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.id())
    }
}

/// A scraped hackathon event, not yet deduplicated or persisted.
///
/// Adapters produce these fresh on every scrape. All free-text fields have
/// already been through the shared normalization helpers by the time a
/// candidate leaves its adapter.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CandidateRecord {
    /// Event title. Non-empty, at most [`MAX_TITLE_CHARS`] characters.
    pub title: String,
    /// Longer description, when the source provides one.
    pub description: Option<String>,
    /// Event start.
    pub starts_at: DateTime<Utc>,
    /// Event end. Strictly after `starts_at`.
    pub ends_at: DateTime<Utc>,
    /// Registration deadline, when the source publishes one.
    pub registration_deadline: Option<DateTime<Utc>>,
    /// Normalized location string. `"Online"` for virtual events without a
    /// more specific venue.
    pub location: String,
    /// Whether the event is held online.
    pub is_online: bool,
    /// Canonical event page URL (tracking params and `www.` stripped).
    pub website_url: Option<String>,
    /// Canonical registration URL, when distinct from the event page.
    pub registration_url: Option<String>,
    /// Which adapter produced this record.
    pub source: Source,
    /// True when no parseable date range existed and a placeholder window
    /// was substituted. Downstream consumers discount confidence accordingly.
    pub dates_synthesized: bool,
}

impl CandidateRecord {
    /// Required-fields and temporal checks. Run before a candidate leaves
    /// its adapter; a violation is scoped to this one record.
    pub fn validate(&self) -> Result<(), ValidationError> {
        if self.title.trim().is_empty() {
            return Err(ValidationError::MissingField { field: "title" });
        }
        if self.title.chars().count() > MAX_TITLE_CHARS {
            return Err(ValidationError::TitleTooLong {
                len: self.title.chars().count(),
                max: MAX_TITLE_CHARS,
            });
        }
        if self.location.trim().is_empty() {
            return Err(ValidationError::MissingField { field: "location" });
        }
        if self.ends_at <= self.starts_at {
            return Err(ValidationError::TemporalOrder {
                start: self.starts_at,
                end: self.ends_at,
            });
        }
        Ok(())
    }
}

/// A stored event record: candidate fields plus a stable identity.
///
/// Owned exclusively by the orchestrator/store boundary. The `id` is
/// assigned once, on first persistence, and never changes.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PersistedRecord {
    /// Stable identifier, assigned by the store on create.
    pub id: Uuid,
    /// When the record was first persisted.
    pub created_at: DateTime<Utc>,
    /// When the record was last updated.
    pub updated_at: DateTime<Utc>,
    /// The event fields.
    #[serde(flatten)]
    pub record: CandidateRecord,
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn candidate() -> CandidateRecord {
        CandidateRecord {
            title: "AI Hack 2026".to_string(),
            description: Some("48 hours of hacking".to_string()),
            starts_at: Utc.with_ymd_and_hms(2026, 10, 15, 0, 0, 0).unwrap(),
            ends_at: Utc.with_ymd_and_hms(2026, 10, 17, 0, 0, 0).unwrap(),
            registration_deadline: None,
            location: "Online".to_string(),
            is_online: true,
            website_url: Some("https://devpost.com/hackathons/ai-hack".to_string()),
            registration_url: None,
            source: Source::Devpost,
            dates_synthesized: false,
        }
    }

    #[test]
    fn test_valid_candidate_passes() {
        assert!(candidate().validate().is_ok());
    }

    #[test]
    fn test_empty_title_rejected() {
        let mut c = candidate();
        c.title = "   ".to_string();
        assert!(matches!(
            c.validate(),
            Err(ValidationError::MissingField { field: "title" })
        ));
    }

    #[test]
    fn test_oversized_title_rejected() {
        let mut c = candidate();
        c.title = "x".repeat(MAX_TITLE_CHARS + 1);
        assert!(matches!(
            c.validate(),
            Err(ValidationError::TitleTooLong { .. })
        ));
    }

    #[test]
    fn test_empty_location_rejected() {
        let mut c = candidate();
        c.location = String::new();
        assert!(matches!(
            c.validate(),
            Err(ValidationError::MissingField { field: "location" })
        ));
    }

    #[test]
    fn test_end_must_be_strictly_after_start() {
        let mut c = candidate();
        c.ends_at = c.starts_at;
        assert!(matches!(
            c.validate(),
            Err(ValidationError::TemporalOrder { .. })
        ));
    }

    #[test]
    fn test_source_serializes_to_lowercase_tag() {
        assert_eq!(
            serde_json::to_string(&Source::HackerEarth).unwrap(),
            "\"hackerearth\""
        );
        let back: Source = serde_json::from_str("\"mlh\"").unwrap();
        assert_eq!(back, Source::Mlh);
    }

    #[test]
    fn test_source_priority_ranking() {
        assert!(Source::Devpost.priority() < Source::Mlh.priority());
        assert!(Source::Mlh.priority() < Source::HackerEarth.priority());
    }

    #[test]
    fn test_persisted_record_flattens_candidate_fields() {
        let persisted = PersistedRecord {
            id: Uuid::new_v4(),
            created_at: Utc::now(),
            updated_at: Utc::now(),
            record: candidate(),
        };
        let json = serde_json::to_value(&persisted).unwrap();
        assert!(json.get("title").is_some());
        assert!(json.get("id").is_some());
        assert!(json.get("record").is_none());
    }
}
