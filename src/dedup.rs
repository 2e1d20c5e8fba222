//! Duplicate detection and merging across sources.
//!
//! The same real-world event routinely shows up on two listing sites with
//! different formatting ("AI Hack 2026" on one, "AI Hackathon 2026" on the
//! other). This module decides which records describe one event and
//! collapses them before the store ever sees a twin.
//!
//! Pipeline per pass: fingerprint equality as a cheap exact-duplicate
//! prefilter, then a weighted pairwise similarity score in [0, 1], then
//! greedy single-pass grouping at a threshold (default 0.85), then a
//! priority-ranked field merge per group.
//!
//! The weights and threshold are tuned heuristics, not derived from a
//! labeled dataset; treat them as knobs.

use chrono::{DateTime, Utc};
use sha2::{Digest, Sha256};
use strsim::normalized_levenshtein;

use crate::models::CandidateRecord;
use crate::normalize::normalize_key;

/// Weight of title edit-distance similarity.
pub const TITLE_WEIGHT: f64 = 0.4;
/// Weight of start-date proximity.
pub const START_WEIGHT: f64 = 0.3;
/// Weight of location edit-distance similarity.
pub const LOCATION_WEIGHT: f64 = 0.2;
/// Weight of the online/offline flag agreement.
pub const ONLINE_WEIGHT: f64 = 0.1;

/// Default similarity threshold above which two records are duplicates.
pub const DEFAULT_THRESHOLD: f64 = 0.85;

/// Start dates within this many days of each other earn half credit.
const START_NEAR_DAYS: i64 = 3;

/// Deterministic hash over a record's semantically meaningful fields.
/// Recomputed on demand, never stored.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct ContentFingerprint(String);

impl ContentFingerprint {
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl std::fmt::Display for ContentFingerprint {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}

/// Fingerprint a record. Returns `None` for malformed records (empty
/// title or location), which are excluded from duplicate detection
/// entirely rather than crashing the pass.
pub fn fingerprint(record: &CandidateRecord) -> Option<ContentFingerprint> {
    let title = normalize_key(&record.title);
    let location = normalize_key(&record.location);
    if title.is_empty() || location.is_empty() {
        return None;
    }
    let mut hasher = Sha256::new();
    hasher.update(title.as_bytes());
    hasher.update(b"\n");
    hasher.update(record.starts_at.to_rfc3339().as_bytes());
    hasher.update(b"\n");
    hasher.update(record.ends_at.to_rfc3339().as_bytes());
    hasher.update(b"\n");
    hasher.update(location.as_bytes());
    hasher.update(b"\n");
    hasher.update(if record.is_online { b"1" } else { b"0" });
    Some(ContentFingerprint(hex::encode(hasher.finalize())))
}

fn start_date_score(a: DateTime<Utc>, b: DateTime<Utc>) -> f64 {
    if a == b {
        1.0
    } else if (a - b).num_days().abs() <= START_NEAR_DAYS {
        0.5
    } else {
        0.0
    }
}

/// Weighted similarity score in [0, 1]. Pure and symmetric.
///
/// Malformed records (empty title or location) never match anything and
/// score 0 against every record. Two online events earn full location
/// credit regardless of the exact wording ("Online" vs "Virtual" describe
/// the same place).
pub fn similarity(a: &CandidateRecord, b: &CandidateRecord) -> f64 {
    let title_a = normalize_key(&a.title);
    let title_b = normalize_key(&b.title);
    let loc_a = normalize_key(&a.location);
    let loc_b = normalize_key(&b.location);
    if title_a.is_empty() || title_b.is_empty() || loc_a.is_empty() || loc_b.is_empty() {
        return 0.0;
    }

    let title_score = normalized_levenshtein(&title_a, &title_b);
    let start_score = start_date_score(a.starts_at, b.starts_at);
    let location_score = if a.is_online && b.is_online {
        1.0
    } else {
        normalized_levenshtein(&loc_a, &loc_b)
    };
    let online_score = if a.is_online == b.is_online { 1.0 } else { 0.0 };

    TITLE_WEIGHT * title_score
        + START_WEIGHT * start_score
        + LOCATION_WEIGHT * location_score
        + ONLINE_WEIGHT * online_score
}

/// A cluster of records judged to describe the same real-world event.
/// Indices point into the slice handed to [`find_duplicate_groups`];
/// the group only lives for one deduplication pass.
#[derive(Debug, Clone)]
pub struct DuplicateGroup {
    /// Index of the record the greedy scan anchored the group on.
    pub primary: usize,
    /// All member indices, `primary` first.
    pub members: Vec<usize>,
}

/// Group duplicate records. Single-pass and greedy: walk the slice in
/// order, skip records already assigned, and collect every later
/// unassigned record scoring at or above `threshold` against the anchor.
/// Equal fingerprints short-circuit the similarity computation.
///
/// Only groups with at least two members are returned; unique records are
/// simply absent.
pub fn find_duplicate_groups(
    records: &[CandidateRecord],
    threshold: f64,
) -> Vec<DuplicateGroup> {
    let fingerprints: Vec<_> = records.iter().map(fingerprint).collect();
    let mut assigned = vec![false; records.len()];
    let mut groups = Vec::new();

    for i in 0..records.len() {
        if assigned[i] {
            continue;
        }
        assigned[i] = true;
        let mut members = vec![i];

        for j in (i + 1)..records.len() {
            if assigned[j] {
                continue;
            }
            let exact = match (&fingerprints[i], &fingerprints[j]) {
                (Some(a), Some(b)) => a == b,
                _ => false,
            };
            if exact || similarity(&records[i], &records[j]) >= threshold {
                assigned[j] = true;
                members.push(j);
            }
        }

        if members.len() > 1 {
            groups.push(DuplicateGroup {
                primary: i,
                members,
            });
        }
    }

    groups
}

/// Merge a duplicate group into one authoritative record.
///
/// The base is the member from the highest-priority source (the fixed
/// source ranking, not the greedy primary). On top of the base: the
/// longest non-empty description in the group, the earliest registration
/// deadline, and any present registration/website URL fills a base gap.
/// Every other field stays the base's.
pub fn merge_group(records: &[CandidateRecord], group: &DuplicateGroup) -> CandidateRecord {
    let base_idx = group
        .members
        .iter()
        .copied()
        .min_by_key(|&i| records[i].source.priority())
        .unwrap_or(group.primary);
    let mut merged = records[base_idx].clone();

    for &i in &group.members {
        let other = &records[i];

        if let Some(desc) = &other.description {
            let longer = match &merged.description {
                Some(current) => desc.chars().count() > current.chars().count(),
                None => !desc.is_empty(),
            };
            if longer && !desc.is_empty() {
                merged.description = Some(desc.clone());
            }
        }

        if let Some(deadline) = other.registration_deadline {
            merged.registration_deadline = Some(match merged.registration_deadline {
                Some(current) => current.min(deadline),
                None => deadline,
            });
        }

        if merged.registration_url.is_none() {
            merged.registration_url = other.registration_url.clone();
        }
        if merged.website_url.is_none() {
            merged.website_url = other.website_url.clone();
        }
    }

    merged
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::Source;
    use chrono::TimeZone;

    fn mk(title: &str, day: u32, location: &str, source: Source) -> CandidateRecord {
        let online = crate::normalize::is_online_location(location);
        CandidateRecord {
            title: title.to_string(),
            description: None,
            starts_at: Utc.with_ymd_and_hms(2024, 10, day, 0, 0, 0).unwrap(),
            ends_at: Utc.with_ymd_and_hms(2024, 10, day + 2, 0, 0, 0).unwrap(),
            registration_deadline: None,
            location: location.to_string(),
            is_online: online,
            website_url: None,
            registration_url: None,
            source,
            dates_synthesized: false,
        }
    }

    #[test]
    fn test_fingerprint_is_deterministic() {
        let r = mk("AI Hack 2024", 15, "Online", Source::Devpost);
        assert_eq!(fingerprint(&r), fingerprint(&r));
    }

    #[test]
    fn test_fingerprint_changes_with_semantic_fields() {
        let base = mk("AI Hack 2024", 15, "Online", Source::Devpost);
        let fp = fingerprint(&base).unwrap();

        let mut other = base.clone();
        other.title = "Web3 Summit".to_string();
        assert_ne!(fp, fingerprint(&other).unwrap());

        let mut other = base.clone();
        other.starts_at = Utc.with_ymd_and_hms(2024, 10, 16, 0, 0, 0).unwrap();
        assert_ne!(fp, fingerprint(&other).unwrap());

        let mut other = base.clone();
        other.location = "Berlin".to_string();
        assert_ne!(fp, fingerprint(&other).unwrap());

        let mut other = base.clone();
        other.is_online = false;
        assert_ne!(fp, fingerprint(&other).unwrap());
    }

    #[test]
    fn test_fingerprint_ignores_case_and_spacing() {
        let a = mk("AI  Hack   2024", 15, "ONLINE", Source::Devpost);
        let b = mk("ai hack 2024", 15, "online", Source::Mlh);
        assert_eq!(fingerprint(&a), fingerprint(&b));
    }

    #[test]
    fn test_malformed_record_has_no_fingerprint() {
        let mut r = mk("AI Hack", 15, "Online", Source::Devpost);
        r.title = "  ".to_string();
        assert!(fingerprint(&r).is_none());
    }

    #[test]
    fn test_similarity_is_symmetric() {
        let a = mk("AI Hack 2024", 15, "Online", Source::Devpost);
        let b = mk("AI Hackathon 2024", 16, "Virtual", Source::Mlh);
        assert_eq!(similarity(&a, &b), similarity(&b, &a));
    }

    #[test]
    fn test_identical_records_score_one() {
        let a = mk("AI Hack 2024", 15, "Online", Source::Devpost);
        let score = similarity(&a, &a.clone());
        assert!((score - 1.0).abs() < 1e-9);
    }

    #[test]
    fn test_cross_source_variants_group_at_default_threshold() {
        // Same event, reformatted by two sources.
        let a = mk("AI Hack 2024", 15, "Online", Source::Devpost);
        let b = mk("AI Hackathon 2024", 15, "Virtual", Source::Mlh);
        assert!(similarity(&a, &b) >= DEFAULT_THRESHOLD);

        let groups = find_duplicate_groups(&[a, b], DEFAULT_THRESHOLD);
        assert_eq!(groups.len(), 1);
        assert_eq!(groups[0].members, vec![0, 1]);
    }

    #[test]
    fn test_unrelated_events_do_not_group() {
        let a = mk("AI Hack 2024", 15, "Online", Source::Devpost);
        let b = mk("Quantum Chemistry Jam", 3, "Berlin, Germany", Source::Mlh);
        assert!(find_duplicate_groups(&[a, b], DEFAULT_THRESHOLD).is_empty());
    }

    #[test]
    fn test_greedy_grouping_collects_all_copies() {
        let a = mk("Space Apps Challenge", 15, "Online", Source::Devpost);
        let b = mk("Space Apps Challenge", 15, "Virtual", Source::Mlh);
        let c = mk("Space Apps Challenge", 15, "Online", Source::HackerEarth);
        let d = mk("Winter Robotics Cup", 1, "Oslo, Norway", Source::Mlh);
        let groups = find_duplicate_groups(&[a, b, c, d], DEFAULT_THRESHOLD);
        assert_eq!(groups.len(), 1);
        assert_eq!(groups[0].primary, 0);
        assert_eq!(groups[0].members, vec![0, 1, 2]);
    }

    #[test]
    fn test_malformed_record_never_groups() {
        let a = mk("AI Hack 2024", 15, "Online", Source::Devpost);
        let mut b = mk("AI Hack 2024", 15, "Online", Source::Mlh);
        b.location = String::new();
        assert_eq!(similarity(&a, &b), 0.0);
        assert!(find_duplicate_groups(&[a, b], DEFAULT_THRESHOLD).is_empty());
    }

    #[test]
    fn test_merge_prefers_higher_priority_source_as_base() {
        // The greedy primary is the HackerEarth record, but Devpost
        // outranks it, so the Devpost record is the surviving base.
        let a = mk("AI Hack 2024", 15, "Online", Source::HackerEarth);
        let b = mk("AI Hackathon 2024", 15, "Virtual", Source::Devpost);
        let records = vec![a, b];
        let groups = find_duplicate_groups(&records, DEFAULT_THRESHOLD);
        assert_eq!(groups[0].primary, 0);
        let merged = merge_group(&records, &groups[0]);
        assert_eq!(merged.source, Source::Devpost);
        assert_eq!(merged.title, "AI Hackathon 2024");
    }

    #[test]
    fn test_merge_takes_longest_description_and_earliest_deadline() {
        let mut a = mk("AI Hack 2024", 15, "Online", Source::Devpost);
        a.description = Some("short".to_string());
        a.registration_deadline = Some(Utc.with_ymd_and_hms(2024, 10, 10, 0, 0, 0).unwrap());
        let mut b = mk("AI Hackathon 2024", 15, "Virtual", Source::Mlh);
        b.description = Some("a much longer description of the event".to_string());
        b.registration_deadline = Some(Utc.with_ymd_and_hms(2024, 10, 5, 0, 0, 0).unwrap());
        b.registration_url = Some("https://mlh.io/register/ai-hackathon".to_string());

        let records = vec![a, b];
        let groups = find_duplicate_groups(&records, DEFAULT_THRESHOLD);
        assert_eq!(groups.len(), 1);
        let merged = merge_group(&records, &groups[0]);

        // Devpost outranks MLH, so its record is the base...
        assert_eq!(merged.source, Source::Devpost);
        assert_eq!(merged.title, "AI Hack 2024");
        // ...but the richer fields win from wherever they came.
        assert_eq!(
            merged.description.as_deref(),
            Some("a much longer description of the event")
        );
        assert_eq!(
            merged.registration_deadline,
            Some(Utc.with_ymd_and_hms(2024, 10, 5, 0, 0, 0).unwrap())
        );
        assert_eq!(
            merged.registration_url.as_deref(),
            Some("https://mlh.io/register/ai-hackathon")
        );
    }

    #[test]
    fn test_exact_fingerprint_match_short_circuits_grouping() {
        let a = mk("Completely Different Wording Somehow", 15, "Online", Source::Devpost);
        let b = mk("completely  different wording SOMEHOW", 15, "online", Source::Mlh);
        // Normalized fields are identical, so the fingerprints match even
        // at an impossible threshold.
        let groups = find_duplicate_groups(&[a, b], 2.0);
        assert_eq!(groups.len(), 1);
    }
}
