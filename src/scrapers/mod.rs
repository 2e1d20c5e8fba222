//! Source adapters for the hackathon listing sites we crawl.
//!
//! Each submodule owns one origin site and everything specific to its
//! markup. Adapters implement [`SourceAdapter`] and share the helpers in
//! this module for the work every source needs: structured-data
//! extraction, link harvesting, and turning a loosely parsed
//! [`RawEvent`] into a validated [`CandidateRecord`].
//!
//! # Supported Sources
//!
//! | Source | Module | Primary strategy | Fallbacks |
//! |--------|--------|------------------|-----------|
//! | Devpost | [`devpost`] | JSON API | embedded JSON-LD, tile markup, link harvest |
//! | Major League Hacking | [`mlh`] | event-card markup | link harvest |
//! | HackerEarth | [`hackerearth`] | JSON-LD | challenge-card markup, link harvest |
//!
//! # Tiered Fallback Parsing
//!
//! Listing markup drifts constantly, so every adapter tries an ordered
//! sequence of extraction strategies and stops at the first one yielding
//! at least one plausible record. Each strategy is a pure function
//! (HTML/JSON in, raw events out) so it can be tested against fixture
//! text in isolation. A parse failure on one listing item is logged and
//! skipped; it never aborts the adapter's whole run.

use async_trait::async_trait;
use chrono::{DateTime, Duration, Utc};
use itertools::Itertools;
use scraper::{Html, Selector};
use serde_json::Value;
use tracing::warn;
use url::Url;

use crate::error::{IngestError, ValidationError};
use crate::fetcher::Fetcher;
use crate::models::{CandidateRecord, Source};
use crate::normalize::{
    canonicalize_url, clean_text, normalize_location, parse_date_range, placeholder_window,
};

pub mod devpost;
pub mod hackerearth;
pub mod mlh;

/// Contract every origin site implements.
#[async_trait]
pub trait SourceAdapter: Send + Sync {
    /// Stable source tag for this adapter.
    fn source(&self) -> Source;

    /// Human-readable site name.
    fn name(&self) -> &'static str {
        self.source().name()
    }

    /// Root URL of the origin site; robots.txt is resolved against it.
    fn base_url(&self) -> &'static str;

    /// Paths this adapter intends to crawl. Input to the politeness
    /// check, which must pass before the first content fetch.
    fn required_paths(&self) -> Vec<String>;

    /// Crawl the source and return validated candidate records.
    async fn scrape(&self, fetcher: &Fetcher) -> Result<Vec<CandidateRecord>, IngestError>;
}

/// A loosely extracted event, straight out of one parsing strategy.
/// [`build_candidate`] normalizes and validates it.
#[derive(Debug, Default, Clone)]
pub struct RawEvent {
    pub title: String,
    /// Raw date text in whatever shape the source printed.
    pub date_text: Option<String>,
    /// Already-resolved timestamps, when the source provides structured
    /// dates. Takes precedence over `date_text`.
    pub starts_at: Option<DateTime<Utc>>,
    pub ends_at: Option<DateTime<Utc>>,
    pub location_text: Option<String>,
    pub description: Option<String>,
    pub url: Option<String>,
    pub registration_url: Option<String>,
    pub registration_deadline: Option<DateTime<Utc>>,
}

/// Normalize a [`RawEvent`] into a validated [`CandidateRecord`].
///
/// Dates resolve in order: structured timestamps, then parsed date text,
/// then a flagged placeholder window as a last resort. The returned
/// record has already passed the required-field and temporal checks.
pub fn build_candidate(raw: RawEvent, source: Source) -> Result<CandidateRecord, ValidationError> {
    let title = clean_text(&raw.title);

    let (starts_at, ends_at, synthesized) = match (raw.starts_at, raw.ends_at) {
        (Some(start), Some(end)) => (start, end, false),
        (Some(start), None) => (start, start + Duration::days(1), false),
        _ => {
            let parsed = raw
                .date_text
                .as_deref()
                .and_then(|text| parse_date_range(text, Utc::now().date_naive()));
            match parsed {
                Some((start, end)) => (start, end, false),
                None => {
                    warn!(
                        %source,
                        title = %title,
                        date_text = raw.date_text.as_deref().unwrap_or(""),
                        "No parseable date range; synthesizing placeholder window"
                    );
                    let (start, end) = placeholder_window(Utc::now());
                    (start, end, true)
                }
            }
        }
    };

    let (location, is_online) = normalize_location(raw.location_text.as_deref());

    let candidate = CandidateRecord {
        title,
        description: raw
            .description
            .map(|d| clean_text(&d))
            .filter(|d| !d.is_empty()),
        starts_at,
        ends_at,
        registration_deadline: raw.registration_deadline,
        location,
        is_online,
        website_url: raw.url.as_deref().and_then(canonicalize_url),
        registration_url: raw.registration_url.as_deref().and_then(canonicalize_url),
        source,
        dates_synthesized: synthesized,
    };
    candidate.validate()?;
    Ok(candidate)
}

/// Run every raw event through [`build_candidate`], logging and skipping
/// the ones that fail validation.
pub fn finalize_candidates(raws: Vec<RawEvent>, source: Source) -> Vec<CandidateRecord> {
    let mut candidates = Vec::with_capacity(raws.len());
    for raw in raws {
        match build_candidate(raw, source) {
            Ok(candidate) => candidates.push(candidate),
            Err(e) => warn!(%source, error = %e, "Skipping invalid candidate"),
        }
    }
    candidates
}

/// Pull every JSON-LD `Event` object out of a page's
/// `<script type="application/ld+json">` blocks, including ones nested
/// in arrays or `@graph` wrappers.
pub fn jsonld_events(html: &str) -> Vec<Value> {
    let document = Html::parse_document(html);
    let selector = Selector::parse(r#"script[type="application/ld+json"]"#)
        .expect("valid selector");

    let mut events = Vec::new();
    for script in document.select(&selector) {
        let text = script.text().collect::<String>();
        if let Ok(value) = serde_json::from_str::<Value>(&text) {
            collect_events(&value, &mut events);
        }
    }
    events
}

fn collect_events(value: &Value, out: &mut Vec<Value>) {
    match value {
        Value::Array(items) => {
            for item in items {
                collect_events(item, out);
            }
        }
        Value::Object(map) => {
            let is_event = match map.get("@type") {
                Some(Value::String(t)) => t == "Event",
                Some(Value::Array(types)) => {
                    types.iter().any(|t| t.as_str() == Some("Event"))
                }
                _ => false,
            };
            if is_event {
                out.push(value.clone());
            }
            if let Some(graph) = map.get("@graph") {
                collect_events(graph, out);
            }
        }
        _ => {}
    }
}

/// Map one JSON-LD `Event` object to a [`RawEvent`].
pub fn event_from_jsonld(value: &Value) -> Option<RawEvent> {
    let title = value.get("name")?.as_str()?.to_string();

    let starts_at = value
        .get("startDate")
        .and_then(Value::as_str)
        .and_then(parse_jsonld_date);
    let ends_at = value
        .get("endDate")
        .and_then(Value::as_str)
        .and_then(parse_jsonld_date);

    let location_text = value.get("location").and_then(jsonld_location);

    Some(RawEvent {
        title,
        starts_at,
        ends_at,
        location_text,
        description: value
            .get("description")
            .and_then(Value::as_str)
            .map(str::to_string),
        url: value.get("url").and_then(Value::as_str).map(str::to_string),
        ..RawEvent::default()
    })
}

fn jsonld_location(location: &Value) -> Option<String> {
    if let Some(s) = location.as_str() {
        return Some(s.to_string());
    }
    let obj = location.as_object()?;
    if obj.get("@type").and_then(Value::as_str) == Some("VirtualLocation") {
        return Some("Online".to_string());
    }
    if let Some(name) = obj.get("name").and_then(Value::as_str) {
        return Some(name.to_string());
    }
    let address = obj.get("address")?;
    if let Some(s) = address.as_str() {
        return Some(s.to_string());
    }
    let parts: Vec<&str> = ["addressLocality", "addressRegion", "addressCountry"]
        .iter()
        .filter_map(|key| address.get(key).and_then(Value::as_str))
        .collect();
    if parts.is_empty() {
        None
    } else {
        Some(parts.join(", "))
    }
}

/// Parse the date formats JSON-LD publishers actually emit: RFC 3339,
/// a naive datetime, or a bare date.
pub fn parse_jsonld_date(s: &str) -> Option<DateTime<Utc>> {
    if let Ok(dt) = DateTime::parse_from_rfc3339(s) {
        return Some(dt.with_timezone(&Utc));
    }
    if let Ok(naive) = chrono::NaiveDateTime::parse_from_str(s, "%Y-%m-%dT%H:%M:%S") {
        return Some(naive.and_utc());
    }
    if let Ok(date) = chrono::NaiveDate::parse_from_str(s, "%Y-%m-%d") {
        return Some(date.and_time(chrono::NaiveTime::MIN).and_utc());
    }
    None
}

/// Generic link harvesting, the last-resort strategy: collect anchors
/// whose resolved URL contains `pattern`, using the anchor text as the
/// event title. Deduplicates and caps the result.
pub fn harvest_links(html: &str, base_url: &str, pattern: &str, cap: usize) -> Vec<RawEvent> {
    let document = Html::parse_document(html);
    let selector = Selector::parse("a[href]").expect("valid selector");
    let base = Url::parse(base_url).ok();

    document
        .select(&selector)
        .filter_map(|anchor| {
            let href = anchor.value().attr("href")?;
            let resolved = if href.starts_with("http://") || href.starts_with("https://") {
                href.to_string()
            } else {
                base.as_ref()?.join(href).ok()?.to_string()
            };
            if !resolved.contains(pattern) {
                return None;
            }
            let title = clean_text(&anchor.text().collect::<String>());
            if title.is_empty() {
                return None;
            }
            Some((resolved, title))
        })
        .unique_by(|(resolved, _)| resolved.clone())
        .take(cap)
        .map(|(resolved, title)| RawEvent {
            title,
            url: Some(resolved),
            ..RawEvent::default()
        })
        .collect()
}
