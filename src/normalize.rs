//! Shared normalization helpers used by every source adapter.
//!
//! This module turns the messy free-text the listing sites publish into the
//! canonical record shape:
//! - Date-text parsing for the range formats seen in the wild
//! - Location cleanup and online/offline classification
//! - Canonical URL normalization (tracking params, `www.`, fragments)
//! - Small text utilities for scraped fragments and log output
//!
//! All helpers are pure functions so each adapter's extraction strategies
//! can be tested against fixture text without any network.

use chrono::{DateTime, Datelike, Duration, NaiveDate, NaiveTime, Utc};
use once_cell::sync::Lazy;
use regex::Regex;
use url::Url;

/// Keywords that classify a location string as an online event.
pub const ONLINE_KEYWORDS: &[&str] = &[
    "online",
    "virtual",
    "remote",
    "digital",
    "worldwide",
    "global",
    "web",
    "internet",
    "everywhere",
];

/// Query parameters stripped during URL canonicalization.
const TRACKING_PARAMS: &[&str] = &["ref", "fbclid", "gclid", "mc_cid", "mc_eid", "source"];

// "2024-10-15 to 2024-10-17", also accepts a bare dash as the separator.
static ISO_RANGE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"(\d{4})-(\d{2})-(\d{2})\s*(?:to|through|[-–—])\s*(\d{4})-(\d{2})-(\d{2})")
        .expect("valid regex")
});

// "Oct 30 - Nov 2, 2025", "May 5, 2025 - May 7, 2025", "May 5 - May 7".
static CROSS_MONTH_RANGE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(
        r"(?i)\b([a-z]{3,9})\.?\s+(\d{1,2})(?:st|nd|rd|th)?(?:,\s*(\d{4}))?\s*[-–—]\s*([a-z]{3,9})\.?\s+(\d{1,2})(?:st|nd|rd|th)?(?:,?\s*(\d{4}))?",
    )
    .expect("valid regex")
});

// "Oct 15 - 17, 2024", "Oct 15-17".
static SAME_MONTH_RANGE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(
        r"(?i)\b([a-z]{3,9})\.?\s+(\d{1,2})(?:st|nd|rd|th)?\s*[-–—]\s*(\d{1,2})(?:st|nd|rd|th)?(?:,?\s*(\d{4}))?",
    )
    .expect("valid regex")
});

static SINGLE_ISO: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(\d{4})-(\d{2})-(\d{2})").expect("valid regex"));

// "Oct 15, 2024", "October 15".
static SINGLE_DATE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"(?i)\b([a-z]{3,9})\.?\s+(\d{1,2})(?:st|nd|rd|th)?(?:,?\s*(\d{4}))?")
        .expect("valid regex")
});

/// Resolve an English month name or abbreviation to its number.
fn month_num(name: &str) -> Option<u32> {
    let lower = name.to_lowercase();
    let prefix = lower.get(..3)?;
    match prefix {
        "jan" => Some(1),
        "feb" => Some(2),
        "mar" => Some(3),
        "apr" => Some(4),
        "may" => Some(5),
        "jun" => Some(6),
        "jul" => Some(7),
        "aug" => Some(8),
        "sep" => Some(9),
        "oct" => Some(10),
        "nov" => Some(11),
        "dec" => Some(12),
        _ => None,
    }
}

fn midnight_utc(date: NaiveDate) -> DateTime<Utc> {
    date.and_time(NaiveTime::MIN).and_utc()
}

/// Parse raw date text into a start/end timestamp pair.
///
/// Recognized shapes, tried in order:
/// 1. `YYYY-MM-DD to YYYY-MM-DD`
/// 2. `Mon D[, YYYY] - Mon D[, YYYY]` (distinct months)
/// 3. `Mon D-D[, YYYY]` (shared month)
/// 4. A single date, ISO or `Mon D[, YYYY]`, yielding a one-day window
///
/// A missing year defaults to `today`'s year; a range that wraps the year
/// boundary ("Dec 30 - Jan 2") rolls the end into the following year.
/// Returns `None` when no shape matches, so the caller can decide whether
/// to synthesize a placeholder window.
pub fn parse_date_range(
    raw: &str,
    today: NaiveDate,
) -> Option<(DateTime<Utc>, DateTime<Utc>)> {
    let text = clean_text(raw);
    if text.is_empty() {
        return None;
    }

    if let Some(caps) = ISO_RANGE.captures(&text) {
        let start = ymd_from_captures(&caps, 1)?;
        let end = ymd_from_captures(&caps, 4)?;
        if end > start {
            return Some((midnight_utc(start), midnight_utc(end)));
        }
        return None;
    }

    for caps in CROSS_MONTH_RANGE.captures_iter(&text) {
        if let Some(range) = cross_month_range(&caps, today) {
            return Some(range);
        }
    }

    for caps in SAME_MONTH_RANGE.captures_iter(&text) {
        let Some(month) = month_num(&caps[1]) else {
            continue;
        };
        let (Ok(start_day), Ok(end_day)) = (caps[2].parse::<u32>(), caps[3].parse::<u32>())
        else {
            continue;
        };
        let year = caps
            .get(4)
            .and_then(|y| y.as_str().parse().ok())
            .unwrap_or(today.year());
        if let (Some(start), Some(end)) = (
            NaiveDate::from_ymd_opt(year, month, start_day),
            NaiveDate::from_ymd_opt(year, month, end_day),
        ) {
            if end > start {
                return Some((midnight_utc(start), midnight_utc(end)));
            }
        }
    }

    if let Some(caps) = SINGLE_ISO.captures(&text) {
        let start = ymd_from_captures(&caps, 1)?;
        return Some((midnight_utc(start), midnight_utc(start + Duration::days(1))));
    }

    for caps in SINGLE_DATE.captures_iter(&text) {
        let Some(month) = month_num(&caps[1]) else {
            continue;
        };
        let Ok(day) = caps[2].parse::<u32>() else {
            continue;
        };
        let year = caps
            .get(3)
            .and_then(|y| y.as_str().parse().ok())
            .unwrap_or(today.year());
        if let Some(start) = NaiveDate::from_ymd_opt(year, month, day) {
            return Some((midnight_utc(start), midnight_utc(start + Duration::days(1))));
        }
    }

    None
}

fn ymd_from_captures(caps: &regex::Captures<'_>, first: usize) -> Option<NaiveDate> {
    let year: i32 = caps[first].parse().ok()?;
    let month: u32 = caps[first + 1].parse().ok()?;
    let day: u32 = caps[first + 2].parse().ok()?;
    NaiveDate::from_ymd_opt(year, month, day)
}

fn cross_month_range(
    caps: &regex::Captures<'_>,
    today: NaiveDate,
) -> Option<(DateTime<Utc>, DateTime<Utc>)> {
    let start_month = month_num(&caps[1])?;
    let start_day: u32 = caps[2].parse().ok()?;
    let start_year: Option<i32> = caps.get(3).and_then(|y| y.as_str().parse().ok());
    let end_month = month_num(&caps[4])?;
    let end_day: u32 = caps[5].parse().ok()?;
    let end_year: Option<i32> = caps.get(6).and_then(|y| y.as_str().parse().ok());

    // "Oct 30 - Nov 2, 2025" carries the year on the right only.
    let ey = end_year.or(start_year).unwrap_or(today.year());
    let sy = start_year.unwrap_or(ey);

    let mut start = NaiveDate::from_ymd_opt(sy, start_month, start_day)?;
    let mut end = NaiveDate::from_ymd_opt(ey, end_month, end_day)?;

    // Ranges that wrap the year boundary: "Dec 30 - Jan 2".
    if end <= start {
        if start_year.is_none() && end_year.is_some() {
            start = NaiveDate::from_ymd_opt(ey - 1, start_month, start_day)?;
        } else if end_year.is_none() {
            end = NaiveDate::from_ymd_opt(sy + 1, end_month, end_day)?;
        }
    }
    if end <= start {
        return None;
    }
    Some((midnight_utc(start), midnight_utc(end)))
}

/// Last-resort window for records whose date text never parsed: now
/// through now + 30 days. Callers must flag the record as synthesized.
pub fn placeholder_window(now: DateTime<Utc>) -> (DateTime<Utc>, DateTime<Utc>) {
    (now, now + Duration::days(30))
}

/// Collapse runs of whitespace (including newlines) and trim.
pub fn clean_text(s: &str) -> String {
    s.split_whitespace().collect::<Vec<_>>().join(" ")
}

/// Lowercased, whitespace-collapsed form used for similarity comparison
/// and fingerprinting.
pub fn normalize_key(s: &str) -> String {
    clean_text(s).to_lowercase()
}

/// Whether a location string names an online/virtual event.
pub fn is_online_location(s: &str) -> bool {
    let lower = s.to_lowercase();
    ONLINE_KEYWORDS.iter().any(|k| lower.contains(k))
}

/// Clean a raw location string and classify it. An absent or empty
/// location defaults to `("Online", true)`.
pub fn normalize_location(raw: Option<&str>) -> (String, bool) {
    match raw.map(clean_text) {
        Some(cleaned) if !cleaned.is_empty() => {
            let online = is_online_location(&cleaned);
            (cleaned, online)
        }
        _ => ("Online".to_string(), true),
    }
}

/// Normalize a URL into its canonical form: lowercase host with `www.`
/// stripped, no fragment, no tracking query parameters, no trailing slash.
/// Returns `None` for non-HTTP(S) or unparseable input.
pub fn canonicalize_url(raw: &str) -> Option<String> {
    let parsed = Url::parse(raw.trim()).ok()?;
    if parsed.scheme() != "http" && parsed.scheme() != "https" {
        return None;
    }
    let host = parsed.host_str()?;
    let host = host.strip_prefix("www.").unwrap_or(host);

    let mut kept = url::form_urlencoded::Serializer::new(String::new());
    let mut any = false;
    for (key, value) in parsed.query_pairs() {
        let k = key.to_lowercase();
        if k.starts_with("utm_") || k.starts_with("ref_") || TRACKING_PARAMS.contains(&k.as_str()) {
            continue;
        }
        kept.append_pair(&key, &value);
        any = true;
    }
    let query = if any {
        format!("?{}", kept.finish())
    } else {
        String::new()
    };

    let port = match parsed.port() {
        Some(p) => format!(":{p}"),
        None => String::new(),
    };
    let path = parsed.path().trim_end_matches('/');

    Some(format!(
        "{}://{}{}{}{}",
        parsed.scheme(),
        host,
        port,
        path,
        query
    ))
}

/// Truncate a string for logging purposes, appending the clipped byte count.
pub fn truncate_for_log(s: &str, max: usize) -> String {
    if s.chars().count() <= max {
        return s.to_string();
    }
    let clipped: String = s.chars().take(max).collect();
    format!("{}…(+{} bytes)", clipped, s.len() - clipped.len())
}
