//! Devpost hackathon listing adapter.
//!
//! Devpost backs its listing page with a paginated JSON API at
//! `/api/hackathons`, which is the primary extraction strategy. When the
//! API shape drifts, the adapter falls back to the listing page itself:
//! embedded JSON-LD first, then the hackathon tile markup, then generic
//! link harvesting.
//!
//! # URL Pattern
//!
//! Each hackathon lives on its own subdomain like
//! `https://my-hack.devpost.com/`, linked from the listing and carried in
//! the API's `url` field.

use async_trait::async_trait;
use futures::stream::{self, StreamExt};
use scraper::{Html, Selector};
use serde_json::Value;
use tracing::{debug, info, instrument, warn};
use url::Url;

use crate::error::IngestError;
use crate::fetcher::Fetcher;
use crate::models::{CandidateRecord, Source};
use crate::normalize::{clean_text, truncate_for_log};
use crate::scrapers::{
    event_from_jsonld, finalize_candidates, harvest_links, jsonld_events, RawEvent,
    SourceAdapter,
};

const BASE_URL: &str = "https://devpost.com";
const API_PATH: &str = "/api/hackathons";
const LISTING_PATH: &str = "/hackathons";
/// How many API pages to walk per run.
const API_PAGES: u32 = 2;
const HARVEST_CAP: usize = 20;

pub struct DevpostAdapter;

#[async_trait]
impl SourceAdapter for DevpostAdapter {
    fn source(&self) -> Source {
        Source::Devpost
    }

    fn base_url(&self) -> &'static str {
        BASE_URL
    }

    fn required_paths(&self) -> Vec<String> {
        vec![API_PATH.to_string(), LISTING_PATH.to_string()]
    }

    #[instrument(level = "info", skip_all)]
    async fn scrape(&self, fetcher: &Fetcher) -> Result<Vec<CandidateRecord>, IngestError> {
        // Strategy 1: the JSON API behind the listing page.
        let mut raws = Vec::new();
        for page in 1..=API_PAGES {
            let url = format!("{BASE_URL}{API_PATH}?page={page}");
            match fetcher.fetch(self.source(), &url).await {
                Ok(body) => {
                    let page_raws = parse_api_page(&body);
                    debug!(page, count = page_raws.len(), "Parsed Devpost API page");
                    if page_raws.is_empty() {
                        break;
                    }
                    raws.extend(page_raws);
                }
                Err(e) => {
                    // Later pages are optional; losing page 1 drops the
                    // whole strategy.
                    warn!(error = %e, page, "Devpost API page fetch failed");
                    if page == 1 {
                        raws.clear();
                    }
                    break;
                }
            }
        }

        // Strategies 2-4 share the listing page. This is the primary
        // listing fetch: with nothing extracted so far, a failure here
        // aborts the adapter's run.
        if raws.is_empty() {
            let listing_url = format!("{BASE_URL}{LISTING_PATH}");
            let body = fetcher.fetch(self.source(), &listing_url).await?;

            raws = jsonld_events(&body)
                .iter()
                .filter_map(event_from_jsonld)
                .collect();
            if raws.is_empty() {
                raws = parse_listing_tiles(&body);
            }
            if raws.is_empty() {
                warn!("Devpost tile markup yielded nothing; harvesting links");
                raws = harvest_links(&body, BASE_URL, ".devpost.com", HARVEST_CAP);
            }
        }

        info!(count = raws.len(), "Extracted raw Devpost events");
        let raws = enrich_descriptions(fetcher, raws).await;
        let candidates = finalize_candidates(raws, self.source());
        info!(count = candidates.len(), "Devpost scrape complete");
        Ok(candidates)
    }
}

/// One page of the `/api/hackathons` response.
fn parse_api_page(body: &str) -> Vec<RawEvent> {
    let Ok(value) = serde_json::from_str::<Value>(body) else {
        warn!(
            body_preview = %truncate_for_log(body, 200),
            "Devpost API response was not valid JSON"
        );
        return Vec::new();
    };
    let Some(items) = value.get("hackathons").and_then(Value::as_array) else {
        return Vec::new();
    };

    items
        .iter()
        .filter_map(|item| {
            let Some(title) = item.get("title").and_then(Value::as_str) else {
                warn!("Devpost API entry without a title; skipping");
                return None;
            };
            let url = item.get("url").and_then(Value::as_str);
            Some(RawEvent {
                title: title.to_string(),
                date_text: item
                    .get("submission_period_dates")
                    .and_then(Value::as_str)
                    .map(str::to_string),
                location_text: item
                    .pointer("/displayed_location/location")
                    .and_then(Value::as_str)
                    .map(str::to_string),
                description: item
                    .get("tagline")
                    .and_then(Value::as_str)
                    .map(str::to_string),
                // Every Devpost hackathon site serves its signup at /register.
                registration_url: url
                    .and_then(|u| Url::parse(u).ok())
                    .and_then(|u| u.join("register").ok())
                    .map(|u| u.to_string()),
                url: url.map(str::to_string),
                ..RawEvent::default()
            })
        })
        .collect()
}

/// The hackathon tile markup on `/hackathons`.
fn parse_listing_tiles(html: &str) -> Vec<RawEvent> {
    let document = Html::parse_document(html);
    let tile_sel = Selector::parse("div.hackathon-tile").expect("valid selector");
    let anchor_sel = Selector::parse("a.tile-anchor").expect("valid selector");
    let title_sel = Selector::parse("h3.title").expect("valid selector");
    let date_sel = Selector::parse(".submission-period").expect("valid selector");
    let location_sel = Selector::parse(".info-with-icon .info span").expect("valid selector");

    let mut raws = Vec::new();
    for tile in document.select(&tile_sel) {
        let title = tile
            .select(&title_sel)
            .next()
            .map(|e| clean_text(&e.text().collect::<String>()));
        let Some(title) = title.filter(|t| !t.is_empty()) else {
            warn!("Devpost tile without a title; skipping");
            continue;
        };
        raws.push(RawEvent {
            title,
            date_text: tile
                .select(&date_sel)
                .next()
                .map(|e| clean_text(&e.text().collect::<String>())),
            location_text: tile
                .select(&location_sel)
                .next()
                .map(|e| clean_text(&e.text().collect::<String>())),
            url: tile
                .select(&anchor_sel)
                .next()
                .and_then(|a| a.value().attr("href"))
                .map(str::to_string),
            ..RawEvent::default()
        });
    }
    raws
}

/// Fill in missing descriptions from each event's own page. A failed
/// detail fetch keeps the listing-only data; it never drops the event.
async fn enrich_descriptions(fetcher: &Fetcher, raws: Vec<RawEvent>) -> Vec<RawEvent> {
    stream::iter(raws)
        .then(|mut raw| async move {
            if raw.description.is_some() {
                return raw;
            }
            let Some(url) = raw.url.clone() else {
                return raw;
            };
            match fetcher.fetch(Source::Devpost, &url).await {
                Ok(body) => {
                    raw.description = extract_page_description(&body);
                    raw
                }
                Err(e) => {
                    warn!(error = %e, %url, "Detail fetch failed; keeping summary-only data");
                    raw
                }
            }
        })
        .collect()
        .await
}

/// Meta description off an event page.
fn extract_page_description(html: &str) -> Option<String> {
    let document = Html::parse_document(html);
    let meta_sel =
        Selector::parse(r#"meta[name="description"], meta[property="og:description"]"#)
            .expect("valid selector");
    document
        .select(&meta_sel)
        .filter_map(|meta| meta.value().attr("content"))
        .map(clean_text)
        .find(|content| !content.is_empty())
}
