//! Major League Hacking season-calendar adapter.
//!
//! MLH publishes one calendar page per season with a card per event.
//! The cards are the primary strategy; when that markup drifts, the
//! adapter degrades to generic link harvesting over the same page.
//!
//! Event links point at each hackathon's own site, not at mlh.io, so the
//! harvested URL is the event's canonical home either way.

use async_trait::async_trait;
use scraper::{Html, Selector};
use tracing::{info, instrument, warn};

use crate::error::IngestError;
use crate::fetcher::Fetcher;
use crate::models::{CandidateRecord, Source};
use crate::normalize::clean_text;
use crate::scrapers::{finalize_candidates, harvest_links, RawEvent, SourceAdapter};

const BASE_URL: &str = "https://mlh.io";
/// Season whose calendar we crawl.
const SEASON: &str = "2026";
const HARVEST_CAP: usize = 20;

pub struct MlhAdapter;

fn listing_path() -> String {
    format!("/seasons/{SEASON}/events")
}

#[async_trait]
impl SourceAdapter for MlhAdapter {
    fn source(&self) -> Source {
        Source::Mlh
    }

    fn base_url(&self) -> &'static str {
        BASE_URL
    }

    fn required_paths(&self) -> Vec<String> {
        vec![listing_path()]
    }

    #[instrument(level = "info", skip_all)]
    async fn scrape(&self, fetcher: &Fetcher) -> Result<Vec<CandidateRecord>, IngestError> {
        let listing_url = format!("{BASE_URL}{}", listing_path());
        let body = fetcher.fetch(self.source(), &listing_url).await?;

        let mut raws = parse_event_cards(&body);
        if raws.is_empty() {
            warn!("MLH event-card markup yielded nothing; harvesting links");
            raws = harvest_links(&body, BASE_URL, "event", HARVEST_CAP);
        }

        info!(count = raws.len(), "Extracted raw MLH events");
        let candidates = finalize_candidates(raws, self.source());
        info!(count = candidates.len(), "MLH scrape complete");
        Ok(candidates)
    }
}

/// The per-event cards on a season calendar page.
fn parse_event_cards(html: &str) -> Vec<RawEvent> {
    let document = Html::parse_document(html);
    let card_sel = Selector::parse("div.event").expect("valid selector");
    let link_sel = Selector::parse("a.event-link").expect("valid selector");
    let name_sel = Selector::parse("h3.event-name").expect("valid selector");
    let date_sel = Selector::parse("p.event-date").expect("valid selector");
    let location_sel = Selector::parse("div.event-location").expect("valid selector");
    let format_sel = Selector::parse(".event-hybrid-notes span").expect("valid selector");

    let mut raws = Vec::new();
    for card in document.select(&card_sel) {
        let title = card
            .select(&name_sel)
            .next()
            .map(|e| clean_text(&e.text().collect::<String>()));
        let Some(title) = title.filter(|t| !t.is_empty()) else {
            warn!("MLH event card without a name; skipping");
            continue;
        };

        // "Digital Only" ribbons override the city/state the card shows.
        let format_note = card
            .select(&format_sel)
            .next()
            .map(|e| clean_text(&e.text().collect::<String>()))
            .unwrap_or_default();
        let location_text = if format_note.to_lowercase().contains("digital") {
            Some("Online".to_string())
        } else {
            card.select(&location_sel)
                .next()
                .map(|e| clean_text(&e.text().collect::<String>()))
        };

        raws.push(RawEvent {
            title,
            date_text: card
                .select(&date_sel)
                .next()
                .map(|e| clean_text(&e.text().collect::<String>())),
            location_text,
            url: card
                .select(&link_sel)
                .next()
                .and_then(|a| a.value().attr("href"))
                .map(str::to_string),
            ..RawEvent::default()
        });
    }
    raws
}
