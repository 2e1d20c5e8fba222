//! HackerEarth hackathon challenge adapter.
//!
//! HackerEarth embeds schema.org JSON-LD on its challenge listing, which
//! is the most stable thing on the page and therefore the primary
//! strategy. Fallbacks: the challenge-card markup, then generic link
//! harvesting over `/challenges/` URLs.
//!
//! Nearly every HackerEarth hackathon is virtual; cards that carry no
//! location resolve to `"Online"` through the shared location default.

use async_trait::async_trait;
use scraper::{Html, Selector};
use tracing::{info, instrument, warn};
use url::Url;

use crate::error::IngestError;
use crate::fetcher::Fetcher;
use crate::models::{CandidateRecord, Source};
use crate::normalize::clean_text;
use crate::scrapers::{
    event_from_jsonld, finalize_candidates, harvest_links, jsonld_events, RawEvent,
    SourceAdapter,
};

const BASE_URL: &str = "https://www.hackerearth.com";
const LISTING_PATH: &str = "/challenges/hackathon/";
const HARVEST_CAP: usize = 20;

pub struct HackerEarthAdapter;

#[async_trait]
impl SourceAdapter for HackerEarthAdapter {
    fn source(&self) -> Source {
        Source::HackerEarth
    }

    fn base_url(&self) -> &'static str {
        BASE_URL
    }

    fn required_paths(&self) -> Vec<String> {
        vec![LISTING_PATH.to_string()]
    }

    #[instrument(level = "info", skip_all)]
    async fn scrape(&self, fetcher: &Fetcher) -> Result<Vec<CandidateRecord>, IngestError> {
        let listing_url = format!("{BASE_URL}{LISTING_PATH}");
        let body = fetcher.fetch(self.source(), &listing_url).await?;

        let mut raws: Vec<RawEvent> = jsonld_events(&body)
            .iter()
            .filter_map(event_from_jsonld)
            .collect();
        if raws.is_empty() {
            raws = parse_challenge_cards(&body);
        }
        if raws.is_empty() {
            warn!("HackerEarth card markup yielded nothing; harvesting links");
            raws = harvest_links(&body, BASE_URL, "/challenges/", HARVEST_CAP);
        }

        info!(count = raws.len(), "Extracted raw HackerEarth events");
        let candidates = finalize_candidates(raws, self.source());
        info!(count = candidates.len(), "HackerEarth scrape complete");
        Ok(candidates)
    }
}

/// The challenge cards on the hackathon listing.
fn parse_challenge_cards(html: &str) -> Vec<RawEvent> {
    let document = Html::parse_document(html);
    let card_sel = Selector::parse("div.challenge-card-modern").expect("valid selector");
    let link_sel = Selector::parse("a.challenge-card-wrapper").expect("valid selector");
    let title_sel = Selector::parse("span.challenge-list-title").expect("valid selector");
    let date_sel = Selector::parse(".challenge-card-wrapper .date").expect("valid selector");

    let mut raws = Vec::new();
    for card in document.select(&card_sel) {
        let title = card
            .select(&title_sel)
            .next()
            .map(|e| clean_text(&e.text().collect::<String>()));
        let Some(title) = title.filter(|t| !t.is_empty()) else {
            warn!("HackerEarth card without a title; skipping");
            continue;
        };

        let url = card
            .select(&link_sel)
            .next()
            .and_then(|a| a.value().attr("href"))
            .and_then(|href| {
                if href.starts_with("http") {
                    Some(href.to_string())
                } else {
                    Url::parse(BASE_URL)
                        .ok()?
                        .join(href)
                        .ok()
                        .map(|u| u.to_string())
                }
            });

        raws.push(RawEvent {
            title,
            date_text: card
                .select(&date_sel)
                .next()
                .map(|e| clean_text(&e.text().collect::<String>())),
            url,
            ..RawEvent::default()
        });
    }
    raws
}

#[cfg(test)]
mod tests {
    use super::*;

    const JSONLD_FIXTURE: &str = r#"
        <html><head>
        <script type="application/ld+json">
        [{"@type":"Event","name":"Climate Tech Hackathon",
          "startDate":"2026-11-07","endDate":"2026-11-09",
          "location":{"@type":"VirtualLocation","url":"https://www.hackerearth.com/challenges/hackathon/climate-tech/"},
          "url":"https://www.hackerearth.com/challenges/hackathon/climate-tech/"}]
        </script>
        </head><body></body></html>
    "#;

    const CARDS_FIXTURE: &str = r#"
        <div class="challenge-card-modern">
            <a class="challenge-card-wrapper" href="/challenges/hackathon/climate-tech/">
                <span class="challenge-list-title">Climate Tech Hackathon</span>
                <div class="date">Nov 7 - 9, 2026</div>
            </a>
        </div>
        <div class="challenge-card-modern">
            <a class="challenge-card-wrapper" href="/challenges/hackathon/untitled/"></a>
        </div>
    "#;

    #[test]
    fn test_jsonld_strategy_wins_when_present() {
        let events = jsonld_events(JSONLD_FIXTURE);
        assert_eq!(events.len(), 1);
        let raw = event_from_jsonld(&events[0]).unwrap();
        assert_eq!(raw.title, "Climate Tech Hackathon");
        assert_eq!(raw.location_text.as_deref(), Some("Online"));
    }

    #[test]
    fn test_parse_challenge_cards() {
        let raws = parse_challenge_cards(CARDS_FIXTURE);
        assert_eq!(raws.len(), 1);
        assert_eq!(raws[0].title, "Climate Tech Hackathon");
        assert_eq!(
            raws[0].url.as_deref(),
            Some("https://www.hackerearth.com/challenges/hackathon/climate-tech/")
        );
        assert_eq!(raws[0].date_text.as_deref(), Some("Nov 7 - 9, 2026"));
    }

    #[test]
    fn test_cards_without_location_default_to_online() {
        let raws = parse_challenge_cards(CARDS_FIXTURE);
        let candidates = finalize_candidates(raws, Source::HackerEarth);
        assert_eq!(candidates.len(), 1);
        assert_eq!(candidates[0].location, "Online");
        assert!(candidates[0].is_online);
        assert_eq!(
            candidates[0].website_url.as_deref(),
            Some("https://hackerearth.com/challenges/hackathon/climate-tech")
        );
    }
}
