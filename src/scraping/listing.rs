use std::collections::HashSet;

use once_cell::sync::Lazy;
use scraper::{ElementRef, Html, Selector};

use super::base;
use super::{EventSource, Page};
use crate::models::EventRef;

static CARD_SELECTOR: Lazy<Selector> = Lazy::new(|| {
    Selector::parse("div.MuiPaper-root.MuiCard-root.MuiPaper-elevation3.MuiPaper-rounded")
        .expect("listing card selector")
});

/// Event listing of a Wavesync organization page. Each event is a card
/// wrapped in an anchor pointing at its detail page.
pub struct WavesyncListing {
    url: String,
}

impl WavesyncListing {
    pub fn new(url: impl Into<String>) -> Self {
        Self { url: url.into() }
    }
}

impl EventSource for WavesyncListing {
    fn listing_url(&self) -> &str {
        &self.url
    }

    fn discover(&self, listing: &Page) -> Vec<EventRef> {
        let document = Html::parse_document(&listing.html);
        let mut seen = HashSet::new();
        let mut refs = Vec::new();

        for card in document.select(&CARD_SELECTOR) {
            let href = match card_link(card) {
                Some(href) => href,
                None => {
                    log::debug!("listing card without a link on {}", listing.url);
                    continue;
                }
            };
            let url = match base::absolute_url(&listing.url, Some(href)) {
                Some(url) => url,
                None => continue,
            };
            if seen.insert(url.clone()) {
                refs.push(EventRef::from_url(url));
            }
        }

        refs
    }
}

/// The anchor wrapping the card: its parent, or the nearest anchor ancestor.
fn card_link(card: ElementRef<'_>) -> Option<String> {
    card.ancestors()
        .filter_map(ElementRef::wrap)
        .find(|el| el.value().name() == "a")
        .and_then(|anchor| anchor.value().attr("href"))
        .map(str::to_string)
}
