pub mod assets;
pub mod compose;
pub mod config;
pub mod db;
pub mod dispatch;
pub mod models;
pub mod pipeline;
pub mod schedule;
pub mod scraping;
mod utils;

use anyhow::{Context, Result};
use chrono::{NaiveDate, Utc};

use assets::FlierStore;
use config::AppConfig;
use scraping::base::HttpRenderer;
use scraping::datetime::DateTimeNormalizer;
use scraping::detail::EventExtractor;
use scraping::listing::WavesyncListing;

pub use models::{EventRecord, EventRef, FlierRef};
pub use pipeline::{Collector, Pipeline, RunReport};
pub use schedule::{due_today, DueReminder, ReminderOffsets};

/// Today's date in the venue zone.
pub fn venue_today(config: &AppConfig) -> Result<NaiveDate> {
    let tz = config.venue_tz()?;
    Ok(Utc::now().with_timezone(&tz).date_naive())
}

pub fn normalizer(config: &AppConfig) -> Result<DateTimeNormalizer> {
    Ok(DateTimeNormalizer::new(config.venue_tz()?))
}

/// Discovery/extraction half backed by the HTTP renderer.
pub fn http_collector(config: &AppConfig) -> Result<Collector<WavesyncListing, HttpRenderer>> {
    let renderer = HttpRenderer::new().context("unable to build http client")?;
    Ok(Collector::new(
        WavesyncListing::new(config.listing_url.clone()),
        renderer,
        EventExtractor::new(normalizer(config)?),
        FlierStore::new(config.flier_dir()),
    ))
}
