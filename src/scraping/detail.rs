use chrono::DateTime;
use chrono_tz::Tz;
use once_cell::sync::Lazy;
use scraper::{Html, Selector};
use thiserror::Error;

use super::base;
use super::datetime::{DateTimeNormalizer, FormatError};
use super::{Page, Region, RegionCapture};
use crate::assets::FlierStore;
use crate::models::{EventRecord, EventRef};

const TITLE_SELECTOR_TEXT: &str = r#"h1[style="padding: 0px; font-size: 30px;"]"#;
const INFO_SELECTOR_TEXT: &str = r#"p[style="margin: 2px 0px; white-space: normal;"]"#;
const DESCRIPTION_SELECTOR_TEXT: &str = ".DescriptionText";
const FLIER_SELECTOR_TEXT: &str = r#"[title="Image Uploaded for Event Cover Photo"]"#;

const DATE_LINE: usize = 0;
const LOCATION_LINE: usize = 2;

static TITLE_SELECTOR: Lazy<Selector> =
    Lazy::new(|| Selector::parse(TITLE_SELECTOR_TEXT).expect("detail title selector"));
static INFO_SELECTOR: Lazy<Selector> =
    Lazy::new(|| Selector::parse(INFO_SELECTOR_TEXT).expect("detail info line selector"));
static DESCRIPTION_SELECTOR: Lazy<Selector> =
    Lazy::new(|| Selector::parse(DESCRIPTION_SELECTOR_TEXT).expect("detail description selector"));
static FLIER_SELECTOR: Lazy<Selector> =
    Lazy::new(|| Selector::parse(FLIER_SELECTOR_TEXT).expect("detail flier selector"));

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Field {
    Title,
    DateTime,
    Description,
    Location,
}

impl std::fmt::Display for Field {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let name = match self {
            Field::Title => "title",
            Field::DateTime => "date/time",
            Field::Description => "description",
            Field::Location => "location",
        };
        f.write_str(name)
    }
}

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum ExtractionError {
    #[error("missing required field: {field}")]
    MissingField { field: Field },
    #[error(transparent)]
    Format(#[from] FormatError),
}

/// Everything located on a detail page before any side effect runs.
#[derive(Debug, Clone)]
pub struct ParsedDetail {
    pub title: String,
    pub description: String,
    pub location: String,
    pub raw_date_time: String,
    pub event_instant: DateTime<Tz>,
    pub flier_region: Option<Region>,
}

#[derive(Debug, Clone, Copy)]
pub struct EventExtractor {
    normalizer: DateTimeNormalizer,
}

impl EventExtractor {
    pub fn new(normalizer: DateTimeNormalizer) -> Self {
        Self { normalizer }
    }

    /// Builds the record for one event and captures its flier. Flier
    /// problems are logged and leave the record without one.
    pub fn extract(
        &self,
        reference: &EventRef,
        page: &Page,
        capture: &mut dyn RegionCapture,
        assets: &FlierStore,
    ) -> Result<EventRecord, ExtractionError> {
        let parsed = self.parse_page(page)?;

        let flier = match parsed.flier_region.as_ref() {
            None => {
                log::warn!("no flier region on {} ({})", page.url, parsed.title);
                None
            }
            Some(region) => match capture.capture_region(region) {
                Ok(bytes) => match assets.store(&reference.id, &bytes) {
                    Ok(flier) => Some(flier),
                    Err(err) => {
                        log::warn!("failed to store flier for {}: {err}", parsed.title);
                        None
                    }
                },
                Err(err) => {
                    log::warn!("flier capture failed for {}: {err}", parsed.title);
                    None
                }
            },
        };

        Ok(EventRecord::new(
            reference,
            parsed.title,
            parsed.description,
            parsed.location,
            parsed.raw_date_time,
            parsed.event_instant,
            flier,
        ))
    }

    pub fn parse_page(&self, page: &Page) -> Result<ParsedDetail, ExtractionError> {
        let document = Html::parse_document(&page.html);

        let title = base::first_text(&document, &TITLE_SELECTOR)
            .filter(|text| !text.is_empty())
            .ok_or(ExtractionError::MissingField {
                field: Field::Title,
            })?;
        let raw_date_time = base::nth_text(&document, &INFO_SELECTOR, DATE_LINE)
            .filter(|text| !text.is_empty())
            .ok_or(ExtractionError::MissingField {
                field: Field::DateTime,
            })?;
        let description = description_text(&document).ok_or(ExtractionError::MissingField {
            field: Field::Description,
        })?;
        let location = base::nth_text(&document, &INFO_SELECTOR, LOCATION_LINE).ok_or(
            ExtractionError::MissingField {
                field: Field::Location,
            },
        )?;

        let event_instant = self.normalizer.parse(&raw_date_time)?;

        let flier_region = document.select(&FLIER_SELECTOR).next().map(|element| {
            let value = element.value();
            let source = value
                .attr("src")
                .or_else(|| value.attr("href"))
                .map(str::to_string)
                .or_else(|| nested_image_source(element));
            Region {
                page_url: page.url.clone(),
                selector: FLIER_SELECTOR_TEXT.to_string(),
                source: base::absolute_url(&page.url, source),
            }
        });

        Ok(ParsedDetail {
            title,
            description,
            location,
            raw_date_time,
            event_instant,
            flier_region,
        })
    }
}

/// Description keeps paragraph breaks; whitespace inside a paragraph is collapsed.
fn description_text(document: &Html) -> Option<String> {
    let element = document.select(&DESCRIPTION_SELECTOR).next()?;
    let paragraphs = element
        .text()
        .collect::<String>()
        .split('\n')
        .map(base::clean_text)
        .filter(|line| !line.is_empty())
        .collect::<Vec<_>>();
    Some(paragraphs.join("\n"))
}

static IMG_SELECTOR: Lazy<Selector> =
    Lazy::new(|| Selector::parse("img[src]").expect("nested image selector"));

fn nested_image_source(element: scraper::ElementRef<'_>) -> Option<String> {
    element
        .select(&IMG_SELECTOR)
        .next()
        .and_then(|img| img.value().attr("src"))
        .map(str::to_string)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::scraping::CaptureError;
    use chrono::{Datelike, Timelike};

    const EVENT_URL: &str = "https://tulane.wavesync.io/event/18234";

    const SAMPLE_HTML: &str = r#"
    <html><body>
        <div class="event-header">
            <h1 style="padding: 0px; font-size: 30px;">Demo Night</h1>
            <div>
                <p style="margin: 2px 0px; white-space: normal;">Thursday, March 14 2024 at 7:00 PM to 9:00 PM CDT</p>
                <p style="margin: 2px 0px; white-space: normal;">Add to calendar</p>
                <p style="margin: 2px 0px; white-space: normal;">Stanley Thomas Hall, Room 302</p>
            </div>
        </div>
        <img title="Image Uploaded for Event Cover Photo" src="/uploads/demo-night.png" />
        <div class="DescriptionText">
            Show off what you built this semester.

            Cookies   provided.
        </div>
    </body></html>
    "#;

    struct FakeCapture {
        result: Result<Vec<u8>, CaptureError>,
        seen: Vec<Region>,
    }

    impl RegionCapture for FakeCapture {
        fn capture_region(&mut self, region: &Region) -> Result<Vec<u8>, CaptureError> {
            self.seen.push(region.clone());
            match &self.result {
                Ok(bytes) => Ok(bytes.clone()),
                Err(_) => Err(CaptureError::Empty),
            }
        }
    }

    fn extractor() -> EventExtractor {
        EventExtractor::new(DateTimeNormalizer::new(chrono_tz::America::Chicago))
    }

    #[test]
    fn parses_detail_page() {
        let page = Page::new(EVENT_URL, SAMPLE_HTML);
        let parsed = extractor().parse_page(&page).expect("parse detail");

        assert_eq!(parsed.title, "Demo Night");
        assert_eq!(parsed.location, "Stanley Thomas Hall, Room 302");
        assert_eq!(
            parsed.description,
            "Show off what you built this semester.\nCookies provided."
        );
        assert_eq!(
            parsed.raw_date_time,
            "Thursday, March 14 2024 at 7:00 PM to 9:00 PM CDT"
        );
        assert_eq!(parsed.event_instant.year(), 2024);
        assert_eq!(parsed.event_instant.month(), 3);
        assert_eq!(parsed.event_instant.day(), 14);
        assert_eq!(parsed.event_instant.hour(), 19);
        assert_eq!(
            parsed.flier_region.and_then(|r| r.source).as_deref(),
            Some("https://tulane.wavesync.io/uploads/demo-night.png")
        );
    }

    #[test]
    fn extract_stores_flier_under_event_id() {
        let dir = tempfile::tempdir().expect("tempdir");
        let assets = FlierStore::new(dir.path());
        let mut capture = FakeCapture {
            result: Ok(vec![0x89, b'P', b'N', b'G', 0]),
            seen: Vec::new(),
        };
        let reference = EventRef::from_url(EVENT_URL);
        let page = Page::new(EVENT_URL, SAMPLE_HTML);

        let record = extractor()
            .extract(&reference, &page, &mut capture, &assets)
            .expect("extract");

        assert_eq!(record.id, "18234");
        assert_eq!(capture.seen.len(), 1);
        let flier = record.flier.as_ref().expect("flier stored");
        assert!(flier.path.ends_with("18234_flier.png"));
        assert!(record.generated_content().is_none());
    }

    #[test]
    fn capture_failure_keeps_record() {
        let dir = tempfile::tempdir().expect("tempdir");
        let assets = FlierStore::new(dir.path());
        let mut capture = FakeCapture {
            result: Err(CaptureError::Empty),
            seen: Vec::new(),
        };
        let reference = EventRef::from_url(EVENT_URL);
        let page = Page::new(EVENT_URL, SAMPLE_HTML);

        let record = extractor()
            .extract(&reference, &page, &mut capture, &assets)
            .expect("extract without flier");
        assert!(record.flier.is_none());
        assert_eq!(record.title, "Demo Night");
    }

    #[test]
    fn missing_title_is_rejected() {
        let html = SAMPLE_HTML.replace(
            r#"<h1 style="padding: 0px; font-size: 30px;">Demo Night</h1>"#,
            "",
        );
        let page = Page::new(EVENT_URL, html);
        assert_eq!(
            extractor().parse_page(&page).unwrap_err(),
            ExtractionError::MissingField {
                field: Field::Title
            }
        );
    }

    #[test]
    fn blank_title_is_rejected() {
        let html = SAMPLE_HTML.replace(">Demo Night<", ">   <");
        let page = Page::new(EVENT_URL, html);
        assert!(matches!(
            extractor().parse_page(&page),
            Err(ExtractionError::MissingField {
                field: Field::Title
            })
        ));
    }

    #[test]
    fn missing_location_line_is_rejected() {
        let html = SAMPLE_HTML.replace(
            r#"<p style="margin: 2px 0px; white-space: normal;">Stanley Thomas Hall, Room 302</p>"#,
            "",
        );
        let page = Page::new(EVENT_URL, html);
        assert!(matches!(
            extractor().parse_page(&page),
            Err(ExtractionError::MissingField {
                field: Field::Location
            })
        ));
    }

    #[test]
    fn missing_date_line_is_rejected() {
        let html = r#"
        <html><body>
            <h1 style="padding: 0px; font-size: 30px;">Demo Night</h1>
            <div class="DescriptionText">Show off what you built.</div>
        </body></html>
        "#;
        let page = Page::new(EVENT_URL, html);
        assert_eq!(
            extractor().parse_page(&page).unwrap_err(),
            ExtractionError::MissingField {
                field: Field::DateTime
            }
        );
    }

    #[test]
    fn missing_description_is_rejected() {
        let start = SAMPLE_HTML
            .find(r#"<div class="DescriptionText">"#)
            .expect("description in fixture");
        let end = start + SAMPLE_HTML[start..].find("</div>").expect("closing div") + "</div>".len();
        let html = format!("{}{}", &SAMPLE_HTML[..start], &SAMPLE_HTML[end..]);
        let page = Page::new(EVENT_URL, html);
        assert_eq!(
            extractor().parse_page(&page).unwrap_err(),
            ExtractionError::MissingField {
                field: Field::Description
            }
        );
    }

    #[test]
    fn unparsable_date_is_rejected() {
        let html = SAMPLE_HTML.replace(
            "Thursday, March 14 2024 at 7:00 PM to 9:00 PM CDT",
            "Sometime next week",
        );
        let page = Page::new(EVENT_URL, html);
        assert!(matches!(
            extractor().parse_page(&page),
            Err(ExtractionError::Format(FormatError::Pattern(_)))
        ));
    }

    #[test]
    fn missing_flier_region_is_not_fatal() {
        let html = SAMPLE_HTML.replace(
            r#"<img title="Image Uploaded for Event Cover Photo" src="/uploads/demo-night.png" />"#,
            "",
        );
        let dir = tempfile::tempdir().expect("tempdir");
        let assets = FlierStore::new(dir.path());
        let mut capture = FakeCapture {
            result: Ok(vec![1]),
            seen: Vec::new(),
        };
        let record = extractor()
            .extract(
                &EventRef::from_url(EVENT_URL),
                &Page::new(EVENT_URL, html),
                &mut capture,
                &assets,
            )
            .expect("extract");
        assert!(record.flier.is_none());
        assert!(capture.seen.is_empty());
    }
}
