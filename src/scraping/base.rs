use std::time::Duration;

use reqwest::blocking::Client;
use scraper::{ElementRef, Html, Selector};

use super::{CaptureError, FetchError, Page, Region, RegionCapture, Renderer};

const USER_AGENT: &str = "EventReminder/0.1 (+https://github.com/event-reminder/event-reminder)";
const DEFAULT_TIMEOUT_SECS: u64 = 20;

pub fn clean_text(input: &str) -> String {
    input
        .split_whitespace()
        .collect::<Vec<_>>()
        .join(" ")
        .trim()
        .to_string()
}

pub fn inner_text(element: ElementRef<'_>) -> String {
    clean_text(&element.text().collect::<Vec<_>>().join(" "))
}

/// Text of the first match, `None` when there is no match. An element that
/// exists but holds no text yields `Some("")`.
pub fn first_text(document: &Html, selector: &Selector) -> Option<String> {
    document.select(selector).next().map(inner_text)
}

/// Text of the `index`-th match in document order.
pub fn nth_text(document: &Html, selector: &Selector, index: usize) -> Option<String> {
    document.select(selector).nth(index).map(inner_text)
}

pub fn absolute_url(base: &str, href: Option<String>) -> Option<String> {
    let href = href?;
    let href = href.trim();
    if href.is_empty() {
        return None;
    }
    if href.starts_with("http://") || href.starts_with("https://") {
        return Some(href.to_string());
    }
    let base_url = reqwest::Url::parse(base).ok()?;
    base_url.join(href).ok().map(|u| u.to_string())
}

/// Blocking HTTP implementation of the page and capture collaborators.
pub struct HttpRenderer {
    client: Client,
}

impl HttpRenderer {
    pub fn new() -> Result<Self, FetchError> {
        Self::with_timeout(Duration::from_secs(DEFAULT_TIMEOUT_SECS))
    }

    pub fn with_timeout(timeout: Duration) -> Result<Self, FetchError> {
        let client = Client::builder()
            .timeout(timeout)
            .user_agent(USER_AGENT)
            .build()
            .map_err(|err| FetchError::Request {
                url: String::new(),
                reason: err.to_string(),
            })?;
        Ok(Self { client })
    }

    fn get_bytes(&self, url: &str) -> Result<Vec<u8>, FetchError> {
        let response = self.client.get(url).send().map_err(|err| FetchError::Request {
            url: url.to_string(),
            reason: err.to_string(),
        })?;
        let status = response.status();
        if !status.is_success() {
            return Err(FetchError::Status {
                url: url.to_string(),
                status: status.as_u16(),
            });
        }
        response
            .bytes()
            .map(|body| body.to_vec())
            .map_err(|err| FetchError::Request {
                url: url.to_string(),
                reason: format!("unable to read response body: {err}"),
            })
    }
}

impl Renderer for HttpRenderer {
    fn fetch(&mut self, url: &str) -> Result<Page, FetchError> {
        log::debug!("fetching {url}");
        let body = self.get_bytes(url)?;
        Ok(Page::new(url, String::from_utf8_lossy(&body).into_owned()))
    }
}

impl RegionCapture for HttpRenderer {
    fn capture_region(&mut self, region: &Region) -> Result<Vec<u8>, CaptureError> {
        let source = region.source.as_deref().ok_or_else(|| CaptureError::NoSource {
            selector: region.selector.clone(),
        })?;
        let bytes = self
            .get_bytes(source)
            .map_err(|err| CaptureError::Request(err.to_string()))?;
        if bytes.is_empty() {
            return Err(CaptureError::Empty);
        }
        Ok(bytes)
    }
}
