pub mod base;
pub mod datetime;
pub mod detail;
pub mod listing;

use thiserror::Error;

use crate::models::EventRef;

#[derive(Debug, Error)]
pub enum FetchError {
    #[error("request failed for {url}: {reason}")]
    Request { url: String, reason: String },
    #[error("non-success status {status} for {url}")]
    Status { url: String, status: u16 },
}

#[derive(Debug, Error)]
pub enum CaptureError {
    #[error("region {selector} has no image source")]
    NoSource { selector: String },
    #[error("capture request failed: {0}")]
    Request(String),
    #[error("captured region is empty")]
    Empty,
}

/// A fetched page: the url it was fetched from and its HTML.
#[derive(Debug, Clone)]
pub struct Page {
    pub url: String,
    pub html: String,
}

impl Page {
    pub fn new(url: impl Into<String>, html: impl Into<String>) -> Self {
        Self {
            url: url.into(),
            html: html.into(),
        }
    }
}

/// A visual region located on a page.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Region {
    pub page_url: String,
    pub selector: String,
    pub source: Option<String>, // absolute src/href of the element, when it has one
}

pub trait Renderer {
    fn fetch(&mut self, url: &str) -> Result<Page, FetchError>;
}

pub trait RegionCapture {
    fn capture_region(&mut self, region: &Region) -> Result<Vec<u8>, CaptureError>;
}

pub trait EventSource {
    fn listing_url(&self) -> &str;
    fn discover(&self, listing: &Page) -> Vec<EventRef>;
}
