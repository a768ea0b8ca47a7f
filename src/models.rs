use std::path::PathBuf;

use chrono::{DateTime, NaiveDate};
use chrono_tz::Tz;
use serde::Serialize;
use sha2::{Digest, Sha256};

/// Reference to one event as it appears on the listing page.
#[derive(Serialize, Clone, Debug, PartialEq, Eq)]
pub struct EventRef {
    pub id: String, // numeric last path segment, else sha256 of the normalized url
    pub url: String,
}

impl EventRef {
    pub fn from_url(url: impl Into<String>) -> Self {
        let url = url.into();
        let id = stable_id(&url);
        Self { id, url }
    }
}

/// Location of a stored flier image. Opaque to everything but dispatch.
#[derive(Serialize, Clone, Debug, PartialEq, Eq)]
pub struct FlierRef {
    pub path: PathBuf,
}

#[derive(Serialize, Clone, Debug)]
pub struct EventRecord {
    pub id: String,
    pub url: String,
    pub title: String,
    pub description: String,
    pub location: String,
    pub raw_date_time: String,
    pub event_instant: DateTime<Tz>,
    pub flier: Option<FlierRef>,
    generated_content: Option<String>,
}

impl EventRecord {
    pub fn new(
        reference: &EventRef,
        title: String,
        description: String,
        location: String,
        raw_date_time: String,
        event_instant: DateTime<Tz>,
        flier: Option<FlierRef>,
    ) -> Self {
        Self {
            id: reference.id.clone(),
            url: reference.url.clone(),
            title,
            description,
            location,
            raw_date_time,
            event_instant,
            flier,
            generated_content: None,
        }
    }

    /// Calendar date of the event in the venue zone.
    pub fn event_date(&self) -> NaiveDate {
        self.event_instant.date_naive()
    }

    pub fn generated_content(&self) -> Option<&str> {
        self.generated_content.as_deref()
    }

    /// Stores drafted copy. Returns false and keeps the first value when
    /// content was already set.
    pub fn set_generated_content(&mut self, content: String) -> bool {
        if self.generated_content.is_some() {
            return false;
        }
        self.generated_content = Some(content);
        true
    }
}

fn stable_id(url: &str) -> String {
    let Ok(mut parsed) = reqwest::Url::parse(url.trim()) else {
        return sha256_hex(url.trim());
    };
    parsed.set_fragment(None);

    let segment = parsed
        .path_segments()
        .and_then(|mut segments| segments.rfind(|s| !s.is_empty()).map(str::to_string));
    match segment {
        Some(segment) if parsed.query().is_none() && is_distinctive(&segment) => segment,
        _ => {
            let normalized = parsed.as_str().trim_end_matches('/').to_string();
            sha256_hex(&normalized)
        }
    }
}

// Listing links end in a numeric id (`/event/18234`); words like `details` or
// `event` are shared by every link.
fn is_distinctive(segment: &str) -> bool {
    segment.chars().any(|c| c.is_ascii_digit())
        && segment
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || c == '-' || c == '_')
}

fn sha256_hex(input: &str) -> String {
    let mut hasher = Sha256::new();
    hasher.update(input.as_bytes());
    format!("{:x}", hasher.finalize())
}
