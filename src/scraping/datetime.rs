//! Parsing of the listing's human readable date lines, e.g.
//! `Tuesday, March 5 2024 at 7:00 PM CST`, into instants in the venue zone.

use chrono::{DateTime, Datelike, FixedOffset, LocalResult, NaiveDateTime, TimeZone};
use chrono_tz::Tz;
use once_cell::sync::Lazy;
use regex::Regex;
use thiserror::Error;

use super::base;

const NAIVE_FORMAT: &str = "%A, %B %d %Y at %I:%M %p";

static PATTERN: Lazy<Regex> = Lazy::new(|| {
    Regex::new(
        r"(?ix)^
        (?P<weekday>[a-z]+),\s*
        (?P<month>[a-z]+)\.?\s+
        (?P<day>\d{1,2}),?\s+
        (?P<year>\d{4})\s+
        at\s+
        (?P<hour>\d{1,2}):(?P<minute>\d{2})\s*(?P<meridiem>[ap]\.?m\.?)
        (?:\s+to(?:\s+(?:[a-z]+,\s*[a-z]+\.?\s+\d{1,2},?\s+\d{4}\s+at\s+)?\d{1,2}:\d{2}\s*[ap]\.?m\.?)?)?
        \s+(?P<zone>[a-z]{2,5})
        (?:\s+to(?:\s.*)?)?
        $",
    )
    .expect("valid date line regex")
});

/// Abbreviations accepted when they do not name the venue zone itself,
/// with their UTC offsets in hours.
const KNOWN_ZONES: [(&str, i32); 15] = [
    ("UTC", 0),
    ("GMT", 0),
    ("EST", -5),
    ("EDT", -4),
    ("CST", -6),
    ("CDT", -5),
    ("MST", -7),
    ("MDT", -6),
    ("PST", -8),
    ("PDT", -7),
    ("AKST", -9),
    ("AKDT", -8),
    ("HST", -10),
    ("BST", 1),
    ("CET", 1),
];

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum FormatError {
    #[error("date/time text does not match the expected pattern: {0:?}")]
    Pattern(String),
    #[error("invalid date/time in {text:?}: {reason}")]
    Invalid { text: String, reason: String },
    #[error("unrecognized time zone abbreviation {zone:?}")]
    UnknownZone { zone: String },
    #[error("{text:?} does not exist in {zone}")]
    NonexistentLocalTime { text: String, zone: String },
}

#[derive(Debug, Clone, Copy)]
pub struct DateTimeNormalizer {
    venue: Tz,
}

impl DateTimeNormalizer {
    pub fn new(venue: Tz) -> Self {
        Self { venue }
    }

    pub fn parse(&self, text: &str) -> Result<DateTime<Tz>, FormatError> {
        let cleaned = base::clean_text(text);
        let caps = PATTERN
            .captures(&cleaned)
            .ok_or_else(|| FormatError::Pattern(cleaned.clone()))?;

        let meridiem = caps["meridiem"].replace('.', "").to_uppercase();
        let naive_text = format!(
            "{}, {} {} {} at {}:{} {}",
            &caps["weekday"],
            &caps["month"],
            &caps["day"],
            &caps["year"],
            &caps["hour"],
            &caps["minute"],
            meridiem
        );
        let naive = NaiveDateTime::parse_from_str(&naive_text, NAIVE_FORMAT).map_err(|err| {
            FormatError::Invalid {
                text: cleaned.clone(),
                reason: err.to_string(),
            }
        })?;

        self.resolve(naive, &caps["zone"].to_uppercase(), &cleaned)
    }

    fn resolve(
        &self,
        naive: NaiveDateTime,
        zone: &str,
        text: &str,
    ) -> Result<DateTime<Tz>, FormatError> {
        if self.names_venue(zone, naive.year()) {
            return match self.venue.from_local_datetime(&naive) {
                LocalResult::Single(dt) => Ok(dt),
                LocalResult::Ambiguous(earliest, _) => Ok(earliest),
                LocalResult::None => Err(FormatError::NonexistentLocalTime {
                    text: text.to_string(),
                    zone: self.venue.name().to_string(),
                }),
            };
        }

        let hours = KNOWN_ZONES
            .iter()
            .find(|(abbr, _)| *abbr == zone)
            .map(|(_, hours)| *hours)
            .ok_or_else(|| FormatError::UnknownZone {
                zone: zone.to_string(),
            })?;
        let offset = FixedOffset::east_opt(hours * 3600).ok_or_else(|| FormatError::UnknownZone {
            zone: zone.to_string(),
        })?;
        match offset.from_local_datetime(&naive) {
            LocalResult::Single(dt) => Ok(dt.with_timezone(&self.venue)),
            _ => Err(FormatError::Invalid {
                text: text.to_string(),
                reason: format!("no single instant at offset {offset}"),
            }),
        }
    }

    /// True when `zone` is the standard or daylight abbreviation the venue
    /// zone uses in `year`.
    fn names_venue(&self, zone: &str, year: i32) -> bool {
        [1, 7].iter().any(|month| {
            self.venue
                .with_ymd_and_hms(year, *month, 1, 12, 0, 0)
                .single()
                .map(|dt| dt.format("%Z").to_string().eq_ignore_ascii_case(zone))
                .unwrap_or(false)
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{NaiveDate, Timelike};

    fn chicago() -> DateTimeNormalizer {
        DateTimeNormalizer::new(chrono_tz::America::Chicago)
    }

    #[test]
    fn parses_and_reformats_to_the_same_text() {
        let text = "Tuesday, March 5 2024 at 7:00 PM CST";
        let parsed = chicago().parse(text).expect("parse");
        assert_eq!(parsed.format("%A, %B %-d %Y at %-I:%M %p %Z").to_string(), text);
        assert_eq!(parsed.to_rfc3339(), "2024-03-05T19:00:00-06:00");
    }

    #[test]
    fn localizes_venue_abbreviation_across_dst() {
        let parsed = chicago()
            .parse("Thursday, March 14 2024 at 7:00 PM CDT")
            .expect("parse");
        assert_eq!(parsed.to_rfc3339(), "2024-03-14T19:00:00-05:00");

        let mislabeled = chicago()
            .parse("Thursday, March 14 2024 at 7:00 PM CST")
            .expect("parse");
        assert_eq!(mislabeled.hour(), 19);
    }

    #[test]
    fn converts_foreign_abbreviation_into_venue_zone() {
        let parsed = chicago()
            .parse("Saturday, June 1 2024 at 8:00 PM EDT")
            .expect("parse");
        assert_eq!(parsed.timezone(), chrono_tz::America::Chicago);
        assert_eq!(parsed.to_rfc3339(), "2024-06-01T19:00:00-05:00");

        let late = chicago()
            .parse("Saturday, June 1 2024 at 3:00 AM UTC")
            .expect("parse");
        assert_eq!(
            late.date_naive(),
            NaiveDate::from_ymd_opt(2024, 5, 31).expect("date")
        );
    }

    #[test]
    fn strips_range_connector() {
        let expected = "2024-03-05T19:00:00-06:00";
        for text in [
            "Tuesday, March 5 2024 at 7:00 PM to 9:00 PM CST",
            "Tuesday, March 5 2024 at 7:00 PM to CST",
            "Tuesday, March 5 2024 at 7:00 PM CST to",
            "Tuesday, March 5 2024 at 7:00 PM CST to Wednesday, March 6 2024 at 1:00 AM CST",
        ] {
            let parsed = chicago().parse(text).expect(text);
            assert_eq!(parsed.to_rfc3339(), expected, "{text}");
        }
    }

    #[test]
    fn multi_day_range_with_zone_after_end() {
        let parsed = chicago()
            .parse("Friday, March 8 2024 at 5:00 PM to Sunday, March 10 2024 at 5:00 PM CDT")
            .expect("parse");
        assert_eq!(parsed.to_rfc3339(), "2024-03-08T17:00:00-06:00");

        let abbreviated = chicago()
            .parse("Fri, Mar 8 2024 at 5:00 PM to Sun, Mar. 10, 2024 at 5:00 PM EST")
            .expect("parse");
        assert_eq!(abbreviated.to_rfc3339(), "2024-03-08T16:00:00-06:00");
    }

    #[test]
    fn accepts_loose_spacing_and_case() {
        let parsed = chicago()
            .parse("  Tue,  Mar 5, 2024 at 7:00pm   cst ")
            .expect("parse");
        assert_eq!(parsed.to_rfc3339(), "2024-03-05T19:00:00-06:00");
    }

    #[test]
    fn rejects_malformed_text() {
        assert!(matches!(
            chicago().parse("not a date"),
            Err(FormatError::Pattern(_))
        ));
        assert!(matches!(chicago().parse(""), Err(FormatError::Pattern(_))));
    }

    #[test]
    fn rejects_weekday_that_disagrees_with_date() {
        assert!(matches!(
            chicago().parse("Monday, March 5 2024 at 7:00 PM CST"),
            Err(FormatError::Invalid { .. })
        ));
    }

    #[test]
    fn rejects_unknown_zone() {
        assert_eq!(
            chicago().parse("Tuesday, March 5 2024 at 7:00 PM XYZ"),
            Err(FormatError::UnknownZone {
                zone: "XYZ".to_string()
            })
        );
    }

    #[test]
    fn rejects_time_inside_dst_gap() {
        assert!(matches!(
            chicago().parse("Sunday, March 10 2024 at 2:30 AM CDT"),
            Err(FormatError::NonexistentLocalTime { .. })
        ));
    }
}
