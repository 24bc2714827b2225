//! Publish-date parsing for feed items.
//!
//! Feeds in the wild use a handful of RFC 822 descendants plus RFC 3339 and a
//! few ad-hoc layouts. Layouts are tried in order and the first match wins.
//! An unparseable date is reported as an error; callers store the item
//! without a timestamp rather than inventing one.

use chrono::{DateTime, FixedOffset, NaiveDateTime, Utc};
use thiserror::Error;

#[derive(Debug, Error, PartialEq, Eq)]
pub enum DateParseError {
    #[error("Empty date string")]
    Empty,
    #[error("Unrecognized date format: {0:?}")]
    Unrecognized(String),
}

#[derive(Debug, Clone, Copy)]
enum Layout {
    Rfc2822,
    Rfc3339,
    /// `chrono` format string that includes a numeric `%z` offset.
    NumericZone(&'static str),
    /// Format string for everything before a trailing zone abbreviation.
    NamedZone(&'static str),
    /// Format string with no zone information; interpreted as UTC.
    Naive(&'static str),
}

const LAYOUTS: &[Layout] = &[
    Layout::Rfc2822,
    Layout::NumericZone("%a, %d %b %Y %H:%M:%S %z"),
    Layout::NamedZone("%a, %d %b %Y %H:%M:%S"),
    Layout::NumericZone("%d %b %y %H:%M %z"),
    Layout::NamedZone("%d %b %y %H:%M"),
    Layout::Rfc3339,
    Layout::NumericZone("%d %b %Y %H:%M:%S %z"),
    Layout::NamedZone("%d %b %Y %H:%M:%S"),
    Layout::Naive("%Y-%m-%d %H:%M:%S"),
    Layout::Naive("%Y-%m-%dT%H:%M:%S"),
];

/// Parse a feed timestamp into UTC.
pub fn parse(raw: &str) -> Result<DateTime<Utc>, DateParseError> {
    let raw = raw.trim();
    if raw.is_empty() {
        return Err(DateParseError::Empty);
    }

    LAYOUTS
        .iter()
        .find_map(|layout| layout.parse(raw))
        .or_else(|| {
            // chrono rejects a weekday that disagrees with the date, which
            // feeds get wrong often enough; retry with the weekday dropped
            let without_weekday = strip_weekday(raw)?;
            LAYOUTS
                .iter()
                .find_map(|layout| layout.parse(without_weekday))
        })
        .ok_or_else(|| DateParseError::Unrecognized(raw.to_string()))
}

const WEEKDAYS: [&str; 7] = [
    "monday",
    "tuesday",
    "wednesday",
    "thursday",
    "friday",
    "saturday",
    "sunday",
];

/// `"Tue, 02 Jan 2006 ..."` → `"02 Jan 2006 ..."`, if the prefix is a real
/// day name (short or long).
fn strip_weekday(raw: &str) -> Option<&str> {
    let (day, rest) = raw.split_once(',')?;
    let day = day.trim().to_ascii_lowercase();
    WEEKDAYS
        .iter()
        .any(|name| day == *name || day == name[..3])
        .then(|| rest.trim_start())
}

impl Layout {
    fn parse(self, raw: &str) -> Option<DateTime<Utc>> {
        let parsed = match self {
            Layout::Rfc2822 => DateTime::parse_from_rfc2822(raw).ok()?,
            Layout::Rfc3339 => DateTime::parse_from_rfc3339(raw).ok()?,
            Layout::NumericZone(fmt) => DateTime::parse_from_str(raw, fmt).ok()?,
            Layout::NamedZone(fmt) => {
                let (head, zone) = raw.rsplit_once(' ')?;
                if zone.is_empty() || !zone.bytes().all(|b| b.is_ascii_alphabetic()) {
                    return None;
                }
                let naive = NaiveDateTime::parse_from_str(head, fmt).ok()?;
                let offset = FixedOffset::east_opt(zone_offset_secs(zone))?;
                naive.and_local_timezone(offset).single()?
            }
            Layout::Naive(fmt) => {
                return NaiveDateTime::parse_from_str(raw, fmt)
                    .ok()
                    .map(|naive| naive.and_utc())
            }
        };
        Some(parsed.with_timezone(&Utc))
    }
}

/// UTC offset in seconds for a zone abbreviation. Unknown abbreviations are
/// ambiguous in general (IST, CST, ...) and resolve to UTC.
fn zone_offset_secs(zone: &str) -> i32 {
    const HOUR: i32 = 3600;
    match zone.to_ascii_uppercase().as_str() {
        "GMT" | "UT" | "UTC" | "Z" => 0,
        "EST" => -5 * HOUR,
        "EDT" => -4 * HOUR,
        "CST" => -6 * HOUR,
        "CDT" => -5 * HOUR,
        "MST" => -7 * HOUR,
        "MDT" => -6 * HOUR,
        "PST" => -8 * HOUR,
        "PDT" => -7 * HOUR,
        other => {
            tracing::debug!(zone = %other, "Unknown zone abbreviation, assuming UTC");
            0
        }
    }
}
