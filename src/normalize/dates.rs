// src/normalize/dates.rs

use chrono::{DateTime, NaiveDate, NaiveDateTime};

/// Formats tried after the ISO forms when the config names none.
pub const DEFAULT_DATE_FORMATS: &[&str] =
    &["%d/%m/%Y", "%Y/%m/%d", "%d %B %Y", "%d %b %Y", "%Y%m%d"];

const ISO_DATETIME_FORMATS: &[&str] = &["%Y-%m-%dT%H:%M:%S%.f", "%Y-%m-%d %H:%M:%S%.f"];

/// Parse a cleaned cell into a calendar date.
///
/// Order: `YYYY-MM-DD`, RFC 3339 / ISO timestamps (date part kept as
/// written, no zone shift), then each of `formats` as a date or a datetime.
pub fn parse_date(s: &str, formats: &[String]) -> Option<NaiveDate> {
    let s = s.trim();
    if s.is_empty() {
        return None;
    }

    if let Ok(d) = NaiveDate::parse_from_str(s, "%Y-%m-%d") {
        return Some(d);
    }
    if let Ok(dt) = DateTime::parse_from_rfc3339(s) {
        return Some(dt.date_naive());
    }
    for fmt in ISO_DATETIME_FORMATS {
        if let Ok(dt) = NaiveDateTime::parse_from_str(s, fmt) {
            return Some(dt.date());
        }
    }

    formats.iter().find_map(|fmt| {
        NaiveDate::parse_from_str(s, fmt)
            .ok()
            .or_else(|| NaiveDateTime::parse_from_str(s, fmt).ok().map(|dt| dt.date()))
    })
}
