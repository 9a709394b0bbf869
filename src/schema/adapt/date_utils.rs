//! Date and timestamp parsing.

use chrono::{DateTime, NaiveDate, NaiveDateTime};

use crate::schema::adapt::types::DateFormatConfig;

/// Parse a date string with multiple format attempts
#[must_use]
pub fn parse_date_string(s: &str, config: &DateFormatConfig) -> Option<NaiveDate> {
    let s = s.trim();
    for format in &config.date_formats {
        if let Ok(date) = NaiveDate::parse_from_str(s, format) {
            return Some(date);
        }
    }

    if config.enable_format_detection {
        if let Some(detected) = detect_date_format(s) {
            if let Ok(date) = NaiveDate::parse_from_str(s, detected) {
                return Some(date);
            }
        }
        // A full timestamp in a date column keeps its calendar day
        if let Some(ts) = parse_timestamp_string(s, config) {
            return Some(ts.date());
        }
    }

    None
}

/// Parse a timestamp string into a UTC-normalized naive timestamp
///
/// RFC 3339 is tried first (offsets are folded into UTC), then the configured
/// formats, then a bare date at midnight.
#[must_use]
pub fn parse_timestamp_string(s: &str, config: &DateFormatConfig) -> Option<NaiveDateTime> {
    let s = s.trim();
    if let Ok(ts) = DateTime::parse_from_rfc3339(s) {
        return Some(ts.naive_utc());
    }

    for format in &config.timestamp_formats {
        if let Ok(ts) = NaiveDateTime::parse_from_str(s, format) {
            return Some(ts);
        }
    }

    config
        .date_formats
        .iter()
        .find_map(|format| NaiveDate::parse_from_str(s, format).ok())
        .and_then(|date| date.and_hms_opt(0, 0, 0))
}

/// Try to detect the date format based on string patterns
#[must_use]
pub fn detect_date_format(s: &str) -> Option<&'static str> {
    let bytes = s.as_bytes();
    if bytes.len() == 10 && bytes[4] == b'-' && bytes[7] == b'-' {
        return Some("%Y-%m-%d");
    }
    if bytes.len() == 10 && bytes[4] == b'/' && bytes[7] == b'/' {
        return Some("%Y/%m/%d");
    }
    if s.split('.').count() == 3 && s.rsplit('.').next().is_some_and(|y| y.len() == 4) {
        return Some("%d.%m.%Y");
    }
    if bytes.len() == 8 && bytes.iter().all(u8::is_ascii_digit) {
        return Some("%Y%m%d");
    }
    None
}
