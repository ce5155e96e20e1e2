//! Timestamp parsing against per-dialect format lists.
//!
//! Every dialect owns an ordered slice of [`TimeFormat`]s; [`parse_time`]
//! returns the first one that matches, normalized to UTC.

use chrono::{DateTime, NaiveDate, NaiveDateTime, Utc};
use thiserror::Error;

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum TimeError {
    /// The value matched none of the dialect's formats.
    #[error("unrecognized time format: {0}")]
    UnrecognizedTimeFormat(String),
}

/// One candidate layout for a timestamp.
///
/// Patterns use `chrono` strftime syntax. A leading `%a, ` is matched
/// loosely: any alphabetic day name is accepted and its value is not checked
/// against the date, since feeds get the weekday wrong surprisingly often.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TimeFormat {
    /// Pattern carries its own UTC offset (`%z` or `%:z`).
    Zoned(&'static str),
    /// Pattern without an offset; the value is read as UTC.
    Naive(&'static str),
    /// Date only; the value is midnight UTC.
    Date(&'static str),
    /// RFC 3339 (`Z` or numeric offset, optional fractional seconds).
    Rfc3339,
}

impl TimeFormat {
    pub fn parse(self, spec: &str) -> Option<DateTime<Utc>> {
        match self {
            TimeFormat::Rfc3339 => DateTime::parse_from_rfc3339(spec)
                .ok()
                .map(|t| t.with_timezone(&Utc)),
            TimeFormat::Zoned(pattern) => {
                let (pattern, spec) = skip_weekday(pattern, spec)?;
                DateTime::parse_from_str(spec, pattern)
                    .ok()
                    .map(|t| t.with_timezone(&Utc))
            }
            TimeFormat::Naive(pattern) => {
                let (pattern, spec) = skip_weekday(pattern, spec)?;
                NaiveDateTime::parse_from_str(spec, pattern)
                    .ok()
                    .map(|t| t.and_utc())
            }
            TimeFormat::Date(pattern) => NaiveDate::parse_from_str(spec, pattern)
                .ok()
                .and_then(|d| d.and_hms_opt(0, 0, 0))
                .map(|t| t.and_utc()),
        }
    }
}

/// Strips a leading day name from both the pattern and the value.
fn skip_weekday<'a>(pattern: &'static str, spec: &'a str) -> Option<(&'static str, &'a str)> {
    let Some(rest) = pattern.strip_prefix("%a, ") else {
        return Some((pattern, spec));
    };
    let (day, tail) = spec.split_once(',')?;
    if day.len() < 3 || !day.chars().all(|c| c.is_ascii_alphabetic()) {
        return None;
    }
    Some((rest, tail.trim_start()))
}

/// Parses `spec` against `formats` in order.
///
/// An empty (or all-whitespace) value is not an error: it yields `Ok(None)`.
pub fn parse_time(formats: &[TimeFormat], spec: &str) -> Result<Option<DateTime<Utc>>, TimeError> {
    let spec = spec.trim();
    if spec.is_empty() {
        return Ok(None);
    }

    formats
        .iter()
        .find_map(|format| format.parse(spec))
        .map(Some)
        .ok_or_else(|| TimeError::UnrecognizedTimeFormat(spec.to_owned()))
}
