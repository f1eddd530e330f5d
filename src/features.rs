//! Per-record model features derived from calendar dates and pH readings.
//!
//! Everything here is pure: no I/O, no clocks.

use chrono::{DateTime, Datelike, NaiveDate, NaiveDateTime, Utc};
use serde::Serialize;
use serde_json::Value;

/// Indonesian monsoon season used as a categorical model feature
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
pub enum Season {
    /// December to February
    #[serde(rename = "Hujan")]
    Rain,
    /// March to May
    #[serde(rename = "Peralihan 1")]
    FirstTransition,
    /// June to August
    #[serde(rename = "Kemarau")]
    Dry,
    /// September to November
    #[serde(rename = "Peralihan 2")]
    SecondTransition,
}

impl Season {
    /// Months outside 1..=12 land in the last arm, like any unrecognised month.
    pub fn from_month(month: u32) -> Self {
        match month {
            12 | 1 | 2 => Season::Rain,
            3..=5 => Season::FirstTransition,
            6..=8 => Season::Dry,
            _ => Season::SecondTransition,
        }
    }

    pub fn label(&self) -> &'static str {
        match self {
            Season::Rain => "Hujan",
            Season::FirstTransition => "Peralihan 1",
            Season::Dry => "Kemarau",
            Season::SecondTransition => "Peralihan 2",
        }
    }
}

/// Two-digit, 1-indexed month of `date` ("01".."12")
pub fn month_label(date: NaiveDate) -> String {
    format!("{:02}", date.month())
}

/// Absolute pH change between `readings[index]` and the reading before it.
///
/// Index 0 is always 0.0. A missing pH on either side counts as 0 before
/// subtracting, so a gap next to a real reading yields that reading's full
/// value. The model was trained on features computed this way; changing the
/// policy means retraining.
pub fn ph_fluctuation(readings: &[Option<f64>], index: usize) -> f64 {
    if index == 0 || index >= readings.len() {
        return 0.0;
    }

    let current = readings[index].unwrap_or(0.0);
    let previous = readings[index - 1].unwrap_or(0.0);
    (current - previous).abs()
}

/// Normalise a JSON date value to a UTC calendar date.
///
/// Accepts RFC 3339 timestamps, naive `YYYY-MM-DDTHH:MM:SS[.f]` or
/// `YYYY-MM-DD HH:MM:SS` date-times, plain `YYYY-MM-DD` dates, and epoch
/// milliseconds.
pub fn canonical_date(value: &Value) -> Option<NaiveDate> {
    match value {
        Value::String(text) => parse_date_text(text.trim()),
        Value::Number(number) => number
            .as_i64()
            .and_then(DateTime::<Utc>::from_timestamp_millis)
            .map(|instant| instant.date_naive()),
        _ => None,
    }
}

fn parse_date_text(text: &str) -> Option<NaiveDate> {
    if let Ok(instant) = DateTime::parse_from_rfc3339(text) {
        return Some(instant.with_timezone(&Utc).date_naive());
    }

    for format in ["%Y-%m-%dT%H:%M:%S%.f", "%Y-%m-%d %H:%M:%S%.f"] {
        if let Ok(naive) = NaiveDateTime::parse_from_str(text, format) {
            return Some(naive.date());
        }
    }

    NaiveDate::parse_from_str(text, "%Y-%m-%d").ok()
}
