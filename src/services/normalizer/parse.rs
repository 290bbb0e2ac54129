//! Cell-level parsers used by the derivation rules. Every parser returns
//! `None` for input it cannot read; rules turn that into an `Empty` cell.

use chrono::{NaiveDate, NaiveDateTime, NaiveTime};
use once_cell::sync::Lazy;
use regex::Regex;

use crate::models::{parse_number, CellValue};

static CLOCK_DURATION: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^\s*(-)?(\d+):([0-5]?\d)(?::([0-5]?\d(?:\.\d+)?))?\s*$").unwrap());

const DATETIME_FORMATS: &[&str] = &[
    "%Y-%m-%dT%H:%M:%S%.f",
    "%Y-%m-%dT%H:%M:%S",
    "%Y-%m-%dT%H:%M",
    "%Y-%m-%d %H:%M:%S%.f",
    "%Y-%m-%d %H:%M:%S",
    "%Y-%m-%d %H:%M",
    "%d.%m.%Y %H:%M:%S",
    "%d.%m.%Y %H:%M",
    "%d/%m/%Y %H:%M:%S",
    "%d/%m/%Y %H:%M",
    "%Y/%m/%d %H:%M:%S",
    "%Y/%m/%d %H:%M",
];

const DATE_FORMATS: &[&str] = &["%Y-%m-%d", "%d.%m.%Y", "%d/%m/%Y", "%Y/%m/%d", "%d-%m-%Y", "%Y.%m.%d"];

/// Reads a timestamp from a cell. Date-only text is taken at midnight.
pub fn parse_datetime(cell: &CellValue) -> Option<NaiveDateTime> {
    match cell {
        CellValue::DateTime(dt) => Some(*dt),
        CellValue::Text(s) => parse_datetime_str(s),
        _ => None,
    }
}

pub fn parse_datetime_str(raw: &str) -> Option<NaiveDateTime> {
    let s = raw.trim();
    if s.is_empty() {
        return None;
    }

    if let Ok(dt) = chrono::DateTime::parse_from_rfc3339(s) {
        return Some(dt.naive_local());
    }

    DATETIME_FORMATS
        .iter()
        .find_map(|format| NaiveDateTime::parse_from_str(s, format).ok())
        .or_else(|| {
            DATE_FORMATS
                .iter()
                .find_map(|format| NaiveDate::parse_from_str(s, format).ok())
                .map(|d| d.and_time(NaiveTime::MIN))
        })
}

/// Reads a clock duration ("HH:MM:SS" or "HH:MM") as fractional hours.
pub fn parse_clock_hours(raw: &str) -> Option<f64> {
    let caps = CLOCK_DURATION.captures(raw)?;
    let hours: f64 = caps.get(2)?.as_str().parse().ok()?;
    let minutes: f64 = caps.get(3)?.as_str().parse().ok()?;
    let seconds: f64 = match caps.get(4) {
        Some(m) => m.as_str().parse().ok()?,
        None => 0.0,
    };
    let total = hours + minutes / 60.0 + seconds / 3600.0;
    Some(if caps.get(1).is_some() { -total } else { total })
}

/// Hours from a duration-like cell: clock text first, then a plain number.
pub fn duration_hours(cell: &CellValue) -> Option<f64> {
    match cell {
        CellValue::Duration(d) => Some(d.num_milliseconds() as f64 / 3_600_000.0),
        CellValue::DateTime(dt) => {
            let since_midnight = dt.time() - NaiveTime::MIN;
            Some(since_midnight.num_milliseconds() as f64 / 3_600_000.0)
        }
        CellValue::Text(s) => parse_clock_hours(s).or_else(|| parse_number(s)),
        other => other.as_f64(),
    }
}

/// Numeric coercion; anything unreadable becomes `Empty`.
pub fn to_numeric(cell: &CellValue) -> CellValue {
    match cell {
        CellValue::Int(i) => CellValue::Number(*i as f64),
        other => other.as_f64().map(CellValue::number).unwrap_or(CellValue::Empty),
    }
}
