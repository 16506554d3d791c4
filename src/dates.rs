use std::sync::OnceLock;

use chrono::{NaiveDate, NaiveDateTime};
use regex::Regex;
use serde::Serialize;
use tracing::debug;

/// Where a [`DateStamp`] came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum DateSource {
    Parsed,
    /// Nothing parsed; the value is a stand-in so the row still sorts and
    /// compares.
    Fallback,
}

/// A comparable timestamp that remembers whether it was actually parsed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct DateStamp {
    pub at: NaiveDateTime,
    pub source: DateSource,
}

impl DateStamp {
    pub fn parsed(at: NaiveDateTime) -> Self {
        Self { at, source: DateSource::Parsed }
    }

    pub fn fallback(at: NaiveDateTime) -> Self {
        Self { at, source: DateSource::Fallback }
    }

    pub fn is_parsed(&self) -> bool {
        self.source == DateSource::Parsed
    }
}

/// Fallback for FEP rows whose date cannot be read.
pub fn fep_sentinel() -> NaiveDateTime {
    NaiveDate::from_ymd_opt(1900, 1, 1)
        .and_then(|d| d.and_hms_opt(0, 0, 0))
        .unwrap_or(NaiveDateTime::MIN)
}

/// Fallback for GL rows whose date cannot be read.
pub fn gl_sentinel() -> NaiveDateTime {
    chrono::Local::now().naive_local()
}

pub fn excel_serial_to_datetime(serial: f64) -> Option<NaiveDateTime> {
    // Excel epoch is 1899-12-30 (accounting for the 1900 leap year bug)
    let base = NaiveDate::from_ymd_opt(1899, 12, 30)?.and_hms_opt(0, 0, 0)?;
    let millis = (serial * 86_400_000.0).round() as i64;
    base.checked_add_signed(chrono::Duration::milliseconds(millis))
}

/// Parse free-form date text against the configured formats, trying
/// date-time formats first and date-only formats at midnight, then a few
/// generic shapes (RFC 3339, spreadsheet serial numbers).
pub fn parse_datetime(raw: &str, formats: &[String]) -> Option<NaiveDateTime> {
    let s = raw.trim();
    if s.is_empty() {
        return None;
    }
    for fmt in formats {
        if let Ok(dt) = NaiveDateTime::parse_from_str(s, fmt) {
            return Some(dt);
        }
        if let Ok(d) = NaiveDate::parse_from_str(s, fmt) {
            return d.and_hms_opt(0, 0, 0);
        }
    }
    if let Ok(dt) = chrono::DateTime::parse_from_rfc3339(s) {
        return Some(dt.naive_local());
    }
    // Spreadsheet serials for dates between 1954 and 2173.
    if let Ok(serial) = s.parse::<f64>() {
        if (20_000.0..100_000.0).contains(&serial) {
            return excel_serial_to_datetime(serial);
        }
    }
    None
}

fn embedded_patterns() -> &'static [Regex; 2] {
    static RE: OnceLock<[Regex; 2]> = OnceLock::new();
    RE.get_or_init(|| {
        [
            Regex::new(r"(\d{4}-\d{1,2}-\d{1,2})\s*/\s*(\d{1,2}:\d{2}\s*[AaPp][Mm])")
                .expect("static pattern"),
            Regex::new(r"(\d{1,2}/\d{1,2}/\d{4})\s*/\s*(\d{1,2}:\d{2}\s*[AaPp][Mm])")
                .expect("static pattern"),
        ]
    })
}

/// Find a `date / h:mmAM` stamp inside a GL narration, e.g.
/// `CASH LOAD 2024-03-01 / 8:05AM` or `UNLOAD 03/31/2024 / 5:40 pm`.
pub fn extract_embedded_datetime(text: &str, formats: &[String]) -> Option<NaiveDateTime> {
    for re in embedded_patterns() {
        if let Some(caps) = re.captures(text) {
            let time: String = caps[2]
                .chars()
                .filter(|c| !c.is_whitespace())
                .collect::<String>()
                .to_uppercase();
            let candidate = format!("{} {}", &caps[1], time);
            if let Some(dt) = parse_datetime(&candidate, formats) {
                return Some(dt);
            }
        }
    }
    None
}

/// Timestamp for a GL line: the stamp embedded in its narration, then its
/// date column, then the current time.
pub fn gl_datetime(description: &str, date_cell: &str, formats: &[String]) -> DateStamp {
    extract_embedded_datetime(description, formats)
        .or_else(|| parse_datetime(date_cell, formats))
        .map(DateStamp::parsed)
        .unwrap_or_else(|| {
            debug!(description, date_cell, "unparseable GL date, using current time");
            DateStamp::fallback(gl_sentinel())
        })
}
