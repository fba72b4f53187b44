//! Scalar coercions: timestamps, tri-state booleans, device labels, URL paths.

#![allow(missing_docs)]

use chrono::{DateTime, FixedOffset, NaiveDate, NaiveDateTime, TimeZone, Utc};
use url::Url;

use crate::ingest::gviz::parse_gviz_date;
use crate::ingest::row::Scalar;
use crate::normalize::record::DeviceType;

const TRUTHY: [&str; 4] = ["true", "yes", "sim", "1"];

/// Smallest epoch number accepted as a timestamp (2001-09-09 in seconds).
/// Bare years, spreadsheet serials and counters fall below it.
const EPOCH_FLOOR: f64 = 1_000_000_000.0;

/// Below this magnitude an epoch number is read as seconds rather than millis.
const EPOCH_SECONDS_CEILING: f64 = 100_000_000_000.0;

const NAIVE_DATETIME_FORMATS: [&str; 7] = [
    "%Y-%m-%dT%H:%M:%S%.f",
    "%Y-%m-%dT%H:%M",
    "%Y-%m-%d %H:%M:%S%.f",
    "%Y-%m-%d %H:%M",
    "%d/%m/%Y %H:%M:%S",
    "%d/%m/%Y %H:%M",
    "%Y/%m/%d %H:%M:%S",
];

const NAIVE_DATE_FORMATS: [&str; 3] = ["%Y-%m-%d", "%d/%m/%Y", "%Y/%m/%d"];

/// Resolve a cell into an absolute instant.
///
/// Zone-less values are read as wall-clock time at `offset`.
#[must_use]
pub fn parse_timestamp(value: &Scalar, offset: FixedOffset) -> Option<DateTime<Utc>> {
    match value {
        Scalar::Null | Scalar::Bool(_) => None,
        Scalar::DateTime(naive) => from_local(*naive, offset),
        Scalar::Number(n) => from_epoch_number(*n),
        Scalar::Text(text) => parse_timestamp_text(text.trim(), offset),
    }
}

fn parse_timestamp_text(text: &str, offset: FixedOffset) -> Option<DateTime<Utc>> {
    if text.is_empty() {
        return None;
    }
    if let Ok(dt) = DateTime::parse_from_rfc3339(text) {
        return Some(dt.with_timezone(&Utc));
    }
    if let Ok(dt) = DateTime::parse_from_rfc2822(text) {
        return Some(dt.with_timezone(&Utc));
    }
    if let Some(naive) = parse_gviz_date(text) {
        return from_local(naive, offset);
    }
    for format in NAIVE_DATETIME_FORMATS {
        if let Ok(naive) = NaiveDateTime::parse_from_str(text, format) {
            return from_local(naive, offset);
        }
    }
    for format in NAIVE_DATE_FORMATS {
        if let Ok(date) = NaiveDate::parse_from_str(text, format) {
            return from_local(date.and_hms_opt(0, 0, 0)?, offset);
        }
    }
    if let Ok(n) = text.parse::<f64>() {
        return from_epoch_number(n);
    }
    None
}

#[allow(clippy::cast_possible_truncation)]
fn from_epoch_number(n: f64) -> Option<DateTime<Utc>> {
    if !n.is_finite() || n < EPOCH_FLOOR {
        return None;
    }
    let millis = if n < EPOCH_SECONDS_CEILING {
        n * 1_000.0
    } else {
        n
    };
    DateTime::from_timestamp_millis(millis.round() as i64)
}

fn from_local(naive: NaiveDateTime, offset: FixedOffset) -> Option<DateTime<Utc>> {
    offset
        .from_local_datetime(&naive)
        .single()
        .map(|dt| dt.with_timezone(&Utc))
}

/// Tri-state coercion: absent → `None`, truthy token → `true`, anything else → `false`.
#[must_use]
pub fn parse_bool(value: Option<&Scalar>) -> Option<bool> {
    let value = value.filter(|v| v.is_present())?;
    if let Scalar::Bool(b) = value {
        return Some(*b);
    }
    let normalized = value.to_string().trim().to_lowercase();
    Some(TRUTHY.contains(&normalized.as_str()))
}

/// Map free-form device text onto a [`DeviceType`].
#[must_use]
pub fn normalize_device_type(value: Option<&str>) -> DeviceType {
    let Some(raw) = value.filter(|v| !v.is_empty()) else {
        return DeviceType::Unknown;
    };
    let normalized = raw.to_lowercase();
    if normalized.contains("mobile") {
        DeviceType::Mobile
    } else if normalized.contains("tablet") || normalized.contains("ipad") {
        DeviceType::Tablet
    } else if normalized.contains("desktop") {
        DeviceType::Desktop
    } else {
        DeviceType::Unknown
    }
}

/// Path component of an absolute URL; empty when the URL does not parse.
#[must_use]
pub fn extract_path(url: &str) -> String {
    if url.is_empty() {
        return String::new();
    }
    Url::parse(url).map_or_else(|_| String::new(), |parsed| parsed.path().to_string())
}
