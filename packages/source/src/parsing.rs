//! Date, coordinate and field-value parsing shared by every feed format.

use chrono::{DateTime, NaiveDate, NaiveDateTime, NaiveTime, Utc};
use serde_json::{Map, Value};

/// Datetime formats seen across city exports, tried in order.
const DATETIME_FORMATS: &[&str] = &[
    "%Y-%m-%dT%H:%M:%S%.f",
    "%Y-%m-%dT%H:%M:%S",
    "%Y-%m-%d %H:%M:%S%.f",
    "%Y-%m-%d %H:%M:%S",
    "%Y-%m-%d %H:%M",
    "%m/%d/%Y %H:%M:%S",
    "%m/%d/%Y %I:%M:%S %p",
    "%m/%d/%Y %H:%M",
];

/// Date-only formats, tried after [`DATETIME_FORMATS`].
const DATE_FORMATS: &[&str] = &["%Y-%m-%d", "%m/%d/%Y", "%Y%m%d"];

/// Returns a field as trimmed text. Numbers are rendered; empty strings,
/// nulls, and nested values yield `None`.
#[must_use]
pub fn field_text(row: &Map<String, Value>, field: &str) -> Option<String> {
    match row.get(field)? {
        Value::String(s) => {
            let trimmed = s.trim();
            (!trimmed.is_empty()).then(|| trimmed.to_string())
        }
        Value::Number(n) => Some(n.to_string()),
        Value::Bool(b) => Some(b.to_string()),
        Value::Null | Value::Array(_) | Value::Object(_) => None,
    }
}

/// Returns a field as `f64`, accepting JSON numbers or numeric strings.
#[must_use]
pub fn field_f64(row: &Map<String, Value>, field: &str) -> Option<f64> {
    let value: f64 = match row.get(field)? {
        Value::Number(n) => n.as_f64()?,
        Value::String(s) => s.trim().parse().ok()?,
        _ => return None,
    };
    value.is_finite().then_some(value)
}

/// Parses a datetime in any of the supported text formats.
///
/// Strings with an explicit offset (RFC 3339, e.g. `2023-04-02T18:20:00Z`)
/// are converted to UTC; naive strings are taken as UTC.
#[must_use]
pub fn parse_datetime(s: &str) -> Option<DateTime<Utc>> {
    let s = s.trim();
    if let Ok(dt) = DateTime::parse_from_rfc3339(s) {
        return Some(dt.with_timezone(&Utc));
    }
    for format in DATETIME_FORMATS {
        if let Ok(naive) = NaiveDateTime::parse_from_str(s, format) {
            return Some(naive.and_utc());
        }
    }
    parse_date(s).map(|date| date.and_time(NaiveTime::MIN).and_utc())
}

/// Parses a date in any of the supported date-only formats.
#[must_use]
pub fn parse_date(s: &str) -> Option<NaiveDate> {
    let s = s.trim();
    DATE_FORMATS
        .iter()
        .find_map(|format| NaiveDate::parse_from_str(s, format).ok())
}

/// Parses a time of day as `HH:MM:SS`, `HH:MM`, or a bare `HHMM` string.
#[must_use]
pub fn parse_time(s: &str) -> Option<NaiveTime> {
    let s = s.trim();
    if let Ok(t) = NaiveTime::parse_from_str(s, "%H:%M:%S") {
        return Some(t);
    }
    if let Ok(t) = NaiveTime::parse_from_str(s, "%H:%M") {
        return Some(t);
    }
    if s.len() <= 4 && s.chars().all(|c| c.is_ascii_digit()) {
        let padded = format!("{s:0>4}");
        let hours = padded[..2].parse().ok()?;
        let minutes = padded[2..].parse().ok()?;
        return NaiveTime::from_hms_opt(hours, minutes, 0);
    }
    None
}

/// Converts epoch milliseconds to a UTC timestamp.
#[must_use]
#[allow(clippy::cast_possible_truncation)]
pub fn parse_epoch_ms(ms: f64) -> Option<DateTime<Utc>> {
    if !ms.is_finite() {
        return None;
    }
    DateTime::from_timestamp_millis(ms as i64)
}

/// Validates a latitude/longitude pair. Rejects zero (the usual "unknown"
/// sentinel in city exports) and values outside WGS84 ranges.
#[must_use]
pub fn validate_lat_lng(lat: f64, lng: f64) -> Option<(f64, f64)> {
    if lat == 0.0 || lng == 0.0 {
        return None;
    }
    if !(-90.0..=90.0).contains(&lat) || !(-180.0..=180.0).contains(&lng) {
        return None;
    }
    Some((lat, lng))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_rfc3339_with_zulu() {
        let dt = parse_datetime("2023-04-02T18:20:00.000Z").unwrap();
        assert_eq!(dt.to_string(), "2023-04-02 18:20:00 UTC");
    }

    #[test]
    fn parses_offset_into_utc() {
        let dt = parse_datetime("2023-04-02T14:20:00-04:00").unwrap();
        assert_eq!(dt.to_string(), "2023-04-02 18:20:00 UTC");
    }

    #[test]
    fn parses_us_style_dates() {
        let dt = parse_datetime("01/15/2024 02:30:00 PM").unwrap();
        assert_eq!(dt.to_string(), "2024-01-15 14:30:00 UTC");
        let midnight = parse_datetime("01/15/2024").unwrap();
        assert_eq!(midnight.to_string(), "2024-01-15 00:00:00 UTC");
    }

    #[test]
    fn rejects_garbage_dates() {
        assert!(parse_datetime("yesterday").is_none());
    }

    #[test]
    fn parses_hhmm_times() {
        assert_eq!(parse_time("930"), NaiveTime::from_hms_opt(9, 30, 0));
        assert_eq!(parse_time("23:05"), NaiveTime::from_hms_opt(23, 5, 0));
        assert!(parse_time("2561").is_none());
    }

    #[test]
    fn reads_numeric_fields_from_strings_and_numbers() {
        let row: Map<String, Value> =
            serde_json::from_str(r#"{"a":"39.77","b":-86.1,"c":"n/a","d":""}"#).unwrap();
        assert_eq!(field_f64(&row, "a"), Some(39.77));
        assert_eq!(field_f64(&row, "b"), Some(-86.1));
        assert_eq!(field_f64(&row, "c"), None);
        assert_eq!(field_text(&row, "d"), None);
        assert_eq!(field_text(&row, "b").as_deref(), Some("-86.1"));
    }

    #[test]
    fn rejects_zero_and_out_of_range_coordinates() {
        assert!(validate_lat_lng(0.0, -86.1).is_none());
        assert!(validate_lat_lng(95.0, -86.1).is_none());
        assert!(validate_lat_lng(39.7, -186.1).is_none());
        assert_eq!(validate_lat_lng(39.7, -86.1), Some((39.7, -86.1)));
    }
}
