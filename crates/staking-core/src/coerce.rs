//! Defensive coercion of loosely typed payload values
//!
//! Upstream payloads are untrusted JSON: numbers may arrive as text, booleans
//! or nulls, and timestamps as epoch milliseconds or free-form strings.
//! Nothing in here fails. Bad input degrades to NaN (for raw casts), zero,
//! or `None`.

use std::collections::BTreeMap;

use chrono::{DateTime, NaiveDate, NaiveDateTime, SecondsFormat, Utc};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Deserializer, Serialize};
use serde_json::Value;

/// Largest absolute epoch offset a timestamp may carry (100M days, in ms).
const MAX_EPOCH_MILLIS: f64 = 8.64e15;

/// Naive date-time layouts accepted as UTC, tried in order.
const NAIVE_LAYOUTS: [&str; 5] = [
    "%Y-%m-%dT%H:%M:%S%.f",
    "%Y-%m-%dT%H:%M:%S",
    "%Y-%m-%dT%H:%M",
    "%Y-%m-%d %H:%M:%S%.f",
    "%Y-%m-%d %H:%M:%S",
];

// =============================================================================
// Numbers
// =============================================================================

/// A numeric field as it arrives on the wire.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum RawNumber {
    Number(f64),
    Text(String),
    Flag(bool),
    Other(Value),
}

impl RawNumber {
    /// Numeric cast. Unparseable text and structured values give NaN, so the
    /// result may be non-finite.
    pub fn to_f64(&self) -> f64 {
        match self {
            RawNumber::Number(n) => *n,
            RawNumber::Text(s) => parse_numeric_text(s),
            RawNumber::Flag(b) => bool_to_f64(*b),
            RawNumber::Other(v) => value_to_f64(v),
        }
    }

    /// Numeric cast with non-finite results replaced by zero.
    pub fn to_finite(&self) -> f64 {
        finite_or_zero(self.to_f64())
    }

    /// The cast value, only if it is finite.
    pub fn finite(&self) -> Option<f64> {
        Some(self.to_f64()).filter(|v| v.is_finite())
    }
}

impl From<f64> for RawNumber {
    fn from(value: f64) -> Self {
        RawNumber::Number(value)
    }
}

impl From<&str> for RawNumber {
    fn from(value: &str) -> Self {
        RawNumber::Text(value.to_string())
    }
}

/// The shared `NaN`/`Infinity` guard. Every sum and output goes through here.
pub fn finite_or_zero(value: f64) -> f64 {
    if value.is_finite() {
        value
    } else {
        0.0
    }
}

/// Reads an optional payload field as a finite number.
pub fn read(field: &Option<RawNumber>) -> Option<f64> {
    field.as_ref().and_then(RawNumber::finite)
}

/// Reads an optional payload field, defaulting to zero.
pub fn read_or_zero(field: &Option<RawNumber>) -> f64 {
    read(field).unwrap_or(0.0)
}

/// First finite candidate of a fallback chain.
pub fn first_finite<I>(candidates: I) -> Option<f64>
where
    I: IntoIterator<Item = Option<f64>>,
{
    candidates.into_iter().flatten().find(|v| v.is_finite())
}

/// First strictly positive candidate of a fallback chain.
pub fn first_positive<I>(candidates: I) -> Option<f64>
where
    I: IntoIterator<Item = Option<f64>>,
{
    candidates
        .into_iter()
        .flatten()
        .find(|v| v.is_finite() && *v > 0.0)
}

/// Non-negative whole count from a loosely typed number.
pub fn count_or_zero(value: f64) -> u64 {
    finite_or_zero(value).max(0.0).round() as u64
}

fn bool_to_f64(value: bool) -> f64 {
    if value {
        1.0
    } else {
        0.0
    }
}

fn value_to_f64(value: &Value) -> f64 {
    match value {
        Value::Null => 0.0,
        Value::Bool(b) => bool_to_f64(*b),
        Value::Number(n) => n.as_f64().unwrap_or(f64::NAN),
        Value::String(s) => parse_numeric_text(s),
        Value::Array(items) => match items.as_slice() {
            [] => 0.0,
            [single] => value_to_f64(single),
            _ => f64::NAN,
        },
        Value::Object(_) => f64::NAN,
    }
}

fn parse_numeric_text(text: &str) -> f64 {
    let trimmed = text.trim();
    if trimmed.is_empty() {
        return 0.0;
    }

    match trimmed {
        "Infinity" | "+Infinity" => return f64::INFINITY,
        "-Infinity" => return f64::NEG_INFINITY,
        _ => {}
    }

    if let Some(hex) = trimmed
        .strip_prefix("0x")
        .or_else(|| trimmed.strip_prefix("0X"))
    {
        return u64::from_str_radix(hex, 16)
            .map(|v| v as f64)
            .unwrap_or(f64::NAN);
    }

    // Rust accepts "inf" and "nan" spellings that must stay invalid here.
    let lower = trimmed.to_ascii_lowercase();
    if lower.contains("inf") || lower.contains("nan") {
        return f64::NAN;
    }

    trimmed.parse::<f64>().unwrap_or(f64::NAN)
}

// =============================================================================
// Timestamps
// =============================================================================

/// A timestamp field as it arrives on the wire.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum RawTimestamp {
    Millis(f64),
    Text(String),
    Other(Value),
}

impl RawTimestamp {
    /// Parses into a UTC instant. Anything unrecognised yields `None`.
    pub fn parse(&self) -> Option<DateTime<Utc>> {
        match self {
            RawTimestamp::Millis(ms) => from_epoch_millis(*ms),
            RawTimestamp::Text(s) => parse_timestamp_text(s),
            RawTimestamp::Other(Value::Number(n)) => n.as_f64().and_then(from_epoch_millis),
            RawTimestamp::Other(_) => None,
        }
    }
}

impl From<&str> for RawTimestamp {
    fn from(value: &str) -> Self {
        RawTimestamp::Text(value.to_string())
    }
}

/// Parses an optional payload timestamp.
pub fn read_timestamp(field: &Option<RawTimestamp>) -> Option<DateTime<Utc>> {
    field.as_ref().and_then(RawTimestamp::parse)
}

/// ISO-8601 in UTC with millisecond precision, e.g. `2024-01-02T00:00:00.000Z`.
pub fn format_iso(ts: &DateTime<Utc>) -> String {
    ts.to_rfc3339_opts(SecondsFormat::Millis, true)
}

fn from_epoch_millis(ms: f64) -> Option<DateTime<Utc>> {
    if !ms.is_finite() || ms.abs() > MAX_EPOCH_MILLIS {
        return None;
    }
    DateTime::from_timestamp_millis(ms.trunc() as i64)
}

fn parse_timestamp_text(text: &str) -> Option<DateTime<Utc>> {
    let trimmed = text.trim();
    if trimmed.is_empty() {
        return None;
    }

    if let Ok(dt) = DateTime::parse_from_rfc3339(trimmed) {
        return Some(dt.with_timezone(&Utc));
    }

    for layout in NAIVE_LAYOUTS {
        if let Ok(naive) = NaiveDateTime::parse_from_str(trimmed, layout) {
            return Some(naive.and_utc());
        }
    }

    if let Some(date) = parse_date_only(trimmed) {
        return date.and_hms_opt(0, 0, 0).map(|naive| naive.and_utc());
    }

    DateTime::parse_from_rfc2822(trimmed)
        .ok()
        .map(|dt| dt.with_timezone(&Utc))
}

/// `YYYY-MM-DD`, `YYYY-MM` or `YYYY`; missing parts are the first month or day.
fn parse_date_only(text: &str) -> Option<NaiveDate> {
    let bytes = text.as_bytes();
    let digits = |range: std::ops::Range<usize>| bytes[range].iter().all(u8::is_ascii_digit);

    let full = match bytes.len() {
        7 if digits(0..4) && bytes[4] == b'-' && digits(5..7) => format!("{}-01", text),
        4 if digits(0..4) => format!("{}-01-01", text),
        _ => return NaiveDate::parse_from_str(text, "%Y-%m-%d").ok(),
    };
    NaiveDate::parse_from_str(&full, "%Y-%m-%d").ok()
}

/// Serde adapter: `Option<DateTime<Utc>>` as an ISO string, or `""` when absent.
pub mod iso_or_empty {
    use super::*;
    use serde::Serializer;

    pub fn serialize<S>(value: &Option<DateTime<Utc>>, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        match value {
            Some(ts) => serializer.serialize_str(&format_iso(ts)),
            None => serializer.serialize_str(""),
        }
    }

    pub fn deserialize<'de, D>(deserializer: D) -> Result<Option<DateTime<Utc>>, D::Error>
    where
        D: Deserializer<'de>,
    {
        let raw = Option::<RawTimestamp>::deserialize(deserializer)?;
        Ok(raw.as_ref().and_then(RawTimestamp::parse))
    }
}

// =============================================================================
// Strings
// =============================================================================

/// Accepts any JSON scalar as a string; `null` and missing become `""`.
pub fn lenient_string<'de, D>(deserializer: D) -> Result<String, D::Error>
where
    D: Deserializer<'de>,
{
    let value = Option::<Value>::deserialize(deserializer)?;
    Ok(match value {
        None | Some(Value::Null) => String::new(),
        Some(Value::String(s)) => s,
        Some(other) => other.to_string(),
    })
}

// =============================================================================
// Structured fields
// =============================================================================

/// A nested record that only counts when it has the expected shape. Anything
/// else reads as absent instead of failing the whole payload.
pub fn lenient_option<'de, D, T>(deserializer: D) -> Result<Option<T>, D::Error>
where
    D: Deserializer<'de>,
    T: DeserializeOwned,
{
    let value = Value::deserialize(deserializer)?;
    Ok(serde_json::from_value(value).ok())
}

/// A list whose malformed elements are dropped. A non-array reads as absent.
pub fn lenient_list<'de, D, T>(deserializer: D) -> Result<Option<Vec<T>>, D::Error>
where
    D: Deserializer<'de>,
    T: DeserializeOwned,
{
    let Value::Array(items) = Value::deserialize(deserializer)? else {
        return Ok(None);
    };

    let total = items.len();
    let kept: Vec<T> = items
        .into_iter()
        .filter_map(|item| serde_json::from_value(item).ok())
        .collect();
    if kept.len() < total {
        tracing::debug!(dropped = total - kept.len(), "Skipped malformed list elements");
    }
    Ok(Some(kept))
}

/// A keyed record map whose malformed values are dropped. A non-object reads
/// as absent.
pub fn lenient_map<'de, D, T>(deserializer: D) -> Result<Option<BTreeMap<String, T>>, D::Error>
where
    D: Deserializer<'de>,
    T: DeserializeOwned,
{
    let Value::Object(entries) = Value::deserialize(deserializer)? else {
        return Ok(None);
    };

    Ok(Some(
        entries
            .into_iter()
            .filter_map(|(key, value)| serde_json::from_value(value).ok().map(|v| (key, v)))
            .collect(),
    ))
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    #[test]
    fn test_numeric_cast() {
        assert_eq!(RawNumber::from(12.5).to_f64(), 12.5);
        assert_eq!(RawNumber::from(" 42 ").to_f64(), 42.0);
        assert_eq!(RawNumber::from("").to_f64(), 0.0);
        assert_eq!(RawNumber::from("0x10").to_f64(), 16.0);
        assert_eq!(RawNumber::Flag(true).to_f64(), 1.0);
        assert_eq!(RawNumber::Other(Value::Null).to_f64(), 0.0);
        assert!(RawNumber::from("abc").to_f64().is_nan());
        assert!(RawNumber::from("nan").to_f64().is_nan());
        assert!(RawNumber::from("inf").to_f64().is_nan());
        assert_eq!(RawNumber::from("-Infinity").to_f64(), f64::NEG_INFINITY);
    }

    #[test]
    fn test_non_finite_becomes_zero() {
        assert_eq!(RawNumber::from(f64::NAN).to_finite(), 0.0);
        assert_eq!(RawNumber::from(f64::INFINITY).to_finite(), 0.0);
        assert_eq!(RawNumber::from("Infinity").to_finite(), 0.0);
        assert_eq!(RawNumber::from(f64::NAN).finite(), None);
        assert_eq!(finite_or_zero(-3.0), -3.0);
    }

    #[test]
    fn test_fallback_chains() {
        assert_eq!(first_finite([None, Some(f64::NAN), Some(2.0)]), Some(2.0));
        assert_eq!(first_finite([Some(0.0), Some(5.0)]), Some(0.0));
        assert_eq!(first_positive([Some(0.0), Some(-1.0), Some(5.0)]), Some(5.0));
        assert_eq!(first_finite::<[Option<f64>; 0]>([]), None);
    }

    #[test]
    fn test_count_or_zero() {
        assert_eq!(count_or_zero(3.4), 3);
        assert_eq!(count_or_zero(-2.0), 0);
        assert_eq!(count_or_zero(f64::NAN), 0);
    }

    #[test]
    fn test_raw_number_deserialize() {
        let values: Vec<RawNumber> = serde_json::from_str(r#"[1, "2", true, {"a": 1}]"#).unwrap();
        assert_eq!(values[0].to_f64(), 1.0);
        assert_eq!(values[1].to_f64(), 2.0);
        assert_eq!(values[2].to_f64(), 1.0);
        assert!(values[3].to_f64().is_nan());
    }

    #[test]
    fn test_timestamp_formats() {
        let expected = Utc.with_ymd_and_hms(2024, 1, 2, 0, 0, 0).unwrap();
        for text in [
            "2024-01-02T00:00:00Z",
            "2024-01-02T00:00:00.000Z",
            "2024-01-02T02:00:00+02:00",
            "2024-01-02T00:00:00",
            "2024-01-02 00:00:00",
            "2024-01-02",
            "Tue, 2 Jan 2024 00:00:00 +0000",
        ] {
            assert_eq!(RawTimestamp::from(text).parse(), Some(expected), "{}", text);
        }

        let month_start = Utc.with_ymd_and_hms(2024, 3, 1, 0, 0, 0).unwrap();
        assert_eq!(RawTimestamp::from("2024-03").parse(), Some(month_start));
        let year_start = Utc.with_ymd_and_hms(2024, 1, 1, 0, 0, 0).unwrap();
        assert_eq!(RawTimestamp::from("2024").parse(), Some(year_start));

        let millis = RawTimestamp::Millis(expected.timestamp_millis() as f64);
        assert_eq!(millis.parse(), Some(expected));
    }

    #[test]
    fn test_unparseable_timestamps() {
        assert_eq!(RawTimestamp::from("").parse(), None);
        assert_eq!(RawTimestamp::from("yesterday").parse(), None);
        assert_eq!(RawTimestamp::from("2024-13").parse(), None);
        assert_eq!(RawTimestamp::from("2024-1").parse(), None);
        assert_eq!(RawTimestamp::from("24").parse(), None);
        assert_eq!(RawTimestamp::Millis(f64::NAN).parse(), None);
        assert_eq!(RawTimestamp::Millis(1e17).parse(), None);
        assert_eq!(RawTimestamp::Other(Value::Bool(true)).parse(), None);
    }

    #[derive(Debug, Deserialize)]
    struct Holder {
        #[serde(default, deserialize_with = "lenient_option")]
        name: Option<String>,
        #[serde(default, deserialize_with = "lenient_list")]
        items: Option<Vec<Holder>>,
        #[serde(default, deserialize_with = "lenient_map")]
        named: Option<BTreeMap<String, Holder>>,
    }

    #[test]
    fn test_lenient_structured_fields() {
        let holder: Holder = serde_json::from_str(
            r#"{"name": 5, "items": [{"name": "a"}, null, 3, {}], "named": {"x": {}, "y": "bad"}}"#,
        )
        .unwrap();
        assert_eq!(holder.name, None);

        let items = holder.items.unwrap();
        assert_eq!(items.len(), 2);
        assert_eq!(items[0].name.as_deref(), Some("a"));

        let named = holder.named.unwrap();
        assert_eq!(named.keys().collect::<Vec<_>>(), vec!["x"]);

        let shapeless: Holder = serde_json::from_str(r#"{"items": {}, "named": []}"#).unwrap();
        assert!(shapeless.items.is_none());
        assert!(shapeless.named.is_none());
    }

    #[test]
    fn test_format_iso() {
        let ts = Utc.with_ymd_and_hms(2024, 1, 3, 12, 30, 0).unwrap();
        assert_eq!(format_iso(&ts), "2024-01-03T12:30:00.000Z");
    }
}
