//! Generic wire values.
//!
//! Every value crossing the transport boundary is a [`WireValue`]: the
//! weakly-typed union of primitives, arrays and string-keyed structs that
//! both the XML-RPC and JSON-RPC encodings of the API can carry.

use std::collections::BTreeMap;
use std::fmt;

use chrono::{DateTime, NaiveDateTime, Utc};

/// Datetime layout used by the API on the wire (`20240131T08:15:00Z`).
pub const DATETIME_FORMAT: &str = "%Y%m%dT%H:%M:%SZ";

/// A weakly-typed value as produced or consumed by a transport.
#[derive(Debug, Clone, PartialEq)]
pub enum WireValue {
    /// Absent value (JSON `null`, XML-RPC `<nil/>`)
    Nil,
    String(String),
    Int(i64),
    Double(f64),
    Bool(bool),
    DateTime(DateTime<Utc>),
    Array(Vec<WireValue>),
    Struct(BTreeMap<String, WireValue>),
}

impl WireValue {
    /// Name of the wire shape, used in decode errors.
    pub fn kind(&self) -> &'static str {
        match self {
            WireValue::Nil => "nil",
            WireValue::String(_) => "string",
            WireValue::Int(_) => "int",
            WireValue::Double(_) => "double",
            WireValue::Bool(_) => "bool",
            WireValue::DateTime(_) => "datetime",
            WireValue::Array(_) => "array",
            WireValue::Struct(_) => "struct",
        }
    }

    pub fn as_str(&self) -> Option<&str> {
        match self {
            WireValue::String(s) => Some(s),
            _ => None,
        }
    }

    pub fn as_array(&self) -> Option<&[WireValue]> {
        match self {
            WireValue::Array(items) => Some(items),
            _ => None,
        }
    }

    pub fn as_struct(&self) -> Option<&BTreeMap<String, WireValue>> {
        match self {
            WireValue::Struct(fields) => Some(fields),
            _ => None,
        }
    }

    /// Look up a member of a struct value.
    pub fn get(&self, key: &str) -> Option<&WireValue> {
        self.as_struct().and_then(|fields| fields.get(key))
    }

    pub fn is_nil(&self) -> bool {
        matches!(self, WireValue::Nil)
    }

    /// Build a struct value from `(key, value)` pairs.
    pub fn structure<I, K>(members: I) -> Self
    where
        I: IntoIterator<Item = (K, WireValue)>,
        K: Into<String>,
    {
        WireValue::Struct(members.into_iter().map(|(k, v)| (k.into(), v)).collect())
    }
}

impl From<&str> for WireValue {
    fn from(value: &str) -> Self {
        WireValue::String(value.to_string())
    }
}

impl From<String> for WireValue {
    fn from(value: String) -> Self {
        WireValue::String(value)
    }
}

impl From<i64> for WireValue {
    fn from(value: i64) -> Self {
        WireValue::Int(value)
    }
}

impl From<f64> for WireValue {
    fn from(value: f64) -> Self {
        WireValue::Double(value)
    }
}

impl From<bool> for WireValue {
    fn from(value: bool) -> Self {
        WireValue::Bool(value)
    }
}

impl From<DateTime<Utc>> for WireValue {
    fn from(value: DateTime<Utc>) -> Self {
        WireValue::DateTime(value)
    }
}

impl From<Vec<WireValue>> for WireValue {
    fn from(value: Vec<WireValue>) -> Self {
        WireValue::Array(value)
    }
}

impl fmt::Display for WireValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            WireValue::Nil => write!(f, "nil"),
            WireValue::String(s) => write!(f, "{}", s),
            WireValue::Int(i) => write!(f, "{}", i),
            WireValue::Double(d) => write!(f, "{}", d),
            WireValue::Bool(b) => write!(f, "{}", b),
            WireValue::DateTime(dt) => write!(f, "{}", format_datetime(dt)),
            WireValue::Array(items) => {
                write!(f, "[")?;
                for (i, item) in items.iter().enumerate() {
                    if i > 0 {
                        write!(f, ", ")?;
                    }
                    write!(f, "{}", item)?;
                }
                write!(f, "]")
            }
            WireValue::Struct(fields) => {
                write!(f, "{{")?;
                for (i, (key, value)) in fields.iter().enumerate() {
                    if i > 0 {
                        write!(f, ", ")?;
                    }
                    write!(f, "{}: {}", key, value)?;
                }
                write!(f, "}}")
            }
        }
    }
}

/// Render a datetime in the API's wire layout.
pub fn format_datetime(dt: &DateTime<Utc>) -> String {
    dt.format(DATETIME_FORMAT).to_string()
}

/// Parse a datetime string as sent by the server.
///
/// Accepts the compact `YYYYMMDDTHH:MM:SSZ` layout (with or without the
/// trailing `Z` and an optional fractional part), RFC 3339, and seconds
/// since the epoch as used in event timestamps.
pub fn parse_datetime(raw: &str) -> Option<DateTime<Utc>> {
    const LAYOUTS: [&str; 4] = [
        "%Y%m%dT%H:%M:%SZ",
        "%Y%m%dT%H:%M:%S%.fZ",
        "%Y%m%dT%H:%M:%S",
        "%Y%m%dT%H:%M:%S%.f",
    ];

    for layout in LAYOUTS {
        if let Ok(naive) = NaiveDateTime::parse_from_str(raw, layout) {
            return Some(naive.and_utc());
        }
    }

    if let Ok(dt) = DateTime::parse_from_rfc3339(raw) {
        return Some(dt.with_timezone(&Utc));
    }

    let seconds: f64 = raw.trim().parse().ok()?;
    if !seconds.is_finite() {
        return None;
    }
    let whole = seconds.floor();
    let nanos = ((seconds - whole) * 1e9).round().min(999_999_999.0) as u32;
    DateTime::from_timestamp(whole as i64, nanos)
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    #[test]
    fn test_parse_compact_datetime() {
        let expected = Utc.with_ymd_and_hms(2024, 1, 31, 8, 15, 0).unwrap();
        assert_eq!(parse_datetime("20240131T08:15:00Z"), Some(expected));
        assert_eq!(parse_datetime("20240131T08:15:00"), Some(expected));
        assert_eq!(parse_datetime("2024-01-31T08:15:00+00:00"), Some(expected));
        assert_eq!(parse_datetime("yesterday"), None);
        assert_eq!(parse_datetime("1706688900.000"), Some(expected));
    }

    #[test]
    fn test_parse_epoch_seconds() {
        assert_eq!(parse_datetime("-1.5"), DateTime::from_timestamp_millis(-1500));
        assert_eq!(parse_datetime("-2"), DateTime::from_timestamp(-2, 0));
        assert_eq!(
            parse_datetime("1706688900.25"),
            DateTime::from_timestamp_millis(1_706_688_900_250)
        );
        assert_eq!(parse_datetime("NaN"), None);
    }

    #[test]
    fn test_format_datetime() {
        let dt = Utc.with_ymd_and_hms(1970, 1, 1, 0, 0, 0).unwrap();
        assert_eq!(format_datetime(&dt), "19700101T00:00:00Z");
    }

    #[test]
    fn test_struct_lookup() {
        let value = WireValue::structure([("Status", WireValue::from("Success"))]);
        assert_eq!(value.get("Status").and_then(WireValue::as_str), Some("Success"));
        assert!(value.get("Value").is_none());
        assert_eq!(value.kind(), "struct");
    }
}
