//! Source Value Coercion
//!
//! Upstream documents are loosely typed: prices arrive as numbers or numeric
//! strings, timestamps as ISO-8601 text or unix seconds. These `serde`
//! helpers accept every observed shape and reject anything else with a
//! regular decode error.

use std::fmt;

use chrono::{DateTime, NaiveDate, NaiveDateTime, Utc};
use serde::Deserializer;
use serde::de::{self, Visitor};

/// Parse the timestamp text forms found in documents and row stores.
///
/// Accepts RFC 3339 with an offset, naive date-times with a `T` or space
/// separator (interpreted as UTC, optional fractional seconds), and bare
/// dates (midnight UTC).
#[must_use]
pub fn parse_timestamp(text: &str) -> Option<DateTime<Utc>> {
    let text = text.trim();

    if let Ok(parsed) = DateTime::parse_from_rfc3339(text) {
        return Some(parsed.with_timezone(&Utc));
    }

    for format in ["%Y-%m-%dT%H:%M:%S%.f", "%Y-%m-%d %H:%M:%S%.f"] {
        if let Ok(naive) = NaiveDateTime::parse_from_str(text, format) {
            return Some(naive.and_utc());
        }
    }

    NaiveDate::parse_from_str(text, "%Y-%m-%d")
        .ok()
        .and_then(|date| date.and_hms_opt(0, 0, 0))
        .map(|naive| naive.and_utc())
}

fn from_unix_seconds<E: de::Error>(seconds: i64) -> Result<DateTime<Utc>, E> {
    DateTime::from_timestamp(seconds, 0)
        .ok_or_else(|| E::custom(format!("timestamp out of range: {seconds}")))
}

// =============================================================================
// Timestamp
// =============================================================================

struct TimestampVisitor;

impl Visitor<'_> for TimestampVisitor {
    type Value = DateTime<Utc>;

    fn expecting(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("an ISO-8601 timestamp or unix seconds")
    }

    fn visit_str<E: de::Error>(self, v: &str) -> Result<Self::Value, E> {
        parse_timestamp(v).ok_or_else(|| E::custom(format!("invalid timestamp: {v}")))
    }

    fn visit_i64<E: de::Error>(self, v: i64) -> Result<Self::Value, E> {
        from_unix_seconds(v)
    }

    fn visit_u64<E: de::Error>(self, v: u64) -> Result<Self::Value, E> {
        let seconds = i64::try_from(v).map_err(|_| E::custom(format!("timestamp out of range: {v}")))?;
        from_unix_seconds(seconds)
    }

    #[allow(clippy::cast_possible_truncation)]
    fn visit_f64<E: de::Error>(self, v: f64) -> Result<Self::Value, E> {
        if !v.is_finite() {
            return Err(E::custom(format!("invalid timestamp: {v}")));
        }
        from_unix_seconds(v.trunc() as i64)
    }
}

/// Deserialize a candle timestamp.
pub fn timestamp<'de, D>(deserializer: D) -> Result<DateTime<Utc>, D::Error>
where
    D: Deserializer<'de>,
{
    deserializer.deserialize_any(TimestampVisitor)
}

// =============================================================================
// Float
// =============================================================================

struct FloatVisitor;

impl Visitor<'_> for FloatVisitor {
    type Value = f64;

    fn expecting(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("a number or numeric string")
    }

    fn visit_f64<E: de::Error>(self, v: f64) -> Result<Self::Value, E> {
        Ok(v)
    }

    fn visit_i64<E: de::Error>(self, v: i64) -> Result<Self::Value, E> {
        Ok(v as f64)
    }

    fn visit_u64<E: de::Error>(self, v: u64) -> Result<Self::Value, E> {
        Ok(v as f64)
    }

    fn visit_str<E: de::Error>(self, v: &str) -> Result<Self::Value, E> {
        v.trim()
            .parse()
            .map_err(|_| E::custom(format!("invalid number: {v}")))
    }
}

/// Deserialize a price or volume field.
pub fn float<'de, D>(deserializer: D) -> Result<f64, D::Error>
where
    D: Deserializer<'de>,
{
    deserializer.deserialize_any(FloatVisitor)
}

// =============================================================================
// Optional identifiers
// =============================================================================

struct OptionalIdVisitor;

impl Visitor<'_> for OptionalIdVisitor {
    type Value = Option<i64>;

    fn expecting(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("an integer, numeric string or null")
    }

    fn visit_unit<E: de::Error>(self) -> Result<Self::Value, E> {
        Ok(None)
    }

    fn visit_none<E: de::Error>(self) -> Result<Self::Value, E> {
        Ok(None)
    }

    fn visit_i64<E: de::Error>(self, v: i64) -> Result<Self::Value, E> {
        Ok(Some(v))
    }

    fn visit_u64<E: de::Error>(self, v: u64) -> Result<Self::Value, E> {
        i64::try_from(v)
            .map(Some)
            .map_err(|_| E::custom(format!("identifier out of range: {v}")))
    }

    #[allow(clippy::cast_possible_truncation, clippy::float_cmp)]
    fn visit_f64<E: de::Error>(self, v: f64) -> Result<Self::Value, E> {
        if v.is_finite() && v.fract() == 0.0 {
            Ok(Some(v as i64))
        } else {
            Err(E::custom(format!("invalid identifier: {v}")))
        }
    }

    fn visit_str<E: de::Error>(self, v: &str) -> Result<Self::Value, E> {
        v.trim()
            .parse()
            .map(Some)
            .map_err(|_| E::custom(format!("invalid identifier: {v}")))
    }
}

/// Deserialize an optional numeric identifier such as `zap_id`.
pub fn optional_id<'de, D>(deserializer: D) -> Result<Option<i64>, D::Error>
where
    D: Deserializer<'de>,
{
    deserializer.deserialize_any(OptionalIdVisitor)
}

struct OptionalTextVisitor;

impl Visitor<'_> for OptionalTextVisitor {
    type Value = Option<String>;

    fn expecting(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("a string, number or null")
    }

    fn visit_unit<E: de::Error>(self) -> Result<Self::Value, E> {
        Ok(None)
    }

    fn visit_none<E: de::Error>(self) -> Result<Self::Value, E> {
        Ok(None)
    }

    fn visit_str<E: de::Error>(self, v: &str) -> Result<Self::Value, E> {
        Ok(Some(v.to_string()))
    }

    fn visit_string<E: de::Error>(self, v: String) -> Result<Self::Value, E> {
        Ok(Some(v))
    }

    fn visit_i64<E: de::Error>(self, v: i64) -> Result<Self::Value, E> {
        Ok(Some(v.to_string()))
    }

    fn visit_u64<E: de::Error>(self, v: u64) -> Result<Self::Value, E> {
        Ok(Some(v.to_string()))
    }

    fn visit_f64<E: de::Error>(self, v: f64) -> Result<Self::Value, E> {
        Ok(Some(v.to_string()))
    }
}

/// Deserialize an optional identifier that may be text or a number.
pub fn optional_text<'de, D>(deserializer: D) -> Result<Option<String>, D::Error>
where
    D: Deserializer<'de>,
{
    deserializer.deserialize_any(OptionalTextVisitor)
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde::Deserialize;
    use test_case::test_case;

    #[derive(Deserialize)]
    struct Probe {
        #[serde(deserialize_with = "timestamp")]
        ts: DateTime<Utc>,
        #[serde(deserialize_with = "float")]
        price: f64,
        #[serde(deserialize_with = "optional_id", default)]
        id: Option<i64>,
        #[serde(deserialize_with = "optional_text", default)]
        ext: Option<String>,
    }

    #[test_case("2024-03-01T12:30:00Z", 1_709_296_200 ; "rfc3339 utc")]
    #[test_case("2024-03-01T14:30:00+02:00", 1_709_296_200 ; "rfc3339 offset")]
    #[test_case("2024-03-01T12:30:00", 1_709_296_200 ; "naive t separator")]
    #[test_case("2024-03-01 12:30:00.000000", 1_709_296_200 ; "sqlalchemy text")]
    #[test_case("2024-03-01", 1_709_251_200 ; "bare date")]
    fn parses_timestamp_text(input: &str, expected: i64) {
        assert_eq!(parse_timestamp(input).unwrap().timestamp(), expected);
    }

    #[test]
    fn rejects_garbage_timestamp() {
        assert!(parse_timestamp("yesterday").is_none());
    }

    #[test]
    fn coerces_mixed_shapes() {
        let probe: Probe =
            serde_json::from_str(r#"{"ts": 1709296200, "price": "42.5", "id": "7", "ext": 99}"#)
                .unwrap();
        assert_eq!(probe.ts.timestamp(), 1_709_296_200);
        assert!((probe.price - 42.5).abs() < f64::EPSILON);
        assert_eq!(probe.id, Some(7));
        assert_eq!(probe.ext.as_deref(), Some("99"));
    }

    #[test]
    fn null_identifiers_are_none() {
        let probe: Probe =
            serde_json::from_str(r#"{"ts": "2024-01-01", "price": 1, "id": null, "ext": null}"#)
                .unwrap();
        assert_eq!(probe.id, None);
        assert_eq!(probe.ext, None);
    }

    #[test]
    fn non_numeric_price_fails() {
        let result = serde_json::from_str::<Probe>(r#"{"ts": 0, "price": "n/a"}"#);
        assert!(result.is_err());
    }
}
