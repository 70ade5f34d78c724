//! Tolerant field decoders for values written by loosely typed peers.
//!
//! Peers written in dynamic languages send numbers as strings and flags as
//! booleans. These helpers accept those shapes on the way in; the matching
//! serialisers always emit the canonical integer form.

use serde::{Deserialize, Deserializer, Serializer, de::Error as _};
use serde_json::Value;

/// Interprets a JSON value as an integer.
///
/// Numbers are truncated towards zero, numeric strings are parsed and
/// booleans map to 0/1.
pub(crate) fn int_from_value(value: &Value) -> Option<i64> {
    match value {
        Value::Number(number) => number
            .as_i64()
            .or_else(|| number.as_u64().and_then(|n| i64::try_from(n).ok()))
            .or_else(|| number.as_f64().and_then(float_to_int)),
        Value::String(text) => {
            let trimmed = text.trim();
            trimmed
                .parse::<i64>()
                .ok()
                .or_else(|| trimmed.parse::<f64>().ok().and_then(float_to_int))
        }
        Value::Bool(flag) => Some(i64::from(*flag)),
        Value::Null | Value::Array(_) | Value::Object(_) => None,
    }
}

#[expect(
    clippy::cast_possible_truncation,
    reason = "range is checked before the cast"
)]
fn float_to_int(value: f64) -> Option<i64> {
    // i64::MAX is not exactly representable; bound by 2^63 instead.
    const LOWER: f64 = -9_223_372_036_854_775_808.0;
    const UPPER: f64 = 9_223_372_036_854_775_808.0;
    (value.is_finite() && value >= LOWER && value < UPPER).then(|| value.trunc() as i64)
}

/// Interprets a JSON value as text, rendering scalars that are not strings.
pub(crate) fn string_from_value(value: &Value) -> Option<String> {
    match value {
        Value::String(text) => Some(text.clone()),
        Value::Number(number) => Some(number.to_string()),
        Value::Bool(flag) => Some(if *flag { "1" } else { "0" }.to_owned()),
        Value::Null | Value::Array(_) | Value::Object(_) => None,
    }
}

pub(crate) fn opt_int<'de, D>(deserializer: D) -> Result<Option<i64>, D::Error>
where
    D: Deserializer<'de>,
{
    match Option::<Value>::deserialize(deserializer)? {
        None | Some(Value::Null) => Ok(None),
        Some(raw) => int_from_value(&raw)
            .map(Some)
            .ok_or_else(|| D::Error::custom(format!("expected an integer, found {raw}"))),
    }
}

pub(crate) fn opt_flag<'de, D>(deserializer: D) -> Result<Option<bool>, D::Error>
where
    D: Deserializer<'de>,
{
    match Option::<Value>::deserialize(deserializer)? {
        None | Some(Value::Null) => Ok(None),
        Some(raw) => int_from_value(&raw)
            .map(|n| Some(n != 0))
            .ok_or_else(|| D::Error::custom(format!("expected a 0/1 flag, found {raw}"))),
    }
}

pub(crate) fn opt_string<'de, D>(deserializer: D) -> Result<Option<String>, D::Error>
where
    D: Deserializer<'de>,
{
    match Option::<Value>::deserialize(deserializer)? {
        None | Some(Value::Null) => Ok(None),
        Some(raw) => string_from_value(&raw)
            .map(Some)
            .ok_or_else(|| D::Error::custom(format!("expected a string, found {raw}"))),
    }
}

#[expect(
    clippy::ref_option,
    reason = "serde passes the field by reference"
)]
pub(crate) fn flag<S>(value: &Option<bool>, serializer: S) -> Result<S::Ok, S::Error>
where
    S: Serializer,
{
    match value {
        Some(flag) => serializer.serialize_u8(u8::from(*flag)),
        None => serializer.serialize_none(),
    }
}
