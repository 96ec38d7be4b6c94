//! Forgiving deserializers for model-authored records.
//!
//! Language-model output is untrusted: numbers arrive as strings, lists
//! arrive as scalars, whole blocks arrive as `null`. These helpers read
//! whatever JSON shape is present and coerce it into the field type,
//! falling back to the type's zero value instead of failing the record.

use serde::de::DeserializeOwned;
use serde::{Deserialize, Deserializer};
use serde_json::{Map, Value};

/// Coerce a JSON value into a finite-or-not `f64`.
///
/// Accepts numbers and numeric strings; everything else reads as `0.0`.
pub fn value_to_f64(value: &Value) -> f64 {
    match value {
        Value::Number(n) => n.as_f64().unwrap_or(0.0),
        Value::String(s) => s.trim().parse::<f64>().unwrap_or(0.0),
        Value::Bool(b) => f64::from(u8::from(*b)),
        _ => 0.0,
    }
}

/// Coerce a JSON value into a non-negative integer count.
///
/// Fractions are floored, negatives and non-finite values read as zero.
pub fn value_to_count(value: &Value) -> u64 {
    let n = value_to_f64(value);
    if !n.is_finite() || n <= 0.0 {
        return 0;
    }
    // `as` saturates at u64::MAX for huge floats.
    n.floor() as u64
}

/// Render a JSON value as a plain string (strings unquoted).
pub fn value_to_string(value: &Value) -> String {
    match value {
        Value::Null => String::new(),
        Value::String(s) => s.clone(),
        other => other.to_string(),
    }
}

pub fn number<'de, D>(deserializer: D) -> Result<f64, D::Error>
where
    D: Deserializer<'de>,
{
    let value = Value::deserialize(deserializer)?;
    Ok(value_to_f64(&value))
}

pub fn count<'de, D>(deserializer: D) -> Result<u64, D::Error>
where
    D: Deserializer<'de>,
{
    let value = Value::deserialize(deserializer)?;
    Ok(value_to_count(&value))
}

pub fn string<'de, D>(deserializer: D) -> Result<String, D::Error>
where
    D: Deserializer<'de>,
{
    let value = Value::deserialize(deserializer)?;
    Ok(value_to_string(&value))
}

/// Arrays become string lists (non-string items are stringified); any
/// other shape becomes an empty list.
pub fn string_list<'de, D>(deserializer: D) -> Result<Vec<String>, D::Error>
where
    D: Deserializer<'de>,
{
    let value = Value::deserialize(deserializer)?;
    Ok(match value {
        Value::Array(items) => items.iter().map(value_to_string).collect(),
        _ => Vec::new(),
    })
}

pub fn number_list<'de, D>(deserializer: D) -> Result<Vec<f64>, D::Error>
where
    D: Deserializer<'de>,
{
    let value = Value::deserialize(deserializer)?;
    Ok(match value {
        Value::Array(items) => items.iter().map(value_to_f64).collect(),
        _ => Vec::new(),
    })
}

/// Objects pass through, anything else becomes an empty object.
pub fn object<'de, D>(deserializer: D) -> Result<Map<String, Value>, D::Error>
where
    D: Deserializer<'de>,
{
    let value = Value::deserialize(deserializer)?;
    Ok(match value {
        Value::Object(map) => map,
        _ => Map::new(),
    })
}

/// Deserialize a nested block, substituting the default when the block
/// is absent, not an object, or otherwise unreadable.
pub fn block<'de, D, T>(deserializer: D) -> Result<T, D::Error>
where
    D: Deserializer<'de>,
    T: DeserializeOwned + Default,
{
    let value = Value::deserialize(deserializer)?;
    Ok(match value {
        Value::Object(_) => serde_json::from_value(value).unwrap_or_default(),
        _ => T::default(),
    })
}

/// Like [`block`], but keeps absence observable.
pub fn optional_block<'de, D, T>(deserializer: D) -> Result<Option<T>, D::Error>
where
    D: Deserializer<'de>,
    T: DeserializeOwned,
{
    let value = Value::deserialize(deserializer)?;
    Ok(match value {
        Value::Object(_) => serde_json::from_value(value).ok(),
        _ => None,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_numbers_from_strings_and_garbage() {
        assert_eq!(value_to_f64(&json!(12.5)), 12.5);
        assert_eq!(value_to_f64(&json!(" 40 ")), 40.0);
        assert_eq!(value_to_f64(&json!("lots")), 0.0);
        assert_eq!(value_to_f64(&json!({"a": 1})), 0.0);
        assert!(value_to_f64(&json!("1e400")).is_infinite());
    }

    #[test]
    fn test_counts_floor_and_reject_negatives() {
        assert_eq!(value_to_count(&json!(12.9)), 12);
        assert_eq!(value_to_count(&json!(-4)), 0);
        assert_eq!(value_to_count(&json!("1e400")), 0);
        assert_eq!(value_to_count(&json!("300")), 300);
    }

    #[test]
    fn test_string_rendering() {
        assert_eq!(value_to_string(&json!("abc")), "abc");
        assert_eq!(value_to_string(&json!(7)), "7");
        assert_eq!(value_to_string(&Value::Null), "");
    }
}
