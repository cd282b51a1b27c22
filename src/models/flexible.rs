//! Lenient deserializers for fields the remote APIs send inconsistently.
//!
//! Identifiers arrive as numbers on one endpoint and strings on another;
//! amounts sometimes arrive quoted. These helpers normalise both at the
//! fetch boundary so downstream code only sees one representation.

use serde::de::{self, Deserializer};
use serde::Deserialize;
use serde_json::Value;

/// Canonical textual form of an identifier.
///
/// `7`, `"7"`, `7.0` and `" 7 "` all map to `"7"`.
pub fn canonical_id(raw: &str) -> String {
    let trimmed = raw.trim();
    match trimmed.parse::<f64>() {
        Ok(f) if f.is_finite() && f.fract() == 0.0 && f.abs() < 1e15 => format!("{}", f as i64),
        _ => trimmed.to_string(),
    }
}

fn value_to_id(value: Value) -> Option<String> {
    match value {
        Value::Null => None,
        Value::String(s) => Some(canonical_id(&s)),
        Value::Number(n) => Some(canonical_id(&n.to_string())),
        Value::Bool(b) => Some(b.to_string()),
        _ => None,
    }
}

/// Required identifier: number or string.
pub fn id<'de, D>(deserializer: D) -> Result<String, D::Error>
where
    D: Deserializer<'de>,
{
    let value = Value::deserialize(deserializer)?;
    value_to_id(value).ok_or_else(|| de::Error::custom("expected a string or number identifier"))
}

/// Optional scalar rendered as text (numbers keep their canonical form).
pub fn opt_text<'de, D>(deserializer: D) -> Result<Option<String>, D::Error>
where
    D: Deserializer<'de>,
{
    let value = Option::<Value>::deserialize(deserializer)?;
    Ok(match value {
        None | Some(Value::Null) => None,
        Some(Value::String(s)) => {
            let s = s.trim();
            (!s.is_empty()).then(|| s.to_string())
        }
        Some(other) => value_to_id(other),
    })
}

/// Optional amount: number or numeric string.
pub fn opt_amount<'de, D>(deserializer: D) -> Result<Option<f64>, D::Error>
where
    D: Deserializer<'de>,
{
    let value = Option::<Value>::deserialize(deserializer)?;
    Ok(match value {
        Some(Value::Number(n)) => n.as_f64(),
        Some(Value::String(s)) => s.trim().replace(',', "").parse::<f64>().ok(),
        _ => None,
    })
}

/// Optional integer category: number or numeric string.
pub fn opt_category<'de, D>(deserializer: D) -> Result<Option<i64>, D::Error>
where
    D: Deserializer<'de>,
{
    let value = Option::<Value>::deserialize(deserializer)?;
    Ok(match value {
        Some(Value::Number(n)) => n.as_i64().or_else(|| n.as_f64().map(|f| f as i64)),
        Some(Value::String(s)) => s.trim().parse::<i64>().ok(),
        _ => None,
    })
}
