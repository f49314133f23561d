//! Argument decoding shared by the search tools.
//!
//! Models are loose with JSON: counts arrive as `"2"`, optional fields as
//! `null`, and some wrap everything in a `{"params": {...}}` envelope. The
//! helpers here accept those shapes and reject values that cannot be sent
//! to the provider.

use chrono::NaiveDate;
use regex::Regex;
use serde::de::{DeserializeOwned, Error as _};
use serde::{Deserialize, Deserializer};
use serde_json::Value;
use std::sync::LazyLock;

use crate::tools::ToolFailure;

static AIRPORT_CODE: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"^[A-Z]{3}$").unwrap());

pub(crate) fn unwrap_envelope(args: &Value) -> &Value {
    match args.get("params") {
        Some(inner) if inner.is_object() => inner,
        _ => args,
    }
}

pub(crate) fn decode<T: DeserializeOwned>(tool: &str, args: &Value) -> Result<T, ToolFailure> {
    let inner = unwrap_envelope(args);
    if !inner.is_object() {
        return Err(invalid(tool, "arguments must be a JSON object"));
    }
    serde_json::from_value(inner.clone()).map_err(|e| invalid(tool, e.to_string()))
}

pub(crate) fn invalid(tool: &str, reason: impl Into<String>) -> ToolFailure {
    ToolFailure::InvalidArguments {
        tool: tool.to_string(),
        reason: reason.into(),
    }
}

#[derive(Deserialize)]
#[serde(untagged)]
enum Loose {
    Int(i64),
    Float(f64),
    Text(String),
    List(Vec<Value>),
}

/// Non-negative count given as a number, numeric string or null.
pub(crate) fn count<'de, D>(deserializer: D) -> Result<Option<u32>, D::Error>
where
    D: Deserializer<'de>,
{
    let n = match Option::<Loose>::deserialize(deserializer)? {
        None => return Ok(None),
        Some(Loose::Int(n)) => n,
        Some(Loose::Float(f)) if f.fract() == 0.0 => f as i64,
        Some(Loose::Float(f)) => {
            return Err(D::Error::custom(format!("expected a whole number, got {f}")));
        }
        Some(Loose::Text(s)) if s.trim().is_empty() => return Ok(None),
        Some(Loose::Text(s)) => s
            .trim()
            .parse::<i64>()
            .map_err(|_| D::Error::custom(format!("expected a number, got {s:?}")))?,
        Some(Loose::List(_)) => return Err(D::Error::custom("expected a number, got a list")),
    };
    u32::try_from(n)
        .map(Some)
        .map_err(|_| D::Error::custom(format!("counts must be non-negative, got {n}")))
}

/// Free-form option given as text, a number or a list of either; lists are
/// joined with commas.
pub(crate) fn text_list<'de, D>(deserializer: D) -> Result<Option<String>, D::Error>
where
    D: Deserializer<'de>,
{
    let text = match Option::<Loose>::deserialize(deserializer)? {
        None => return Ok(None),
        Some(Loose::Int(n)) => n.to_string(),
        Some(Loose::Float(f)) => f.to_string(),
        Some(Loose::Text(s)) => s.trim().to_string(),
        Some(Loose::List(items)) => items
            .iter()
            .map(|v| match v {
                Value::String(s) => s.trim().to_string(),
                other => other.to_string(),
            })
            .collect::<Vec<_>>()
            .join(","),
    };
    Ok((!text.is_empty()).then_some(text))
}

pub(crate) fn parse_date(field: &str, value: &str) -> Result<NaiveDate, String> {
    NaiveDate::parse_from_str(value.trim(), "%Y-%m-%d")
        .map_err(|_| format!("{field} must be a date in YYYY-MM-DD format, got {value:?}"))
}

pub(crate) fn airport_code(field: &str, value: &str) -> Result<String, String> {
    let code = value.trim().to_ascii_uppercase();
    if AIRPORT_CODE.is_match(&code) {
        Ok(code)
    } else {
        Err(format!(
            "{field} must be a three-letter IATA airport code, got {value:?}"
        ))
    }
}

pub(crate) fn required_text(field: &str, value: &str) -> Result<String, String> {
    let trimmed = value.trim();
    if trimmed.is_empty() {
        Err(format!("{field} is required"))
    } else {
        Ok(trimmed.to_string())
    }
}
