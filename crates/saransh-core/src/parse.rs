//! Defensive parsing of model output.
//!
//! Completion APIs return loosely structured text: JSON wrapped in code
//! fences, JSON preceded by a sentence of chatter, numbers as strings, or no
//! JSON at all. Everything in this module treats that text as untrusted:
//! it locates a JSON payload, validates the expected shape, and reports a
//! [`ParseFailure`] instead of guessing. Callers substitute the named
//! defaults below and carry on.

use serde_json::{Map, Value};
use thiserror::Error;

pub const DEFAULT_SENTIMENT_SCORE: f64 = 0.0;
pub const DEFAULT_SENTIMENT_LABEL: &str = "neutral";
pub const DEFAULT_QUALITY_SCORE: f64 = 0.5;

const MAX_LANGUAGE_CHARS: usize = 40;
const MAX_LANGUAGE_WORDS: usize = 3;

#[derive(Debug, Clone, PartialEq, Error)]
pub enum ParseFailure {
    #[error("no JSON payload found in response")]
    NoJson,
    #[error("malformed JSON: {0}")]
    Malformed(String),
    #[error("unexpected shape: {0}")]
    Shape(String),
}

/// Sentiment as judged by a model.
#[derive(Debug, Clone, PartialEq)]
pub struct SentimentReading {
    pub score: f64,
    pub label: String,
    pub confidence: f64,
}

impl Default for SentimentReading {
    fn default() -> Self {
        Self {
            score: DEFAULT_SENTIMENT_SCORE,
            label: DEFAULT_SENTIMENT_LABEL.to_string(),
            confidence: 0.0,
        }
    }
}

/// Locate and decode the JSON value embedded in `raw`.
///
/// Tries, in order: the whole trimmed text, the body of a ```` ``` ```` fence,
/// and the widest `{…}` or `[…]` span.
pub fn extract_json(raw: &str) -> Result<Value, ParseFailure> {
    let trimmed = raw.trim();
    if trimmed.is_empty() {
        return Err(ParseFailure::NoJson);
    }
    if let Ok(v) = serde_json::from_str(trimmed) {
        return Ok(v);
    }

    let unfenced = strip_code_fence(trimmed);
    if let Ok(v) = serde_json::from_str(unfenced) {
        return Ok(v);
    }

    let span = [('{', '}'), ('[', ']')]
        .iter()
        .filter_map(|&(open, close)| {
            let start = unfenced.find(open)?;
            let end = unfenced.rfind(close)?;
            (end > start).then_some((start, end))
        })
        .min_by_key(|&(start, _)| start);

    match span {
        Some((start, end)) => serde_json::from_str(&unfenced[start..=end])
            .map_err(|e| ParseFailure::Malformed(e.to_string())),
        None => Err(ParseFailure::NoJson),
    }
}

fn strip_code_fence(text: &str) -> &str {
    let Some(rest) = text.strip_prefix("```") else {
        return text;
    };
    // drop the language tag line, e.g. ```json
    let body = rest.split_once('\n').map(|(_, b)| b).unwrap_or(rest);
    body.trim_end().trim_end_matches("```").trim()
}

/// Decode a JSON object.
pub fn parse_object(raw: &str) -> Result<Map<String, Value>, ParseFailure> {
    match extract_json(raw)? {
        Value::Object(map) => Ok(map),
        other => Err(ParseFailure::Shape(format!(
            "expected object, got {}",
            type_name(&other)
        ))),
    }
}

/// Decode a list of strings.
///
/// Accepts a bare array or an object holding the array under `key`.
/// Every element must be a string; blank strings are dropped.
pub fn parse_string_list(raw: &str, key: &str) -> Result<Vec<String>, ParseFailure> {
    let items = match extract_json(raw)? {
        Value::Array(items) => items,
        Value::Object(mut map) => match map.remove(key) {
            Some(Value::Array(items)) => items,
            Some(other) => {
                return Err(ParseFailure::Shape(format!(
                    "'{}' is {}, expected array",
                    key,
                    type_name(&other)
                )))
            }
            None => return Err(ParseFailure::Shape(format!("missing '{}'", key))),
        },
        other => {
            return Err(ParseFailure::Shape(format!(
                "expected array, got {}",
                type_name(&other)
            )))
        }
    };

    let mut out = Vec::with_capacity(items.len());
    for item in items {
        match item {
            Value::String(s) => {
                let s = s.trim();
                if !s.is_empty() {
                    out.push(s.to_string());
                }
            }
            other => {
                return Err(ParseFailure::Shape(format!(
                    "list item is {}, expected string",
                    type_name(&other)
                )))
            }
        }
    }
    Ok(out)
}

/// Decode `{score, label, confidence}`.
///
/// `score` is required and clamped to `[-1, 1]`. An unknown or missing
/// `label` is derived from the score; `confidence` defaults to `0.0`.
pub fn parse_sentiment(raw: &str) -> Result<SentimentReading, ParseFailure> {
    let map = parse_object(raw)?;
    let score = map
        .get("score")
        .or_else(|| map.get("sentiment_score"))
        .and_then(as_f64)
        .ok_or_else(|| ParseFailure::Shape("missing numeric 'score'".to_string()))?
        .clamp(-1.0, 1.0);

    let label = map
        .get("label")
        .or_else(|| map.get("sentiment"))
        .and_then(Value::as_str)
        .map(|s| s.trim().to_lowercase())
        .filter(|s| matches!(s.as_str(), "positive" | "negative" | "neutral"))
        .unwrap_or_else(|| crate::analysis::sentiment_label(score).to_string());

    let confidence = map
        .get("confidence")
        .and_then(as_f64)
        .unwrap_or(0.0)
        .clamp(0.0, 1.0);

    Ok(SentimentReading {
        score,
        label,
        confidence,
    })
}

/// Decode a single number: either a bare number or `{key: number}`.
pub fn parse_number(raw: &str, key: &str) -> Result<f64, ParseFailure> {
    let trimmed = raw.trim();
    if let Ok(n) = trimmed.parse::<f64>() {
        if n.is_finite() {
            return Ok(n);
        }
    }
    match extract_json(trimmed)? {
        Value::Object(map) => map
            .get(key)
            .and_then(as_f64)
            .ok_or_else(|| ParseFailure::Shape(format!("missing numeric '{}'", key))),
        other => as_f64(&other).ok_or_else(|| {
            ParseFailure::Shape(format!("expected number, got {}", type_name(&other)))
        }),
    }
}

/// Model quality judgment on a 0–10 scale, rescaled to `[0, 1]`.
pub fn parse_quality(raw: &str) -> Result<f64, ParseFailure> {
    let score = parse_number(raw, "quality_score")?;
    Ok((score / 10.0).clamp(0.0, 1.0))
}

/// Decode free text: `{key: "..."}` when JSON, otherwise the trimmed text
/// itself with surrounding quotes removed. Text that opens like JSON but
/// does not parse is rejected rather than taken literally.
pub fn parse_text(raw: &str, key: &str) -> Result<String, ParseFailure> {
    let trimmed = raw.trim();
    let text = match extract_json(trimmed) {
        Ok(Value::Object(map)) => map
            .get(key)
            .and_then(Value::as_str)
            .map(str::to_string)
            .ok_or_else(|| ParseFailure::Shape(format!("missing string '{}'", key)))?,
        Ok(Value::String(s)) => s,
        Ok(other) => {
            return Err(ParseFailure::Shape(format!(
                "expected text, got {}",
                type_name(&other)
            )))
        }
        Err(e) if trimmed.starts_with('{') || trimmed.starts_with('[') => return Err(e),
        Err(_) => trimmed.trim_matches('"').to_string(),
    };

    let text = text.trim().to_string();
    if text.is_empty() {
        return Err(ParseFailure::Shape(format!("empty '{}'", key)));
    }
    Ok(text)
}

/// Decode a language name such as `"English"` or `{"language": "Hindi"}`.
pub fn parse_language(raw: &str) -> Result<String, ParseFailure> {
    let name = parse_text(raw, "language")?;
    let plausible = name.chars().count() <= MAX_LANGUAGE_CHARS
        && name.split_whitespace().count() <= MAX_LANGUAGE_WORDS
        && name
            .chars()
            .all(|c| c.is_alphabetic() || c == ' ' || c == '-');
    if !plausible {
        return Err(ParseFailure::Shape(format!("implausible language '{}'", name)));
    }
    let mut chars = name.chars();
    Ok(match chars.next() {
        Some(first) => first.to_uppercase().chain(chars).collect(),
        None => name,
    })
}

fn as_f64(v: &Value) -> Option<f64> {
    let n = match v {
        Value::Number(n) => n.as_f64(),
        Value::String(s) => s.trim().parse::<f64>().ok(),
        _ => None,
    };
    n.filter(|n| n.is_finite())
}

fn type_name(v: &Value) -> &'static str {
    match v {
        Value::Null => "null",
        Value::Bool(_) => "bool",
        Value::Number(_) => "number",
        Value::String(_) => "string",
        Value::Array(_) => "array",
        Value::Object(_) => "object",
    }
}
