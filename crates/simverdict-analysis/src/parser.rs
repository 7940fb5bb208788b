//! Structured log line parsing.
//!
//! One JSON object per line. The parser never aborts: a line is either an
//! event, blank, or a [`VerdictError::MalformedLine`] that the caller counts
//! and skips.

use serde_json::{Map, Value};
use simverdict_error::{Result, VerdictError};
use simverdict_types::{FieldMap, FieldValue, Level, LogEvent, Timestamp, flatten_object};

/// String-encoded payloads are unwrapped at most this many times.
const MAX_PAYLOAD_STRING_LAYERS: usize = 2;

/// Parse one log line.
///
/// Returns `Ok(None)` for blank lines. `line_number` is 1-based and only
/// used for diagnostics.
pub fn parse_line(line: &str, line_number: usize) -> Result<Option<LogEvent>> {
    let trimmed = line.trim();
    if trimmed.is_empty() {
        return Ok(None);
    }
    let value: Value = serde_json::from_str(trimmed)
        .map_err(|err| VerdictError::malformed(line_number, err.to_string()))?;
    let Value::Object(object) = value else {
        return Err(VerdictError::malformed(
            line_number,
            format!("expected a JSON object, found {}", json_kind(&value)),
        ));
    };
    Ok(Some(event_from_object(&object)))
}

/// Normalize a decoded JSON object into a [`LogEvent`].
#[must_use]
pub fn event_from_object(object: &Map<String, Value>) -> LogEvent {
    let fields = decode_payload(object.get("fields"));
    let span = decode_payload(object.get("span"));

    let message = text_of(object.get("message"))
        .or_else(|| text_of(object.get("msg")))
        .or_else(|| fields.get("message").map(FieldValue::to_text))
        .unwrap_or_default();

    LogEvent {
        timestamp: object.get("timestamp").and_then(Timestamp::from_json),
        level: object
            .get("level")
            .and_then(Value::as_str)
            .map_or(Level::Unknown, Level::parse),
        target: text_of(object.get("target")).unwrap_or_default(),
        message,
        fields,
        span,
        scenario: text_of(object.get("scenario")),
        trace_id: text_of(object.get("trace_id")),
    }
}

/// Decode a `fields`/`span` payload.
///
/// Native objects are flattened. Strings holding JSON are decoded up to
/// [`MAX_PAYLOAD_STRING_LAYERS`] times; anything that does not end in an
/// object yields an empty payload.
#[must_use]
pub fn decode_payload(raw: Option<&Value>) -> FieldMap {
    match raw {
        Some(Value::Object(object)) => flatten_object(object),
        Some(Value::String(encoded)) => decode_string_payload(encoded),
        _ => FieldMap::new(),
    }
}

fn decode_string_payload(encoded: &str) -> FieldMap {
    let mut current = encoded.to_owned();
    for _ in 0..MAX_PAYLOAD_STRING_LAYERS {
        match serde_json::from_str::<Value>(&current) {
            Ok(Value::Object(object)) => return flatten_object(&object),
            Ok(Value::String(inner)) => current = inner,
            _ => break,
        }
    }
    FieldMap::new()
}

/// Scalar top-level value as text; empty strings count as absent.
fn text_of(value: Option<&Value>) -> Option<String> {
    match value? {
        Value::String(s) if s.is_empty() => None,
        Value::String(s) => Some(s.clone()),
        Value::Number(n) => Some(n.to_string()),
        Value::Bool(b) => Some(b.to_string()),
        _ => None,
    }
}

const fn json_kind(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "a boolean",
        Value::Number(_) => "a number",
        Value::String(_) => "a string",
        Value::Array(_) => "an array",
        Value::Object(_) => "an object",
    }
}
