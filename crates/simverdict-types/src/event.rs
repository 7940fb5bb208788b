use std::cmp::Ordering;
use std::fmt;

use serde::{Deserialize, Serialize};

use crate::value::{FieldMap, FieldValue};

/// Opaque ordering key attached to a log event.
///
/// Timestamps are only ever compared to find the earliest and latest event of
/// a run; they are never interpreted as wall-clock time. Numeric keys order
/// numerically, text keys lexicographically, and every numeric key sorts
/// before every text key.
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(untagged)]
pub enum Timestamp {
    Number(f64),
    Text(String),
}

impl Timestamp {
    /// Build an ordering key from a JSON value, if it carries one.
    #[must_use]
    pub fn from_json(value: &serde_json::Value) -> Option<Self> {
        match value {
            serde_json::Value::Number(n) => n.as_f64().map(Self::Number),
            serde_json::Value::String(s) if !s.is_empty() => Some(Self::Text(s.clone())),
            _ => None,
        }
    }
}

impl Ord for Timestamp {
    fn cmp(&self, other: &Self) -> Ordering {
        match (self, other) {
            (Self::Number(a), Self::Number(b)) => a.total_cmp(b),
            (Self::Text(a), Self::Text(b)) => a.cmp(b),
            (Self::Number(_), Self::Text(_)) => Ordering::Less,
            (Self::Text(_), Self::Number(_)) => Ordering::Greater,
        }
    }
}

impl PartialOrd for Timestamp {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl PartialEq for Timestamp {
    fn eq(&self, other: &Self) -> bool {
        self.cmp(other) == Ordering::Equal
    }
}

impl Eq for Timestamp {}

impl fmt::Display for Timestamp {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Number(n) => write!(f, "{n}"),
            Self::Text(s) => f.write_str(s),
        }
    }
}

/// Event severity.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum Level {
    Info,
    Warn,
    Error,
    #[default]
    Unknown,
}

impl Level {
    /// Parse a level name case-insensitively. Unrecognized names (including
    /// `DEBUG` and `TRACE`) map to [`Level::Unknown`].
    #[must_use]
    pub fn parse(raw: &str) -> Self {
        match raw.trim().to_ascii_uppercase().as_str() {
            "INFO" => Self::Info,
            "WARN" | "WARNING" => Self::Warn,
            "ERROR" => Self::Error,
            _ => Self::Unknown,
        }
    }

    /// Stable string identifier.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Info => "INFO",
            Self::Warn => "WARN",
            Self::Error => "ERROR",
            Self::Unknown => "UNKNOWN",
        }
    }
}

impl fmt::Display for Level {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One normalized log record.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct LogEvent {
    pub timestamp: Option<Timestamp>,
    pub level: Level,
    pub target: String,
    pub message: String,
    /// Flattened structured payload; the primary source for metrics.
    pub fields: FieldMap,
    /// Flattened auxiliary span/context payload.
    pub span: FieldMap,
    /// Top-level `scenario` key, if the writer emitted one.
    pub scenario: Option<String>,
    /// Top-level `trace_id` key, if the writer emitted one.
    pub trace_id: Option<String>,
}

impl LogEvent {
    /// Look a key up in the payload, falling back to the span context.
    #[must_use]
    pub fn field(&self, key: &str) -> Option<&FieldValue> {
        self.fields.get(key).or_else(|| self.span.get(key))
    }

    /// Text view of [`Self::field`].
    #[must_use]
    pub fn field_str(&self, key: &str) -> Option<&str> {
        self.field(key).and_then(FieldValue::as_str)
    }

    /// Numeric view of a payload-only key.
    #[must_use]
    pub fn payload_f64(&self, key: &str) -> Option<f64> {
        self.fields.get(key).and_then(FieldValue::as_f64)
    }

    /// Non-negative integral view of a payload-only key.
    #[must_use]
    pub fn payload_u64(&self, key: &str) -> Option<u64> {
        self.fields.get(key).and_then(FieldValue::as_u64)
    }

    /// Trace identifier: top-level key first, then payload/span.
    #[must_use]
    pub fn trace_id(&self) -> Option<String> {
        self.trace_id
            .clone()
            .or_else(|| self.field("trace_id").map(FieldValue::to_text))
            .filter(|id| !id.is_empty())
    }

    /// Whether the message contains `needle`, ignoring ASCII case.
    #[must_use]
    pub fn message_contains(&self, needle: &str) -> bool {
        self.message
            .to_ascii_lowercase()
            .contains(&needle.to_ascii_lowercase())
    }
}
