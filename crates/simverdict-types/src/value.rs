use std::collections::BTreeMap;
use std::fmt;

use serde_json::Value;

/// Flat structured payload of a log event.
pub type FieldMap = BTreeMap<String, FieldValue>;

/// A scalar value carried in a log event's structured payload.
///
/// Log writers emit integers, floats, strings and booleans. Nested objects are
/// flattened before they reach this type (see [`flatten_object`]), so every
/// value here is a leaf.
#[derive(Clone, Debug, serde::Serialize, serde::Deserialize)]
#[serde(untagged)]
pub enum FieldValue {
    /// A boolean flag.
    Bool(bool),
    /// A 64-bit signed integer.
    Integer(i64),
    /// A 64-bit IEEE 754 floating-point number.
    Float(f64),
    /// A UTF-8 text string.
    Text(String),
}

impl FieldValue {
    /// Convert one JSON leaf into a field value.
    ///
    /// Returns `None` for `null`. Arrays keep their compact JSON text so the
    /// key survives flattening; objects are expected to be flattened first and
    /// are treated the same way if they are not.
    #[must_use]
    pub fn from_json(value: &Value) -> Option<Self> {
        match value {
            Value::Null => None,
            Value::Bool(b) => Some(Self::Bool(*b)),
            Value::Number(n) => {
                if let Some(i) = n.as_i64() {
                    Some(Self::Integer(i))
                } else {
                    n.as_f64().map(Self::Float)
                }
            }
            Value::String(s) => Some(Self::Text(s.clone())),
            Value::Array(_) | Value::Object(_) => Some(Self::Text(value.to_string())),
        }
    }

    /// Numeric view of this value. Text and booleans are not numbers.
    #[must_use]
    #[allow(clippy::cast_precision_loss)]
    pub fn as_f64(&self) -> Option<f64> {
        match self {
            Self::Integer(i) => Some(*i as f64),
            Self::Float(f) => Some(*f),
            Self::Bool(_) | Self::Text(_) => None,
        }
    }

    /// Non-negative integral view, truncating floats toward zero.
    ///
    /// Negative and non-finite numbers yield `None`.
    #[must_use]
    #[allow(clippy::cast_possible_truncation, clippy::cast_sign_loss)]
    pub fn as_u64(&self) -> Option<u64> {
        match self {
            Self::Integer(i) => u64::try_from(*i).ok(),
            Self::Float(f) if f.is_finite() && *f >= 0.0 => Some(f.trunc() as u64),
            _ => None,
        }
    }

    /// String view of a text value.
    #[must_use]
    pub fn as_str(&self) -> Option<&str> {
        match self {
            Self::Text(s) => Some(s),
            _ => None,
        }
    }

    /// Whether this value is a number.
    #[must_use]
    pub const fn is_numeric(&self) -> bool {
        matches!(self, Self::Integer(_) | Self::Float(_))
    }

    /// Loose truthiness: `true`, non-zero numbers and non-empty text.
    #[must_use]
    pub fn is_truthy(&self) -> bool {
        match self {
            Self::Bool(b) => *b,
            Self::Integer(i) => *i != 0,
            Self::Float(f) => *f != 0.0,
            Self::Text(s) => !s.is_empty(),
        }
    }

    /// Render as an identifier-like string (text verbatim, numbers formatted).
    #[must_use]
    pub fn to_text(&self) -> String {
        match self {
            Self::Text(s) => s.clone(),
            other => other.to_string(),
        }
    }
}

impl PartialEq for FieldValue {
    fn eq(&self, other: &Self) -> bool {
        match (self, other) {
            (Self::Bool(a), Self::Bool(b)) => a == b,
            (Self::Text(a), Self::Text(b)) => a == b,
            (Self::Integer(a), Self::Integer(b)) => a == b,
            (a, b) => match (a.as_f64(), b.as_f64()) {
                (Some(x), Some(y)) => x.to_bits() == y.to_bits() || x == y,
                _ => false,
            },
        }
    }
}

impl fmt::Display for FieldValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Bool(b) => write!(f, "{b}"),
            Self::Integer(i) => write!(f, "{i}"),
            Self::Float(v) => write!(f, "{v}"),
            Self::Text(s) => f.write_str(s),
        }
    }
}

impl From<bool> for FieldValue {
    fn from(value: bool) -> Self {
        Self::Bool(value)
    }
}

impl From<i64> for FieldValue {
    fn from(value: i64) -> Self {
        Self::Integer(value)
    }
}

impl From<f64> for FieldValue {
    fn from(value: f64) -> Self {
        Self::Float(value)
    }
}

impl From<&str> for FieldValue {
    fn from(value: &str) -> Self {
        Self::Text(value.to_owned())
    }
}

impl From<String> for FieldValue {
    fn from(value: String) -> Self {
        Self::Text(value)
    }
}

/// Flatten a JSON object into dotted keys.
///
/// `{"a": {"b": 1}, "c": 2}` becomes `{"a.b": 1, "c": 2}`. Null leaves are
/// dropped.
#[must_use]
pub fn flatten_object(object: &serde_json::Map<String, Value>) -> FieldMap {
    let mut out = FieldMap::new();
    for (key, value) in object {
        flatten_into(key, value, &mut out);
    }
    out
}

fn flatten_into(prefix: &str, value: &Value, out: &mut FieldMap) {
    if let Value::Object(inner) = value {
        for (key, nested) in inner {
            flatten_into(&format!("{prefix}.{key}"), nested, out);
        }
        return;
    }
    if let Some(leaf) = FieldValue::from_json(value) {
        out.insert(prefix.to_owned(), leaf);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn from_json_leaves() {
        assert_eq!(FieldValue::from_json(&json!(3)), Some(FieldValue::Integer(3)));
        assert_eq!(FieldValue::from_json(&json!(2.5)), Some(FieldValue::Float(2.5)));
        assert_eq!(FieldValue::from_json(&json!(true)), Some(FieldValue::Bool(true)));
        assert_eq!(FieldValue::from_json(&json!("x")), Some(FieldValue::from("x")));
        assert_eq!(FieldValue::from_json(&json!(null)), None);
        assert_eq!(
            FieldValue::from_json(&json!([1, 2])),
            Some(FieldValue::from("[1,2]"))
        );
    }

    #[test]
    fn u64_beyond_i64_becomes_float() {
        let value = FieldValue::from_json(&json!(u64::MAX)).unwrap();
        assert!(matches!(value, FieldValue::Float(_)));
    }

    #[test]
    fn numeric_views() {
        assert_eq!(FieldValue::Integer(500).as_u64(), Some(500));
        assert_eq!(FieldValue::Float(300.9).as_u64(), Some(300));
        assert_eq!(FieldValue::Integer(-1).as_u64(), None);
        assert_eq!(FieldValue::Float(f64::NAN).as_u64(), None);
        assert_eq!(FieldValue::from("12").as_f64(), None);
        assert_eq!(FieldValue::Integer(7).as_f64(), Some(7.0));
    }

    #[test]
    fn integer_and_float_compare_numerically() {
        assert_eq!(FieldValue::Integer(2), FieldValue::Float(2.0));
        assert_ne!(FieldValue::Integer(2), FieldValue::from("2"));
    }

    #[test]
    fn truthiness() {
        assert!(FieldValue::Bool(true).is_truthy());
        assert!(!FieldValue::Bool(false).is_truthy());
        assert!(FieldValue::Integer(1).is_truthy());
        assert!(!FieldValue::Float(0.0).is_truthy());
        assert!(!FieldValue::from("").is_truthy());
        assert!(FieldValue::from("sig_check").is_truthy());
    }

    #[test]
    fn flatten_nested_objects() {
        let value = json!({
            "operation": "sign",
            "latency": {"avg_us": 300, "p99_us": {"value": 410}},
            "missing": null,
        });
        let flat = flatten_object(value.as_object().unwrap());
        assert_eq!(flat.get("operation"), Some(&FieldValue::from("sign")));
        assert_eq!(flat.get("latency.avg_us"), Some(&FieldValue::Integer(300)));
        assert_eq!(flat.get("latency.p99_us.value"), Some(&FieldValue::Integer(410)));
        assert!(!flat.contains_key("missing"));
        assert!(!flat.contains_key("latency"));
    }

    #[test]
    fn untagged_serialization_is_bare() {
        let encoded = serde_json::to_string(&FieldValue::Integer(5)).unwrap();
        assert_eq!(encoded, "5");
        let encoded = serde_json::to_string(&FieldValue::from("ok")).unwrap();
        assert_eq!(encoded, "\"ok\"");
    }
}
