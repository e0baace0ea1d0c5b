//! Value model shared by route functions and the single-fetch codec.
//!
//! Loader and action data is richer than JSON: dates, errors, `undefined`
//! and non-finite numbers all survive the trip to the client. Server
//! component payloads are representable but never encodable.

use std::collections::BTreeMap;
use std::fmt;

use chrono::{DateTime, SecondsFormat, Utc};

/// Ordered object representation.
pub type Object = BTreeMap<String, Value>;

/// A value produced by a loader or action.
#[derive(Debug, Clone, PartialEq)]
pub enum Value {
    Undefined,
    Null,
    Bool(bool),
    Number(f64),
    String(String),
    Array(Vec<Value>),
    Object(Object),
    Date(DateTime<Utc>),
    Error(ErrorValue),
    /// Marker for data rendered by the server component pipeline.
    ServerComponent(String),
}

impl Value {
    /// Build an object from key/value pairs.
    pub fn object<K, I>(entries: I) -> Self
    where
        K: Into<String>,
        I: IntoIterator<Item = (K, Value)>,
    {
        Value::Object(entries.into_iter().map(|(k, v)| (k.into(), v)).collect())
    }

    /// Look up a key on an object value.
    pub fn get(&self, key: &str) -> Option<&Value> {
        match self {
            Value::Object(map) => map.get(key),
            _ => None,
        }
    }

    pub fn as_str(&self) -> Option<&str> {
        match self {
            Value::String(s) => Some(s),
            _ => None,
        }
    }

    pub fn as_bool(&self) -> Option<bool> {
        match self {
            Value::Bool(b) => Some(*b),
            _ => None,
        }
    }

    pub fn as_f64(&self) -> Option<f64> {
        match self {
            Value::Number(n) => Some(*n),
            _ => None,
        }
    }

    pub fn is_undefined(&self) -> bool {
        matches!(self, Value::Undefined)
    }

    pub fn is_server_component(&self) -> bool {
        matches!(self, Value::ServerComponent(_))
    }

    /// Name used in diagnostics.
    pub fn type_name(&self) -> &'static str {
        match self {
            Value::Undefined => "undefined",
            Value::Null => "null",
            Value::Bool(_) => "boolean",
            Value::Number(_) => "number",
            Value::String(_) => "string",
            Value::Array(_) => "array",
            Value::Object(_) => "object",
            Value::Date(_) => "date",
            Value::Error(_) => "error",
            Value::ServerComponent(_) => "server component",
        }
    }

    /// Lossy conversion to plain JSON, as used by the per-route `_data`
    /// protocol. Dates become ISO strings, errors become `{message}`,
    /// undefined and non-finite numbers become null, undefined object
    /// members are dropped.
    pub fn to_plain_json(&self) -> serde_json::Value {
        use serde_json::Value as Json;
        match self {
            Value::Undefined | Value::Null | Value::ServerComponent(_) => Json::Null,
            Value::Bool(b) => Json::Bool(*b),
            Value::Number(n) => serde_json::Number::from_f64(*n)
                .map(Json::Number)
                .unwrap_or(Json::Null),
            Value::String(s) => Json::String(s.clone()),
            Value::Array(items) => Json::Array(items.iter().map(Value::to_plain_json).collect()),
            Value::Object(map) => Json::Object(
                map.iter()
                    .filter(|(_, v)| !v.is_undefined())
                    .map(|(k, v)| (k.clone(), v.to_plain_json()))
                    .collect(),
            ),
            Value::Date(d) => Json::String(d.to_rfc3339_opts(SecondsFormat::Millis, true)),
            Value::Error(e) => serde_json::json!({ "message": e.message() }),
        }
    }
}

impl From<serde_json::Value> for Value {
    fn from(json: serde_json::Value) -> Self {
        use serde_json::Value as Json;
        match json {
            Json::Null => Value::Null,
            Json::Bool(b) => Value::Bool(b),
            Json::Number(n) => Value::Number(n.as_f64().unwrap_or(f64::NAN)),
            Json::String(s) => Value::String(s),
            Json::Array(items) => Value::Array(items.into_iter().map(Value::from).collect()),
            Json::Object(map) => Value::Object(map.into_iter().map(|(k, v)| (k, Value::from(v))).collect()),
        }
    }
}

impl From<&str> for Value {
    fn from(s: &str) -> Self {
        Value::String(s.to_string())
    }
}

impl From<String> for Value {
    fn from(s: String) -> Self {
        Value::String(s)
    }
}

impl From<bool> for Value {
    fn from(b: bool) -> Self {
        Value::Bool(b)
    }
}

impl From<f64> for Value {
    fn from(n: f64) -> Self {
        Value::Number(n)
    }
}

impl From<i64> for Value {
    fn from(n: i64) -> Self {
        Value::Number(n as f64)
    }
}

impl From<DateTime<Utc>> for Value {
    fn from(d: DateTime<Utc>) -> Self {
        Value::Date(d)
    }
}

impl From<ErrorValue> for Value {
    fn from(e: ErrorValue) -> Self {
        Value::Error(e)
    }
}

impl From<Vec<Value>> for Value {
    fn from(items: Vec<Value>) -> Self {
        Value::Array(items)
    }
}

/// An error thrown by a route function.
///
/// Equality compares messages only: stacks do not survive the network.
#[derive(Debug, Clone)]
pub struct ErrorValue {
    message: String,
    stack: Option<String>,
}

impl ErrorValue {
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
            stack: None,
        }
    }

    pub fn with_stack(mut self, stack: impl Into<String>) -> Self {
        self.stack = Some(stack.into());
        self
    }

    pub fn message(&self) -> &str {
        &self.message
    }

    pub fn stack(&self) -> Option<&str> {
        self.stack.as_deref()
    }

    /// Capture any error as a route error, keeping its source chain as the
    /// stack.
    pub fn from_error(err: &(dyn std::error::Error + 'static)) -> Self {
        let mut chain = Vec::new();
        let mut source = err.source();
        while let Some(s) = source {
            chain.push(format!("caused by: {}", s));
            source = s.source();
        }
        let error = Self::new(err.to_string());
        if chain.is_empty() {
            error
        } else {
            error.with_stack(chain.join("\n"))
        }
    }
}

impl PartialEq for ErrorValue {
    fn eq(&self, other: &Self) -> bool {
        self.message == other.message
    }
}

impl fmt::Display for ErrorValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.message)
    }
}

impl std::error::Error for ErrorValue {}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    #[test]
    fn test_error_equality_ignores_stack() {
        let a = ErrorValue::new("boom").with_stack("at loader");
        let b = ErrorValue::new("boom");
        assert_eq!(a, b);
        assert_ne!(a, ErrorValue::new("other"));
    }

    #[test]
    fn test_plain_json_conversion() {
        let date = Utc.with_ymd_and_hms(2024, 3, 12, 12, 0, 0).unwrap();
        let value = Value::object([
            ("date", Value::Date(date)),
            ("gone", Value::Undefined),
            ("nan", Value::Number(f64::NAN)),
        ]);
        assert_eq!(
            value.to_plain_json(),
            serde_json::json!({ "date": "2024-03-12T12:00:00.000Z", "nan": null })
        );
    }

    #[test]
    fn test_from_json() {
        let value = Value::from(serde_json::json!({ "message": "ROOT", "n": 2 }));
        assert_eq!(value.get("message").and_then(Value::as_str), Some("ROOT"));
        assert_eq!(value.get("n").and_then(Value::as_f64), Some(2.0));
    }
}
