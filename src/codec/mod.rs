//! Single-fetch wire codec.
//!
//! # Data Flow
//! ```text
//! AggregatedResponse
//!     → encode_response (redirect → 204 + X-Remix-* headers, empty body)
//!     → body: { "<route id>": {"data": V} | {"error": V}, ... }   (loaders)
//!             {"data": V} | {"error": V}                          (action)
//!     → network
//!     → decode_response → Decoded::{Redirect, Routes, Action}
//! ```
//!
//! # Value Encoding (version 1)
//! JSON primitives, arrays and objects encode as themselves. Values JSON
//! cannot carry are objects tagged with `"$t"`:
//!
//! | tag         | payload                              |
//! |-------------|--------------------------------------|
//! | `undefined` | none                                 |
//! | `number`    | `"v"`: `NaN`, `Infinity`, `-Infinity`, `-0` |
//! | `date`      | `"v"`: milliseconds since the epoch  |
//! | `error`     | `"message"`, `"stack"` (presence flag) |
//! | `object`    | `"v"`: a plain object that has its own `"$t"` key |
//!
//! Decoded errors never carry a stack.

pub mod value;

use std::collections::BTreeMap;

use axum::body::Bytes;
use axum::http::{header, HeaderMap, HeaderValue, StatusCode};
use chrono::DateTime;
use serde_json::{Map, Value as Json};
use thiserror::Error;

use crate::aggregate::{AggregatedResponse, RouteResult};
use crate::response::Redirect;

pub use value::{ErrorValue, Object, Value};

/// Version of the value tag table.
pub const CODEC_VERSION: u32 = 1;

/// Content type of single-fetch bodies.
pub const CONTENT_TYPE: &str = "application/x-canopy-single-fetch; v=1";
const CONTENT_TYPE_ESSENCE: &str = "application/x-canopy-single-fetch";

pub const X_REMIX_REDIRECT: &str = "x-remix-redirect";
pub const X_REMIX_STATUS: &str = "x-remix-status";
pub const X_REMIX_REVALIDATE: &str = "x-remix-revalidate";
pub const X_REMIX_RESPONSE: &str = "x-remix-response";
pub const X_REMIX_CATCH: &str = "x-remix-catch";
pub const X_REMIX_ERROR: &str = "x-remix-error";

const TAG: &str = "$t";

/// Codec violations. Encoding and decoding fail fast, never drop data.
#[derive(Debug, Error)]
pub enum CodecError {
    #[error("values of type {0} cannot be encoded")]
    Unsupported(&'static str),

    #[error("entry for `{0}` contains both data and error")]
    DualEntry(String),

    #[error("entry for `{0}` contains neither data nor error")]
    EmptyEntry(String),

    #[error("unknown type tag `{0}`")]
    UnknownTag(String),

    #[error("malformed `{0}` value")]
    Malformed(&'static str),

    #[error("unsupported payload version: {0}")]
    Version(String),

    #[error("expected a JSON object payload")]
    NotAnObject,

    #[error("invalid payload: {0}")]
    Json(#[from] serde_json::Error),
}

/// One route's slot on the wire.
#[derive(Debug, Clone, PartialEq)]
pub enum Entry {
    Data(Value),
    Error(Value),
}

impl Entry {
    pub fn data(&self) -> Option<&Value> {
        match self {
            Entry::Data(v) => Some(v),
            Entry::Error(_) => None,
        }
    }

    pub fn error(&self) -> Option<&Value> {
        match self {
            Entry::Error(v) => Some(v),
            Entry::Data(_) => None,
        }
    }
}

/// Which body shape a response carries.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PayloadKind {
    /// Mapping of route id to entry.
    Loaders,
    /// A single entry for the action route.
    Action,
}

/// A response ready to hand to the HTTP layer.
#[derive(Debug, Clone)]
pub struct EncodedResponse {
    pub status: StatusCode,
    pub headers: HeaderMap,
    pub body: Bytes,
}

/// What a client reads back off the wire.
#[derive(Debug, Clone, PartialEq)]
pub enum Decoded {
    Redirect(Redirect),
    Routes(BTreeMap<String, Entry>),
    Action(Entry),
}

pub fn encode_value(value: &Value) -> Result<Json, CodecError> {
    Ok(match value {
        Value::Undefined => tagged("undefined", Map::new()),
        Value::Null => Json::Null,
        Value::Bool(b) => Json::Bool(*b),
        Value::Number(n) => encode_number(*n),
        Value::String(s) => Json::String(s.clone()),
        Value::Array(items) => Json::Array(
            items
                .iter()
                .map(encode_value)
                .collect::<Result<Vec<_>, _>>()?,
        ),
        Value::Object(map) => {
            let mut members = Map::new();
            for (k, v) in map {
                members.insert(k.clone(), encode_value(v)?);
            }
            if members.contains_key(TAG) {
                let mut payload = Map::new();
                payload.insert("v".into(), Json::Object(members));
                tagged("object", payload)
            } else {
                Json::Object(members)
            }
        }
        Value::Date(d) => {
            let mut payload = Map::new();
            payload.insert("v".into(), Json::from(d.timestamp_millis()));
            tagged("date", payload)
        }
        Value::Error(e) => {
            let mut payload = Map::new();
            payload.insert("message".into(), Json::String(e.message().to_string()));
            payload.insert("stack".into(), Json::Bool(e.stack().is_some()));
            tagged("error", payload)
        }
        Value::ServerComponent(_) => return Err(CodecError::Unsupported(value.type_name())),
    })
}

pub fn decode_value(json: Json) -> Result<Value, CodecError> {
    Ok(match json {
        Json::Null => Value::Null,
        Json::Bool(b) => Value::Bool(b),
        Json::Number(n) => Value::Number(n.as_f64().ok_or(CodecError::Malformed("number"))?),
        Json::String(s) => Value::String(s),
        Json::Array(items) => Value::Array(
            items
                .into_iter()
                .map(decode_value)
                .collect::<Result<Vec<_>, _>>()?,
        ),
        Json::Object(map) if map.contains_key(TAG) => decode_tagged(map)?,
        Json::Object(map) => decode_members(map)?,
    })
}

fn tagged(tag: &str, mut payload: Map<String, Json>) -> Json {
    payload.insert(TAG.into(), Json::String(tag.into()));
    Json::Object(payload)
}

fn encode_number(n: f64) -> Json {
    let special = if n.is_nan() {
        "NaN"
    } else if n == f64::INFINITY {
        "Infinity"
    } else if n == f64::NEG_INFINITY {
        "-Infinity"
    } else if n == 0.0 && n.is_sign_negative() {
        "-0"
    } else {
        return serde_json::Number::from_f64(n)
            .map(Json::Number)
            .unwrap_or(Json::Null);
    };
    let mut payload = Map::new();
    payload.insert("v".into(), Json::String(special.into()));
    tagged("number", payload)
}

fn decode_members(map: Map<String, Json>) -> Result<Value, CodecError> {
    let mut object = Object::new();
    for (k, v) in map {
        object.insert(k, decode_value(v)?);
    }
    Ok(Value::Object(object))
}

fn decode_tagged(mut map: Map<String, Json>) -> Result<Value, CodecError> {
    let tag = match map.remove(TAG) {
        Some(Json::String(tag)) => tag,
        _ => return Err(CodecError::Malformed("tag")),
    };
    match tag.as_str() {
        "undefined" => Ok(Value::Undefined),
        "number" => match map.get("v").and_then(Json::as_str) {
            Some("NaN") => Ok(Value::Number(f64::NAN)),
            Some("Infinity") => Ok(Value::Number(f64::INFINITY)),
            Some("-Infinity") => Ok(Value::Number(f64::NEG_INFINITY)),
            Some("-0") => Ok(Value::Number(-0.0)),
            _ => Err(CodecError::Malformed("number")),
        },
        "date" => map
            .get("v")
            .and_then(Json::as_i64)
            .and_then(DateTime::from_timestamp_millis)
            .map(Value::Date)
            .ok_or(CodecError::Malformed("date")),
        "error" => map
            .get("message")
            .and_then(Json::as_str)
            .map(|message| Value::Error(ErrorValue::new(message)))
            .ok_or(CodecError::Malformed("error")),
        "object" => match map.remove("v") {
            Some(Json::Object(members)) => decode_members(members),
            _ => Err(CodecError::Malformed("object")),
        },
        _ => Err(CodecError::UnknownTag(tag)),
    }
}

fn encode_entry(entry: &Entry) -> Result<Json, CodecError> {
    let mut slot = Map::new();
    match entry {
        Entry::Data(v) => slot.insert("data".into(), encode_value(v)?),
        Entry::Error(v) => slot.insert("error".into(), encode_value(v)?),
    };
    Ok(Json::Object(slot))
}

fn decode_entry(owner: &str, json: Json) -> Result<Entry, CodecError> {
    let Json::Object(mut slot) = json else {
        return Err(CodecError::NotAnObject);
    };
    match (slot.remove("data"), slot.remove("error")) {
        (Some(_), Some(_)) => Err(CodecError::DualEntry(owner.to_string())),
        (Some(data), None) => Ok(Entry::Data(decode_value(data)?)),
        (None, Some(error)) => Ok(Entry::Error(decode_value(error)?)),
        (None, None) => Err(CodecError::EmptyEntry(owner.to_string())),
    }
}

/// Encode a route id → entry mapping.
pub fn encode_routes<'a, I>(entries: I) -> Result<Vec<u8>, CodecError>
where
    I: IntoIterator<Item = (&'a str, &'a Entry)>,
{
    let mut payload = Map::new();
    for (id, entry) in entries {
        payload.insert(id.to_string(), encode_entry(entry)?);
    }
    Ok(serde_json::to_vec(&Json::Object(payload))?)
}

pub fn decode_routes(bytes: &[u8]) -> Result<BTreeMap<String, Entry>, CodecError> {
    let Json::Object(payload) = serde_json::from_slice(bytes)? else {
        return Err(CodecError::NotAnObject);
    };
    payload
        .into_iter()
        .map(|(id, slot)| decode_entry(&id, slot).map(|entry| (id, entry)))
        .collect()
}

pub fn encode_action(entry: &Entry) -> Result<Vec<u8>, CodecError> {
    Ok(serde_json::to_vec(&encode_entry(entry)?)?)
}

pub fn decode_action(bytes: &[u8]) -> Result<Entry, CodecError> {
    decode_entry("action", serde_json::from_slice(bytes)?)
}

/// Rewrite a redirect into the out-of-band form: the fetch transport would
/// follow a real 3xx, so the target travels in headers on a 204 instead.
pub fn redirect_headers(original: &HeaderMap, redirect: &Redirect) -> HeaderMap {
    let mut headers = original.clone();
    headers.remove(header::LOCATION);
    if let Ok(location) = HeaderValue::from_str(&redirect.location) {
        headers.insert(X_REMIX_REDIRECT, location);
    }
    headers.insert(X_REMIX_STATUS, HeaderValue::from(redirect.status.as_u16()));
    if redirect.revalidate || original.contains_key(header::SET_COOKIE) {
        headers.insert(X_REMIX_REVALIDATE, HeaderValue::from_static("yes"));
    }
    headers
}

/// Read an out-of-band redirect back from response headers.
pub fn read_redirect(status: StatusCode, headers: &HeaderMap) -> Option<Redirect> {
    if status != StatusCode::NO_CONTENT {
        return None;
    }
    let location = headers.get(X_REMIX_REDIRECT)?.to_str().ok()?.to_string();
    let status = headers
        .get(X_REMIX_STATUS)
        .and_then(|v| v.to_str().ok())
        .and_then(|v| v.parse::<u16>().ok())
        .and_then(|v| StatusCode::from_u16(v).ok())
        .unwrap_or(StatusCode::FOUND);
    Some(Redirect {
        location,
        status,
        revalidate: headers.contains_key(X_REMIX_REVALIDATE),
    })
}

/// Serialize an aggregated response for the single-fetch endpoint.
pub fn encode_response(response: &AggregatedResponse) -> Result<EncodedResponse, CodecError> {
    if let Some(redirect) = response.redirect() {
        return Ok(EncodedResponse {
            status: StatusCode::NO_CONTENT,
            headers: redirect_headers(response.headers(), redirect),
            body: Bytes::new(),
        });
    }

    let entries: Vec<(&str, Entry)> = response
        .results()
        .iter()
        .filter_map(|(id, result)| {
            let entry = match result {
                RouteResult::Data(v) => Entry::Data(v.clone()),
                RouteResult::Error(v) => Entry::Error(v.clone()),
                RouteResult::Redirect(_) => return None,
            };
            Some((id.as_str(), entry))
        })
        .collect();

    let body = match response.kind() {
        PayloadKind::Loaders => encode_routes(entries.iter().map(|(id, e)| (*id, e)))?,
        PayloadKind::Action => match entries.first() {
            Some((_, entry)) => encode_action(entry)?,
            None => encode_action(&Entry::Data(Value::Null))?,
        },
    };

    let mut headers = response.headers().clone();
    headers.insert(header::CONTENT_TYPE, HeaderValue::from_static(CONTENT_TYPE));
    Ok(EncodedResponse {
        status: response.status(),
        headers,
        body: Bytes::from(body),
    })
}

/// Inverse of [`encode_response`].
pub fn decode_response(
    status: StatusCode,
    headers: &HeaderMap,
    body: &[u8],
    kind: PayloadKind,
) -> Result<Decoded, CodecError> {
    if let Some(redirect) = read_redirect(status, headers) {
        return Ok(Decoded::Redirect(redirect));
    }
    check_content_type(headers)?;
    match kind {
        PayloadKind::Loaders => decode_routes(body).map(Decoded::Routes),
        PayloadKind::Action => decode_action(body).map(Decoded::Action),
    }
}

fn check_content_type(headers: &HeaderMap) -> Result<(), CodecError> {
    let content_type = headers
        .get(header::CONTENT_TYPE)
        .and_then(|v| v.to_str().ok())
        .ok_or_else(|| CodecError::Version("missing content type".into()))?;
    let mut parts = content_type.split(';').map(str::trim);
    if parts.next() != Some(CONTENT_TYPE_ESSENCE) {
        return Err(CodecError::Version(content_type.to_string()));
    }
    let version = parts
        .find_map(|p| p.strip_prefix("v="))
        .and_then(|v| v.parse::<u32>().ok());
    match version {
        Some(CODEC_VERSION) => Ok(()),
        _ => Err(CodecError::Version(content_type.to_string())),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{TimeZone, Utc};

    fn round_trip(value: Value) -> Value {
        decode_value(encode_value(&value).unwrap()).unwrap()
    }

    #[test]
    fn test_supported_values_round_trip() {
        let date = Utc.with_ymd_and_hms(2024, 3, 12, 12, 0, 0).unwrap();
        let samples = vec![
            Value::Null,
            Value::Bool(true),
            Value::Number(42.5),
            Value::String("hello".into()),
            Value::Date(date),
            Value::Error(ErrorValue::new("Loader Error")),
            Value::Array(vec![Value::Number(1.0), Value::Null, Value::Date(date)]),
            Value::object([
                ("message", Value::from("DATA")),
                ("date", Value::Date(date)),
                ("nested", Value::object([("ok", Value::Bool(false))])),
            ]),
        ];
        for sample in samples {
            assert_eq!(round_trip(sample.clone()), sample);
        }
    }

    #[test]
    fn test_error_stack_is_not_restored() {
        let decoded = round_trip(Value::Error(ErrorValue::new("boom").with_stack("at loader")));
        match decoded {
            Value::Error(e) => {
                assert_eq!(e.message(), "boom");
                assert!(e.stack().is_none());
            }
            other => panic!("expected error, got {:?}", other),
        }
    }

    #[test]
    fn test_special_numbers_and_undefined() {
        assert!(round_trip(Value::Number(f64::NAN)).as_f64().unwrap().is_nan());
        assert_eq!(round_trip(Value::Number(f64::INFINITY)), Value::Number(f64::INFINITY));
        let neg_zero = round_trip(Value::Number(-0.0)).as_f64().unwrap();
        assert!(neg_zero == 0.0 && neg_zero.is_sign_negative());
        assert_eq!(round_trip(Value::Undefined), Value::Undefined);
    }

    #[test]
    fn test_object_with_tag_key_is_escaped() {
        let value = Value::object([("$t", Value::from("date")), ("v", Value::from("x"))]);
        let encoded = encode_value(&value).unwrap();
        assert_eq!(encoded["$t"], "object");
        assert_eq!(round_trip(value.clone()), value);
    }

    #[test]
    fn test_server_component_is_rejected() {
        let value = Value::object([("ui", Value::ServerComponent("Card".into()))]);
        assert!(matches!(encode_value(&value), Err(CodecError::Unsupported(_))));
    }

    #[test]
    fn test_dual_entry_fails() {
        let body = br#"{"root":{"data":1,"error":2}}"#;
        assert!(matches!(decode_routes(body), Err(CodecError::DualEntry(id)) if id == "root"));
        assert!(matches!(decode_action(br#"{}"#), Err(CodecError::EmptyEntry(_))));
    }

    #[test]
    fn test_routes_payload_round_trip() {
        let root = Entry::Data(Value::object([("message", Value::from("ROOT"))]));
        let data = Entry::Error(Value::Error(ErrorValue::new("Loader Error")));
        let bytes = encode_routes([("root", &root), ("routes/data", &data)]).unwrap();
        let decoded = decode_routes(&bytes).unwrap();
        assert_eq!(decoded.get("root"), Some(&root));
        assert_eq!(decoded.get("routes/data"), Some(&data));
    }

    #[test]
    fn test_unknown_tag_fails() {
        let json = serde_json::json!({ "$t": "bigint", "v": "1" });
        assert!(matches!(decode_value(json), Err(CodecError::UnknownTag(t)) if t == "bigint"));
    }

    #[test]
    fn test_redirect_headers() {
        let mut original = HeaderMap::new();
        original.insert(header::LOCATION, HeaderValue::from_static("/target"));
        original.insert(header::SET_COOKIE, HeaderValue::from_static("a=1"));
        let redirect = Redirect {
            location: "/target".into(),
            status: StatusCode::SEE_OTHER,
            revalidate: false,
        };
        let headers = redirect_headers(&original, &redirect);
        assert!(headers.get(header::LOCATION).is_none());
        assert_eq!(headers[X_REMIX_REDIRECT], "/target");
        assert_eq!(headers[X_REMIX_STATUS], "303");
        assert_eq!(headers[X_REMIX_REVALIDATE], "yes");
        assert_eq!(read_redirect(StatusCode::NO_CONTENT, &headers).unwrap().status, StatusCode::SEE_OTHER);
    }

    #[test]
    fn test_content_type_version_is_checked() {
        let mut headers = HeaderMap::new();
        headers.insert(header::CONTENT_TYPE, HeaderValue::from_static("application/x-canopy-single-fetch; v=2"));
        let err = decode_response(StatusCode::OK, &headers, b"{}", PayloadKind::Loaders);
        assert!(matches!(err, Err(CodecError::Version(_))));

        headers.insert(header::CONTENT_TYPE, HeaderValue::from_static(CONTENT_TYPE));
        let ok = decode_response(StatusCode::OK, &headers, b"{}", PayloadKind::Loaders).unwrap();
        assert_eq!(ok, Decoded::Routes(BTreeMap::new()));
    }
}
