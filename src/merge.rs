//! Header and query parameter merging.
//!
//! Options carry headers and params as *patches*: ordered lists of
//! `(key, Option<value>)`. A `Some` sets the key, a `None` removes whatever a
//! less specific layer put there.

use http::{HeaderMap, HeaderName, HeaderValue};
use serde_json::Value;
use std::collections::HashSet;
use std::sync::Arc;
use url::form_urlencoded;

/// A list of header assignments (`Some`) and removals (`None`).
pub type HeaderPatch = Vec<(HeaderName, Option<HeaderValue>)>;

/// A list of param assignments (`Some`) and removals (`None`).
pub type ParamPatch = Vec<(String, Option<ParamValue>)>;

/// Serializes structured params into a query string, with or without a
/// leading `?`.
pub type ParamSerializer = Arc<dyn Fn(&[(String, Value)]) -> String + Send + Sync>;

/// The value of a query parameter.
#[derive(Debug, Clone, PartialEq)]
pub enum ParamValue {
    /// A structured value handed to the param serializer.
    Value(Value),
    /// An already encoded value, written to the query string as is.
    Raw(String),
}

impl ParamValue {
    /// Creates a pre-serialized value that bypasses the param serializer.
    pub fn raw(encoded: impl Into<String>) -> Self {
        ParamValue::Raw(encoded.into())
    }
}

impl From<Value> for ParamValue {
    fn from(value: Value) -> Self {
        ParamValue::Value(value)
    }
}

impl From<&str> for ParamValue {
    fn from(value: &str) -> Self {
        ParamValue::Value(Value::from(value))
    }
}

impl From<String> for ParamValue {
    fn from(value: String) -> Self {
        ParamValue::Value(Value::from(value))
    }
}

impl From<i64> for ParamValue {
    fn from(value: i64) -> Self {
        ParamValue::Value(Value::from(value))
    }
}

impl From<u64> for ParamValue {
    fn from(value: u64) -> Self {
        ParamValue::Value(Value::from(value))
    }
}

impl From<i32> for ParamValue {
    fn from(value: i32) -> Self {
        ParamValue::Value(Value::from(value))
    }
}

impl From<bool> for ParamValue {
    fn from(value: bool) -> Self {
        ParamValue::Value(Value::from(value))
    }
}

/// Applies header patches on top of a base map, least specific first.
///
/// Header names are case-insensitive; a later `Some` replaces every earlier
/// value for the name and a later `None` deletes it.
pub fn merge_headers<'a, I>(base: HeaderMap, layers: I) -> HeaderMap
where
    I: IntoIterator<Item = &'a [(HeaderName, Option<HeaderValue>)]>,
{
    let mut merged = base;
    for layer in layers {
        for (name, value) in layer {
            match value {
                Some(value) => {
                    merged.insert(name.clone(), value.clone());
                }
                None => {
                    merged.remove(name);
                }
            }
        }
    }
    merged
}

/// Merges factory-level and call-level params.
///
/// Factory params whose key already appears in the input's own query string
/// are dropped. Call params are then overlaid; a call-level `None` removes
/// the key. Keys keep the position they were first inserted at.
pub fn merge_params(
    factory: &[(String, Option<ParamValue>)],
    call: &[(String, Option<ParamValue>)],
    input_query_keys: &HashSet<String>,
) -> Vec<(String, ParamValue)> {
    let mut merged: Vec<(String, ParamValue)> = Vec::new();
    let factory = factory
        .iter()
        .filter(|(key, _)| !input_query_keys.contains(key));
    for (key, value) in factory.chain(call) {
        match value {
            Some(value) => match merged.iter_mut().find(|(k, _)| k == key) {
                Some(slot) => slot.1 = value.clone(),
                None => merged.push((key.clone(), value.clone())),
            },
            None => merged.retain(|(k, _)| k != key),
        }
    }
    merged
}

/// The default param serializer: `application/x-www-form-urlencoded`.
///
/// `null` values are skipped, arrays repeat the key once per element and
/// objects are written as their JSON text.
pub fn serialize_params(params: &[(String, Value)]) -> String {
    let mut serializer = form_urlencoded::Serializer::new(String::new());
    for (key, value) in params {
        match value {
            Value::Null => {}
            Value::Array(items) => {
                for item in items {
                    if let Some(text) = scalar_text(item) {
                        serializer.append_pair(key, &text);
                    }
                }
            }
            other => {
                if let Some(text) = scalar_text(other) {
                    serializer.append_pair(key, &text);
                }
            }
        }
    }
    serializer.finish()
}

fn scalar_text(value: &Value) -> Option<String> {
    match value {
        Value::Null => None,
        Value::String(text) => Some(text.clone()),
        other => Some(other.to_string()),
    }
}

/// Serializes merged params into a query string without a leading `?`.
///
/// Params keep their merged order. Each run of consecutive structured values
/// goes through `serializer` as one batch; raw values are written between
/// the runs exactly as given.
pub(crate) fn to_query(params: &[(String, ParamValue)], serializer: &ParamSerializer) -> String {
    let mut parts = Vec::new();
    let mut run: Vec<(String, Value)> = Vec::new();
    for (key, value) in params {
        match value {
            ParamValue::Value(value) => run.push((key.clone(), value.clone())),
            ParamValue::Raw(raw) => {
                flush_run(&mut run, serializer, &mut parts);
                let key: String = form_urlencoded::byte_serialize(key.as_bytes()).collect();
                parts.push(format!("{key}={raw}"));
            }
        }
    }
    flush_run(&mut run, serializer, &mut parts);
    parts.join("&")
}

fn flush_run(
    run: &mut Vec<(String, Value)>,
    serializer: &ParamSerializer,
    parts: &mut Vec<String>,
) {
    if run.is_empty() {
        return;
    }
    let serialized = serializer(run.as_slice());
    run.clear();
    let serialized = serialized.trim_start_matches('?');
    if !serialized.is_empty() {
        parts.push(serialized.to_string());
    }
}
