//! Request and response bodies.
//!
//! Three shapes of body exist in this crate:
//!
//! * [`RawBody`] - what a caller puts in [`FetchOptions`](crate::FetchOptions).
//!   A JSON value that is an object or an array is *jsonifiable* and will be
//!   run through the body serializer; everything else passes through.
//! * [`BodyInit`] - the resolved, replayable payload. A new [`Body`] is made
//!   from it for every attempt.
//! * [`Body`] - the single-use bytes that travel over the transport.

use crate::error::BoxError;
use bytes::Bytes;
use futures_util::stream::{self, BoxStream, StreamExt, TryStreamExt};
use serde::Serialize;
use serde_json::Value;
use std::fmt;
use std::sync::{Arc, Mutex, PoisonError};

/// A stream of body chunks.
pub type BodyStream = BoxStream<'static, Result<Bytes, BoxError>>;

/// Produces a fresh body stream each time it is called.
pub type StreamFactory = Arc<dyn Fn() -> BodyStream + Send + Sync>;

/// Converts a jsonifiable value into a request payload.
///
/// Returning [`BodyInit::Text`] makes the resolver add
/// `content-type: application/json` when no content type was set. Any other
/// payload is sent without an inferred content type.
pub type BodySerializer = Arc<dyn Fn(&Value) -> BodyInit + Send + Sync>;

/// A single-use body, as handed to or returned by a [`Transport`](crate::Transport).
#[derive(Default)]
pub struct Body {
    kind: Kind,
}

#[derive(Default)]
enum Kind {
    #[default]
    Empty,
    Full(Bytes),
    // Only ever moved out, never locked; the mutex makes `Body: Sync`.
    Stream(Mutex<BodyStream>, Option<u64>),
}

impl Body {
    /// An empty body.
    pub fn empty() -> Self {
        Self::default()
    }

    /// Wraps a chunk stream of unknown length.
    pub fn wrap_stream(stream: BodyStream) -> Self {
        Self {
            kind: Kind::Stream(Mutex::new(stream), None),
        }
    }

    /// Wraps a chunk stream that yields exactly `len` bytes.
    ///
    /// Transports use the length to frame the body instead of sending it
    /// chunked.
    pub fn sized_stream(stream: BodyStream, len: u64) -> Self {
        Self {
            kind: Kind::Stream(Mutex::new(stream), Some(len)),
        }
    }

    /// Returns `true` if the body is known to carry no bytes.
    pub fn is_empty(&self) -> bool {
        match &self.kind {
            Kind::Empty => true,
            Kind::Full(bytes) => bytes.is_empty(),
            Kind::Stream(..) => false,
        }
    }

    /// Returns the body length when it is known without reading the body.
    pub fn size_hint(&self) -> Option<u64> {
        match &self.kind {
            Kind::Empty => Some(0),
            Kind::Full(bytes) => Some(bytes.len() as u64),
            Kind::Stream(_, len) => *len,
        }
    }

    /// Returns the buffered bytes, if this body is not a stream.
    pub fn as_bytes(&self) -> Option<&[u8]> {
        match &self.kind {
            Kind::Empty => Some(&[]),
            Kind::Full(bytes) => Some(bytes.as_ref()),
            Kind::Stream(..) => None,
        }
    }

    /// Turns the body into a chunk stream. Buffered bodies yield one chunk.
    pub fn into_stream(self) -> BodyStream {
        match self.kind {
            Kind::Empty => stream::empty().boxed(),
            Kind::Full(bytes) => stream::once(async move { Ok(bytes) }).boxed(),
            Kind::Stream(stream, _) => stream.into_inner().unwrap_or_else(PoisonError::into_inner),
        }
    }

    /// Reads the whole body into memory.
    pub async fn bytes(self) -> Result<Bytes, BoxError> {
        match self.kind {
            Kind::Empty => Ok(Bytes::new()),
            Kind::Full(bytes) => Ok(bytes),
            Kind::Stream(stream, _) => {
                let stream = stream.into_inner().unwrap_or_else(PoisonError::into_inner);
                let chunks: Vec<Bytes> = stream.try_collect().await?;
                Ok(chunks.concat().into())
            }
        }
    }
}

impl fmt::Debug for Body {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.kind {
            Kind::Empty => f.write_str("Body::Empty"),
            Kind::Full(bytes) => f.debug_tuple("Body::Full").field(&bytes.len()).finish(),
            Kind::Stream(_, len) => f.debug_tuple("Body::Stream").field(len).finish(),
        }
    }
}

impl From<Bytes> for Body {
    fn from(bytes: Bytes) -> Self {
        Self {
            kind: Kind::Full(bytes),
        }
    }
}

impl From<Vec<u8>> for Body {
    fn from(bytes: Vec<u8>) -> Self {
        Bytes::from(bytes).into()
    }
}

impl From<String> for Body {
    fn from(text: String) -> Self {
        Bytes::from(text).into()
    }
}

impl From<&'static str> for Body {
    fn from(text: &'static str) -> Self {
        Bytes::from_static(text.as_bytes()).into()
    }
}

/// A resolved request payload that can be turned into a [`Body`] once per
/// attempt.
#[derive(Clone)]
pub enum BodyInit {
    /// Text, typically serialized JSON.
    Text(String),
    /// Opaque binary data.
    Bytes(Bytes),
    /// A streamed body whose length is not known upfront.
    Stream(StreamFactory),
}

impl BodyInit {
    /// Creates a streamed payload from a factory.
    pub fn stream<F>(factory: F) -> Self
    where
        F: Fn() -> BodyStream + Send + Sync + 'static,
    {
        BodyInit::Stream(Arc::new(factory))
    }

    /// Makes a fresh wire body.
    pub fn to_body(&self) -> Body {
        match self {
            BodyInit::Text(text) => Body::from(text.clone()),
            BodyInit::Bytes(bytes) => Body::from(bytes.clone()),
            BodyInit::Stream(factory) => Body::wrap_stream(factory()),
        }
    }
}

impl PartialEq for BodyInit {
    fn eq(&self, other: &Self) -> bool {
        match (self, other) {
            (BodyInit::Text(a), BodyInit::Text(b)) => a == b,
            (BodyInit::Bytes(a), BodyInit::Bytes(b)) => a == b,
            (BodyInit::Stream(a), BodyInit::Stream(b)) => Arc::ptr_eq(a, b),
            _ => false,
        }
    }
}

impl fmt::Debug for BodyInit {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            BodyInit::Text(text) => f.debug_tuple("Text").field(text).finish(),
            BodyInit::Bytes(bytes) => f.debug_tuple("Bytes").field(bytes).finish(),
            BodyInit::Stream(_) => f.write_str("Stream"),
        }
    }
}

/// A request body as supplied in options.
#[derive(Clone, Debug, PartialEq)]
pub enum RawBody {
    /// A JSON value. Objects and arrays are serialized by the body
    /// serializer; strings, numbers and booleans are sent as their text and
    /// `null` means no body.
    Json(Value),
    /// A payload that is never serialized.
    Init(BodyInit),
}

impl RawBody {
    /// Converts any serializable value into a [`RawBody::Json`].
    pub fn json<T: Serialize + ?Sized>(value: &T) -> crate::Result<Self> {
        serde_json::to_value(value)
            .map(RawBody::Json)
            .map_err(|e| crate::Error::SerializationFailed(e.to_string()))
    }
}

impl From<BodyInit> for RawBody {
    fn from(init: BodyInit) -> Self {
        RawBody::Init(init)
    }
}

/// Returns `true` if the value should go through the body serializer.
pub fn is_jsonifiable(value: &Value) -> bool {
    matches!(value, Value::Object(_) | Value::Array(_))
}

/// The default body serializer: compact JSON text.
pub fn serialize_json(value: &Value) -> BodyInit {
    BodyInit::Text(value.to_string())
}

/// The outcome of resolving a [`RawBody`].
#[derive(Debug, Clone, PartialEq)]
pub(crate) struct ResolvedBody {
    pub(crate) init: Option<BodyInit>,
    /// Set when a jsonifiable value serialized to text.
    pub(crate) infer_json: bool,
}

/// Classifies and, when jsonifiable, serializes a raw body.
pub(crate) fn resolve_body(raw: Option<&RawBody>, serializer: &BodySerializer) -> ResolvedBody {
    match raw {
        None => ResolvedBody {
            init: None,
            infer_json: false,
        },
        Some(RawBody::Json(value)) if is_jsonifiable(value) => {
            let init = serializer(value);
            let infer_json = matches!(init, BodyInit::Text(_));
            ResolvedBody {
                init: Some(init),
                infer_json,
            }
        }
        Some(RawBody::Json(value)) => ResolvedBody {
            init: passthrough_scalar(value),
            infer_json: false,
        },
        Some(RawBody::Init(init)) => ResolvedBody {
            init: Some(init.clone()),
            infer_json: false,
        },
    }
}

fn passthrough_scalar(value: &Value) -> Option<BodyInit> {
    match value {
        Value::Null => None,
        Value::String(text) => Some(BodyInit::Text(text.clone())),
        other => Some(BodyInit::Text(other.to_string())),
    }
}
