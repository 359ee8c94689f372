//! Layered request options.
//!
//! A call is configured by three layers, least specific first: built-in
//! fallbacks, the client's defaults (the *factory* layer) and the options
//! passed to one call. [`resolve`] folds them into a [`ResolvedOptions`]
//! that holds a concrete value for every setting.

use crate::body::{self, BodyInit, BodySerializer, RawBody};
use crate::error::{self, BoxError, Error, Result};
use crate::hooks::{Hooks, LayeredHooks};
use crate::merge::{self, HeaderPatch, ParamPatch, ParamSerializer, ParamValue};
use crate::parse::{
    self, JsonOrText, ParseRejected, ParseResponse, RejectFn, RejectWithBody, Schema,
};
use crate::progress::{OnProgress, Progress};
use crate::retry::{ResolvedRetry, RetryContext, RetryOptions};
use crate::signal::AbortSignal;
use crate::target;
use crate::transport::{Request, Response};
use bytes::Bytes;
use http::header::CONTENT_TYPE;
use http::{HeaderMap, HeaderName, HeaderValue, Method};
use serde::Serialize;
use serde_json::Value;
use std::collections::HashSet;
use std::fmt;
use std::sync::Arc;
use std::time::Duration;
use url::Url;

/// Converts a value thrown by user code into an [`Error`].
pub type ToError = Arc<dyn Fn(BoxError) -> Error + Send + Sync>;

/// What a call is aimed at.
#[derive(Debug, Clone)]
pub enum Input {
    /// A path relative to the base URL, or an absolute URL. May carry its
    /// own query string.
    Url(String),
    /// A fully built request. Params are not applied to it.
    Prepared(PreparedRequest),
}

impl From<&str> for Input {
    fn from(input: &str) -> Self {
        Input::Url(input.to_string())
    }
}

impl From<String> for Input {
    fn from(input: String) -> Self {
        Input::Url(input)
    }
}

impl From<&String> for Input {
    fn from(input: &String) -> Self {
        Input::Url(input.clone())
    }
}

impl From<Url> for Input {
    fn from(url: Url) -> Self {
        Input::Url(url.into())
    }
}

impl From<PreparedRequest> for Input {
    fn from(request: PreparedRequest) -> Self {
        Input::Prepared(request)
    }
}

/// A request whose target is already final.
///
/// Its headers sit below the factory layer, and its method and body apply
/// only when no option layer sets one.
#[derive(Debug, Clone)]
pub struct PreparedRequest {
    /// The HTTP method.
    pub method: Method,
    /// The absolute target, query string included.
    pub url: Url,
    /// Headers of the request.
    pub headers: HeaderMap,
    /// An optional payload.
    pub body: Option<BodyInit>,
}

impl PreparedRequest {
    /// Creates a prepared request with no headers and no body.
    pub fn new(method: Method, url: Url) -> Self {
        Self {
            method,
            url,
            headers: HeaderMap::new(),
            body: None,
        }
    }

    /// Sets a header.
    pub fn header(mut self, name: HeaderName, value: HeaderValue) -> Self {
        self.headers.insert(name, value);
        self
    }

    /// Sets the payload.
    pub fn body(mut self, body: impl Into<Bytes>) -> Self {
        self.body = Some(BodyInit::Bytes(body.into()));
        self
    }
}

/// Options for one layer. Every field is optional; unset fields fall
/// through to the less specific layer.
///
/// # Examples
///
/// ```
/// use layerfetch::FetchOptions;
/// use serde_json::json;
/// use std::time::Duration;
///
/// # fn example() -> Result<(), layerfetch::Error> {
/// let options = FetchOptions::new()
///     .method(http::Method::POST)
///     .header("x-request-id", "42")?
///     .remove_header("authorization")?
///     .param("page", 2)
///     .json(&json!({ "name": "Alice" }))?
///     .timeout(Duration::from_secs(5));
/// # Ok(())
/// # }
/// ```
#[derive(Clone, Default)]
pub struct FetchOptions {
    pub(crate) base_url: Option<Url>,
    pub(crate) method: Option<Method>,
    pub(crate) headers: HeaderPatch,
    pub(crate) params: ParamPatch,
    pub(crate) body: Option<RawBody>,
    pub(crate) timeout: Option<Duration>,
    pub(crate) signal: Option<AbortSignal>,
    pub(crate) retry: RetryOptions,
    pub(crate) serialize_body: Option<BodySerializer>,
    pub(crate) serialize_params: Option<ParamSerializer>,
    pub(crate) reject: Option<RejectFn>,
    pub(crate) parse_response: Option<Arc<dyn ParseResponse>>,
    pub(crate) parse_rejected: Option<Arc<dyn ParseRejected>>,
    pub(crate) schema: Option<Arc<dyn Schema>>,
    pub(crate) to_error: Option<ToError>,
    pub(crate) hooks: Hooks,
}

impl FetchOptions {
    /// Creates empty options.
    pub fn new() -> Self {
        Self::default()
    }

    /// Sets the base URL that relative inputs are joined to.
    ///
    /// # Errors
    ///
    /// Returns an error if the URL is invalid.
    pub fn base_url(mut self, url: impl AsRef<str>) -> Result<Self> {
        self.base_url = Some(Url::parse(url.as_ref())?);
        Ok(self)
    }

    /// Sets the HTTP method.
    pub fn method(mut self, method: Method) -> Self {
        self.method = Some(method);
        self
    }

    /// Sets a header. Names are case-insensitive.
    ///
    /// # Errors
    ///
    /// Returns an error if the header name or value is invalid.
    pub fn header(mut self, name: impl AsRef<str>, value: impl AsRef<str>) -> Result<Self> {
        let name = header_name(name.as_ref())?;
        let value = HeaderValue::try_from(value.as_ref())
            .map_err(|e| Error::Configuration(format!("Invalid header value: {}", e)))?;
        self.headers.push((name, Some(value)));
        Ok(self)
    }

    /// Removes a header set by a less specific layer.
    ///
    /// # Errors
    ///
    /// Returns an error if the header name is invalid.
    pub fn remove_header(mut self, name: impl AsRef<str>) -> Result<Self> {
        let name = header_name(name.as_ref())?;
        self.headers.push((name, None));
        Ok(self)
    }

    /// Sets a query parameter.
    ///
    /// The value is structured, strings included, and is encoded by the
    /// param serializer. Use [`FetchOptions::raw_param`] for a value that is
    /// already encoded. Params appear in the query string in the order their
    /// keys were first set.
    pub fn param(mut self, key: impl Into<String>, value: impl Into<ParamValue>) -> Self {
        self.params.push((key.into(), Some(value.into())));
        self
    }

    /// Sets an already encoded query parameter that bypasses the param
    /// serializer.
    ///
    /// The value is written to the query string unchanged, at the position
    /// the key was first set; only the key is percent-encoded.
    pub fn raw_param(mut self, key: impl Into<String>, encoded: impl Into<String>) -> Self {
        self.params.push((key.into(), Some(ParamValue::raw(encoded))));
        self
    }

    /// Removes a query parameter set by a less specific layer.
    pub fn remove_param(mut self, key: impl Into<String>) -> Self {
        self.params.push((key.into(), None));
        self
    }

    /// Sets a JSON body.
    ///
    /// # Errors
    ///
    /// Returns an error if the value cannot be represented as JSON.
    pub fn json<T: Serialize + ?Sized>(mut self, value: &T) -> Result<Self> {
        self.body = Some(RawBody::json(value)?);
        Ok(self)
    }

    /// Sets a body.
    pub fn body(mut self, body: impl Into<RawBody>) -> Self {
        self.body = Some(body.into());
        self
    }

    /// Sets a text body that is sent as is.
    pub fn text(self, text: impl Into<String>) -> Self {
        self.body(BodyInit::Text(text.into()))
    }

    /// Sets a binary body.
    pub fn bytes(self, bytes: impl Into<Bytes>) -> Self {
        self.body(BodyInit::Bytes(bytes.into()))
    }

    /// Sets the per-attempt timeout.
    pub fn timeout(mut self, timeout: Duration) -> Self {
        self.timeout = Some(timeout);
        self
    }

    /// Sets the signal that cancels the call.
    pub fn signal(mut self, signal: AbortSignal) -> Self {
        self.signal = Some(signal);
        self
    }

    /// Sets the retry settings. Fields left unset fall through to the less
    /// specific layer one by one.
    pub fn retry(mut self, retry: RetryOptions) -> Self {
        self.retry = retry;
        self
    }

    /// Sets the serializer for jsonifiable bodies.
    pub fn serialize_body<F>(mut self, f: F) -> Self
    where
        F: Fn(&Value) -> BodyInit + Send + Sync + 'static,
    {
        self.serialize_body = Some(Arc::new(f));
        self
    }

    /// Sets the query string serializer.
    pub fn serialize_params<F>(mut self, f: F) -> Self
    where
        F: Fn(&[(String, Value)]) -> String + Send + Sync + 'static,
    {
        self.serialize_params = Some(Arc::new(f));
        self
    }

    /// Sets the predicate deciding whether a response is a failure.
    pub fn reject<F>(mut self, f: F) -> Self
    where
        F: Fn(&Response) -> bool + Send + Sync + 'static,
    {
        self.reject = Some(Arc::new(f));
        self
    }

    /// Sets the parser for successful responses.
    pub fn parse_response(mut self, parser: impl ParseResponse + 'static) -> Self {
        self.parse_response = Some(Arc::new(parser));
        self
    }

    /// Sets the parser for rejected responses.
    pub fn parse_rejected(mut self, parser: impl ParseRejected + 'static) -> Self {
        self.parse_rejected = Some(Arc::new(parser));
        self
    }

    /// Sets the schema parsed values are validated against.
    pub fn schema(mut self, schema: impl Schema + 'static) -> Self {
        self.schema = Some(Arc::new(schema));
        self
    }

    /// Sets the normalizer for errors thrown by user code.
    pub fn to_error<F>(mut self, f: F) -> Self
    where
        F: Fn(BoxError) -> Error + Send + Sync + 'static,
    {
        self.to_error = Some(Arc::new(f));
        self
    }

    /// Runs before every attempt. The request may be modified; an error
    /// fails the attempt.
    pub fn on_request<F>(mut self, f: F) -> Self
    where
        F: Fn(&mut Request) -> std::result::Result<(), BoxError> + Send + Sync + 'static,
    {
        self.hooks.on_request = Some(Arc::new(f));
        self
    }

    /// Runs once with the parsed value when the call succeeds.
    pub fn on_success<F>(mut self, f: F) -> Self
    where
        F: Fn(&Value, &Request) + Send + Sync + 'static,
    {
        self.hooks.on_success = Some(Arc::new(f));
        self
    }

    /// Runs once with the error when the call fails.
    pub fn on_error<F>(mut self, f: F) -> Self
    where
        F: Fn(&Error, &Request) + Send + Sync + 'static,
    {
        self.hooks.on_error = Some(Arc::new(f));
        self
    }

    /// Runs after each retry delay, before the next attempt.
    pub fn on_retry<F>(mut self, f: F) -> Self
    where
        F: Fn(&RetryContext<'_>) + Send + Sync + 'static,
    {
        self.hooks.on_retry = Some(Arc::new(f));
        self
    }

    /// Reports request body progress.
    pub fn on_upload_progress<F>(mut self, f: F) -> Self
    where
        F: Fn(&Progress) + Send + Sync + 'static,
    {
        self.hooks.on_upload_progress = Some(Arc::new(f) as OnProgress);
        self
    }

    /// Reports response body progress.
    pub fn on_download_progress<F>(mut self, f: F) -> Self
    where
        F: Fn(&Progress) + Send + Sync + 'static,
    {
        self.hooks.on_download_progress = Some(Arc::new(f) as OnProgress);
        self
    }
}

impl fmt::Debug for FetchOptions {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("FetchOptions")
            .field("base_url", &self.base_url)
            .field("method", &self.method)
            .field("headers", &self.headers)
            .field("params", &self.params)
            .field("body", &self.body)
            .field("timeout", &self.timeout)
            .field("signal", &self.signal.is_some())
            .field("retry", &self.retry)
            .field("schema", &self.schema.is_some())
            .field("hooks", &self.hooks)
            .finish_non_exhaustive()
    }
}

fn header_name(name: &str) -> Result<HeaderName> {
    HeaderName::try_from(name)
        .map_err(|e| Error::Configuration(format!("Invalid header name: {}", e)))
}

/// The fully merged configuration of one call.
#[derive(Clone)]
pub struct ResolvedOptions {
    /// The HTTP method.
    pub method: Method,
    /// The request target, not yet validated as a URL.
    pub target: String,
    /// The merged headers.
    pub headers: HeaderMap,
    /// The merged params, already part of `target`.
    pub params: Vec<(String, ParamValue)>,
    /// The serialized payload.
    pub body: Option<BodyInit>,
    /// The per-attempt timeout.
    pub timeout: Option<Duration>,
    /// The caller's cancellation signal.
    pub signal: Option<AbortSignal>,
    /// Retry settings.
    pub retry: ResolvedRetry,
    /// Decides whether a response is a failure.
    pub reject: RejectFn,
    /// Parses successful responses.
    pub parse_response: Arc<dyn ParseResponse>,
    /// Parses rejected responses.
    pub parse_rejected: Arc<dyn ParseRejected>,
    /// Validates parsed values.
    pub schema: Option<Arc<dyn Schema>>,
    /// Normalizes errors thrown by user code.
    pub to_error: ToError,
    /// Hooks of both layers.
    pub hooks: LayeredHooks,
}

impl fmt::Debug for ResolvedOptions {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ResolvedOptions")
            .field("method", &self.method)
            .field("target", &self.target)
            .field("headers", &self.headers)
            .field("params", &self.params)
            .field("body", &self.body)
            .field("timeout", &self.timeout)
            .field("signal", &self.signal.is_some())
            .field("retry", &self.retry)
            .field("schema", &self.schema.is_some())
            .field("hooks", &self.hooks)
            .finish_non_exhaustive()
    }
}

/// Merges fallbacks, factory options and call options, later wins.
///
/// Nothing fails here; the target is validated when the call starts.
///
/// # Examples
///
/// ```
/// use layerfetch::{resolve, FetchOptions};
///
/// # fn example() -> Result<(), layerfetch::Error> {
/// let factory = FetchOptions::new()
///     .base_url("http://a.b.c")?
///     .param("a", 1)
///     .param("b", 2);
/// let call = FetchOptions::new().param("b", 10);
///
/// let resolved = resolve("d/e/f".into(), &factory, &call);
/// assert_eq!(resolved.target, "http://a.b.c/d/e/f?a=1&b=10");
/// # Ok(())
/// # }
/// ```
pub fn resolve(input: Input, factory: &FetchOptions, call: &FetchOptions) -> ResolvedOptions {
    let serialize_body = pick(&call.serialize_body, &factory.serialize_body)
        .unwrap_or_else(|| Arc::new(body::serialize_json));
    let serialize_params = pick(&call.serialize_params, &factory.serialize_params)
        .unwrap_or_else(|| Arc::new(merge::serialize_params));

    let raw_body = call.body.as_ref().or(factory.body.as_ref());
    let resolved_body = body::resolve_body(raw_body, &serialize_body);

    let (target, params, base_headers, prepared_method, prepared_body) = match input {
        Input::Url(input) => {
            let keys: HashSet<String> = target::query_keys(&input);
            let params = merge::merge_params(&factory.params, &call.params, &keys);
            let query = merge::to_query(&params, &serialize_params);
            let base = call.base_url.as_ref().or(factory.base_url.as_ref());
            let target = target::resolve_target(base, &input, &query);
            (target, params, HeaderMap::new(), None, None)
        }
        Input::Prepared(prepared) => (
            prepared.url.to_string(),
            Vec::new(),
            prepared.headers,
            Some(prepared.method),
            prepared.body,
        ),
    };

    let mut headers = merge::merge_headers(
        base_headers,
        [factory.headers.as_slice(), call.headers.as_slice()],
    );
    if resolved_body.infer_json && !headers.contains_key(CONTENT_TYPE) {
        headers.insert(CONTENT_TYPE, HeaderValue::from_static("application/json"));
    }

    // A layer's body wins over the prepared request's, even when it resolves
    // to no body at all.
    let body = match raw_body {
        Some(_) => resolved_body.init,
        None => prepared_body,
    };

    ResolvedOptions {
        method: call
            .method
            .clone()
            .or_else(|| factory.method.clone())
            .or(prepared_method)
            .unwrap_or(Method::GET),
        target,
        headers,
        params,
        body,
        timeout: call.timeout.or(factory.timeout),
        signal: call.signal.clone().or_else(|| factory.signal.clone()),
        retry: ResolvedRetry::from_layers(&call.retry, &factory.retry),
        reject: pick(&call.reject, &factory.reject)
            .unwrap_or_else(|| Arc::new(parse::reject_non_success)),
        parse_response: pick(&call.parse_response, &factory.parse_response)
            .unwrap_or_else(|| Arc::new(JsonOrText)),
        parse_rejected: pick(&call.parse_rejected, &factory.parse_rejected)
            .unwrap_or_else(|| Arc::new(RejectWithBody)),
        schema: pick(&call.schema, &factory.schema),
        to_error: pick(&call.to_error, &factory.to_error)
            .unwrap_or_else(|| Arc::new(error::normalize_error)),
        hooks: LayeredHooks::new(call.hooks.clone(), factory.hooks.clone()),
    }
}

fn pick<T: ?Sized>(call: &Option<Arc<T>>, factory: &Option<Arc<T>>) -> Option<Arc<T>> {
    call.clone().or_else(|| factory.clone())
}
