//! The transport seam.
//!
//! A [`Transport`] turns one [`Request`] into one [`Response`]. Everything
//! else (retries, timeouts, parsing, progress) happens around it, so any HTTP
//! stack can be plugged in. [`ReqwestTransport`] is the default.

use crate::body::{Body, BodyStream};
use crate::error::{BoxError, Error, Result};
use async_trait::async_trait;
use bytes::Bytes;
use futures_util::{Stream, StreamExt, TryStreamExt};
use http::header::CONTENT_LENGTH;
use http::{HeaderMap, Method, StatusCode};
use std::pin::Pin;
use std::sync::{Arc, Mutex, PoisonError};
use std::task::{Context, Poll};
use url::Url;

/// An outgoing request.
#[derive(Debug)]
pub struct Request {
    /// The HTTP method.
    pub method: Method,
    /// The fully resolved URL, query string included.
    pub url: Url,
    /// Request headers. Hooks may change them before the request is sent.
    pub headers: HeaderMap,
    /// The request body. A transport takes it with [`std::mem::take`].
    pub body: Body,
}

impl Request {
    /// Creates a request with no headers and no body.
    pub fn new(method: Method, url: Url) -> Self {
        Self {
            method,
            url,
            headers: HeaderMap::new(),
            body: Body::empty(),
        }
    }
}

/// A response as produced by a transport.
#[derive(Debug)]
pub struct Response {
    /// The HTTP status code.
    pub status: StatusCode,
    /// The response headers.
    pub headers: HeaderMap,
    /// The URL the response came from.
    pub url: Url,
    /// The response body, not yet read.
    pub body: Body,
}

impl Response {
    /// Returns `true` for a 2xx status.
    pub fn ok(&self) -> bool {
        self.status.is_success()
    }

    /// Returns a header value by name, if it is valid text.
    pub fn header(&self, name: &str) -> Option<&str> {
        self.headers.get(name)?.to_str().ok()
    }
}

/// Sends requests.
///
/// Implementations must not retry or time out on their own; the execution
/// engine owns both. A transport failure is reported as
/// [`Error::Transport`].
///
/// # Examples
///
/// ```
/// use async_trait::async_trait;
/// use http::StatusCode;
/// use layerfetch::{Body, Request, Response, Result, Transport};
///
/// struct AlwaysNoContent;
///
/// #[async_trait]
/// impl Transport for AlwaysNoContent {
///     async fn send(&self, request: &mut Request) -> Result<Response> {
///         Ok(Response {
///             status: StatusCode::NO_CONTENT,
///             headers: Default::default(),
///             url: request.url.clone(),
///             body: Body::empty(),
///         })
///     }
/// }
/// ```
#[async_trait]
pub trait Transport: Send + Sync {
    /// Sends one request and returns the response head with an unread body.
    async fn send(&self, request: &mut Request) -> Result<Response>;
}

#[async_trait]
impl<T: Transport + ?Sized> Transport for Arc<T> {
    async fn send(&self, request: &mut Request) -> Result<Response> {
        (**self).send(request).await
    }
}

/// A [`Transport`] backed by [`reqwest::Client`].
#[derive(Debug, Clone, Default)]
pub struct ReqwestTransport {
    client: reqwest::Client,
}

impl ReqwestTransport {
    /// Creates a transport with a default `reqwest` client.
    pub fn new() -> Result<Self> {
        let client = reqwest::Client::builder().build().map_err(|e| {
            Error::Configuration(format!("Failed to build HTTP client: {}", e))
        })?;
        Ok(Self { client })
    }

    /// Wraps an existing `reqwest` client, keeping its connection pool.
    pub fn with_client(client: reqwest::Client) -> Self {
        Self { client }
    }
}

#[async_trait]
impl Transport for ReqwestTransport {
    async fn send(&self, request: &mut Request) -> Result<Response> {
        let mut builder = self
            .client
            .request(request.method.clone(), request.url.clone())
            .headers(request.headers.clone());

        let body = std::mem::take(&mut request.body);
        if !body.is_empty() {
            builder = match body.as_bytes() {
                Some(bytes) => builder.body(bytes.to_vec()),
                None => {
                    // Streams of known length are framed with content-length,
                    // not chunked.
                    if let Some(len) = body.size_hint() {
                        if !request.headers.contains_key(CONTENT_LENGTH) {
                            builder = builder.header(CONTENT_LENGTH, len);
                        }
                    }
                    builder.body(reqwest::Body::wrap_stream(SyncStream(Mutex::new(
                        body.into_stream(),
                    ))))
                }
            };
        }

        let response = builder.send().await?;
        let status = response.status();
        let headers = response.headers().clone();
        let url = response.url().clone();
        let body = if response.content_length() == Some(0) {
            Body::empty()
        } else {
            Body::wrap_stream(
                response
                    .bytes_stream()
                    .map_err(|e| Box::new(e) as BoxError)
                    .boxed(),
            )
        };

        Ok(Response {
            status,
            headers,
            url,
            body,
        })
    }
}

/// A body stream that is `Sync`, for `reqwest::Body::wrap_stream`.
struct SyncStream(Mutex<BodyStream>);

impl Stream for SyncStream {
    type Item = std::result::Result<Bytes, BoxError>;

    fn poll_next(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Option<Self::Item>> {
        self.get_mut()
            .0
            .get_mut()
            .unwrap_or_else(PoisonError::into_inner)
            .poll_next_unpin(cx)
    }
}
