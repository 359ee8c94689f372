//! Upload and download progress reporting.
//!
//! Bodies are instrumented by wrapping their chunk stream in a
//! [`ProgressStream`]. Chunks pass through unchanged; every chunk also
//! produces a [`Progress`] event.
//!
//! Every instrumented body reports one event before its first chunk is
//! handed on: ratio `0.0` when there is a body and ratio `1.0` when there is
//! none. A stream turns out to be empty only once it ends, so its single
//! event is emitted then. A body of `N` chunks therefore reports `N + 1`
//! events, and an empty one always reports a completed transfer.

use crate::body::{Body, BodyStream};
use crate::error::{BoxError, Error, Result};
use crate::transport::{Request, Response};
use bytes::Bytes;
use futures_util::stream::{self, Stream, StreamExt, TryStreamExt};
use http::header::CONTENT_LENGTH;
use http::HeaderMap;
use std::pin::Pin;
use std::sync::Arc;
use std::task::{ready, Context, Poll};

/// Callback invoked with every progress event.
pub type OnProgress = Arc<dyn Fn(&Progress) + Send + Sync>;

/// A snapshot of a body transfer.
#[derive(Debug, Clone, PartialEq)]
pub struct Progress {
    /// `transferred_bytes / total_bytes`, or `None` when the total is unknown.
    pub ratio: Option<f64>,
    /// The total body size, when known.
    pub total_bytes: Option<u64>,
    /// Bytes transferred so far.
    pub transferred_bytes: u64,
    /// The chunk that was just transferred. Empty for the initial event.
    pub chunk: Bytes,
}

impl Progress {
    fn started(total_bytes: Option<u64>) -> Self {
        Self {
            ratio: Some(0.0),
            total_bytes,
            transferred_bytes: 0,
            chunk: Bytes::new(),
        }
    }

    fn completed_empty() -> Self {
        Self::new(0, Some(0), Bytes::new())
    }

    fn new(transferred_bytes: u64, total_bytes: Option<u64>, chunk: Bytes) -> Self {
        let ratio = total_bytes.map(|total| {
            if total == 0 {
                1.0
            } else {
                (transferred_bytes as f64 / total as f64).min(1.0)
            }
        });
        Self {
            ratio,
            total_bytes,
            transferred_bytes,
            chunk,
        }
    }
}

/// A stream that reports progress for every chunk it yields.
pub struct ProgressStream<S> {
    inner: S,
    total_bytes: Option<u64>,
    transferred_bytes: u64,
    started: bool,
    on_progress: OnProgress,
}

impl<S> ProgressStream<S> {
    /// Wraps `inner`. No event is emitted until `inner` yields or ends.
    pub fn new(inner: S, total_bytes: Option<u64>, on_progress: OnProgress) -> Self {
        Self {
            inner,
            total_bytes,
            transferred_bytes: 0,
            started: false,
            on_progress,
        }
    }
}

impl<S> Stream for ProgressStream<S>
where
    S: Stream<Item = std::result::Result<Bytes, BoxError>> + Unpin,
{
    type Item = std::result::Result<Bytes, BoxError>;

    fn poll_next(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Option<Self::Item>> {
        let this = self.get_mut();
        let item = ready!(Pin::new(&mut this.inner).poll_next(cx));
        let first = !std::mem::replace(&mut this.started, true);
        match item {
            Some(Ok(chunk)) => {
                if first {
                    (this.on_progress)(&Progress::started(this.total_bytes));
                }
                this.transferred_bytes += chunk.len() as u64;
                (this.on_progress)(&Progress::new(
                    this.transferred_bytes,
                    this.total_bytes,
                    chunk.clone(),
                ));
                Poll::Ready(Some(Ok(chunk)))
            }
            None if first => {
                (this.on_progress)(&Progress::completed_empty());
                Poll::Ready(None)
            }
            other => Poll::Ready(other),
        }
    }
}

fn content_length(headers: &HeaderMap) -> Option<u64> {
    headers.get(CONTENT_LENGTH)?.to_str().ok()?.parse().ok()
}

/// Wraps a body so that it reports progress, keeping its known length.
fn instrument(body: Body, total_bytes: Option<u64>, on_progress: &OnProgress) -> Body {
    if body.is_empty() {
        on_progress(&Progress::completed_empty());
        return Body::empty();
    }
    let stream = ProgressStream::new(body.into_stream(), total_bytes, on_progress.clone()).boxed();
    match total_bytes {
        Some(len) => Body::sized_stream(stream, len),
        None => Body::wrap_stream(stream),
    }
}

/// Instruments a response body for download progress.
///
/// The total comes from `content-length`, falling back to the body's own
/// size when it is buffered. Status, headers and URL are preserved. Without
/// a callback the response is returned untouched.
pub fn wrap_response(response: Response, on_progress: Option<&OnProgress>) -> Response {
    let Some(on_progress) = on_progress else {
        return response;
    };
    let total_bytes = content_length(&response.headers).or(response.body.size_hint());
    let Response {
        status,
        headers,
        url,
        body,
    } = response;
    Response {
        status,
        headers,
        url,
        body: instrument(body, total_bytes, on_progress),
    }
}

/// Instruments a request body for upload progress.
///
/// When the length is not known from `content-length` or a buffered body,
/// the body stream is drained first so the total is known before the first
/// event. The drained chunks are then re-exposed as a fresh stream with the
/// same chunk boundaries. The instrumented body always carries its length,
/// so the request is framed on the wire exactly as it would be without a
/// callback.
pub async fn wrap_request(request: &mut Request, on_progress: Option<&OnProgress>) -> Result<()> {
    let Some(on_progress) = on_progress else {
        return Ok(());
    };
    let body = std::mem::take(&mut request.body);
    let (body, total_bytes) = match content_length(&request.headers).or(body.size_hint()) {
        Some(total) => (body, total),
        None => {
            let chunks: Vec<Bytes> = body
                .into_stream()
                .try_collect()
                .await
                .map_err(Error::Transport)?;
            let total = chunks.iter().map(|chunk| chunk.len() as u64).sum();
            let replay: BodyStream = stream::iter(chunks.into_iter().map(Ok)).boxed();
            (Body::wrap_stream(replay), total)
        }
    };
    request.body = instrument(body, Some(total_bytes), on_progress);
    Ok(())
}
