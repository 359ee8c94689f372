//! The execution engine.
//!
//! One call runs as a loop over [`State`]:
//!
//! ```text
//! BuildRequest -> Send -> DecideRetry -> Delay -> BuildRequest
//!                                   \-> Terminal
//! ```
//!
//! Attempts never overlap. The transport call, the retry delay and the
//! terminal parse are raced against the attempt's abort signal, which is
//! recomputed for every attempt so that a timeout restarts its budget.

use crate::error::{Error, Issue, Result};
use crate::options::ResolvedOptions;
use crate::progress;
use crate::response::Reply;
use crate::retry::RetryContext;
use crate::signal::{self, AbortReason, AbortSignal};
use crate::transport::{Request, Response, Transport};
use http::{HeaderMap, StatusCode};
use serde::de::DeserializeOwned;
use serde_json::Value;
use std::future::Future;
use std::time::{Duration, Instant};
use url::Url;

/// One attempt: the request that was built, what came back, and the signal
/// that governed it.
struct AttemptContext {
    request: Request,
    outcome: Result<Response>,
    signal: Option<AbortSignal>,
}

impl AttemptContext {
    fn retry_context(&self, attempt: u32) -> RetryContext<'_> {
        RetryContext {
            attempt,
            request: &self.request,
            response: self.outcome.as_ref().ok(),
            error: self.outcome.as_ref().err(),
        }
    }

    /// Replaces whatever the attempt produced with `error`.
    fn fail(self, error: Error) -> Self {
        Self {
            outcome: Err(error),
            ..self
        }
    }
}

enum State {
    BuildRequest,
    Send(Request, Option<AbortSignal>),
    DecideRetry(AttemptContext),
    Delay(AttemptContext, Duration),
    Terminal(AttemptContext),
}

/// The decoded value of a successful terminal response.
struct Settled<T> {
    value: Value,
    data: T,
    status: StatusCode,
    headers: HeaderMap,
}

/// Runs one call to completion.
///
/// The target is validated before anything else; an invalid target fails
/// the call without firing any hook.
pub(crate) async fn execute<T>(
    transport: &dyn Transport,
    options: ResolvedOptions,
) -> Result<Reply<T>>
where
    T: DeserializeOwned,
{
    let url = Url::parse(&options.target)?;
    let start = Instant::now();
    let mut retries: u32 = 0;
    let mut max_retries: Option<u32> = None;
    let mut state = State::BuildRequest;

    loop {
        state = match state {
            State::BuildRequest => {
                let signal = signal::compose(options.signal.as_ref(), options.timeout);
                let mut request = build_request(&options, &url);
                match prepare(&options, &mut request, signal.as_ref()).await {
                    Ok(()) => State::Send(request, signal),
                    Err(error) => State::DecideRetry(AttemptContext {
                        request,
                        outcome: Err(error),
                        signal,
                    }),
                }
            }

            State::Send(mut request, signal) => {
                tracing::debug!(
                    method = %request.method,
                    url = %request.url,
                    attempt = retries + 1,
                    "Executing HTTP request"
                );
                let outcome = guarded(signal.as_ref(), transport.send(&mut request)).await;
                State::DecideRetry(AttemptContext {
                    request,
                    outcome,
                    signal,
                })
            }

            State::DecideRetry(attempt) => {
                log_attempt(&attempt, retries + 1);
                match decide(&options, &attempt, retries, &mut max_retries) {
                    Ok(Some(delay)) => {
                        retries += 1;
                        State::Delay(attempt, delay)
                    }
                    Ok(None) => State::Terminal(attempt),
                    Err(error) => State::Terminal(attempt.fail(error)),
                }
            }

            State::Delay(attempt, delay) => {
                tracing::info!(
                    delay_ms = delay.as_millis(),
                    attempt = retries,
                    "Retrying request after delay"
                );
                match wait(delay, attempt.signal.as_ref()).await {
                    Ok(()) => {
                        options.hooks.on_retry(&attempt.retry_context(retries));
                        State::BuildRequest
                    }
                    Err(reason) => State::Terminal(attempt.fail(reason.into_error())),
                }
            }

            State::Terminal(attempt) => {
                return settle(&options, attempt, retries + 1, start).await;
            }
        };
    }
}

fn build_request(options: &ResolvedOptions, url: &Url) -> Request {
    let mut request = Request::new(options.method.clone(), url.clone());
    request.headers = options.headers.clone();
    if let Some(init) = &options.body {
        request.body = init.to_body();
    }
    request
}

/// Instruments the upload and runs the `on_request` hooks.
async fn prepare(
    options: &ResolvedOptions,
    request: &mut Request,
    signal: Option<&AbortSignal>,
) -> Result<()> {
    let upload = options.hooks.upload_progress();
    guarded(signal, progress::wrap_request(request, upload)).await?;
    options
        .hooks
        .on_request(request)
        .map_err(|e| (options.to_error)(e))
}

/// Returns the delay before the next attempt, or `None` to stop.
///
/// The budget is computed on the first outcome the predicate wants to retry
/// and kept for the rest of the call.
fn decide(
    options: &ResolvedOptions,
    attempt: &AttemptContext,
    retries: u32,
    max_retries: &mut Option<u32>,
) -> Result<Option<Duration>> {
    let retry = &options.retry;
    let to_error = |e| (options.to_error)(e);

    if !retry
        .when
        .should_retry(&attempt.retry_context(retries))
        .map_err(to_error)?
    {
        return Ok(None);
    }

    let max = match *max_retries {
        Some(max) => max,
        None => *max_retries.insert(retry.attempts.resolve(&attempt.request).map_err(to_error)?),
    };
    let next = retries + 1;
    if next > max {
        tracing::debug!(attempts = next, "Retry budget exhausted");
        return Ok(None);
    }

    retry
        .delay
        .resolve(&attempt.retry_context(next))
        .map(Some)
        .map_err(to_error)
}

/// Parses the final outcome and fires the terminal hooks.
async fn settle<T>(
    options: &ResolvedOptions,
    attempt: AttemptContext,
    attempts: u32,
    start: Instant,
) -> Result<Reply<T>>
where
    T: DeserializeOwned,
{
    let AttemptContext {
        request,
        outcome,
        signal,
    } = attempt;

    let settled = match outcome {
        Ok(response) => {
            tracing::info!(
                status = response.status.as_u16(),
                latency_ms = start.elapsed().as_millis(),
                attempts = attempts,
                "Received HTTP response"
            );
            guarded(signal.as_ref(), conclude::<T>(options, response, &request)).await
        }
        Err(error) => Err(error),
    };

    match settled {
        Ok(settled) => {
            options.hooks.on_success(&settled.value, &request);
            Ok(Reply::new(
                settled.data,
                settled.status,
                settled.headers,
                start.elapsed(),
                attempts,
            ))
        }
        Err(error) => {
            options.hooks.on_error(&error, &request);
            Err(error)
        }
    }
}

/// Rejects, parses, validates and decodes a response.
async fn conclude<T>(
    options: &ResolvedOptions,
    response: Response,
    request: &Request,
) -> Result<Settled<T>>
where
    T: DeserializeOwned,
{
    let response = progress::wrap_response(response, options.hooks.download_progress());
    if (options.reject)(&response) {
        return Err(options.parse_rejected.parse(response, request).await);
    }

    let status = response.status;
    let headers = response.headers.clone();
    let value = options
        .parse_response
        .parse(response, request)
        .await
        .inspect_err(|e| tracing::error!(error = %e, "Failed to parse response"))?;

    let value = match &options.schema {
        Some(schema) => match schema.validate(&value).await {
            Ok(validated) => validated,
            Err(issues) => {
                tracing::error!(issues = issues.len(), data = %value, "Response failed validation");
                return Err(Error::Validation { data: value, issues });
            }
        },
        None => value,
    };

    let data = match T::deserialize(&value) {
        Ok(data) => data,
        Err(e) => {
            tracing::error!(error = %e, raw_response = %value, "Failed to deserialize response");
            return Err(Error::Validation {
                data: value,
                issues: vec![Issue::new(e.to_string())],
            });
        }
    };

    Ok(Settled {
        value,
        data,
        status,
        headers,
    })
}

/// Runs `future` unless `signal` fires first.
async fn guarded<T, F>(signal: Option<&AbortSignal>, future: F) -> Result<T>
where
    F: Future<Output = Result<T>>,
{
    let Some(signal) = signal else {
        return future.await;
    };
    if let Some(reason) = signal.reason() {
        return Err(reason.into_error());
    }
    tokio::select! {
        biased;
        reason = signal.aborted() => Err(reason.into_error()),
        output = future => output,
    }
}

/// Sleeps for `delay`, returning early with the reason if `signal` fires.
async fn wait(
    delay: Duration,
    signal: Option<&AbortSignal>,
) -> std::result::Result<(), AbortReason> {
    let Some(signal) = signal else {
        tokio::time::sleep(delay).await;
        return Ok(());
    };
    if let Some(reason) = signal.reason() {
        return Err(reason);
    }
    tokio::select! {
        biased;
        reason = signal.aborted() => Err(reason),
        _ = tokio::time::sleep(delay) => Ok(()),
    }
}

fn log_attempt(attempt: &AttemptContext, number: u32) {
    match &attempt.outcome {
        Err(error) => tracing::warn!(
            error = %error,
            attempt = number,
            method = %attempt.request.method,
            url = %attempt.request.url,
            "Request failed"
        ),
        Ok(response) if !response.ok() => tracing::warn!(
            status = response.status.as_u16(),
            attempt = number,
            method = %attempt.request.method,
            url = %attempt.request.url,
            "Request returned an error status"
        ),
        Ok(_) => {}
    }
}
