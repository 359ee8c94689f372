//! Retry predicates, attempt budgets and delay policies.
//!
//! A call retries when its [`RetryPredicate`] says so, up to the number of
//! retries given by [`Attempts`], waiting for the duration given by
//! [`Delay`] between attempts.

use crate::error::{BoxError, Error};
use crate::rate_limit::RateLimitInfo;
use crate::transport::{Request, Response};
use rand::Rng;
use std::fmt;
use std::sync::Arc;
use std::time::Duration;

/// What a retry decision gets to look at.
///
/// Exactly one of `response` and `error` is set.
#[derive(Debug, Clone, Copy)]
pub struct RetryContext<'a> {
    /// For the retry predicate, the number of retries made so far. For delay
    /// functions and `on_retry` hooks, the number of the retry about to
    /// happen (1 for the first retry).
    pub attempt: u32,
    /// The request that was sent.
    pub request: &'a Request,
    /// The response, if the transport produced one.
    pub response: Option<&'a Response>,
    /// The error, if the attempt failed.
    pub error: Option<&'a Error>,
}

/// Trait for determining whether an attempt should be retried.
///
/// Returning an error stops the call immediately; that error (after
/// normalization) becomes the call's result.
///
/// # Examples
///
/// ```
/// use layerfetch::retry::{RetryContext, RetryPredicate};
/// use layerfetch::BoxError;
///
/// struct RetryOnRateLimit;
///
/// impl RetryPredicate for RetryOnRateLimit {
///     fn should_retry(&self, ctx: &RetryContext<'_>) -> Result<bool, BoxError> {
///         Ok(ctx.response.is_some_and(|r| r.status.as_u16() == 429))
///     }
/// }
/// ```
pub trait RetryPredicate: Send + Sync {
    /// Returns `Ok(true)` to retry.
    fn should_retry(&self, ctx: &RetryContext<'_>) -> Result<bool, BoxError>;
}

/// Retry whenever a response arrived with a non-2xx status.
///
/// This is the default predicate. Transport errors, timeouts and
/// cancellations are not retried by it.
#[derive(Debug, Clone, Copy)]
pub struct RetryOnRejected;

impl RetryPredicate for RetryOnRejected {
    fn should_retry(&self, ctx: &RetryContext<'_>) -> Result<bool, BoxError> {
        Ok(ctx.response.is_some_and(|response| !response.ok()))
    }
}

/// Retry only on 5xx server errors.
#[derive(Debug, Clone, Copy)]
pub struct RetryOn5xx;

impl RetryPredicate for RetryOn5xx {
    fn should_retry(&self, ctx: &RetryContext<'_>) -> Result<bool, BoxError> {
        Ok(ctx
            .response
            .is_some_and(|response| response.status.is_server_error()))
    }
}

/// Retry only on timeout errors.
#[derive(Debug, Clone, Copy)]
pub struct RetryOnTimeout;

impl RetryPredicate for RetryOnTimeout {
    fn should_retry(&self, ctx: &RetryContext<'_>) -> Result<bool, BoxError> {
        Ok(matches!(ctx.error, Some(Error::Timeout)))
    }
}

/// Retry only on transport (connection) errors.
#[derive(Debug, Clone, Copy)]
pub struct RetryOnTransportError;

impl RetryPredicate for RetryOnTransportError {
    fn should_retry(&self, ctx: &RetryContext<'_>) -> Result<bool, BoxError> {
        Ok(matches!(ctx.error, Some(Error::Transport(_))))
    }
}

/// Retry transport errors, timeouts, 5xx and 429 responses.
#[derive(Debug, Clone, Copy)]
pub struct RetryOnRetryable;

impl RetryPredicate for RetryOnRetryable {
    fn should_retry(&self, ctx: &RetryContext<'_>) -> Result<bool, BoxError> {
        if let Some(error) = ctx.error {
            return Ok(error.is_retryable());
        }
        Ok(ctx.response.is_some_and(|response| {
            response.status.is_server_error() || response.status.as_u16() == 429
        }))
    }
}

/// Combine multiple retry predicates with OR logic.
///
/// Retries if ANY of the predicates return `true`.
///
/// # Examples
///
/// ```
/// use layerfetch::retry::{OrPredicate, RetryOn5xx, RetryOnTimeout};
///
/// // Retry on 5xx errors OR timeouts
/// let predicate = OrPredicate::new(vec![
///     Box::new(RetryOn5xx),
///     Box::new(RetryOnTimeout),
/// ]);
/// ```
pub struct OrPredicate {
    predicates: Vec<Box<dyn RetryPredicate>>,
}

impl OrPredicate {
    /// Creates a new `OrPredicate` from a list of predicates.
    pub fn new(predicates: Vec<Box<dyn RetryPredicate>>) -> Self {
        Self { predicates }
    }
}

impl RetryPredicate for OrPredicate {
    fn should_retry(&self, ctx: &RetryContext<'_>) -> Result<bool, BoxError> {
        for predicate in &self.predicates {
            if predicate.should_retry(ctx)? {
                return Ok(true);
            }
        }
        Ok(false)
    }
}

/// Combine multiple retry predicates with AND logic.
///
/// Retries only if ALL of the predicates return `true`.
pub struct AndPredicate {
    predicates: Vec<Box<dyn RetryPredicate>>,
}

impl AndPredicate {
    /// Creates a new `AndPredicate` from a list of predicates.
    pub fn new(predicates: Vec<Box<dyn RetryPredicate>>) -> Self {
        Self { predicates }
    }
}

impl RetryPredicate for AndPredicate {
    fn should_retry(&self, ctx: &RetryContext<'_>) -> Result<bool, BoxError> {
        for predicate in &self.predicates {
            if !predicate.should_retry(ctx)? {
                return Ok(false);
            }
        }
        Ok(true)
    }
}

/// A predicate backed by a closure. See [`predicate`].
pub struct FnPredicate<F>(F);

impl<F> RetryPredicate for FnPredicate<F>
where
    F: Fn(&RetryContext<'_>) -> Result<bool, BoxError> + Send + Sync,
{
    fn should_retry(&self, ctx: &RetryContext<'_>) -> Result<bool, BoxError> {
        (self.0)(ctx)
    }
}

/// Builds a predicate from a closure.
///
/// # Examples
///
/// ```
/// use layerfetch::retry::{predicate, RetryOptions};
///
/// let retry = RetryOptions::new()
///     .when(predicate(|ctx| Ok(ctx.error.is_some())))
///     .attempts(2);
/// ```
pub fn predicate<F>(f: F) -> FnPredicate<F>
where
    F: Fn(&RetryContext<'_>) -> Result<bool, BoxError> + Send + Sync,
{
    FnPredicate(f)
}

/// How many retries a call may make.
#[derive(Clone)]
pub enum Attempts {
    /// A fixed number of retries.
    Fixed(u32),
    /// Computed from the first request that is eligible for a retry. The
    /// function runs at most once per call.
    Dynamic(Arc<dyn Fn(&Request) -> Result<u32, BoxError> + Send + Sync>),
}

impl Attempts {
    /// Creates a dynamic budget.
    pub fn from_fn<F>(f: F) -> Self
    where
        F: Fn(&Request) -> Result<u32, BoxError> + Send + Sync + 'static,
    {
        Attempts::Dynamic(Arc::new(f))
    }

    /// Returns the number of retries allowed for this request.
    pub fn resolve(&self, request: &Request) -> Result<u32, BoxError> {
        match self {
            Attempts::Fixed(n) => Ok(*n),
            Attempts::Dynamic(f) => f(request),
        }
    }
}

impl From<u32> for Attempts {
    fn from(n: u32) -> Self {
        Attempts::Fixed(n)
    }
}

impl fmt::Debug for Attempts {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Attempts::Fixed(n) => f.debug_tuple("Fixed").field(n).finish(),
            Attempts::Dynamic(_) => f.write_str("Dynamic"),
        }
    }
}

/// How long to wait before a retry.
#[derive(Clone)]
pub enum Delay {
    /// The same delay before every retry.
    Fixed(Duration),
    /// Computed per retry from the retry context.
    Dynamic(Arc<dyn Fn(&RetryContext<'_>) -> Result<Duration, BoxError> + Send + Sync>),
}

impl Delay {
    /// Creates a dynamic delay.
    pub fn from_fn<F>(f: F) -> Self
    where
        F: Fn(&RetryContext<'_>) -> Result<Duration, BoxError> + Send + Sync + 'static,
    {
        Delay::Dynamic(Arc::new(f))
    }

    /// Exponentially increasing delays: `initial * 2^(attempt - 1)`, capped at
    /// `max`. With `jitter`, each delay is scaled by a random factor between
    /// 50% and 100%.
    ///
    /// # Examples
    ///
    /// ```
    /// use layerfetch::retry::Delay;
    /// use std::time::Duration;
    ///
    /// // 100ms, 200ms, 400ms, ... up to 10s
    /// let delay = Delay::exponential(Duration::from_millis(100), Duration::from_secs(10), false);
    /// assert_eq!(delay.for_attempt(3), Some(Duration::from_millis(400)));
    /// ```
    pub fn exponential(initial: Duration, max: Duration, jitter: bool) -> Self {
        Delay::from_fn(move |ctx| Ok(backoff(initial, max, jitter, ctx.attempt)))
    }

    /// Honors rate limit headers on the response (`Retry-After`,
    /// `X-RateLimit-Reset`, `RateLimit-Reset`), capped at `max_wait`.
    /// Falls back to `fallback` when the headers say nothing.
    pub fn retry_after(fallback: Delay, max_wait: Duration) -> Self {
        Delay::from_fn(move |ctx| {
            let advised = ctx.response.and_then(|response| {
                RateLimitInfo::from_headers(&response.headers).delay(max_wait)
            });
            match advised {
                Some(delay) => {
                    tracing::info!(
                        rate_limit_delay_ms = delay.as_millis(),
                        attempt = ctx.attempt,
                        max_wait_secs = max_wait.as_secs(),
                        "Rate limited - waiting before retry"
                    );
                    Ok(delay)
                }
                None => fallback.resolve(ctx),
            }
        })
    }

    /// Returns the delay before the given retry.
    pub fn resolve(&self, ctx: &RetryContext<'_>) -> Result<Duration, BoxError> {
        match self {
            Delay::Fixed(delay) => Ok(*delay),
            Delay::Dynamic(f) => f(ctx),
        }
    }

    /// Returns the delay for a retry number without a request context.
    ///
    /// Only meaningful for [`Delay::Fixed`] and [`Delay::exponential`]
    /// style policies that ignore the request; returns `None` when the
    /// policy needs more than the attempt number or fails.
    pub fn for_attempt(&self, attempt: u32) -> Option<Duration> {
        let request = Request::new(
            http::Method::GET,
            url::Url::parse("http://localhost/").ok()?,
        );
        self.resolve(&RetryContext {
            attempt,
            request: &request,
            response: None,
            error: None,
        })
        .ok()
    }
}

impl From<Duration> for Delay {
    fn from(delay: Duration) -> Self {
        Delay::Fixed(delay)
    }
}

impl fmt::Debug for Delay {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Delay::Fixed(delay) => f.debug_tuple("Fixed").field(delay).finish(),
            Delay::Dynamic(_) => f.write_str("Dynamic"),
        }
    }
}

fn backoff(initial: Duration, max: Duration, jitter: bool, attempt: u32) -> Duration {
    // initial * 2^(attempt - 1)
    let multiplier = 2u32.saturating_pow(attempt.saturating_sub(1));
    let delay = initial.saturating_mul(multiplier).min(max);

    if jitter {
        let jitter_factor = rand::thread_rng().gen_range(0.5..=1.0);
        delay.mul_f64(jitter_factor)
    } else {
        delay
    }
}

/// Retry settings at one option layer. Unset fields fall through to the
/// less specific layer.
///
/// # Examples
///
/// ```
/// use layerfetch::retry::{Delay, RetryOn5xx, RetryOptions};
/// use std::time::Duration;
///
/// let retry = RetryOptions::new()
///     .when(RetryOn5xx)
///     .attempts(3)
///     .delay(Delay::exponential(Duration::from_millis(100), Duration::from_secs(5), true));
/// ```
#[derive(Clone, Default)]
pub struct RetryOptions {
    pub(crate) when: Option<Arc<dyn RetryPredicate>>,
    pub(crate) attempts: Option<Attempts>,
    pub(crate) delay: Option<Delay>,
}

impl RetryOptions {
    /// Creates empty retry settings.
    pub fn new() -> Self {
        Self::default()
    }

    /// Sets the retry predicate.
    pub fn when(mut self, predicate: impl RetryPredicate + 'static) -> Self {
        self.when = Some(Arc::new(predicate));
        self
    }

    /// Sets the retry budget.
    pub fn attempts(mut self, attempts: impl Into<Attempts>) -> Self {
        self.attempts = Some(attempts.into());
        self
    }

    /// Sets the delay policy.
    pub fn delay(mut self, delay: impl Into<Delay>) -> Self {
        self.delay = Some(delay.into());
        self
    }

    /// Overlays `self` (more specific) on `fallback` field by field.
    pub(crate) fn or(&self, fallback: &RetryOptions) -> RetryOptions {
        RetryOptions {
            when: self.when.clone().or_else(|| fallback.when.clone()),
            attempts: self.attempts.clone().or_else(|| fallback.attempts.clone()),
            delay: self.delay.clone().or_else(|| fallback.delay.clone()),
        }
    }
}

impl fmt::Debug for RetryOptions {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RetryOptions")
            .field("when", &self.when.is_some())
            .field("attempts", &self.attempts)
            .field("delay", &self.delay)
            .finish()
    }
}

/// Fully resolved retry settings.
#[derive(Clone)]
pub struct ResolvedRetry {
    /// The retry predicate.
    pub when: Arc<dyn RetryPredicate>,
    /// The retry budget.
    pub attempts: Attempts,
    /// The delay policy.
    pub delay: Delay,
}

impl ResolvedRetry {
    pub(crate) fn from_layers(call: &RetryOptions, factory: &RetryOptions) -> Self {
        let merged = call.or(factory);
        Self {
            when: merged.when.unwrap_or_else(|| Arc::new(RetryOnRejected)),
            attempts: merged.attempts.unwrap_or(Attempts::Fixed(0)),
            delay: merged.delay.unwrap_or(Delay::Fixed(Duration::ZERO)),
        }
    }
}

impl fmt::Debug for ResolvedRetry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ResolvedRetry")
            .field("attempts", &self.attempts)
            .field("delay", &self.delay)
            .finish_non_exhaustive()
    }
}
