//! Rate limit header parsing.
//!
//! Used by [`Delay::retry_after`](crate::retry::Delay::retry_after) to wait
//! as long as the server asks before retrying.

use http::HeaderMap;
use std::time::{Duration, SystemTime, UNIX_EPOCH};

/// Unix timestamp headers announcing when the current window resets, most
/// common first.
const RESET_HEADERS: [&str; 2] = ["x-ratelimit-reset", "ratelimit-reset"];

/// What a response says about rate limiting.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RateLimitInfo {
    /// `Retry-After`, as a duration from now.
    pub retry_after: Option<Duration>,
    /// `X-RateLimit-Reset` or `RateLimit-Reset`.
    pub reset_at: Option<SystemTime>,
    /// `X-RateLimit-Remaining`.
    pub remaining: Option<u64>,
}

impl RateLimitInfo {
    /// Reads the rate limit headers of a response.
    ///
    /// # Examples
    ///
    /// ```
    /// use http::HeaderMap;
    /// use layerfetch::rate_limit::RateLimitInfo;
    /// use std::time::Duration;
    ///
    /// let mut headers = HeaderMap::new();
    /// headers.insert("retry-after", "60".parse().unwrap());
    ///
    /// let info = RateLimitInfo::from_headers(&headers);
    /// assert_eq!(info.delay(Duration::from_secs(30)), Some(Duration::from_secs(30)));
    /// ```
    pub fn from_headers(headers: &HeaderMap) -> Self {
        let text = |name: &str| headers.get(name).and_then(|value| value.to_str().ok());

        Self {
            retry_after: text("retry-after").and_then(parse_retry_after),
            reset_at: RESET_HEADERS
                .iter()
                .find_map(|name| text(name)?.parse::<u64>().ok())
                .map(|secs| UNIX_EPOCH + Duration::from_secs(secs)),
            remaining: text("x-ratelimit-remaining").and_then(|v| v.parse().ok()),
        }
    }

    /// The wait the server asks for, capped at `max_wait`.
    ///
    /// `Retry-After` takes precedence over the reset timestamp. Returns
    /// `None` when neither is present or the reset time already passed.
    pub fn delay(&self, max_wait: Duration) -> Option<Duration> {
        let wait = match (self.retry_after, self.reset_at) {
            (Some(retry_after), _) => retry_after,
            (None, Some(reset_at)) => reset_at.duration_since(SystemTime::now()).ok()?,
            (None, None) => return None,
        };
        Some(wait.min(max_wait))
    }

    /// Returns `true` when the response signals an exhausted quota.
    pub fn is_rate_limited(&self) -> bool {
        self.retry_after.is_some() || self.remaining == Some(0)
    }
}

/// `Retry-After` is either delay-seconds or an HTTP date.
fn parse_retry_after(value: &str) -> Option<Duration> {
    if let Ok(secs) = value.trim().parse::<u64>() {
        return Some(Duration::from_secs(secs));
    }
    httpdate::parse_http_date(value)
        .ok()?
        .duration_since(SystemTime::now())
        .ok()
}
