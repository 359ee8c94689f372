//! The value a successful call resolves to.
//!
//! A [`Reply`] pairs the parsed, validated and decoded data with what is
//! known about the exchange that produced it.

use http::{HeaderMap, StatusCode};
use std::time::Duration;

/// A successful call.
///
/// # Examples
///
/// ```no_run
/// use layerfetch::{Client, Reply};
/// use serde::Deserialize;
///
/// #[derive(Deserialize)]
/// struct User {
///     id: u64,
///     name: String,
/// }
///
/// # async fn example() -> Result<(), layerfetch::Error> {
/// let client = Client::builder()
///     .base_url("https://api.example.com")?
///     .build()?;
///
/// let user: Reply<User> = client.get("/users/123").await?;
///
/// println!("User: {}", user.name);
/// println!("Request took {:?}", user.latency);
/// println!("Attempts: {}", user.attempts);
/// # Ok(())
/// # }
/// ```
#[derive(Debug, Clone)]
pub struct Reply<T> {
    /// The decoded response data.
    pub data: T,

    /// The HTTP status of the final response.
    pub status: StatusCode,

    /// The headers of the final response.
    pub headers: HeaderMap,

    /// Time from the start of the call until the data was decoded, retries
    /// and delays included.
    pub latency: Duration,

    /// Number of transport calls made, `1` when the first attempt succeeded.
    pub attempts: u32,
}

impl<T> Reply<T> {
    /// Creates a new `Reply`.
    pub fn new(
        data: T,
        status: StatusCode,
        headers: HeaderMap,
        latency: Duration,
        attempts: u32,
    ) -> Self {
        Self {
            data,
            status,
            headers,
            latency,
            attempts,
        }
    }

    /// Transforms the data and keeps everything else.
    ///
    /// ```
    /// # use layerfetch::Reply;
    /// # use http::{HeaderMap, StatusCode};
    /// # use std::time::Duration;
    /// let reply = Reply::new(42, StatusCode::OK, HeaderMap::new(), Duration::ZERO, 1);
    /// assert_eq!(reply.map(|n| n.to_string()).data, "42");
    /// ```
    pub fn map<U, F>(self, f: F) -> Reply<U>
    where
        F: FnOnce(T) -> U,
    {
        Reply {
            data: f(self.data),
            status: self.status,
            headers: self.headers,
            latency: self.latency,
            attempts: self.attempts,
        }
    }

    /// Returns `true` if more than one attempt was needed.
    pub fn was_retried(&self) -> bool {
        self.attempts > 1
    }

    /// Returns a header value by name, if it is valid text.
    pub fn header(&self, name: &str) -> Option<&str> {
        self.headers.get(name)?.to_str().ok()
    }

    /// Discards the metadata.
    pub fn into_inner(self) -> T {
        self.data
    }
}

impl<T> AsRef<T> for Reply<T> {
    fn as_ref(&self) -> &T {
        &self.data
    }
}

impl<T> std::ops::Deref for Reply<T> {
    type Target = T;

    fn deref(&self) -> &Self::Target {
        &self.data
    }
}
