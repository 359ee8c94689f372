//! Error types for request execution.
//!
//! Every failure a call can end with is a variant of [`Error`]. Callers that
//! only care about the broad category can match on [`Error::kind`], which
//! returns a plain [`ErrorKind`] discriminant.

use http::{HeaderMap, Method, StatusCode};
use serde_json::Value;
use std::fmt;
use url::Url;

/// A boxed error as thrown by user-supplied hooks, predicates and transports.
pub type BoxError = Box<dyn std::error::Error + Send + Sync>;

/// The main error type returned by [`Client::fetch`](crate::Client::fetch).
///
/// # Examples
///
/// ```no_run
/// use layerfetch::{Client, Error, FetchOptions};
///
/// # async fn example() -> Result<(), Error> {
/// let client = Client::builder()
///     .base_url("https://api.example.com")?
///     .build()?;
///
/// match client.fetch::<serde_json::Value>("/endpoint", FetchOptions::new()).await {
///     Ok(reply) => println!("Success: {:?}", reply.data),
///     Err(Error::Rejected(rejected)) => {
///         eprintln!("HTTP error {}: {}", rejected.status, rejected.data);
///     }
///     Err(Error::Validation { data, issues }) => {
///         eprintln!("Unexpected payload {data}: {issues:?}");
///     }
///     Err(e) => eprintln!("Other error: {}", e),
/// }
/// # Ok(())
/// # }
/// ```
#[derive(thiserror::Error, Debug)]
pub enum Error {
    /// The transport failed before producing a response (connection refused,
    /// DNS failure, broken body stream, ...).
    #[error("Transport error: {0}")]
    Transport(#[source] BoxError),

    /// The attempt's timeout budget elapsed.
    #[error("Request timed out")]
    Timeout,

    /// The caller's abort signal fired.
    #[error("Request was cancelled")]
    Cancelled,

    /// A response was received but the reject predicate classified it as a
    /// failure.
    ///
    /// The boxed record carries the parsed body along with the status,
    /// headers, method and URL of the exchange.
    #[error("HTTP error {}: {}", .0.status, .0.data)]
    Rejected(Box<RejectedResponse>),

    /// The parsed response did not pass schema validation.
    ///
    /// # Fields
    ///
    /// * `data` - The parsed value that failed validation
    /// * `issues` - Every problem the validator reported
    #[error("Response failed validation: {}", Issues(.issues))]
    Validation {
        /// The parsed response body.
        data: Value,
        /// The validation issues.
        issues: Vec<Issue>,
    },

    /// Any other failure, produced by the error normalizer from a value thrown
    /// by a hook, a retry predicate, an attempts function or a delay function.
    #[error("{0}")]
    Unknown(#[source] BoxError),

    /// Invalid configuration was provided (bad header name or value, ...).
    #[error("Configuration error: {0}")]
    Configuration(String),

    /// The resolved request target is not a valid absolute URL.
    #[error("Invalid URL: {0}")]
    InvalidUrl(#[from] url::ParseError),

    /// A request body could not be converted to JSON.
    #[error("Failed to serialize request: {0}")]
    SerializationFailed(String),
}

/// The discriminant of an [`Error`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ErrorKind {
    /// See [`Error::Transport`].
    Transport,
    /// See [`Error::Timeout`].
    Timeout,
    /// See [`Error::Cancelled`].
    Cancelled,
    /// See [`Error::Rejected`].
    Rejected,
    /// See [`Error::Validation`].
    Validation,
    /// See [`Error::Unknown`].
    Unknown,
    /// Configuration, URL and serialization errors raised before a request
    /// is sent.
    Configuration,
}

/// A response the reject predicate refused.
#[derive(Debug, Clone)]
pub struct RejectedResponse {
    /// The HTTP status code.
    pub status: StatusCode,
    /// The response headers.
    pub headers: HeaderMap,
    /// The method of the request that produced this response.
    pub method: Method,
    /// The URL of the request that produced this response.
    pub url: Url,
    /// The response body, parsed as JSON when possible and as text otherwise.
    pub data: Value,
}

/// One problem reported by a schema validator.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Issue {
    /// Human readable description.
    pub message: String,
    /// Location of the offending value, outermost key first.
    pub path: Vec<String>,
}

impl Issue {
    /// Creates an issue at the root of the value.
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
            path: Vec::new(),
        }
    }

    /// Creates an issue at the given path.
    pub fn at<I, S>(path: I, message: impl Into<String>) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            message: message.into(),
            path: path.into_iter().map(Into::into).collect(),
        }
    }
}

impl fmt::Display for Issue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.path.is_empty() {
            f.write_str(&self.message)
        } else {
            write!(f, "{}: {}", self.path.join("."), self.message)
        }
    }
}

struct Issues<'a>(&'a [Issue]);

impl fmt::Display for Issues<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for (i, issue) in self.0.iter().enumerate() {
            if i > 0 {
                f.write_str("; ")?;
            }
            write!(f, "{issue}")?;
        }
        Ok(())
    }
}

impl Error {
    /// Returns the discriminant of this error.
    pub fn kind(&self) -> ErrorKind {
        match self {
            Error::Transport(_) => ErrorKind::Transport,
            Error::Timeout => ErrorKind::Timeout,
            Error::Cancelled => ErrorKind::Cancelled,
            Error::Rejected(_) => ErrorKind::Rejected,
            Error::Validation { .. } => ErrorKind::Validation,
            Error::Unknown(_) => ErrorKind::Unknown,
            Error::Configuration(_) | Error::InvalidUrl(_) | Error::SerializationFailed(_) => {
                ErrorKind::Configuration
            }
        }
    }

    /// Returns `true` if this error is potentially retryable.
    ///
    /// Transport errors, timeouts, and rejected 5xx or 429 responses are
    /// considered retryable. Cancellation is not: the caller asked to stop.
    ///
    /// # Examples
    ///
    /// ```
    /// use layerfetch::Error;
    ///
    /// assert!(Error::Timeout.is_retryable());
    /// assert!(!Error::Cancelled.is_retryable());
    /// ```
    pub fn is_retryable(&self) -> bool {
        match self {
            Error::Transport(_) => true,
            Error::Timeout => true,
            Error::Rejected(rejected) => {
                rejected.status.is_server_error() || rejected.status.as_u16() == 429
            }
            Error::Cancelled
            | Error::Validation { .. }
            | Error::Unknown(_)
            | Error::Configuration(_)
            | Error::InvalidUrl(_)
            | Error::SerializationFailed(_) => false,
        }
    }

    /// Returns the HTTP status code if this error carries one.
    pub fn status(&self) -> Option<StatusCode> {
        match self {
            Error::Rejected(rejected) => Some(rejected.status),
            _ => None,
        }
    }

    /// Returns the rejected response if this is a [`Error::Rejected`].
    pub fn rejected(&self) -> Option<&RejectedResponse> {
        match self {
            Error::Rejected(rejected) => Some(rejected),
            _ => None,
        }
    }

    /// Returns `true` for [`Error::Timeout`].
    pub fn is_timeout(&self) -> bool {
        matches!(self, Error::Timeout)
    }

    /// Returns `true` for [`Error::Cancelled`].
    pub fn is_cancelled(&self) -> bool {
        matches!(self, Error::Cancelled)
    }
}

impl From<reqwest::Error> for Error {
    fn from(e: reqwest::Error) -> Self {
        if e.is_timeout() {
            Error::Timeout
        } else {
            Error::Transport(Box::new(e))
        }
    }
}

/// Converts a value thrown by user code into an [`Error`].
///
/// This is the default error normalizer: a boxed [`Error`] is recovered as
/// is, anything else becomes [`Error::Unknown`].
pub fn normalize_error(error: BoxError) -> Error {
    match error.downcast::<Error>() {
        Ok(error) => *error,
        Err(other) => Error::Unknown(other),
    }
}

/// A specialized `Result` type for request execution.
pub type Result<T> = std::result::Result<T, Error>;
