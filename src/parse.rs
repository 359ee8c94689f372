//! Turning responses into values.
//!
//! A successful response goes through a [`ParseResponse`] and then, when one
//! is configured, a [`Schema`]. A response the reject predicate refuses goes
//! through a [`ParseRejected`] instead, which produces the error the call
//! fails with.

use crate::error::{Error, Issue, RejectedResponse, Result};
use crate::transport::{Request, Response};
use async_trait::async_trait;
use serde_json::Value;
use std::sync::Arc;

/// Decides whether a response is a failure.
pub type RejectFn = Arc<dyn Fn(&Response) -> bool + Send + Sync>;

/// The default reject predicate: anything but 2xx.
pub fn reject_non_success(response: &Response) -> bool {
    !response.ok()
}

/// Parses a successful response body.
#[async_trait]
pub trait ParseResponse: Send + Sync {
    /// Consumes the response and returns its value.
    async fn parse(&self, response: Response, request: &Request) -> Result<Value>;
}

/// Turns a rejected response into the error the call fails with.
#[async_trait]
pub trait ParseRejected: Send + Sync {
    /// Consumes the response and returns the rejection.
    async fn parse(&self, response: Response, request: &Request) -> Error;
}

/// Validates a parsed value.
///
/// # Examples
///
/// ```
/// use async_trait::async_trait;
/// use layerfetch::{Issue, Schema};
/// use serde_json::Value;
///
/// struct HasId;
///
/// #[async_trait]
/// impl Schema for HasId {
///     async fn validate(&self, value: &Value) -> Result<Value, Vec<Issue>> {
///         match value.get("id") {
///             Some(_) => Ok(value.clone()),
///             None => Err(vec![Issue::at(["id"], "required")]),
///         }
///     }
/// }
/// ```
#[async_trait]
pub trait Schema: Send + Sync {
    /// Returns the validated (possibly transformed) value, or every issue
    /// found.
    async fn validate(&self, value: &Value) -> std::result::Result<Value, Vec<Issue>>;
}

/// Parses JSON when the body is JSON, text otherwise, and `null` when the
/// body is empty.
#[derive(Debug, Clone, Copy, Default)]
pub struct JsonOrText;

#[async_trait]
impl ParseResponse for JsonOrText {
    async fn parse(&self, response: Response, _request: &Request) -> Result<Value> {
        read_value(response).await
    }
}

/// Wraps the parsed body of a rejected response into [`Error::Rejected`].
#[derive(Debug, Clone, Copy, Default)]
pub struct RejectWithBody;

#[async_trait]
impl ParseRejected for RejectWithBody {
    async fn parse(&self, response: Response, request: &Request) -> Error {
        let status = response.status;
        let headers = response.headers.clone();
        let data = match read_value(response).await {
            Ok(data) => data,
            Err(error) => return error,
        };

        if status.is_client_error() {
            tracing::error!(status = status.as_u16(), response = %data, "Client error (4xx)");
        } else if status.is_server_error() {
            tracing::warn!(status = status.as_u16(), response = %data, "Server error (5xx)");
        }

        Error::Rejected(Box::new(RejectedResponse {
            status,
            headers,
            method: request.method.clone(),
            url: request.url.clone(),
            data,
        }))
    }
}

async fn read_value(response: Response) -> Result<Value> {
    let bytes = response.body.bytes().await.map_err(Error::Transport)?;
    if bytes.is_empty() {
        return Ok(Value::Null);
    }
    match serde_json::from_slice(&bytes) {
        Ok(value) => Ok(value),
        Err(_) => Ok(Value::String(String::from_utf8_lossy(&bytes).into_owned())),
    }
}
