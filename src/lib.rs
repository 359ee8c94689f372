//! # layerfetch - layered request execution over any transport
//!
//! `layerfetch` runs HTTP calls configured in three layers (built-in
//! fallbacks, client-wide defaults and per-call options) through a retry
//! state machine with attempt-scoped timeouts, cooperative cancellation,
//! response validation and byte-level progress reporting. The HTTP stack
//! itself is a pluggable [`Transport`]; the default is built on `reqwest`.
//!
//! ## Quick Start
//!
//! ```no_run
//! use layerfetch::{Client, FetchOptions, Reply};
//! use serde::{Deserialize, Serialize};
//! use std::time::Duration;
//!
//! #[derive(Serialize)]
//! struct CreateUser {
//!     name: String,
//!     email: String,
//! }
//!
//! #[derive(Deserialize)]
//! struct User {
//!     id: u64,
//!     name: String,
//! }
//!
//! #[tokio::main]
//! async fn main() -> Result<(), layerfetch::Error> {
//!     let client = Client::builder()
//!         .base_url("https://api.example.com")?
//!         .default_header("authorization", "Bearer token")?
//!         .timeout(Duration::from_secs(30))
//!         .build()?;
//!
//!     let user: Reply<User> = client.get("/users/123").await?;
//!     println!("User: {} ({:?})", user.name, user.latency);
//!
//!     // Per-call options sit on top of the client's defaults.
//!     let created: Reply<User> = client
//!         .fetch(
//!             "/users",
//!             FetchOptions::new()
//!                 .method(http::Method::POST)
//!                 .remove_header("authorization")?
//!                 .json(&CreateUser {
//!                     name: "Alice".to_string(),
//!                     email: "alice@example.com".to_string(),
//!                 })?,
//!         )
//!         .await?;
//!     println!("Created user with ID: {}", created.id);
//!
//!     Ok(())
//! }
//! ```
//!
//! ## Option layers
//!
//! For every setting the call layer wins over the client defaults, which win
//! over the fallbacks. Headers and params are merged key by key, and
//! [`FetchOptions::remove_header`] / [`FetchOptions::remove_param`] delete a
//! key set by the client. Retry settings are merged field by field.
//!
//! ## Retries, timeouts and cancellation
//!
//! ```no_run
//! use layerfetch::{AbortController, Client, FetchOptions};
//! use layerfetch::retry::{Delay, OrPredicate, RetryOn5xx, RetryOnTimeout, RetryOptions};
//! use std::time::Duration;
//!
//! # async fn example() -> Result<(), layerfetch::Error> {
//! let client = Client::builder()
//!     .base_url("https://api.example.com")?
//!     .retry(
//!         RetryOptions::new()
//!             .when(OrPredicate::new(vec![Box::new(RetryOn5xx), Box::new(RetryOnTimeout)]))
//!             .attempts(5)
//!             .delay(Delay::exponential(
//!                 Duration::from_millis(100),
//!                 Duration::from_secs(30),
//!                 true,
//!             )),
//!     )
//!     .build()?;
//!
//! let controller = AbortController::new();
//! let options = FetchOptions::new()
//!     .timeout(Duration::from_secs(2)) // per attempt
//!     .signal(controller.signal());
//!
//! let reply = client.fetch::<serde_json::Value>("/flaky", options).await;
//! # Ok(())
//! # }
//! ```
//!
//! ## Error handling
//!
//! Every failure is one [`Error`]; [`Error::kind`] gives the category.
//!
//! ```no_run
//! use layerfetch::{Client, ErrorKind};
//!
//! # async fn example(client: Client) {
//! match client.get::<serde_json::Value>("/endpoint").await {
//!     Ok(reply) => println!("Success: {}", reply.data),
//!     Err(e) => match e.kind() {
//!         ErrorKind::Rejected => eprintln!("Server said no: {}", e),
//!         ErrorKind::Timeout | ErrorKind::Cancelled => eprintln!("Gave up: {}", e),
//!         _ => eprintln!("Other error: {}", e),
//!     },
//! }
//! # }
//! ```

pub mod body;
mod client;
mod error;
mod execute;
pub mod hooks;
pub mod merge;
pub mod options;
pub mod parse;
pub mod progress;
pub mod rate_limit;
mod response;
pub mod retry;
pub mod signal;
mod target;
pub mod transport;

pub use body::{Body, BodyInit, RawBody};
pub use client::{Client, ClientBuilder};
pub use error::{normalize_error, BoxError, Error, ErrorKind, Issue, RejectedResponse, Result};
pub use merge::ParamValue;
pub use options::{resolve, FetchOptions, Input, PreparedRequest, ResolvedOptions};
pub use parse::{ParseRejected, ParseResponse, Schema};
pub use progress::Progress;
pub use response::Reply;
pub use retry::{RetryOptions, RetryPredicate};
pub use signal::{AbortController, AbortReason, AbortSignal};
pub use transport::{ReqwestTransport, Request, Response, Transport};
