//! The client: shared defaults plus a transport.
//!
//! The [`Client`] type is the main entry point for making requests. Its
//! defaults form the factory layer of every call made through it. Use
//! [`ClientBuilder`] to configure and create clients.

use crate::{
    error::BoxError,
    execute::execute,
    merge::ParamValue,
    options::{resolve, FetchOptions, Input, ResolvedOptions},
    retry::{RetryContext, RetryOptions},
    transport::{ReqwestTransport, Request, Transport},
    Error, Reply, Result,
};
use http::Method;
use serde::{de::DeserializeOwned, Serialize};
use serde_json::Value;
use std::fmt;
use std::sync::Arc;
use std::time::Duration;

/// A request engine with shared defaults.
///
/// Cloning is cheap and clones share the transport and the defaults, which
/// are never modified once the client is built. Any number of calls may run
/// concurrently on one client.
///
/// # Examples
///
/// ```no_run
/// use layerfetch::{Client, FetchOptions, Reply};
/// use layerfetch::retry::{Delay, RetryOn5xx, RetryOptions};
/// use serde::{Deserialize, Serialize};
/// use std::time::Duration;
///
/// #[derive(Serialize)]
/// struct CreateUser {
///     name: String,
/// }
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
///     .timeout(Duration::from_secs(30))
///     .retry(
///         RetryOptions::new()
///             .when(RetryOn5xx)
///             .attempts(3)
///             .delay(Delay::exponential(
///                 Duration::from_millis(100),
///                 Duration::from_secs(10),
///                 true,
///             )),
///     )
///     .build()?;
///
/// let user: Reply<User> = client.get("/users/123").await?;
/// println!("User: {}", user.name);
///
/// let created: Reply<User> = client
///     .post("/users", &CreateUser { name: "Alice".to_string() })
///     .await?;
/// println!("Created user with ID: {}", created.id);
///
/// let page: Reply<Vec<User>> = client
///     .fetch("/users", FetchOptions::new().param("page", 2))
///     .await?;
/// # Ok(())
/// # }
/// ```
#[derive(Clone)]
pub struct Client {
    inner: Arc<ClientInner>,
}

struct ClientInner {
    transport: Arc<dyn Transport>,
    defaults: FetchOptions,
}

impl Client {
    /// Creates a new `ClientBuilder` for configuring a client.
    pub fn builder() -> ClientBuilder {
        ClientBuilder::new()
    }

    /// The factory-level options applied to every call.
    pub fn defaults(&self) -> &FetchOptions {
        &self.inner.defaults
    }

    /// Resolves the options a call would run with, without running it.
    pub fn resolve(&self, input: impl Into<Input>, options: &FetchOptions) -> ResolvedOptions {
        resolve(input.into(), &self.inner.defaults, options)
    }

    /// Runs one call.
    ///
    /// `options` form the call layer, on top of the client's defaults. The
    /// response is parsed, validated against the schema if one is set, and
    /// decoded into `T`. Use [`serde_json::Value`] for `T` to skip decoding.
    ///
    /// # Errors
    ///
    /// * [`Error::InvalidUrl`] when the target is not an absolute URL
    /// * [`Error::Transport`], [`Error::Timeout`] or [`Error::Cancelled`] when
    ///   the last attempt failed that way
    /// * [`Error::Rejected`] when the last response was rejected
    /// * [`Error::Validation`] when the value failed the schema or could not
    ///   be decoded into `T`
    /// * [`Error::Unknown`] (or whatever the configured normalizer returns)
    ///   when a hook, predicate or delay function failed
    pub async fn fetch<T>(&self, input: impl Into<Input>, options: FetchOptions) -> Result<Reply<T>>
    where
        T: DeserializeOwned,
    {
        let resolved = resolve(input.into(), &self.inner.defaults, &options);
        execute(self.inner.transport.as_ref(), resolved).await
    }

    /// Makes a GET request.
    pub async fn get<T>(&self, input: impl Into<Input>) -> Result<Reply<T>>
    where
        T: DeserializeOwned,
    {
        self.fetch(input, FetchOptions::new().method(Method::GET)).await
    }

    /// Makes a POST request with a JSON body.
    pub async fn post<Req, T>(&self, input: impl Into<Input>, body: &Req) -> Result<Reply<T>>
    where
        Req: Serialize + ?Sized,
        T: DeserializeOwned,
    {
        self.send_json(Method::POST, input.into(), body).await
    }

    /// Makes a PUT request with a JSON body.
    pub async fn put<Req, T>(&self, input: impl Into<Input>, body: &Req) -> Result<Reply<T>>
    where
        Req: Serialize + ?Sized,
        T: DeserializeOwned,
    {
        self.send_json(Method::PUT, input.into(), body).await
    }

    /// Makes a PATCH request with a JSON body.
    pub async fn patch<Req, T>(&self, input: impl Into<Input>, body: &Req) -> Result<Reply<T>>
    where
        Req: Serialize + ?Sized,
        T: DeserializeOwned,
    {
        self.send_json(Method::PATCH, input.into(), body).await
    }

    /// Makes a DELETE request.
    pub async fn delete<T>(&self, input: impl Into<Input>) -> Result<Reply<T>>
    where
        T: DeserializeOwned,
    {
        self.fetch(input, FetchOptions::new().method(Method::DELETE)).await
    }

    async fn send_json<Req, T>(&self, method: Method, input: Input, body: &Req) -> Result<Reply<T>>
    where
        Req: Serialize + ?Sized,
        T: DeserializeOwned,
    {
        let options = FetchOptions::new().method(method).json(body)?;
        self.fetch(input, options).await
    }
}

impl fmt::Debug for Client {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Client")
            .field("defaults", &self.inner.defaults)
            .finish_non_exhaustive()
    }
}

/// Builder for configuring and creating a [`Client`].
///
/// Everything set here becomes part of the factory layer. Options without a
/// dedicated setter can be given as a whole with [`ClientBuilder::defaults`].
///
/// # Examples
///
/// ```no_run
/// use layerfetch::ClientBuilder;
/// use std::time::Duration;
///
/// # async fn example() -> Result<(), layerfetch::Error> {
/// let client = ClientBuilder::new()
///     .base_url("https://api.example.com")?
///     .timeout(Duration::from_secs(30))
///     .default_header("User-Agent", "my-app/1.0")?
///     .param("api-version", "2")
///     .build()?;
/// # Ok(())
/// # }
/// ```
#[derive(Default)]
pub struct ClientBuilder {
    defaults: FetchOptions,
    transport: Option<Arc<dyn Transport>>,
}

impl ClientBuilder {
    /// Creates a new `ClientBuilder` with default settings.
    pub fn new() -> Self {
        Self::default()
    }

    /// Replaces every default with `defaults`.
    pub fn defaults(mut self, defaults: FetchOptions) -> Self {
        self.defaults = defaults;
        self
    }

    /// Sets the base URL relative inputs are joined to.
    ///
    /// # Errors
    ///
    /// Returns an error if the URL is invalid.
    pub fn base_url(mut self, url: impl AsRef<str>) -> Result<Self> {
        self.defaults = self.defaults.base_url(url)?;
        Ok(self)
    }

    /// Adds a default header that will be included in all requests.
    ///
    /// # Errors
    ///
    /// Returns an error if the header name or value is invalid.
    pub fn default_header(mut self, name: impl AsRef<str>, value: impl AsRef<str>) -> Result<Self> {
        self.defaults = self.defaults.header(name, value)?;
        Ok(self)
    }

    /// Adds a default query parameter.
    pub fn param(mut self, key: impl Into<String>, value: impl Into<ParamValue>) -> Self {
        self.defaults = self.defaults.param(key, value);
        self
    }

    /// Sets the per-attempt timeout.
    pub fn timeout(mut self, timeout: Duration) -> Self {
        self.defaults = self.defaults.timeout(timeout);
        self
    }

    /// Sets the default retry settings.
    pub fn retry(mut self, retry: RetryOptions) -> Self {
        self.defaults = self.defaults.retry(retry);
        self
    }

    /// Sets the transport. Defaults to a [`ReqwestTransport`].
    pub fn transport(mut self, transport: impl Transport + 'static) -> Self {
        self.transport = Some(Arc::new(transport));
        self
    }

    /// Runs before every attempt of every call.
    pub fn on_request<F>(mut self, f: F) -> Self
    where
        F: Fn(&mut Request) -> std::result::Result<(), BoxError> + Send + Sync + 'static,
    {
        self.defaults = self.defaults.on_request(f);
        self
    }

    /// Runs when any call succeeds, after the call's own hook.
    pub fn on_success<F>(mut self, f: F) -> Self
    where
        F: Fn(&Value, &Request) + Send + Sync + 'static,
    {
        self.defaults = self.defaults.on_success(f);
        self
    }

    /// Runs when any call fails, after the call's own hook.
    pub fn on_error<F>(mut self, f: F) -> Self
    where
        F: Fn(&Error, &Request) + Send + Sync + 'static,
    {
        self.defaults = self.defaults.on_error(f);
        self
    }

    /// Runs before every retry of every call, after the call's own hook.
    pub fn on_retry<F>(mut self, f: F) -> Self
    where
        F: Fn(&RetryContext<'_>) + Send + Sync + 'static,
    {
        self.defaults = self.defaults.on_retry(f);
        self
    }

    /// Builds the configured `Client`.
    ///
    /// # Errors
    ///
    /// Returns an error if the default transport cannot be created.
    pub fn build(self) -> Result<Client> {
        let transport = match self.transport {
            Some(transport) => transport,
            None => Arc::new(ReqwestTransport::new()?),
        };

        Ok(Client {
            inner: Arc::new(ClientInner {
                transport,
                defaults: self.defaults,
            }),
        })
    }
}

impl fmt::Debug for ClientBuilder {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ClientBuilder")
            .field("defaults", &self.defaults)
            .field("transport", &self.transport.is_some())
            .finish()
    }
}
