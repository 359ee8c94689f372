//! Lifecycle hooks.
//!
//! Every option layer may carry one hook of each kind. When both the call
//! and the factory define a hook, the call-level one runs first. Hooks only
//! observe: their return values never change the outcome of a call, with one
//! exception. An `on_request` hook may fail, and that failure becomes the
//! attempt's error.

use crate::error::{BoxError, Error};
use crate::progress::{OnProgress, Progress};
use crate::retry::RetryContext;
use crate::transport::Request;
use serde_json::Value;
use std::fmt;
use std::sync::Arc;

/// Runs before every attempt, after the request is built.
pub type OnRequest = Arc<dyn Fn(&mut Request) -> Result<(), BoxError> + Send + Sync>;
/// Runs once when a call succeeds.
pub type OnSuccess = Arc<dyn Fn(&Value, &Request) + Send + Sync>;
/// Runs once when a call fails.
pub type OnError = Arc<dyn Fn(&Error, &Request) + Send + Sync>;
/// Runs after a retry delay, before the next attempt is built.
pub type OnRetry = Arc<dyn Fn(&RetryContext<'_>) + Send + Sync>;

/// The hooks of one option layer.
#[derive(Clone, Default)]
pub struct Hooks {
    pub(crate) on_request: Option<OnRequest>,
    pub(crate) on_success: Option<OnSuccess>,
    pub(crate) on_error: Option<OnError>,
    pub(crate) on_retry: Option<OnRetry>,
    pub(crate) on_upload_progress: Option<OnProgress>,
    pub(crate) on_download_progress: Option<OnProgress>,
}

impl fmt::Debug for Hooks {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Hooks")
            .field("on_request", &self.on_request.is_some())
            .field("on_success", &self.on_success.is_some())
            .field("on_error", &self.on_error.is_some())
            .field("on_retry", &self.on_retry.is_some())
            .field("on_upload_progress", &self.on_upload_progress.is_some())
            .field("on_download_progress", &self.on_download_progress.is_some())
            .finish()
    }
}

/// Call-level and factory-level hooks, fired in that order.
#[derive(Clone, Default)]
pub struct LayeredHooks {
    pub(crate) call: Hooks,
    pub(crate) factory: Hooks,
    upload: Option<OnProgress>,
    download: Option<OnProgress>,
}

impl LayeredHooks {
    pub(crate) fn new(call: Hooks, factory: Hooks) -> Self {
        let upload = chain_progress(
            call.on_upload_progress.clone(),
            factory.on_upload_progress.clone(),
        );
        let download = chain_progress(
            call.on_download_progress.clone(),
            factory.on_download_progress.clone(),
        );
        Self {
            call,
            factory,
            upload,
            download,
        }
    }

    fn layers(&self) -> [&Hooks; 2] {
        [&self.call, &self.factory]
    }

    pub(crate) fn on_request(&self, request: &mut Request) -> Result<(), BoxError> {
        for hooks in self.layers() {
            if let Some(hook) = &hooks.on_request {
                hook(&mut *request)?;
            }
        }
        Ok(())
    }

    pub(crate) fn on_success(&self, data: &Value, request: &Request) {
        for hook in self.layers().into_iter().filter_map(|h| h.on_success.as_ref()) {
            hook(data, request);
        }
    }

    pub(crate) fn on_error(&self, error: &Error, request: &Request) {
        for hook in self.layers().into_iter().filter_map(|h| h.on_error.as_ref()) {
            hook(error, request);
        }
    }

    pub(crate) fn on_retry(&self, ctx: &RetryContext<'_>) {
        for hook in self.layers().into_iter().filter_map(|h| h.on_retry.as_ref()) {
            hook(ctx);
        }
    }

    /// The upload callbacks of both layers as one callback.
    pub(crate) fn upload_progress(&self) -> Option<&OnProgress> {
        self.upload.as_ref()
    }

    /// The download callbacks of both layers as one callback.
    pub(crate) fn download_progress(&self) -> Option<&OnProgress> {
        self.download.as_ref()
    }
}

impl fmt::Debug for LayeredHooks {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("LayeredHooks")
            .field("call", &self.call)
            .field("factory", &self.factory)
            .finish()
    }
}

fn chain_progress(call: Option<OnProgress>, factory: Option<OnProgress>) -> Option<OnProgress> {
    match (call, factory) {
        (Some(call), Some(factory)) => Some(Arc::new(move |progress: &Progress| {
            call(progress);
            factory(progress);
        })),
        (call, factory) => call.or(factory),
    }
}
