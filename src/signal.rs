//! Cooperative cancellation.
//!
//! An [`AbortSignal`] is a cheap, cloneable handle that reports whether (and
//! why) an operation should stop. Signals come from an [`AbortController`],
//! from a timeout, or from combining other signals with [`AbortSignal::any`].
//!
//! A combined signal remembers *when* each source fired, so the reason it
//! reports is always the one that fired first.

use crate::Error;
use futures_util::future::{self, BoxFuture, FutureExt};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::watch;
use tokio::time::Instant;

/// Why a signal fired.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AbortReason {
    /// The caller aborted explicitly.
    Cancelled,
    /// A timeout budget elapsed.
    Timeout,
}

impl AbortReason {
    /// The error a call ends with when it stops for this reason.
    pub fn into_error(self) -> Error {
        match self {
            AbortReason::Cancelled => Error::Cancelled,
            AbortReason::Timeout => Error::Timeout,
        }
    }
}

#[derive(Debug, Clone, Copy)]
struct Fired {
    reason: AbortReason,
    at: Instant,
}

/// The owning side of an [`AbortSignal`].
///
/// # Examples
///
/// ```
/// use layerfetch::{AbortController, AbortReason};
///
/// let controller = AbortController::new();
/// let signal = controller.signal();
/// assert!(!signal.is_aborted());
///
/// controller.abort();
/// assert_eq!(signal.reason(), Some(AbortReason::Cancelled));
/// ```
#[derive(Debug)]
pub struct AbortController {
    tx: watch::Sender<Option<Fired>>,
    signal: AbortSignal,
}

impl AbortController {
    /// Creates a controller whose signal has not fired.
    pub fn new() -> Self {
        let (tx, rx) = watch::channel(None);
        Self {
            tx,
            signal: AbortSignal {
                source: Source::Controller(rx),
            },
        }
    }

    /// Returns a signal tied to this controller.
    pub fn signal(&self) -> AbortSignal {
        self.signal.clone()
    }

    /// Fires the signal with [`AbortReason::Cancelled`].
    pub fn abort(&self) {
        self.abort_with(AbortReason::Cancelled);
    }

    /// Fires the signal with the given reason. Only the first call has an
    /// effect.
    pub fn abort_with(&self, reason: AbortReason) {
        self.tx.send_if_modified(|state| {
            if state.is_some() {
                return false;
            }
            *state = Some(Fired {
                reason,
                at: Instant::now(),
            });
            true
        });
    }
}

impl Default for AbortController {
    fn default() -> Self {
        Self::new()
    }
}

/// A cancellation signal.
#[derive(Debug, Clone)]
pub struct AbortSignal {
    source: Source,
}

#[derive(Debug, Clone)]
enum Source {
    Controller(watch::Receiver<Option<Fired>>),
    Deadline(Instant),
    Any(Arc<[AbortSignal]>),
}

impl AbortSignal {
    /// A signal that fires with [`AbortReason::Timeout`] once `duration` has
    /// elapsed from now.
    pub fn timeout(duration: Duration) -> Self {
        Self {
            source: Source::Deadline(Instant::now() + duration),
        }
    }

    /// A signal that fires as soon as any of `signals` fires, reporting the
    /// reason of whichever fired first.
    pub fn any(signals: impl IntoIterator<Item = AbortSignal>) -> Self {
        Self {
            source: Source::Any(signals.into_iter().collect()),
        }
    }

    fn fired(&self) -> Option<Fired> {
        match &self.source {
            Source::Controller(rx) => *rx.borrow(),
            Source::Deadline(at) => (Instant::now() >= *at).then_some(Fired {
                reason: AbortReason::Timeout,
                at: *at,
            }),
            Source::Any(signals) => signals
                .iter()
                .filter_map(AbortSignal::fired)
                .min_by_key(|fired| fired.at),
        }
    }

    /// Returns the reason if the signal has fired.
    pub fn reason(&self) -> Option<AbortReason> {
        self.fired().map(|fired| fired.reason)
    }

    /// Returns `true` if the signal has fired.
    pub fn is_aborted(&self) -> bool {
        self.fired().is_some()
    }

    /// Resolves once the signal fires. Never resolves for a signal that
    /// cannot fire anymore (its controller was dropped unfired).
    pub fn aborted(&self) -> BoxFuture<'_, AbortReason> {
        async move {
            match &self.source {
                Source::Controller(rx) => {
                    let mut rx = rx.clone();
                    let fired = match rx.wait_for(Option::is_some).await {
                        Ok(state) => *state,
                        Err(_) => None,
                    };
                    match fired {
                        Some(fired) => fired.reason,
                        None => future::pending().await,
                    }
                }
                Source::Deadline(at) => {
                    tokio::time::sleep_until(*at).await;
                    AbortReason::Timeout
                }
                Source::Any(signals) => {
                    if signals.is_empty() {
                        return future::pending().await;
                    }
                    let (first, _, _) =
                        future::select_all(signals.iter().map(AbortSignal::aborted)).await;
                    self.reason().unwrap_or(first)
                }
            }
        }
        .boxed()
    }
}

/// Combines the caller's signal with an attempt timeout.
///
/// Returns `None` when there is nothing to observe, the single source when
/// only one is present, and a combined signal otherwise.
pub fn compose(explicit: Option<&AbortSignal>, timeout: Option<Duration>) -> Option<AbortSignal> {
    match (explicit, timeout) {
        (None, None) => None,
        (Some(signal), None) => Some(signal.clone()),
        (None, Some(timeout)) => Some(AbortSignal::timeout(timeout)),
        (Some(signal), Some(timeout)) => Some(AbortSignal::any([
            signal.clone(),
            AbortSignal::timeout(timeout),
        ])),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_compose_without_sources() {
        assert!(compose(None, None).is_none());
    }

    #[test]
    fn test_compose_single_source_is_returned_directly() {
        let controller = AbortController::new();
        let signal = compose(Some(&controller.signal()), None).unwrap();
        assert!(matches!(signal.source, Source::Controller(_)));

        let signal = compose(None, Some(Duration::from_secs(1))).unwrap();
        assert!(matches!(signal.source, Source::Deadline(_)));
    }

    #[tokio::test(start_paused = true)]
    async fn test_timeout_wins_when_it_fires_first() {
        let controller = AbortController::new();
        let signal = compose(Some(&controller.signal()), Some(Duration::from_millis(50))).unwrap();

        let reason = signal.aborted().await;
        assert_eq!(reason, AbortReason::Timeout);

        // A later explicit abort does not change the attribution.
        tokio::time::advance(Duration::from_millis(10)).await;
        controller.abort();
        assert_eq!(signal.reason(), Some(AbortReason::Timeout));
    }

    #[tokio::test(start_paused = true)]
    async fn test_explicit_abort_wins_when_it_fires_first() {
        let controller = AbortController::new();
        let signal = compose(Some(&controller.signal()), Some(Duration::from_secs(5))).unwrap();

        controller.abort();
        assert_eq!(signal.aborted().await, AbortReason::Cancelled);

        tokio::time::advance(Duration::from_secs(10)).await;
        assert_eq!(signal.reason(), Some(AbortReason::Cancelled));
    }

    #[tokio::test]
    async fn test_abort_is_observed_by_pending_waiter() {
        let controller = AbortController::new();
        let signal = controller.signal();
        let waiter = tokio::spawn(async move { signal.aborted().await });

        tokio::time::sleep(Duration::from_millis(10)).await;
        controller.abort();

        assert_eq!(waiter.await.unwrap(), AbortReason::Cancelled);
    }

    #[test]
    fn test_only_first_abort_counts() {
        let controller = AbortController::new();
        controller.abort_with(AbortReason::Timeout);
        controller.abort();
        assert_eq!(controller.signal().reason(), Some(AbortReason::Timeout));
    }
}
