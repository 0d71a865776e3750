//! Fetch Results
//!
//! A fetch function hands back a [`Fetch`]: the future that will produce the
//! value, plus an optional [`AbortHandle`] that the resource calls if every
//! consumer goes away before the future completes.
//!
//! The capability check happens once, when the resource starts loading. A
//! fetch without an abort handle still runs to completion when its consumers
//! are disposed; the resource simply discards the result.

use std::fmt;
use std::future::Future;

use futures_util::future::{self, BoxFuture, FutureExt};

use crate::error::FetchError;

/// Future type driven by a loading resource.
pub type FetchFuture<T> = BoxFuture<'static, Result<T, FetchError>>;

/// Cancellation callback attached to an in-flight fetch.
pub struct AbortHandle(Box<dyn FnOnce() + Send>);

impl AbortHandle {
    /// Wrap a callback that cancels the underlying operation.
    pub fn new<F>(abort: F) -> Self
    where
        F: FnOnce() + Send + 'static,
    {
        Self(Box::new(abort))
    }

    /// Run the callback. Consumes the handle so it can only fire once.
    pub(crate) fn abort(self) {
        (self.0)();
    }
}

impl From<future::AbortHandle> for AbortHandle {
    fn from(handle: future::AbortHandle) -> Self {
        Self::new(move || handle.abort())
    }
}

impl fmt::Debug for AbortHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("AbortHandle")
    }
}

pub(crate) enum Outcome<T> {
    /// Settled before the resource ever saw it.
    Ready(Result<T, FetchError>),
    Pending(FetchFuture<T>),
}

/// The awaitable returned by a fetch function.
pub struct Fetch<T> {
    pub(crate) outcome: Outcome<T>,
    pub(crate) abort: Option<AbortHandle>,
}

impl<T> Fetch<T>
where
    T: Send + 'static,
{
    /// A fetch backed by a future, with no way to cancel it.
    pub fn new<F>(fut: F) -> Self
    where
        F: Future<Output = Result<T, FetchError>> + Send + 'static,
    {
        Self {
            outcome: Outcome::Pending(fut.boxed()),
            abort: None,
        }
    }

    /// A fetch whose future is dropped as soon as the resource aborts it.
    pub fn abortable<F>(fut: F) -> Self
    where
        F: Future<Output = Result<T, FetchError>> + Send + 'static,
    {
        let (fut, handle) = future::abortable(fut);
        let fut = fut.map(|res| res.unwrap_or_else(|_| Err(FetchError::msg("aborted"))));
        Self {
            outcome: Outcome::Pending(fut.boxed()),
            abort: Some(handle.into()),
        }
    }

    /// A fetch that has already produced its value.
    ///
    /// The resource settles synchronously inside `load`, so a first `read`
    /// right after loading already sees the value.
    pub fn ready(value: T) -> Self {
        Self {
            outcome: Outcome::Ready(Ok(value)),
            abort: None,
        }
    }

    /// A fetch that failed before it could start.
    pub fn failed(err: FetchError) -> Self {
        Self {
            outcome: Outcome::Ready(Err(err)),
            abort: None,
        }
    }

    /// Attach a cancellation callback, replacing any existing one.
    pub fn with_abort<F>(mut self, abort: F) -> Self
    where
        F: FnOnce() + Send + 'static,
    {
        self.abort = Some(AbortHandle::new(abort));
        self
    }

    /// Whether this fetch exposes a cancellation handle.
    pub fn is_cancellable(&self) -> bool {
        self.abort.is_some()
    }
}

impl<T> fmt::Debug for Fetch<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let state = match self.outcome {
            Outcome::Ready(Ok(_)) => "ready",
            Outcome::Ready(Err(_)) => "failed",
            Outcome::Pending(_) => "pending",
        };
        f.debug_struct("Fetch")
            .field("state", &state)
            .field("cancellable", &self.abort.is_some())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicBool, Ordering};
    use std::sync::Arc;

    #[test]
    fn with_abort_marks_cancellable() {
        let fetch = Fetch::ready(1);
        assert!(!fetch.is_cancellable());

        let called = Arc::new(AtomicBool::new(false));
        let called_clone = called.clone();
        let fetch = fetch.with_abort(move || called_clone.store(true, Ordering::SeqCst));
        assert!(fetch.is_cancellable());

        fetch.abort.unwrap().abort();
        assert!(called.load(Ordering::SeqCst));
    }

    #[tokio::test]
    async fn abortable_future_stops_when_aborted() {
        let fetch = Fetch::abortable(futures_util::future::pending::<Result<u8, FetchError>>());
        assert!(fetch.is_cancellable());

        let Fetch { outcome, abort } = fetch;
        abort.unwrap().abort();

        let Outcome::Pending(fut) = outcome else {
            panic!("expected a pending outcome");
        };
        assert!(fut.await.is_err());
    }
}
