//! Suspend Handle
//!
//! A [`Suspend`] is what a reader gets back when the value it asked for is not
//! there yet. The rendering layer holds onto it, awaits it, and retries the
//! read once it completes.
//!
//! Every resource creates exactly one suspend handle up front and hands out
//! clones of it, so repeated reads before settlement observe the same
//! placeholder. The handle completes when the resource loads or errors. If
//! the resource is disposed first, it never completes.

use std::fmt;
use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;
use std::task::{Context, Poll, Waker};

use parking_lot::Mutex;

#[derive(Default)]
struct SuspendState {
    released: bool,
    wakers: Vec<Waker>,
}

/// Referentially stable placeholder for a value that is still loading.
#[derive(Clone)]
pub struct Suspend {
    state: Arc<Mutex<SuspendState>>,
}

impl Suspend {
    pub(crate) fn new() -> Self {
        Self {
            state: Arc::default(),
        }
    }

    /// Wake everyone waiting on this handle. Later polls complete immediately.
    pub(crate) fn release(&self) {
        let wakers = {
            let mut state = self.state.lock();
            if state.released {
                return;
            }
            state.released = true;
            std::mem::take(&mut state.wakers)
        };

        for waker in wakers {
            waker.wake();
        }
    }

    /// Whether the owning resource has settled.
    pub fn is_released(&self) -> bool {
        self.state.lock().released
    }

    /// Whether two handles are the same placeholder.
    pub fn ptr_eq(&self, other: &Self) -> bool {
        Arc::ptr_eq(&self.state, &other.state)
    }
}

impl Future for Suspend {
    type Output = ();

    fn poll(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<()> {
        let mut state = self.state.lock();
        if state.released {
            return Poll::Ready(());
        }

        if !state.wakers.iter().any(|w| w.will_wake(cx.waker())) {
            state.wakers.push(cx.waker().clone());
        }
        Poll::Pending
    }
}

impl fmt::Debug for Suspend {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Suspend")
            .field("released", &self.is_released())
            .finish()
    }
}
