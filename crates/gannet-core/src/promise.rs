//! Single-assignment asynchronous result cell.
//!
//! A [`Promise`] starts pending and is settled exactly once, either by
//! `resolve` or by `fail`. Completion callbacks fire once, in attachment
//! order, after settlement; attaching to an already-settled promise runs
//! the callback synchronously. Settling a second time is rejected with
//! [`AlreadySettled`] rather than overwriting the first outcome.
//!
//! Promises are also plain futures, so they compose with the rest of the
//! async machinery:
//!
//! ```ignore
//! let promise: Promise<u32> = Promise::new();
//! promise.resolve(7)?;
//! assert_eq!(promise.clone().await, Ok(7));
//! ```

use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;
use std::task::{Context, Poll, Waker};

use parking_lot::Mutex;

use crate::error::{AlreadySettled, Fault};

/// Final state of a settled [`Promise`].
#[derive(Debug, Clone)]
pub enum Settled<T> {
    Resolved(T),
    Failed(Fault),
}

type Callback<T> = Box<dyn FnOnce(&Settled<T>) + Send>;

enum State<T> {
    Pending {
        callbacks: Vec<Callback<T>>,
        wakers: Vec<Waker>,
    },
    Done(Settled<T>),
}

/// A shared handle to a single-assignment result cell.
///
/// Cloning yields another handle to the same cell; any handle may settle
/// it, observe it, or await it.
pub struct Promise<T> {
    shared: Arc<Mutex<State<T>>>,
}

impl<T> Clone for Promise<T> {
    fn clone(&self) -> Self {
        Self {
            shared: Arc::clone(&self.shared),
        }
    }
}

impl<T: Clone + Send + 'static> Promise<T> {
    /// Create a new promise in the pending state.
    pub fn new() -> Self {
        Self {
            shared: Arc::new(Mutex::new(State::Pending {
                callbacks: Vec::new(),
                wakers: Vec::new(),
            })),
        }
    }

    /// Transition to `resolved`.
    pub fn resolve(&self, value: T) -> Result<(), AlreadySettled> {
        self.settle(Settled::Resolved(value))
    }

    /// Transition to `failed`.
    ///
    /// The fault (and its cause, if any) is supplied explicitly by the
    /// caller at the failure site; there is no ambient error capture.
    pub fn fail(&self, fault: Fault) -> Result<(), AlreadySettled> {
        self.settle(Settled::Failed(fault))
    }

    fn settle(&self, outcome: Settled<T>) -> Result<(), AlreadySettled> {
        let (callbacks, wakers, snapshot) = {
            let mut state = self.shared.lock();
            let (callbacks, wakers) = match &mut *state {
                State::Done(_) => return Err(AlreadySettled),
                State::Pending { callbacks, wakers } => {
                    (std::mem::take(callbacks), std::mem::take(wakers))
                }
            };
            let snapshot = outcome.clone();
            *state = State::Done(outcome);
            (callbacks, wakers, snapshot)
        };

        // Callbacks run outside the lock, in attachment order.
        for callback in callbacks {
            callback(&snapshot);
        }
        for waker in wakers {
            waker.wake();
        }
        Ok(())
    }

    pub fn is_settled(&self) -> bool {
        matches!(&*self.shared.lock(), State::Done(_))
    }

    /// Attach a completion callback.
    ///
    /// Runs exactly once with the final state: synchronously right now if
    /// the promise is already settled, otherwise at settlement.
    pub fn on_complete<F>(&self, callback: F)
    where
        F: FnOnce(&Settled<T>) + Send + 'static,
    {
        let settled = {
            let mut state = self.shared.lock();
            match &mut *state {
                State::Pending { callbacks, .. } => {
                    callbacks.push(Box::new(callback));
                    return;
                }
                State::Done(settled) => settled.clone(),
            }
        };
        callback(&settled);
    }

    /// Derive a new promise by mapping this one's eventual value.
    ///
    /// When this promise resolves to `v`, the derived promise resolves to
    /// `f(v)`; an `Err` from `f` fails the derived promise with that new
    /// fault. If this promise fails, the failure propagates untouched and
    /// `f` never runs. Exactly one callback attaches to the source.
    ///
    /// # Panics
    ///
    /// Panics if the derived promise was settled out from under the
    /// combinator before the source settled.
    pub fn transform<U, F>(&self, f: F) -> Promise<U>
    where
        U: Clone + Send + 'static,
        F: FnOnce(T) -> Result<U, Fault> + Send + 'static,
    {
        let derived = Promise::new();
        let out = derived.clone();
        self.on_complete(move |settled| {
            let result = match settled {
                Settled::Resolved(value) => f(value.clone()),
                Settled::Failed(fault) => Err(fault.clone()),
            };
            match result {
                Ok(value) => out.resolve(value),
                Err(fault) => out.fail(fault),
            }
            .expect("derived promise settled twice");
        });
        derived
    }
}

impl<T: Clone + Send + 'static> Default for Promise<T> {
    fn default() -> Self {
        Self::new()
    }
}

impl<T: Clone + Send + 'static> Future for Promise<T> {
    type Output = Result<T, Fault>;

    fn poll(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Self::Output> {
        let mut state = self.shared.lock();
        match &mut *state {
            State::Done(Settled::Resolved(value)) => Poll::Ready(Ok(value.clone())),
            State::Done(Settled::Failed(fault)) => Poll::Ready(Err(fault.clone())),
            State::Pending { wakers, .. } => {
                if !wakers.iter().any(|w| w.will_wake(cx.waker())) {
                    wakers.push(cx.waker().clone());
                }
                Poll::Pending
            }
        }
    }
}
