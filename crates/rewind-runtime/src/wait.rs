#![forbid(unsafe_code)]

//! Completion signal for the active branch.
//!
//! [`Wait<P>`] settles once every action captured when it was created is
//! complete. It resolves with `Ok(())`, or fails with the [`Rejection`] of
//! the first rejected action in branch order. It can be awaited as a
//! [`Future`], polled with [`Wait::result`], or observed through
//! [`Wait::then`] callbacks.
//!
//! # Invariants
//!
//! 1. A `Wait` settles at most once. Later settle attempts are ignored.
//! 2. `then` callbacks registered after settlement run immediately.
//! 3. There is no cancellation: dropping every handle only stops observing.

use std::cell::RefCell;
use std::fmt;
use std::future::Future;
use std::pin::Pin;
use std::rc::Rc;
use std::task::{Context, Poll, Waker};

use rewind_core::{ActionId, Command};

/// The first rejected action found when a branch settled.
#[derive(Debug, Clone, PartialEq)]
pub struct Rejection<P> {
    /// The rejected action.
    pub action: ActionId,
    /// Its command.
    pub command: Command,
    /// Its rejection payload, if it carried one.
    pub payload: Option<P>,
}

impl<P> fmt::Display for Rejection<P> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} ({}) was rejected", self.action, self.command)
    }
}

impl<P: fmt::Debug> std::error::Error for Rejection<P> {}

/// Outcome of a settled [`Wait`].
pub type WaitResult<P> = Result<(), Rejection<P>>;

type SettleCallback<P> = Box<dyn FnOnce(&WaitResult<P>)>;

struct WaitState<P> {
    outcome: Option<WaitResult<P>>,
    waker: Option<Waker>,
    callbacks: Vec<SettleCallback<P>>,
}

/// Handle to a pending or settled branch completion.
///
/// Cloning shares the same state.
pub struct Wait<P> {
    state: Rc<RefCell<WaitState<P>>>,
}

impl<P> Clone for Wait<P> {
    fn clone(&self) -> Self {
        Self {
            state: Rc::clone(&self.state),
        }
    }
}

impl<P: fmt::Debug> fmt::Debug for Wait<P> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let state = self.state.borrow();
        f.debug_struct("Wait")
            .field("outcome", &state.outcome)
            .field("callbacks", &state.callbacks.len())
            .finish()
    }
}

impl<P: Clone + 'static> Wait<P> {
    pub(crate) fn pending() -> Self {
        Self {
            state: Rc::new(RefCell::new(WaitState {
                outcome: None,
                waker: None,
                callbacks: Vec::new(),
            })),
        }
    }

    /// Settle with `outcome`. Returns `false` if already settled.
    pub(crate) fn settle(&self, outcome: WaitResult<P>) -> bool {
        let (waker, callbacks) = {
            let mut state = self.state.borrow_mut();
            if state.outcome.is_some() {
                return false;
            }
            state.outcome = Some(outcome.clone());
            (state.waker.take(), std::mem::take(&mut state.callbacks))
        };

        if let Some(waker) = waker {
            waker.wake();
        }
        for callback in callbacks {
            callback(&outcome);
        }
        true
    }

    /// Whether the branch has settled.
    #[must_use]
    pub fn is_settled(&self) -> bool {
        self.state.borrow().outcome.is_some()
    }

    /// The outcome, once settled.
    #[must_use]
    pub fn result(&self) -> Option<WaitResult<P>> {
        self.state.borrow().outcome.clone()
    }

    /// Run `on_fulfilled` or `on_rejected` once the branch settles.
    pub fn then(
        self,
        on_fulfilled: impl FnOnce() + 'static,
        on_rejected: impl FnOnce(Rejection<P>) + 'static,
    ) -> Self {
        let callback: SettleCallback<P> = Box::new(move |outcome| match outcome {
            Ok(()) => on_fulfilled(),
            Err(rejection) => on_rejected(rejection.clone()),
        });

        let settled = self.state.borrow().outcome.clone();
        match settled {
            Some(outcome) => callback(&outcome),
            None => self.state.borrow_mut().callbacks.push(callback),
        }
        self
    }
}

impl<P: Clone + 'static> Future for Wait<P> {
    type Output = WaitResult<P>;

    fn poll(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Self::Output> {
        let mut state = self.state.borrow_mut();
        match &state.outcome {
            Some(outcome) => Poll::Ready(outcome.clone()),
            None => {
                state.waker = Some(cx.waker().clone());
                Poll::Pending
            }
        }
    }
}
