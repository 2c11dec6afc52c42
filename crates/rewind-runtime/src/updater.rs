#![forbid(unsafe_code)]

//! Release scheduling strategies.
//!
//! After every reconcile pass the history asks its [`Updater`] to schedule a
//! release. The updater receives a [`Resolver`] and decides when to call it:
//! right away ([`Immediate`]) or on the owner's next frame ([`Deferred`]).
//! While a release is outstanding the history does not schedule another, so
//! any number of reconciles between two frames collapse into one `Release`
//! event.
//!
//! # Usage
//!
//! ```ignore
//! use rewind_runtime::{ActionHistory, HistoryConfig};
//!
//! let history: ActionHistory<u32> = ActionHistory::new(HistoryConfig::default().with_batch(true));
//! let a = history.append("fetch", None);
//! history.resolve(a, Some(1)); // reconcile runs now, release is queued
//! history.flush();             // `Release` fires here
//! ```

use std::cell::RefCell;
use std::collections::VecDeque;
use std::fmt;
use std::rc::Rc;

use tracing::{info, info_span};
use web_time::Instant;

use crate::config::HistoryConfig;

/// Zero-argument callback that completes one release cycle.
pub struct Resolver(Box<dyn FnOnce()>);

impl Resolver {
    /// Wrap a flush callback.
    pub fn new(flush: impl FnOnce() + 'static) -> Self {
        Self(Box::new(flush))
    }

    /// Run the flush.
    pub fn resolve(self) {
        (self.0)();
    }
}

impl fmt::Debug for Resolver {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Resolver").finish_non_exhaustive()
    }
}

/// Decides when a scheduled release is flushed.
///
/// `schedule` takes `&self` so an updater may be re-entered from inside a
/// release it just flushed.
pub trait Updater {
    /// Arrange for `resolver` to be called.
    fn schedule(&self, resolver: Resolver);

    /// Human-readable strategy name for logs/debugging.
    fn name(&self) -> &str;
}

/// Flushes every release synchronously.
#[derive(Debug, Clone, Copy, Default)]
pub struct Immediate;

impl Updater for Immediate {
    fn schedule(&self, resolver: Resolver) {
        resolver.resolve();
    }

    fn name(&self) -> &str {
        "Immediate"
    }
}

/// Queue of pending resolvers, flushed by whoever drives the frame loop.
///
/// Cloning shares the same queue.
#[derive(Clone, Default)]
pub struct FlushQueue {
    pending: Rc<RefCell<VecDeque<Resolver>>>,
}

impl fmt::Debug for FlushQueue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("FlushQueue")
            .field("pending", &self.pending())
            .finish()
    }
}

impl FlushQueue {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a resolver to the next flush.
    pub fn push(&self, resolver: Resolver) {
        self.pending.borrow_mut().push_back(resolver);
    }

    /// Number of resolvers waiting for a flush.
    #[must_use]
    pub fn pending(&self) -> usize {
        self.pending.borrow().len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.pending.borrow().is_empty()
    }

    /// Run every resolver queued before this call, oldest first.
    ///
    /// Resolvers queued while flushing wait for the next flush. Returns the
    /// number of resolvers run.
    pub fn flush(&self) -> usize {
        let batch: Vec<Resolver> = self.pending.borrow_mut().drain(..).collect();
        if batch.is_empty() {
            return 0;
        }

        let flushed = batch.len();
        let start = Instant::now();
        let _span = info_span!(
            target: "rewind.updater",
            "history.release",
            flushed = flushed as u64,
            duration_us = tracing::field::Empty
        )
        .entered();

        for resolver in batch {
            resolver.resolve();
        }

        let duration_us = start.elapsed().as_micros() as u64;
        tracing::Span::current().record("duration_us", duration_us);
        info!(
            target: "rewind.updater",
            history_release_duration_us = duration_us,
            flushed = flushed as u64,
            "history release flush"
        );

        flushed
    }
}

/// Holds releases on a [`FlushQueue`] until the owner flushes it.
#[derive(Debug, Clone, Default)]
pub struct Deferred {
    queue: FlushQueue,
}

impl Deferred {
    #[must_use]
    pub fn new(queue: FlushQueue) -> Self {
        Self { queue }
    }

    #[must_use]
    pub fn queue(&self) -> &FlushQueue {
        &self.queue
    }
}

impl Updater for Deferred {
    fn schedule(&self, resolver: Resolver) {
        self.queue.push(resolver);
        tracing::trace!(
            target: "rewind.updater",
            pending = self.queue.pending(),
            "release deferred"
        );
    }

    fn name(&self) -> &str {
        "Deferred"
    }
}

/// Pick the built-in updater for `config`.
///
/// `batch = true` defers releases onto `queue`; otherwise they flush
/// synchronously.
#[must_use]
pub fn configure(config: &HistoryConfig, queue: &FlushQueue) -> Rc<dyn Updater> {
    if config.batch {
        Rc::new(Deferred::new(queue.clone()))
    } else {
        Rc::new(Immediate)
    }
}
