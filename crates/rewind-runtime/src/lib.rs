#![forbid(unsafe_code)]

//! Rewind Runtime
//!
//! Turns the structures in `rewind-core` into a working action history.
//!
//! # Key Components
//!
//! - [`ActionHistory`] - Branching history with reconcile, archive and checkout
//! - [`HistoryEvent`] - `Append`/`Update`/`Remove`/`Reconcile`/`Release` stream
//! - [`Updater`] - Release strategy; [`Immediate`] or [`Deferred`]
//! - [`Wait`] - Completion signal for the active branch
//! - [`HistoryConfig`] - Retention and batching options
//! - [`HistorySnapshot`] - Serializable `{ head, root, size, tree }` view
//!
//! # Role in Rewind
//! A state container appends an action for every dispatched command, replays
//! its reducers on each `Update` event, and repaints on `Release`.

pub mod config;
pub mod history;
pub mod snapshot;
pub mod updater;
pub mod wait;

pub use config::{HistoryConfig, HistoryConfigError};
pub use history::{ActionHistory, EventKind, HistoryEvent};
pub use snapshot::{ActionTree, HistorySnapshot};
pub use updater::{Deferred, FlushQueue, Immediate, Resolver, Updater, configure};
pub use wait::{Rejection, Wait, WaitResult};

pub use rewind_core::{Action, ActionId, Command, Event, ListenerId, Status};
