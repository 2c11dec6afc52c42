#![forbid(unsafe_code)]

//! Rewind Core
//!
//! Building blocks shared by the Rewind action history.
//!
//! # Key Components
//!
//! - [`ZipperTree`] - Appendable, pruneable tree with one focused path
//! - [`ActionArena`] - Owner of every [`Action`], addressed by [`ActionId`]
//! - [`Emitter`] - Ordered, per-instance observer list
//!
//! # Role in Rewind
//! `rewind-core` has no notion of reconciliation or batching. It provides
//! the structures `rewind-runtime` wires together into an
//! `ActionHistory`.

pub mod action;
pub mod emitter;
pub mod zipper;

pub use action::{Action, ActionArena, ActionId, Command, Status};
pub use emitter::{Emitter, Event, Listener, ListenerId};
pub use zipper::{NodeId, ZipperTree};
