#![forbid(unsafe_code)]

//! Actions and the arena that owns them.
//!
//! An [`Action`] is one asynchronous operation tracked by the history: a
//! [`Command`] tag, a [`Status`], an optional payload, and its position in
//! the action tree. Actions never point at each other directly; `parent`,
//! `next` and `children` are [`ActionId`] handles into an [`ActionArena`].
//!
//! # Status lifecycle
//!
//! ```text
//! Inactive ──► Open ──► Loading ──► Resolve
//!    │          │          │    └─► Reject
//!    └──────────┴──────────┴──────► Cancel
//! ```
//!
//! Reaching `Resolve`, `Reject` or `Cancel` makes the action complete. A
//! complete action ignores any further transition.
//!
//! # Invariants
//!
//! 1. An id is handed out once per arena and never reused, even after `clear`.
//! 2. `child.parent == Some(p)` iff `p.children` contains `child`.
//! 3. `p.next`, when set, is one of `p.children`.
//! 4. `next` is non-owning: removing the node it names clears or bridges it.

use std::borrow::Cow;
use std::collections::HashMap;
use std::fmt;

use serde::{Deserialize, Serialize};
use web_time::{SystemTime, UNIX_EPOCH};

/// Unique identifier for an action inside an [`ActionArena`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ActionId(u64);

impl ActionId {
    /// Create an id from a raw value.
    #[must_use]
    pub const fn new(raw: u64) -> Self {
        Self(raw)
    }

    /// Get the raw id value.
    #[must_use]
    pub const fn raw(self) -> u64 {
        self.0
    }
}

impl fmt::Display for ActionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "action-{}", self.0)
    }
}

/// Tag naming what an action does.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Command(Cow<'static, str>);

impl Command {
    /// Sentinel parent created when a history starts from nothing.
    pub const BIRTH: Command = Command(Cow::Borrowed("$birth"));
    /// First action of every fresh history.
    pub const START: Command = Command(Cow::Borrowed("$start"));

    /// Create a command from a static or owned name.
    #[must_use]
    pub fn new(name: impl Into<Cow<'static, str>>) -> Self {
        Self(name.into())
    }

    /// Command name.
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Whether this is one of the history's own sentinel commands.
    #[must_use]
    pub fn is_lifecycle(&self) -> bool {
        *self == Self::BIRTH || *self == Self::START
    }
}

impl From<&'static str> for Command {
    fn from(name: &'static str) -> Self {
        Self::new(name)
    }
}

impl From<String> for Command {
    fn from(name: String) -> Self {
        Self::new(name)
    }
}

impl fmt::Display for Command {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Lifecycle status of an action.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Status {
    /// Created but not yet started.
    #[default]
    Inactive,
    /// Started.
    Open,
    /// In progress, possibly reporting intermediate payloads.
    Loading,
    /// Finished successfully.
    Resolve,
    /// Finished with an error payload.
    Reject,
    /// Abandoned before finishing.
    Cancel,
}

impl Status {
    /// Whether this status ends the lifecycle.
    #[must_use]
    pub const fn is_complete(self) -> bool {
        matches!(self, Self::Resolve | Self::Reject | Self::Cancel)
    }

    /// Lowercase status name.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Inactive => "inactive",
            Self::Open => "open",
            Self::Loading => "loading",
            Self::Resolve => "resolve",
            Self::Reject => "reject",
            Self::Cancel => "cancel",
        }
    }
}

impl fmt::Display for Status {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One tracked operation.
#[derive(Debug, Clone)]
pub struct Action<P> {
    id: ActionId,
    command: Command,
    status: Status,
    payload: Option<P>,
    disabled: bool,
    parent: Option<ActionId>,
    next: Option<ActionId>,
    children: Vec<ActionId>,
    timestamp_ms: u64,
}

impl<P> Action<P> {
    /// Arena handle of this action.
    #[must_use]
    pub fn id(&self) -> ActionId {
        self.id
    }

    /// Command the action was dispatched with.
    #[must_use]
    pub fn command(&self) -> &Command {
        &self.command
    }

    /// Current lifecycle status.
    #[must_use]
    pub fn status(&self) -> Status {
        self.status
    }

    /// Whether the action currently has `status`.
    #[must_use]
    pub fn is(&self, status: Status) -> bool {
        self.status == status
    }

    /// Whether the status is `Resolve`, `Reject` or `Cancel`.
    #[must_use]
    pub fn is_complete(&self) -> bool {
        self.status.is_complete()
    }

    /// Payload carried by the last status change, if any.
    #[must_use]
    pub fn payload(&self) -> Option<&P> {
        self.payload.as_ref()
    }

    /// Disabled actions stay in history but reducers are expected to skip them.
    #[must_use]
    pub fn is_disabled(&self) -> bool {
        self.disabled
    }

    /// Structural predecessor, kept across forks.
    #[must_use]
    pub fn parent(&self) -> Option<ActionId> {
        self.parent
    }

    /// Successor on the active branch.
    #[must_use]
    pub fn next(&self) -> Option<ActionId> {
        self.next
    }

    /// Every structural child, oldest first.
    #[must_use]
    pub fn children(&self) -> &[ActionId] {
        &self.children
    }

    /// Creation time in Unix milliseconds.
    #[must_use]
    pub fn timestamp_ms(&self) -> u64 {
        self.timestamp_ms
    }
}

fn now_unix_ms() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map_or(0, |elapsed| elapsed.as_millis() as u64)
}

/// Owner of every action in a history.
pub struct ActionArena<P> {
    actions: HashMap<ActionId, Action<P>>,
    next_id: u64,
}

impl<P> Default for ActionArena<P> {
    fn default() -> Self {
        Self::new()
    }
}

impl<P> fmt::Debug for ActionArena<P> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ActionArena")
            .field("allocated", &self.actions.len())
            .field("next_id", &self.next_id)
            .finish()
    }
}

impl<P> ActionArena<P> {
    #[must_use]
    pub fn new() -> Self {
        Self {
            actions: HashMap::new(),
            next_id: 1,
        }
    }

    /// Allocate a detached action, optionally starting in `status`.
    pub fn create(&mut self, command: Command, status: Option<Status>) -> ActionId {
        let id = ActionId(self.next_id);
        self.next_id += 1;
        self.actions.insert(
            id,
            Action {
                id,
                command,
                status: status.unwrap_or_default(),
                payload: None,
                disabled: false,
                parent: None,
                next: None,
                children: Vec::new(),
                timestamp_ms: now_unix_ms(),
            },
        );
        id
    }

    #[must_use]
    pub fn get(&self, id: ActionId) -> Option<&Action<P>> {
        self.actions.get(&id)
    }

    #[must_use]
    pub fn contains(&self, id: ActionId) -> bool {
        self.actions.contains_key(&id)
    }

    /// Number of allocated actions, sentinels included.
    #[must_use]
    pub fn len(&self) -> usize {
        self.actions.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.actions.is_empty()
    }

    /// Free every action. Ids keep counting from where they were.
    pub fn clear(&mut self) {
        self.actions.clear();
    }

    /// Whether the action is complete. Freed actions count as complete.
    #[must_use]
    pub fn is_complete(&self, id: ActionId) -> bool {
        self.get(id).is_none_or(Action::is_complete)
    }

    #[must_use]
    pub fn parent(&self, id: ActionId) -> Option<ActionId> {
        self.get(id).and_then(|action| action.parent)
    }

    #[must_use]
    pub fn next(&self, id: ActionId) -> Option<ActionId> {
        self.get(id).and_then(|action| action.next)
    }

    /// An action without a parent, or one that was freed, is disconnected.
    #[must_use]
    pub fn is_disconnected(&self, id: ActionId) -> bool {
        self.parent(id).is_none()
    }

    // ========================================================================
    // Wiring
    // ========================================================================

    /// Make `next` the active successor of `parent`.
    pub fn lead(&mut self, parent: ActionId, next: ActionId) {
        if let Some(action) = self.actions.get_mut(&parent) {
            action.next = Some(next);
        }
        self.adopt(parent, next);
    }

    /// Attach `child` under `parent` without making it the successor.
    pub fn adopt(&mut self, parent: ActionId, child: ActionId) {
        if !self.actions.contains_key(&parent) {
            return;
        }
        let previous = match self.actions.get_mut(&child) {
            Some(action) => action.parent.replace(parent),
            None => return,
        };
        if let Some(previous) = previous.filter(|p| *p != parent) {
            self.abandon(previous, child);
        }
        if let Some(action) = self.actions.get_mut(&parent)
            && !action.children.contains(&child)
        {
            action.children.push(child);
        }
    }

    /// Drop `child` from `parent`'s children, clearing `next` if it pointed there.
    pub fn abandon(&mut self, parent: ActionId, child: ActionId) {
        if let Some(action) = self.actions.get_mut(&parent) {
            action.children.retain(|c| *c != child);
            if action.next == Some(child) {
                action.next = None;
            }
        }
    }

    /// Overwrite the active successor without touching the child list.
    pub fn set_next(&mut self, parent: ActionId, next: Option<ActionId>) {
        if let Some(action) = self.actions.get_mut(&parent) {
            action.next = next;
        }
    }

    /// Flip the disabled flag. Returns the new value, or `None` if freed.
    pub fn toggle(&mut self, id: ActionId) -> Option<bool> {
        let action = self.actions.get_mut(&id)?;
        action.disabled = !action.disabled;
        Some(action.disabled)
    }

    /// Move to `status`, replacing the payload when one is given.
    ///
    /// Returns `false` when the action is freed or already complete.
    pub fn transition(&mut self, id: ActionId, status: Status, payload: Option<P>) -> bool {
        let Some(action) = self.actions.get_mut(&id) else {
            return false;
        };
        if action.is_complete() {
            return false;
        }
        action.status = status;
        if payload.is_some() {
            action.payload = payload;
        }
        true
    }

    // ========================================================================
    // Detaching
    // ========================================================================

    /// Free `id`, handing its children to its parent.
    ///
    /// If the parent's `next` pointed at the removed action it now points at
    /// the removed action's `next`, so the branch stays connected.
    pub fn remove(&mut self, id: ActionId) -> Option<Action<P>> {
        let removed = self.actions.remove(&id)?;

        if let Some(parent) = removed.parent
            && let Some(action) = self.actions.get_mut(&parent)
        {
            action.children.retain(|c| *c != id);
            if action.next == Some(id) {
                action.next = removed.next;
            }
        }

        for child in &removed.children {
            if let Some(action) = self.actions.get_mut(child) {
                action.parent = None;
            }
            if let Some(parent) = removed.parent {
                self.adopt(parent, *child);
            }
        }

        Some(removed)
    }

    /// Cut `root.parent` loose from its own parent and free everything above.
    ///
    /// `root.parent` survives as a parentless sentinel so the root keeps a
    /// defined predecessor. The severed ancestors and every branch hanging
    /// off them are freed. Returns the number of actions freed.
    pub fn prune(&mut self, root: ActionId) -> usize {
        let Some(parent) = self.parent(root) else {
            return 0;
        };
        let Some(grandparent) = self.parent(parent) else {
            return 0;
        };

        self.abandon(grandparent, parent);
        if let Some(action) = self.actions.get_mut(&parent) {
            action.parent = None;
        }

        let mut top = grandparent;
        while let Some(up) = self.parent(top) {
            top = up;
        }
        self.free_subtree(top)
    }

    fn free_subtree(&mut self, top: ActionId) -> usize {
        let mut freed = 0;
        let mut stack = vec![top];
        while let Some(id) = stack.pop() {
            if let Some(action) = self.actions.remove(&id) {
                freed += 1;
                stack.extend(action.children);
            }
        }
        freed
    }
}
