#![forbid(unsafe_code)]

//! Branching, time-travelable action history.
//!
//! [`ActionHistory<P>`] records every action an application dispatches and
//! turns status changes into an ordered stream of `Update` events that a
//! state container replays into its reducers.
//!
//! # Shape
//!
//! ```text
//!   $birth ◄── root ──► a ──► b ──► head        active branch (via `next`)
//!                       │
//!                       └──► x ──► y            abandoned fork (parent links only)
//! ```
//!
//! `root` is the oldest retained action, `head` the newest. `size` counts
//! the actions from `root` to `head` inclusive. Anything hanging off the
//! active branch is a fork left behind by [`ActionHistory::checkout`].
//!
//! # Invariants
//!
//! 1. Following `next` from `root` reaches `head`.
//! 2. `size` equals the number of actions from `root` to `head`. It is
//!    recounted after checkout instead of being adjusted incrementally.
//! 3. At least one action is always retained (`limit >= 1`).
//! 4. Archival only drops complete actions. An incomplete root stops it.
//! 5. `Update` events of one pass are ascending: parents before children.
//! 6. At most one release is outstanding. Further reconciles coalesce into it.
//!
//! # Re-entrancy
//!
//! The history is a cheap handle around shared state. No borrow is held
//! while listeners or the updater run, so listeners may append, resolve,
//! or check out from inside an event.
//!
//! # Failure Modes
//!
//! - **Reconciling a freed action** panics. It means an id outlived its
//!   action, which is a caller bug.
//! - **Structural no-ops** (removing a disconnected action, changing a
//!   complete one, checking out a freed id) leave the history unchanged.

use std::cell::{Cell, RefCell};
use std::fmt;
use std::rc::Rc;

use tracing::{debug, debug_span, trace};
use web_time::Instant;

use rewind_core::{Action, ActionArena, ActionId, Command, Emitter, Event, ListenerId, Status};

use crate::config::HistoryConfig;
use crate::snapshot::{ActionTree, HistorySnapshot};
use crate::updater::{self, FlushQueue, Resolver, Updater};
use crate::wait::{Rejection, Wait, WaitResult};

/// Something that happened to the history.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HistoryEvent {
    /// An action was appended and wired in as the new head.
    Append(ActionId),
    /// Recompute state from this action; fired once per action per pass.
    Update(ActionId),
    /// An action left the history.
    Remove(ActionId),
    /// A reconcile pass finished. Carries the action it started from.
    Reconcile(ActionId),
    /// A batch of reconciles was flushed.
    Release,
}

/// Discriminant of [`HistoryEvent`] used to subscribe.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum EventKind {
    Append,
    Update,
    Remove,
    Reconcile,
    Release,
}

impl Event for HistoryEvent {
    type Kind = EventKind;

    fn kind(&self) -> EventKind {
        match self {
            Self::Append(_) => EventKind::Append,
            Self::Update(_) => EventKind::Update,
            Self::Remove(_) => EventKind::Remove,
            Self::Reconcile(_) => EventKind::Reconcile,
            Self::Release => EventKind::Release,
        }
    }
}

impl HistoryEvent {
    /// Action the event refers to, if any.
    #[must_use]
    pub fn action(&self) -> Option<ActionId> {
        match *self {
            Self::Append(id) | Self::Update(id) | Self::Remove(id) | Self::Reconcile(id) => {
                Some(id)
            }
            Self::Release => None,
        }
    }
}

struct HistoryInner<P> {
    actions: ActionArena<P>,
    emitter: Emitter<HistoryEvent>,
    head: Option<ActionId>,
    root: Option<ActionId>,
    size: usize,
    limit: usize,
    /// A release is scheduled but not yet flushed.
    releasing: bool,
    updater: Rc<dyn Updater>,
    queue: FlushQueue,
    config: HistoryConfig,
}

impl<P> HistoryInner<P> {
    fn is_active(&self, id: ActionId) -> bool {
        let mut cursor = Some(id);
        while let Some(current) = cursor {
            if Some(current) == self.head {
                return true;
            }
            cursor = self.actions.next(current);
        }
        false
    }

    fn shared_root(&self, id: ActionId) -> Option<ActionId> {
        let mut cursor = Some(id).filter(|id| self.actions.contains(*id));
        while let Some(current) = cursor {
            if self.is_active(current) {
                return Some(current);
            }
            cursor = self.actions.parent(current);
        }
        None
    }

    fn branch(&self) -> Vec<ActionId> {
        let mut items = Vec::with_capacity(self.size);
        let mut cursor = self.root;
        while let Some(id) = cursor {
            items.push(id);
            if Some(id) == self.head {
                break;
            }
            cursor = self.actions.next(id);
        }
        items
    }

    fn recount(&mut self) {
        let mut cursor = self.head;
        let mut size = 1;
        while let Some(id) = cursor {
            if Some(id) == self.root {
                break;
            }
            cursor = self.actions.parent(id);
            size += 1;
        }
        self.size = size;
    }
}

/// Shared handle to an action history.
///
/// Cloning creates a new handle to the **same** history.
pub struct ActionHistory<P> {
    inner: Rc<RefCell<HistoryInner<P>>>,
}

impl<P> Clone for ActionHistory<P> {
    fn clone(&self) -> Self {
        Self {
            inner: Rc::clone(&self.inner),
        }
    }
}

impl<P> fmt::Debug for ActionHistory<P> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let inner = self.inner.borrow();
        f.debug_struct("ActionHistory")
            .field("head", &inner.head)
            .field("root", &inner.root)
            .field("size", &inner.size)
            .field("limit", &inner.limit)
            .field("releasing", &inner.releasing)
            .field("updater", &inner.updater.name())
            .field("listeners", &inner.emitter.len())
            .finish()
    }
}

impl<P: Clone + 'static> Default for ActionHistory<P> {
    fn default() -> Self {
        Self::new(HistoryConfig::default())
    }
}

impl<P: Clone + 'static> ActionHistory<P> {
    /// Create a history using the built-in updater selected by `config.batch`.
    #[must_use]
    pub fn new(config: HistoryConfig) -> Self {
        let queue = FlushQueue::new();
        let updater = updater::configure(&config, &queue);
        Self::build(config, updater, queue)
    }

    /// Create a history with a custom release strategy.
    #[must_use]
    pub fn with_updater(config: HistoryConfig, updater: Rc<dyn Updater>) -> Self {
        Self::build(config, updater, FlushQueue::new())
    }

    fn build(config: HistoryConfig, updater: Rc<dyn Updater>, queue: FlushQueue) -> Self {
        let history = Self {
            inner: Rc::new(RefCell::new(HistoryInner {
                actions: ActionArena::new(),
                emitter: Emitter::new(),
                head: None,
                root: None,
                size: 0,
                limit: config.limit(),
                releasing: false,
                updater,
                queue,
                config,
            })),
        };
        history.begin();
        history
    }

    // ========================================================================
    // Events
    // ========================================================================

    /// Listen for one kind of event.
    pub fn on(&self, kind: EventKind, handler: impl Fn(&HistoryEvent) + 'static) -> ListenerId {
        self.inner.borrow_mut().emitter.on(kind, handler)
    }

    /// Listen for every event.
    pub fn on_any(&self, handler: impl Fn(&HistoryEvent) + 'static) -> ListenerId {
        self.inner.borrow_mut().emitter.on_any(handler)
    }

    /// Stop listening. Returns `false` if the listener was already removed.
    pub fn off(&self, listener: ListenerId) -> bool {
        self.inner.borrow_mut().emitter.off(listener)
    }

    fn emit(&self, event: HistoryEvent) {
        let listeners = self.inner.borrow().emitter.listeners_for(&event);
        for listener in listeners {
            listener(&event);
        }
    }

    // ========================================================================
    // Queries
    // ========================================================================

    /// Newest action on the active branch.
    #[must_use]
    pub fn head(&self) -> Option<ActionId> {
        self.inner.borrow().head
    }

    /// Oldest retained action on the active branch.
    #[must_use]
    pub fn root(&self) -> Option<ActionId> {
        self.inner.borrow().root
    }

    /// Number of actions from root to head, inclusive.
    #[must_use]
    pub fn size(&self) -> usize {
        self.inner.borrow().size
    }

    /// Retention ceiling for completed actions.
    #[must_use]
    pub fn limit(&self) -> usize {
        self.inner.borrow().limit
    }

    #[must_use]
    pub fn config(&self) -> HistoryConfig {
        self.inner.borrow().config.clone()
    }

    /// Whether a release is scheduled but not yet flushed.
    #[must_use]
    pub fn is_releasing(&self) -> bool {
        self.inner.borrow().releasing
    }

    /// A copy of the action, if it is still allocated.
    #[must_use]
    pub fn action(&self, id: ActionId) -> Option<Action<P>> {
        self.inner.borrow().actions.get(id).cloned()
    }

    /// Number of allocated actions, including sentinels and forks.
    #[must_use]
    pub fn allocated(&self) -> usize {
        self.inner.borrow().actions.len()
    }

    /// Whether following `next` from `id` reaches the head.
    #[must_use]
    pub fn is_active(&self, id: ActionId) -> bool {
        self.inner.borrow().is_active(id)
    }

    /// Closest ancestor of `id` (or `id` itself) on the active branch.
    #[must_use]
    pub fn shared_root(&self, id: ActionId) -> Option<ActionId> {
        self.inner.borrow().shared_root(id)
    }

    /// Whether `id` is freed or has no parent.
    #[must_use]
    pub fn is_disconnected(&self, id: ActionId) -> bool {
        self.inner.borrow().actions.is_disconnected(id)
    }

    /// The active branch from root to head.
    #[must_use]
    pub fn to_array(&self) -> Vec<ActionId> {
        self.inner.borrow().branch()
    }

    /// Map `f` over the active branch from root to head.
    ///
    /// # Panics
    ///
    /// Panics if `f` mutates this history.
    pub fn map<R>(&self, f: impl FnMut(&Action<P>) -> R) -> Vec<R> {
        let inner = self.inner.borrow();
        inner
            .branch()
            .into_iter()
            .filter_map(|id| inner.actions.get(id))
            .map(f)
            .collect()
    }

    /// Snapshot of `{ head, root, size, tree }`.
    #[must_use]
    pub fn snapshot(&self) -> HistorySnapshot<P> {
        let inner = self.inner.borrow();
        HistorySnapshot {
            head: inner.head,
            root: inner.root,
            size: inner.size,
            tree: inner
                .root
                .and_then(|root| ActionTree::build(&inner.actions, root)),
        }
    }

    /// Serialize the history to JSON.
    pub fn to_json(&self) -> serde_json::Result<serde_json::Value>
    where
        P: serde::Serialize,
    {
        serde_json::to_value(self.snapshot())
    }

    // ========================================================================
    // Building history
    // ========================================================================

    /// Restart history from a single resolved start action.
    pub fn begin(&self) {
        {
            let mut inner = self.inner.borrow_mut();
            inner.head = None;
            inner.root = None;
            inner.size = 0;
            inner.actions.clear();
        }
        self.append(Command::START, Some(Status::Resolve));
    }

    /// Append a new action as the head of the active branch.
    ///
    /// The first action of a fresh history gets a resolved `$birth` parent so
    /// the root always has a predecessor.
    pub fn append(&self, command: impl Into<Command>, status: Option<Status>) -> ActionId {
        let id = {
            let mut inner = self.inner.borrow_mut();
            let id = inner.actions.create(command.into(), status);

            match inner.head {
                Some(head) => inner.actions.lead(head, id),
                None => {
                    let birth = inner.actions.create(Command::BIRTH, Some(Status::Resolve));
                    inner.actions.adopt(birth, id);
                    inner.root = Some(id);
                }
            }

            inner.head = Some(id);
            inner.size += 1;
            trace!(target: "rewind.history", action = id.raw(), size = inner.size, "action appended");
            id
        };

        self.emit(HistoryEvent::Append(id));
        id
    }

    // ========================================================================
    // Status changes
    // ========================================================================

    /// Move `id` to `status` and reconcile from it.
    ///
    /// Returns `false`, without reconciling, when the action is freed or
    /// already complete.
    pub fn set_status(&self, id: ActionId, status: Status, payload: Option<P>) -> bool {
        let changed = self
            .inner
            .borrow_mut()
            .actions
            .transition(id, status, payload);

        if changed {
            self.reconcile(id);
        } else {
            trace!(target: "rewind.history", action = id.raw(), %status, "status change ignored");
        }
        changed
    }

    pub fn open(&self, id: ActionId, payload: Option<P>) -> bool {
        self.set_status(id, Status::Open, payload)
    }

    /// Report progress; the action enters `Loading`.
    pub fn update(&self, id: ActionId, payload: Option<P>) -> bool {
        self.set_status(id, Status::Loading, payload)
    }

    pub fn resolve(&self, id: ActionId, payload: Option<P>) -> bool {
        self.set_status(id, Status::Resolve, payload)
    }

    pub fn reject(&self, id: ActionId, payload: Option<P>) -> bool {
        self.set_status(id, Status::Reject, payload)
    }

    pub fn cancel(&self, id: ActionId) -> bool {
        self.set_status(id, Status::Cancel, None)
    }

    // ========================================================================
    // Time travel
    // ========================================================================

    /// Make `action` the head, forking away from the current branch.
    ///
    /// `None` keeps the current head and replays it. The `next` pointers from
    /// the new head back to the shared root are rewritten so the active
    /// branch leads to the new head; the old branch past the shared root is
    /// only reachable through its own parent links afterwards.
    ///
    /// An action with no ancestor on the active branch (a freed id, or a
    /// parentless sentinel nothing leads from) leaves the history untouched.
    pub fn checkout(&self, action: Option<ActionId>) {
        let shared = {
            let mut inner = self.inner.borrow_mut();
            let shared = match action {
                Some(id) => {
                    let Some(shared) = inner.shared_root(id) else {
                        trace!(target: "rewind.history", action = id.raw(), "checkout without shared root ignored");
                        return;
                    };
                    inner.head = Some(id);
                    Some(shared)
                }
                None => inner.head,
            };

            let mut cursor = inner.head;
            while let Some(id) = cursor {
                if Some(id) == shared {
                    break;
                }
                let parent = inner.actions.parent(id);
                if let Some(parent) = parent {
                    inner.actions.set_next(parent, Some(id));
                }
                cursor = parent;
            }

            // A fork that leaves the retained window re-roots at the fork point.
            if let Some(root) = inner.root
                && !inner.is_active(root)
            {
                inner.root = shared;
            }

            inner.recount();
            trace!(
                target: "rewind.history",
                head = ?inner.head,
                shared_root = ?shared,
                size = inner.size,
                "history checkout"
            );
            shared
        };

        if let Some(shared) = shared {
            self.reconcile(shared);
        }
    }

    /// Flip the disabled flag of every action in `actions`, then reconcile
    /// once from the earliest of them on the active branch.
    pub fn toggle(&self, actions: &[ActionId]) {
        let earliest = {
            let mut inner = self.inner.borrow_mut();
            for id in actions {
                inner.actions.toggle(*id);
            }
            let branch = inner.branch();
            actions
                .iter()
                .filter_map(|id| branch.iter().position(|candidate| candidate == id))
                .min()
                .map(|index| branch[index])
        };

        if let Some(earliest) = earliest {
            self.reconcile(earliest);
        }
    }

    /// Recompute `size` by walking parents from head to root.
    pub fn set_size(&self) {
        self.inner.borrow_mut().recount();
    }

    // ========================================================================
    // Removal
    // ========================================================================

    /// Remove one action, bridging its neighbours together.
    ///
    /// Disconnected actions are ignored. Removing the last action restarts
    /// history. Removing an enabled action from the active branch reconciles
    /// from the action that now fills the gap.
    pub fn remove(&self, id: ActionId) {
        let (parent, next, was_active, disabled) = {
            let inner = self.inner.borrow();
            if inner.actions.is_disconnected(id) {
                trace!(target: "rewind.history", action = id.raw(), "remove of disconnected action ignored");
                return;
            }
            let disabled = inner.actions.get(id).is_some_and(Action::is_disabled);
            (
                inner.actions.parent(id),
                inner.actions.next(id),
                inner.is_active(id),
                disabled,
            )
        };

        self.clean(id, was_active);

        if self.size() == 0 {
            self.begin();
            return;
        }

        let bridge = {
            let mut inner = self.inner.borrow_mut();
            if inner.head == Some(id) {
                inner.head = parent;
                parent
            } else {
                if inner.root == Some(id) {
                    inner.root = next;
                }
                next
            }
        };

        if let Some(bridge) = bridge
            && was_active
            && !disabled
        {
            self.reconcile(bridge);
        }
    }

    fn clean(&self, id: ActionId, counted: bool) {
        if counted {
            let mut inner = self.inner.borrow_mut();
            inner.size = inner.size.saturating_sub(1);
        }

        self.emit(HistoryEvent::Remove(id));

        self.inner.borrow_mut().actions.remove(id);
        debug!(target: "rewind.history", action = id.raw(), size = self.size(), "action removed");
    }

    // ========================================================================
    // Reconciliation
    // ========================================================================

    /// Emit `Update` for `origin` and every action after it up to the head,
    /// then archive, emit `Reconcile(origin)` and queue a release.
    ///
    /// # Panics
    ///
    /// Panics if the history has no head or `origin` is not allocated.
    pub fn reconcile(&self, origin: ActionId) {
        {
            let inner = self.inner.borrow();
            assert!(inner.head.is_some(), "history should always have a head action");
            assert!(
                inner.actions.contains(origin),
                "history should never reconcile a freed action ({origin})"
            );
        }

        let start = Instant::now();
        let span = debug_span!(
            target: "rewind.history",
            "history.reconcile",
            origin = origin.raw(),
            walked = tracing::field::Empty,
            duration_us = tracing::field::Empty
        );
        let _guard = span.enter();

        let mut walked = 0u64;
        let mut focus = Some(origin);
        while let Some(id) = focus {
            self.emit(HistoryEvent::Update(id));
            walked += 1;

            let inner = self.inner.borrow();
            if inner.head == Some(id) {
                break;
            }
            focus = inner.actions.next(id);
        }

        self.archive();
        self.emit(HistoryEvent::Reconcile(origin));
        self.queue_release();

        span.record("walked", walked);
        span.record("duration_us", start.elapsed().as_micros() as u64);
    }

    /// Drop completed actions beyond the retention limit.
    ///
    /// For every step the root advances, `Remove` is emitted for the old
    /// root's parent. The old root stays allocated as the new root's parent
    /// until a later pass archives past it.
    ///
    /// `root` and `size` are settled and the severed ancestors freed before
    /// any `Remove` is emitted, so listeners see the archived tree.
    pub fn archive(&self) {
        let removed = {
            let mut inner = self.inner.borrow_mut();
            let before = inner.root;
            let mut removed = Vec::new();

            while inner.size > inner.limit {
                let Some(current) = inner.root else {
                    break;
                };
                if !inner.actions.get(current).is_some_and(Action::is_complete) {
                    break;
                }
                inner.size -= 1;
                removed.extend(inner.actions.parent(current));
                inner.root = inner.actions.next(current);
            }

            let root = inner.root;
            if root == before {
                return;
            }

            let freed = root.map_or(0, |root| inner.actions.prune(root));
            if !removed.is_empty() {
                debug!(
                    target: "rewind.history",
                    archived = removed.len(),
                    freed,
                    size = inner.size,
                    "history archived"
                );
            }
            removed
        };

        for id in removed {
            self.emit(HistoryEvent::Remove(id));
        }
    }

    // ========================================================================
    // Release batching
    // ========================================================================

    /// Schedule a release unless one is already outstanding.
    pub fn queue_release(&self) {
        let updater = {
            let mut inner = self.inner.borrow_mut();
            if inner.releasing {
                return;
            }
            inner.releasing = true;
            Rc::clone(&inner.updater)
        };

        let weak = Rc::downgrade(&self.inner);
        updater.schedule(Resolver::new(move || {
            if let Some(inner) = weak.upgrade() {
                ActionHistory { inner }.close_release();
            }
        }));
    }

    /// Finish the outstanding release and emit `Release`.
    pub fn close_release(&self) {
        self.inner.borrow_mut().releasing = false;
        self.emit(HistoryEvent::Release);
    }

    /// Flush releases held by this history's built-in deferred updater.
    ///
    /// Returns the number of releases flushed. Custom updaters are flushed by
    /// whoever owns them.
    pub fn flush(&self) -> usize {
        let queue = self.inner.borrow().queue.clone();
        queue.flush()
    }

    // ========================================================================
    // Completion
    // ========================================================================

    /// Settle once every action on the current branch is complete.
    ///
    /// Fails with the first rejected action in branch order. If nothing is
    /// outstanding and no release is pending, the result is available
    /// immediately.
    pub fn wait(&self) -> Wait<P> {
        let actions = self.to_array();
        let wait = Wait::pending();

        if !self.is_releasing() && self.try_settle(&actions, &wait) {
            return wait;
        }

        let slot: Rc<Cell<Option<ListenerId>>> = Rc::new(Cell::new(None));
        let weak = Rc::downgrade(&self.inner);
        let pending = wait.clone();
        let listener_slot = Rc::clone(&slot);

        let listener = self.on(EventKind::Release, move |_| {
            let Some(inner) = weak.upgrade() else {
                return;
            };
            let history = ActionHistory { inner };
            if history.try_settle(&actions, &pending)
                && let Some(listener) = listener_slot.take()
            {
                history.off(listener);
            }
        });
        slot.set(Some(listener));

        wait
    }

    /// Chain callbacks off [`wait`](Self::wait).
    pub fn then(
        &self,
        on_fulfilled: impl FnOnce() + 'static,
        on_rejected: impl FnOnce(Rejection<P>) + 'static,
    ) -> Wait<P> {
        self.wait().then(on_fulfilled, on_rejected)
    }

    fn try_settle(&self, actions: &[ActionId], wait: &Wait<P>) -> bool {
        let outcome: WaitResult<P> = {
            let inner = self.inner.borrow();
            if !actions.iter().all(|id| inner.actions.is_complete(*id)) {
                return false;
            }
            let rejected = actions
                .iter()
                .filter_map(|id| inner.actions.get(*id))
                .find(|action| action.is(Status::Reject));
            match rejected {
                Some(action) => Err(Rejection {
                    action: action.id(),
                    command: action.command().clone(),
                    payload: action.payload().cloned(),
                }),
                None => Ok(()),
            }
        };

        wait.settle(outcome);
        true
    }
}
