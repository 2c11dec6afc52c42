#![forbid(unsafe_code)]

//! Per-instance observer lists.
//!
//! An [`Emitter<E>`] keeps listeners in subscription order. Each listener
//! either watches one event kind or every event. There is no global
//! registry: whoever owns the emitter decides when events fire.
//!
//! # Re-entrancy
//!
//! Owners that hand out shared access (`Rc<RefCell<..>>`) should call
//! [`Emitter::listeners_for`] while borrowed, release the borrow, then invoke
//! the returned callbacks. Listeners are then free to subscribe, unsubscribe,
//! or mutate the owner. A listener removed during a dispatch still sees the
//! event that was already being dispatched.

use std::fmt;
use std::rc::Rc;

/// An event that can be filtered by kind.
pub trait Event {
    /// Discriminant used to route events to listeners.
    type Kind: Copy + Eq + fmt::Debug;

    /// Kind of this event.
    fn kind(&self) -> Self::Kind;
}

/// Handle returned by [`Emitter::on`], used to unsubscribe.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ListenerId(u64);

impl ListenerId {
    #[must_use]
    pub const fn raw(self) -> u64 {
        self.0
    }
}

/// Shared listener callback.
pub type Listener<E> = Rc<dyn Fn(&E)>;

struct Entry<E: Event> {
    id: ListenerId,
    kind: Option<E::Kind>,
    callback: Listener<E>,
}

/// Ordered list of listeners for events of type `E`.
pub struct Emitter<E: Event> {
    entries: Vec<Entry<E>>,
    next_id: u64,
}

impl<E: Event> Default for Emitter<E> {
    fn default() -> Self {
        Self::new()
    }
}

impl<E: Event> fmt::Debug for Emitter<E> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let kinds: Vec<Option<E::Kind>> = self.entries.iter().map(|entry| entry.kind).collect();
        f.debug_struct("Emitter")
            .field("listeners", &kinds)
            .finish()
    }
}

impl<E: Event> Emitter<E> {
    #[must_use]
    pub fn new() -> Self {
        Self {
            entries: Vec::new(),
            next_id: 0,
        }
    }

    /// Listen for events of one kind.
    pub fn on(&mut self, kind: E::Kind, callback: impl Fn(&E) + 'static) -> ListenerId {
        self.push(Some(kind), Rc::new(callback))
    }

    /// Listen for every event.
    pub fn on_any(&mut self, callback: impl Fn(&E) + 'static) -> ListenerId {
        self.push(None, Rc::new(callback))
    }

    fn push(&mut self, kind: Option<E::Kind>, callback: Listener<E>) -> ListenerId {
        let id = ListenerId(self.next_id);
        self.next_id += 1;
        self.entries.push(Entry { id, kind, callback });
        id
    }

    /// Remove a listener. Returns `false` if it was already gone.
    pub fn off(&mut self, id: ListenerId) -> bool {
        let before = self.entries.len();
        self.entries.retain(|entry| entry.id != id);
        self.entries.len() != before
    }

    /// Callbacks interested in `event`, in subscription order.
    #[must_use]
    pub fn listeners_for(&self, event: &E) -> Vec<Listener<E>> {
        let kind = event.kind();
        self.entries
            .iter()
            .filter(|entry| entry.kind.is_none_or(|k| k == kind))
            .map(|entry| Rc::clone(&entry.callback))
            .collect()
    }

    /// Call every interested listener synchronously.
    pub fn emit(&self, event: &E) {
        for callback in self.listeners_for(event) {
            callback(event);
        }
    }

    /// Number of registered listeners.
    #[must_use]
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Remove every listener.
    pub fn clear(&mut self) {
        self.entries.clear();
    }
}
