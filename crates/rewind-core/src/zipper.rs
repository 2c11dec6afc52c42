#![forbid(unsafe_code)]

//! Single-focus zipper tree.
//!
//! [`ZipperTree<T>`] keeps every node it has ever appended in an arena keyed
//! by [`NodeId`], plus one focused node. The path from the root to the focus
//! is the active path; everything hanging off it to the side is history that
//! was forked away from.
//!
//! ```text
//!            root
//!             │
//!             a
//!           ┌─┴─┐
//!           c   b        children are newest-first: a.children = [c, b]
//!           │
//!         focus          forward() from `a` follows `c`, never `b`
//! ```
//!
//! # Invariants
//!
//! 1. A node appears in at most one parent's child list.
//! 2. `forward()` always follows `children[0]`, the most recently appended child.
//! 3. `prune()` never disposes the focus, so the active path never shrinks
//!    below the focus.
//! 4. `size()` and `root()` walk parent links on every call; nothing is cached.
//!
//! # Failure Modes
//!
//! - **Moving off an edge**: `back()` at the root or `forward()` at a leaf
//!   leaves the focus unchanged.
//! - **Stale ids**: ids of nodes freed by [`ZipperTree::collect_detached`]
//!   resolve to `None`.

use std::collections::HashMap;
use std::fmt;

/// Handle to a node inside a [`ZipperTree`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct NodeId(u64);

impl NodeId {
    /// Raw numeric value of the handle.
    #[must_use]
    pub const fn raw(self) -> u64 {
        self.0
    }
}

struct Node<T> {
    value: T,
    parent: Option<NodeId>,
    /// Newest first.
    children: Vec<NodeId>,
}

/// Mutable tree with a single focused path from root to focus.
pub struct ZipperTree<T> {
    nodes: HashMap<NodeId, Node<T>>,
    focus: Option<NodeId>,
    next_id: u64,
}

impl<T> Default for ZipperTree<T> {
    fn default() -> Self {
        Self::new()
    }
}

impl<T: fmt::Debug> fmt::Debug for ZipperTree<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ZipperTree")
            .field("focus", &self.focus)
            .field("size", &self.size())
            .field("allocated", &self.nodes.len())
            .finish()
    }
}

impl<T> ZipperTree<T> {
    /// Create an empty tree with no focus.
    #[must_use]
    pub fn new() -> Self {
        Self {
            nodes: HashMap::new(),
            focus: None,
            next_id: 0,
        }
    }

    /// Create a tree whose first node holds `anchor`.
    #[must_use]
    pub fn with_anchor(anchor: T) -> Self {
        let mut tree = Self::new();
        tree.append(anchor);
        tree
    }

    // ========================================================================
    // Navigation
    // ========================================================================

    /// The focused node, if any node has been appended.
    #[must_use]
    pub fn focus(&self) -> Option<NodeId> {
        self.focus
    }

    /// Move the focus to `node`. `None` and unknown ids keep the current focus.
    pub fn set_focus(&mut self, node: Option<NodeId>) {
        match node {
            Some(id) if self.nodes.contains_key(&id) => self.focus = Some(id),
            Some(id) => tracing::trace!(node = id.0, "zipper focus on unknown node ignored"),
            None => {}
        }
    }

    /// Move the focus to its parent.
    pub fn back(&mut self) {
        let target = self.focus.and_then(|id| self.parent(id));
        self.set_focus(target);
    }

    /// Move the focus to its most recently appended child.
    pub fn forward(&mut self) {
        let target = self.focus.and_then(|id| self.next(id));
        self.set_focus(target);
    }

    // ========================================================================
    // Mutation
    // ========================================================================

    /// Append `value` as the newest child of the focus and focus it.
    pub fn append(&mut self, value: T) -> NodeId {
        let id = NodeId(self.next_id);
        self.next_id += 1;

        let parent = self.focus;
        if let Some(parent_node) = parent.and_then(|p| self.nodes.get_mut(&p)) {
            parent_node.children.insert(0, id);
        }

        self.nodes.insert(
            id,
            Node {
                value,
                parent,
                children: Vec::new(),
            },
        );
        self.focus = Some(id);
        id
    }

    /// Dispose nodes from the root toward the focus while `predicate` holds.
    ///
    /// Each disposed node is freed and its children lose their parent link,
    /// so side branches float as independent sub-trees until
    /// [`collect_detached`](Self::collect_detached) reclaims them. The focus
    /// is never disposed. Returns the number of nodes disposed.
    pub fn prune(&mut self, mut predicate: impl FnMut(&T) -> bool) -> usize {
        let mut disposed = 0;

        for id in self.focus_path() {
            if Some(id) == self.focus {
                break;
            }
            let Some(node) = self.nodes.get(&id) else {
                break;
            };
            if !predicate(&node.value) {
                break;
            }
            self.dispose(id);
            disposed += 1;
        }

        disposed
    }

    /// Free every node that is not reachable from the current root.
    ///
    /// Returns the number of nodes freed.
    pub fn collect_detached(&mut self) -> usize {
        let Some(root) = self.root() else {
            let freed = self.nodes.len();
            self.nodes.clear();
            return freed;
        };

        let mut live = Vec::with_capacity(self.nodes.len());
        let mut stack = vec![root];
        while let Some(id) = stack.pop() {
            live.push(id);
            if let Some(node) = self.nodes.get(&id) {
                stack.extend(node.children.iter().copied());
            }
        }

        let before = self.nodes.len();
        self.nodes.retain(|id, _| live.contains(id));
        before - self.nodes.len()
    }

    fn dispose(&mut self, id: NodeId) {
        let Some(node) = self.nodes.remove(&id) else {
            return;
        };
        for child in node.children {
            if let Some(child_node) = self.nodes.get_mut(&child) {
                child_node.parent = None;
            }
        }
    }

    // ========================================================================
    // Queries
    // ========================================================================

    /// Fold `f` over the values from the root to the focus, inclusive.
    pub fn reduce<A>(&self, mut f: impl FnMut(A, &T) -> A, seed: A) -> A {
        self.focus_path()
            .into_iter()
            .filter_map(|id| self.get(id))
            .fold(seed, |acc, value| f(acc, value))
    }

    /// Ids from the root down to the focus, following parent links so a
    /// focus on an older branch is honoured.
    fn focus_path(&self) -> Vec<NodeId> {
        let mut path = Vec::new();
        let mut cursor = self.focus;
        while let Some(id) = cursor {
            path.push(id);
            cursor = self.parent(id);
        }
        path.reverse();
        path
    }

    /// Walk parent links from the focus to the topmost ancestor.
    #[must_use]
    pub fn root(&self) -> Option<NodeId> {
        let mut node = self.focus?;
        while let Some(parent) = self.parent(node) {
            node = parent;
        }
        Some(node)
    }

    /// Number of nodes from the focus up to the root, inclusive.
    #[must_use]
    pub fn size(&self) -> usize {
        let mut count = 0;
        let mut cursor = self.focus;
        while let Some(id) = cursor {
            count += 1;
            cursor = self.parent(id);
        }
        count
    }

    /// Number of nodes still allocated, including detached sub-trees.
    #[must_use]
    pub fn allocated(&self) -> usize {
        self.nodes.len()
    }

    /// Value stored at `id`.
    #[must_use]
    pub fn get(&self, id: NodeId) -> Option<&T> {
        self.nodes.get(&id).map(|node| &node.value)
    }

    /// Mutable value stored at `id`.
    pub fn get_mut(&mut self, id: NodeId) -> Option<&mut T> {
        self.nodes.get_mut(&id).map(|node| &mut node.value)
    }

    /// Parent of `id`.
    #[must_use]
    pub fn parent(&self, id: NodeId) -> Option<NodeId> {
        self.nodes.get(&id).and_then(|node| node.parent)
    }

    /// Most recently appended child of `id`.
    #[must_use]
    pub fn next(&self, id: NodeId) -> Option<NodeId> {
        self.nodes
            .get(&id)
            .and_then(|node| node.children.first().copied())
    }

    /// Children of `id`, newest first.
    #[must_use]
    pub fn children(&self, id: NodeId) -> &[NodeId] {
        self.nodes
            .get(&id)
            .map_or(&[], |node| node.children.as_slice())
    }
}
