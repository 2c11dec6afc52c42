#![forbid(unsafe_code)]

//! Serializable view of a history.

use serde::{Deserialize, Serialize};

use rewind_core::{ActionArena, ActionId, Command, Status};

/// `{ head, root, size, tree }` description of a history.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct HistorySnapshot<P> {
    pub head: Option<ActionId>,
    pub root: Option<ActionId>,
    pub size: usize,
    /// Every retained action, rooted at `root`.
    pub tree: Option<ActionTree<P>>,
}

/// One action and all of its structural children.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ActionTree<P> {
    pub id: ActionId,
    pub command: Command,
    pub status: Status,
    pub payload: Option<P>,
    pub disabled: bool,
    pub timestamp_ms: u64,
    pub children: Vec<ActionTree<P>>,
}

impl<P: Clone> ActionTree<P> {
    pub(crate) fn build(actions: &ActionArena<P>, id: ActionId) -> Option<Self> {
        let action = actions.get(id)?;
        Some(Self {
            id,
            command: action.command().clone(),
            status: action.status(),
            payload: action.payload().cloned(),
            disabled: action.is_disabled(),
            timestamp_ms: action.timestamp_ms(),
            children: action
                .children()
                .iter()
                .filter_map(|child| Self::build(actions, *child))
                .collect(),
        })
    }

    /// Number of actions in this tree.
    #[must_use]
    pub fn count(&self) -> usize {
        1 + self.children.iter().map(Self::count).sum::<usize>()
    }
}
