//! Split layout tree for a main terminal and its split children.
//!
//! Leaves name terminals; internal nodes split their area between two
//! children.
//!
//! ```text
//! Split (Horizontal)
//! ├── Leaf (main)
//! └── Split (Vertical)
//!     ├── Leaf (child 1)
//!     └── Leaf (child 2)
//! ```

use rustc_hash::FxHashMap;
use serde::{Deserialize, Serialize};

/// Direction of a split between two panes.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SplitDirection {
    /// Side-by-side (left | right)
    Horizontal,
    /// Stacked (top / bottom)
    Vertical,
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "lowercase")]
pub enum SplitNode {
    Leaf {
        #[serde(rename = "terminalId")]
        terminal_id: String,
    },
    Split {
        direction: SplitDirection,
        first: Box<SplitNode>,
        second: Box<SplitNode>,
        /// Share of the first child (0.0 to 1.0)
        ratio: f32,
    },
}

impl SplitNode {
    pub fn leaf(terminal_id: impl Into<String>) -> Self {
        Self::Leaf {
            terminal_id: terminal_id.into(),
        }
    }

    /// Replace the leaf `target` with a split holding it and `new_id`.
    ///
    /// Returns false if `target` is not in the tree.
    pub fn split(&mut self, target: &str, direction: SplitDirection, new_id: &str) -> bool {
        match self {
            Self::Leaf { terminal_id } => {
                if terminal_id != target {
                    return false;
                }
                let old = std::mem::take(terminal_id);
                *self = Self::Split {
                    direction,
                    first: Box::new(Self::leaf(old)),
                    second: Box::new(Self::leaf(new_id)),
                    ratio: 0.5,
                };
                true
            }
            Self::Split { first, second, .. } => {
                first.split(target, direction, new_id) || second.split(target, direction, new_id)
            }
        }
    }

    /// Remove the leaf `target`, promoting its sibling.
    ///
    /// A lone leaf cannot remove itself; returns false in that case and
    /// when `target` is absent.
    pub fn remove(&mut self, target: &str) -> bool {
        let Self::Split { first, second, .. } = self else {
            return false;
        };
        let promoted = match (first.as_ref(), second.as_ref()) {
            (Self::Leaf { terminal_id }, _) if terminal_id == target => Some(second.as_ref().clone()),
            (_, Self::Leaf { terminal_id }) if terminal_id == target => Some(first.as_ref().clone()),
            _ => None,
        };
        match promoted {
            Some(node) => {
                *self = node;
                true
            }
            None => first.remove(target) || second.remove(target),
        }
    }

    /// Terminal ids in left-to-right order.
    pub fn leaf_ids(&self) -> Vec<&str> {
        match self {
            Self::Leaf { terminal_id } => vec![terminal_id.as_str()],
            Self::Split { first, second, .. } => {
                let mut ids = first.leaf_ids();
                ids.extend(second.leaf_ids());
                ids
            }
        }
    }

    pub fn first_leaf_id(&self) -> &str {
        match self {
            Self::Leaf { terminal_id } => terminal_id,
            Self::Split { first, .. } => first.first_leaf_id(),
        }
    }

    pub fn contains(&self, id: &str) -> bool {
        match self {
            Self::Leaf { terminal_id } => terminal_id == id,
            Self::Split { first, second, .. } => first.contains(id) || second.contains(id),
        }
    }

    pub fn pane_count(&self) -> usize {
        match self {
            Self::Leaf { .. } => 1,
            Self::Split { first, second, .. } => first.pane_count() + second.pane_count(),
        }
    }

    /// Ratio of the outermost split, if any.
    pub fn root_ratio(&self) -> Option<f32> {
        match self {
            Self::Leaf { .. } => None,
            Self::Split { ratio, .. } => Some(*ratio),
        }
    }

    /// Rewrite leaf ids through `map`. Ids missing from the map are kept.
    pub fn remap(&mut self, map: &FxHashMap<String, String>) {
        match self {
            Self::Leaf { terminal_id } => {
                if let Some(new_id) = map.get(terminal_id.as_str()) {
                    *terminal_id = new_id.clone();
                }
            }
            Self::Split { first, second, .. } => {
                first.remap(map);
                second.remap(map);
            }
        }
    }
}
