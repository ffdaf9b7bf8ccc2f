use std::cmp::Ordering;

use crate::common::{PageIndex, RecordId};
use crate::tuple::Value;

use super::KeyComparator;

/// Handle of a node in the index arena.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct NodeId(pub usize);

/// Locates the record holding `key`. The pointer does not own the record.
#[derive(Debug, Clone, PartialEq)]
pub struct RecordPointer {
    pub key: Value,
    pub page_index: PageIndex,
    pub record_index: usize,
}

impl RecordPointer {
    pub fn new(key: Value, page_index: PageIndex, record_index: usize) -> Self {
        Self {
            key,
            page_index,
            record_index,
        }
    }

    pub fn record_id(&self) -> RecordId {
        RecordId::new(self.page_index, self.record_index)
    }
}

/// Leaf node: pointers sorted by key, chained to the next leaf.
#[derive(Debug, Clone, Default)]
pub struct LeafNode {
    pub entries: Vec<RecordPointer>,
    pub next: Option<NodeId>,
}

impl LeafNode {
    /// Binary search for `key`: `Ok(pos)` if present, else the insert
    /// position.
    pub fn search<C: KeyComparator>(&self, key: &Value, cmp: &C) -> Result<usize, usize> {
        self.entries.binary_search_by(|e| cmp.compare(&e.key, key))
    }

    /// Position of the first entry not less than `key`.
    pub fn lower_bound<C: KeyComparator>(&self, key: &Value, cmp: &C) -> usize {
        self.entries
            .partition_point(|e| cmp.compare(&e.key, key) == Ordering::Less)
    }
}

/// Interior node: `children.len() == keys.len() + 1`. Every key under
/// `children[i]` is less than `keys[i]`, and every key under
/// `children[i + 1]` is greater than or equal to it.
#[derive(Debug, Clone, Default)]
pub struct InteriorNode {
    pub keys: Vec<Value>,
    pub children: Vec<NodeId>,
}

impl InteriorNode {
    /// Slot of the child owning `key`. A key equal to a separator goes to
    /// the right of it.
    pub fn child_slot<C: KeyComparator>(&self, key: &Value, cmp: &C) -> usize {
        self.keys
            .partition_point(|k| cmp.compare(k, key) != Ordering::Greater)
    }
}

#[derive(Debug, Clone)]
pub enum Node {
    Leaf(LeafNode),
    Interior(InteriorNode),
}

impl Node {
    /// Entries of a leaf, separators of an interior node.
    pub fn len(&self) -> usize {
        match self {
            Node::Leaf(leaf) => leaf.entries.len(),
            Node::Interior(interior) => interior.keys.len(),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn is_leaf(&self) -> bool {
        matches!(self, Node::Leaf(_))
    }
}

impl Default for Node {
    fn default() -> Self {
        Node::Leaf(LeafNode::default())
    }
}
