use std::cmp::Ordering;

use crate::tuple::Value;

use super::btree_node::{Node, NodeId, RecordPointer};
use super::{BTreeIndex, KeyComparator};

/// Walks the chained leaves of a [`BTreeIndex`] in key order, stopping
/// after `end_key` when one is given.
pub struct BTreeIterator<'a, C: KeyComparator> {
    tree: &'a BTreeIndex<C>,
    current_leaf: Option<NodeId>,
    current_index: usize,
    end_key: Option<Value>,
    done: bool,
}

impl<'a, C: KeyComparator> BTreeIterator<'a, C> {
    pub(crate) fn new(
        tree: &'a BTreeIndex<C>,
        start_leaf: Option<NodeId>,
        start_index: usize,
        end_key: Option<Value>,
    ) -> Self {
        Self {
            tree,
            current_leaf: start_leaf,
            current_index: start_index,
            end_key,
            done: false,
        }
    }
}

impl<'a, C: KeyComparator> Iterator for BTreeIterator<'a, C> {
    type Item = &'a RecordPointer;

    fn next(&mut self) -> Option<Self::Item> {
        if self.done {
            return None;
        }

        while let Some(id) = self.current_leaf {
            let leaf = match self.tree.node(id) {
                Node::Leaf(leaf) => leaf,
                Node::Interior(_) => break,
            };

            if let Some(entry) = leaf.entries.get(self.current_index) {
                if let Some(end) = &self.end_key {
                    if self.tree.comparator().compare(&entry.key, end) == Ordering::Greater {
                        break;
                    }
                }
                self.current_index += 1;
                return Some(entry);
            }

            self.current_leaf = leaf.next;
            self.current_index = 0;
        }

        self.done = true;
        None
    }
}
