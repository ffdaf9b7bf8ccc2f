//! In-memory B+ tree index over a table's primary key.

mod btree_index;
mod btree_iterator;
mod btree_node;
mod key_comparator;

pub use btree_index::BTreeIndex;
pub use btree_iterator::BTreeIterator;
pub use btree_node::{InteriorNode, LeafNode, Node, NodeId, RecordPointer};
pub use key_comparator::{KeyComparator, ValueComparator};
