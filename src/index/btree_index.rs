use std::mem;

use tracing::debug;

use crate::common::{PageIndex, DEFAULT_BTREE_ORDER};
use crate::tuple::Value;

use super::btree_iterator::BTreeIterator;
use super::btree_node::{InteriorNode, LeafNode, Node, NodeId, RecordPointer};
use super::{KeyComparator, ValueComparator};

/// In-memory B+ tree mapping unique keys to record pointers.
///
/// Nodes live in an arena and refer to each other by [`NodeId`]. Leaves
/// are chained left to right for range scans. `order` is the maximum
/// number of entries in a leaf and of separators in an interior node;
/// non-root nodes hold at least `order / 2`.
pub struct BTreeIndex<C: KeyComparator = ValueComparator> {
    nodes: Vec<Node>,
    free: Vec<NodeId>,
    root: NodeId,
    order: usize,
    len: usize,
    comparator: C,
}

/// Interior nodes visited on the way down, with the child slot taken.
type Path = Vec<(NodeId, usize)>;

impl BTreeIndex<ValueComparator> {
    pub fn new(order: usize) -> Self {
        Self::with_comparator(order, ValueComparator)
    }
}

impl Default for BTreeIndex<ValueComparator> {
    fn default() -> Self {
        Self::new(DEFAULT_BTREE_ORDER)
    }
}

impl<C: KeyComparator> BTreeIndex<C> {
    /// Creates an empty tree. Orders below 3 are raised to 3.
    pub fn with_comparator(order: usize, comparator: C) -> Self {
        Self {
            nodes: vec![Node::default()],
            free: Vec::new(),
            root: NodeId(0),
            order: order.max(3),
            len: 0,
            comparator,
        }
    }

    pub fn order(&self) -> usize {
        self.order
    }

    pub fn len(&self) -> usize {
        self.len
    }

    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    fn min_occupancy(&self) -> usize {
        self.order / 2
    }

    /// Number of levels, 1 for a lone leaf.
    pub fn height(&self) -> usize {
        let mut height = 1;
        let mut id = self.root;
        while let Node::Interior(interior) = self.node(id) {
            height += 1;
            id = interior.children[0];
        }
        height
    }

    pub(crate) fn node(&self, id: NodeId) -> &Node {
        &self.nodes[id.0]
    }

    fn alloc(&mut self, node: Node) -> NodeId {
        match self.free.pop() {
            Some(id) => {
                self.nodes[id.0] = node;
                id
            }
            None => {
                self.nodes.push(node);
                NodeId(self.nodes.len() - 1)
            }
        }
    }

    fn release(&mut self, id: NodeId) {
        self.nodes[id.0] = Node::default();
        self.free.push(id);
    }

    fn take(&mut self, id: NodeId) -> Node {
        mem::take(&mut self.nodes[id.0])
    }

    fn put(&mut self, id: NodeId, node: Node) {
        self.nodes[id.0] = node;
    }

    /// Descends to the leaf that owns `key`.
    fn find_leaf(&self, key: &Value) -> (NodeId, Path) {
        let mut id = self.root;
        let mut path = Vec::new();
        loop {
            match self.node(id) {
                Node::Leaf(_) => return (id, path),
                Node::Interior(interior) => {
                    let slot = interior.child_slot(key, &self.comparator);
                    path.push((id, slot));
                    id = interior.children[slot];
                }
            }
        }
    }

    /// Leftmost leaf of the tree.
    pub(crate) fn first_leaf(&self) -> NodeId {
        let mut id = self.root;
        while let Node::Interior(interior) = self.node(id) {
            id = interior.children[0];
        }
        id
    }

    pub fn get(&self, key: &Value) -> Option<&RecordPointer> {
        let (id, _) = self.find_leaf(key);
        match self.node(id) {
            Node::Leaf(leaf) => leaf
                .search(key, &self.comparator)
                .ok()
                .map(|pos| &leaf.entries[pos]),
            Node::Interior(_) => None,
        }
    }

    pub fn contains(&self, key: &Value) -> bool {
        self.get(key).is_some()
    }

    /// Smallest key in the tree.
    pub fn first_key(&self) -> Option<&Value> {
        match self.node(self.first_leaf()) {
            Node::Leaf(leaf) => leaf.entries.first().map(|e| &e.key),
            Node::Interior(_) => None,
        }
    }

    /// Inserts a pointer under its key. Returns false, leaving the tree
    /// untouched, if the key is already present.
    pub fn insert(&mut self, pointer: RecordPointer) -> bool {
        let (id, path) = self.find_leaf(&pointer.key);
        let overflow = match &mut self.nodes[id.0] {
            Node::Leaf(leaf) => match leaf.search(&pointer.key, &self.comparator) {
                Ok(_) => return false,
                Err(pos) => {
                    leaf.entries.insert(pos, pointer);
                    leaf.entries.len() > self.order
                }
            },
            Node::Interior(_) => return false,
        };

        self.len += 1;
        if overflow {
            self.split_leaf(id, path);
        }
        true
    }

    /// Re-points an existing key. Returns false if the key is absent.
    pub fn update(&mut self, pointer: RecordPointer) -> bool {
        let (id, _) = self.find_leaf(&pointer.key);
        if let Node::Leaf(leaf) = &mut self.nodes[id.0] {
            if let Ok(pos) = leaf.search(&pointer.key, &self.comparator) {
                leaf.entries[pos] = pointer;
                return true;
            }
        }
        false
    }

    /// Inserts the pointer, or re-points the key if it is present.
    pub fn upsert(&mut self, pointer: RecordPointer) {
        if !self.contains(&pointer.key) {
            self.insert(pointer);
        } else {
            self.update(pointer);
        }
    }

    fn split_leaf(&mut self, id: NodeId, path: Path) {
        let (separator, right) = match &mut self.nodes[id.0] {
            Node::Leaf(leaf) => {
                let mid = leaf.entries.len() / 2;
                let entries = leaf.entries.split_off(mid);
                let separator = entries[0].key.clone();
                let right = LeafNode {
                    entries,
                    next: leaf.next,
                };
                (separator, right)
            }
            Node::Interior(_) => return,
        };

        let right_id = self.alloc(Node::Leaf(right));
        if let Node::Leaf(leaf) = &mut self.nodes[id.0] {
            leaf.next = Some(right_id);
        }
        self.insert_into_parent(id, separator, right_id, path);
    }

    fn split_interior(&mut self, id: NodeId, path: Path) {
        let (separator, right) = match &mut self.nodes[id.0] {
            Node::Interior(interior) => {
                let mid = interior.keys.len() / 2;
                let keys = interior.keys.split_off(mid + 1);
                let children = interior.children.split_off(mid + 1);
                match interior.keys.pop() {
                    Some(separator) => (separator, InteriorNode { keys, children }),
                    None => return,
                }
            }
            Node::Leaf(_) => return,
        };

        let right_id = self.alloc(Node::Interior(right));
        self.insert_into_parent(id, separator, right_id, path);
    }

    fn insert_into_parent(&mut self, left: NodeId, separator: Value, right: NodeId, mut path: Path) {
        let (parent, slot) = match path.pop() {
            Some(step) => step,
            None => {
                let root = InteriorNode {
                    keys: vec![separator],
                    children: vec![left, right],
                };
                self.root = self.alloc(Node::Interior(root));
                debug!(height = self.height(), "index grew a level");
                return;
            }
        };

        let overflow = match &mut self.nodes[parent.0] {
            Node::Interior(interior) => {
                interior.keys.insert(slot, separator);
                interior.children.insert(slot + 1, right);
                interior.keys.len() > self.order
            }
            Node::Leaf(_) => false,
        };
        if overflow {
            self.split_interior(parent, path);
        }
    }

    /// Removes and returns the pointer stored under `key`.
    pub fn delete(&mut self, key: &Value) -> Option<RecordPointer> {
        let (id, path) = self.find_leaf(key);
        let removed = match &mut self.nodes[id.0] {
            Node::Leaf(leaf) => {
                let pos = leaf.search(key, &self.comparator).ok()?;
                leaf.entries.remove(pos)
            }
            Node::Interior(_) => return None,
        };

        self.len -= 1;
        self.rebalance(id, path);
        Some(removed)
    }

    /// Removes every pointer into the given page. Returns how many were
    /// removed.
    pub fn delete_page_entries(&mut self, page_index: PageIndex) -> usize {
        let keys: Vec<Value> = self
            .iter()
            .filter(|p| p.page_index == page_index)
            .map(|p| p.key.clone())
            .collect();
        for key in &keys {
            self.delete(key);
        }
        keys.len()
    }

    /// Restores minimum occupancy of `id` after a removal, borrowing from
    /// or merging with a sibling and recursing into the parent.
    fn rebalance(&mut self, id: NodeId, mut path: Path) {
        let (parent, slot) = match path.pop() {
            Some(step) => step,
            None => {
                self.collapse_root();
                return;
            }
        };
        if self.node(id).len() >= self.min_occupancy() {
            return;
        }

        let siblings = match self.node(parent) {
            Node::Interior(interior) => interior.children.clone(),
            Node::Leaf(_) => return,
        };
        if slot > 0 && self.node(siblings[slot - 1]).len() > self.min_occupancy() {
            self.borrow_from_left(parent, slot);
            return;
        }
        if slot + 1 < siblings.len() && self.node(siblings[slot + 1]).len() > self.min_occupancy() {
            self.borrow_from_right(parent, slot);
            return;
        }

        if slot > 0 {
            self.merge(parent, slot - 1);
        } else if slot + 1 < siblings.len() {
            self.merge(parent, slot);
        }
        self.rebalance(parent, path);
    }

    /// An interior root left with a single child hands the root role to it.
    fn collapse_root(&mut self) {
        let child = match self.node(self.root) {
            Node::Interior(interior) if interior.keys.is_empty() => interior.children[0],
            _ => return,
        };
        let old = self.root;
        self.root = child;
        self.release(old);
        debug!(height = self.height(), "index lost a level");
    }

    fn borrow_from_left(&mut self, parent: NodeId, slot: usize) {
        let mut parent_node = self.take(parent);
        let Node::Interior(p) = &mut parent_node else {
            self.put(parent, parent_node);
            return;
        };
        let (left_id, id) = (p.children[slot - 1], p.children[slot]);
        let mut left = self.take(left_id);
        let mut node = self.take(id);

        match (&mut left, &mut node) {
            (Node::Leaf(left), Node::Leaf(node)) => {
                if let Some(entry) = left.entries.pop() {
                    p.keys[slot - 1] = entry.key.clone();
                    node.entries.insert(0, entry);
                }
            }
            (Node::Interior(left), Node::Interior(node)) => {
                if let (Some(key), Some(child)) = (left.keys.pop(), left.children.pop()) {
                    let separator = mem::replace(&mut p.keys[slot - 1], key);
                    node.keys.insert(0, separator);
                    node.children.insert(0, child);
                }
            }
            _ => {}
        }

        self.put(left_id, left);
        self.put(id, node);
        self.put(parent, parent_node);
    }

    fn borrow_from_right(&mut self, parent: NodeId, slot: usize) {
        let mut parent_node = self.take(parent);
        let Node::Interior(p) = &mut parent_node else {
            self.put(parent, parent_node);
            return;
        };
        let (id, right_id) = (p.children[slot], p.children[slot + 1]);
        let mut node = self.take(id);
        let mut right = self.take(right_id);

        match (&mut node, &mut right) {
            (Node::Leaf(node), Node::Leaf(right)) => {
                if !right.entries.is_empty() {
                    node.entries.push(right.entries.remove(0));
                    if let Some(first) = right.entries.first() {
                        p.keys[slot] = first.key.clone();
                    }
                }
            }
            (Node::Interior(node), Node::Interior(right)) => {
                if !right.keys.is_empty() {
                    let key = right.keys.remove(0);
                    let child = right.children.remove(0);
                    let separator = mem::replace(&mut p.keys[slot], key);
                    node.keys.push(separator);
                    node.children.push(child);
                }
            }
            _ => {}
        }

        self.put(id, node);
        self.put(right_id, right);
        self.put(parent, parent_node);
    }

    /// Folds `children[slot + 1]` of `parent` into `children[slot]`.
    fn merge(&mut self, parent: NodeId, slot: usize) {
        let mut parent_node = self.take(parent);
        let Node::Interior(p) = &mut parent_node else {
            self.put(parent, parent_node);
            return;
        };
        let separator = p.keys.remove(slot);
        let right_id = p.children.remove(slot + 1);
        let left_id = p.children[slot];
        self.put(parent, parent_node);

        let right = self.take(right_id);
        match (&mut self.nodes[left_id.0], right) {
            (Node::Leaf(left), Node::Leaf(right)) => {
                left.entries.extend(right.entries);
                left.next = right.next;
            }
            (Node::Interior(left), Node::Interior(right)) => {
                left.keys.push(separator);
                left.keys.extend(right.keys);
                left.children.extend(right.children);
            }
            _ => {}
        }
        self.release(right_id);
    }

    /// Iterates over all pointers in key order.
    pub fn iter(&self) -> BTreeIterator<'_, C> {
        BTreeIterator::new(self, Some(self.first_leaf()), 0, None)
    }

    /// Iterates over pointers with keys in `low..=high`.
    pub fn range(&self, low: &Value, high: &Value) -> BTreeIterator<'_, C> {
        let (id, _) = self.find_leaf(low);
        let position = match self.node(id) {
            Node::Leaf(leaf) => leaf.lower_bound(low, &self.comparator),
            Node::Interior(_) => 0,
        };
        BTreeIterator::new(self, Some(id), position, Some(high.clone()))
    }

    pub(crate) fn comparator(&self) -> &C {
        &self.comparator
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::cmp::Ordering;

    fn pointer(key: i32) -> RecordPointer {
        RecordPointer::new(Value::Integer(key), PageIndex::new(key as u32 / 4), key as usize % 4)
    }

    /// Checks ordering, separator bounds, occupancy and uniform depth.
    fn check(tree: &BTreeIndex) {
        fn walk(
            tree: &BTreeIndex,
            id: NodeId,
            low: Option<&Value>,
            high: Option<&Value>,
            depth: usize,
            leaf_depth: &mut Option<usize>,
        ) -> usize {
            let node = tree.node(id);
            if id != tree.root {
                assert!(node.len() >= tree.order() / 2, "underfull node");
            }
            assert!(node.len() <= tree.order(), "overfull node");
            let in_bounds = |k: &Value| {
                low.map_or(true, |l| k.total_cmp(l) != Ordering::Less)
                    && high.map_or(true, |h| k.total_cmp(h) == Ordering::Less)
            };
            match node {
                Node::Leaf(leaf) => {
                    assert!(leaf.entries.iter().all(|e| in_bounds(&e.key)));
                    match leaf_depth {
                        Some(d) => assert_eq!(*d, depth),
                        None => *leaf_depth = Some(depth),
                    }
                    leaf.entries.len()
                }
                Node::Interior(interior) => {
                    assert_eq!(interior.children.len(), interior.keys.len() + 1);
                    assert!(interior.keys.windows(2).all(|w| w[0].total_cmp(&w[1]) == Ordering::Less));
                    let mut total = 0;
                    for (i, child) in interior.children.iter().enumerate() {
                        let lo = if i == 0 { low } else { Some(&interior.keys[i - 1]) };
                        let hi = interior.keys.get(i).or(high);
                        total += walk(tree, *child, lo, hi, depth + 1, leaf_depth);
                    }
                    total
                }
            }
        }

        let mut leaf_depth = None;
        assert_eq!(walk(tree, tree.root, None, None, 0, &mut leaf_depth), tree.len());

        let keys: Vec<Value> = tree.iter().map(|p| p.key.clone()).collect();
        assert_eq!(keys.len(), tree.len());
        assert!(keys.windows(2).all(|w| w[0].total_cmp(&w[1]) == Ordering::Less));
    }

    #[test]
    fn test_insert_and_get() {
        let mut tree = BTreeIndex::new(4);
        for key in [5, 1, 9, 3, 7] {
            assert!(tree.insert(pointer(key)));
        }

        assert_eq!(tree.len(), 5);
        assert_eq!(tree.get(&Value::Integer(9)), Some(&pointer(9)));
        assert!(tree.contains(&Value::Integer(3)));
        assert!(!tree.contains(&Value::Integer(4)));
        assert_eq!(tree.first_key(), Some(&Value::Integer(1)));
        check(&tree);
    }

    #[test]
    fn test_duplicate_insert_rejected() {
        let mut tree = BTreeIndex::new(4);
        assert!(tree.insert(pointer(1)));

        let other = RecordPointer::new(Value::Integer(1), PageIndex::new(99), 0);
        assert!(!tree.insert(other));
        assert_eq!(tree.len(), 1);
        assert_eq!(tree.get(&Value::Integer(1)), Some(&pointer(1)));
    }

    #[test]
    fn test_splits_grow_height() {
        let mut tree = BTreeIndex::new(3);
        assert_eq!(tree.height(), 1);

        for key in 0..100 {
            assert!(tree.insert(pointer(key)));
            check(&tree);
        }
        assert!(tree.height() >= 3);
        for key in 0..100 {
            assert_eq!(tree.get(&Value::Integer(key)), Some(&pointer(key)));
        }
    }

    #[test]
    fn test_delete_merges_and_collapses() {
        let mut tree = BTreeIndex::new(3);
        for key in 0..64 {
            tree.insert(pointer(key));
        }
        let tall = tree.height();

        for key in (0..64).step_by(2) {
            assert_eq!(tree.delete(&Value::Integer(key)), Some(pointer(key)));
            check(&tree);
        }
        assert_eq!(tree.delete(&Value::Integer(0)), None);
        for key in (1..64).step_by(2) {
            assert!(tree.delete(&Value::Integer(key)).is_some());
            check(&tree);
        }

        assert!(tree.is_empty());
        assert!(tree.height() < tall);
        assert_eq!(tree.height(), 1);
        assert_eq!(tree.first_key(), None);
    }

    #[test]
    fn test_range() {
        let mut tree = BTreeIndex::new(4);
        for key in (0..50).rev() {
            tree.insert(pointer(key * 2));
        }

        let keys: Vec<Value> = tree
            .range(&Value::Integer(11), &Value::Integer(20))
            .map(|p| p.key.clone())
            .collect();
        assert_eq!(
            keys,
            [12, 14, 16, 18, 20].map(Value::Integer).to_vec()
        );
        assert_eq!(tree.range(&Value::Integer(200), &Value::Integer(300)).count(), 0);
        assert_eq!(tree.range(&Value::Integer(-5), &Value::Integer(0)).count(), 1);
    }

    #[test]
    fn test_update() {
        let mut tree = BTreeIndex::new(4);
        tree.insert(pointer(1));

        let moved = RecordPointer::new(Value::Integer(1), PageIndex::new(7), 3);
        assert!(tree.update(moved.clone()));
        assert_eq!(tree.get(&Value::Integer(1)), Some(&moved));
        assert!(!tree.update(pointer(2)));

        tree.upsert(pointer(2));
        assert_eq!(tree.len(), 2);
    }

    #[test]
    fn test_delete_page_entries() {
        let mut tree = BTreeIndex::new(3);
        for key in 0..20 {
            tree.insert(pointer(key));
        }

        assert_eq!(tree.delete_page_entries(PageIndex::new(2)), 4);
        assert_eq!(tree.len(), 16);
        assert!(!tree.contains(&Value::Integer(9)));
        assert!(tree.contains(&Value::Integer(12)));
        check(&tree);
    }

    #[test]
    fn test_string_keys() {
        let mut tree = BTreeIndex::new(3);
        for (i, name) in ["pear", "apple", "fig", "kiwi", "date", "lime"].iter().enumerate() {
            tree.insert(RecordPointer::new((*name).into(), PageIndex::new(0), i));
        }
        check(&tree);
        assert_eq!(tree.first_key(), Some(&Value::from("apple")));
        assert_eq!(tree.delete(&"fig".into()).map(|p| p.record_index), Some(2));
        check(&tree);
    }
}
