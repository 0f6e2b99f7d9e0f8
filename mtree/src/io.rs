//! Access to tree nodes.
//!
//! The query engine only ever reads nodes through [`GetNode`], so any store (memory resident,
//! memory mapped, paged) can back a tree. [`MemNodePager`] is the in-memory store the bulk loader
//! writes into.

use crate::error::{Error, Result};
use crate::node::{Node, NodeRef};

pub trait GetNode {

    fn get_node(&self, index: &NodeRef) -> Result<&Node>;

    fn num_nodes(&self) -> usize;
}

/// Every node reachable from `root`, each child before its parent.
pub fn bottom_up<S: GetNode + ?Sized>(nodes: &S, root: NodeRef) -> Result<Vec<NodeRef>> {

    let mut order = Vec::new();
    let mut nodes_to_check = vec![root];

    while let Some(curr_pointer) = nodes_to_check.pop() {
        order.push(curr_pointer);
        if let Node::Directory(entries) = nodes.get_node(&curr_pointer)? {
            for entry in entries {
                nodes_to_check.push(entry.child);
            }
        }
    }

    order.reverse();

    Ok(order)
}

#[derive(Debug, Default)]
pub struct MemNodePager {
    pub store: Vec<Node>,
}

impl GetNode for MemNodePager {

    fn get_node(&self, index: &NodeRef) -> Result<&Node> {

        let ret = match self.store.get(index.0) {
            Some(node) => Ok(node),
            None => Err(Error::consistency(format!("node not found at address: {}", index))),
        };

        return ret;
    }

    fn num_nodes(&self) -> usize {
        self.store.len()
    }
}

impl MemNodePager {

    pub fn new() -> MemNodePager {

        return Self {
            store: Vec::new(),
        };
    }

    pub fn len(&self) -> usize {
        return self.store.len();
    }

    pub fn is_empty(&self) -> bool {
        self.store.is_empty()
    }

    pub fn add_node(&mut self, node: Node) -> NodeRef {

        self.store.push(node);

        NodeRef(self.store.len() - 1)
    }

    pub fn get_node_mut(&mut self, index: &NodeRef) -> Result<&mut Node> {

        match self.store.get_mut(index.0) {
            Some(node) => Ok(node),
            None => Err(Error::consistency(format!("node not found at address: {}", index))),
        }
    }

    pub fn update_node(&mut self, index: &NodeRef, new_node: Node) -> Result<()> {

        let node = self.get_node_mut(index)?;
        *node = new_node;

        return Ok(())
    }
}

#[cfg(test)]
mod test {

    use super::*;
    use crate::node::{DirectoryEntry, LeafEntry};

    #[test]
    fn add_get_update() {

        let mut pager = MemNodePager::new();
        assert!(pager.is_empty());

        let a = pager.add_node(Node::Leaf(vec![]));
        let b = pager.add_node(Node::Leaf(vec![LeafEntry::new(3, None)]));

        assert_eq!((a, b), (NodeRef(0), NodeRef(1)));
        assert_eq!(pager.num_nodes(), 2);
        assert_eq!(pager.get_node(&b).unwrap().len(), 1);

        pager.update_node(&a, Node::Leaf(vec![LeafEntry::new(1, None), LeafEntry::new(2, None)])).unwrap();
        assert_eq!(pager.get_node(&a).unwrap().len(), 2);

        assert!(matches!(pager.get_node(&NodeRef(9)), Err(Error::InternalConsistency(_))));
        assert!(pager.update_node(&NodeRef(9), Node::Leaf(vec![])).is_err());
    }

    #[test]
    fn children_come_first() {

        let mut pager = MemNodePager::new();
        let a = pager.add_node(Node::Leaf(vec![LeafEntry::new(0, Some(0.0))]));
        let b = pager.add_node(Node::Leaf(vec![LeafEntry::new(1, Some(0.0))]));
        let c = pager.add_node(Node::Directory(vec![
            DirectoryEntry::new(0, Some(1.0), a, 0.0),
            DirectoryEntry::new(1, Some(2.0), b, 0.0),
        ]));
        let root = pager.add_node(Node::Directory(vec![DirectoryEntry::new(0, None, c, 2.0)]));

        let order = bottom_up(&pager, root).unwrap();
        let position = |n: NodeRef| order.iter().position(|&o| o == n).unwrap();

        assert_eq!(order.len(), 4);
        assert_eq!(order[3], root);
        assert!(position(a) < position(c));
        assert!(position(b) < position(c));
        assert!(position(c) < position(root));

        assert!(bottom_up(&pager, NodeRef(42)).is_err());
    }
}
