//! Holds structs for representing nodes (both directory and leaf) of the metric tree.
//!
//! Every entry carries the id of its routing object and the exact distance from that object to
//! the routing object of the parent entry (absent in the root node). Directory entries add the
//! child pointer and a covering radius. Both kinds optionally carry per-k kNN distances used by
//! the reverse knn query.

use std::fmt;

use crate::data::{Distance, ObjectId};

/// Address of a node inside a node store.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct NodeRef(pub usize);

impl fmt::Display for NodeRef {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "NODE {}", self.0)
    }
}

/// Fields shared by leaf and directory entries.
pub trait Entry {

    fn routing_id(&self) -> ObjectId;

    /// Distance to the parent entry's routing object, `None` inside the root node.
    fn parent_distance(&self) -> Option<Distance>;

    /// Slice of kNN distances, index `k - 1` holds the value for `k`.
    fn knn_distances(&self) -> &[Distance];

    fn knn_distance(&self, k: usize) -> Option<Distance> {
        match k {
            0 => None,
            _ => self.knn_distances().get(k - 1).copied(),
        }
    }
}

/// One stored object.
#[derive(Debug, Clone, PartialEq)]
pub struct LeafEntry {
    pub routing_id: ObjectId,
    pub parent_distance: Option<Distance>,
    /// This object's own kNN distances for k = 1..=k_max.
    pub knn_distances: Vec<Distance>,
}

impl LeafEntry {

    pub fn new(routing_id: ObjectId, parent_distance: Option<Distance>) -> Self {
        Self {
            routing_id,
            parent_distance,
            knn_distances: Vec::new(),
        }
    }
}

impl Entry for LeafEntry {

    fn routing_id(&self) -> ObjectId {
        self.routing_id
    }

    fn parent_distance(&self) -> Option<Distance> {
        self.parent_distance
    }

    fn knn_distances(&self) -> &[Distance] {
        &self.knn_distances
    }
}

/// Pointer to a subtree together with the ball that covers it.
#[derive(Debug, Clone, PartialEq)]
pub struct DirectoryEntry {
    pub routing_id: ObjectId,
    pub parent_distance: Option<Distance>,
    pub child: NodeRef,
    /// Upper bound of the distance from `routing_id` to every object below `child`.
    pub covering_radius: Distance,
    /// Per k, the largest kNN distance of any object below `child`.
    pub knn_distances: Vec<Distance>,
}

impl DirectoryEntry {

    pub fn new(routing_id: ObjectId, parent_distance: Option<Distance>, child: NodeRef, covering_radius: Distance) -> Self {
        Self {
            routing_id,
            parent_distance,
            child,
            covering_radius,
            knn_distances: Vec::new(),
        }
    }

    pub fn pretty(&self) -> String {

        return format!("RO: {} PD: {:?} CR: {:.4} CHILD: {}",
                       self.routing_id,
                       self.parent_distance,
                       self.covering_radius,
                       self.child)
    }
}

impl Entry for DirectoryEntry {

    fn routing_id(&self) -> ObjectId {
        self.routing_id
    }

    fn parent_distance(&self) -> Option<Distance> {
        self.parent_distance
    }

    fn knn_distances(&self) -> &[Distance] {
        &self.knn_distances
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum Node {
    Leaf(Vec<LeafEntry>),
    Directory(Vec<DirectoryEntry>),
}

impl Node {

    pub fn is_leaf(&self) -> bool {
        matches!(self, Node::Leaf(_))
    }

    pub fn len(&self) -> usize {
        match self {
            Node::Leaf(entries) => entries.len(),
            Node::Directory(entries) => entries.len(),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Entry at `index` viewed through the common [`Entry`] fields.
    pub fn entry(&self, index: usize) -> Option<&dyn Entry> {
        match self {
            Node::Leaf(entries) => entries.get(index).map(|e| e as &dyn Entry),
            Node::Directory(entries) => entries.get(index).map(|e| e as &dyn Entry),
        }
    }

    /// Element-wise maximum of the entries' kNN distances, i.e. the bound a directory entry
    /// pointing to this node has to carry.
    pub fn knn_distance_bounds(&self, k_max: usize) -> Vec<Distance> {

        let mut bounds = vec![0.0; k_max];

        for i in 0..self.len() {
            if let Some(entry) = self.entry(i) {
                for (bound, d) in bounds.iter_mut().zip(entry.knn_distances()) {
                    if *d > *bound {
                        *bound = *d;
                    }
                }
            }
        }

        bounds
    }
}

#[cfg(test)]
mod test {

    use super::*;

    #[test]
    fn entry_accessors() {

        let mut leaf = LeafEntry::new(4, Some(1.5));
        leaf.knn_distances = vec![0.5, 1.0];

        assert_eq!(leaf.routing_id(), 4);
        assert_eq!(leaf.parent_distance(), Some(1.5));
        assert_eq!(leaf.knn_distance(0), None);
        assert_eq!(leaf.knn_distance(2), Some(1.0));
        assert_eq!(leaf.knn_distance(3), None);

        let dir = DirectoryEntry::new(2, None, NodeRef(7), 3.0);
        assert_eq!(dir.child, NodeRef(7));
        assert_eq!(dir.parent_distance(), None);
        assert_eq!(format!("{}", dir.child), "NODE 7");
        assert_eq!(dir.pretty(), "RO: 2 PD: None CR: 3.0000 CHILD: NODE 7");
    }

    #[test]
    fn knn_bounds_are_elementwise_max() {

        let mut a = LeafEntry::new(0, None);
        a.knn_distances = vec![1.0, 4.0];
        let mut b = LeafEntry::new(1, None);
        b.knn_distances = vec![2.0, 3.0];

        let node = Node::Leaf(vec![a, b]);
        assert!(node.is_leaf());
        assert_eq!(node.len(), 2);
        assert_eq!(node.knn_distance_bounds(2), vec![2.0, 4.0]);
        assert_eq!(node.entry(1).map(|e| e.routing_id()), Some(1));
        assert!(node.entry(2).is_none());
    }
}
