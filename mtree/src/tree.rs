//! The metric tree handle and its configuration.
//!
//! Query algorithms live in [`crate::query`], static construction in [`crate::build`].

use std::collections::{HashMap, VecDeque};
use std::fs::File;
use std::io::prelude::*;

use serde::{Deserialize, Serialize};

use crate::data::{Distance, Metric, ObjectId, Relation};
use crate::error::{Error, Result};
use crate::io::{bottom_up, GetNode, MemNodePager};
use crate::node::{Entry, Node, NodeRef};

#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
pub struct TreeConfig {
    /// Maximum number of entries in a leaf node.
    pub leaf_capacity: usize,
    /// Maximum number of entries in a directory node.
    pub fanout: usize,
    /// Largest k supported by reverse knn queries. 0 disables the kNN distance tables.
    pub k_max: usize,
    /// Seed for the routing object selection of the bulk loader.
    pub seed: u64,
    /// Show a progress bar while computing kNN distances.
    #[serde(default)]
    pub progress: bool,
}

impl Default for TreeConfig {
    fn default() -> Self {
        Self {
            leaf_capacity: 32,
            fanout: 16,
            k_max: 0,
            seed: 0,
            progress: false,
        }
    }
}

impl TreeConfig {

    pub fn from_file(filename: &str) -> Result<Self> {

        let serialized = std::fs::read_to_string(filename)?;
        let deserialized: Self = serde_yaml::from_str(&serialized)?;

        deserialized.validate()?;

        return Ok(deserialized);
    }

    pub fn to_file(&self, filename: &str) -> Result<()> {

        let serialized = serde_yaml::to_string(&self)?;
        let mut file = File::create(filename)?;

        file.write_all(serialized.as_bytes())?;

        Ok(())
    }

    pub fn validate(&self) -> Result<()> {

        if self.leaf_capacity < 1 {
            return Err(Error::invalid_argument("leaf_capacity must be at least 1"));
        }

        if self.fanout < 2 {
            return Err(Error::invalid_argument("fanout must be at least 2"));
        }

        Ok(())
    }
}

/// Metric tree over the objects of a [`Relation`].
///
/// Nodes are read through the [`GetNode`] store `S`; objects are resolved through `relation` and
/// compared with `metric`. Queries only need `&self`, so a tree that is not being mutated can be
/// shared between threads.
#[derive(Debug)]
pub struct Tree<O, M, S = MemNodePager> {
    pub nodes: S,
    pub relation: Relation<O>,
    pub metric: M,
    pub root: NodeRef,
    pub config: TreeConfig,
}

impl<O, M, S> Tree<O, M, S>
where
    S: GetNode,
{
    pub fn from_parts(nodes: S, relation: Relation<O>, metric: M, root: NodeRef, config: TreeConfig) -> Self {
        Self {
            nodes,
            relation,
            metric,
            root,
            config,
        }
    }

    pub fn k_max(&self) -> usize {
        self.config.k_max
    }

    pub fn num_nodes(&self) -> usize {
        self.nodes.num_nodes()
    }

    /// Number of objects in the relation backing the tree.
    pub fn len(&self) -> usize {
        self.relation.len()
    }

    pub fn is_empty(&self) -> bool {
        self.relation.is_empty()
    }

    /// Depth of every leaf, root at depth 1, in breadth first order.
    pub fn leaf_depths(&self) -> Result<Vec<usize>> {

        let mut depths = Vec::new();
        let mut nodes_to_check: VecDeque<(NodeRef, usize)> = VecDeque::new();
        nodes_to_check.push_back((self.root, 1));

        while let Some((curr_pointer, depth)) = nodes_to_check.pop_front() {
            match self.nodes.get_node(&curr_pointer)? {
                Node::Leaf(_) => depths.push(depth),
                Node::Directory(entries) => {
                    for entry in entries {
                        nodes_to_check.push_back((entry.child, depth + 1));
                    }
                },
            }
        }

        Ok(depths)
    }

    /// Human readable dump of the tree structure.
    pub fn output_depths(&self) -> Result<String> {

        let mut s = String::new();
        let mut nodes_to_check: Vec<(NodeRef, usize)> = vec![(self.root, 0)];

        while let Some((curr_pointer, depth)) = nodes_to_check.pop() {

            let indent = "\t".repeat(depth);
            match self.nodes.get_node(&curr_pointer)? {
                Node::Leaf(entries) => {
                    s += &format!("{}LEAF {} ({} objects)\n", indent, curr_pointer.0, entries.len());
                    for entry in entries {
                        s += &format!("{}\tOBJECT: {} PD: {:?}\n", indent, entry.routing_id, entry.parent_distance);
                    }
                },
                Node::Directory(entries) => {
                    s += &format!("{}{}\n", indent, curr_pointer);
                    for entry in entries.iter().rev() {
                        nodes_to_check.push((entry.child, depth + 1));
                    }
                    for entry in entries {
                        s += &format!("{}\t{}\n", indent, entry.pretty());
                    }
                },
            }
        }

        Ok(s)
    }

    /// Verifies the structural invariants every query relies on: exact parent distances, covering
    /// radii that cover every object below them and kNN distance bounds that dominate the
    /// subtree. Computes a distance for every (routing object, descendant) pair, so it is meant
    /// for tests and debugging.
    pub fn check_tree(&self) -> Result<()>
    where
        M: Metric<O>,
    {
        let mut nodes_to_check: Vec<(NodeRef, Option<ObjectId>)> = vec![(self.root, None)];
        while let Some((curr_pointer, parent)) = nodes_to_check.pop() {
            match self.nodes.get_node(&curr_pointer)? {
                Node::Leaf(entries) => {
                    for entry in entries {
                        self.check_parent_distance(entry, parent)?;
                    }
                },
                Node::Directory(entries) => {
                    for entry in entries {
                        self.check_parent_distance(entry, parent)?;
                        nodes_to_check.push((entry.child, Some(entry.routing_id)));
                    }
                },
            }
        }

        // objects below each node whose parent has not been checked yet
        let mut objects: HashMap<NodeRef, Vec<ObjectId>> = HashMap::new();

        for node_ref in bottom_up(&self.nodes, self.root)? {
            let mut below_node = Vec::new();

            match self.nodes.get_node(&node_ref)? {
                Node::Leaf(entries) => below_node.extend(entries.iter().map(|entry| entry.routing_id)),
                Node::Directory(entries) => {
                    for entry in entries {
                        let below = objects.remove(&entry.child).ok_or_else(|| {
                            Error::consistency(format!("{} is referenced by more than one entry", entry.child))
                        })?;

                        let routing = self.relation.get(entry.routing_id)?;
                        for &id in below.iter() {
                            let d = self.metric.distance(routing, self.relation.get(id)?);
                            if d > entry.covering_radius {
                                return Err(Error::consistency(format!(
                                    "object {} at {} is outside the covering radius {} of {}",
                                    id, d, entry.covering_radius, entry.routing_id
                                )));
                            }
                        }

                        let child = self.nodes.get_node(&entry.child)?;
                        let bounds = child.knn_distance_bounds(self.config.k_max);
                        for (k, (bound, stored)) in bounds.iter().zip(entry.knn_distances.iter()).enumerate() {
                            if bound > stored {
                                return Err(Error::consistency(format!(
                                    "kNN distance bound for k={} of {} is {} but the subtree needs {}",
                                    k + 1, entry.child, stored, bound
                                )));
                            }
                        }

                        below_node.extend(below);
                    }
                },
            }

            objects.insert(node_ref, below_node);
        }

        Ok(())
    }

    fn check_parent_distance(&self, entry: &dyn Entry, parent: Option<ObjectId>) -> Result<()>
    where
        M: Metric<O>,
    {
        let expected: Option<Distance> = match parent {
            Some(p) => Some(self.metric.distance(self.relation.get(entry.routing_id())?, self.relation.get(p)?)),
            None => None,
        };

        match (entry.parent_distance(), expected) {
            (Some(stored), Some(expected)) if stored != expected => Err(Error::consistency(format!(
                "entry {} stores parent distance {} but it is {}",
                entry.routing_id(), stored, expected
            ))),
            (None, Some(_)) => Err(Error::consistency(format!(
                "entry {} below a routing object has no parent distance",
                entry.routing_id()
            ))),
            _ => Ok(()),
        }
    }
}
