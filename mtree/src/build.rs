//! Static construction of a metric tree from a complete relation.
//!
//! Objects are partitioned top down: a group small enough for a leaf becomes a leaf, a larger
//! group picks up to `fanout` routing objects by farthest first traversal, assigns every object to
//! its nearest routing object and each part is split again. Parent distances and covering radii
//! are exact. When `k_max > 0` every object's kNN distances are then computed with the finished
//! tree's own knn query and folded bottom up into the directory entries.

use std::collections::HashMap;

use kdam::tqdm;
use log::{debug, info};
use rand::prelude::*;

use crate::data::{Distance, Metric, ObjectId, Relation};
use crate::error::{Error, Result};
use crate::io::{bottom_up, GetNode, MemNodePager};
use crate::node::{DirectoryEntry, LeafEntry, Node, NodeRef};
use crate::tree::{Tree, TreeConfig};

#[derive(Debug, Clone, Default)]
pub struct BulkLoader {
    pub config: TreeConfig,
}

impl BulkLoader {

    pub fn new(config: TreeConfig) -> Self {
        Self { config }
    }

    pub fn build<O, M>(&self, relation: Relation<O>, metric: M) -> Result<Tree<O, M>>
    where
        M: Metric<O>,
    {
        self.config.validate()?;

        let (pager, root) = {
            let mut partitioner = Partitioner {
                relation: &relation,
                metric: &metric,
                config: &self.config,
                rng: StdRng::seed_from_u64(self.config.seed),
                pager: MemNodePager::new(),
            };

            let ids: Vec<ObjectId> = relation.ids().collect();
            let root = match ids.is_empty() {
                true => partitioner.pager.add_node(Node::Leaf(Vec::new())),
                false => partitioner.build_tree(ids)?,
            };

            (partitioner.pager, root)
        };

        let mut tree = Tree::from_parts(pager, relation, metric, root, self.config.clone());

        if tree.k_max() > 0 && !tree.is_empty() {
            let table = knn_distance_table(&tree, self.config.progress)?;
            let k_max = tree.k_max();
            assign_knn_distances(&mut tree.nodes, root, &table, k_max)?;
        }

        info!("built tree over {} objects: {} nodes, k_max={}", tree.len(), tree.num_nodes(), tree.k_max());

        Ok(tree)
    }
}

enum BuildStep {
    /// Objects still to be placed below the routing object `parent`.
    Split { ids: Vec<ObjectId>, parent: Option<ObjectId> },
    /// Routing id, parent distance and covering radius of every child of a directory node.
    Join { routing: Vec<(ObjectId, Option<Distance>, Distance)> },
}

struct Partitioner<'a, O, M> {
    relation: &'a Relation<O>,
    metric: &'a M,
    config: &'a TreeConfig,
    rng: StdRng,
    pager: MemNodePager,
}

impl<'a, O, M> Partitioner<'a, O, M>
where
    M: Metric<O>,
{
    fn distance(&self, a: ObjectId, b: ObjectId) -> Result<Distance> {
        Ok(self.metric.distance(self.relation.get(a)?, self.relation.get(b)?))
    }

    fn parent_distance(&self, id: ObjectId, parent: Option<ObjectId>) -> Result<Option<Distance>> {
        match parent {
            Some(p) => Ok(Some(self.distance(id, p)?)),
            None => Ok(None),
        }
    }

    /// Builds the tree over `ids` and returns its root. Children are written before their parent,
    /// so the root is always the last node added.
    fn build_tree(&mut self, ids: Vec<ObjectId>) -> Result<NodeRef> {

        let mut steps = vec![BuildStep::Split { ids, parent: None }];
        // roots of the finished subtrees whose parent is not written yet
        let mut built: Vec<NodeRef> = Vec::new();

        while let Some(step) = steps.pop() {
            match step {
                BuildStep::Split { ids, parent } if ids.len() <= self.config.leaf_capacity => {
                    let mut entries = Vec::with_capacity(ids.len());
                    for id in ids {
                        entries.push(LeafEntry::new(id, self.parent_distance(id, parent)?));
                    }
                    built.push(self.pager.add_node(Node::Leaf(entries)));
                },
                BuildStep::Split { ids, parent } => {
                    let groups = self.partition(&ids)?;
                    debug!("split {} objects into {} groups", ids.len(), groups.len());

                    let mut routing = Vec::with_capacity(groups.len());
                    let mut children = Vec::with_capacity(groups.len());
                    for (routing_id, members) in groups {

                        let mut covering_radius: Distance = 0.0;
                        for &member in members.iter() {
                            covering_radius = covering_radius.max(self.distance(routing_id, member)?);
                        }

                        routing.push((routing_id, self.parent_distance(routing_id, parent)?, covering_radius));
                        children.push(BuildStep::Split { ids: members, parent: Some(routing_id) });
                    }

                    // each child leaves exactly one root on `built`, in group order
                    steps.push(BuildStep::Join { routing });
                    steps.extend(children.into_iter().rev());
                },
                BuildStep::Join { routing } => {
                    let first = built.len().checked_sub(routing.len()).ok_or_else(|| {
                        Error::consistency(format!("{} routing objects but only {} built subtrees", routing.len(), built.len()))
                    })?;

                    let entries = routing
                        .into_iter()
                        .zip(built.split_off(first))
                        .map(|((routing_id, parent_distance, covering_radius), child)| {
                            DirectoryEntry::new(routing_id, parent_distance, child, covering_radius)
                        })
                        .collect();

                    built.push(self.pager.add_node(Node::Directory(entries)));
                },
            }
        }

        match (built.pop(), built.is_empty()) {
            (Some(root), true) => Ok(root),
            _ => Err(Error::consistency("bulk load did not end with a single root")),
        }
    }

    /// Splits `ids` into at least two non-empty groups, each paired with its routing object.
    fn partition(&mut self, ids: &[ObjectId]) -> Result<Vec<(ObjectId, Vec<ObjectId>)>> {

        let fanout = self.config.fanout.min(ids.len());

        let first = ids[self.rng.gen_range(0..ids.len())];
        let mut routing: Vec<ObjectId> = vec![first];

        // (slot in routing, distance) of the nearest routing object per object
        let mut nearest: Vec<(usize, Distance)> = Vec::with_capacity(ids.len());
        for &id in ids {
            nearest.push((0, self.distance(id, first)?));
        }

        while routing.len() < fanout {

            let farthest = nearest
                .iter()
                .enumerate()
                .max_by(|a, b| (a.1).1.total_cmp(&(b.1).1))
                .map(|(i, &(_, d))| (i, d));

            let (index, d) = match farthest {
                Some(f) => f,
                None => break,
            };

            // everything left coincides with a routing object
            if d <= 0.0 {
                break;
            }

            let next = ids[index];
            let slot = routing.len();
            routing.push(next);

            for (i, &id) in ids.iter().enumerate() {
                let d = self.distance(id, next)?;
                if d < nearest[i].1 {
                    nearest[i] = (slot, d);
                }
            }
        }

        if routing.len() < 2 {
            let chunk_size = (ids.len() + fanout - 1) / fanout;
            return Ok(ids.chunks(chunk_size).map(|chunk| (chunk[0], chunk.to_vec())).collect());
        }

        let mut groups: Vec<(ObjectId, Vec<ObjectId>)> = routing.iter().map(|&r| (r, Vec::new())).collect();
        for (i, &id) in ids.iter().enumerate() {
            groups[nearest[i].0].1.push(id);
        }

        Ok(groups)
    }
}

/// Each object's distances to its `k_max` nearest other objects, indexed by id. Missing
/// neighbors are +inf.
fn knn_distance_table<O, M, S>(tree: &Tree<O, M, S>, progress: bool) -> Result<Vec<Vec<Distance>>>
where
    M: Metric<O>,
    S: GetNode,
{
    let k_max = tree.k_max();
    let ids: Vec<ObjectId> = tree.relation.ids().collect();

    let iter: Box<dyn Iterator<Item = &ObjectId> + '_> = match progress {
        true => Box::new(tqdm!(ids.iter(), desc = "kNN distances")),
        false => Box::new(ids.iter()),
    };

    let mut table = Vec::with_capacity(ids.len());
    for &id in iter {

        let hits = tree.knn_query_by_id(id, k_max + 1)?;

        let mut distances: Vec<Distance> = hits
            .iter()
            .filter(|h| h.id != id)
            .map(|h| h.distance)
            .take(k_max)
            .collect();
        distances.resize(k_max, Distance::INFINITY);

        table.push(distances);
    }

    Ok(table)
}

/// Stores the table entries in the leaves and the element-wise subtree maxima in the directory
/// entries of the tree below `root`.
fn assign_knn_distances(pager: &mut MemNodePager, root: NodeRef, table: &[Vec<Distance>], k_max: usize) -> Result<()> {

    // bounds of the nodes whose parent entry is not filled in yet
    let mut bounds: HashMap<NodeRef, Vec<Distance>> = HashMap::new();

    for node_ref in bottom_up(&*pager, root)? {
        let node = pager.get_node_mut(&node_ref)?;

        match &mut *node {
            Node::Leaf(entries) => {
                for entry in entries.iter_mut() {
                    entry.knn_distances = match table.get(entry.routing_id as usize) {
                        Some(distances) => distances.clone(),
                        None => return Err(Error::ObjectNotFound(entry.routing_id)),
                    };
                }
            },
            Node::Directory(entries) => {
                for entry in entries.iter_mut() {
                    entry.knn_distances = match bounds.remove(&entry.child) {
                        Some(child_bounds) => child_bounds,
                        None => return Err(Error::consistency(format!("{} has no kNN bounds", entry.child))),
                    };
                }
            },
        }

        bounds.insert(node_ref, node.knn_distance_bounds(k_max));
    }

    Ok(())
}
