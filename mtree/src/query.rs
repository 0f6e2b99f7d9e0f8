//! Branch and bound queries over a [`Tree`].
//!
//! Every routing entry carries its exact distance to the parent's routing object. Once the
//! distance from the query to that parent is known, `|d(q, parent) - parent_distance|` is a lower
//! bound of `d(q, routing)` (triangle inequality) and lets a whole entry be skipped without
//! calling the metric. Only when that test fails is the real distance computed and compared
//! against the covering radius.

use std::cmp::Ordering;

use log::{debug, trace};

use crate::data::{Distance, DistanceId, Metric, ObjectId};
use crate::error::{Error, Result};
use crate::heap::{Heap, KnnHeap};
use crate::io::GetNode;
use crate::node::{Node, NodeRef};
use crate::tree::Tree;

/// A subtree queued by the knn search.
#[derive(Debug, Clone, PartialEq)]
pub struct SearchCandidate {
    /// Lower bound of the distance from the query to anything below `node`.
    pub mindist: Distance,
    pub node: NodeRef,
    /// Routing object of the entry pointing at `node`, `None` for the root.
    pub routing_id: Option<ObjectId>,
    /// Exact distance from the query to `routing_id`.
    pub routing_distance: Option<Distance>,
}

type CandidateCmp = fn(&SearchCandidate, &SearchCandidate) -> Ordering;

impl SearchCandidate {

    fn root(node: NodeRef) -> Self {
        Self {
            mindist: 0.0,
            node,
            routing_id: None,
            routing_distance: None,
        }
    }

    /// Smallest mindist first.
    pub fn ascending(a: &SearchCandidate, b: &SearchCandidate) -> Ordering {
        a.mindist.total_cmp(&b.mindist)
    }
}

/// Something a query decided not to look at, with the lower bound that justified it.
#[derive(Debug, Clone, PartialEq)]
pub enum Pruned {
    Subtree { node: NodeRef, lower_bound: Distance },
    Object { id: ObjectId, lower_bound: Distance },
}

/// Per query counters. Pruning decisions are only kept when created with
/// [`QueryTrace::recording`].
#[derive(Debug, Clone, Default)]
pub struct QueryTrace {
    pub nodes_visited: usize,
    pub distance_computations: usize,
    pub pruned: Option<Vec<Pruned>>,
}

impl QueryTrace {

    pub fn new() -> Self {
        Self::default()
    }

    pub fn recording() -> Self {
        Self {
            pruned: Some(Vec::new()),
            ..Self::default()
        }
    }

    fn prune(&mut self, pruned: Pruned) {

        trace!("pruned {:?}", pruned);

        if let Some(p) = self.pruned.as_mut() {
            p.push(pruned);
        }
    }
}

/// `|d(q, parent) - d(routing, parent)|`, when both distances are known.
fn parent_lower_bound(routing_distance: Option<Distance>, parent_distance: Option<Distance>) -> Option<Distance> {
    match (routing_distance, parent_distance) {
        (Some(dq), Some(pd)) => Some((dq - pd).abs()),
        _ => None,
    }
}

fn check_k(k: usize) -> Result<()> {
    match k {
        0 => Err(Error::invalid_argument("k must be at least 1")),
        _ => Ok(()),
    }
}

fn check_radius(radius: Distance) -> Result<()> {

    // also rejects NaN
    if !(radius >= 0.0) {
        return Err(Error::invalid_argument(format!("invalid query radius {}", radius)));
    }

    Ok(())
}

impl<O, M, S> Tree<O, M, S>
where
    M: Metric<O>,
    S: GetNode,
{
    /// The `k` nearest objects to `query`, ascending by (distance, id).
    ///
    /// Exactly `min(k, n)` results; among equal distances the smaller ids win.
    pub fn knn_query(&self, query: &O, k: usize) -> Result<Vec<DistanceId>> {
        self.knn_query_traced(query, k, &mut QueryTrace::new())
    }

    pub fn knn_query_traced(&self, query: &O, k: usize, query_trace: &mut QueryTrace) -> Result<Vec<DistanceId>> {

        check_k(k)?;

        let hits = self.knn_search(query, KnnHeap::new(k)?, query_trace)?;
        debug!("knn query k={}: {} nodes, {} distances, {} hits",
               k, query_trace.nodes_visited, query_trace.distance_computations, hits.len());

        Ok(hits)
    }

    /// Like [`Tree::knn_query`], but every object tying the kth distance is returned as well.
    pub fn knn_query_with_ties(&self, query: &O, k: usize) -> Result<Vec<DistanceId>> {

        check_k(k)?;

        let mut query_trace = QueryTrace::new();
        let hits = self.knn_search(query, KnnHeap::with_ties(k)?, &mut query_trace)?;
        debug!("knn query with ties k={}: {} nodes, {} distances, {} hits",
               k, query_trace.nodes_visited, query_trace.distance_computations, hits.len());

        Ok(hits)
    }

    pub fn knn_query_by_id(&self, id: ObjectId, k: usize) -> Result<Vec<DistanceId>> {

        let query = self.relation.get(id)?;

        self.knn_query(query, k)
    }

    /// Batched knn over several query objects sharing one traversal.
    pub fn bulk_knn_query(&self, _queries: &[O], _k: usize) -> Result<Vec<Vec<DistanceId>>> {
        Err(Error::NotImplemented("bulk knn query"))
    }

    /// Every object within `radius` of `query` (inclusive), ascending by (distance, id).
    pub fn range_query(&self, query: &O, radius: Distance) -> Result<Vec<DistanceId>> {
        self.range_query_traced(query, radius, &mut QueryTrace::new())
    }

    pub fn range_query_traced(&self, query: &O, radius: Distance, query_trace: &mut QueryTrace) -> Result<Vec<DistanceId>> {

        check_radius(radius)?;

        let mut hits = Vec::new();
        self.range_search(query, radius, &mut hits, query_trace)?;
        hits.sort_by(DistanceId::ascending);

        debug!("range query r={}: {} nodes, {} distances, {} hits",
               radius, query_trace.nodes_visited, query_trace.distance_computations, hits.len());

        Ok(hits)
    }

    pub fn range_query_by_id(&self, id: ObjectId, radius: Distance) -> Result<Vec<DistanceId>> {

        let query = self.relation.get(id)?;

        self.range_query(query, radius)
    }

    /// Every object `o` that would have `query` among its own `k` nearest neighbors, that is
    /// `d(query, o) <= knn_k(o)`, ascending by (distance, id).
    ///
    /// Relies on the kNN distances stored in the tree, so `k` may not exceed `k_max`.
    pub fn reverse_knn_query(&self, query: &O, k: usize) -> Result<Vec<DistanceId>> {
        self.reverse_knn_query_traced(query, k, &mut QueryTrace::new())
    }

    pub fn reverse_knn_query_traced(&self, query: &O, k: usize, query_trace: &mut QueryTrace) -> Result<Vec<DistanceId>> {

        check_k(k)?;

        if k > self.k_max() {
            return Err(Error::invalid_argument(format!(
                "k={} exceeds the kNN distances stored in the tree (k_max={})", k, self.k_max()
            )));
        }

        let mut hits = Vec::new();
        self.reverse_knn_search(query, k, &mut hits, query_trace)?;
        hits.sort_by(DistanceId::ascending);

        debug!("reverse knn query k={}: {} nodes, {} distances, {} hits",
               k, query_trace.nodes_visited, query_trace.distance_computations, hits.len());

        Ok(hits)
    }

    fn distance_to(&self, query: &O, id: ObjectId, query_trace: &mut QueryTrace) -> Result<Distance> {

        let object = self.relation.get(id)?;
        query_trace.distance_computations += 1;

        Ok(self.metric.distance(query, object))
    }

    fn knn_search(&self, query: &O, mut knn: KnnHeap, query_trace: &mut QueryTrace) -> Result<Vec<DistanceId>> {

        let mut nodes_to_check = Heap::new(SearchCandidate::ascending as CandidateCmp);
        nodes_to_check.add(SearchCandidate::root(self.root));

        while let Some(candidate) = nodes_to_check.poll() {

            let bound = knn.pruning_bound();

            // every remaining candidate is at least as far
            if candidate.mindist > bound {
                if query_trace.pruned.is_some() {
                    let remaining = std::iter::once(&candidate).chain(nodes_to_check.iter());
                    for c in remaining {
                        query_trace.prune(Pruned::Subtree { node: c.node, lower_bound: c.mindist });
                    }
                }
                break;
            }

            query_trace.nodes_visited += 1;

            match self.nodes.get_node(&candidate.node)? {
                Node::Directory(entries) => {
                    for entry in entries {
                        let r = entry.covering_radius;

                        if let Some(lb) = parent_lower_bound(candidate.routing_distance, entry.parent_distance) {
                            if lb > bound + r {
                                query_trace.prune(Pruned::Subtree { node: entry.child, lower_bound: lb - r });
                                continue;
                            }
                        }

                        let d = self.distance_to(query, entry.routing_id, query_trace)?;
                        let mindist = (d - r).max(0.0);

                        match mindist <= bound {
                            true => nodes_to_check.add(SearchCandidate {
                                mindist,
                                node: entry.child,
                                routing_id: Some(entry.routing_id),
                                routing_distance: Some(d),
                            }),
                            false => query_trace.prune(Pruned::Subtree { node: entry.child, lower_bound: mindist }),
                        }
                    }
                },
                Node::Leaf(entries) => {
                    for entry in entries {
                        // the bound tightens while the leaf is scanned
                        let bound = knn.pruning_bound();

                        if let Some(lb) = parent_lower_bound(candidate.routing_distance, entry.parent_distance) {
                            if lb > bound {
                                query_trace.prune(Pruned::Object { id: entry.routing_id, lower_bound: lb });
                                continue;
                            }
                        }

                        let d = self.distance_to(query, entry.routing_id, query_trace)?;
                        knn.insert(d, entry.routing_id);
                    }
                },
            }
        }

        Ok(knn.drain_sorted())
    }

    /// Depth first walk of every subtree that may hold an object within `radius`.
    fn range_search(&self, query: &O, radius: Distance, hits: &mut Vec<DistanceId>, query_trace: &mut QueryTrace) -> Result<()> {

        // (node, distance from the query to the routing object pointing at it)
        let mut nodes_to_check: Vec<(NodeRef, Option<Distance>)> = vec![(self.root, None)];

        while let Some((curr_pointer, routing_distance)) = nodes_to_check.pop() {

            query_trace.nodes_visited += 1;

            match self.nodes.get_node(&curr_pointer)? {
                Node::Directory(entries) => {
                    for entry in entries {
                        let r = entry.covering_radius;

                        if let Some(lb) = parent_lower_bound(routing_distance, entry.parent_distance) {
                            if lb > radius + r {
                                query_trace.prune(Pruned::Subtree { node: entry.child, lower_bound: lb - r });
                                continue;
                            }
                        }

                        let d = self.distance_to(query, entry.routing_id, query_trace)?;

                        match d <= radius + r {
                            true => nodes_to_check.push((entry.child, Some(d))),
                            false => query_trace.prune(Pruned::Subtree { node: entry.child, lower_bound: d - r }),
                        }
                    }
                },
                Node::Leaf(entries) => {
                    for entry in entries {
                        if let Some(lb) = parent_lower_bound(routing_distance, entry.parent_distance) {
                            if lb > radius {
                                query_trace.prune(Pruned::Object { id: entry.routing_id, lower_bound: lb });
                                continue;
                            }
                        }

                        let d = self.distance_to(query, entry.routing_id, query_trace)?;
                        if d <= radius {
                            hits.push(DistanceId::new(d, entry.routing_id));
                        }
                    }
                },
            }
        }

        Ok(())
    }

    /// Same walk as the range search, with each entry's own kth neighbor distance in place
    /// of a fixed radius.
    fn reverse_knn_search(&self, query: &O, k: usize, hits: &mut Vec<DistanceId>, query_trace: &mut QueryTrace) -> Result<()> {

        let mut nodes_to_check: Vec<(NodeRef, Option<Distance>)> = vec![(self.root, None)];

        while let Some((curr_pointer, routing_distance)) = nodes_to_check.pop() {

            query_trace.nodes_visited += 1;

            match self.nodes.get_node(&curr_pointer)? {
                Node::Directory(entries) => {
                    for entry in entries {
                        let r = entry.covering_radius;
                        let knn_distance = stored_knn_distance(entry.knn_distances.as_slice(), k, entry.routing_id)?;

                        if let Some(lb) = parent_lower_bound(routing_distance, entry.parent_distance) {
                            if lb > knn_distance + r {
                                query_trace.prune(Pruned::Subtree { node: entry.child, lower_bound: lb - r });
                                continue;
                            }
                        }

                        let d = self.distance_to(query, entry.routing_id, query_trace)?;
                        let mindist = (d - r).max(0.0);

                        match mindist <= knn_distance {
                            true => nodes_to_check.push((entry.child, Some(d))),
                            false => query_trace.prune(Pruned::Subtree { node: entry.child, lower_bound: mindist }),
                        }
                    }
                },
                Node::Leaf(entries) => {
                    for entry in entries {
                        let knn_distance = stored_knn_distance(entry.knn_distances.as_slice(), k, entry.routing_id)?;

                        if let Some(lb) = parent_lower_bound(routing_distance, entry.parent_distance) {
                            if lb > knn_distance {
                                query_trace.prune(Pruned::Object { id: entry.routing_id, lower_bound: lb });
                                continue;
                            }
                        }

                        let d = self.distance_to(query, entry.routing_id, query_trace)?;
                        if d <= knn_distance {
                            hits.push(DistanceId::new(d, entry.routing_id));
                        }
                    }
                },
            }
        }

        Ok(())
    }
}

fn stored_knn_distance(knn_distances: &[Distance], k: usize, routing_id: ObjectId) -> Result<Distance> {
    match knn_distances.get(k - 1) {
        Some(d) => Ok(*d),
        None => Err(Error::consistency(format!(
            "entry {} stores {} kNN distances, k={} requested", routing_id, knn_distances.len(), k
        ))),
    }
}
