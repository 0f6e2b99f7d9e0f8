//! Bounded heap of (distance, id) candidates used by the knn query.

use std::cmp::Ordering;

use crate::data::{Distance, DistanceId, ObjectId};
use crate::error::Result;
use crate::heap::bounded::{BoundedHeap, TiedBoundedHeap};

type KnnCmp = fn(&DistanceId, &DistanceId) -> Ordering;

/// Largest distance first, and the larger id first among equal distances.
fn worst_first(a: &DistanceId, b: &DistanceId) -> Ordering {
    b.distance.total_cmp(&a.distance).then_with(|| b.id.cmp(&a.id))
}

/// Largest distance first; equal distances compare equal so they end up as ties.
fn worst_first_by_distance(a: &DistanceId, b: &DistanceId) -> Ordering {
    b.distance.total_cmp(&a.distance)
}

#[derive(Debug)]
enum Candidates {
    Exact(BoundedHeap<DistanceId, KnnCmp>),
    Tied(TiedBoundedHeap<DistanceId, KnnCmp>),
}

/// Keeps the `k` nearest candidates seen so far.
///
/// The exact flavour keeps exactly `k` results, resolving equal distances in favor of the smaller
/// id. The tied flavour also keeps every candidate tying the kth distance.
#[derive(Debug)]
pub struct KnnHeap {
    candidates: Candidates,
    k: usize,
}

impl KnnHeap {

    pub fn new(k: usize) -> Result<Self> {
        Ok(Self {
            candidates: Candidates::Exact(BoundedHeap::new(k, worst_first as KnnCmp)?),
            k,
        })
    }

    pub fn with_ties(k: usize) -> Result<Self> {
        Ok(Self {
            candidates: Candidates::Tied(TiedBoundedHeap::new(k, worst_first_by_distance as KnnCmp)?),
            k,
        })
    }

    pub fn k(&self) -> usize {
        self.k
    }

    pub fn len(&self) -> usize {
        match &self.candidates {
            Candidates::Exact(heap) => heap.len(),
            Candidates::Tied(heap) => heap.len(),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// The kth distance: +inf until `k` candidates are held, then the worst kept distance.
    ///
    /// Never increases over the lifetime of the heap.
    pub fn pruning_bound(&self) -> Distance {

        let (full, worst) = match &self.candidates {
            Candidates::Exact(heap) => (heap.is_full(), heap.peek()),
            Candidates::Tied(heap) => (heap.is_full(), heap.boundary()),
        };

        match (full, worst) {
            (true, Some(worst)) => worst.distance,
            _ => Distance::INFINITY,
        }
    }

    /// Offers a candidate. Returns whether it was kept.
    pub fn insert(&mut self, distance: Distance, id: ObjectId) -> bool {

        if self.len() >= self.k && distance > self.pruning_bound() {
            return false;
        }

        let candidate = DistanceId::new(distance, id);

        match &mut self.candidates {
            Candidates::Exact(heap) => {
                match heap.add(candidate) {
                    Some(dropped) => dropped.id != id || dropped.distance != distance,
                    None => true,
                }
            },
            Candidates::Tied(heap) => {
                // anything within the bound survives, either in the heap or as a tie
                heap.add(candidate);
                true
            },
        }
    }

    /// Unordered view of the kept candidates.
    pub fn iter(&self) -> Box<dyn Iterator<Item = &DistanceId> + '_> {
        match &self.candidates {
            Candidates::Exact(heap) => Box::new(heap.iter()),
            Candidates::Tied(heap) => Box::new(heap.iter()),
        }
    }

    /// Consumes the heap and returns its candidates ascending by (distance, id).
    pub fn drain_sorted(self) -> Vec<DistanceId> {

        match self.candidates {
            Candidates::Exact(mut heap) => {
                let mut sorted = Vec::with_capacity(heap.len());
                while let Some(worst) = heap.poll() {
                    sorted.push(worst);
                }
                sorted.reverse();
                sorted
            },
            Candidates::Tied(heap) => {
                let mut sorted = heap.into_vec();
                sorted.sort_by(DistanceId::ascending);
                sorted
            },
        }
    }
}
