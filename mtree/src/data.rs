//! Object identifiers, distances and the object store the tree indexes.
//!
//! The tree never owns objects: entries only carry an [`ObjectId`] which is resolved through a
//! [`Relation`] whenever a distance has to be computed.

use std::cmp::Ordering;
use std::fmt;

use rand::Rng;
use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};

/// Handle into a [`Relation`]. Copyable, totally ordered and cheap to compare.
pub type ObjectId = u64;

/// Non-negative distance value produced by a [`Metric`].
pub type Distance = f64;

/// A (distance, id) pair. Element type of the knn heap and of every query result.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct DistanceId {
    pub distance: Distance,
    pub id: ObjectId,
}

impl DistanceId {

    pub fn new(distance: Distance, id: ObjectId) -> Self {
        Self { distance, id }
    }

    /// Ascending by distance, ties broken by id.
    pub fn ascending(a: &DistanceId, b: &DistanceId) -> Ordering {
        a.distance.total_cmp(&b.distance).then_with(|| a.id.cmp(&b.id))
    }
}

impl fmt::Display for DistanceId {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "{}: {:.6}", self.id, self.distance)
    }
}

/// Distance function over objects of type `O`.
///
/// Implementations must be a metric (non-negativity, identity, symmetry and the triangle
/// inequality). This is never checked: a function that breaks the axioms makes pruning unsound
/// and queries silently miss neighbors.
pub trait Metric<O: ?Sized> {
    fn distance(&self, a: &O, b: &O) -> Distance;
}

impl<O: ?Sized, F> Metric<O> for F
where
    F: Fn(&O, &O) -> Distance,
{
    fn distance(&self, a: &O, b: &O) -> Distance {
        self(a, b)
    }
}

/// Euclidean distance between two [`Descriptor`]s.
#[derive(Debug, Clone, Copy, Default)]
pub struct Euclidean;

impl Metric<Descriptor> for Euclidean {
    fn distance(&self, a: &Descriptor, b: &Descriptor) -> Distance {
        a.distance(b)
    }
}

/// Fixed length real-valued feature vector.
#[derive(Debug, PartialEq, Clone, Serialize, Deserialize)]
pub struct Descriptor {
    pub data: Vec<f64>,
}

impl Descriptor {

    pub fn distance(&self, other: &Descriptor) -> Distance {

        let mut sum: f64 = 0.0;
        for (a, b) in self.data.iter().zip(other.data.iter()) {
            let diff = a - b;
            sum += diff * diff;
        }

        return sum.sqrt();
    }

    pub fn random<R: Rng>(rng: &mut R, length: usize) -> Self {

        let data: Vec<f64> = (0..length).map(|_| rng.gen::<f64>()).collect();
        return Self { data };
    }

    pub fn from_vec(data: Vec<f64>) -> Self {
        Self { data }
    }

    pub fn len(&self) -> usize {
        self.data.len()
    }

    pub fn is_empty(&self) -> bool {
        self.data.is_empty()
    }

    /// Parses one comma separated line of numbers.
    pub fn from_csv_line(line: &str) -> Result<Self> {

        let mut data: Vec<f64> = Vec::new();
        for field in line.split(',') {
            let field = field.trim();
            let value = field
                .parse::<f64>()
                .map_err(|_| Error::invalid_argument(format!("not a number: {:?}", field)))?;
            data.push(value);
        }

        return Ok(Self { data });
    }

    pub fn yaml(&self) -> String {

        let mut s = "[".to_string();
        for (i, item) in self.data.iter().enumerate() {
            if i != 0 { s += ","; }
            s += &format!("{:.3}", item);
        }
        s += "]";

        return s;
    }
}

/// Read-only object store addressed by [`ObjectId`].
///
/// Ids are dense: the n-th inserted object gets id `n`.
#[derive(Debug, Clone)]
pub struct Relation<O> {
    objects: Vec<O>,
}

impl<O> Default for Relation<O> {
    fn default() -> Self {
        Self { objects: Vec::new() }
    }
}

impl<O> Relation<O> {

    pub fn new() -> Self {
        Self::default()
    }

    pub fn from_vec(objects: Vec<O>) -> Self {
        Self { objects }
    }

    pub fn insert(&mut self, object: O) -> ObjectId {
        self.objects.push(object);
        (self.objects.len() - 1) as ObjectId
    }

    pub fn get(&self, id: ObjectId) -> Result<&O> {
        self.objects.get(id as usize).ok_or(Error::ObjectNotFound(id))
    }

    pub fn len(&self) -> usize {
        self.objects.len()
    }

    pub fn is_empty(&self) -> bool {
        self.objects.is_empty()
    }

    pub fn ids(&self) -> impl Iterator<Item = ObjectId> {
        (0..self.objects.len()).map(|i| i as ObjectId)
    }

    pub fn iter(&self) -> impl Iterator<Item = (ObjectId, &O)> {
        self.objects.iter().enumerate().map(|(i, o)| (i as ObjectId, o))
    }
}
