//! Exact similarity search over a metric tree (M-tree family) for any distance function that is a
//! metric.
//!
//! Objects live in a [`data::Relation`] and are only ever referenced by id. The tree is made of
//! leaf nodes holding object entries and directory nodes holding routing entries, each routing
//! entry covering its subtree with a ball around a routing object. Every entry stores its distance
//! to the parent's routing object, which lets the queries discard most of the tree with the
//! triangle inequality alone.
//!
//! Queries:
//! - k nearest neighbors, best first over a priority queue of subtrees
//! - range, depth first
//! - reverse k nearest neighbors, using per-k kNN distances stored in the tree
//!
//! The priority queues they are built on are in [`heap`] and usable on their own.
//!
//! TODO
//! - [x] bulk loading into an in-memory node store
//! - [ ] batched knn queries sharing one traversal
//! - [ ] a node store backed by pages on disk
//!
pub mod build;
pub mod data;
pub mod error;
pub mod heap;
pub mod io;
pub mod node;
pub mod query;
pub mod tree;

pub use build::BulkLoader;
pub use data::{Descriptor, Distance, DistanceId, Euclidean, Metric, ObjectId, Relation};
pub use error::{Error, Result};
pub use query::QueryTrace;
pub use tree::{Tree, TreeConfig};
