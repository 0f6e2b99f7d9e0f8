//! Priority queues used by the query engine.
//!
//! [`Heap`] is the comparator driven base. [`UpdatableHeap`] adds a key to slot index for
//! in-place priority changes. The bounded variants cap the heap at `k` elements and
//! [`KnnHeap`] specializes them for (distance, id) candidates.

pub mod binary;
pub mod bounded;
pub mod knn;
pub mod updatable;

pub use binary::Heap;
pub use bounded::{BoundedHeap, Overflow, TiedBoundedHeap, TiedBoundedUpdatableHeap};
pub use knn::KnnHeap;
pub use updatable::UpdatableHeap;
