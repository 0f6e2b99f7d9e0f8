//! Array backed binary heap ordered by an external comparator.

use std::cmp::Ordering;
use std::fmt;

use crate::error::{Error, Result};

/// Capacity used by [`Heap::new`].
pub const DEFAULT_INITIAL_CAPACITY: usize = 11;

/// Below this capacity the backing array doubles, above it grows by half.
const GROWTH_THRESHOLD: usize = 64;

#[inline]
pub(crate) fn parent(i: usize) -> usize {
    (i - 1) / 2
}

#[inline]
pub(crate) fn left_child(i: usize) -> usize {
    2 * i + 1
}

/// Binary heap over plain values.
///
/// The element for which `cmp` returns [`Ordering::Less`] against every other element sits at
/// the top, i.e. after any sequence of operations `cmp(queue[parent(i)], queue[i]) != Greater`
/// holds for every non-root slot. Pass a reversed comparator to get a max-heap.
pub struct Heap<T, C> {
    queue: Vec<T>,
    cmp: C,
}

impl<T: fmt::Debug, C> fmt::Debug for Heap<T, C> {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        f.debug_struct("Heap").field("queue", &self.queue).finish()
    }
}

impl<T, C> Heap<T, C>
where
    C: Fn(&T, &T) -> Ordering,
{
    pub fn new(cmp: C) -> Self {
        Self::with_capacity(DEFAULT_INITIAL_CAPACITY, cmp)
    }

    pub fn with_capacity(capacity: usize, cmp: C) -> Self {
        Self {
            queue: Vec::with_capacity(capacity),
            cmp,
        }
    }

    pub fn len(&self) -> usize {
        self.queue.len()
    }

    pub fn is_empty(&self) -> bool {
        self.queue.is_empty()
    }

    pub fn capacity(&self) -> usize {
        self.queue.capacity()
    }

    pub fn compare(&self, a: &T, b: &T) -> Ordering {
        (self.cmp)(a, b)
    }

    pub fn clear(&mut self) {
        self.queue.clear();
    }

    pub fn peek(&self) -> Option<&T> {
        self.queue.first()
    }

    pub fn add(&mut self, e: T) {

        self.grow_if_full();
        self.queue.push(e);

        let last = self.queue.len() - 1;
        self.sift_up(last);
    }

    pub fn poll(&mut self) -> Option<T> {

        if self.queue.is_empty() {
            return None;
        }

        let top = self.queue.swap_remove(0);
        if !self.queue.is_empty() {
            self.sift_down(0);
        }

        return Some(top);
    }

    /// Removes the top and inserts `e` with a single sift-down.
    ///
    /// Returns the removed top, or `None` (after a plain `add`) when the heap was empty.
    pub fn replace_top(&mut self, e: T) -> Option<T> {

        if self.queue.is_empty() {
            self.add(e);
            return None;
        }

        let old = std::mem::replace(&mut self.queue[0], e);
        self.sift_down(0);

        return Some(old);
    }

    /// Unordered traversal of the backing array.
    pub fn iter(&self) -> std::slice::Iter<'_, T> {
        self.queue.iter()
    }

    /// Consumes the heap, returning the backing array in heap order.
    pub fn into_vec(self) -> Vec<T> {
        self.queue
    }

    /// Verifies the heap property for every slot.
    pub fn check_heap(&self) -> Result<()> {

        for i in 1..self.queue.len() {
            let p = parent(i);
            if (self.cmp)(&self.queue[p], &self.queue[i]) == Ordering::Greater {
                return Err(Error::consistency(format!("heap order broken between slot {} and its parent {}", i, p)));
            }
        }

        Ok(())
    }

    fn grow_if_full(&mut self) {

        let capacity = self.queue.capacity();
        if self.queue.len() < capacity {
            return;
        }

        let extra = match capacity < GROWTH_THRESHOLD {
            true => capacity.max(1),
            false => capacity / 2,
        };
        self.queue.reserve_exact(extra);
    }

    fn sift_up(&mut self, mut pos: usize) {

        while pos > 0 {
            let p = parent(pos);
            if (self.cmp)(&self.queue[p], &self.queue[pos]) != Ordering::Greater {
                break;
            }
            self.queue.swap(p, pos);
            pos = p;
        }
    }

    fn sift_down(&mut self, mut pos: usize) {

        let len = self.queue.len();
        loop {
            let mut best = left_child(pos);
            if best >= len {
                break;
            }

            let right = best + 1;
            if right < len && (self.cmp)(&self.queue[right], &self.queue[best]) == Ordering::Less {
                best = right;
            }

            if (self.cmp)(&self.queue[pos], &self.queue[best]) != Ordering::Greater {
                break;
            }

            self.queue.swap(pos, best);
            pos = best;
        }
    }
}

#[cfg(test)]
mod test {

    use super::*;
    use rand::prelude::*;

    fn ascending(a: &i64, b: &i64) -> Ordering {
        a.cmp(b)
    }

    fn min_heap() -> Heap<i64, fn(&i64, &i64) -> Ordering> {
        Heap::new(ascending as fn(&i64, &i64) -> Ordering)
    }

    #[test]
    fn empty_heap_is_absent_not_error() {

        let mut heap = min_heap();

        assert!(heap.is_empty());
        assert_eq!(heap.peek(), None);
        assert_eq!(heap.poll(), None);
        assert_eq!(heap.replace_top(4), None);
        assert_eq!(heap.peek(), Some(&4));
    }

    #[test]
    fn polls_in_order() {

        let mut heap = min_heap();
        for x in [5, 3, 9, 1, 7, 3] {
            heap.add(x);
        }

        let mut out = Vec::new();
        while let Some(x) = heap.poll() {
            out.push(x);
        }

        assert_eq!(out, vec![1, 3, 3, 5, 7, 9]);
    }

    #[test]
    fn reversed_comparator_is_max_heap() {

        let mut heap = Heap::new(|a: &i64, b: &i64| b.cmp(a));
        for x in [2, 8, 4] {
            heap.add(x);
        }

        assert_eq!(heap.peek(), Some(&8));
        assert_eq!(heap.replace_top(1), Some(8));
        assert_eq!(heap.poll(), Some(4));
    }

    #[test]
    fn growth_policy() {

        let mut heap = Heap::with_capacity(4, |a: &i64, b: &i64| a.cmp(b));
        for x in 0..5 {
            heap.add(x);
        }
        assert!(heap.capacity() >= 8);

        let mut heap = Heap::with_capacity(100, |a: &i64, b: &i64| a.cmp(b));
        for x in 0..101 {
            heap.add(x);
        }
        assert!(heap.capacity() >= 150);
    }

    #[test]
    fn fuzzed_heap_invariant() {

        let mut rng = StdRng::seed_from_u64(17);
        let mut heap = min_heap();
        let mut shadow: Vec<i64> = Vec::new();

        for _ in 0..5000 {
            match rng.gen_range(0..3) {
                0 => {
                    let x = rng.gen_range(-100..100);
                    heap.add(x);
                    shadow.push(x);
                },
                1 => {
                    let polled = heap.poll();
                    shadow.sort();
                    let expected = match shadow.is_empty() {
                        true => None,
                        false => Some(shadow.remove(0)),
                    };
                    assert_eq!(polled, expected);
                },
                _ => {
                    let x = rng.gen_range(-100..100);
                    let old = heap.replace_top(x);
                    shadow.sort();
                    let expected = match shadow.is_empty() {
                        true => None,
                        false => Some(shadow.remove(0)),
                    };
                    assert_eq!(old, expected);
                    shadow.push(x);
                },
            }

            heap.check_heap().unwrap();
            assert_eq!(heap.len(), shadow.len());
        }

        let mut contents: Vec<i64> = heap.iter().copied().collect();
        contents.sort();
        shadow.sort();
        assert_eq!(contents, shadow);

        heap.clear();
        assert!(heap.is_empty());
    }
}
