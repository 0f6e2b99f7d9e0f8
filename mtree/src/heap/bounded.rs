//! Heaps capped at `k` elements.
//!
//! All heaps here are *worst first*: the comparator must rank the worst element at the top
//! (`cmp(a, b) == Less` means `a` is worse than `b`), so the element to evict is always the one
//! that [`Heap::peek`] returns.

use std::cmp::Ordering;
use std::fmt;
use std::hash::Hash;

use crate::error::{Error, Result};
use crate::heap::binary::Heap;
use crate::heap::updatable::UpdatableHeap;

/// What happened to an element offered to a full bounded heap.
#[derive(Debug, PartialEq)]
pub enum Overflow<T> {
    /// Stored without evicting anything.
    None,
    /// Worse than the current worst, not stored.
    Rejected(T),
    /// Exactly as bad as the current worst, not stored.
    Tied(T),
    /// Stored; carries the previous worst which was evicted to make room.
    Displaced(T),
}

impl<T> Overflow<T> {

    pub fn into_inner(self) -> Option<T> {
        match self {
            Overflow::None => None,
            Overflow::Rejected(e) | Overflow::Tied(e) | Overflow::Displaced(e) => Some(e),
        }
    }
}

fn check_k(k: usize) -> Result<()> {
    match k {
        0 => Err(Error::invalid_argument("bounded heap size must be at least 1")),
        _ => Ok(()),
    }
}

/// Worst-first heap holding at most `k` elements.
pub struct BoundedHeap<T, C> {
    heap: Heap<T, C>,
    k: usize,
}

impl<T: fmt::Debug, C> fmt::Debug for BoundedHeap<T, C> {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        f.debug_struct("BoundedHeap").field("k", &self.k).field("heap", &self.heap).finish()
    }
}

impl<T, C> BoundedHeap<T, C>
where
    C: Fn(&T, &T) -> Ordering,
{
    pub fn new(k: usize, cmp: C) -> Result<Self> {

        check_k(k)?;

        // one spare slot for the transient overflow element
        Ok(Self {
            heap: Heap::with_capacity(k + 1, cmp),
            k,
        })
    }

    pub fn k(&self) -> usize {
        self.k
    }

    pub fn len(&self) -> usize {
        self.heap.len()
    }

    pub fn is_empty(&self) -> bool {
        self.heap.is_empty()
    }

    pub fn is_full(&self) -> bool {
        self.heap.len() >= self.k
    }

    pub fn compare(&self, a: &T, b: &T) -> Ordering {
        self.heap.compare(a, b)
    }

    /// The current worst element.
    pub fn peek(&self) -> Option<&T> {
        self.heap.peek()
    }

    pub fn poll(&mut self) -> Option<T> {
        self.heap.poll()
    }

    pub fn replace_top(&mut self, e: T) -> Option<T> {
        self.heap.replace_top(e)
    }

    pub fn clear(&mut self) {
        self.heap.clear();
    }

    pub fn iter(&self) -> std::slice::Iter<'_, T> {
        self.heap.iter()
    }

    pub fn into_vec(self) -> Vec<T> {
        self.heap.into_vec()
    }

    pub fn check_heap(&self) -> Result<()> {

        if self.heap.len() > self.k {
            return Err(Error::consistency(format!("bounded heap holds {} > {} elements", self.heap.len(), self.k)));
        }

        self.heap.check_heap()
    }

    /// Offers `e` and reports its fate. Nothing is discarded silently: rejected, tied and
    /// displaced elements are handed back to the caller.
    pub fn offer(&mut self, e: T) -> Overflow<T> {

        if self.heap.len() < self.k {
            self.heap.add(e);
            return Overflow::None;
        }

        let ordering = match self.heap.peek() {
            Some(top) => self.heap.compare(&e, top),
            None => {
                self.heap.add(e);
                return Overflow::None;
            },
        };

        match ordering {
            Ordering::Less => Overflow::Rejected(e),
            Ordering::Equal => Overflow::Tied(e),
            Ordering::Greater => match self.heap.replace_top(e) {
                Some(old) => Overflow::Displaced(old),
                None => Overflow::None,
            },
        }
    }

    /// Adds `e`, discarding whatever overflows. Returns the discarded element, if any.
    pub fn add(&mut self, e: T) -> Option<T> {
        self.offer(e).into_inner()
    }
}

/// Bounded heap that keeps elements tying the current worst in a side list.
///
/// `len()` can exceed `k` by the number of ties. `peek`/`poll` serve the ties before the primary
/// heap's top, since a tie is never better than the boundary.
pub struct TiedBoundedHeap<T, C> {
    heap: BoundedHeap<T, C>,
    ties: Vec<T>,
}

impl<T: fmt::Debug, C> fmt::Debug for TiedBoundedHeap<T, C> {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        f.debug_struct("TiedBoundedHeap").field("heap", &self.heap).field("ties", &self.ties).finish()
    }
}

impl<T, C> TiedBoundedHeap<T, C>
where
    C: Fn(&T, &T) -> Ordering,
{
    pub fn new(k: usize, cmp: C) -> Result<Self> {
        Ok(Self {
            heap: BoundedHeap::new(k, cmp)?,
            ties: Vec::new(),
        })
    }

    pub fn k(&self) -> usize {
        self.heap.k()
    }

    pub fn len(&self) -> usize {
        self.heap.len() + self.ties.len()
    }

    pub fn is_empty(&self) -> bool {
        self.heap.is_empty() && self.ties.is_empty()
    }

    pub fn is_full(&self) -> bool {
        self.heap.is_full()
    }

    pub fn ties(&self) -> &[T] {
        &self.ties
    }

    /// Worst element of the primary heap, ignoring the tie list.
    pub fn boundary(&self) -> Option<&T> {
        self.heap.peek()
    }

    pub fn peek(&self) -> Option<&T> {
        self.ties.last().or_else(|| self.heap.peek())
    }

    pub fn poll(&mut self) -> Option<T> {
        match self.ties.pop() {
            Some(tie) => Some(tie),
            None => self.heap.poll(),
        }
    }

    pub fn add(&mut self, e: T) {

        match self.heap.offer(e) {
            Overflow::None | Overflow::Rejected(_) => {},
            Overflow::Tied(e) => self.ties.push(e),
            Overflow::Displaced(old) => self.handle_displaced(old),
        }
    }

    /// Emulated as poll followed by add; the resulting contents are the same as a direct
    /// replacement would give.
    pub fn replace_top(&mut self, e: T) -> Option<T> {

        let old = self.poll();
        self.add(e);

        return old;
    }

    pub fn clear(&mut self) {
        self.heap.clear();
        self.ties.clear();
    }

    pub fn iter(&self) -> impl Iterator<Item = &T> {
        self.heap.iter().chain(self.ties.iter())
    }

    pub fn into_vec(self) -> Vec<T> {
        let mut v = self.heap.into_vec();
        v.extend(self.ties);
        v
    }

    /// Verifies the primary heap and that every tie equals its current worst.
    pub fn check_heap(&self) -> Result<()> {

        self.heap.check_heap()?;

        if self.ties.is_empty() {
            return Ok(());
        }

        let top = match self.heap.peek() {
            Some(top) => top,
            None => return Err(Error::consistency("ties kept next to an empty heap")),
        };

        for (i, tie) in self.ties.iter().enumerate() {
            if self.heap.compare(tie, top) != Ordering::Equal {
                return Err(Error::consistency(format!("tie {} does not match the current worst", i)));
            }
        }

        Ok(())
    }

    fn handle_displaced(&mut self, old: T) {

        let tied = match self.heap.peek() {
            Some(top) => self.heap.compare(&old, top) == Ordering::Equal,
            None => false,
        };

        match tied {
            true => self.ties.push(old),
            false => self.ties.clear(),
        }
    }
}

/// Tied bounded heap whose elements are keyed, combining the tie list with the position index of
/// [`UpdatableHeap`].
///
/// New keys follow the bounded rules. Re-adding a tracked key follows the updatable rules: the
/// priority only moves towards the top (i.e. gets worse here), and an element pushed past the
/// boundary while ties exist is evicted in favor of one of the ties.
pub struct TiedBoundedUpdatableHeap<K, P, C> {
    heap: UpdatableHeap<K, P, C>,
    k: usize,
    ties: Vec<(K, P)>,
}

impl<K: fmt::Debug, P: fmt::Debug, C> fmt::Debug for TiedBoundedUpdatableHeap<K, P, C> {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        f.debug_struct("TiedBoundedUpdatableHeap")
            .field("k", &self.k)
            .field("heap", &self.heap)
            .field("ties", &self.ties)
            .finish()
    }
}

impl<K, P, C> TiedBoundedUpdatableHeap<K, P, C>
where
    K: Copy + Eq + Hash,
    C: Fn(&P, &P) -> Ordering,
{
    pub fn new(k: usize, cmp: C) -> Result<Self> {

        check_k(k)?;

        Ok(Self {
            heap: UpdatableHeap::with_capacity(k + 1, cmp),
            k,
            ties: Vec::new(),
        })
    }

    pub fn len(&self) -> usize {
        self.heap.len() + self.ties.len()
    }

    pub fn is_empty(&self) -> bool {
        self.heap.is_empty() && self.ties.is_empty()
    }

    pub fn contains(&self, key: &K) -> bool {
        self.heap.contains(key) || self.ties.iter().any(|(k, _)| k == key)
    }

    pub fn ties(&self) -> &[(K, P)] {
        &self.ties
    }

    pub fn peek(&self) -> Option<&(K, P)> {
        self.ties.last().or_else(|| self.heap.peek())
    }

    pub fn poll(&mut self) -> Option<(K, P)> {
        match self.ties.pop() {
            Some(tie) => Some(tie),
            None => self.heap.poll(),
        }
    }

    pub fn replace_top(&mut self, key: K, priority: P) -> Option<(K, P)> {

        let old = self.poll();
        self.add(key, priority);

        return old;
    }

    pub fn clear(&mut self) {
        self.heap.clear();
        self.ties.clear();
    }

    pub fn iter(&self) -> impl Iterator<Item = &(K, P)> {
        self.heap.iter().chain(self.ties.iter())
    }

    /// Returns whether the heap changed.
    pub fn add(&mut self, key: K, priority: P) -> bool {

        if self.heap.contains(&key) {
            return self.update_tracked(key, priority);
        }

        if let Some(pos) = self.ties.iter().position(|(k, _)| *k == key) {
            // a tie can only get worse, which puts it beyond the boundary
            if self.heap.compare(&priority, &self.ties[pos].1) == Ordering::Less {
                self.ties.swap_remove(pos);
                return true;
            }
            return false;
        }

        if self.heap.len() < self.k {
            self.heap.add(key, priority);
            return true;
        }

        let ordering = match self.heap.peek() {
            Some((_, top)) => self.heap.compare(&priority, top),
            None => Ordering::Greater,
        };

        match ordering {
            Ordering::Less => false,
            Ordering::Equal => {
                self.ties.push((key, priority));
                true
            },
            Ordering::Greater => {
                if let Some(old) = self.heap.replace_top(key, priority) {
                    self.handle_displaced(old);
                }
                true
            },
        }
    }

    pub fn check_heap(&self) -> Result<()> {

        self.heap.check_heap()?;

        if self.heap.len() > self.k {
            return Err(Error::consistency(format!("bounded heap holds {} > {} elements", self.heap.len(), self.k)));
        }

        if self.ties.is_empty() {
            return Ok(());
        }

        let top = match self.heap.peek() {
            Some((_, top)) => top,
            None => return Err(Error::consistency("ties kept next to an empty heap")),
        };

        for (key, tie) in self.ties.iter() {
            if self.heap.contains(key) {
                return Err(Error::consistency("key tracked both in the heap and in the tie list"));
            }
            if self.heap.compare(tie, top) != Ordering::Equal {
                return Err(Error::consistency("tie does not match the current worst"));
            }
        }

        Ok(())
    }

    fn update_tracked(&mut self, key: K, priority: P) -> bool {

        if !self.heap.add(key, priority) {
            return false;
        }

        let tie = match self.ties.first() {
            Some((_, tie)) => tie,
            None => return true,
        };

        let past_boundary = match self.heap.peek() {
            Some((_, top)) => self.heap.compare(top, tie) == Ordering::Less,
            None => false,
        };

        if past_boundary {
            self.heap.poll();
            if let Some((k, p)) = self.ties.pop() {
                self.heap.add(k, p);
            }
        }

        true
    }

    fn handle_displaced(&mut self, old: (K, P)) {

        let tied = match self.heap.peek() {
            Some((_, top)) => self.heap.compare(&old.1, top) == Ordering::Equal,
            None => false,
        };

        match tied {
            true => self.ties.push(old),
            false => self.ties.clear(),
        }
    }
}

#[cfg(test)]
mod test {

    use super::*;
    use rand::prelude::*;

    // worst first: larger values rank nearer the top
    fn worst_first(a: &u32, b: &u32) -> Ordering {
        b.cmp(a)
    }

    type Cmp = fn(&u32, &u32) -> Ordering;

    #[test]
    fn zero_k_is_invalid() {

        assert!(matches!(BoundedHeap::new(0, worst_first as Cmp), Err(Error::InvalidArgument(_))));
        assert!(matches!(TiedBoundedHeap::new(0, worst_first as Cmp), Err(Error::InvalidArgument(_))));
    }

    #[test]
    fn bounded_keeps_k_best() {

        let mut heap = BoundedHeap::new(3, worst_first as Cmp).unwrap();

        assert_eq!(heap.offer(5), Overflow::None);
        assert_eq!(heap.offer(1), Overflow::None);
        assert_eq!(heap.offer(8), Overflow::None);
        assert!(heap.is_full());

        assert_eq!(heap.offer(9), Overflow::Rejected(9));
        assert_eq!(heap.offer(8), Overflow::Tied(8));
        assert_eq!(heap.offer(2), Overflow::Displaced(8));
        assert_eq!(heap.add(3), Some(5));

        let mut kept = heap.into_vec();
        kept.sort();
        assert_eq!(kept, vec![1, 2, 3]);
    }

    #[test]
    fn tied_heap_keeps_exact_ties() {

        let mut heap = TiedBoundedHeap::new(2, worst_first as Cmp).unwrap();
        for x in [4, 2, 4, 4, 7] {
            heap.add(x);
        }

        assert_eq!(heap.len(), 4);
        assert_eq!(heap.ties(), &[4, 4]);
        heap.check_heap().unwrap();

        // 3 beats every 4, so the ties go stale
        heap.add(3);
        assert_eq!(heap.len(), 2);
        assert!(heap.ties().is_empty());
        assert_eq!(heap.peek(), Some(&3));
        heap.check_heap().unwrap();
    }

    #[test]
    fn displaced_element_can_become_a_tie() {

        let mut heap = TiedBoundedHeap::new(2, worst_first as Cmp).unwrap();
        for x in [3, 3, 3] {
            heap.add(x);
        }
        assert_eq!(heap.ties(), &[3]);

        // 1 evicts a 3 from the primary heap, but the worst is still 3
        heap.add(1);
        assert_eq!(heap.ties(), &[3, 3]);
        assert_eq!(heap.len(), 4);
        heap.check_heap().unwrap();

        heap.add(0);
        assert!(heap.ties().is_empty());
        assert_eq!(heap.peek(), Some(&1));
        heap.check_heap().unwrap();
    }

    #[test]
    fn tied_heap_serves_ties_first() {

        let mut heap = TiedBoundedHeap::new(2, worst_first as Cmp).unwrap();
        for x in [1, 5, 5] {
            heap.add(x);
        }

        assert_eq!(heap.peek(), Some(&5));
        assert_eq!(heap.poll(), Some(5));
        assert!(heap.ties().is_empty());
        assert_eq!(heap.poll(), Some(5));
        assert_eq!(heap.poll(), Some(1));
        assert_eq!(heap.poll(), None);
    }

    #[test]
    fn tied_replace_top() {

        let mut heap = TiedBoundedHeap::new(2, worst_first as Cmp).unwrap();
        heap.add(2);
        heap.add(6);

        assert_eq!(heap.replace_top(3), Some(6));
        let mut v = heap.into_vec();
        v.sort();
        assert_eq!(v, vec![2, 3]);
    }

    #[test]
    fn fuzzed_tied_invariants() {

        let mut rng = StdRng::seed_from_u64(11);

        for _ in 0..50 {
            let k = rng.gen_range(1..8);
            let mut heap = TiedBoundedHeap::new(k, worst_first as Cmp).unwrap();
            let mut seen: Vec<u32> = Vec::new();

            for _ in 0..200 {
                let x = rng.gen_range(0..20);
                heap.add(x);
                seen.push(x);

                heap.check_heap().unwrap();
                assert!(heap.len() <= k + heap.ties().len());

                // contents are exactly the k best plus everything tying the kth best
                seen.sort();
                let boundary = seen[k.min(seen.len()) - 1];
                let expected: Vec<u32> = seen.iter().copied().filter(|&v| v <= boundary).collect();
                let mut contents: Vec<u32> = heap.iter().copied().collect();
                contents.sort();
                assert_eq!(contents, expected);
            }
        }
    }

    fn worst_first_f64(a: &f64, b: &f64) -> Ordering {
        b.total_cmp(a)
    }

    type FCmp = fn(&f64, &f64) -> Ordering;

    #[test]
    fn tied_updatable_new_keys_follow_bounded_rules() {

        let mut heap = TiedBoundedUpdatableHeap::new(2, worst_first_f64 as FCmp).unwrap();

        assert!(heap.add(1u32, 1.0));
        assert!(heap.add(2, 5.0));
        assert!(!heap.add(3, 6.0));
        assert!(heap.add(4, 5.0));
        assert_eq!(heap.ties(), &[(4, 5.0)]);
        assert_eq!(heap.len(), 3);
        heap.check_heap().unwrap();

        assert!(heap.add(5, 2.0));
        assert!(heap.ties().is_empty());
        assert!(!heap.contains(&2));
        assert!(!heap.contains(&4));
        heap.check_heap().unwrap();
    }

    #[test]
    fn tied_updatable_updates_tracked_keys() {

        let mut heap = TiedBoundedUpdatableHeap::new(2, worst_first_f64 as FCmp).unwrap();
        heap.add(1u32, 1.0);
        heap.add(2, 5.0);
        heap.add(3, 5.0);
        assert_eq!(heap.ties().len(), 1);

        // moving towards the top is the only allowed update
        assert!(!heap.add(1, 0.5));

        // key 1 becomes worse than the tie at 5.0: it is evicted and the tie promoted
        assert!(heap.add(1, 9.0));
        assert!(!heap.contains(&1));
        assert!(heap.contains(&2));
        assert!(heap.contains(&3));
        assert!(heap.ties().is_empty());
        assert_eq!(heap.len(), 2);
        heap.check_heap().unwrap();

        assert_eq!(heap.poll().map(|(_, p)| p), Some(5.0));
        assert_eq!(heap.replace_top(7, 4.0).map(|(_, p)| p), Some(5.0));
        assert_eq!(heap.peek(), Some(&(7, 4.0)));
    }

    #[test]
    fn fuzzed_tied_updatable_invariants() {

        let mut rng = StdRng::seed_from_u64(13);

        for _ in 0..100 {
            let k = rng.gen_range(1..6);
            let mut heap = TiedBoundedUpdatableHeap::new(k, worst_first_f64 as FCmp).unwrap();

            for _ in 0..200 {
                // few keys and coarse priorities, so updates and exact ties are frequent
                let key: u32 = rng.gen_range(0..12);
                let priority = rng.gen_range(0..8) as f64;

                match rng.gen_range(0..10) {
                    0 => {
                        let before = heap.len();
                        let polled = heap.poll();
                        assert_eq!(polled.is_some(), before > 0);
                        if let Some((polled_key, _)) = polled {
                            assert!(!heap.contains(&polled_key));
                        }
                    },
                    1 => {
                        heap.replace_top(key, priority);
                    },
                    _ => {
                        heap.add(key, priority);
                    },
                }

                heap.check_heap().unwrap();
                assert!(heap.len() <= k + heap.ties().len());

                let mut keys: Vec<u32> = heap.iter().map(|(key, _)| *key).collect();
                let len = keys.len();
                keys.sort();
                keys.dedup();
                assert_eq!(keys.len(), len);
                assert_eq!(len, heap.len());
            }
        }
    }
}
