//! Queue types for the processor
//!
//! [`OrderedQueue`] is an indexed binary min-heap: a flat arena of items
//! ordered by due time, plus a key -> position map that makes removal of an
//! arbitrary key O(log n) instead of a linear scan. Positions in the map are
//! kept current through every swap performed while sifting.

use std::cmp::Ordering;
use std::collections::HashMap;
use std::fmt::Debug;
use std::hash::Hash;

use tokio::time::Instant;

/// An item that can be queued for delayed execution.
///
/// Both accessors must be pure and stable for as long as the item is queued;
/// the processor calls them repeatedly while the item sits in the heap.
pub trait Queueable: Send + 'static {
    /// Stable unique identifier for the item. Items with equal keys are
    /// considered the same item. `Ord` doubles as the deterministic
    /// tie-break when two items share a due time.
    type Key: Ord + Hash + Eq + Clone + Debug + Send;

    /// The key for this unique item.
    fn key(&self) -> Self::Key;

    /// The absolute time the item is due to be executed at.
    fn due_time(&self) -> Instant;
}

/// Indexed min-heap of items, ordered by `(due_time, key)`.
pub struct OrderedQueue<T: Queueable> {
    heap: Vec<T>,
    index: HashMap<T::Key, usize>,
}

impl<T: Queueable> Default for OrderedQueue<T> {
    fn default() -> Self {
        Self::new()
    }
}

impl<T: Queueable> OrderedQueue<T> {
    /// Create an empty queue.
    pub fn new() -> Self {
        Self {
            heap: Vec::new(),
            index: HashMap::new(),
        }
    }

    /// Number of items currently queued.
    pub fn len(&self) -> usize {
        self.heap.len()
    }

    /// Returns `true` if no items are queued.
    pub fn is_empty(&self) -> bool {
        self.heap.is_empty()
    }

    /// The item with the smallest `(due_time, key)`, without removing it.
    pub fn peek(&self) -> Option<&T> {
        self.heap.first()
    }

    /// Returns `true` if an item with this key is queued.
    pub fn contains(&self, key: &T::Key) -> bool {
        self.index.contains_key(key)
    }

    /// Insert an item. The caller must have removed any existing item with
    /// the same key first; the processor does this under its lock.
    pub fn push(&mut self, item: T) {
        let key = item.key();
        debug_assert!(
            !self.index.contains_key(&key),
            "push with duplicate key: {key:?}"
        );

        let pos = self.heap.len();
        self.index.insert(key, pos);
        self.heap.push(item);
        self.sift_up(pos);

        debug_assert_eq!(self.heap.len(), self.index.len());
    }

    /// Remove the item with this key, if present. Absent keys are a no-op.
    pub fn remove(&mut self, key: &T::Key) -> Option<T> {
        let pos = self.index.remove(key)?;
        let last = self.heap.len() - 1;

        self.heap.swap(pos, last);
        let item = self.heap.pop()?;

        // The element swapped into the vacated slot may violate the heap
        // property in either direction.
        if pos < last {
            self.index.insert(self.heap[pos].key(), pos);
            if self.sift_down(pos) == pos {
                self.sift_up(pos);
            }
        }

        debug_assert_eq!(self.heap.len(), self.index.len());
        Some(item)
    }

    /// Remove and return the item with the smallest `(due_time, key)`.
    pub fn pop_min(&mut self) -> Option<T> {
        let key = self.peek()?.key();
        self.remove(&key)
    }

    fn less(&self, a: usize, b: usize) -> bool {
        let (ia, ib) = (&self.heap[a], &self.heap[b]);
        match ia.due_time().cmp(&ib.due_time()) {
            Ordering::Equal => ia.key() < ib.key(),
            ord => ord == Ordering::Less,
        }
    }

    /// Swap two heap slots, keeping the position map in sync.
    fn swap_slots(&mut self, a: usize, b: usize) {
        self.heap.swap(a, b);
        self.index.insert(self.heap[a].key(), a);
        self.index.insert(self.heap[b].key(), b);
    }

    fn sift_up(&mut self, mut pos: usize) -> usize {
        while pos > 0 {
            let parent = (pos - 1) / 2;
            if !self.less(pos, parent) {
                break;
            }
            self.swap_slots(pos, parent);
            pos = parent;
        }
        pos
    }

    fn sift_down(&mut self, mut pos: usize) -> usize {
        loop {
            let left = 2 * pos + 1;
            if left >= self.heap.len() {
                break;
            }
            let mut child = left;
            let right = left + 1;
            if right < self.heap.len() && self.less(right, left) {
                child = right;
            }
            if !self.less(child, pos) {
                break;
            }
            self.swap_slots(pos, child);
            pos = child;
        }
        pos
    }
}
