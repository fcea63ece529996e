//! Bounded, insertion-ordered history buffer.
//!
//! Every recorded stream in the engine (positions, per-rep values, smoothness
//! samples) goes through `BoundedHistory`. Capacity is fixed at construction
//! and pushing past it silently evicts the oldest element. This is the memory
//! policy for long sessions: growth is impossible by construction, so there is
//! no "history full" error to handle.

use std::collections::VecDeque;

/// Fixed-capacity FIFO history. Oldest element first.
#[derive(Debug, Clone)]
pub struct BoundedHistory<T> {
    items: VecDeque<T>,
    capacity: usize,
    evicted: u64,
}

impl<T> BoundedHistory<T> {
    /// Creates an empty history. A capacity of zero is raised to one.
    pub fn new(capacity: usize) -> Self {
        let capacity = capacity.max(1);
        Self {
            items: VecDeque::with_capacity(capacity),
            capacity,
            evicted: 0,
        }
    }

    /// Appends an item, evicting the oldest when full. O(1).
    pub fn push(&mut self, item: T) {
        if self.items.len() == self.capacity {
            self.items.pop_front();
            self.evicted += 1;
        }
        self.items.push_back(item);
    }

    /// Empties the history. Capacity is unchanged.
    pub fn clear(&mut self) {
        self.items.clear();
    }

    pub fn len(&self) -> usize {
        self.items.len()
    }

    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    pub fn is_full(&self) -> bool {
        self.items.len() == self.capacity
    }

    /// Number of items dropped by eviction since construction.
    pub fn evicted(&self) -> u64 {
        self.evicted
    }

    pub fn latest(&self) -> Option<&T> {
        self.items.back()
    }

    pub fn oldest(&self) -> Option<&T> {
        self.items.front()
    }

    /// Item at `index`, where 0 is the oldest.
    pub fn get(&self, index: usize) -> Option<&T> {
        self.items.get(index)
    }

    /// Iterates oldest to newest.
    pub fn iter(&self) -> std::collections::vec_deque::Iter<'_, T> {
        self.items.iter()
    }

    /// Iterates over the newest `n` items, oldest of them first.
    pub fn recent(&self, n: usize) -> impl Iterator<Item = &T> {
        let skip = self.items.len().saturating_sub(n);
        self.items.iter().skip(skip)
    }
}

impl<T: Clone> BoundedHistory<T> {
    /// Returns an ordered copy, oldest first.
    ///
    /// The copy is owned by the caller. Under the session worker the history
    /// itself is never shared, so a snapshot never contends with `push`.
    pub fn snapshot(&self) -> Vec<T> {
        self.items.iter().cloned().collect()
    }
}
