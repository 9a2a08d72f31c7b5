//! Bounded max-heap tracking the k-th smallest distance seen so far.

use std::cmp::Ordering;
use std::collections::BinaryHeap;

#[derive(Copy, Clone, PartialEq, Debug)]
struct Distance(f32);

impl Eq for Distance {}

impl PartialOrd for Distance {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for Distance {
    fn cmp(&self, other: &Self) -> Ordering {
        self.0.total_cmp(&other.0)
    }
}

/// Keeps the `k` smallest values inserted.
///
/// [`get`](Self::get) is `f32::MAX` until `k` values have been seen, then
/// the largest of the `k` kept.  Candidates at or below it are worth
/// queueing.
#[derive(Debug)]
pub struct UpperBound {
    capacity: usize,
    heap:     BinaryHeap<Distance>,
}

impl UpperBound {
    pub fn new(k: usize) -> Self {
        Self { capacity: k, heap: BinaryHeap::with_capacity(k + 1) }
    }

    #[inline]
    pub fn get(&self) -> f32 {
        if self.heap.len() < self.capacity {
            return f32::MAX;
        }
        self.heap.peek().map_or(f32::MAX, |d| d.0)
    }

    pub fn insert(&mut self, value: f32) {
        if self.heap.len() < self.capacity || value < self.get() {
            self.heap.push(Distance(value));
            if self.heap.len() > self.capacity {
                self.heap.pop();
            }
        }
    }

    pub fn len(&self) -> usize {
        self.heap.len()
    }

    pub fn is_empty(&self) -> bool {
        self.heap.is_empty()
    }
}
