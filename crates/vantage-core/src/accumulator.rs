//! Bounded best-k candidate accumulator
//!
//! A max-heap of capacity k: the root is the worst retained candidate, so a
//! new offer only has to beat the root to get in. Candidates are ranked by
//! `(distance, id)`, which makes the retained set independent of offer order
//! even when several candidates tie at the k-th distance.

use std::cmp::Ordering;
use std::collections::{BinaryHeap, HashSet};

use serde::{Deserialize, Serialize};

use crate::corpus::SeriesId;

/// Upper bound on up-front heap allocation; `k` comes from callers unchecked
const MAX_PREALLOC: usize = 1024;

/// One query result
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Neighbor {
    pub id: SeriesId,
    pub distance: f64,
}

/// Heap element (max-heap, worst candidate on top)
#[derive(Clone, Copy)]
struct Ranked {
    distance: f64,
    id: SeriesId,
}

impl PartialEq for Ranked {
    fn eq(&self, other: &Self) -> bool {
        self.cmp(other) == Ordering::Equal
    }
}

impl Eq for Ranked {}

impl Ord for Ranked {
    fn cmp(&self, other: &Self) -> Ordering {
        self.distance
            .total_cmp(&other.distance)
            .then_with(|| self.id.cmp(&other.id))
    }
}

impl PartialOrd for Ranked {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

/// Keeps the k smallest `(distance, id)` pairs offered during one query.
///
/// Each id is considered once; later offers for an id already seen are
/// ignored, whatever their distance.
pub struct CandidateAccumulator {
    capacity: usize,
    heap: BinaryHeap<Ranked>,
    seen: HashSet<SeriesId>,
}

impl CandidateAccumulator {
    pub fn new(capacity: usize) -> Self {
        Self {
            capacity,
            heap: BinaryHeap::with_capacity(capacity.min(MAX_PREALLOC)),
            seen: HashSet::new(),
        }
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    pub fn len(&self) -> usize {
        self.heap.len()
    }

    pub fn is_empty(&self) -> bool {
        self.heap.is_empty()
    }

    pub fn is_full(&self) -> bool {
        self.heap.len() >= self.capacity
    }

    /// Whether `id` has already been offered
    pub fn has_seen(&self, id: SeriesId) -> bool {
        self.seen.contains(&id)
    }

    /// Distance of the worst retained candidate
    pub fn worst_distance(&self) -> Option<f64> {
        self.heap.peek().map(|r| r.distance)
    }

    /// Offer a candidate. Returns whether it is now retained.
    pub fn offer(&mut self, distance: f64, id: SeriesId) -> bool {
        if distance.is_nan() || !self.seen.insert(id) {
            return false;
        }
        if self.capacity == 0 {
            return false;
        }

        let candidate = Ranked { distance, id };
        if self.heap.len() < self.capacity {
            self.heap.push(candidate);
            return true;
        }

        match self.heap.peek() {
            Some(worst) if candidate < *worst => {
                self.heap.pop();
                self.heap.push(candidate);
                true
            }
            _ => false,
        }
    }

    /// Drain into results, ascending by distance (ties by id)
    pub fn into_sorted_vec(self) -> Vec<Neighbor> {
        self.heap
            .into_sorted_vec()
            .into_iter()
            .map(|r| Neighbor {
                id: r.id,
                distance: r.distance,
            })
            .collect()
    }
}
