//! Per-vantage-point distance index
//!
//! A [`DistanceIndex`] is built in one batch: unordered `insert`s, a single
//! `finalize`, then `save`. After that it is only ever read. Queries use the
//! memory-mapped [`MappedIndex`](crate::store::MappedIndex) view of the saved
//! file; the in-memory form serves the build phase and tests.
//!
//! Entries are ordered by distance, ties by ascending [`SeriesId`].

use std::cmp::Ordering;
use std::path::Path;

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::corpus::SeriesId;
use crate::format::{FormatError, IndexWriter};
use crate::store::{MappedIndex, StoreError};

#[derive(Error, Debug)]
pub enum IndexError {
    #[error("Index for vantage point {0} is finalized and read-only")]
    Finalized(SeriesId),

    #[error("Index for vantage point {0} must be finalized before it is saved")]
    NotFinalized(SeriesId),

    #[error("Invalid distance {distance} for series {id}")]
    InvalidDistance { distance: f64, id: SeriesId },

    #[error("Format error: {0}")]
    Format(#[from] FormatError),

    #[error("Store error: {0}")]
    Store(#[from] StoreError),
}

/// One `(distance, id)` pair
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct IndexEntry {
    pub distance: f64,
    pub id: SeriesId,
}

impl IndexEntry {
    pub fn new(distance: f64, id: SeriesId) -> Self {
        Self { distance, id }
    }

    /// Index order: distance, then id
    #[inline]
    pub fn sort_key_cmp(&self, other: &Self) -> Ordering {
        self.distance
            .total_cmp(&other.distance)
            .then_with(|| self.id.cmp(&other.id))
    }
}

/// Sorted distance → id mapping for one vantage point
#[derive(Debug, Clone)]
pub struct DistanceIndex {
    vantage: SeriesId,
    entries: Vec<IndexEntry>,
    finalized: bool,
}

impl DistanceIndex {
    /// Create an empty index in the build phase
    pub fn new(vantage: SeriesId) -> Self {
        Self {
            vantage,
            entries: Vec::new(),
            finalized: false,
        }
    }

    pub fn with_capacity(vantage: SeriesId, capacity: usize) -> Self {
        Self {
            vantage,
            entries: Vec::with_capacity(capacity),
            finalized: false,
        }
    }

    pub fn vantage(&self) -> SeriesId {
        self.vantage
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn is_finalized(&self) -> bool {
        self.finalized
    }

    /// Append an entry. Call order is irrelevant.
    pub fn insert(&mut self, distance: f64, id: SeriesId) -> Result<(), IndexError> {
        if self.finalized {
            return Err(IndexError::Finalized(self.vantage));
        }
        if distance.is_nan() || distance < 0.0 {
            return Err(IndexError::InvalidDistance { distance, id });
        }
        self.entries.push(IndexEntry { distance, id });
        Ok(())
    }

    /// Fix the sequence into index order. Idempotent.
    pub fn finalize(&mut self) {
        if !self.finalized {
            self.entries.sort_by(IndexEntry::sort_key_cmp);
            self.finalized = true;
        }
    }

    /// All entries, in index order once finalized
    pub fn entries(&self) -> &[IndexEntry] {
        &self.entries
    }

    /// Every entry with `distance <= threshold`, ascending.
    ///
    /// Empty before `finalize`.
    pub fn range_at_most(&self, threshold: f64) -> &[IndexEntry] {
        if !self.finalized {
            return &[];
        }
        let cut = cut_point(&self.entries, threshold, |e| e.distance);
        &self.entries[..cut]
    }

    /// Persist as a .vpi file
    pub fn save<P: AsRef<Path>>(&self, path: P) -> Result<u64, IndexError> {
        if !self.finalized {
            return Err(IndexError::NotFinalized(self.vantage));
        }

        let mut writer = IndexWriter::new(path, self.vantage)?;
        for &entry in &self.entries {
            writer.write_entry(entry)?;
        }
        Ok(writer.finish()?)
    }

    /// Restore a finalized index from a .vpi file
    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self, IndexError> {
        let mapped = MappedIndex::open(path)?;

        Ok(Self {
            vantage: mapped.vantage(),
            entries: mapped.iter().collect(),
            finalized: true,
        })
    }
}

/// Number of leading items whose distance is `<= threshold`.
///
/// `items` must already be sorted by distance. A NaN threshold admits nothing.
#[inline]
pub(crate) fn cut_point<T>(items: &[T], threshold: f64, distance: impl Fn(&T) -> f64) -> usize {
    if threshold.is_nan() {
        return 0;
    }
    items.partition_point(|item| distance(item) <= threshold)
}
