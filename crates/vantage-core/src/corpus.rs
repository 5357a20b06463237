//! Corpus access
//!
//! The engine never looks inside a series. It only names corpus members by
//! [`SeriesId`] and asks a [`SeriesSource`] for the data when a distance has
//! to be computed.

use std::collections::BTreeMap;
use std::fmt;

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Stable identifier of one corpus member
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize,
)]
#[serde(transparent)]
pub struct SeriesId(pub u64);

impl fmt::Display for SeriesId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<u64> for SeriesId {
    fn from(id: u64) -> Self {
        Self(id)
    }
}

#[derive(Error, Debug)]
pub enum CorpusError {
    #[error("Series {0} not found in corpus")]
    NotFound(SeriesId),

    #[error("Failed to decode series {id}: {reason}")]
    Decode { id: SeriesId, reason: String },

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

/// Read-only access to the corpus being indexed.
pub trait SeriesSource: Send + Sync {
    type Series: Send + Sync;

    /// All member ids. Order carries no meaning.
    fn ids(&self) -> Result<Vec<SeriesId>, CorpusError>;

    /// Load one member
    fn fetch(&self, id: SeriesId) -> Result<Self::Series, CorpusError>;
}

impl<C: SeriesSource> SeriesSource for &C {
    type Series = C::Series;

    fn ids(&self) -> Result<Vec<SeriesId>, CorpusError> {
        (**self).ids()
    }

    fn fetch(&self, id: SeriesId) -> Result<Self::Series, CorpusError> {
        (**self).fetch(id)
    }
}

/// Corpus held entirely in memory
#[derive(Debug, Clone)]
pub struct MemoryCorpus<S> {
    series: BTreeMap<SeriesId, S>,
}

impl<S> Default for MemoryCorpus<S> {
    fn default() -> Self {
        Self {
            series: BTreeMap::new(),
        }
    }
}

impl<S> MemoryCorpus<S> {
    pub fn new() -> Self {
        Self::default()
    }

    /// Insert or replace a member
    pub fn insert(&mut self, id: SeriesId, series: S) {
        self.series.insert(id, series);
    }

    pub fn get(&self, id: SeriesId) -> Option<&S> {
        self.series.get(&id)
    }

    pub fn len(&self) -> usize {
        self.series.len()
    }

    pub fn is_empty(&self) -> bool {
        self.series.is_empty()
    }
}

impl<S> FromIterator<S> for MemoryCorpus<S> {
    /// Assigns ids 0, 1, 2, ... in iteration order
    fn from_iter<I: IntoIterator<Item = S>>(iter: I) -> Self {
        Self {
            series: iter
                .into_iter()
                .enumerate()
                .map(|(i, s)| (SeriesId(i as u64), s))
                .collect(),
        }
    }
}

impl<S: Clone + Send + Sync> SeriesSource for MemoryCorpus<S> {
    type Series = S;

    fn ids(&self) -> Result<Vec<SeriesId>, CorpusError> {
        Ok(self.series.keys().copied().collect())
    }

    fn fetch(&self, id: SeriesId) -> Result<S, CorpusError> {
        self.series.get(&id).cloned().ok_or(CorpusError::NotFound(id))
    }
}
