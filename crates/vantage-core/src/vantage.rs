//! Vantage point selection
//!
//! A fixed-size, duplicate-free random sample of corpus ids. The sample is
//! persisted next to the indices so queries run against exactly the set the
//! indices were built for.

use std::collections::BTreeSet;
use std::path::Path;

use rand::Rng;
use thiserror::Error;

use crate::corpus::SeriesId;
use crate::format::{self, FormatError};

/// Number of vantage points used when nothing else is configured
pub const DEFAULT_VANTAGE_POINTS: usize = 20;

#[derive(Error, Debug)]
pub enum VantageError {
    #[error("Requested {requested} vantage points but the corpus has only {available} series")]
    TooManyVantagePoints { requested: usize, available: usize },

    #[error("Format error: {0}")]
    Format(#[from] FormatError),
}

/// Immutable set of vantage point ids, kept in ascending order
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct VantagePointSet {
    ids: Vec<SeriesId>,
}

impl VantagePointSet {
    /// Build a set from explicit ids. Duplicates collapse.
    pub fn new(ids: impl IntoIterator<Item = SeriesId>) -> Self {
        let ids: BTreeSet<SeriesId> = ids.into_iter().collect();
        Self {
            ids: ids.into_iter().collect(),
        }
    }

    /// Draw `count` distinct ids uniformly from `corpus`.
    ///
    /// Fails before touching anything if the corpus has fewer than `count`
    /// distinct members.
    pub fn sample<R: Rng + ?Sized>(
        corpus: &[SeriesId],
        count: usize,
        rng: &mut R,
    ) -> Result<Self, VantageError> {
        let distinct: Vec<SeriesId> = corpus
            .iter()
            .copied()
            .collect::<BTreeSet<_>>()
            .into_iter()
            .collect();

        if count > distinct.len() {
            return Err(VantageError::TooManyVantagePoints {
                requested: count,
                available: distinct.len(),
            });
        }

        let picked = rand::seq::index::sample(rng, distinct.len(), count);
        Ok(Self::new(picked.into_iter().map(|i| distinct[i])))
    }

    pub fn ids(&self) -> &[SeriesId] {
        &self.ids
    }

    pub fn len(&self) -> usize {
        self.ids.len()
    }

    pub fn is_empty(&self) -> bool {
        self.ids.is_empty()
    }

    pub fn contains(&self, id: SeriesId) -> bool {
        self.ids.binary_search(&id).is_ok()
    }

    pub fn iter(&self) -> impl ExactSizeIterator<Item = SeriesId> + '_ {
        self.ids.iter().copied()
    }

    /// Persist as a .vps file
    pub fn save<P: AsRef<Path>>(&self, path: P) -> Result<(), VantageError> {
        format::write_vantage_set(path, &self.ids)?;
        Ok(())
    }

    /// Restore from a .vps file
    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self, VantageError> {
        Ok(Self::new(format::read_vantage_set(path)?))
    }
}
