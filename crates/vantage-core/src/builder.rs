//! Offline index construction
//!
//! For every vantage point v and every corpus member m (v included), the
//! builder records `distance(v, m)` in v's [`DistanceIndex`]. Vantage points
//! are independent of one another and are built as separate rayon tasks.
//!
//! A build never edits a live generation: everything is written under
//! `<root>.staging` and swapped in at the end with
//! [`IndexLayout::commit`], which also drops indices of vantage points the
//! new sample no longer contains.

use std::time::{Duration, Instant};

use rand::rngs::StdRng;
use rand::SeedableRng;
use rayon::prelude::*;
use thiserror::Error;

use crate::corpus::{CorpusError, SeriesId, SeriesSource};
use crate::index::{DistanceIndex, IndexError};
use crate::layout::IndexLayout;
use crate::metric::Metric;
use crate::vantage::{VantageError, VantagePointSet, DEFAULT_VANTAGE_POINTS};

#[derive(Error, Debug)]
pub enum BuildError {
    #[error("Vantage point error: {0}")]
    Vantage(#[from] VantageError),

    #[error("Corpus error: {0}")]
    Corpus(#[from] CorpusError),

    #[error("Index error for vantage point {vantage}: {source}")]
    Index {
        vantage: SeriesId,
        #[source]
        source: IndexError,
    },

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

#[derive(Debug, Clone)]
pub struct BuildConfig {
    /// Size of the vantage point sample
    pub vantage_points: usize,
    /// Seed for the vantage point sample; entropy when `None`
    pub seed: Option<u64>,
    /// One rayon task per vantage point
    pub parallel: bool,
}

impl Default for BuildConfig {
    fn default() -> Self {
        Self {
            vantage_points: DEFAULT_VANTAGE_POINTS,
            seed: None,
            parallel: true,
        }
    }
}

#[derive(Debug, Clone)]
pub struct BuildReport {
    pub vantage_points: VantagePointSet,
    pub corpus_size: usize,
    pub entries_written: u64,
    pub elapsed: Duration,
}

pub struct IndexBuilder<C, M> {
    corpus: C,
    metric: M,
    config: BuildConfig,
}

impl<C, M> IndexBuilder<C, M>
where
    C: SeriesSource,
    M: Metric<C::Series>,
{
    pub fn new(corpus: C, metric: M, config: BuildConfig) -> Self {
        Self {
            corpus,
            metric,
            config,
        }
    }

    pub fn config(&self) -> &BuildConfig {
        &self.config
    }

    /// Sample vantage points and build a new generation at `layout`.
    pub fn build(&self, layout: &IndexLayout) -> Result<BuildReport, BuildError> {
        let ids = self.corpus_ids()?;

        let mut rng = match self.config.seed {
            Some(seed) => StdRng::seed_from_u64(seed),
            None => StdRng::from_entropy(),
        };
        let vantage = VantagePointSet::sample(&ids, self.config.vantage_points, &mut rng)?;

        self.build_generation(layout, vantage, &ids)
    }

    /// Build a new generation at `layout` around an explicit vantage set.
    pub fn build_with_vantage_points(
        &self,
        layout: &IndexLayout,
        vantage: VantagePointSet,
    ) -> Result<BuildReport, BuildError> {
        let ids = self.corpus_ids()?;
        if vantage.len() > ids.len() {
            return Err(VantageError::TooManyVantagePoints {
                requested: vantage.len(),
                available: ids.len(),
            }
            .into());
        }
        self.build_generation(layout, vantage, &ids)
    }

    fn corpus_ids(&self) -> Result<Vec<SeriesId>, BuildError> {
        let mut ids = self.corpus.ids()?;
        ids.sort_unstable();
        ids.dedup();
        Ok(ids)
    }

    fn build_generation(
        &self,
        layout: &IndexLayout,
        vantage: VantagePointSet,
        ids: &[SeriesId],
    ) -> Result<BuildReport, BuildError> {
        let start = Instant::now();
        tracing::info!(
            "Building {} vantage point indices over {} series into {:?}",
            vantage.len(),
            ids.len(),
            layout.root()
        );

        let staging = layout.staging();
        if staging.root().exists() {
            tracing::warn!("Removing leftover staging directory {:?}", staging.root());
            std::fs::remove_dir_all(staging.root())?;
        }

        let written = self.write_staging(&staging, &vantage, ids);
        let entries_written = match written {
            Ok(total) => total,
            Err(err) => {
                if let Err(cleanup) = std::fs::remove_dir_all(staging.root()) {
                    tracing::warn!(
                        "Failed to remove staging directory {:?}: {}",
                        staging.root(),
                        cleanup
                    );
                }
                return Err(err);
            }
        };

        layout.commit(&staging)?;

        let report = BuildReport {
            vantage_points: vantage,
            corpus_size: ids.len(),
            entries_written,
            elapsed: start.elapsed(),
        };
        tracing::info!(
            "Built {} indices ({} entries) in {:.2?}",
            report.vantage_points.len(),
            report.entries_written,
            report.elapsed
        );
        Ok(report)
    }

    fn write_staging(
        &self,
        staging: &IndexLayout,
        vantage: &VantagePointSet,
        ids: &[SeriesId],
    ) -> Result<u64, BuildError> {
        std::fs::create_dir_all(staging.indices_dir())?;
        vantage.save(staging.vantage_set_path())?;

        let counts: Vec<u64> = if self.config.parallel {
            vantage
                .ids()
                .par_iter()
                .map(|&v| self.build_one(staging, v, ids))
                .collect::<Result<_, _>>()?
        } else {
            vantage
                .iter()
                .map(|v| self.build_one(staging, v, ids))
                .collect::<Result<_, _>>()?
        };

        Ok(counts.iter().sum())
    }

    /// Compute, finalize and save one vantage point's index
    fn build_one(
        &self,
        staging: &IndexLayout,
        vantage: SeriesId,
        ids: &[SeriesId],
    ) -> Result<u64, BuildError> {
        let index_err = |source| BuildError::Index { vantage, source };

        let anchor = self.corpus.fetch(vantage)?;
        let mut index = DistanceIndex::with_capacity(vantage, ids.len());
        for &member in ids {
            let series = self.corpus.fetch(member)?;
            let distance = self.metric.distance(&anchor, &series);
            index.insert(distance, member).map_err(index_err)?;
        }
        index.finalize();

        let written = index
            .save(staging.index_path(vantage))
            .map_err(index_err)?;
        tracing::debug!("vantage={} entries={}", vantage, written);
        Ok(written)
    }
}
