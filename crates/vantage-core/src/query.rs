//! k-nearest-neighbor query engine
//!
//! # Algorithm
//!
//! 1. Rank every vantage point by its distance `dv` to the query.
//! 2. Probe the closest few (k by default): fetch every corpus member whose
//!    distance to the vantage point is at most `2·dv`. By the triangle
//!    inequality this covers every member at least as close to the query as
//!    the vantage point itself.
//! 3. Evaluate each distinct candidate once against the query and keep the
//!    best k in a [`CandidateAccumulator`].
//!
//! This is approximate: true neighbors farther from the query than `dv` can
//! fall outside every probed radius.
//!
//! An index file that is missing or unreadable only costs recall. The probe
//! is skipped with a warning and the remaining probes still contribute.

use std::collections::HashSet;

use rayon::prelude::*;
use thiserror::Error;

use crate::accumulator::{CandidateAccumulator, Neighbor};
use crate::corpus::{SeriesId, SeriesSource};
use crate::layout::IndexLayout;
use crate::metric::Metric;
use crate::store::MappedIndex;
use crate::vantage::{VantageError, VantagePointSet};

#[derive(Error, Debug)]
pub enum QueryError {
    #[error("Failed to load vantage points from {path:?}: {source}")]
    VantageSet {
        path: std::path::PathBuf,
        #[source]
        source: VantageError,
    },
}

/// How many of the ranked vantage points a query probes
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ProbeCount {
    /// One probe per requested result
    #[default]
    MatchK,
    Fixed(usize),
}

impl ProbeCount {
    pub fn resolve(&self, k: usize) -> usize {
        match self {
            ProbeCount::MatchK => k,
            ProbeCount::Fixed(n) => *n,
        }
    }
}

#[derive(Debug, Clone)]
pub struct QueryConfig {
    pub probes: ProbeCount,
    /// Run probes and candidate evaluation on rayon
    pub parallel: bool,
}

impl Default for QueryConfig {
    fn default() -> Self {
        Self {
            probes: ProbeCount::MatchK,
            parallel: true,
        }
    }
}

/// Result of one query plus what it took to get there
#[derive(Debug, Clone, Default)]
pub struct QueryOutcome {
    pub neighbors: Vec<Neighbor>,
    /// Vantage points selected for probing
    pub probes: usize,
    /// Probes dropped because their index could not be read
    pub skipped_probes: usize,
    /// Distinct candidates evaluated against the query, probed vantage
    /// points included
    pub candidates: usize,
}

pub struct QueryEngine<C, M> {
    layout: IndexLayout,
    vantage: VantagePointSet,
    corpus: C,
    metric: M,
    config: QueryConfig,
}

impl<C, M> QueryEngine<C, M>
where
    C: SeriesSource,
    M: Metric<C::Series>,
{
    /// Open the generation committed at `layout`
    pub fn open(
        layout: IndexLayout,
        corpus: C,
        metric: M,
        config: QueryConfig,
    ) -> Result<Self, QueryError> {
        let path = layout.vantage_set_path();
        let vantage = VantagePointSet::load(&path)
            .map_err(|source| QueryError::VantageSet { path, source })?;
        tracing::info!(
            "Opened vantage index at {:?} with {} vantage points",
            layout.root(),
            vantage.len()
        );
        Ok(Self::new(layout, vantage, corpus, metric, config))
    }

    pub fn new(
        layout: IndexLayout,
        vantage: VantagePointSet,
        corpus: C,
        metric: M,
        config: QueryConfig,
    ) -> Self {
        Self {
            layout,
            vantage,
            corpus,
            metric,
            config,
        }
    }

    pub fn vantage_points(&self) -> &VantagePointSet {
        &self.vantage
    }

    pub fn layout(&self) -> &IndexLayout {
        &self.layout
    }

    /// The (up to) k corpus members closest to `query`, ascending by distance
    pub fn query(&self, query: &C::Series, k: usize) -> Vec<Neighbor> {
        self.search(query, k).neighbors
    }

    /// Like [`query`](Self::query), with probe statistics
    pub fn search(&self, query: &C::Series, k: usize) -> QueryOutcome {
        if k == 0 || self.vantage.is_empty() {
            return QueryOutcome::default();
        }

        let ranked = self.rank(query);
        let probes: Vec<(f64, SeriesId)> = ranked
            .into_iter()
            .take(self.config.probes.resolve(k))
            .collect();

        let probed: Vec<Option<Vec<SeriesId>>> = if self.config.parallel {
            probes
                .par_iter()
                .map(|&(dv, v)| self.probe(v, dv))
                .collect()
        } else {
            probes.iter().map(|&(dv, v)| self.probe(v, dv)).collect()
        };
        let skipped_probes = probed.iter().filter(|p| p.is_none()).count();

        // Probed vantage points already have their distance from ranking.
        // Dedup the rest in probe order so each candidate is evaluated once.
        let mut seen: HashSet<SeriesId> = probes.iter().map(|&(_, v)| v).collect();
        let candidates: Vec<SeriesId> = probed
            .into_iter()
            .flatten()
            .flatten()
            .filter(|id| seen.insert(*id))
            .collect();

        let scored: Vec<Option<(f64, SeriesId)>> = if self.config.parallel {
            candidates
                .par_iter()
                .map(|&id| self.evaluate(query, id).map(|d| (d, id)))
                .collect()
        } else {
            candidates
                .iter()
                .map(|&id| self.evaluate(query, id).map(|d| (d, id)))
                .collect()
        };

        let mut best = CandidateAccumulator::new(k);
        for &(dv, v) in &probes {
            best.offer(dv, v);
        }
        for (distance, id) in scored.into_iter().flatten() {
            best.offer(distance, id);
        }

        let outcome = QueryOutcome {
            neighbors: best.into_sorted_vec(),
            probes: probes.len(),
            skipped_probes,
            candidates: probes.len() + candidates.len(),
        };
        tracing::debug!(
            "query k={} probes={} skipped={} candidates={} results={}",
            k,
            outcome.probes,
            outcome.skipped_probes,
            outcome.candidates,
            outcome.neighbors.len()
        );
        outcome
    }

    /// Vantage points ascending by `(distance to query, id)`
    fn rank(&self, query: &C::Series) -> Vec<(f64, SeriesId)> {
        let mut ranked: Vec<(f64, SeriesId)> = self
            .vantage
            .iter()
            .filter_map(|v| {
                let distance = self.evaluate(query, v)?;
                Some((distance, v))
            })
            .collect();
        ranked.sort_by(|a, b| a.0.total_cmp(&b.0).then_with(|| a.1.cmp(&b.1)));
        ranked
    }

    /// Ids within `2·dv` of vantage point `v`, or `None` if its index is unusable
    fn probe(&self, vantage: SeriesId, dv: f64) -> Option<Vec<SeriesId>> {
        let path = self.layout.index_path(vantage);
        let index = match MappedIndex::open(&path) {
            Ok(index) => index,
            Err(err) => {
                tracing::warn!(
                    "Skipping probe vantage={} path={:?}: {}",
                    vantage,
                    path,
                    err
                );
                return None;
            }
        };

        if index.vantage() != vantage {
            tracing::warn!(
                "Skipping probe vantage={} path={:?}: file belongs to vantage point {}",
                vantage,
                path,
                index.vantage()
            );
            return None;
        }

        let radius = 2.0 * dv;
        Some(
            index
                .range_at_most(radius)
                .into_iter()
                .map(|entry| entry.id)
                .collect(),
        )
    }

    /// Distance from `query` to corpus member `id`; `None` if it can't be computed
    fn evaluate(&self, query: &C::Series, id: SeriesId) -> Option<f64> {
        match self.corpus.fetch(id) {
            Ok(series) => {
                let distance = self.metric.distance(query, &series);
                if distance.is_nan() {
                    tracing::warn!("Distance to series {} is NaN, skipping", id);
                    return None;
                }
                Some(distance)
            }
            Err(err) => {
                tracing::warn!("Skipping series {}: {}", id, err);
                None
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::builder::{BuildConfig, IndexBuilder};
    use crate::corpus::MemoryCorpus;
    use crate::metric::Absolute;
    use tempfile::{tempdir, TempDir};

    fn built_line(
        values: &[f64],
        vantage: &[u64],
    ) -> (TempDir, IndexLayout, MemoryCorpus<f64>) {
        let dir = tempdir().unwrap();
        let layout = IndexLayout::new(dir.path().join("idx"));
        let corpus: MemoryCorpus<f64> = values.iter().copied().collect();
        IndexBuilder::new(&corpus, Absolute, BuildConfig::default())
            .build_with_vantage_points(
                &layout,
                VantagePointSet::new(vantage.iter().copied().map(SeriesId)),
            )
            .unwrap();
        (dir, layout, corpus)
    }

    #[test]
    fn test_probe_count_resolution() {
        assert_eq!(ProbeCount::MatchK.resolve(5), 5);
        assert_eq!(ProbeCount::Fixed(3).resolve(5), 3);
    }

    #[test]
    fn test_open_reads_vantage_set() {
        let (_dir, layout, corpus) = built_line(&[0.0, 1.0, 2.0], &[0, 2]);

        let engine = QueryEngine::open(layout, &corpus, Absolute, QueryConfig::default()).unwrap();

        assert_eq!(engine.vantage_points().ids(), &[SeriesId(0), SeriesId(2)]);
    }

    #[test]
    fn test_open_without_generation_fails() {
        let dir = tempdir().unwrap();
        let corpus: MemoryCorpus<f64> = MemoryCorpus::new();

        let result = QueryEngine::open(
            IndexLayout::new(dir.path().join("missing")),
            &corpus,
            Absolute,
            QueryConfig::default(),
        );
        assert!(matches!(result, Err(QueryError::VantageSet { .. })));
    }

    #[test]
    fn test_k_zero_is_empty() {
        let (_dir, layout, corpus) = built_line(&[0.0, 1.0, 2.0], &[0]);
        let engine = QueryEngine::open(layout, &corpus, Absolute, QueryConfig::default()).unwrap();

        let outcome = engine.search(&1.0, 0);
        assert!(outcome.neighbors.is_empty());
        assert_eq!(outcome.probes, 0);
    }

    #[test]
    fn test_fixed_probe_count_limits_probes() {
        let (_dir, layout, corpus) = built_line(&[0.0, 1.0, 2.0, 3.0, 10.0], &[0, 2, 4]);
        let config = QueryConfig {
            probes: ProbeCount::Fixed(1),
            parallel: false,
        };
        let engine = QueryEngine::open(layout, &corpus, Absolute, config).unwrap();

        // Closest vantage point to 2.5 is value 2.0 (id 2): radius 1.0 admits 1, 2, 3
        let outcome = engine.search(&2.5, 3);
        assert_eq!(outcome.probes, 1);
        assert_eq!(outcome.candidates, 3);
        let ids: Vec<u64> = outcome.neighbors.iter().map(|n| n.id.0).collect();
        assert_eq!(ids, vec![2, 3, 1]);
    }

    #[test]
    fn test_each_series_evaluated_once() {
        use std::sync::atomic::{AtomicUsize, Ordering};

        let (_dir, layout, corpus) = built_line(&[0.0, 1.0, 2.0, 3.0, 10.0], &[0, 4]);
        let calls = AtomicUsize::new(0);
        let counting = |a: &f64, b: &f64| {
            calls.fetch_add(1, Ordering::Relaxed);
            (a - b).abs()
        };
        let engine = QueryEngine::open(layout, &corpus, counting, QueryConfig::default()).unwrap();

        let outcome = engine.search(&2.5, 2);

        assert_eq!(outcome.candidates, 5);
        assert_eq!(calls.load(Ordering::Relaxed), 5);
        let ids: Vec<u64> = outcome.neighbors.iter().map(|n| n.id.0).collect();
        assert_eq!(ids, vec![2, 3]);
    }

    #[test]
    fn test_mismatched_index_file_is_skipped() {
        let (_dir, layout, corpus) = built_line(&[0.0, 1.0, 2.0, 3.0, 10.0], &[0, 4]);
        // Put vantage 4's file where vantage 0's should be
        std::fs::copy(layout.index_path(SeriesId(4)), layout.index_path(SeriesId(0))).unwrap();

        let engine = QueryEngine::open(layout, &corpus, Absolute, QueryConfig::default()).unwrap();
        let outcome = engine.search(&0.5, 2);

        assert_eq!(outcome.probes, 2);
        assert_eq!(outcome.skipped_probes, 1);
        assert_eq!(outcome.neighbors.len(), 2);
    }

    #[test]
    fn test_missing_corpus_member_is_skipped() {
        let (_dir, layout, corpus) = built_line(&[0.0, 1.0, 2.0, 3.0], &[0]);
        let mut shrunk = MemoryCorpus::new();
        for id in [0u64, 1, 3] {
            shrunk.insert(SeriesId(id), *corpus.get(SeriesId(id)).unwrap());
        }

        let engine = QueryEngine::open(layout, &shrunk, Absolute, QueryConfig::default()).unwrap();
        let ids: Vec<u64> = engine.query(&2.0, 4).iter().map(|n| n.id.0).collect();

        assert_eq!(ids, vec![1, 3, 0]);
    }
}
