use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use tempfile::{tempdir, TempDir};
use vantage_core::{
    Absolute, BuildConfig, Euclidean, IndexBuilder, IndexLayout, MappedIndex, MemoryCorpus,
    Metric, ProbeCount, QueryConfig, QueryEngine, SeriesId, SeriesSource, VantagePointSet,
};

fn line_index(values: &[f64], vantage: &[u64]) -> (TempDir, IndexLayout, MemoryCorpus<f64>) {
    let dir = tempdir().unwrap();
    let layout = IndexLayout::new(dir.path().join("index"));
    let corpus: MemoryCorpus<f64> = values.iter().copied().collect();
    IndexBuilder::new(&corpus, Absolute, BuildConfig::default())
        .build_with_vantage_points(&layout, VantagePointSet::new(vantage.iter().copied().map(SeriesId)))
        .unwrap();
    (dir, layout, corpus)
}

fn random_points(n: usize, rng: &mut StdRng) -> MemoryCorpus<Vec<f64>> {
    (0..n)
        .map(|_| vec![rng.gen_range(-50.0..50.0), rng.gen_range(-50.0..50.0)])
        .collect()
}

fn ids(neighbors: &[vantage_core::Neighbor]) -> Vec<u64> {
    neighbors.iter().map(|n| n.id.0).collect()
}

#[test]
fn test_two_nearest_on_a_line() {
    let (_dir, layout, corpus) = line_index(&[0.0, 1.0, 2.0, 3.0, 10.0], &[0, 4]);
    let engine = QueryEngine::open(layout, &corpus, Absolute, QueryConfig::default()).unwrap();

    let result = engine.query(&2.5, 2);

    assert_eq!(ids(&result), vec![2, 3]);
    assert!(result.iter().all(|n| n.distance == 0.5));
}

#[test]
fn test_k_larger_than_corpus_returns_everything() {
    let (_dir, layout, corpus) = line_index(&[0.0, 1.0, 2.0, 3.0, 10.0], &[0, 4]);
    let engine = QueryEngine::open(layout, &corpus, Absolute, QueryConfig::default()).unwrap();

    let result = engine.query(&2.5, 10);

    assert_eq!(result.len(), 5);
    assert!(result.windows(2).all(|w| w[0].distance <= w[1].distance));
    assert_eq!(ids(&result), vec![2, 3, 1, 0, 4]);
}

#[test]
fn test_query_at_a_vantage_point_finds_it() {
    let (_dir, layout, corpus) = line_index(&[0.0, 1.0, 2.0, 3.0, 10.0], &[0, 4]);
    let engine = QueryEngine::open(layout, &corpus, Absolute, QueryConfig::default()).unwrap();

    let result = engine.query(&10.0, 1);

    assert_eq!(ids(&result), vec![4]);
    assert_eq!(result[0].distance, 0.0);
}

#[test]
fn test_empty_vantage_set_returns_nothing() {
    let (_dir, layout, corpus) = line_index(&[0.0, 1.0, 2.0], &[]);
    let engine = QueryEngine::open(layout, &corpus, Absolute, QueryConfig::default()).unwrap();

    let outcome = engine.search(&1.0, 3);

    assert!(outcome.neighbors.is_empty());
    assert_eq!(outcome.probes, 0);
}

#[test]
fn test_pruning_radius_covers_every_closer_point() {
    let mut rng = StdRng::seed_from_u64(42);
    let corpus = random_points(300, &mut rng);
    let dir = tempdir().unwrap();
    let layout = IndexLayout::new(dir.path().join("index"));
    let config = BuildConfig {
        vantage_points: 12,
        seed: Some(7),
        parallel: true,
    };
    let report = IndexBuilder::new(&corpus, Euclidean, config)
        .build(&layout)
        .unwrap();

    let members = corpus.ids().unwrap();
    for _ in 0..25 {
        let query = vec![rng.gen_range(-60.0..60.0), rng.gen_range(-60.0..60.0)];
        for v in report.vantage_points.iter() {
            let dv = Euclidean.distance(&query, &corpus.fetch(v).unwrap());
            let index = MappedIndex::open(layout.index_path(v)).unwrap();
            let admitted: Vec<SeriesId> = index
                .range_at_most(2.0 * dv)
                .into_iter()
                .map(|e| e.id)
                .collect();

            for &p in &members {
                if Euclidean.distance(&query, &corpus.fetch(p).unwrap()) <= dv {
                    assert!(
                        admitted.contains(&p),
                        "member {} within {} of query but outside radius of vantage {}",
                        p,
                        dv,
                        v
                    );
                }
            }
        }
    }
}

#[test]
fn test_results_are_exact_when_probing_every_vantage_point() {
    let mut rng = StdRng::seed_from_u64(3);
    let corpus = random_points(200, &mut rng);
    let dir = tempdir().unwrap();
    let layout = IndexLayout::new(dir.path().join("index"));
    let config = BuildConfig {
        vantage_points: 200,
        seed: Some(1),
        parallel: true,
    };
    IndexBuilder::new(&corpus, Euclidean, config)
        .build(&layout)
        .unwrap();

    let query_config = QueryConfig {
        probes: ProbeCount::Fixed(200),
        parallel: true,
    };
    let engine = QueryEngine::open(layout, &corpus, Euclidean, query_config).unwrap();
    let query = vec![1.0, -2.0];

    let mut exact: Vec<(f64, SeriesId)> = corpus
        .ids()
        .unwrap()
        .into_iter()
        .map(|id| (Euclidean.distance(&query, &corpus.fetch(id).unwrap()), id))
        .collect();
    exact.sort_by(|a, b| a.0.total_cmp(&b.0).then_with(|| a.1.cmp(&b.1)));
    let expected: Vec<u64> = exact.iter().take(10).map(|(_, id)| id.0).collect();

    assert_eq!(ids(&engine.query(&query, 10)), expected);
}

#[test]
fn test_deleted_index_file_degrades_query() {
    let (_dir, layout, corpus) = line_index(&[0.0, 1.0, 2.0, 3.0, 10.0], &[0, 4]);
    std::fs::remove_file(layout.index_path(SeriesId(0))).unwrap();
    let engine = QueryEngine::open(layout, &corpus, Absolute, QueryConfig::default()).unwrap();

    let outcome = engine.search(&2.5, 2);

    // Vantage 4's radius (15.0) still covers the whole line
    assert_eq!(outcome.probes, 2);
    assert_eq!(outcome.skipped_probes, 1);
    assert_eq!(ids(&outcome.neighbors), vec![2, 3]);
}

#[test]
fn test_corrupt_index_file_degrades_query() {
    let (_dir, layout, corpus) = line_index(&[0.0, 1.0, 2.0, 3.0, 10.0], &[0, 4]);
    std::fs::write(layout.index_path(SeriesId(4)), b"VPIDX001garbage").unwrap();
    let engine = QueryEngine::open(layout, &corpus, Absolute, QueryConfig::default()).unwrap();

    let outcome = engine.search(&2.5, 2);

    assert_eq!(outcome.skipped_probes, 1);
    assert_eq!(ids(&outcome.neighbors), vec![2, 3]);
}

#[test]
fn test_misordered_index_file_degrades_query() {
    let (_dir, layout, corpus) = line_index(&[0.0, 1.0, 2.0, 3.0, 10.0], &[0, 4]);
    let path = layout.index_path(SeriesId(4));
    let mut bytes = std::fs::read(&path).unwrap();
    // Last of five entries now sorts before its predecessor
    let last = 24 + 4 * 16;
    bytes[last..last + 8].copy_from_slice(&0.5f64.to_le_bytes());
    std::fs::write(&path, &bytes).unwrap();
    let engine = QueryEngine::open(layout, &corpus, Absolute, QueryConfig::default()).unwrap();

    let outcome = engine.search(&2.5, 2);

    assert_eq!(outcome.skipped_probes, 1);
    assert_eq!(ids(&outcome.neighbors), vec![2, 3]);
}

#[test]
fn test_rebuild_with_same_seed_is_identical() {
    let mut rng = StdRng::seed_from_u64(11);
    let corpus = random_points(120, &mut rng);
    let dir = tempdir().unwrap();
    let layout = IndexLayout::new(dir.path().join("index"));
    let config = BuildConfig {
        vantage_points: 8,
        seed: Some(99),
        parallel: true,
    };
    let builder = IndexBuilder::new(&corpus, Euclidean, config);

    let first = builder.build(&layout).unwrap();
    let snapshot: Vec<Vec<u8>> = first
        .vantage_points
        .iter()
        .map(|v| std::fs::read(layout.index_path(v)).unwrap())
        .collect();
    let second = builder.build(&layout).unwrap();

    assert_eq!(first.vantage_points, second.vantage_points);
    for (v, before) in second.vantage_points.iter().zip(snapshot) {
        assert_eq!(std::fs::read(layout.index_path(v)).unwrap(), before);
    }
    assert_eq!(
        layout.indexed_vantage_points().unwrap(),
        second.vantage_points.ids().to_vec()
    );
}

#[test]
fn test_serial_and_parallel_queries_agree() {
    let mut rng = StdRng::seed_from_u64(5);
    let corpus = random_points(250, &mut rng);
    let dir = tempdir().unwrap();
    let layout = IndexLayout::new(dir.path().join("index"));
    let config = BuildConfig {
        vantage_points: 16,
        seed: Some(2),
        parallel: true,
    };
    IndexBuilder::new(&corpus, Euclidean, config)
        .build(&layout)
        .unwrap();

    let serial = QueryEngine::open(
        layout.clone(),
        &corpus,
        Euclidean,
        QueryConfig {
            probes: ProbeCount::MatchK,
            parallel: false,
        },
    )
    .unwrap();
    let parallel = QueryEngine::open(layout, &corpus, Euclidean, QueryConfig::default()).unwrap();

    for _ in 0..20 {
        let query = vec![rng.gen_range(-50.0..50.0), rng.gen_range(-50.0..50.0)];
        let k = rng.gen_range(1..12);
        assert_eq!(serial.query(&query, k), parallel.query(&query, k));
    }
}

#[test]
fn test_closure_metric() {
    let dir = tempdir().unwrap();
    let layout = IndexLayout::new(dir.path().join("index"));
    let corpus: MemoryCorpus<f64> = [0.0, 4.0, 9.0].into_iter().collect();
    let absolute = |a: &f64, b: &f64| (a - b).abs();
    IndexBuilder::new(&corpus, absolute, BuildConfig::default())
        .build_with_vantage_points(&layout, VantagePointSet::new([SeriesId(1)]))
        .unwrap();

    let engine = QueryEngine::open(layout, &corpus, absolute, QueryConfig::default()).unwrap();
    let result = engine.query(&3.0, 1);

    assert_eq!(ids(&result), vec![1]);
    assert_eq!(result[0].distance, 1.0);
}
