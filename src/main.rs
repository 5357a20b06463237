//! Vantage-DB CLI
//!
//! Approximate nearest-neighbor search over a directory of time series.
//!
//! # Usage
//!
//! ```bash
//! # Create a synthetic corpus
//! vantage-db generate --corpus corpus/ --count 1000 --seed 7
//!
//! # Build vantage point indices over it
//! vantage-db build --corpus corpus/ --index index/ --vantage-points 20
//!
//! # Five nearest neighbors of a series
//! vantage-db query --corpus corpus/ --index index/ --input q.json -k 5
//! ```

use std::path::PathBuf;

use anyhow::Context;
use clap::{Parser, Subcommand};
use rand::rngs::StdRng;
use rand::SeedableRng;
use serde::Serialize;
use tracing_subscriber::EnvFilter;

use vantage_db::{
    BuildConfig, DirCorpus, IndexBuilder, IndexLayout, MappedIndex, Neighbor, ProbeCount,
    QueryConfig, QueryEngine, StandardizedEuclidean, TimeSeries, VantagePointSet,
};

#[derive(Parser)]
#[command(name = "vantage-db")]
#[command(about = "Approximate nearest-neighbor search over time series")]
#[command(version)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Write a corpus of random synthetic series
    Generate {
        /// Corpus directory (ts_<id>.json files)
        #[arg(short, long)]
        corpus: PathBuf,

        /// Number of series
        #[arg(short = 'n', long, default_value = "1000")]
        count: u64,

        /// RNG seed (entropy if omitted)
        #[arg(long)]
        seed: Option<u64>,
    },

    /// Sample vantage points and build their distance indices
    Build {
        /// Corpus directory
        #[arg(short, long)]
        corpus: PathBuf,

        /// Index directory (replaced atomically)
        #[arg(short, long)]
        index: PathBuf,

        /// Number of vantage points
        #[arg(long, default_value = "20")]
        vantage_points: usize,

        /// RNG seed for the vantage point sample
        #[arg(long)]
        seed: Option<u64>,

        /// Build one vantage point at a time
        #[arg(long)]
        serial: bool,
    },

    /// Find the k nearest corpus members of a series
    ///
    /// Input format: {"times": [...], "values": [...]}
    Query {
        /// Corpus directory
        #[arg(short, long)]
        corpus: PathBuf,

        /// Index directory
        #[arg(short, long)]
        index: PathBuf,

        /// Query series JSON file
        #[arg(long)]
        input: PathBuf,

        /// Number of results
        #[arg(short, default_value = "5")]
        k: usize,

        /// Vantage points to probe (defaults to k)
        #[arg(long)]
        probes: Option<usize>,

        /// Probe and evaluate on the calling thread only
        #[arg(long)]
        serial: bool,
    },

    /// Display statistics about a built index
    Stats {
        /// Index directory
        #[arg(short, long)]
        index: PathBuf,
    },
}

#[derive(Serialize)]
struct QueryReport {
    k: usize,
    probes: usize,
    skipped_probes: usize,
    candidates: usize,
    query_time_ms: f64,
    neighbors: Vec<Neighbor>,
}

fn main() -> anyhow::Result<()> {
    // Initialize logging
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();

    match cli.command {
        Commands::Generate {
            corpus,
            count,
            seed,
        } => {
            let store = DirCorpus::create(&corpus)
                .with_context(|| format!("failed to open corpus {:?}", corpus))?;
            let mut rng = match seed {
                Some(seed) => StdRng::seed_from_u64(seed),
                None => StdRng::from_entropy(),
            };
            store
                .generate(count, &mut rng)
                .with_context(|| format!("failed to generate corpus in {:?}", corpus))?;
        }

        Commands::Build {
            corpus,
            index,
            vantage_points,
            seed,
            serial,
        } => {
            let store = DirCorpus::open(&corpus)
                .with_context(|| format!("failed to open corpus {:?}", corpus))?;
            let config = BuildConfig {
                vantage_points,
                seed,
                parallel: !serial,
            };
            let report = IndexBuilder::new(store, StandardizedEuclidean, config)
                .build(&IndexLayout::new(&index))
                .with_context(|| format!("failed to build index {:?}", index))?;

            println!("Index: {:?}", index);
            println!("  Corpus size: {}", report.corpus_size);
            println!("  Vantage points: {}", report.vantage_points.len());
            println!("  Entries written: {}", report.entries_written);
            println!("  Build time: {:.2?}", report.elapsed);
        }

        Commands::Query {
            corpus,
            index,
            input,
            k,
            probes,
            serial,
        } => {
            let file = std::fs::File::open(&input)
                .with_context(|| format!("failed to open query {:?}", input))?;
            let series: TimeSeries = serde_json::from_reader(std::io::BufReader::new(file))
                .with_context(|| format!("failed to parse query {:?}", input))?;

            let store = DirCorpus::open(&corpus)
                .with_context(|| format!("failed to open corpus {:?}", corpus))?;
            let config = QueryConfig {
                probes: probes.map_or(ProbeCount::MatchK, ProbeCount::Fixed),
                parallel: !serial,
            };
            let engine =
                QueryEngine::open(IndexLayout::new(&index), store, StandardizedEuclidean, config)
                    .with_context(|| format!("failed to open index {:?}", index))?;

            let start = std::time::Instant::now();
            let outcome = engine.search(&series, k);
            let report = QueryReport {
                k,
                probes: outcome.probes,
                skipped_probes: outcome.skipped_probes,
                candidates: outcome.candidates,
                query_time_ms: start.elapsed().as_secs_f64() * 1000.0,
                neighbors: outcome.neighbors,
            };
            println!("{}", serde_json::to_string_pretty(&report)?);
        }

        Commands::Stats { index } => {
            let layout = IndexLayout::new(&index);
            let vantage = VantagePointSet::load(layout.vantage_set_path())
                .with_context(|| format!("no index generation at {:?}", index))?;

            println!("Index: {:?}", index);
            println!("  Vantage points: {}", vantage.len());
            for v in vantage.iter() {
                let path = layout.index_path(v);
                match MappedIndex::open(&path) {
                    Ok(mapped) => match mapped.distance_bounds() {
                        Some((lo, hi)) => println!(
                            "    vp {}: {} entries, distance {:.4} ..= {:.4}",
                            v,
                            mapped.len(),
                            lo,
                            hi
                        ),
                        None => println!("    vp {}: empty", v),
                    },
                    Err(err) => println!("    vp {}: unreadable ({})", v, err),
                }
            }
        }
    }

    Ok(())
}
