//! Vantage-DB: approximate k-nearest-neighbor search over time series
//!
//! # Architecture
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────┐
//! │                   vantage-db CLI (clap)                     │
//! │             generate · build · query · stats                │
//! └─────────────────────────────────────────────────────────────┘
//!                              │
//!                              ▼
//! ┌─────────────────────────────────────────────────────────────┐
//! │        DirCorpus (ts_<id>.json) · StandardizedEuclidean     │
//! └─────────────────────────────────────────────────────────────┘
//!                              │
//!                              ▼
//! ┌─────────────────────────────────────────────────────────────┐
//! │                       vantage-core                          │
//! │     IndexBuilder · QueryEngine · mmap distance indices      │
//! └─────────────────────────────────────────────────────────────┘
//! ```

pub mod corpus;
pub mod series;

pub use corpus::DirCorpus;
pub use series::{SeriesError, StandardizedEuclidean, TimeSeries};

pub use vantage_core::{
    BuildConfig, BuildError, BuildReport, IndexBuilder, IndexLayout, MappedIndex, Neighbor,
    ProbeCount, QueryConfig, QueryEngine, QueryError, QueryOutcome, SeriesId, SeriesSource,
    VantagePointSet,
};
