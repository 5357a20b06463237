//! Vantage Core – Distance indices, index builder and k-NN query engine
//!
//! # Architecture
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────┐
//! │                       QueryEngine                           │
//! │   rank vantage points · probe 2·dv radius · best-k merge    │
//! ├─────────────────────────────────────────────────────────────┤
//! │        IndexBuilder (one rayon task per vantage point)      │
//! ├─────────────────────────────────────────────────────────────┤
//! │   DistanceIndex / MappedIndex (mmap .vpi) · VantagePointSet │
//! └─────────────────────────────────────────────────────────────┘
//! ```
//!
//! Series data stays outside this crate: it is reached through
//! [`SeriesSource`] and compared through [`Metric`].

pub mod accumulator;
pub mod builder;
pub mod corpus;
pub mod format;
pub mod index;
pub mod layout;
pub mod metric;
pub mod query;
pub mod store;
pub mod vantage;

pub use accumulator::{CandidateAccumulator, Neighbor};
pub use builder::{BuildConfig, BuildError, BuildReport, IndexBuilder};
pub use corpus::{CorpusError, MemoryCorpus, SeriesId, SeriesSource};
pub use index::{DistanceIndex, IndexEntry, IndexError};
pub use layout::IndexLayout;
pub use metric::{Absolute, Euclidean, Metric};
pub use query::{ProbeCount, QueryConfig, QueryEngine, QueryError, QueryOutcome};
pub use store::MappedIndex;
pub use vantage::{VantageError, VantagePointSet};
