//! # card-index
//!
//! Embedding index for cardmatch.
//!
//! Holds the persisted index artifact (three aligned sequences: card ids,
//! an N×D embedding matrix and per-row metadata), the exact brute-force
//! similarity engine that ranks index rows against a query, and the
//! builder that turns a card catalog into a fresh artifact.
//!
//! ## Features
//! - Single-file little-endian artifact, replaced atomically on rebuild
//! - Exact cosine ranking with deterministic tie-breaks
//! - `SimilaritySearch` seam for swapping in another search structure
//! - Concurrent, cancellable index builds with per-record skip reporting

pub mod artifact;
pub mod builder;
pub mod error;
pub mod fetch;
pub mod index;
pub mod search;

pub use artifact::EmbeddingIndex;
pub use builder::{BuildConfig, BuildReport, IndexBuilder, ItemOutcome, SkipReason, SkippedRecord};
pub use error::{FetchError, IndexError};
pub use fetch::{FetchConfig, HttpImageFetcher, ImageFetcher, InMemoryFetcher};
pub use index::{CardIndex, MatchResult};
pub use search::{clamp_k, ExactSearch, ScoredRow, SimilaritySearch};
