//! # card-embeddings
//!
//! Image embeddings for cardmatch.
//!
//! The embedding model is an external capability: given an image, return a
//! fixed-length unit vector. This crate defines that capability
//! (`ImageEmbedder`), a local CLIP implementation on Candle, and the shared
//! handle every pipeline component receives.
//!
//! ## Features
//! - CLIP ViT-B/32 image tower (512 dimensions), CPU inference
//! - Model weights cached locally after the first download
//! - `SharedEmbedder`: one model per process, bounded concurrent use
//! - `MockImageEmbedder`: deterministic byte-derived vectors for tests

pub mod cache;
pub mod clip;
pub mod error;
pub mod mock;
pub mod model;
pub mod shared;

pub use crate::clip::ClipEmbedder;
pub use cache::{get_or_download_model, ModelCache, DEFAULT_MODEL_REPO, DEFAULT_MODEL_REVISION};
pub use error::EmbeddingError;
pub use mock::MockImageEmbedder;
pub use model::{Embedding, ImageEmbedder, ModelInfo};
pub use shared::SharedEmbedder;
