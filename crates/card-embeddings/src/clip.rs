//! Candle-based CLIP image embedder.
//!
//! Uses the ViT-B/32 vision tower and projection for 512-dimensional
//! image embeddings.

use std::path::Path;

use candle_core::{DType, Device, Tensor};
use candle_nn::VarBuilder;
use candle_transformers::models::clip::{ClipConfig, ClipModel};
use image::imageops::FilterType;
use tracing::{debug, info};

use crate::cache::{get_or_download_model, ModelCache};
use crate::error::EmbeddingError;
use crate::model::{Embedding, ImageEmbedder, ModelInfo};

/// Embedding dimension for CLIP ViT-B/32
pub const EMBEDDING_DIM: usize = 512;

/// Input resolution expected by the vision tower
pub const IMAGE_SIZE: usize = 224;

/// Per-channel normalization used when CLIP was trained
const CLIP_MEAN: [f32; 3] = [0.481_454_66, 0.457_827_5, 0.408_210_73];
const CLIP_STD: [f32; 3] = [0.268_629_54, 0.261_302_58, 0.275_777_1];

/// Candle-based embedder using CLIP ViT-B/32.
pub struct ClipEmbedder {
    model: ClipModel,
    device: Device,
    info: ModelInfo,
}

impl ClipEmbedder {
    /// Load the embedding model from cache (downloading if needed).
    pub fn load(cache: &ModelCache) -> Result<Self, EmbeddingError> {
        let weights = get_or_download_model(cache)?;
        Self::load_from_path(&weights)
    }

    /// Load with default cache settings
    pub fn load_default() -> Result<Self, EmbeddingError> {
        Self::load(&ModelCache::default())
    }

    /// Load from an explicit safetensors file
    pub fn load_from_path(weights_path: &Path) -> Result<Self, EmbeddingError> {
        if !weights_path.exists() {
            return Err(EmbeddingError::ModelNotFound(
                weights_path.display().to_string(),
            ));
        }
        info!(path = %weights_path.display(), "Loading CLIP model...");

        // CPU only for now; accelerator placement belongs behind a feature flag.
        let device = Device::Cpu;

        let config = ClipConfig::vit_base_patch32();
        let vb = unsafe {
            VarBuilder::from_mmaped_safetensors(&[weights_path.to_path_buf()], DType::F32, &device)?
        };
        let model = ClipModel::new(vb, &config)?;

        info!(dim = EMBEDDING_DIM, image_size = IMAGE_SIZE, "Model loaded successfully");

        Ok(Self {
            model,
            device,
            info: ModelInfo {
                name: "clip-vit-base-patch32".to_string(),
                dimension: EMBEDDING_DIM,
                image_size: IMAGE_SIZE,
            },
        })
    }

    /// Decode, resize and normalize an image into a (1, 3, H, W) tensor.
    fn load_pixels(&self, path: &Path) -> Result<Tensor, EmbeddingError> {
        // Reference images are stored as .png regardless of their real
        // encoding, so sniff the format from the content.
        let img = image::ImageReader::open(path)?
            .with_guessed_format()?
            .decode()?;

        let size = self.info.image_size;
        let rgb = img
            .resize_to_fill(size as u32, size as u32, FilterType::CatmullRom)
            .to_rgb8();

        let plane = size * size;
        let mut data = vec![0f32; 3 * plane];
        for (i, pixel) in rgb.pixels().enumerate() {
            for c in 0..3 {
                data[c * plane + i] = (f32::from(pixel[c]) / 255.0 - CLIP_MEAN[c]) / CLIP_STD[c];
            }
        }

        Ok(Tensor::from_vec(data, (1, 3, size, size), &self.device)?)
    }
}

impl ImageEmbedder for ClipEmbedder {
    fn info(&self) -> &ModelInfo {
        &self.info
    }

    fn embed_image(&self, path: &Path) -> Result<Embedding, EmbeddingError> {
        let pixels = self.load_pixels(path)?;
        let features = self.model.get_image_features(&pixels)?;
        let values: Vec<f32> = features.squeeze(0)?.to_vec1()?;

        if values.len() != EMBEDDING_DIM {
            return Err(EmbeddingError::DimensionMismatch {
                expected: EMBEDDING_DIM,
                actual: values.len(),
            });
        }

        debug!(path = %path.display(), dim = values.len(), "Embedded image");
        Embedding::try_new(values)
    }
}
