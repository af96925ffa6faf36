//! ============================================================================
//! Embedding Service - Vector embeddings for semantic memory search
//! ============================================================================
//! Generates sentence embeddings locally with an ONNX model (fastembed).
//! Models live in a per-model cache directory; a missing or unreadable cache
//! is repopulated from the model hub on construction.
//! ============================================================================

use anyhow::{anyhow, Result};
use fastembed::{
    EmbeddingModel, InitOptionsUserDefined, ModelInfo, TextEmbedding, TokenizerFiles,
    UserDefinedEmbeddingModel,
};
use reqwest::Client;
use std::path::{Path, PathBuf};
use tracing::{debug, info, warn};

use crate::error::MemoryError;

/// Remote source for model files
pub const DEFAULT_MODEL_HUB: &str = "https://huggingface.co";

/// Dimension of the offline hashing embedder
pub const HASHING_DIM: usize = 384;

/// Name of the ONNX weights file inside a model cache directory
const MODEL_FILE: &str = "model.onnx";

/// Tokenizer files stored next to the weights
const TOKENIZER_FILES: [&str; 4] = [
    "tokenizer.json",
    "config.json",
    "special_tokens_map.json",
    "tokenizer_config.json",
];

/// Turns text into fixed-length vectors.
///
/// `encode` must be deterministic for a given model and input, and every
/// vector it returns has exactly `dimension()` elements.
pub trait Embedder: Send + Sync {
    fn encode(&self, text: &str) -> Result<Vec<f32>>;

    fn dimension(&self) -> usize;

    fn model_name(&self) -> &str;
}

// ============================================================================
// Local ONNX embedder
// ============================================================================

/// Sentence-transformer embedder backed by a locally cached ONNX model
pub struct LocalEmbedder {
    model: TextEmbedding,
    name: String,
    dim: usize,
    cache_dir: PathBuf,
}

impl LocalEmbedder {
    /// Load `model_name` from `<cache_root>/<model_name>`, fetching it first if needed
    pub async fn load(model_name: &str, cache_root: &Path, device: &str) -> Result<Self> {
        Self::load_from_hub(model_name, cache_root, device, DEFAULT_MODEL_HUB).await
    }

    /// Same as [`LocalEmbedder::load`] with an explicit model hub URL
    pub async fn load_from_hub(
        model_name: &str,
        cache_root: &Path,
        device: &str,
        hub_url: &str,
    ) -> Result<Self> {
        if !device.eq_ignore_ascii_case("cpu") {
            warn!(
                "Embedding device '{}' requested; only CPU execution is available, using CPU",
                device
            );
        }

        let info = resolve_model(model_name)?;
        check_loadable(&info)?;
        let cache_dir = cache_root.join(model_name);

        if cached_model_present(&cache_dir) {
            debug!(
                "Embedder {} found in {}, loading from disk",
                model_name,
                cache_dir.display()
            );
            match load_from_dir(&info, &cache_dir) {
                Ok(model) => {
                    info!("Loaded embedder {} from {}", model_name, cache_dir.display());
                    return Ok(Self {
                        model,
                        name: model_name.to_string(),
                        dim: info.dim,
                        cache_dir,
                    });
                }
                Err(e) => warn!(
                    "Failed to load embedder {} from {}, fetching again: {}",
                    model_name,
                    cache_dir.display(),
                    e
                ),
            }
        } else {
            warn!(
                "Embedder {} not found in {}, downloading",
                model_name,
                cache_dir.display()
            );
        }

        fetch_model(&info, hub_url, &cache_dir)
            .await
            .map_err(|e| MemoryError::ModelFetch {
                model: model_name.to_string(),
                reason: e.to_string(),
            })?;

        let model = load_from_dir(&info, &cache_dir)?;
        info!("Downloaded embedder {} to {}", model_name, cache_dir.display());

        Ok(Self {
            model,
            name: model_name.to_string(),
            dim: info.dim,
            cache_dir,
        })
    }

    /// Directory the model was loaded from
    pub fn cache_dir(&self) -> &Path {
        &self.cache_dir
    }
}

impl Embedder for LocalEmbedder {
    fn encode(&self, text: &str) -> Result<Vec<f32>> {
        let mut embeddings = self
            .model
            .embed(vec![text], None)
            .map_err(|e| anyhow!("Failed to embed text: {}", e))?;
        let vector = embeddings
            .pop()
            .ok_or_else(|| anyhow!("No embedding returned"))?;

        if vector.len() != self.dim {
            return Err(MemoryError::DimensionMismatch {
                expected: self.dim,
                actual: vector.len(),
            }
            .into());
        }
        Ok(vector)
    }

    fn dimension(&self) -> usize {
        self.dim
    }

    fn model_name(&self) -> &str {
        &self.name
    }
}

/// Find the catalogue entry for a model name.
///
/// Accepts the full model code (`Qdrant/all-MiniLM-L6-v2-onnx`) or its bare
/// name with or without the `-onnx` suffix, case-insensitively.
pub fn resolve_model(model_name: &str) -> Result<ModelInfo<EmbeddingModel>, MemoryError> {
    let wanted = normalize_model_name(model_name);
    TextEmbedding::list_supported_models()
        .into_iter()
        .find(|info| {
            info.model_code.eq_ignore_ascii_case(model_name)
                || normalize_model_name(&info.model_code) == wanted
        })
        .ok_or_else(|| MemoryError::UnknownModel(model_name.to_string()))
}

/// Weights are handed to the runtime as bytes, so a model whose graph
/// references external data files cannot be loaded
fn check_loadable(info: &ModelInfo<EmbeddingModel>) -> Result<(), MemoryError> {
    if info.additional_files.is_empty() {
        return Ok(());
    }
    Err(MemoryError::UnsupportedModel {
        model: info.model_code.clone(),
        reason: format!(
            "weights reference external data files ({})",
            info.additional_files.join(", ")
        ),
    })
}

fn normalize_model_name(name: &str) -> String {
    let bare = name.rsplit('/').next().unwrap_or(name);
    let bare = bare.strip_suffix("-onnx").unwrap_or(bare);
    bare.to_lowercase()
}

/// True when the cache directory holds a saved model
pub fn cached_model_present(cache_dir: &Path) -> bool {
    cache_dir.is_dir() && cache_dir.join(MODEL_FILE).is_file()
}

fn load_from_dir(info: &ModelInfo<EmbeddingModel>, dir: &Path) -> Result<TextEmbedding> {
    let read = |name: &str| -> Result<Vec<u8>> {
        std::fs::read(dir.join(name)).map_err(|e| {
            MemoryError::ModelLoad {
                model: info.model_code.clone(),
                path: dir.join(name).display().to_string(),
                reason: e.to_string(),
            }
            .into()
        })
    };

    let tokenizer_files = TokenizerFiles {
        tokenizer_file: read(TOKENIZER_FILES[0])?,
        config_file: read(TOKENIZER_FILES[1])?,
        special_tokens_map_file: read(TOKENIZER_FILES[2])?,
        tokenizer_config_file: read(TOKENIZER_FILES[3])?,
    };

    let mut user_model = UserDefinedEmbeddingModel::new(read(MODEL_FILE)?, tokenizer_files);
    if let Some(pooling) = TextEmbedding::get_default_pooling_method(&info.model) {
        user_model = user_model.with_pooling(pooling);
    }

    TextEmbedding::try_new_from_user_defined(user_model, InitOptionsUserDefined::default())
        .map_err(|e| {
            MemoryError::ModelLoad {
                model: info.model_code.clone(),
                path: dir.display().to_string(),
                reason: e.to_string(),
            }
            .into()
        })
}

/// Download weights and tokenizer files into `dir`
async fn fetch_model(info: &ModelInfo<EmbeddingModel>, hub_url: &str, dir: &Path) -> Result<()> {
    tokio::fs::create_dir_all(dir)
        .await
        .map_err(|e| anyhow!("Failed to create {}: {}", dir.display(), e))?;

    let client = Client::new();
    let base = format!(
        "{}/{}/resolve/main",
        hub_url.trim_end_matches('/'),
        info.model_code
    );

    // Weights last, so a partial download never looks like a cached model
    let files = TOKENIZER_FILES
        .iter()
        .map(|name| (name.to_string(), name.to_string()))
        .chain(std::iter::once((info.model_file.clone(), MODEL_FILE.to_string())));

    for (remote, local) in files {
        let url = format!("{}/{}", base, remote);
        debug!("Fetching {}", url);

        let response = client
            .get(&url)
            .send()
            .await
            .map_err(|e| anyhow!("Failed to request {}: {}", url, e))?;

        let status = response.status();
        if !status.is_success() {
            return Err(anyhow!("Model hub error ({}) for {}", status, url));
        }

        let bytes = response
            .bytes()
            .await
            .map_err(|e| anyhow!("Failed to read {}: {}", url, e))?;

        tokio::fs::write(dir.join(&local), &bytes)
            .await
            .map_err(|e| anyhow!("Failed to write {}: {}", dir.join(&local).display(), e))?;
    }

    Ok(())
}

// ============================================================================
// Offline hashing embedder
// ============================================================================

/// Deterministic bag-of-words embedder that needs no model files.
///
/// Lower-cased alphanumeric tokens are hashed (FNV-1a) into `dim` signed
/// buckets and the result is L2-normalized. Texts sharing words land close
/// together under cosine similarity; that is all it promises.
pub struct HashingEmbedder {
    dim: usize,
}

impl HashingEmbedder {
    pub fn new(dim: usize) -> Self {
        Self { dim: dim.max(1) }
    }
}

impl Default for HashingEmbedder {
    fn default() -> Self {
        Self::new(HASHING_DIM)
    }
}

impl Embedder for HashingEmbedder {
    fn encode(&self, text: &str) -> Result<Vec<f32>> {
        let mut vector = vec![0.0f32; self.dim];

        for token in text
            .split(|c: char| !c.is_alphanumeric())
            .filter(|t| !t.is_empty())
        {
            let hash = fnv1a(token.to_lowercase().as_bytes());
            let bucket = (hash % self.dim as u64) as usize;
            let sign = if (hash >> 63) == 0 { 1.0 } else { -1.0 };
            vector[bucket] += sign;
        }

        let norm = vector.iter().map(|x| x * x).sum::<f32>().sqrt();
        if norm > f32::EPSILON {
            vector.iter_mut().for_each(|x| *x /= norm);
        }
        Ok(vector)
    }

    fn dimension(&self) -> usize {
        self.dim
    }

    fn model_name(&self) -> &str {
        "hashing"
    }
}

fn fnv1a(bytes: &[u8]) -> u64 {
    let mut hash: u64 = 0xcbf2_9ce4_8422_2325;
    for b in bytes {
        hash ^= *b as u64;
        hash = hash.wrapping_mul(0x0000_0100_0000_01b3);
    }
    hash
}
