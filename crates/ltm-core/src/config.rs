//! ============================================================================
//! LTM Configuration - Collection, index endpoint and embedder settings
//! ============================================================================
//! Layering: defaults → optional JSON file → environment variables.
//! The CLI applies its own flags on top of the result.
//! ============================================================================

use anyhow::{anyhow, Result};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use tracing::{debug, warn};

use crate::error::MemoryError;

/// Default collection name
pub const DEFAULT_COLLECTION: &str = "ltm_memories";

/// Default embedding model
pub const DEFAULT_EMBEDDER: &str = "all-MiniLM-L6-v2";

/// Default number of distinct memories returned by recall
pub const DEFAULT_LTM_LIMIT: usize = 5;

/// Qdrant gRPC port
pub const DEFAULT_QDRANT_PORT: u16 = 6334;

/// Long-term memory configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LtmConfig {
    /// Name of the vector collection backing this memory
    pub collection: String,
    /// Maximum number of distinct memories returned by recall
    pub ltm_limit: usize,
    /// Embedding model identifier (e.g. "all-MiniLM-L6-v2")
    pub embedder: String,
    /// Vector index host
    pub address: String,
    /// Vector index port
    pub port: u16,
    /// Compute device hint for embedding ("cpu", "cuda")
    pub device: String,
    /// Enables per-item diagnostic logging
    pub verbose: bool,
    /// Root directory holding one sub-directory per downloaded model
    pub model_cache_dir: PathBuf,
}

impl Default for LtmConfig {
    fn default() -> Self {
        Self {
            collection: DEFAULT_COLLECTION.to_string(),
            ltm_limit: DEFAULT_LTM_LIMIT,
            embedder: DEFAULT_EMBEDDER.to_string(),
            address: "localhost".to_string(),
            port: DEFAULT_QDRANT_PORT,
            device: "cpu".to_string(),
            verbose: false,
            model_cache_dir: default_model_cache_dir(),
        }
    }
}

impl LtmConfig {
    /// Load configuration from a JSON file; missing keys keep their defaults
    pub fn from_json_file(path: &Path) -> Result<Self> {
        let raw = std::fs::read_to_string(path)
            .map_err(|e| anyhow!("Failed to read config {}: {}", path.display(), e))?;
        let config: Self = serde_json::from_str(&raw)
            .map_err(|e| anyhow!("Failed to parse config {}: {}", path.display(), e))?;
        debug!("Loaded config from {}", path.display());
        Ok(config)
    }

    /// Overlay environment variables on top of this config
    pub fn with_env(mut self) -> Self {
        if let Ok(v) = std::env::var("LTM_COLLECTION") {
            self.collection = v;
        }
        if let Ok(v) = std::env::var("LTM_LIMIT") {
            match v.parse() {
                Ok(limit) => self.ltm_limit = limit,
                Err(_) => warn!("Ignoring invalid LTM_LIMIT '{}'", v),
            }
        }
        if let Ok(v) = std::env::var("LTM_EMBEDDER") {
            self.embedder = v;
        }
        if let Ok(v) = std::env::var("QDRANT_ADDRESS") {
            self.address = v;
        }
        if let Ok(v) = std::env::var("QDRANT_PORT") {
            match v.parse() {
                Ok(port) => self.port = port,
                Err(_) => warn!("Ignoring invalid QDRANT_PORT '{}'", v),
            }
        }
        if let Ok(v) = std::env::var("LTM_DEVICE") {
            self.device = v;
        }
        if let Ok(v) = std::env::var("LTM_VERBOSE") {
            self.verbose = matches!(v.to_lowercase().as_str(), "1" | "true" | "yes" | "on");
        }
        if let Ok(v) = std::env::var("LTM_MODEL_CACHE_DIR") {
            self.model_cache_dir = PathBuf::from(v);
        }
        self
    }

    /// Check the settings that would make every later call fail
    pub fn validate(&self) -> Result<(), MemoryError> {
        if self.collection.trim().is_empty() {
            return Err(MemoryError::Config("collection name is empty".into()));
        }
        if self.ltm_limit == 0 {
            return Err(MemoryError::Config("ltm_limit must be at least 1".into()));
        }
        if self.port == 0 {
            return Err(MemoryError::Config("port must be non-zero".into()));
        }
        if self.embedder.trim().is_empty() {
            return Err(MemoryError::Config("embedder name is empty".into()));
        }
        Ok(())
    }

    /// Endpoint URL for the Qdrant client
    pub fn qdrant_url(&self) -> String {
        if self.address.contains("://") {
            let trimmed = self.address.trim_end_matches('/');
            // An explicit port in the address wins
            if trimmed.rsplit(':').next().is_some_and(|p| p.parse::<u16>().is_ok()) {
                trimmed.to_string()
            } else {
                format!("{}:{}", trimmed, self.port)
            }
        } else {
            format!("http://{}:{}", self.address, self.port)
        }
    }

    /// Cache directory for the configured embedder
    pub fn model_dir(&self) -> PathBuf {
        self.model_cache_dir.join(&self.embedder)
    }
}

/// ~/.ltm/models, or ./models when no home directory is available
pub fn default_model_cache_dir() -> PathBuf {
    match dirs::home_dir() {
        Some(home) => home.join(".ltm").join("models"),
        None => PathBuf::from("models"),
    }
}
