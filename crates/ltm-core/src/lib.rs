//! ============================================================================
//! LTM-CORE: Long-term memory for conversational agents
//! ============================================================================
//! This crate handles memory persistence and recall for a persona system:
//! - Sentence embeddings from a locally cached ONNX model
//! - Qdrant collection lifecycle and similarity search
//! - Deduplicated, date-stamped recall strings for prompt injection
//! - Recency-window recall for short-term context
//! ============================================================================

pub mod config;
pub mod error;
pub mod memory;

// Re-export main types for convenience
pub use config::LtmConfig;
pub use error::MemoryError;
pub use memory::{
    Embedder, HashingEmbedder, InMemoryIndex, LocalEmbedder, MemoryDoc, MemoryStore,
    QdrantIndex, RecallResult, VectorIndex,
};
