//! ============================================================================
//! Error Types - Typed failures for the memory subsystem
//! ============================================================================
//! Most operations return `anyhow::Result`; these variants mark the cases
//! callers may want to match on (model bootstrap, collection state, input).
//! ============================================================================

/// Error types for long-term memory operations
#[derive(Debug, thiserror::Error)]
pub enum MemoryError {
    #[error("Unknown embedding model: {0}")]
    UnknownModel(String),

    #[error("Failed to load embedding model {model} from {path}: {reason}")]
    ModelLoad {
        model: String,
        path: String,
        reason: String,
    },

    #[error("Embedding model {model} is not supported: {reason}")]
    UnsupportedModel { model: String, reason: String },

    #[error("Failed to fetch embedding model {model}: {reason}")]
    ModelFetch { model: String, reason: String },

    #[error("Vector dimension mismatch: expected {expected}, got {actual}")]
    DimensionMismatch { expected: usize, actual: usize },

    #[error("Collection not found: {0}")]
    CollectionMissing(String),

    #[error("Invalid memory datetime '{value}': {reason}")]
    InvalidDatetime { value: String, reason: String },

    #[error("Invalid configuration: {0}")]
    Config(String),
}
