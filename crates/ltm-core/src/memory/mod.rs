//! ============================================================================
//! Memory Module - Long-term memory for conversational personas
//! ============================================================================
//! Provides vector-based memory storage using Qdrant for semantic search.
//!
//! ## Features
//! - Store memories with locally generated sentence embeddings
//! - Semantic recall with duplicate suppression
//! - Recency window recall independent of any query
//! - Idempotent collection bootstrap
//!
//! ## Architecture
//! ```text
//! store:  MemoryDoc → Embedder.encode(comment + people) → VectorIndex.upsert
//!
//! recall: query → Embedder.encode → VectorIndex.search(limit + 1)
//!                                            ↓
//!                        ResultFormatter (drop top hit, dedup, day dates)
//!                                            ↓
//!                               ["<comment>: on <YYYY-MM-DD>", ...]
//! ```
//!
//! ## Usage
//! ```rust,ignore
//! use ltm_core::{LtmConfig, MemoryDoc, MemoryStore};
//!
//! let store = MemoryStore::connect(LtmConfig::default().with_env()).await?;
//!
//! // Store a memory
//! store.store(MemoryDoc::now("Went hiking", "Alice", "happy")).await?;
//!
//! // Recall related memories
//! let related = store.recall("outdoor activity").await?;
//!
//! // Everything from the last six hours
//! let recent = store.get_last_summaries(6).await?;
//! ```
//! ============================================================================

mod embeddings;
mod format;
mod index;
mod local;
mod qdrant;
mod store;
mod types;

// Re-export public types
pub use embeddings::{
    cached_model_present, resolve_model, Embedder, HashingEmbedder, LocalEmbedder,
    DEFAULT_MODEL_HUB, HASHING_DIM,
};
pub use format::{ResultFormatter, RECALL_DISCARDED_HITS};
pub use index::{cosine_similarity, VectorIndex};
pub use local::InMemoryIndex;
pub use qdrant::QdrantIndex;
pub use store::MemoryStore;
pub use types::{
    format_datetime, parse_datetime, MemoryDoc, MemoryRecord, RecallResult, RecordId,
    ScoredRecord,
    DATETIME_FORMAT, DATE_FORMAT,
};
