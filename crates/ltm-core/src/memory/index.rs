//! ============================================================================
//! Vector Index - Nearest-neighbour storage interface
//! ============================================================================
//! One index instance serves one named collection. Implementations:
//! - `QdrantIndex`: Qdrant service over gRPC
//! - `InMemoryIndex`: process-local, for tests and offline use
//! ============================================================================

use anyhow::Result;
use async_trait::async_trait;
use uuid::Uuid;

use super::types::{MemoryRecord, ScoredRecord};

/// CRUD and cosine nearest-neighbour search over one collection
#[async_trait]
pub trait VectorIndex: Send + Sync {
    /// Name of the collection this index operates on
    fn collection(&self) -> &str;

    async fn collection_exists(&self) -> Result<bool>;

    /// Create the collection with cosine distance unless it already exists
    async fn ensure_collection(&self, dim: usize) -> Result<()>;

    /// Insert or replace a record; returns once the write is acknowledged
    async fn upsert(&self, record: &MemoryRecord) -> Result<()>;

    /// Up to `limit` records, most similar first.
    ///
    /// Points with incomplete payloads are still returned (missing fields
    /// empty) so hit positions match the backend's ranking.
    async fn search(&self, query: &[f32], limit: u64) -> Result<Vec<ScoredRecord>>;

    /// Remove a record; unknown ids and an absent collection are not errors
    async fn delete(&self, id: &Uuid) -> Result<()>;

    /// Drop the whole collection; an absent collection is not an error
    async fn delete_collection(&self) -> Result<()>;

    /// Exact number of stored records
    async fn count(&self) -> Result<u64>;

    async fn health_check(&self) -> Result<bool>;
}

/// Cosine similarity in [-1, 1]; zero-magnitude or mismatched vectors give 0
pub fn cosine_similarity(a: &[f32], b: &[f32]) -> f32 {
    if a.len() != b.len() {
        return 0.0;
    }

    let mut dot = 0.0f32;
    let mut mag_a = 0.0f32;
    let mut mag_b = 0.0f32;
    for (x, y) in a.iter().zip(b) {
        dot += x * y;
        mag_a += x * x;
        mag_b += y * y;
    }

    let denom = mag_a.sqrt() * mag_b.sqrt();
    if denom < f32::EPSILON {
        return 0.0;
    }
    dot / denom
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_cosine_identical() {
        let v = [0.3, -0.2, 0.9];
        assert!((cosine_similarity(&v, &v) - 1.0).abs() < 1e-6);
    }

    #[test]
    fn test_cosine_orthogonal_and_opposite() {
        assert!(cosine_similarity(&[1.0, 0.0], &[0.0, 1.0]).abs() < 1e-6);
        assert!((cosine_similarity(&[1.0, 0.0], &[-2.0, 0.0]) + 1.0).abs() < 1e-6);
    }

    #[test]
    fn test_cosine_edge_cases() {
        assert_eq!(cosine_similarity(&[0.0, 0.0], &[1.0, 1.0]), 0.0);
        assert_eq!(cosine_similarity(&[1.0], &[1.0, 0.0]), 0.0);
    }
}
