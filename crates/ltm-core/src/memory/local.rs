//! ============================================================================
//! In-Memory Index - Process-local vector index
//! ============================================================================
//! Brute-force cosine search over records kept in insertion order.
//! Nothing is persisted; dropping the index drops the memories.
//! ============================================================================

use anyhow::Result;
use async_trait::async_trait;
use tokio::sync::RwLock;
use tracing::debug;
use uuid::Uuid;

use super::index::{cosine_similarity, VectorIndex};
use super::types::{MemoryRecord, ScoredRecord};
use crate::error::MemoryError;

#[derive(Debug)]
struct Collection {
    dim: usize,
    records: Vec<MemoryRecord>,
}

/// Vector index held entirely in process memory
pub struct InMemoryIndex {
    name: String,
    collection: RwLock<Option<Collection>>,
}

impl InMemoryIndex {
    pub fn new(collection: impl Into<String>) -> Self {
        Self {
            name: collection.into(),
            collection: RwLock::new(None),
        }
    }

    fn check_dim(expected: usize, actual: usize) -> Result<()> {
        if expected != actual {
            return Err(MemoryError::DimensionMismatch { expected, actual }.into());
        }
        Ok(())
    }
}

#[async_trait]
impl VectorIndex for InMemoryIndex {
    fn collection(&self) -> &str {
        &self.name
    }

    async fn collection_exists(&self) -> Result<bool> {
        Ok(self.collection.read().await.is_some())
    }

    async fn ensure_collection(&self, dim: usize) -> Result<()> {
        let mut guard = self.collection.write().await;
        match guard.as_ref() {
            Some(existing) => {
                debug!(
                    "Collection {} already exists with {} records",
                    self.name,
                    existing.records.len()
                );
            }
            None => {
                *guard = Some(Collection {
                    dim,
                    records: Vec::new(),
                });
                debug!("Created in-memory collection {} (dim {})", self.name, dim);
            }
        }
        Ok(())
    }

    async fn upsert(&self, record: &MemoryRecord) -> Result<()> {
        let mut guard = self.collection.write().await;
        let collection = guard
            .as_mut()
            .ok_or_else(|| MemoryError::CollectionMissing(self.name.clone()))?;
        Self::check_dim(collection.dim, record.vector.len())?;

        match collection.records.iter_mut().find(|r| r.id == record.id) {
            Some(existing) => *existing = record.clone(),
            None => collection.records.push(record.clone()),
        }
        Ok(())
    }

    async fn search(&self, query: &[f32], limit: u64) -> Result<Vec<ScoredRecord>> {
        let guard = self.collection.read().await;
        let collection = guard
            .as_ref()
            .ok_or_else(|| MemoryError::CollectionMissing(self.name.clone()))?;
        Self::check_dim(collection.dim, query.len())?;

        let mut hits: Vec<ScoredRecord> = collection
            .records
            .iter()
            .map(|r| ScoredRecord {
                id: r.id.into(),
                score: cosine_similarity(query, &r.vector),
                doc: r.doc.clone(),
            })
            .collect();

        // Stable sort keeps insertion order among equal scores
        hits.sort_by(|a, b| b.score.total_cmp(&a.score));
        hits.truncate(usize::try_from(limit).unwrap_or(usize::MAX));
        Ok(hits)
    }

    async fn delete(&self, id: &Uuid) -> Result<()> {
        if let Some(collection) = self.collection.write().await.as_mut() {
            collection.records.retain(|r| r.id != *id);
        }
        Ok(())
    }

    async fn delete_collection(&self) -> Result<()> {
        if self.collection.write().await.take().is_none() {
            debug!("Collection {} does not exist, nothing to delete", self.name);
        }
        Ok(())
    }

    async fn count(&self) -> Result<u64> {
        Ok(self
            .collection
            .read()
            .await
            .as_ref()
            .map(|c| c.records.len() as u64)
            .unwrap_or(0))
    }

    async fn health_check(&self) -> Result<bool> {
        Ok(true)
    }
}
