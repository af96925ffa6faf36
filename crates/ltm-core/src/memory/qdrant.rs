//! ============================================================================
//! Qdrant Index - Qdrant vector database operations
//! ============================================================================
//! Stores memory records as points (UUID id, embedding, string payload) in a
//! single cosine-distance collection and searches them by similarity.
//! ============================================================================

use anyhow::{anyhow, Result};
use async_trait::async_trait;
use qdrant_client::qdrant::{
    point_id::PointIdOptions, CountPointsBuilder, CreateCollectionBuilder, DeletePointsBuilder,
    Distance, PointId, PointStruct, PointsIdsList, SearchPointsBuilder, UpsertPointsBuilder,
    Value, VectorParamsBuilder,
};
use qdrant_client::Qdrant;
use std::collections::HashMap;
use tracing::{debug, info, warn};
use uuid::Uuid;

use super::index::VectorIndex;
use super::types::{MemoryDoc, MemoryRecord, RecordId, ScoredRecord};

/// Vector index backed by a Qdrant collection
pub struct QdrantIndex {
    client: Qdrant,
    collection: String,
    url: String,
}

impl QdrantIndex {
    /// Create a client for `collection` on the Qdrant instance at `url`
    pub fn connect(url: &str, collection: &str) -> Result<Self> {
        debug!("Connecting to Qdrant at {}", url);

        let client = Qdrant::from_url(url)
            .build()
            .map_err(|e| anyhow!("Failed to create Qdrant client: {}", e))?;

        Ok(Self {
            client,
            collection: collection.to_string(),
            url: url.to_string(),
        })
    }

    /// Endpoint this index talks to
    pub fn url(&self) -> &str {
        &self.url
    }
}

#[async_trait]
impl VectorIndex for QdrantIndex {
    fn collection(&self) -> &str {
        &self.collection
    }

    async fn collection_exists(&self) -> Result<bool> {
        self.client
            .collection_exists(self.collection.as_str())
            .await
            .map_err(|e| anyhow!("Failed to check collection existence: {}", e))
    }

    async fn ensure_collection(&self, dim: usize) -> Result<()> {
        if self.collection_exists().await? {
            debug!("Collection {} already exists", self.collection);
            return Ok(());
        }

        info!("Creating collection: {} (dim {})", self.collection, dim);

        self.client
            .create_collection(
                CreateCollectionBuilder::new(&self.collection)
                    .vectors_config(VectorParamsBuilder::new(dim as u64, Distance::Cosine)),
            )
            .await
            .map_err(|e| anyhow!("Failed to create collection {}: {}", self.collection, e))?;

        info!("Collection {} created successfully", self.collection);
        Ok(())
    }

    async fn upsert(&self, record: &MemoryRecord) -> Result<()> {
        debug!("Upserting memory {} into {}", record.id, self.collection);

        let point = PointStruct::new(
            record.id.to_string(),
            record.vector.clone(),
            doc_to_payload(&record.doc),
        );

        let info = self
            .client
            .upsert_points(UpsertPointsBuilder::new(&self.collection, vec![point]).wait(true))
            .await
            .map_err(|e| anyhow!("Failed to upsert memory: {}", e))?;

        debug!("Upsert of {} acknowledged: {:?}", record.id, info.result);
        Ok(())
    }

    async fn search(&self, query: &[f32], limit: u64) -> Result<Vec<ScoredRecord>> {
        debug!("Searching {} (limit: {})", self.collection, limit);

        let search_result = self
            .client
            .search_points(
                SearchPointsBuilder::new(&self.collection, query.to_vec(), limit)
                    .with_payload(true),
            )
            .await
            .map_err(|e| anyhow!("Failed to search memories: {}", e))?;

        // Every returned point is kept so that rank positions match the search
        let hits: Vec<ScoredRecord> = search_result
            .result
            .into_iter()
            .filter_map(|point| {
                let Some(id) = point.id.and_then(extract_record_id) else {
                    warn!("Skipping point without an id");
                    return None;
                };
                Some(ScoredRecord {
                    id,
                    score: point.score,
                    doc: payload_to_doc(&point.payload),
                })
            })
            .collect();

        debug!("Found {} matching memories", hits.len());
        Ok(hits)
    }

    async fn delete(&self, id: &Uuid) -> Result<()> {
        if !self.collection_exists().await? {
            debug!(
                "Collection {} does not exist, nothing to delete for {}",
                self.collection, id
            );
            return Ok(());
        }

        debug!("Deleting memory {}", id);

        self.client
            .delete_points(
                DeletePointsBuilder::new(&self.collection)
                    .points(PointsIdsList {
                        ids: vec![PointId::from(id.to_string())],
                    })
                    .wait(true),
            )
            .await
            .map_err(|e| anyhow!("Failed to delete memory: {}", e))?;

        Ok(())
    }

    async fn delete_collection(&self) -> Result<()> {
        if !self.collection_exists().await? {
            debug!(
                "Collection {} does not exist, nothing to delete",
                self.collection
            );
            return Ok(());
        }

        self.client
            .delete_collection(self.collection.as_str())
            .await
            .map_err(|e| anyhow!("Failed to delete collection {}: {}", self.collection, e))?;

        info!("Deleted collection {}", self.collection);
        Ok(())
    }

    async fn count(&self) -> Result<u64> {
        let response = self
            .client
            .count(CountPointsBuilder::new(&self.collection).exact(true))
            .await
            .map_err(|e| anyhow!("Failed to count memories: {}", e))?;

        Ok(response.result.map(|r| r.count).unwrap_or(0))
    }

    async fn health_check(&self) -> Result<bool> {
        match self.client.health_check().await {
            Ok(_) => Ok(true),
            Err(e) => {
                warn!("Qdrant health check failed: {}", e);
                Ok(false)
            }
        }
    }
}

fn doc_to_payload(doc: &MemoryDoc) -> HashMap<String, Value> {
    [
        ("comment", doc.comment.clone()),
        ("people", doc.people.clone()),
        ("emotions", doc.emotions.clone()),
        ("datetime", doc.datetime.clone()),
    ]
    .into_iter()
    .map(|(k, v)| (k.to_string(), Value::from(v)))
    .collect()
}

/// Missing fields come back empty; the formatter skips hits whose datetime
/// does not parse
fn payload_to_doc(payload: &HashMap<String, Value>) -> MemoryDoc {
    MemoryDoc {
        comment: get_string(payload, "comment").unwrap_or_default(),
        people: get_string(payload, "people").unwrap_or_default(),
        emotions: get_string(payload, "emotions").unwrap_or_default(),
        datetime: get_string(payload, "datetime").unwrap_or_default(),
    }
}

// Helper to extract the record id from a PointId
fn extract_record_id(point_id: PointId) -> Option<RecordId> {
    match point_id.point_id_options? {
        PointIdOptions::Uuid(uuid_str) => Uuid::parse_str(&uuid_str).ok().map(RecordId::Uuid),
        PointIdOptions::Num(n) => Some(RecordId::Num(n)),
    }
}

fn get_string(payload: &HashMap<String, Value>, key: &str) -> Option<String> {
    payload.get(key).and_then(|v| v.as_str()).map(|s| s.to_string())
}
