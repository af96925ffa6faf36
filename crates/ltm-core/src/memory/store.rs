//! ============================================================================
//! Memory Store - Orchestrates memory storage and retrieval
//! ============================================================================
//! Owns the embedder and the vector index for one collection. Collection
//! bootstrap failures are logged and retried on the next write; search and
//! write failures propagate to the caller.
//! ============================================================================

use anyhow::Result;
use chrono::{Duration, Local, NaiveDateTime};
use std::sync::atomic::{AtomicBool, Ordering};
use tracing::{debug, error, info};
use uuid::Uuid;

use super::embeddings::{Embedder, LocalEmbedder};
use super::format::{ResultFormatter, RECALL_DISCARDED_HITS};
use super::index::VectorIndex;
use super::qdrant::QdrantIndex;
use super::types::{MemoryDoc, MemoryRecord, RecallResult};
use crate::config::LtmConfig;

/// Long-term memory for one persona collection
pub struct MemoryStore {
    config: LtmConfig,
    embedder: Box<dyn Embedder>,
    index: Box<dyn VectorIndex>,
    formatter: ResultFormatter,
    collection_ready: AtomicBool,
}

impl MemoryStore {
    /// Load the configured embedder and connect to Qdrant.
    ///
    /// Fails if the embedding model can neither be loaded from the cache
    /// directory nor fetched.
    pub async fn connect(config: LtmConfig) -> Result<Self> {
        config.validate()?;

        let embedder =
            LocalEmbedder::load(&config.embedder, &config.model_cache_dir, &config.device).await?;
        let index = QdrantIndex::connect(&config.qdrant_url(), &config.collection)?;

        Self::new(config, Box::new(embedder), Box::new(index)).await
    }

    /// Assemble a store from explicit parts and make sure the collection exists
    pub async fn new(
        config: LtmConfig,
        embedder: Box<dyn Embedder>,
        index: Box<dyn VectorIndex>,
    ) -> Result<Self> {
        config.validate()?;

        if config.verbose {
            debug!(
                "Memory store: collection={}, limit={}, embedder={} (dim {}), index={}",
                config.collection,
                config.ltm_limit,
                embedder.model_name(),
                embedder.dimension(),
                config.qdrant_url()
            );
        }

        let store = Self {
            formatter: ResultFormatter::new(config.verbose),
            config,
            embedder,
            index,
            collection_ready: AtomicBool::new(false),
        };
        store.ensure_collection().await;

        Ok(store)
    }

    /// Create the collection if needed; failures are logged, not returned
    async fn ensure_collection(&self) {
        if self.collection_ready.load(Ordering::Acquire) {
            return;
        }

        match self.index.ensure_collection(self.embedder.dimension()).await {
            Ok(()) => {
                self.collection_ready.store(true, Ordering::Release);
                if self.config.verbose {
                    match self.index.count().await {
                        Ok(n) => debug!(
                            "Collection {} ready with {} memories",
                            self.config.collection, n
                        ),
                        Err(e) => debug!(
                            "Collection {} ready, count unavailable: {}",
                            self.config.collection, e
                        ),
                    }
                }
            }
            Err(e) => error!(
                "Could not prepare collection {}, will retry on next write: {}",
                self.config.collection, e
            ),
        }
    }

    /// Embed and persist a memory; returns its new identifier
    pub async fn store(&self, doc: MemoryDoc) -> Result<Uuid> {
        let vector = self.embedder.encode(&doc.embedding_text())?;
        let record = MemoryRecord::new(doc, vector);

        self.ensure_collection().await;
        self.index.upsert(&record).await?;

        info!("Stored memory {} in {}", record.id, self.config.collection);
        Ok(record.id)
    }

    /// Memories related to `query`, formatted as `"<comment>: on <date>"`
    pub async fn recall(&self, query: &str) -> Result<Vec<String>> {
        Ok(self
            .recall_results(query)
            .await?
            .iter()
            .map(ToString::to_string)
            .collect())
    }

    /// Structured form of [`MemoryStore::recall`]
    pub async fn recall_results(&self, query: &str) -> Result<Vec<RecallResult>> {
        let query_vector = self.embedder.encode(query)?;
        let limit = u64::try_from(self.config.ltm_limit.saturating_add(RECALL_DISCARDED_HITS))
            .unwrap_or(u64::MAX);

        let hits = self.index.search(&query_vector, limit).await?;
        let results = self.formatter.recall(&hits, self.config.ltm_limit);

        debug!(
            "Recall returned {} of {} hits for query: {}",
            results.len(),
            hits.len(),
            query
        );
        Ok(results)
    }

    /// Distinct memories dated within the last `hours`, regardless of topic
    pub async fn get_last_summaries(&self, hours: u32) -> Result<Vec<String>> {
        self.get_last_summaries_at(hours, Local::now().naive_local())
            .await
    }

    /// [`MemoryStore::get_last_summaries`] against an explicit "now"
    pub async fn get_last_summaries_at(
        &self,
        hours: u32,
        now: NaiveDateTime,
    ) -> Result<Vec<String>> {
        let total = self.index.count().await?;
        if total == 0 {
            return Ok(Vec::new());
        }

        let query_vector = self.embedder.encode("")?;
        let hits = self.index.search(&query_vector, total).await?;
        let results = self
            .formatter
            .summaries(&hits, now, Duration::hours(i64::from(hours)));

        debug!(
            "{} of {} memories fall within the last {} hours",
            results.len(),
            hits.len(),
            hours
        );
        Ok(results.iter().map(ToString::to_string).collect())
    }

    /// Remove a single memory; unknown ids are ignored
    pub async fn delete(&self, id: &Uuid) -> Result<()> {
        self.index.delete(id).await?;
        info!("Deleted memory with ID: {}", id);
        Ok(())
    }

    /// Drop the whole collection; the next store re-creates it
    pub async fn delete_collection(&self) -> Result<()> {
        self.index.delete_collection().await?;
        self.collection_ready.store(false, Ordering::Release);
        info!("Deleted collection {}", self.config.collection);
        Ok(())
    }

    /// Number of stored memories
    pub async fn len(&self) -> Result<u64> {
        self.index.count().await
    }

    pub async fn is_empty(&self) -> Result<bool> {
        Ok(self.len().await? == 0)
    }

    /// Check if the backing index is reachable
    pub async fn health_check(&self) -> Result<bool> {
        self.index.health_check().await
    }

    pub fn config(&self) -> &LtmConfig {
        &self.config
    }

    /// Dimension of stored vectors
    pub fn dimension(&self) -> usize {
        self.embedder.dimension()
    }
}

impl std::fmt::Display for MemoryStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "address: {}, collection: {}",
            self.config.qdrant_url(),
            self.config.collection
        )
    }
}

impl std::fmt::Debug for MemoryStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MemoryStore")
            .field("collection", &self.config.collection)
            .field("ltm_limit", &self.config.ltm_limit)
            .field("embedder", &self.embedder.model_name())
            .field("index", &self.index.collection())
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::memory::embeddings::HashingEmbedder;
    use crate::memory::local::InMemoryIndex;
    use crate::memory::types::{format_datetime, ScoredRecord};
    use async_trait::async_trait;
    use chrono::NaiveDate;
    use std::sync::atomic::AtomicUsize;
    use std::sync::Arc;

    fn config(limit: usize) -> LtmConfig {
        LtmConfig {
            collection: "test_memories".to_string(),
            ltm_limit: limit,
            ..LtmConfig::default()
        }
    }

    async fn store_with_limit(limit: usize) -> MemoryStore {
        MemoryStore::new(
            config(limit),
            Box::new(HashingEmbedder::default()),
            Box::new(InMemoryIndex::new("test_memories")),
        )
        .await
        .unwrap()
    }

    fn fixed_now() -> NaiveDateTime {
        NaiveDate::from_ymd_opt(2024, 6, 15)
            .unwrap()
            .and_hms_micro_opt(12, 0, 0, 250_000)
            .unwrap()
    }

    /// Index whose collection setup fails a set number of times and whose
    /// search can be switched off
    struct FlakyIndex {
        inner: InMemoryIndex,
        ensure_failures: AtomicUsize,
        ensure_calls: Arc<AtomicUsize>,
        search_down: bool,
    }

    #[async_trait]
    impl VectorIndex for FlakyIndex {
        fn collection(&self) -> &str {
            self.inner.collection()
        }
        async fn collection_exists(&self) -> Result<bool> {
            self.inner.collection_exists().await
        }
        async fn ensure_collection(&self, dim: usize) -> Result<()> {
            self.ensure_calls.fetch_add(1, Ordering::SeqCst);
            let left = self.ensure_failures.load(Ordering::SeqCst);
            if left > 0 {
                self.ensure_failures.store(left - 1, Ordering::SeqCst);
                anyhow::bail!("connection refused");
            }
            self.inner.ensure_collection(dim).await
        }
        async fn upsert(&self, record: &MemoryRecord) -> Result<()> {
            self.inner.upsert(record).await
        }
        async fn search(&self, query: &[f32], limit: u64) -> Result<Vec<ScoredRecord>> {
            if self.search_down {
                anyhow::bail!("service unavailable");
            }
            self.inner.search(query, limit).await
        }
        async fn delete(&self, id: &Uuid) -> Result<()> {
            self.inner.delete(id).await
        }
        async fn delete_collection(&self) -> Result<()> {
            self.inner.delete_collection().await
        }
        async fn count(&self) -> Result<u64> {
            self.inner.count().await
        }
        async fn health_check(&self) -> Result<bool> {
            Ok(!self.search_down)
        }
    }

    #[tokio::test]
    async fn test_end_to_end_recall_with_limit_one() {
        let store = store_with_limit(1).await;
        store
            .store(MemoryDoc::now("Went hiking", "Alice", "happy"))
            .await
            .unwrap();
        store
            .store(MemoryDoc::now("Went swimming", "Bob", "calm"))
            .await
            .unwrap();

        let today = Local::now().naive_local().format("%Y-%m-%d").to_string();
        let results = store.recall("outdoor activity").await.unwrap();

        assert_eq!(results.len(), 1);
        let hiking = format!("Went hiking: on {}", today);
        let swimming = format!("Went swimming: on {}", today);
        assert!(results[0] == hiking || results[0] == swimming);
    }

    #[tokio::test]
    async fn test_single_record_recall_is_empty() {
        let store = store_with_limit(5).await;
        store
            .store(MemoryDoc::at("Went hiking", "Alice", "happy", fixed_now()))
            .await
            .unwrap();

        assert!(store.recall("Went hiking").await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_recall_returns_other_records() {
        let store = store_with_limit(5).await;
        store
            .store(MemoryDoc::at("Went hiking", "", "happy", fixed_now()))
            .await
            .unwrap();
        store
            .store(MemoryDoc::at("Went swimming", "", "calm", fixed_now()))
            .await
            .unwrap();

        let results = store.recall("Went hiking").await.unwrap();
        assert_eq!(results, vec!["Went swimming: on 2024-06-15"]);
    }

    #[tokio::test]
    async fn test_duplicate_comments_collapse() {
        let store = store_with_limit(5).await;
        let earlier = fixed_now() - Duration::minutes(20);
        store
            .store(MemoryDoc::at("Baked bread", "", "proud", fixed_now()))
            .await
            .unwrap();
        store
            .store(MemoryDoc::at("Went hiking", "Alice", "happy", fixed_now()))
            .await
            .unwrap();
        store
            .store(MemoryDoc::at("Went hiking", "Alice", "tired", earlier))
            .await
            .unwrap();

        let summaries = store.get_last_summaries_at(1, fixed_now()).await.unwrap();
        let hiking: Vec<_> = summaries
            .iter()
            .filter(|s| s.starts_with("Went hiking"))
            .collect();
        assert_eq!(hiking.len(), 1);
        assert_eq!(summaries.len(), 2);

        let recalled = store.recall("Baked bread").await.unwrap();
        assert_eq!(recalled, vec!["Went hiking: on 2024-06-15"]);
    }

    #[tokio::test]
    async fn test_last_summaries_window() {
        let store = store_with_limit(5).await;
        let now = fixed_now();
        store
            .store(MemoryDoc::at("Old memory", "", "", now - Duration::hours(2)))
            .await
            .unwrap();
        store
            .store(MemoryDoc::at("Fresh memory", "", "", now - Duration::minutes(30)))
            .await
            .unwrap();

        let summaries = store.get_last_summaries_at(1, now).await.unwrap();
        assert_eq!(summaries, vec!["Fresh memory: on 2024-06-15"]);
    }

    #[tokio::test]
    async fn test_last_summaries_against_wall_clock() {
        let store = store_with_limit(5).await;
        let now = Local::now().naive_local();
        store
            .store(MemoryDoc::new(
                "Old memory",
                "",
                "",
                format_datetime(&(now - Duration::hours(2))),
            ))
            .await
            .unwrap();
        store
            .store(MemoryDoc::new(
                "Fresh memory",
                "",
                "",
                format_datetime(&(now - Duration::minutes(30))),
            ))
            .await
            .unwrap();

        let summaries = store.get_last_summaries(1).await.unwrap();
        assert_eq!(summaries.len(), 1);
        assert!(summaries[0].starts_with("Fresh memory: on "));
    }

    #[tokio::test]
    async fn test_last_summaries_empty_collection() {
        let store = store_with_limit(5).await;
        assert!(store.get_last_summaries(24).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_delete_unknown_id_is_ok() {
        let store = store_with_limit(5).await;
        let id = store
            .store(MemoryDoc::at("Went hiking", "Alice", "happy", fixed_now()))
            .await
            .unwrap();

        store.delete(&Uuid::new_v4()).await.unwrap();
        assert_eq!(store.len().await.unwrap(), 1);

        store.delete(&id).await.unwrap();
        assert!(store.is_empty().await.unwrap());
    }

    #[tokio::test]
    async fn test_delete_collection_then_store_recreates() {
        let store = store_with_limit(5).await;
        store
            .store(MemoryDoc::at("Went hiking", "Alice", "happy", fixed_now()))
            .await
            .unwrap();

        store.delete_collection().await.unwrap();
        store.delete_collection().await.unwrap();
        assert_eq!(store.len().await.unwrap(), 0);

        store
            .store(MemoryDoc::at("Went swimming", "Bob", "calm", fixed_now()))
            .await
            .unwrap();
        assert_eq!(store.len().await.unwrap(), 1);
    }

    #[tokio::test]
    async fn test_delete_after_collection_dropped_is_ok() {
        let store = store_with_limit(5).await;
        let id = store
            .store(MemoryDoc::at("Went hiking", "Alice", "happy", fixed_now()))
            .await
            .unwrap();

        store.delete_collection().await.unwrap();
        store.delete(&id).await.unwrap();
        store.delete(&Uuid::new_v4()).await.unwrap();
        assert!(store.is_empty().await.unwrap());
    }

    #[tokio::test]
    async fn test_delete_when_setup_failed_is_ok() {
        let index = FlakyIndex {
            inner: InMemoryIndex::new("test_memories"),
            ensure_failures: AtomicUsize::new(1),
            ensure_calls: Arc::new(AtomicUsize::new(0)),
            search_down: false,
        };
        let store = MemoryStore::new(
            config(5),
            Box::new(HashingEmbedder::default()),
            Box::new(index),
        )
        .await
        .unwrap();

        store.delete(&Uuid::new_v4()).await.unwrap();
    }

    #[tokio::test]
    async fn test_recall_with_unbounded_limit() {
        let store = store_with_limit(usize::MAX).await;
        store
            .store(MemoryDoc::at("Went hiking", "", "happy", fixed_now()))
            .await
            .unwrap();
        store
            .store(MemoryDoc::at("Went swimming", "", "calm", fixed_now()))
            .await
            .unwrap();

        let results = store.recall("Went hiking").await.unwrap();
        assert_eq!(results, vec!["Went swimming: on 2024-06-15"]);
    }

    #[tokio::test]
    async fn test_collection_setup_failure_is_retried_on_write() {
        let calls = Arc::new(AtomicUsize::new(0));
        let index = FlakyIndex {
            inner: InMemoryIndex::new("test_memories"),
            ensure_failures: AtomicUsize::new(1),
            ensure_calls: Arc::clone(&calls),
            search_down: false,
        };

        let store = MemoryStore::new(
            config(5),
            Box::new(HashingEmbedder::default()),
            Box::new(index),
        )
        .await
        .unwrap();
        assert_eq!(calls.load(Ordering::SeqCst), 1);

        store
            .store(MemoryDoc::at("Went hiking", "Alice", "happy", fixed_now()))
            .await
            .unwrap();
        assert_eq!(calls.load(Ordering::SeqCst), 2);

        store
            .store(MemoryDoc::at("Went swimming", "Bob", "calm", fixed_now()))
            .await
            .unwrap();
        assert_eq!(calls.load(Ordering::SeqCst), 2);
        assert_eq!(store.len().await.unwrap(), 2);
    }

    #[tokio::test]
    async fn test_search_failure_propagates() {
        let index = FlakyIndex {
            inner: InMemoryIndex::new("test_memories"),
            ensure_failures: AtomicUsize::new(0),
            ensure_calls: Arc::new(AtomicUsize::new(0)),
            search_down: true,
        };
        let store = MemoryStore::new(
            config(5),
            Box::new(HashingEmbedder::default()),
            Box::new(index),
        )
        .await
        .unwrap();
        store
            .store(MemoryDoc::at("Went hiking", "Alice", "happy", fixed_now()))
            .await
            .unwrap();

        assert!(store.recall("hiking").await.is_err());
        assert!(store.get_last_summaries(1).await.is_err());
        assert!(!store.health_check().await.unwrap());
    }

    #[tokio::test]
    async fn test_invalid_config_rejected() {
        let result = MemoryStore::new(
            config(0),
            Box::new(HashingEmbedder::default()),
            Box::new(InMemoryIndex::new("test_memories")),
        )
        .await;
        assert!(result.is_err());
    }

    #[tokio::test]
    async fn test_display() {
        let store = store_with_limit(3).await;
        assert_eq!(
            store.to_string(),
            "address: http://localhost:6334, collection: test_memories"
        );
        assert_eq!(store.dimension(), crate::memory::embeddings::HASHING_DIM);
    }

    // Requires a running Qdrant instance and the model download
    #[tokio::test]
    #[ignore]
    async fn test_qdrant_end_to_end() {
        let config = LtmConfig {
            collection: "ltm_store_test".to_string(),
            ltm_limit: 1,
            ..LtmConfig::default()
        };
        let store = MemoryStore::connect(config).await.unwrap();
        store.delete_collection().await.unwrap();

        store
            .store(MemoryDoc::now("Went hiking", "Alice", "happy"))
            .await
            .unwrap();
        store
            .store(MemoryDoc::now("Went swimming", "Bob", "calm"))
            .await
            .unwrap();

        let results = store.recall("outdoor activity").await.unwrap();
        assert_eq!(results.len(), 1);

        // Cleanup
        store.delete_collection().await.unwrap();
    }
}
