//! Validated chunk ingestion
//!
//! Every record of a batch is validated before any external work happens;
//! one bad record rejects the whole batch. Accepted records are embedded
//! with bounded parallelism and written through the store in a single
//! all-or-nothing insert.

use crate::error::PipelineError;
use crate::llm::EmbeddingProvider;
use crate::models::{Category, ChunkRecord, StoredChunk};
use crate::store::VectorStore;
use crate::Result;
use chrono::NaiveDate;
use futures::stream::{self, StreamExt, TryStreamExt};
use sha2::{Digest, Sha256};
use std::sync::Arc;
use tracing::info;
use uuid::Uuid;

/// Upper bound on in-flight embedding calls during ingestion.
const MAX_CONCURRENT_EMBEDDINGS: usize = 4;

pub const DATE_FORMAT: &str = "%Y-%m-%d";

pub struct Ingestor {
    embedder: Arc<dyn EmbeddingProvider>,
    store: Arc<dyn VectorStore>,
}

impl Ingestor {
    pub fn new(embedder: Arc<dyn EmbeddingProvider>, store: Arc<dyn VectorStore>) -> Self {
        Self { embedder, store }
    }

    /// Ingest a batch of raw records.
    pub async fn ingest_batch(&self, records: Vec<ChunkRecord>) -> Result<usize> {
        let mut validated = Vec::with_capacity(records.len());
        for (index, record) in records.into_iter().enumerate() {
            let (category, date) = validate_record(&record)
                .map_err(|e| PipelineError::Validation(format!("record {}: {}", index, e)))?;
            validated.push((record, category, date));
        }

        // Independent embedding calls, capped rather than unbounded.
        let chunks: Vec<StoredChunk> =
            stream::iter(validated.into_iter().map(|(record, category, date)| {
                let embedder = Arc::clone(&self.embedder);
                async move {
                    let embedding = embedder.embed(&record.text).await?;
                    Ok::<StoredChunk, PipelineError>(StoredChunk {
                        id: stable_chunk_id(&record.source, &record.text),
                        text: record.text,
                        category,
                        date,
                        source: record.source,
                        amount: record.amount,
                        embedding,
                    })
                }
            }))
            .buffered(MAX_CONCURRENT_EMBEDDINGS)
            .try_collect()
            .await?;

        let count = self.store.insert_batch(chunks).await?;
        info!("Ingested {} chunks", count);

        Ok(count)
    }
}

/// Check a raw record's fields, returning the parsed category and date.
fn validate_record(record: &ChunkRecord) -> std::result::Result<(Category, NaiveDate), String> {
    if record.text.trim().is_empty() {
        return Err("empty text".to_string());
    }
    if record.source.trim().is_empty() {
        return Err("empty source".to_string());
    }

    let category = Category::parse(&record.category)
        .ok_or_else(|| format!("unknown category '{}'", record.category))?;

    let date = NaiveDate::parse_from_str(record.date.trim(), DATE_FORMAT)
        .map_err(|_| format!("invalid date '{}' (expected YYYY-MM-DD)", record.date))?;

    Ok((category, date))
}

/// Stable id derived from the chunk's identity, so re-seeding the same
/// content overwrites instead of duplicating.
fn stable_chunk_id(source: &str, text: &str) -> Uuid {
    let mut hasher = Sha256::new();
    hasher.update(source.as_bytes());
    hasher.update([0u8]);
    hasher.update(text.as_bytes());
    let hash = hasher.finalize();

    let mut bytes = [0u8; 16];
    bytes.copy_from_slice(&hash[..16]);

    // Set UUID version (4) and variant (RFC4122) bits.
    bytes[6] = (bytes[6] & 0x0f) | 0x40;
    bytes[8] = (bytes[8] & 0x3f) | 0x80;

    Uuid::from_bytes(bytes)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::InMemoryVectorStore;
    use async_trait::async_trait;
    use std::sync::atomic::{AtomicUsize, Ordering};

    struct CountingEmbedder {
        calls: AtomicUsize,
    }

    impl CountingEmbedder {
        fn new() -> Self {
            Self {
                calls: AtomicUsize::new(0),
            }
        }
    }

    #[async_trait]
    impl EmbeddingProvider for CountingEmbedder {
        async fn embed(&self, _text: &str) -> Result<Vec<f32>> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            Ok(vec![1.0, 0.0, 0.0])
        }
    }

    fn record(text: &str, category: &str, date: &str) -> ChunkRecord {
        ChunkRecord {
            text: text.to_string(),
            category: category.to_string(),
            date: date.to_string(),
            source: "statement.csv".to_string(),
            amount: Some(120.5),
        }
    }

    #[test]
    fn test_validate_record() {
        assert!(validate_record(&record("rent", "transactional", "2024-03-01")).is_ok());
        assert!(validate_record(&record("", "transactional", "2024-03-01")).is_err());
        assert!(validate_record(&record("rent", "mystery", "2024-03-01")).is_err());
        assert!(validate_record(&record("rent", "transactional", "03/01/2024")).is_err());
        assert!(validate_record(&record("rent", "transactional", "2024-13-01")).is_err());
    }

    #[test]
    fn test_stable_chunk_id_is_deterministic() {
        let a = stable_chunk_id("statement.csv", "rent payment");
        let b = stable_chunk_id("statement.csv", "rent payment");
        let c = stable_chunk_id("statement.csv", "grocery run");
        assert_eq!(a, b);
        assert_ne!(a, c);
        assert_eq!(a.get_version_num(), 4);
    }

    #[tokio::test]
    async fn test_ingest_batch_embeds_and_stores() {
        let embedder = Arc::new(CountingEmbedder::new());
        let store = Arc::new(InMemoryVectorStore::new());
        let ingestor = Ingestor::new(embedder.clone(), store.clone());

        let count = ingestor
            .ingest_batch(vec![
                record("rent payment", "transactional", "2024-03-01"),
                record("monthly overview", "insight", "2024-03-31"),
            ])
            .await
            .unwrap();

        assert_eq!(count, 2);
        assert_eq!(embedder.calls.load(Ordering::SeqCst), 2);
        assert_eq!(store.len().await, 2);
    }

    #[tokio::test]
    async fn test_invalid_record_rejects_whole_batch_before_embedding() {
        let embedder = Arc::new(CountingEmbedder::new());
        let store = Arc::new(InMemoryVectorStore::new());
        let ingestor = Ingestor::new(embedder.clone(), store.clone());

        let result = ingestor
            .ingest_batch(vec![
                record("rent payment", "transactional", "2024-03-01"),
                record("bad", "transactional", "not-a-date"),
            ])
            .await;

        assert!(matches!(result, Err(PipelineError::Validation(_))));
        assert_eq!(embedder.calls.load(Ordering::SeqCst), 0);
        assert_eq!(store.len().await, 0);
    }

    #[tokio::test]
    async fn test_reingesting_same_content_overwrites() {
        let embedder = Arc::new(CountingEmbedder::new());
        let store = Arc::new(InMemoryVectorStore::new());
        let ingestor = Ingestor::new(embedder, store.clone());

        let batch = vec![record("rent payment", "transactional", "2024-03-01")];
        ingestor.ingest_batch(batch.clone()).await.unwrap();
        ingestor.ingest_batch(batch).await.unwrap();

        assert_eq!(store.len().await, 1);
    }
}
