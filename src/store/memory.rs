//! In-memory chunk store for development and tests

use super::{cosine_distance, VectorStore};
use crate::filter::FilterExpr;
use crate::models::{RetrievedChunk, StoredChunk};
use crate::Result;
use async_trait::async_trait;
use std::cmp::Ordering;
use std::sync::Arc;
use tokio::sync::RwLock;

/// Brute-force cosine search over an in-process row set.
pub struct InMemoryVectorStore {
    rows: Arc<RwLock<Vec<StoredChunk>>>,
}

impl InMemoryVectorStore {
    pub fn new() -> Self {
        Self {
            rows: Arc::new(RwLock::new(Vec::new())),
        }
    }

    #[cfg(test)]
    pub async fn len(&self) -> usize {
        self.rows.read().await.len()
    }
}

impl Default for InMemoryVectorStore {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl VectorStore for InMemoryVectorStore {
    async fn search(
        &self,
        vector: &[f32],
        predicate: &FilterExpr,
        limit: usize,
    ) -> Result<Vec<RetrievedChunk>> {
        let rows = self.rows.read().await;

        let mut scored: Vec<RetrievedChunk> = rows
            .iter()
            .filter(|row| predicate.matches(row.category, row.date))
            .map(|row| row.to_retrieved(cosine_distance(vector, &row.embedding)))
            .collect();

        scored.sort_by(|a, b| {
            a.distance
                .partial_cmp(&b.distance)
                .unwrap_or(Ordering::Equal)
        });
        scored.truncate(limit);

        Ok(scored)
    }

    async fn insert_batch(&self, chunks: Vec<StoredChunk>) -> Result<usize> {
        let mut rows = self.rows.write().await;

        let count = chunks.len();
        for chunk in chunks {
            // Stable ids make re-seeding an overwrite, not a duplicate.
            match rows.iter_mut().find(|row| row.id == chunk.id) {
                Some(existing) => *existing = chunk,
                None => rows.push(chunk),
            }
        }

        Ok(count)
    }
}
