//! Chunk storage and filtered similarity search
//!
//! The pipeline talks to storage through the `VectorStore` trait and is
//! handed a concrete backend at construction time. Two backends exist:
//! Postgres for deployments and an in-memory store for development and
//! tests, selected from the environment the same way at every entry
//! point.

pub mod memory;
pub mod postgres;

pub use memory::InMemoryVectorStore;
pub use postgres::PgVectorStore;

use crate::filter::FilterExpr;
use crate::models::{RetrievedChunk, StoredChunk};
use crate::Result;
use async_trait::async_trait;
use std::env;
use std::sync::Arc;
use tracing::{info, warn};

/// Trait for chunk persistence and retrieval
#[async_trait]
pub trait VectorStore: Send + Sync {
    /// Filtered similarity search, ordered by ascending distance (lower =
    /// closer). A store whose backing table does not exist yet returns an
    /// empty result set, not an error.
    async fn search(
        &self,
        vector: &[f32],
        predicate: &FilterExpr,
        limit: usize,
    ) -> Result<Vec<RetrievedChunk>>;

    /// Insert a batch of validated chunks. All-or-nothing: a failure
    /// while writing leaves none of the batch behind. Chunk ids are
    /// stable, so re-inserting an existing id overwrites it.
    async fn insert_batch(&self, chunks: Vec<StoredChunk>) -> Result<usize>;
}

/// Cosine distance (1 - cosine similarity); lower = closer.
pub(crate) fn cosine_distance(a: &[f32], b: &[f32]) -> f32 {
    1.0 - cosine_similarity(a, b)
}

fn cosine_similarity(a: &[f32], b: &[f32]) -> f32 {
    if a.len() != b.len() || a.is_empty() {
        return 0.0;
    }

    let dot: f32 = a.iter().zip(b.iter()).map(|(x, y)| x * y).sum();
    let norm_a: f32 = a.iter().map(|x| x * x).sum::<f32>().sqrt();
    let norm_b: f32 = b.iter().map(|x| x * x).sum::<f32>().sqrt();

    if norm_a == 0.0 || norm_b == 0.0 {
        return 0.0;
    }

    dot / (norm_a * norm_b)
}

/// Pick a store backend from the environment: Postgres when a database
/// URL is configured and reachable lazily, in-memory otherwise.
pub fn from_env() -> Arc<dyn VectorStore> {
    let database_url = env::var("POSTGRES_URL")
        .or_else(|_| env::var("DATABASE_URL"))
        .ok();

    if let Some(url) = database_url {
        match PgVectorStore::connect_lazy(&url) {
            Ok(store) => {
                info!("Chunk store backend: postgres");
                return Arc::new(store);
            }
            Err(error) => {
                warn!(
                    "Failed to initialize postgres chunk store, falling back to in-memory: {}",
                    error
                );
            }
        }
    }

    info!("Chunk store backend: in-memory");
    Arc::new(InMemoryVectorStore::new())
}
