//! Postgres-backed chunk store
//!
//! Rows are pre-filtered in SQL using the rendered predicate, then ranked
//! by cosine distance in process. The backing table is created on first
//! insert; searching before that yields the benign empty result.

use super::{cosine_distance, VectorStore};
use crate::error::PipelineError;
use crate::filter::FilterExpr;
use crate::models::{Category, RetrievedChunk, StoredChunk};
use crate::Result;
use async_trait::async_trait;
use chrono::NaiveDate;
use sqlx::postgres::PgPoolOptions;
use sqlx::{PgPool, Row};
use std::cmp::Ordering;
use std::sync::Arc;
use tokio::sync::OnceCell;
use tracing::warn;
use uuid::Uuid;

const TABLE: &str = "financial_chunks";

pub struct PgVectorStore {
    pool: PgPool,
    schema_ready: Arc<OnceCell<()>>,
}

impl PgVectorStore {
    pub fn new(pool: PgPool) -> Self {
        Self {
            pool,
            schema_ready: Arc::new(OnceCell::new()),
        }
    }

    /// Build a lazily-connecting pool; the first query opens the
    /// connection.
    pub fn connect_lazy(url: &str) -> Result<Self> {
        let pool = PgPoolOptions::new()
            .max_connections(5)
            .connect_lazy(url)
            .map_err(|e| PipelineError::Store(format!("Failed to create pool: {}", e)))?;

        Ok(Self::new(pool))
    }

    async fn ensure_schema(&self) -> Result<()> {
        self.schema_ready
            .get_or_try_init(|| async {
                sqlx::query(&format!(
                    r#"
                    CREATE TABLE IF NOT EXISTS {} (
                      id UUID PRIMARY KEY,
                      text TEXT NOT NULL,
                      category TEXT NOT NULL,
                      date DATE NOT NULL,
                      source TEXT NOT NULL,
                      amount DOUBLE PRECISION,
                      embedding REAL[] NOT NULL
                    );
                    "#,
                    TABLE
                ))
                .execute(&self.pool)
                .await?;

                sqlx::query(&format!(
                    "CREATE INDEX IF NOT EXISTS idx_{table}_category_date ON {table} (category, date);",
                    table = TABLE
                ))
                .execute(&self.pool)
                .await?;

                Ok::<(), sqlx::Error>(())
            })
            .await
            .map_err(|e| {
                PipelineError::Store(format!("Failed to initialize chunk schema: {}", e))
            })?;

        Ok(())
    }

    async fn table_exists(&self) -> Result<bool> {
        let row = sqlx::query("SELECT to_regclass($1)::text AS name")
            .bind(TABLE)
            .fetch_one(&self.pool)
            .await
            .map_err(|e| PipelineError::Store(format!("Table probe failed: {}", e)))?;

        let name: Option<String> = row
            .try_get("name")
            .map_err(|e| PipelineError::Store(format!("Table probe failed: {}", e)))?;

        Ok(name.is_some())
    }
}

#[async_trait]
impl VectorStore for PgVectorStore {
    async fn search(
        &self,
        vector: &[f32],
        predicate: &FilterExpr,
        limit: usize,
    ) -> Result<Vec<RetrievedChunk>> {
        // No table yet means nothing has been ingested; an empty result,
        // not an error.
        if !self.table_exists().await? {
            return Ok(Vec::new());
        }

        // The typed predicate renders to this store's native filter
        // syntax, a SQL WHERE clause over category and date.
        let rendered = predicate.render();
        let sql = if rendered.is_empty() {
            format!("SELECT id, text, category, date, source, amount, embedding FROM {}", TABLE)
        } else {
            format!(
                "SELECT id, text, category, date, source, amount, embedding FROM {} WHERE {}",
                TABLE, rendered
            )
        };

        let rows = sqlx::query(&sql)
            .fetch_all(&self.pool)
            .await
            .map_err(|e| PipelineError::Store(format!("Chunk query failed: {}", e)))?;

        let mut scored = Vec::new();
        for row in rows {
            let id: Uuid = row
                .try_get("id")
                .map_err(|e| PipelineError::Store(format!("Bad chunk row: {}", e)))?;
            let raw_category: String = row
                .try_get("category")
                .map_err(|e| PipelineError::Store(format!("Bad chunk row: {}", e)))?;

            let Some(category) = Category::parse(&raw_category) else {
                warn!("Skipping chunk {} with unknown category '{}'", id, raw_category);
                continue;
            };

            let date: NaiveDate = row
                .try_get("date")
                .map_err(|e| PipelineError::Store(format!("Bad chunk row: {}", e)))?;
            let text: String = row
                .try_get("text")
                .map_err(|e| PipelineError::Store(format!("Bad chunk row: {}", e)))?;
            let source: String = row
                .try_get("source")
                .map_err(|e| PipelineError::Store(format!("Bad chunk row: {}", e)))?;
            let amount: Option<f64> = row
                .try_get("amount")
                .map_err(|e| PipelineError::Store(format!("Bad chunk row: {}", e)))?;
            let embedding: Vec<f32> = row
                .try_get("embedding")
                .map_err(|e| PipelineError::Store(format!("Bad chunk row: {}", e)))?;

            scored.push(RetrievedChunk {
                id,
                text,
                category,
                date,
                source,
                amount,
                distance: Some(cosine_distance(vector, &embedding)),
            });
        }

        scored.sort_by(|a, b| {
            a.distance
                .partial_cmp(&b.distance)
                .unwrap_or(Ordering::Equal)
        });
        scored.truncate(limit);

        Ok(scored)
    }

    async fn insert_batch(&self, chunks: Vec<StoredChunk>) -> Result<usize> {
        self.ensure_schema().await?;

        let mut tx = self.pool.begin().await.map_err(|e| {
            PipelineError::Store(format!("Failed to begin chunk transaction: {}", e))
        })?;

        let count = chunks.len();
        for chunk in chunks {
            sqlx::query(&format!(
                r#"
                INSERT INTO {}
                  (id, text, category, date, source, amount, embedding)
                VALUES
                  ($1, $2, $3, $4, $5, $6, $7)
                ON CONFLICT (id) DO UPDATE SET
                  text = EXCLUDED.text,
                  category = EXCLUDED.category,
                  date = EXCLUDED.date,
                  source = EXCLUDED.source,
                  amount = EXCLUDED.amount,
                  embedding = EXCLUDED.embedding
                "#,
                TABLE
            ))
            .bind(chunk.id)
            .bind(&chunk.text)
            .bind(chunk.category.to_string())
            .bind(chunk.date)
            .bind(&chunk.source)
            .bind(chunk.amount)
            .bind(&chunk.embedding)
            .execute(&mut *tx)
            .await
            .map_err(|e| PipelineError::Store(format!("Failed to insert chunk: {}", e)))?;
        }

        tx.commit().await.map_err(|e| {
            PipelineError::Store(format!("Failed to commit chunk transaction: {}", e))
        })?;

        Ok(count)
    }
}
