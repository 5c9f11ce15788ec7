//! Personal Finance RAG Pipeline
//!
//! Answers natural-language personal finance questions by:
//! - Classifying the question's intent (with a deterministic offline fallback)
//! - Resolving fuzzy temporal phrases into concrete date ranges
//! - Pre-filtering a semantic search over stored financial chunks
//! - Grounding a generative model on the retrieved chunks
//! - Trimming the answer to a category-specific length budget
//!
//! PIPELINE:
//! QUESTION → CLASSIFY → FILTER → EMBED → SEARCH → GROUND → GENERATE → TRIM

pub mod api;
pub mod classifier;
pub mod error;
pub mod filter;
pub mod ingest;
pub mod llm;
pub mod models;
pub mod pipeline;
pub mod store;
pub mod temporal;

pub use error::Result;

// Re-export common types
pub use models::*;
pub use pipeline::AnswerPipeline;
