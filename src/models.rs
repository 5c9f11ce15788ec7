//! Core data models for the retrieval pipeline

use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use std::fmt;
use uuid::Uuid;

//
// ================= Category =================
//

/// Question/chunk category. Exhaustive and mutually exclusive.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum Category {
    Transactional,
    Insight,
    Educational,
}

impl Category {
    /// Parse from the lowercase wire form. Returns `None` for anything
    /// outside the three known categories.
    pub fn parse(value: &str) -> Option<Self> {
        match value.trim().to_lowercase().as_str() {
            "transactional" => Some(Category::Transactional),
            "insight" => Some(Category::Insight),
            "educational" => Some(Category::Educational),
            _ => None,
        }
    }
}

impl fmt::Display for Category {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Category::Transactional => "transactional",
            Category::Insight => "insight",
            Category::Educational => "educational",
        };
        write!(f, "{}", s)
    }
}

//
// ================= Intent =================
//

/// Structured classification of a user question.
///
/// Created fresh per request by the classifier and consumed by the filter
/// builder; never mutated in between. `temporal_phrase` may only be set
/// when `has_temporal_reference` is true (the fallback classifier can
/// detect a temporal reference without isolating the phrase, so the
/// reverse does not hold).
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Intent {
    pub category: Category,
    pub has_temporal_reference: bool,
    pub temporal_phrase: Option<String>,
    /// Tokens forwarded for lexical weighting; order preserved,
    /// duplicates allowed.
    pub keywords: Vec<String>,
}

//
// ================= DateRange =================
//

/// Resolved temporal bound, both ends inclusive.
///
/// An unresolvable phrase is represented as `None` at the call sites, so a
/// constructed range always satisfies `start <= end`.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
pub struct DateRange {
    pub start: NaiveDate,
    pub end: NaiveDate,
}

impl DateRange {
    pub fn new(start: NaiveDate, end: NaiveDate) -> Self {
        debug_assert!(start <= end, "inverted date range");
        Self { start, end }
    }
}

//
// ================= Chunks =================
//

/// Raw chunk record as supplied to ingestion (e.g. from a seed file).
/// Fields are kept as loose strings so validation can reject bad records
/// with a labeled error instead of a deserializer failure.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChunkRecord {
    pub text: String,
    pub category: String,
    /// Calendar date in `YYYY-MM-DD` form.
    pub date: String,
    pub source: String,
    #[serde(default)]
    pub amount: Option<f64>,
}

/// A validated chunk together with its embedding, ready for insertion.
#[derive(Debug, Clone)]
pub struct StoredChunk {
    pub id: Uuid,
    pub text: String,
    pub category: Category,
    pub date: NaiveDate,
    pub source: String,
    pub amount: Option<f64>,
    pub embedding: Vec<f32>,
}

impl StoredChunk {
    /// View as a search result with the given distance.
    pub fn to_retrieved(&self, distance: f32) -> RetrievedChunk {
        RetrievedChunk {
            id: self.id,
            text: self.text.clone(),
            category: self.category,
            date: self.date,
            source: self.source.clone(),
            amount: self.amount,
            distance: Some(distance),
        }
    }
}

/// A chunk as returned from the vector store (lower distance = closer).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RetrievedChunk {
    pub id: Uuid,
    pub text: String,
    pub category: Category,
    pub date: NaiveDate,
    pub source: String,
    pub amount: Option<f64>,
    pub distance: Option<f32>,
}

//
// ================= Final Result =================
//

/// Final orchestration output, returned to the caller once per request.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PipelineResult {
    pub answer_text: String,
    /// Chunks actually sent to the generative model, in retrieval order.
    pub chunks_used: Vec<RetrievedChunk>,
    /// Category used for the pre-filter, authoritative even when the
    /// classifier output was ambiguous.
    pub resolved_category: Category,
    pub chunk_count: usize,
}
