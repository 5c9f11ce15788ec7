//! Intent classification
//!
//! Primary path asks the language model for a single structured JSON
//! object describing the question. Any failure there (transport, garbage
//! output, unknown category) is absorbed by a deterministic keyword
//! fallback, so classification never fails a request.

use crate::error::PipelineError;
use crate::llm::{GenerationOptions, TextGenerator};
use crate::models::{Category, Intent};
use crate::Result;
use chrono::NaiveDate;
use lazy_static::lazy_static;
use regex::Regex;
use serde::Deserialize;
use std::sync::Arc;
use tracing::warn;

/// Static keyword lists, zero allocation
const TRANSACTIONAL_CUES: &[&str] = &["how much", "spent", "received", "will pay"];
const INSIGHT_CUES: &[&str] = &["summary", "financial health", "how is"];

/// Keywords are whitespace tokens strictly longer than this.
const MIN_KEYWORD_LEN: usize = 3;

lazy_static! {
    static ref TEMPORAL_WORDS: Regex = Regex::new(
        r"\b(last|this|previous|past|current|month|week|days?|year|today|yesterday|january|february|march|april|may|june|july|august|september|october|november|december)\b"
    )
    .expect("valid temporal-words pattern");
    static ref LAST_N_DAYS: Regex =
        Regex::new(r"last\s+\d+\s+days?").expect("valid last-N-days pattern");
}

/// Wire shape requested from the classification call.
#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct IntentWire {
    category: String,
    has_temporal_filter: bool,
    #[serde(default)]
    temporal_expression: Option<String>,
    #[serde(default)]
    keywords: Vec<String>,
}

pub struct IntentClassifier {
    model: Arc<dyn TextGenerator>,
}

impl IntentClassifier {
    pub fn new(model: Arc<dyn TextGenerator>) -> Self {
        Self { model }
    }

    /// Classify a user question. Infallible: external failures degrade to
    /// the offline heuristic.
    pub async fn classify(&self, query: &str, reference_date: NaiveDate) -> Intent {
        match self.classify_with_model(query, reference_date).await {
            Ok(intent) => intent,
            Err(e) => {
                warn!("Intent model unavailable, using fallback classifier: {}", e);
                fallback_classify(query)
            }
        }
    }

    async fn classify_with_model(
        &self,
        query: &str,
        reference_date: NaiveDate,
    ) -> Result<Intent> {
        let system = "You are a query intent classifier for a personal finance assistant. \
             Respond with exactly one JSON object and no other text, with fields: \
             category (\"transactional\" | \"insight\" | \"educational\"), \
             hasTemporalFilter (boolean), \
             temporalExpression (string, only when hasTemporalFilter is true), \
             keywords (array of strings).";

        let user = build_classification_prompt(query, reference_date);

        let options = GenerationOptions {
            temperature: 0.1,
            max_output_tokens: 256,
        };

        let raw = self.model.generate(system, &user, &options).await?;

        parse_intent_response(&raw)
    }
}

fn build_classification_prompt(query: &str, reference_date: NaiveDate) -> String {
    format!(
        r#"Today's date is {}. Classify this personal finance question:

"{}"

Examples:
Input: "How much did I spend last month?"
Output: {{"category": "transactional", "hasTemporalFilter": true, "temporalExpression": "last month", "keywords": ["spend", "last month"]}}

Input: "What is an emergency fund?"
Output: {{"category": "educational", "hasTemporalFilter": false, "keywords": ["emergency fund"]}}

Now classify the question above. Output only JSON:"#,
        reference_date, query
    )
}

/// Validate a raw classification response into an Intent.
fn parse_intent_response(raw: &str) -> Result<Intent> {
    let json = extract_json_object(raw).ok_or_else(|| {
        PipelineError::Classification("no JSON object in model response".to_string())
    })?;

    let wire: IntentWire = serde_json::from_str(json)
        .map_err(|e| PipelineError::Classification(format!("malformed intent JSON: {}", e)))?;

    let category = Category::parse(&wire.category).ok_or_else(|| {
        PipelineError::Classification(format!("unknown category '{}'", wire.category))
    })?;

    // The phrase is only meaningful when the flag is set.
    let temporal_phrase = if wire.has_temporal_filter {
        wire.temporal_expression
            .filter(|phrase| !phrase.trim().is_empty())
    } else {
        None
    };

    Ok(Intent {
        category,
        has_temporal_reference: wire.has_temporal_filter,
        temporal_phrase,
        keywords: wire.keywords,
    })
}

/// Isolate the first balanced `{...}` substring of free-form model output.
///
/// Brace depth is tracked outside of string literals (escapes included),
/// so prose or markdown fences around the object are ignored and a
/// partially matched structure is never accepted.
fn extract_json_object(text: &str) -> Option<&str> {
    let start = text.find('{')?;
    let mut depth = 0usize;
    let mut in_string = false;
    let mut escaped = false;

    for (i, c) in text[start..].char_indices() {
        if in_string {
            if escaped {
                escaped = false;
            } else if c == '\\' {
                escaped = true;
            } else if c == '"' {
                in_string = false;
            }
            continue;
        }
        match c {
            '"' => in_string = true,
            '{' => depth += 1,
            '}' => {
                depth -= 1;
                if depth == 0 {
                    return Some(&text[start..start + i + c.len_utf8()]);
                }
            }
            _ => {}
        }
    }

    None
}

/// Deterministic offline classification: keyword membership for the
/// category, a word regex for temporal presence, and a short list of
/// explicit sub-patterns to isolate the phrase when possible.
pub fn fallback_classify(query: &str) -> Intent {
    let lowered = query.to_lowercase();

    let category = fallback_category(query);
    let has_temporal_reference = TEMPORAL_WORDS.is_match(&lowered);
    let temporal_phrase = if has_temporal_reference {
        detect_temporal_phrase(&lowered)
    } else {
        None
    };

    let keywords = lowered
        .split_whitespace()
        .filter(|token| token.len() > MIN_KEYWORD_LEN)
        .map(String::from)
        .collect();

    Intent {
        category,
        has_temporal_reference,
        temporal_phrase,
        keywords,
    }
}

/// Category by keyword membership. Also used by the orchestrator's
/// reply-length pass, which intentionally re-reads the original question
/// instead of trusting the classified intent.
pub fn fallback_category(query: &str) -> Category {
    let lowered = query.to_lowercase();

    if TRANSACTIONAL_CUES.iter().any(|cue| lowered.contains(cue)) {
        Category::Transactional
    } else if INSIGHT_CUES.iter().any(|cue| lowered.contains(cue)) {
        Category::Insight
    } else {
        Category::Educational
    }
}

fn detect_temporal_phrase(lowered: &str) -> Option<String> {
    for fixed in [
        "last month",
        "previous month",
        "this month",
        "current month",
        "last week",
    ] {
        if lowered.contains(fixed) {
            return Some(fixed.to_string());
        }
    }

    LAST_N_DAYS
        .find(lowered)
        .map(|m| m.as_str().to_string())
}
