//! Retrieval pre-filter construction
//!
//! Filters are built as a small typed expression tree over the chunk
//! metadata fields and rendered to the store's string syntax at the edge,
//! so a malformed or injectable predicate cannot be assembled by string
//! concatenation.

use crate::models::{Category, Intent};
use crate::temporal;
use chrono::NaiveDate;

pub const FIELD_CATEGORY: &str = "category";
pub const FIELD_DATE: &str = "date";

/// A single comparison over a named chunk metadata field.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Condition {
    CategoryEq(Category),
    DateGte(NaiveDate),
    DateLte(NaiveDate),
}

impl Condition {
    fn render(&self) -> String {
        match self {
            Condition::CategoryEq(category) => {
                format!("{} = '{}'", FIELD_CATEGORY, category)
            }
            Condition::DateGte(date) => format!("{} >= '{}'", FIELD_DATE, date),
            Condition::DateLte(date) => format!("{} <= '{}'", FIELD_DATE, date),
        }
    }
}

/// AND-joined conjunction of conditions, ordered as pushed.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct FilterExpr {
    conditions: Vec<Condition>,
}

impl FilterExpr {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&mut self, condition: Condition) {
        self.conditions.push(condition);
    }

    pub fn conditions(&self) -> &[Condition] {
        &self.conditions
    }

    /// Render to the store's filter syntax: conditions joined with AND in
    /// insertion order (category first, then date bounds).
    pub fn render(&self) -> String {
        self.conditions
            .iter()
            .map(Condition::render)
            .collect::<Vec<_>>()
            .join(" AND ")
    }

    /// Evaluate the conjunction against one chunk's metadata.
    pub fn matches(&self, category: Category, date: NaiveDate) -> bool {
        self.conditions.iter().all(|condition| match condition {
            Condition::CategoryEq(wanted) => category == *wanted,
            Condition::DateGte(bound) => date >= *bound,
            Condition::DateLte(bound) => date <= *bound,
        })
    }
}

/// The pre-filter handed to the vector store, built fresh per request.
#[derive(Debug, Clone, PartialEq)]
pub struct RetrievalFilter {
    pub predicate: FilterExpr,
    /// Copied verbatim from the intent, for lexical re-ranking downstream.
    pub keywords: Vec<String>,
}

/// Combine a classified intent and its resolved date range into a filter.
///
/// The category equality condition is always present. Date bounds are
/// appended only when the intent carries a temporal phrase that resolves;
/// an unresolvable phrase degrades to a category-only filter rather than
/// failing the request.
pub fn build(intent: &Intent, reference_date: NaiveDate) -> RetrievalFilter {
    let mut predicate = FilterExpr::new();
    predicate.push(Condition::CategoryEq(intent.category));

    if intent.has_temporal_reference {
        if let Some(phrase) = &intent.temporal_phrase {
            if let Some(range) = temporal::resolve(phrase, reference_date) {
                predicate.push(Condition::DateGte(range.start));
                predicate.push(Condition::DateLte(range.end));
            }
        }
    }

    RetrievalFilter {
        predicate,
        keywords: intent.keywords.clone(),
    }
}
