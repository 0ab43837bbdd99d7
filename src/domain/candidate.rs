//! Candidate documents fetched from the corpus.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// A fetched document eligible for processing.
///
/// Candidates are immutable once fetched. The identifier is the corpus's
/// stable URL (for arXiv, the `entry_id`) and doubles as the ledger key.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Candidate {
    /// Stable URL/ID of the document
    pub id: String,

    /// Document title
    pub title: String,

    /// Abstract text
    pub abstract_text: String,

    /// Publication timestamp
    pub published: DateTime<Utc>,
}

impl Candidate {
    /// Create a new candidate
    pub fn new(
        id: impl Into<String>,
        title: impl Into<String>,
        abstract_text: impl Into<String>,
        published: DateTime<Utc>,
    ) -> Self {
        Self {
            id: id.into(),
            title: title.into(),
            abstract_text: abstract_text.into(),
            published,
        }
    }

    /// Canonical URL for linking (the identifier is already a URL)
    pub fn url(&self) -> &str {
        &self.id
    }

    /// Publication date as `YYYY-MM-DD`
    pub fn published_date(&self) -> String {
        self.published.format("%Y-%m-%d").to_string()
    }
}

/// Order candidates newest-first by publication time.
///
/// The sort is stable, so candidates sharing a timestamp keep the corpus order.
pub fn sort_newest_first(candidates: &mut [Candidate]) {
    candidates.sort_by(|a, b| b.published.cmp(&a.published));
}
