//! Ledger rows and their fixed column layout.

use serde::{Deserialize, Serialize};

use super::candidate::Candidate;
use super::enrichment::EnrichmentResult;

/// Fixed column positions of the ledger grid
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Column {
    Date,
    Title,
    Theme,
    Importance,
    Summary,
    CandidateId,
    NotificationTs,
    Reactions,
}

impl Column {
    /// All columns, left to right
    pub const ALL: [Column; 8] = [
        Column::Date,
        Column::Title,
        Column::Theme,
        Column::Importance,
        Column::Summary,
        Column::CandidateId,
        Column::NotificationTs,
        Column::Reactions,
    ];

    /// Spreadsheet column letter
    pub fn letter(&self) -> char {
        match self {
            Self::Date => 'A',
            Self::Title => 'B',
            Self::Theme => 'C',
            Self::Importance => 'D',
            Self::Summary => 'E',
            Self::CandidateId => 'F',
            Self::NotificationTs => 'G',
            Self::Reactions => 'H',
        }
    }

    /// Zero-based position within a row
    pub fn index(&self) -> usize {
        (self.letter() as u8 - b'A') as usize
    }
}

/// Ordered, duplicate-free reaction labels, stored as `a, b, c`
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReactionList(Vec<String>);

impl ReactionList {
    /// Parse the comma-separated cell text
    pub fn parse(cell: &str) -> Self {
        let mut list = Self::default();
        for label in cell.split(',') {
            list.add(label);
        }
        list
    }

    /// Append a label; returns false if it was already present
    pub fn add(&mut self, label: &str) -> bool {
        let label = label.trim();
        if label.is_empty() || self.contains(label) {
            return false;
        }
        self.0.push(label.to_string());
        true
    }

    pub fn contains(&self, label: &str) -> bool {
        self.0.iter().any(|l| l == label.trim())
    }

    pub fn labels(&self) -> &[String] {
        &self.0
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    /// Cell text
    pub fn render(&self) -> String {
        self.0.join(", ")
    }
}

/// One audit record per processed candidate.
///
/// The candidate identifier is the natural key; at most one row per
/// identifier exists in the ledger.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LedgerRow {
    /// Publication date (`YYYY-MM-DD`)
    pub date: String,
    pub title: String,
    /// theme_id cell (`1`, `3`, `0` or `?`)
    pub theme: String,
    /// Importance cell (`1`..`5` or `?`)
    pub importance: String,
    pub summary: String,
    pub candidate_id: String,
    /// Channel-issued message identifier; empty when the post failed
    pub notification_ts: String,
    pub reactions: ReactionList,
}

impl LedgerRow {
    /// Build the row recorded for a processed candidate
    pub fn from_enrichment(
        candidate: &Candidate,
        result: &EnrichmentResult,
        notification_ts: Option<&str>,
    ) -> Self {
        Self {
            date: candidate.published_date(),
            title: candidate.title.clone(),
            theme: result.theme.ledger_value(),
            importance: result.importance.to_string(),
            summary: result.summary.clone(),
            candidate_id: candidate.id.clone(),
            notification_ts: notification_ts.unwrap_or_default().to_string(),
            reactions: ReactionList::default(),
        }
    }

    /// Cell values A..H
    pub fn to_cells(&self) -> Vec<String> {
        vec![
            self.date.clone(),
            self.title.clone(),
            self.theme.clone(),
            self.importance.clone(),
            self.summary.clone(),
            self.candidate_id.clone(),
            self.notification_ts.clone(),
            self.reactions.render(),
        ]
    }

    /// Rebuild a row from cell values; missing trailing cells read as empty
    pub fn from_cells(cells: &[String]) -> Self {
        let cell = |column: Column| cells.get(column.index()).cloned().unwrap_or_default();
        Self {
            date: cell(Column::Date),
            title: cell(Column::Title),
            theme: cell(Column::Theme),
            importance: cell(Column::Importance),
            summary: cell(Column::Summary),
            candidate_id: cell(Column::CandidateId),
            notification_ts: cell(Column::NotificationTs),
            reactions: ReactionList::parse(&cell(Column::Reactions)),
        }
    }
}
