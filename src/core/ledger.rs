//! The append-at-top audit ledger.
//!
//! The ledger is a 2-D grid with a single header row (row 1). Data rows start
//! at row 2. New rows are inserted near the top, displacing existing rows
//! downward, so the newest run's block always sits directly under the header.
//!
//! Any store that preserves insertion position and lets us read a column can
//! implement [`Ledger`]; Google Sheets is the production backend
//! (`adapters::sheets`), [`MemoryLedger`] serves tests and dry runs.

use std::collections::HashSet;

use async_trait::async_trait;
use thiserror::Error;
use tokio::sync::RwLock;

use crate::adapters::ServiceError;
use crate::domain::{Column, LedgerRow};

/// Number of header rows above the data
pub const HEADER_ROWS: usize = 1;

/// Header row written to a fresh ledger
pub const HEADER: [&str; 8] = [
    "date",
    "title",
    "theme_id",
    "importance",
    "summary",
    "candidate_id",
    "notification_ts",
    "reactions",
];

/// Ledger read/write failures
#[derive(Debug, Clone, Error)]
pub enum PersistenceError {
    #[error("ledger backend error: {0}")]
    Backend(#[from] ServiceError),

    #[error("row {row} is outside the ledger ({rows} rows)")]
    RowOutOfRange { row: usize, rows: usize },

    #[error("insert index {0} would displace the header")]
    InvalidInsertIndex(usize),
}

/// Ordered grid store behind the ledger
#[async_trait]
pub trait Ledger: Send + Sync {
    /// Data cells of one column, header skipped.
    ///
    /// Element `i` is sheet row `i + 2`; blank cells read as `""`.
    async fn read_column(&self, column: Column) -> Result<Vec<String>, PersistenceError>;

    /// Insert a blank row at zero-based grid `index` (1 = directly below the
    /// header), shifting later rows down, then write `row` into it.
    async fn insert_at(&self, index: usize, row: &LedgerRow) -> Result<(), PersistenceError>;

    /// Read one cell (1-based sheet row number)
    async fn read_cell(&self, row: usize, column: Column) -> Result<String, PersistenceError>;

    /// Overwrite one cell (1-based sheet row number)
    async fn write_cell(
        &self,
        row: usize,
        column: Column,
        value: &str,
    ) -> Result<(), PersistenceError>;
}

/// Sheet row number of the `i`-th data cell returned by `read_column`
pub fn row_number(data_index: usize) -> usize {
    data_index + HEADER_ROWS + 1
}

/// All candidate identifiers already in the ledger
pub async fn known_ids(ledger: &dyn Ledger) -> Result<HashSet<String>, PersistenceError> {
    let ids = ledger.read_column(Column::CandidateId).await?;
    Ok(ids.into_iter().filter(|id| !id.trim().is_empty()).collect())
}

/// Sheet row whose notification column equals `ts` (linear scan).
/// A blank `ts` never matches; rows from failed posts have an empty cell.
pub async fn find_row_by_notification(
    ledger: &dyn Ledger,
    ts: &str,
) -> Result<Option<usize>, PersistenceError> {
    if ts.trim().is_empty() {
        return Ok(None);
    }
    let column = ledger.read_column(Column::NotificationTs).await?;
    Ok(column.iter().position(|value| value == ts).map(row_number))
}

/// In-process ledger grid
#[derive(Debug)]
pub struct MemoryLedger {
    /// Row 0 is the header
    grid: RwLock<Vec<Vec<String>>>,
}

impl Default for MemoryLedger {
    fn default() -> Self {
        Self::new()
    }
}

impl MemoryLedger {
    /// Empty ledger with just the header row
    pub fn new() -> Self {
        Self {
            grid: RwLock::new(vec![HEADER.iter().map(|h| h.to_string()).collect()]),
        }
    }

    /// Ledger pre-populated with existing rows, top to bottom
    pub fn with_rows(rows: Vec<LedgerRow>) -> Self {
        let mut grid: Vec<Vec<String>> = vec![HEADER.iter().map(|h| h.to_string()).collect()];
        grid.extend(rows.iter().map(LedgerRow::to_cells));
        Self {
            grid: RwLock::new(grid),
        }
    }

    /// All data rows, top to bottom
    pub async fn rows(&self) -> Vec<LedgerRow> {
        let grid = self.grid.read().await;
        grid.iter()
            .skip(HEADER_ROWS)
            .map(|cells| LedgerRow::from_cells(cells))
            .collect()
    }

    /// Number of data rows
    pub async fn len(&self) -> usize {
        self.grid.read().await.len() - HEADER_ROWS
    }

    pub async fn is_empty(&self) -> bool {
        self.len().await == 0
    }
}

#[async_trait]
impl Ledger for MemoryLedger {
    async fn read_column(&self, column: Column) -> Result<Vec<String>, PersistenceError> {
        let grid = self.grid.read().await;
        Ok(grid
            .iter()
            .skip(HEADER_ROWS)
            .map(|cells| cells.get(column.index()).cloned().unwrap_or_default())
            .collect())
    }

    async fn insert_at(&self, index: usize, row: &LedgerRow) -> Result<(), PersistenceError> {
        if index < HEADER_ROWS {
            return Err(PersistenceError::InvalidInsertIndex(index));
        }

        let mut grid = self.grid.write().await;
        let index = index.min(grid.len());
        grid.insert(index, row.to_cells());
        Ok(())
    }

    async fn read_cell(&self, row: usize, column: Column) -> Result<String, PersistenceError> {
        let grid = self.grid.read().await;
        let cells = row
            .checked_sub(1)
            .and_then(|i| grid.get(i))
            .ok_or(PersistenceError::RowOutOfRange {
                row,
                rows: grid.len(),
            })?;
        Ok(cells.get(column.index()).cloned().unwrap_or_default())
    }

    async fn write_cell(
        &self,
        row: usize,
        column: Column,
        value: &str,
    ) -> Result<(), PersistenceError> {
        let mut grid = self.grid.write().await;
        let rows = grid.len();
        let cells = row
            .checked_sub(1)
            .and_then(|i| grid.get_mut(i))
            .ok_or(PersistenceError::RowOutOfRange { row, rows })?;

        if cells.len() <= column.index() {
            cells.resize(column.index() + 1, String::new());
        }
        cells[column.index()] = value.to_string();
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::ReactionList;

    fn row(id: &str, ts: &str) -> LedgerRow {
        LedgerRow {
            date: "2026-01-01".to_string(),
            title: format!("Paper {}", id),
            theme: "1".to_string(),
            importance: "3".to_string(),
            summary: "summary".to_string(),
            candidate_id: id.to_string(),
            notification_ts: ts.to_string(),
            reactions: ReactionList::default(),
        }
    }

    #[tokio::test]
    async fn test_known_ids_skips_blank_cells() {
        let ledger = MemoryLedger::with_rows(vec![row("a", "1.1"), row("", ""), row("b", "2.2")]);

        let ids = known_ids(&ledger).await.unwrap();
        assert_eq!(ids.len(), 2);
        assert!(ids.contains("a"));
        assert!(ids.contains("b"));
    }

    #[tokio::test]
    async fn test_insert_displaces_rows_downward() {
        let ledger = MemoryLedger::with_rows(vec![row("old", "0.1")]);

        ledger.insert_at(1, &row("x", "1.1")).await.unwrap();
        ledger.insert_at(2, &row("y", "2.2")).await.unwrap();

        let ids: Vec<String> = ledger.rows().await.into_iter().map(|r| r.candidate_id).collect();
        assert_eq!(ids, vec!["x", "y", "old"]);
    }

    #[tokio::test]
    async fn test_insert_above_header_is_rejected() {
        let ledger = MemoryLedger::new();
        let result = ledger.insert_at(0, &row("x", "1.1")).await;
        assert!(matches!(result, Err(PersistenceError::InvalidInsertIndex(0))));
        assert!(ledger.is_empty().await);
    }

    #[tokio::test]
    async fn test_find_row_by_notification() {
        let ledger = MemoryLedger::with_rows(vec![row("a", "1.1"), row("b", "2.2")]);

        assert_eq!(find_row_by_notification(&ledger, "2.2").await.unwrap(), Some(3));
        assert_eq!(find_row_by_notification(&ledger, "9.9").await.unwrap(), None);
    }

    #[tokio::test]
    async fn test_blank_ts_matches_no_row() {
        let ledger = MemoryLedger::with_rows(vec![row("a", "1.1"), row("unposted", "")]);

        assert_eq!(find_row_by_notification(&ledger, "").await.unwrap(), None);
        assert_eq!(find_row_by_notification(&ledger, "  ").await.unwrap(), None);
    }

    #[tokio::test]
    async fn test_cell_access() {
        let ledger = MemoryLedger::with_rows(vec![row("a", "1.1")]);

        assert_eq!(ledger.read_cell(2, Column::CandidateId).await.unwrap(), "a");
        ledger.write_cell(2, Column::Reactions, "eyes").await.unwrap();
        assert_eq!(ledger.read_cell(2, Column::Reactions).await.unwrap(), "eyes");

        let result = ledger.read_cell(5, Column::Title).await;
        assert!(matches!(result, Err(PersistenceError::RowOutOfRange { row: 5, .. })));
    }
}
