//! Reaction annotation of ledger rows.

use std::sync::Arc;

use tracing::{info, warn};

use crate::core::ledger::{find_row_by_notification, Ledger, PersistenceError};
use crate::domain::{Column, ReactionList};

/// Result of applying one reaction
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AnnotationOutcome {
    /// Label appended to the row
    Added { row: usize },

    /// Label was already recorded; nothing written
    AlreadyPresent { row: usize },

    /// No ledger row carries that message identifier
    NotFound,
}

/// Appends reaction labels to the ledger row of a posted message
pub struct ReactionAnnotator {
    ledger: Arc<dyn Ledger>,
}

impl ReactionAnnotator {
    pub fn new(ledger: Arc<dyn Ledger>) -> Self {
        Self { ledger }
    }

    /// Record `label` against the row whose notification id is `ts`.
    ///
    /// Idempotent: a label already in the row's list is not written again.
    pub async fn annotate(&self, ts: &str, label: &str) -> Result<AnnotationOutcome, PersistenceError> {
        let Some(row) = find_row_by_notification(self.ledger.as_ref(), ts).await? else {
            warn!(%ts, reaction = label, "No ledger row for message");
            return Ok(AnnotationOutcome::NotFound);
        };

        let current = self.ledger.read_cell(row, Column::Reactions).await?;
        let mut reactions = ReactionList::parse(&current);

        if !reactions.add(label) {
            info!(row, reaction = label, "Reaction already recorded");
            return Ok(AnnotationOutcome::AlreadyPresent { row });
        }

        self.ledger
            .write_cell(row, Column::Reactions, &reactions.render())
            .await?;

        info!(row, reaction = label, "Reaction recorded");
        Ok(AnnotationOutcome::Added { row })
    }
}
