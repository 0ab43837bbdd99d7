//! Domain types for the paperfeed pipeline.
//!
//! This module contains the core data structures:
//! - Candidate: Fetched papers
//! - Enrichment: AI-derived summary, importance and theme
//! - LedgerRow: Audit records and the ledger column layout
//! - Events/Run: Run journal records and replayed run state

pub mod candidate;
pub mod enrichment;
pub mod events;
pub mod ledger_row;
pub mod run;

// Re-export commonly used types
pub use candidate::Candidate;
pub use enrichment::{EnrichmentPayload, EnrichmentResult, FailureClass, Importance, Theme};
pub use events::{Event, EventType};
pub use ledger_row::{Column, LedgerRow, ReactionList};
pub use run::{CandidateProgress, Run, RunState};
