//! paperfeed - arXiv paper digest for Slack with a Google Sheets ledger
//!
//! Each run searches arXiv, drops papers already recorded in the ledger,
//! samples a few of the rest, asks OpenAI for a structured summary, posts
//! each paper to Slack and records it at the top of a spreadsheet. A
//! separate listener takes Slack reaction events and annotates the matching
//! ledger row.
//!
//! # Modules
//!
//! - `adapters`: External services (arXiv, OpenAI, Slack, Google Sheets)
//! - `core`: Pipeline, enrichment, notification layout, ledger, journal
//! - `domain`: Data structures (Candidate, EnrichmentResult, LedgerRow, Event, Run)
//! - `listener`: Signed Slack webhook and reaction annotation
//! - `cli`: Command-line interface
//!
//! # Usage
//!
//! ```bash
//! # Post three papers
//! paperfeed run --num-papers 3
//!
//! # Serve the reaction webhook
//! paperfeed listen --address 0.0.0.0:3000
//!
//! # Inspect a run
//! paperfeed status <run-id>
//! ```

pub mod adapters;
pub mod cli;
pub mod config;
pub mod core;
pub mod domain;
pub mod listener;

// Re-export main types at crate root for convenience
pub use core::{Pipeline, RunParams, RunReport};
pub use domain::{Candidate, EnrichmentResult, Event, EventType, LedgerRow, Run, RunState};
