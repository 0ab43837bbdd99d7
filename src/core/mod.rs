//! Core pipeline logic.
//!
//! This module contains:
//! - Retry: Shared retry/backoff policy for external calls
//! - Dedup/Selector: Candidate filtering and sampling
//! - Enricher/Notifier: Per-candidate AI summary and Slack layout
//! - Ledger: The append-at-top audit ledger capability
//! - Journal/Lock: Run journal and run-scoped mutual exclusion
//! - Pipeline: Main run orchestration

pub mod dedup;
pub mod enricher;
pub mod journal;
pub mod ledger;
pub mod lock;
pub mod notifier;
pub mod pipeline;
pub mod retry;
pub mod selector;

// Re-export commonly used types
pub use enricher::{Enricher, EnrichmentSettings};
pub use journal::{list_runs, load_runs, Journal};
pub use ledger::{known_ids, Ledger, MemoryLedger, PersistenceError};
pub use lock::RunLock;
pub use notifier::{build_message, NotificationMessage, Notifier};
pub use pipeline::{Pipeline, PipelineError, RunParams, RunReport};
pub use retry::{with_retry, RetryPolicy};
pub use selector::Selector;
