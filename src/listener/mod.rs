//! Inbound reaction listener.
//!
//! Slack delivers `reaction_added` events for posted papers; each request is
//! signature-checked against the raw body, then the reaction is recorded on
//! the ledger row carrying the message's `ts`.

pub mod annotator;
pub mod payload;
pub mod server;
pub mod signature;

pub use annotator::{AnnotationOutcome, ReactionAnnotator};
pub use payload::Inbound;
pub use server::{build_router, serve, AppState};
pub use signature::{SignatureError, SignatureVerifier};
