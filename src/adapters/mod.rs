//! Adapter interfaces for external systems.
//!
//! Each external collaborator is reached through a narrow capability trait,
//! so the pipeline can be wired with the real HTTP clients or with in-memory
//! fakes:
//! - `CorpusSource`: paper search (arXiv)
//! - `EnrichmentService`: AI summarization (OpenAI)
//! - `NotificationChannel`: message posting (Slack)
//!
//! The ledger capability lives in `core::ledger`; its Google Sheets backend
//! is in `sheets`.

pub mod arxiv;
pub mod openai;
pub mod sheets;
pub mod slack;

use async_trait::async_trait;
use reqwest::StatusCode;
use thiserror::Error;

use crate::domain::Candidate;

// Re-export the concrete clients
pub use arxiv::ArxivClient;
pub use openai::OpenAiClient;
pub use sheets::SheetsLedger;
pub use slack::SlackClient;

/// Failure talking to an external service
#[derive(Debug, Clone, Error)]
pub enum ServiceError {
    /// Network error, timeout, 5xx or rate limiting; worth retrying
    #[error("transient failure: {0}")]
    Transient(String),

    /// The response could not be parsed as the expected schema
    #[error("malformed response: {0}")]
    Malformed(String),

    /// The service refused the request (auth, bad request, API error)
    #[error("request rejected: {0}")]
    Rejected(String),
}

impl ServiceError {
    /// Whether a retry might succeed
    pub fn is_transient(&self) -> bool {
        matches!(self, Self::Transient(_))
    }

    /// Classify a non-success HTTP status
    pub fn from_status(service: &str, status: StatusCode, body: &str) -> Self {
        let message = format!("{} API error ({}): {}", service, status, body.trim());
        if status == StatusCode::TOO_MANY_REQUESTS || status.is_server_error() {
            Self::Transient(message)
        } else {
            Self::Rejected(message)
        }
    }
}

impl From<reqwest::Error> for ServiceError {
    fn from(err: reqwest::Error) -> Self {
        if err.is_timeout() || err.is_connect() || err.is_request() {
            Self::Transient(err.to_string())
        } else if err.is_decode() {
            Self::Malformed(err.to_string())
        } else if let Some(status) = err.status() {
            Self::from_status("HTTP", status, &err.to_string())
        } else {
            Self::Rejected(err.to_string())
        }
    }
}

/// Search over the external paper corpus
#[async_trait]
pub trait CorpusSource: Send + Sync {
    /// Fetch up to `max_results` candidates, newest first
    async fn search(&self, query: &str, max_results: usize) -> Result<Vec<Candidate>, ServiceError>;
}

/// AI summarization service
#[async_trait]
pub trait EnrichmentService: Send + Sync {
    /// Human-readable service name
    fn name(&self) -> &str;

    /// Request a structured summary; returns the raw JSON object text
    async fn summarize(&self, title: &str, abstract_text: &str) -> Result<String, ServiceError>;
}

/// Messaging channel that issues an identifier per posted message
#[async_trait]
pub trait NotificationChannel: Send + Sync {
    /// Post a message and return the channel-issued message identifier
    async fn post(
        &self,
        channel: &str,
        text: &str,
        blocks: Option<&[serde_json::Value]>,
    ) -> Result<String, ServiceError>;
}
