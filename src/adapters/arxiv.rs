//! arXiv API adapter.
//!
//! Queries the arXiv export API page by page (Atom responses, parsed with
//! feed-rs), pacing page requests and retrying transient failures per page.

use std::time::Duration;

use async_trait::async_trait;
use tracing::{debug, info};

use super::{CorpusSource, ServiceError};
use crate::core::retry::{with_retry, RetryPolicy};
use crate::domain::candidate::{sort_newest_first, Candidate};

/// Default arXiv API endpoint
pub const ARXIV_API_URL: &str = "http://export.arxiv.org/api/query";

/// arXiv client with its own pacing and retry policy
pub struct ArxivClient {
    /// HTTP client
    client: reqwest::Client,
    /// Query endpoint
    base_url: String,
    /// Results requested per page
    page_size: usize,
    /// Delay between successive page requests
    page_delay: Duration,
    /// Per-page retry policy
    retry_policy: RetryPolicy,
}

impl Default for ArxivClient {
    fn default() -> Self {
        Self::new()
    }
}

impl ArxivClient {
    /// Create a client with arXiv's recommended pacing
    pub fn new() -> Self {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(60))
            .user_agent(concat!("paperfeed/", env!("CARGO_PKG_VERSION")))
            .build()
            .unwrap_or_default();

        Self {
            client,
            base_url: ARXIV_API_URL.to_string(),
            page_size: 100,
            page_delay: Duration::from_secs(3),
            retry_policy: RetryPolicy::exponential(5, Duration::from_secs(3)),
        }
    }

    pub fn with_base_url(mut self, url: impl Into<String>) -> Self {
        self.base_url = url.into();
        self
    }

    pub fn with_page_size(mut self, page_size: usize) -> Self {
        self.page_size = page_size.max(1);
        self
    }

    pub fn with_page_delay(mut self, delay: Duration) -> Self {
        self.page_delay = delay;
        self
    }

    pub fn with_retry_policy(mut self, policy: RetryPolicy) -> Self {
        self.retry_policy = policy;
        self
    }

    /// Fetch and parse a single result page
    async fn fetch_page(
        &self,
        query: &str,
        start: usize,
        max_results: usize,
    ) -> Result<Vec<Candidate>, ServiceError> {
        debug!(start, max_results, "arXiv page request");

        let response = self
            .client
            .get(&self.base_url)
            .query(&[
                ("search_query", query.to_string()),
                ("start", start.to_string()),
                ("max_results", max_results.to_string()),
                ("sortBy", "submittedDate".to_string()),
                ("sortOrder", "descending".to_string()),
            ])
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(ServiceError::from_status("arXiv", status, &body));
        }

        let bytes = response.bytes().await?;
        parse_feed(&bytes)
    }
}

#[async_trait]
impl CorpusSource for ArxivClient {
    async fn search(&self, query: &str, max_results: usize) -> Result<Vec<Candidate>, ServiceError> {
        let mut candidates: Vec<Candidate> = Vec::new();
        let mut start = 0;

        while candidates.len() < max_results {
            if start > 0 {
                tokio::time::sleep(self.page_delay).await;
            }

            let page_len = self.page_size.min(max_results - candidates.len());
            let page = with_retry(&self.retry_policy, "arxiv_page", || {
                self.fetch_page(query, start, page_len)
            })
            .await?;

            if page.is_empty() {
                break;
            }

            start += page.len();
            candidates.extend(page);
        }

        candidates.truncate(max_results);
        sort_newest_first(&mut candidates);

        info!(count = candidates.len(), "arXiv search complete");
        Ok(candidates)
    }
}

/// Parse an arXiv Atom response into candidates
pub fn parse_feed(bytes: &[u8]) -> Result<Vec<Candidate>, ServiceError> {
    let feed = feed_rs::parser::parse(bytes)
        .map_err(|e| ServiceError::Malformed(format!("Failed to parse arXiv feed: {}", e)))?;

    let mut candidates = Vec::with_capacity(feed.entries.len());

    for entry in feed.entries {
        // arXiv reports query errors as a single pseudo-entry
        if entry.id.contains("/api/errors") {
            let detail = entry.summary.map(|s| s.content).unwrap_or_default();
            return Err(ServiceError::Rejected(format!(
                "arXiv query error: {}",
                collapse_whitespace(&detail)
            )));
        }

        let Some(published) = entry.published.or(entry.updated) else {
            debug!(id = %entry.id, "Skipping entry without a date");
            continue;
        };

        let title = entry.title.map(|t| t.content).unwrap_or_default();
        let abstract_text = entry.summary.map(|s| s.content).unwrap_or_default();

        candidates.push(Candidate::new(
            entry.id,
            collapse_whitespace(&title),
            collapse_whitespace(&abstract_text),
            published,
        ));
    }

    Ok(candidates)
}

/// arXiv wraps titles and abstracts at fixed width
fn collapse_whitespace(text: &str) -> String {
    text.split_whitespace().collect::<Vec<_>>().join(" ")
}
