//! Per-candidate AI enrichment with retry and deterministic fallback.
//!
//! Enrichment never fails from the caller's point of view: exhausted
//! retries, rejected requests, malformed payloads and a missing credential
//! all collapse into `EnrichmentResult::fallback`.

use std::sync::Arc;

use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use super::retry::{with_retry, RetryPolicy};
use crate::adapters::{EnrichmentService, ServiceError};
use crate::domain::enrichment::truncate_chars;
use crate::domain::{EnrichmentPayload, EnrichmentResult, FailureClass};

/// Enrichment input caps and retry policy
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EnrichmentSettings {
    /// Title is cut to this many characters before the call
    #[serde(default = "default_max_title_chars")]
    pub max_title_chars: usize,

    /// Abstract is cut to this many characters before the call
    #[serde(default = "default_max_abstract_chars")]
    pub max_abstract_chars: usize,

    #[serde(default)]
    pub retry: RetryPolicy,
}

fn default_max_title_chars() -> usize {
    300
}
fn default_max_abstract_chars() -> usize {
    4000
}

impl Default for EnrichmentSettings {
    fn default() -> Self {
        Self {
            max_title_chars: default_max_title_chars(),
            max_abstract_chars: default_max_abstract_chars(),
            retry: RetryPolicy::default(),
        }
    }
}

/// Calls the AI service for each candidate
pub struct Enricher {
    /// `None` when no credential is configured
    service: Option<Arc<dyn EnrichmentService>>,
    settings: EnrichmentSettings,
}

impl Enricher {
    pub fn new(service: Option<Arc<dyn EnrichmentService>>, settings: EnrichmentSettings) -> Self {
        Self { service, settings }
    }

    /// Whether a real service is wired in
    pub fn is_enabled(&self) -> bool {
        self.service.is_some()
    }

    /// Summarize one candidate; always yields a result
    pub async fn enrich(&self, title: &str, abstract_text: &str) -> EnrichmentResult {
        let Some(service) = &self.service else {
            return EnrichmentResult::fallback(abstract_text, FailureClass::MissingApiKey);
        };

        let (title_in, _) = truncate_chars(title, self.settings.max_title_chars);
        let (abstract_in, cut) = truncate_chars(abstract_text, self.settings.max_abstract_chars);
        if cut {
            debug!(max = self.settings.max_abstract_chars, "Abstract truncated for enrichment");
        }

        let raw = with_retry(&self.settings.retry, service.name(), || {
            service.summarize(title_in, abstract_in)
        })
        .await;

        let class = match raw {
            Ok(raw) => match EnrichmentPayload::parse(&raw) {
                Ok(result) => return result,
                Err(reason) => {
                    warn!(service = service.name(), %reason, "Malformed enrichment payload");
                    FailureClass::MalformedResponse
                }
            },
            Err(ServiceError::Malformed(reason)) => {
                warn!(service = service.name(), %reason, "Malformed enrichment response");
                FailureClass::MalformedResponse
            }
            Err(e) => {
                warn!(service = service.name(), error = %e, "Enrichment failed, using fallback");
                FailureClass::ProcessingFailed
            }
        };

        EnrichmentResult::fallback(abstract_text, class)
    }
}
