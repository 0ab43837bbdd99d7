//! Run-level orchestration: fetch → dedup → select → enrich → notify → persist.
//!
//! Collaborators are injected as capability traits so the same pipeline runs
//! against the real services, a dry-run in-memory ledger, or test fakes.
//! Only a failed fetch aborts a run; every later fault is isolated to the
//! candidate it happened on.

use std::collections::HashSet;
use std::path::PathBuf;
use std::sync::Arc;

use chrono::Utc;
use serde::Serialize;
use thiserror::Error;
use tracing::{debug, error, info, instrument, warn};
use uuid::Uuid;

use super::dedup::filter_known;
use super::enricher::Enricher;
use super::journal::Journal;
use super::ledger::{known_ids, Ledger};
use super::notifier::{build_message, jst, Notifier};
use super::selector::Selector;
use crate::adapters::{CorpusSource, ServiceError};
use crate::domain::{Candidate, EnrichmentResult, Event, EventType, LedgerRow};

/// Errors that abort a whole run
#[derive(Debug, Error)]
pub enum PipelineError {
    /// The corpus could not be searched; nothing else was attempted
    #[error("fetch failed: {0}")]
    Fetch(#[source] ServiceError),
}

/// Parameters of a single run
#[derive(Debug, Clone)]
pub struct RunParams {
    pub query: String,
    pub max_results: usize,
    /// Target number of successfully posted candidates
    pub num_papers: usize,
    pub slack_channel: String,
    /// Secondary channel for the bundle message
    pub bundle_channel: Option<String>,
    pub bundle_prompt: String,
}

/// One candidate whose notification went out
#[derive(Debug, Clone, Serialize)]
pub struct PostedCandidate {
    pub candidate_id: String,
    pub title: String,
    pub notification_ts: String,
    pub persisted: bool,
    pub fallback: bool,
}

/// What a run did
#[derive(Debug, Clone, Serialize)]
pub struct RunReport {
    pub run_id: Uuid,
    /// Candidates returned by the corpus
    pub fetched: usize,
    /// Candidates left after deduplication
    pub fresh: usize,
    /// Candidates taken off the shuffled sequence
    pub attempted: usize,
    pub posted: Vec<PostedCandidate>,
    /// Ledger rows written this run
    pub persisted: usize,
    /// Candidates whose post or ledger write failed
    pub failed: usize,
    pub bundle_posted: bool,
}

impl RunReport {
    fn new(run_id: Uuid) -> Self {
        Self {
            run_id,
            fetched: 0,
            fresh: 0,
            attempted: 0,
            posted: Vec::new(),
            persisted: 0,
            failed: 0,
            bundle_posted: false,
        }
    }
}

/// The paper pipeline
pub struct Pipeline {
    source: Arc<dyn CorpusSource>,
    enricher: Enricher,
    notifier: Notifier,
    /// `None` disables dedup reads and persistence
    ledger: Option<Arc<dyn Ledger>>,
    /// Where run journals are written, if anywhere
    runs_dir: Option<PathBuf>,
    selection_seed: Option<u64>,
}

impl Pipeline {
    pub fn new(source: Arc<dyn CorpusSource>, enricher: Enricher, notifier: Notifier) -> Self {
        Self {
            source,
            enricher,
            notifier,
            ledger: None,
            runs_dir: None,
            selection_seed: None,
        }
    }

    pub fn with_ledger(mut self, ledger: Arc<dyn Ledger>) -> Self {
        self.ledger = Some(ledger);
        self
    }

    pub fn with_runs_dir(mut self, runs_dir: impl Into<PathBuf>) -> Self {
        self.runs_dir = Some(runs_dir.into());
        self
    }

    pub fn with_selection_seed(mut self, seed: Option<u64>) -> Self {
        self.selection_seed = seed;
        self
    }

    /// Execute one run
    #[instrument(skip(self, params), fields(query = %params.query))]
    pub async fn run(&self, params: &RunParams) -> Result<RunReport, PipelineError> {
        let run_id = Uuid::new_v4();
        let journal = self.open_journal(run_id).await;
        let journal = journal.as_ref();
        let mut report = RunReport::new(run_id);

        info!(%run_id, enrichment = self.enricher.is_enabled(), "Starting run");
        record(
            journal,
            Event::new(run_id, EventType::RunStarted, format!("Query '{}'", params.query)),
        )
        .await;

        // 1. Fetch; failure ends the run before any side effect
        let candidates = match self.source.search(&params.query, params.max_results).await {
            Ok(candidates) => candidates,
            Err(e) => {
                error!(error = %e, "Fetch failed, aborting run");
                record(
                    journal,
                    Event::new(run_id, EventType::RunFailed, "Fetch failed").with_error(e.to_string()),
                )
                .await;
                return Err(PipelineError::Fetch(e));
            }
        };
        report.fetched = candidates.len();

        // 2. Deduplicate against the ledger (fails open)
        let known = self.known_ids().await;
        let fresh = filter_known(&known, candidates);
        report.fresh = fresh.len();

        info!(fetched = report.fetched, fresh = report.fresh, "Candidates fetched");
        record(
            journal,
            Event::new(
                run_id,
                EventType::CandidatesFetched,
                format!("{} fetched, {} new", report.fetched, report.fresh),
            ),
        )
        .await;

        // 3. Walk a shuffled copy until enough posts succeeded
        let mut selector = Selector::from_seed(self.selection_seed);
        let mut rows_appended = 0usize;

        for candidate in selector.shuffled(fresh) {
            if report.posted.len() >= params.num_papers {
                break;
            }
            report.attempted += 1;

            self.process_candidate(&candidate, params, journal, &mut report, &mut rows_appended)
                .await;
        }

        info!(
            posted = report.posted.len(),
            target = params.num_papers,
            persisted = report.persisted,
            "Candidates processed"
        );

        // 4. Bundle, after all per-candidate work
        self.post_bundle(params, journal, &mut report).await;

        record(
            journal,
            Event::new(
                run_id,
                EventType::RunCompleted,
                format!(
                    "Posted {}/{}, persisted {}",
                    report.posted.len(),
                    params.num_papers,
                    report.persisted
                ),
            ),
        )
        .await;

        Ok(report)
    }

    async fn open_journal(&self, run_id: Uuid) -> Option<Journal> {
        let runs_dir = self.runs_dir.as_ref()?;
        match Journal::open(runs_dir, run_id).await {
            Ok(journal) => Some(journal),
            Err(e) => {
                warn!(error = %e, "Run journal unavailable");
                None
            }
        }
    }

    async fn known_ids(&self) -> HashSet<String> {
        let Some(ledger) = &self.ledger else {
            return HashSet::new();
        };

        match known_ids(ledger.as_ref()).await {
            Ok(ids) => {
                debug!(count = ids.len(), "Known identifiers loaded");
                ids
            }
            Err(e) => {
                warn!(error = %e, "Could not read known identifiers, continuing without dedup");
                HashSet::new()
            }
        }
    }

    /// Enrich, post and persist one candidate; never fails the run
    async fn process_candidate(
        &self,
        candidate: &Candidate,
        params: &RunParams,
        journal: Option<&Journal>,
        report: &mut RunReport,
        rows_appended: &mut usize,
    ) {
        let run_id = report.run_id;
        let index = report.posted.len() + 1;
        info!(index, candidate = %candidate.id, title = %candidate.title, "Processing candidate");

        let result = self
            .enricher
            .enrich(&candidate.title, &candidate.abstract_text)
            .await;

        let message = build_message(candidate, &result, index, Utc::now().with_timezone(&jst()));

        let ts = match self.notifier.post(&params.slack_channel, &message).await {
            Ok(ts) => {
                record(
                    journal,
                    Event::new(run_id, EventType::CandidatePosted, format!("Posted paper {}", index))
                        .with_candidate(&candidate.id)
                        .with_notification(&ts),
                )
                .await;
                Some(ts)
            }
            Err(e) => {
                warn!(candidate = %candidate.id, error = %e, "Failed to post notification");
                report.failed += 1;
                record(
                    journal,
                    Event::new(run_id, EventType::CandidateFailed, "Notification failed")
                        .with_candidate(&candidate.id)
                        .with_error(e.to_string()),
                )
                .await;
                None
            }
        };

        let persisted = self
            .persist(candidate, &result, ts.as_deref(), journal, report, rows_appended)
            .await;

        if let Some(ts) = ts {
            report.posted.push(PostedCandidate {
                candidate_id: candidate.id.clone(),
                title: candidate.title.clone(),
                notification_ts: ts,
                persisted,
                fallback: result.is_fallback(),
            });
        }
    }

    async fn persist(
        &self,
        candidate: &Candidate,
        result: &EnrichmentResult,
        ts: Option<&str>,
        journal: Option<&Journal>,
        report: &mut RunReport,
        rows_appended: &mut usize,
    ) -> bool {
        let Some(ledger) = &self.ledger else {
            debug!(candidate = %candidate.id, "Ledger disabled, row not persisted");
            return false;
        };

        let row = LedgerRow::from_enrichment(candidate, result, ts);
        let insert_index = 1 + *rows_appended;

        match ledger.insert_at(insert_index, &row).await {
            Ok(()) => {
                *rows_appended += 1;
                report.persisted += 1;
                record(
                    journal,
                    Event::new(
                        report.run_id,
                        EventType::CandidatePersisted,
                        format!("Ledger row {}", insert_index + 1),
                    )
                    .with_candidate(&candidate.id),
                )
                .await;
                true
            }
            Err(e) => {
                // The notification, if any, stays posted
                error!(candidate = %candidate.id, error = %e, "Failed to write ledger row");
                if ts.is_some() {
                    report.failed += 1;
                }
                record(
                    journal,
                    Event::new(report.run_id, EventType::CandidateFailed, "Ledger write failed")
                        .with_candidate(&candidate.id)
                        .with_error(e.to_string()),
                )
                .await;
                false
            }
        }
    }

    async fn post_bundle(&self, params: &RunParams, journal: Option<&Journal>, report: &mut RunReport) {
        if report.posted.is_empty() {
            return;
        }
        let Some(channel) = params.bundle_channel.as_deref() else {
            debug!("No bundle channel configured");
            return;
        };

        let urls: Vec<String> = report.posted.iter().map(|p| p.candidate_id.clone()).collect();

        match self
            .notifier
            .post_bundle(channel, &urls, &params.bundle_prompt)
            .await
        {
            Ok(_) => {
                report.bundle_posted = true;
                info!(channel, count = urls.len(), "Bundle posted");
                record(
                    journal,
                    Event::new(
                        report.run_id,
                        EventType::BundlePosted,
                        format!("Bundle of {} papers", urls.len()),
                    ),
                )
                .await;
            }
            Err(e) => warn!(channel, error = %e, "Failed to post bundle"),
        }
    }
}

/// Append to the journal if there is one; failures are only logged
async fn record(journal: Option<&Journal>, event: Event) {
    if let Some(journal) = journal {
        if let Err(e) = journal.append(&event).await {
            warn!(error = %e, event_type = ?event.event_type, "Failed to write journal event");
        }
    }
}
