//! Pipeline Integration Tests
//!
//! End-to-end runs against in-memory fakes of every external service.

use std::collections::HashSet;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use chrono::{TimeZone, Utc};
use serde_json::Value;
use tempfile::TempDir;

use paperfeed::adapters::{CorpusSource, EnrichmentService, NotificationChannel, ServiceError};
use paperfeed::core::ledger::row_number;
use paperfeed::core::notifier::DEFAULT_BUNDLE_PROMPT;
use paperfeed::core::{
    load_runs, Enricher, EnrichmentSettings, Ledger, MemoryLedger, Notifier, PersistenceError,
    Pipeline, PipelineError, RetryPolicy, RunParams,
};
use paperfeed::domain::{Candidate, Column, LedgerRow, RunState};

// ============================================================================
// Fakes
// ============================================================================

struct FakeCorpus {
    candidates: Vec<Candidate>,
    fail: bool,
}

#[async_trait]
impl CorpusSource for FakeCorpus {
    async fn search(&self, _query: &str, max_results: usize) -> Result<Vec<Candidate>, ServiceError> {
        if self.fail {
            return Err(ServiceError::Transient("arXiv unreachable".to_string()));
        }
        Ok(self.candidates.iter().take(max_results).cloned().collect())
    }
}

/// Returns a fixed payload, or fails every attempt when `payload` is None
struct FakeAi {
    payload: Option<String>,
    calls: AtomicUsize,
}

impl FakeAi {
    fn answering(payload: &str) -> Arc<Self> {
        Arc::new(Self {
            payload: Some(payload.to_string()),
            calls: AtomicUsize::new(0),
        })
    }

    fn failing() -> Arc<Self> {
        Arc::new(Self {
            payload: None,
            calls: AtomicUsize::new(0),
        })
    }
}

#[async_trait]
impl EnrichmentService for FakeAi {
    fn name(&self) -> &str {
        "fake-ai"
    }

    async fn summarize(&self, _title: &str, _abstract_text: &str) -> Result<String, ServiceError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        self.payload
            .clone()
            .ok_or_else(|| ServiceError::Transient("503 Service Unavailable".to_string()))
    }
}

#[derive(Debug, Clone)]
struct Post {
    channel: String,
    text: String,
    blocks: Option<Vec<Value>>,
}

/// Records posts; the 1-based post numbers in `fail_on` are rejected
#[derive(Default)]
struct RecordingChannel {
    posts: Mutex<Vec<Post>>,
    attempts: AtomicUsize,
    fail_on: HashSet<usize>,
}

impl RecordingChannel {
    fn failing_on(posts: &[usize]) -> Arc<Self> {
        Arc::new(Self {
            fail_on: posts.iter().copied().collect(),
            ..Default::default()
        })
    }

    fn posts(&self) -> Vec<Post> {
        self.posts.lock().unwrap().clone()
    }
}

#[async_trait]
impl NotificationChannel for RecordingChannel {
    async fn post(
        &self,
        channel: &str,
        text: &str,
        blocks: Option<&[Value]>,
    ) -> Result<String, ServiceError> {
        let n = self.attempts.fetch_add(1, Ordering::SeqCst) + 1;
        if self.fail_on.contains(&n) {
            return Err(ServiceError::Rejected("channel_not_found".to_string()));
        }

        self.posts.lock().unwrap().push(Post {
            channel: channel.to_string(),
            text: text.to_string(),
            blocks: blocks.map(|b| b.to_vec()),
        });
        Ok(format!("1700000000.{:06}", n))
    }
}

/// Reads fine, refuses every write
struct ReadOnlyLedger;

#[async_trait]
impl Ledger for ReadOnlyLedger {
    async fn read_column(&self, _column: Column) -> Result<Vec<String>, PersistenceError> {
        Ok(Vec::new())
    }

    async fn insert_at(&self, _index: usize, _row: &LedgerRow) -> Result<(), PersistenceError> {
        Err(ServiceError::Rejected("PERMISSION_DENIED".to_string()).into())
    }

    async fn read_cell(&self, _row: usize, _column: Column) -> Result<String, PersistenceError> {
        Ok(String::new())
    }

    async fn write_cell(&self, _row: usize, _column: Column, _value: &str) -> Result<(), PersistenceError> {
        Err(ServiceError::Rejected("PERMISSION_DENIED".to_string()).into())
    }
}

// ============================================================================
// Helpers
// ============================================================================

const GOOD_PAYLOAD: &str =
    r#"{"summary": "Short sum", "importance": 4, "theme_id": 1, "reason": "Because"}"#;

fn candidate(n: u32) -> Candidate {
    Candidate::new(
        format!("http://arxiv.org/abs/2601.{:05}v1", n),
        format!("Paper {}", n),
        format!("Abstract of paper {}", n),
        Utc.with_ymd_and_hms(2026, 1, n.min(28), 0, 0, 0).unwrap(),
    )
}

fn corpus(ids: &[u32]) -> Arc<FakeCorpus> {
    Arc::new(FakeCorpus {
        candidates: ids.iter().map(|n| candidate(*n)).collect(),
        fail: false,
    })
}

fn enricher(service: Arc<FakeAi>) -> Enricher {
    let settings = EnrichmentSettings {
        retry: RetryPolicy::exponential(3, Duration::from_millis(1)),
        ..Default::default()
    };
    Enricher::new(Some(service as Arc<dyn EnrichmentService>), settings)
}

fn params(num_papers: usize) -> RunParams {
    RunParams {
        query: "all:test".to_string(),
        max_results: 100,
        num_papers,
        slack_channel: "#papers".to_string(),
        bundle_channel: Some("#prompts".to_string()),
        bundle_prompt: DEFAULT_BUNDLE_PROMPT.to_string(),
    }
}

fn pipeline(
    source: Arc<FakeCorpus>,
    ai: Arc<FakeAi>,
    channel: Arc<RecordingChannel>,
    ledger: Arc<dyn Ledger>,
) -> Pipeline {
    Pipeline::new(
        source,
        enricher(ai),
        Notifier::new(channel, Duration::ZERO),
    )
    .with_ledger(ledger)
    .with_selection_seed(Some(42))
}

// ============================================================================
// Tests
// ============================================================================

#[tokio::test]
async fn test_two_new_candidates_post_persist_and_bundle() {
    let channel = Arc::new(RecordingChannel::default());
    let ledger = Arc::new(MemoryLedger::new());

    let report = pipeline(corpus(&[1, 2]), FakeAi::answering(GOOD_PAYLOAD), channel.clone(), ledger.clone())
        .run(&params(2))
        .await
        .unwrap();

    assert_eq!(report.posted.len(), 2);
    assert_eq!(report.persisted, 2);
    assert!(report.bundle_posted);

    let posts = channel.posts();
    assert_eq!(posts.len(), 3);
    assert!(posts[..2].iter().all(|p| p.channel == "#papers" && p.blocks.is_some()));

    let bundle = &posts[2];
    assert_eq!(bundle.channel, "#prompts");
    assert!(bundle.blocks.is_none());
    assert!(bundle.text.contains("http://arxiv.org/abs/2601.00001v1"));
    assert!(bundle.text.contains("http://arxiv.org/abs/2601.00002v1"));
    assert!(bundle.text.ends_with(DEFAULT_BUNDLE_PROMPT));

    let rows = ledger.rows().await;
    assert_eq!(rows.len(), 2);
    for (row, posted) in rows.iter().zip(&report.posted) {
        assert_eq!(row.candidate_id, posted.candidate_id);
        assert_eq!(row.notification_ts, posted.notification_ts);
        assert_eq!(row.importance, "4");
        assert_eq!(row.theme, "1");
        assert!(row.reactions.is_empty());
    }
}

#[tokio::test]
async fn test_failing_ai_still_notifies_and_persists() {
    let ai = FakeAi::failing();
    let channel = Arc::new(RecordingChannel::default());
    let ledger = Arc::new(MemoryLedger::new());

    let report = pipeline(corpus(&[1]), ai.clone(), channel.clone(), ledger.clone())
        .run(&params(1))
        .await
        .unwrap();

    // Every configured attempt was used before falling back
    assert_eq!(ai.calls.load(Ordering::SeqCst), 3);

    assert_eq!(report.posted.len(), 1);
    assert!(report.posted[0].fallback);

    let blocks = channel.posts()[0].blocks.clone().unwrap();
    let fields = blocks[1]["fields"].as_array().unwrap();
    assert_eq!(fields[1]["text"], "*Importance:*\n?");
    let reason = blocks[3]["text"]["text"].as_str().unwrap();
    assert!(reason.contains("LLM Processing Failed"));

    let rows = ledger.rows().await;
    assert_eq!(rows.len(), 1);
    assert_eq!(rows[0].importance, "?");
    assert_eq!(rows[0].summary, "Abstract of paper 1");
}

#[tokio::test]
async fn test_fetch_failure_has_no_side_effects() {
    let temp = TempDir::new().unwrap();
    let channel = Arc::new(RecordingChannel::default());
    let ledger = Arc::new(MemoryLedger::new());
    let source = Arc::new(FakeCorpus {
        candidates: vec![candidate(1)],
        fail: true,
    });

    let result = pipeline(source, FakeAi::answering(GOOD_PAYLOAD), channel.clone(), ledger.clone())
        .with_runs_dir(temp.path())
        .run(&params(3))
        .await;

    assert!(matches!(result, Err(PipelineError::Fetch(_))));
    assert!(channel.posts().is_empty());
    assert!(ledger.is_empty().await);

    let runs = load_runs(temp.path()).await.unwrap();
    assert_eq!(runs.len(), 1);
    assert!(matches!(runs[0].state, RunState::Failed { .. }));
}

#[tokio::test]
async fn test_known_candidates_are_not_reposted() {
    let existing = LedgerRow::from_cells(&[
        "2026-01-01".to_string(),
        "Paper 1".to_string(),
        "1".to_string(),
        "4".to_string(),
        "Short sum".to_string(),
        "http://arxiv.org/abs/2601.00001v1".to_string(),
        "1699999999.000001".to_string(),
    ]);
    let ledger = Arc::new(MemoryLedger::with_rows(vec![existing]));
    let channel = Arc::new(RecordingChannel::default());

    let report = pipeline(corpus(&[1, 2]), FakeAi::answering(GOOD_PAYLOAD), channel.clone(), ledger.clone())
        .run(&params(3))
        .await
        .unwrap();

    assert_eq!(report.fetched, 2);
    assert_eq!(report.fresh, 1);
    assert_eq!(report.posted.len(), 1);
    assert_eq!(report.posted[0].candidate_id, "http://arxiv.org/abs/2601.00002v1");

    // New row on top, the old one pushed down
    let rows = ledger.rows().await;
    assert_eq!(rows.len(), 2);
    assert_eq!(rows[0].candidate_id, "http://arxiv.org/abs/2601.00002v1");
    assert_eq!(rows[1].candidate_id, "http://arxiv.org/abs/2601.00001v1");
}

#[tokio::test]
async fn test_run_blocks_stack_newest_run_on_top() {
    let ledger = Arc::new(MemoryLedger::new());

    let first = pipeline(
        corpus(&[1, 2]),
        FakeAi::answering(GOOD_PAYLOAD),
        Arc::new(RecordingChannel::default()),
        ledger.clone(),
    )
    .run(&params(2))
    .await
    .unwrap();

    let second = pipeline(
        corpus(&[1, 2, 3, 4]),
        FakeAi::answering(GOOD_PAYLOAD),
        Arc::new(RecordingChannel::default()),
        ledger.clone(),
    )
    .run(&params(2))
    .await
    .unwrap();

    let expected: Vec<String> = second
        .posted
        .iter()
        .chain(&first.posted)
        .map(|p| p.candidate_id.clone())
        .collect();
    let actual: Vec<String> = ledger.rows().await.into_iter().map(|r| r.candidate_id).collect();

    assert_eq!(actual, expected);

    // The second run only saw the two papers not yet recorded
    assert_eq!(second.fresh, 2);
}

#[tokio::test]
async fn test_failed_post_is_recorded_but_not_counted() {
    // First post fails, the rest succeed
    let channel = RecordingChannel::failing_on(&[1]);
    let ledger = Arc::new(MemoryLedger::new());

    let report = pipeline(corpus(&[1, 2, 3]), FakeAi::answering(GOOD_PAYLOAD), channel.clone(), ledger.clone())
        .run(&params(1))
        .await
        .unwrap();

    assert_eq!(report.attempted, 2);
    assert_eq!(report.posted.len(), 1);
    assert_eq!(report.failed, 1);
    assert_eq!(report.persisted, 2);

    let rows = ledger.rows().await;
    assert_eq!(rows.len(), 2);
    assert_eq!(rows[0].notification_ts, "");
    assert_eq!(rows[1].notification_ts, report.posted[0].notification_ts);
    assert_eq!(rows[1].candidate_id, report.posted[0].candidate_id);
}

#[tokio::test]
async fn test_ledger_failure_keeps_post_and_is_journaled() {
    let temp = TempDir::new().unwrap();
    let channel = Arc::new(RecordingChannel::default());

    let report = pipeline(corpus(&[1, 2]), FakeAi::answering(GOOD_PAYLOAD), channel.clone(), Arc::new(ReadOnlyLedger))
        .with_runs_dir(temp.path())
        .run(&params(2))
        .await
        .unwrap();

    assert_eq!(report.posted.len(), 2);
    assert_eq!(report.persisted, 0);
    assert!(report.posted.iter().all(|p| !p.persisted));
    assert_eq!(channel.posts().len(), 3);

    let runs = load_runs(temp.path()).await.unwrap();
    assert_eq!(runs.len(), 1);
    assert_eq!(runs[0].state, RunState::Completed);
    assert!(runs[0].bundle_posted);

    let gap = runs[0].unpersisted_posts();
    assert_eq!(gap.len(), 2);
    assert!(gap.iter().all(|(_, progress)| progress.error.is_some()));
}

#[tokio::test]
async fn test_fewer_candidates_than_target() {
    let channel = Arc::new(RecordingChannel::default());
    let ledger = Arc::new(MemoryLedger::new());

    let report = pipeline(corpus(&[1]), FakeAi::answering(GOOD_PAYLOAD), channel.clone(), ledger.clone())
        .run(&params(3))
        .await
        .unwrap();

    assert_eq!(report.posted.len(), 1);
    assert_eq!(ledger.len().await, 1);
    assert_eq!(channel.posts().len(), 2);
}

#[tokio::test]
async fn test_empty_corpus_posts_nothing() {
    let channel = Arc::new(RecordingChannel::default());
    let ledger = Arc::new(MemoryLedger::new());

    let report = pipeline(corpus(&[]), FakeAi::answering(GOOD_PAYLOAD), channel.clone(), ledger.clone())
        .run(&params(3))
        .await
        .unwrap();

    assert!(report.posted.is_empty());
    assert!(!report.bundle_posted);
    assert!(channel.posts().is_empty());
    assert!(ledger.is_empty().await);
}

#[tokio::test]
async fn test_persisted_rows_are_addressable_by_ts() {
    let channel = Arc::new(RecordingChannel::default());
    let ledger = Arc::new(MemoryLedger::new());

    let report = pipeline(corpus(&[1, 2]), FakeAi::answering(GOOD_PAYLOAD), channel, ledger.clone())
        .run(&params(2))
        .await
        .unwrap();

    let ts_column = ledger.read_column(Column::NotificationTs).await.unwrap();
    for posted in &report.posted {
        let i = ts_column
            .iter()
            .position(|ts| *ts == posted.notification_ts)
            .unwrap();
        let id = ledger.read_cell(row_number(i), Column::CandidateId).await.unwrap();
        assert_eq!(id, posted.candidate_id);
    }
}
