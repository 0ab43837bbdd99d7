//! Journal entries written while a run executes.
//!
//! Entries are appended and never edited. Replaying them in order yields the
//! run's outcome, including posts that never reached the ledger.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// One line of `events.jsonl`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Event {
    pub id: Uuid,

    /// Wall-clock time the entry was recorded
    pub timestamp: DateTime<Utc>,

    /// Owning run
    pub run_id: Uuid,

    /// arXiv entry id, set on candidate-scoped entries
    pub candidate_id: Option<String>,

    pub event_type: EventType,

    /// Short operator-facing text. Must never carry tokens or keys.
    pub summary: String,

    /// Slack `ts` of the posted message
    pub notification_ts: Option<String>,

    pub error: Option<String>,
}

impl Event {
    /// Stamp a fresh entry with a new id and the current time
    pub fn new(run_id: Uuid, event_type: EventType, summary: impl Into<String>) -> Self {
        Self {
            id: Uuid::new_v4(),
            timestamp: Utc::now(),
            run_id,
            candidate_id: None,
            event_type,
            summary: summary.into(),
            notification_ts: None,
            error: None,
        }
    }

    pub fn with_candidate(mut self, candidate_id: impl Into<String>) -> Self {
        self.candidate_id = Some(candidate_id.into());
        self
    }

    pub fn with_notification(mut self, ts: impl Into<String>) -> Self {
        self.notification_ts = Some(ts.into());
        self
    }

    pub fn with_error(mut self, error: impl Into<String>) -> Self {
        self.error = Some(error.into());
        self
    }
}

/// What a journal entry records. Serialized in snake_case.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EventType {
    RunStarted,

    /// Search finished; the summary holds fetched and fresh counts
    CandidatesFetched,

    /// Slack accepted the message. Written before the ledger insert.
    CandidatePosted,

    /// Row inserted at the top of the sheet
    CandidatePersisted,

    CandidateFailed,

    /// Prompt bundle sent to the bundle channel
    BundlePosted,

    /// Loop finished; per-candidate failures may still be present
    RunCompleted,

    /// Search failed, nothing was posted or written
    RunFailed,
}
