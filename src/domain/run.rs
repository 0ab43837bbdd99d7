//! Folding a run's journal back into a summary.

use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use super::events::{Event, EventType};

/// What the journal says happened to one candidate.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct CandidateProgress {
    /// Slack `ts`, present once the post succeeded
    pub notification_ts: Option<String>,

    pub persisted: bool,

    /// Most recent failure message
    pub error: Option<String>,
}

/// Replayed view of one `paperfeed run` invocation.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Run {
    pub id: Uuid,
    pub state: RunState,
    pub started_at: DateTime<Utc>,

    /// Set by `run_completed` or `run_failed`
    pub completed_at: Option<DateTime<Utc>>,

    /// Keyed by arXiv entry id, ordered for stable output
    pub candidates: BTreeMap<String, CandidateProgress>,

    pub bundle_posted: bool,
}

impl Run {
    fn started(id: Uuid, at: DateTime<Utc>) -> Self {
        Self {
            id,
            state: RunState::Running,
            started_at: at,
            completed_at: None,
            candidates: BTreeMap::new(),
            bundle_posted: false,
        }
    }

    /// Replay journal entries in order. `None` for an empty journal.
    ///
    /// A journal without a terminal entry stays `Running`, which is how an
    /// interrupted run shows up in `paperfeed status`.
    pub fn from_events(events: &[Event]) -> Option<Self> {
        let head = events.first()?;
        let run = events
            .iter()
            .fold(Self::started(head.run_id, head.timestamp), |mut run, event| {
                run.apply_event(event);
                run
            });
        Some(run)
    }

    pub fn apply_event(&mut self, event: &Event) {
        use EventType::*;

        match event.event_type {
            RunStarted => self.started_at = event.timestamp,
            CandidatesFetched => {}
            CandidatePosted | CandidatePersisted | CandidateFailed => {
                let Some(id) = event.candidate_id.as_ref() else {
                    return;
                };
                let progress = self.candidates.entry(id.clone()).or_default();
                match event.event_type {
                    CandidatePosted => progress.notification_ts = event.notification_ts.clone(),
                    CandidatePersisted => progress.persisted = true,
                    _ => progress.error = event.error.clone(),
                }
            }
            BundlePosted => self.bundle_posted = true,
            RunCompleted => self.finish(RunState::Completed, event.timestamp),
            RunFailed => {
                let error = event.error.clone().unwrap_or_default();
                self.finish(RunState::Failed { error }, event.timestamp);
            }
        }
    }

    fn finish(&mut self, state: RunState, at: DateTime<Utc>) {
        self.state = state;
        self.completed_at = Some(at);
    }

    pub fn posted(&self) -> impl Iterator<Item = (&String, &CandidateProgress)> {
        self.candidates
            .iter()
            .filter(|(_, progress)| progress.notification_ts.is_some())
    }

    /// Candidates announced in Slack that have no ledger row
    pub fn unpersisted_posts(&self) -> Vec<(&String, &CandidateProgress)> {
        self.posted().filter(|(_, progress)| !progress.persisted).collect()
    }

    pub fn is_running(&self) -> bool {
        self.state == RunState::Running
    }
}

/// Terminal or in-flight status, tagged as `status` in JSON.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case", tag = "status")]
pub enum RunState {
    /// In flight, or the process died before finishing
    #[default]
    Running,

    Completed,

    Failed { error: String },
}

#[cfg(test)]
mod tests {
    use super::*;

    fn posted(run_id: Uuid, candidate: &str, ts: &str) -> Event {
        Event::new(run_id, EventType::CandidatePosted, "Posted")
            .with_candidate(candidate)
            .with_notification(ts)
    }

    #[test]
    fn test_interrupted_journal_stays_running() {
        let run_id = Uuid::new_v4();
        let events = vec![
            Event::new(run_id, EventType::RunStarted, "Run started"),
            posted(run_id, "a", "1.1"),
        ];

        let run = Run::from_events(&events).unwrap();

        assert_eq!(run.id, run_id);
        assert!(run.is_running());
        assert!(run.completed_at.is_none());
        assert_eq!(run.unpersisted_posts().len(), 1);
    }

    #[test]
    fn test_replay_surfaces_unpersisted_posts() {
        let run_id = Uuid::new_v4();
        let events = vec![
            Event::new(run_id, EventType::RunStarted, "Run started"),
            posted(run_id, "a", "1.1"),
            Event::new(run_id, EventType::CandidatePersisted, "Saved").with_candidate("a"),
            posted(run_id, "b", "2.2"),
            Event::new(run_id, EventType::CandidateFailed, "Ledger write failed")
                .with_candidate("b")
                .with_error("503"),
            Event::new(run_id, EventType::BundlePosted, "Bundle"),
            Event::new(run_id, EventType::RunCompleted, "Run completed"),
        ];

        let run = Run::from_events(&events).unwrap();

        assert_eq!(run.state, RunState::Completed);
        assert!(run.completed_at.is_some());
        assert!(run.bundle_posted);
        assert_eq!(run.posted().count(), 2);

        let gap = run.unpersisted_posts();
        assert_eq!(gap.len(), 1);
        assert_eq!(gap[0].0, "b");
        assert_eq!(gap[0].1.error.as_deref(), Some("503"));
    }

    #[test]
    fn test_empty_journal_has_no_run() {
        assert!(Run::from_events(&[]).is_none());
    }

    #[test]
    fn test_fetch_failure_is_terminal() {
        let run_id = Uuid::new_v4();
        let events = vec![
            Event::new(run_id, EventType::RunStarted, "Run started"),
            Event::new(run_id, EventType::RunFailed, "Fetch failed").with_error("timeout"),
        ];

        let run = Run::from_events(&events).unwrap();
        assert_eq!(
            run.state,
            RunState::Failed {
                error: "timeout".to_string()
            }
        );
        assert!(!run.is_running());
    }

    #[test]
    fn test_entries_without_candidate_are_skipped() {
        let run_id = Uuid::new_v4();
        let events = vec![
            Event::new(run_id, EventType::RunStarted, "Run started"),
            Event::new(run_id, EventType::CandidatePosted, "Posted").with_notification("3.3"),
        ];

        let run = Run::from_events(&events).unwrap();
        assert!(run.candidates.is_empty());
    }
}
