//! Append-only run journal with file-based persistence.
//!
//! Each run writes newline-delimited JSON (JSONL) to
//! `<runs_dir>/<run_id>/events.jsonl`. The journal is an observability aid:
//! it records a post before the matching ledger write, so a crash between
//! the two shows up as a posted-but-unpersisted candidate on replay.

use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use tokio::fs::{self, OpenOptions};
use tokio::io::AsyncWriteExt;
use uuid::Uuid;

use crate::domain::{Event, Run};

const EVENTS_FILE: &str = "events.jsonl";

/// JSONL event log of a single run
pub struct Journal {
    path: PathBuf,
}

impl Journal {
    /// Open (creating its directory) the journal of `run_id` under `runs_dir`
    pub async fn open(runs_dir: &Path, run_id: Uuid) -> Result<Self> {
        let dir = runs_dir.join(run_id.to_string());
        fs::create_dir_all(&dir)
            .await
            .with_context(|| format!("Failed to create journal directory: {}", dir.display()))?;

        Ok(Self {
            path: dir.join(EVENTS_FILE),
        })
    }

    pub fn events_path(&self) -> &Path {
        &self.path
    }

    /// Write one event as a single line and flush it
    pub async fn append(&self, event: &Event) -> Result<()> {
        let mut line = serde_json::to_vec(event).context("Failed to encode journal event")?;
        line.push(b'\n');

        let mut file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(&self.path)
            .await
            .with_context(|| format!("Failed to open journal: {}", self.path.display()))?;
        file.write_all(&line)
            .await
            .with_context(|| format!("Failed to append to journal: {}", self.path.display()))?;
        file.flush().await?;

        Ok(())
    }

    /// Every recorded event, oldest first; empty if nothing was written yet
    pub async fn replay(&self) -> Result<Vec<Event>> {
        let content = match fs::read_to_string(&self.path).await {
            Ok(content) => content,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(Vec::new()),
            Err(e) => {
                return Err(e)
                    .with_context(|| format!("Failed to read journal: {}", self.path.display()))
            }
        };

        content
            .lines()
            .enumerate()
            .filter(|(_, line)| !line.trim().is_empty())
            .map(|(n, line)| {
                serde_json::from_str(line).with_context(|| {
                    format!("Corrupt journal line {} in {}", n + 1, self.path.display())
                })
            })
            .collect()
    }

    /// Replay and fold into run state; `None` for an empty journal
    pub async fn load_run(&self) -> Result<Option<Run>> {
        let events = self.replay().await?;
        Ok(Run::from_events(&events))
    }
}

/// Ids of every run directory under `runs_dir`
pub async fn list_runs(runs_dir: &Path) -> Result<Vec<Uuid>> {
    let mut entries = match fs::read_dir(runs_dir).await {
        Ok(entries) => entries,
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(Vec::new()),
        Err(e) => {
            return Err(e)
                .with_context(|| format!("Failed to list runs in {}", runs_dir.display()))
        }
    };

    let mut ids = Vec::new();
    while let Some(entry) = entries.next_entry().await? {
        let id = entry
            .file_name()
            .to_str()
            .and_then(|name| Uuid::parse_str(name).ok());
        if let Some(id) = id {
            if entry.file_type().await?.is_dir() {
                ids.push(id);
            }
        }
    }

    Ok(ids)
}

/// Every run under `runs_dir` with at least one event, most recent first
pub async fn load_runs(runs_dir: &Path) -> Result<Vec<Run>> {
    let mut runs = Vec::new();

    for id in list_runs(runs_dir).await? {
        if let Some(run) = Journal::open(runs_dir, id).await?.load_run().await? {
            runs.push(run);
        }
    }

    runs.sort_by_key(|run| std::cmp::Reverse(run.started_at));
    Ok(runs)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::EventType;
    use tempfile::TempDir;

    #[tokio::test]
    async fn test_event_append_and_replay() {
        let temp = TempDir::new().unwrap();
        let run_id = Uuid::new_v4();
        let journal = Journal::open(temp.path(), run_id).await.unwrap();

        journal
            .append(&Event::new(run_id, EventType::RunStarted, "Run started"))
            .await
            .unwrap();
        journal
            .append(
                &Event::new(run_id, EventType::CandidatePosted, "Posted")
                    .with_candidate("http://arxiv.org/abs/1")
                    .with_notification("1.1"),
            )
            .await
            .unwrap();

        let events = journal.replay().await.unwrap();
        assert_eq!(events.len(), 2);
        assert_eq!(events[0].event_type, EventType::RunStarted);
        assert_eq!(events[1].notification_ts.as_deref(), Some("1.1"));
        assert!(journal.events_path().starts_with(temp.path()));
    }

    #[tokio::test]
    async fn test_replay_missing_file_is_empty() {
        let temp = TempDir::new().unwrap();
        let journal = Journal::open(temp.path(), Uuid::new_v4()).await.unwrap();

        assert!(journal.replay().await.unwrap().is_empty());
        assert!(journal.load_run().await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_list_runs_ignores_foreign_entries() {
        let temp = TempDir::new().unwrap();
        let run_id = Uuid::new_v4();
        Journal::open(temp.path(), run_id).await.unwrap();
        std::fs::create_dir_all(temp.path().join("not-a-run")).unwrap();
        std::fs::write(temp.path().join("run.lock"), b"").unwrap();

        let runs = list_runs(temp.path()).await.unwrap();
        assert_eq!(runs, vec![run_id]);

        let missing = temp.path().join("missing");
        assert!(list_runs(&missing).await.unwrap().is_empty());
    }
}
