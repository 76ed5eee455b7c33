//! Scan run log: persisted timeline of every action taken during a run.
//!
//! Each run produces one JSON document at `{data_dir}/runs/{run_id}.json`
//! holding the final stats and the ordered event list.

use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tracing::info;

use crate::pipeline::ScanStats;

// ---------------------------------------------------------------------------
// RunLog
// ---------------------------------------------------------------------------

pub struct RunLog {
    pub run_id: String,
    pub started_at: DateTime<Utc>,
    events: Vec<RunEvent>,
    seq: u32,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct RunEvent {
    pub seq: u32,
    pub ts: DateTime<Utc>,
    #[serde(flatten)]
    pub kind: EventKind,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum EventKind {
    FetchSucceeded {
        url: String,
        attempts: u32,
        status: u16,
        bytes: usize,
    },
    FetchFailed {
        url: String,
        attempts: u32,
        error: String,
    },
    Parsed {
        url: String,
        profile_id: String,
        strategy: String,
    },
    ParseSkipped {
        url: String,
        reason: String,
    },
    DuplicateProfile {
        url: String,
        profile_id: String,
    },
    EnrichmentDegraded {
        profile_id: String,
        signal: String,
        error: String,
    },
    Scored {
        profile_id: String,
        score: Option<f64>,
    },
    StoreWrite {
        key: String,
        outcome: String,
    },
    GraphBuilt {
        profiles: usize,
        edges: usize,
    },
}

impl RunLog {
    pub fn new(run_id: impl Into<String>) -> Self {
        Self {
            run_id: run_id.into(),
            started_at: Utc::now(),
            events: Vec::new(),
            seq: 0,
        }
    }

    pub fn log(&mut self, kind: EventKind) {
        self.events.push(RunEvent {
            seq: self.seq,
            ts: Utc::now(),
            kind,
        });
        self.seq += 1;
    }

    pub fn events(&self) -> &[RunEvent] {
        &self.events
    }

    /// Serialize the run log with the final stats under `data_dir/runs/`.
    pub async fn save(&self, data_dir: &Path, stats: &ScanStats) -> Result<PathBuf> {
        let dir = data_dir.join("runs");
        tokio::fs::create_dir_all(&dir)
            .await
            .with_context(|| format!("Failed to create {}", dir.display()))?;

        let doc = SerializedRun {
            run_id: &self.run_id,
            started_at: self.started_at,
            finished_at: Utc::now(),
            stats,
            events: &self.events,
        };
        let path = dir.join(format!("{}.json", self.run_id));
        let json = serde_json::to_vec_pretty(&doc)?;
        tokio::fs::write(&path, json)
            .await
            .with_context(|| format!("Failed to write run log {}", path.display()))?;

        info!(run_id = %self.run_id, events = self.events.len(), path = %path.display(), "Run log saved");
        Ok(path)
    }
}

// ---------------------------------------------------------------------------
// Serialization wrapper
// ---------------------------------------------------------------------------

#[derive(Serialize)]
struct SerializedRun<'a> {
    run_id: &'a str,
    started_at: DateTime<Utc>,
    finished_at: DateTime<Utc>,
    stats: &'a ScanStats,
    events: &'a [RunEvent],
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn events_are_sequenced_and_saved() {
        let dir = tempfile::tempdir().unwrap();
        let mut log = RunLog::new("run-1");
        log.log(EventKind::ParseSkipped {
            url: "https://x.test/a".into(),
            reason: "no_strategy_matched".into(),
        });
        log.log(EventKind::GraphBuilt { profiles: 2, edges: 1 });
        assert_eq!(log.events()[1].seq, 1);

        let path = log.save(dir.path(), &ScanStats::default()).await.unwrap();
        assert_eq!(path, dir.path().join("runs/run-1.json"));

        let saved: serde_json::Value =
            serde_json::from_slice(&std::fs::read(&path).unwrap()).unwrap();
        assert_eq!(saved["events"][0]["type"], "parse_skipped");
        assert_eq!(saved["events"][1]["edges"], 1);
        assert_eq!(saved["run_id"], "run-1");
    }
}
