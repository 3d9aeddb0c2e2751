//! Task records: the persisted view of one submitted query.

use super::controller::FinalAnswer;
use super::progress::ProgressEvent;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::io;
use std::path::{Path, PathBuf};
use uuid::Uuid;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TaskStatus {
    Running,
    Completed,
    Error,
    Cancelled,
}

impl TaskStatus {
    pub fn is_finished(&self) -> bool {
        !matches!(self, TaskStatus::Running)
    }
}

/// One query's lifecycle, event history, and result.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TaskRecord {
    pub request_id: Uuid,
    pub query: String,
    pub budget: u64,
    pub max_bad_attempts: u32,
    pub status: TaskStatus,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    pub events: Vec<ProgressEvent>,
    pub final_answer: Option<FinalAnswer>,
    pub error: Option<String>,
}

impl TaskRecord {
    pub fn new(request_id: Uuid, query: impl Into<String>, budget: u64, max_bad_attempts: u32) -> Self {
        let now = Utc::now();
        Self {
            request_id,
            query: query.into(),
            budget,
            max_bad_attempts,
            status: TaskStatus::Running,
            created_at: now,
            updated_at: now,
            events: Vec::new(),
            final_answer: None,
            error: None,
        }
    }

    pub fn complete(&mut self, answer: FinalAnswer) {
        self.status = TaskStatus::Completed;
        self.final_answer = Some(answer);
        self.updated_at = Utc::now();
    }

    pub fn fail(&mut self, error: impl Into<String>) {
        self.status = TaskStatus::Error;
        self.error = Some(error.into());
        self.updated_at = Utc::now();
    }

    pub fn cancel(&mut self) {
        self.status = TaskStatus::Cancelled;
        self.error = Some("cancelled".into());
        self.updated_at = Utc::now();
    }

    fn path(base_dir: &Path, request_id: &Uuid) -> PathBuf {
        base_dir.join("tasks").join(format!("{request_id}.json"))
    }

    /// Persist to `<base_dir>/tasks/{request_id}.json`.
    pub fn save(&self, base_dir: &Path) -> Result<(), io::Error> {
        let data = serde_json::to_string_pretty(self).map_err(io::Error::other)?;
        atomic_write(&Self::path(base_dir, &self.request_id), data.as_bytes())
    }

    /// Load a saved record. `Ok(None)` when nothing was saved under that id.
    pub fn load(base_dir: &Path, request_id: &Uuid) -> Result<Option<Self>, io::Error> {
        let path = Self::path(base_dir, request_id);
        if !path.exists() {
            return Ok(None);
        }
        let data = std::fs::read_to_string(&path)?;
        serde_json::from_str(&data)
            .map(Some)
            .map_err(|e| io::Error::new(io::ErrorKind::InvalidData, e))
    }
}

/// Write to a `.tmp` sibling, then rename over the target.
fn atomic_write(path: &Path, data: &[u8]) -> io::Result<()> {
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent)?;
    }
    let tmp = path.with_extension("tmp");
    std::fs::write(&tmp, data)?;
    std::fs::rename(&tmp, path)?;
    Ok(())
}
