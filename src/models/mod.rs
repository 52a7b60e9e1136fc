use crate::error::ImportError;
use bytes::Bytes;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::PathBuf;
use uuid::Uuid;

/// Lifecycle of an upload. Transitions are forward-only:
/// `Pending -> Staging -> Importing -> { Complete | Failed }`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum UploadState {
    Pending,
    Staging,
    Importing,
    Complete,
    Failed,
}

impl UploadState {
    pub fn is_terminal(&self) -> bool {
        matches!(self, UploadState::Complete | UploadState::Failed)
    }

    fn rank(self) -> u8 {
        match self {
            UploadState::Pending => 0,
            UploadState::Staging => 1,
            UploadState::Importing => 2,
            UploadState::Complete | UploadState::Failed => 3,
        }
    }
}

/// One upload submission and its aggregated per-layer outcomes.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct UploadRecord {
    pub id: Uuid,
    pub owner: String,
    pub name: String,
    pub state: UploadState,
    pub created_at: DateTime<Utc>,
    pub finished_at: Option<DateTime<Utc>>,
    pub layers: Vec<LayerOutcome>,
}

impl UploadRecord {
    pub fn new(owner: &str, name: &str) -> Self {
        Self {
            id: Uuid::new_v4(),
            owner: owner.to_string(),
            name: name.to_string(),
            state: UploadState::Pending,
            created_at: Utc::now(),
            finished_at: None,
            layers: Vec::new(),
        }
    }

    /// Moves the record to `next`. Backward (or sideways) transitions are
    /// rejected; terminal states also stamp `finished_at`.
    pub fn advance(&mut self, next: UploadState) -> Result<(), ImportError> {
        if next.rank() <= self.state.rank() {
            return Err(ImportError::State {
                from: self.state,
                to: next,
            });
        }
        self.state = next;
        if next.is_terminal() {
            self.finished_at = Some(Utc::now());
        }
        Ok(())
    }
}

/// An archive member extracted into a staging area. Valid only for the
/// lifetime of the staging area that produced it.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StagedFile {
    pub source_name: String,
    pub local_path: PathBuf,
    pub size_bytes: u64,
}

/// Identity of one import job: the owning upload plus the layer index.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct JobKey {
    pub upload_id: Uuid,
    pub layer: usize,
}

impl fmt::Display for JobKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.upload_id, self.layer)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum JobStatus {
    Queued,
    Running,
    Succeeded,
    Failed,
}

/// One unit of work handed to the job queue: a staged file plus the opaque
/// per-layer configuration blob for the importer.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ImportJob {
    pub key: JobKey,
    pub source_name: String,
    pub path: PathBuf,
    pub configuration: serde_json::Value,
    pub attempt: u32,
}

/// Terminal result of one layer, written back onto the upload record.
/// `detail` carries the importer's result blob for succeeded layers,
/// `error` the normalized failure message otherwise.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LayerOutcome {
    pub layer: usize,
    pub source_name: String,
    pub status: JobStatus,
    pub detail: Option<serde_json::Value>,
    pub error: Option<String>,
}

/// A submitted archive body as received from the upload boundary.
#[derive(Debug, Clone)]
pub struct ArchivePayload {
    pub file_name: String,
    pub bytes: Bytes,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_states_advance_forward_only() {
        let mut record = UploadRecord::new("alice", "parcels.zip");
        assert_eq!(record.state, UploadState::Pending);

        record.advance(UploadState::Staging).unwrap();
        record.advance(UploadState::Importing).unwrap();
        record.advance(UploadState::Complete).unwrap();
        assert!(record.finished_at.is_some());

        // Terminal state cannot move again, not even to another terminal.
        assert!(record.advance(UploadState::Failed).is_err());
    }

    #[test]
    fn test_no_backward_transitions() {
        let mut record = UploadRecord::new("alice", "parcels.zip");
        record.advance(UploadState::Importing).unwrap();
        assert!(record.advance(UploadState::Staging).is_err());
        assert!(record.advance(UploadState::Importing).is_err());
        assert_eq!(record.state, UploadState::Importing);
    }

    #[test]
    fn test_failed_reachable_from_staging() {
        let mut record = UploadRecord::new("bob", "roads.zip");
        record.advance(UploadState::Staging).unwrap();
        record.advance(UploadState::Failed).unwrap();
        assert!(record.state.is_terminal());
        assert!(record.finished_at.is_some());
    }

    #[test]
    fn test_job_key_display() {
        let key = JobKey {
            upload_id: Uuid::nil(),
            layer: 3,
        };
        assert_eq!(
            key.to_string(),
            "00000000-0000-0000-0000-000000000000:3"
        );
    }
}
