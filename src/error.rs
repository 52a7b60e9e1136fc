use crate::models::{JobKey, UploadState};
use thiserror::Error;
use uuid::Uuid;

/// Failure taxonomy for the import pipeline.
///
/// Submission-level failures (`Resource`, `ArchivePath`, `Input`) abort the
/// whole submission and propagate to the caller. Per-layer import failures
/// are not represented here: they are recorded on the upload record's layer
/// outcomes and fold the record into `Failed`.
#[derive(Error, Debug)]
pub enum ImportError {
    #[error("Resource error: {0}")]
    Resource(String),

    #[error("Archive member escapes the staging directory: {member}")]
    ArchivePath { member: String },

    #[error("Bad submission: {0}")]
    Input(String),

    #[error("Job already in flight: {0}")]
    DuplicateJob(JobKey),

    #[error("Upload not found: {0}")]
    NotFound(Uuid),

    #[error("Invalid upload state transition: {from:?} -> {to:?}")]
    State { from: UploadState, to: UploadState },

    #[error("Internal error: {0}")]
    Internal(String),
}
