//! Analysis Job Orchestration
//!
//! Owns the lifecycle of video analysis jobs:
//! `uploaded → processing → completed | failed`.

mod orchestrator;

pub use orchestrator::{JobOrchestrator, DEFAULT_ANALYSIS_LEVEL};

use storage::StorageError;
use thiserror::Error;

/// Job orchestration errors
#[derive(Debug, Error)]
pub enum JobError {
    #[error("Job not found: {0}")]
    NotFound(String),

    #[error("Video file for job {0} is no longer available, upload it again")]
    VideoMissing(String),

    #[error("Analysis already in progress for job {0}")]
    Conflict(String),

    #[error("Job {0} is not being analysed")]
    NotProcessing(String),

    #[error("Unsupported analysis level: {0}")]
    InvalidAnalysisLevel(u8),

    #[error("Failed to store upload: {0}")]
    Upload(String),

    #[error("No video file provided")]
    EmptyUpload,

    #[error("Upload exceeds the {0} byte limit")]
    UploadTooLarge(u64),

    #[error("Background task failed: {0}")]
    Worker(String),

    #[error(transparent)]
    Storage(#[from] StorageError),
}
