//! Job record

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use video_analysis::AnalysisResult;

/// Job lifecycle state
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum JobStatus {
    Uploaded,
    Processing,
    Completed,
    Failed,
}

impl JobStatus {
    pub fn is_terminal(&self) -> bool {
        matches!(self, JobStatus::Completed | JobStatus::Failed)
    }
}

/// Persisted state of one uploaded video and its analysis
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct JobRecord {
    pub video_id: String,
    /// Name the file was uploaded under
    pub file_name: String,
    /// Name on disk (`<videoId><ext>`)
    pub stored_file_name: String,
    pub video_path: String,
    /// Bytes
    pub size: u64,
    pub status: JobStatus,
    /// 0-100
    pub progress: u8,
    #[serde(default)]
    pub analysis_level: Option<u8>,
    #[serde(default)]
    pub uploaded_by: Option<String>,
    pub created_at: DateTime<Utc>,
    #[serde(default)]
    pub started_at: Option<DateTime<Utc>>,
    #[serde(default)]
    pub completed_at: Option<DateTime<Utc>>,
    #[serde(default)]
    pub updated_at: Option<DateTime<Utc>>,
    #[serde(default)]
    pub error: Option<String>,
    #[serde(default)]
    pub result: Option<AnalysisResult>,
}

impl JobRecord {
    /// A freshly uploaded video awaiting analysis
    pub fn uploaded(
        video_id: impl Into<String>,
        file_name: impl Into<String>,
        stored_file_name: impl Into<String>,
        video_path: impl Into<String>,
        size: u64,
    ) -> Self {
        Self {
            video_id: video_id.into(),
            file_name: file_name.into(),
            stored_file_name: stored_file_name.into(),
            video_path: video_path.into(),
            size,
            status: JobStatus::Uploaded,
            progress: 0,
            analysis_level: None,
            uploaded_by: None,
            created_at: Utc::now(),
            started_at: None,
            completed_at: None,
            updated_at: None,
            error: None,
            result: None,
        }
    }
}
