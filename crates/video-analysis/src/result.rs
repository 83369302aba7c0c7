//! Final analysis result

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::aggregator::{SessionMetrics, TimelineEntry};
use crate::segmenter::DrowsinessEvent;

/// Status carried by a finished result
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ResultStatus {
    #[default]
    Completed,
}

/// Outcome of analysing one video. Immutable once produced.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AnalysisResult {
    /// Video/job id
    pub id: String,
    /// Video duration in seconds
    pub duration: f64,
    /// Estimated native frame count
    pub total_frames: u64,
    /// Sampled frames in which a face was analysed
    pub processed_frames: u64,
    pub events: Vec<DrowsinessEvent>,
    pub timeline: Vec<TimelineEntry>,
    pub metrics: SessionMetrics,
    pub status: ResultStatus,
    pub completed_at: DateTime<Utc>,
}
