//! Analysis Job Routes

use std::sync::Arc;

use axum::{
    extract::{Path, State},
    http::StatusCode,
    Json,
};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use storage::{JobRecord, JobStatus};
use video_sampler::VideoSource;

use crate::error::ApiError;
use crate::AppState;

/// Request body for starting an analysis
#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StartRequest {
    #[serde(default)]
    pub video_id: String,
    pub analysis_level: Option<u8>,
}

/// Job as listed, without its result payload
#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct JobSummary {
    pub video_id: String,
    pub file_name: String,
    pub size: u64,
    pub status: JobStatus,
    pub progress: u8,
    pub analysis_level: Option<u8>,
    pub created_at: DateTime<Utc>,
    pub started_at: Option<DateTime<Utc>>,
    pub completed_at: Option<DateTime<Utc>>,
    pub error: Option<String>,
}

impl From<&JobRecord> for JobSummary {
    fn from(job: &JobRecord) -> Self {
        Self {
            video_id: job.video_id.clone(),
            file_name: job.file_name.clone(),
            size: job.size,
            status: job.status,
            progress: job.progress,
            analysis_level: job.analysis_level,
            created_at: job.created_at,
            started_at: job.started_at,
            completed_at: job.completed_at,
            error: job.error.clone(),
        }
    }
}

/// Response for the listing endpoint
#[derive(Debug, Serialize)]
pub struct JobListResponse {
    pub data: Vec<JobSummary>,
    pub count: usize,
}

/// Cancellation acknowledgement
#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CancelResponse {
    pub video_id: String,
    pub status: &'static str,
}

/// Start (or restart) the analysis of an uploaded video
pub async fn start<V: VideoSource>(
    State(state): State<Arc<AppState<V>>>,
    Json(request): Json<StartRequest>,
) -> Result<(StatusCode, Json<JobSummary>), ApiError> {
    if request.video_id.trim().is_empty() {
        return Err(ApiError::BadRequest("videoId is required".into()));
    }
    let job = state
        .orchestrator
        .start(&request.video_id, request.analysis_level)
        .await?;
    Ok((StatusCode::ACCEPTED, Json(JobSummary::from(&job))))
}

/// List all jobs, newest first
pub async fn list<V: VideoSource>(State(state): State<Arc<AppState<V>>>) -> Result<Json<JobListResponse>, ApiError> {
    let data: Vec<JobSummary> = state.orchestrator.list()?.iter().map(JobSummary::from).collect();
    Ok(Json(JobListResponse {
        count: data.len(),
        data,
    }))
}

/// Full job record, including the result once completed
pub async fn get<V: VideoSource>(
    State(state): State<Arc<AppState<V>>>,
    Path(video_id): Path<String>,
) -> Result<Json<JobRecord>, ApiError> {
    Ok(Json(state.orchestrator.status(&video_id)?))
}

/// Request cancellation of a running analysis
pub async fn cancel<V: VideoSource>(
    State(state): State<Arc<AppState<V>>>,
    Path(video_id): Path<String>,
) -> Result<(StatusCode, Json<CancelResponse>), ApiError> {
    state.orchestrator.cancel(&video_id)?;
    Ok((
        StatusCode::ACCEPTED,
        Json(CancelResponse {
            video_id,
            status: "cancelling",
        }),
    ))
}
