//! Video Upload Routes

use std::sync::Arc;

use axum::{
    body::Body,
    extract::{Query, State},
    http::{header, HeaderMap, StatusCode},
    Json,
};
use jobs::JobError;
use serde::Deserialize;
use video_sampler::VideoSource;

use crate::error::ApiError;
use crate::routes::analyses::JobSummary;
use crate::AppState;

/// Query parameters for the upload endpoint
#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UploadQuery {
    /// Original client-side file name
    pub file_name: Option<String>,
    pub uploaded_by: Option<String>,
}

fn is_video_content(headers: &HeaderMap) -> bool {
    match headers.get(header::CONTENT_TYPE).and_then(|v| v.to_str().ok()) {
        None => true,
        Some(content_type) => {
            content_type.starts_with("video/") || content_type.starts_with("application/octet-stream")
        }
    }
}

fn declared_length(headers: &HeaderMap) -> Option<u64> {
    headers
        .get(header::CONTENT_LENGTH)
        .and_then(|v| v.to_str().ok())
        .and_then(|v| v.parse().ok())
}

/// Stream a raw video body to disk and create its job
pub async fn upload<V: VideoSource>(
    State(state): State<Arc<AppState<V>>>,
    Query(params): Query<UploadQuery>,
    headers: HeaderMap,
    body: Body,
) -> Result<(StatusCode, Json<JobSummary>), ApiError> {
    if !is_video_content(&headers) {
        return Err(ApiError::BadRequest("Only video files are allowed".into()));
    }

    let limit = state.max_upload_bytes;
    if declared_length(&headers).is_some_and(|len| len > limit) {
        return Err(JobError::UploadTooLarge(limit).into());
    }

    let file_name = params.file_name.unwrap_or_default();
    let job = state
        .orchestrator
        .store_upload(&file_name, body.into_data_stream(), limit, params.uploaded_by)
        .await?;

    Ok((StatusCode::CREATED, Json(JobSummary::from(&job))))
}
