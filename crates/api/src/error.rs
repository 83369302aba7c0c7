//! HTTP error mapping

use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use jobs::JobError;
use serde::Serialize;
use thiserror::Error;
use tracing::error;

/// Errors surfaced to HTTP clients
#[derive(Debug, Error)]
pub enum ApiError {
    #[error("{0}")]
    BadRequest(String),

    #[error(transparent)]
    Job(#[from] JobError),
}

#[derive(Debug, Serialize)]
struct ErrorBody {
    error: String,
}

impl ApiError {
    pub fn status_code(&self) -> StatusCode {
        match self {
            ApiError::BadRequest(_) => StatusCode::BAD_REQUEST,
            ApiError::Job(e) => match e {
                JobError::NotFound(_) => StatusCode::NOT_FOUND,
                JobError::VideoMissing(_) => StatusCode::GONE,
                JobError::Conflict(_) | JobError::NotProcessing(_) => StatusCode::CONFLICT,
                JobError::InvalidAnalysisLevel(_) | JobError::EmptyUpload => StatusCode::BAD_REQUEST,
                JobError::UploadTooLarge(_) => StatusCode::PAYLOAD_TOO_LARGE,
                JobError::Upload(_) | JobError::Storage(_) | JobError::Worker(_) => {
                    StatusCode::INTERNAL_SERVER_ERROR
                }
            },
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = self.status_code();
        if status.is_server_error() {
            error!("Request failed: {}", self);
        }
        (status, Json(ErrorBody { error: self.to_string() })).into_response()
    }
}
