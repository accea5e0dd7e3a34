// crates/server/src/routes/jobs.rs
//! Job polling endpoints.
//!
//! - GET  /jobs/{job_id}/status - current state, progress and audio URL
//! - POST /jobs/{job_id}/cancel - cooperative cancel
//! - GET  /jobs/{job_id}/result - the finished WAV

use std::sync::Arc;

use axum::{
    extract::{Path, State},
    response::Response,
    routing::{get, post},
    Json, Router,
};
use chrono::{DateTime, Utc};
use serde::Serialize;
use ttsweb_server_jobs::{Job, JobId, JobStatus};
use utoipa::ToSchema;

use crate::error::{ApiError, ApiResult, ErrorResponse};
use crate::routes::wav_response;
use crate::state::AppState;

#[derive(Debug, Serialize, ToSchema)]
#[cfg_attr(test, derive(serde::Deserialize))]
pub struct JobStatusResponse {
    #[schema(value_type = String, format = Uuid)]
    pub job_id: JobId,
    pub status: JobStatus,
    pub progress: Option<f32>,
    pub error: Option<String>,
    /// Set only once the job is completed.
    pub audio_url: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl From<Job> for JobStatusResponse {
    fn from(job: Job) -> Self {
        let audio_url = (job.status == JobStatus::Completed)
            .then(|| format!("/api/v1/jobs/{}/result", job.id));
        Self {
            job_id: job.id,
            status: job.status,
            progress: job.progress,
            error: job.error,
            audio_url,
            created_at: job.created_at,
            updated_at: job.updated_at,
        }
    }
}

#[derive(Debug, Serialize, ToSchema)]
#[cfg_attr(test, derive(serde::Deserialize))]
pub struct CancelResponse {
    #[schema(value_type = String, format = Uuid)]
    pub job_id: JobId,
    pub status: JobStatus,
}

/// Unparseable ids are reported the same as unknown ones.
fn lookup(state: &AppState, raw: &str) -> ApiResult<Job> {
    raw.parse::<JobId>()
        .ok()
        .and_then(|id| state.store().get(id))
        .ok_or_else(|| ApiError::NotFound(raw.to_string()))
}

/// GET /api/v1/jobs/{job_id}/status
#[utoipa::path(
    get,
    path = "/api/v1/jobs/{job_id}/status",
    tag = "jobs",
    params(("job_id" = String, Path, description = "Job id")),
    responses(
        (status = 200, description = "Job state", body = JobStatusResponse),
        (status = 404, description = "Unknown job", body = ErrorResponse),
    )
)]
pub async fn job_status(
    State(state): State<Arc<AppState>>,
    Path(job_id): Path<String>,
) -> ApiResult<Json<JobStatusResponse>> {
    let job = lookup(&state, &job_id)?;
    Ok(Json(JobStatusResponse::from(job)))
}

/// POST /api/v1/jobs/{job_id}/cancel
#[utoipa::path(
    post,
    path = "/api/v1/jobs/{job_id}/cancel",
    tag = "jobs",
    params(("job_id" = String, Path, description = "Job id")),
    responses(
        (status = 200, description = "Job cancelled", body = CancelResponse),
        (status = 404, description = "Unknown job", body = ErrorResponse),
        (status = 409, description = "Job already terminal", body = ErrorResponse),
    )
)]
pub async fn cancel_job(
    State(state): State<Arc<AppState>>,
    Path(job_id): Path<String>,
) -> ApiResult<Json<CancelResponse>> {
    let job = lookup(&state, &job_id)?;
    if !state.store().cancel(job.id) {
        // Either terminal already, or it became terminal since the lookup.
        let status = state
            .store()
            .get(job.id)
            .map(|j| j.status)
            .unwrap_or(job.status);
        return Err(ApiError::Conflict(format!(
            "Job {} is already in terminal state: {status}",
            job.id
        )));
    }
    tracing::info!(job_id = %job.id, "Job cancel requested");
    Ok(Json(CancelResponse {
        job_id: job.id,
        status: JobStatus::Cancelled,
    }))
}

/// GET /api/v1/jobs/{job_id}/result
#[utoipa::path(
    get,
    path = "/api/v1/jobs/{job_id}/result",
    tag = "jobs",
    params(("job_id" = String, Path, description = "Job id")),
    responses(
        (status = 200, description = "WAV audio", content_type = "audio/wav"),
        (status = 404, description = "Unknown job", body = ErrorResponse),
        (status = 409, description = "Job not completed", body = ErrorResponse),
        (status = 500, description = "Completed job has no audio", body = ErrorResponse),
    )
)]
pub async fn job_result(
    State(state): State<Arc<AppState>>,
    Path(job_id): Path<String>,
) -> ApiResult<Response> {
    let job = lookup(&state, &job_id)?;
    match (job.status, job.result) {
        (JobStatus::Completed, Some(result)) => Ok(wav_response(
            result.audio,
            result.sample_rate,
            &format!("{}.wav", job.id),
        )),
        (JobStatus::Completed, None) => Err(ApiError::InvariantViolation(job.id)),
        (status, _) => Err(ApiError::Conflict(format!(
            "Job {} is not completed (status: {status})",
            job.id
        ))),
    }
}

/// Build the jobs router.
pub fn router() -> Router<Arc<AppState>> {
    Router::new()
        .route("/jobs/{job_id}/status", get(job_status))
        .route("/jobs/{job_id}/cancel", post(cancel_job))
        .route("/jobs/{job_id}/result", get(job_result))
}
