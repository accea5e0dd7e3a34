// crates/server/src/routes/tts.rs
//! Job-creating generation endpoints.
//!
//! Each handler validates its input, creates a `Queued` job and returns
//! 202 immediately; the audio is fetched later from `/jobs/{job_id}/result`.

use std::collections::HashMap;
use std::sync::Arc;

use axum::{
    extract::{rejection::JsonRejection, DefaultBodyLimit, Multipart, State},
    http::StatusCode,
    routing::post,
    Json, Router,
};
use bytes::Bytes;
use chrono::{DateTime, Utc};
use serde::Serialize;
use ttsweb_core::request::DEFAULT_LANGUAGE;
use ttsweb_core::{
    CustomVoiceParams, GenerationRequest, VoiceCloneFields, VoiceDesignCloneParams,
    VoiceDesignParams,
};
use ttsweb_server_jobs::{Job, JobId, JobStatus};
use utoipa::ToSchema;

use crate::error::{ApiError, ApiResult, ErrorResponse};
use crate::state::AppState;

/// Body of every 202 response.
#[derive(Debug, Serialize, ToSchema)]
#[cfg_attr(test, derive(serde::Deserialize))]
pub struct JobCreatedResponse {
    #[schema(value_type = String, format = Uuid)]
    pub job_id: JobId,
    pub status: JobStatus,
    pub created_at: DateTime<Utc>,
}

impl From<&Job> for JobCreatedResponse {
    fn from(job: &Job) -> Self {
        Self {
            job_id: job.id,
            status: job.status,
            created_at: job.created_at,
        }
    }
}

type Accepted = ApiResult<(StatusCode, Json<JobCreatedResponse>)>;

fn submit(state: &AppState, request: GenerationRequest) -> Accepted {
    let job = state.orchestrator.submit(request)?;
    Ok((StatusCode::ACCEPTED, Json(JobCreatedResponse::from(&job))))
}

/// POST /api/v1/tts/custom-voice
#[utoipa::path(
    post,
    path = "/api/v1/tts/custom-voice",
    tag = "tts",
    request_body = CustomVoiceParams,
    responses(
        (status = 202, description = "Job queued", body = JobCreatedResponse),
        (status = 400, description = "Invalid parameters", body = ErrorResponse),
    )
)]
pub async fn custom_voice(
    State(state): State<Arc<AppState>>,
    body: Result<Json<CustomVoiceParams>, JsonRejection>,
) -> Accepted {
    let Json(params) = body?;
    submit(&state, GenerationRequest::CustomVoice(params))
}

/// POST /api/v1/tts/voice-design
#[utoipa::path(
    post,
    path = "/api/v1/tts/voice-design",
    tag = "tts",
    request_body = VoiceDesignParams,
    responses(
        (status = 202, description = "Job queued", body = JobCreatedResponse),
        (status = 400, description = "Invalid parameters", body = ErrorResponse),
    )
)]
pub async fn voice_design(
    State(state): State<Arc<AppState>>,
    body: Result<Json<VoiceDesignParams>, JsonRejection>,
) -> Accepted {
    let Json(params) = body?;
    submit(&state, GenerationRequest::VoiceDesign(params))
}

/// POST /api/v1/tts/voice-design-clone
#[utoipa::path(
    post,
    path = "/api/v1/tts/voice-design-clone",
    tag = "tts",
    request_body = VoiceDesignCloneParams,
    responses(
        (status = 202, description = "Job queued", body = JobCreatedResponse),
        (status = 400, description = "Invalid parameters or mismatched lists", body = ErrorResponse),
    )
)]
pub async fn voice_design_clone(
    State(state): State<Arc<AppState>>,
    body: Result<Json<VoiceDesignCloneParams>, JsonRejection>,
) -> Accepted {
    let Json(params) = body?;
    submit(&state, GenerationRequest::VoiceDesignClone(params))
}

/// POST /api/v1/tts/voice-clone
///
/// Multipart form: an `audio` file plus `text`, `language`, `ref_text`,
/// `x_vector_only_mode`, `instruct` and `consent_acknowledged` fields.
#[utoipa::path(
    post,
    path = "/api/v1/tts/voice-clone",
    tag = "tts",
    request_body(content_type = "multipart/form-data", description = "Reference audio and clone fields"),
    responses(
        (status = 202, description = "Job queued", body = JobCreatedResponse),
        (status = 400, description = "Invalid parameters or empty audio", body = ErrorResponse),
        (status = 413, description = "Reference audio too large", body = ErrorResponse),
    )
)]
pub async fn voice_clone(State(state): State<Arc<AppState>>, mut multipart: Multipart) -> Accepted {
    let mut audio: Option<Bytes> = None;
    let mut form = HashMap::new();
    while let Some(field) = multipart.next_field().await? {
        let name = field.name().unwrap_or_default().to_string();
        if name == "audio" {
            audio = Some(field.bytes().await?);
        } else {
            form.insert(name, field.text().await?);
        }
    }

    let audio = audio.ok_or_else(|| ApiError::BadRequest("audio file is required".into()))?;
    let fields = clone_fields(form)?;
    submit(&state, GenerationRequest::VoiceClone(fields.with_audio(audio)))
}

fn clone_fields(mut form: HashMap<String, String>) -> Result<VoiceCloneFields, ApiError> {
    let text = form
        .remove("text")
        .ok_or_else(|| ApiError::BadRequest("text is required".into()))?;
    Ok(VoiceCloneFields {
        text,
        language: form
            .remove("language")
            .filter(|l| !l.trim().is_empty())
            .unwrap_or_else(|| DEFAULT_LANGUAGE.to_string()),
        ref_text: form.remove("ref_text").filter(|t| !t.is_empty()),
        x_vector_only_mode: form_bool("x_vector_only_mode", form.remove("x_vector_only_mode"), false)?,
        instruct: form.remove("instruct").filter(|t| !t.is_empty()),
        consent_acknowledged: form_bool(
            "consent_acknowledged",
            form.remove("consent_acknowledged"),
            true,
        )?,
    })
}

fn form_bool(name: &str, value: Option<String>, default: bool) -> Result<bool, ApiError> {
    let Some(value) = value else {
        return Ok(default);
    };
    match value.trim().to_ascii_lowercase().as_str() {
        "" => Ok(default),
        "true" | "1" | "yes" | "on" => Ok(true),
        "false" | "0" | "no" | "off" => Ok(false),
        _ => Err(ApiError::BadRequest(format!("{name} must be a boolean"))),
    }
}

/// Build the generation router. `upload_limit` bounds the multipart body.
pub fn router(upload_limit: usize) -> Router<Arc<AppState>> {
    Router::new()
        .route("/tts/custom-voice", post(custom_voice))
        .route("/tts/voice-design", post(voice_design))
        .route("/tts/voice-design-clone", post(voice_design_clone))
        .route(
            "/tts/voice-clone",
            post(voice_clone).layer(DefaultBodyLimit::max(upload_limit)),
        )
}
