// crates/server/src/routes/tokenizer.rs
//! Speech-tokenizer endpoints. These run inline, not as jobs.

use std::sync::Arc;

use axum::{
    extract::{rejection::JsonRejection, DefaultBodyLimit, Multipart, State},
    response::Response,
    routing::post,
    Json, Router,
};
use bytes::Bytes;
use serde::{Deserialize, Serialize};
use ttsweb_core::audio::{decode_wav, encode_wav};
use ttsweb_core::request::check_reference_audio;
use utoipa::ToSchema;

use crate::error::{ApiError, ApiResult, ErrorResponse};
use crate::orchestrator::GenerationError;
use crate::routes::wav_response;
use crate::state::AppState;

#[derive(Debug, Serialize, ToSchema)]
#[cfg_attr(test, derive(Deserialize))]
pub struct EncodeResponse {
    pub tokens: Vec<i64>,
    pub count: usize,
}

#[derive(Debug, Deserialize, ToSchema)]
pub struct DecodeRequest {
    pub tokens: Vec<i64>,
}

async fn run_blocking<T, F>(f: F) -> Result<T, GenerationError>
where
    F: FnOnce() -> Result<T, GenerationError> + Send + 'static,
    T: Send + 'static,
{
    tokio::task::spawn_blocking(f)
        .await
        .map_err(|e| GenerationError::Worker(e.to_string()))?
}

/// POST /api/v1/tokenizer/encode
#[utoipa::path(
    post,
    path = "/api/v1/tokenizer/encode",
    tag = "tokenizer",
    request_body(content_type = "multipart/form-data", description = "WAV file in the `audio` field"),
    responses(
        (status = 200, description = "Token ids", body = EncodeResponse),
        (status = 400, description = "Missing, empty or unreadable audio", body = ErrorResponse),
        (status = 413, description = "Audio too large", body = ErrorResponse),
    )
)]
pub async fn encode(
    State(state): State<Arc<AppState>>,
    mut multipart: Multipart,
) -> ApiResult<Json<EncodeResponse>> {
    let mut audio: Option<Bytes> = None;
    while let Some(field) = multipart.next_field().await? {
        if field.name() == Some("audio") {
            audio = Some(field.bytes().await?);
        }
    }
    let audio = audio.ok_or_else(|| ApiError::BadRequest("audio file is required".into()))?;
    check_reference_audio(&audio, state.orchestrator.limits())?;

    let backend = Arc::clone(state.backend());
    let tokens = run_blocking(move || {
        let wave = decode_wav(&audio)?;
        Ok(backend.encode_tokens(&wave)?)
    })
    .await?;

    Ok(Json(EncodeResponse {
        count: tokens.len(),
        tokens,
    }))
}

/// POST /api/v1/tokenizer/decode
#[utoipa::path(
    post,
    path = "/api/v1/tokenizer/decode",
    tag = "tokenizer",
    request_body = DecodeRequest,
    responses(
        (status = 200, description = "WAV audio", content_type = "audio/wav"),
        (status = 400, description = "Empty token list", body = ErrorResponse),
    )
)]
pub async fn decode(
    State(state): State<Arc<AppState>>,
    body: Result<Json<DecodeRequest>, JsonRejection>,
) -> ApiResult<Response> {
    let Json(request) = body?;
    if request.tokens.is_empty() {
        return Err(ApiError::BadRequest("tokens must not be empty".into()));
    }

    let backend = Arc::clone(state.backend());
    let (audio, sample_rate) = run_blocking(move || {
        let wave = backend.decode_tokens(&request.tokens)?;
        let audio = encode_wav(&wave)?;
        Ok((audio, wave.sample_rate))
    })
    .await?;

    Ok(wav_response(Bytes::from(audio), sample_rate, "decoded.wav"))
}

pub fn router(upload_limit: usize) -> Router<Arc<AppState>> {
    Router::new()
        .route(
            "/tokenizer/encode",
            post(encode).layer(DefaultBodyLimit::max(upload_limit)),
        )
        .route("/tokenizer/decode", post(decode))
}
