// crates/server/src/openapi.rs
//! OpenAPI document for the REST surface, served at `/api/openapi.json`.

use std::sync::Arc;

use axum::{routing::get, Json, Router};
use utoipa::OpenApi;

use crate::error::ErrorResponse;
use crate::routes::{health, jobs, meta, tokenizer, tts};
use crate::state::AppState;

#[derive(OpenApi)]
#[openapi(
    info(title = "ttsweb", description = "Asynchronous speech synthesis jobs"),
    paths(
        health::health_check,
        health::ready,
        meta::list_speakers,
        meta::list_languages,
        meta::list_models,
        tts::custom_voice,
        tts::voice_design,
        tts::voice_clone,
        tts::voice_design_clone,
        jobs::job_status,
        jobs::cancel_job,
        jobs::job_result,
        tokenizer::encode,
        tokenizer::decode,
    ),
    components(schemas(
        ErrorResponse,
        ttsweb_server_jobs::JobStatus,
        ttsweb_core::GenerationMode,
    )),
    tags(
        (name = "tts", description = "Job-creating generation endpoints"),
        (name = "jobs", description = "Job polling, cancel and result download"),
        (name = "tokenizer", description = "Speech tokenizer"),
        (name = "meta", description = "Speakers, languages and models"),
        (name = "health", description = "Liveness and readiness"),
    )
)]
pub struct ApiDoc;

async fn openapi_json() -> Json<utoipa::openapi::OpenApi> {
    Json(ApiDoc::openapi())
}

pub fn router() -> Router<Arc<AppState>> {
    Router::new().route("/openapi.json", get(openapi_json))
}
