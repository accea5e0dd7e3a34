// crates/server/src/routes/meta.rs
//! Static catalog and model metadata.

use std::sync::Arc;

use axum::{extract::State, routing::get, Json, Router};
use serde::Serialize;
use ttsweb_core::catalog::{LanguageInfo, SpeakerInfo, LANGUAGES, SPEAKERS};
use ttsweb_core::ModelVariant;
use utoipa::ToSchema;

use crate::state::AppState;

#[derive(Debug, Serialize, ToSchema)]
#[cfg_attr(test, derive(serde::Deserialize))]
pub struct ModelInfo {
    /// Variant key: `custom_voice`, `voice_design`, `base` or `tokenizer`.
    pub id: String,
    /// Short model name, e.g. `Qwen3-TTS-12Hz-1.7B-Base`.
    pub name: String,
    /// Full hub id the backend loads.
    pub model_id: String,
    pub description: String,
    pub loaded: bool,
}

fn describe(variant: ModelVariant) -> &'static str {
    match variant {
        ModelVariant::CustomVoice => "Preset speaker voices with optional instruction control.",
        ModelVariant::VoiceDesign => "Natural-language voice design: describe and generate.",
        ModelVariant::Base => "Voice cloning from reference audio.",
        ModelVariant::Tokenizer => "Audio tokenizer for encode/decode operations.",
    }
}

/// GET /api/v1/speakers
#[utoipa::path(get, path = "/api/v1/speakers", tag = "meta",
    responses((status = 200, description = "Preset speakers", body = [SpeakerInfo])))]
pub async fn list_speakers() -> Json<&'static [SpeakerInfo]> {
    Json(SPEAKERS)
}

/// GET /api/v1/languages
#[utoipa::path(get, path = "/api/v1/languages", tag = "meta",
    responses((status = 200, description = "Supported languages", body = [LanguageInfo])))]
pub async fn list_languages() -> Json<&'static [LanguageInfo]> {
    Json(LANGUAGES)
}

/// GET /api/v1/models
#[utoipa::path(get, path = "/api/v1/models", tag = "meta",
    responses((status = 200, description = "Model variants", body = [ModelInfo])))]
pub async fn list_models(State(state): State<Arc<AppState>>) -> Json<Vec<ModelInfo>> {
    let info = state.backend().info();
    let models = ModelVariant::ALL
        .iter()
        .map(|&variant| {
            let model_id = state.settings.model_id(variant).to_string();
            ModelInfo {
                id: variant.to_string(),
                name: model_id.rsplit('/').next().unwrap_or(&model_id).to_string(),
                description: describe(variant).to_string(),
                loaded: info.is_loaded(variant),
                model_id,
            }
        })
        .collect();
    Json(models)
}

pub fn router() -> Router<Arc<AppState>> {
    Router::new()
        .route("/speakers", get(list_speakers))
        .route("/languages", get(list_languages))
        .route("/models", get(list_models))
}
