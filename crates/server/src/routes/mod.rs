// crates/server/src/routes/mod.rs
//! API route handlers.

pub mod health;
pub mod jobs;
pub mod meta;
pub mod metrics;
pub mod tokenizer;
pub mod tts;
pub mod ws;

use std::sync::Arc;

use axum::http::{header, HeaderName, StatusCode};
use axum::response::{IntoResponse, Response};
use axum::Router;
use bytes::Bytes;
use ttsweb_core::WAV_MIME;

use crate::openapi;
use crate::state::AppState;

/// Header carrying the sample rate of a WAV response body.
pub const X_SAMPLE_RATE: HeaderName = HeaderName::from_static("x-sample-rate");

/// Headroom on top of the audio limit for multipart framing and form fields.
pub const MULTIPART_OVERHEAD: usize = 1024 * 1024;

/// Create the combined router.
///
/// Routes:
/// - GET  /api/v1/health - Liveness with backend facts
/// - GET  /api/v1/ready - Readiness probe
/// - GET  /api/v1/speakers - Preset speakers
/// - GET  /api/v1/languages - Supported languages
/// - GET  /api/v1/models - Model variants and load state
/// - POST /api/v1/tts/custom-voice - Queue a preset-voice job
/// - POST /api/v1/tts/voice-design - Queue a described-voice job
/// - POST /api/v1/tts/voice-clone - Queue a reference-clone job (multipart)
/// - POST /api/v1/tts/voice-design-clone - Queue a design-then-clone job
/// - GET  /api/v1/jobs/{job_id}/status - Poll a job
/// - POST /api/v1/jobs/{job_id}/cancel - Cancel a job
/// - GET  /api/v1/jobs/{job_id}/result - Download the WAV result
/// - POST /api/v1/tokenizer/encode - Audio to tokens (multipart)
/// - POST /api/v1/tokenizer/decode - Tokens to audio
/// - GET  /api/v1/ws/tts - Streaming generation over WebSocket
/// - GET  /api/openapi.json - OpenAPI document
/// - GET  /metrics - Prometheus metrics
pub fn api_routes(state: Arc<AppState>) -> Router {
    let upload_limit = state.settings.max_audio_upload_bytes() + MULTIPART_OVERHEAD;
    Router::new()
        .nest("/api/v1", health::router())
        .nest("/api/v1", meta::router())
        .nest("/api/v1", tts::router(upload_limit))
        .nest("/api/v1", jobs::router())
        .nest("/api/v1", tokenizer::router(upload_limit))
        .nest("/api/v1", ws::router())
        .nest("/api", openapi::router())
        .merge(metrics::router())
        .with_state(state)
}

/// A WAV body with its sample rate and a download filename.
pub(crate) fn wav_response(audio: Bytes, sample_rate: u32, filename: &str) -> Response {
    (
        StatusCode::OK,
        [
            (header::CONTENT_TYPE, WAV_MIME.to_string()),
            (X_SAMPLE_RATE, sample_rate.to_string()),
            (
                header::CONTENT_DISPOSITION,
                format!("attachment; filename={filename}"),
            ),
        ],
        audio,
    )
        .into_response()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::Settings;

    #[tokio::test]
    async fn test_api_routes_creation() {
        let state = AppState::with_mock_backend(Settings::default());
        let _router = api_routes(state);
    }

    #[test]
    fn test_wav_response_headers() {
        let response = wav_response(Bytes::from_static(b"RIFF"), 24_000, "abc.wav");
        let headers = response.headers();
        assert_eq!(headers[header::CONTENT_TYPE], "audio/wav");
        assert_eq!(headers[X_SAMPLE_RATE], "24000");
        assert_eq!(
            headers[header::CONTENT_DISPOSITION],
            "attachment; filename=abc.wav"
        );
    }
}
