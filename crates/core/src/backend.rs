// crates/core/src/backend.rs
//! Contract between the service and a speech-synthesis backend.
//!
//! Every method is blocking and may take seconds on an accelerator. Callers
//! run them through `tokio::task::spawn_blocking` so the scheduler stays free.

use std::path::Path;

use serde::Serialize;

use crate::audio::Waveform;
use crate::error::BackendError;

/// Model variants a backend may load.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ModelVariant {
    CustomVoice,
    VoiceDesign,
    Base,
    Tokenizer,
}

impl ModelVariant {
    pub const ALL: [ModelVariant; 4] = [
        ModelVariant::CustomVoice,
        ModelVariant::VoiceDesign,
        ModelVariant::Base,
        ModelVariant::Tokenizer,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            ModelVariant::CustomVoice => "custom_voice",
            ModelVariant::VoiceDesign => "voice_design",
            ModelVariant::Base => "base",
            ModelVariant::Tokenizer => "tokenizer",
        }
    }
}

impl std::fmt::Display for ModelVariant {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Runtime facts about a backend, reported by the health and models endpoints.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BackendInfo {
    pub mock_mode: bool,
    pub gpu_available: bool,
    pub loaded: Vec<ModelVariant>,
}

impl BackendInfo {
    pub fn is_loaded(&self, variant: ModelVariant) -> bool {
        self.mock_mode || self.loaded.contains(&variant)
    }

    /// Names reported as `models_loaded` in the health response.
    pub fn loaded_names(&self) -> Vec<String> {
        if self.mock_mode {
            return vec!["mock".to_string()];
        }
        let mut names: Vec<String> = self.loaded.iter().map(|v| v.to_string()).collect();
        names.sort();
        names
    }
}

/// Reusable speaker conditioning derived from a reference utterance.
///
/// Opaque to the service; only the backend that produced it interprets it.
#[derive(Debug, Clone, PartialEq)]
pub struct VoiceClonePrompt {
    pub speaker_embedding: Vec<f32>,
    pub reference_text: Option<String>,
    pub sample_rate: u32,
}

/// Arguments for a reference-audio clone call.
#[derive(Debug, Clone, Copy)]
pub struct CloneInput<'a> {
    pub text: &'a str,
    pub language: &'a str,
    pub reference_audio: &'a Path,
    pub reference_text: Option<&'a str>,
    pub x_vector_only_mode: bool,
    pub instruct: Option<&'a str>,
}

/// A speech-synthesis engine.
pub trait SpeechBackend: Send + Sync {
    /// Synthesize `text` with a named preset speaker.
    fn generate_custom_voice(
        &self,
        text: &str,
        language: &str,
        speaker: &str,
        instruct: Option<&str>,
    ) -> Result<Waveform, BackendError>;

    /// Synthesize `text` with a voice described in natural language.
    fn generate_voice_design(
        &self,
        text: &str,
        language: &str,
        instruct: &str,
    ) -> Result<Waveform, BackendError>;

    /// Synthesize `text` in the voice of a reference recording on disk.
    fn generate_voice_clone(&self, input: CloneInput<'_>) -> Result<Waveform, BackendError>;

    /// Derive a reusable clone prompt from a reference utterance.
    fn create_voice_clone_prompt(
        &self,
        reference: &Waveform,
        reference_text: &str,
    ) -> Result<VoiceClonePrompt, BackendError>;

    /// Synthesize each text with a clone prompt. Returns one waveform per
    /// text, in input order.
    fn generate_with_prompt(
        &self,
        texts: &[String],
        languages: &[String],
        prompt: &VoiceClonePrompt,
    ) -> Result<Vec<Waveform>, BackendError>;

    /// Encode a waveform into speech-tokenizer ids.
    fn encode_tokens(&self, audio: &Waveform) -> Result<Vec<i64>, BackendError>;

    /// Decode speech-tokenizer ids back into a waveform.
    fn decode_tokens(&self, tokens: &[i64]) -> Result<Waveform, BackendError>;

    fn info(&self) -> BackendInfo;
}
