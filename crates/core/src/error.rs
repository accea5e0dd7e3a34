// crates/core/src/error.rs
use thiserror::Error;

/// Errors raised while validating a generation request, before any job exists.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ValidationError {
    #[error("{field} must not be empty")]
    Empty { field: &'static str },

    #[error("Text exceeds {limit} character limit")]
    TextTooLong { field: &'static str, limit: usize },

    #[error("{field} exceeds {limit} character limit")]
    FieldTooLong { field: &'static str, limit: usize },

    #[error("{field} must contain between 1 and {max} entries")]
    ListLength { field: &'static str, max: usize },

    #[error("clone_texts and clone_languages must have the same length")]
    MismatchedLists,

    #[error("Audio file is empty")]
    EmptyAudio,

    #[error("Audio file exceeds {limit_mb}MB limit")]
    AudioTooLarge { limit_mb: usize },

    #[error("consent_acknowledged must be true to clone a voice")]
    ConsentRequired,

    #[error("Unknown mode: {0}")]
    UnknownMode(String),
}

impl ValidationError {
    /// Oversized uploads map to 413 rather than 400.
    pub fn is_payload_too_large(&self) -> bool {
        matches!(self, Self::AudioTooLarge { .. })
    }
}

/// Failure raised by an inference backend call.
#[derive(Debug, Error)]
pub enum BackendError {
    #[error("Model not available: {0}")]
    ModelUnavailable(String),

    #[error("Inference failed: {0}")]
    Inference(String),

    #[error("Reference audio error: {0}")]
    ReferenceAudio(String),

    #[error(transparent)]
    Audio(#[from] AudioError),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

/// Errors from WAV container encoding/decoding and waveform assembly.
#[derive(Debug, Error)]
pub enum AudioError {
    #[error("WAV encoding failed: {0}")]
    Encode(String),

    #[error("Failed to parse WAV: {0}")]
    Decode(String),

    #[error("Cannot concatenate waveforms with different sample rates ({expected} Hz vs {found} Hz)")]
    SampleRateMismatch { expected: u32, found: u32 },

    #[error("No waveforms to concatenate")]
    Empty,
}

impl From<hound::Error> for AudioError {
    fn from(err: hound::Error) -> Self {
        AudioError::Decode(err.to_string())
    }
}
