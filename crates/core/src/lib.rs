// crates/core/src/lib.rs
//! Speech-synthesis domain types shared by the job system and the server:
//! the backend contract, a mock backend, WAV helpers, request validation and
//! the static voice catalog.

pub mod audio;
pub mod backend;
pub mod catalog;
pub mod error;
pub mod mock;
pub mod request;

pub use audio::{Waveform, DEFAULT_SAMPLE_RATE, WAV_MIME};
pub use backend::{BackendInfo, CloneInput, ModelVariant, SpeechBackend, VoiceClonePrompt};
pub use error::*;
pub use mock::MockBackend;
pub use request::{
    CustomVoiceParams, GenerationMode, GenerationRequest, Limits, VoiceCloneFields,
    VoiceCloneParams, VoiceDesignCloneParams, VoiceDesignParams,
};
