// crates/core/src/request.rs
//! Generation request variants and their validation.
//!
//! A request is validated once, at the boundary, before any job record exists.

use bytes::Bytes;
use serde::{Deserialize, Serialize};
use utoipa::ToSchema;

use crate::error::ValidationError;

pub const DEFAULT_LANGUAGE: &str = "Auto";
pub const MAX_INSTRUCT_LENGTH: usize = 2_000;
pub const MAX_REF_TEXT_LENGTH: usize = 5_000;
pub const MAX_CLONE_TEXTS: usize = 20;

fn default_language() -> String {
    DEFAULT_LANGUAGE.to_string()
}

fn default_true() -> bool {
    true
}

/// Size limits applied during validation.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Limits {
    pub max_text_length: usize,
    pub max_audio_upload_bytes: usize,
}

impl Limits {
    pub fn max_audio_upload_mb(&self) -> usize {
        self.max_audio_upload_bytes / (1024 * 1024)
    }
}

impl Default for Limits {
    fn default() -> Self {
        Self {
            max_text_length: 10_000,
            max_audio_upload_bytes: 25 * 1024 * 1024,
        }
    }
}

/// The four generation workflows.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "snake_case")]
pub enum GenerationMode {
    CustomVoice,
    VoiceDesign,
    VoiceClone,
    VoiceDesignClone,
}

impl GenerationMode {
    pub fn as_str(&self) -> &'static str {
        match self {
            GenerationMode::CustomVoice => "custom_voice",
            GenerationMode::VoiceDesign => "voice_design",
            GenerationMode::VoiceClone => "voice_clone",
            GenerationMode::VoiceDesignClone => "voice_design_clone",
        }
    }
}

impl std::fmt::Display for GenerationMode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl std::str::FromStr for GenerationMode {
    type Err = ValidationError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "custom_voice" => Ok(GenerationMode::CustomVoice),
            "voice_design" => Ok(GenerationMode::VoiceDesign),
            "voice_clone" => Ok(GenerationMode::VoiceClone),
            "voice_design_clone" => Ok(GenerationMode::VoiceDesignClone),
            other => Err(ValidationError::UnknownMode(other.to_string())),
        }
    }
}

/// Speech with a preset speaker voice.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, ToSchema)]
pub struct CustomVoiceParams {
    /// Text to synthesize.
    pub text: String,
    /// Target language; "Auto" detects it.
    #[serde(default = "default_language")]
    pub language: String,
    /// Preset speaker name, e.g. "Vivian" or "Ryan".
    pub speaker: String,
    /// Optional tone/emotion instruction.
    #[serde(default)]
    pub instruct: Option<String>,
}

/// Speech with a voice described in natural language.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, ToSchema)]
pub struct VoiceDesignParams {
    pub text: String,
    #[serde(default = "default_language")]
    pub language: String,
    /// Description of the target voice.
    pub instruct: String,
}

/// Speech in the voice of a reference recording.
#[derive(Debug, Clone, PartialEq)]
pub struct VoiceCloneParams {
    pub text: String,
    pub language: String,
    /// Transcript of the reference audio; improves fidelity when present.
    pub ref_text: Option<String>,
    /// Extract only the speaker embedding from the reference.
    pub x_vector_only_mode: bool,
    pub instruct: Option<String>,
    pub consent_acknowledged: bool,
    pub reference_audio: Bytes,
}

/// Design a voice from a description, then clone it for several texts.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, ToSchema)]
pub struct VoiceDesignCloneParams {
    /// Reference text spoken by the designed voice.
    pub design_text: String,
    #[serde(default = "default_language")]
    pub design_language: String,
    /// Description of the target voice persona.
    pub design_instruct: String,
    /// Texts to synthesize with the designed voice.
    pub clone_texts: Vec<String>,
    /// Language per clone text, parallel with `clone_texts`.
    pub clone_languages: Vec<String>,
}

/// Form fields accompanying a reference-audio upload.
#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct VoiceCloneFields {
    pub text: String,
    #[serde(default = "default_language")]
    pub language: String,
    #[serde(default)]
    pub ref_text: Option<String>,
    #[serde(default)]
    pub x_vector_only_mode: bool,
    #[serde(default)]
    pub instruct: Option<String>,
    #[serde(default = "default_true")]
    pub consent_acknowledged: bool,
}

impl VoiceCloneFields {
    pub fn with_audio(self, reference_audio: Bytes) -> VoiceCloneParams {
        VoiceCloneParams {
            text: self.text,
            language: self.language,
            ref_text: self.ref_text,
            x_vector_only_mode: self.x_vector_only_mode,
            instruct: self.instruct,
            consent_acknowledged: self.consent_acknowledged,
            reference_audio,
        }
    }
}

/// One generation job's parameters, tagged by mode.
#[derive(Debug, Clone, PartialEq)]
pub enum GenerationRequest {
    CustomVoice(CustomVoiceParams),
    VoiceDesign(VoiceDesignParams),
    VoiceClone(VoiceCloneParams),
    VoiceDesignClone(VoiceDesignCloneParams),
}

impl GenerationRequest {
    pub fn mode(&self) -> GenerationMode {
        match self {
            GenerationRequest::CustomVoice(_) => GenerationMode::CustomVoice,
            GenerationRequest::VoiceDesign(_) => GenerationMode::VoiceDesign,
            GenerationRequest::VoiceClone(_) => GenerationMode::VoiceClone,
            GenerationRequest::VoiceDesignClone(_) => GenerationMode::VoiceDesignClone,
        }
    }

    pub fn validate(&self, limits: &Limits) -> Result<(), ValidationError> {
        match self {
            GenerationRequest::CustomVoice(p) => {
                check_text("text", &p.text, limits)?;
                check_required("speaker", &p.speaker)?;
                check_optional("instruct", p.instruct.as_deref(), MAX_INSTRUCT_LENGTH)
            }
            GenerationRequest::VoiceDesign(p) => {
                check_text("text", &p.text, limits)?;
                check_required("instruct", &p.instruct)?;
                check_optional("instruct", Some(&p.instruct), MAX_INSTRUCT_LENGTH)
            }
            GenerationRequest::VoiceClone(p) => {
                check_text("text", &p.text, limits)?;
                check_optional("ref_text", p.ref_text.as_deref(), MAX_REF_TEXT_LENGTH)?;
                check_optional("instruct", p.instruct.as_deref(), MAX_INSTRUCT_LENGTH)?;
                if !p.consent_acknowledged {
                    return Err(ValidationError::ConsentRequired);
                }
                check_reference_audio(&p.reference_audio, limits)
            }
            GenerationRequest::VoiceDesignClone(p) => {
                check_text("design_text", &p.design_text, limits)?;
                check_required("design_instruct", &p.design_instruct)?;
                check_optional(
                    "design_instruct",
                    Some(&p.design_instruct),
                    MAX_INSTRUCT_LENGTH,
                )?;
                check_list("clone_texts", p.clone_texts.len())?;
                check_list("clone_languages", p.clone_languages.len())?;
                for text in &p.clone_texts {
                    check_text("clone_texts", text, limits)?;
                }
                if p.clone_texts.len() != p.clone_languages.len() {
                    return Err(ValidationError::MismatchedLists);
                }
                Ok(())
            }
        }
    }
}

/// Reject empty or oversized reference audio.
pub fn check_reference_audio(audio: &[u8], limits: &Limits) -> Result<(), ValidationError> {
    if audio.len() > limits.max_audio_upload_bytes {
        return Err(ValidationError::AudioTooLarge {
            limit_mb: limits.max_audio_upload_mb(),
        });
    }
    if audio.is_empty() {
        return Err(ValidationError::EmptyAudio);
    }
    Ok(())
}

fn check_text(field: &'static str, text: &str, limits: &Limits) -> Result<(), ValidationError> {
    check_required(field, text)?;
    if text.chars().count() > limits.max_text_length {
        return Err(ValidationError::TextTooLong {
            field,
            limit: limits.max_text_length,
        });
    }
    Ok(())
}

fn check_required(field: &'static str, value: &str) -> Result<(), ValidationError> {
    if value.is_empty() {
        return Err(ValidationError::Empty { field });
    }
    Ok(())
}

fn check_optional(
    field: &'static str,
    value: Option<&str>,
    limit: usize,
) -> Result<(), ValidationError> {
    match value {
        Some(v) if v.chars().count() > limit => Err(ValidationError::FieldTooLong { field, limit }),
        _ => Ok(()),
    }
}

fn check_list(field: &'static str, len: usize) -> Result<(), ValidationError> {
    if len == 0 || len > MAX_CLONE_TEXTS {
        return Err(ValidationError::ListLength {
            field,
            max: MAX_CLONE_TEXTS,
        });
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    fn custom(text: &str) -> GenerationRequest {
        GenerationRequest::CustomVoice(CustomVoiceParams {
            text: text.to_string(),
            language: DEFAULT_LANGUAGE.to_string(),
            speaker: "Ryan".to_string(),
            instruct: None,
        })
    }

    fn design_clone(texts: usize, languages: usize) -> GenerationRequest {
        GenerationRequest::VoiceDesignClone(VoiceDesignCloneParams {
            design_text: "Hello there".to_string(),
            design_language: "English".to_string(),
            design_instruct: "A warm, mid-aged narrator".to_string(),
            clone_texts: vec!["line".to_string(); texts],
            clone_languages: vec!["English".to_string(); languages],
        })
    }

    fn clone_with(audio: &'static [u8], consent: bool) -> GenerationRequest {
        GenerationRequest::VoiceClone(VoiceCloneParams {
            text: "Clone me".to_string(),
            language: "Auto".to_string(),
            ref_text: None,
            x_vector_only_mode: false,
            instruct: None,
            consent_acknowledged: consent,
            reference_audio: Bytes::from_static(audio),
        })
    }

    #[test]
    fn test_custom_voice_defaults_from_json() {
        let params: CustomVoiceParams =
            serde_json::from_str(r#"{"text":"Hello world","speaker":"Ryan"}"#).unwrap();
        assert_eq!(params.language, "Auto");
        assert_eq!(params.instruct, None);
        assert!(GenerationRequest::CustomVoice(params)
            .validate(&Limits::default())
            .is_ok());
    }

    #[test]
    fn test_text_limit_counts_characters() {
        let limits = Limits {
            max_text_length: 5,
            ..Limits::default()
        };
        // five multi-byte characters are within a five-character limit
        assert!(custom("héllo").validate(&limits).is_ok());
        assert_eq!(
            custom("héllo!").validate(&limits),
            Err(ValidationError::TextTooLong {
                field: "text",
                limit: 5
            })
        );
        assert_eq!(
            custom("").validate(&limits),
            Err(ValidationError::Empty { field: "text" })
        );
    }

    #[test]
    fn test_design_clone_requires_parallel_lists() {
        let limits = Limits::default();
        assert!(design_clone(2, 2).validate(&limits).is_ok());
        assert_eq!(
            design_clone(2, 1).validate(&limits),
            Err(ValidationError::MismatchedLists)
        );
        assert_eq!(
            design_clone(0, 0).validate(&limits),
            Err(ValidationError::ListLength {
                field: "clone_texts",
                max: MAX_CLONE_TEXTS
            })
        );
        assert!(matches!(
            design_clone(21, 21).validate(&limits),
            Err(ValidationError::ListLength { .. })
        ));
    }

    #[test]
    fn test_clone_audio_and_consent_checks() {
        let limits = Limits {
            max_text_length: 100,
            max_audio_upload_bytes: 8,
        };
        assert!(clone_with(b"RIFFdata", true).validate(&limits).is_ok());
        assert_eq!(
            clone_with(b"", true).validate(&limits),
            Err(ValidationError::EmptyAudio)
        );
        assert!(clone_with(b"RIFFdata!", true)
            .validate(&limits)
            .unwrap_err()
            .is_payload_too_large());
        assert_eq!(
            clone_with(b"RIFF", false).validate(&limits),
            Err(ValidationError::ConsentRequired)
        );
    }

    #[test]
    fn test_instruct_length_limit() {
        let request = GenerationRequest::VoiceDesign(VoiceDesignParams {
            text: "hi".to_string(),
            language: "Auto".to_string(),
            instruct: "x".repeat(MAX_INSTRUCT_LENGTH + 1),
        });
        assert_eq!(
            request.validate(&Limits::default()),
            Err(ValidationError::FieldTooLong {
                field: "instruct",
                limit: MAX_INSTRUCT_LENGTH
            })
        );
    }

    #[test]
    fn test_mode_parsing() {
        assert_eq!(
            "voice_design_clone".parse::<GenerationMode>().unwrap(),
            GenerationMode::VoiceDesignClone
        );
        assert_eq!(
            "karaoke".parse::<GenerationMode>(),
            Err(ValidationError::UnknownMode("karaoke".to_string()))
        );
        assert_eq!(custom("x").mode().to_string(), "custom_voice");
    }

    #[test]
    fn test_clone_fields_default_consent() {
        let fields: VoiceCloneFields = serde_json::from_str(r#"{"text":"hi"}"#).unwrap();
        assert!(fields.consent_acknowledged);
        let params = fields.with_audio(Bytes::from_static(b"RIFF"));
        assert_eq!(params.language, "Auto");
        assert_eq!(params.reference_audio.len(), 4);
    }
}
