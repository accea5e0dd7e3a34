// crates/core/src/mock.rs
//! Synthetic backend used when no accelerator-backed engine is wired in.
//!
//! Produces a short two-tone chime so clients can verify playback end to end.

use std::f32::consts::PI;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;

use crate::audio::{Waveform, DEFAULT_SAMPLE_RATE};
use crate::backend::{BackendInfo, CloneInput, SpeechBackend, VoiceClonePrompt};
use crate::error::BackendError;

const MOCK_TOKENS: [i64; 8] = [100, 200, 300, 400, 500, 600, 700, 800];

/// Render an A4 + C#5 chime with an exponential fade-out.
pub fn chime(duration_secs: f32, sample_rate: u32) -> Waveform {
    let len = (sample_rate as f32 * duration_secs) as usize;
    let samples = (0..len)
        .map(|i| {
            let t = i as f32 / sample_rate as f32;
            let envelope = (-2.0 * t).exp();
            let wave = 0.3
                * envelope
                * ((2.0 * PI * 440.0 * t).sin() + 0.6 * (2.0 * PI * 554.0 * t).sin());
            wave.clamp(-1.0, 1.0)
        })
        .collect();
    Waveform::new(samples, sample_rate)
}

/// A `SpeechBackend` that synthesizes chimes instead of speech.
#[derive(Debug, Default)]
pub struct MockBackend {
    latency: Duration,
    failure: Option<String>,
    calls: AtomicUsize,
}

impl MockBackend {
    pub fn new() -> Self {
        Self::default()
    }

    /// Sleep this long inside every synthesis call, simulating inference time.
    pub fn with_latency(mut self, latency: Duration) -> Self {
        self.latency = latency;
        self
    }

    /// Make every synthesis call fail with `message`.
    pub fn with_failure(mut self, message: impl Into<String>) -> Self {
        self.failure = Some(message.into());
        self
    }

    /// Number of synthesis calls made so far (tokenizer calls excluded).
    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }

    fn simulate(&self) -> Result<(), BackendError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        if !self.latency.is_zero() {
            std::thread::sleep(self.latency);
        }
        match &self.failure {
            Some(message) => Err(BackendError::Inference(message.clone())),
            None => Ok(()),
        }
    }
}

impl SpeechBackend for MockBackend {
    fn generate_custom_voice(
        &self,
        _text: &str,
        _language: &str,
        _speaker: &str,
        _instruct: Option<&str>,
    ) -> Result<Waveform, BackendError> {
        self.simulate()?;
        Ok(chime(2.0, DEFAULT_SAMPLE_RATE))
    }

    fn generate_voice_design(
        &self,
        _text: &str,
        _language: &str,
        _instruct: &str,
    ) -> Result<Waveform, BackendError> {
        self.simulate()?;
        Ok(chime(2.0, DEFAULT_SAMPLE_RATE))
    }

    fn generate_voice_clone(&self, input: CloneInput<'_>) -> Result<Waveform, BackendError> {
        if !input.reference_audio.exists() {
            return Err(BackendError::ReferenceAudio(format!(
                "{} does not exist",
                input.reference_audio.display()
            )));
        }
        self.simulate()?;
        Ok(chime(2.5, DEFAULT_SAMPLE_RATE))
    }

    fn create_voice_clone_prompt(
        &self,
        reference: &Waveform,
        reference_text: &str,
    ) -> Result<VoiceClonePrompt, BackendError> {
        self.simulate()?;
        let energy = if reference.samples.is_empty() {
            0.0
        } else {
            reference.samples.iter().map(|s| s.abs()).sum::<f32>() / reference.samples.len() as f32
        };
        Ok(VoiceClonePrompt {
            speaker_embedding: vec![energy, reference.duration_secs()],
            reference_text: Some(reference_text.to_string()),
            sample_rate: reference.sample_rate,
        })
    }

    fn generate_with_prompt(
        &self,
        texts: &[String],
        _languages: &[String],
        prompt: &VoiceClonePrompt,
    ) -> Result<Vec<Waveform>, BackendError> {
        self.simulate()?;
        Ok(texts.iter().map(|_| chime(1.0, prompt.sample_rate)).collect())
    }

    fn encode_tokens(&self, _audio: &Waveform) -> Result<Vec<i64>, BackendError> {
        Ok(MOCK_TOKENS.to_vec())
    }

    fn decode_tokens(&self, _tokens: &[i64]) -> Result<Waveform, BackendError> {
        Ok(chime(1.0, DEFAULT_SAMPLE_RATE))
    }

    fn info(&self) -> BackendInfo {
        BackendInfo {
            mock_mode: true,
            gpu_available: false,
            loaded: Vec::new(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn test_chime_length_and_range() {
        let wave = chime(1.5, DEFAULT_SAMPLE_RATE);
        assert_eq!(wave.samples.len(), 36_000);
        assert!(wave.samples.iter().all(|s| (-1.0..=1.0).contains(s)));
        assert!(wave.samples.iter().any(|s| s.abs() > 0.1));
    }

    #[test]
    fn test_preset_voice_is_two_seconds() {
        let backend = MockBackend::new();
        let wave = backend
            .generate_custom_voice("Hello world", "English", "Ryan", None)
            .unwrap();
        assert_eq!(wave.sample_rate, DEFAULT_SAMPLE_RATE);
        assert_eq!(wave.duration_secs(), 2.0);
        assert_eq!(backend.calls(), 1);
    }

    #[test]
    fn test_failure_injection() {
        let backend = MockBackend::new().with_failure("out of memory");
        let err = backend
            .generate_voice_design("hi", "Auto", "a calm voice")
            .unwrap_err();
        assert_eq!(err.to_string(), "Inference failed: out of memory");
        assert_eq!(backend.calls(), 1);
    }

    #[test]
    fn test_clone_requires_reference_file() {
        let backend = MockBackend::new();
        let missing = std::path::Path::new("/definitely/not/here.wav");
        let input = CloneInput {
            text: "hi",
            language: "Auto",
            reference_audio: missing,
            reference_text: None,
            x_vector_only_mode: false,
            instruct: None,
        };
        assert!(matches!(
            backend.generate_voice_clone(input),
            Err(BackendError::ReferenceAudio(_))
        ));
        assert_eq!(backend.calls(), 0);

        let mut file = tempfile::NamedTempFile::new().unwrap();
        file.write_all(b"RIFF").unwrap();
        let input = CloneInput {
            reference_audio: file.path(),
            ..input
        };
        let wave = backend.generate_voice_clone(input).unwrap();
        assert_eq!(wave.duration_secs(), 2.5);
    }

    #[test]
    fn test_prompt_pipeline_returns_one_wave_per_text() {
        let backend = MockBackend::new();
        let reference = backend
            .generate_voice_design("ref", "English", "warm narrator")
            .unwrap();
        let prompt = backend.create_voice_clone_prompt(&reference, "ref").unwrap();
        assert_eq!(prompt.reference_text.as_deref(), Some("ref"));

        let texts = vec!["one".to_string(), "two".to_string(), "three".to_string()];
        let langs = vec!["English".to_string(); 3];
        let waves = backend.generate_with_prompt(&texts, &langs, &prompt).unwrap();
        assert_eq!(waves.len(), 3);
        assert_eq!(backend.calls(), 3);
    }

    #[test]
    fn test_tokenizer_is_deterministic_and_uncounted() {
        let backend = MockBackend::new();
        let wave = chime(0.1, DEFAULT_SAMPLE_RATE);
        assert_eq!(backend.encode_tokens(&wave).unwrap(), MOCK_TOKENS.to_vec());
        assert_eq!(backend.decode_tokens(&[1, 2, 3]).unwrap().duration_secs(), 1.0);
        assert_eq!(backend.calls(), 0);
    }
}
