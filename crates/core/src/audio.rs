// crates/core/src/audio.rs
//! Waveform type and WAV container helpers.
//!
//! Backends produce mono `f32` samples in `[-1.0, 1.0]`; everything that leaves
//! the process is 16-bit PCM WAV.

use std::io::Cursor;

use crate::error::AudioError;

/// MIME type of every audio payload served by the API.
pub const WAV_MIME: &str = "audio/wav";

/// Native output rate of the Qwen3-TTS 12Hz models.
pub const DEFAULT_SAMPLE_RATE: u32 = 24_000;

/// A mono waveform at a fixed sample rate.
#[derive(Debug, Clone, PartialEq)]
pub struct Waveform {
    pub samples: Vec<f32>,
    pub sample_rate: u32,
}

impl Waveform {
    pub fn new(samples: Vec<f32>, sample_rate: u32) -> Self {
        Self {
            samples,
            sample_rate,
        }
    }

    pub fn duration_secs(&self) -> f32 {
        if self.sample_rate == 0 {
            return 0.0;
        }
        self.samples.len() as f32 / self.sample_rate as f32
    }
}

/// Encode a waveform as a 16-bit PCM mono WAV file.
pub fn encode_wav(wave: &Waveform) -> Result<Vec<u8>, AudioError> {
    let spec = hound::WavSpec {
        channels: 1,
        sample_rate: wave.sample_rate,
        bits_per_sample: 16,
        sample_format: hound::SampleFormat::Int,
    };

    let mut cursor = Cursor::new(Vec::with_capacity(44 + wave.samples.len() * 2));
    {
        let mut writer = hound::WavWriter::new(&mut cursor, spec)
            .map_err(|e| AudioError::Encode(e.to_string()))?;
        for &sample in &wave.samples {
            let clamped = if sample.is_finite() {
                sample.clamp(-1.0, 1.0)
            } else {
                0.0
            };
            writer
                .write_sample((clamped * i16::MAX as f32) as i16)
                .map_err(|e| AudioError::Encode(e.to_string()))?;
        }
        writer
            .finalize()
            .map_err(|e| AudioError::Encode(e.to_string()))?;
    }

    Ok(cursor.into_inner())
}

/// Decode any PCM or float WAV into a mono waveform. Multi-channel input is
/// averaged down to one channel.
pub fn decode_wav(bytes: &[u8]) -> Result<Waveform, AudioError> {
    let mut reader = hound::WavReader::new(Cursor::new(bytes))?;
    let spec = reader.spec();
    let channels = spec.channels.max(1) as usize;

    let samples: Vec<f32> = match spec.sample_format {
        hound::SampleFormat::Int => {
            let bits = spec.bits_per_sample.max(1) as u32;
            let max_val = if bits > 1 {
                ((1i64 << (bits - 1)) - 1) as f32
            } else {
                1.0
            };
            reader
                .samples::<i32>()
                .map(|s| s.map(|v| (v as f32 / max_val).clamp(-1.0, 1.0)))
                .collect::<Result<_, _>>()?
        }
        hound::SampleFormat::Float => reader.samples::<f32>().collect::<Result<_, _>>()?,
    };

    let samples = if channels > 1 {
        samples
            .chunks(channels)
            .map(|frame| frame.iter().sum::<f32>() / frame.len() as f32)
            .collect()
    } else {
        samples
    };

    Ok(Waveform::new(samples, spec.sample_rate))
}

/// Concatenate waveforms in input order. All inputs must share a sample rate.
pub fn concat(waves: Vec<Waveform>) -> Result<Waveform, AudioError> {
    let mut iter = waves.into_iter();
    let mut combined = iter.next().ok_or(AudioError::Empty)?;
    for wave in iter {
        if wave.sample_rate != combined.sample_rate {
            return Err(AudioError::SampleRateMismatch {
                expected: combined.sample_rate,
                found: wave.sample_rate,
            });
        }
        combined.samples.extend(wave.samples);
    }
    Ok(combined)
}

/// Read the sample rate from a WAV header without decoding the samples.
pub fn wav_sample_rate(bytes: &[u8]) -> Result<u32, AudioError> {
    let reader = hound::WavReader::new(Cursor::new(bytes))?;
    Ok(reader.spec().sample_rate)
}
