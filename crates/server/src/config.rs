// crates/server/src/config.rs
//! Runtime settings, read from flags or `TTSWEB_*` environment variables.

use std::path::PathBuf;
use std::time::Duration;

use clap::Parser;
use ttsweb_core::{Limits, ModelVariant};
use ttsweb_observability::LogFormat;
use ttsweb_server_jobs::StoreConfig;

#[derive(Debug, Clone, Parser)]
#[command(name = "ttsweb", version, about = "Speech synthesis job server")]
pub struct Settings {
    #[arg(long, env = "TTSWEB_HOST", default_value = "0.0.0.0")]
    pub host: String,

    #[arg(long, env = "TTSWEB_PORT", default_value_t = 8100)]
    pub port: u16,

    /// Comma-separated list of allowed browser origins.
    #[arg(
        long,
        env = "TTSWEB_CORS_ORIGINS",
        default_value = "http://localhost:3000,http://localhost:5173"
    )]
    pub cors_origins: String,

    /// Generations allowed to run against the backend at once.
    #[arg(long, env = "TTSWEB_MAX_CONCURRENT_JOBS", default_value_t = 4)]
    pub max_concurrent_jobs: usize,

    #[arg(long, env = "TTSWEB_MAX_TEXT_LENGTH", default_value_t = 10_000)]
    pub max_text_length: usize,

    #[arg(long, env = "TTSWEB_MAX_AUDIO_UPLOAD_MB", default_value_t = 25)]
    pub max_audio_upload_mb: usize,

    /// Seconds a finished job is kept before the sweeper evicts it.
    #[arg(long, env = "TTSWEB_JOB_TTL_SECONDS", default_value_t = 3600)]
    pub job_ttl_seconds: u64,

    #[arg(long, env = "TTSWEB_SWEEP_INTERVAL_SECONDS", default_value_t = 60)]
    pub sweep_interval_seconds: u64,

    #[arg(long, env = "TTSWEB_LOG_LEVEL", default_value = "info")]
    pub log_level: String,

    #[arg(long, env = "TTSWEB_LOG_FORMAT", default_value = "compact")]
    pub log_format: LogFormat,

    /// Artificial delay added to every mock synthesis call.
    #[arg(long, env = "TTSWEB_MOCK_LATENCY_MS", default_value_t = 0)]
    pub mock_latency_ms: u64,

    /// Where reference uploads are staged. Defaults to the system temp dir.
    #[arg(long, env = "TTSWEB_TEMP_DIR")]
    pub temp_dir: Option<PathBuf>,

    #[arg(
        long,
        env = "TTSWEB_MODEL_CUSTOM_VOICE",
        default_value = "Qwen/Qwen3-TTS-12Hz-1.7B-CustomVoice"
    )]
    pub model_custom_voice: String,

    #[arg(
        long,
        env = "TTSWEB_MODEL_VOICE_DESIGN",
        default_value = "Qwen/Qwen3-TTS-12Hz-1.7B-VoiceDesign"
    )]
    pub model_voice_design: String,

    #[arg(
        long,
        env = "TTSWEB_MODEL_BASE",
        default_value = "Qwen/Qwen3-TTS-12Hz-1.7B-Base"
    )]
    pub model_base: String,

    #[arg(
        long,
        env = "TTSWEB_MODEL_TOKENIZER",
        default_value = "Qwen/Qwen3-TTS-Tokenizer-12Hz"
    )]
    pub model_tokenizer: String,
}

impl Settings {
    pub fn cors_origin_list(&self) -> Vec<String> {
        self.cors_origins
            .split(',')
            .map(str::trim)
            .filter(|o| !o.is_empty())
            .map(String::from)
            .collect()
    }

    pub fn max_audio_upload_bytes(&self) -> usize {
        self.max_audio_upload_mb * 1024 * 1024
    }

    pub fn limits(&self) -> Limits {
        Limits {
            max_text_length: self.max_text_length,
            max_audio_upload_bytes: self.max_audio_upload_bytes(),
        }
    }

    pub fn store_config(&self) -> StoreConfig {
        StoreConfig {
            ttl: Duration::from_secs(self.job_ttl_seconds),
            sweep_interval: Duration::from_secs(self.sweep_interval_seconds),
        }
    }

    pub fn temp_dir(&self) -> PathBuf {
        self.temp_dir.clone().unwrap_or_else(std::env::temp_dir)
    }

    /// Hub id configured for a model variant.
    pub fn model_id(&self, variant: ModelVariant) -> &str {
        match variant {
            ModelVariant::CustomVoice => &self.model_custom_voice,
            ModelVariant::VoiceDesign => &self.model_voice_design,
            ModelVariant::Base => &self.model_base,
            ModelVariant::Tokenizer => &self.model_tokenizer,
        }
    }

    pub fn bind_addr(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }
}

impl Default for Settings {
    /// Built-in defaults, ignoring the process environment.
    fn default() -> Self {
        Self {
            host: "0.0.0.0".into(),
            port: 8100,
            cors_origins: "http://localhost:3000,http://localhost:5173".into(),
            max_concurrent_jobs: 4,
            max_text_length: 10_000,
            max_audio_upload_mb: 25,
            job_ttl_seconds: 3600,
            sweep_interval_seconds: 60,
            log_level: "info".into(),
            log_format: LogFormat::Compact,
            mock_latency_ms: 0,
            temp_dir: None,
            model_custom_voice: "Qwen/Qwen3-TTS-12Hz-1.7B-CustomVoice".into(),
            model_voice_design: "Qwen/Qwen3-TTS-12Hz-1.7B-VoiceDesign".into(),
            model_base: "Qwen/Qwen3-TTS-12Hz-1.7B-Base".into(),
            model_tokenizer: "Qwen/Qwen3-TTS-Tokenizer-12Hz".into(),
        }
    }
}
