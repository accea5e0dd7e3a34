// crates/server/src/orchestrator.rs
//! Runs generation jobs against the speech backend under the concurrency gate.
//!
//! Every mode follows the same skeleton: wait for a permit, mark the job
//! processing, check for cancellation, call the backend on a blocking worker,
//! check again, then record the encoded result. Cancellation is cooperative:
//! a backend call in flight always runs to completion and its output is
//! discarded if the job was cancelled meanwhile.

use std::path::PathBuf;
use std::sync::Arc;

use bytes::Bytes;
use thiserror::Error;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::Instrument;

use ttsweb_core::audio::{self, Waveform};
use ttsweb_core::{
    AudioError, BackendError, CloneInput, GenerationMode, GenerationRequest, Limits,
    SpeechBackend, ValidationError,
};
use ttsweb_server_jobs::{ConcurrencyGate, Job, JobId, JobResult, JobStatus, JobStore, JobUpdate};

use crate::metrics::{self, GenerationTimer};

const PROGRESS_STARTED: f32 = 0.1;
const PROGRESS_DESIGNED: f32 = 0.4;
const PROGRESS_PROMPTED: f32 = 0.6;

/// Why a generation did not produce audio.
#[derive(Debug, Error)]
pub enum GenerationError {
    #[error(transparent)]
    Backend(#[from] BackendError),

    #[error(transparent)]
    Audio(#[from] AudioError),

    #[error("Generation worker failed: {0}")]
    Worker(String),
}

enum Outcome {
    Completed(JobResult),
    Cancelled,
    Failed(GenerationError),
}

/// Drives jobs from `Queued` to a terminal state.
pub struct Orchestrator {
    store: Arc<JobStore>,
    gate: ConcurrencyGate,
    backend: Arc<dyn SpeechBackend>,
    limits: Limits,
    temp_dir: PathBuf,
}

impl Orchestrator {
    pub fn new(
        store: Arc<JobStore>,
        gate: ConcurrencyGate,
        backend: Arc<dyn SpeechBackend>,
        limits: Limits,
        temp_dir: PathBuf,
    ) -> Self {
        Self {
            store,
            gate,
            backend,
            limits,
            temp_dir,
        }
    }

    pub fn store(&self) -> &Arc<JobStore> {
        &self.store
    }

    pub fn gate(&self) -> &ConcurrencyGate {
        &self.gate
    }

    pub fn backend(&self) -> &Arc<dyn SpeechBackend> {
        &self.backend
    }

    pub fn limits(&self) -> &Limits {
        &self.limits
    }

    /// Validate, create a job and start it. Invalid requests never get a job.
    pub fn submit(self: &Arc<Self>, request: GenerationRequest) -> Result<Job, ValidationError> {
        request.validate(&self.limits)?;
        let job = self.create_job(request.mode());
        self.spawn(job.id, request);
        Ok(job)
    }

    /// Create a `Queued` job without starting it.
    pub fn create_job(&self, mode: GenerationMode) -> Job {
        let job = self.store.create();
        metrics::record_job_created(mode);
        tracing::info!(job_id = %job.id, %mode, "Job queued");
        job
    }

    /// Start generation for an existing job in the background.
    ///
    /// The returned handle resolves once the job is terminal and its permit
    /// has been released.
    pub fn spawn(self: &Arc<Self>, id: JobId, request: GenerationRequest) -> JoinHandle<()> {
        let token = CancellationToken::new();
        self.store.associate(id, token.clone());
        let span = tracing::info_span!("generation", job_id = %id, mode = %request.mode());
        let this = Arc::clone(self);
        tokio::spawn(async move { this.run(id, request, token).await }.instrument(span))
    }

    /// Run one job to a terminal state. The gate permit is held until the
    /// terminal state is recorded, so a job is never `Processing` without one.
    pub async fn run(&self, id: JobId, request: GenerationRequest, cancel: CancellationToken) {
        let mode = request.mode();

        let acquired = tokio::select! {
            biased;
            _ = cancel.cancelled() => {
                tracing::info!("Job cancelled while queued");
                metrics::record_job_finished(mode, JobStatus::Cancelled);
                return;
            }
            acquired = self.gate.acquire() => acquired,
        };
        let permit = match acquired {
            Ok(permit) => permit,
            Err(e) => {
                tracing::warn!(error = %e, "Gate closed before job started");
                self.store.update(id, JobUpdate::failed("server shutting down"));
                metrics::record_job_finished(mode, JobStatus::Failed);
                return;
            }
        };
        metrics::record_permits_in_use(self.gate.in_use());

        let timer = GenerationTimer::start(mode);
        let outcome = self.execute(id, request).await;
        let elapsed = timer.finish();

        match outcome {
            Outcome::Completed(result) => {
                let bytes = result.audio.len();
                if self.store.update(id, JobUpdate::completed(result)) {
                    tracing::info!(bytes, elapsed_ms = elapsed.as_millis() as u64, "Job completed");
                } else {
                    tracing::info!("Job cancelled before its result was stored");
                }
            }
            Outcome::Cancelled => {
                self.store.update(id, JobUpdate::cancelled());
                tracing::info!(elapsed_ms = elapsed.as_millis() as u64, "Job stopped at checkpoint");
            }
            Outcome::Failed(e) => {
                tracing::error!(error = %e, "Generation failed");
                self.store.update(id, JobUpdate::failed(e.to_string()));
            }
        }

        permit.release();
        metrics::record_permits_in_use(self.gate.in_use());

        if let Some(job) = self.store.get(id) {
            metrics::record_job_finished(mode, job.status);
        }
    }

    fn checkpoint(&self, id: JobId) -> bool {
        self.store.is_cancelled(id)
    }

    async fn execute(&self, id: JobId, request: GenerationRequest) -> Outcome {
        self.store.update(id, JobUpdate::processing(PROGRESS_STARTED));
        if self.checkpoint(id) {
            return Outcome::Cancelled;
        }

        let generated = match request {
            GenerationRequest::CustomVoice(p) => {
                self.blocking(move |backend| {
                    backend.generate_custom_voice(
                        &p.text,
                        &p.language,
                        &p.speaker,
                        p.instruct.as_deref(),
                    )
                })
                .await
            }
            GenerationRequest::VoiceDesign(p) => {
                self.blocking(move |backend| {
                    backend.generate_voice_design(&p.text, &p.language, &p.instruct)
                })
                .await
            }
            GenerationRequest::VoiceClone(p) => {
                let dir = self.temp_dir.clone();
                self.blocking(move |backend| {
                    // Removed when `reference` drops, whatever the backend returns.
                    let mut reference = tempfile::Builder::new()
                        .prefix("ttsweb-ref-")
                        .suffix(".wav")
                        .tempfile_in(&dir)?;
                    std::io::Write::write_all(&mut reference, &p.reference_audio)?;
                    backend.generate_voice_clone(CloneInput {
                        text: &p.text,
                        language: &p.language,
                        reference_audio: reference.path(),
                        reference_text: p.ref_text.as_deref(),
                        x_vector_only_mode: p.x_vector_only_mode,
                        instruct: p.instruct.as_deref(),
                    })
                })
                .await
            }
            GenerationRequest::VoiceDesignClone(p) => {
                match self.design_then_clone(id, p).await {
                    Ok(Some(wave)) => Ok(wave),
                    Ok(None) => return Outcome::Cancelled,
                    Err(e) => Err(e),
                }
            }
        };

        let wave = match generated {
            Ok(wave) => wave,
            Err(e) => return Outcome::Failed(e),
        };
        if self.checkpoint(id) {
            return Outcome::Cancelled;
        }

        match encode(wave).await {
            Ok(result) => Outcome::Completed(result),
            Err(e) => Outcome::Failed(e),
        }
    }

    /// Design a reference voice, derive a clone prompt from it, then speak
    /// every clone text with that prompt. `Ok(None)` means a checkpoint saw
    /// a cancellation.
    async fn design_then_clone(
        &self,
        id: JobId,
        p: ttsweb_core::VoiceDesignCloneParams,
    ) -> Result<Option<Waveform>, GenerationError> {
        let design_text = p.design_text.clone();
        let reference = self
            .blocking(move |backend| {
                backend.generate_voice_design(&p.design_text, &p.design_language, &p.design_instruct)
            })
            .await?;
        self.store.update(id, JobUpdate::progress(PROGRESS_DESIGNED));
        if self.checkpoint(id) {
            return Ok(None);
        }

        let prompt = self
            .blocking(move |backend| backend.create_voice_clone_prompt(&reference, &design_text))
            .await?;
        self.store.update(id, JobUpdate::progress(PROGRESS_PROMPTED));
        if self.checkpoint(id) {
            return Ok(None);
        }

        let texts = p.clone_texts;
        let languages = p.clone_languages;
        let segments = self
            .blocking(move |backend| backend.generate_with_prompt(&texts, &languages, &prompt))
            .await?;
        Ok(Some(audio::concat(segments)?))
    }

    /// Run a backend call on the blocking pool.
    async fn blocking<T, F>(&self, f: F) -> Result<T, GenerationError>
    where
        F: FnOnce(&dyn SpeechBackend) -> Result<T, BackendError> + Send + 'static,
        T: Send + 'static,
    {
        let backend = Arc::clone(&self.backend);
        tokio::task::spawn_blocking(move || f(backend.as_ref()))
            .await
            .map_err(|e| GenerationError::Worker(e.to_string()))?
            .map_err(GenerationError::from)
    }

    /// Stop admitting work: queued jobs fail, running ones finish.
    pub async fn shutdown(&self) {
        self.gate.close();
        self.store.stop().await;
    }
}

async fn encode(wave: Waveform) -> Result<JobResult, GenerationError> {
    let sample_rate = wave.sample_rate;
    let audio = tokio::task::spawn_blocking(move || audio::encode_wav(&wave))
        .await
        .map_err(|e| GenerationError::Worker(e.to_string()))??;
    Ok(JobResult {
        audio: Bytes::from(audio),
        sample_rate,
    })
}
