// crates/server/src/metrics.rs
//! Prometheus metrics for the generation pipeline.

use metrics::{counter, describe_counter, describe_gauge, describe_histogram, gauge, histogram};
use metrics_exporter_prometheus::{PrometheusBuilder, PrometheusHandle};
use std::sync::OnceLock;
use std::time::{Duration, Instant};

use ttsweb_core::GenerationMode;
use ttsweb_server_jobs::JobStatus;

/// Global Prometheus handle for rendering metrics.
static PROMETHEUS_HANDLE: OnceLock<PrometheusHandle> = OnceLock::new();

/// Install the Prometheus recorder. Returns `false` if already installed.
///
/// Concurrent callers block until the first one finishes, so a `true` or
/// `false` return both mean `render_metrics` is ready.
pub fn init_metrics() -> bool {
    let mut installed = false;
    PROMETHEUS_HANDLE.get_or_init(|| {
        let recorder = PrometheusBuilder::new().build_recorder();
        let handle = recorder.handle();
        if metrics::set_global_recorder(recorder).is_err() {
            tracing::warn!("Failed to set global metrics recorder (already set)");
        } else {
            describe_metrics();
            installed = true;
            tracing::info!("Prometheus metrics initialized");
        }
        handle
    });
    installed
}

fn describe_metrics() {
    describe_counter!("tts_jobs_created_total", "Generation jobs accepted, by mode");
    describe_counter!(
        "tts_jobs_finished_total",
        "Generation jobs that reached a terminal state, by mode and outcome"
    );
    describe_histogram!(
        "tts_generation_duration_seconds",
        "Time a generation held a gate permit, in seconds"
    );
    describe_gauge!("tts_gate_permits_in_use", "Gate permits currently held");
}

/// Render current metrics in Prometheus text format.
///
/// Returns `None` if metrics are not initialized.
pub fn render_metrics() -> Option<String> {
    PROMETHEUS_HANDLE.get().map(|h| h.render())
}

pub fn record_job_created(mode: GenerationMode) {
    counter!("tts_jobs_created_total", "mode" => mode.as_str()).increment(1);
}

pub fn record_job_finished(mode: GenerationMode, outcome: JobStatus) {
    counter!(
        "tts_jobs_finished_total",
        "mode" => mode.as_str(),
        "outcome" => outcome.as_str()
    )
    .increment(1);
}

pub fn record_permits_in_use(in_use: usize) {
    gauge!("tts_gate_permits_in_use").set(in_use as f64);
}

/// Times one permit-holding generation and records it when finished.
pub struct GenerationTimer {
    mode: GenerationMode,
    start: Instant,
}

impl GenerationTimer {
    pub fn start(mode: GenerationMode) -> Self {
        Self {
            mode,
            start: Instant::now(),
        }
    }

    pub fn finish(self) -> Duration {
        let elapsed = self.start.elapsed();
        histogram!("tts_generation_duration_seconds", "mode" => self.mode.as_str())
            .record(elapsed.as_secs_f64());
        elapsed
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_recording_before_init_is_harmless() {
        record_job_created(GenerationMode::CustomVoice);
        record_job_finished(GenerationMode::VoiceClone, JobStatus::Cancelled);
        record_permits_in_use(2);
        let timer = GenerationTimer::start(GenerationMode::VoiceDesign);
        std::thread::sleep(Duration::from_millis(1));
        assert!(timer.finish() >= Duration::from_millis(1));
    }

    #[test]
    fn test_render_after_init() {
        init_metrics();
        record_job_created(GenerationMode::VoiceDesignClone);
        let output = render_metrics().expect("metrics initialized");
        assert!(output.contains("tts_jobs_created_total"));
        assert!(!init_metrics(), "second init is a no-op");
    }
}
