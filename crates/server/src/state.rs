// crates/server/src/state.rs
//! Application state for the Axum server.

use std::sync::Arc;
use std::time::{Duration, Instant};

use ttsweb_core::{MockBackend, SpeechBackend};
use ttsweb_server_jobs::{ConcurrencyGate, JobStore};

use crate::config::Settings;
use crate::orchestrator::Orchestrator;

/// Shared application state accessible from all route handlers.
pub struct AppState {
    /// Server start time for uptime tracking.
    pub start_time: Instant,
    pub settings: Settings,
    /// Owns the job store, the gate and the backend handle.
    pub orchestrator: Arc<Orchestrator>,
}

impl AppState {
    /// Wire the store, gate and orchestrator around `backend`.
    ///
    /// The sweeper is not started here; call `JobStore::start_sweep` from
    /// inside the runtime that should own it.
    pub fn new(settings: Settings, backend: Arc<dyn SpeechBackend>) -> Arc<Self> {
        let store = Arc::new(JobStore::new(settings.store_config()));
        let gate = ConcurrencyGate::new(settings.max_concurrent_jobs);
        let orchestrator = Arc::new(Orchestrator::new(
            store,
            gate,
            backend,
            settings.limits(),
            settings.temp_dir(),
        ));
        Arc::new(Self {
            start_time: Instant::now(),
            settings,
            orchestrator,
        })
    }

    /// State backed by the synthetic backend, with the configured latency.
    pub fn with_mock_backend(settings: Settings) -> Arc<Self> {
        let backend =
            MockBackend::new().with_latency(Duration::from_millis(settings.mock_latency_ms));
        Self::new(settings, Arc::new(backend))
    }

    pub fn store(&self) -> &Arc<JobStore> {
        self.orchestrator.store()
    }

    pub fn gate(&self) -> &ConcurrencyGate {
        self.orchestrator.gate()
    }

    pub fn backend(&self) -> &Arc<dyn SpeechBackend> {
        self.orchestrator.backend()
    }

    pub fn uptime_secs(&self) -> u64 {
        self.start_time.elapsed().as_secs()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_state_wires_settings_through() {
        let state = AppState::with_mock_backend(Settings {
            max_concurrent_jobs: 3,
            max_text_length: 42,
            ..Settings::default()
        });
        assert_eq!(state.gate().capacity(), 3);
        assert_eq!(state.orchestrator.limits().max_text_length, 42);
        assert!(state.store().is_empty());
        assert!(state.backend().info().mock_mode);
        assert!(state.uptime_secs() < 5);
    }
}
