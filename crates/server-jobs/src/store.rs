// crates/server-jobs/src/store.rs
//! In-memory job registry with a periodic eviction sweep.

use std::collections::HashMap;
use std::sync::{Arc, Mutex, RwLock, RwLockReadGuard, RwLockWriteGuard};
use std::time::Duration;

use chrono::{DateTime, Utc};
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

use crate::types::{Job, JobId, JobStatus, JobUpdate};

pub const DEFAULT_JOB_TTL: Duration = Duration::from_secs(3600);
pub const DEFAULT_SWEEP_INTERVAL: Duration = Duration::from_secs(60);

/// Retention settings for terminal jobs.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct StoreConfig {
    /// Terminal jobs idle for longer than this are evicted.
    pub ttl: Duration,
    /// Delay between sweep iterations.
    pub sweep_interval: Duration,
}

impl Default for StoreConfig {
    fn default() -> Self {
        Self {
            ttl: DEFAULT_JOB_TTL,
            sweep_interval: DEFAULT_SWEEP_INTERVAL,
        }
    }
}

struct JobRecord {
    job: Job,
    /// Signals the job's background work. Not ownership: dropping it does not stop anything.
    cancel: Option<CancellationToken>,
}

struct Sweeper {
    stop: CancellationToken,
    handle: JoinHandle<()>,
}

/// Authoritative mapping from job id to job record.
///
/// Every operation takes the map lock exactly once, so readers observe
/// either a fully applied update or none of it. Construct one per process
/// and share it behind an `Arc`.
pub struct JobStore {
    jobs: RwLock<HashMap<JobId, JobRecord>>,
    config: StoreConfig,
    sweeper: Mutex<Option<Sweeper>>,
}

impl JobStore {
    pub fn new(config: StoreConfig) -> Self {
        Self {
            jobs: RwLock::new(HashMap::new()),
            config,
            sweeper: Mutex::new(None),
        }
    }

    pub fn config(&self) -> StoreConfig {
        self.config
    }

    fn read(&self) -> RwLockReadGuard<'_, HashMap<JobId, JobRecord>> {
        self.jobs.read().unwrap_or_else(|e| {
            tracing::error!("RwLock poisoned reading jobs map: {e}");
            e.into_inner()
        })
    }

    fn write(&self) -> RwLockWriteGuard<'_, HashMap<JobId, JobRecord>> {
        self.jobs.write().unwrap_or_else(|e| {
            tracing::error!("RwLock poisoned writing jobs map: {e}");
            e.into_inner()
        })
    }

    /// Insert a fresh `Queued` job and return a snapshot of it.
    pub fn create(&self) -> Job {
        let job = Job::new(JobId::new(), Utc::now());
        self.write().insert(
            job.id,
            JobRecord {
                job: job.clone(),
                cancel: None,
            },
        );
        tracing::debug!(job_id = %job.id, "Job created");
        job
    }

    pub fn get(&self, id: JobId) -> Option<Job> {
        self.read().get(&id).map(|r| r.job.clone())
    }

    /// Merge `update` into the job. Returns whether anything was applied.
    ///
    /// Unknown ids are logged and ignored. Terminal jobs are never mutated,
    /// so a late write from a worker cannot overwrite a cancellation.
    pub fn update(&self, id: JobId, update: JobUpdate) -> bool {
        let mut jobs = self.write();
        let Some(record) = jobs.get_mut(&id) else {
            tracing::warn!(job_id = %id, "Update for unknown job ignored");
            return false;
        };
        if record.job.status.is_terminal() {
            tracing::debug!(
                job_id = %id,
                status = %record.job.status,
                "Update for terminal job ignored"
            );
            return false;
        }
        record.job.apply(update, Utc::now());
        true
    }

    /// Cancel a non-terminal job and signal its background work.
    ///
    /// Returns `false` for unknown or already terminal jobs.
    pub fn cancel(&self, id: JobId) -> bool {
        let token = {
            let mut jobs = self.write();
            let Some(record) = jobs.get_mut(&id) else {
                return false;
            };
            if record.job.status.is_terminal() {
                return false;
            }
            record.job.apply(JobUpdate::cancelled(), Utc::now());
            record.cancel.clone()
        };
        if let Some(token) = token {
            token.cancel();
        }
        tracing::info!(job_id = %id, "Job cancelled");
        true
    }

    /// Attach the token used to signal the job's background work. Last write wins.
    pub fn associate(&self, id: JobId, token: CancellationToken) {
        match self.write().get_mut(&id) {
            Some(record) => record.cancel = Some(token),
            None => tracing::warn!(job_id = %id, "Associate for unknown job ignored"),
        }
    }

    pub fn is_cancelled(&self, id: JobId) -> bool {
        self.read().get(&id).is_some_and(|r| r.job.cancelled)
    }

    pub fn len(&self) -> usize {
        self.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Number of jobs currently in `status`.
    pub fn count_in(&self, status: JobStatus) -> usize {
        self.read()
            .values()
            .filter(|r| r.job.status == status)
            .count()
    }

    /// Remove terminal jobs whose last update is older than the TTL.
    pub fn sweep_expired(&self, now: DateTime<Utc>) -> usize {
        let ttl = match chrono::Duration::from_std(self.config.ttl) {
            Ok(ttl) => ttl,
            Err(e) => {
                tracing::error!("Job TTL out of range, skipping sweep: {e}");
                return 0;
            }
        };
        let mut jobs = self.write();
        let before = jobs.len();
        jobs.retain(|_, r| !(r.job.status.is_terminal() && now - r.job.updated_at > ttl));
        before - jobs.len()
    }

    /// Launch the periodic sweep. Calling it again while running is a no-op.
    pub fn start_sweep(self: &Arc<Self>) {
        let mut slot = self.sweeper.lock().unwrap_or_else(|e| e.into_inner());
        if slot.is_some() {
            return;
        }

        let stop = CancellationToken::new();
        let store = Arc::clone(self);
        let token = stop.clone();
        let interval = self.config.sweep_interval.max(Duration::from_millis(1));
        let handle = tokio::spawn(async move {
            let mut ticker = tokio::time::interval(interval);
            // The first tick fires immediately.
            ticker.tick().await;
            loop {
                tokio::select! {
                    _ = token.cancelled() => break,
                    _ = ticker.tick() => {
                        let removed = store.sweep_expired(Utc::now());
                        if removed > 0 {
                            tracing::info!(removed, remaining = store.len(), "Swept expired jobs");
                        }
                    }
                }
            }
            tracing::debug!("Job sweeper stopped");
        });

        *slot = Some(Sweeper { stop, handle });
        tracing::info!(
            ttl_secs = self.config.ttl.as_secs(),
            interval_secs = interval.as_secs(),
            "Job sweeper started"
        );
    }

    /// Halt the sweep and wait for an in-flight iteration to finish.
    /// Outstanding jobs are left untouched.
    pub async fn stop(&self) {
        let sweeper = self
            .sweeper
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .take();
        let Some(Sweeper { stop, handle }) = sweeper else {
            return;
        };
        stop.cancel();
        if let Err(e) = handle.await {
            tracing::error!("Job sweeper task failed: {e}");
        }
    }
}

impl Default for JobStore {
    fn default() -> Self {
        Self::new(StoreConfig::default())
    }
}
