// crates/server-jobs/src/types.rs
//! Types for the generation job registry.

use std::fmt;
use std::str::FromStr;

use bytes::Bytes;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
#[cfg(feature = "codegen")]
use ts_rs::TS;
use utoipa::ToSchema;
use uuid::Uuid;

/// Unique identifier for a job. Random, never reused within a process.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct JobId(Uuid);

impl JobId {
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }

    pub fn as_uuid(&self) -> &Uuid {
        &self.0
    }
}

impl Default for JobId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for JobId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.0.hyphenated().fmt(f)
    }
}

impl FromStr for JobId {
    type Err = uuid::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Uuid::parse_str(s).map(Self)
    }
}

/// Lifecycle state of a job.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, ToSchema)]
#[cfg_attr(feature = "codegen", derive(TS), ts(export, export_to = "../../../frontend/src/types/generated/"))]
#[serde(rename_all = "lowercase")]
pub enum JobStatus {
    Queued,
    Processing,
    Streaming,
    Completed,
    Failed,
    Cancelled,
}

impl JobStatus {
    /// Completed, failed and cancelled jobs never change state again.
    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            JobStatus::Completed | JobStatus::Failed | JobStatus::Cancelled
        )
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            JobStatus::Queued => "queued",
            JobStatus::Processing => "processing",
            JobStatus::Streaming => "streaming",
            JobStatus::Completed => "completed",
            JobStatus::Failed => "failed",
            JobStatus::Cancelled => "cancelled",
        }
    }
}

impl fmt::Display for JobStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Encoded audio produced by a completed job.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct JobResult {
    pub audio: Bytes,
    pub sample_rate: u32,
}

/// Snapshot of a job record.
#[derive(Debug, Clone, PartialEq)]
pub struct Job {
    pub id: JobId,
    pub status: JobStatus,
    pub progress: Option<f32>,
    pub error: Option<String>,
    pub result: Option<JobResult>,
    pub cancelled: bool,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Job {
    pub(crate) fn new(id: JobId, now: DateTime<Utc>) -> Self {
        Self {
            id,
            status: JobStatus::Queued,
            progress: None,
            error: None,
            result: None,
            cancelled: false,
            created_at: now,
            updated_at: now,
        }
    }

    /// Merge the supplied fields. Keeps `error` tied to `Failed` and `result`
    /// tied to `Completed`; fields that would break that pairing are dropped.
    pub(crate) fn apply(&mut self, update: JobUpdate, now: DateTime<Utc>) {
        if let Some(status) = update.status {
            self.status = status;
            if status == JobStatus::Cancelled {
                self.cancelled = true;
            }
        }
        if let Some(progress) = update.progress {
            self.progress = Some(progress.clamp(0.0, 1.0));
        }

        match (self.status, update.error) {
            (JobStatus::Failed, Some(error)) => self.error = Some(error),
            (JobStatus::Failed, None) if self.error.is_none() => {
                self.error = Some("Unknown error".to_string())
            }
            (status, Some(error)) => {
                tracing::warn!(job_id = %self.id, %status, %error, "Dropping error on non-failed job");
            }
            _ => {}
        }

        match (self.status, update.result) {
            (JobStatus::Completed, Some(result)) => self.result = Some(result),
            (status, Some(_)) => {
                tracing::warn!(job_id = %self.id, %status, "Dropping result on non-completed job");
            }
            _ => {}
        }

        self.updated_at = now;
    }
}

/// A partial update: only `Some` fields are merged into the record.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct JobUpdate {
    pub status: Option<JobStatus>,
    pub progress: Option<f32>,
    pub error: Option<String>,
    pub result: Option<JobResult>,
}

impl JobUpdate {
    pub fn status(status: JobStatus) -> Self {
        Self {
            status: Some(status),
            ..Self::default()
        }
    }

    pub fn progress(progress: f32) -> Self {
        Self {
            progress: Some(progress),
            ..Self::default()
        }
    }

    pub fn processing(progress: f32) -> Self {
        Self {
            status: Some(JobStatus::Processing),
            progress: Some(progress),
            ..Self::default()
        }
    }

    pub fn completed(result: JobResult) -> Self {
        Self {
            status: Some(JobStatus::Completed),
            progress: Some(1.0),
            result: Some(result),
            ..Self::default()
        }
    }

    pub fn failed(error: impl Into<String>) -> Self {
        Self {
            status: Some(JobStatus::Failed),
            error: Some(error.into()),
            ..Self::default()
        }
    }

    pub fn cancelled() -> Self {
        Self::status(JobStatus::Cancelled)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    fn job() -> Job {
        Job::new(JobId::new(), Utc::now())
    }

    #[test]
    fn test_job_id_roundtrips_through_string() {
        let id = JobId::new();
        let parsed: JobId = id.to_string().parse().unwrap();
        assert_eq!(parsed, id);
        assert!("nonexistent-id".parse::<JobId>().is_err());
        assert_ne!(JobId::new(), JobId::new());
    }

    #[test]
    fn test_status_serialization_and_terminality() {
        assert_eq!(serde_json::to_string(&JobStatus::Queued).unwrap(), "\"queued\"");
        assert_eq!(
            serde_json::to_string(&JobStatus::Cancelled).unwrap(),
            "\"cancelled\""
        );
        let terminal: Vec<_> = [
            JobStatus::Queued,
            JobStatus::Processing,
            JobStatus::Streaming,
            JobStatus::Completed,
            JobStatus::Failed,
            JobStatus::Cancelled,
        ]
        .into_iter()
        .filter(JobStatus::is_terminal)
        .collect();
        assert_eq!(
            terminal,
            vec![JobStatus::Completed, JobStatus::Failed, JobStatus::Cancelled]
        );
    }

    #[test]
    fn test_new_job_is_queued_without_progress() {
        let job = job();
        assert_eq!(job.status, JobStatus::Queued);
        assert_eq!(job.progress, None);
        assert_eq!(job.created_at, job.updated_at);
        assert!(!job.cancelled);
    }

    #[test]
    fn test_apply_merges_only_supplied_fields() {
        let mut job = job();
        job.apply(JobUpdate::processing(0.1), Utc::now());
        job.apply(JobUpdate::progress(0.4), Utc::now());
        assert_eq!(job.status, JobStatus::Processing);
        assert_eq!(job.progress, Some(0.4));
        assert!(job.updated_at >= job.created_at);
    }

    #[test]
    fn test_apply_clamps_progress() {
        let mut job = job();
        job.apply(JobUpdate::progress(1.7), Utc::now());
        assert_eq!(job.progress, Some(1.0));
    }

    #[test]
    fn test_error_only_with_failed_status() {
        let mut job = job();
        job.apply(
            JobUpdate {
                error: Some("stray".to_string()),
                ..JobUpdate::default()
            },
            Utc::now(),
        );
        assert_eq!(job.error, None);

        job.apply(JobUpdate::status(JobStatus::Failed), Utc::now());
        assert_eq!(job.error.as_deref(), Some("Unknown error"));
    }

    #[test]
    fn test_result_only_with_completed_status() {
        let result = JobResult {
            audio: Bytes::from_static(b"RIFF"),
            sample_rate: 24_000,
        };
        let mut job = job();
        job.apply(
            JobUpdate {
                result: Some(result.clone()),
                ..JobUpdate::default()
            },
            Utc::now(),
        );
        assert_eq!(job.result, None);

        job.apply(JobUpdate::completed(result.clone()), Utc::now());
        assert_eq!(job.status, JobStatus::Completed);
        assert_eq!(job.progress, Some(1.0));
        assert_eq!(job.result, Some(result));
    }

    #[test]
    fn test_cancelled_status_sets_flag() {
        let mut job = job();
        job.apply(JobUpdate::cancelled(), Utc::now());
        assert!(job.cancelled);
    }
}
