//! Persisted job record — the only durable state between invocations.
//!
//! Lives inside the working directory and disappears with it. Writes go to a
//! sibling temp file first and are renamed into place, so a crash mid-write
//! leaves the previous record intact.

use std::path::Path;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::error::StateError;
use crate::queue::JobStatus;

/// Where the in-flight job is in its lifecycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum JobPhase {
    /// Working directory created, worker not (yet) launched.
    Starting,
    /// Worker launched and being observed.
    Running,
    /// Terminal status recorded; waiting for exit and output upload.
    Finalizing,
}

impl std::fmt::Display for JobPhase {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            Self::Starting => "starting",
            Self::Running => "running",
            Self::Finalizing => "finalizing",
        };
        write!(f, "{s}")
    }
}

/// State of the single in-flight job.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct JobRecord {
    pub phase: JobPhase,
    pub job_id: String,
    /// Worker pid, once launched.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub worker_pid: Option<u32>,
    /// Last status reported to the queue.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub status: Option<JobStatus>,
    pub started_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl JobRecord {
    pub fn new(job_id: impl Into<String>) -> Self {
        let now = Utc::now();
        Self {
            phase: JobPhase::Starting,
            job_id: job_id.into(),
            worker_pid: None,
            status: None,
            started_at: now,
            updated_at: now,
        }
    }

    /// Move the reported status forward. The first status must be `submitted`,
    /// unless the job fails before it was ever reported.
    pub fn advance(&mut self, target: JobStatus) -> Result<(), StateError> {
        let allowed = match self.status {
            None => matches!(target, JobStatus::Submitted | JobStatus::Fail),
            Some(current) => current.can_transition_to(target),
        };
        if !allowed {
            return Err(StateError::InvalidTransition {
                job_id: self.job_id.clone(),
                from: self
                    .status
                    .map_or_else(|| "nothing".to_string(), |s| s.to_string()),
                to: target,
            });
        }

        self.status = Some(target);
        if target.is_terminal() {
            self.phase = JobPhase::Finalizing;
        }
        self.touch();
        Ok(())
    }

    /// Record a launched worker.
    pub fn set_worker(&mut self, pid: u32) {
        self.worker_pid = Some(pid);
        self.phase = JobPhase::Running;
        self.touch();
    }

    /// Terminal status already reported, if any.
    pub fn terminal_status(&self) -> Option<JobStatus> {
        self.status.filter(JobStatus::is_terminal)
    }

    fn touch(&mut self) {
        self.updated_at = Utc::now();
    }

    pub async fn load(path: &Path) -> Result<Self, StateError> {
        let raw = match tokio::fs::read(path).await {
            Ok(raw) => raw,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                return Err(StateError::Missing(path.to_path_buf()));
            }
            Err(e) => return Err(e.into()),
        };
        Ok(serde_json::from_slice(&raw)?)
    }

    pub async fn save(&self, path: &Path) -> Result<(), StateError> {
        let json = serde_json::to_vec_pretty(self)?;
        let tmp = path.with_extension("json.tmp");
        tokio::fs::write(&tmp, &json).await?;
        tokio::fs::rename(&tmp, path).await?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn first_status_must_be_submitted() {
        let mut record = JobRecord::new("42");
        assert!(record.advance(JobStatus::Running).is_err());
        record.advance(JobStatus::Submitted).unwrap();
        assert_eq!(record.status, Some(JobStatus::Submitted));
        assert_eq!(record.phase, JobPhase::Starting);
    }

    #[test]
    fn unreported_job_can_only_fail() {
        let mut record = JobRecord::new("42");
        assert!(record.advance(JobStatus::Success).is_err());
        record.advance(JobStatus::Fail).unwrap();
        assert_eq!(record.phase, JobPhase::Finalizing);
        assert_eq!(record.terminal_status(), Some(JobStatus::Fail));
        assert!(record.advance(JobStatus::Submitted).is_err());
    }

    #[test]
    fn status_never_regresses() {
        let mut record = JobRecord::new("42");
        record.advance(JobStatus::Submitted).unwrap();
        record.advance(JobStatus::Running).unwrap();
        let err = record.advance(JobStatus::Submitted).unwrap_err();
        assert!(matches!(err, StateError::InvalidTransition { .. }));
        assert_eq!(record.status, Some(JobStatus::Running));
    }

    #[test]
    fn terminal_status_is_recorded_once() {
        let mut record = JobRecord::new("42");
        record.advance(JobStatus::Submitted).unwrap();
        record.set_worker(1234);
        record.advance(JobStatus::Running).unwrap();
        record.advance(JobStatus::Success).unwrap();

        assert_eq!(record.phase, JobPhase::Finalizing);
        assert_eq!(record.terminal_status(), Some(JobStatus::Success));
        assert!(record.advance(JobStatus::Fail).is_err());
        assert!(record.advance(JobStatus::Success).is_err());
    }

    #[test]
    fn failed_launch_can_still_fail() {
        let mut record = JobRecord::new("42");
        record.advance(JobStatus::Submitted).unwrap();
        record.advance(JobStatus::Fail).unwrap();
        assert_eq!(record.worker_pid, None);
        assert_eq!(record.terminal_status(), Some(JobStatus::Fail));
    }

    #[tokio::test]
    async fn save_replaces_atomically_and_loads_back() {
        let dir = tempfile::TempDir::new().unwrap();
        let path = dir.path().join("job.json");

        let mut record = JobRecord::new("42");
        record.save(&path).await.unwrap();
        record.advance(JobStatus::Submitted).unwrap();
        record.set_worker(777);
        record.save(&path).await.unwrap();

        let loaded = JobRecord::load(&path).await.unwrap();
        assert_eq!(loaded, record);
        assert!(!path.with_extension("json.tmp").exists());
    }

    #[tokio::test]
    async fn load_reports_missing_and_corrupt() {
        let dir = tempfile::TempDir::new().unwrap();
        let path = dir.path().join("job.json");
        assert!(matches!(
            JobRecord::load(&path).await,
            Err(StateError::Missing(_))
        ));

        std::fs::write(&path, b"{not json").unwrap();
        assert!(matches!(
            JobRecord::load(&path).await,
            Err(StateError::Corrupt(_))
        ));
    }
}
