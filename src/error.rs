//! Error types for the queue agent.

use std::path::PathBuf;
use std::time::Duration;

use crate::queue::JobStatus;

/// Top-level error type for the agent.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error("Configuration error: {0}")]
    Config(#[from] ConfigError),

    #[error("Queue error: {0}")]
    Queue(#[from] QueueError),

    #[error("Staging error: {0}")]
    Stage(#[from] StageError),

    #[error("Launch error: {0}")]
    Launch(#[from] LaunchError),

    #[error("State error: {0}")]
    State(#[from] StateError),

    #[error("Guard error: {0}")]
    Guard(#[from] GuardError),

    #[error("Job error: {0}")]
    Job(#[from] JobError),
}

/// Configuration-related errors.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Missing required environment variable: {0}")]
    MissingEnvVar(String),

    #[error("Invalid configuration value for {key}: {message}")]
    InvalidValue { key: String, message: String },

    #[error("Failed to build HTTP client: {0}")]
    HttpClient(String),
}

/// Remote work-queue errors.
#[derive(Debug, thiserror::Error)]
pub enum QueueError {
    #[error("Queue request failed: {0}")]
    Transport(#[from] reqwest::Error),

    #[error("Queue returned status {status} while {action}")]
    Status { status: u16, action: &'static str },

    #[error("Invalid queue response: {0}")]
    Decode(String),

    #[error("Queue offered a new job without a job id")]
    MissingJobId,
}

/// Dependency download errors.
#[derive(Debug, thiserror::Error)]
pub enum StageError {
    #[error("Download of {location} failed: {source}")]
    Transport {
        location: String,
        #[source]
        source: reqwest::Error,
    },

    #[error("Download of {location} returned status {status}")]
    Status { location: String, status: u16 },

    #[error("Dependency location has no usable file name: {0}")]
    BadLocation(String),

    #[error("Failed to write {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
}

/// Worker launch errors.
#[derive(Debug, thiserror::Error)]
pub enum LaunchError {
    #[error("Failed to open capture file {path}: {source}")]
    CaptureFile {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Failed to spawn worker: {0}")]
    Spawn(#[source] std::io::Error),

    #[error("Worker exited before reporting a process id")]
    NoPid,
}

/// Persisted job record errors.
#[derive(Debug, thiserror::Error)]
pub enum StateError {
    #[error("Job record missing at {0}")]
    Missing(PathBuf),

    #[error("Job record I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Job record is corrupt: {0}")]
    Corrupt(#[from] serde_json::Error),

    #[error("Job {job_id} cannot move from {from} to {to}")]
    InvalidTransition {
        job_id: String,
        from: String,
        to: JobStatus,
    },
}

/// Invocation guard errors.
#[derive(Debug, thiserror::Error)]
pub enum GuardError {
    #[error("Another invocation is active (guard created {age_secs}s ago)")]
    AlreadyRunning { age_secs: i64 },

    #[error("Removed stale guard left by a dead invocation (pid {pid})")]
    Stale { pid: u32 },

    #[error("Guard I/O error at {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
}

/// Job lifecycle errors that end an invocation.
#[derive(Debug, thiserror::Error)]
pub enum JobError {
    #[error("Job {job_id} worker (pid {pid}) still alive {waited:?} after terminal outcome")]
    WorkerStuck {
        job_id: String,
        pid: u32,
        waited: Duration,
    },

    #[error("Working directory {path}: {source}")]
    Workspace {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
}

/// Result type alias for the agent.
pub type Result<T> = std::result::Result<T, Error>;
