//! Configuration types.

use std::path::PathBuf;
use std::str::FromStr;
use std::time::Duration;

use secrecy::SecretString;

use crate::error::ConfigError;

/// Well-known file names under the agent home and working directory.
pub mod paths {
    /// Invocation guard, in the agent home.
    pub const GUARD: &str = "agent.pid";
    /// Working directory of the in-flight job, in the agent home.
    pub const WORKING_DIR: &str = "running_job";
    /// Persisted job record, in the working directory.
    pub const RECORD: &str = "job.json";
    /// Worker argument file, in the working directory.
    pub const COMMAND: &str = "command";
    /// Captured worker stdout/stderr, in the working directory.
    pub const CAPTURE: &str = "worker-out.log";
    /// Agent log file, in the log directory.
    pub const LOG: &str = "agent.log";
}

/// Static credential pair attached to every queue and download request.
#[derive(Debug, Clone)]
pub struct Credentials {
    pub username: String,
    pub password: SecretString,
}

/// Agent configuration.
#[derive(Debug, Clone)]
pub struct AgentConfig {
    /// Agent home: holds the guard, the working directory and (by default) the log.
    pub home: PathBuf,
    /// Base URL of the remote work queue.
    pub queue_url: String,
    /// Queue credentials.
    pub credentials: Credentials,
    /// Fixed invocation prefix placed before the job's argument string.
    pub worker_command: String,
    /// Directory for `agent.log`.
    pub log_dir: PathBuf,
    /// Per-request HTTP timeout.
    pub http_timeout: Duration,
    /// Interval between liveness probes while finalizing.
    pub finalize_poll_interval: Duration,
    /// How long to wait for the worker to exit once finalizing. `None` waits forever.
    pub finalize_timeout: Option<Duration>,
}

impl AgentConfig {
    /// Build a config with defaults for everything but the queue and credentials.
    pub fn new(home: impl Into<PathBuf>, queue_url: impl Into<String>, credentials: Credentials) -> Self {
        let home = home.into();
        Self {
            worker_command: default_worker_command(&home),
            log_dir: home.clone(),
            home,
            queue_url: queue_url.into(),
            credentials,
            http_timeout: Duration::from_secs(60),
            finalize_poll_interval: Duration::from_secs(1),
            finalize_timeout: Some(Duration::from_secs(600)), // 10 minutes
        }
    }

    /// Load from `QUEUE_AGENT_*` environment variables.
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Load from an arbitrary key lookup.
    pub fn from_lookup<F>(lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let require = |key: &str| {
            lookup(key)
                .filter(|v| !v.trim().is_empty())
                .ok_or_else(|| ConfigError::MissingEnvVar(key.to_string()))
        };

        let home = lookup("QUEUE_AGENT_HOME")
            .map(PathBuf::from)
            .unwrap_or_else(|| {
                let user_home = lookup("HOME").unwrap_or_else(|| ".".to_string());
                PathBuf::from(user_home).join(".queue-agent")
            });

        let credentials = Credentials {
            username: require("QUEUE_AGENT_USERNAME")?,
            password: SecretString::from(require("QUEUE_AGENT_PASSWORD")?),
        };

        let mut config = Self::new(home, require("QUEUE_AGENT_QUEUE_URL")?, credentials);

        if let Some(cmd) = lookup("QUEUE_AGENT_WORKER_COMMAND") {
            config.worker_command = cmd.trim().to_string();
        }
        if let Some(dir) = lookup("QUEUE_AGENT_LOG_DIR") {
            config.log_dir = PathBuf::from(dir);
        }
        if let Some(secs) = parse_var::<u64, _>(&lookup, "QUEUE_AGENT_HTTP_TIMEOUT_SECS")? {
            config.http_timeout = Duration::from_secs(secs);
        }
        if let Some(ms) = parse_var::<u64, _>(&lookup, "QUEUE_AGENT_FINALIZE_POLL_MS")? {
            config.finalize_poll_interval = Duration::from_millis(ms);
        }
        if let Some(secs) = parse_var::<u64, _>(&lookup, "QUEUE_AGENT_FINALIZE_TIMEOUT_SECS")? {
            config.finalize_timeout = (secs > 0).then(|| Duration::from_secs(secs));
        }

        Ok(config)
    }

    pub fn guard_path(&self) -> PathBuf {
        self.home.join(paths::GUARD)
    }

    pub fn working_dir(&self) -> PathBuf {
        self.home.join(paths::WORKING_DIR)
    }

    pub fn record_path(&self) -> PathBuf {
        self.working_dir().join(paths::RECORD)
    }

    pub fn command_path(&self) -> PathBuf {
        self.working_dir().join(paths::COMMAND)
    }

    pub fn capture_path(&self) -> PathBuf {
        self.working_dir().join(paths::CAPTURE)
    }
}

fn default_worker_command(home: &std::path::Path) -> String {
    format!("/usr/bin/hadoop jar {}", home.join("worker.jar").display())
}

fn parse_var<T, F>(lookup: &F, key: &str) -> Result<Option<T>, ConfigError>
where
    T: FromStr,
    T::Err: std::fmt::Display,
    F: Fn(&str) -> Option<String>,
{
    match lookup(key) {
        None => Ok(None),
        Some(raw) => raw
            .trim()
            .parse()
            .map(Some)
            .map_err(|e: T::Err| ConfigError::InvalidValue {
                key: key.to_string(),
                message: e.to_string(),
            }),
    }
}
