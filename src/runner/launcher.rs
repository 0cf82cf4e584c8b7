//! Worker launcher — starts the external batch worker in the background.

use std::path::{Path, PathBuf};
use std::process::Stdio;

use tokio::process::Command;
use tracing::info;

use crate::error::LaunchError;

/// Environment variable carrying the queue's job id into the worker.
pub const JOB_ID_ENV: &str = "QUEUE_AGENT_JOB_ID";

/// A launched worker. The process is not waited on.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WorkerHandle {
    pub pid: u32,
    pub command_line: String,
}

/// Launches `sh -c "<prefix> <args>"` with output redirected to a capture file.
#[derive(Debug, Clone)]
pub struct WorkerLauncher {
    prefix: String,
}

impl WorkerLauncher {
    pub fn new(prefix: impl Into<String>) -> Self {
        Self {
            prefix: prefix.into(),
        }
    }

    /// Full shell command line for a given argument string.
    pub fn command_line(&self, args: &str) -> String {
        format!("{} {}", self.prefix.trim(), args.trim())
            .trim()
            .to_string()
    }

    /// Start the worker in `workdir` and return immediately.
    ///
    /// stdout and stderr are both appended to `capture`. The worker gets its
    /// own process group so it outlives this invocation.
    pub fn launch(
        &self,
        job_id: &str,
        args: &str,
        workdir: &Path,
        capture: &Path,
    ) -> Result<WorkerHandle, LaunchError> {
        let open_err = |source| LaunchError::CaptureFile {
            path: PathBuf::from(capture),
            source,
        };
        let stdout = std::fs::OpenOptions::new()
            .create(true)
            .append(true)
            .open(capture)
            .map_err(open_err)?;
        let stderr = stdout.try_clone().map_err(open_err)?;

        let command_line = self.command_line(args);

        let mut command = Command::new("sh");
        command
            .arg("-c")
            .arg(&command_line)
            .current_dir(workdir)
            .env(JOB_ID_ENV, job_id)
            .stdin(Stdio::null())
            .stdout(Stdio::from(stdout))
            .stderr(Stdio::from(stderr))
            .kill_on_drop(false);
        #[cfg(unix)]
        command.process_group(0);

        let child = command.spawn().map_err(LaunchError::Spawn)?;
        let pid = child.id().ok_or(LaunchError::NoPid)?;

        info!(job_id = %job_id, pid, command = %command_line, "Worker launched");

        Ok(WorkerHandle { pid, command_line })
    }
}

/// Read the command file and join its trimmed lines with single spaces.
pub async fn read_arguments(path: &Path) -> std::io::Result<String> {
    let text = tokio::fs::read_to_string(path).await?;
    Ok(join_arguments(&text))
}

fn join_arguments(text: &str) -> String {
    text.lines()
        .map(str::trim)
        .filter(|line| !line.is_empty())
        .collect::<Vec<_>>()
        .join(" ")
}
