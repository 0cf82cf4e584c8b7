//! Job lifecycle controller — one pass per invocation.
//!
//! Each call to [`JobLifecycleController::run_once`] takes exactly one of three
//! paths, decided by what is on disk:
//!
//! - **start**: no working directory. Poll the queue; if a job is offered,
//!   stage it, report `submitted`, launch the worker, report `running`.
//! - **observe**: working directory present, worker alive, no terminal marker
//!   in its output. Push tracking URL and progress.
//! - **finalize**: terminal marker seen, or worker gone. Report the terminal
//!   status, wait for the worker to exit, upload the captured output, remove
//!   the working directory.
//!
//! Transient failures (queue, downloads, unreadable files) are logged and the
//! pass continues with the failed result treated as absent. Status pushes are
//! at-most-once: the record is updated before the push, never after.

use std::path::PathBuf;
use std::time::Instant;

use tracing::{debug, error, info, warn};

use crate::config::AgentConfig;
use crate::error::{ConfigError, JobError};
use crate::job::record::{JobPhase, JobRecord};
use crate::queue::{JobStatus, JobUpdate, QueueClient};
use crate::runner::launcher::read_arguments;
use crate::runner::output::read_capture;
use crate::runner::{
    HadoopLogInterpreter, Outcome, OutputInterpreter, ProcessProbe, SignalProbe, WorkerLauncher,
    WorkerReport,
};
use crate::stager::DependencyStager;

/// What one invocation did.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum InvocationOutcome {
    /// The queue had nothing for us.
    NoWork,
    /// Polling the queue failed; the next invocation retries.
    QueueUnavailable,
    /// A new job was set up. `pid` is `None` if the launch failed.
    Started { job_id: String, pid: Option<u32> },
    /// The in-flight job is still running.
    Observed {
        job_id: String,
        report: WorkerReport,
    },
    /// The in-flight job finished and its working directory was removed.
    /// `status` is the terminal status recorded for the queue, if any.
    Finalized {
        job_id: String,
        status: Option<JobStatus>,
    },
    /// A working directory without a usable record was removed.
    Discarded,
}

/// Drives the single in-flight job.
pub struct JobLifecycleController {
    config: AgentConfig,
    queue: QueueClient,
    stager: DependencyStager,
    launcher: WorkerLauncher,
    interpreter: Box<dyn OutputInterpreter>,
    probe: Box<dyn ProcessProbe>,
}

impl JobLifecycleController {
    pub fn new(config: AgentConfig) -> crate::Result<Self> {
        let queue_client = reqwest::Client::builder()
            .timeout(config.http_timeout)
            .build()
            .map_err(|e| ConfigError::HttpClient(e.to_string()))?;
        // Large dependencies may take longer than any total limit; bound only
        // connecting and each read.
        let download_client = reqwest::Client::builder()
            .connect_timeout(config.http_timeout)
            .read_timeout(config.http_timeout)
            .build()
            .map_err(|e| ConfigError::HttpClient(e.to_string()))?;

        Ok(Self {
            queue: QueueClient::with_client(
                config.queue_url.clone(),
                config.credentials.clone(),
                queue_client,
            ),
            stager: DependencyStager::new(config.credentials.clone(), download_client),
            launcher: WorkerLauncher::new(config.worker_command.clone()),
            interpreter: Box::new(HadoopLogInterpreter),
            probe: Box::new(SignalProbe),
            config,
        })
    }

    /// Replace the liveness probe.
    pub fn with_probe(mut self, probe: impl ProcessProbe + 'static) -> Self {
        self.probe = Box::new(probe);
        self
    }

    /// Replace the output interpreter.
    pub fn with_interpreter(mut self, interpreter: impl OutputInterpreter + 'static) -> Self {
        self.interpreter = Box::new(interpreter);
        self
    }

    pub fn config(&self) -> &AgentConfig {
        &self.config
    }

    /// Run one invocation's worth of lifecycle work.
    pub async fn run_once(&self) -> crate::Result<InvocationOutcome> {
        let workdir = self.config.working_dir();
        let in_flight = tokio::fs::try_exists(&workdir)
            .await
            .map_err(|source| JobError::Workspace {
                path: workdir.clone(),
                source,
            })?;

        if in_flight {
            self.resume().await
        } else {
            self.start().await
        }
    }

    // ── Start ───────────────────────────────────────────────────────────

    async fn start(&self) -> crate::Result<InvocationOutcome> {
        let job = match self.queue.fetch_next_job().await {
            Ok(Some(job)) => job,
            Ok(None) => {
                debug!("No new job");
                return Ok(InvocationOutcome::NoWork);
            }
            Err(e) => {
                error!(error = %e, "Failed to poll queue for a new job");
                return Ok(InvocationOutcome::QueueUnavailable);
            }
        };

        let workdir = self.config.working_dir();
        tokio::fs::create_dir(&workdir)
            .await
            .map_err(|source| JobError::Workspace {
                path: workdir.clone(),
                source,
            })?;

        info!(job_id = %job.id, dependencies = job.dependencies.len(), "Starting job");

        let mut record = JobRecord::new(&job.id);
        self.persist(&record).await;

        let summary = self.stager.stage_all(&job.dependencies, &workdir).await;
        if !summary.is_complete() {
            warn!(
                job_id = %job.id,
                staged = summary.staged.len(),
                failed = summary.failed.len(),
                "Some dependencies could not be staged"
            );
        }

        self.report(&mut record, JobStatus::Submitted).await;

        let command_path = self.config.command_path();
        let args = match read_arguments(&command_path).await {
            Ok(args) => args,
            Err(e) => {
                error!(
                    job_id = %job.id,
                    path = %command_path.display(),
                    error = %e,
                    "Failed to read command file; launching without arguments"
                );
                String::new()
            }
        };

        let handle = match self
            .launcher
            .launch(&job.id, &args, &workdir, &self.config.capture_path())
        {
            Ok(handle) => handle,
            Err(e) => {
                error!(job_id = %job.id, error = %e, "Failed to launch worker");
                return Ok(InvocationOutcome::Started {
                    job_id: job.id,
                    pid: None,
                });
            }
        };

        record.set_worker(handle.pid);
        self.persist(&record).await;
        self.report(&mut record, JobStatus::Running).await;

        Ok(InvocationOutcome::Started {
            job_id: job.id,
            pid: Some(handle.pid),
        })
    }

    // ── Observe / finalize ──────────────────────────────────────────────

    async fn resume(&self) -> crate::Result<InvocationOutcome> {
        let mut record = match JobRecord::load(&self.config.record_path()).await {
            Ok(record) => record,
            Err(e) => {
                error!(error = %e, "Working directory has no usable job record; discarding it");
                self.remove_workdir().await?;
                return Ok(InvocationOutcome::Discarded);
            }
        };

        if record.phase == JobPhase::Finalizing {
            debug!(job_id = %record.job_id, "Resuming interrupted finalize");
            return self.finalize(record).await;
        }

        let report = self.interpreter.interpret(&self.captured_output(&record).await);
        if report.tracking.is_none() {
            debug!(job_id = %record.job_id, "Tracking URL not present yet");
        }
        if report.progress.is_none() {
            debug!(job_id = %record.job_id, "Progress not present yet");
        }

        let observation = JobUpdate::observation(report.tracking.clone(), report.progress.clone());
        if !observation.is_empty() {
            self.push(&record.job_id, &observation).await;
        }

        let alive = match record.worker_pid {
            Some(pid) => self.probe.is_alive(pid),
            None => {
                error!(job_id = %record.job_id, "Job record has no worker pid");
                false
            }
        };

        let status = match (report.outcome, alive) {
            (None, true) => {
                return Ok(InvocationOutcome::Observed {
                    job_id: record.job_id,
                    report,
                });
            }
            (Some(Outcome::Success), _) => JobStatus::Success,
            (Some(Outcome::Failure), _) => JobStatus::Fail,
            (None, false) => {
                warn!(
                    job_id = %record.job_id,
                    "Worker exited without a terminal marker; reporting failure"
                );
                JobStatus::Fail
            }
        };

        if self.report(&mut record, status).await {
            match status {
                JobStatus::Success => info!(job_id = %record.job_id, "Job succeeded"),
                _ => info!(job_id = %record.job_id, "Job failed"),
            }
        }

        self.finalize(record).await
    }

    async fn finalize(&self, record: JobRecord) -> crate::Result<InvocationOutcome> {
        // Output may show the terminal marker slightly before the process exits.
        if let Some(pid) = record.worker_pid {
            self.wait_for_exit(&record.job_id, pid).await?;
        }

        let output = self.captured_output(&record).await;
        let update = JobUpdate::output(output);
        if !update.is_empty() {
            self.push(&record.job_id, &update).await;
        }

        self.remove_workdir().await?;

        let status = record.terminal_status();
        match status {
            Some(status) => info!(job_id = %record.job_id, status = %status, "Job finalized"),
            None => error!(job_id = %record.job_id, "Job finalized without a terminal status"),
        }
        Ok(InvocationOutcome::Finalized {
            job_id: record.job_id,
            status,
        })
    }

    async fn wait_for_exit(&self, job_id: &str, pid: u32) -> Result<(), JobError> {
        let started = Instant::now();
        while self.probe.is_alive(pid) {
            let waited = started.elapsed();
            if self
                .config
                .finalize_timeout
                .is_some_and(|limit| waited >= limit)
            {
                return Err(JobError::WorkerStuck {
                    job_id: job_id.to_string(),
                    pid,
                    waited,
                });
            }
            tokio::time::sleep(self.config.finalize_poll_interval).await;
        }
        Ok(())
    }

    // ── Helpers ─────────────────────────────────────────────────────────

    /// Advance the record, persist it, then push the status. Returns `false`
    /// if the transition was refused and nothing was sent.
    async fn report(&self, record: &mut JobRecord, status: JobStatus) -> bool {
        if let Err(e) = record.advance(status) {
            error!(error = %e, "Refusing to report status");
            return false;
        }
        self.persist(record).await;
        self.push(&record.job_id, &JobUpdate::status(status)).await;
        info!(job_id = %record.job_id, status = %status, "Job status set");
        true
    }

    async fn persist(&self, record: &JobRecord) {
        if let Err(e) = record.save(&self.config.record_path()).await {
            error!(job_id = %record.job_id, error = %e, "Failed to write job record");
        }
    }

    async fn push(&self, job_id: &str, update: &JobUpdate) {
        if let Err(e) = self.queue.push_update(job_id, update).await {
            error!(job_id = %job_id, error = %e, "Failed to push job update");
        }
    }

    async fn captured_output(&self, record: &JobRecord) -> String {
        let path = self.config.capture_path();
        match read_capture(&path).await {
            Ok(text) => text,
            Err(e) => {
                error!(
                    job_id = %record.job_id,
                    path = %path.display(),
                    error = %e,
                    "Worker output file is unreadable"
                );
                String::new()
            }
        }
    }

    async fn remove_workdir(&self) -> Result<(), JobError> {
        let path: PathBuf = self.config.working_dir();
        tokio::fs::remove_dir_all(&path)
            .await
            .map_err(|source| JobError::Workspace { path, source })
    }
}
