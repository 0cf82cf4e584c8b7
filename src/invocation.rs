//! One scheduled invocation: take the guard, run one lifecycle pass, map the
//! result to a process exit code.

use tracing::{debug, error};

use crate::config::AgentConfig;
use crate::error::{Error, GuardError, JobError};
use crate::guard::InvocationGuard;
use crate::job::JobLifecycleController;
use crate::runner::SignalProbe;

pub const EXIT_OK: u8 = 0;
/// Setup failed, or the working directory could not be managed.
pub const EXIT_FAILURE: u8 = 1;
/// Another invocation holds the guard (or a stale one was just cleared).
pub const EXIT_ALREADY_RUNNING: u8 = 2;
/// The worker outlived the finalize timeout.
pub const EXIT_WORKER_STUCK: u8 = 3;

/// Run one guarded pass and return the exit code.
pub async fn run(config: AgentConfig) -> u8 {
    if let Err(e) = std::fs::create_dir_all(&config.home) {
        error!(home = %config.home.display(), error = %e, "Cannot create agent home");
        return EXIT_FAILURE;
    }

    // Released on every return below.
    let _guard = match InvocationGuard::acquire(config.guard_path(), &SignalProbe) {
        Ok(guard) => guard,
        Err(e @ (GuardError::AlreadyRunning { .. } | GuardError::Stale { .. })) => {
            error!("STOPPING: {e}");
            return EXIT_ALREADY_RUNNING;
        }
        Err(e) => {
            error!(error = %e, "Cannot create invocation guard");
            return EXIT_FAILURE;
        }
    };
    debug!("Invocation started");

    let controller = match JobLifecycleController::new(config) {
        Ok(controller) => controller,
        Err(e) => {
            error!(error = %e, "Failed to set up controller");
            return EXIT_FAILURE;
        }
    };

    match controller.run_once().await {
        Ok(outcome) => {
            debug!(?outcome, "Invocation finished");
            EXIT_OK
        }
        Err(Error::Job(e @ JobError::WorkerStuck { .. })) => {
            error!(error = %e, "Worker did not exit; will retry finalize next invocation");
            EXIT_WORKER_STUCK
        }
        Err(e) => {
            error!(error = %e, "Invocation failed");
            EXIT_FAILURE
        }
    }
}
