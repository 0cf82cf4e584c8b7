//! Invocation guard — keeps overlapping invocations from touching job state.
//!
//! The guard is a file holding the owning invocation's pid. It is created
//! with `create_new`, so exactly one invocation wins, and removed on drop so
//! every exit path (including unwinding) releases it.

use std::fs::OpenOptions;
use std::io::Write;
use std::path::{Path, PathBuf};

use chrono::{DateTime, Utc};
use tracing::{debug, warn};

use crate::error::GuardError;
use crate::runner::ProcessProbe;

/// Held for the duration of one invocation.
#[derive(Debug)]
pub struct InvocationGuard {
    path: PathBuf,
}

impl InvocationGuard {
    /// Create the guard file or report who holds it.
    ///
    /// A guard left behind by a dead invocation is removed and reported as
    /// [`GuardError::Stale`]; the caller still stops, and the next invocation
    /// proceeds normally.
    pub fn acquire(path: impl Into<PathBuf>, probe: &dyn ProcessProbe) -> Result<Self, GuardError> {
        let path = path.into();
        let io_err = |source| GuardError::Io {
            path: path.clone(),
            source,
        };

        let mut file = match OpenOptions::new().write(true).create_new(true).open(&path) {
            Ok(file) => file,
            Err(e) if e.kind() == std::io::ErrorKind::AlreadyExists => {
                return Err(inspect_existing(&path, probe));
            }
            Err(e) => return Err(io_err(e)),
        };

        // Construct first so a failed write still removes the file on drop.
        let guard = Self { path: path.clone() };
        write!(file, "{}", std::process::id()).map_err(io_err)?;
        debug!(path = %path.display(), "Invocation guard acquired");
        Ok(guard)
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl Drop for InvocationGuard {
    fn drop(&mut self) {
        match std::fs::remove_file(&self.path) {
            Ok(()) => debug!(path = %self.path.display(), "Invocation guard released"),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {}
            Err(e) => warn!(path = %self.path.display(), error = %e, "Failed to remove invocation guard"),
        }
    }
}

fn inspect_existing(path: &Path, probe: &dyn ProcessProbe) -> GuardError {
    let age_secs = std::fs::metadata(path)
        .and_then(|m| m.modified())
        .map(|t| (Utc::now() - DateTime::<Utc>::from(t)).num_seconds())
        .unwrap_or(0);

    let owner = std::fs::read_to_string(path)
        .ok()
        .and_then(|s| s.trim().parse::<u32>().ok());

    match owner {
        Some(pid) if !probe.is_alive(pid) => match std::fs::remove_file(path) {
            Ok(()) => GuardError::Stale { pid },
            Err(source) => GuardError::Io {
                path: path.to_path_buf(),
                source,
            },
        },
        _ => GuardError::AlreadyRunning { age_secs },
    }
}
