//! Dependency staging — downloads a job's declared files into its working directory.
//!
//! Each file is saved under the basename of its location, not its logical
//! dependency name. A failed download is logged and skipped; the remaining
//! dependencies are still attempted.

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

use secrecy::ExposeSecret;
use tracing::{debug, error};

use crate::config::Credentials;
use crate::error::StageError;

/// Outcome of staging one job's dependencies.
#[derive(Debug, Default)]
pub struct StageSummary {
    /// Files written, in download order.
    pub staged: Vec<PathBuf>,
    /// Dependency name and the reason it was skipped.
    pub failed: Vec<(String, StageError)>,
}

impl StageSummary {
    pub fn is_complete(&self) -> bool {
        self.failed.is_empty()
    }
}

/// Downloads dependencies with the queue credentials.
#[derive(Debug, Clone)]
pub struct DependencyStager {
    credentials: Credentials,
    client: reqwest::Client,
}

impl DependencyStager {
    pub fn new(credentials: Credentials, client: reqwest::Client) -> Self {
        Self {
            credentials,
            client,
        }
    }

    /// Fetch every dependency into `dir`.
    pub async fn stage_all(&self, dependencies: &BTreeMap<String, String>, dir: &Path) -> StageSummary {
        let mut summary = StageSummary::default();

        for (name, location) in dependencies {
            match self.stage_one(location, dir).await {
                Ok(path) => {
                    debug!(dependency = %name, path = %path.display(), "Staged dependency");
                    summary.staged.push(path);
                }
                Err(e) => {
                    error!(dependency = %name, error = %e, "Failed to stage dependency");
                    summary.failed.push((name.clone(), e));
                }
            }
        }

        summary
    }

    /// Fetch a single location and write its bytes verbatim to `dir/<basename>`.
    pub async fn stage_one(&self, location: &str, dir: &Path) -> Result<PathBuf, StageError> {
        let file_name = basename(location)?;

        let resp = self
            .client
            .get(location)
            .basic_auth(
                &self.credentials.username,
                Some(self.credentials.password.expose_secret()),
            )
            .send()
            .await
            .map_err(|source| StageError::Transport {
                location: location.to_string(),
                source,
            })?;

        if !resp.status().is_success() {
            return Err(StageError::Status {
                location: location.to_string(),
                status: resp.status().as_u16(),
            });
        }

        let bytes = resp.bytes().await.map_err(|source| StageError::Transport {
            location: location.to_string(),
            source,
        })?;

        let path = dir.join(file_name);
        tokio::fs::write(&path, &bytes)
            .await
            .map_err(|source| StageError::Io {
                path: path.clone(),
                source,
            })?;

        Ok(path)
    }
}

/// Last non-empty path segment of a URL.
fn basename(location: &str) -> Result<String, StageError> {
    let url = reqwest::Url::parse(location)
        .map_err(|_| StageError::BadLocation(location.to_string()))?;

    url.path_segments()
        .and_then(|mut segments| segments.next_back())
        .filter(|name| !name.is_empty() && *name != "." && *name != "..")
        .map(str::to_string)
        .ok_or_else(|| StageError::BadLocation(location.to_string()))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn basename_takes_last_segment() {
        assert_eq!(basename("http://x/file.jar").unwrap(), "file.jar");
        assert_eq!(
            basename("https://host/deps/v2/command?rev=3").unwrap(),
            "command"
        );
    }

    #[test]
    fn basename_rejects_directories_and_garbage() {
        assert!(matches!(
            basename("http://x/deps/"),
            Err(StageError::BadLocation(_))
        ));
        assert!(matches!(basename("not a url"), Err(StageError::BadLocation(_))));
        assert!(matches!(basename("http://x"), Err(StageError::BadLocation(_))));
    }
}
