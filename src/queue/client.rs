//! HTTP client for the remote work queue.
//!
//! Delivery is at-most-once: every call is attempted exactly once and the
//! caller decides whether a failure matters. There is no local outbox.

use std::time::Duration;

use secrecy::ExposeSecret;
use tracing::debug;

use crate::config::Credentials;
use crate::error::QueueError;
use crate::queue::types::{Job, JobUpdate, NextJobResponse, UpdateEnvelope};

/// Client for `GET <queue-base>` and `PUT <queue-base>/<jobID>`.
#[derive(Debug, Clone)]
pub struct QueueClient {
    base_url: String,
    credentials: Credentials,
    client: reqwest::Client,
}

impl QueueClient {
    pub fn new(
        base_url: impl Into<String>,
        credentials: Credentials,
        timeout: Duration,
    ) -> Result<Self, reqwest::Error> {
        let client = reqwest::Client::builder().timeout(timeout).build()?;
        Ok(Self::with_client(base_url, credentials, client))
    }

    /// Share an existing HTTP client (e.g. with the dependency stager).
    pub fn with_client(
        base_url: impl Into<String>,
        credentials: Credentials,
        client: reqwest::Client,
    ) -> Self {
        Self {
            base_url: base_url.into().trim_end_matches('/').to_string(),
            credentials,
            client,
        }
    }

    fn job_url(&self, job_id: &str) -> String {
        format!("{}/{job_id}", self.base_url)
    }

    /// Ask the queue for the next job. `Ok(None)` is the "no work" signal.
    pub async fn fetch_next_job(&self) -> Result<Option<Job>, QueueError> {
        let resp = self
            .client
            .get(&self.base_url)
            .basic_auth(
                &self.credentials.username,
                Some(self.credentials.password.expose_secret()),
            )
            .send()
            .await?;

        if !resp.status().is_success() {
            return Err(QueueError::Status {
                status: resp.status().as_u16(),
                action: "polling for a new job",
            });
        }

        let body = resp.text().await?;
        let parsed: NextJobResponse =
            serde_json::from_str(&body).map_err(|e| QueueError::Decode(e.to_string()))?;

        if !parsed.new_job {
            return Ok(None);
        }

        let id = parsed
            .job_id
            .filter(|id| !id.trim().is_empty())
            .ok_or(QueueError::MissingJobId)?;

        Ok(Some(Job {
            id,
            dependencies: parsed.dependencies,
        }))
    }

    /// Push a partial update for `job_id`. Only HTTP 200 counts as delivered.
    pub async fn push_update(&self, job_id: &str, update: &JobUpdate) -> Result<(), QueueError> {
        let envelope = UpdateEnvelope {
            action: "update",
            update,
        };

        let resp = self
            .client
            .put(self.job_url(job_id))
            .basic_auth(
                &self.credentials.username,
                Some(self.credentials.password.expose_secret()),
            )
            .json(&envelope)
            .send()
            .await?;

        if resp.status() != reqwest::StatusCode::OK {
            return Err(QueueError::Status {
                status: resp.status().as_u16(),
                action: "updating job state",
            });
        }

        debug!(
            job_id = %job_id,
            status = ?update.status,
            tracking = update.tracking.is_some(),
            progress = ?update.progress,
            output_bytes = update.hadoop_out.as_ref().map_or(0, String::len),
            "Sent job update"
        );
        Ok(())
    }
}
