//! Queue wire types and the job status order.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

/// A job handed out by the queue.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Job {
    /// Opaque id assigned by the queue.
    pub id: String,
    /// Dependency name → fetch location.
    pub dependencies: BTreeMap<String, String>,
}

/// Body of `GET <queue-base>`.
#[derive(Debug, Clone, Deserialize)]
pub struct NextJobResponse {
    #[serde(rename = "newJob", default)]
    pub new_job: bool,
    #[serde(rename = "jobID", default)]
    pub job_id: Option<String>,
    #[serde(default, deserialize_with = "map_or_list")]
    pub dependencies: BTreeMap<String, String>,
}

/// Accept `{name: url}`, a bare `[url, ..]` list, or `null` for dependencies.
///
/// An empty map may arrive encoded as `[]`.
fn map_or_list<'de, D>(deserializer: D) -> Result<BTreeMap<String, String>, D::Error>
where
    D: serde::Deserializer<'de>,
{
    #[derive(Deserialize)]
    #[serde(untagged)]
    enum Shape {
        Map(BTreeMap<String, String>),
        List(Vec<String>),
    }

    Ok(match Option::<Shape>::deserialize(deserializer)? {
        Some(Shape::Map(map)) => map,
        Some(Shape::List(urls)) => urls.into_iter().map(|u| (u.clone(), u)).collect(),
        None => BTreeMap::new(),
    })
}

/// Status reported to the queue.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum JobStatus {
    Submitted,
    Running,
    Success,
    Fail,
}

impl JobStatus {
    /// Forward-only order: `submitted → running → success|fail`.
    ///
    /// `submitted → fail` is allowed for a worker that never launched.
    pub fn can_transition_to(&self, target: JobStatus) -> bool {
        use JobStatus::*;

        matches!(
            (self, target),
            (Submitted, Running) | (Submitted, Fail) | (Running, Success) | (Running, Fail)
        )
    }

    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Success | Self::Fail)
    }
}

impl std::fmt::Display for JobStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            Self::Submitted => "submitted",
            Self::Running => "running",
            Self::Success => "success",
            Self::Fail => "fail",
        };
        write!(f, "{s}")
    }
}

/// Partial update pushed with `PUT <queue-base>/<jobID>`. Absent fields are not sent.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct JobUpdate {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub status: Option<JobStatus>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub tracking: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub progress: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub hadoop_out: Option<String>,
}

impl JobUpdate {
    pub fn status(status: JobStatus) -> Self {
        Self {
            status: Some(status),
            ..Default::default()
        }
    }

    /// Tracking/progress observation. Empty strings are dropped.
    pub fn observation(tracking: Option<String>, progress: Option<String>) -> Self {
        Self {
            tracking: tracking.filter(|s| !s.is_empty()),
            progress: progress.filter(|s| !s.is_empty()),
            ..Default::default()
        }
    }

    /// Final captured output. Empty output is dropped.
    pub fn output(text: String) -> Self {
        Self {
            hadoop_out: (!text.is_empty()).then_some(text),
            ..Default::default()
        }
    }

    pub fn is_empty(&self) -> bool {
        self.status.is_none()
            && self.tracking.is_none()
            && self.progress.is_none()
            && self.hadoop_out.is_none()
    }
}

/// `JobUpdate` wrapped with the `"action": "update"` discriminator.
#[derive(Debug, Serialize)]
pub(crate) struct UpdateEnvelope<'a> {
    pub action: &'static str,
    #[serde(flatten)]
    pub update: &'a JobUpdate,
}
