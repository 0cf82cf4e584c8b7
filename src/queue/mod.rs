//! Remote work queue — wire types and HTTP client.

pub mod client;
pub mod types;

pub use client::QueueClient;
pub use types::{Job, JobStatus, JobUpdate};
