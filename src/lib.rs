//! Queue agent — single-job execution agent driven by a remote work queue.

pub mod config;
pub mod error;
pub mod guard;
pub mod invocation;
pub mod job;
pub mod queue;
pub mod runner;
pub mod stager;

pub use error::{Error, Result};
