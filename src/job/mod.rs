//! Job lifecycle — persisted record and the per-invocation controller.

pub mod controller;
pub mod record;

pub use controller::{InvocationOutcome, JobLifecycleController};
pub use record::{JobPhase, JobRecord};
