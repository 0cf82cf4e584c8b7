//! External worker — launching, liveness, and output interpretation.

pub mod launcher;
pub mod output;
pub mod probe;

pub use launcher::{WorkerHandle, WorkerLauncher};
pub use output::{HadoopLogInterpreter, Outcome, OutputInterpreter, WorkerReport};
pub use probe::{ProcessProbe, SignalProbe};
