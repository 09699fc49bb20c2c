//! External job orchestration.
//!
//! Submits exactly one job to an asynchronous runner and polls it until it
//! reaches a terminal state or the orchestrator's deadline expires.

pub mod orchestrator;
pub mod replicate;
pub mod runner;
pub mod types;

pub use orchestrator::JobOrchestrator;
pub use replicate::ReplicateRunner;
pub use runner::{JobRunner, RunnerError};
pub use types::*;
