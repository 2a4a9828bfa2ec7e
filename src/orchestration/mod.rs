//! Orchestration layer: registry, controller façade, and the batch runner.

pub mod batch_runner;
pub mod controller;
pub mod registry;
pub mod types;

pub use batch_runner::BatchRunner;
pub use controller::TaskController;
pub use registry::{TaskRegistry, Transition};
pub use types::{BatchCommitter, BatchRunSummary, CommitError, CommitResult, RowError};
