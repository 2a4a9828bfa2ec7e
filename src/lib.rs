#![allow(clippy::missing_errors_doc)] // Allow public functions without # Errors sections
#![allow(clippy::must_use_candidate)] // Allow methods without must_use when context is clear

//! # Gradeflow Core
//!
//! Long-running task engine for bulk data-import operations in
//! education-data dashboards: ingesting thousands of grade, enrollment or
//! attendance records while surviving restarts, supporting pause, resume
//! and cancel mid-flight, and reporting live progress to a waiting operator.
//!
//! ## Architecture
//!
//! Four layers, leaves first:
//!
//! - [`store`] - durable, asynchronous key-value persistence for task and
//!   checkpoint snapshots (in-memory and file-backed backends included)
//! - [`orchestration::TaskRegistry`] - the authoritative in-memory map of
//!   tasks, mutated only through validated state transitions
//! - [`orchestration::TaskController`] - the operation façade: create,
//!   start, pause, resume, cancel, delete, progress, checkpoints,
//!   subscriptions
//! - [`orchestration::BatchRunner`] - the cooperative loop committing
//!   fixed-size batches, checkpointing after each one, and yielding between
//!   batches so pause and cancel take effect at batch boundaries
//!
//! The caller supplies already-parsed rows and a [`orchestration::BatchCommitter`]
//! that applies one batch to the ultimate destination; parsing files and
//! speaking any particular backend protocol are out of scope.
//!
//! ## Module Organization
//!
//! - [`models`] - Tasks, progress counters, checkpoints
//! - [`state_machine`] - Task lifecycle states, events, transition rules
//! - [`store`] - Persistence store trait and backends
//! - [`orchestration`] - Registry, controller façade, batch runner
//! - [`events`] - Push-based task notifications
//! - [`config`] - Engine configuration and loading
//! - [`error`] - Structured error handling
//! - [`logging`] - Structured logging setup
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use std::sync::Arc;
//! use gradeflow_core::config::EngineConfig;
//! use gradeflow_core::orchestration::{
//!     BatchCommitter, BatchRunner, CommitError, CommitResult, TaskController,
//! };
//! use gradeflow_core::models::{TaskConfig, TaskType};
//! use gradeflow_core::store::InMemoryStore;
//!
//! struct Upserter;
//!
//! #[async_trait::async_trait]
//! impl BatchCommitter for Upserter {
//!     async fn commit(
//!         &self,
//!         batch: &[serde_json::Value],
//!         _batch_index: usize,
//!     ) -> Result<CommitResult, CommitError> {
//!         // Apply the batch to the destination store here
//!         Ok(CommitResult::all_successful(batch.len()))
//!     }
//! }
//!
//! # async fn example() -> Result<(), Box<dyn std::error::Error>> {
//! let controller = Arc::new(TaskController::new(
//!     Arc::new(InMemoryStore::new()),
//!     EngineConfig::default(),
//! ));
//!
//! let rows = vec![serde_json::json!({ "student_id": 1, "score": 92 })];
//! let task = controller
//!     .create_task(TaskType::GradeImport, rows, TaskConfig::default())
//!     .await?;
//!
//! let runner = BatchRunner::new(Arc::clone(&controller));
//! let summary = runner.run(task.id, Arc::new(Upserter)).await?;
//! println!("finished in state {}", summary.final_state);
//! # Ok(())
//! # }
//! ```

pub mod config;
pub mod error;
pub mod events;
pub mod logging;
pub mod models;
pub mod orchestration;
pub mod state_machine;
pub mod store;

pub use config::{ConfigManager, EngineConfig};
pub use error::{EngineError, Result};
pub use events::{EventPublisher, NotificationKind, TaskNotification};
pub use models::{
    Checkpoint, CheckpointData, DuplicatePolicy, Task, TaskConfig, TaskErrorEntry, TaskId,
    TaskProgress, TaskType, TaskWarningEntry,
};
pub use orchestration::{
    BatchCommitter, BatchRunner, BatchRunSummary, CommitError, CommitResult, RowError,
    TaskController, TaskRegistry,
};
pub use state_machine::{TaskEvent, TaskState, TaskStateMachine};
pub use store::{FileStore, InMemoryStore, PersistenceStore, StoreError, StoreSnapshot};
