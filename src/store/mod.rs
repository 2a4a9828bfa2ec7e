//! Persistence Store: durable, asynchronous storage for task and checkpoint
//! snapshots, addressable by id and surviving restarts.
//!
//! Any medium satisfying [`PersistenceStore`] is substitutable. Two backends
//! ship with the crate: [`InMemoryStore`] for development and testing, and
//! [`FileStore`] for durable single-process deployments.

pub mod file;
pub mod memory;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::models::{Checkpoint, Task, TaskId};

pub use file::FileStore;
pub use memory::InMemoryStore;

/// Store-layer failures, distinct from task-layer failures.
///
/// The in-memory registry stays authoritative and usable when these occur;
/// the controller degrades to warnings rather than letting them escape.
#[derive(Debug, Error)]
pub enum StoreError {
    #[error("Record not found: {0}")]
    NotFound(String),
    #[error("Store unavailable: {0}")]
    Unavailable(String),
    #[error("Serialization failed: {0}")]
    Serialization(String),
    #[error("I/O failure: {0}")]
    Io(String),
}

impl From<serde_json::Error> for StoreError {
    fn from(err: serde_json::Error) -> Self {
        StoreError::Serialization(err.to_string())
    }
}

impl From<std::io::Error> for StoreError {
    fn from(err: std::io::Error) -> Self {
        StoreError::Io(err.to_string())
    }
}

pub type StoreResult<T> = Result<T, StoreError>;

/// Whole-store snapshot for backup or migration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StoreSnapshot {
    pub version: u32,
    pub exported_at: DateTime<Utc>,
    pub tasks: Vec<Task>,
    pub checkpoints: Vec<Checkpoint>,
}

impl StoreSnapshot {
    pub const CURRENT_VERSION: u32 = 1;

    pub fn new(tasks: Vec<Task>, checkpoints: Vec<Checkpoint>) -> Self {
        Self {
            version: Self::CURRENT_VERSION,
            exported_at: Utc::now(),
            tasks,
            checkpoints,
        }
    }
}

/// Async key-value contract for task and checkpoint snapshots.
///
/// Checkpoints are secondary-indexed by their owning task id and returned in
/// chronological order. Deleting a task deletes its checkpoints with it.
#[async_trait]
pub trait PersistenceStore: Send + Sync {
    /// Persist one task snapshot, overwriting any previous snapshot
    async fn save_task(&self, task: &Task) -> StoreResult<()>;

    /// Persist several task snapshots; fails on the first backend error
    async fn save_tasks(&self, tasks: &[Task]) -> StoreResult<()> {
        for task in tasks {
            self.save_task(task).await?;
        }
        Ok(())
    }

    /// Load one task snapshot by id
    async fn load_task(&self, task_id: TaskId) -> StoreResult<Option<Task>>;

    /// Load every persisted task snapshot
    async fn load_all_tasks(&self) -> StoreResult<Vec<Task>>;

    /// Delete a task and its checkpoints; returns whether the task existed
    async fn delete_task(&self, task_id: TaskId) -> StoreResult<bool>;

    /// Append one checkpoint
    async fn save_checkpoint(&self, checkpoint: &Checkpoint) -> StoreResult<()>;

    /// All checkpoints for a task, oldest first
    async fn checkpoints(&self, task_id: TaskId) -> StoreResult<Vec<Checkpoint>>;

    /// The most recent checkpoint for a task, if any
    async fn latest_checkpoint(&self, task_id: TaskId) -> StoreResult<Option<Checkpoint>> {
        Ok(self.checkpoints(task_id).await?.into_iter().next_back())
    }

    /// Delete terminal tasks (and their checkpoints) completed before the
    /// cutoff; returns the number of tasks removed
    async fn cleanup(&self, older_than: DateTime<Utc>) -> StoreResult<usize>;

    /// Whole-store snapshot for backup
    async fn export_data(&self) -> StoreResult<StoreSnapshot>;

    /// Restore a previously exported snapshot, replacing current contents
    async fn import_data(&self, snapshot: StoreSnapshot) -> StoreResult<()>;
}
