//! In-memory store implementation for development and testing.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use parking_lot::RwLock;
use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};

use super::{PersistenceStore, StoreError, StoreResult, StoreSnapshot};
use crate::models::{Checkpoint, Task, TaskId};

/// HashMap-backed store. Not durable across restarts; its value is API
/// parity with durable backends plus write-failure injection for exercising
/// the engine's degraded-store path.
#[derive(Debug, Default)]
pub struct InMemoryStore {
    tasks: RwLock<HashMap<TaskId, Task>>,
    checkpoints: RwLock<HashMap<TaskId, Vec<Checkpoint>>>,
    fail_writes: AtomicBool,
}

impl InMemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Make every subsequent write fail with [`StoreError::Unavailable`],
    /// simulating a store outage. Reads are unaffected.
    pub fn set_fail_writes(&self, fail: bool) {
        self.fail_writes.store(fail, Ordering::SeqCst);
    }

    fn check_writable(&self) -> StoreResult<()> {
        if self.fail_writes.load(Ordering::SeqCst) {
            return Err(StoreError::Unavailable("writes disabled".to_string()));
        }
        Ok(())
    }
}

#[async_trait]
impl PersistenceStore for InMemoryStore {
    async fn save_task(&self, task: &Task) -> StoreResult<()> {
        self.check_writable()?;
        self.tasks.write().insert(task.id, task.clone());
        Ok(())
    }

    async fn load_task(&self, task_id: TaskId) -> StoreResult<Option<Task>> {
        Ok(self.tasks.read().get(&task_id).cloned())
    }

    async fn load_all_tasks(&self) -> StoreResult<Vec<Task>> {
        Ok(self.tasks.read().values().cloned().collect())
    }

    async fn delete_task(&self, task_id: TaskId) -> StoreResult<bool> {
        self.check_writable()?;
        self.checkpoints.write().remove(&task_id);
        Ok(self.tasks.write().remove(&task_id).is_some())
    }

    async fn save_checkpoint(&self, checkpoint: &Checkpoint) -> StoreResult<()> {
        self.check_writable()?;
        self.checkpoints
            .write()
            .entry(checkpoint.task_id)
            .or_default()
            .push(checkpoint.clone());
        Ok(())
    }

    async fn checkpoints(&self, task_id: TaskId) -> StoreResult<Vec<Checkpoint>> {
        Ok(self
            .checkpoints
            .read()
            .get(&task_id)
            .cloned()
            .unwrap_or_default())
    }

    async fn cleanup(&self, older_than: DateTime<Utc>) -> StoreResult<usize> {
        self.check_writable()?;
        let mut tasks = self.tasks.write();
        let expired: Vec<TaskId> = tasks
            .values()
            .filter(|task| {
                task.is_terminal()
                    && task.completed_at.map(|at| at < older_than).unwrap_or(false)
            })
            .map(|task| task.id)
            .collect();

        let mut checkpoints = self.checkpoints.write();
        for task_id in &expired {
            tasks.remove(task_id);
            checkpoints.remove(task_id);
        }
        Ok(expired.len())
    }

    async fn export_data(&self) -> StoreResult<StoreSnapshot> {
        let tasks = self.tasks.read().values().cloned().collect();
        let checkpoints = self
            .checkpoints
            .read()
            .values()
            .flat_map(|log| log.iter().cloned())
            .collect();
        Ok(StoreSnapshot::new(tasks, checkpoints))
    }

    async fn import_data(&self, snapshot: StoreSnapshot) -> StoreResult<()> {
        self.check_writable()?;
        if snapshot.version > StoreSnapshot::CURRENT_VERSION {
            return Err(StoreError::Serialization(format!(
                "unsupported snapshot version {}",
                snapshot.version
            )));
        }

        let mut tasks = self.tasks.write();
        let mut checkpoints = self.checkpoints.write();
        tasks.clear();
        checkpoints.clear();
        for task in snapshot.tasks {
            tasks.insert(task.id, task);
        }
        for checkpoint in snapshot.checkpoints {
            checkpoints
                .entry(checkpoint.task_id)
                .or_default()
                .push(checkpoint);
        }
        // Keep per-task checkpoint logs chronological regardless of
        // snapshot ordering
        for log in checkpoints.values_mut() {
            log.sort_by_key(|c| c.created_at);
        }
        Ok(())
    }
}
