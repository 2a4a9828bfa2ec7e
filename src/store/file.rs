//! File-backed store: one JSON document per task plus one per-task
//! checkpoint log, under a root directory. Durable across process restarts;
//! single-process access is assumed (no cross-process locking).

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use std::path::{Path, PathBuf};
use tokio::fs;
use tracing::debug;

use super::{PersistenceStore, StoreError, StoreResult, StoreSnapshot};
use crate::models::{Checkpoint, Task, TaskId};

/// Layout under the root directory:
///
/// ```text
/// <root>/tasks/<task_id>.json          one task snapshot
/// <root>/checkpoints/<task_id>.json    chronological checkpoint array
/// ```
#[derive(Debug, Clone)]
pub struct FileStore {
    root: PathBuf,
}

impl FileStore {
    /// Open (creating if needed) a store rooted at `root`
    pub async fn new(root: impl Into<PathBuf>) -> StoreResult<Self> {
        let root = root.into();
        fs::create_dir_all(root.join("tasks")).await?;
        fs::create_dir_all(root.join("checkpoints")).await?;
        debug!(root = %root.display(), "file store opened");
        Ok(Self { root })
    }

    fn task_path(&self, task_id: TaskId) -> PathBuf {
        self.root.join("tasks").join(format!("{task_id}.json"))
    }

    fn checkpoint_path(&self, task_id: TaskId) -> PathBuf {
        self.root.join("checkpoints").join(format!("{task_id}.json"))
    }

    async fn write_json<T: serde::Serialize>(path: &Path, value: &T) -> StoreResult<()> {
        let payload = serde_json::to_vec_pretty(value)?;
        // Write-then-rename keeps a crash from leaving a torn document
        let tmp = path.with_extension("json.tmp");
        fs::write(&tmp, payload).await?;
        fs::rename(&tmp, path).await?;
        Ok(())
    }

    async fn read_json<T: serde::de::DeserializeOwned>(path: &Path) -> StoreResult<Option<T>> {
        match fs::read(path).await {
            Ok(bytes) => Ok(Some(serde_json::from_slice(&bytes)?)),
            Err(err) if err.kind() == std::io::ErrorKind::NotFound => Ok(None),
            Err(err) => Err(err.into()),
        }
    }

    async fn read_dir_json<T: serde::de::DeserializeOwned>(
        &self,
        dir: &Path,
    ) -> StoreResult<Vec<T>> {
        let mut values = Vec::new();
        let mut entries = fs::read_dir(dir).await?;
        while let Some(entry) = entries.next_entry().await? {
            let path = entry.path();
            if path.extension().and_then(|ext| ext.to_str()) != Some("json") {
                continue;
            }
            if let Some(value) = Self::read_json(&path).await? {
                values.push(value);
            }
        }
        Ok(values)
    }
}

#[async_trait]
impl PersistenceStore for FileStore {
    async fn save_task(&self, task: &Task) -> StoreResult<()> {
        Self::write_json(&self.task_path(task.id), task).await
    }

    async fn load_task(&self, task_id: TaskId) -> StoreResult<Option<Task>> {
        Self::read_json(&self.task_path(task_id)).await
    }

    async fn load_all_tasks(&self) -> StoreResult<Vec<Task>> {
        self.read_dir_json(&self.root.join("tasks")).await
    }

    async fn delete_task(&self, task_id: TaskId) -> StoreResult<bool> {
        match fs::remove_file(self.checkpoint_path(task_id)).await {
            Ok(()) => {}
            Err(err) if err.kind() == std::io::ErrorKind::NotFound => {}
            Err(err) => return Err(err.into()),
        }
        match fs::remove_file(self.task_path(task_id)).await {
            Ok(()) => Ok(true),
            Err(err) if err.kind() == std::io::ErrorKind::NotFound => Ok(false),
            Err(err) => Err(err.into()),
        }
    }

    async fn save_checkpoint(&self, checkpoint: &Checkpoint) -> StoreResult<()> {
        let path = self.checkpoint_path(checkpoint.task_id);
        let mut log: Vec<Checkpoint> = Self::read_json(&path).await?.unwrap_or_default();
        log.push(checkpoint.clone());
        Self::write_json(&path, &log).await
    }

    async fn checkpoints(&self, task_id: TaskId) -> StoreResult<Vec<Checkpoint>> {
        Ok(Self::read_json(&self.checkpoint_path(task_id))
            .await?
            .unwrap_or_default())
    }

    async fn cleanup(&self, older_than: DateTime<Utc>) -> StoreResult<usize> {
        let mut removed = 0;
        for task in self.load_all_tasks().await? {
            let expired = task.is_terminal()
                && task.completed_at.map(|at| at < older_than).unwrap_or(false);
            if expired && self.delete_task(task.id).await? {
                removed += 1;
            }
        }
        Ok(removed)
    }

    async fn export_data(&self) -> StoreResult<StoreSnapshot> {
        let tasks = self.load_all_tasks().await?;
        let logs: Vec<Vec<Checkpoint>> =
            self.read_dir_json(&self.root.join("checkpoints")).await?;
        Ok(StoreSnapshot::new(tasks, logs.into_iter().flatten().collect()))
    }

    async fn import_data(&self, snapshot: StoreSnapshot) -> StoreResult<()> {
        if snapshot.version > StoreSnapshot::CURRENT_VERSION {
            return Err(StoreError::Serialization(format!(
                "unsupported snapshot version {}",
                snapshot.version
            )));
        }

        // Replace current contents wholesale
        for dir in ["tasks", "checkpoints"] {
            let path = self.root.join(dir);
            fs::remove_dir_all(&path).await?;
            fs::create_dir_all(&path).await?;
        }

        for task in &snapshot.tasks {
            self.save_task(task).await?;
        }

        let mut by_task: std::collections::HashMap<TaskId, Vec<Checkpoint>> =
            std::collections::HashMap::new();
        for checkpoint in snapshot.checkpoints {
            by_task.entry(checkpoint.task_id).or_default().push(checkpoint);
        }
        for (task_id, mut log) in by_task {
            log.sort_by_key(|c| c.created_at);
            Self::write_json(&self.checkpoint_path(task_id), &log).await?;
        }
        Ok(())
    }
}
