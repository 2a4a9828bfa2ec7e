//! Checkpoint model: the resumability marker written after every committed
//! batch. Append-only; only the most recent checkpoint per task is
//! load-bearing, older ones are kept for diagnostics until cleanup.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use super::progress::TaskProgress;
use super::task::TaskId;

/// Running counters captured at a batch boundary, replayed on resume so the
/// task restarts with accurate totals instead of re-deriving them.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CheckpointData {
    pub processed: usize,
    pub successful: usize,
    pub failed: usize,
    pub skipped: usize,
}

impl CheckpointData {
    pub fn from_progress(progress: &TaskProgress) -> Self {
        Self {
            processed: progress.processed,
            successful: progress.successful,
            failed: progress.failed,
            skipped: progress.skipped,
        }
    }
}

/// A durable marker recording how much of a task has been committed
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Checkpoint {
    pub id: Uuid,
    /// Back-reference to the owning task, not ownership
    pub task_id: TaskId,
    /// Next unprocessed batch index
    pub batch_index: usize,
    pub data: CheckpointData,
    pub created_at: DateTime<Utc>,
}

impl Checkpoint {
    pub fn new(task_id: TaskId, batch_index: usize, data: CheckpointData) -> Self {
        Self {
            id: Uuid::new_v4(),
            task_id,
            batch_index,
            data,
            created_at: Utc::now(),
        }
    }
}
