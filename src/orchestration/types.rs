//! Collaborator contracts for the batch runner: the caller-supplied commit
//! function and the shapes it reports back.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use thiserror::Error;

use crate::state_machine::TaskState;

/// Row-scoped failure reported by a committer. `row_index` is absolute into
/// the task input, not batch-relative.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RowError {
    pub row_index: usize,
    pub message: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub code: Option<String>,
}

/// Outcome of committing one batch.
///
/// `successful + failed + skipped` must equal the batch length; rows that
/// failed validation or commit are listed in `errors`.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct CommitResult {
    pub successful: usize,
    pub failed: usize,
    pub skipped: usize,
    #[serde(default)]
    pub errors: Vec<RowError>,
}

impl CommitResult {
    /// All rows in the batch committed cleanly
    pub fn all_successful(count: usize) -> Self {
        Self {
            successful: count,
            ..Self::default()
        }
    }

    pub fn rows_accounted(&self) -> usize {
        self.successful + self.failed + self.skipped
    }
}

/// Batch-level commit failure: the whole batch could not be applied
#[derive(Debug, Error)]
pub enum CommitError {
    #[error("Batch rejected: {0}")]
    Rejected(String),
    #[error("Destination unavailable: {0}")]
    Unavailable(String),
}

/// Caller-supplied logic durably applying one batch to the destination
/// store. Commits must be idempotent: a crashed run re-commits its last
/// uncheckpointed batch on resume (at-least-once).
#[async_trait]
pub trait BatchCommitter: Send + Sync {
    async fn commit(&self, batch: &[Value], batch_index: usize) -> Result<CommitResult, CommitError>;
}

/// What a batch runner invocation did, returned to the caller when the run
/// loop exits for any reason
#[derive(Debug, Clone, PartialEq)]
pub struct BatchRunSummary {
    /// Batches committed and checkpointed by this invocation
    pub batches_run: usize,
    /// Task state observed when the loop exited
    pub final_state: TaskState,
    /// Consecutive batch-level failures at exit
    pub consecutive_failures: u32,
}
