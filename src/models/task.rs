//! # Task Model
//!
//! One bulk-import operation instance, tracked end-to-end by the engine.
//!
//! A task owns an ordered, immutable input of already-parsed row objects
//! (`serde_json::Value`), its serializable configuration, running progress
//! counters and append-only error/warning lists. The caller-supplied commit
//! function is deliberately *not* part of the task: it cannot round-trip
//! through a store, so it is re-supplied to the batch runner on every
//! start or resume while everything else persists as plain data.

use super::progress::TaskProgress;
use crate::state_machine::TaskState;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::fmt;
use std::sync::Arc;
use uuid::Uuid;

pub type TaskId = Uuid;

/// Enumerated operation kinds this engine drives
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TaskType {
    /// Grade records from a spreadsheet export
    GradeImport,
    /// Student enrollment records
    EnrollmentImport,
    /// Attendance records
    AttendanceImport,
    /// Full roster synchronization
    RosterSync,
}

impl fmt::Display for TaskType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::GradeImport => write!(f, "grade_import"),
            Self::EnrollmentImport => write!(f, "enrollment_import"),
            Self::AttendanceImport => write!(f, "attendance_import"),
            Self::RosterSync => write!(f, "roster_sync"),
        }
    }
}

/// How the committer should treat rows that already exist downstream
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DuplicatePolicy {
    /// Leave the existing record, count the row as skipped
    Skip,
    /// Replace the existing record
    Overwrite,
    /// Count the row as failed
    Reject,
}

impl Default for DuplicatePolicy {
    fn default() -> Self {
        Self::Skip
    }
}

/// Serializable per-task configuration.
///
/// This is the persisted half of the task context; the live commit function
/// is the other half and stays in memory only.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TaskConfig {
    /// Rows per batch; the atomic unit of commit and checkpointing
    pub batch_size: usize,
    /// Duplicate-handling policy, transported to the committer
    #[serde(default)]
    pub duplicate_policy: DuplicatePolicy,
    /// Abort the whole task on the first batch-level commit error
    #[serde(default)]
    pub strict_mode: bool,
    /// Consecutive batch-level commit failures before the task fails.
    /// 0 disables task-level failure. Default 5.
    #[serde(default = "default_max_consecutive_failures")]
    pub max_consecutive_failures: u32,
    /// Batches dispatched concurrently; 1 = sequential. Checkpoint writes
    /// stay serialized in batch order either way.
    #[serde(default = "default_max_concurrent_batches")]
    pub max_concurrent_batches: usize,
    /// Whether pause() is honored for this task
    #[serde(default = "default_resumable")]
    pub resumable: bool,
}

fn default_max_consecutive_failures() -> u32 {
    5
}

fn default_max_concurrent_batches() -> usize {
    1
}

fn default_resumable() -> bool {
    true
}

impl Default for TaskConfig {
    fn default() -> Self {
        Self {
            batch_size: 100,
            duplicate_policy: DuplicatePolicy::default(),
            strict_mode: false,
            max_consecutive_failures: default_max_consecutive_failures(),
            max_concurrent_batches: default_max_concurrent_batches(),
            resumable: default_resumable(),
        }
    }
}

impl TaskConfig {
    /// Validate the configuration before a task enters processing
    pub fn validate(&self) -> Result<(), String> {
        if self.batch_size == 0 {
            return Err("batch_size must be at least 1".to_string());
        }
        if self.max_concurrent_batches == 0 {
            return Err("max_concurrent_batches must be at least 1".to_string());
        }
        Ok(())
    }
}

/// Structured, append-only error entry
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TaskErrorEntry {
    pub message: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub code: Option<String>,
    /// Batch the error belongs to, when batch-scoped
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub batch_index: Option<usize>,
    /// Offending input row, when row-scoped (absolute input index)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub row_index: Option<usize>,
    pub occurred_at: DateTime<Utc>,
}

impl TaskErrorEntry {
    pub fn batch(batch_index: usize, message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
            code: None,
            batch_index: Some(batch_index),
            row_index: None,
            occurred_at: Utc::now(),
        }
    }

    pub fn row(row_index: usize, message: impl Into<String>, code: Option<String>) -> Self {
        Self {
            message: message.into(),
            code,
            batch_index: None,
            row_index: Some(row_index),
            occurred_at: Utc::now(),
        }
    }
}

/// Structured, append-only warning entry
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TaskWarningEntry {
    pub message: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub code: Option<String>,
    pub occurred_at: DateTime<Utc>,
}

impl TaskWarningEntry {
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
            code: None,
            occurred_at: Utc::now(),
        }
    }
}

/// Represents one bulk-import operation instance.
///
/// The in-memory registry holds the authoritative copy; the persistence
/// store holds a durable snapshot lagging by at most one batch.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Task {
    pub id: TaskId,
    pub task_type: TaskType,
    pub state: TaskState,
    /// Ordered input rows; never mutated after creation. Shared so snapshot
    /// clones stay cheap.
    pub input: Arc<Vec<Value>>,
    pub config: TaskConfig,
    pub progress: TaskProgress,
    pub errors: Vec<TaskErrorEntry>,
    pub warnings: Vec<TaskWarningEntry>,
    pub created_at: DateTime<Utc>,
    /// Set exactly once, on entering a terminal state
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub completed_at: Option<DateTime<Utc>>,
}

impl Task {
    /// Create a new idle task over the given input rows
    pub fn new(task_type: TaskType, input: Vec<Value>, config: TaskConfig) -> Self {
        let total = input.len();
        Self {
            id: Uuid::new_v4(),
            task_type,
            state: TaskState::default(),
            input: Arc::new(input),
            config,
            progress: TaskProgress::new(total),
            errors: Vec::new(),
            warnings: Vec::new(),
            created_at: Utc::now(),
            completed_at: None,
        }
    }

    /// Append a structured error; entries are never overwritten
    pub fn add_error(&mut self, entry: TaskErrorEntry) {
        self.errors.push(entry);
    }

    /// Append a structured warning; entries are never overwritten
    pub fn add_warning(&mut self, entry: TaskWarningEntry) {
        self.warnings.push(entry);
    }

    /// Number of batches for the configured batch size
    pub fn batch_count(&self) -> usize {
        let size = self.config.batch_size.max(1);
        self.input.len().div_ceil(size)
    }

    /// Slice the input rows belonging to `batch_index`, empty when past the end
    pub fn batch_slice(&self, batch_index: usize) -> &[Value] {
        let size = self.config.batch_size.max(1);
        let start = batch_index.saturating_mul(size).min(self.input.len());
        let end = (start + size).min(self.input.len());
        &self.input[start..end]
    }

    pub fn is_terminal(&self) -> bool {
        self.state.is_terminal()
    }
}
